// src/handlers/quiz.rs

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use rand::seq::SliceRandom;
use sqlx::{PgPool, Postgres, Transaction};

use crate::{
    error::AppError,
    handlers::classroom::{can_manage, fetch_classroom, require_member},
    models::{
        question::{AnswerOption, Question, QuestionWithOptions, TakingQuestion},
        quiz::{
            CreateQuizRequest, QuestionInput, Quiz, QuizForTaking, QuizStatus, UpdateQuizRequest,
            validate_quiz_structure,
        },
    },
    utils::jwt::Claims,
};

pub(crate) async fn fetch_quiz(pool: &PgPool, id: i64) -> Result<Quiz, AppError> {
    sqlx::query_as::<_, Quiz>("SELECT * FROM quizzes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Quiz not found".to_string()))
}

/// Loads a quiz's questions with their options, both in defined order.
pub(crate) async fn fetch_quiz_structure(
    pool: &PgPool,
    quiz_id: i64,
) -> Result<Vec<QuestionWithOptions>, AppError> {
    let questions = sqlx::query_as::<_, Question>(
        "SELECT * FROM questions WHERE quiz_id = $1 ORDER BY position",
    )
    .bind(quiz_id)
    .fetch_all(pool)
    .await?;

    let options = sqlx::query_as::<_, AnswerOption>(
        r#"
        SELECT o.* FROM question_options o
        JOIN questions q ON o.question_id = q.id
        WHERE q.quiz_id = $1
        ORDER BY o.position
        "#,
    )
    .bind(quiz_id)
    .fetch_all(pool)
    .await?;

    let mut by_question: HashMap<i64, Vec<AnswerOption>> = HashMap::new();
    for opt in options {
        by_question.entry(opt.question_id).or_default().push(opt);
    }

    Ok(questions
        .into_iter()
        .map(|question| {
            let options = by_question.remove(&question.id).unwrap_or_default();
            QuestionWithOptions { question, options }
        })
        .collect())
}

/// Reorders a loaded structure to a persisted question-id order
/// (the shuffle fixed when an attempt started).
pub(crate) fn apply_question_order(
    mut questions: Vec<QuestionWithOptions>,
    order: &[i64],
) -> Vec<QuestionWithOptions> {
    let rank: HashMap<i64, usize> = order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    questions.sort_by_key(|q| rank.get(&q.question.id).copied().unwrap_or(usize::MAX));
    questions
}

/// Inserts a quiz's full question/option structure inside the caller's
/// transaction. Positions follow payload order.
async fn insert_structure(
    tx: &mut Transaction<'_, Postgres>,
    quiz_id: i64,
    questions: &[QuestionInput],
) -> Result<(), AppError> {
    for (position, q) in questions.iter().enumerate() {
        let question_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO questions (quiz_id, content, question_type, points, position, explanation)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(quiz_id)
        .bind(&q.content)
        .bind(q.question_type)
        .bind(q.points)
        .bind(position as i32)
        .bind(&q.explanation)
        .fetch_one(&mut **tx)
        .await?;

        for (opt_position, opt) in q.options.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO question_options (question_id, content, is_correct, position)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(question_id)
            .bind(&opt.content)
            .bind(opt.is_correct)
            .bind(opt_position as i32)
            .execute(&mut **tx)
            .await?;
        }
    }
    Ok(())
}

/// Creates a quiz with its full question structure, atomically: either the
/// whole structure becomes visible or none of it.
///
/// Validation enumerates every offending field/question, not just the first.
pub async fn create_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let classroom = fetch_classroom(&pool, payload.classroom_id).await?;
    if !can_manage(&classroom, &claims, user_id) {
        return Err(AppError::Forbidden(
            "Only the classroom's teacher can create quizzes".to_string(),
        ));
    }

    let violations = validate_quiz_structure(&payload.metadata, &payload.questions);
    if !violations.is_empty() {
        return Err(AppError::Validation(violations));
    }

    let mut tx = pool.begin().await?;

    let quiz = sqlx::query_as::<_, Quiz>(
        r#"
        INSERT INTO quizzes
            (classroom_id, title, description, time_limit_minutes, attempts_allowed,
             shuffle_questions, show_results, pass_percentage)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(payload.classroom_id)
    .bind(&payload.metadata.title)
    .bind(&payload.metadata.description)
    .bind(payload.metadata.time_limit_minutes)
    .bind(payload.metadata.attempts_allowed)
    .bind(payload.metadata.shuffle_questions)
    .bind(payload.metadata.show_results)
    .bind(payload.metadata.pass_percentage)
    .fetch_one(&mut *tx)
    .await?;

    insert_structure(&mut tx, quiz.id, &payload.questions).await?;

    tx.commit().await?;

    tracing::info!("Quiz {} created in classroom {}", quiz.id, quiz.classroom_id);
    Ok((StatusCode::CREATED, Json(quiz)))
}

/// Replaces a quiz's metadata and full question structure.
///
/// This is a destructive replace (delete-all, re-insert), so it is refused
/// while the quiz has attempts in progress: their question/option id
/// references would silently dangle otherwise.
pub async fn update_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
    Json(payload): Json<UpdateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let quiz = fetch_quiz(&pool, quiz_id).await?;
    let classroom = fetch_classroom(&pool, quiz.classroom_id).await?;
    if !can_manage(&classroom, &claims, user_id) {
        return Err(AppError::Forbidden(
            "Only the classroom's teacher can edit this quiz".to_string(),
        ));
    }

    if quiz.status == QuizStatus::Archived {
        return Err(AppError::QuizUnavailable(
            "Archived quizzes cannot be edited".to_string(),
        ));
    }

    let violations = validate_quiz_structure(&payload.metadata, &payload.questions);
    if !violations.is_empty() {
        return Err(AppError::Validation(violations));
    }

    let mut tx = pool.begin().await?;

    // Lock the quiz row so concurrent attempt starts serialize behind this
    // edit; the open-attempt check below stays valid until commit.
    sqlx::query("SELECT id FROM quizzes WHERE id = $1 FOR UPDATE")
        .bind(quiz_id)
        .execute(&mut *tx)
        .await?;

    let open_attempts: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM quiz_attempts WHERE quiz_id = $1 AND status = 'in_progress'",
    )
    .bind(quiz_id)
    .fetch_one(&mut *tx)
    .await?;
    if open_attempts > 0 {
        return Err(AppError::Conflict(
            "Quiz has attempts in progress; wait for them to finish before editing".to_string(),
        ));
    }

    let updated = sqlx::query_as::<_, Quiz>(
        r#"
        UPDATE quizzes SET
            title = $1, description = $2, time_limit_minutes = $3, attempts_allowed = $4,
            shuffle_questions = $5, show_results = $6, pass_percentage = $7, updated_at = NOW()
        WHERE id = $8
        RETURNING *
        "#,
    )
    .bind(&payload.metadata.title)
    .bind(&payload.metadata.description)
    .bind(payload.metadata.time_limit_minutes)
    .bind(payload.metadata.attempts_allowed)
    .bind(payload.metadata.shuffle_questions)
    .bind(payload.metadata.show_results)
    .bind(payload.metadata.pass_percentage)
    .bind(quiz_id)
    .fetch_one(&mut *tx)
    .await?;

    // Options cascade with their questions.
    sqlx::query("DELETE FROM questions WHERE quiz_id = $1")
        .bind(quiz_id)
        .execute(&mut *tx)
        .await?;

    insert_structure(&mut tx, quiz_id, &payload.questions).await?;

    tx.commit().await?;

    Ok(Json(updated))
}

async fn transition_status(
    pool: &PgPool,
    claims: &Claims,
    quiz_id: i64,
    target: QuizStatus,
) -> Result<Quiz, AppError> {
    let user_id = claims.user_id()?;
    let quiz = fetch_quiz(pool, quiz_id).await?;
    let classroom = fetch_classroom(pool, quiz.classroom_id).await?;
    if !can_manage(&classroom, claims, user_id) {
        return Err(AppError::Forbidden(
            "Only the classroom's teacher can change quiz status".to_string(),
        ));
    }

    let allowed = matches!(
        (quiz.status, target),
        (QuizStatus::Draft, QuizStatus::Published)
            | (QuizStatus::Draft, QuizStatus::Archived)
            | (QuizStatus::Published, QuizStatus::Archived)
    );
    if !allowed {
        return Err(AppError::Conflict(format!(
            "Cannot move quiz from {:?} to {:?}",
            quiz.status, target
        )));
    }

    let updated = sqlx::query_as::<_, Quiz>(
        "UPDATE quizzes SET status = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
    )
    .bind(target)
    .bind(quiz_id)
    .fetch_one(pool)
    .await?;

    tracing::info!("Quiz {} moved to {:?}", quiz_id, target);
    Ok(updated)
}

/// Makes a draft quiz visible and attemptable by enrolled students.
pub async fn publish_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = transition_status(&pool, &claims, quiz_id, QuizStatus::Published).await?;
    Ok(Json(quiz))
}

/// Retires a quiz. No new attempts can be started; terminal.
pub async fn archive_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = transition_status(&pool, &claims, quiz_id, QuizStatus::Archived).await?;
    Ok(Json(quiz))
}

/// The taking view: questions with options but never correctness flags.
///
/// For a shuffled quiz, the order fixed on the caller's open attempt wins;
/// without an open attempt the order is randomized per request.
pub async fn get_quiz_for_taking(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let quiz = fetch_quiz(&pool, quiz_id).await?;
    let classroom = fetch_classroom(&pool, quiz.classroom_id).await?;
    require_member(&pool, &classroom, &claims, user_id).await?;

    if quiz.status != QuizStatus::Published && !can_manage(&classroom, &claims, user_id) {
        return Err(AppError::QuizUnavailable(
            "Quiz is not published".to_string(),
        ));
    }

    let mut structure = fetch_quiz_structure(&pool, quiz_id).await?;

    if quiz.shuffle_questions {
        let stored_order: Option<sqlx::types::Json<Vec<i64>>> = sqlx::query_scalar(
            r#"
            SELECT question_order FROM quiz_attempts
            WHERE quiz_id = $1 AND user_id = $2 AND status = 'in_progress'
            "#,
        )
        .bind(quiz_id)
        .bind(user_id)
        .fetch_optional(&pool)
        .await?
        .flatten();

        match stored_order {
            Some(order) => structure = apply_question_order(structure, &order.0),
            None => structure.shuffle(&mut rand::thread_rng()),
        }
    }

    let view = QuizForTaking {
        id: quiz.id,
        title: quiz.title,
        description: quiz.description,
        time_limit_minutes: quiz.time_limit_minutes,
        attempts_allowed: quiz.attempts_allowed,
        pass_percentage: quiz.pass_percentage,
        questions: structure.iter().map(TakingQuestion::from_structure).collect(),
    };

    Ok(Json(view))
}

/// The grading view: same structure, with correctness flags and
/// explanations. Teacher/admin only.
pub async fn get_quiz_for_grading(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let quiz = fetch_quiz(&pool, quiz_id).await?;
    let classroom = fetch_classroom(&pool, quiz.classroom_id).await?;
    if !can_manage(&classroom, &claims, user_id) {
        return Err(AppError::Forbidden(
            "Only the classroom's teacher can see the answer key".to_string(),
        ));
    }

    let structure = fetch_quiz_structure(&pool, quiz_id).await?;

    Ok(Json(serde_json::json!({
        "quiz": quiz,
        "questions": structure,
    })))
}
