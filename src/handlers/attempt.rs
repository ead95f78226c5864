// src/handlers/attempt.rs

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use rand::seq::SliceRandom;
use serde::Serialize;
use sqlx::{PgPool, types::Json as SqlJson};

use crate::{
    config::LATE_SUBMIT_GRACE_SECONDS,
    error::AppError,
    handlers::{
        classroom::{can_manage, fetch_classroom, require_member},
        quiz::{apply_question_order, fetch_quiz, fetch_quiz_structure},
    },
    models::{
        attempt::{
            AnswerValue, Attempt, AttemptStatus, SubmitAttemptRequest, time_remaining_seconds,
        },
        quiz::{Quiz, QuizStatus},
    },
    scoring,
    utils::jwt::Claims,
};

async fn fetch_attempt(pool: &PgPool, id: i64) -> Result<Attempt, AppError> {
    sqlx::query_as::<_, Attempt>("SELECT * FROM quiz_attempts WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Attempt not found".to_string()))
}

async fn fetch_open_attempt(
    pool: &PgPool,
    quiz_id: i64,
    user_id: i64,
) -> Result<Option<Attempt>, AppError> {
    let attempt = sqlx::query_as::<_, Attempt>(
        "SELECT * FROM quiz_attempts WHERE quiz_id = $1 AND user_id = $2 AND status = 'in_progress'",
    )
    .bind(quiz_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(attempt)
}

fn attempt_response(attempt: &Attempt, quiz: &Quiz) -> serde_json::Value {
    let remaining =
        time_remaining_seconds(quiz.time_limit_seconds(), attempt.started_at, Utc::now());
    serde_json::json!({
        "attempt": attempt,
        "time_remaining_seconds": remaining,
    })
}

/// Starts (or resumes) the caller's attempt at a quiz.
///
/// Resume is idempotent: an existing open attempt is returned as-is. The
/// one-open-attempt invariant is enforced by a partial unique index, so a
/// double-submitted start degrades to a re-fetch instead of a duplicate row.
pub async fn start_attempt(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let quiz = fetch_quiz(&pool, quiz_id).await?;
    let classroom = fetch_classroom(&pool, quiz.classroom_id).await?;
    require_member(&pool, &classroom, &claims, user_id).await?;

    if quiz.status != QuizStatus::Published {
        return Err(AppError::QuizUnavailable(
            "Quiz is not open for attempts".to_string(),
        ));
    }

    if let Some(open) = fetch_open_attempt(&pool, quiz_id, user_id).await? {
        return Ok((StatusCode::OK, Json(attempt_response(&open, &quiz))));
    }

    let completed: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM quiz_attempts
         WHERE quiz_id = $1 AND user_id = $2 AND status <> 'in_progress'",
    )
    .bind(quiz_id)
    .bind(user_id)
    .fetch_one(&pool)
    .await?;

    if completed >= i64::from(quiz.attempts_allowed) {
        return Err(AppError::AttemptsExhausted(format!(
            "All {} allowed attempts are used",
            quiz.attempts_allowed
        )));
    }

    // Share-lock the quiz row so the order snapshot and the insert serialize
    // against a concurrent edit, which takes the same row FOR UPDATE before
    // replacing questions.
    let mut tx = pool.begin().await?;
    sqlx::query("SELECT id FROM quizzes WHERE id = $1 FOR SHARE")
        .bind(quiz_id)
        .execute(&mut *tx)
        .await?;

    // Fix the shuffled order now so a resumed attempt sees the same one.
    let question_order: Option<SqlJson<Vec<i64>>> = if quiz.shuffle_questions {
        let mut ids: Vec<i64> =
            sqlx::query_scalar("SELECT id FROM questions WHERE quiz_id = $1 ORDER BY position")
                .bind(quiz_id)
                .fetch_all(&mut *tx)
                .await?;
        ids.shuffle(&mut rand::thread_rng());
        Some(SqlJson(ids))
    } else {
        None
    };

    let inserted = sqlx::query_as::<_, Attempt>(
        r#"
        INSERT INTO quiz_attempts (quiz_id, user_id, attempt_number, question_order)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(quiz_id)
    .bind(user_id)
    .bind(completed as i32 + 1)
    .bind(&question_order)
    .fetch_one(&mut *tx)
    .await;

    let attempt = match inserted {
        Ok(attempt) => {
            tx.commit().await?;
            tracing::info!(
                "User {} started attempt {} on quiz {}",
                user_id,
                attempt.attempt_number,
                quiz_id
            );
            attempt
        }
        Err(e) if e.as_database_error().is_some_and(|d| d.is_unique_violation()) => {
            // Lost the race against a concurrent start from the same user.
            // Self-heal by returning the row that won.
            drop(tx);
            fetch_open_attempt(&pool, quiz_id, user_id).await?.ok_or(AppError::Conflict(
                "Attempt creation conflicted; please retry".to_string(),
            ))?
        }
        Err(e) => return Err(e.into()),
    };

    Ok((StatusCode::CREATED, Json(attempt_response(&attempt, &quiz))))
}

/// Finalizes an attempt: scores it and persists score, percentage, elapsed
/// time, answers and terminal status in one update.
///
/// Elapsed time is recomputed server-side; client timers are not trusted.
/// Past the limit but within the grace window the attempt is stored as
/// `auto_submitted`; past the grace window it is stored as `expired` with
/// score 0, answers kept verbatim for audit.
pub async fn submit_attempt(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
    Json(payload): Json<SubmitAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let attempt = fetch_attempt(&pool, attempt_id).await?;

    if attempt.user_id != user_id {
        return Err(AppError::Forbidden(
            "Only the attempt's owner can submit it".to_string(),
        ));
    }
    if attempt.status.is_terminal() {
        return Err(AppError::AlreadyTerminal(
            "Attempt was already submitted".to_string(),
        ));
    }

    let quiz = fetch_quiz(&pool, attempt.quiz_id).await?;
    let structure = fetch_quiz_structure(&pool, attempt.quiz_id).await?;

    let now = Utc::now();
    let elapsed = (now - attempt.started_at).num_seconds();

    let total_possible: i32 = structure.iter().map(|q| q.question.points).sum();
    let status = resolve_submission_status(quiz.time_limit_seconds(), elapsed);
    let outcome = if status == AttemptStatus::Expired {
        scoring::ScoreOutcome { earned: 0, possible: total_possible, percentage: 0.0 }
    } else {
        scoring::score_answers(&structure, &payload.answers).map_err(scoring_failure)?
    };

    // All result fields and the status flip together or not at all; the
    // status guard also closes the double-submit race.
    let finalized = sqlx::query_as::<_, Attempt>(
        r#"
        UPDATE quiz_attempts SET
            submitted_at = $1,
            time_spent_seconds = $2,
            score = $3,
            percentage = $4,
            status = $5,
            answers = $6
        WHERE id = $7 AND status = 'in_progress'
        RETURNING *
        "#,
    )
    .bind(now)
    .bind(elapsed.max(0) as i32)
    .bind(outcome.earned)
    .bind(outcome.percentage)
    .bind(status)
    .bind(SqlJson(&payload.answers))
    .bind(attempt_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::AlreadyTerminal(
        "Attempt was already submitted".to_string(),
    ))?;

    // Fire-and-forget notification; a logging failure never fails the submit.
    let log_result = sqlx::query(
        "INSERT INTO activity_log (user_id, action, detail) VALUES ($1, 'quiz_completed', $2)",
    )
    .bind(user_id)
    .bind(serde_json::json!({
        "quiz_id": quiz.id,
        "attempt_id": finalized.id,
        "percentage": finalized.percentage,
    }))
    .execute(&pool)
    .await;
    if let Err(e) = log_result {
        tracing::warn!("Failed to append quiz_completed activity: {:?}", e);
    }

    Ok(Json(serde_json::json!({
        "attempt_id": finalized.id,
        "attempt_number": finalized.attempt_number,
        "status": finalized.status,
        "score": finalized.score,
        "possible": outcome.possible,
        "percentage": finalized.percentage,
        "passed": finalized.percentage >= quiz.pass_percentage,
        "time_spent_seconds": finalized.time_spent_seconds,
    })))
}

/// Picks the terminal status from server-side elapsed time: on time is a
/// normal submit, within the grace window it still scores but is marked
/// auto-submitted, past the grace window the attempt expires unscored.
fn resolve_submission_status(time_limit_seconds: Option<i64>, elapsed: i64) -> AttemptStatus {
    match time_limit_seconds {
        Some(limit) if elapsed > limit + LATE_SUBMIT_GRACE_SECONDS => AttemptStatus::Expired,
        Some(limit) if elapsed > limit => AttemptStatus::AutoSubmitted,
        _ => AttemptStatus::Submitted,
    }
}

fn scoring_failure(e: scoring::ScoringError) -> AppError {
    // Corrupt structure must fail loudly; a silent zero would be
    // indistinguishable from a wrong answer.
    AppError::InternalServerError(format!("Stored quiz structure is invalid: {}", e))
}

#[derive(Debug, Serialize)]
struct ReviewOption {
    id: i64,
    content: String,
    is_correct: bool,
    selected: bool,
}

#[derive(Debug, Serialize)]
struct ReviewQuestion {
    id: i64,
    question_type: crate::models::question::QuestionKind,
    content: String,
    points: i32,
    earned: i32,
    explanation: Option<String>,
    options: Vec<ReviewOption>,
    submitted_text: Option<String>,
}

/// Reconstructs a terminal attempt for review: the questions in the order
/// the attempt saw them, with the user's selections marked against the key.
pub async fn get_attempt_review(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let attempt = fetch_attempt(&pool, attempt_id).await?;
    let quiz = fetch_quiz(&pool, attempt.quiz_id).await?;
    let classroom = fetch_classroom(&pool, quiz.classroom_id).await?;

    let is_owner = attempt.user_id == user_id;
    let is_staff = can_manage(&classroom, &claims, user_id);
    if !is_owner && !is_staff {
        return Err(AppError::Forbidden(
            "Not allowed to view this attempt".to_string(),
        ));
    }
    if !attempt.status.is_terminal() {
        return Err(AppError::Conflict(
            "Attempt is still in progress".to_string(),
        ));
    }
    if is_owner && !is_staff && !quiz.show_results {
        return Err(AppError::Forbidden(
            "Results are hidden for this quiz".to_string(),
        ));
    }

    let mut structure = fetch_quiz_structure(&pool, attempt.quiz_id).await?;
    if let Some(order) = &attempt.question_order {
        structure = apply_question_order(structure, &order.0);
    }

    let answers = &attempt.answers.0;
    let mut questions = Vec::with_capacity(structure.len());
    for q in &structure {
        let answer = answers.get(&q.question.id);

        let selected_ids: Vec<i64> = match answer {
            Some(AnswerValue::Selected(id)) => vec![*id],
            Some(AnswerValue::SelectedMany(ids)) => ids.clone(),
            _ => Vec::new(),
        };
        let submitted_text = match answer {
            Some(AnswerValue::Text(text)) => Some(text.clone()),
            _ => None,
        };

        // An expired attempt was persisted with score 0, so the per-question
        // breakdown shows 0 too rather than what the answers would have earned.
        let earned = if attempt.status != AttemptStatus::Expired
            && q.question.question_type.is_auto_scored()
            && scoring::answer_earns_credit(q, answer).map_err(scoring_failure)?
        {
            q.question.points
        } else {
            0
        };

        questions.push(ReviewQuestion {
            id: q.question.id,
            question_type: q.question.question_type,
            content: q.question.content.clone(),
            points: q.question.points,
            earned,
            explanation: q.question.explanation.clone(),
            options: q
                .options
                .iter()
                .map(|o| ReviewOption {
                    id: o.id,
                    content: o.content.clone(),
                    is_correct: o.is_correct,
                    selected: selected_ids.contains(&o.id),
                })
                .collect(),
            submitted_text,
        });
    }

    Ok(Json(serde_json::json!({
        "attempt": attempt,
        "passed": attempt.percentage >= quiz.pass_percentage,
        "questions": questions,
    })))
}

/// Lists the caller's own attempts at a quiz, newest first.
pub async fn list_my_attempts(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let quiz = fetch_quiz(&pool, quiz_id).await?;
    let classroom = fetch_classroom(&pool, quiz.classroom_id).await?;
    require_member(&pool, &classroom, &claims, user_id).await?;

    let attempts = sqlx::query_as::<_, Attempt>(
        "SELECT * FROM quiz_attempts WHERE quiz_id = $1 AND user_id = $2
         ORDER BY attempt_number DESC",
    )
    .bind(quiz_id)
    .bind(user_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(attempts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untimed_quiz_always_submits_normally() {
        assert_eq!(resolve_submission_status(None, 0), AttemptStatus::Submitted);
        assert_eq!(
            resolve_submission_status(None, 1_000_000),
            AttemptStatus::Submitted
        );
    }

    #[test]
    fn on_time_submission_is_normal() {
        assert_eq!(
            resolve_submission_status(Some(600), 599),
            AttemptStatus::Submitted
        );
        // Exactly at the limit still counts as on time.
        assert_eq!(
            resolve_submission_status(Some(600), 600),
            AttemptStatus::Submitted
        );
    }

    #[test]
    fn late_within_grace_is_auto_submitted() {
        assert_eq!(
            resolve_submission_status(Some(600), 601),
            AttemptStatus::AutoSubmitted
        );
        // The last second of the grace window still scores.
        assert_eq!(
            resolve_submission_status(Some(600), 600 + LATE_SUBMIT_GRACE_SECONDS),
            AttemptStatus::AutoSubmitted
        );
    }

    #[test]
    fn past_grace_window_expires() {
        assert_eq!(
            resolve_submission_status(Some(600), 600 + LATE_SUBMIT_GRACE_SECONDS + 1),
            AttemptStatus::Expired
        );
    }
}
