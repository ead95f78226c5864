// src/handlers/classroom.rs

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::PgPool;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        classroom::{Classroom, CreateClassroomRequest},
        quiz::{Quiz, QuizStatus},
    },
    utils::jwt::Claims,
};

pub(crate) async fn fetch_classroom(pool: &PgPool, id: i64) -> Result<Classroom, AppError> {
    sqlx::query_as::<_, Classroom>(
        "SELECT id, teacher_id, name, description, created_at FROM classrooms WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Classroom not found".to_string()))
}

pub(crate) async fn is_enrolled(
    pool: &PgPool,
    classroom_id: i64,
    user_id: i64,
) -> Result<bool, AppError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM enrollments WHERE classroom_id = $1 AND user_id = $2",
    )
    .bind(classroom_id)
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

/// True when the caller may manage (author/edit/report on) the classroom's
/// quizzes: the owning teacher or an admin.
pub(crate) fn can_manage(classroom: &Classroom, claims: &Claims, user_id: i64) -> bool {
    claims.is_admin() || classroom.teacher_id == user_id
}

/// Classroom membership check shared by the quiz and attempt handlers:
/// enrolled student, owning teacher, or admin.
pub(crate) async fn require_member(
    pool: &PgPool,
    classroom: &Classroom,
    claims: &Claims,
    user_id: i64,
) -> Result<(), AppError> {
    if can_manage(classroom, claims, user_id) || is_enrolled(pool, classroom.id, user_id).await? {
        return Ok(());
    }
    Err(AppError::Forbidden(
        "Not enrolled in this classroom".to_string(),
    ))
}

/// Creates a classroom owned by the calling teacher.
pub async fn create_classroom(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateClassroomRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    if !claims.is_teacher() && !claims.is_admin() {
        return Err(AppError::Forbidden(
            "Only teachers can create classrooms".to_string(),
        ));
    }

    let teacher_id = claims.user_id()?;
    let classroom = sqlx::query_as::<_, Classroom>(
        r#"
        INSERT INTO classrooms (teacher_id, name, description)
        VALUES ($1, $2, $3)
        RETURNING id, teacher_id, name, description, created_at
        "#,
    )
    .bind(teacher_id)
    .bind(&payload.name)
    .bind(payload.description.as_deref().unwrap_or(""))
    .fetch_one(&pool)
    .await?;

    Ok((StatusCode::CREATED, Json(classroom)))
}

/// Enrolls the calling user into a classroom.
pub async fn enroll(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(classroom_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let classroom = fetch_classroom(&pool, classroom_id).await?;

    if classroom.teacher_id == user_id {
        return Err(AppError::Conflict(
            "Teachers do not enroll in their own classroom".to_string(),
        ));
    }

    sqlx::query("INSERT INTO enrollments (classroom_id, user_id) VALUES ($1, $2)")
        .bind(classroom_id)
        .bind(user_id)
        .execute(&pool)
        .await
        .map_err(|e| {
            if e.as_database_error().is_some_and(|d| d.is_unique_violation()) {
                AppError::Conflict("Already enrolled".to_string())
            } else {
                AppError::from(e)
            }
        })?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "classroom_id": classroom_id, "user_id": user_id })),
    ))
}

/// Lists a classroom's quizzes as visible to the caller.
/// Students only see published quizzes; the owner and admins see all.
pub async fn list_quizzes(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(classroom_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let classroom = fetch_classroom(&pool, classroom_id).await?;
    require_member(&pool, &classroom, &claims, user_id).await?;

    let quizzes = if can_manage(&classroom, &claims, user_id) {
        sqlx::query_as::<_, Quiz>(
            "SELECT * FROM quizzes WHERE classroom_id = $1 ORDER BY created_at DESC",
        )
        .bind(classroom_id)
        .fetch_all(&pool)
        .await?
    } else {
        sqlx::query_as::<_, Quiz>(
            "SELECT * FROM quizzes WHERE classroom_id = $1 AND status = $2 ORDER BY created_at DESC",
        )
        .bind(classroom_id)
        .bind(QuizStatus::Published)
        .fetch_all(&pool)
        .await?
    };

    Ok(Json(quizzes))
}
