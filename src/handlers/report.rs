// src/handlers/report.rs

use axum::{
    Json,
    extract::{Extension, Path, State},
    response::IntoResponse,
};
use serde::Serialize;
use sqlx::PgPool;
use sqlx::prelude::FromRow;

use crate::{
    error::AppError,
    handlers::{
        classroom::{can_manage, fetch_classroom},
        quiz::fetch_quiz,
    },
    models::attempt::AttemptStatus,
    utils::jwt::Claims,
};

/// One terminal attempt in the teacher's report, joined with its student.
#[derive(Debug, FromRow)]
struct ReportRow {
    attempt_id: i64,
    user_id: i64,
    username: String,
    display_name: String,
    attempt_number: i32,
    status: AttemptStatus,
    score: i32,
    percentage: f64,
    time_spent_seconds: i32,
    submitted_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Serialize)]
struct ReportEntry {
    attempt_id: i64,
    user_id: i64,
    username: String,
    display_name: String,
    attempt_number: i32,
    status: AttemptStatus,
    score: i32,
    percentage: f64,
    passed: bool,
    time_spent_seconds: i32,
    submitted_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// An enrolled student who never started the quiz.
#[derive(Debug, FromRow, Serialize)]
struct NotAttempted {
    user_id: i64,
    username: String,
    display_name: String,
}

#[derive(Debug, Serialize)]
struct ReportStats {
    attempt_count: usize,
    average_percentage: f64,
    pass_rate: f64,
    min_percentage: Option<f64>,
    max_percentage: Option<f64>,
}

/// Class-wide statistics over the terminal attempts. Defined (as zeros /
/// absent bounds) when there are no attempts at all.
fn aggregate(entries: &[ReportEntry]) -> ReportStats {
    if entries.is_empty() {
        return ReportStats {
            attempt_count: 0,
            average_percentage: 0.0,
            pass_rate: 0.0,
            min_percentage: None,
            max_percentage: None,
        };
    }

    let count = entries.len();
    let sum: f64 = entries.iter().map(|e| e.percentage).sum();
    let passed = entries.iter().filter(|e| e.passed).count();
    let min = entries.iter().map(|e| e.percentage).fold(f64::INFINITY, f64::min);
    let max = entries.iter().map(|e| e.percentage).fold(f64::NEG_INFINITY, f64::max);

    ReportStats {
        attempt_count: count,
        average_percentage: sum / count as f64,
        pass_rate: passed as f64 / count as f64,
        min_percentage: Some(min),
        max_percentage: Some(max),
    }
}

/// The teacher/admin view of a quiz's results: every terminal attempt,
/// the enrolled students who never attempted, and aggregate statistics.
/// Read-only; in-progress attempts are excluded.
pub async fn get_quiz_report(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let quiz = fetch_quiz(&pool, quiz_id).await?;
    let classroom = fetch_classroom(&pool, quiz.classroom_id).await?;
    if !can_manage(&classroom, &claims, user_id) {
        return Err(AppError::Forbidden(
            "Only the classroom's teacher can see the report".to_string(),
        ));
    }

    let rows = sqlx::query_as::<_, ReportRow>(
        r#"
        SELECT
            a.id AS attempt_id,
            a.user_id,
            u.username,
            u.display_name,
            a.attempt_number,
            a.status,
            a.score,
            a.percentage,
            a.time_spent_seconds,
            a.submitted_at
        FROM quiz_attempts a
        JOIN users u ON u.id = a.user_id
        WHERE a.quiz_id = $1 AND a.status <> 'in_progress'
        ORDER BY u.display_name, a.attempt_number
        "#,
    )
    .bind(quiz_id)
    .fetch_all(&pool)
    .await?;

    let entries: Vec<ReportEntry> = rows
        .into_iter()
        .map(|r| ReportEntry {
            attempt_id: r.attempt_id,
            user_id: r.user_id,
            username: r.username,
            display_name: r.display_name,
            attempt_number: r.attempt_number,
            status: r.status,
            score: r.score,
            percentage: r.percentage,
            passed: r.percentage >= quiz.pass_percentage,
            time_spent_seconds: r.time_spent_seconds,
            submitted_at: r.submitted_at,
        })
        .collect();

    // "Not attempted" counts any attempt of any status, including abandoned
    // in-progress ones.
    let not_attempted = sqlx::query_as::<_, NotAttempted>(
        r#"
        SELECT u.id AS user_id, u.username, u.display_name
        FROM enrollments e
        JOIN users u ON u.id = e.user_id
        WHERE e.classroom_id = $1
          AND NOT EXISTS (
              SELECT 1 FROM quiz_attempts a
              WHERE a.quiz_id = $2 AND a.user_id = u.id
          )
        ORDER BY u.display_name
        "#,
    )
    .bind(classroom.id)
    .bind(quiz_id)
    .fetch_all(&pool)
    .await?;

    let stats = aggregate(&entries);

    Ok(Json(serde_json::json!({
        "quiz_id": quiz.id,
        "title": quiz.title,
        "pass_percentage": quiz.pass_percentage,
        "attempts": entries,
        "not_attempted": not_attempted,
        "stats": stats,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(percentage: f64, passed: bool) -> ReportEntry {
        ReportEntry {
            attempt_id: 1,
            user_id: 1,
            username: "s".to_string(),
            display_name: "S".to_string(),
            attempt_number: 1,
            status: AttemptStatus::Submitted,
            score: 0,
            percentage,
            passed,
            time_spent_seconds: 60,
            submitted_at: None,
        }
    }

    #[test]
    fn aggregates_are_zero_safe_with_no_attempts() {
        let stats = aggregate(&[]);
        assert_eq!(stats.attempt_count, 0);
        assert_eq!(stats.average_percentage, 0.0);
        assert_eq!(stats.pass_rate, 0.0);
        assert_eq!(stats.min_percentage, None);
        assert_eq!(stats.max_percentage, None);
    }

    #[test]
    fn aggregates_compute_average_passrate_and_bounds() {
        let entries =
            vec![entry(100.0, true), entry(50.0, false), entry(75.0, true), entry(25.0, false)];
        let stats = aggregate(&entries);
        assert_eq!(stats.attempt_count, 4);
        assert_eq!(stats.average_percentage, 62.5);
        assert_eq!(stats.pass_rate, 0.5);
        assert_eq!(stats.min_percentage, Some(25.0));
        assert_eq!(stats.max_percentage, Some(100.0));
    }
}
