// src/models/attempt.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};

/// Attempt status, mapped to the Postgres 'attempt_status' enum.
/// Everything except `InProgress` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "attempt_status", rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Submitted,
    AutoSubmitted,
    Expired,
}

impl AttemptStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttemptStatus::InProgress)
    }
}

/// One submitted answer value: a single option id, several option ids,
/// or free text. Stored verbatim in the attempt's answers map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Selected(i64),
    SelectedMany(Vec<i64>),
    Text(String),
}

/// Map from question id to the user's submitted value.
pub type AnswerMap = HashMap<i64, AnswerValue>;

/// Represents the 'quiz_attempts' table in the database.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Attempt {
    pub id: i64,
    pub quiz_id: i64,
    pub user_id: i64,

    /// 1-based, unique per (quiz, user).
    pub attempt_number: i32,

    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub time_spent_seconds: i32,
    pub score: i32,
    pub percentage: f64,
    pub status: AttemptStatus,

    /// Answers captured at submission time, verbatim.
    pub answers: Json<AnswerMap>,

    /// Question id order fixed when the attempt started. Present only
    /// for quizzes with shuffle_questions; a resumed attempt always sees
    /// the same order it started with.
    pub question_order: Option<Json<Vec<i64>>>,
}

/// DTO for submitting an attempt.
#[derive(Debug, Deserialize)]
pub struct SubmitAttemptRequest {
    pub answers: AnswerMap,
}

/// Seconds left on a timed attempt, `None` when the quiz is untimed.
/// Negative values mean the limit has already passed.
pub fn time_remaining_seconds(
    time_limit_seconds: Option<i64>,
    started_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<i64> {
    let limit = time_limit_seconds?;
    let elapsed = (now - started_at).num_seconds();
    Some(limit - elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn untimed_quiz_has_no_remaining_time() {
        let now = Utc::now();
        assert_eq!(time_remaining_seconds(None, now, now), None);
    }

    #[test]
    fn remaining_counts_down_from_the_limit() {
        let start = Utc::now();
        let now = start + Duration::seconds(90);
        assert_eq!(time_remaining_seconds(Some(600), start, now), Some(510));
    }

    #[test]
    fn past_the_limit_goes_negative() {
        let start = Utc::now();
        let now = start + Duration::seconds(700);
        assert_eq!(time_remaining_seconds(Some(600), start, now), Some(-100));
    }

    #[test]
    fn answer_values_deserialize_from_all_three_shapes() {
        let raw = r#"{"1": 42, "2": [3, 4], "3": "free text"}"#;
        let parsed: AnswerMap = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed[&1], AnswerValue::Selected(42));
        assert_eq!(parsed[&2], AnswerValue::SelectedMany(vec![3, 4]));
        assert_eq!(parsed[&3], AnswerValue::Text("free text".to_string()));
    }

    #[test]
    fn answer_map_round_trips_through_json() {
        let mut answers = AnswerMap::new();
        answers.insert(7, AnswerValue::SelectedMany(vec![10, 11]));
        answers.insert(8, AnswerValue::Text("essay body".to_string()));
        let encoded = serde_json::to_string(&answers).unwrap();
        let decoded: AnswerMap = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, answers);
    }
}
