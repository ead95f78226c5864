// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

/// Question type, mapped to the Postgres 'question_kind' enum.
///
/// `MultipleChoice` and `TrueFalse` are auto-scored; `ShortAnswer` and
/// `Essay` always earn 0 automatically and wait for a human grading pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "question_kind", rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
    Essay,
}

impl QuestionKind {
    pub fn is_auto_scored(&self) -> bool {
        matches!(self, QuestionKind::MultipleChoice | QuestionKind::TrueFalse)
    }
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub quiz_id: i64,

    /// The text content of the question.
    pub content: String,

    pub question_type: QuestionKind,

    /// Point value; always > 0 and always counted toward the total,
    /// even for manually-graded types.
    pub points: i32,

    /// Presentation order within the quiz.
    pub position: i32,

    /// Explanation shown in the review view.
    pub explanation: Option<String>,
}

/// Represents the 'question_options' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AnswerOption {
    pub id: i64,
    pub question_id: i64,
    pub content: String,
    pub is_correct: bool,
    pub position: i32,
}

/// A question together with its ordered options, as the scoring engine
/// and the quiz views consume it.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionWithOptions {
    #[serde(flatten)]
    pub question: Question,
    pub options: Vec<AnswerOption>,
}

/// DTO for a question as shown to a student taking the quiz.
/// Correctness flags and explanations are never included here.
#[derive(Debug, Serialize)]
pub struct TakingQuestion {
    pub id: i64,
    pub question_type: QuestionKind,
    pub content: String,
    pub points: i32,
    pub options: Vec<TakingOption>,
}

#[derive(Debug, Serialize)]
pub struct TakingOption {
    pub id: i64,
    pub content: String,
}

impl TakingQuestion {
    pub fn from_structure(q: &QuestionWithOptions) -> Self {
        Self {
            id: q.question.id,
            question_type: q.question.question_type,
            content: q.question.content.clone(),
            points: q.question.points,
            options: q
                .options
                .iter()
                .map(|o| TakingOption {
                    id: o.id,
                    content: o.content.clone(),
                })
                .collect(),
        }
    }
}
