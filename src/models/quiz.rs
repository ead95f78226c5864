// src/models/quiz.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

use crate::config::MAX_ATTEMPTS_ALLOWED;
use crate::models::question::{QuestionKind, TakingQuestion};

/// Quiz lifecycle status, mapped to the Postgres 'quiz_status' enum.
/// `Draft` quizzes are invisible to students; `Archived` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "quiz_status", rename_all = "snake_case")]
pub enum QuizStatus {
    Draft,
    Published,
    Archived,
}

/// Represents the 'quizzes' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,
    pub classroom_id: i64,
    pub title: String,
    pub description: String,
    pub time_limit_minutes: Option<i32>,
    pub attempts_allowed: i32,
    pub shuffle_questions: bool,
    pub show_results: bool,
    pub pass_percentage: f64,
    pub status: QuizStatus,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Quiz {
    pub fn time_limit_seconds(&self) -> Option<i64> {
        self.time_limit_minutes.map(|m| i64::from(m) * 60)
    }
}

/// DTO for one option inside a quiz create/update payload.
/// Order is the position in the list.
#[derive(Debug, Clone, Deserialize)]
pub struct OptionInput {
    pub content: String,
    #[serde(default)]
    pub is_correct: bool,
}

/// DTO for one question inside a quiz create/update payload.
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionInput {
    pub content: String,
    pub question_type: QuestionKind,
    pub points: i32,
    pub explanation: Option<String>,
    #[serde(default)]
    pub options: Vec<OptionInput>,
}

/// Quiz settings shared by create and update payloads.
#[derive(Debug, Clone, Deserialize)]
pub struct QuizMetadata {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub time_limit_minutes: Option<i32>,
    pub attempts_allowed: i32,
    #[serde(default)]
    pub shuffle_questions: bool,
    #[serde(default = "default_show_results")]
    pub show_results: bool,
    pub pass_percentage: f64,
}

fn default_show_results() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CreateQuizRequest {
    pub classroom_id: i64,
    #[serde(flatten)]
    pub metadata: QuizMetadata,
    pub questions: Vec<QuestionInput>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuizRequest {
    #[serde(flatten)]
    pub metadata: QuizMetadata,
    pub questions: Vec<QuestionInput>,
}

/// DTO for the student-facing taking view. Question order is already
/// resolved (defined order, or the shuffle fixed on the attempt).
#[derive(Debug, Serialize)]
pub struct QuizForTaking {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub time_limit_minutes: Option<i32>,
    pub attempts_allowed: i32,
    pub pass_percentage: f64,
    pub questions: Vec<TakingQuestion>,
}

/// Validates quiz metadata and the full question structure, collecting
/// every violation rather than stopping at the first. Questions are
/// reported 1-based, matching what an author sees in the editor.
pub fn validate_quiz_structure(meta: &QuizMetadata, questions: &[QuestionInput]) -> Vec<String> {
    let mut violations = Vec::new();

    if meta.title.trim().is_empty() {
        violations.push("title: must not be empty".to_string());
    }
    if meta.attempts_allowed < 1 || meta.attempts_allowed > MAX_ATTEMPTS_ALLOWED {
        violations.push(format!(
            "attempts_allowed: must be between 1 and {}",
            MAX_ATTEMPTS_ALLOWED
        ));
    }
    if !(0.0..=100.0).contains(&meta.pass_percentage) {
        violations.push("pass_percentage: must be between 0 and 100".to_string());
    }
    if let Some(limit) = meta.time_limit_minutes {
        if limit < 1 {
            violations.push("time_limit_minutes: must be at least 1 when set".to_string());
        }
    }

    for (idx, q) in questions.iter().enumerate() {
        let n = idx + 1;
        if q.content.trim().is_empty() {
            violations.push(format!("question {}: text must not be empty", n));
        }
        if q.points <= 0 {
            violations.push(format!("question {}: points must be greater than 0", n));
        }
        match q.question_type {
            QuestionKind::MultipleChoice => {
                if q.options.len() < 2 {
                    violations.push(format!("question {}: needs at least 2 options", n));
                }
                if !q.options.iter().any(|o| o.is_correct) {
                    violations.push(format!(
                        "question {}: at least one option must be marked correct",
                        n
                    ));
                }
            }
            QuestionKind::TrueFalse => {
                if q.options.len() != 2 {
                    violations.push(format!("question {}: must have exactly 2 options", n));
                } else if q.options.iter().filter(|o| o.is_correct).count() != 1 {
                    violations.push(format!(
                        "question {}: exactly one side must be marked correct",
                        n
                    ));
                }
            }
            QuestionKind::ShortAnswer | QuestionKind::Essay => {
                if !q.options.is_empty() {
                    violations.push(format!("question {}: free-text questions take no options", n));
                }
            }
        }
        for (o_idx, opt) in q.options.iter().enumerate() {
            if opt.content.trim().is_empty() {
                violations.push(format!(
                    "question {}: option {} text must not be empty",
                    n,
                    o_idx + 1
                ));
            }
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> QuizMetadata {
        QuizMetadata {
            title: "Unit 3 checkpoint".to_string(),
            description: String::new(),
            time_limit_minutes: Some(20),
            attempts_allowed: 2,
            shuffle_questions: false,
            show_results: true,
            pass_percentage: 60.0,
        }
    }

    fn mc_question() -> QuestionInput {
        QuestionInput {
            content: "Pick the even numbers".to_string(),
            question_type: QuestionKind::MultipleChoice,
            points: 5,
            explanation: None,
            options: vec![
                OptionInput { content: "2".to_string(), is_correct: true },
                OptionInput { content: "3".to_string(), is_correct: false },
                OptionInput { content: "4".to_string(), is_correct: true },
            ],
        }
    }

    #[test]
    fn valid_structure_passes() {
        assert!(validate_quiz_structure(&meta(), &[mc_question()]).is_empty());
    }

    #[test]
    fn collects_every_violation_not_just_the_first() {
        let mut m = meta();
        m.title = "  ".to_string();
        m.attempts_allowed = 0;
        m.pass_percentage = 120.0;

        let mut q = mc_question();
        q.content = String::new();
        q.points = 0;
        q.options.truncate(1);
        q.options[0].is_correct = false;

        let violations = validate_quiz_structure(&m, &[q]);
        assert!(violations.len() >= 6, "got: {:?}", violations);
        assert!(violations.iter().any(|v| v.starts_with("title")));
        assert!(violations.iter().any(|v| v.contains("points")));
        assert!(violations.iter().any(|v| v.contains("at least 2 options")));
    }

    #[test]
    fn true_false_requires_exactly_one_correct_side() {
        let q = QuestionInput {
            content: "The sky is green".to_string(),
            question_type: QuestionKind::TrueFalse,
            points: 2,
            explanation: None,
            options: vec![
                OptionInput { content: "True".to_string(), is_correct: true },
                OptionInput { content: "False".to_string(), is_correct: true },
            ],
        };
        let violations = validate_quiz_structure(&meta(), &[q]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("exactly one side"));
    }

    #[test]
    fn free_text_questions_reject_options() {
        let q = QuestionInput {
            content: "Explain photosynthesis".to_string(),
            question_type: QuestionKind::Essay,
            points: 10,
            explanation: None,
            options: vec![OptionInput { content: "stray".to_string(), is_correct: false }],
        };
        let violations = validate_quiz_structure(&meta(), &[q]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("no options"));
    }

    #[test]
    fn zero_questions_is_structurally_valid() {
        // An empty quiz is allowed at authoring time; it simply scores 0%.
        assert!(validate_quiz_structure(&meta(), &[]).is_empty());
    }
}
