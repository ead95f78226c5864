// src/scoring.rs

//! Automatic scoring of a finalized attempt.
//!
//! Pure functions over the quiz structure and the submitted answers; the
//! attempt handler owns all persistence. Manually-graded question types
//! (short answer, essay) earn 0 here but still count toward the possible
//! total, so the percentage reflects them as ungraded.

use std::collections::BTreeSet;
use std::fmt;

use crate::models::attempt::{AnswerMap, AnswerValue};
use crate::models::question::{QuestionKind, QuestionWithOptions};

/// Result of scoring one answer set against a quiz's questions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreOutcome {
    pub earned: i32,
    pub possible: i32,
    pub percentage: f64,
}

impl ScoreOutcome {
    /// Pass/fail is derived, never stored.
    pub fn passes(&self, pass_percentage: f64) -> bool {
        self.percentage >= pass_percentage
    }
}

/// Malformed stored structure. These fail the whole submission; a silent
/// zero would be indistinguishable from a legitimately wrong answer.
#[derive(Debug, PartialEq, Eq)]
pub enum ScoringError {
    MissingOptions { question_id: i64 },
    NoCorrectOption { question_id: i64 },
    MalformedTrueFalse { question_id: i64 },
}

impl fmt::Display for ScoringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoringError::MissingOptions { question_id } => {
                write!(f, "question {} has no stored options", question_id)
            }
            ScoringError::NoCorrectOption { question_id } => {
                write!(f, "question {} has no option marked correct", question_id)
            }
            ScoringError::MalformedTrueFalse { question_id } => {
                write!(
                    f,
                    "true/false question {} must have exactly 2 options with exactly 1 correct",
                    question_id
                )
            }
        }
    }
}

impl std::error::Error for ScoringError {}

/// Scores every question of the quiz against the submitted answers.
///
/// Unanswered questions score 0 but contribute their points to the total.
/// A quiz with no questions scores 0%, never a division error.
pub fn score_answers(
    questions: &[QuestionWithOptions],
    answers: &AnswerMap,
) -> Result<ScoreOutcome, ScoringError> {
    let mut earned = 0;
    let mut possible = 0;

    for q in questions {
        possible += q.question.points;
        if answer_earns_credit(q, answers.get(&q.question.id))? {
            earned += q.question.points;
        }
    }

    let percentage = if possible > 0 {
        100.0 * f64::from(earned) / f64::from(possible)
    } else {
        0.0
    };

    Ok(ScoreOutcome { earned, possible, percentage })
}

/// Whether one answer earns its question's full points. Also used by the
/// review view to mark individual questions right or wrong.
pub fn answer_earns_credit(
    q: &QuestionWithOptions,
    answer: Option<&AnswerValue>,
) -> Result<bool, ScoringError> {
    match q.question.question_type {
        QuestionKind::MultipleChoice => score_multiple_choice(q, answer),
        QuestionKind::TrueFalse => score_true_false(q, answer),
        // Manually graded; the automatic path never awards these.
        QuestionKind::ShortAnswer | QuestionKind::Essay => Ok(false),
    }
}

/// All-or-nothing: credit only when the selected set equals the correct
/// set exactly. Subsets, supersets and stray ids all score 0.
fn score_multiple_choice(
    q: &QuestionWithOptions,
    answer: Option<&AnswerValue>,
) -> Result<bool, ScoringError> {
    if q.options.is_empty() {
        return Err(ScoringError::MissingOptions { question_id: q.question.id });
    }
    let correct: BTreeSet<i64> =
        q.options.iter().filter(|o| o.is_correct).map(|o| o.id).collect();
    if correct.is_empty() {
        return Err(ScoringError::NoCorrectOption { question_id: q.question.id });
    }

    let selected: BTreeSet<i64> = match answer {
        Some(AnswerValue::Selected(id)) => BTreeSet::from([*id]),
        Some(AnswerValue::SelectedMany(ids)) => ids.iter().copied().collect(),
        // No answer, or a free-text value on a choice question.
        Some(AnswerValue::Text(_)) | None => return Ok(false),
    };

    Ok(selected == correct)
}

fn score_true_false(
    q: &QuestionWithOptions,
    answer: Option<&AnswerValue>,
) -> Result<bool, ScoringError> {
    let correct_ids: Vec<i64> = q.options.iter().filter(|o| o.is_correct).map(|o| o.id).collect();
    if q.options.len() != 2 || correct_ids.len() != 1 {
        return Err(ScoringError::MalformedTrueFalse { question_id: q.question.id });
    }

    let selected = match answer {
        Some(AnswerValue::Selected(id)) => Some(*id),
        Some(AnswerValue::SelectedMany(ids)) if ids.len() == 1 => Some(ids[0]),
        _ => None,
    };

    Ok(selected == Some(correct_ids[0]))
}
