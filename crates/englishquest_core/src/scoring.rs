//! crates/englishquest_core/src/scoring.rs
//!
//! Turns a finished practice session into a score, the hearts it cost, and the
//! questions that were missed. Reads nothing but its inputs.

use crate::domain::{Question, QuestionId};
use crate::error::{EngineError, EngineResult};

/// A question answered incorrectly or left blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissedQuestion {
    pub question_id: QuestionId,
    pub submitted_answer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionScore {
    /// Percentage of correct answers, 0 to 100.
    pub score: u8,
    pub correct: u32,
    pub total: u32,
    pub hearts_lost: u32,
    pub missed: Vec<MissedQuestion>,
}

/// `round(100 * correct / total)` with halves rounded up. Zero questions score 0.
pub fn percentage(correct: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let correct = u64::from(correct.min(total));
    let total = u64::from(total);
    ((200 * correct + total) / (2 * total)) as u8
}

fn is_correct(question: &Question, answer: Option<&str>) -> bool {
    match answer {
        Some(answer) => {
            question.options.iter().any(|o| o == answer) && answer == question.correct_option
        }
        None => false,
    }
}

/// Scores `answers` against `questions`, position by position.
///
/// Fewer answers than questions is allowed: the unanswered tail counts as wrong.
/// More answers than questions is a validation error.
pub fn score_session(questions: &[Question], answers: &[Option<String>]) -> EngineResult<SessionScore> {
    if answers.len() > questions.len() {
        return Err(EngineError::Validation(format!(
            "received {} answers for {} questions",
            answers.len(),
            questions.len()
        )));
    }

    let mut correct = 0u32;
    let mut missed = Vec::new();
    for (index, question) in questions.iter().enumerate() {
        let answer = answers.get(index).and_then(|a| a.as_deref());
        if is_correct(question, answer) {
            correct += 1;
        } else {
            missed.push(MissedQuestion {
                question_id: question.id,
                submitted_answer: answer.map(str::to_owned),
            });
        }
    }

    let total = questions.len() as u32;
    Ok(SessionScore {
        score: percentage(correct, total),
        correct,
        total,
        hearts_lost: missed.len() as u32,
        missed,
    })
}
