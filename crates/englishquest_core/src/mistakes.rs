//! crates/englishquest_core/src/mistakes.rs
//!
//! The mistake notebook: one entry per missed question, with a mastery flag the
//! learner sets during review.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Lesson, Question, WrongQuestionEntry};

/// Creates or refreshes the entry for a missed question.
///
/// A fresh miss on an entry that was already mastered clears `mastered` again,
/// since mastery should reflect current recall.
pub fn record_miss(
    existing: Option<&WrongQuestionEntry>,
    user_id: Uuid,
    lesson: &Lesson,
    question: &Question,
    submitted_answer: Option<String>,
    now: DateTime<Utc>,
) -> WrongQuestionEntry {
    match existing {
        Some(entry) => WrongQuestionEntry {
            submitted_answer,
            mastered: false,
            last_reviewed: Some(now),
            question_text: question.prompt.clone(),
            correct_answer: question.correct_option.clone(),
            ..entry.clone()
        },
        None => WrongQuestionEntry {
            id: Uuid::new_v4(),
            user_id,
            lesson_id: lesson.id,
            question_id: question.id,
            question_text: question.prompt.clone(),
            correct_answer: question.correct_option.clone(),
            submitted_answer,
            mastered: false,
            created_at: now,
            last_reviewed: None,
        },
    }
}

pub fn mark_mastered(entry: &WrongQuestionEntry, now: DateTime<Utc>) -> WrongQuestionEntry {
    WrongQuestionEntry {
        mastered: true,
        last_reviewed: Some(now),
        ..entry.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MasteryFilter {
    #[default]
    All,
    Mastered,
    Unmastered,
}

impl MasteryFilter {
    pub fn from_flag(mastered: Option<bool>) -> Self {
        match mastered {
            None => MasteryFilter::All,
            Some(true) => MasteryFilter::Mastered,
            Some(false) => MasteryFilter::Unmastered,
        }
    }

    pub fn matches(&self, entry: &WrongQuestionEntry) -> bool {
        match self {
            MasteryFilter::All => true,
            MasteryFilter::Mastered => entry.mastered,
            MasteryFilter::Unmastered => !entry.mastered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn lesson() -> Lesson {
        Lesson {
            id: 3,
            level_id: 1,
            title: "Greetings".into(),
            description: String::new(),
            order: 1,
            questions: vec![Question {
                id: 9,
                prompt: "How do you greet someone in the morning?".into(),
                options: vec!["Good morning".into(), "Good night".into()],
                correct_option: "Good morning".into(),
            }],
        }
    }

    #[test]
    fn first_miss_creates_an_unmastered_entry() {
        let lesson = lesson();
        let now = Utc::now();
        let user = Uuid::new_v4();
        let entry = record_miss(None, user, &lesson, &lesson.questions[0], Some("Good night".into()), now);

        assert_eq!(entry.user_id, user);
        assert_eq!((entry.lesson_id, entry.question_id), (3, 9));
        assert_eq!(entry.correct_answer, "Good morning");
        assert!(!entry.mastered);
        assert_eq!(entry.created_at, now);
        assert_eq!(entry.last_reviewed, None);
    }

    #[test]
    fn repeat_miss_updates_in_place_and_unmasters() {
        let lesson = lesson();
        let start = Utc::now();
        let user = Uuid::new_v4();
        let first = record_miss(None, user, &lesson, &lesson.questions[0], Some("Good night".into()), start);
        let mastered = mark_mastered(&first, start + Duration::hours(1));
        assert!(mastered.mastered);

        let later = start + Duration::days(1);
        let again = record_miss(Some(&mastered), user, &lesson, &lesson.questions[0], None, later);
        assert_eq!(again.id, first.id);
        assert_eq!(again.created_at, start);
        assert_eq!(again.submitted_answer, None);
        assert_eq!(again.last_reviewed, Some(later));
        assert!(!again.mastered);
    }

    #[test]
    fn filter_by_mastery() {
        let lesson = lesson();
        let entry = record_miss(None, Uuid::new_v4(), &lesson, &lesson.questions[0], None, Utc::now());
        let done = mark_mastered(&entry, Utc::now());

        assert!(MasteryFilter::All.matches(&entry));
        assert!(MasteryFilter::from_flag(Some(false)).matches(&entry));
        assert!(!MasteryFilter::from_flag(Some(false)).matches(&done));
        assert!(MasteryFilter::Mastered.matches(&done));
    }
}
