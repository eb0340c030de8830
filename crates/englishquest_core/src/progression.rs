//! crates/englishquest_core/src/progression.rs
//!
//! Validates a submitted session result and computes everything it changes:
//! the lesson's progress record, hearts, experience, level, coins, streak and
//! the mistake notebook. The result is a single `AccountWrite` that the store
//! commits atomically.

use std::collections::HashSet;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use uuid::Uuid;

use crate::domain::{
    Lesson, LessonId, LessonStatus, PracticeSession, ProgressRecord, User, WrongQuestionEntry,
};
use crate::economy::{self, LevelCurve, RewardPolicy};
use crate::error::{EngineError, EngineResult};
use crate::mistakes;
use crate::ports::AccountWrite;
use crate::scoring::{MissedQuestion, SessionScore};

pub const DEFAULT_PASSING_SCORE: u8 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressionPolicy {
    pub passing_score: u8,
    pub level_curve: LevelCurve,
    pub rewards: RewardPolicy,
    /// Offset from UTC that defines a learner's calendar day for streaks.
    pub day_offset: FixedOffset,
}

impl Default for ProgressionPolicy {
    fn default() -> Self {
        Self {
            passing_score: DEFAULT_PASSING_SCORE,
            level_curve: LevelCurve::default(),
            rewards: RewardPolicy::default(),
            day_offset: Utc.fix(),
        }
    }
}

//=========================================================================================
// Received -> Validated
//=========================================================================================

/// A session result as it arrives, before any checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSubmission {
    pub lesson_id: LessonId,
    pub score: i64,
    pub hearts_lost: i64,
    pub missed: Vec<MissedQuestion>,
    /// The practice session this result closes.
    pub session_id: Uuid,
}

impl SessionSubmission {
    pub fn from_score(lesson_id: LessonId, score: &SessionScore, session_id: Uuid) -> Self {
        Self {
            lesson_id,
            score: i64::from(score.score),
            hearts_lost: i64::from(score.hearts_lost),
            missed: score.missed.clone(),
            session_id,
        }
    }
}

/// A submission that passed every check and may be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSubmission {
    lesson_id: LessonId,
    score: u8,
    hearts_lost: u32,
    missed: Vec<MissedQuestion>,
    session: PracticeSession,
}

impl ValidatedSubmission {
    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }

    pub fn score(&self) -> u8 {
        self.score
    }

    pub fn hearts_lost(&self) -> u32 {
        self.hearts_lost
    }

    pub fn session_id(&self) -> Uuid {
        self.session.session_id
    }
}

/// Checks a raw submission against the lesson, its current unlock status and
/// the practice session it claims to close.
pub fn validate(
    submission: SessionSubmission,
    lesson: &Lesson,
    status: LessonStatus,
    session: &PracticeSession,
) -> EngineResult<ValidatedSubmission> {
    if submission.lesson_id != lesson.id {
        return Err(EngineError::Validation(format!(
            "submission is for lesson {} but was checked against lesson {}",
            submission.lesson_id, lesson.id
        )));
    }
    if submission.session_id != session.session_id {
        return Err(EngineError::Validation(format!(
            "submission names session {} but was checked against session {}",
            submission.session_id, session.session_id
        )));
    }
    if session.lesson_id != lesson.id {
        return Err(EngineError::AccessDenied(format!(
            "session {} was started for lesson {}, not lesson {}",
            session.session_id, session.lesson_id, lesson.id
        )));
    }
    if !session.is_open() {
        return Err(EngineError::AlreadyApplied(session.session_id));
    }
    if status == LessonStatus::Locked {
        return Err(EngineError::AccessDenied(format!("lesson {} is locked", lesson.id)));
    }
    if !(0..=100).contains(&submission.score) {
        return Err(EngineError::Validation(format!(
            "score {} is outside 0..=100",
            submission.score
        )));
    }
    let question_count = lesson.questions.len() as i64;
    if submission.hearts_lost < 0 || submission.hearts_lost > question_count {
        return Err(EngineError::Validation(format!(
            "hearts lost {} is outside 0..={}",
            submission.hearts_lost, question_count
        )));
    }

    let mut seen = HashSet::new();
    for missed in &submission.missed {
        if lesson.question(missed.question_id).is_none() {
            return Err(EngineError::Validation(format!(
                "question {} is not part of lesson {}",
                missed.question_id, lesson.id
            )));
        }
        if !seen.insert(missed.question_id) {
            return Err(EngineError::Validation(format!(
                "question {} is reported missed more than once",
                missed.question_id
            )));
        }
    }

    Ok(ValidatedSubmission {
        lesson_id: submission.lesson_id,
        score: submission.score as u8,
        hearts_lost: submission.hearts_lost as u32,
        missed: submission.missed,
        session: session.clone(),
    })
}

//=========================================================================================
// Validated -> Applied
//=========================================================================================

/// What a session did to the learner, reported back with the new snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub lesson_id: LessonId,
    pub score: u8,
    pub passed: bool,
    /// True only when this session flipped the lesson to completed.
    pub newly_completed: bool,
    pub hearts_lost: u32,
    pub experience_gained: u64,
    pub boost_applied: bool,
    pub levels_gained: u32,
    pub coins_gained: u64,
    pub streak_count: u32,
}

#[derive(Debug, Clone)]
pub struct AppliedSession {
    pub write: AccountWrite,
    /// The lesson's progress record as written.
    pub progress: ProgressRecord,
    pub outcome: SessionOutcome,
}

/// Computes the complete effect of a validated session on `user`.
///
/// `existing_mistakes` is the learner's current notebook; entries for missed
/// questions are updated in place rather than duplicated.
pub fn apply(
    user: &User,
    existing_progress: Option<&ProgressRecord>,
    existing_mistakes: &[WrongQuestionEntry],
    lesson: &Lesson,
    submission: &ValidatedSubmission,
    policy: &ProgressionPolicy,
    now: DateTime<Utc>,
) -> AppliedSession {
    let score = submission.score;
    let passed = score >= policy.passing_score;

    // 1. Progress record. Completion is sticky and the best score only rises.
    let was_completed = existing_progress.map(|p| p.completed).unwrap_or(false);
    let progress = ProgressRecord {
        user_id: user.user_id,
        lesson_id: lesson.id,
        completed: was_completed || passed,
        best_score: existing_progress.map(|p| p.best_score.max(score)).unwrap_or(score),
        attempts: existing_progress.map(|p| p.attempts.saturating_add(1)).unwrap_or(1),
        last_attempted_at: now,
    };

    let mut next = user.clone();

    // 2. Hearts. Running out mid-session does not undo the session.
    next.hearts = economy::deduct_hearts(user.hearts, submission.hearts_lost);

    // 3. Experience, with the boost judged once at award time.
    let boost_applied = economy::boost_active(user.boost_expires_at, now);
    let experience_gained = economy::experience_award(
        u64::from(score),
        user.boost_expires_at,
        user.boost_multiplier,
        now,
    );
    next.experience = user.experience.saturating_add(experience_gained);

    // 4. Level, plus the coin rewards that depend on it.
    next.level = economy::next_level(user.level, &policy.level_curve, next.experience);
    let levels_gained = next.level - user.level;
    let coins_gained = policy.rewards.session_coins(score, levels_gained);
    next.coins = economy::grant_coins(user.coins, coins_gained);

    // 5. Streak.
    let today = economy::calendar_day(now, policy.day_offset);
    next.streak_count = economy::next_streak(user.streak_count, user.last_active_on, today);
    next.last_active_on = Some(today);

    // 6. Mistake notebook.
    let mistakes = submission
        .missed
        .iter()
        .filter_map(|missed| {
            let question = lesson.question(missed.question_id)?;
            let existing = existing_mistakes
                .iter()
                .find(|e| e.lesson_id == lesson.id && e.question_id == question.id);
            Some(mistakes::record_miss(
                existing,
                user.user_id,
                lesson,
                question,
                missed.submitted_answer.clone(),
                now,
            ))
        })
        .collect();

    let outcome = SessionOutcome {
        lesson_id: lesson.id,
        score,
        passed,
        newly_completed: progress.completed && !was_completed,
        hearts_lost: submission.hearts_lost,
        experience_gained,
        boost_applied,
        levels_gained,
        coins_gained,
        streak_count: next.streak_count,
    };

    AppliedSession {
        write: AccountWrite {
            user: next,
            progress: Some(progress.clone()),
            mistakes,
            session: Some(PracticeSession {
                submitted_at: Some(now),
                ..submission.session.clone()
            }),
        },
        progress,
        outcome,
    }
}
