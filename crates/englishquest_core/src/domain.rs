//! crates/englishquest_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::HashSet;
use uuid::Uuid;

pub type LevelId = i64;
pub type LessonId = i64;
pub type QuestionId = i64;
pub type ItemId = i64;

//=========================================================================================
// Accounts
//=========================================================================================

/// A learner's account together with their economy state.
///
/// `version` is the optimistic concurrency token. Stores bump it on every
/// committed write, and a write carrying a stale version is refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub user_id: Uuid,
    pub username: Option<String>,
    pub level: u32,
    pub experience: u64,
    pub coins: u64,
    pub hearts: u32,
    pub max_hearts: u32,
    pub streak_count: u32,
    /// Calendar day of the last applied session, used for streak accounting.
    pub last_active_on: Option<NaiveDate>,
    pub boost_expires_at: Option<DateTime<Utc>>,
    /// Experience multiplier in force while the boost is active.
    pub boost_multiplier: u32,
    pub created_at: DateTime<Utc>,
    pub version: i64,
}

/// Starting values for a freshly created account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountDefaults {
    pub starting_hearts: u32,
    pub max_hearts: u32,
}

impl Default for AccountDefaults {
    fn default() -> Self {
        Self {
            starting_hearts: 5,
            max_hearts: 5,
        }
    }
}

impl User {
    pub fn new(user_id: Uuid, defaults: &AccountDefaults, now: DateTime<Utc>) -> Self {
        let max_hearts = defaults.max_hearts.max(1);
        Self {
            user_id,
            username: None,
            level: 1,
            experience: 0,
            coins: 0,
            hearts: defaults.starting_hearts.min(max_hearts),
            max_hearts,
            streak_count: 0,
            last_active_on: None,
            boost_expires_at: None,
            boost_multiplier: 2,
            created_at: now,
            version: 0,
        }
    }

    /// The read-only view of the economy handed back to clients.
    pub fn snapshot(&self, now: DateTime<Utc>) -> EconomySnapshot {
        let boost_active = crate::economy::boost_active(self.boost_expires_at, now);
        EconomySnapshot {
            level: self.level,
            experience: self.experience,
            coins: self.coins,
            hearts: self.hearts,
            max_hearts: self.max_hearts,
            streak_count: self.streak_count,
            boost_expires_at: self.boost_expires_at,
            boost_active,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EconomySnapshot {
    pub level: u32,
    pub experience: u64,
    pub coins: u64,
    pub hearts: u32,
    pub max_hearts: u32,
    pub streak_count: u32,
    pub boost_expires_at: Option<DateTime<Utc>>,
    pub boost_active: bool,
}

//=========================================================================================
// Curriculum
//=========================================================================================

/// A single multiple-choice question inside a lesson.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub id: QuestionId,
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_option: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lesson {
    pub id: LessonId,
    pub level_id: LevelId,
    pub title: String,
    pub description: String,
    pub order: u32,
    pub questions: Vec<Question>,
}

impl Lesson {
    pub fn question(&self, question_id: QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Level {
    pub id: LevelId,
    pub title: String,
    pub description: String,
    pub order: u32,
    /// Experience needed to reach this level on the curriculum level curve.
    pub required_experience: u64,
    pub lessons: Vec<Lesson>,
}

/// Errors found while validating authored content at startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContentError {
    #[error("Curriculum has no levels")]
    Empty,
    #[error("Level orders must run contiguously from 1; expected {expected}, found {found}")]
    NonContiguousLevels { expected: u32, found: u32 },
    #[error("Duplicate {0} id {1}")]
    DuplicateId(&'static str, i64),
    #[error("Level {level_id} has two lessons with order {order}")]
    DuplicateLessonOrder { level_id: LevelId, order: u32 },
    #[error("Lesson {lesson_id} belongs to level {found} but is listed under level {expected}")]
    MisplacedLesson {
        lesson_id: LessonId,
        expected: LevelId,
        found: LevelId,
    },
    #[error("Question {question_id} in lesson {lesson_id} has a correct option outside its option set")]
    CorrectOptionMissing {
        lesson_id: LessonId,
        question_id: QuestionId,
    },
    #[error("Shop item {item_id} has an invalid boost duration of {minutes} minutes")]
    InvalidBoostDuration { item_id: ItemId, minutes: i64 },
}

/// The full, validated curriculum: levels and their lessons, each sorted by `order`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Curriculum {
    levels: Vec<Level>,
}

impl Curriculum {
    /// Validates and orders the given levels.
    pub fn new(mut levels: Vec<Level>) -> Result<Self, ContentError> {
        if levels.is_empty() {
            return Err(ContentError::Empty);
        }
        levels.sort_by_key(|l| l.order);

        let mut level_ids = HashSet::new();
        let mut lesson_ids = HashSet::new();
        for (index, level) in levels.iter_mut().enumerate() {
            let expected = index as u32 + 1;
            if level.order != expected {
                return Err(ContentError::NonContiguousLevels {
                    expected,
                    found: level.order,
                });
            }
            if !level_ids.insert(level.id) {
                return Err(ContentError::DuplicateId("level", level.id));
            }

            level.lessons.sort_by_key(|l| l.order);
            let mut orders = HashSet::new();
            for lesson in &level.lessons {
                if lesson.level_id != level.id {
                    return Err(ContentError::MisplacedLesson {
                        lesson_id: lesson.id,
                        expected: level.id,
                        found: lesson.level_id,
                    });
                }
                if !orders.insert(lesson.order) {
                    return Err(ContentError::DuplicateLessonOrder {
                        level_id: level.id,
                        order: lesson.order,
                    });
                }
                if !lesson_ids.insert(lesson.id) {
                    return Err(ContentError::DuplicateId("lesson", lesson.id));
                }

                let mut question_ids = HashSet::new();
                for question in &lesson.questions {
                    if !question_ids.insert(question.id) {
                        return Err(ContentError::DuplicateId("question", question.id));
                    }
                    if !question.options.contains(&question.correct_option) {
                        return Err(ContentError::CorrectOptionMissing {
                            lesson_id: lesson.id,
                            question_id: question.id,
                        });
                    }
                }
            }
        }

        Ok(Self { levels })
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    /// Looks up a lesson along with the level that contains it.
    pub fn find_lesson(&self, lesson_id: LessonId) -> Option<(&Level, &Lesson)> {
        self.levels.iter().find_map(|level| {
            level
                .lessons
                .iter()
                .find(|lesson| lesson.id == lesson_id)
                .map(|lesson| (level, lesson))
        })
    }
}

/// Where a lesson stands for a particular learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LessonStatus {
    Completed,
    Available,
    Locked,
}

impl LessonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LessonStatus::Completed => "completed",
            LessonStatus::Available => "available",
            LessonStatus::Locked => "locked",
        }
    }
}

//=========================================================================================
// Progress and mistakes
//=========================================================================================

/// One per (user, lesson) pair, created on the first submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    pub user_id: Uuid,
    pub lesson_id: LessonId,
    pub completed: bool,
    pub best_score: u8,
    pub attempts: u32,
    pub last_attempted_at: DateTime<Utc>,
}

/// A practice session opened by a successful start.
///
/// A submission must name an open session and closes it in the same commit, so
/// every applied result passed the start gate and is applied at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PracticeSession {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub lesson_id: LessonId,
    pub started_at: DateTime<Utc>,
    /// Set when the session's result is applied.
    pub submitted_at: Option<DateTime<Utc>>,
}

impl PracticeSession {
    pub fn open(user_id: Uuid, lesson_id: LessonId, now: DateTime<Utc>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            user_id,
            lesson_id,
            started_at: now,
            submitted_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.submitted_at.is_none()
    }
}

/// A question the learner has answered incorrectly at least once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrongQuestionEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub lesson_id: LessonId,
    pub question_id: QuestionId,
    pub question_text: String,
    pub correct_answer: String,
    /// `None` when the question was left unanswered.
    pub submitted_answer: Option<String>,
    pub mastered: bool,
    pub created_at: DateTime<Utc>,
    pub last_reviewed: Option<DateTime<Utc>>,
}

//=========================================================================================
// Shop
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartRefill {
    /// Fill hearts up to `max_hearts`.
    Full,
    Amount(u32),
}

/// What a purchased item does to the buyer's economy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemEffect {
    Heart {
        refill: HeartRefill,
        max_hearts_bonus: u32,
    },
    Boost {
        duration: Duration,
        multiplier: u32,
    },
    Coins {
        amount: u64,
    },
    Cosmetic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Heart,
    Boost,
    Coins,
    Cosmetic,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Heart => "heart",
            ItemKind::Boost => "boost",
            ItemKind::Coins => "coins",
            ItemKind::Cosmetic => "cosmetic",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShopItem {
    pub id: ItemId,
    pub name: String,
    pub description: String,
    pub price: u64,
    pub effect: ItemEffect,
}

impl ShopItem {
    pub fn kind(&self) -> ItemKind {
        match self.effect {
            ItemEffect::Heart { .. } => ItemKind::Heart,
            ItemEffect::Boost { .. } => ItemKind::Boost,
            ItemEffect::Coins { .. } => ItemKind::Coins,
            ItemEffect::Cosmetic => ItemKind::Cosmetic,
        }
    }
}

//=========================================================================================
// Leaderboard
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user_id: Uuid,
    pub username: Option<String>,
    pub experience: u64,
    pub level: u32,
    pub created_at: DateTime<Utc>,
}
