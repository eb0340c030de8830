//! services/api/src/web/protocol.rs
//!
//! Defines the JSON payloads exchanged between the client and the REST API.
//! Engine views are converted here so the core stays free of serialization.

use chrono::{DateTime, Utc};
use englishquest_core::{
    EconomySnapshot, EngineError, HeartRefill, ItemEffect, LeaderboardEntry, ProgressRecord,
    ShopItem, WrongQuestionEntry,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::engine::{
    Correction, LessonSummary, LessonView, LevelView, Profile, PurchaseReceipt, SessionReceipt,
    SessionTicket,
};

//=========================================================================================
// Payloads Sent FROM the Client TO the Server
//=========================================================================================

/// The answers for one started practice session, in question order.
#[derive(Deserialize, Debug, ToSchema)]
pub struct SubmitSessionRequest {
    /// The id returned by `POST /lessons/{id}/start`. Each session is applied once.
    pub session_id: Uuid,
    /// One entry per question; `null` means the question was skipped.
    pub answers: Vec<Option<String>>,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct PurchaseRequest {
    pub item_id: i64,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct UpdateProfileRequest {
    pub username: String,
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MistakeQuery {
    /// `true` for mastered entries only, `false` for unmastered only.
    pub mastered: Option<bool>,
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LeaderboardQuery {
    pub limit: Option<usize>,
}

//=========================================================================================
// Payloads Sent FROM the Server TO the Client
//=========================================================================================

/// The body of every failed request.
#[derive(Serialize, Debug, ToSchema)]
pub struct ErrorResponse {
    pub kind: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(kind: &str, message: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            message: message.into(),
        }
    }
}

impl From<&EngineError> for ErrorResponse {
    fn from(e: &EngineError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct EconomyResponse {
    pub level: u32,
    pub experience: u64,
    pub coins: u64,
    pub hearts: u32,
    pub max_hearts: u32,
    pub streak_count: u32,
    pub boost_active: bool,
    pub boost_expires_at: Option<DateTime<Utc>>,
}

impl From<EconomySnapshot> for EconomyResponse {
    fn from(s: EconomySnapshot) -> Self {
        Self {
            level: s.level,
            experience: s.experience,
            coins: s.coins,
            hearts: s.hearts,
            max_hearts: s.max_hearts,
            streak_count: s.streak_count,
            boost_active: s.boost_active,
            boost_expires_at: s.boost_expires_at,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct ProfileResponse {
    pub user_id: Uuid,
    pub username: Option<String>,
    pub created_at: DateTime<Utc>,
    pub economy: EconomyResponse,
}

impl From<Profile> for ProfileResponse {
    fn from(p: Profile) -> Self {
        Self {
            user_id: p.user_id,
            username: p.username,
            created_at: p.created_at,
            economy: p.economy.into(),
        }
    }
}

// --- Curriculum ---

#[derive(Serialize, Debug, ToSchema)]
pub struct LessonSummaryResponse {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub order: u32,
    pub question_count: usize,
    /// One of `completed`, `available`, `locked`.
    pub status: String,
    pub best_score: Option<u8>,
}

impl From<LessonSummary> for LessonSummaryResponse {
    fn from(l: LessonSummary) -> Self {
        Self {
            id: l.id,
            title: l.title,
            description: l.description,
            order: l.order,
            question_count: l.question_count,
            status: l.status.as_str().to_string(),
            best_score: l.best_score,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct LevelResponse {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub order: u32,
    pub required_experience: u64,
    pub lessons: Vec<LessonSummaryResponse>,
}

impl From<LevelView> for LevelResponse {
    fn from(l: LevelView) -> Self {
        Self {
            id: l.id,
            title: l.title,
            description: l.description,
            order: l.order,
            required_experience: l.required_experience,
            lessons: l.lessons.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct QuestionResponse {
    pub id: i64,
    pub prompt: String,
    pub options: Vec<String>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct LessonResponse {
    pub id: i64,
    pub level_id: i64,
    pub title: String,
    pub description: String,
    pub status: String,
    pub questions: Vec<QuestionResponse>,
}

impl From<LessonView> for LessonResponse {
    fn from(l: LessonView) -> Self {
        Self {
            id: l.id,
            level_id: l.level_id,
            title: l.title,
            description: l.description,
            status: l.status.as_str().to_string(),
            questions: l
                .questions
                .into_iter()
                .map(|q| QuestionResponse {
                    id: q.id,
                    prompt: q.prompt,
                    options: q.options,
                })
                .collect(),
        }
    }
}

// --- Progress ---

#[derive(Serialize, Debug, ToSchema)]
pub struct ProgressResponse {
    pub lesson_id: i64,
    pub completed: bool,
    pub best_score: u8,
    pub attempts: u32,
    pub last_attempted_at: DateTime<Utc>,
}

impl From<ProgressRecord> for ProgressResponse {
    fn from(p: ProgressRecord) -> Self {
        Self {
            lesson_id: p.lesson_id,
            completed: p.completed,
            best_score: p.best_score,
            attempts: p.attempts,
            last_attempted_at: p.last_attempted_at,
        }
    }
}

// --- Sessions ---

#[derive(Serialize, Debug, ToSchema)]
pub struct SessionStartResponse {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub lesson: LessonResponse,
}

impl From<SessionTicket> for SessionStartResponse {
    fn from(t: SessionTicket) -> Self {
        Self {
            session_id: t.session_id,
            started_at: t.started_at,
            lesson: t.lesson.into(),
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct CorrectionResponse {
    pub question_id: i64,
    pub submitted_answer: Option<String>,
    pub correct_answer: String,
}

impl From<Correction> for CorrectionResponse {
    fn from(c: Correction) -> Self {
        Self {
            question_id: c.question_id,
            submitted_answer: c.submitted_answer,
            correct_answer: c.correct_answer,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct SessionResultResponse {
    pub lesson_id: i64,
    pub score: u8,
    pub passed: bool,
    pub newly_completed: bool,
    pub correct: u32,
    pub total: u32,
    pub hearts_lost: u32,
    pub experience_gained: u64,
    pub boost_applied: bool,
    pub levels_gained: u32,
    pub coins_gained: u64,
    pub streak_count: u32,
    pub best_score: u8,
    pub attempts: u32,
    pub corrections: Vec<CorrectionResponse>,
    pub economy: EconomyResponse,
}

impl From<SessionReceipt> for SessionResultResponse {
    fn from(r: SessionReceipt) -> Self {
        let outcome = r.outcome;
        Self {
            lesson_id: outcome.lesson_id,
            score: outcome.score,
            passed: outcome.passed,
            newly_completed: outcome.newly_completed,
            correct: r.correct,
            total: r.total,
            hearts_lost: outcome.hearts_lost,
            experience_gained: outcome.experience_gained,
            boost_applied: outcome.boost_applied,
            levels_gained: outcome.levels_gained,
            coins_gained: outcome.coins_gained,
            streak_count: outcome.streak_count,
            best_score: r.progress.best_score,
            attempts: r.progress.attempts,
            corrections: r.corrections.into_iter().map(Into::into).collect(),
            economy: r.economy.into(),
        }
    }
}

// --- Mistakes ---

#[derive(Serialize, Debug, ToSchema)]
pub struct MistakeResponse {
    pub id: Uuid,
    pub lesson_id: i64,
    pub question_id: i64,
    pub question_text: String,
    pub correct_answer: String,
    pub submitted_answer: Option<String>,
    pub mastered: bool,
    pub created_at: DateTime<Utc>,
    pub last_reviewed: Option<DateTime<Utc>>,
}

impl From<WrongQuestionEntry> for MistakeResponse {
    fn from(e: WrongQuestionEntry) -> Self {
        Self {
            id: e.id,
            lesson_id: e.lesson_id,
            question_id: e.question_id,
            question_text: e.question_text,
            correct_answer: e.correct_answer,
            submitted_answer: e.submitted_answer,
            mastered: e.mastered,
            created_at: e.created_at,
            last_reviewed: e.last_reviewed,
        }
    }
}

// --- Shop ---

/// What an item does once bought.
#[derive(Serialize, Debug, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemEffectResponse {
    Heart {
        /// Hearts restored; `null` means a full refill.
        refill: Option<u32>,
        max_hearts_bonus: u32,
    },
    Boost {
        duration_minutes: i64,
        multiplier: u32,
    },
    Coins {
        amount: u64,
    },
    Cosmetic,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct ShopItemResponse {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub price: u64,
    pub effect: ItemEffectResponse,
}

impl From<&ShopItem> for ShopItemResponse {
    fn from(item: &ShopItem) -> Self {
        let effect = match &item.effect {
            ItemEffect::Heart {
                refill,
                max_hearts_bonus,
            } => ItemEffectResponse::Heart {
                refill: match refill {
                    HeartRefill::Full => None,
                    HeartRefill::Amount(n) => Some(*n),
                },
                max_hearts_bonus: *max_hearts_bonus,
            },
            ItemEffect::Boost {
                duration,
                multiplier,
            } => ItemEffectResponse::Boost {
                duration_minutes: duration.num_minutes(),
                multiplier: *multiplier,
            },
            ItemEffect::Coins { amount } => ItemEffectResponse::Coins { amount: *amount },
            ItemEffect::Cosmetic => ItemEffectResponse::Cosmetic,
        };
        Self {
            id: item.id,
            name: item.name.clone(),
            description: item.description.clone(),
            price: item.price,
            effect,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct PurchaseResponse {
    pub item: ShopItemResponse,
    pub economy: EconomyResponse,
}

impl From<PurchaseReceipt> for PurchaseResponse {
    fn from(r: PurchaseReceipt) -> Self {
        Self {
            item: (&r.item).into(),
            economy: r.economy.into(),
        }
    }
}

// --- Leaderboard ---

#[derive(Serialize, Debug, ToSchema)]
pub struct LeaderboardEntryResponse {
    pub rank: u32,
    pub user_id: Uuid,
    pub username: Option<String>,
    pub experience: u64,
    pub level: u32,
}

impl From<LeaderboardEntry> for LeaderboardEntryResponse {
    fn from(e: LeaderboardEntry) -> Self {
        Self {
            rank: e.rank,
            user_id: e.user_id,
            username: e.username,
            experience: e.experience,
            level: e.level,
        }
    }
}
