//! crates/englishquest_core/src/ports.rs
//!
//! Defines the storage contract for the engine's per-user state.
//! This trait forms the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{AccountDefaults, PracticeSession, ProgressRecord, User, WrongQuestionEntry};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from the storage backend.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// The optimistic version check failed; another write won the race.
    #[error("Write conflict: {0}")]
    Conflict(String),
    /// A uniqueness constraint was violated.
    #[error("Duplicate value: {0}")]
    Duplicate(String),
    #[error("Session {0} has already been submitted")]
    AlreadyApplied(Uuid),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Unit of Work
//=========================================================================================

/// Everything a single engine operation writes for one user.
///
/// `user.version` must be the version that was read. The store commits only if
/// the stored version still matches, then bumps it. Every part is applied or
/// none is.
#[derive(Debug, Clone)]
pub struct AccountWrite {
    pub user: User,
    pub progress: Option<ProgressRecord>,
    /// Entries to insert or replace, keyed by `(user_id, lesson_id, question_id)`.
    pub mistakes: Vec<WrongQuestionEntry>,
    /// An open session is inserted. A session with `submitted_at` set closes the
    /// stored open session; `AlreadyApplied` if it is already closed.
    pub session: Option<PracticeSession>,
}

impl AccountWrite {
    pub fn economy_only(user: User) -> Self {
        Self {
            user,
            progress: None,
            mistakes: Vec::new(),
            session: None,
        }
    }

    pub fn open_session(user: User, session: PracticeSession) -> Self {
        Self {
            session: Some(session),
            ..Self::economy_only(user)
        }
    }
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait AccountStore: Send + Sync {
    // --- Accounts ---
    async fn get_or_create_user(
        &self,
        user_id: Uuid,
        defaults: &AccountDefaults,
        now: DateTime<Utc>,
    ) -> PortResult<User>;

    async fn get_user(&self, user_id: Uuid) -> PortResult<User>;

    /// Sets the display name; `Duplicate` if another account holds it.
    async fn update_username(&self, user_id: Uuid, username: &str) -> PortResult<User>;

    // --- Progress and mistakes ---
    async fn list_progress(&self, user_id: Uuid) -> PortResult<Vec<ProgressRecord>>;

    async fn list_mistakes(&self, user_id: Uuid) -> PortResult<Vec<WrongQuestionEntry>>;

    /// Marks an entry owned by `user_id` as mastered. `NotFound` if the entry
    /// does not exist or belongs to someone else.
    async fn mark_mastered(
        &self,
        user_id: Uuid,
        entry_id: Uuid,
        now: DateTime<Utc>,
    ) -> PortResult<WrongQuestionEntry>;

    // --- Practice sessions ---
    /// `NotFound` if the session does not exist or belongs to someone else.
    async fn get_session(&self, user_id: Uuid, session_id: Uuid) -> PortResult<PracticeSession>;

    /// Forgets the user's sessions started before `before`, open or not.
    /// Returns how many were removed.
    async fn prune_sessions(&self, user_id: Uuid, before: DateTime<Utc>) -> PortResult<u64>;

    // --- Transactions ---
    /// Atomically applies a unit of work and returns the stored user.
    async fn commit(&self, write: AccountWrite) -> PortResult<User>;

    // --- Projections ---
    /// Users ordered by experience descending, then by earliest creation.
    async fn leaderboard(&self, limit: usize) -> PortResult<Vec<User>>;
}
