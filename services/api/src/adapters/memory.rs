//! services/api/src/adapters/memory.rs
//!
//! An in-process implementation of the `AccountStore` port. All tables sit
//! behind one async mutex, so every commit is trivially atomic. Used by the
//! test suite and by `STORAGE=memory` for local development.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use englishquest_core::mistakes;
use englishquest_core::ports::{AccountStore, AccountWrite, PortError, PortResult};
use englishquest_core::{
    AccountDefaults, LessonId, PracticeSession, ProgressRecord, User, WrongQuestionEntry,
};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    progress: HashMap<(Uuid, LessonId), ProgressRecord>,
    mistakes: HashMap<Uuid, WrongQuestionEntry>,
    sessions: HashMap<Uuid, PracticeSession>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn user_not_found(user_id: Uuid) -> PortError {
    PortError::NotFound(format!("User {} not found", user_id))
}

fn session_not_found(session_id: Uuid) -> PortError {
    PortError::NotFound(format!("Session {} not found", session_id))
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn get_or_create_user(
        &self,
        user_id: Uuid,
        defaults: &AccountDefaults,
        now: DateTime<Utc>,
    ) -> PortResult<User> {
        let mut tables = self.tables.lock().await;
        let user = tables
            .users
            .entry(user_id)
            .or_insert_with(|| User::new(user_id, defaults, now));
        Ok(user.clone())
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        let tables = self.tables.lock().await;
        tables
            .users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| user_not_found(user_id))
    }

    async fn update_username(&self, user_id: Uuid, username: &str) -> PortResult<User> {
        let mut tables = self.tables.lock().await;
        let taken = tables
            .users
            .values()
            .any(|u| u.user_id != user_id && u.username.as_deref() == Some(username));
        if taken {
            return Err(PortError::Duplicate(format!("username '{}' is already taken", username)));
        }
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or_else(|| user_not_found(user_id))?;
        user.username = Some(username.to_string());
        user.version += 1;
        Ok(user.clone())
    }

    async fn list_progress(&self, user_id: Uuid) -> PortResult<Vec<ProgressRecord>> {
        let tables = self.tables.lock().await;
        let mut records: Vec<ProgressRecord> = tables
            .progress
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by_key(|p| p.lesson_id);
        Ok(records)
    }

    async fn list_mistakes(&self, user_id: Uuid) -> PortResult<Vec<WrongQuestionEntry>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .mistakes
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn mark_mastered(
        &self,
        user_id: Uuid,
        entry_id: Uuid,
        now: DateTime<Utc>,
    ) -> PortResult<WrongQuestionEntry> {
        let mut tables = self.tables.lock().await;
        let entry = tables
            .mistakes
            .get_mut(&entry_id)
            .filter(|e| e.user_id == user_id)
            .ok_or_else(|| PortError::NotFound(format!("Mistake entry {} not found", entry_id)))?;
        *entry = mistakes::mark_mastered(entry, now);
        Ok(entry.clone())
    }

    async fn get_session(&self, user_id: Uuid, session_id: Uuid) -> PortResult<PracticeSession> {
        let tables = self.tables.lock().await;
        tables
            .sessions
            .get(&session_id)
            .filter(|s| s.user_id == user_id)
            .cloned()
            .ok_or_else(|| session_not_found(session_id))
    }

    async fn prune_sessions(&self, user_id: Uuid, before: DateTime<Utc>) -> PortResult<u64> {
        let mut tables = self.tables.lock().await;
        let count = tables.sessions.len();
        tables
            .sessions
            .retain(|_, s| !(s.user_id == user_id && s.started_at < before));
        Ok((count - tables.sessions.len()) as u64)
    }

    async fn commit(&self, write: AccountWrite) -> PortResult<User> {
        let mut tables = self.tables.lock().await;
        let user_id = write.user.user_id;

        // Every check happens before the first mutation.
        let current = tables
            .users
            .get(&user_id)
            .ok_or_else(|| user_not_found(user_id))?;
        if current.version != write.user.version {
            return Err(PortError::Conflict(format!(
                "user {} is at version {}, write expected {}",
                user_id, current.version, write.user.version
            )));
        }
        if write.progress.iter().any(|p| p.user_id != user_id)
            || write.mistakes.iter().any(|e| e.user_id != user_id)
            || write.session.iter().any(|s| s.user_id != user_id)
        {
            return Err(PortError::Unexpected(
                "write touches records of another user".to_string(),
            ));
        }

        if let Some(session) = &write.session {
            let stored = tables.sessions.get(&session.session_id);
            match (session.is_open(), stored) {
                (true, Some(_)) => {
                    return Err(PortError::Duplicate(format!(
                        "session {} already exists",
                        session.session_id
                    )))
                }
                (true, None) => {}
                (false, Some(stored)) if stored.user_id == user_id && stored.is_open() => {}
                (false, Some(stored)) if stored.user_id == user_id => {
                    return Err(PortError::AlreadyApplied(session.session_id))
                }
                (false, _) => return Err(session_not_found(session.session_id)),
            }
        }

        if let Some(session) = write.session {
            tables.sessions.insert(session.session_id, session);
        }
        if let Some(progress) = write.progress {
            tables.progress.insert((user_id, progress.lesson_id), progress);
        }
        for entry in write.mistakes {
            tables.mistakes.retain(|_, existing| {
                !(existing.user_id == entry.user_id
                    && existing.lesson_id == entry.lesson_id
                    && existing.question_id == entry.question_id)
            });
            tables.mistakes.insert(entry.id, entry);
        }

        let mut user = write.user;
        user.version += 1;
        tables.users.insert(user_id, user.clone());
        Ok(user)
    }

    async fn leaderboard(&self, limit: usize) -> PortResult<Vec<User>> {
        let tables = self.tables.lock().await;
        let mut users: Vec<User> = tables.users.values().cloned().collect();
        users.sort_by(|a, b| {
            b.experience
                .cmp(&a.experience)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.user_id.cmp(&b.user_id))
        });
        users.truncate(limit);
        Ok(users)
    }
}
