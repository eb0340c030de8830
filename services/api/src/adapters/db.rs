//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `AccountStore` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! `commit` runs in one transaction: the user row is updated only if its version
//! still matches, and the progress, mistake and practice-session rows ride along.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use englishquest_core::ports::{AccountStore, AccountWrite, PortError, PortResult};
use englishquest_core::{
    AccountDefaults, PracticeSession, ProgressRecord, User, WrongQuestionEntry,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

const USER_COLUMNS: &str = "user_id, username, level, experience, coins, hearts, max_hearts, \
     streak_count, last_active_on, boost_expires_at, boost_multiplier, created_at, version";

const SESSION_COLUMNS: &str = "session_id, user_id, lesson_id, started_at, submitted_at";

const MISTAKE_COLUMNS: &str = "id, user_id, lesson_id, question_id, question_text, correct_answer, \
     submitted_answer, mastered, created_at, last_reviewed";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `AccountStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Maps driver errors onto the port's vocabulary.
fn map_err(e: sqlx::Error) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound("row not found".to_string()),
        sqlx::Error::Database(db) => match db.code().as_deref() {
            // unique_violation
            Some("23505") => PortError::Duplicate(db.message().to_string()),
            // serialization_failure, deadlock_detected
            Some("40001") | Some("40P01") => PortError::Conflict(db.message().to_string()),
            _ => PortError::Unexpected(db.message().to_string()),
        },
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            PortError::Unavailable(e.to_string())
        }
        other => PortError::Unexpected(other.to_string()),
    }
}

fn user_not_found(user_id: Uuid) -> PortError {
    PortError::NotFound(format!("User {} not found", user_id))
}

fn session_not_found(session_id: Uuid) -> PortError {
    PortError::NotFound(format!("Session {} not found", session_id))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    user_id: Uuid,
    username: Option<String>,
    level: i32,
    experience: i64,
    coins: i64,
    hearts: i32,
    max_hearts: i32,
    streak_count: i32,
    last_active_on: Option<NaiveDate>,
    boost_expires_at: Option<DateTime<Utc>>,
    boost_multiplier: i32,
    created_at: DateTime<Utc>,
    version: i64,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            user_id: self.user_id,
            username: self.username,
            level: self.level as u32,
            experience: self.experience as u64,
            coins: self.coins as u64,
            hearts: self.hearts as u32,
            max_hearts: self.max_hearts as u32,
            streak_count: self.streak_count as u32,
            last_active_on: self.last_active_on,
            boost_expires_at: self.boost_expires_at,
            boost_multiplier: self.boost_multiplier as u32,
            created_at: self.created_at,
            version: self.version,
        }
    }
}

#[derive(FromRow)]
struct ProgressRow {
    user_id: Uuid,
    lesson_id: i64,
    completed: bool,
    best_score: i16,
    attempts: i32,
    last_attempted_at: DateTime<Utc>,
}
impl ProgressRow {
    fn to_domain(self) -> ProgressRecord {
        ProgressRecord {
            user_id: self.user_id,
            lesson_id: self.lesson_id,
            completed: self.completed,
            best_score: self.best_score as u8,
            attempts: self.attempts as u32,
            last_attempted_at: self.last_attempted_at,
        }
    }
}

#[derive(FromRow)]
struct SessionRecord {
    session_id: Uuid,
    user_id: Uuid,
    lesson_id: i64,
    started_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
}
impl SessionRecord {
    fn to_domain(self) -> PracticeSession {
        PracticeSession {
            session_id: self.session_id,
            user_id: self.user_id,
            lesson_id: self.lesson_id,
            started_at: self.started_at,
            submitted_at: self.submitted_at,
        }
    }
}

#[derive(FromRow)]
struct MistakeRecord {
    id: Uuid,
    user_id: Uuid,
    lesson_id: i64,
    question_id: i64,
    question_text: String,
    correct_answer: String,
    submitted_answer: Option<String>,
    mastered: bool,
    created_at: DateTime<Utc>,
    last_reviewed: Option<DateTime<Utc>>,
}
impl MistakeRecord {
    fn to_domain(self) -> WrongQuestionEntry {
        WrongQuestionEntry {
            id: self.id,
            user_id: self.user_id,
            lesson_id: self.lesson_id,
            question_id: self.question_id,
            question_text: self.question_text,
            correct_answer: self.correct_answer,
            submitted_answer: self.submitted_answer,
            mastered: self.mastered,
            created_at: self.created_at,
            last_reviewed: self.last_reviewed,
        }
    }
}

//=========================================================================================
// `AccountStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl AccountStore for DbAdapter {
    async fn get_or_create_user(
        &self,
        user_id: Uuid,
        defaults: &AccountDefaults,
        now: DateTime<Utc>,
    ) -> PortResult<User> {
        sqlx::query(
            "INSERT INTO users (user_id, hearts, max_hearts, created_at) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(defaults.starting_hearts as i32)
        .bind(defaults.max_hearts as i32)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;

        self.get_user(user_id).await
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE user_id = $1",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => user_not_found(user_id),
            _ => map_err(e),
        })?;
        Ok(record.to_domain())
    }

    async fn update_username(&self, user_id: Uuid, username: &str) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "UPDATE users SET username = $2, version = version + 1 WHERE user_id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => user_not_found(user_id),
            _ => match map_err(e) {
                PortError::Duplicate(_) => {
                    PortError::Duplicate(format!("username '{}' is already taken", username))
                }
                other => other,
            },
        })?;
        Ok(record.to_domain())
    }

    async fn list_progress(&self, user_id: Uuid) -> PortResult<Vec<ProgressRecord>> {
        let records = sqlx::query_as::<_, ProgressRow>(
            "SELECT user_id, lesson_id, completed, best_score, attempts, last_attempted_at \
             FROM lesson_progress WHERE user_id = $1 ORDER BY lesson_id ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn list_mistakes(&self, user_id: Uuid) -> PortResult<Vec<WrongQuestionEntry>> {
        let records = sqlx::query_as::<_, MistakeRecord>(&format!(
            "SELECT {} FROM wrong_questions WHERE user_id = $1 ORDER BY created_at ASC",
            MISTAKE_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn mark_mastered(
        &self,
        user_id: Uuid,
        entry_id: Uuid,
        now: DateTime<Utc>,
    ) -> PortResult<WrongQuestionEntry> {
        let record = sqlx::query_as::<_, MistakeRecord>(&format!(
            "UPDATE wrong_questions SET mastered = TRUE, last_reviewed = $3 \
             WHERE id = $1 AND user_id = $2 RETURNING {}",
            MISTAKE_COLUMNS
        ))
        .bind(entry_id)
        .bind(user_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?
        .ok_or_else(|| PortError::NotFound(format!("Mistake entry {} not found", entry_id)))?;
        Ok(record.to_domain())
    }

    async fn get_session(&self, user_id: Uuid, session_id: Uuid) -> PortResult<PracticeSession> {
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {} FROM practice_sessions WHERE session_id = $1 AND user_id = $2",
            SESSION_COLUMNS
        ))
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?
        .ok_or_else(|| session_not_found(session_id))?;
        Ok(record.to_domain())
    }

    async fn prune_sessions(&self, user_id: Uuid, before: DateTime<Utc>) -> PortResult<u64> {
        let result = sqlx::query("DELETE FROM practice_sessions WHERE user_id = $1 AND started_at < $2")
            .bind(user_id)
            .bind(before)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(result.rows_affected())
    }

    async fn commit(&self, write: AccountWrite) -> PortResult<User> {
        let user = &write.user;
        let mut tx = self.pool.begin().await.map_err(map_err)?;

        // Dropping `tx` on any early return rolls everything back.
        if let Some(session) = &write.session {
            if session.user_id != user.user_id {
                return Err(PortError::Unexpected(
                    "write touches a session of another user".to_string(),
                ));
            }
            match session.submitted_at {
                None => {
                    sqlx::query(
                        "INSERT INTO practice_sessions (session_id, user_id, lesson_id, started_at) \
                         VALUES ($1, $2, $3, $4)",
                    )
                    .bind(session.session_id)
                    .bind(session.user_id)
                    .bind(session.lesson_id)
                    .bind(session.started_at)
                    .execute(&mut *tx)
                    .await
                    .map_err(map_err)?;
                }
                Some(submitted_at) => {
                    let closed = sqlx::query(
                        "UPDATE practice_sessions SET submitted_at = $3 \
                         WHERE session_id = $1 AND user_id = $2 AND submitted_at IS NULL",
                    )
                    .bind(session.session_id)
                    .bind(session.user_id)
                    .bind(submitted_at)
                    .execute(&mut *tx)
                    .await
                    .map_err(map_err)?
                    .rows_affected();
                    if closed == 0 {
                        let exists: Option<(Uuid,)> = sqlx::query_as(
                            "SELECT session_id FROM practice_sessions WHERE session_id = $1 AND user_id = $2",
                        )
                        .bind(session.session_id)
                        .bind(session.user_id)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(map_err)?;
                        return Err(match exists {
                            Some(_) => PortError::AlreadyApplied(session.session_id),
                            None => session_not_found(session.session_id),
                        });
                    }
                }
            }
        }

        let updated = sqlx::query_as::<_, UserRecord>(&format!(
            "UPDATE users SET username = $3, level = $4, experience = $5, coins = $6, hearts = $7, \
             max_hearts = $8, streak_count = $9, last_active_on = $10, boost_expires_at = $11, \
             boost_multiplier = $12, version = version + 1 \
             WHERE user_id = $1 AND version = $2 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(user.user_id)
        .bind(user.version)
        .bind(&user.username)
        .bind(user.level as i32)
        .bind(user.experience as i64)
        .bind(user.coins as i64)
        .bind(user.hearts as i32)
        .bind(user.max_hearts as i32)
        .bind(user.streak_count as i32)
        .bind(user.last_active_on)
        .bind(user.boost_expires_at)
        .bind(user.boost_multiplier as i32)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_err)?;

        let updated = match updated {
            Some(record) => record,
            None => {
                let exists: Option<(Uuid,)> =
                    sqlx::query_as("SELECT user_id FROM users WHERE user_id = $1")
                        .bind(user.user_id)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(map_err)?;
                return Err(match exists {
                    Some(_) => PortError::Conflict(format!(
                        "user {} changed since version {}",
                        user.user_id, user.version
                    )),
                    None => user_not_found(user.user_id),
                });
            }
        };

        if let Some(progress) = &write.progress {
            sqlx::query(
                "INSERT INTO lesson_progress \
                 (user_id, lesson_id, completed, best_score, attempts, last_attempted_at) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (user_id, lesson_id) DO UPDATE SET \
                 completed = lesson_progress.completed OR EXCLUDED.completed, \
                 best_score = GREATEST(lesson_progress.best_score, EXCLUDED.best_score), \
                 attempts = EXCLUDED.attempts, \
                 last_attempted_at = EXCLUDED.last_attempted_at",
            )
            .bind(progress.user_id)
            .bind(progress.lesson_id)
            .bind(progress.completed)
            .bind(progress.best_score as i16)
            .bind(progress.attempts as i32)
            .bind(progress.last_attempted_at)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;
        }

        for entry in &write.mistakes {
            sqlx::query(
                "INSERT INTO wrong_questions \
                 (id, user_id, lesson_id, question_id, question_text, correct_answer, \
                  submitted_answer, mastered, created_at, last_reviewed) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
                 ON CONFLICT (user_id, lesson_id, question_id) DO UPDATE SET \
                 question_text = EXCLUDED.question_text, \
                 correct_answer = EXCLUDED.correct_answer, \
                 submitted_answer = EXCLUDED.submitted_answer, \
                 mastered = EXCLUDED.mastered, \
                 last_reviewed = EXCLUDED.last_reviewed",
            )
            .bind(entry.id)
            .bind(entry.user_id)
            .bind(entry.lesson_id)
            .bind(entry.question_id)
            .bind(&entry.question_text)
            .bind(&entry.correct_answer)
            .bind(&entry.submitted_answer)
            .bind(entry.mastered)
            .bind(entry.created_at)
            .bind(entry.last_reviewed)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;
        }

        tx.commit().await.map_err(map_err)?;
        Ok(updated.to_domain())
    }

    async fn leaderboard(&self, limit: usize) -> PortResult<Vec<User>> {
        let records = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users ORDER BY experience DESC, created_at ASC, user_id ASC LIMIT $1",
            USER_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }
}
