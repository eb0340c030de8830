//! How the engine reacts when the store loses races or fails outright.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use api_lib::adapters::MemoryStore;
use api_lib::config::EngineSettings;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::*;
use englishquest_core::mistakes::MasteryFilter;
use englishquest_core::ports::{AccountStore, AccountWrite, PortError, PortResult};
use englishquest_core::{
    AccountDefaults, EngineError, PracticeSession, ProgressRecord, User, WrongQuestionEntry,
};
use uuid::Uuid;

/// Wraps a `MemoryStore` and fails the next `failures` commits with `fault`.
struct FaultyStore {
    inner: MemoryStore,
    failures: AtomicU32,
    fault: fn() -> PortError,
}

impl FaultyStore {
    fn new(fault: fn() -> PortError) -> Self {
        Self {
            inner: MemoryStore::new(),
            failures: AtomicU32::new(0),
            fault,
        }
    }

    fn fail_next(&self, failures: u32) {
        self.failures.store(failures, Ordering::SeqCst);
    }
}

#[async_trait]
impl AccountStore for FaultyStore {
    async fn get_or_create_user(
        &self,
        user_id: Uuid,
        defaults: &AccountDefaults,
        now: DateTime<Utc>,
    ) -> PortResult<User> {
        self.inner.get_or_create_user(user_id, defaults, now).await
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        self.inner.get_user(user_id).await
    }

    async fn update_username(&self, user_id: Uuid, username: &str) -> PortResult<User> {
        self.inner.update_username(user_id, username).await
    }

    async fn list_progress(&self, user_id: Uuid) -> PortResult<Vec<ProgressRecord>> {
        self.inner.list_progress(user_id).await
    }

    async fn list_mistakes(&self, user_id: Uuid) -> PortResult<Vec<WrongQuestionEntry>> {
        self.inner.list_mistakes(user_id).await
    }

    async fn mark_mastered(
        &self,
        user_id: Uuid,
        entry_id: Uuid,
        now: DateTime<Utc>,
    ) -> PortResult<WrongQuestionEntry> {
        self.inner.mark_mastered(user_id, entry_id, now).await
    }

    async fn get_session(&self, user_id: Uuid, session_id: Uuid) -> PortResult<PracticeSession> {
        self.inner.get_session(user_id, session_id).await
    }

    async fn prune_sessions(&self, user_id: Uuid, before: DateTime<Utc>) -> PortResult<u64> {
        self.inner.prune_sessions(user_id, before).await
    }

    async fn commit(&self, write: AccountWrite) -> PortResult<User> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err((self.fault)());
        }
        self.inner.commit(write).await
    }

    async fn leaderboard(&self, limit: usize) -> PortResult<Vec<User>> {
        self.inner.leaderboard(limit).await
    }
}

fn conflict() -> PortError {
    PortError::Conflict("lost the race".to_string())
}

fn outage() -> PortError {
    PortError::Unavailable("connection refused".to_string())
}

#[tokio::test]
async fn conflicts_are_retried_until_the_write_lands() {
    let store = Arc::new(FaultyStore::new(conflict));
    let engine = engine_over(store.clone(), EngineSettings::default());
    let user = Uuid::new_v4();
    engine.ensure_account(user).await.unwrap();
    let ticket = engine.start_session(user, 11).await.unwrap();

    store.fail_next(2);
    let receipt = engine
        .submit_session(user, 11, ticket.session_id, perfect_numbers())
        .await
        .unwrap();
    assert_eq!(receipt.economy.experience, 100);
    assert_eq!(store.get_user(user).await.unwrap().experience, 100);
}

#[tokio::test]
async fn starting_a_session_is_retried_too() {
    let store = Arc::new(FaultyStore::new(conflict));
    let engine = engine_over(store.clone(), EngineSettings::default());
    let user = Uuid::new_v4();
    engine.ensure_account(user).await.unwrap();

    store.fail_next(2);
    let ticket = engine.start_session(user, 10).await.unwrap();
    assert!(store.get_session(user, ticket.session_id).await.unwrap().is_open());
}

#[tokio::test]
async fn persistent_conflicts_surface_as_retryable() {
    let store = Arc::new(FaultyStore::new(conflict));
    let engine = engine_over(
        store.clone(),
        EngineSettings {
            max_conflict_retries: 2,
            ..EngineSettings::default()
        },
    );
    let user = Uuid::new_v4();
    engine.ensure_account(user).await.unwrap();
    let ticket = engine.start_session(user, 11).await.unwrap();

    store.fail_next(u32::MAX);
    let err = engine
        .submit_session(user, 11, ticket.session_id, perfect_numbers())
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(err, EngineError::ConflictRetryable(_)));
    // One try plus two retries.
    assert_eq!(store.failures.load(Ordering::SeqCst), u32::MAX - 3);
}

#[tokio::test]
async fn storage_failure_leaves_no_partial_session() {
    let store = Arc::new(FaultyStore::new(outage));
    let engine = engine_over(store.clone(), EngineSettings::default());
    let user = Uuid::new_v4();
    engine.ensure_account(user).await.unwrap();
    let ticket = engine.start_session(user, 10).await.unwrap();

    store.fail_next(1);
    let err = engine
        .submit_session(user, 10, ticket.session_id, answers(&["Adios"]))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::StorageUnavailable(_)));

    let stored = store.get_user(user).await.unwrap();
    assert_eq!(stored.hearts, 5);
    assert_eq!(stored.experience, 0);
    assert!(store.list_progress(user).await.unwrap().is_empty());
    assert!(engine
        .list_mistakes(user, MasteryFilter::All)
        .await
        .unwrap()
        .is_empty());
    assert!(store.get_session(user, ticket.session_id).await.unwrap().is_open());

    // The session survives the outage and can still be submitted.
    let receipt = engine
        .submit_session(user, 10, ticket.session_id, answers(&["Adios"]))
        .await
        .unwrap();
    assert_eq!(receipt.economy.hearts, 2);
}
