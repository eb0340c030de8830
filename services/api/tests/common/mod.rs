//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use api_lib::adapters::MemoryStore;
use api_lib::config::EngineSettings;
use api_lib::content::parse_curriculum;
use api_lib::engine::{Clock, Engine, SessionReceipt};
use chrono::{DateTime, Duration, TimeZone, Utc};
use englishquest_core::shop::Catalog;
use englishquest_core::{AccountStore, AccountWrite, EngineResult, LessonId, User};
use uuid::Uuid;

/// Two lessons in the first level, one in the second. Question ids repeat across lessons.
pub const CURRICULUM: &str = r#"{
    "levels": [
        { "id": 1, "title": "Basics", "order": 1, "required_experience": 0,
          "lessons": [
            { "id": 10, "title": "Greetings", "order": 1,
              "questions": [
                { "id": 1, "prompt": "Hello", "options": ["Hola", "Adios"], "correct_option": "Hola" },
                { "id": 2, "prompt": "Goodbye", "options": ["Hola", "Adios"], "correct_option": "Adios" },
                { "id": 3, "prompt": "Thanks", "options": ["Gracias", "Por favor"], "correct_option": "Gracias" }
              ] },
            { "id": 11, "title": "Numbers", "order": 2,
              "questions": [
                { "id": 1, "prompt": "One", "options": ["Uno", "Dos"], "correct_option": "Uno" },
                { "id": 2, "prompt": "Two", "options": ["Uno", "Dos"], "correct_option": "Dos" }
              ] }
          ] },
        { "id": 2, "title": "Travel", "order": 2, "required_experience": 100,
          "lessons": [
            { "id": 20, "title": "Airport", "order": 1,
              "questions": [
                { "id": 1, "prompt": "Ticket", "options": ["Billete", "Maleta"], "correct_option": "Billete" }
              ] }
          ] }
    ]
}"#;

/// A clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

pub fn answers(values: &[&str]) -> Vec<Option<String>> {
    values.iter().map(|v| Some(v.to_string())).collect()
}

pub fn perfect_greetings() -> Vec<Option<String>> {
    answers(&["Hola", "Adios", "Gracias"])
}

pub fn perfect_numbers() -> Vec<Option<String>> {
    answers(&["Uno", "Dos"])
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
}

/// Starts `lesson_id` and submits `answers` for the new session.
pub async fn play(
    engine: &Engine,
    user_id: Uuid,
    lesson_id: LessonId,
    answers: Vec<Option<String>>,
) -> EngineResult<SessionReceipt> {
    let ticket = engine.start_session(user_id, lesson_id).await?;
    engine
        .submit_session(user_id, lesson_id, ticket.session_id, answers)
        .await
}

pub struct Harness {
    pub engine: Arc<Engine>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
}

pub fn harness() -> Harness {
    harness_with(EngineSettings::default())
}

pub fn harness_with(settings: EngineSettings) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone(), settings);
    let clock = Arc::new(ManualClock::new(start_time()));
    Harness {
        engine: Arc::new(engine.with_clock(clock.clone())),
        store,
        clock,
    }
}

pub fn engine_over(store: Arc<dyn AccountStore>, settings: EngineSettings) -> Engine {
    let curriculum = parse_curriculum(CURRICULUM).unwrap();
    Engine::new(store, Arc::new(curriculum), Arc::new(Catalog::builtin()), settings)
}

impl Harness {
    pub async fn learner(&self) -> Uuid {
        let user_id = Uuid::new_v4();
        self.engine.ensure_account(user_id).await.unwrap();
        user_id
    }

    pub async fn play(
        &self,
        user_id: Uuid,
        lesson_id: LessonId,
        answers: Vec<Option<String>>,
    ) -> EngineResult<SessionReceipt> {
        play(&self.engine, user_id, lesson_id, answers).await
    }

    /// Edits a stored account directly, bypassing the engine rules.
    pub async fn set_account(&self, user_id: Uuid, edit: impl FnOnce(&mut User)) -> User {
        let mut user = self.store.get_user(user_id).await.unwrap();
        edit(&mut user);
        self.store
            .commit(AccountWrite::economy_only(user))
            .await
            .unwrap()
    }
}
