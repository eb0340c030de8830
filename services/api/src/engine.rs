//! services/api/src/engine.rs
//!
//! The engine service: every operation the HTTP layer exposes, run against the
//! `AccountStore` port. Reads and writes for one user are grouped into a single
//! `AccountWrite` and committed under an optimistic version check; a lost race
//! re-reads and recomputes, up to the configured retry limit.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use englishquest_core::economy::{LevelCurve, RewardPolicy};
use englishquest_core::mistakes::MasteryFilter;
use englishquest_core::progression::{self, ProgressionPolicy, SessionOutcome, SessionSubmission};
use englishquest_core::scoring::{self, SessionScore};
use englishquest_core::shop::{self, Catalog};
use englishquest_core::{
    leaderboard, unlock, AccountStore, AccountWrite, Curriculum, EconomySnapshot, EngineError,
    EngineResult, ItemId, LeaderboardEntry, Lesson, LessonId, LessonStatus, PortError,
    PracticeSession, ProgressRecord, QuestionId, ShopItem, User, WrongQuestionEntry,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{EngineSettings, LevelCurveSource};

//=========================================================================================
// Clock
//=========================================================================================

/// Source of the current time, swappable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

//=========================================================================================
// Views Returned to Callers
//=========================================================================================

#[derive(Debug, Clone)]
pub struct LessonSummary {
    pub id: LessonId,
    pub title: String,
    pub description: String,
    pub order: u32,
    pub question_count: usize,
    pub status: LessonStatus,
    pub best_score: Option<u8>,
}

#[derive(Debug, Clone)]
pub struct LevelView {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub order: u32,
    pub required_experience: u64,
    pub lessons: Vec<LessonSummary>,
}

/// A question as shown before scoring: no correct option.
#[derive(Debug, Clone)]
pub struct QuestionView {
    pub id: QuestionId,
    pub prompt: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LessonView {
    pub id: LessonId,
    pub level_id: i64,
    pub title: String,
    pub description: String,
    pub status: LessonStatus,
    pub questions: Vec<QuestionView>,
}

impl LessonView {
    fn new(lesson: &Lesson, status: LessonStatus) -> Self {
        Self {
            id: lesson.id,
            level_id: lesson.level_id,
            title: lesson.title.clone(),
            description: lesson.description.clone(),
            status,
            questions: lesson
                .questions
                .iter()
                .map(|q| QuestionView {
                    id: q.id,
                    prompt: q.prompt.clone(),
                    options: q.options.clone(),
                })
                .collect(),
        }
    }
}

/// Returned by a successful start. The `session_id` must accompany the submission.
#[derive(Debug, Clone)]
pub struct SessionTicket {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub lesson: LessonView,
}

/// A missed question revealed after scoring.
#[derive(Debug, Clone)]
pub struct Correction {
    pub question_id: QuestionId,
    pub submitted_answer: Option<String>,
    pub correct_answer: String,
}

#[derive(Debug, Clone)]
pub struct SessionReceipt {
    pub outcome: SessionOutcome,
    pub correct: u32,
    pub total: u32,
    pub corrections: Vec<Correction>,
    pub progress: ProgressRecord,
    pub economy: EconomySnapshot,
}

#[derive(Debug, Clone)]
pub struct PurchaseReceipt {
    pub item: ShopItem,
    pub economy: EconomySnapshot,
}

#[derive(Debug, Clone)]
pub struct Profile {
    pub user_id: Uuid,
    pub username: Option<String>,
    pub created_at: DateTime<Utc>,
    pub economy: EconomySnapshot,
}

impl Profile {
    fn new(user: &User, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user.user_id,
            username: user.username.clone(),
            created_at: user.created_at,
            economy: user.snapshot(now),
        }
    }
}

//=========================================================================================
// Engine
//=========================================================================================

pub struct Engine {
    store: Arc<dyn AccountStore>,
    curriculum: Arc<Curriculum>,
    catalog: Arc<Catalog>,
    policy: ProgressionPolicy,
    settings: EngineSettings,
    clock: Arc<dyn Clock>,
}

impl Engine {
    pub fn new(
        store: Arc<dyn AccountStore>,
        curriculum: Arc<Curriculum>,
        catalog: Arc<Catalog>,
        settings: EngineSettings,
    ) -> Self {
        let level_curve = match settings.level_curve {
            LevelCurveSource::Linear { xp_per_level } => LevelCurve::Linear { xp_per_level },
            LevelCurveSource::Curriculum => LevelCurve::from_curriculum(&curriculum),
        };
        let policy = ProgressionPolicy {
            passing_score: settings.passing_score,
            level_curve,
            rewards: RewardPolicy {
                coins_score_divisor: settings.coins_score_divisor,
                level_up_bonus: settings.level_up_bonus_coins,
            },
            day_offset: settings.streak_offset,
        };
        Self {
            store,
            curriculum,
            catalog,
            policy,
            settings,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    // --- Accounts ---

    /// Returns the caller's account, creating it with default resources on first sight.
    pub async fn ensure_account(&self, user_id: Uuid) -> EngineResult<User> {
        let now = self.clock.now();
        Ok(self
            .store
            .get_or_create_user(user_id, &self.settings.account_defaults, now)
            .await?)
    }

    pub async fn profile(&self, user_id: Uuid) -> EngineResult<Profile> {
        let user = self.store.get_user(user_id).await?;
        Ok(Profile::new(&user, self.clock.now()))
    }

    pub async fn update_username(&self, user_id: Uuid, username: &str) -> EngineResult<Profile> {
        let username = username.trim();
        let length = username.chars().count();
        if !(3..=32).contains(&length) {
            return Err(EngineError::Validation(
                "username must be between 3 and 32 characters".to_string(),
            ));
        }
        if !username
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            return Err(EngineError::Validation(
                "username may only contain letters, digits, '_', '-' and '.'".to_string(),
            ));
        }
        let user = self.store.update_username(user_id, username).await?;
        Ok(Profile::new(&user, self.clock.now()))
    }

    // --- Curriculum ---

    /// Every level and lesson with the caller's unlock status.
    pub async fn curriculum_for(&self, user_id: Uuid) -> EngineResult<Vec<LevelView>> {
        let user = self.store.get_user(user_id).await?;
        let progress = self.store.list_progress(user_id).await?;
        let unlocks = unlock::resolve(user.level, &self.curriculum, &progress);

        let status_of = |lesson_id: LessonId| {
            unlocks
                .iter()
                .find(|u| u.lesson_id == lesson_id)
                .map(|u| u.status)
                .unwrap_or(LessonStatus::Locked)
        };
        let best_of = |lesson_id: LessonId| {
            progress
                .iter()
                .find(|p| p.lesson_id == lesson_id)
                .map(|p| p.best_score)
        };

        Ok(self
            .curriculum
            .levels()
            .iter()
            .map(|level| LevelView {
                id: level.id,
                title: level.title.clone(),
                description: level.description.clone(),
                order: level.order,
                required_experience: level.required_experience,
                lessons: level
                    .lessons
                    .iter()
                    .map(|lesson| LessonSummary {
                        id: lesson.id,
                        title: lesson.title.clone(),
                        description: lesson.description.clone(),
                        order: lesson.order,
                        question_count: lesson.questions.len(),
                        status: status_of(lesson.id),
                        best_score: best_of(lesson.id),
                    })
                    .collect(),
            })
            .collect())
    }

    /// A lesson and its questions, without correct answers.
    pub async fn lesson_detail(&self, user_id: Uuid, lesson_id: LessonId) -> EngineResult<LessonView> {
        let (status, lesson) = self.lesson_with_status(user_id, lesson_id).await?;
        Ok(LessonView::new(lesson, status))
    }

    async fn lesson_with_status(
        &self,
        user_id: Uuid,
        lesson_id: LessonId,
    ) -> EngineResult<(LessonStatus, &Lesson)> {
        let (_, lesson) = self
            .curriculum
            .find_lesson(lesson_id)
            .ok_or_else(|| EngineError::NotFound(format!("lesson {}", lesson_id)))?;
        let user = self.store.get_user(user_id).await?;
        let progress = self.store.list_progress(user_id).await?;
        let status = unlock::lesson_status(user.level, &self.curriculum, &progress, lesson_id)
            .unwrap_or(LessonStatus::Locked);
        Ok((status, lesson))
    }

    /// Every lesson the learner has attempted, ordered by lesson id.
    pub async fn progress(&self, user_id: Uuid) -> EngineResult<Vec<ProgressRecord>> {
        Ok(self.store.list_progress(user_id).await?)
    }

    // --- Sessions ---

    /// Opens a practice session. Requires the lesson to be unlocked and at least one heart.
    pub async fn start_session(&self, user_id: Uuid, lesson_id: LessonId) -> EngineResult<SessionTicket> {
        let ticket = self
            .with_retry("start_session", user_id, || {
                self.try_start_session(user_id, lesson_id)
            })
            .await?;
        info!(
            "User {} started lesson {} in session {}",
            user_id, lesson_id, ticket.session_id
        );
        Ok(ticket)
    }

    async fn try_start_session(&self, user_id: Uuid, lesson_id: LessonId) -> EngineResult<SessionTicket> {
        let now = self.clock.now();
        let (_, lesson) = self
            .curriculum
            .find_lesson(lesson_id)
            .ok_or_else(|| EngineError::NotFound(format!("lesson {}", lesson_id)))?;
        let user = self.store.get_user(user_id).await?;
        if user.hearts == 0 {
            warn!("User {} tried to start lesson {} with no hearts", user_id, lesson_id);
            return Err(EngineError::AccessDenied(
                "no hearts remaining; refill hearts to start a new session".to_string(),
            ));
        }
        let progress = self.store.list_progress(user_id).await?;
        let status = unlock::lesson_status(user.level, &self.curriculum, &progress, lesson_id)
            .unwrap_or(LessonStatus::Locked);
        if status == LessonStatus::Locked {
            return Err(EngineError::AccessDenied(format!("lesson {} is locked", lesson_id)));
        }

        let pruned = self
            .store
            .prune_sessions(user_id, now - self.settings.session_retention)
            .await?;
        if pruned > 0 {
            info!("Forgot {} expired practice sessions of user {}", pruned, user_id);
        }

        let session = PracticeSession::open(user_id, lesson_id, now);
        self.store
            .commit(AccountWrite::open_session(user, session.clone()))
            .await?;
        Ok(SessionTicket {
            session_id: session.session_id,
            started_at: now,
            lesson: LessonView::new(lesson, status),
        })
    }

    /// Scores the answers for a started session and applies the result,
    /// closing the session.
    pub async fn submit_session(
        &self,
        user_id: Uuid,
        lesson_id: LessonId,
        session_id: Uuid,
        answers: Vec<Option<String>>,
    ) -> EngineResult<SessionReceipt> {
        let (_, lesson) = self
            .curriculum
            .find_lesson(lesson_id)
            .ok_or_else(|| EngineError::NotFound(format!("lesson {}", lesson_id)))?;
        let scored = scoring::score_session(&lesson.questions, &answers).map_err(|e| {
            warn!("Rejected submission for lesson {} from user {}: {}", lesson_id, user_id, e);
            e
        })?;

        let receipt = self
            .with_retry("submit_session", user_id, || {
                self.try_apply_session(user_id, lesson, &scored, session_id)
            })
            .await?;

        info!(
            "Applied lesson {} for user {}: score {}, +{} xp, +{} coins, {} hearts lost",
            lesson_id,
            user_id,
            receipt.outcome.score,
            receipt.outcome.experience_gained,
            receipt.outcome.coins_gained,
            receipt.outcome.hearts_lost
        );
        Ok(receipt)
    }

    async fn try_apply_session(
        &self,
        user_id: Uuid,
        lesson: &Lesson,
        scored: &SessionScore,
        session_id: Uuid,
    ) -> EngineResult<SessionReceipt> {
        let now = self.clock.now();
        let user = self.store.get_user(user_id).await?;
        let progress = self.store.list_progress(user_id).await?;
        let status = unlock::lesson_status(user.level, &self.curriculum, &progress, lesson.id)
            .unwrap_or(LessonStatus::Locked);
        let session = self
            .store
            .get_session(user_id, session_id)
            .await
            .map_err(|e| match e {
                PortError::NotFound(_) => {
                    warn!(
                        "User {} submitted lesson {} without a started session {}",
                        user_id, lesson.id, session_id
                    );
                    EngineError::AccessDenied(format!(
                        "session {} was never started or has expired; start the lesson first",
                        session_id
                    ))
                }
                other => other.into(),
            })?;

        if session.is_open() && now - session.started_at > self.settings.session_retention {
            return Err(EngineError::AccessDenied(format!(
                "session {} has expired; start the lesson again",
                session_id
            )));
        }

        let submission = SessionSubmission::from_score(lesson.id, scored, session_id);
        let validated = progression::validate(submission, lesson, status, &session).map_err(|e| {
            warn!("Rejected submission for lesson {} from user {}: {}", lesson.id, user_id, e);
            e
        })?;

        let mistakes = self.store.list_mistakes(user_id).await?;
        let existing = progress.iter().find(|p| p.lesson_id == lesson.id);
        let applied = progression::apply(
            &user,
            existing,
            &mistakes,
            lesson,
            &validated,
            &self.policy,
            now,
        );

        let stored = self.store.commit(applied.write).await?;

        let corrections = scored
            .missed
            .iter()
            .filter_map(|missed| {
                lesson.question(missed.question_id).map(|q| Correction {
                    question_id: q.id,
                    submitted_answer: missed.submitted_answer.clone(),
                    correct_answer: q.correct_option.clone(),
                })
            })
            .collect();

        Ok(SessionReceipt {
            outcome: applied.outcome,
            correct: scored.correct,
            total: scored.total,
            corrections,
            progress: applied.progress,
            economy: stored.snapshot(now),
        })
    }

    // --- Mistake notebook ---

    pub async fn list_mistakes(
        &self,
        user_id: Uuid,
        filter: MasteryFilter,
    ) -> EngineResult<Vec<WrongQuestionEntry>> {
        let mut entries: Vec<WrongQuestionEntry> = self
            .store
            .list_mistakes(user_id)
            .await?
            .into_iter()
            .filter(|entry| filter.matches(entry))
            .collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(entries)
    }

    pub async fn mark_mastered(&self, user_id: Uuid, entry_id: Uuid) -> EngineResult<WrongQuestionEntry> {
        let entry = self
            .store
            .mark_mastered(user_id, entry_id, self.clock.now())
            .await?;
        info!("User {} mastered question {} of lesson {}", user_id, entry.question_id, entry.lesson_id);
        Ok(entry)
    }

    // --- Shop ---

    pub fn catalog(&self) -> &[ShopItem] {
        self.catalog.items()
    }

    pub async fn purchase(&self, user_id: Uuid, item_id: ItemId) -> EngineResult<PurchaseReceipt> {
        let item = self.catalog.find(item_id)?.clone();
        let receipt = self
            .with_retry("purchase", user_id, || self.try_purchase(user_id, &item))
            .await?;
        info!(
            "User {} bought {} ({}) for {} coins",
            user_id,
            item.name,
            item.kind().as_str(),
            item.price
        );
        Ok(receipt)
    }

    async fn try_purchase(&self, user_id: Uuid, item: &ShopItem) -> EngineResult<PurchaseReceipt> {
        let now = self.clock.now();
        let user = self.store.get_user(user_id).await?;
        let next = shop::purchase(&user, item, now)?;
        let stored = self.store.commit(AccountWrite::economy_only(next)).await?;
        Ok(PurchaseReceipt {
            item: item.clone(),
            economy: stored.snapshot(now),
        })
    }

    // --- Leaderboard ---

    /// The top learners; `limit` defaults to and is capped by the configured size.
    pub async fn leaderboard(&self, limit: Option<usize>) -> EngineResult<Vec<LeaderboardEntry>> {
        let size = self.settings.leaderboard_size;
        let limit = limit.unwrap_or(size).min(size);
        let users = self.store.leaderboard(limit).await?;
        Ok(leaderboard::rank(users, limit))
    }

    // --- Helpers ---

    /// Runs `attempt` until it succeeds, fails for a reason other than a write
    /// conflict, or runs out of retries.
    async fn with_retry<T, F, Fut>(&self, operation: &str, user_id: Uuid, mut attempt: F) -> EngineResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Err(EngineError::ConflictRetryable(reason))
                    if retries < self.settings.max_conflict_retries =>
                {
                    retries += 1;
                    warn!(
                        "{} for user {} lost a write race ({}); retry {} of {}",
                        operation, user_id, reason, retries, self.settings.max_conflict_retries
                    );
                }
                Err(EngineError::StorageUnavailable(reason)) => {
                    error!("{} for user {} failed in storage: {}", operation, user_id, reason);
                    return Err(EngineError::StorageUnavailable(reason));
                }
                other => return other,
            }
        }
    }
}
