pub mod domain;
pub mod economy;
pub mod error;
pub mod leaderboard;
pub mod mistakes;
pub mod ports;
pub mod progression;
pub mod scoring;
pub mod shop;
pub mod unlock;

pub use domain::{
    AccountDefaults, ContentError, Curriculum, EconomySnapshot, HeartRefill, ItemEffect, ItemId,
    ItemKind, LeaderboardEntry, Lesson, LessonId, LessonStatus, Level, LevelId, PracticeSession,
    ProgressRecord, Question, QuestionId, ShopItem, User, WrongQuestionEntry,
};
pub use error::{EngineError, EngineResult};
pub use ports::{AccountStore, AccountWrite, PortError, PortResult};
