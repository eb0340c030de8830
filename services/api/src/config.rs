//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{Duration, FixedOffset, Offset, Utc};
use englishquest_core::AccountDefaults;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which `AccountStore` implementation backs the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres { database_url: String, max_connections: u32 },
    Memory,
}

/// How cumulative experience maps to a level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LevelCurveSource {
    Linear { xp_per_level: u64 },
    /// Use each curriculum level's `required_experience`.
    Curriculum,
}

/// Tunables for the progression and shop rules.
#[derive(Clone, Debug)]
pub struct EngineSettings {
    pub passing_score: u8,
    pub account_defaults: AccountDefaults,
    pub level_curve: LevelCurveSource,
    pub coins_score_divisor: u64,
    pub level_up_bonus_coins: u64,
    pub max_conflict_retries: u32,
    pub leaderboard_size: usize,
    pub streak_offset: FixedOffset,
    /// How long a practice session stays submittable and remembered.
    pub session_retention: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            passing_score: 60,
            account_defaults: AccountDefaults::default(),
            level_curve: LevelCurveSource::Linear { xp_per_level: 100 },
            coins_score_divisor: 5,
            level_up_bonus_coins: 50,
            max_conflict_retries: 3,
            leaderboard_size: 10,
            streak_offset: Utc.fix(),
            session_retention: Duration::days(7),
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub storage: StorageBackend,
    pub log_level: Level,
    pub curriculum_path: PathBuf,
    pub catalog_path: Option<PathBuf>,
    pub cors_origin: String,
    pub engine: EngineSettings,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Storage Settings ---
        let bind_address: SocketAddr = parse_or("BIND_ADDRESS", "0.0.0.0:3000")?;

        let storage = match var_or("STORAGE", "postgres").to_lowercase().as_str() {
            "postgres" => StorageBackend::Postgres {
                database_url: std::env::var("DATABASE_URL")
                    .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?,
                max_connections: parse_or("DATABASE_MAX_CONNECTIONS", "5")?,
            },
            "memory" => StorageBackend::Memory,
            other => {
                return Err(ConfigError::InvalidValue(
                    "STORAGE".to_string(),
                    format!("'{}' is not one of postgres, memory", other),
                ))
            }
        };

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Content Locations ---
        let curriculum_path = PathBuf::from(var_or("CURRICULUM_PATH", "./content/curriculum.json"));
        let catalog_path = std::env::var("CATALOG_PATH").ok().map(PathBuf::from);
        let cors_origin = var_or("CORS_ORIGIN", "http://localhost:5173");

        // --- Load Engine Rules ---
        let level_curve = match var_or("LEVEL_CURVE", "linear").to_lowercase().as_str() {
            "linear" => {
                let xp_per_level: u64 = parse_or("XP_PER_LEVEL", "100")?;
                if xp_per_level == 0 {
                    return Err(ConfigError::InvalidValue(
                        "XP_PER_LEVEL".to_string(),
                        "must be greater than zero".to_string(),
                    ));
                }
                LevelCurveSource::Linear { xp_per_level }
            }
            "curriculum" => LevelCurveSource::Curriculum,
            other => {
                return Err(ConfigError::InvalidValue(
                    "LEVEL_CURVE".to_string(),
                    format!("'{}' is not one of linear, curriculum", other),
                ))
            }
        };

        let passing_score: u8 = parse_or("PASSING_SCORE", "60")?;
        if passing_score > 100 {
            return Err(ConfigError::InvalidValue(
                "PASSING_SCORE".to_string(),
                "must be between 0 and 100".to_string(),
            ));
        }

        let max_hearts: u32 = parse_or("MAX_HEARTS", "5")?;
        if max_hearts == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_HEARTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let starting_hearts: u32 = parse_or("STARTING_HEARTS", "5")?;

        let offset_minutes: i32 = parse_or("STREAK_UTC_OFFSET_MINUTES", "0")?;
        let streak_offset = offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "STREAK_UTC_OFFSET_MINUTES".to_string(),
                    format!("{} minutes is not a valid UTC offset", offset_minutes),
                )
            })?;

        let retention_hours: u32 = parse_or("SESSION_RETENTION_HOURS", "168")?;
        if retention_hours == 0 {
            return Err(ConfigError::InvalidValue(
                "SESSION_RETENTION_HOURS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let engine = EngineSettings {
            passing_score,
            account_defaults: AccountDefaults {
                starting_hearts: starting_hearts.min(max_hearts),
                max_hearts,
            },
            level_curve,
            coins_score_divisor: parse_or("COINS_SCORE_DIVISOR", "5")?,
            level_up_bonus_coins: parse_or("LEVEL_UP_BONUS_COINS", "50")?,
            max_conflict_retries: parse_or("MAX_CONFLICT_RETRIES", "3")?,
            leaderboard_size: parse_or("LEADERBOARD_SIZE", "10")?,
            streak_offset,
            session_retention: Duration::hours(i64::from(retention_hours)),
        };

        Ok(Self {
            bind_address,
            storage,
            log_level,
            curriculum_path,
            catalog_path,
            cors_origin,
            engine,
        })
    }
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T>(name: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = var_or(name, default);
    raw.parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}
