//! services/api/src/content.rs
//!
//! Loads authored content (the curriculum and the shop catalog) from JSON files
//! and converts it into validated core types.

use std::path::Path;

use chrono::Duration;
use englishquest_core::shop::Catalog;
use englishquest_core::{
    ContentError, Curriculum, HeartRefill, ItemEffect, Lesson, Level, Question, ShopItem,
};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ContentLoadError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse content JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid content: {0}")]
    Invalid(#[from] ContentError),
}

//=========================================================================================
// File Formats
//=========================================================================================

#[derive(Deserialize)]
struct CurriculumFile {
    levels: Vec<LevelFile>,
}

#[derive(Deserialize)]
struct LevelFile {
    id: i64,
    title: String,
    #[serde(default)]
    description: String,
    order: u32,
    #[serde(default)]
    required_experience: u64,
    #[serde(default)]
    lessons: Vec<LessonFile>,
}

#[derive(Deserialize)]
struct LessonFile {
    id: i64,
    title: String,
    #[serde(default)]
    description: String,
    order: u32,
    #[serde(default)]
    questions: Vec<QuestionFile>,
}

#[derive(Deserialize)]
struct QuestionFile {
    id: i64,
    prompt: String,
    options: Vec<String>,
    correct_option: String,
}

#[derive(Deserialize)]
struct CatalogFile {
    items: Vec<ItemFile>,
}

#[derive(Deserialize)]
struct ItemFile {
    id: i64,
    name: String,
    #[serde(default)]
    description: String,
    price: u64,
    #[serde(flatten)]
    effect: EffectFile,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum EffectFile {
    Heart {
        /// Hearts restored; omitted means a full refill.
        #[serde(default)]
        refill: Option<u32>,
        #[serde(default)]
        max_hearts_bonus: u32,
    },
    Boost {
        duration_minutes: i64,
        #[serde(default = "default_multiplier")]
        multiplier: u32,
    },
    Coins {
        amount: u64,
    },
    Cosmetic,
}

fn default_multiplier() -> u32 {
    2
}

//=========================================================================================
// Conversion to Domain Types
//=========================================================================================

impl LevelFile {
    fn to_domain(self) -> Level {
        let level_id = self.id;
        Level {
            id: self.id,
            title: self.title,
            description: self.description,
            order: self.order,
            required_experience: self.required_experience,
            lessons: self
                .lessons
                .into_iter()
                .map(|lesson| Lesson {
                    id: lesson.id,
                    level_id,
                    title: lesson.title,
                    description: lesson.description,
                    order: lesson.order,
                    questions: lesson
                        .questions
                        .into_iter()
                        .map(|q| Question {
                            id: q.id,
                            prompt: q.prompt,
                            options: q.options,
                            correct_option: q.correct_option,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

/// The longest boost `chrono::Duration::minutes` can represent.
const MAX_BOOST_MINUTES: i64 = i64::MAX / 60_000;

impl ItemFile {
    fn to_domain(self) -> Result<ShopItem, ContentError> {
        let effect = match self.effect {
            EffectFile::Heart {
                refill,
                max_hearts_bonus,
            } => ItemEffect::Heart {
                refill: refill.map(HeartRefill::Amount).unwrap_or(HeartRefill::Full),
                max_hearts_bonus,
            },
            EffectFile::Boost {
                duration_minutes,
                multiplier,
            } => {
                if !(1..=MAX_BOOST_MINUTES).contains(&duration_minutes) {
                    return Err(ContentError::InvalidBoostDuration {
                        item_id: self.id,
                        minutes: duration_minutes,
                    });
                }
                ItemEffect::Boost {
                    duration: Duration::minutes(duration_minutes),
                    multiplier,
                }
            }
            EffectFile::Coins { amount } => ItemEffect::Coins { amount },
            EffectFile::Cosmetic => ItemEffect::Cosmetic,
        };
        Ok(ShopItem {
            id: self.id,
            name: self.name,
            description: self.description,
            price: self.price,
            effect,
        })
    }
}

//=========================================================================================
// Loaders
//=========================================================================================

pub fn parse_curriculum(json: &str) -> Result<Curriculum, ContentLoadError> {
    let file: CurriculumFile = serde_json::from_str(json)?;
    let levels = file.levels.into_iter().map(LevelFile::to_domain).collect();
    Ok(Curriculum::new(levels)?)
}

pub fn parse_catalog(json: &str) -> Result<Catalog, ContentLoadError> {
    let file: CatalogFile = serde_json::from_str(json)?;
    let items = file
        .items
        .into_iter()
        .map(ItemFile::to_domain)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Catalog::new(items)?)
}

pub fn load_curriculum(path: &Path) -> Result<Curriculum, ContentLoadError> {
    parse_curriculum(&read(path)?)
}

/// Reads the catalog file, or falls back to the built-in catalog when none is configured.
pub fn load_catalog(path: Option<&Path>) -> Result<Catalog, ContentLoadError> {
    match path {
        Some(path) => parse_catalog(&read(path)?),
        None => Ok(Catalog::builtin()),
    }
}

fn read(path: &Path) -> Result<String, ContentLoadError> {
    std::fs::read_to_string(path).map_err(|source| ContentLoadError::Read {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use englishquest_core::ItemKind;

    #[test]
    fn parses_nested_curriculum() {
        let json = r#"{
            "levels": [
                { "id": 7, "title": "Basics", "order": 1, "required_experience": 0,
                  "lessons": [
                    { "id": 70, "title": "Colors", "order": 1,
                      "questions": [
                        { "id": 1, "prompt": "Sky?", "options": ["Blue", "Red"], "correct_option": "Blue" }
                      ] }
                  ] }
            ]
        }"#;
        let curriculum = parse_curriculum(json).unwrap();
        let (level, lesson) = curriculum.find_lesson(70).unwrap();
        assert_eq!(level.id, 7);
        assert_eq!(lesson.level_id, 7);
        assert_eq!(lesson.questions[0].correct_option, "Blue");
    }

    #[test]
    fn invalid_curriculum_is_a_content_error() {
        let json = r#"{ "levels": [ { "id": 1, "title": "Two", "order": 2 } ] }"#;
        assert!(matches!(
            parse_curriculum(json),
            Err(ContentLoadError::Invalid(ContentError::NonContiguousLevels { .. }))
        ));
    }

    #[test]
    fn parses_catalog_effects() {
        let json = r#"{
            "items": [
                { "id": 1, "name": "Refill", "price": 20, "type": "heart" },
                { "id": 2, "name": "Small", "price": 10, "type": "heart", "refill": 1 },
                { "id": 3, "name": "Boost", "price": 90, "type": "boost", "duration_minutes": 15 },
                { "id": 4, "name": "Promo", "price": 0, "type": "coins", "amount": 25 },
                { "id": 5, "name": "Hat", "price": 300, "type": "cosmetic" }
            ]
        }"#;
        let catalog = parse_catalog(json).unwrap();
        let kinds: Vec<ItemKind> = catalog.items().iter().map(|i| i.kind()).collect();
        assert_eq!(
            kinds,
            vec![ItemKind::Heart, ItemKind::Heart, ItemKind::Boost, ItemKind::Coins, ItemKind::Cosmetic]
        );
        assert_eq!(
            catalog.items()[0].effect,
            ItemEffect::Heart { refill: HeartRefill::Full, max_hearts_bonus: 0 }
        );
        assert_eq!(
            catalog.items()[2].effect,
            ItemEffect::Boost { duration: Duration::minutes(15), multiplier: 2 }
        );
    }

    #[test]
    fn negative_boost_duration_is_rejected() {
        let json = r#"{
            "items": [
                { "id": 9, "name": "Broken", "price": 10, "type": "boost", "duration_minutes": -30 }
            ]
        }"#;
        assert!(matches!(
            parse_catalog(json),
            Err(ContentLoadError::Invalid(ContentError::InvalidBoostDuration { item_id: 9, minutes: -30 }))
        ));

        let zero = r#"{ "items": [ { "id": 9, "name": "Blink", "price": 10, "type": "boost", "duration_minutes": 0 } ] }"#;
        assert!(parse_catalog(zero).is_err());
    }

    #[test]
    fn bundled_curriculum_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../content/curriculum.json");
        let curriculum = load_curriculum(&path).unwrap();
        assert_eq!(curriculum.levels().len(), 5);
    }

    #[test]
    fn bundled_catalog_matches_builtin() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../content/catalog.json");
        let catalog = load_catalog(Some(&path)).unwrap();
        assert_eq!(catalog.items(), Catalog::builtin().items());
    }
}
