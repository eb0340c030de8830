//! crates/englishquest_core/src/unlock.rs
//!
//! Computes which lessons a learner has completed, may attempt, or cannot see yet.

use std::collections::HashSet;

use crate::domain::{Curriculum, LessonId, LessonStatus, LevelId, ProgressRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LessonUnlock {
    pub level_id: LevelId,
    pub lesson_id: LessonId,
    pub status: LessonStatus,
}

/// Resolves every lesson of the curriculum, in curriculum order.
///
/// A completed progress record wins. Otherwise the lesson is available when it
/// opens the first level or when `user_level` has reached its level's order.
pub fn resolve(
    user_level: u32,
    curriculum: &Curriculum,
    progress: &[ProgressRecord],
) -> Vec<LessonUnlock> {
    let completed: HashSet<LessonId> = progress
        .iter()
        .filter(|record| record.completed)
        .map(|record| record.lesson_id)
        .collect();

    let mut out = Vec::new();
    for (level_index, level) in curriculum.levels().iter().enumerate() {
        for (lesson_index, lesson) in level.lessons.iter().enumerate() {
            let status = if completed.contains(&lesson.id) {
                LessonStatus::Completed
            } else if (level_index == 0 && lesson_index == 0) || user_level >= level.order {
                LessonStatus::Available
            } else {
                LessonStatus::Locked
            };
            out.push(LessonUnlock {
                level_id: level.id,
                lesson_id: lesson.id,
                status,
            });
        }
    }
    out
}

/// The status of a single lesson, or `None` if the curriculum has no such lesson.
pub fn lesson_status(
    user_level: u32,
    curriculum: &Curriculum,
    progress: &[ProgressRecord],
    lesson_id: LessonId,
) -> Option<LessonStatus> {
    resolve(user_level, curriculum, progress)
        .into_iter()
        .find(|unlock| unlock.lesson_id == lesson_id)
        .map(|unlock| unlock.status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Lesson, Level, Question};
    use chrono::Utc;
    use uuid::Uuid;

    fn curriculum() -> Curriculum {
        let lesson = |id: LessonId, level_id: LevelId, order: u32| Lesson {
            id,
            level_id,
            title: String::new(),
            description: String::new(),
            order,
            questions: vec![Question {
                id: 1,
                prompt: "?".into(),
                options: vec!["yes".into(), "no".into()],
                correct_option: "yes".into(),
            }],
        };
        let level = |id: LevelId, order: u32, lessons| Level {
            id,
            title: String::new(),
            description: String::new(),
            order,
            required_experience: 0,
            lessons,
        };
        Curriculum::new(vec![
            level(1, 1, vec![lesson(11, 1, 1), lesson(12, 1, 2)]),
            level(2, 2, vec![lesson(21, 2, 1)]),
            level(3, 3, vec![lesson(31, 3, 1)]),
        ])
        .unwrap()
    }

    fn done(lesson_id: LessonId, completed: bool) -> ProgressRecord {
        ProgressRecord {
            user_id: Uuid::nil(),
            lesson_id,
            completed,
            best_score: 0,
            attempts: 1,
            last_attempted_at: Utc::now(),
        }
    }

    fn statuses(unlocks: &[LessonUnlock]) -> Vec<(LessonId, LessonStatus)> {
        unlocks.iter().map(|u| (u.lesson_id, u.status)).collect()
    }

    #[test]
    fn new_learner_sees_first_level_only() {
        let unlocks = resolve(1, &curriculum(), &[]);
        assert_eq!(
            statuses(&unlocks),
            vec![
                (11, LessonStatus::Available),
                (12, LessonStatus::Available),
                (21, LessonStatus::Locked),
                (31, LessonStatus::Locked),
            ]
        );
    }

    #[test]
    fn level_unlocks_whole_tiers_and_completion_wins() {
        let progress = vec![done(11, true), done(21, false), done(31, true)];
        let unlocks = resolve(2, &curriculum(), &progress);
        assert_eq!(
            statuses(&unlocks),
            vec![
                (11, LessonStatus::Completed),
                (12, LessonStatus::Available),
                (21, LessonStatus::Available),
                (31, LessonStatus::Completed),
            ]
        );
    }

    #[test]
    fn first_lesson_is_always_reachable() {
        let unlocks = resolve(0, &curriculum(), &[]);
        assert_eq!(unlocks[0].status, LessonStatus::Available);
        assert_eq!(unlocks[1].status, LessonStatus::Locked);
    }

    #[test]
    fn resolution_is_repeatable() {
        let c = curriculum();
        let progress = vec![done(12, true)];
        assert_eq!(resolve(2, &c, &progress), resolve(2, &c, &progress));
        assert_eq!(lesson_status(2, &c, &progress, 12), Some(LessonStatus::Completed));
        assert_eq!(lesson_status(2, &c, &progress, 404), None);
    }
}
