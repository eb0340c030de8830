//! crates/englishquest_core/src/leaderboard.rs
//!
//! A read-only ranking over user records, recomputed on every read.

use crate::domain::{LeaderboardEntry, User};

/// Top `limit` users by experience, ties going to the earlier account.
pub fn rank(mut users: Vec<User>, limit: usize) -> Vec<LeaderboardEntry> {
    users.sort_by(|a, b| {
        b.experience
            .cmp(&a.experience)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.user_id.cmp(&b.user_id))
    });

    users
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(index, user)| LeaderboardEntry {
            rank: index as u32 + 1,
            user_id: user.user_id,
            username: user.username,
            experience: user.experience,
            level: user.level,
            created_at: user.created_at,
        })
        .collect()
}
