//! crates/englishquest_core/src/economy.rs
//!
//! Pure functions over a learner's numeric resources: hearts, coins,
//! experience, level, streak and boost expiry.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

use crate::domain::Curriculum;
use crate::error::{EngineError, EngineResult};

//=========================================================================================
// Hearts and coins
//=========================================================================================

/// Hearts after losing `lost`; never below zero.
pub fn deduct_hearts(hearts: u32, lost: u32) -> u32 {
    hearts.saturating_sub(lost)
}

/// Hearts after a refill, capped at `max_hearts`.
pub fn refill_hearts(hearts: u32, amount: u32, max_hearts: u32) -> u32 {
    hearts.saturating_add(amount).min(max_hearts)
}

/// Balance after paying `price`, or `InsufficientFunds` when it would go negative.
pub fn spend_coins(balance: u64, price: u64) -> EngineResult<u64> {
    balance
        .checked_sub(price)
        .ok_or(EngineError::InsufficientFunds { price, balance })
}

pub fn grant_coins(balance: u64, amount: u64) -> u64 {
    balance.saturating_add(amount)
}

//=========================================================================================
// Experience and boosts
//=========================================================================================

pub fn boost_active(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    matches!(expires_at, Some(expiry) if expiry > now)
}

/// Experience earned for `base` points, multiplied while a boost is active at `now`.
pub fn experience_award(
    base: u64,
    boost_expires_at: Option<DateTime<Utc>>,
    multiplier: u32,
    now: DateTime<Utc>,
) -> u64 {
    if boost_active(boost_expires_at, now) {
        base.saturating_mul(u64::from(multiplier.max(1)))
    } else {
        base
    }
}

/// Maps cumulative experience to a level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelCurve {
    /// `level = 1 + experience / xp_per_level`
    Linear { xp_per_level: u64 },
    /// Ascending experience thresholds; the level is the number of thresholds reached.
    Thresholds(Vec<u64>),
}

impl Default for LevelCurve {
    fn default() -> Self {
        LevelCurve::Linear { xp_per_level: 100 }
    }
}

impl LevelCurve {
    /// Builds a threshold curve from each level's `required_experience`.
    pub fn from_curriculum(curriculum: &Curriculum) -> Self {
        let mut thresholds: Vec<u64> = curriculum
            .levels()
            .iter()
            .map(|level| level.required_experience)
            .collect();
        thresholds.sort_unstable();
        LevelCurve::Thresholds(thresholds)
    }

    pub fn level_for(&self, experience: u64) -> u32 {
        let level = match self {
            LevelCurve::Linear { xp_per_level } => {
                1 + experience / (*xp_per_level).max(1)
            }
            LevelCurve::Thresholds(thresholds) => {
                thresholds.iter().filter(|t| **t <= experience).count() as u64
            }
        };
        u32::try_from(level).unwrap_or(u32::MAX).max(1)
    }
}

/// The level after reaching `experience`; never lower than `current`.
pub fn next_level(current: u32, curve: &LevelCurve, experience: u64) -> u32 {
    current.max(curve.level_for(experience))
}

//=========================================================================================
// Streaks
//=========================================================================================

/// The learner's calendar day for `now` in the given offset.
pub fn calendar_day(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

/// Streak after activity on `today`.
///
/// Same-day activity leaves the count alone, activity the day after the last
/// one extends it, and anything else starts over at 1.
pub fn next_streak(current: u32, last_active_on: Option<NaiveDate>, today: NaiveDate) -> u32 {
    match last_active_on {
        Some(last) if last == today => current.max(1),
        Some(last) if last.succ_opt() == Some(today) => current.saturating_add(1),
        _ => 1,
    }
}

//=========================================================================================
// Coin rewards
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardPolicy {
    /// One coin per this many score points.
    pub coins_score_divisor: u64,
    /// Coins granted for every level gained.
    pub level_up_bonus: u64,
}

impl Default for RewardPolicy {
    fn default() -> Self {
        Self {
            coins_score_divisor: 5,
            level_up_bonus: 50,
        }
    }
}

impl RewardPolicy {
    pub fn session_coins(&self, score: u8, levels_gained: u32) -> u64 {
        let from_score = u64::from(score) / self.coins_score_divisor.max(1);
        from_score + self.level_up_bonus * u64::from(levels_gained)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn hearts_stay_within_bounds() {
        assert_eq!(deduct_hearts(2, 5), 0);
        assert_eq!(deduct_hearts(5, 1), 4);
        assert_eq!(refill_hearts(4, 3, 5), 5);
        assert_eq!(refill_hearts(1, 2, 5), 3);
    }

    #[test]
    fn spending_more_than_balance_is_refused() {
        assert_eq!(
            spend_coins(100, 150),
            Err(EngineError::InsufficientFunds { price: 150, balance: 100 })
        );
        assert_eq!(spend_coins(150, 150), Ok(0));
    }

    #[test]
    fn boost_doubles_only_while_active() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let active = Some(now + Duration::minutes(10));
        let expired = Some(now - Duration::seconds(1));

        assert_eq!(experience_award(50, active, 2, now), 100);
        assert_eq!(experience_award(50, expired, 2, now), 50);
        assert_eq!(experience_award(50, None, 2, now), 50);
        // Expiry exactly at `now` is no longer in the future.
        assert_eq!(experience_award(50, Some(now), 2, now), 50);
    }

    #[test]
    fn linear_curve_levels() {
        let curve = LevelCurve::default();
        assert_eq!(curve.level_for(0), 1);
        assert_eq!(curve.level_for(99), 1);
        assert_eq!(curve.level_for(100), 2);
        assert_eq!(curve.level_for(250), 3);
    }

    #[test]
    fn threshold_curve_levels() {
        let curve = LevelCurve::Thresholds(vec![0, 100, 250, 450, 700]);
        assert_eq!(curve.level_for(0), 1);
        assert_eq!(curve.level_for(249), 2);
        assert_eq!(curve.level_for(450), 4);
        assert_eq!(curve.level_for(10_000), 5);

        // A curve whose first threshold is above zero still starts at level 1.
        let curve = LevelCurve::Thresholds(vec![50]);
        assert_eq!(curve.level_for(0), 1);
    }

    #[test]
    fn level_never_decreases() {
        let curve = LevelCurve::Linear { xp_per_level: 1_000 };
        assert_eq!(next_level(4, &curve, 10), 4);
        assert_eq!(next_level(1, &curve, 2_500), 3);
    }

    #[test]
    fn streak_rules() {
        let today = day(2024, 3, 10);
        assert_eq!(next_streak(4, Some(day(2024, 3, 9)), today), 5);
        assert_eq!(next_streak(4, Some(today), today), 4);
        assert_eq!(next_streak(4, Some(day(2024, 3, 7)), today), 1);
        assert_eq!(next_streak(0, None, today), 1);
    }

    #[test]
    fn calendar_day_respects_offset() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 23, 30, 0).unwrap();
        assert_eq!(calendar_day(now, FixedOffset::east_opt(0).unwrap()), day(2024, 3, 10));
        assert_eq!(
            calendar_day(now, FixedOffset::east_opt(3600).unwrap()),
            day(2024, 3, 11)
        );
    }

    #[test]
    fn session_coins_include_level_bonus() {
        let policy = RewardPolicy::default();
        assert_eq!(policy.session_coins(75, 0), 15);
        assert_eq!(policy.session_coins(100, 2), 120);
    }
}
