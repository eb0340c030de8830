//! crates/englishquest_core/src/shop.rs
//!
//! The item catalog and the purchase rule: pay the price, then apply the effect.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use crate::domain::{ContentError, HeartRefill, ItemEffect, ItemId, ShopItem, User};
use crate::economy;
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    items: Vec<ShopItem>,
}

impl Catalog {
    pub fn new(items: Vec<ShopItem>) -> Result<Self, ContentError> {
        let mut ids = HashSet::new();
        for item in &items {
            if !ids.insert(item.id) {
                return Err(ContentError::DuplicateId("shop item", item.id));
            }
            if let ItemEffect::Boost { duration, .. } = &item.effect {
                if *duration <= Duration::zero() {
                    return Err(ContentError::InvalidBoostDuration {
                        item_id: item.id,
                        minutes: duration.num_minutes(),
                    });
                }
            }
        }
        Ok(Self { items })
    }

    /// The catalog offered when no catalog file is configured.
    pub fn builtin() -> Self {
        Self {
            items: vec![
                ShopItem {
                    id: 1,
                    name: "Extra Heart".into(),
                    description: "Increase max hearts by 1 and refill them all".into(),
                    price: 50,
                    effect: ItemEffect::Heart {
                        refill: HeartRefill::Full,
                        max_hearts_bonus: 1,
                    },
                },
                ShopItem {
                    id: 2,
                    name: "Coins Pack".into(),
                    description: "Get 100 coins".into(),
                    price: 200,
                    effect: ItemEffect::Coins { amount: 100 },
                },
                ShopItem {
                    id: 3,
                    name: "Experience Boost".into(),
                    description: "Double XP for 30 minutes".into(),
                    price: 100,
                    effect: ItemEffect::Boost {
                        duration: Duration::minutes(30),
                        multiplier: 2,
                    },
                },
                ShopItem {
                    id: 4,
                    name: "Heart Refill".into(),
                    description: "Restore one heart".into(),
                    price: 30,
                    effect: ItemEffect::Heart {
                        refill: HeartRefill::Amount(1),
                        max_hearts_bonus: 0,
                    },
                },
                ShopItem {
                    id: 5,
                    name: "Golden Owl".into(),
                    description: "A shiny profile badge".into(),
                    price: 500,
                    effect: ItemEffect::Cosmetic,
                },
            ],
        }
    }

    pub fn items(&self) -> &[ShopItem] {
        &self.items
    }

    pub fn find(&self, item_id: ItemId) -> EngineResult<&ShopItem> {
        self.items
            .iter()
            .find(|item| item.id == item_id)
            .ok_or_else(|| EngineError::NotFound(format!("shop item {item_id}")))
    }
}

/// The buyer's state after paying for `item` and receiving its effect.
///
/// Nothing is changed when the balance does not cover the price. A boost
/// replaces any earlier boost instead of extending it.
pub fn purchase(user: &User, item: &ShopItem, now: DateTime<Utc>) -> EngineResult<User> {
    let mut next = user.clone();
    next.coins = economy::spend_coins(user.coins, item.price)?;

    match &item.effect {
        ItemEffect::Heart {
            refill,
            max_hearts_bonus,
        } => {
            next.max_hearts = next.max_hearts.saturating_add(*max_hearts_bonus);
            let amount = match refill {
                HeartRefill::Full => next.max_hearts,
                HeartRefill::Amount(amount) => *amount,
            };
            next.hearts = economy::refill_hearts(next.hearts, amount, next.max_hearts);
        }
        ItemEffect::Boost {
            duration,
            multiplier,
        } => {
            next.boost_expires_at = Some(now + *duration);
            next.boost_multiplier = (*multiplier).max(1);
        }
        ItemEffect::Coins { amount } => {
            next.coins = economy::grant_coins(next.coins, *amount);
        }
        ItemEffect::Cosmetic => {}
    }

    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AccountDefaults;
    use uuid::Uuid;

    fn buyer(coins: u64) -> User {
        let mut user = User::new(Uuid::new_v4(), &AccountDefaults::default(), Utc::now());
        user.coins = coins;
        user
    }

    fn priced(price: u64, effect: ItemEffect) -> ShopItem {
        ShopItem {
            id: 42,
            name: "Test item".into(),
            description: String::new(),
            price,
            effect,
        }
    }

    #[test]
    fn insufficient_funds_changes_nothing() {
        let user = buyer(100);
        let item = priced(150, ItemEffect::Coins { amount: 10 });
        let err = purchase(&user, &item, Utc::now()).unwrap_err();
        assert_eq!(err, EngineError::InsufficientFunds { price: 150, balance: 100 });
    }

    #[test]
    fn exact_balance_buys_once() {
        let mut user = buyer(150);
        user.hearts = 1;
        let item = priced(150, ItemEffect::Heart { refill: HeartRefill::Amount(2), max_hearts_bonus: 0 });
        let after = purchase(&user, &item, Utc::now()).unwrap();
        assert_eq!(after.coins, 0);
        assert_eq!(after.hearts, 3);
    }

    #[test]
    fn heart_refill_is_capped() {
        let mut user = buyer(100);
        user.hearts = 4;
        let item = priced(10, ItemEffect::Heart { refill: HeartRefill::Amount(3), max_hearts_bonus: 0 });
        let after = purchase(&user, &item, Utc::now()).unwrap();
        assert_eq!(after.hearts, after.max_hearts);
    }

    #[test]
    fn extra_heart_raises_cap_and_fills() {
        let mut user = buyer(60);
        user.hearts = 0;
        let catalog = Catalog::builtin();
        let after = purchase(&user, catalog.find(1).unwrap(), Utc::now()).unwrap();
        assert_eq!(after.max_hearts, 6);
        assert_eq!(after.hearts, 6);
        assert_eq!(after.coins, 10);
    }

    #[test]
    fn latest_boost_wins() {
        let user = buyer(500);
        let now = Utc::now();
        let long = priced(10, ItemEffect::Boost { duration: Duration::hours(2), multiplier: 3 });
        let short = priced(10, ItemEffect::Boost { duration: Duration::minutes(30), multiplier: 2 });

        let after_long = purchase(&user, &long, now).unwrap();
        let after_short = purchase(&after_long, &short, now).unwrap();
        assert_eq!(after_short.boost_expires_at, Some(now + Duration::minutes(30)));
        assert_eq!(after_short.boost_multiplier, 2);
    }

    #[test]
    fn coin_pack_nets_against_price() {
        let user = buyer(250);
        let after = purchase(&user, Catalog::builtin().find(2).unwrap(), Utc::now()).unwrap();
        assert_eq!(after.coins, 150);
    }

    #[test]
    fn cosmetic_only_spends() {
        let user = buyer(600);
        let after = purchase(&user, Catalog::builtin().find(5).unwrap(), Utc::now()).unwrap();
        assert_eq!(after.coins, 100);
        assert_eq!(after.hearts, user.hearts);
        assert_eq!(after.boost_expires_at, None);
    }

    #[test]
    fn unknown_items_and_duplicate_ids() {
        assert!(matches!(Catalog::builtin().find(99), Err(EngineError::NotFound(_))));
        let item = priced(1, ItemEffect::Cosmetic);
        assert_eq!(
            Catalog::new(vec![item.clone(), item]).unwrap_err(),
            ContentError::DuplicateId("shop item", 42)
        );
    }

    #[test]
    fn boosts_must_last() {
        let item = priced(1, ItemEffect::Boost { duration: Duration::minutes(-5), multiplier: 2 });
        assert_eq!(
            Catalog::new(vec![item]).unwrap_err(),
            ContentError::InvalidBoostDuration { item_id: 42, minutes: -5 }
        );
    }
}
