//! Plan limits. Every function here is total and free of side effects; callers
//! decide what to do with a `false`.

use serde::{Deserialize, Serialize};

use crate::emoji::EmojiSet;
use crate::models::{SubscriptionStatus, Tier, UserProfile};

pub const FREE_BOOKMARK_LIMIT: usize = 50;
pub const FREE_PRIVATE_CATEGORY_LIMIT: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Entitlement {
    pub tier: Tier,
    pub status: SubscriptionStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Remaining {
    Unlimited,
    Count(usize),
}

impl Entitlement {
    pub fn new(tier: Tier, status: SubscriptionStatus) -> Self {
        Self { tier, status }
    }

    pub fn free() -> Self {
        Self::default()
    }

    pub fn premium() -> Self {
        Self::new(Tier::Premium, SubscriptionStatus::Active)
    }

    /// A premium tier only counts while the subscription is active.
    pub fn is_premium_active(&self) -> bool {
        self.tier == Tier::Premium && self.status == SubscriptionStatus::Active
    }

    pub fn can_create_bookmark(&self, current_total: usize) -> bool {
        self.is_premium_active() || current_total < FREE_BOOKMARK_LIMIT
    }

    pub fn can_create_private_category(&self, current_private: usize) -> bool {
        self.is_premium_active() || current_private < FREE_PRIVATE_CATEGORY_LIMIT
    }

    pub fn available_emoji_set(&self) -> EmojiSet {
        if self.is_premium_active() {
            EmojiSet::Premium
        } else {
            EmojiSet::Free
        }
    }

    pub fn remaining_bookmarks(&self, current_total: usize) -> Remaining {
        self.remaining(FREE_BOOKMARK_LIMIT, current_total)
    }

    pub fn remaining_private_categories(&self, current_private: usize) -> Remaining {
        self.remaining(FREE_PRIVATE_CATEGORY_LIMIT, current_private)
    }

    fn remaining(&self, limit: usize, current: usize) -> Remaining {
        if self.is_premium_active() {
            Remaining::Unlimited
        } else {
            Remaining::Count(limit.saturating_sub(current))
        }
    }
}

impl From<&UserProfile> for Entitlement {
    fn from(p: &UserProfile) -> Self {
        Self::new(p.subscription_tier, p.subscription_status)
    }
}
