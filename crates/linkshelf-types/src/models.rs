use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Free,
    Premium,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Premium => "premium",
        }
    }
}

impl FromStr for Tier {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Self::Free),
            "premium" => Ok(Self::Premium),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Canceled,
    #[default]
    Inactive,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
            Self::Inactive => "inactive",
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "past_due" => Ok(Self::PastDue),
            "canceled" => Ok(Self::Canceled),
            "inactive" => Ok(Self::Inactive),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown variant '{0}'")]
pub struct UnknownVariant(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialLink {
    pub platform: String,
    pub url: String,
}

/// Denormalized profile row, one per auth identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub auth_id: Uuid,
    pub email: String,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub social_links: Vec<SocialLink>,
    pub subscription_tier: Tier,
    pub subscription_status: SubscriptionStatus,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub subscription_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// The subset of a profile that is visible without authentication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicProfile {
    pub id: Uuid,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub social_links: Vec<SocialLink>,
}

impl From<&UserProfile> for PublicProfile {
    fn from(p: &UserProfile) -> Self {
        Self {
            id: p.id,
            username: p.username.clone(),
            display_name: p.display_name.clone(),
            bio: p.bio.clone(),
            avatar_url: p.avatar_url.clone(),
            social_links: p.social_links.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub emoji: Option<String>,
    pub order_index: i64,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: Uuid,
    pub user_id: Uuid,
    pub category_name: String,
    pub site_name: String,
    pub site_url: String,
    pub created_at: DateTime<Utc>,
}

/// A category shared from one user to another. The emoji and visibility are
/// a snapshot taken when the message was sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxMessage {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub sender_username: Option<String>,
    pub recipient_id: Uuid,
    pub category_name: String,
    pub category_emoji: Option<String>,
    pub category_is_public: bool,
    pub note: Option<String>,
    pub share_token: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ReactionTarget {
    Category(Uuid),
    Message(Uuid),
}

impl ReactionTarget {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Category(_) => "category",
            Self::Message(_) => "message",
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Self::Category(id) | Self::Message(id) => *id,
        }
    }

    pub fn from_parts(kind: &str, id: Uuid) -> Result<Self, UnknownVariant> {
        match kind {
            "category" => Ok(Self::Category(id)),
            "message" => Ok(Self::Message(id)),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

impl fmt::Display for ReactionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub target: ReactionTarget,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

/// Aggregated view of one emoji on one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionSummary {
    pub emoji: String,
    pub count: usize,
    pub reacted_by_me: bool,
}

impl ReactionSummary {
    /// Groups raw reactions by emoji in first-seen order.
    pub fn summarize(reactions: &[Reaction], me: Option<Uuid>) -> Vec<ReactionSummary> {
        let mut out: Vec<ReactionSummary> = Vec::new();
        for r in reactions {
            let mine = me == Some(r.user_id);
            match out.iter_mut().find(|s| s.emoji == r.emoji) {
                Some(s) => {
                    s.count += 1;
                    s.reacted_by_me |= mine;
                }
                None => out.push(ReactionSummary {
                    emoji: r.emoji.clone(),
                    count: 1,
                    reacted_by_me: mine,
                }),
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedCategoryView {
    pub sender: PublicProfile,
    pub category: Category,
    pub bookmarks: Vec<Bookmark>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionHistory {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_type: String,
    pub stripe_subscription_id: Option<String>,
    pub created_at: DateTime<Utc>,
}
