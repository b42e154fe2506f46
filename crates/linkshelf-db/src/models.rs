//! Row decoding. Every table row is parsed into its `linkshelf-types` record
//! right here so nothing untyped leaves the storage layer.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use uuid::Uuid;

use linkshelf_types::models::{
    Bookmark, Category, InboxMessage, Reaction, ReactionTarget, SubscriptionHistory, UserProfile,
};

/// Auth identity row. The password column holds an Argon2 PHC string.
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub password: String,
    pub created_at: DateTime<Utc>,
}

pub(crate) const USER_COLUMNS: &str = "id, email, password, created_at";

pub(crate) const PROFILE_COLUMNS: &str = "id, auth_id, email, username, display_name, bio, avatar_url, \
     social_links, subscription_tier, subscription_status, stripe_customer_id, \
     stripe_subscription_id, subscription_end, created_at";

pub(crate) const CATEGORY_COLUMNS: &str =
    "id, user_id, name, emoji, order_index, is_public, created_at";

pub(crate) const BOOKMARK_COLUMNS: &str =
    "id, user_id, category_name, site_name, site_url, created_at";

pub(crate) const INBOX_COLUMNS: &str = "m.id, m.sender_id, p.username, m.recipient_id, \
     m.category_name, m.category_emoji, m.category_is_public, m.note, m.share_token, \
     m.is_read, m.created_at, m.updated_at";

pub(crate) const REACTION_COLUMNS: &str = "id, user_id, target_kind, target_id, emoji, created_at";

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

pub(crate) fn uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

/// Accepts RFC 3339 as written by this crate, and SQLite's own
/// `YYYY-MM-DD HH:MM:SS` for rows inserted by hand.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>().ok().or_else(|| {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
            .ok()
            .map(|ndt| ndt.and_utc())
    })
}

#[derive(Debug, thiserror::Error)]
#[error("unparseable timestamp '{0}'")]
struct BadTimestamp(String);

pub(crate) fn ts_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).ok_or_else(|| conversion_error(idx, BadTimestamp(raw)))
}

fn opt_ts_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| conversion_error(idx, BadTimestamp(raw))),
        None => Ok(None),
    }
}

pub fn now() -> String {
    Utc::now().to_rfc3339()
}

pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: uuid_at(row, 0)?,
        email: row.get(1)?,
        password: row.get(2)?,
        created_at: ts_at(row, 3)?,
    })
}

pub(crate) fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<UserProfile> {
    let links: String = row.get(7)?;
    let tier: String = row.get(8)?;
    let status: String = row.get(9)?;
    Ok(UserProfile {
        id: uuid_at(row, 0)?,
        auth_id: uuid_at(row, 1)?,
        email: row.get(2)?,
        username: row.get(3)?,
        display_name: row.get(4)?,
        bio: row.get(5)?,
        avatar_url: row.get(6)?,
        social_links: serde_json::from_str(&links).map_err(|e| conversion_error(7, e))?,
        subscription_tier: tier.parse().map_err(|e| conversion_error(8, e))?,
        subscription_status: status.parse().map_err(|e| conversion_error(9, e))?,
        stripe_customer_id: row.get(10)?,
        stripe_subscription_id: row.get(11)?,
        subscription_end: opt_ts_at(row, 12)?,
        created_at: ts_at(row, 13)?,
    })
}

pub(crate) fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: uuid_at(row, 0)?,
        user_id: uuid_at(row, 1)?,
        name: row.get(2)?,
        emoji: row.get(3)?,
        order_index: row.get(4)?,
        is_public: row.get(5)?,
        created_at: ts_at(row, 6)?,
    })
}

pub(crate) fn bookmark_from_row(row: &Row<'_>) -> rusqlite::Result<Bookmark> {
    Ok(Bookmark {
        id: uuid_at(row, 0)?,
        user_id: uuid_at(row, 1)?,
        category_name: row.get(2)?,
        site_name: row.get(3)?,
        site_url: row.get(4)?,
        created_at: ts_at(row, 5)?,
    })
}

pub(crate) fn inbox_from_row(row: &Row<'_>) -> rusqlite::Result<InboxMessage> {
    Ok(InboxMessage {
        id: uuid_at(row, 0)?,
        sender_id: uuid_at(row, 1)?,
        sender_username: row.get(2)?,
        recipient_id: uuid_at(row, 3)?,
        category_name: row.get(4)?,
        category_emoji: row.get(5)?,
        category_is_public: row.get(6)?,
        note: row.get(7)?,
        share_token: row.get(8)?,
        is_read: row.get(9)?,
        created_at: ts_at(row, 10)?,
        updated_at: ts_at(row, 11)?,
    })
}

pub(crate) fn reaction_from_row(row: &Row<'_>) -> rusqlite::Result<Reaction> {
    let kind: String = row.get(2)?;
    let target_id = uuid_at(row, 3)?;
    Ok(Reaction {
        id: uuid_at(row, 0)?,
        user_id: uuid_at(row, 1)?,
        target: ReactionTarget::from_parts(&kind, target_id).map_err(|e| conversion_error(2, e))?,
        emoji: row.get(4)?,
        created_at: ts_at(row, 5)?,
    })
}

pub(crate) fn history_from_row(row: &Row<'_>) -> rusqlite::Result<SubscriptionHistory> {
    Ok(SubscriptionHistory {
        id: uuid_at(row, 0)?,
        user_id: uuid_at(row, 1)?,
        plan_type: row.get(2)?,
        stripe_subscription_id: row.get(3)?,
        created_at: ts_at(row, 4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_timestamp_styles() {
        let rfc = parse_timestamp("2026-03-01T10:00:00+00:00").unwrap();
        let sqlite = parse_timestamp("2026-03-01 10:00:00").unwrap();
        assert_eq!(rfc, sqlite);
        assert!(parse_timestamp("yesterday").is_none());
    }
}
