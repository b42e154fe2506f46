use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

use linkshelf_types::models::{
    PublicProfile, SocialLink, SubscriptionHistory, SubscriptionStatus, Tier, UserProfile,
};

use super::{Assignments, OptionalExt, update_by_id};
use crate::models::{
    PROFILE_COLUMNS, USER_COLUMNS, UserRow, history_from_row, now, profile_from_row, user_from_row,
};
use crate::{Database, classify};

/// Profile fields a user may edit. `None` leaves the column alone.
#[derive(Debug, Default, Clone)]
pub struct ProfilePatch {
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub social_links: Option<Vec<SocialLink>>,
}

/// Billing fields written by the payment webhook. The nested options on the
/// subscription reference and period end allow clearing them.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SubscriptionPatch {
    pub tier: Option<Tier>,
    pub status: Option<SubscriptionStatus>,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<Option<String>>,
    pub subscription_end: Option<Option<DateTime<Utc>>>,
}

const USERNAME_ATTEMPTS: usize = 20;

impl Database {
    // -- Auth users --

    pub fn create_user(&self, id: &Uuid, email: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, password, created_at) VALUES (?1, ?2, ?3, ?4)",
                (id.to_string(), email, password_hash, now()),
            )
            .map_err(classify)?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
                [email],
                user_from_row,
            )
            .optional()
        })
    }

    pub fn get_user_by_id(&self, id: &Uuid) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                [id.to_string()],
                user_from_row,
            )
            .optional()
        })
    }

    pub fn update_password(&self, id: &Uuid, password_hash: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE users SET password = ?1 WHERE id = ?2",
                (password_hash, id.to_string()),
            )?;
            Ok(n > 0)
        })
    }

    /// Deletes the auth identity. The profile and everything it owns go with it.
    pub fn delete_user(&self, id: &Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM users WHERE id = ?1", [id.to_string()])?;
            if n > 0 {
                info!("Deleted account {}", id);
            }
            Ok(n > 0)
        })
    }

    // -- Profiles --

    /// Inserts a profile for `auth_id` unless one already exists, and returns
    /// whichever row ends up stored.
    pub fn insert_profile(
        &self,
        id: &Uuid,
        auth_id: &Uuid,
        email: &str,
        display_name: Option<&str>,
    ) -> Result<UserProfile> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO profiles (id, auth_id, email, display_name, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (id.to_string(), auth_id.to_string(), email, display_name, now()),
            )
            .map_err(classify)?;
            query_profile(conn, "auth_id", &auth_id.to_string())?
                .ok_or_else(|| anyhow::anyhow!("profile for {} vanished after insert", auth_id))
        })
    }

    pub fn get_profile_by_auth_id(&self, auth_id: &Uuid) -> Result<Option<UserProfile>> {
        self.with_conn(|conn| query_profile(conn, "auth_id", &auth_id.to_string()))
    }

    pub fn get_profile_by_id(&self, id: &Uuid) -> Result<Option<UserProfile>> {
        self.with_conn(|conn| query_profile(conn, "id", &id.to_string()))
    }

    pub fn get_profile_by_username(&self, username: &str) -> Result<Option<UserProfile>> {
        self.with_conn(|conn| query_profile(conn, "username", username))
    }

    pub fn get_profile_by_customer_id(&self, customer_id: &str) -> Result<Option<UserProfile>> {
        self.with_conn(|conn| query_profile(conn, "stripe_customer_id", customer_id))
    }

    pub fn update_profile(&self, id: &Uuid, patch: &ProfilePatch) -> Result<Option<UserProfile>> {
        let mut sets: Assignments = Vec::new();
        if let Some(v) = &patch.username {
            sets.push(("username", Box::new(v.clone())));
        }
        if let Some(v) = &patch.display_name {
            sets.push(("display_name", Box::new(v.clone())));
        }
        if let Some(v) = &patch.bio {
            sets.push(("bio", Box::new(v.clone())));
        }
        if let Some(v) = &patch.avatar_url {
            sets.push(("avatar_url", Box::new(v.clone())));
        }
        if let Some(v) = &patch.social_links {
            sets.push(("social_links", Box::new(serde_json::to_string(v)?)));
        }

        self.with_conn(|conn| {
            update_by_id(conn, "profiles", &id.to_string(), sets)?;
            query_profile(conn, "id", &id.to_string())
        })
    }

    pub fn update_subscription(
        &self,
        id: &Uuid,
        patch: &SubscriptionPatch,
    ) -> Result<Option<UserProfile>> {
        let mut sets: Assignments = Vec::new();
        if let Some(tier) = patch.tier {
            sets.push(("subscription_tier", Box::new(tier.as_str())));
        }
        if let Some(status) = patch.status {
            sets.push(("subscription_status", Box::new(status.as_str())));
        }
        if let Some(v) = &patch.stripe_customer_id {
            sets.push(("stripe_customer_id", Box::new(v.clone())));
        }
        if let Some(v) = &patch.stripe_subscription_id {
            sets.push(("stripe_subscription_id", Box::new(v.clone())));
        }
        if let Some(v) = &patch.subscription_end {
            sets.push(("subscription_end", Box::new(v.map(|t| t.to_rfc3339()))));
        }

        self.with_conn(|conn| {
            update_by_id(conn, "profiles", &id.to_string(), sets)?;
            query_profile(conn, "id", &id.to_string())
        })
    }

    pub fn insert_subscription_history(
        &self,
        user_id: &Uuid,
        plan_type: &str,
        stripe_subscription_id: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO subscription_history (id, user_id, plan_type, stripe_subscription_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (
                    Uuid::new_v4().to_string(),
                    user_id.to_string(),
                    plan_type,
                    stripe_subscription_id,
                    now(),
                ),
            )?;
            Ok(())
        })
    }

    pub fn list_subscription_history(&self, user_id: &Uuid) -> Result<Vec<SubscriptionHistory>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, plan_type, stripe_subscription_id, created_at
                 FROM subscription_history WHERE user_id = ?1 ORDER BY created_at",
            )?;
            let rows = stmt
                .query_map([user_id.to_string()], history_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Picks a free username derived from `seed` (usually the email local part),
    /// then from `seed` plus a random four-digit suffix.
    pub fn generate_username(&self, seed: &str) -> Result<String> {
        let base = username_base(seed);
        self.with_conn(|conn| {
            if !username_taken(conn, &base)? {
                return Ok(base.clone());
            }
            for _ in 0..USERNAME_ATTEMPTS {
                let candidate = format!("{}{}", base, rand::random_range(1000..10000));
                if !username_taken(conn, &candidate)? {
                    return Ok(candidate);
                }
            }
            Err(anyhow::anyhow!("no free username for seed '{}'", seed))
        })
    }
}

fn query_profile(conn: &Connection, column: &str, value: &str) -> Result<Option<UserProfile>> {
    conn.query_row(
        &format!("SELECT {} FROM profiles WHERE {} = ?1", PROFILE_COLUMNS, column),
        [value],
        profile_from_row,
    )
    .optional()
}

pub(crate) fn query_public_profile(conn: &Connection, id: &Uuid) -> Result<Option<PublicProfile>> {
    Ok(query_profile(conn, "id", &id.to_string())?.map(|p| PublicProfile::from(&p)))
}

fn username_taken(conn: &Connection, username: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM profiles WHERE username = ?1",
        [username],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Lowercases, keeps `[a-z0-9_]`, caps at 24 chars and pads short results.
fn username_base(seed: &str) -> String {
    let local = seed.split('@').next().unwrap_or(seed);
    let mut base: String = local
        .chars()
        .map(|c| c.to_ascii_lowercase())
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .take(24)
        .collect();
    while base.len() < 3 {
        base.push('_');
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::fixtures;

    #[test]
    fn insert_profile_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let auth_id = Uuid::new_v4();
        db.create_user(&auth_id, "ada@example.com", "hash").unwrap();

        let first = db
            .insert_profile(&Uuid::new_v4(), &auth_id, "ada@example.com", Some("Ada"))
            .unwrap();
        let second = db
            .insert_profile(&Uuid::new_v4(), &auth_id, "ada@example.com", None)
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.display_name.as_deref(), Some("Ada"));
        assert_eq!(second.subscription_tier, Tier::Free);
        assert_eq!(second.subscription_status, SubscriptionStatus::Inactive);
    }

    #[test]
    fn subscription_patch_sets_and_clears() {
        let db = Database::open_in_memory().unwrap();
        let profile = fixtures::profile(&db, "bo@example.com");

        let updated = db
            .update_subscription(
                &profile.id,
                &SubscriptionPatch {
                    tier: Some(Tier::Premium),
                    status: Some(SubscriptionStatus::Active),
                    stripe_customer_id: Some("cus_1".into()),
                    stripe_subscription_id: Some(Some("sub_1".into())),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.subscription_tier, Tier::Premium);
        assert_eq!(updated.stripe_subscription_id.as_deref(), Some("sub_1"));

        let cleared = db
            .update_subscription(
                &profile.id,
                &SubscriptionPatch {
                    stripe_subscription_id: Some(None),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert!(cleared.stripe_subscription_id.is_none());
        assert_eq!(
            db.get_profile_by_customer_id("cus_1").unwrap().map(|p| p.id),
            Some(profile.id)
        );
    }

    #[test]
    fn generated_usernames_avoid_collisions() {
        let db = Database::open_in_memory().unwrap();
        let profile = fixtures::profile(&db, "Mia.Lopez@example.com");
        let first = db.generate_username("Mia.Lopez@example.com").unwrap();
        assert_eq!(first, "mialopez");

        db.update_profile(
            &profile.id,
            &ProfilePatch {
                username: Some(first.clone()),
                ..Default::default()
            },
        )
        .unwrap();
        let second = db.generate_username("Mia.Lopez@example.com").unwrap();
        assert!(second.starts_with("mialopez"));
        assert_ne!(second, first);
    }

    #[test]
    fn deleting_user_cascades_to_profile() {
        let db = Database::open_in_memory().unwrap();
        let profile = fixtures::profile(&db, "gone@example.com");
        assert!(db.delete_user(&profile.auth_id).unwrap());
        assert!(db.get_profile_by_id(&profile.id).unwrap().is_none());
    }
}
