use anyhow::Result;
use uuid::Uuid;

use linkshelf_types::models::{Reaction, ReactionTarget};

use super::OptionalExt;
use crate::Database;
use crate::models::{REACTION_COLUMNS, reaction_from_row};

/// What a toggle did to the caller's single reaction on a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    Added(Reaction),
    Replaced { previous: Reaction, current: Reaction },
    Removed(Reaction),
}

impl ToggleOutcome {
    pub fn added(&self) -> bool {
        !matches!(self, Self::Removed(_))
    }
}

impl Database {
    /// One reaction per user per target: the same emoji again removes it,
    /// a different emoji replaces it.
    pub fn toggle_reaction(
        &self,
        user_id: &Uuid,
        target: &ReactionTarget,
        emoji: &str,
    ) -> Result<ToggleOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let existing = tx
                .query_row(
                    &format!(
                        "SELECT {} FROM reactions
                         WHERE user_id = ?1 AND target_kind = ?2 AND target_id = ?3",
                        REACTION_COLUMNS
                    ),
                    (user_id.to_string(), target.kind(), target.id().to_string()),
                    reaction_from_row,
                )
                .optional()?;

            let outcome = match existing {
                Some(previous) if previous.emoji == emoji => {
                    tx.execute("DELETE FROM reactions WHERE id = ?1", [previous.id.to_string()])?;
                    ToggleOutcome::Removed(previous)
                }
                Some(previous) => {
                    let current = Reaction {
                        emoji: emoji.to_string(),
                        created_at: chrono::Utc::now(),
                        ..previous.clone()
                    };
                    tx.execute(
                        "UPDATE reactions SET emoji = ?1, created_at = ?2 WHERE id = ?3",
                        (
                            &current.emoji,
                            current.created_at.to_rfc3339(),
                            current.id.to_string(),
                        ),
                    )?;
                    ToggleOutcome::Replaced { previous, current }
                }
                None => {
                    let current = Reaction {
                        id: Uuid::new_v4(),
                        user_id: *user_id,
                        target: *target,
                        emoji: emoji.to_string(),
                        created_at: chrono::Utc::now(),
                    };
                    tx.execute(
                        "INSERT INTO reactions (id, user_id, target_kind, target_id, emoji, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        rusqlite::params![
                            current.id.to_string(),
                            user_id.to_string(),
                            target.kind(),
                            target.id().to_string(),
                            current.emoji,
                            current.created_at.to_rfc3339(),
                        ],
                    )?;
                    ToggleOutcome::Added(current)
                }
            };

            tx.commit()?;
            Ok(outcome)
        })
    }

    pub fn list_reactions(&self, target: &ReactionTarget) -> Result<Vec<Reaction>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM reactions WHERE target_kind = ?1 AND target_id = ?2
                 ORDER BY created_at",
                REACTION_COLUMNS
            ))?;
            let rows = stmt
                .query_map((target.kind(), target.id().to_string()), reaction_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Whether the reaction target still exists.
    pub fn reaction_target_exists(&self, target: &ReactionTarget) -> Result<bool> {
        let table = match target {
            ReactionTarget::Category(_) => "categories",
            ReactionTarget::Message(_) => "inbox_messages",
        };
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM {} WHERE id = ?1", table),
                [target.id().to_string()],
                |row| row.get(0),
            )?;
            Ok(n > 0)
        })
    }
}
