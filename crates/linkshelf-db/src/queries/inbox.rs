use anyhow::Result;
use rusqlite::Connection;
use uuid::Uuid;

use linkshelf_types::models::{Category, InboxMessage, SharedCategoryView};

use super::OptionalExt;
use super::categories::query_category_by_name;
use crate::models::{
    BOOKMARK_COLUMNS, INBOX_COLUMNS, bookmark_from_row, inbox_from_row, now,
};
use crate::{Database, classify};

impl Database {
    /// Records a share of `category` from `sender_id` to `recipient_id`,
    /// snapshotting the category's emoji and visibility.
    pub fn insert_inbox_message(
        &self,
        sender_id: &Uuid,
        recipient_id: &Uuid,
        category: &Category,
        note: Option<&str>,
        share_token: &str,
    ) -> Result<InboxMessage> {
        let id = Uuid::new_v4();
        let ts = now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO inbox_messages (id, sender_id, recipient_id, category_name, category_emoji,
                     category_is_public, note, share_token, is_read, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?9)",
                rusqlite::params![
                    id.to_string(),
                    sender_id.to_string(),
                    recipient_id.to_string(),
                    category.name,
                    category.emoji,
                    category.is_public,
                    note,
                    share_token,
                    ts,
                ],
            )
            .map_err(classify)?;
            query_message(conn, "m.id", &id.to_string())?
                .ok_or_else(|| anyhow::anyhow!("inbox message {} vanished after insert", id))
        })
    }

    /// Newest first.
    pub fn list_inbox(&self, recipient_id: &Uuid) -> Result<Vec<InboxMessage>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM inbox_messages m
                 LEFT JOIN profiles p ON p.id = m.sender_id
                 WHERE m.recipient_id = ?1
                 ORDER BY m.created_at DESC",
                INBOX_COLUMNS
            ))?;
            let rows = stmt
                .query_map([recipient_id.to_string()], inbox_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_inbox_message(&self, id: &Uuid) -> Result<Option<InboxMessage>> {
        self.with_conn(|conn| query_message(conn, "m.id", &id.to_string()))
    }

    pub fn unread_count(&self, recipient_id: &Uuid) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM inbox_messages WHERE recipient_id = ?1 AND is_read = 0",
                [recipient_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(n as u64)
        })
    }

    /// Flips the read flag if the message belongs to `recipient_id`. Returns
    /// the updated row, or `None` when there is no such message for them.
    pub fn mark_as_read(&self, id: &Uuid, recipient_id: &Uuid) -> Result<Option<InboxMessage>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let n = tx.execute(
                "UPDATE inbox_messages SET is_read = 1, updated_at = ?1
                 WHERE id = ?2 AND recipient_id = ?3",
                (now(), id.to_string(), recipient_id.to_string()),
            )?;
            let row = if n > 0 {
                query_message(&tx, "m.id", &id.to_string())?
            } else {
                None
            };
            tx.commit()?;
            Ok(row)
        })
    }

    /// Returns the rows whose flag actually changed.
    pub fn mark_all_as_read(&self, recipient_id: &Uuid) -> Result<Vec<InboxMessage>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let ids: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM inbox_messages WHERE recipient_id = ?1 AND is_read = 0",
                )?;
                stmt.query_map([recipient_id.to_string()], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };
            tx.execute(
                "UPDATE inbox_messages SET is_read = 1, updated_at = ?1
                 WHERE recipient_id = ?2 AND is_read = 0",
                (now(), recipient_id.to_string()),
            )?;

            let mut updated = Vec::with_capacity(ids.len());
            for id in &ids {
                if let Some(row) = query_message(&tx, "m.id", id)? {
                    updated.push(row);
                }
            }
            tx.commit()?;
            Ok(updated)
        })
    }

    pub fn delete_inbox_message(&self, id: &Uuid, recipient_id: &Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM inbox_messages WHERE id = ?1 AND recipient_id = ?2",
                (id.to_string(), recipient_id.to_string()),
            )?;
            Ok(n > 0)
        })
    }

    /// Resolves a share token to the sender's category as it is now.
    /// `None` if the token is unknown or the category has since been deleted.
    pub fn get_shared_category_by_token(&self, token: &str) -> Result<Option<SharedCategoryView>> {
        self.with_conn(|conn| {
            let Some(message) = query_message(conn, "m.share_token", token)? else {
                return Ok(None);
            };
            let Some(category) =
                query_category_by_name(conn, &message.sender_id, &message.category_name)?
            else {
                return Ok(None);
            };
            let Some(sender) = crate::queries::users::query_public_profile(conn, &message.sender_id)?
            else {
                return Ok(None);
            };

            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM bookmarks WHERE user_id = ?1 AND category_name = ?2
                 ORDER BY created_at, rowid",
                BOOKMARK_COLUMNS
            ))?;
            let bookmarks = stmt
                .query_map(
                    (message.sender_id.to_string(), &category.name),
                    bookmark_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(Some(SharedCategoryView {
                sender,
                category,
                bookmarks,
                note: message.note,
            }))
        })
    }
}

fn query_message(conn: &Connection, column: &str, value: &str) -> Result<Option<InboxMessage>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM inbox_messages m
             LEFT JOIN profiles p ON p.id = m.sender_id
             WHERE {} = ?1",
            INBOX_COLUMNS, column
        ),
        [value],
        inbox_from_row,
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::fixtures;
    use linkshelf_types::api::{CreateBookmarkRequest, CreateCategoryRequest};

    struct World {
        db: Database,
        sender: Uuid,
        recipient: Uuid,
        category: Category,
    }

    fn world() -> World {
        let db = Database::open_in_memory().unwrap();
        let sender = fixtures::profile(&db, "s@example.com").id;
        let recipient = fixtures::profile(&db, "r@example.com").id;
        let category = db
            .insert_category(
                &sender,
                &CreateCategoryRequest {
                    name: "Recipes".into(),
                    emoji: Some("🍳".into()),
                    is_public: false,
                    order_index: 0,
                },
            )
            .unwrap();
        World {
            db,
            sender,
            recipient,
            category,
        }
    }

    #[test]
    fn share_snapshot_and_read_flags() {
        let w = world();
        let m = w
            .db
            .insert_inbox_message(&w.sender, &w.recipient, &w.category, Some("try these"), "tok1")
            .unwrap();
        assert_eq!(m.category_emoji.as_deref(), Some("🍳"));
        assert!(!m.category_is_public);
        assert!(!m.is_read);
        assert_eq!(w.db.unread_count(&w.recipient).unwrap(), 1);

        // Only the recipient can mark it read.
        assert!(w.db.mark_as_read(&m.id, &w.sender).unwrap().is_none());
        let read = w.db.mark_as_read(&m.id, &w.recipient).unwrap().unwrap();
        assert!(read.is_read);
        assert_eq!(w.db.unread_count(&w.recipient).unwrap(), 0);
    }

    #[test]
    fn mark_all_reports_changed_rows() {
        let w = world();
        for token in ["a", "b", "c"] {
            w.db.insert_inbox_message(&w.sender, &w.recipient, &w.category, None, token)
                .unwrap();
        }
        let first = w.db.list_inbox(&w.recipient).unwrap();
        w.db.mark_as_read(&first[0].id, &w.recipient).unwrap();

        let changed = w.db.mark_all_as_read(&w.recipient).unwrap();
        assert_eq!(changed.len(), 2);
        assert!(w.db.mark_all_as_read(&w.recipient).unwrap().is_empty());
    }

    #[test]
    fn shared_view_resolves_live_category() {
        let w = world();
        w.db.insert_bookmark(
            &w.sender,
            &CreateBookmarkRequest {
                category_name: "Recipes".into(),
                site_name: "Pasta".into(),
                site_url: "https://pasta.example".into(),
            },
        )
        .unwrap();
        w.db.insert_inbox_message(&w.sender, &w.recipient, &w.category, None, "share-me")
            .unwrap();

        let view = w.db.get_shared_category_by_token("share-me").unwrap().unwrap();
        assert_eq!(view.category.name, "Recipes");
        assert_eq!(view.bookmarks.len(), 1);
        assert_eq!(view.sender.id, w.sender);
        assert!(w.db.get_shared_category_by_token("nope").unwrap().is_none());

        w.db.delete_bookmarks_in_category(&w.sender, "Recipes").unwrap();
        w.db.delete_category(&w.category.id).unwrap();
        assert!(w.db.get_shared_category_by_token("share-me").unwrap().is_none());
    }

    #[test]
    fn only_recipient_deletes() {
        let w = world();
        let m = w
            .db
            .insert_inbox_message(&w.sender, &w.recipient, &w.category, None, "t")
            .unwrap();
        assert!(!w.db.delete_inbox_message(&m.id, &w.sender).unwrap());
        assert!(w.db.delete_inbox_message(&m.id, &w.recipient).unwrap());
        assert!(w.db.get_inbox_message(&m.id).unwrap().is_none());
    }
}
