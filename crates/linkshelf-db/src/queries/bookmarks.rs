use anyhow::Result;
use uuid::Uuid;

use linkshelf_types::api::{CreateBookmarkRequest, UpdateBookmarkRequest};
use linkshelf_types::models::Bookmark;

use super::{Assignments, OptionalExt, update_by_id};
use crate::models::{BOOKMARK_COLUMNS, bookmark_from_row};
use crate::{Database, classify};

impl Database {
    pub fn list_bookmarks(&self, user_id: &Uuid) -> Result<Vec<Bookmark>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM bookmarks WHERE user_id = ?1 ORDER BY created_at, rowid",
                BOOKMARK_COLUMNS
            ))?;
            let rows = stmt
                .query_map([user_id.to_string()], bookmark_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_bookmarks_in_category(
        &self,
        user_id: &Uuid,
        category_name: &str,
    ) -> Result<Vec<Bookmark>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM bookmarks WHERE user_id = ?1 AND category_name = ?2
                 ORDER BY created_at, rowid",
                BOOKMARK_COLUMNS
            ))?;
            let rows = stmt
                .query_map((user_id.to_string(), category_name), bookmark_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_bookmark(&self, id: &Uuid) -> Result<Option<Bookmark>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM bookmarks WHERE id = ?1", BOOKMARK_COLUMNS),
                [id.to_string()],
                bookmark_from_row,
            )
            .optional()
        })
    }

    pub fn count_bookmarks(&self, user_id: &Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM bookmarks WHERE user_id = ?1",
                [user_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(n as usize)
        })
    }

    /// The category must already exist; a repeat of the same name, URL and
    /// category fails with [`crate::DbError::Duplicate`].
    pub fn insert_bookmark(&self, user_id: &Uuid, req: &CreateBookmarkRequest) -> Result<Bookmark> {
        let bookmark = Bookmark {
            id: Uuid::new_v4(),
            user_id: *user_id,
            category_name: req.category_name.clone(),
            site_name: req.site_name.clone(),
            site_url: req.site_url.clone(),
            created_at: chrono::Utc::now(),
        };

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO bookmarks (id, user_id, category_name, site_name, site_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    bookmark.id.to_string(),
                    user_id.to_string(),
                    bookmark.category_name,
                    bookmark.site_name,
                    bookmark.site_url,
                    bookmark.created_at.to_rfc3339(),
                ],
            )
            .map_err(classify)?;
            Ok(())
        })?;

        Ok(bookmark)
    }

    pub fn update_bookmark(
        &self,
        id: &Uuid,
        req: &UpdateBookmarkRequest,
    ) -> Result<Option<Bookmark>> {
        let mut sets: Assignments = Vec::new();
        if let Some(name) = &req.site_name {
            sets.push(("site_name", Box::new(name.clone())));
        }
        if let Some(url) = &req.site_url {
            sets.push(("site_url", Box::new(url.clone())));
        }

        self.with_conn(|conn| {
            update_by_id(conn, "bookmarks", &id.to_string(), sets)?;
            conn.query_row(
                &format!("SELECT {} FROM bookmarks WHERE id = ?1", BOOKMARK_COLUMNS),
                [id.to_string()],
                bookmark_from_row,
            )
            .optional()
        })
    }

    pub fn delete_bookmark(&self, id: &Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM bookmarks WHERE id = ?1", [id.to_string()])?;
            Ok(n > 0)
        })
    }

    pub fn delete_bookmarks_in_category(&self, user_id: &Uuid, category_name: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM bookmarks WHERE user_id = ?1 AND category_name = ?2",
                (user_id.to_string(), category_name),
            )?;
            Ok(n)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::is_duplicate;
    use crate::queries::fixtures;
    use linkshelf_types::api::CreateCategoryRequest;

    fn setup() -> (Database, Uuid) {
        let db = Database::open_in_memory().unwrap();
        let user = fixtures::profile(&db, "bm@example.com");
        db.insert_category(
            &user.id,
            &CreateCategoryRequest {
                name: "Reading".into(),
                emoji: Some("📚".into()),
                is_public: true,
                order_index: 0,
            },
        )
        .unwrap();
        (db, user.id)
    }

    fn req(name: &str, url: &str) -> CreateBookmarkRequest {
        CreateBookmarkRequest {
            category_name: "Reading".into(),
            site_name: name.into(),
            site_url: url.into(),
        }
    }

    #[test]
    fn duplicate_bookmark_rejected() {
        let (db, user_id) = setup();
        db.insert_bookmark(&user_id, &req("Rust Book", "https://doc.rust-lang.org/book"))
            .unwrap();
        let err = db
            .insert_bookmark(&user_id, &req("Rust Book", "https://doc.rust-lang.org/book"))
            .unwrap_err();
        assert!(is_duplicate(&err));
        assert_eq!(db.count_bookmarks(&user_id).unwrap(), 1);
    }

    #[test]
    fn bookmark_needs_existing_category() {
        let (db, user_id) = setup();
        let mut orphan = req("Lost", "https://lost.example");
        orphan.category_name = "Missing".into();
        assert!(db.insert_bookmark(&user_id, &orphan).is_err());
    }

    #[test]
    fn update_and_delete() {
        let (db, user_id) = setup();
        let b = db.insert_bookmark(&user_id, &req("Blog", "https://blog.example")).unwrap();
        let updated = db
            .update_bookmark(
                &b.id,
                &UpdateBookmarkRequest {
                    site_name: Some("Old Blog".into()),
                    site_url: None,
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.site_name, "Old Blog");
        assert_eq!(updated.site_url, "https://blog.example");

        assert!(db.delete_bookmark(&b.id).unwrap());
        assert!(!db.delete_bookmark(&b.id).unwrap());
        assert!(db.list_bookmarks(&user_id).unwrap().is_empty());
    }
}
