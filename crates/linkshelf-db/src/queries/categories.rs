use anyhow::Result;
use rusqlite::Connection;
use uuid::Uuid;

use linkshelf_types::api::{CreateCategoryRequest, UpdateCategoryRequest};
use linkshelf_types::models::Category;

use super::{Assignments, OptionalExt, update_by_id};
use crate::models::{CATEGORY_COLUMNS, category_from_row};
use crate::{Database, classify};

impl Database {
    /// All of a user's categories in display order.
    pub fn list_categories(&self, user_id: &Uuid) -> Result<Vec<Category>> {
        self.with_conn(|conn| query_categories(conn, user_id, false))
    }

    pub fn list_public_categories(&self, user_id: &Uuid) -> Result<Vec<Category>> {
        self.with_conn(|conn| query_categories(conn, user_id, true))
    }

    pub fn get_category(&self, id: &Uuid) -> Result<Option<Category>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM categories WHERE id = ?1", CATEGORY_COLUMNS),
                [id.to_string()],
                category_from_row,
            )
            .optional()
        })
    }

    pub fn get_category_by_name(&self, user_id: &Uuid, name: &str) -> Result<Option<Category>> {
        self.with_conn(|conn| query_category_by_name(conn, user_id, name))
    }

    pub fn insert_category(&self, user_id: &Uuid, req: &CreateCategoryRequest) -> Result<Category> {
        let category = Category {
            id: Uuid::new_v4(),
            user_id: *user_id,
            name: req.name.clone(),
            emoji: req.emoji.clone().filter(|e| !e.is_empty()),
            order_index: req.order_index,
            is_public: req.is_public,
            created_at: chrono::Utc::now(),
        };

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO categories (id, user_id, name, emoji, order_index, is_public, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    category.id.to_string(),
                    user_id.to_string(),
                    category.name,
                    category.emoji,
                    category.order_index,
                    category.is_public,
                    category.created_at.to_rfc3339(),
                ],
            )
            .map_err(classify)?;
            Ok(())
        })?;

        Ok(category)
    }

    /// Applies the present fields. A rename carries the category's bookmarks
    /// along through the foreign key's `ON UPDATE CASCADE`.
    pub fn update_category(
        &self,
        id: &Uuid,
        req: &UpdateCategoryRequest,
    ) -> Result<Option<Category>> {
        let mut sets: Assignments = Vec::new();
        if let Some(name) = &req.name {
            sets.push(("name", Box::new(name.clone())));
        }
        if let Some(emoji) = &req.emoji {
            let value = if emoji.is_empty() { None } else { Some(emoji.clone()) };
            sets.push(("emoji", Box::new(value)));
        }
        if let Some(is_public) = req.is_public {
            sets.push(("is_public", Box::new(is_public)));
        }
        if let Some(order_index) = req.order_index {
            sets.push(("order_index", Box::new(order_index)));
        }

        self.with_conn(|conn| {
            update_by_id(conn, "categories", &id.to_string(), sets)?;
            conn.query_row(
                &format!("SELECT {} FROM categories WHERE id = ?1", CATEGORY_COLUMNS),
                [id.to_string()],
                category_from_row,
            )
            .optional()
        })
    }

    /// Fails with [`crate::DbError::ForeignKey`] while bookmarks remain.
    pub fn delete_category(&self, id: &Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn
                .execute("DELETE FROM categories WHERE id = ?1", [id.to_string()])
                .map_err(classify)?;
            Ok(n > 0)
        })
    }

    pub fn count_private_categories(&self, user_id: &Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM categories WHERE user_id = ?1 AND is_public = 0",
                [user_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(n as usize)
        })
    }

    pub fn next_order_index(&self, user_id: &Uuid) -> Result<i64> {
        self.with_conn(|conn| {
            let max: Option<i64> = conn.query_row(
                "SELECT MAX(order_index) FROM categories WHERE user_id = ?1",
                [user_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(max.map_or(0, |m| m + 1))
        })
    }
}

fn query_categories(conn: &Connection, user_id: &Uuid, public_only: bool) -> Result<Vec<Category>> {
    let filter = if public_only { " AND is_public = 1" } else { "" };
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM categories WHERE user_id = ?1{} ORDER BY order_index, created_at",
        CATEGORY_COLUMNS, filter
    ))?;

    let rows = stmt
        .query_map([user_id.to_string()], category_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

pub(crate) fn query_category_by_name(
    conn: &Connection,
    user_id: &Uuid,
    name: &str,
) -> Result<Option<Category>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM categories WHERE user_id = ?1 AND name = ?2",
            CATEGORY_COLUMNS
        ),
        (user_id.to_string(), name),
        category_from_row,
    )
    .optional()
}
