pub mod migrations;
pub mod models;
pub mod queries;

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

pub use queries::reactions::ToggleOutcome;
pub use queries::users::{ProfilePatch, SubscriptionPatch};

/// Write failures callers are expected to tell apart from plain storage errors.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("duplicate row")]
    Duplicate,
    #[error("foreign key violation")]
    ForeignKey,
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let db = Self::init(conn)?;

        info!("Database opened at {}", path.display());
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }

    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&mut conn)
    }
}

/// Maps SQLite constraint failures onto [`DbError`] so handlers can answer
/// 409 instead of 500.
pub(crate) fn classify(err: rusqlite::Error) -> anyhow::Error {
    if let rusqlite::Error::SqliteFailure(ref e, _) = err {
        match e.extended_code {
            rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                return DbError::Duplicate.into();
            }
            rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => return DbError::ForeignKey.into(),
            _ => {}
        }
    }
    err.into()
}

pub fn is_duplicate(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<DbError>(), Some(DbError::Duplicate))
}

pub fn is_foreign_key_violation(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<DbError>(), Some(DbError::ForeignKey))
}
