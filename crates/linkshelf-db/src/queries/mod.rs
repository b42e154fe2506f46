pub mod bookmarks;
pub mod categories;
pub mod inbox;
pub mod reactions;
pub mod users;

use anyhow::Result;
use rusqlite::Connection;
use rusqlite::types::ToSql;

pub(crate) type Assignments = Vec<(&'static str, Box<dyn ToSql>)>;

/// Runs `UPDATE <table> SET ... WHERE id = ?` for the given column values.
/// Returns the number of rows touched; an empty assignment list touches none.
pub(crate) fn update_by_id(
    conn: &Connection,
    table: &str,
    id: &str,
    sets: Assignments,
) -> Result<usize> {
    if sets.is_empty() {
        return Ok(0);
    }
    let clauses: Vec<String> = sets
        .iter()
        .enumerate()
        .map(|(i, (col, _))| format!("{} = ?{}", col, i + 1))
        .collect();
    let sql = format!(
        "UPDATE {} SET {} WHERE id = ?{}",
        table,
        clauses.join(", "),
        sets.len() + 1
    );

    let mut params: Vec<&dyn ToSql> = sets.iter().map(|(_, v)| v.as_ref()).collect();
    params.push(&id);

    conn.execute(&sql, params.as_slice()).map_err(crate::classify)
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
