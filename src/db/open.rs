use std::path::Path;
use std::time::Duration;

use log::info;
use regex_lite::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::Connection;

use crate::error::{JobDbError, Result};

static SCHEMA: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/db/schema.sql"));

/// Open (creating if needed) the jobs database at `path`
///
/// `busy_timeout` bounds how long a write waits for another process holding
/// the lock before failing with `StoreBusy`.
pub fn open_db(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    if !path.exists() {
        info!("Creating new jobs database {}", path.display())
    }
    let conn = Connection::open(path)?;
    conn.busy_timeout(busy_timeout)?;
    // Readers on other hosts must not hold up a commit that follows a submit
    conn.pragma_update(None, "journal_mode", "WAL")?;
    prepare(&conn)?;
    Ok(conn)
}

/// Private database that disappears with the connection
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    prepare(&conn)?;
    Ok(conn)
}

fn prepare(conn: &Connection) -> Result<()> {
    add_regexp_function(conn)?;
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Compile a pattern the way `REGEXP` applies it: matching from the start of the value
pub fn anchored_regex(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{pattern})")).map_err(|err| JobDbError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: err.to_string(),
    })
}

/// SQLite has the `REGEXP` operator but no implementation, `x REGEXP y` calls `regexp(y, x)`
fn add_regexp_function(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let regex = ctx.get_or_create_aux(0, |pattern| -> std::result::Result<Regex, JobDbError> {
                anchored_regex(pattern.as_str().map_err(|err| JobDbError::InvalidPattern {
                    pattern: String::new(),
                    reason: err.to_string(),
                })?)
            })?;

            let matched = match ctx.get_raw(1) {
                ValueRef::Text(text) => regex.is_match(&String::from_utf8_lossy(text)),
                ValueRef::Integer(number) => regex.is_match(&number.to_string()),
                ValueRef::Real(number) => regex.is_match(&number.to_string()),
                ValueRef::Null | ValueRef::Blob(_) => false,
            };
            Ok(matched)
        },
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regexp_matches_from_the_start() {
        let conn = open_in_memory().unwrap();
        let matches = |value: &str, pattern: &str| -> bool {
            conn.query_row("SELECT ?1 REGEXP ?2", [value, pattern], |row| row.get(0))
                .unwrap()
        };

        assert!(matches("flux-login1", "flux.*"));
        assert!(matches("flux-login1", "flux"));
        assert!(!matches("greatlakes", "lakes"));
    }

    #[test]
    fn schema_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.db");
        open_db(&path, Duration::from_millis(100)).unwrap();
        open_db(&path, Duration::from_millis(100)).unwrap();
    }

    #[test]
    fn file_stores_use_the_write_ahead_log() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_db(&dir.path().join("jobs.db"), Duration::from_millis(100)).unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");
    }
}
