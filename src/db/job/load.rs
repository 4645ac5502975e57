use rusqlite::{params_from_iter, Connection, OptionalExtension};

use crate::db::column::Column;
use crate::db::job::record::JobRecord;
use crate::db::predicate::Predicate;
use crate::error::{JobDbError, Result};

/// Load one record, failing with `NotFound` if the id isn't tracked
pub fn select_job(conn: &Connection, job_id: &str) -> Result<JobRecord> {
    find_job(conn, job_id)?.ok_or_else(|| JobDbError::NotFound(job_id.to_string()))
}

pub fn find_job(conn: &Connection, job_id: &str) -> Result<Option<JobRecord>> {
    let sql = format!("SELECT {} FROM job WHERE job_id = ?1", Column::select_list());
    let record = conn
        .query_row(&sql, [job_id], JobRecord::from_row)
        .optional()?;
    Ok(record)
}

pub fn job_exists(conn: &Connection, job_id: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM job WHERE job_id = ?1", [job_id], |row| row.get(0))
        .optional()?;
    Ok(found.is_some())
}

/// Stream every record matching `predicate` through `visit`
///
/// Rows are read one at a time, so a visitor can stop early by returning an
/// error. Calling again re-runs the query from the start.
pub fn scan<F>(conn: &Connection, predicate: &Predicate, mut visit: F) -> Result<()>
where
    F: FnMut(JobRecord) -> Result<()>,
{
    let mut params = Vec::new();
    let clause = predicate.to_sql(&mut params);
    let sql = format!(
        "SELECT {} FROM job WHERE {clause} ORDER BY creation_time, rowid",
        Column::select_list()
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(params), JobRecord::from_row)?;
    for row in rows {
        visit(row?)?;
    }
    Ok(())
}

pub fn select_jobs(conn: &Connection, predicate: &Predicate) -> Result<Vec<JobRecord>> {
    let mut jobs = Vec::new();
    scan(conn, predicate, |job| {
        jobs.push(job);
        Ok(())
    })?;
    Ok(jobs)
}

pub fn select_ids(conn: &Connection, predicate: &Predicate) -> Result<Vec<String>> {
    let mut params = Vec::new();
    let clause = predicate.to_sql(&mut params);
    let sql = format!("SELECT job_id FROM job WHERE {clause} ORDER BY creation_time, rowid");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(params), |row| row.get(0))?;
    let ids = rows.collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(ids)
}
