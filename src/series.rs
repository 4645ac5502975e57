//! Continuation chains ("series") and the selections built on them
//!
//! A series is never stored. Each record names its successor in
//! `continuation_id`, so walking parents and children from any member
//! recovers the whole chain, oldest first.

use std::collections::HashSet;

use rusqlite::Connection;

use crate::db::column::Column;
use crate::db::job::load::{find_job, select_ids, select_job, select_jobs};
use crate::db::job::record::{JobRecord, NO_CONTINUATION};
use crate::db::job::state::TaskState;
use crate::db::predicate::Predicate;
use crate::error::{JobDbError, Result};

/// The record continued by `job_id`, if any
pub fn select_parent(conn: &Connection, job_id: &str) -> Result<Option<JobRecord>> {
    let mut parents = select_jobs(conn, &Predicate::eq(Column::ContinuationId, job_id.to_string()))?;
    match parents.len() {
        0 => Ok(None),
        1 => Ok(parents.pop()),
        n => Err(JobDbError::IntegrityViolation(format!(
            "{n} records list {job_id} as their continuation"
        ))),
    }
}

/// The record that continued `job`, if it was continued
pub fn select_child(conn: &Connection, job: &JobRecord) -> Result<Option<JobRecord>> {
    let Some(child_id) = &job.continuation_id else {
        return Ok(None);
    };
    match find_job(conn, child_id)? {
        Some(child) => Ok(Some(child)),
        None => Err(JobDbError::IntegrityViolation(format!(
            "{} continues as {child_id}, which is not in the jobs database",
            job.job_id
        ))),
    }
}

/// Every record in the series containing `job_id`, oldest first
pub fn select_series(conn: &Connection, job_id: &str) -> Result<Vec<JobRecord>> {
    let job = select_job(conn, job_id)?;
    let mut visited = HashSet::from([job.job_id.clone()]);
    let mut visit = |record: &JobRecord| -> Result<()> {
        match visited.insert(record.job_id.clone()) {
            true => Ok(()),
            false => Err(JobDbError::IntegrityViolation(format!(
                "series of {job_id} loops back to {}",
                record.job_id
            ))),
        }
    };

    let mut older = Vec::new();
    let mut cursor = job.job_id.clone();
    while let Some(parent) = select_parent(conn, &cursor)? {
        visit(&parent)?;
        cursor = parent.job_id.clone();
        older.push(parent);
    }
    older.reverse();

    let mut newer = Vec::new();
    let mut cursor = job.clone();
    while let Some(child) = select_child(conn, &cursor)? {
        visit(&child)?;
        cursor = child.clone();
        newer.push(child);
    }

    older.push(job);
    older.extend(newer);
    Ok(older)
}

pub fn select_series_ids(conn: &Connection, job_id: &str) -> Result<Vec<String>> {
    let series = select_series(conn, job_id)?;
    Ok(series.into_iter().map(|job| job.job_id).collect())
}

/// Which records a listing covers
#[derive(Clone, Debug)]
pub enum Selection {
    All,
    /// Records still needing attention: not complete, aborted or continued
    Active,
    /// Numeric job ids in `[min, max]`
    Range { min: i64, max: i64 },
    /// Records modified in the last `seconds`
    Recent { seconds: i64 },
    /// Records whose `column` matches a regular expression
    Field { column: Column, pattern: String },
}

impl Selection {
    /// Field selection by name, checking the name is a real column
    pub fn field(key: &str, pattern: &str) -> Result<Self> {
        let column = key.parse::<Column>()?;
        Predicate::regex(column, pattern)?;
        Ok(Selection::Field {
            column,
            pattern: pattern.to_string(),
        })
    }

    pub fn predicate(&self, now: i64) -> Result<Predicate> {
        let predicate = match self {
            Selection::All => Predicate::All,
            Selection::Active => Predicate::not_in(
                Column::TaskState,
                TaskState::inactive_values().map(str::to_string),
            ),
            Selection::Range { min, max } => Predicate::range(Column::JobId, Some(*min), Some(*max)),
            Selection::Recent { seconds } => {
                Predicate::range(Column::ModifyTime, Some(now - seconds), None)
            }
            Selection::Field { column, pattern } => Predicate::regex(*column, pattern)?,
        };
        Ok(predicate)
    }
}

/// One id per matching record
pub fn select(conn: &Connection, selection: &Selection, now: i64) -> Result<Vec<String>> {
    select_ids(conn, &selection.predicate(now)?)
}

/// One id list per series whose newest record matches the selection
///
/// A series is keyed by its head, the record not yet continued. Older members
/// matching the selection do not bring their series in. Series are listed in
/// the order their heads were created.
pub fn select_grouped(conn: &Connection, selection: &Selection, now: i64) -> Result<Vec<Vec<String>>> {
    let heads = selection
        .predicate(now)?
        .and(Predicate::eq(Column::ContinuationId, NO_CONTINUATION.to_string()));
    select_ids(conn, &heads)?
        .iter()
        .map(|head| select_series_ids(conn, head))
        .collect()
}
