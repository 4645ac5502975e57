use std::collections::HashSet;

use log::{debug, info};
use rusqlite::{params_from_iter, Connection, ErrorCode, OptionalExtension};

use crate::db::column::Column;
use crate::db::job::load::job_exists;
use crate::db::job::record::{FieldSet, JobRecord};
use crate::error::{JobDbError, Result};

/// Add a record, failing with `DuplicateKey` if its id is already tracked
pub fn insert_job(conn: &Connection, job: &JobRecord) -> Result<()> {
    info!("Adding job {} ({}) to db", job.job_id, job.job_name);
    let columns = Column::select_list();
    let marks = vec!["?"; Column::ALL.len()].join(", ");
    let sql = format!("INSERT INTO job ({columns}) VALUES ({marks})");
    if let Some(continuation_id) = &job.continuation_id {
        check_continuation(conn, &job.job_id, continuation_id)?;
    }

    match conn.execute(&sql, params_from_iter(job.values())) {
        Ok(_) => Ok(()),
        Err(err) if is_violation(&err, rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY) => {
            Err(JobDbError::DuplicateKey(job.job_id.clone()))
        }
        Err(err) => Err(link_error(err, &job.job_id)),
    }
}

/// Write the fields set in `fields`; one statement, so readers see all or nothing
pub fn update_job(conn: &Connection, job_id: &str, fields: &FieldSet) -> Result<()> {
    let assignments = fields.assignments();
    if assignments.is_empty() {
        return match job_exists(conn, job_id)? {
            true => Ok(()),
            false => Err(JobDbError::NotFound(job_id.to_string())),
        };
    }

    let set = assignments
        .iter()
        .map(|(column, _)| format!("{column} = ?"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("UPDATE job SET {set} WHERE job_id = ?");
    debug!("Updating {job_id}: {set}");

    if let Some(Some(continuation_id)) = &fields.continuation_id {
        check_continuation(conn, job_id, continuation_id)?;
    }

    let mut values: Vec<_> = assignments.into_iter().map(|(_, value)| value).collect();
    values.push(job_id.to_string().into());

    let updated = conn
        .execute(&sql, params_from_iter(values))
        .map_err(|err| link_error(err, job_id))?;
    match updated {
        0 => Err(JobDbError::NotFound(job_id.to_string())),
        _ => Ok(()),
    }
}

pub fn delete_job(conn: &Connection, job_id: &str) -> Result<()> {
    info!("Deleting job {job_id} from db");
    match conn.execute("DELETE FROM job WHERE job_id = ?1", [job_id])? {
        0 => Err(JobDbError::NotFound(job_id.to_string())),
        _ => Ok(()),
    }
}

/// `job_id` may only continue as an existing record that nothing else
/// continues and that is not already one of its ancestors
fn check_continuation(conn: &Connection, job_id: &str, continuation_id: &str) -> Result<()> {
    let violation = |reason: String| -> Result<()> { Err(JobDbError::IntegrityViolation(reason)) };
    if continuation_id == job_id {
        return violation(format!("{job_id} cannot continue as itself"));
    }
    if !job_exists(conn, continuation_id)? {
        return violation(format!(
            "{job_id} cannot continue as {continuation_id}, which is not in the jobs database"
        ));
    }
    if let Some(parent) = parent_id(conn, continuation_id)? {
        if parent != job_id {
            return violation(format!("{continuation_id} already continues {parent}"));
        }
    }

    let mut seen = HashSet::from([job_id.to_string()]);
    let mut cursor = job_id.to_string();
    while let Some(parent) = parent_id(conn, &cursor)? {
        if parent == continuation_id {
            return violation(format!(
                "{job_id} cannot continue as {continuation_id}, which comes before it in its series"
            ));
        }
        if !seen.insert(parent.clone()) {
            break;
        }
        cursor = parent;
    }
    Ok(())
}

fn parent_id(conn: &Connection, job_id: &str) -> Result<Option<String>> {
    let parent = conn
        .query_row(
            "SELECT job_id FROM job WHERE continuation_id = ?1",
            [job_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(parent)
}

/// The unique index on `continuation_id` backs up `check_continuation`
fn link_error(err: rusqlite::Error, job_id: &str) -> JobDbError {
    if is_violation(&err, rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE) {
        return JobDbError::IntegrityViolation(format!(
            "{job_id} continues a job that is already continued: {err}"
        ));
    }
    err.into()
}

fn is_violation(err: &rusqlite::Error, extended_code: std::os::raw::c_int) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => {
            failure.code == ErrorCode::ConstraintViolation && failure.extended_code == extended_code
        }
        _ => false,
    }
}
