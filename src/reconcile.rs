//! Merge the scheduler's live view of jobs into the jobs database
//!
//! Records the scheduler no longer lists are presumed finished. Jobs the
//! scheduler lists but the database has never seen are reported as untracked
//! and left alone: they may belong to another tool or user, so they are
//! never adopted automatically.

use std::collections::BTreeMap;

use log::{debug, info};
use rusqlite::{Connection, TransactionBehavior};

use crate::db::column::Column;
use crate::db::job::load::{job_exists, select_jobs};
use crate::db::job::record::FieldSet;
use crate::db::job::state::SchedulerState;
use crate::db::job::update::update_job;
use crate::db::predicate::Predicate;
use crate::error::{JobDbError, Result};
use crate::scheduler::{ActiveJob, Scheduler};

/// Outcome of one reconciliation pass
#[derive(Debug, Default)]
pub struct Reconciliation {
    /// Records newly marked complete because the scheduler stopped listing them
    pub finished: Vec<String>,
    /// Records refreshed from a live scheduler report
    pub refreshed: Vec<String>,
    /// Non-auto records moved to `Check`
    pub promoted: usize,
    /// Scheduler jobs with no record, sorted by id
    pub untracked: Vec<ActiveJob>,
}

/// Regular expression matching the hosts of the cluster `host_name` belongs to
///
/// Login nodes of one cluster share a prefix (`flux-login1`, `flux-login2`), so
/// everything from the first `login` on, along with separators before it, is
/// dropped. Keeps clusters sharing one home directory from updating each
/// other's records.
pub fn host_scope(host_name: &str) -> String {
    let prefix = match host_name.find("login") {
        Some(index) => host_name[..index].trim_end_matches(|c: char| !c.is_ascii_alphanumeric()),
        None => host_name,
    };
    format!("{}.*", regex_lite::escape(prefix))
}

enum Observed<'a> {
    /// Not listed by the scheduler any more
    Finished,
    Live(&'a ActiveJob),
}

/// Run one reconciliation pass
///
/// The scheduler is queried before the database is locked. If the query
/// fails nothing is written. All updates then land in one transaction.
pub fn reconcile<S: Scheduler + ?Sized>(
    conn: &mut Connection,
    scheduler: &S,
    host_name: &str,
    now: i64,
) -> Result<Reconciliation> {
    let scope = host_scope(host_name);
    info!("Reconciling jobs on hosts matching {scope}");
    let active = scheduler
        .query_active(&scope)
        .map_err(JobDbError::ProviderUnavailable)?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let unfinished = Predicate::ne(Column::SchedulerState, SchedulerState::Complete.code().to_string())
        .and(Predicate::regex(Column::HostName, &scope)?);
    // Each unfinished record with its stored start time
    let mut observed: BTreeMap<String, (Option<i64>, Observed)> = select_jobs(&tx, &unfinished)?
        .into_iter()
        .map(|job| (job.job_id, (job.start_time, Observed::Finished)))
        .collect();

    let mut report = Reconciliation::default();
    for (job_id, job) in &active {
        match observed.get_mut(job_id) {
            Some((_, entry)) => *entry = Observed::Live(job),
            None => {
                if !job_exists(&tx, job_id)? {
                    report.untracked.push(job.clone());
                }
            }
        }
    }

    for (job_id, (stored_start, entry)) in &observed {
        let fields = match entry {
            Observed::Finished => {
                report.finished.push(job_id.clone());
                FieldSet {
                    scheduler_state: Some(SchedulerState::Complete),
                    elapsed_time: Some(None),
                    modify_time: Some(now),
                    ..Default::default()
                }
            }
            Observed::Live(job) => {
                report.refreshed.push(job_id.clone());
                live_fields(job, *stored_start, now)
            }
        };
        update_job(&tx, job_id, &fields)?;
    }

    report.promoted = tx.execute(
        "UPDATE job SET task_state = 'Check', modify_time = ?1 \
         WHERE scheduler_state = 'C' AND task_state = 'Incomplete' AND auto = 0",
        [now],
    )?;
    tx.commit()?;

    report.untracked.sort_by(|a, b| a.job_id.cmp(&b.job_id));
    debug!(
        "Reconciled: {} finished, {} refreshed, {} to check, {} untracked",
        report.finished.len(),
        report.refreshed.len(),
        report.promoted,
        report.untracked.len()
    );
    Ok(report)
}

/// Timing fields are only ever filled in, never cleared by a live report
///
/// They fill in order: a completion time is dropped until a start time is
/// known, either from this report or from the stored record.
fn live_fields(job: &ActiveJob, stored_start: Option<i64>, now: i64) -> FieldSet {
    let started = job.start_time.or(stored_start).is_some();
    FieldSet {
        scheduler_state: Some(job.state.clone()),
        status_text: Some(Some(job.status_text.clone())),
        elapsed_time: Some(job.elapsed_time),
        start_time: job.start_time.map(Some),
        completion_time: job.completion_time.filter(|_| started).map(Some),
        modify_time: Some(now),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(start_time: Option<i64>, completion_time: Option<i64>) -> ActiveJob {
        ActiveJob {
            job_id: "1".to_string(),
            state: SchedulerState::Running,
            start_time,
            completion_time,
            ..Default::default()
        }
    }

    #[test]
    fn completion_waits_for_a_start_time() {
        let fields = live_fields(&report(None, Some(200)), None, 300);
        assert_eq!(fields.start_time, None);
        assert_eq!(fields.completion_time, None);

        let fields = live_fields(&report(None, Some(200)), Some(100), 300);
        assert_eq!(fields.completion_time, Some(Some(200)));

        let fields = live_fields(&report(Some(100), Some(200)), None, 300);
        assert_eq!(fields.start_time, Some(Some(100)));
        assert_eq!(fields.completion_time, Some(Some(200)));
    }

    #[test]
    fn login_suffix_is_stripped() {
        assert_eq!(host_scope("flux-login1.arc-ts.umich.edu"), "flux.*");
        assert_eq!(host_scope("gl-login2"), "gl.*");
    }

    #[test]
    fn compute_hosts_keep_their_name() {
        assert_eq!(host_scope("nyx5513"), "nyx5513.*");
        assert_eq!(host_scope("node.cluster"), "node\\.cluster.*");
    }

    #[test]
    fn bare_login_host_matches_everything() {
        assert_eq!(host_scope("login3"), ".*");
    }
}
