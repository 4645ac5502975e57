//! `JobDb`: the jobs database together with the scheduler it tracks
//!
//! Owns the SQLite connection, the scheduler chosen at construction and the
//! untracked jobs found by the last reconciliation. Transitions live in
//! `transition.rs` as a second `impl JobDb` block.

use std::env;
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use log::{info, warn};
use rusqlite::Connection;

use crate::db::job::load::{scan, select_job, select_jobs};
use crate::db::job::record::{FieldSet, JobRecord, NewJob};
use crate::db::job::update::{insert_job, update_job};
use crate::db::open::{open_db, open_in_memory};
use crate::db::predicate::Predicate;
use crate::error::{JobDbError, Result};
use crate::reconcile::{reconcile, Reconciliation};
use crate::scheduler::{ActiveJob, Scheduler};
use crate::series::{self, Selection};

/// Who is tracking jobs, and from which host
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub host_name: String,
    pub user_name: String,
}

impl Identity {
    pub fn new(host_name: &str, user_name: &str) -> Self {
        Identity {
            host_name: host_name.to_string(),
            user_name: user_name.to_string(),
        }
    }

    /// This host's name and the login name from `$USER` or `$LOGNAME`
    pub fn detect() -> Self {
        let host_name = hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "?".to_string());
        let user_name = env::var("USER")
            .or_else(|_| env::var("LOGNAME"))
            .unwrap_or_else(|_| "?".to_string());
        Identity { host_name, user_name }
    }
}

pub(crate) fn now() -> i64 {
    Utc::now().timestamp()
}

pub struct JobDb<S: Scheduler> {
    pub(crate) conn: Connection,
    pub(crate) scheduler: S,
    pub(crate) identity: Identity,
    untracked: Vec<ActiveJob>,
}

impl<S: Scheduler> JobDb<S> {
    pub fn open(path: &Path, busy_timeout: Duration, scheduler: S, identity: Identity) -> Result<Self> {
        let conn = open_db(path, busy_timeout)?;
        Ok(Self::with_connection(conn, scheduler, identity))
    }

    pub fn in_memory(scheduler: S, identity: Identity) -> Result<Self> {
        Ok(Self::with_connection(open_in_memory()?, scheduler, identity))
    }

    fn with_connection(conn: Connection, scheduler: S, identity: Identity) -> Self {
        JobDb {
            conn,
            scheduler,
            identity,
            untracked: Vec::new(),
        }
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Submit a new job and start tracking it
    pub fn submit(&mut self, job: &NewJob) -> Result<JobRecord> {
        let job_id = self
            .scheduler
            .submit(&job.submit_script, &job.run_dir)
            .map_err(JobDbError::Submission)?;
        info!("Submitted {} as job {job_id}", job.job_name);

        self.track(&job_id, job).map_err(|err| {
            warn!("Job {job_id} is running but could not be recorded: {err}");
            JobDbError::unrecorded(&job_id, err)
        })
    }

    /// Start tracking a job that was already submitted
    pub fn track(&mut self, job_id: &str, job: &NewJob) -> Result<JobRecord> {
        let record = JobRecord::submitted(
            job_id,
            job,
            &self.identity.host_name,
            &self.identity.user_name,
            now(),
        );
        insert_job(&self.conn, &record)?;
        Ok(record)
    }

    pub fn insert(&mut self, record: &JobRecord) -> Result<()> {
        insert_job(&self.conn, record)
    }

    pub fn update(&mut self, job_id: &str, fields: &FieldSet) -> Result<()> {
        update_job(&self.conn, job_id, fields)
    }

    pub fn get(&self, job_id: &str) -> Result<JobRecord> {
        select_job(&self.conn, job_id)
    }

    pub fn query(&self, predicate: &Predicate) -> Result<Vec<JobRecord>> {
        select_jobs(&self.conn, predicate)
    }

    /// Stream matching records without collecting them
    pub fn scan<F>(&self, predicate: &Predicate, visit: F) -> Result<()>
    where
        F: FnMut(JobRecord) -> Result<()>,
    {
        scan(&self.conn, predicate, visit)
    }

    /// Merge the scheduler's current view into the database
    ///
    /// Replaces the untracked list on success. On failure nothing is written
    /// and the previous untracked list is kept.
    pub fn reconcile(&mut self) -> Result<Reconciliation> {
        let report = reconcile(&mut self.conn, &self.scheduler, &self.identity.host_name, now())?;
        self.untracked = report.untracked.clone();
        Ok(report)
    }

    /// Scheduler jobs without a record, as of the last reconciliation
    pub fn untracked(&self) -> &[ActiveJob] {
        &self.untracked
    }

    pub fn parent(&self, job_id: &str) -> Result<Option<JobRecord>> {
        select_job(&self.conn, job_id)?;
        series::select_parent(&self.conn, job_id)
    }

    pub fn child(&self, job_id: &str) -> Result<Option<JobRecord>> {
        let job = select_job(&self.conn, job_id)?;
        series::select_child(&self.conn, &job)
    }

    pub fn series(&self, job_id: &str) -> Result<Vec<JobRecord>> {
        series::select_series(&self.conn, job_id)
    }

    pub fn series_ids(&self, job_id: &str) -> Result<Vec<String>> {
        series::select_series_ids(&self.conn, job_id)
    }

    pub fn select(&self, selection: &Selection) -> Result<Vec<String>> {
        series::select(&self.conn, selection, now())
    }

    pub fn select_series(&self, selection: &Selection) -> Result<Vec<Vec<String>>> {
        series::select_grouped(&self.conn, selection, now())
    }
}
