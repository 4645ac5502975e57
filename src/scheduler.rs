//! The external batch scheduler, as seen by the job database
//!
//! The database never talks to `sbatch`/`qstat` directly. It goes through the
//! [`Scheduler`] trait, and the implementation is picked once, when the
//! tracker is built, from the configured [`Dialect`].

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::db::job::state::SchedulerState;

/// Scheduler command dialects and detection
pub mod dialect;
/// Run scheduler commands with a bounded timeout
pub mod command;
pub mod slurm;
pub mod torque;

pub use command::CommandScheduler;
pub use dialect::Dialect;

/// A job the scheduler currently knows about
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ActiveJob {
    pub job_id: String,
    pub job_name: Option<String>,
    pub state: SchedulerState,
    pub elapsed_time: Option<i64>,
    pub start_time: Option<i64>,
    pub completion_time: Option<i64>,
    pub nodes: Option<i64>,
    pub procs: Option<i64>,
    pub walltime: Option<i64>,
    /// The scheduler's own report for this job, verbatim
    pub status_text: String,
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("{program} did not finish within {seconds}s")]
    Timeout { program: String, seconds: u64 },

    #[error("could not run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with status {status}: {output}")]
    Failed {
        program: String,
        status: i32,
        output: String,
    },

    #[error("could not parse {program} output: {reason}")]
    Parse { program: String, reason: String },
}

/// Operations the job database needs from a batch scheduler
///
/// Every call must return within a bounded time; a timeout is reported as an
/// error and never retried here.
pub trait Scheduler {
    /// Jobs the scheduler currently reports, keyed by job id
    ///
    /// `host_scope` is a regular expression naming the cluster's hosts. A
    /// scheduler that can see more than one cluster uses it to narrow the
    /// answer, one that only sees its own may ignore it.
    fn query_active(&self, host_scope: &str) -> Result<HashMap<String, ActiveJob>, SchedulerError>;

    /// Submit `script` from `run_dir`, returning the new job id
    fn submit(&self, script: &str, run_dir: &Path) -> Result<String, SchedulerError>;

    /// Ask the scheduler to kill a job, returning the command's exit status
    fn cancel(&self, job_id: &str) -> Result<i32, SchedulerError>;

    /// Id of the job this process runs inside, if any
    fn current_job_id(&self) -> Option<String> {
        None
    }
}

impl<S: Scheduler + ?Sized> Scheduler for Box<S> {
    fn query_active(&self, host_scope: &str) -> Result<HashMap<String, ActiveJob>, SchedulerError> {
        (**self).query_active(host_scope)
    }

    fn submit(&self, script: &str, run_dir: &Path) -> Result<String, SchedulerError> {
        (**self).submit(script, run_dir)
    }

    fn cancel(&self, job_id: &str) -> Result<i32, SchedulerError> {
        (**self).cancel(job_id)
    }

    fn current_job_id(&self) -> Option<String> {
        (**self).current_job_id()
    }
}
