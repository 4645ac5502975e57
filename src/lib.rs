//! seuranta keeps track of batch jobs submitted to a cluster scheduler
//!
//! Every submission becomes a record in a SQLite jobs database. A
//! reconciliation pass merges what the scheduler (SLURM or Torque) reports
//! into those records, and each record carries a task state of its own that
//! says whether the work is actually done. Jobs that need more walltime than
//! one submission allows are resubmitted ("continued"), and the chain of
//! continuations forms a series.
//!
//! ```no_run
//! use std::time::Duration;
//! use seuranta::{CommandScheduler, Dialect, Identity, JobDb};
//!
//! let identity = Identity::detect();
//! let scheduler = CommandScheduler::new(Dialect::Slurm, Duration::from_secs(30), &identity.user_name);
//! let mut db = JobDb::open("jobs.db".as_ref(), Duration::from_secs(5), scheduler, identity)?;
//! db.reconcile()?;
//! db.continue_all()?;
//! # Ok::<(), seuranta::JobDbError>(())
//! ```

pub mod config;
/// SQLite storage of job records
pub mod db;
pub mod eligibility;
pub mod error;
pub mod reconcile;
/// Summary, full and JSON listings
pub mod report;
pub mod retry;
pub mod scheduler;
pub mod series;
pub mod tracker;
mod transition;
pub mod walltime;

pub use db::job::record::{FieldSet, JobRecord, NewJob};
pub use db::job::state::{SchedulerState, TaskState};
pub use error::{JobDbError, Result};
pub use reconcile::Reconciliation;
pub use scheduler::{ActiveJob, CommandScheduler, Dialect, Scheduler, SchedulerError};
pub use series::Selection;
pub use tracker::{Identity, JobDb};
