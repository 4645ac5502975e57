use rusqlite::ErrorCode;
use thiserror::Error;

use crate::scheduler::SchedulerError;

pub type Result<T> = std::result::Result<T, JobDbError>;

/// Every failure the job database reports to its caller
///
/// Variants are distinct so callers can match on them: `StoreBusy` is the only
/// one worth retrying, everything else needs a human or a different request.
#[derive(Debug, Error)]
pub enum JobDbError {
    #[error("job {0} not found in jobs database")]
    NotFound(String),

    #[error("job {0} is already in the jobs database")]
    DuplicateKey(String),

    #[error("{job_id}: {reason}")]
    IneligibleTransition { job_id: String, reason: String },

    #[error("submission failed: {0}")]
    Submission(#[source] SchedulerError),

    #[error("cancelling job {job_id} failed: {source}")]
    Cancel {
        job_id: String,
        #[source]
        source: SchedulerError,
    },

    /// The scheduler accepted `job_id` but the store could not record it
    #[error("job {job_id} was submitted but is not in the jobs database: {source}")]
    Unrecorded {
        job_id: String,
        #[source]
        source: Box<JobDbError>,
    },

    #[error("scheduler status unavailable: {0}")]
    ProviderUnavailable(#[source] SchedulerError),

    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("{0} is not a job record field")]
    UnknownField(String),

    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("jobs database is locked by another process")]
    StoreBusy(#[source] rusqlite::Error),

    #[error("jobs database error: {0}")]
    Store(#[source] rusqlite::Error),

    #[error("not running inside a scheduler job")]
    NoCurrentJob,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("rendering report: {0}")]
    Render(#[from] tinytemplate::error::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl JobDbError {
    pub fn ineligible(job_id: &str, reason: impl Into<String>) -> Self {
        JobDbError::IneligibleTransition {
            job_id: job_id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn unrecorded(job_id: &str, source: JobDbError) -> Self {
        JobDbError::Unrecorded {
            job_id: job_id.to_string(),
            source: Box::new(source),
        }
    }

    /// Lock conflicts are the only errors a caller may simply try again
    ///
    /// A conflict that comes after a submit is wrapped in `Unrecorded` and is
    /// not retryable, since repeating the call would submit the job again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, JobDbError::StoreBusy(_))
    }
}

impl From<rusqlite::Error> for JobDbError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                JobDbError::StoreBusy(err)
            }
            _ => JobDbError::Store(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_sqlite_errors_are_retryable() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(JobDbError::from(busy).is_retryable());

        let other = rusqlite::Error::QueryReturnedNoRows;
        assert!(!JobDbError::from(other).is_retryable());
    }

    #[test]
    fn busy_after_a_submit_is_not_retryable() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        let err = JobDbError::unrecorded("1001", JobDbError::from(busy));
        assert!(!err.is_retryable());
        assert!(err.to_string().starts_with("job 1001 was submitted"));
    }

    #[test]
    fn ineligible_message_names_the_job() {
        let err = JobDbError::ineligible("123", "auto = false");
        assert_eq!(err.to_string(), "123: auto = false");
    }
}
