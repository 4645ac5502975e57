//! Whether a job record may move to a new task state
//!
//! | transition | allowed when                                                  |
//! |------------|---------------------------------------------------------------|
//! | continue   | scheduler state `C`, task `Incomplete`, auto                  |
//! | abort      | scheduler state not `C`, or task `Incomplete`/`Check`         |
//! | delete     | always                                                        |
//! | error      | always                                                        |
//! | reset      | auto, task `Aborted` or `Error: ...`                          |
//! | complete   | task `Check`, or task `Incomplete` for auto jobs              |
//!
//! Jobs that can't report their own completion (not auto) must pass through
//! `Check` before they can be completed.

use std::fmt;

use crate::db::job::record::JobRecord;
use crate::db::job::state::TaskState;
use crate::error::{JobDbError, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    Continue,
    Abort,
    Delete,
    Error,
    Reset,
    Complete,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Transition::Continue => write!(f, "continue"),
            Transition::Abort => write!(f, "abort"),
            Transition::Delete => write!(f, "delete"),
            Transition::Error => write!(f, "error"),
            Transition::Reset => write!(f, "reset"),
            Transition::Complete => write!(f, "complete"),
        }
    }
}

/// Outcome of an eligibility check, with the reason when it fails
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Eligibility {
    pub job_id: String,
    pub transition: Transition,
    pub reason: Option<String>,
}

impl Eligibility {
    fn eligible(job: &JobRecord, transition: Transition) -> Self {
        Eligibility {
            job_id: job.job_id.clone(),
            transition,
            reason: None,
        }
    }

    fn ineligible(job: &JobRecord, transition: Transition, reason: String) -> Self {
        Eligibility {
            job_id: job.job_id.clone(),
            transition,
            reason: Some(format!("Job not eligible to {transition}. {reason}")),
        }
    }

    pub fn is_eligible(&self) -> bool {
        self.reason.is_none()
    }

    /// `IneligibleTransition` carrying the reason, if not eligible
    pub fn into_result(self) -> Result<()> {
        match self.reason {
            None => Ok(()),
            Some(reason) => Err(JobDbError::ineligible(&self.job_id, reason)),
        }
    }
}

pub fn check(transition: Transition, job: &JobRecord) -> Eligibility {
    match transition {
        Transition::Continue => eligible_to_continue(job),
        Transition::Abort => eligible_to_abort(job),
        Transition::Delete => Eligibility::eligible(job, Transition::Delete),
        Transition::Error => Eligibility::eligible(job, Transition::Error),
        Transition::Reset => eligible_to_reset(job),
        Transition::Complete => eligible_to_complete(job),
    }
}

pub fn eligible_to_continue(job: &JobRecord) -> Eligibility {
    let transition = Transition::Continue;
    if !job.scheduler_state.is_complete() {
        let reason = format!("scheduler state = {}", job.scheduler_state);
        return Eligibility::ineligible(job, transition, reason);
    }
    if job.task_state != TaskState::Incomplete {
        let reason = format!("task state = {}", job.task_state);
        return Eligibility::ineligible(job, transition, reason);
    }
    if !job.auto {
        return Eligibility::ineligible(job, transition, "auto = false".to_string());
    }
    Eligibility::eligible(job, transition)
}

pub fn eligible_to_abort(job: &JobRecord) -> Eligibility {
    let transition = Transition::Abort;
    let unfinished = matches!(job.task_state, TaskState::Incomplete | TaskState::Check);
    if !job.scheduler_state.is_complete() || unfinished {
        return Eligibility::eligible(job, transition);
    }
    let reason = format!(
        "scheduler state = {} and task state = {}",
        job.scheduler_state, job.task_state
    );
    Eligibility::ineligible(job, transition, reason)
}

pub fn eligible_to_reset(job: &JobRecord) -> Eligibility {
    let transition = Transition::Reset;
    if !job.auto {
        return Eligibility::ineligible(job, transition, "auto = false".to_string());
    }
    if job.task_state != TaskState::Aborted && !job.task_state.is_error() {
        let reason = format!("task state = {}", job.task_state);
        return Eligibility::ineligible(job, transition, reason);
    }
    Eligibility::eligible(job, transition)
}

pub fn eligible_to_complete(job: &JobRecord) -> Eligibility {
    let transition = Transition::Complete;
    match (&job.task_state, job.auto) {
        (TaskState::Check, _) | (TaskState::Incomplete, true) => {
            Eligibility::eligible(job, transition)
        }
        (TaskState::Incomplete, false) => Eligibility::ineligible(
            job,
            transition,
            "task state = Incomplete and auto = false, the scheduler must finish it first"
                .to_string(),
        ),
        (state, _) => Eligibility::ineligible(job, transition, format!("task state = {state}")),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::db::job::record::NewJob;
    use crate::db::job::state::SchedulerState;

    fn job(auto: bool, scheduler: SchedulerState, task: TaskState) -> JobRecord {
        let new = NewJob {
            job_name: "relax".to_string(),
            run_dir: PathBuf::from("/scratch/relax"),
            submit_script: "#!/bin/sh\n".to_string(),
            auto,
            nodes: Some(1),
            procs: Some(16),
            walltime: Some(3600),
        };
        let mut record = JobRecord::submitted("100", &new, "flux-login1", "alice", 0);
        record.scheduler_state = scheduler;
        record.task_state = task;
        record
    }

    #[test]
    fn continue_needs_finished_incomplete_auto_job() {
        let ok = job(true, SchedulerState::Complete, TaskState::Incomplete);
        assert!(eligible_to_continue(&ok).is_eligible());

        let running = job(true, SchedulerState::Running, TaskState::Incomplete);
        assert!(!eligible_to_continue(&running).is_eligible());

        let manual = job(false, SchedulerState::Complete, TaskState::Incomplete);
        let outcome = eligible_to_continue(&manual);
        assert_eq!(outcome.job_id, "100");
        assert!(outcome.reason.unwrap().contains("auto = false"));

        let done = job(true, SchedulerState::Complete, TaskState::Complete);
        assert!(!eligible_to_continue(&done).is_eligible());
    }

    #[test]
    fn abort_allowed_while_running_or_unfinished() {
        assert!(eligible_to_abort(&job(false, SchedulerState::Queued, TaskState::Complete)).is_eligible());
        assert!(eligible_to_abort(&job(false, SchedulerState::Complete, TaskState::Check)).is_eligible());
        assert!(eligible_to_abort(&job(true, SchedulerState::Complete, TaskState::Incomplete)).is_eligible());
        assert!(!eligible_to_abort(&job(true, SchedulerState::Complete, TaskState::Continued)).is_eligible());
        assert!(!eligible_to_abort(&job(true, SchedulerState::Complete, TaskState::Aborted)).is_eligible());
    }

    #[test]
    fn delete_and_error_are_unconditional() {
        let continued = job(true, SchedulerState::Complete, TaskState::Continued);
        assert!(check(Transition::Delete, &continued).is_eligible());
        assert!(check(Transition::Error, &continued).is_eligible());
    }

    #[test]
    fn reset_only_for_failed_auto_jobs() {
        assert!(eligible_to_reset(&job(true, SchedulerState::Complete, TaskState::Aborted)).is_eligible());
        assert!(eligible_to_reset(&job(true, SchedulerState::Complete, TaskState::error("oom"))).is_eligible());
        assert!(!eligible_to_reset(&job(false, SchedulerState::Complete, TaskState::Aborted)).is_eligible());
        assert!(!eligible_to_reset(&job(true, SchedulerState::Complete, TaskState::Complete)).is_eligible());
    }

    #[test]
    fn manual_jobs_complete_only_from_check() {
        assert!(eligible_to_complete(&job(false, SchedulerState::Complete, TaskState::Check)).is_eligible());
        assert!(!eligible_to_complete(&job(false, SchedulerState::Running, TaskState::Incomplete)).is_eligible());
        assert!(eligible_to_complete(&job(true, SchedulerState::Running, TaskState::Incomplete)).is_eligible());
        assert!(!eligible_to_complete(&job(true, SchedulerState::Complete, TaskState::Aborted)).is_eligible());
    }

    #[test]
    fn ineligible_outcome_becomes_typed_error() {
        let err = eligible_to_reset(&job(false, SchedulerState::Complete, TaskState::Aborted))
            .into_result()
            .unwrap_err();
        match err {
            JobDbError::IneligibleTransition { job_id, reason } => {
                assert_eq!(job_id, "100");
                assert_eq!(reason, "Job not eligible to reset. auto = false");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
