use log::{info, warn};
use rusqlite::{Connection, TransactionBehavior};

use crate::db::column::Column;
use crate::db::job::load::{select_ids, select_job};
use crate::db::job::record::{FieldSet, JobRecord};
use crate::db::job::state::{SchedulerState, TaskState};
use crate::db::job::update::{delete_job, insert_job, update_job};
use crate::db::predicate::Predicate;
use crate::eligibility::{self, Transition};
use crate::error::{JobDbError, Result};
use crate::scheduler::{Scheduler, SchedulerError};
use crate::series;
use crate::tracker::{now, JobDb};

/// Task state changes requested by a person or by the job itself
///
/// Each one runs in a single immediate transaction: the record is loaded and
/// checked under the write lock, the scheduler is called, and only then is
/// the change written. A scheduler failure leaves the record untouched.
impl<S: Scheduler> JobDb<S> {
    /// Resubmit a finished auto job, returning the new job id
    pub fn continue_job(&mut self, job_id: &str) -> Result<String> {
        let now = now();
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let job = select_job(&tx, job_id)?;
        eligibility::eligible_to_continue(&job).into_result()?;

        info!("Continuing job {job_id} in {}", job.run_dir.display());
        let new_id = self
            .scheduler
            .submit(&job.submit_script, &job.run_dir)
            .map_err(JobDbError::Submission)?;

        let continuation = JobRecord::submitted(
            &new_id,
            &job.resubmission(),
            &self.identity.host_name,
            &self.identity.user_name,
            now,
        );
        let recorded = insert_job(&tx, &continuation)
            .and_then(|_| {
                let fields = FieldSet {
                    task_state: Some(TaskState::Continued),
                    continuation_id: Some(Some(new_id.clone())),
                    modify_time: Some(now),
                    ..Default::default()
                };
                update_job(&tx, job_id, &fields)
            })
            .and_then(|_| tx.commit().map_err(JobDbError::from));
        if let Err(err) = recorded {
            warn!("Job {new_id} continues {job_id} but could not be recorded: {err}");
            return Err(JobDbError::unrecorded(&new_id, err));
        }

        info!("Job {job_id} continued as {new_id}");
        Ok(new_id)
    }

    /// Continue every eligible auto job, returning `(old, new)` id pairs
    ///
    /// Stops at the first failure; jobs continued before it stay continued.
    pub fn continue_all(&mut self) -> Result<Vec<(String, String)>> {
        let eligible = Predicate::eq(Column::Auto, 1)
            .and(Predicate::eq(Column::TaskState, TaskState::Incomplete.to_string()))
            .and(Predicate::eq(
                Column::SchedulerState,
                SchedulerState::Complete.code().to_string(),
            ));

        let mut continued = Vec::new();
        for job_id in select_ids(&self.conn, &eligible)? {
            let new_id = self.continue_job(&job_id)?;
            continued.push((job_id, new_id));
        }
        Ok(continued)
    }

    /// Cancel the job with the scheduler and mark it aborted
    pub fn abort_job(&mut self, job_id: &str) -> Result<()> {
        let now = now();
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let job = select_job(&tx, job_id)?;
        eligibility::eligible_to_abort(&job).into_result()?;

        cancel_if_visible(&self.scheduler, &job)?;
        update_job(&tx, job_id, &FieldSet::task_state(TaskState::Aborted, now))?;
        tx.commit()?;
        info!("Job {job_id} aborted");
        Ok(())
    }

    /// Cancel the job if it is still queued or running and forget it
    ///
    /// If the job continued another one, the chain is closed around it: its
    /// parent now continues as its child, or, when it was the newest of its
    /// series, the parent becomes the newest and is marked aborted.
    pub fn delete_job(&mut self, job_id: &str) -> Result<()> {
        let now = now();
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let job = select_job(&tx, job_id)?;
        eligibility::check(Transition::Delete, &job).into_result()?;

        let parent = series::select_parent(&tx, job_id)?;
        cancel_if_visible(&self.scheduler, &job)?;
        delete_job(&tx, job_id)?;
        if let Some(parent) = parent {
            close_gap(&tx, &parent, &job, now)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Cancel and forget every job in the series containing `job_id`
    ///
    /// Cancels are requested for the whole series before anything is deleted.
    /// If one fails nothing is deleted, though earlier cancels have already
    /// reached the scheduler.
    pub fn delete_series(&mut self, job_id: &str) -> Result<Vec<String>> {
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let members = series::select_series(&tx, job_id)?;
        for job in &members {
            eligibility::check(Transition::Delete, job).into_result()?;
        }
        for job in &members {
            cancel_if_visible(&self.scheduler, job)?;
        }

        let mut deleted = Vec::new();
        for job in members {
            delete_job(&tx, &job.job_id)?;
            deleted.push(job.job_id);
        }
        tx.commit()?;
        Ok(deleted)
    }

    /// Mark a job as failed with `message`
    ///
    /// Any job can be marked as an error. An errored record that had been
    /// continued loses its continuation link, so its successor starts a new
    /// series.
    pub fn error_job(&mut self, job_id: &str, message: &str) -> Result<()> {
        let now = now();
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let job = select_job(&tx, job_id)?;
        eligibility::check(Transition::Error, &job).into_result()?;

        let mut fields = FieldSet::task_state(TaskState::error(message), now);
        if let Some(successor) = &job.continuation_id {
            warn!("Job {job_id} was continued as {successor}, detaching {successor} into its own series");
            fields.continuation_id = Some(None);
        }
        update_job(&tx, job_id, &fields)?;
        tx.commit()?;
        info!("Job {job_id} marked as error: {message}");
        Ok(())
    }

    /// Put an aborted or errored auto job back to incomplete
    pub fn reset_job(&mut self, job_id: &str) -> Result<()> {
        let now = now();
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let job = select_job(&tx, job_id)?;
        eligibility::eligible_to_reset(&job).into_result()?;

        update_job(&tx, job_id, &FieldSet::task_state(TaskState::Incomplete, now))?;
        tx.commit()?;
        info!("Job {job_id} reset");
        Ok(())
    }

    pub fn complete_job(&mut self, job_id: &str) -> Result<()> {
        let now = now();
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let job = select_job(&tx, job_id)?;
        eligibility::eligible_to_complete(&job).into_result()?;

        let fields = FieldSet {
            elapsed_time: Some(None),
            ..FieldSet::task_state(TaskState::Complete, now)
        };
        update_job(&tx, job_id, &fields)?;
        tx.commit()?;
        info!("Job {job_id} complete");
        Ok(())
    }

    /// Mark the job this process runs inside as complete
    pub fn complete_current(&mut self) -> Result<String> {
        let job_id = self.current_job_id()?;
        self.complete_job(&job_id)?;
        Ok(job_id)
    }

    /// Mark the job this process runs inside as failed
    pub fn error_current(&mut self, message: &str) -> Result<String> {
        let job_id = self.current_job_id()?;
        self.error_job(&job_id, message)?;
        Ok(job_id)
    }

    fn current_job_id(&self) -> Result<String> {
        self.scheduler.current_job_id().ok_or(JobDbError::NoCurrentJob)
    }
}

/// Only jobs the scheduler may still be running get a cancel request
fn cancel_if_visible<S: Scheduler>(scheduler: &S, job: &JobRecord) -> Result<()> {
    if job.scheduler_state.is_complete() {
        return Ok(());
    }
    let status = scheduler.cancel(&job.job_id).map_err(|source| JobDbError::Cancel {
        job_id: job.job_id.clone(),
        source,
    })?;
    if status != 0 {
        return Err(JobDbError::Cancel {
            job_id: job.job_id.clone(),
            source: SchedulerError::Failed {
                program: "cancel".to_string(),
                status,
                output: format!("exit status {status}"),
            },
        });
    }
    Ok(())
}

/// Link `parent` past `deleted`, which must already be gone from the store
fn close_gap(conn: &Connection, parent: &JobRecord, deleted: &JobRecord, now: i64) -> Result<()> {
    let fields = match &deleted.continuation_id {
        Some(child) => {
            info!("Job {} now continues as {child}", parent.job_id);
            FieldSet {
                continuation_id: Some(Some(child.clone())),
                modify_time: Some(now),
                ..Default::default()
            }
        }
        None => {
            warn!(
                "Deleting {}, the newest job of its series; {} is marked aborted",
                deleted.job_id, parent.job_id
            );
            FieldSet {
                continuation_id: Some(None),
                ..FieldSet::task_state(TaskState::Aborted, now)
            }
        }
    };
    update_job(conn, &parent.job_id, &fields)
}
