use std::path::PathBuf;

use rusqlite::types::Value;
use rusqlite::Row;
use serde::Serialize;

use crate::db::column::Column;
use crate::db::job::state::{SchedulerState, TaskState};

/// Stored in `continuation_id` while a record has not been continued
pub const NO_CONTINUATION: &str = "-";

/// One row of the `job` table: a single submission to the scheduler
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct JobRecord {
    pub job_id: String,
    pub job_name: String,
    pub run_dir: PathBuf,
    pub host_name: String,
    pub user_name: String,
    pub scheduler_state: SchedulerState,
    pub task_state: TaskState,
    /// Job that superseded this one, `None` while the record is the newest of its series
    pub continuation_id: Option<String>,
    pub submit_script: String,
    pub status_text: Option<String>,
    pub auto: bool,
    pub nodes: Option<i64>,
    pub procs: Option<i64>,
    /// Requested walltime in seconds
    pub walltime: Option<i64>,
    pub elapsed_time: Option<i64>,
    pub creation_time: i64,
    pub start_time: Option<i64>,
    pub completion_time: Option<i64>,
    pub modify_time: i64,
}

/// What the caller knows about a job at submission time
#[derive(Clone, Debug)]
pub struct NewJob {
    pub job_name: String,
    pub run_dir: PathBuf,
    pub submit_script: String,
    /// The job marks itself complete when done, so it can be resubmitted until it does
    pub auto: bool,
    pub nodes: Option<i64>,
    pub procs: Option<i64>,
    pub walltime: Option<i64>,
}

impl JobRecord {
    /// A freshly submitted job: incomplete, never seen by the scheduler status query
    pub fn submitted(
        job_id: &str,
        job: &NewJob,
        host_name: &str,
        user_name: &str,
        now: i64,
    ) -> Self {
        JobRecord {
            job_id: job_id.to_string(),
            job_name: job.job_name.clone(),
            run_dir: job.run_dir.clone(),
            host_name: host_name.to_string(),
            user_name: user_name.to_string(),
            scheduler_state: SchedulerState::Unknown,
            task_state: TaskState::Incomplete,
            continuation_id: None,
            submit_script: job.submit_script.clone(),
            status_text: None,
            auto: job.auto,
            nodes: job.nodes,
            procs: job.procs,
            walltime: job.walltime,
            elapsed_time: None,
            creation_time: now,
            start_time: None,
            completion_time: None,
            modify_time: now,
        }
    }

    /// The submission that replays this record, used when continuing it
    pub fn resubmission(&self) -> NewJob {
        NewJob {
            job_name: self.job_name.clone(),
            run_dir: self.run_dir.clone(),
            submit_script: self.submit_script.clone(),
            auto: self.auto,
            nodes: self.nodes,
            procs: self.procs,
            walltime: self.walltime,
        }
    }

    /// Read a row selected with `Column::select_list()`
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let run_dir: String = row.get(2)?;
        let scheduler_state: String = row.get(5)?;
        let task_state: String = row.get(6)?;
        let continuation_id: String = row.get(7)?;

        let task_state = task_state.parse::<TaskState>().map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(
                6,
                rusqlite::types::Type::Text,
                err.into(),
            )
        })?;

        Ok(JobRecord {
            job_id: row.get(0)?,
            job_name: row.get(1)?,
            run_dir: PathBuf::from(run_dir),
            host_name: row.get(3)?,
            user_name: row.get(4)?,
            scheduler_state: SchedulerState::from_code(&scheduler_state),
            task_state,
            continuation_id: match continuation_id.as_str() {
                NO_CONTINUATION => None,
                _ => Some(continuation_id),
            },
            submit_script: row.get(8)?,
            status_text: row.get(9)?,
            auto: row.get(10)?,
            nodes: row.get(11)?,
            procs: row.get(12)?,
            walltime: row.get(13)?,
            elapsed_time: row.get(14)?,
            creation_time: row.get(15)?,
            start_time: row.get(16)?,
            completion_time: row.get(17)?,
            modify_time: row.get(18)?,
        })
    }

    /// Column values in `Column::ALL` order
    pub fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.job_id.clone()),
            Value::Text(self.job_name.clone()),
            Value::Text(self.run_dir.display().to_string()),
            Value::Text(self.host_name.clone()),
            Value::Text(self.user_name.clone()),
            Value::Text(self.scheduler_state.code().to_string()),
            Value::Text(self.task_state.to_string()),
            continuation_value(self.continuation_id.as_deref()),
            Value::Text(self.submit_script.clone()),
            self.status_text.clone().into(),
            Value::Integer(self.auto as i64),
            self.nodes.into(),
            self.procs.into(),
            self.walltime.into(),
            self.elapsed_time.into(),
            Value::Integer(self.creation_time),
            self.start_time.into(),
            self.completion_time.into(),
            Value::Integer(self.modify_time),
        ]
    }

    /// The column/value pairs, for full record listings
    pub fn fields(&self) -> Vec<(Column, Value)> {
        Column::ALL.into_iter().zip(self.values()).collect()
    }
}

pub fn continuation_value(continuation_id: Option<&str>) -> Value {
    Value::Text(continuation_id.unwrap_or(NO_CONTINUATION).to_string())
}

/// A partial update: only the fields that are `Some` are written
///
/// Nullable columns take `Some(None)` to clear them. `auto` is deliberately
/// absent, it never changes after creation.
#[derive(Clone, Debug, Default)]
pub struct FieldSet {
    pub scheduler_state: Option<SchedulerState>,
    pub task_state: Option<TaskState>,
    pub continuation_id: Option<Option<String>>,
    pub status_text: Option<Option<String>>,
    pub elapsed_time: Option<Option<i64>>,
    pub start_time: Option<Option<i64>>,
    pub completion_time: Option<Option<i64>>,
    pub modify_time: Option<i64>,
}

impl FieldSet {
    pub fn task_state(state: TaskState, now: i64) -> Self {
        FieldSet {
            task_state: Some(state),
            modify_time: Some(now),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.assignments().is_empty()
    }

    pub fn assignments(&self) -> Vec<(Column, Value)> {
        let mut assignments = Vec::new();
        if let Some(state) = &self.scheduler_state {
            assignments.push((Column::SchedulerState, Value::Text(state.code().to_string())));
        }
        if let Some(state) = &self.task_state {
            assignments.push((Column::TaskState, Value::Text(state.to_string())));
        }
        if let Some(continuation_id) = &self.continuation_id {
            assignments.push((
                Column::ContinuationId,
                continuation_value(continuation_id.as_deref()),
            ));
        }
        if let Some(text) = &self.status_text {
            assignments.push((Column::StatusText, text.clone().into()));
        }
        if let Some(elapsed) = self.elapsed_time {
            assignments.push((Column::ElapsedTime, elapsed.into()));
        }
        if let Some(start) = self.start_time {
            assignments.push((Column::StartTime, start.into()));
        }
        if let Some(completion) = self.completion_time {
            assignments.push((Column::CompletionTime, completion.into()));
        }
        if let Some(modify) = self.modify_time {
            assignments.push((Column::ModifyTime, Value::Integer(modify)));
        }
        assignments
    }
}
