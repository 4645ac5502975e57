use std::fmt;
use std::str::FromStr;

use crate::error::JobDbError;

/// Columns of the `job` table
///
/// Selections address columns through this enum so user-supplied field names
/// never reach SQL text unchecked.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Column {
    JobId,
    JobName,
    RunDir,
    HostName,
    UserName,
    SchedulerState,
    TaskState,
    ContinuationId,
    SubmitScript,
    StatusText,
    Auto,
    Nodes,
    Procs,
    Walltime,
    ElapsedTime,
    CreationTime,
    StartTime,
    CompletionTime,
    ModifyTime,
}

impl Column {
    pub const ALL: [Column; 19] = [
        Column::JobId,
        Column::JobName,
        Column::RunDir,
        Column::HostName,
        Column::UserName,
        Column::SchedulerState,
        Column::TaskState,
        Column::ContinuationId,
        Column::SubmitScript,
        Column::StatusText,
        Column::Auto,
        Column::Nodes,
        Column::Procs,
        Column::Walltime,
        Column::ElapsedTime,
        Column::CreationTime,
        Column::StartTime,
        Column::CompletionTime,
        Column::ModifyTime,
    ];

    /// db column name, safe to splice into SQL
    pub fn name(&self) -> &'static str {
        match self {
            Column::JobId => "job_id",
            Column::JobName => "job_name",
            Column::RunDir => "run_dir",
            Column::HostName => "host_name",
            Column::UserName => "user_name",
            Column::SchedulerState => "scheduler_state",
            Column::TaskState => "task_state",
            Column::ContinuationId => "continuation_id",
            Column::SubmitScript => "submit_script",
            Column::StatusText => "status_text",
            Column::Auto => "auto",
            Column::Nodes => "nodes",
            Column::Procs => "procs",
            Column::Walltime => "walltime",
            Column::ElapsedTime => "elapsed_time",
            Column::CreationTime => "creation_time",
            Column::StartTime => "start_time",
            Column::CompletionTime => "completion_time",
            Column::ModifyTime => "modify_time",
        }
    }

    /// Comma separated list of every column, in `JobRecord::from_row` order
    pub fn select_list() -> String {
        Self::ALL
            .iter()
            .map(|column| column.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Column {
    type Err = JobDbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|column| column.name() == s)
            .copied()
            .ok_or_else(|| JobDbError::UnknownField(s.to_string()))
    }
}
