use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

/// Local lifecycle of a job record, independent of what the scheduler says
///
/// `Incomplete` is the initial state. `Check` means the scheduler has finished
/// with a job that can't report its own completion, so a person has to confirm
/// it. The remaining states are terminal until a reset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskState {
    Incomplete,
    Check,
    Complete,
    Continued,
    Aborted,
    Error(String),
}

impl TaskState {
    /// Prefix of every stored error state
    pub const ERROR_PREFIX: &'static str = "Error:";

    pub fn error(message: &str) -> Self {
        TaskState::Error(message.to_string())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, TaskState::Error(_))
    }

    /// Active records still need attention from the scheduler or a person
    pub fn is_active(&self) -> bool {
        !matches!(
            self,
            TaskState::Complete | TaskState::Aborted | TaskState::Continued
        )
    }

    /// Stored values that mark a record as no longer active
    pub fn inactive_values() -> [&'static str; 3] {
        ["Complete", "Aborted", "Continued"]
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TaskState::Incomplete => write!(f, "Incomplete"),
            TaskState::Check => write!(f, "Check"),
            TaskState::Complete => write!(f, "Complete"),
            TaskState::Continued => write!(f, "Continued"),
            TaskState::Aborted => write!(f, "Aborted"),
            TaskState::Error(message) => write!(f, "{} {}", Self::ERROR_PREFIX, message),
        }
    }
}

impl FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Incomplete" => Ok(TaskState::Incomplete),
            "Check" => Ok(TaskState::Check),
            "Complete" => Ok(TaskState::Complete),
            "Continued" => Ok(TaskState::Continued),
            "Aborted" => Ok(TaskState::Aborted),
            _ => match s.strip_prefix(Self::ERROR_PREFIX) {
                Some(message) => Ok(TaskState::Error(message.trim_start().to_string())),
                None => Err(format!("unknown task state {s:?}")),
            },
        }
    }
}

impl Serialize for TaskState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Run state as last reported by the scheduler
///
/// Stored as the short code the scheduler dialects are normalised to. Codes
/// outside the known set are kept verbatim.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum SchedulerState {
    /// Never seen by a reconciliation pass
    #[default]
    Unknown,
    Queued,
    Running,
    Held,
    Complete,
    Other(String),
}

impl SchedulerState {
    pub fn code(&self) -> &str {
        match self {
            SchedulerState::Unknown => "?",
            SchedulerState::Queued => "Q",
            SchedulerState::Running => "R",
            SchedulerState::Held => "H",
            SchedulerState::Complete => "C",
            SchedulerState::Other(code) => code,
        }
    }

    pub fn from_code(code: &str) -> Self {
        match code {
            "?" | "" => SchedulerState::Unknown,
            "Q" => SchedulerState::Queued,
            "R" => SchedulerState::Running,
            "H" => SchedulerState::Held,
            "C" => SchedulerState::Complete,
            other => SchedulerState::Other(other.to_string()),
        }
    }

    pub fn is_complete(&self) -> bool {
        *self == SchedulerState::Complete
    }
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl Serialize for SchedulerState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}
