//! Printing job records: one-line `qstat` style summaries, full key/value
//! listings rendered with TinyTemplate, or JSON

use std::io::Write;

use rusqlite::types::Value;
use serde::Serialize;
use tinytemplate::TinyTemplate;

use crate::db::job::record::{JobRecord, NO_CONTINUATION};
use crate::error::Result;
use crate::scheduler::ActiveJob;
use crate::walltime;

/// Task state shown for scheduler jobs without a record
pub const UNTRACKED: &str = "Untracked";

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Layout {
    /// One line per job under a column header
    #[default]
    Summary,
    /// Every field as `key = value`
    Full,
    Json,
}

/// The columns of a summary line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Summary {
    pub job_id: String,
    pub job_name: String,
    pub nodes: Option<i64>,
    pub procs: Option<i64>,
    pub walltime: Option<i64>,
    pub scheduler_state: String,
    pub elapsed_time: Option<i64>,
    pub task_state: String,
    pub auto: bool,
    pub continuation_id: String,
}

impl From<&JobRecord> for Summary {
    fn from(job: &JobRecord) -> Self {
        Summary {
            job_id: job.job_id.clone(),
            job_name: job.job_name.clone(),
            nodes: job.nodes,
            procs: job.procs,
            walltime: job.walltime,
            scheduler_state: job.scheduler_state.code().to_string(),
            elapsed_time: job.elapsed_time,
            task_state: job.task_state.to_string(),
            auto: job.auto,
            continuation_id: job
                .continuation_id
                .clone()
                .unwrap_or_else(|| NO_CONTINUATION.to_string()),
        }
    }
}

impl From<&ActiveJob> for Summary {
    fn from(job: &ActiveJob) -> Self {
        Summary {
            job_id: job.job_id.clone(),
            job_name: job.job_name.clone().unwrap_or_else(|| "-".to_string()),
            nodes: job.nodes,
            procs: job.procs,
            walltime: job.walltime,
            scheduler_state: job.state.code().to_string(),
            elapsed_time: job.elapsed_time,
            task_state: UNTRACKED.to_string(),
            auto: false,
            continuation_id: NO_CONTINUATION.to_string(),
        }
    }
}

pub fn write_header(out: &mut impl Write) -> Result<()> {
    writeln!(
        out,
        "{:<12} {:<24} {:^5} {:^5} {:>12} {:^1} {:>12} {:<24} {:^1} {:<12}",
        "JobID", "JobName", "Nodes", "Procs", "Walltime", "S", "Runtime", "Task", "A", "ContJobID"
    )?;
    writeln!(
        out,
        "{:-<12} {:-<24} {:-<5} {:-<5} {:-<12} {:-<1} {:-<12} {:-<24} {:-<1} {:-<12}",
        "", "", "", "", "", "", "", "", "", ""
    )?;
    Ok(())
}

pub fn write_summary(out: &mut impl Write, job: &Summary) -> Result<()> {
    writeln!(
        out,
        "{:<12} {:<24} {:^5} {:^5} {:>12} {:^1} {:>12} {:<24} {:^1} {:<12}",
        job.job_id,
        job.job_name,
        count(job.nodes),
        count(job.procs),
        duration(job.walltime),
        job.scheduler_state,
        duration(job.elapsed_time),
        job.task_state,
        job.auto as u8,
        job.continuation_id
    )?;
    Ok(())
}

fn count(value: Option<i64>) -> String {
    value.map_or_else(|| "-".to_string(), |n| n.to_string())
}

fn duration(seconds: Option<i64>) -> String {
    seconds.map_or_else(|| "-".to_string(), walltime::format)
}

#[derive(Serialize)]
struct Field {
    key: String,
    value: String,
}

#[derive(Serialize)]
struct RecordContext {
    fields: Vec<Field>,
}

/// Strings are quoted, and triple quoted when they span lines
fn field_value(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::Integer(n) => n.to_string(),
        Value::Real(x) => x.to_string(),
        Value::Text(text) if text.contains('\n') => format!("\"\"\"{text}\"\"\""),
        Value::Text(text) => format!("\"{text}\""),
        Value::Blob(bytes) => format!("<{} bytes>", bytes.len()),
    }
}

fn untracked_fields(job: &ActiveJob) -> Vec<(&'static str, Value)> {
    vec![
        ("job_id", Value::Text(job.job_id.clone())),
        ("job_name", job.job_name.clone().into()),
        ("scheduler_state", Value::Text(job.state.code().to_string())),
        ("task_state", Value::Text(UNTRACKED.to_string())),
        ("continuation_id", Value::Text(NO_CONTINUATION.to_string())),
        ("status_text", Value::Text(job.status_text.clone())),
        ("auto", Value::Integer(0)),
        ("nodes", job.nodes.into()),
        ("procs", job.procs.into()),
        ("walltime", job.walltime.into()),
        ("elapsed_time", job.elapsed_time.into()),
        ("start_time", job.start_time.into()),
        ("completion_time", job.completion_time.into()),
    ]
}

/// Render a `#Record:` block followed by a blank line
fn write_fields<K: ToString>(out: &mut impl Write, fields: Vec<(K, Value)>) -> Result<()> {
    /// included full record template
    static RECORD: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/record.txt"));
    let mut tt = TinyTemplate::new();
    tt.set_default_formatter(&tinytemplate::format_unescaped);
    tt.add_template("record", RECORD)?;

    let context = RecordContext {
        fields: fields
            .into_iter()
            .map(|(key, value)| Field {
                key: key.to_string(),
                value: field_value(&value),
            })
            .collect(),
    };
    out.write_all(tt.render("record", &context)?.as_bytes())?;
    Ok(())
}

pub fn write_full(out: &mut impl Write, job: &JobRecord) -> Result<()> {
    write_fields(out, job.fields())
}

pub fn write_jobs(out: &mut impl Write, layout: Layout, jobs: &[JobRecord]) -> Result<()> {
    match layout {
        Layout::Summary => {
            write_header(out)?;
            for job in jobs {
                write_summary(out, &Summary::from(job))?;
            }
        }
        Layout::Full => {
            for job in jobs {
                write_full(out, job)?;
            }
        }
        Layout::Json => write_json(out, jobs)?,
    }
    Ok(())
}

/// Jobs grouped by series, a blank line after each series
pub fn write_series(out: &mut impl Write, layout: Layout, series: &[Vec<JobRecord>]) -> Result<()> {
    match layout {
        Layout::Summary => {
            write_header(out)?;
            for group in series {
                for job in group {
                    write_summary(out, &Summary::from(job))?;
                }
                writeln!(out)?;
            }
        }
        Layout::Full => {
            for group in series {
                for job in group {
                    write_full(out, job)?;
                }
                writeln!(out)?;
            }
        }
        Layout::Json => write_json(out, series)?,
    }
    Ok(())
}

pub fn write_untracked(out: &mut impl Write, layout: Layout, jobs: &[ActiveJob]) -> Result<()> {
    match layout {
        Layout::Summary => {
            write_header(out)?;
            for job in jobs {
                write_summary(out, &Summary::from(job))?;
            }
        }
        Layout::Full => {
            for job in jobs {
                write_fields(out, untracked_fields(job))?;
            }
        }
        Layout::Json => write_json(out, jobs)?,
    }
    Ok(())
}

pub fn write_json<T: Serialize + ?Sized>(out: &mut impl Write, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}
