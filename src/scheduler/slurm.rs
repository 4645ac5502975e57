//! `squeue` / `sbatch` output for SLURM clusters

use std::collections::HashMap;

use chrono::{Local, NaiveDateTime, TimeZone};

use crate::db::job::state::SchedulerState;
use crate::scheduler::{ActiveJob, SchedulerError};
use crate::walltime;

/// id, name, state, time used, start time, nodes, cpus, time limit
pub const SQUEUE_FORMAT: &str = "%i|%j|%t|%M|%S|%D|%C|%l";

pub fn parse_squeue(stdout: &str) -> Result<HashMap<String, ActiveJob>, SchedulerError> {
    let mut jobs = HashMap::new();
    for line in stdout.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let fields: Vec<&str> = line.split('|').map(str::trim).collect();
        if fields.len() != 8 {
            return Err(SchedulerError::Parse {
                program: "squeue".to_string(),
                reason: format!("expected 8 fields in {line:?}"),
            });
        }

        let state = state_from_code(fields[2]);
        let start_time = match state {
            // pending jobs report an estimated start
            SchedulerState::Queued | SchedulerState::Held => None,
            _ => timestamp(fields[4]),
        };

        let job = ActiveJob {
            job_id: fields[0].to_string(),
            job_name: Some(fields[1].to_string()),
            elapsed_time: start_time.and(duration(fields[3])),
            start_time,
            completion_time: None,
            nodes: fields[5].parse().ok(),
            procs: fields[6].parse().ok(),
            walltime: duration(fields[7]),
            status_text: line.to_string(),
            state,
        };
        jobs.insert(job.job_id.clone(), job);
    }
    Ok(jobs)
}

/// `sbatch --parsable` prints `jobid` or `jobid;cluster`
pub fn parse_sbatch(stdout: &str) -> Option<String> {
    let job_id = stdout.trim().split(';').next()?.trim();
    match job_id.chars().next() {
        Some(first) if first.is_ascii_digit() => Some(job_id.to_string()),
        _ => None,
    }
}

fn state_from_code(code: &str) -> SchedulerState {
    match code {
        "PD" => SchedulerState::Queued,
        "R" | "CG" => SchedulerState::Running,
        "S" | "ST" | "RH" => SchedulerState::Held,
        "CD" => SchedulerState::Complete,
        other => SchedulerState::Other(other.to_string()),
    }
}

/// `[D-]HH:MM:SS`, or a word like `UNLIMITED`
fn duration(text: &str) -> Option<i64> {
    walltime::seconds(&text.replace('-', ":")).ok()
}

fn timestamp(text: &str) -> Option<i64> {
    let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S").ok()?;
    Local
        .from_local_datetime(&naive)
        .single()
        .map(|time| time.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUEUE: &str = "\
4021|relax_1|R|1-02:00:00|2024-05-01T10:00:00|2|32|2-00:00:00
4022|relax_2|PD|0:00|2024-05-03T10:00:00|1|16|1:00:00
";

    #[test]
    fn running_and_pending_jobs() {
        let jobs = parse_squeue(SQUEUE).unwrap();
        assert_eq!(jobs.len(), 2);

        let running = &jobs["4021"];
        assert_eq!(running.state, SchedulerState::Running);
        assert_eq!(running.elapsed_time, Some(86400 + 7200));
        assert!(running.start_time.is_some());
        assert_eq!(running.procs, Some(32));
        assert_eq!(running.walltime, Some(2 * 86400));

        let pending = &jobs["4022"];
        assert_eq!(pending.state, SchedulerState::Queued);
        assert_eq!(pending.start_time, None);
        assert_eq!(pending.elapsed_time, None);
        assert_eq!(pending.job_name.as_deref(), Some("relax_2"));
    }

    #[test]
    fn malformed_lines_are_errors() {
        assert!(parse_squeue("4021|relax\n").is_err());
        assert!(parse_squeue("\n").unwrap().is_empty());
    }

    #[test]
    fn sbatch_job_ids() {
        assert_eq!(parse_sbatch("4023\n").as_deref(), Some("4023"));
        assert_eq!(parse_sbatch("4023;greatlakes\n").as_deref(), Some("4023"));
        assert_eq!(parse_sbatch("sbatch: nope"), None);
    }
}
