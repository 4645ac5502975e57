//! `qstat -f` / `qsub` output for TORQUE/PBS clusters

use std::collections::HashMap;

use chrono::{Local, NaiveDateTime, TimeZone};
use log::warn;

use crate::db::job::state::SchedulerState;
use crate::db::open::anchored_regex;
use crate::scheduler::{ActiveJob, SchedulerError};
use crate::walltime;

/// One `Job Id:` block of `qstat -f`
#[derive(Debug)]
pub struct QstatJob {
    /// `user@submit-host`
    pub owner: Option<String>,
    pub job: ActiveJob,
}

pub fn parse_qstat(stdout: &str, now: i64) -> Result<Vec<QstatJob>, SchedulerError> {
    let mut jobs = Vec::new();
    let mut current: Option<QstatJob> = None;
    let mut last_key = String::new();

    for line in stdout.lines() {
        if let Some(id) = line.trim().strip_prefix("Job Id:") {
            jobs.extend(current.take().map(|job| finish(job, now)));
            current = Some(QstatJob {
                owner: None,
                job: ActiveJob {
                    job_id: short_id(id),
                    status_text: format!("{line}\n"),
                    ..Default::default()
                },
            });
            continue;
        }

        let Some(entry) = current.as_mut() else {
            if line.trim().is_empty() {
                continue;
            }
            return Err(SchedulerError::Parse {
                program: "qstat".to_string(),
                reason: format!("{line:?} before the first Job Id"),
            });
        };
        entry.job.status_text.push_str(line);
        entry.job.status_text.push('\n');

        let (key, value) = match line.split_once(" = ") {
            Some((key, value)) => (key.trim().to_string(), value.trim().to_string()),
            // long values wrap onto tab-indented lines
            None if line.starts_with('\t') && !last_key.is_empty() => {
                let continued = format!("{}{}", current_value(entry, &last_key), line.trim());
                (last_key.clone(), continued)
            }
            None => continue,
        };
        apply(entry, &key, &value);
        last_key = key;
    }

    jobs.extend(current.map(|job| finish(job, now)));
    Ok(jobs)
}

/// Jobs submitted by `user` from a host inside `host_scope`
pub fn owned_by(jobs: Vec<QstatJob>, user: &str, host_scope: &str) -> HashMap<String, ActiveJob> {
    let scope = match anchored_regex(host_scope) {
        Ok(scope) => Some(scope),
        Err(err) => {
            warn!("Not filtering qstat by host: {err}");
            None
        }
    };

    jobs.into_iter()
        .filter(|entry| match entry.owner.as_deref().and_then(|owner| owner.split_once('@')) {
            Some((owner, host)) => {
                owner == user && scope.as_ref().map_or(true, |scope| scope.is_match(host))
            }
            None => false,
        })
        .map(|entry| (entry.job.job_id.clone(), entry.job))
        .collect()
}

/// `qsub` prints `jobid.server`
pub fn parse_qsub(stdout: &str) -> Option<String> {
    let job_id = short_id(stdout);
    match job_id.chars().next() {
        Some(first) if first.is_ascii_digit() => Some(job_id),
        _ => None,
    }
}

fn short_id(id: &str) -> String {
    id.trim().split('.').next().unwrap_or_default().to_string()
}

fn current_value(entry: &QstatJob, key: &str) -> String {
    match key {
        "Job_Owner" => entry.owner.clone().unwrap_or_default(),
        "Job_Name" => entry.job.job_name.clone().unwrap_or_default(),
        _ => String::new(),
    }
}

fn apply(entry: &mut QstatJob, key: &str, value: &str) {
    let job = &mut entry.job;
    match key {
        "Job_Name" => job.job_name = Some(value.to_string()),
        "Job_Owner" => entry.owner = Some(value.to_string()),
        "job_state" => job.state = state_from_code(value),
        "Resource_List.nodes" => {
            if let Some((nodes, ppn)) = value.split_once(":ppn=") {
                let nodes = nodes.parse::<i64>().ok();
                job.nodes = nodes;
                job.procs = nodes.zip(ppn.parse::<i64>().ok()).map(|(n, p)| n * p);
            }
        }
        "Resource_List.walltime" => job.walltime = walltime::seconds(value).ok(),
        "start_time" => job.start_time = timestamp(value),
        "comp_time" => job.completion_time = timestamp(value),
        _ => {}
    }
}

fn finish(mut entry: QstatJob, now: i64) -> QstatJob {
    if entry.job.state == SchedulerState::Running {
        entry.job.elapsed_time = entry.job.start_time.map(|start| now - start);
    }
    entry
}

fn state_from_code(code: &str) -> SchedulerState {
    match code {
        "Q" | "W" => SchedulerState::Queued,
        "R" => SchedulerState::Running,
        "H" => SchedulerState::Held,
        "C" => SchedulerState::Complete,
        other => SchedulerState::Other(other.to_string()),
    }
}

/// `Wed May  1 10:00:00 2024`
fn timestamp(text: &str) -> Option<i64> {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let naive = NaiveDateTime::parse_from_str(&text, "%a %b %d %H:%M:%S %Y").ok()?;
    Local
        .from_local_datetime(&naive)
        .single()
        .map(|time| time.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    const QSTAT: &str = "\
Job Id: 1201.flux-server.arc-ts.umich.edu
    Job_Name = relax_1
    Job_Owner = alice@flux-login1.arc-ts.umich.edu
    job_state = R
    Resource_List.nodes = 2:ppn=16
    Resource_List.walltime = 10:00:00
    start_time = Wed May  1 10:00:00 2024

Job Id: 1202.flux-server.arc-ts.umich.edu
    Job_Name = other
    Job_Owner = bob@flux-login2.arc-ts.umich.edu
    job_state = Q
";

    #[test]
    fn parses_full_qstat_blocks() {
        let jobs = parse_qstat(QSTAT, 2_000_000_000).unwrap();
        assert_eq!(jobs.len(), 2);

        let first = &jobs[0].job;
        assert_eq!(first.job_id, "1201");
        assert_eq!(first.state, SchedulerState::Running);
        assert_eq!(first.procs, Some(32));
        assert_eq!(first.walltime, Some(36000));
        let start = first.start_time.unwrap();
        assert_eq!(first.elapsed_time, Some(2_000_000_000 - start));
        assert!(first.status_text.contains("Job_Name = relax_1"));
    }

    #[test]
    fn filters_by_owner_and_host() {
        let jobs = parse_qstat(QSTAT, 0).unwrap();
        let mine = owned_by(jobs, "alice", "flux.*");
        assert_eq!(mine.len(), 1);
        assert!(mine.contains_key("1201"));

        let jobs = parse_qstat(QSTAT, 0).unwrap();
        assert!(owned_by(jobs, "alice", "greatlakes.*").is_empty());
    }

    #[test]
    fn qsub_job_ids() {
        assert_eq!(parse_qsub("1203.flux-server\n").as_deref(), Some("1203"));
        assert_eq!(parse_qsub("qsub: submit error"), None);
    }
}
