#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use seuranta::{ActiveJob, Identity, JobDb, NewJob, SchedulerError, SchedulerState};
use seuranta::scheduler::Scheduler;

pub const HOST: &str = "flux-login1";
pub const USER: &str = "alice";

/// A scheduler whose answers are scripted by the test
///
/// Submitted jobs show up as queued until the test changes or removes them.
pub struct FakeScheduler {
    pub active: RefCell<HashMap<String, ActiveJob>>,
    next_id: Cell<u64>,
    pub submitted: RefCell<Vec<(String, PathBuf)>>,
    pub cancelled: RefCell<Vec<String>>,
    pub query_fails: Cell<bool>,
    pub submit_fails: Cell<bool>,
    pub cancel_status: Cell<i32>,
    pub current: RefCell<Option<String>>,
}

impl Default for FakeScheduler {
    fn default() -> Self {
        FakeScheduler {
            active: RefCell::new(HashMap::new()),
            next_id: Cell::new(1000),
            submitted: RefCell::new(Vec::new()),
            cancelled: RefCell::new(Vec::new()),
            query_fails: Cell::new(false),
            submit_fails: Cell::new(false),
            cancel_status: Cell::new(0),
            current: RefCell::new(None),
        }
    }
}

impl FakeScheduler {
    pub fn set(&self, job_id: &str, state: SchedulerState) {
        let mut active = self.active.borrow_mut();
        let job = active.entry(job_id.to_string()).or_insert_with(|| ActiveJob {
            job_id: job_id.to_string(),
            ..Default::default()
        });
        job.state = state;
        job.status_text = format!("{job_id} {}", job.state);
    }

    pub fn running(&self, job_id: &str, start_time: i64, elapsed_time: i64) {
        self.set(job_id, SchedulerState::Running);
        let mut active = self.active.borrow_mut();
        if let Some(job) = active.get_mut(job_id) {
            job.start_time = Some(start_time);
            job.elapsed_time = Some(elapsed_time);
        }
    }

    /// The scheduler forgets the job, as it does some time after it ends
    pub fn vanish(&self, job_id: &str) {
        self.active.borrow_mut().remove(job_id);
    }

    pub fn submissions(&self) -> usize {
        self.submitted.borrow().len()
    }
}

impl Scheduler for FakeScheduler {
    fn query_active(&self, _host_scope: &str) -> Result<HashMap<String, ActiveJob>, SchedulerError> {
        if self.query_fails.get() {
            return Err(SchedulerError::Timeout {
                program: "squeue".to_string(),
                seconds: 30,
            });
        }
        Ok(self.active.borrow().clone())
    }

    fn submit(&self, _script: &str, run_dir: &Path) -> Result<String, SchedulerError> {
        if self.submit_fails.get() {
            return Err(SchedulerError::Failed {
                program: "sbatch".to_string(),
                status: 1,
                output: "sbatch: error: invalid partition".to_string(),
            });
        }
        let job_id = self.next_id.get().to_string();
        self.next_id.set(self.next_id.get() + 1);
        self.submitted
            .borrow_mut()
            .push((job_id.clone(), run_dir.to_path_buf()));
        self.set(&job_id, SchedulerState::Queued);
        Ok(job_id)
    }

    fn cancel(&self, job_id: &str) -> Result<i32, SchedulerError> {
        self.cancelled.borrow_mut().push(job_id.to_string());
        let status = self.cancel_status.get();
        if status == 0 {
            self.vanish(job_id);
        }
        Ok(status)
    }

    fn current_job_id(&self) -> Option<String> {
        self.current.borrow().clone()
    }
}

pub fn identity() -> Identity {
    Identity::new(HOST, USER)
}

pub fn tracker() -> JobDb<FakeScheduler> {
    JobDb::in_memory(FakeScheduler::default(), identity()).unwrap()
}

pub fn new_job(name: &str, auto: bool) -> NewJob {
    NewJob {
        job_name: name.to_string(),
        run_dir: PathBuf::from(format!("/scratch/{USER}/{name}")),
        submit_script: format!("#!/bin/bash\n#SBATCH -J {name}\nsrun ./{name}\n"),
        auto,
        nodes: Some(2),
        procs: Some(32),
        walltime: Some(4 * 3600),
    }
}
