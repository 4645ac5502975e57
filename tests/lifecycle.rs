mod common;

use common::{new_job, tracker};
use seuranta::{JobDbError, SchedulerState, TaskState};

#[test]
fn finished_auto_job_is_continued() {
    let mut db = tracker();
    db.track("101", &new_job("relax", true)).unwrap();
    assert_eq!(db.get("101").unwrap().scheduler_state, SchedulerState::Unknown);

    let report = db.reconcile().unwrap();
    assert_eq!(report.finished, ["101"]);
    assert_eq!(report.promoted, 0);

    let finished = db.get("101").unwrap();
    assert_eq!(finished.scheduler_state, SchedulerState::Complete);
    assert_eq!(finished.task_state, TaskState::Incomplete);

    let new_id = db.continue_job("101").unwrap();
    let old = db.get("101").unwrap();
    assert_eq!(old.task_state, TaskState::Continued);
    assert_eq!(old.continuation_id.as_deref(), Some(new_id.as_str()));

    let new = db.get(&new_id).unwrap();
    assert_eq!(new.task_state, TaskState::Incomplete);
    assert_eq!(new.scheduler_state, SchedulerState::Unknown);
    assert_eq!(new.job_name, old.job_name);
    assert_eq!(new.run_dir, old.run_dir);
    assert_eq!(new.submit_script, old.submit_script);
    assert_eq!((new.nodes, new.procs, new.walltime), (old.nodes, old.procs, old.walltime));
    assert!(new.auto);
    assert_eq!(new.continuation_id, None);

    let submitted = db.scheduler().submitted.borrow();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].1, old.run_dir);
}

#[test]
fn finished_manual_job_waits_for_check() {
    let mut db = tracker();
    db.track("103", &new_job("anneal", false)).unwrap();

    let report = db.reconcile().unwrap();
    assert_eq!(report.promoted, 1);
    let job = db.get("103").unwrap();
    assert_eq!(job.scheduler_state, SchedulerState::Complete);
    assert_eq!(job.task_state, TaskState::Check);

    db.complete_job("103").unwrap();
    let job = db.get("103").unwrap();
    assert_eq!(job.task_state, TaskState::Complete);
    assert_eq!(job.elapsed_time, None);
}

#[test]
fn manual_job_cannot_skip_check() {
    let mut db = tracker();
    db.track("104", &new_job("anneal", false)).unwrap();
    let err = db.complete_job("104").unwrap_err();
    assert!(matches!(err, JobDbError::IneligibleTransition { .. }));
    assert_eq!(db.get("104").unwrap().task_state, TaskState::Incomplete);
}

#[test]
fn manual_job_is_never_continued() {
    let mut db = tracker();
    db.track("105", &new_job("anneal", false)).unwrap();
    db.reconcile().unwrap();

    match db.continue_job("105").unwrap_err() {
        JobDbError::IneligibleTransition { job_id, reason } => {
            assert_eq!(job_id, "105");
            assert!(reason.starts_with("Job not eligible to continue."));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(db.scheduler().submissions(), 0);
}

#[test]
fn running_job_cannot_be_continued() {
    let mut db = tracker();
    let job = db.submit(&new_job("relax", true)).unwrap();
    db.scheduler().running(&job.job_id, 50, 10);
    db.reconcile().unwrap();

    let err = db.continue_job(&job.job_id).unwrap_err();
    assert!(matches!(err, JobDbError::IneligibleTransition { .. }));
}

#[test]
fn failed_resubmission_leaves_record_alone() {
    let mut db = tracker();
    db.track("106", &new_job("relax", true)).unwrap();
    db.reconcile().unwrap();
    let before = db.get("106").unwrap();

    db.scheduler().submit_fails.set(true);
    let err = db.continue_job("106").unwrap_err();
    assert!(matches!(err, JobDbError::Submission(_)));
    assert_eq!(db.get("106").unwrap(), before);
    assert_eq!(db.select(&seuranta::Selection::All).unwrap(), ["106"]);
}

#[test]
fn continue_all_picks_only_eligible_jobs() {
    let mut db = tracker();
    db.track("201", &new_job("a", true)).unwrap();
    db.track("202", &new_job("b", false)).unwrap();
    db.track("203", &new_job("c", true)).unwrap();
    db.scheduler().running("203", 10, 5);
    db.reconcile().unwrap();

    let continued = db.continue_all().unwrap();
    assert_eq!(continued.len(), 1);
    assert_eq!(continued[0].0, "201");
    assert_eq!(db.get("202").unwrap().task_state, TaskState::Check);
    assert_eq!(db.get("203").unwrap().task_state, TaskState::Incomplete);
}

#[test]
fn submit_records_the_new_job() {
    let mut db = tracker();
    let record = db.submit(&new_job("relax", true)).unwrap();
    assert_eq!(record.job_id, "1000");
    assert_eq!(record.host_name, common::HOST);
    assert_eq!(record.user_name, common::USER);
    assert_eq!(db.get("1000").unwrap(), record);
}

#[test]
fn tracking_an_id_twice_is_rejected() {
    let mut db = tracker();
    db.track("107", &new_job("relax", true)).unwrap();
    let err = db.track("107", &new_job("other", true)).unwrap_err();
    assert!(matches!(err, JobDbError::DuplicateKey(id) if id == "107"));
    assert_eq!(db.get("107").unwrap().job_name, "relax");
}

#[test]
fn abort_cancels_queued_job() {
    let mut db = tracker();
    let job = db.submit(&new_job("relax", true)).unwrap();
    db.reconcile().unwrap();
    assert_eq!(db.get(&job.job_id).unwrap().scheduler_state, SchedulerState::Queued);

    db.abort_job(&job.job_id).unwrap();
    assert_eq!(*db.scheduler().cancelled.borrow(), [job.job_id.clone()]);
    assert_eq!(db.get(&job.job_id).unwrap().task_state, TaskState::Aborted);
}

#[test]
fn failed_cancel_keeps_task_state() {
    let mut db = tracker();
    let job = db.submit(&new_job("relax", true)).unwrap();
    db.scheduler().cancel_status.set(1);

    let err = db.abort_job(&job.job_id).unwrap_err();
    assert!(matches!(err, JobDbError::Cancel { .. }));
    assert_eq!(db.get(&job.job_id).unwrap().task_state, TaskState::Incomplete);
}

#[test]
fn finished_job_is_aborted_without_cancel() {
    let mut db = tracker();
    db.track("108", &new_job("relax", true)).unwrap();
    db.reconcile().unwrap();

    db.abort_job("108").unwrap();
    assert!(db.scheduler().cancelled.borrow().is_empty());
    assert_eq!(db.get("108").unwrap().task_state, TaskState::Aborted);

    let err = db.abort_job("108").unwrap_err();
    assert!(matches!(err, JobDbError::IneligibleTransition { .. }));
}

#[test]
fn reset_brings_back_failed_auto_jobs() {
    let mut db = tracker();
    db.track("109", &new_job("relax", true)).unwrap();
    db.error_job("109", "out of memory").unwrap();
    assert_eq!(db.get("109").unwrap().task_state, TaskState::error("out of memory"));
    assert_eq!(db.get("109").unwrap().task_state.to_string(), "Error: out of memory");

    db.reset_job("109").unwrap();
    assert_eq!(db.get("109").unwrap().task_state, TaskState::Incomplete);

    let err = db.reset_job("109").unwrap_err();
    assert!(matches!(err, JobDbError::IneligibleTransition { .. }));
}

#[test]
fn manual_jobs_are_not_reset() {
    let mut db = tracker();
    db.track("110", &new_job("anneal", false)).unwrap();
    db.abort_job("110").unwrap();
    let err = db.reset_job("110").unwrap_err();
    assert!(matches!(err, JobDbError::IneligibleTransition { .. }));
}

#[test]
fn job_completes_itself_from_inside() {
    let mut db = tracker();
    let job = db.submit(&new_job("relax", true)).unwrap();
    db.scheduler().running(&job.job_id, 100, 20);
    db.reconcile().unwrap();

    *db.scheduler().current.borrow_mut() = Some(job.job_id.clone());
    assert_eq!(db.complete_current().unwrap(), job.job_id);
    assert_eq!(db.get(&job.job_id).unwrap().task_state, TaskState::Complete);
}

#[test]
fn job_reports_its_own_failure() {
    let mut db = tracker();
    let job = db.submit(&new_job("relax", true)).unwrap();
    *db.scheduler().current.borrow_mut() = Some(job.job_id.clone());

    db.error_current("diverged").unwrap();
    assert_eq!(db.get(&job.job_id).unwrap().task_state, TaskState::error("diverged"));
}

#[test]
fn outside_a_job_there_is_nothing_to_complete() {
    let mut db = tracker();
    assert!(matches!(db.complete_current(), Err(JobDbError::NoCurrentJob)));
    assert!(matches!(db.error_current("x"), Err(JobDbError::NoCurrentJob)));
}

#[test]
fn unknown_ids_are_not_found() {
    let mut db = tracker();
    assert!(matches!(db.get("1"), Err(JobDbError::NotFound(_))));
    assert!(matches!(db.continue_job("1"), Err(JobDbError::NotFound(_))));
    assert!(matches!(db.delete_job("1"), Err(JobDbError::NotFound(_))));
    assert!(matches!(db.error_job("1", "x"), Err(JobDbError::NotFound(_))));
    assert!(matches!(db.series("1"), Err(JobDbError::NotFound(_))));
    assert!(matches!(
        db.update("1", &seuranta::FieldSet::default()),
        Err(JobDbError::NotFound(_))
    ));
}
