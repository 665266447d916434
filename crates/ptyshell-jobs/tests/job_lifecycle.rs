//! Real child processes through the job controller
#![cfg(unix)]

use ptyshell_jobs::{JobController, JobOptions};
use ptyshell_types::{CancelError, JobStatus};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(10);

fn controller(grace_ms: u64) -> JobController {
    JobController::new(JobOptions {
        grace_period: Duration::from_millis(grace_ms),
        ..JobOptions::default()
    })
}

#[tokio::test]
async fn test_exit_codes_decide_status() {
    let jobs = controller(2000);
    let ok = jobs.submit("true", &[]).unwrap();
    let bad = jobs.submit_line("echo out; echo err >&2; exit 3").unwrap();

    let ok = timeout(WAIT, jobs.wait(&ok)).await.unwrap().unwrap();
    assert_eq!(ok.status, JobStatus::Completed);
    assert_eq!(ok.exit_code, Some(0));
    assert!(ok.end_time.is_some());

    let bad = timeout(WAIT, jobs.wait(&bad)).await.unwrap().unwrap();
    assert_eq!(bad.status, JobStatus::Failed);
    assert_eq!(bad.exit_code, Some(3));
    assert_eq!(bad.command, "echo");

    let output = jobs.output(&bad.id).unwrap();
    assert!(output.contains("out"));
    assert!(output.contains("err"));
}

#[tokio::test]
async fn test_cancel_running_job() {
    let jobs = controller(2000);
    let id = jobs.submit("sleep", &["30".to_string()]).unwrap();
    assert_eq!(jobs.get(&id).unwrap().status, JobStatus::Running);
    assert_eq!(jobs.running_count(), 1);

    jobs.cancel(&id).unwrap();
    let job = timeout(WAIT, jobs.wait(&id)).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.exit_code, None);
    assert!(job.end_time.is_some());

    let err = jobs.cancel(&id).unwrap_err();
    assert!(matches!(
        err,
        CancelError::AlreadyTerminal {
            status: JobStatus::Cancelled,
            ..
        }
    ));
}

#[tokio::test]
async fn test_cancel_escalates_to_sigkill() {
    let jobs = controller(200);
    // Ignored signals are inherited, so the sleep ignores SIGTERM as well
    let id = jobs.submit_line("trap '' TERM; sleep 30").unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    jobs.cancel(&id).unwrap();
    let job = timeout(WAIT, jobs.wait(&id)).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
async fn test_completion_events() {
    let (tx, mut rx) = mpsc::channel(8);
    let jobs = controller(2000).with_event_sender(tx);
    let id = jobs.submit_line("exit 2").unwrap();

    let job = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(job.id, id);
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.exit_code, Some(2));
}

#[tokio::test]
async fn test_polling_sees_a_prefix_of_the_lifecycle() {
    let jobs = controller(2000);
    let id = jobs.submit_line("sleep 0.3").unwrap();

    let mut seen = Vec::new();
    let deadline = Instant::now() + WAIT;
    loop {
        let job = jobs.poll().into_iter().find(|j| j.id == id).unwrap();
        assert_eq!(job.exit_code.is_some(), matches!(job.status, JobStatus::Completed | JobStatus::Failed));
        if seen.last() != Some(&job.status) {
            seen.push(job.status);
        }
        if job.status.is_terminal() || Instant::now() > deadline {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(seen, vec![JobStatus::Running, JobStatus::Completed]);
}

#[tokio::test]
async fn test_cleanup_is_caller_driven() {
    let jobs = controller(2000);
    let first = jobs.submit("true", &[]).unwrap();
    let running = jobs.submit("sleep", &["30".to_string()]).unwrap();
    timeout(WAIT, jobs.wait(&first)).await.unwrap();

    let listed: Vec<_> = jobs.poll().into_iter().map(|j| j.id).collect();
    assert_eq!(listed, vec![first.clone(), running.clone()]);

    assert_eq!(jobs.remove(&running), None);
    let removed = jobs.remove_finished();
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].id, first);
    assert_eq!(jobs.poll().len(), 1);

    jobs.cancel(&running).unwrap();
    timeout(WAIT, jobs.wait(&running)).await.unwrap();
    assert!(jobs.remove(&running).is_some());
    assert!(jobs.poll().is_empty());
}
