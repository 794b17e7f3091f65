// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use loopsy_core::SystemClock;

fn manager(policy: JobPolicy) -> Arc<JobManager<SystemClock>> {
    JobManager::new(policy, SystemClock)
}

fn params(command: &str, args: &[&str]) -> ExecuteParams {
    ExecuteParams {
        command: command.to_string(),
        args: args.iter().map(|s| s.to_string()).collect(),
        cwd: None,
        env: Default::default(),
        timeout: None,
    }
}

fn node() -> NodeId {
    NodeId::new("tester")
}

#[tokio::test]
async fn test_execute_echo() {
    let manager = manager(JobPolicy::default());
    let result = manager
        .execute(params("echo", &["hello"]), node())
        .await
        .unwrap();

    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.stdout, "hello\n");
    assert_eq!(result.stderr, "");
    assert!(!result.killed);
    assert!(!result.truncated);
    assert_eq!(manager.active_count(), 0);
}

#[tokio::test]
async fn test_execute_captures_stderr_and_exit_code() {
    let manager = manager(JobPolicy::default());
    let result = manager
        .execute(params("sh", &["-c", "echo oops >&2; exit 3"]), node())
        .await
        .unwrap();

    assert_eq!(result.exit_code, Some(3));
    assert_eq!(result.stderr, "oops\n");
    assert!(!result.killed);
}

#[tokio::test]
async fn test_denied_command_never_spawns() {
    let manager = manager(JobPolicy {
        denylist: vec!["rm".into()],
        ..Default::default()
    });
    let err = manager
        .execute(params("/bin/rm", &["-rf", "/"]), node())
        .await
        .unwrap_err();
    assert!(matches!(err, ExecError::CommandDenied(_)));
    assert_eq!(manager.active_count(), 0);
}

#[tokio::test]
async fn test_spawn_failure_releases_slot() {
    let manager = manager(JobPolicy::default());
    let err = manager
        .execute(params("definitely-not-a-binary-4712", &[]), node())
        .await
        .unwrap_err();
    assert!(matches!(err, ExecError::SpawnFailed(_)));
    assert_eq!(manager.active_count(), 0);
}

#[tokio::test]
async fn test_max_concurrent_rejects_past_cap() {
    let manager = manager(JobPolicy {
        max_concurrent: 1,
        ..Default::default()
    });

    let background = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.execute(params("sleep", &["2"]), node()).await })
    };

    // Wait for the background job to occupy the slot
    for _ in 0..100 {
        if manager.active_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(manager.active_count(), 1);

    let err = manager
        .execute(params("echo", &["never"]), node())
        .await
        .unwrap_err();
    assert!(matches!(err, ExecError::MaxConcurrent { limit: 1 }));

    manager.kill_all();
    let result = background.await.unwrap().unwrap();
    assert!(result.killed);
}

#[tokio::test]
async fn test_timeout_kills_and_flags() {
    let manager = manager(JobPolicy::default());
    let mut request = params("sleep", &["10"]);
    request.timeout = Some(100);

    let started = std::time::Instant::now();
    let result = manager.execute(request, node()).await.unwrap();

    assert!(result.killed);
    assert!(result.exit_code.is_none());
    assert!(started.elapsed() < Duration::from_secs(8));
    assert_eq!(manager.active_count(), 0);
}

#[tokio::test]
async fn test_cancel_terminates_job() {
    let manager = manager(JobPolicy::default());

    let background = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.execute(params("sleep", &["10"]), node()).await })
    };

    for _ in 0..100 {
        if manager.jobs().first().and_then(|j| j.pid).is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let job_id = manager.jobs()[0].job_id.clone();
    manager.cancel(&job_id).unwrap();

    let result = background.await.unwrap().unwrap();
    assert!(result.killed);
    assert_eq!(manager.active_count(), 0);
}

#[tokio::test]
async fn test_cancel_unknown_job() {
    let manager = manager(JobPolicy::default());
    let err = manager.cancel(&JobId::new("ghost")).unwrap_err();
    assert!(matches!(err, ExecError::JobNotFound(_)));
}

#[tokio::test]
async fn test_stream_emits_stdout_then_exit() {
    let manager = manager(JobPolicy::default());
    let mut job = manager
        .execute_stream(params("echo", &["streamed"]), node())
        .unwrap();

    let mut saw_stdout = false;
    let mut exit: Option<(Option<i32>, bool)> = None;
    while let Some(event) = job.events.recv().await {
        match event {
            JobStreamEvent::Stdout { data, .. } => {
                assert!(data.contains("streamed"));
                saw_stdout = true;
            }
            JobStreamEvent::Exit {
                exit_code, killed, ..
            } => {
                exit = Some((exit_code, killed));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    assert!(saw_stdout);
    assert_eq!(exit, Some((Some(0), false)));
    assert_eq!(manager.active_count(), 0);
}

#[tokio::test]
async fn test_stream_client_drop_kills_child() {
    let manager = manager(JobPolicy::default());
    let job = manager
        .execute_stream(params("sh", &["-c", "while true; do echo tick; sleep 0.05; done"]), node())
        .unwrap();

    // Let it produce a few chunks, then walk away
    tokio::time::sleep(Duration::from_millis(200)).await;
    drop(job.events);

    for _ in 0..200 {
        if manager.active_count() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job survived client disconnect");
}

#[tokio::test]
async fn test_jobs_listing() {
    let manager = manager(JobPolicy::default());

    let background = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.execute(params("sleep", &["2"]), node()).await })
    };

    for _ in 0..100 {
        if manager.active_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let jobs = manager.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].command, "sleep");
    assert_eq!(jobs[0].from_node_id, "tester");

    manager.kill_all();
    let _ = background.await;
}
