//! Worker lifecycle tests against a real queue on a real filesystem.
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::{
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use hopper_common::Signal;
use hopper_queue::{Queue, QueueConfig};
use hopper_worker::{Dispatch, JobHandler, PoolConfig, Worker, WorkerPool};
use tokio::sync::broadcast;

fn config(root: &Path, name: &str) -> QueueConfig {
    QueueConfig {
        root_dir: root.to_path_buf(),
        queue_name: name.to_string(),
        ..Default::default()
    }
}

fn config_with_dlq(root: &Path, name: &str, max_retries: Option<u32>) -> QueueConfig {
    QueueConfig {
        max_retries,
        dead_letters: Some(Box::new(config(root, &format!("{name}_dlq")))),
        ..config(root, name)
    }
}

async fn filenames(dir: &Path) -> Vec<String> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await.expect("read_dir");
    while let Some(entry) = entries.next_entry().await.expect("next_entry") {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    names
}

/// Poll `check` until it holds or `deadline` elapses.
async fn eventually<F, Fut>(deadline: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let end = tokio::time::Instant::now() + deadline;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= end {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Handler that records every payload it sees.
fn recording_handler(seen: Arc<Mutex<Vec<Vec<u8>>>>) -> Arc<dyn JobHandler> {
    Arc::new(move |payload: Arc<[u8]>| {
        let seen = Arc::clone(&seen);
        async move {
            seen.lock().unwrap().push(payload.to_vec());
            Ok(())
        }
    })
}

fn spawn_worker(
    queue: &Arc<Queue>,
    handler: Arc<dyn JobHandler>,
    dispatch: &Dispatch,
    timeout: Duration,
) -> (broadcast::Sender<Signal>, tokio::task::JoinHandle<()>) {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(4);
    let worker = Worker::new(
        Arc::clone(queue),
        handler,
        dispatch.join("workers"),
        timeout,
        Duration::from_millis(25),
    );
    (shutdown_tx, tokio::spawn(worker.run(shutdown_rx)))
}

async fn stop(shutdown_tx: broadcast::Sender<Signal>, task: tokio::task::JoinHandle<()>) {
    shutdown_tx.send(Signal::Shutdown).expect("send shutdown");
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("worker should stop promptly")
        .expect("worker task should not panic");
}

#[tokio::test]
async fn test_worker_pulls_processes_and_acknowledges() {
    let root = tempfile::tempdir().expect("tempdir");
    let queue = Arc::new(Queue::init(config(root.path(), "work")).await.expect("init"));
    let dispatch = Dispatch::new();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let (shutdown, task) = spawn_worker(
        &queue,
        recording_handler(Arc::clone(&seen)),
        &dispatch,
        Duration::from_secs(1),
    );

    queue.push(b"hello").await.expect("push");

    assert!(
        eventually(Duration::from_secs(2), || {
            let seen = Arc::clone(&seen);
            async move { seen.lock().unwrap().len() == 1 }
        })
        .await,
        "worker should process the pushed message"
    );
    assert_eq!(seen.lock().unwrap()[0], b"hello");

    // Acknowledged: nothing left in either state directory.
    assert!(
        eventually(Duration::from_secs(2), || {
            let queue = Arc::clone(&queue);
            async move {
                queue.len().await.expect("len") == 0
                    && filenames(queue.pulled_dir()).await.is_empty()
            }
        })
        .await
    );

    stop(shutdown, task).await;
}

#[tokio::test]
async fn test_failing_handler_exhausts_retries_into_dead_letters() {
    let root = tempfile::tempdir().expect("tempdir");
    let queue = Arc::new(
        Queue::init(config_with_dlq(root.path(), "work", Some(1)))
            .await
            .expect("init"),
    );
    let dispatch = Dispatch::new();

    let handler: Arc<dyn JobHandler> = Arc::new(|_payload: Arc<[u8]>| async {
        Err(anyhow::anyhow!("this job never succeeds"))
    });
    let (shutdown, task) = spawn_worker(&queue, handler, &dispatch, Duration::from_secs(1));

    queue.push(b"doomed").await.expect("push");

    let dlq = queue.dead_letters().expect("dlq configured");
    assert!(
        eventually(Duration::from_secs(3), || async move {
            dlq.len().await.expect("dlq len") == 1
        })
        .await,
        "exhausted message should reach the dead-letter queue"
    );

    // One retry carrying the error flag, then the terminal dead route.
    let names = filenames(dlq.queued_dir()).await;
    assert!(
        names[0].ends_with(".error.dead"),
        "attempt history should be recorded, got {names:?}"
    );
    assert_eq!(queue.len().await.expect("len"), 0);

    stop(shutdown, task).await;
}

#[tokio::test]
async fn test_handler_running_past_timeout_is_killed() {
    let root = tempfile::tempdir().expect("tempdir");
    let queue = Arc::new(
        Queue::init(config_with_dlq(root.path(), "work", Some(1)))
            .await
            .expect("init"),
    );
    let dispatch = Dispatch::new();

    let handler: Arc<dyn JobHandler> = Arc::new(|_payload: Arc<[u8]>| async {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    });
    let (shutdown, task) = spawn_worker(&queue, handler, &dispatch, Duration::from_millis(100));

    queue.push(b"sleeper").await.expect("push");

    // Two hard kills well inside the handler's 60 s sleep prove the
    // worker is enforcing the deadline, not waiting the handler out.
    let dlq = queue.dead_letters().expect("dlq configured");
    assert!(
        eventually(Duration::from_secs(3), || async move {
            dlq.len().await.expect("dlq len") == 1
        })
        .await,
        "timed-out message should reach the dead-letter queue"
    );

    let names = filenames(dlq.queued_dir()).await;
    assert!(
        names[0].ends_with(".timeout.dead"),
        "the kill should be recorded as a timeout, got {names:?}"
    );

    stop(shutdown, task).await;
}

#[tokio::test]
async fn test_worker_survives_timeout_and_keeps_consuming() {
    let root = tempfile::tempdir().expect("tempdir");
    let queue = Arc::new(
        Queue::init(config_with_dlq(root.path(), "work", Some(0)))
            .await
            .expect("init"),
    );
    let dispatch = Dispatch::new();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_in_handler = Arc::clone(&seen);
    let handler: Arc<dyn JobHandler> = Arc::new(move |payload: Arc<[u8]>| {
        let seen = Arc::clone(&seen_in_handler);
        async move {
            if &payload[..] == b"slow" {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            seen.lock().unwrap().push(payload.to_vec());
            Ok(())
        }
    });
    let (shutdown, task) = spawn_worker(&queue, handler, &dispatch, Duration::from_millis(100));

    queue.push(b"slow").await.expect("push");
    queue.push(b"fast").await.expect("push");

    assert!(
        eventually(Duration::from_secs(3), || {
            let seen = Arc::clone(&seen);
            async move { seen.lock().unwrap().contains(&b"fast".to_vec()) }
        })
        .await,
        "worker should resume within one idle cycle of the kill"
    );
    assert_eq!(
        queue
            .dead_letters()
            .expect("dlq configured")
            .len()
            .await
            .expect("dlq len"),
        1
    );

    stop(shutdown, task).await;
}

#[tokio::test]
async fn test_panicking_handler_counts_as_error() {
    let root = tempfile::tempdir().expect("tempdir");
    let queue = Arc::new(
        Queue::init(config_with_dlq(root.path(), "work", Some(0)))
            .await
            .expect("init"),
    );
    let dispatch = Dispatch::new();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_in_handler = Arc::clone(&seen);
    let handler: Arc<dyn JobHandler> = Arc::new(move |payload: Arc<[u8]>| {
        let seen = Arc::clone(&seen_in_handler);
        async move {
            assert!(&payload[..] != b"boom", "handler blew up");
            seen.lock().unwrap().push(payload.to_vec());
            Ok(())
        }
    });
    let (shutdown, task) = spawn_worker(&queue, handler, &dispatch, Duration::from_secs(1));

    queue.push(b"boom").await.expect("push");
    queue.push(b"ok").await.expect("push");

    assert!(
        eventually(Duration::from_secs(3), || {
            let seen = Arc::clone(&seen);
            async move { seen.lock().unwrap().contains(&b"ok".to_vec()) }
        })
        .await,
        "a panicking job must not take the worker down"
    );
    assert_eq!(
        queue
            .dead_letters()
            .expect("dlq configured")
            .len()
            .await
            .expect("dlq len"),
        1
    );

    stop(shutdown, task).await;
}

#[tokio::test]
async fn test_broadcast_wakes_an_idle_worker() {
    let root = tempfile::tempdir().expect("tempdir");
    let queue = Arc::new(Queue::init(config(root.path(), "work")).await.expect("init"));
    let dispatch = Dispatch::new();

    let seen = Arc::new(Mutex::new(Vec::new()));
    // A one-hour poll interval: only the broadcast can explain a prompt
    // pull.
    let (shutdown_tx, shutdown_rx) = broadcast::channel(4);
    let worker = Worker::new(
        Arc::clone(&queue),
        recording_handler(Arc::clone(&seen)),
        dispatch.join("workers"),
        Duration::from_secs(1),
        Duration::from_secs(3_600),
    );
    let task = tokio::spawn(worker.run(shutdown_rx));

    // Let the worker reach its idle suspension before producing.
    tokio::time::sleep(Duration::from_millis(50)).await;

    queue.push(b"urgent").await.expect("push");
    assert_eq!(dispatch.broadcast("workers"), 1);

    assert!(
        eventually(Duration::from_secs(2), || {
            let seen = Arc::clone(&seen);
            async move { seen.lock().unwrap().len() == 1 }
        })
        .await,
        "the wake-up should trigger an immediate pull"
    );

    stop(shutdown_tx, task).await;
}

#[tokio::test]
async fn test_pool_drains_a_backlog_and_stops_cleanly() {
    let root = tempfile::tempdir().expect("tempdir");
    let queue = Arc::new(Queue::init(config(root.path(), "work")).await.expect("init"));
    let dispatch = Dispatch::new();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let pool = WorkerPool::new(
        PoolConfig {
            workers: 3,
            timeout_ms: 1_000,
            poll_interval_ms: 25,
            group: "workers".to_string(),
        },
        Arc::clone(&queue),
        recording_handler(Arc::clone(&seen)),
        dispatch.clone(),
    );

    for i in 0..10_u8 {
        queue.push(&[i]).await.expect("push");
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(4);
    let serving = tokio::spawn(async move { pool.serve(shutdown_rx).await });

    assert!(
        eventually(Duration::from_secs(3), || {
            let seen = Arc::clone(&seen);
            async move { seen.lock().unwrap().len() == 10 }
        })
        .await,
        "three workers should drain the backlog"
    );
    assert_eq!(queue.len().await.expect("len"), 0);

    shutdown_tx.send(Signal::Shutdown).expect("send shutdown");
    tokio::time::timeout(Duration::from_secs(2), serving)
        .await
        .expect("pool should stop promptly")
        .expect("pool task should not panic")
        .expect("pool serve should succeed");
}

#[tokio::test]
async fn test_empty_pool_is_rejected() {
    let root = tempfile::tempdir().expect("tempdir");
    let queue = Arc::new(Queue::init(config(root.path(), "work")).await.expect("init"));

    let pool = WorkerPool::new(
        PoolConfig {
            workers: 0,
            ..Default::default()
        },
        queue,
        recording_handler(Arc::new(Mutex::new(Vec::new()))),
        Dispatch::new(),
    );

    let (_shutdown_tx, shutdown_rx) = broadcast::channel::<Signal>(1);
    assert!(pool.serve(shutdown_rx).await.is_err());
}
