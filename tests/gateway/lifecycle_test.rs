//! Worker lifecycle: startup, readiness, exit and shutdown.

mod support;

use std::time::Duration;

use inference_gateway::gateway::{CallSettings, Gateway, ProcessState};
use inference_gateway::worker::{CallKind, GatewayError};
use serde_json::json;
use support::{config, model_file, FakeLauncher, Harness};
use tokio::time::Instant;

#[tokio::test]
async fn test_missing_model_never_spawns() {
    let (launcher, _workers) = FakeLauncher::new();
    let gateway = Gateway::with_launcher(
        config(std::path::Path::new("/no/such/model.gguf")),
        launcher.clone(),
    );

    let err = gateway.initialize().await.unwrap_err();
    assert!(matches!(err, GatewayError::ModelNotFound(_)));
    assert_eq!(launcher.launch_count(), 0);
    assert_eq!(gateway.state(), ProcessState::Stopped);
}

#[tokio::test]
async fn test_initialize_reaches_ready() {
    let (harness, worker) = Harness::start().await;

    assert_eq!(harness.gateway.state(), ProcessState::Ready);
    assert!(harness.gateway.is_ready());
    assert_eq!(harness.gateway.worker_pid(), Some(worker.pid));
    assert_eq!(harness.launcher.launch_count(), 1);
}

#[tokio::test]
async fn test_initialize_when_ready_is_a_no_op() {
    let (harness, _worker) = Harness::start().await;

    harness.gateway.initialize().await.unwrap();
    assert_eq!(harness.launcher.launch_count(), 1);
}

#[tokio::test]
async fn test_initialize_while_starting_fails() {
    let model = model_file();
    let (launcher, mut workers) = FakeLauncher::new();
    let gateway = Gateway::with_launcher(config(model.path()), launcher.clone());

    let (first, second, _worker) = tokio::join!(
        gateway.initialize(),
        gateway.initialize(),
        async {
            let mut worker = workers.recv().await.unwrap();
            worker.ready().await;
            worker
        }
    );

    first.unwrap();
    assert!(matches!(second, Err(GatewayError::AlreadyStarted)));
    assert_eq!(launcher.launch_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_startup_timeout_kills_worker() {
    let model = model_file();
    let (launcher, mut workers) = FakeLauncher::new();
    let gateway = Gateway::with_launcher(
        config(model.path()).with_startup_timeout(Duration::from_secs(30)),
        launcher,
    );

    let started = Instant::now();
    let err = gateway.initialize().await.unwrap_err();

    assert!(matches!(err, GatewayError::StartupTimeout(d) if d == Duration::from_secs(30)));
    assert_eq!(started.elapsed(), Duration::from_secs(30));
    assert_eq!(gateway.state(), ProcessState::Stopped);
    assert_eq!(gateway.worker_pid(), None);

    let worker = workers.recv().await.unwrap();
    assert!(worker.was_killed());
}

#[tokio::test]
async fn test_exit_before_ready_fails_startup() {
    let model = model_file();
    let (launcher, mut workers) = FakeLauncher::new();
    let gateway = Gateway::with_launcher(config(model.path()), launcher);

    let (result, _) = tokio::join!(gateway.initialize(), async {
        workers.recv().await.unwrap().exit(Some(2));
    });

    assert!(matches!(result, Err(GatewayError::StartupFailed { code: Some(2) })));
    assert_eq!(gateway.state(), ProcessState::Disconnected);
}

#[tokio::test]
async fn test_call_before_initialize_is_not_ready() {
    let model = model_file();
    let (launcher, _workers) = FakeLauncher::new();
    let gateway = Gateway::with_launcher(config(model.path()), launcher);

    let err = gateway
        .call(CallKind::Generate, "hi", None, &CallSettings::new())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::NotReady(ProcessState::Stopped)));
}

#[tokio::test]
async fn test_shutdown_rejects_pending_and_closes_stdin() {
    let (harness, mut worker) = Harness::start().await;
    let gateway = &harness.gateway;

    let pending = gateway
        .submit(CallKind::Generate, "never answered", None, &CallSettings::new())
        .unwrap();
    worker.next_call().await.unwrap();

    gateway.shutdown().await;

    assert!(matches!(pending.wait().await, Err(GatewayError::ShutDown)));
    assert_eq!(gateway.state(), ProcessState::Stopped);
    assert_eq!(gateway.pending_count(), 0);
    assert_eq!(worker.next_call().await, None);

    let err = gateway
        .submit(CallKind::Generate, "late", None, &CallSettings::new())
        .unwrap_err();
    assert!(matches!(err, GatewayError::NotReady(ProcessState::Stopped)));
}

#[tokio::test]
async fn test_worker_exit_disconnects_pending_calls() {
    let (harness, mut worker) = Harness::start().await;
    let gateway = &harness.gateway;
    let mut states = gateway.subscribe_state();

    let pending = gateway
        .submit(CallKind::Analyze, "data", None, &CallSettings::new())
        .unwrap();
    worker.next_call().await.unwrap();
    worker.exit(Some(1));

    let err = pending.wait().await.unwrap_err();
    assert!(matches!(err, GatewayError::Disconnected { code: Some(1) }));
    assert!(err.is_disconnected());

    states
        .wait_for(|state| *state == ProcessState::Disconnected)
        .await
        .unwrap();
    assert_eq!(gateway.last_exit_code(), Some(1));

    let err = gateway
        .submit(CallKind::Analyze, "again", None, &CallSettings::new())
        .unwrap_err();
    assert!(matches!(err, GatewayError::NotReady(ProcessState::Disconnected)));
}

#[tokio::test]
async fn test_response_written_before_exit_is_delivered() {
    let (harness, mut worker) = Harness::start().await;

    let pending = harness
        .gateway
        .submit(CallKind::Summarize, "bye", None, &CallSettings::new())
        .unwrap();
    let call = worker.next_call().await.unwrap();
    worker.respond(&call.id, json!("last words")).await;
    worker.exit(Some(0));

    assert_eq!(pending.wait().await.unwrap(), Some(json!("last words")));
}

#[tokio::test]
async fn test_reinitialize_after_disconnect() {
    let (mut harness, worker) = Harness::start().await;
    let mut states = harness.gateway.subscribe_state();

    worker.exit(Some(137));
    states
        .wait_for(|state| *state == ProcessState::Disconnected)
        .await
        .unwrap();

    let workers = &mut harness.workers;
    let (result, mut replacement) = tokio::join!(harness.gateway.initialize(), async {
        let mut worker = workers.recv().await.unwrap();
        worker.ready().await;
        worker
    });
    result.unwrap();

    assert_eq!(harness.launcher.launch_count(), 2);
    assert_eq!(harness.gateway.state(), ProcessState::Ready);
    assert_eq!(harness.gateway.worker_pid(), Some(replacement.pid));

    let pending = harness
        .gateway
        .submit(CallKind::Generate, "hello again", None, &CallSettings::new())
        .unwrap();
    let call = replacement.next_call().await.unwrap();
    replacement.respond(&call.id, json!("welcome back")).await;
    assert_eq!(pending.wait().await.unwrap(), Some(json!("welcome back")));
}

#[tokio::test]
async fn test_reinitialize_after_shutdown() {
    let (mut harness, _worker) = Harness::start().await;
    harness.gateway.shutdown().await;

    let workers = &mut harness.workers;
    let (result, _replacement) = tokio::join!(harness.gateway.initialize(), async {
        let mut worker = workers.recv().await.unwrap();
        worker.ready().await;
        worker
    });

    result.unwrap();
    assert!(harness.gateway.is_ready());
    assert_eq!(harness.launcher.launch_count(), 2);
}

#[tokio::test]
async fn test_malformed_lines_are_skipped() {
    let (harness, mut worker) = Harness::start().await;

    let pending = harness
        .gateway
        .submit(CallKind::Search, "q", None, &CallSettings::new())
        .unwrap();
    let call = worker.next_call().await.unwrap();

    worker.send_line("garbage{{").await;
    worker.send_bytes(b"\xc3\x28 half a character").await;
    worker.send_line(r#"{"no":"type"}"#).await;
    worker.send_line(r#"{"type":"progress","callId":"x"}"#).await;
    worker.send_line(r#"{"type":"ready"}"#).await;
    worker.respond(&call.id, json!(["hit"])).await;

    assert_eq!(pending.wait().await.unwrap(), Some(json!(["hit"])));
    assert!(harness.gateway.is_ready());
}

#[tokio::test]
async fn test_invalid_utf8_line_does_not_stop_responses() {
    let (harness, mut worker) = Harness::start().await;
    let settings = CallSettings::new().with_deadline(Duration::from_secs(5));

    let pending = harness
        .gateway
        .submit(CallKind::Search, "q", None, &settings)
        .unwrap();
    let call = worker.next_call().await.unwrap();

    worker.send_bytes(b"\xff\xfe not utf8").await;
    worker.respond(&call.id, json!(["first"])).await;
    assert_eq!(pending.wait().await.unwrap(), Some(json!(["first"])));

    let pending = harness
        .gateway
        .submit(CallKind::Search, "again", None, &settings)
        .unwrap();
    let call = worker.next_call().await.unwrap();
    worker.respond(&call.id, json!(["second"])).await;

    assert_eq!(pending.wait().await.unwrap(), Some(json!(["second"])));
    assert!(harness.gateway.is_ready());
}

#[tokio::test]
async fn test_state_transitions_are_observable() {
    let model = model_file();
    let (launcher, mut workers) = FakeLauncher::new();
    let gateway = Gateway::with_launcher(config(model.path()), launcher);
    let mut states = gateway.subscribe_state();
    assert_eq!(*states.borrow_and_update(), ProcessState::Stopped);

    let (result, worker) = tokio::join!(gateway.initialize(), async {
        let mut worker = workers.recv().await.unwrap();
        worker.ready().await;
        worker
    });
    result.unwrap();
    assert!(states.has_changed().unwrap());
    assert_eq!(*states.borrow_and_update(), ProcessState::Ready);

    gateway.shutdown().await;
    assert_eq!(*states.borrow_and_update(), ProcessState::Stopped);
    assert!(worker.was_killed());
}
