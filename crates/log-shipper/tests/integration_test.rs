// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use log_shipper::{
    append_log::AppendLog,
    config::ShipperConfig,
    credentials::Credentials,
    delivery::{Delivery, HttpDelivery},
    entry::{EntryRecord, Level},
    flush_service::{FlushHandle, FlushService},
    session_registry::SessionRegistry,
};
use mockito::{Matcher, Server};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

const PAYLOAD: &str = r#"{"sessions":[{"sessionID":"S1","entries":[]}]}"#;

fn start_service(config: &ShipperConfig) -> (FlushHandle, JoinHandle<()>) {
    let delivery = Arc::new(HttpDelivery::from_config(config).expect("failed to build client"));
    let (service, handle) =
        FlushService::new(config, delivery).expect("failed to create flush service");
    (handle, tokio::spawn(service.run()))
}

fn shipper_config(url: String, dir: &Path, threshold: usize) -> ShipperConfig {
    ShipperConfig {
        storage_dir: dir.to_path_buf(),
        min_allowed_threshold: threshold,
        send_timeout: Duration::from_secs(5),
        ..ShipperConfig::new(url)
    }
}

#[tokio::test]
async fn delivery_posts_wrapped_payload() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/logs")
        .match_header("Content-Type", "application/json")
        .match_header("Accept", "application/json")
        .match_header("Authorization", Matcher::Missing)
        .match_body(Matcher::Json(json!({ "payload": PAYLOAD })))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let delivery =
        HttpDelivery::new(format!("{}/logs", server.url()), None, Duration::from_secs(5))
            .expect("failed to build client");

    assert!(delivery.deliver(PAYLOAD.to_string()).await);
    mock.assert_async().await;
}

#[tokio::test]
async fn delivery_sends_basic_auth_when_configured() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/logs")
        .match_header("Authorization", "Basic YXBwOnNlY3JldA==")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let delivery = HttpDelivery::new(
        format!("{}/logs", server.url()),
        Some(Credentials::new("app", "secret")),
        Duration::from_secs(5),
    )
    .expect("failed to build client");

    assert!(delivery.deliver(PAYLOAD.to_string()).await);
    mock.assert_async().await;
}

#[tokio::test]
async fn delivery_only_accepts_200() {
    for status in [201, 202, 400, 401, 500, 503] {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/logs")
            .with_status(status)
            .with_body("nope")
            .expect(1)
            .create_async()
            .await;

        let delivery =
            HttpDelivery::new(format!("{}/logs", server.url()), None, Duration::from_secs(5))
                .expect("failed to build client");

        assert!(
            !delivery.deliver(PAYLOAD.to_string()).await,
            "status {status} must count as a failure"
        );
        mock.assert_async().await;
    }
}

#[tokio::test]
async fn delivery_times_out() {
    // Accepts connections but never answers.
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("unable to bind listener");
    let addr = listener.local_addr().expect("no local address");
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let delivery = HttpDelivery::new(
        format!("http://{addr}/logs"),
        None,
        Duration::from_millis(200),
    )
    .expect("failed to build client");

    let started = Instant::now();
    assert!(!delivery.deliver(PAYLOAD.to_string()).await);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn flush_service_ships_once_threshold_is_reached() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/logs")
        .match_header("Content-Type", "application/json")
        .match_body(Matcher::Regex("sessions".to_string()))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let config = shipper_config(format!("{}/logs", server.url()), dir.path(), 5);
    let (handle, task) = start_service(&config);

    for i in 0..4 {
        handle
            .submit(EntryRecord::new(Level::Info, "S1", format!("entry {i}")))
            .expect("failed to submit");
    }
    handle.drain().await.expect("failed to drain");
    assert!(!mock.matched_async().await);

    handle
        .submit(EntryRecord::new(Level::Info, "S1", "entry 4"))
        .expect("failed to submit");
    let status = handle.drain().await.expect("failed to drain");

    mock.assert_async().await;
    assert!(!status.staging_pending);
    let sessions = SessionRegistry::new(dir.path()).all().expect("registry");
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, status.session_id);

    handle.shutdown().expect("failed to shutdown");
    task.await.expect("service task failed");
}

#[tokio::test]
async fn flush_service_retries_staged_batch_after_failure() {
    let mut server = Server::new_async().await;
    let failure = server
        .mock("POST", "/logs")
        .with_status(500)
        .with_body("Internal Server Error")
        .expect(1)
        .create_async()
        .await;
    let success = server
        .mock("POST", "/logs")
        .match_body(Matcher::Regex("first".to_string()))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let config = shipper_config(format!("{}/logs", server.url()), dir.path(), 2);
    let (handle, task) = start_service(&config);
    let log = AppendLog::new(dir.path());

    handle
        .submit(EntryRecord::new(Level::Error, "DB", "first"))
        .expect("failed to submit");
    handle
        .submit(EntryRecord::new(Level::Error, "DB", "second"))
        .expect("failed to submit");
    let status = handle.drain().await.expect("failed to drain");
    failure.assert_async().await;
    assert!(status.staging_pending);
    assert_eq!(status.points, 0);
    assert_eq!(log.read_staging().expect("staging").len(), 2);

    handle
        .submit(EntryRecord::new(Level::Info, "DB", "third"))
        .expect("failed to submit");
    handle
        .submit(EntryRecord::new(Level::Info, "DB", "fourth"))
        .expect("failed to submit");
    let status = handle.drain().await.expect("failed to drain");

    success.assert_async().await;
    assert!(!status.staging_pending);
    let live: Vec<String> = log
        .read_live()
        .expect("live")
        .into_iter()
        .map(|e| e.record.message)
        .collect();
    assert_eq!(live, vec!["third", "fourth"]);

    handle.shutdown().expect("failed to shutdown");
    task.await.expect("service task failed");
}
