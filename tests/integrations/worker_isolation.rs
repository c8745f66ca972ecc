//! A failing domain terminates its own worker only.

use intersight_metrics_bridge::scheduler::WorkerState;
use std::time::Duration;
use wiremock::MockServer;

#[path = "../helpers/mod.rs"]
mod helpers;
use helpers::{
    app::TestAppBuilder,
    inventory::{InventoryDir, EC_KEY},
    mock_intersight::{mount_power, mount_power_failure, mount_summaries_failure, telemetry_requests},
};

const WAIT: Duration = Duration::from_secs(10);

#[tokio::test]
async fn test_bad_key_and_failed_discovery_leave_healthy_domain_polling() {
    let healthy = MockServer::start().await;
    let broken_discovery = MockServer::start().await;
    mount_power(&healthy, "FCH001", 150.0).await;
    mount_summaries_failure(&broken_discovery, 500).await;

    let inventory = InventoryDir::new();
    let key = inventory.key_file("key.pem", EC_KEY);
    let garbage = inventory.key_file("garbage.pem", "not a key at all");
    let missing = inventory.path().join("missing.pem");
    let inventory = inventory
        .domain(&healthy.uri(), key.clone(), &["FCH001"])
        .domain(&healthy.uri(), missing, &["FCH002"])
        .domain(&healthy.uri(), garbage, &["FCH003"])
        .domain(&broken_discovery.uri(), key, &[]);
    let path = inventory.write();

    let app = TestAppBuilder::new(&path).start().await.unwrap();
    for index in 1..4 {
        app.wait_for_state(index, WorkerState::Terminated, WAIT).await;
    }
    app.writer.wait_for_points(2, WAIT).await;

    assert_eq!(app.workers[0].state(), WorkerState::Polling);
    assert_eq!(app.live_workers(), 1);
    assert!(app
        .writer
        .readings()
        .iter()
        .all(|(server, _)| server == "FCH001"));

    app.shutdown(WAIT).await.unwrap();
}

#[tokio::test]
async fn test_upstream_errors_skip_server_without_terminating() {
    let upstream = MockServer::start().await;
    // Only FCH002 has a mock; FCH001 gets wiremock's 404.
    mount_power(&upstream, "FCH002", 90.0).await;

    let inventory = InventoryDir::new();
    let key = inventory.key_file("key.pem", EC_KEY);
    let inventory = inventory.domain(&upstream.uri(), key, &["FCH001", "FCH002"]);
    let path = inventory.write();

    let app = TestAppBuilder::new(&path).start().await.unwrap();
    app.writer.wait_for_points(2, WAIT).await;
    assert_eq!(app.live_workers(), 1);
    assert!(app
        .writer
        .readings()
        .iter()
        .all(|(server, _)| server == "FCH002"));

    app.shutdown(WAIT).await.unwrap();
}

#[tokio::test]
async fn test_failing_telemetry_domain_does_not_affect_healthy_domain() {
    let healthy = MockServer::start().await;
    let failing = MockServer::start().await;
    mount_power(&healthy, "FCH001", 150.0).await;
    mount_power_failure(&failing, 500).await;

    let inventory = InventoryDir::new();
    let key = inventory.key_file("key.pem", EC_KEY);
    let inventory = inventory
        .domain(&failing.uri(), key.clone(), &["FCH900"])
        .domain(&healthy.uri(), key, &["FCH001"]);
    let path = inventory.write();

    let app = TestAppBuilder::new(&path).start().await.unwrap();
    // Three cycles of the healthy domain.
    app.writer.wait_for_points(3, WAIT).await;

    let failing_worker = app
        .workers
        .iter()
        .find(|w| w.domain().as_str().trim_end_matches('/') == failing.uri())
        .unwrap();
    assert_eq!(failing_worker.state(), WorkerState::Polling);
    assert_eq!(app.live_workers(), 2);
    assert!(telemetry_requests(&failing).await.len() >= 2);
    assert!(app
        .writer
        .readings()
        .iter()
        .all(|(server, watts)| server == "FCH001" && *watts == 150.0));

    app.shutdown(WAIT).await.unwrap();
}
