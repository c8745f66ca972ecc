//! End-to-end polling against a mock Intersight upstream.

use intersight_metrics_bridge::core::{MEASUREMENT_NAME, POWER_FIELD, SERVER_TAG};
use intersight_metrics_bridge::scheduler::WorkerState;
use serde_json::json;
use std::time::Duration;
use wiremock::MockServer;

#[path = "../helpers/mod.rs"]
mod helpers;
use helpers::{
    app::TestAppBuilder,
    inventory::{InventoryDir, EC_KEY},
    mock_intersight::{mount_power, mount_rows, mount_summaries, telemetry_requests},
};

const WAIT: Duration = Duration::from_secs(10);

#[tokio::test]
async fn test_steady_state_writes_one_point_per_server_and_cycle() {
    let upstream = MockServer::start().await;
    mount_power(&upstream, "FCH001", 215.0).await;
    mount_power(&upstream, "FCH002", 180.5).await;

    let inventory = InventoryDir::new();
    let key = inventory.key_file("key.pem", EC_KEY);
    let inventory = inventory.domain(&upstream.uri(), key, &["FCH001", "FCH002"]);
    let path = inventory.write();

    let app = TestAppBuilder::new(&path).start().await.unwrap();
    let points = app.writer.wait_for_points(4, WAIT).await;

    for point in &points {
        assert_eq!(point.measurement, MEASUREMENT_NAME);
        assert!(point.time.is_some());
    }
    let readings = app.writer.readings();
    assert_eq!(
        &readings[..4],
        &[
            ("FCH001".to_string(), 215.0),
            ("FCH002".to_string(), 180.5),
            ("FCH001".to_string(), 215.0),
            ("FCH002".to_string(), 180.5),
        ]
    );

    app.shutdown(WAIT).await.unwrap();
}

#[tokio::test]
async fn test_three_cycles_write_exactly_six_points() {
    let upstream = MockServer::start().await;
    mount_power(&upstream, "FCH001", 215.0).await;
    mount_power(&upstream, "FCH002", 180.5).await;

    let inventory = InventoryDir::new();
    let key = inventory.key_file("key.pem", EC_KEY);
    let inventory = inventory.domain(&upstream.uri(), key, &["FCH001", "FCH002"]);
    let path = inventory.write();

    let app = TestAppBuilder::new(&path)
        .with_config(|c| c.bridge.interval_seconds = 2)
        .start()
        .await
        .unwrap();
    app.writer.wait_for_points(6, WAIT).await;
    // The worker now sleeps for the interval before a fourth cycle.
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(telemetry_requests(&upstream).await.len(), 6);
    let readings = app.writer.readings();
    assert_eq!(readings.len(), 6);
    for cycle in readings.chunks(2) {
        assert_eq!(
            cycle,
            &[("FCH001".to_string(), 215.0), ("FCH002".to_string(), 180.5)]
        );
    }

    app.shutdown(WAIT).await.unwrap();
}

#[tokio::test]
async fn test_missing_datum_skips_only_that_server() {
    let upstream = MockServer::start().await;
    mount_rows(&upstream, "EMPTY", json!([])).await;
    mount_rows(
        &upstream,
        "IDLE",
        json!([{"timestamp": "2024-07-01T10:29:00Z", "event": {"count": 0, "hw-host-power-Avg": null}}]),
    )
    .await;
    mount_power(&upstream, "BUSY", 410.0).await;

    let inventory = InventoryDir::new();
    let key = inventory.key_file("key.pem", EC_KEY);
    let inventory = inventory.domain(&upstream.uri(), key, &["EMPTY", "IDLE", "BUSY"]);
    let path = inventory.write();

    let app = TestAppBuilder::new(&path).start().await.unwrap();
    app.writer.wait_for_points(2, WAIT).await;

    let readings = app.writer.readings();
    assert!(readings.iter().all(|(server, watts)| server == "BUSY" && *watts == 410.0));
    // Every server is still queried each cycle.
    assert!(telemetry_requests(&upstream).await.len() >= 6);

    app.shutdown(WAIT).await.unwrap();
}

#[tokio::test]
async fn test_discovery_polls_only_managed_servers() {
    let upstream = MockServer::start().await;
    mount_summaries(
        &upstream,
        &[
            ("UCSM01", "UCSM"),
            ("STANDALONE01", "IntersightStandalone"),
            ("IMM01", "Intersight"),
        ],
    )
    .await;
    mount_power(&upstream, "UCSM01", 300.0).await;
    mount_power(&upstream, "IMM01", 250.0).await;
    mount_power(&upstream, "STANDALONE01", 999.0).await;

    let inventory = InventoryDir::new();
    let key = inventory.key_file("key.pem", EC_KEY);
    let inventory = inventory.domain(&upstream.uri(), key, &[]);
    let path = inventory.write();

    let app = TestAppBuilder::new(&path).start().await.unwrap();
    app.wait_for_state(0, WorkerState::Polling, WAIT).await;
    let points = app.writer.wait_for_points(2, WAIT).await;

    let servers: Vec<&str> = points.iter().map(|p| p.tags[SERVER_TAG].as_str()).collect();
    assert_eq!(&servers[..2], &["UCSM01", "IMM01"]);
    assert!(points.iter().all(|p| p.fields[POWER_FIELD] != 999.0));

    app.shutdown(WAIT).await.unwrap();
}

#[tokio::test]
async fn test_write_errors_do_not_stop_polling() {
    let upstream = MockServer::start().await;
    mount_power(&upstream, "FCH001", 120.0).await;

    let inventory = InventoryDir::new();
    let key = inventory.key_file("key.pem", EC_KEY);
    let inventory = inventory.domain(&upstream.uri(), key, &["FCH001"]);
    let path = inventory.write();

    let app = TestAppBuilder::new(&path).start().await.unwrap();
    app.writer.fail_writes(true);
    app.wait_for_state(0, WorkerState::Polling, WAIT).await;
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(app.live_workers(), 1);

    app.writer.fail_writes(false);
    app.writer.wait_for_points(1, WAIT).await;

    app.shutdown(WAIT).await.unwrap();
}
