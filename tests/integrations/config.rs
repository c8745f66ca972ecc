use clap::Parser;
use intersight_metrics_bridge::cli::Cli;
use intersight_metrics_bridge::config::Config;
use intersight_metrics_bridge::error::BridgeError;
use serial_test::serial;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::NamedTempFile;

const VARIABLES: [&str; 11] = [
    "INFLUXDB_URL",
    "INFLUXDB_ORGANIZATION",
    "INFLUXDB_BUCKET",
    "INFLUXDB_TOKEN",
    "INTERSIGHT_METRICS_BRIDGE_CONFIG_INVENTORY",
    "INTERSIGHT_METRICS_BRIDGE_INTERVAL_SECONDS",
    "INTERSIGHT_METRICS_BRIDGE_STARTUP_DELAY_SECONDS",
    "INTERSIGHT_METRICS_BRIDGE_REQUEST_TIMEOUT_SECONDS",
    "INTERSIGHT_METRICS_BRIDGE_TIMEZONE",
    "INTERSIGHT_METRICS_BRIDGE_LOG_LEVEL",
    "INTERSIGHT_METRICS_BRIDGE_LOG_METRICS",
];

/// Runs `test_fn` with exactly `vars` set among the bridge's variables.
fn with_env<F: FnOnce()>(vars: &[(&str, &str)], test_fn: F) {
    for name in VARIABLES {
        std::env::remove_var(name);
    }
    for (name, value) in vars {
        std::env::set_var(name, value);
    }
    test_fn();
    for name in VARIABLES {
        std::env::remove_var(name);
    }
}

const REQUIRED: [(&str, &str); 5] = [
    ("INFLUXDB_URL", "http://influxdb:8086"),
    ("INFLUXDB_ORGANIZATION", "lab"),
    ("INFLUXDB_BUCKET", "power"),
    ("INFLUXDB_TOKEN", "secret-token"),
    ("INTERSIGHT_METRICS_BRIDGE_CONFIG_INVENTORY", "/config/inventory.yaml"),
];

fn cli(args: &[&str]) -> Cli {
    let mut argv = vec!["intersight-metrics-bridge"];
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).unwrap()
}

#[test]
#[serial]
fn test_required_variables_from_environment() {
    with_env(&REQUIRED, || {
        let config = Config::load(&cli(&[])).unwrap();
        config.validate().unwrap();

        let influx = config.influxdb_settings().unwrap();
        assert_eq!(influx.url, "http://influxdb:8086");
        assert_eq!(influx.organization, "lab");
        assert_eq!(influx.bucket, "power");
        assert_eq!(influx.token, "secret-token");
        assert_eq!(
            config.inventory_path().unwrap(),
            PathBuf::from("/config/inventory.yaml").as_path()
        );

        let poll = config.poll_settings().unwrap();
        assert_eq!(poll.interval, Duration::from_secs(60));
        assert_eq!(poll.timezone, chrono_tz::Europe::Paris);
        assert_eq!(config.startup_delay(), Duration::from_secs(10));
    });
}

#[test]
#[serial]
fn test_each_missing_variable_is_reported_by_name() {
    for missing in 0..REQUIRED.len() {
        let vars: Vec<(&str, &str)> = REQUIRED
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != missing)
            .map(|(_, v)| *v)
            .collect();
        with_env(&vars, || {
            let config = Config::load(&cli(&[])).unwrap();
            let err = config.validate().unwrap_err();
            assert!(matches!(err, BridgeError::Config(_)));
            assert!(
                err.to_string().contains(REQUIRED[missing].0),
                "{} not named in '{}'",
                REQUIRED[missing].0,
                err
            );
        });
    }
}

#[test]
#[serial]
fn test_optional_bridge_variables() {
    let mut vars = REQUIRED.to_vec();
    vars.extend([
        ("INTERSIGHT_METRICS_BRIDGE_INTERVAL_SECONDS", "15"),
        ("INTERSIGHT_METRICS_BRIDGE_STARTUP_DELAY_SECONDS", "0"),
        ("INTERSIGHT_METRICS_BRIDGE_REQUEST_TIMEOUT_SECONDS", "5"),
        ("INTERSIGHT_METRICS_BRIDGE_TIMEZONE", "America/New_York"),
        ("INTERSIGHT_METRICS_BRIDGE_LOG_LEVEL", "debug"),
        ("INTERSIGHT_METRICS_BRIDGE_LOG_METRICS", "true"),
    ]);
    with_env(&vars, || {
        let config = Config::load(&cli(&[])).unwrap();
        assert_eq!(config.core.log_level, "debug");
        assert!(config.core.log_metrics);

        let poll = config.poll_settings().unwrap();
        assert_eq!(poll.interval, Duration::from_secs(15));
        assert_eq!(poll.request_timeout, Duration::from_secs(5));
        assert_eq!(poll.timezone, chrono_tz::America::New_York);
        assert!(config.startup_delay().is_zero());
    });
}

#[test]
#[serial]
fn test_unknown_timezone_fails_validation() {
    let mut vars = REQUIRED.to_vec();
    vars.push(("INTERSIGHT_METRICS_BRIDGE_TIMEZONE", "Europe/Atlantis"));
    with_env(&vars, || {
        let config = Config::load(&cli(&[])).unwrap();
        assert!(matches!(config.validate(), Err(BridgeError::Config(_))));
    });
}

#[test]
#[serial]
fn test_layering_file_then_environment_then_cli() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
        [core]
        log_level = "warn"
        [influxdb]
        url = "http://from-file:8086"
        organization = "file-org"
        bucket = "file-bucket"
        token = "file-token"
        [bridge]
        config_inventory = "/from/file.yaml"
        interval_seconds = 120
        timezone = "Asia/Tokyo"
        "#
    )
    .unwrap();
    let path = file.path().to_str().unwrap().to_string();

    let vars = [
        ("INFLUXDB_URL", "http://from-env:8086"),
        ("INTERSIGHT_METRICS_BRIDGE_INTERVAL_SECONDS", "30"),
    ];
    with_env(&vars, || {
        let config = Config::load(&cli(&[
            "--config",
            &path,
            "--inventory",
            "/from/cli.yaml",
            "--log-level",
            "trace",
        ]))
        .unwrap();

        // File only.
        assert_eq!(config.influxdb.organization.as_deref(), Some("file-org"));
        assert_eq!(config.bridge.timezone, "Asia/Tokyo");
        // Environment over file.
        assert_eq!(config.influxdb.url.as_deref(), Some("http://from-env:8086"));
        assert_eq!(config.bridge.interval_seconds, 30);
        // CLI over everything.
        assert_eq!(
            config.bridge.config_inventory,
            Some(PathBuf::from("/from/cli.yaml"))
        );
        assert_eq!(config.core.log_level, "trace");
        config.validate().unwrap();
    });
}

#[test]
#[serial]
fn test_cli_interval_overrides_environment() {
    let mut vars = REQUIRED.to_vec();
    vars.push(("INTERSIGHT_METRICS_BRIDGE_INTERVAL_SECONDS", "30"));
    with_env(&vars, || {
        let config = Config::load(&cli(&["--interval-seconds", "5", "--startup-delay-seconds", "1"])).unwrap();
        assert_eq!(config.bridge.interval_seconds, 5);
        assert_eq!(config.bridge.startup_delay_seconds, 1);
    });
}

#[test]
#[serial]
fn test_numeric_looking_values_stay_strings() {
    let vars = [
        ("INFLUXDB_URL", "http://influxdb:8086"),
        ("INFLUXDB_ORGANIZATION", "12345"),
        ("INFLUXDB_BUCKET", "2024"),
        ("INFLUXDB_TOKEN", "true"),
        ("INTERSIGHT_METRICS_BRIDGE_CONFIG_INVENTORY", "42"),
        ("INTERSIGHT_METRICS_BRIDGE_INTERVAL_SECONDS", "15"),
        ("INTERSIGHT_METRICS_BRIDGE_LOG_METRICS", "true"),
    ];
    with_env(&vars, || {
        let config = Config::load(&cli(&[])).unwrap();
        config.validate().unwrap();

        let influx = config.influxdb_settings().unwrap();
        assert_eq!(influx.organization, "12345");
        assert_eq!(influx.bucket, "2024");
        assert_eq!(influx.token, "true");
        assert_eq!(config.inventory_path().unwrap(), PathBuf::from("42").as_path());
        // Typed bridge values are still parsed.
        assert_eq!(config.bridge.interval_seconds, 15);
        assert!(config.core.log_metrics);
    });
}
