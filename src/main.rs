//! intersight-metrics-bridge
//!
//! Periodically queries Cisco Intersight for the power draw of UCS servers
//! and writes the samples into InfluxDB.

use anyhow::Result;
use clap::Parser;
use intersight_metrics_bridge::{app::App, cli::Cli, config::Config};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(err) => exit_on_config_error("Failed to load configuration", &err),
    };
    init_tracing(&config.core.log_level);
    if let Err(err) = config.validate() {
        exit_on_config_error("Invalid configuration", &err);
    }

    log_configuration(&config);

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received. Shutting down gracefully...");
        let _ = shutdown_tx.send(true);
    });

    let delay = config.startup_delay();
    if !delay.is_zero() {
        info!("Waiting {}s before reading the inventory", delay.as_secs());
        tokio::select! {
            biased;
            _ = shutdown_rx.wait_for(|stop| *stop) => {
                info!("Interrupted during startup delay. Exiting.");
                return Ok(());
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }

    let app = match App::builder(config).build(shutdown_rx).await {
        Ok(app) => app,
        Err(err) => {
            error!("Failed to start: {:#}", err);
            std::process::exit(1);
        }
    };

    if app.is_idle() {
        warn!("There are no Intersight domains to monitor. Exiting.");
        return app.run().await;
    }

    info!("Bridge initialized successfully. Polling Intersight...");
    app.run().await?;
    info!("All tasks shut down. Exiting.");
    Ok(())
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn exit_on_config_error(context: &str, err: &dyn std::fmt::Display) -> ! {
    // Logging may not be initialized yet.
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .try_init();
    error!("{}: {}", context, err);
    std::process::exit(1);
}

fn log_configuration(config: &Config) {
    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.core.log_level);
    info!("Log Metrics: {}", config.core.log_metrics);
    if let Ok(influx) = config.influxdb_settings() {
        info!("InfluxDB URL: {}", influx.url);
        info!("InfluxDB Organization: {}", influx.organization);
        info!("InfluxDB Bucket: {}", influx.bucket);
    }
    if let Ok(path) = config.inventory_path() {
        info!("Inventory: {}", path.display());
    }
    info!("Poll Interval: {}s", config.bridge.interval_seconds);
    info!("Request Timeout: {}s", config.bridge.request_timeout_seconds);
    info!("Startup Delay: {}s", config.bridge.startup_delay_seconds);
    info!("Timezone: {}", config.bridge.timezone);
    info!("-------------------------------------------------------");
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
