//! FleetWatch - Vehicle Telemetry Alerting Service
//!
//! Accepts telemetry events over HTTP, buffers them in a durable AMQP queue
//! and emails an alert for every emergency event.

use anyhow::Result;
use clap::Parser;
use fleetwatch::{app::App, cli::Cli, config::Config};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to load configuration: {}", err);
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("FleetWatch starting up...");
    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!("Listen Address: {}", config.server.listen_address);
    info!(
        "Queue: {}:{} (vhost {}, queue {})",
        config.queue.host, config.queue.port, config.queue.vhost, config.queue.queue_name
    );
    info!(
        "Broker Connect Attempts: {} every {}ms",
        config.queue.connect_attempts, config.queue.retry_interval_ms
    );
    info!("Concurrency Limit: {}", config.dispatch.concurrency_limit);
    info!(
        "SMTP Server: {}:{} (tls {:?})",
        config.smtp.host, config.smtp.port, config.smtp.tls
    );
    info!("Alert Recipient: {}", config.smtp.recipient);
    info!(
        "Metrics: {}",
        if config.metrics.enabled {
            config.metrics.listen_address.to_string()
        } else {
            "Disabled".to_string()
        }
    );
    info!("-------------------------------------------------------");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let app = match App::builder(config).build(shutdown_rx).await {
        Ok(app) => app,
        Err(e) => {
            error!("Startup failed: {:#}", e);
            std::process::exit(1);
        }
    };

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown signal received. Shutting down gracefully...");
        let _ = shutdown_tx.send(true);
    });

    app.run().await
}
