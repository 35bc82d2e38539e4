//! perfwatch - Main entry point
//!
//! Runs the performance monitor as a standalone process until Ctrl-C/SIGTERM.

use anyhow::Context;
use clap::{Arg, ArgAction, Command};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use perfwatch::{HealthStatus, MonitorConfig, PerformanceMonitor, TimeWindow, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Command::new("perfwatch")
        .version(VERSION)
        .about("perfwatch - in-process performance monitoring and alerting")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path (defaults to config/perfwatch* and PERFWATCH__ env vars)"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error); overrides global.log_level"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("Log output format")
                .value_parser(["text", "json"])
                .default_value("text"),
        )
        .arg(
            Arg::new("metrics-port")
                .long("metrics-port")
                .value_name("PORT")
                .help("Expose engine metrics for Prometheus on this port")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Write the default configuration as YAML and exit")
                .action(ArgAction::Set),
        )
        .get_matches();

    let cli_log_level = matches.get_one::<String>("log-level").map(String::as_str);
    let json_logs = matches.get_one::<String>("log-format").map(String::as_str) == Some("json");

    if let Some(path) = matches.get_one::<String>("generate-config") {
        init_logging(cli_log_level.unwrap_or("info"), json_logs);
        MonitorConfig::default()
            .save_to_file(path)
            .with_context(|| format!("writing default configuration to {}", path))?;
        info!(path = %path, "Default configuration written");
        return Ok(());
    }

    // Configuration is loaded before logging so global.log_level can apply
    let config_path = matches.get_one::<String>("config");
    let config = match config_path {
        Some(path) => MonitorConfig::from_file(path).with_context(|| format!("loading {}", path))?,
        None => MonitorConfig::load().context("loading configuration")?,
    };
    init_logging(cli_log_level.unwrap_or(&config.global.log_level), json_logs);

    info!(
        version = VERSION,
        instance = %config.global.instance_name,
        config_path = config_path.map(String::as_str).unwrap_or("<defaults>"),
        "Starting perfwatch"
    );

    if let Some(port) = matches.get_one::<u16>("metrics-port") {
        let addr = SocketAddr::from(([0, 0, 0, 0], *port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("installing Prometheus exporter")?;
        info!(%addr, "Prometheus exporter listening");
    }

    let monitor = PerformanceMonitor::new(config)?;
    monitor.start().await?;

    let shutdown = setup_shutdown_signal();
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(monitor.config().scheduler.interval());

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping perfwatch...");
                break;
            }
            _ = ticker.tick() => log_health(&monitor).await,
        }
    }

    monitor.stop().await;
    info!("perfwatch stopped");
    Ok(())
}

/// Initialize logging with the specified level
fn init_logging(log_level: &str, json: bool) {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => {
            eprintln!("Invalid log level: {}. Using 'info'", log_level);
            tracing::Level::INFO
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("perfwatch={}", level).into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Log a one-line health summary
async fn log_health(monitor: &PerformanceMonitor) {
    let health = monitor.get_system_health().await;
    let stats = monitor.alert_stats();

    if health.status == HealthStatus::Unknown {
        info!(active_alerts = stats.active_alerts, "No health probes reporting");
    } else if !health.status.is_operational() {
        error!(
            status = health.status.as_str(),
            score = health.score,
            critical_alerts = stats.critical_count,
            recommendations = ?health.recommendations,
            "System unhealthy"
        );
    } else if health.status == HealthStatus::Degraded {
        warn!(
            status = health.status.as_str(),
            score = health.score,
            active_alerts = stats.active_alerts,
            "Health degraded"
        );
    } else {
        info!(
            status = health.status.as_str(),
            score = health.score,
            active_alerts = stats.active_alerts,
            "Health check"
        );
    }

    for insight in monitor
        .generate_predictive_insights(TimeWindow::OneDay)
        .iter()
        .filter(|i| i.impact >= perfwatch::monitoring::ImpactLevel::High)
    {
        warn!(metric = %insight.metric, impact = insight.impact.as_str(), "{}", insight.title);
    }
}

/// Setup graceful shutdown signal handling
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
