//! taskpilot daemon — starts the orchestration engine and runs the
//! classification pipeline on its configured schedule.

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use tp_core::config::EngineConfig;
use tp_daemon::daemon::Daemon;

/// Initialize logging with human-readable output.
///
/// Uses `RUST_LOG` when set, otherwise the configured default level.
/// Safe to call more than once; subsequent calls are no-ops.
fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .try_init()
        .ok();
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = EngineConfig::load().unwrap_or_else(|e| {
        eprintln!("failed to load config, using defaults: {e}");
        EngineConfig::default()
    });
    init_logging(&config.general.log_level);

    info!(
        project = %config.general.project_name,
        "taskpilot daemon starting"
    );
    if !config.pipeline.auto_analysis_enabled {
        warn!("auto analysis is disabled; the pipeline will only run on demand");
    }

    let daemon = Daemon::new(config);
    let shutdown = daemon.shutdown_handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.trigger();
        }
    });

    daemon.run().await;
    info!("daemon stopped");
    Ok(())
}
