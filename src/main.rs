//! telemetryd - Main Entry Point
//!
//! Loads every machine config, starts an acquisition + delivery pair per
//! machine and supervises them until SIGINT/SIGTERM.
//!
//! Environment:
//! - `TELEMETRYD_CONFIG` - config file or directory
//! - `TELEMETRYD_LOG` (or `RUST_LOG`) - log filter, default `info`
//! - `TELEMETRYD_LOG_DIR` - also write a daily rolling log file there

use anyhow::{bail, Context};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use telemetryd::{
    capability::Registry,
    config::{self, DaemonConfig},
    daemon::{self, Monitor, Shutdown},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// No configuration could be found or read
const EXIT_NO_CONFIG: u8 = 2;
/// Configuration found but rejected by validation
const EXIT_INVALID_CONFIG: u8 = 3;

/// Forced exit if draining takes longer than this
const HARD_EXIT_AFTER: Duration = Duration::from_secs(10);

fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = std::env::var("TELEMETRYD_LOG")
        .ok()
        .and_then(|f| EnvFilter::try_new(f).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    let (file_layer, guard) = match std::env::var_os("TELEMETRYD_LOG_DIR") {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "telemetryd.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                ),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    guard
}

fn load_configs() -> anyhow::Result<Vec<DaemonConfig>> {
    let Some(path) = config::discover() else {
        bail!(
            "no configuration found (set {} or create ./{})",
            config::CONFIG_ENV,
            config::LOCAL_CONFIG_DIR
        );
    };
    let configs = DaemonConfig::load_all(&path)
        .with_context(|| format!("loading configuration from {:?}", path))?;
    if configs.is_empty() {
        bail!("no *.toml files in {:?}", path);
    }
    Ok(configs)
}

fn install_signal_handler(shutdown: Shutdown) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        if shutdown.is_triggered() {
            return;
        }
        tracing::info!("Termination requested, draining...");
        shutdown.trigger();
        std::thread::spawn(|| {
            std::thread::sleep(HARD_EXIT_AFTER);
            tracing::error!("Graceful shutdown took longer than {:?}; exiting", HARD_EXIT_AFTER);
            std::process::exit(1);
        });
    })
    .context("installing signal handler")
}

fn main() -> ExitCode {
    let _log_guard = init_logging();
    tracing::info!("Starting telemetryd {}", env!("CARGO_PKG_VERSION"));

    let configs = match load_configs() {
        Ok(configs) => configs,
        Err(e) => {
            tracing::error!("{:#}", e);
            return ExitCode::from(EXIT_NO_CONFIG);
        }
    };

    let mut valid = true;
    for machine in &configs {
        let report = machine.validate();
        report.log(&machine.name);
        valid &= report.is_valid();
    }
    if !valid {
        tracing::error!("Configuration is invalid, not starting");
        return ExitCode::from(EXIT_INVALID_CONFIG);
    }

    let shutdown = Shutdown::new();
    if let Err(e) = install_signal_handler(shutdown.clone()) {
        tracing::error!("{:#}", e);
        return ExitCode::FAILURE;
    }

    let registry = Arc::new(Registry::with_builtins());
    let mut monitor = Monitor::new(shutdown.clone());
    for machine in configs {
        daemon::spawn_machine(&mut monitor, machine, registry.clone(), shutdown.clone());
    }

    for (block, restarts) in monitor.run() {
        if restarts > 0 {
            tracing::info!("'{}' was restarted {} times", block, restarts);
        }
    }
    tracing::info!("Shutdown complete");
    ExitCode::SUCCESS
}
