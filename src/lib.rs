//! # telemetryd: config-driven sensor acquisition daemon
//!
//! Periodically samples sensors through pluggable interfaces, runs each
//! sample through a calculation pipeline, reshapes the result into one or
//! more JSON payloads and forwards them to an MQTT broker.
//!
//! ## Architecture
//!
//! Every machine configuration gets two building blocks, each on its own
//! thread with a current-thread tokio runtime:
//!
//! - **Acquisition** ([`backend::Supervisor`]): capabilities from the
//!   [`capability::Registry`], [`pipeline::SensingStack`]s driven by a
//!   [`measurement::Measurement`] scheduler, payloads built by [`output`]
//! - **Delivery** ([`delivery::Wrapper`]): topic rendering, broker
//!   connection with reconnect backoff
//!
//! They share one bounded crossbeam channel of [`types::Message`]. A
//! [`daemon::Monitor`] restarts a block that stops unexpectedly.
//!
//! ```text
//! Registry -> SensingStack -> Measurement -> Pipeline -> transform -> queue -> Wrapper -> broker
//! ```
//!
//! ## Configuration
//!
//! One TOML document per machine, found via `TELEMETRYD_CONFIG`, `./config`
//! or the platform config directory (see [`config::discover`]).
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use telemetryd::{capability::Registry, config::DaemonConfig, daemon};
//!
//! let config = DaemonConfig::load("config/press.toml")?;
//! let shutdown = daemon::Shutdown::new();
//! let mut monitor = daemon::Monitor::new(shutdown.clone());
//! daemon::spawn_machine(&mut monitor, config, Arc::new(Registry::with_builtins()), shutdown);
//! monitor.run();
//! ```

pub mod backend;
pub mod capability;
pub mod config;
pub mod daemon;
pub mod delivery;
pub mod error;
pub mod measurement;
pub mod output;
pub mod pipeline;
pub mod scripting;
pub mod types;

// Re-export commonly used types
pub use capability::Registry;
pub use config::DaemonConfig;
pub use error::{Result, TelemetryError};
pub use types::{Message, Variables};
