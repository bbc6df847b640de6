//! Acquisition building block
//!
//! Owns every capability instance of one machine and runs its sampling
//! loop:
//!
//! ```text
//! Created -> Loading -> Initializing -> Running -> Draining -> Terminated
//! ```
//!
//! - **Loading** resolves every configured capability through the
//!   [`Registry`]. A spec that fails to resolve is logged and left out; the
//!   stacks that need it report errors once running.
//! - **Initializing** brings up interfaces, then devices (bound to their
//!   interface), pipelines, sensing stacks and finally the scheduler.
//! - **Running** ticks the scheduler, sends any output through every output
//!   channel and waits for the returned delay. Sample and calculation
//!   errors become error messages; every failure is followed by a cooldown.
//! - **Draining** starts as soon as the shutdown flag is seen, abandoning
//!   a tick that is still waiting on a device.

use super::ipc::{MessageSender, Outbox};
use crate::capability::{
    share_device, Registry, SharedCalculation, SharedDevice, SharedInterface,
};
use crate::config::DaemonConfig;
use crate::daemon::{BuildingBlock, Exit, Shutdown};
use crate::error::{Result, ResultExt, TelemetryError};
use crate::measurement::Measurement;
use crate::output;
use crate::pipeline::{Pipeline, SensingStack};
use crate::types::{Message, Variables};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// How long a stopping block waits on device reads left in the blocking pool
const BLOCKING_GRACE: Duration = Duration::from_secs(1);

/// Supervisor lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Loading,
    Initializing,
    Running,
    Draining,
    Terminated,
}

/// Capabilities resolved during Loading, before initialisation
#[derive(Default)]
struct Loaded {
    interfaces: HashMap<String, SharedInterface>,
    devices: HashMap<String, Box<dyn crate::capability::Device>>,
    calculations: HashMap<String, SharedCalculation>,
    measurement: Option<Box<dyn Measurement>>,
}

pub struct Supervisor {
    name: String,
    config: DaemonConfig,
    registry: Arc<Registry>,
    outbox: Outbox,
    shutdown: Shutdown,
    cooldown: Duration,
    state: Lifecycle,
    measurement: Option<Box<dyn Measurement>>,
}

impl Supervisor {
    pub fn new(
        config: DaemonConfig,
        registry: Arc<Registry>,
        tx: MessageSender,
        shutdown: Shutdown,
    ) -> Self {
        let cooldown = Duration::from_secs_f64(config.runtime.error_cooldown_s.max(0.0));
        Self {
            name: config.name.clone(),
            config,
            registry,
            outbox: Outbox::new(tx),
            shutdown,
            cooldown,
            state: Lifecycle::Created,
            measurement: None,
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Load, initialise and run until shutdown
    pub async fn run(&mut self) -> Result<()> {
        let loaded = self.load();
        self.initialise(loaded).await?;
        self.running().await;
        self.state = Lifecycle::Terminated;
        tracing::info!(
            "[{}] terminated ({} messages sent, {} dropped)",
            self.name,
            self.outbox.sent(),
            self.outbox.dropped()
        );
        Ok(())
    }

    // ==================== Loading ====================

    fn load(&mut self) -> Loaded {
        self.state = Lifecycle::Loading;
        let mut loaded = Loaded::default();

        for (name, spec) in &self.config.interface {
            match self.registry.resolve_interface(spec) {
                Ok(interface) => {
                    loaded.interfaces.insert(name.clone(), interface);
                }
                Err(e) => tracing::error!("[{}] interface '{}': {}", self.name, name, e),
            }
        }

        for (name, spec) in &self.config.device {
            match self.registry.resolve_device(spec) {
                Ok(device) => {
                    loaded.devices.insert(name.clone(), device);
                }
                Err(e) => tracing::error!("[{}] device '{}': {}", self.name, name, e),
            }
        }

        for (name, spec) in &self.config.calculation {
            match self.registry.resolve_calculation(spec) {
                Ok(unit) => {
                    loaded.calculations.insert(name.clone(), unit);
                }
                Err(e) => tracing::error!("[{}] calculation '{}': {}", self.name, name, e),
            }
        }

        match &self.config.measurement {
            Some(config) => match self.registry.resolve_measurement(config) {
                Ok(measurement) => loaded.measurement = Some(measurement),
                Err(e) => tracing::error!("[{}] measurement: {}", self.name, e),
            },
            None => tracing::error!("[{}] no measurement configured", self.name),
        }

        tracing::debug!(
            "[{}] loaded {} interfaces, {} devices, {} calculations",
            self.name,
            loaded.interfaces.len(),
            loaded.devices.len(),
            loaded.calculations.len()
        );
        loaded
    }

    // ==================== Initializing ====================

    async fn initialise(&mut self, loaded: Loaded) -> Result<()> {
        self.state = Lifecycle::Initializing;
        let Loaded {
            interfaces,
            devices,
            calculations,
            measurement,
        } = loaded;

        let mut ready_interfaces = HashMap::new();
        for (name, interface) in interfaces {
            match interface.initialise().await {
                Ok(()) => {
                    ready_interfaces.insert(name, interface);
                }
                Err(e) => tracing::error!("[{}] interface '{}' failed to start: {}", self.name, name, e),
            }
        }

        let mut ready_devices: HashMap<String, SharedDevice> = HashMap::new();
        for (name, mut device) in devices {
            let interface = self
                .config
                .device
                .get(&name)
                .and_then(|spec| spec.interface.as_ref())
                .and_then(|iface| {
                    let found = ready_interfaces.get(iface).cloned();
                    if found.is_none() {
                        tracing::warn!(
                            "[{}] device '{}': interface '{}' is not available",
                            self.name,
                            name,
                            iface
                        );
                    }
                    found
                });
            match device.initialise(interface).await {
                Ok(()) => {
                    ready_devices.insert(name, share_device(device));
                }
                Err(e) => tracing::error!("[{}] device '{}' failed to start: {}", self.name, name, e),
            }
        }

        let mut pipelines = HashMap::new();
        for (name, units) in &self.config.pipelines {
            let mut pipeline = Pipeline::new(name.clone(), units.clone());
            pipeline.initialise(&calculations);
            tracing::debug!(
                "[{}] pipeline '{}' runs {:?}",
                self.name,
                name,
                pipeline.execution_order()
            );
            pipelines.insert(name.clone(), Arc::new(pipeline));
        }

        let stack_configs = self
            .config
            .measurement
            .as_ref()
            .map(|m| m.sensing_stacks.clone())
            .unwrap_or_default();
        let stacks: Vec<SensingStack> = stack_configs
            .into_iter()
            .map(|config| {
                let mut stack = SensingStack::new(config);
                stack.initialise(&ready_devices, &pipelines);
                stack
            })
            .collect();

        let mut measurement = measurement.ok_or_else(|| {
            TelemetryError::Measurement(format!("[{}] no usable measurement scheduler", self.name))
        })?;
        measurement.initialise(stacks)?;
        tracing::info!(
            "[{}] initialised: {} scheduler, {} devices ready",
            self.name,
            measurement.class(),
            ready_devices.len()
        );
        self.measurement = Some(measurement);
        Ok(())
    }

    // ==================== Running ====================

    async fn running(&mut self) {
        self.state = Lifecycle::Running;
        let shutdown = self.shutdown.clone();
        while !shutdown.is_triggered() {
            // a tick stuck on a device read is abandoned at shutdown
            let delay = tokio::select! {
                delay = self.step() => delay,
                _ = shutdown.triggered() => break,
            };
            shutdown.sleep(delay).await;
        }
        self.state = Lifecycle::Draining;
        tracing::info!("[{}] draining", self.name);
    }

    /// One scheduler tick; returns how long to wait before the next
    pub async fn step(&mut self) -> Duration {
        let result = match self.measurement.as_mut() {
            Some(measurement) => measurement.tick().await,
            None => Err(TelemetryError::Measurement("not initialised".to_string())),
        };

        match result {
            Ok(tick) => match tick.output.map(|vars| self.dispatch(vars)) {
                Some(Err(e)) => {
                    tracing::error!("[{}] output failed: {}", self.name, e);
                    self.cooldown
                }
                _ => tick.delay,
            },
            Err(TelemetryError::Stack(e)) => {
                tracing::error!("[{}] {}", self.name, e);
                self.publish(Message::error(&self.name, e.report()));
                self.cooldown
            }
            Err(e) => {
                tracing::error!("[{}] tick failed: {}", self.name, e);
                self.cooldown
            }
        }
    }

    /// Send one output through every channel, in channel-name order.
    ///
    /// A failed transform stops the remaining channels for this output.
    fn dispatch(&self, vars: Variables) -> Result<()> {
        let input = Value::Object(vars);
        if self.config.output.is_empty() {
            self.publish(Message::new("", input));
            return Ok(());
        }

        for (name, channel) in &self.config.output {
            let payload = output::transform(&input, &channel.spec, channel.append)
                .context(format!("output '{}'", name))?;
            self.publish(Message::new(channel.path.clone(), payload));
        }
        Ok(())
    }

    fn publish(&self, mut message: Message) {
        message.ensure_timestamp();
        tracing::trace!("[{}] -> '{}' {}", self.name, message.path, message.payload);
        self.outbox.send(message);
    }
}

impl BuildingBlock for Supervisor {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(mut self: Box<Self>) -> Exit {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => return Exit::Unplanned(format!("runtime: {}", e)),
        };

        let result = runtime.block_on(Supervisor::run(&mut self));
        // don't wait on device reads still parked in the blocking pool
        runtime.shutdown_timeout(BLOCKING_GRACE);

        match result {
            Ok(()) => Exit::Graceful,
            Err(e) => Exit::Unplanned(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ipc::channel;
    use crate::config::{CapabilitySpec, MeasurementConfig, SchedulerParams, SensingStackConfig};
    use crate::types::ErrorKind;

    fn config() -> DaemonConfig {
        let mut config = DaemonConfig {
            name: "press".into(),
            measurement: Some(MeasurementConfig {
                module: "sample".into(),
                class: "Single".into(),
                config: SchedulerParams {
                    period: 1.0,
                    n_samples: 1,
                },
                sensing_stacks: vec![SensingStackConfig {
                    device: "meter".into(),
                    pipeline: "scale".into(),
                    ..Default::default()
                }],
            }),
            ..Default::default()
        };
        config.device.insert(
            "meter".into(),
            CapabilitySpec::new("testing", "MockConstant")
                .with_config("value", 2.0)
                .with_variable("variable", "raw"),
        );
        config.calculation.insert(
            "x10".into(),
            CapabilitySpec::new("calibrate", "MultiplierOffset")
                .with_config("multiplier", 10.0)
                .with_variable("raw_value", "raw")
                .with_variable("calibrated_value", "value"),
        );
        config.pipelines.insert("scale".into(), vec!["x10".into()]);
        config
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_tick_reaches_channel() {
        let (tx, rx) = channel(8);
        let mut supervisor =
            Supervisor::new(config(), Arc::new(Registry::with_builtins()), tx, Shutdown::new());
        let loaded = supervisor.load();
        supervisor.initialise(loaded).await.unwrap();

        let delay = supervisor.step().await;
        assert_eq!(delay, Duration::from_secs(1));

        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.path, "");
        assert_eq!(msg.payload["value"], 20.0);
        assert!(msg.payload["timestamp"].is_string());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_device_reports_error_and_cools_down() {
        let mut config = config();
        config.device.clear();
        let (tx, rx) = channel(8);
        let mut supervisor =
            Supervisor::new(config, Arc::new(Registry::with_builtins()), tx, Shutdown::new())
                .with_cooldown(Duration::from_secs(30));
        let loaded = supervisor.load();
        supervisor.initialise(loaded).await.unwrap();

        assert_eq!(supervisor.step().await, Duration::from_secs(30));
        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.path, "/error/press");
        assert_eq!(msg.payload["type"], ErrorKind::Device.to_string());
        assert_eq!(msg.payload["id"], "meter");
    }

    #[tokio::test(start_paused = true)]
    async fn test_output_channels() {
        let mut config = config();
        config.output.insert(
            "scaled".into(),
            crate::config::OutputChannel {
                path: "power".into(),
                spec: serde_json::json!({"reading": {"value": "value"}, "unit": "#A"}),
                append: false,
            },
        );
        let (tx, rx) = channel(8);
        let mut supervisor =
            Supervisor::new(config, Arc::new(Registry::with_builtins()), tx, Shutdown::new());
        let loaded = supervisor.load();
        supervisor.initialise(loaded).await.unwrap();
        supervisor.step().await;

        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.path, "power");
        assert_eq!(msg.payload["reading"]["value"], 20.0);
        assert_eq!(msg.payload["unit"], "A");
    }

    #[tokio::test(start_paused = true)]
    async fn test_transform_failure_cools_down() {
        let mut config = config();
        // index 1 is written with no index 0 before it
        config.output.insert(
            "broken".into(),
            crate::config::OutputChannel {
                path: "r".into(),
                spec: serde_json::json!({"r": ["$.missing", "value"]}),
                append: false,
            },
        );
        config.output.insert(
            "later".into(),
            crate::config::OutputChannel {
                path: "later".into(),
                spec: serde_json::json!({"v": "value"}),
                append: false,
            },
        );
        let (tx, rx) = channel(8);
        let mut supervisor =
            Supervisor::new(config, Arc::new(Registry::with_builtins()), tx, Shutdown::new())
                .with_cooldown(Duration::from_secs(30));
        let loaded = supervisor.load();
        supervisor.initialise(loaded).await.unwrap();

        assert_eq!(supervisor.step().await, Duration::from_secs(30));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_exits_when_shutdown_requested() {
        let shutdown = Shutdown::new();
        let (tx, _rx) = channel(8);
        let mut supervisor = Supervisor::new(
            config(),
            Arc::new(Registry::with_builtins()),
            tx,
            shutdown.clone(),
        );
        shutdown.trigger();
        supervisor.run().await.unwrap();
        assert_eq!(supervisor.state(), Lifecycle::Terminated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_stalled_sample() {
        struct StalledDevice;

        #[async_trait::async_trait]
        impl crate::capability::Device for StalledDevice {
            async fn initialise(
                &mut self,
                _: Option<crate::capability::SharedInterface>,
            ) -> std::result::Result<(), crate::error::CapabilityError> {
                Ok(())
            }

            async fn sample(
                &mut self,
            ) -> std::result::Result<Variables, crate::error::CapabilityError> {
                std::future::pending().await
            }
        }

        let mut config = config();
        config
            .device
            .insert("meter".into(), CapabilitySpec::new("test", "Stalled"));
        let mut registry = Registry::with_builtins();
        registry.register_device("test", "Stalled", |_| Ok(Box::new(StalledDevice)));

        let shutdown = Shutdown::new();
        let (tx, rx) = channel(8);
        let mut supervisor = Supervisor::new(config, Arc::new(registry), tx, shutdown.clone());

        let stopper = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            shutdown.trigger();
        };
        let (result, _) = tokio::join!(supervisor.run(), stopper);
        result.unwrap();
        assert_eq!(supervisor.state(), Lifecycle::Terminated);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_scheduler_is_startup_error() {
        let mut config = config();
        if let Some(m) = config.measurement.as_mut() {
            m.class = "Burst".into();
        }
        let (tx, _rx) = channel(8);
        let mut supervisor =
            Supervisor::new(config, Arc::new(Registry::with_builtins()), tx, Shutdown::new());
        assert!(supervisor.run().await.is_err());
    }
}
