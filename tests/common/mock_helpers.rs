//! Mock construction helpers

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use telemetryd::capability::{Device, SharedInterface};
use telemetryd::delivery::Broker;
use telemetryd::error::{CapabilityError, TransportError};
use telemetryd::{Registry, Variables};

/// Device that fails every sample
pub struct DeadDevice;

#[async_trait]
impl Device for DeadDevice {
    async fn initialise(&mut self, _: Option<SharedInterface>) -> Result<(), CapabilityError> {
        Ok(())
    }

    async fn sample(&mut self) -> Result<Variables, CapabilityError> {
        Err(CapabilityError::new("bus timeout"))
    }
}

/// Built-in registry plus `test.Dead`
pub fn registry_with_dead_device() -> Registry {
    let mut registry = Registry::with_builtins();
    registry.register_device("test", "Dead", |_| Ok(Box::new(DeadDevice)));
    registry
}

/// Publications seen by a [`RecordingBroker`]
pub type Published = Arc<Mutex<Vec<(String, serde_json::Value)>>>;

/// In-memory broker; refuses the first `refusals` connects
pub struct RecordingBroker {
    pub refusals: usize,
    pub connects: usize,
    pub published: Published,
}

impl RecordingBroker {
    pub fn new(refusals: usize) -> (Self, Published) {
        let published = Published::default();
        (
            Self {
                refusals,
                connects: 0,
                published: published.clone(),
            },
            published,
        )
    }
}

#[async_trait]
impl Broker for RecordingBroker {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.refusals > 0 {
            self.refusals -= 1;
            return Err(TransportError::Connect("connection refused".into()));
        }
        self.connects += 1;
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let body = serde_json::from_slice(&payload)
            .map_err(|e| TransportError::Publish(e.to_string()))?;
        if let Ok(mut published) = self.published.lock() {
            published.push((topic.to_string(), body));
        }
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> Result<(), TransportError> {
        tokio::time::sleep(timeout).await;
        Ok(())
    }
}
