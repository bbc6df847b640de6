//! Delivery side of a machine: queue to broker

pub mod backoff;
pub mod broker;
pub mod topic;
pub mod wrapper;

pub use backoff::Backoff;
pub use broker::{Broker, MqttBroker};
pub use wrapper::{DeliveryStats, Wrapper, POLL_INTERVAL};
