//! Delivery building block
//!
//! Drains the message queue and republishes every message to the broker.
//! The queue is checked without blocking; between checks the broker's
//! network loop runs for up to [`POLL_INTERVAL`].

use super::backoff::Backoff;
use super::broker::{Broker, MqttBroker};
use super::topic::topic_for;
use crate::backend::MessageReceiver;
use crate::config::{DaemonConfig, MqttConfig};
use crate::daemon::{BuildingBlock, Exit, Shutdown};
use crate::error::TransportError;
use crate::types::{Message, Variables};
use crossbeam_channel::TryRecvError;
use std::time::Duration;

pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Running totals of one wrapper
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub published: u64,
    pub failed: u64,
    pub connects: u64,
}

pub struct Wrapper<B: Broker> {
    name: String,
    broker: B,
    rx: MessageReceiver,
    base_topic: String,
    constants: Variables,
    backoff: Backoff,
    shutdown: Shutdown,
    stats: DeliveryStats,
}

impl Wrapper<MqttBroker> {
    /// Wrapper for a machine config, connected over MQTT
    pub fn from_config(config: &DaemonConfig, rx: MessageReceiver, shutdown: Shutdown) -> Self {
        let mqtt = config.mqtt_or_default();
        let broker = MqttBroker::new(&mqtt, &config.name);
        Self::new(&config.name, broker, &mqtt, config.constants.clone(), rx, shutdown)
    }
}

impl<B: Broker> Wrapper<B> {
    pub fn new(
        name: &str,
        broker: B,
        mqtt: &MqttConfig,
        constants: Variables,
        rx: MessageReceiver,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            name: name.to_string(),
            broker,
            rx,
            base_topic: mqtt.base_topic_template.clone(),
            constants,
            backoff: Backoff::new(&mqtt.reconnect),
            shutdown,
            stats: DeliveryStats::default(),
        }
    }

    pub fn stats(&self) -> DeliveryStats {
        self.stats
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    /// Connect, then forward messages until shutdown or until every
    /// producer is gone
    pub async fn run(&mut self) {
        tracing::info!("[{}] delivery starting", self.name);
        if !self.connect().await {
            return;
        }

        while !self.shutdown.is_triggered() {
            if !self.drain().await {
                tracing::info!("[{}] message queue closed", self.name);
                break;
            }

            if let Err(e) = self.broker.poll(POLL_INTERVAL).await {
                tracing::error!("[{}] broker connection lost: {}", self.name, e);
                if !self.connect().await {
                    break;
                }
            }
        }

        tracing::info!(
            "[{}] delivery stopped ({} published, {} failed)",
            self.name,
            self.stats.published,
            self.stats.failed
        );
    }

    /// Retry until connected; `false` if shutdown came first
    async fn connect(&mut self) -> bool {
        while !self.shutdown.is_triggered() {
            match self.broker.connect().await {
                Ok(()) => {
                    self.stats.connects += 1;
                    tracing::info!("[{}] connected to broker", self.name);
                    // let the session settle before publishing
                    return self.shutdown.sleep(self.backoff.initial()).await;
                }
                Err(e) => {
                    let wait = self.backoff.next_delay();
                    tracing::error!(
                        "[{}] unable to connect ({}), retrying in {:?}",
                        self.name,
                        e,
                        wait
                    );
                    self.shutdown.sleep(wait).await;
                }
            }
        }
        false
    }

    /// Publish everything queued; `false` once the queue is disconnected
    async fn drain(&mut self) -> bool {
        loop {
            match self.rx.try_recv() {
                Ok(message) => self.publish(message).await,
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    async fn publish(&mut self, message: Message) {
        let topic =
            match topic_for(&self.base_topic, &message.path, &message.payload, &self.constants) {
                Ok(topic) => topic,
                Err(e) => {
                    tracing::error!("[{}] no topic for '{}': {}", self.name, message.path, e);
                    self.stats.failed += 1;
                    return;
                }
            };
        let body = match serde_json::to_vec(&message.payload) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!("[{}] cannot encode payload for '{}': {}", self.name, topic, e);
                self.stats.failed += 1;
                return;
            }
        };

        tracing::debug!("[{}] pub topic:{} msg:{}", self.name, topic, message.payload);
        loop {
            match self.broker.publish(&topic, body.clone()).await {
                Ok(()) => {
                    self.stats.published += 1;
                    return;
                }
                // let the network loop flush the client's buffer, then retry
                Err(TransportError::Busy) if !self.shutdown.is_triggered() => {
                    if let Err(e) = self.broker.poll(POLL_INTERVAL).await {
                        self.stats.failed += 1;
                        tracing::warn!("[{}] publish to '{}' failed: {}", self.name, topic, e);
                        return;
                    }
                }
                Err(e) => {
                    self.stats.failed += 1;
                    tracing::warn!("[{}] publish to '{}' failed: {}", self.name, topic, e);
                    return;
                }
            }
        }
    }
}

impl<B: Broker + 'static> BuildingBlock for Wrapper<B> {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(mut self: Box<Self>) -> Exit {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => return Exit::Unplanned(format!("runtime: {}", e)),
        };
        runtime.block_on(Wrapper::run(&mut self));

        if self.shutdown.is_triggered() {
            Exit::Graceful
        } else {
            Exit::Unplanned("message queue closed".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::channel;
    use async_trait::async_trait;
    use serde_json::json;

    /// Fails the first `refusals` connects, records publications.
    ///
    /// With a `buffer`, publications beyond it are refused as busy until
    /// the next poll.
    #[derive(Default)]
    struct FakeBroker {
        refusals: usize,
        attempts: Vec<tokio::time::Instant>,
        published: Vec<(String, String)>,
        buffer: Option<usize>,
        buffered: usize,
        polls: usize,
    }

    #[async_trait]
    impl Broker for FakeBroker {
        async fn connect(&mut self) -> Result<(), TransportError> {
            self.attempts.push(tokio::time::Instant::now());
            if self.refusals > 0 {
                self.refusals -= 1;
                return Err(TransportError::Connect("refused".into()));
            }
            Ok(())
        }

        async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
            if self.buffer.is_some_and(|cap| self.buffered >= cap) {
                return Err(TransportError::Busy);
            }
            self.buffered += 1;
            self.published
                .push((topic.to_string(), String::from_utf8_lossy(&payload).into_owned()));
            Ok(())
        }

        async fn poll(&mut self, timeout: Duration) -> Result<(), TransportError> {
            self.polls += 1;
            self.buffered = 0;
            tokio::time::sleep(timeout).await;
            Ok(())
        }
    }

    fn mqtt() -> MqttConfig {
        MqttConfig {
            base_topic_template: "plant/{{machine}}".into(),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_between_connect_attempts() {
        let (_tx, rx) = channel(4);
        let shutdown = Shutdown::new();
        let broker = FakeBroker {
            refusals: 3,
            ..Default::default()
        };
        let mut wrapper = Wrapper::new("m", broker, &mqtt(), Variables::new(), rx, shutdown.clone());

        assert!(wrapper.connect().await);
        let attempts = &wrapper.broker().attempts;
        let gaps: Vec<u64> = attempts
            .windows(2)
            .map(|w| (w[1] - w[0]).as_secs())
            .collect();
        assert_eq!(gaps, vec![5, 10, 20]);
        assert_eq!(wrapper.stats().connects, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_messages_published_with_rendered_topic() {
        let (tx, rx) = channel(4);
        let mut constants = Variables::new();
        constants.insert("machine".into(), json!("press_3"));
        let mut wrapper = Wrapper::new(
            "m",
            FakeBroker::default(),
            &mqtt(),
            constants,
            rx,
            Shutdown::new(),
        );

        tx.send(Message::new("power", json!({"value": 1}))).unwrap();
        tx.send(Message::new("/error/m", json!({"type": "device"}))).unwrap();
        drop(tx);

        // runs until the queue reports disconnected
        wrapper.run().await;

        let published = &wrapper.broker().published;
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].0, "plant/press_3/power");
        assert_eq!(published[0].1, r#"{"value":1}"#);
        assert_eq!(published[1].0, "plant/press_3/error/m");
        assert_eq!(wrapper.stats().published, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_backoff() {
        let (_tx, rx) = channel(4);
        let shutdown = Shutdown::new();
        let broker = FakeBroker {
            refusals: usize::MAX,
            ..Default::default()
        };
        let mut wrapper = Wrapper::new("m", broker, &mqtt(), Variables::new(), rx, shutdown.clone());

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            shutdown.trigger();
        });
        wrapper.run().await;
        stopper.await.unwrap();
        assert_eq!(wrapper.stats().connects, 0);
        assert_eq!(wrapper.broker().attempts.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backlog_larger_than_client_buffer() {
        let (tx, rx) = channel(256);
        let broker = FakeBroker {
            buffer: Some(64),
            ..Default::default()
        };
        let mut wrapper = Wrapper::new("m", broker, &mqtt(), Variables::new(), rx, Shutdown::new());

        for i in 0..150 {
            tx.send(Message::new("power", json!({"seq": i}))).unwrap();
        }
        drop(tx);
        wrapper.run().await;

        let published = &wrapper.broker().published;
        assert_eq!(published.len(), 150);
        assert_eq!(published[64].1, r#"{"seq":64}"#);
        assert_eq!(published[149].1, r#"{"seq":149}"#);
        assert_eq!(wrapper.stats().published, 150);
        assert_eq!(wrapper.stats().failed, 0);
        assert!(wrapper.broker().polls >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrenderable_topic_counts_as_failed() {
        let (tx, rx) = channel(4);
        let mqtt = MqttConfig {
            base_topic_template: "plant/{{#line}}".into(),
            ..Default::default()
        };
        let mut wrapper = Wrapper::new(
            "m",
            FakeBroker::default(),
            &mqtt,
            Variables::new(),
            rx,
            Shutdown::new(),
        );

        tx.send(Message::new("power", json!({"value": 1}))).unwrap();
        drop(tx);
        wrapper.run().await;

        assert!(wrapper.broker().published.is_empty());
        assert_eq!(wrapper.stats().failed, 1);
    }
}
