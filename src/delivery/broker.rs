//! Broker connection
//!
//! [`Broker`] is the seam between the wrapper's retry logic and the MQTT
//! client, so the wrapper can be exercised against an in-memory broker.

use crate::config::MqttConfig;
use crate::error::TransportError;
use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ClientError, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS,
};
use std::time::Duration;

/// Give up on a CONNACK after this long
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Requests buffered inside the MQTT client
const REQUEST_CAPACITY: usize = 64;

#[async_trait]
pub trait Broker: Send {
    /// (Re)establish the connection
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Queue one publication
    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Drive network I/O for at most `timeout`.
    ///
    /// An error means the connection is gone.
    async fn poll(&mut self, timeout: Duration) -> Result<(), TransportError>;
}

/// MQTT 3.1.1 connection via `rumqttc`
pub struct MqttBroker {
    options: MqttOptions,
    session: Option<(AsyncClient, EventLoop)>,
}

impl MqttBroker {
    pub fn new(config: &MqttConfig, machine: &str) -> Self {
        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("telemetryd-{}", machine));
        let mut options = MqttOptions::new(client_id, config.broker.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_s.max(5)));
        Self {
            options,
            session: None,
        }
    }
}

#[async_trait]
impl Broker for MqttBroker {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.session = None;
        let (client, mut eventloop) = AsyncClient::new(self.options.clone(), REQUEST_CAPACITY);

        let deadline = tokio::time::Instant::now() + CONNECT_TIMEOUT;
        loop {
            let event = tokio::time::timeout_at(deadline, eventloop.poll())
                .await
                .map_err(|_| TransportError::Connect("timed out waiting for CONNACK".to_string()))?
                .map_err(|e| TransportError::Connect(e.to_string()))?;

            if let Event::Incoming(Packet::ConnAck(ack)) = event {
                if ack.code != ConnectReturnCode::Success {
                    return Err(TransportError::Connect(format!("refused: {:?}", ack.code)));
                }
                break;
            }
        }

        self.session = Some((client, eventloop));
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let (client, _) = self
            .session
            .as_ref()
            .ok_or_else(|| TransportError::Publish("not connected".to_string()))?;
        // never wait on the request queue: the event loop only runs in poll()
        match client.try_publish(topic, QoS::AtLeastOnce, false, payload) {
            Ok(()) => Ok(()),
            Err(ClientError::TryRequest(_)) => Err(TransportError::Busy),
            Err(e) => Err(TransportError::Publish(e.to_string())),
        }
    }

    async fn poll(&mut self, timeout: Duration) -> Result<(), TransportError> {
        let Some((_, eventloop)) = self.session.as_mut() else {
            return Err(TransportError::Disconnected("not connected".to_string()));
        };
        match tokio::time::timeout(timeout, eventloop.poll()).await {
            Err(_) => Ok(()),
            Ok(Ok(event)) => {
                tracing::trace!("mqtt event: {:?}", event);
                Ok(())
            }
            Ok(Err(e)) => {
                self.session = None;
                Err(TransportError::Disconnected(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broker() -> MqttBroker {
        let config = MqttConfig {
            broker: "127.0.0.1".into(),
            ..Default::default()
        };
        MqttBroker::new(&config, "press_3")
    }

    #[tokio::test]
    async fn test_publish_without_session_fails() {
        let mut broker = broker();
        let err = broker.publish("t", b"{}".to_vec()).await.unwrap_err();
        assert!(matches!(err, TransportError::Publish(_)));
    }

    #[tokio::test]
    async fn test_full_request_buffer_reports_busy() {
        let mut broker = broker();
        // a session whose event loop is never polled
        broker.session = Some(AsyncClient::new(broker.options.clone(), REQUEST_CAPACITY));

        for i in 0..REQUEST_CAPACITY {
            let payload = format!("{{\"i\":{}}}", i).into_bytes();
            broker.publish("plant/press_3", payload).await.unwrap();
        }
        let err = broker
            .publish("plant/press_3", b"{}".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Busy), "{:?}", err);
    }
}
