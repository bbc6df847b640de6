//! Integration tests for the delivery side
//!
//! - acquisition and delivery joined by the queue
//! - reconnect backoff against a refusing broker
//! - topic templating with machine constants

mod common;

use common::builders::ConfigBuilder;
use common::mock_helpers::RecordingBroker;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use telemetryd::backend::{channel, Supervisor};
use telemetryd::config::{CapabilitySpec, MqttConfig, ReconnectConfig};
use telemetryd::daemon::Shutdown;
use telemetryd::delivery::Wrapper;
use telemetryd::{Message, Registry, Variables};

fn mqtt(template: &str) -> MqttConfig {
    MqttConfig {
        broker: "localhost".into(),
        base_topic_template: template.into(),
        reconnect: ReconnectConfig {
            initial: 1.0,
            backoff: 2.0,
            limit: 4.0,
        },
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_supervisor_to_broker() {
    let mut config = ConfigBuilder::new("press_3")
        .device(
            "meter",
            CapabilitySpec::new("testing", "MockConstant")
                .with_config("value", 4.2)
                .with_variable("variable", "current"),
        )
        .pipeline("raw", &[])
        .measurement("Single", 1.0, 1, &[("meter", "raw")])
        .output("c", "current", json!({"value": "current", "machine": "#press_3"}), false)
        .build();
    config.constants.insert("site".into(), json!("north"));

    let (tx, rx) = channel(32);
    let shutdown = Shutdown::new();
    let mut supervisor = Supervisor::new(
        config.clone(),
        Arc::new(Registry::with_builtins()),
        tx,
        shutdown.clone(),
    );
    let (broker, published) = RecordingBroker::new(0);
    let mut wrapper = Wrapper::new(
        &config.name,
        broker,
        &mqtt("{{site}}/{{machine}}"),
        config.constants.clone(),
        rx,
        shutdown.clone(),
    );

    let stopper = {
        let shutdown = shutdown.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(4500)).await;
            shutdown.trigger();
        }
    };
    let (result, _, _) = tokio::join!(supervisor.run(), wrapper.run(), stopper);
    result.unwrap();

    let published = published.lock().unwrap();
    // ticks at 0..=4 s; delivery starts after the 1 s settle
    assert!(published.len() >= 4, "{}", published.len());
    for (topic, body) in published.iter() {
        assert_eq!(topic, "north/press_3/current");
        assert_eq!(body["value"], 4.2);
        assert!(body["timestamp"].is_string());
    }
    assert_eq!(wrapper.stats().published as usize, published.len());
}

#[tokio::test(start_paused = true)]
async fn test_refused_connects_back_off_then_deliver() {
    let (tx, rx) = channel(8);
    let shutdown = Shutdown::new();
    let (broker, published) = RecordingBroker::new(4);
    let mut wrapper = Wrapper::new(
        "m",
        broker,
        &mqtt("plant/m"),
        Variables::new(),
        rx,
        shutdown.clone(),
    );

    tx.send(Message::new("", json!({"x": 1}))).unwrap();
    drop(tx);

    let start = tokio::time::Instant::now();
    wrapper.run().await;

    // 1 + 2 + 4 + 4 s of backoff, then the 1 s settle
    assert_eq!(start.elapsed().as_secs(), 12);
    assert_eq!(wrapper.broker().connects, 1);

    let published = published.lock().unwrap();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "plant/m");
}
