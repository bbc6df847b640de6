//! Integration tests for the acquisition loop
//!
//! These tests drive a full Supervisor under paused tokio time:
//! - fault containment and error messages
//! - scheduler output reaching the queue through output channels
//! - draining on shutdown

mod common;

use common::builders::ConfigBuilder;
use common::mock_helpers::registry_with_dead_device;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use telemetryd::backend::{channel, Lifecycle, Supervisor};
use telemetryd::config::CapabilitySpec;
use telemetryd::daemon::Shutdown;
use telemetryd::{Message, Registry};
use tokio::time::Instant;

/// Collect `count` messages, then request shutdown
async fn collect(
    rx: &crossbeam_channel::Receiver<Message>,
    count: usize,
    shutdown: &Shutdown,
) -> Vec<(Instant, Message)> {
    let mut seen = Vec::new();
    while seen.len() < count {
        match rx.try_recv() {
            Ok(message) => seen.push((Instant::now(), message)),
            Err(_) => tokio::time::sleep(Duration::from_millis(250)).await,
        }
    }
    shutdown.trigger();
    seen
}

#[tokio::test(start_paused = true)]
async fn test_three_failures_three_error_messages() {
    let config = ConfigBuilder::new("press_3")
        .device("adc", CapabilitySpec::new("test", "Dead"))
        .pipeline("raw", &[])
        .measurement("Single", 1.0, 1, &[("adc", "raw")])
        .cooldown(30.0)
        .build();

    let (tx, rx) = channel(16);
    let shutdown = Shutdown::new();
    let mut supervisor = Supervisor::new(
        config,
        Arc::new(registry_with_dead_device()),
        tx,
        shutdown.clone(),
    );

    let start = Instant::now();
    let (result, seen) = tokio::join!(supervisor.run(), collect(&rx, 3, &shutdown));
    result.unwrap();

    assert_eq!(seen.len(), 3);
    for (_, message) in &seen {
        assert_eq!(message.path, "/error/press_3");
        assert_eq!(message.payload["type"], "device");
        assert_eq!(message.payload["id"], "adc");
        assert_eq!(message.payload["reason"], "bus timeout");
        assert!(message.payload["timestamp"].is_string());
    }

    // each retry waits out the cooldown
    let third = seen[2].0 - start;
    assert!(third >= Duration::from_secs(60), "{:?}", third);
    assert!(third < Duration::from_secs(62), "{:?}", third);
    assert_eq!(supervisor.state(), Lifecycle::Terminated);
}

#[tokio::test(start_paused = true)]
async fn test_pipeline_failure_is_calculation_error() {
    let config = ConfigBuilder::new("m")
        .device(
            "meter",
            CapabilitySpec::new("testing", "MockConstant")
                .with_config("value", "not a number")
                .with_variable("variable", "raw"),
        )
        .calculation(
            "scale",
            CapabilitySpec::new("calibrate", "MultiplierOffset")
                .with_config("multiplier", 2.0)
                .with_variable("raw_value", "raw"),
        )
        .pipeline("p", &["scale"])
        .measurement("Single", 1.0, 1, &[("meter", "p")])
        .cooldown(5.0)
        .build();

    let (tx, rx) = channel(16);
    let shutdown = Shutdown::new();
    let mut supervisor = Supervisor::new(config, Arc::new(Registry::with_builtins()), tx, shutdown.clone());

    let (result, seen) = tokio::join!(supervisor.run(), collect(&rx, 1, &shutdown));
    result.unwrap();

    let message = &seen[0].1;
    assert_eq!(message.path, "/error/m");
    assert_eq!(message.payload["type"], "calculation");
    assert_eq!(message.payload["id"], "scale");
}

#[tokio::test(start_paused = true)]
async fn test_averaged_output_through_channels() {
    let config = ConfigBuilder::new("line")
        .device(
            "a",
            CapabilitySpec::new("testing", "MockConstant")
                .with_config("value", 2.0)
                .with_variable("variable", "current"),
        )
        .device(
            "b",
            CapabilitySpec::new("testing", "MockConstant")
                .with_config("value", 230.0)
                .with_variable("variable", "voltage"),
        )
        .pipeline("raw", &[])
        .measurement("MultiMergedAvg", 3.0, 3, &[("a", "raw"), ("b", "raw")])
        .output(
            "power",
            "power",
            json!({"readings": {"i": "$.current", "v": "voltage"}, "unit": "#SI"}),
            false,
        )
        .output("all", "", json!({"machine": "#line"}), true)
        .build();

    let (tx, rx) = channel(16);
    let shutdown = Shutdown::new();
    let mut supervisor = Supervisor::new(config, Arc::new(Registry::with_builtins()), tx, shutdown.clone());

    let start = Instant::now();
    let (result, seen) = tokio::join!(supervisor.run(), collect(&rx, 2, &shutdown));
    result.unwrap();

    // channels are visited in name order
    let (at, all) = &seen[0];
    assert_eq!(all.path, "");
    assert_eq!(all.payload["current"], 2.0);
    assert_eq!(all.payload["voltage"], 230.0);
    assert_eq!(all.payload["machine"], "line");

    let power = &seen[1].1;
    assert_eq!(power.path, "power");
    assert_eq!(power.payload["readings"], json!({"i": 2.0, "v": 230.0}));
    assert_eq!(power.payload["unit"], "SI");
    assert!(power.payload["timestamp"].is_string());

    // the window closes on the third tick, two sub-slots in
    assert!(*at - start >= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_no_output_channels_sends_raw_variables() {
    let config = ConfigBuilder::new("m")
        .device(
            "meter",
            CapabilitySpec::new("testing", "MockConstant")
                .with_config("value", 1.5)
                .with_variable("variable", "x"),
        )
        .pipeline("raw", &[])
        .measurement("Single", 10.0, 1, &[("meter", "raw")])
        .build();

    let (tx, rx) = channel(16);
    let shutdown = Shutdown::new();
    let mut supervisor = Supervisor::new(config, Arc::new(Registry::with_builtins()), tx, shutdown.clone());

    let start = Instant::now();
    let (result, seen) = tokio::join!(supervisor.run(), collect(&rx, 2, &shutdown));
    result.unwrap();

    assert_eq!(seen[0].1.path, "");
    assert_eq!(seen[0].1.payload["x"], 1.5);
    let gap = seen[1].0 - start;
    assert!(gap >= Duration::from_secs(10) && gap < Duration::from_secs(11), "{:?}", gap);
}
