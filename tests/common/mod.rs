//! Shared test utilities for adapter tests.
//!
//! This module provides common test infrastructure including:
//! - Adapter construction over the mock driver
//! - Event collection with timeouts

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use sugo_serialport::config::Config;
use sugo_serialport::port::MockDriver;
use sugo_serialport::{IdleTimeout, PortEvent, SerialPortActor, Variant};
use tokio::sync::broadcast;

/// Test harness: an adapter wired to a mock driver, plus an event subscription
/// taken before any call is made.
pub struct TestHarness {
    pub driver: MockDriver,
    pub actor: SerialPortActor,
    pub events: broadcast::Receiver<PortEvent>,
}

impl TestHarness {
    pub fn new(variant: Variant) -> Self {
        Self::with_config(config_for(variant))
    }

    /// Interface variant with the given idle timeout.
    pub fn with_timeout(timeout: IdleTimeout) -> Self {
        let mut config = config_for(Variant::Interface);
        config.adapter.timeout = timeout;
        Self::with_config(config)
    }

    pub fn with_config(config: Config) -> Self {
        let driver = MockDriver::new();
        let actor = SerialPortActor::new(Arc::new(driver.clone()), &config);
        let events = actor.subscribe();
        Self {
            driver,
            actor,
            events,
        }
    }

    /// Wait for the next event, failing the test after one second.
    pub async fn next_event(&mut self) -> PortEvent {
        tokio::time::timeout(Duration::from_secs(1), self.events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    /// Collect `count` events in arrival order.
    pub async fn take_events(&mut self, count: usize) -> Vec<PortEvent> {
        let mut events = Vec::with_capacity(count);
        for _ in 0..count {
            events.push(self.next_event().await);
        }
        events
    }

    /// Poll until the mock port reports closed, or give up after `within`.
    pub async fn wait_closed(&self, within: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        while tokio::time::Instant::now() < deadline {
            if !self.driver.port_is_open() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        !self.driver.port_is_open()
    }
}

/// A config for `variant` with `MOCK0` as the default path.
pub fn config_for(variant: Variant) -> Config {
    let mut config = Config::default();
    config.adapter.variant = variant;
    config.adapter.path = Some("MOCK0".to_string());
    config
}
