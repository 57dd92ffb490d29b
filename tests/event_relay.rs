//! Event relay, idle auto-close and open-state behavior against the mock driver.

mod common;

use common::TestHarness;
use futures::StreamExt;
use serde_json::{json, Value};
use std::time::Duration;
use sugo_serialport::port::OpenBehavior;
use sugo_serialport::{IdleTimeout, PortEvent, ServiceError, SetOptions, Variant};

#[tokio::test]
async fn driver_events_are_relayed_once_in_order() {
    let mut harness = TestHarness::new(Variant::Module);
    harness.actor.connect(None, None).await.unwrap();

    harness.driver.inject_data(b"first");
    harness.driver.emit(PortEvent::Error("framing error".into()));
    harness.driver.inject_data(b"second");
    harness.driver.disconnect("device removed");

    let events = harness.take_events(6).await;
    assert_eq!(
        events,
        vec![
            PortEvent::Open,
            PortEvent::Data(b"first".to_vec()),
            PortEvent::Error("framing error".into()),
            PortEvent::Data(b"second".to_vec()),
            PortEvent::Disconnect("device removed".into()),
            PortEvent::Close,
        ]
    );
    assert!(harness.events.try_recv().is_err());
}

#[tokio::test]
async fn every_subscriber_sees_every_event() {
    let mut harness = TestHarness::new(Variant::Interface);
    let stream = harness.actor.events();

    harness.actor.connect(None, None).await.unwrap();
    harness.driver.inject_data(b"OK\r\n");

    assert_eq!(harness.take_events(2).await[1], PortEvent::Data(b"OK\r\n".to_vec()));
    let from_stream: Vec<PortEvent> = stream
        .take(2)
        .map(|item| item.unwrap())
        .collect()
        .await;
    assert_eq!(from_stream, vec![PortEvent::Open, PortEvent::Data(b"OK\r\n".to_vec())]);
}

#[tokio::test]
async fn connect_resolves_only_after_open() {
    let mut harness = TestHarness::new(Variant::Module);
    harness.driver.set_open_behavior(OpenBehavior::Deferred);

    let actor = harness.actor.clone();
    let pending = tokio::spawn(async move { actor.connect(None, None).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!pending.is_finished());

    assert!(harness.driver.complete_open());
    pending.await.unwrap().unwrap();
    assert_eq!(harness.next_event().await, PortEvent::Open);
}

#[tokio::test]
async fn connect_rejects_when_error_precedes_open() {
    let mut harness = TestHarness::new(Variant::Module);
    harness.driver.set_open_behavior(OpenBehavior::Deferred);

    let actor = harness.actor.clone();
    let pending = tokio::spawn(async move { actor.connect(None, None).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    harness.driver.fail_pending_open("Permission denied");

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, ServiceError::OpenFailed(ref m) if m == "Permission denied"));
    assert_eq!(harness.next_event().await, PortEvent::Error("Permission denied".into()));
}

#[tokio::test]
async fn connect_rejects_on_synchronous_open_failure() {
    let harness = TestHarness::new(Variant::Module);
    harness
        .driver
        .set_open_behavior(OpenBehavior::Fail("/dev/ttyS9".into()));

    let err = harness.actor.invoke("connect", json!(["/dev/ttyS9"])).await.unwrap_err();
    assert_eq!(err.to_string(), "Serial port not found: /dev/ttyS9");
    assert!(!harness.actor.service().is_connected());
}

#[tokio::test]
async fn is_open_tracks_driver_state_across_close() {
    let mut harness = TestHarness::new(Variant::Module);
    harness.actor.connect(None, None).await.unwrap();
    assert!(harness.actor.is_open().await.unwrap());

    harness.actor.close().await.unwrap();
    assert!(!harness.actor.is_open().await.unwrap());
    assert_eq!(harness.take_events(2).await, vec![PortEvent::Open, PortEvent::Close]);

    // The slot keeps the closed handle; a second close is the driver's call.
    let err = harness.actor.close().await.unwrap_err();
    assert!(matches!(err, ServiceError::Driver(_)));
}

#[tokio::test]
async fn pause_holds_data_until_resume() {
    let mut harness = TestHarness::new(Variant::Module);
    harness.actor.connect(None, None).await.unwrap();
    assert_eq!(harness.next_event().await, PortEvent::Open);

    harness.actor.pause().await.unwrap();
    assert!(harness.driver.is_paused());
    harness.driver.inject_data(b"held");
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(harness.events.try_recv().is_err());

    harness.actor.resume().await.unwrap();
    assert_eq!(harness.next_event().await, PortEvent::Data(b"held".to_vec()));
}

#[tokio::test]
async fn set_and_update_reach_the_driver() {
    let harness = TestHarness::new(Variant::Interface);
    harness.actor.invoke("open", Value::Null).await.unwrap();

    harness
        .actor
        .set(SetOptions {
            dtr: Some(true),
            brk: Some(false),
            ..Default::default()
        })
        .await
        .unwrap();
    harness.actor.invoke("update", json!([{"baudRate": 115200}])).await.unwrap();

    assert_eq!(harness.driver.lines().dtr, Some(true));
    assert_eq!(harness.driver.lines().brk, Some(false));
    assert_eq!(harness.driver.baud_rate(), Some(115_200));
}

#[tokio::test]
async fn write_accepts_text_and_bytes() {
    let harness = TestHarness::new(Variant::Module);
    harness.actor.connect(None, None).await.unwrap();

    assert_eq!(harness.actor.invoke("write", json!({"data": "AT"})).await.unwrap(), json!(2));
    assert_eq!(harness.actor.invoke("write", json!([[1, 2, 3]])).await.unwrap(), json!(3));
    assert_eq!(harness.driver.written(), vec![b"AT".to_vec(), vec![1, 2, 3]]);
}

#[tokio::test(start_paused = true)]
async fn idle_port_closes_after_timeout() {
    let mut harness = TestHarness::with_timeout(IdleTimeout::from_millis(100));
    harness.actor.invoke("open", Value::Null).await.unwrap();
    assert!(harness.actor.service().idle_timer_armed());

    tokio::time::sleep(Duration::from_millis(90)).await;
    assert!(harness.driver.port_is_open());

    assert!(harness.wait_closed(Duration::from_millis(60)).await);
    assert_eq!(harness.take_events(2).await, vec![PortEvent::Open, PortEvent::Close]);
}

#[tokio::test(start_paused = true)]
async fn infinite_timeout_never_closes() {
    let harness = TestHarness::with_timeout(IdleTimeout::Never);
    harness.actor.invoke("open", Value::Null).await.unwrap();
    assert!(!harness.actor.service().idle_timer_armed());

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert!(harness.driver.port_is_open());
}

#[tokio::test(start_paused = true)]
async fn module_variant_ignores_timeout() {
    let mut config = common::config_for(Variant::Module);
    config.adapter.timeout = IdleTimeout::from_millis(10);
    let harness = TestHarness::with_config(config);
    harness.actor.connect(None, None).await.unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(harness.driver.port_is_open());
}

#[tokio::test(start_paused = true)]
async fn idle_close_failure_is_not_surfaced() {
    let harness = TestHarness::with_timeout(IdleTimeout::from_millis(50));
    harness.actor.invoke("open", Value::Null).await.unwrap();
    harness.driver.fail_next("close", "EIO: device gone");

    tokio::time::sleep(Duration::from_millis(100)).await;
    // The failed close leaves the port open and nothing reaches the caller.
    assert!(harness.actor.is_open().await.unwrap());
    assert_eq!(harness.actor.invoke("ping", Value::Null).await.unwrap(), json!("pong"));
}
