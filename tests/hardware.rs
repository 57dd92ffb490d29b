//! Tests against a real serial device.
//!
//! Run with `--features hardware-tests` and `SUGO_SERIALPORT_ADAPTER_PATH`
//! pointing at a port whose TX is looped back to RX.
#![cfg(feature = "hardware-tests")]

use std::time::Duration;
use sugo_serialport::config::ConfigLoader;
use sugo_serialport::{PortEvent, SerialPortActor};

fn loopback_actor() -> Option<SerialPortActor> {
    let config = ConfigLoader::with_defaults().ok()?.into_config();
    if config.adapter.path.is_none() {
        eprintln!("SUGO_SERIALPORT_ADAPTER_PATH not set; skipping");
        return None;
    }
    Some(SerialPortActor::with_system_driver(&config))
}

#[tokio::test]
async fn list_sees_configured_port() {
    let Some(actor) = loopback_actor() else { return };
    let ports = actor.list().await.unwrap();
    let path = actor.service().connected_path();
    assert!(path.is_none());
    assert!(!ports.is_empty(), "no serial ports found");
}

#[tokio::test]
async fn loopback_write_comes_back_as_data() {
    let Some(actor) = loopback_actor() else { return };
    let mut events = actor.subscribe();

    actor.connect(None, None).await.unwrap();
    assert_eq!(events.recv().await.unwrap(), PortEvent::Open);

    actor.write("loopback\r\n").await.unwrap();
    actor.drain().await.unwrap();

    let mut received = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while received.len() < 10 && tokio::time::Instant::now() < deadline {
        if let Ok(Ok(PortEvent::Data(chunk))) =
            tokio::time::timeout(Duration::from_millis(200), events.recv()).await
        {
            received.extend(chunk);
        }
    }
    assert_eq!(received, b"loopback\r\n");

    actor.close().await.unwrap();
    assert!(!actor.is_open().await.unwrap());
}
