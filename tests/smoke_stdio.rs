//! Basic smoke tests for the binary: `spec` output and the `serve` pipe.
use serde_json::Value;
use std::io::{BufRead, BufReader, Write};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

fn binary() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_sugo-serialport"));
    command
        .env_remove("SUGO_SERIALPORT_CONFIG")
        .env("RUST_LOG", "off")
        .current_dir(env!("CARGO_TARGET_TMPDIR"));
    command
}

#[test]
fn spec_command_prints_descriptor() {
    let output = binary()
        .args(["spec", "--variant", "interface"])
        .output()
        .expect("failed to run binary");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let spec: Value = serde_json::from_slice(&output.stdout).expect("spec is JSON");
    assert_eq!(spec["name"], "sugo-serialport");
    assert!(spec["methods"]["open"].is_object());
    assert!(spec["methods"].get("connect").is_none());
}

#[test]
fn serve_answers_ping_and_reports_not_connected() {
    let mut child = binary()
        .args(["serve", "--variant", "module"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to start binary");

    let stdout = child.stdout.take().expect("stdout available");
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in BufReader::new(stdout).lines().map_while(Result::ok) {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    {
        let stdin = child.stdin.as_mut().expect("stdin available");
        stdin
            .write_all(b"{\"id\":1,\"method\":\"ping\",\"params\":{\"pong\":\"hello\"}}\n")
            .unwrap();
        stdin.write_all(b"{\"id\":2,\"method\":\"isOpen\"}\n").unwrap();
        stdin.flush().ok();
    }

    let mut frames = Vec::new();
    while frames.len() < 2 {
        match rx.recv_timeout(Duration::from_secs(5)) {
            Ok(line) => frames.push(serde_json::from_str::<Value>(&line).expect("frame is JSON")),
            Err(_) => break,
        }
    }

    // Closing stdin ends the pipe.
    drop(child.stdin.take());
    let status = child.wait().expect("binary exits");

    assert_eq!(frames.len(), 2, "frames: {frames:?}");
    assert_eq!(frames[0]["id"], 1);
    assert_eq!(frames[0]["result"], "hello");
    assert_eq!(frames[1]["error"]["type"], "NotConnected");
    assert!(status.success());
}
