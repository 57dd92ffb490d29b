//! Newline-delimited JSON pipe over stdin/stdout.
//!
//! Each input line is a request `{"id", "method", "params"}`. Requests are
//! handled in arrival order; each produces exactly one response line,
//! `{"id", "result"}` or `{"id", "error": {"type", "message"}}`. Port events
//! are written as they happen, `{"event", "payload", "timestamp"}`.
//!
//! The method `$spec` returns the adapter's capability descriptor.

use crate::actor::SerialPortActor;
use crate::error::{AppError, AppResult};
use crate::port::PortEvent;
use crate::service::EventStream;
use chrono::Utc;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, info, warn};

/// Pseudo-method returning the `$spec` descriptor.
pub const SPEC_METHOD: &str = "$spec";

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

/// Serve `actor` over stdin/stdout until stdin closes.
pub async fn run_stdio_interface(actor: SerialPortActor) -> AppResult<()> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    run(actor, stdin, tokio::io::stdout()).await
}

/// Serve `actor` over any line reader and writer.
pub async fn run<R, W>(actor: SerialPortActor, input: R, output: W) -> AppResult<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (frames, frames_rx) = mpsc::unbounded_channel::<Value>();
    let writer = tokio::spawn(write_frames(frames_rx, output));
    // Subscribe before reading any request so no event is missed.
    let forwarder = tokio::spawn(forward_events(actor.events(), frames.clone()));
    info!(actor = %actor.id(), variant = %actor.variant(), "stdio pipe started");

    let mut lines = input.lines();
    let result = loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break Ok(()),
            Err(e) => break Err(AppError::from(e)),
        };
        if line.trim().is_empty() {
            continue;
        }
        if frames.send(handle_line(&actor, &line).await).is_err() {
            // Writer is gone; nothing more can be reported.
            break Ok(());
        }
    };

    forwarder.abort();
    drop(frames);
    match writer.await {
        Ok(written) => written?,
        Err(e) => warn!(error = %e, "stdio writer task failed"),
    }
    info!("stdio pipe closed");
    result
}

async fn handle_line(actor: &SerialPortActor, line: &str) -> Value {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => return error_frame(Value::Null, &AppError::from(e)),
    };
    let id = value.get("id").cloned().unwrap_or(Value::Null);
    let request = match parse_request(value) {
        Ok(request) => request,
        Err(e) => return error_frame(id, &e),
    };
    debug!(id = %request.id, method = %request.method, "request");

    if request.method == SPEC_METHOD {
        return match serde_json::to_value(actor.spec()) {
            Ok(spec) => json!({ "id": request.id, "result": spec }),
            Err(e) => error_frame(request.id, &AppError::from(e)),
        };
    }

    match actor.invoke(&request.method, request.params).await {
        Ok(result) => json!({ "id": request.id, "result": result }),
        Err(e) => {
            debug!(method = %request.method, error = %e, "request failed");
            error_frame(request.id, &AppError::from(e))
        }
    }
}

fn parse_request(value: Value) -> AppResult<Request> {
    let Some(object) = value.as_object() else {
        return Err(AppError::InvalidPayload("request must be a JSON object".into()));
    };
    match object.get("method") {
        Some(Value::String(_)) => {}
        Some(other) => {
            return Err(AppError::InvalidPayload(format!("method must be a string, got {other}")));
        }
        None => return Err(AppError::InvalidPayload("request has no method".into())),
    }
    Ok(serde_json::from_value(value)?)
}

fn error_frame(id: Value, err: &AppError) -> Value {
    json!({ "id": id, "error": err.to_json() })
}

/// Render a port event as an output frame.
pub fn event_frame(event: &PortEvent) -> Value {
    let mut frame = serde_json::to_value(event).unwrap_or_else(|_| json!({ "event": event.name() }));
    frame["timestamp"] = Value::String(Utc::now().to_rfc3339());
    frame
}

async fn forward_events(mut events: EventStream, frames: mpsc::UnboundedSender<Value>) {
    while let Some(item) = events.next().await {
        let frame = match item {
            Ok(event) => event_frame(&event),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(skipped, "event subscriber lagged, events dropped");
                continue;
            }
        };
        if frames.send(frame).is_err() {
            break;
        }
    }
}

async fn write_frames<W>(mut frames: mpsc::UnboundedReceiver<Value>, mut output: W) -> AppResult<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = frames.recv().await {
        let mut line = serde_json::to_string(&frame)?;
        line.push('\n');
        output.write_all(line.as_bytes()).await?;
        output.flush().await?;
    }
    Ok(())
}
