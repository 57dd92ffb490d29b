//! Event relay from a driver's private channel onto the adapter's event hub.

use crate::port::{EventSource, PortEvent};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, trace};

/// Default number of events buffered per subscriber before it lags.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Stream of adapter events for one subscriber.
pub type EventStream = BroadcastStream<PortEvent>;

/// Outcome of a port open, settled by the first `open` or `error` event.
pub(crate) type OpenSignal = oneshot::Sender<Result<(), String>>;

/// The adapter's own event surface.
///
/// Every subscriber sees each event once, in the order the driver emitted it.
#[derive(Debug, Clone)]
pub struct EventHub {
    tx: broadcast::Sender<PortEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Returns how many subscribers received it.
    pub fn publish(&self, event: PortEvent) -> usize {
        // No receivers is not an error: nobody is listening yet.
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PortEvent> {
        self.tx.subscribe()
    }

    pub fn stream(&self) -> EventStream {
        BroadcastStream::new(self.tx.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

/// Forward every event from `source` to `hub` until the driver drops its sink.
///
/// `ready` is settled exactly once: `Ok` on the first `open`, `Err` on an
/// `error` that arrives before any `open`. Events are published before the
/// signal is settled, so a caller awaiting the open already sees it on the hub.
pub(crate) fn spawn_relay(mut source: EventSource, hub: EventHub, ready: OpenSignal) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ready = Some(ready);
        while let Some(event) = source.recv().await {
            let outcome = match &event {
                PortEvent::Open => Some(Ok(())),
                PortEvent::Error(message) => Some(Err(message.clone())),
                _ => None,
            };

            trace!(event = event.name(), "relaying port event");
            hub.publish(event);

            if let Some(outcome) = outcome {
                if let Some(signal) = ready.take() {
                    let _ = signal.send(outcome);
                }
            }
        }
        debug!("driver event channel closed");
    })
}
