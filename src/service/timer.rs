//! Idle auto-close timer.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tokio::task::JoinHandle;

/// How long a port may sit without writes before it is closed.
///
/// Serialized as milliseconds, or as `"Infinity"` for `Never`. An unset
/// timeout means `Never`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TimeoutRepr", into = "TimeoutRepr")]
pub enum IdleTimeout {
    #[default]
    Never,
    After(Duration),
}

impl IdleTimeout {
    pub fn from_millis(ms: u64) -> Self {
        Self::After(Duration::from_millis(ms))
    }

    pub fn duration(&self) -> Option<Duration> {
        match self {
            Self::Never => None,
            Self::After(d) => Some(*d),
        }
    }
}

impl FromStr for IdleTimeout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("infinity") || s.eq_ignore_ascii_case("never") {
            return Ok(Self::Never);
        }
        s.parse::<u64>()
            .map(Self::from_millis)
            .map_err(|_| format!("invalid timeout '{s}': expected milliseconds or \"Infinity\""))
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum TimeoutRepr {
    Millis(u64),
    Float(f64),
    Word(String),
}

impl TryFrom<TimeoutRepr> for IdleTimeout {
    type Error = String;

    fn try_from(repr: TimeoutRepr) -> Result<Self, Self::Error> {
        match repr {
            TimeoutRepr::Millis(ms) => Ok(Self::from_millis(ms)),
            TimeoutRepr::Float(ms) if ms.is_infinite() && ms > 0.0 => Ok(Self::Never),
            TimeoutRepr::Float(ms) if ms.is_finite() && ms >= 0.0 => {
                Duration::try_from_secs_f64(ms / 1000.0)
                    .map(Self::After)
                    .map_err(|_| format!("invalid timeout {ms}"))
            }
            TimeoutRepr::Float(ms) => Err(format!("invalid timeout {ms}")),
            TimeoutRepr::Word(word) => word.parse(),
        }
    }
}

impl From<IdleTimeout> for TimeoutRepr {
    fn from(timeout: IdleTimeout) -> Self {
        match timeout {
            IdleTimeout::Never => TimeoutRepr::Word("Infinity".to_string()),
            IdleTimeout::After(d) => TimeoutRepr::Millis(d.as_millis() as u64),
        }
    }
}

/// A single-shot timer. Re-arming cancels the pending shot.
#[derive(Debug)]
pub struct IdleTimer {
    timeout: IdleTimeout,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl IdleTimer {
    pub fn new(timeout: IdleTimeout) -> Self {
        Self {
            timeout,
            pending: Mutex::new(None),
        }
    }

    pub fn timeout(&self) -> IdleTimeout {
        self.timeout
    }

    /// Run `on_idle` after the timeout unless re-armed or cancelled first.
    ///
    /// Returns `false` without scheduling anything when the timeout is `Never`.
    /// Must be called from within a tokio runtime.
    pub fn arm<F>(&self, on_idle: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Some(delay) = self.timeout.duration() else {
            return false;
        };
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_idle.await;
        });
        if let Some(previous) = self.pending.lock().replace(task) {
            previous.abort();
        }
        true
    }

    pub fn cancel(&self) {
        if let Some(pending) = self.pending.lock().take() {
            pending.abort();
        }
    }

    /// Whether a shot is scheduled and has not fired yet.
    pub fn is_armed(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for IdleTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
