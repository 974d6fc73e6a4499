//! Stream lifecycle: connecting -> streaming -> backoff -> connecting, forever.
//!
//! The transition table is pure so the retry policy can be tested without a network.

use std::fmt;
use std::time::Duration;

/// Fixed delay before re-syncing and reopening a failed stream.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Re-sync conversations, then request a fresh stream.
    Connecting,
    /// Consuming messages.
    Streaming,
    /// Waiting out the retry delay.
    Backoff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    StreamOpened,
    StreamOpenFailed,
    StreamFailed,
    /// Streams are infinite; ending is a failure too.
    StreamEnded,
    BackoffElapsed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition from {from:?} on {event:?}")]
pub struct TransitionError {
    pub from: Phase,
    pub event: StreamEvent,
}

pub fn transition(current: Phase, event: StreamEvent) -> Result<Phase, TransitionError> {
    match (current, event) {
        (Phase::Connecting, StreamEvent::StreamOpened) => Ok(Phase::Streaming),
        (Phase::Connecting, StreamEvent::StreamOpenFailed) => Ok(Phase::Backoff),
        (Phase::Streaming, StreamEvent::StreamFailed) => Ok(Phase::Backoff),
        (Phase::Streaming, StreamEvent::StreamEnded) => Ok(Phase::Backoff),
        (Phase::Backoff, StreamEvent::BackoffElapsed) => Ok(Phase::Connecting),
        _ => Err(TransitionError {
            from: current,
            event,
        }),
    }
}

/// Retry policy for the message stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: DEFAULT_BACKOFF,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Connecting => "connecting",
            Phase::Streaming => "streaming",
            Phase::Backoff => "backoff",
        };
        f.write_str(s)
    }
}
