//! Connection state machine.
//!
//! ```text
//! Connecting ──► Connected ──► Closed
//!      └───────────────────────▲
//! ```
//!
//! There is no way back from `Closed`; reconnecting means building a new
//! client.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport being established.
    Connecting,
    /// Reader and writer tasks running.
    Connected,
    /// Closed locally, by the peer, or by an error.
    Closed,
}

impl ConnectionState {
    fn to_u8(self) -> u8 {
        match self {
            Self::Connecting => 0,
            Self::Connected => 1,
            Self::Closed => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Connected,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Atomically updated [`ConnectionState`].
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state.to_u8()))
    }

    pub(crate) fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move forward to `state`. `Closed` is terminal.
    pub(crate) fn set(&self, state: ConnectionState) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != ConnectionState::Closed.to_u8()).then_some(state.to_u8())
            });
    }

    /// Transition to `Closed`. Returns `true` only for the caller that made
    /// the transition.
    pub(crate) fn close(&self) -> bool {
        self.0.swap(ConnectionState::Closed.to_u8(), Ordering::AcqRel)
            != ConnectionState::Closed.to_u8()
    }
}
