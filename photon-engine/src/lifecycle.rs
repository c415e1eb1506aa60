//! Connection state machine shared by the transports.
//!
//! `Idle -> Connecting -> Connected -> Disconnecting -> Disconnected`, and a
//! disconnected engine may connect again. Requests read the state under a
//! read lock; transitions take the write lock and never hold it across I/O.

use std::fmt;

use parking_lot::RwLock;
use tracing::trace;

use crate::error::{EngineError, EngineResult};

/// Connection state of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Never connected.
    Idle,
    /// Connect in progress.
    Connecting,
    /// Ready for requests.
    Connected,
    /// Disconnect in progress.
    Disconnecting,
    /// Disconnected; may connect again.
    Disconnected,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
            Self::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// Lock-guarded [`EngineState`].
pub struct Lifecycle {
    state: RwLock<EngineState>,
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle").field("state", &self.state()).finish()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Start in [`EngineState::Idle`].
    pub fn new() -> Self {
        Self {
            state: RwLock::new(EngineState::Idle),
        }
    }

    /// Current state.
    pub fn state(&self) -> EngineState {
        *self.state.read()
    }

    /// Gate for requests: only a connected engine accepts them.
    pub fn ensure_connected(&self) -> EngineResult<()> {
        match *self.state.read() {
            EngineState::Connected => Ok(()),
            EngineState::Idle | EngineState::Connecting => Err(EngineError::NotConnected),
            EngineState::Disconnecting | EngineState::Disconnected => {
                Err(EngineError::AlreadyDisconnected)
            }
        }
    }

    /// Begin connecting.
    ///
    /// Returns the state to restore if the connect fails, or `None` when the
    /// engine is already connected and there is nothing to do.
    pub fn begin_connect(&self) -> EngineResult<Option<EngineState>> {
        let mut state = self.state.write();
        match *state {
            EngineState::Connected => Ok(None),
            previous @ (EngineState::Idle | EngineState::Disconnected) => {
                *state = EngineState::Connecting;
                trace!("state -> connecting");
                Ok(Some(previous))
            }
            other => Err(EngineError::config(format!("cannot connect while {}", other))),
        }
    }

    /// Finish connecting; a failed connect returns to the previous resting state.
    pub fn finish_connect(&self, success: bool, previous: EngineState) {
        let next = if success { EngineState::Connected } else { previous };
        *self.state.write() = next;
        trace!(state = %next, "connect finished");
    }

    /// Begin disconnecting.
    pub fn begin_disconnect(&self) -> EngineResult<()> {
        let mut state = self.state.write();
        match *state {
            EngineState::Connected => {
                *state = EngineState::Disconnecting;
                trace!("state -> disconnecting");
                Ok(())
            }
            EngineState::Idle | EngineState::Connecting => Err(EngineError::NotConnected),
            EngineState::Disconnecting | EngineState::Disconnected => {
                Err(EngineError::AlreadyDisconnected)
            }
        }
    }

    /// Finish disconnecting. The engine ends up disconnected even if shutdown failed.
    pub fn finish_disconnect(&self) {
        *self.state.write() = EngineState::Disconnected;
        trace!("state -> disconnected");
    }
}
