//! Tunnel state machine.
//!
//! The tunnel moves through a fixed lifecycle: register once, open the
//! socket, authenticate with `hub_hello`/`hub_welcome`, then operate until
//! the connection drops. Reconnects back off exponentially; exhausting the
//! attempt budget parks the tunnel in FAILED until the reset timer fires.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// Tunnel lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TunnelState {
    /// Link down, binding absent, or tunnel disabled.
    #[default]
    Offline,
    /// One-time hub registration API call in flight.
    Registering,
    /// WebSocket connection attempt in flight.
    Connecting,
    /// Socket open, `hub_hello` sent, waiting for `hub_welcome`.
    Authenticating,
    /// Authenticated and operational.
    Connected,
    /// Connection lost, waiting out the backoff delay.
    Reconnecting,
    /// Retry budget exhausted; auto-resets after five minutes.
    Failed,
}

impl TunnelState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Offline => "OFFLINE",
            Self::Registering => "REGISTERING",
            Self::Connecting => "CONNECTING",
            Self::Authenticating => "AUTHENTICATING",
            Self::Connected => "CONNECTED",
            Self::Reconnecting => "RECONNECTING",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for TunnelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared, observable tunnel state. Clones observe the same machine.
#[derive(Clone)]
pub struct TunnelStateHandle {
    tx: Arc<watch::Sender<TunnelState>>,
}

impl Default for TunnelStateHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl TunnelStateHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(TunnelState::Offline);
        Self { tx: Arc::new(tx) }
    }

    pub fn get(&self) -> TunnelState {
        *self.tx.borrow()
    }

    /// Transition, logging the edge. No-op when the state is unchanged.
    pub fn set(&self, next: TunnelState) {
        let prev = self.get();
        if prev != next {
            info!(from = %prev, to = %next, "Tunnel state");
            let _ = self.tx.send(next);
        }
    }

    /// Watch for transitions (used by tests and the status surface).
    pub fn subscribe(&self) -> watch::Receiver<TunnelState> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_are_observable() {
        let handle = TunnelStateHandle::new();
        assert_eq!(handle.get(), TunnelState::Offline);
        let rx = handle.subscribe();
        handle.set(TunnelState::Connecting);
        assert_eq!(handle.get(), TunnelState::Connecting);
        assert_eq!(*rx.borrow(), TunnelState::Connecting);
    }

    #[test]
    fn state_strings() {
        assert_eq!(TunnelState::Authenticating.as_str(), "AUTHENTICATING");
        assert_eq!(TunnelState::Failed.as_str(), "FAILED");
    }
}
