//! Cloud tunnel: the single bidirectional session to the control plane.
//!
//! Provides registration, the WebSocket lifecycle with authentication and
//! heartbeat, exponential-backoff reconnection, and command dispatch into
//! the fleet manager.

pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod registration;
pub mod state;

pub use client::TunnelClient;
pub use config::{ReconnectPolicy, TunnelConfig};
pub use error::TunnelError;
pub use handler::{Dispatch, SessionEvent, TunnelHandler};
pub use state::{TunnelState, TunnelStateHandle};
