//! Tunnel client error types.

/// Errors that can occur in the tunnel client.
#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Registration error: {0}")]
    Registration(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Store error: {0}")]
    Store(#[from] crate::storage::StoreError),
}
