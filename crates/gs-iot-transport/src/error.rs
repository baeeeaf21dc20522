//! Transport error taxonomy.
//!
//! Every variant here promotes the adapter to the Error state and becomes
//! its status-detail message. Cleanup failures and publish outcomes are
//! deliberately absent — those are logged, never propagated.

use thiserror::Error;

/// Errors that stop a transport adapter.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Missing or invalid configuration property.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Certificate/key resolution failure.
    #[error("credential error: {0}")]
    Credential(String),

    /// Transport-level connect failure.
    #[error("connect error: {0}")]
    Connect(String),

    /// Topic subscription failure during setup.
    #[error("subscribe error: {0}")]
    Subscribe(String),
}

/// Convenience alias for transport results.
pub type TransportResult<T> = Result<T, TransportError>;
