//! Error types for the Switchboard gateway core.
//!
//! Only configuration and store plumbing surface as `Err` here. A fully
//! exhausted fallback chain is *not* an error type — it is a structured
//! result on the route response, so the boundary layer can present a
//! user-facing retry message. Cache and memory store failures are
//! absorbed at their component boundary: logged, then the request
//! proceeds without that feature.

use thiserror::Error;

/// Top-level error type for gateway operations.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration could not be parsed or is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// SQLite record-store error.
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Serialization or deserialization failure of a persisted record.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, GatewayError>;
