//! Store gateway error types.
//!
//! Two error hierarchies cover the gateway:
//! - [`StoreError`]: failures talking to the backing key-value store
//! - [`CodecError`]: stored bytes that do not decode to what the schema says

use thiserror::Error;

/// Errors that can occur while talking to the backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to connect to the store.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A range read failed.
    #[error("range read failed: {0}")]
    ReadFailed(String),

    /// Opening a pub/sub subscription failed.
    #[error("subscribe failed: {0}")]
    SubscribeFailed(String),

    /// The store handle has been closed.
    #[error("store closed")]
    Closed,
}

/// Errors that occur while decoding stored values.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A stored value does not parse as a persistent record.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// A stored value does not parse as an event reference.
    #[error("malformed event reference: {0:?}")]
    MalformedEventRef(String),
}

impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        CodecError::MalformedRecord(e.to_string())
    }
}
