//! Query error types.

use thiserror::Error;
use tidemark_store::{CodecError, StoreError};

/// Fatal errors a query stream can terminate with.
///
/// Every variant fails the stream: the error is yielded once and the stream
/// ends. Notification payloads that fail to parse are not errors — they are
/// logged and dropped at the gateway. Losing the notification channel costs
/// liveness, not correctness, and is likewise not represented here.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A stored value did not decode to a record or event reference.
    #[error("decode error: {0}")]
    Decode(#[from] CodecError),

    /// The backing store failed a read.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The store answered outside its contract; indicates a bug.
    #[error("protocol violation: {0}")]
    Protocol(String),
}
