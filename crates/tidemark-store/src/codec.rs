//! Record serialization.
//!
//! The write side owns the production serializer; the gateway only needs the
//! deserializing half plus an in-repo default used by [`MemoryStore`] and the
//! tests. [`RecordCodec`] is the seam, [`JsonCodec`] the default format.
//!
//! [`MemoryStore`]: crate::memory::MemoryStore

use bytes::Bytes;

use crate::error::CodecError;
use crate::record::PersistentRecord;

/// Converts persistent records to and from their stored byte shape.
///
/// Implementations must be deterministic and total over the write side's
/// output: any bytes the write side persisted must decode.
pub trait RecordCodec: Send + Sync {
    /// Encodes a record into its stored byte shape.
    ///
    /// # Errors
    ///
    /// Returns `CodecError` if the record cannot be represented.
    fn encode(&self, record: &PersistentRecord) -> Result<Bytes, CodecError>;

    /// Decodes a stored value into a record.
    ///
    /// # Errors
    ///
    /// Returns `CodecError` if the bytes do not parse. Decode failures are
    /// fatal to the query that hit them.
    fn decode(&self, bytes: &[u8]) -> Result<PersistentRecord, CodecError>;
}

/// JSON record codec, the in-repo default.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl RecordCodec for JsonCodec {
    fn encode(&self, record: &PersistentRecord) -> Result<Bytes, CodecError> {
        Ok(Bytes::from(serde_json::to_vec(record)?))
    }

    fn decode(&self, bytes: &[u8]) -> Result<PersistentRecord, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Parses a change-notification payload (ASCII-decimal index of the latest
/// write).
///
/// Malformed payloads are logged and dropped rather than failing the stream;
/// the next notification or the next pull makes progress.
#[must_use]
pub fn decode_notification(payload: &[u8]) -> Option<u64> {
    let parsed = std::str::from_utf8(payload)
        .ok()
        .and_then(|s| s.parse::<u64>().ok());
    if parsed.is_none() {
        tracing::warn!(?payload, "ignoring unparseable change notification");
    }
    parsed
}
