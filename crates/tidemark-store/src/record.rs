//! Persistent records and event references.
//!
//! [`PersistentRecord`] is the unit the write side persists into the
//! per-identifier sorted set. [`EventRef`] is the value stored in per-tag
//! sorted sets, pointing back at a journal row; its wire shape is
//! `"<seqNr>:<persistenceId>"`.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// A single journal entry as produced by the write side.
///
/// The read side consumes this opaquely except for the identifier, sequence
/// number, deletion marker and tag set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentRecord {
    /// The entity this record belongs to.
    pub persistence_id: String,

    /// Position within the entity's journal; starts at 1 and increases by 1.
    pub sequence_nr: u64,

    /// Opaque event payload.
    pub payload: Bytes,

    /// Tombstone marker. Deleted records stay in the sorted set so that
    /// sequence numbers remain dense, but are never emitted by queries.
    #[serde(default)]
    pub deleted: bool,

    /// Tags assigned at write time.
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl PersistentRecord {
    /// Creates an untagged, live record.
    #[must_use]
    pub fn new(
        persistence_id: impl Into<String>,
        sequence_nr: u64,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            persistence_id: persistence_id.into(),
            sequence_nr,
            payload: payload.into(),
            deleted: false,
            tags: BTreeSet::new(),
        }
    }

    /// Adds tags to the record.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

/// A pointer from a per-tag sorted set back at a journal row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventRef {
    /// Sequence number of the referenced record.
    pub sequence_nr: u64,

    /// Persistence id of the referenced record.
    pub persistence_id: String,
}

impl EventRef {
    /// Creates a new event reference.
    #[must_use]
    pub fn new(sequence_nr: u64, persistence_id: impl Into<String>) -> Self {
        Self {
            sequence_nr,
            persistence_id: persistence_id.into(),
        }
    }

    /// Parses the stored wire shape.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::MalformedEventRef` when the bytes are not
    /// `"<seqNr>:<persistenceId>"` with an ASCII-decimal sequence number and
    /// a non-empty identifier.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| CodecError::MalformedEventRef(format!("{bytes:?}")))?;
        text.parse()
    }
}

impl FromStr for EventRef {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || CodecError::MalformedEventRef(s.to_string());
        let (seq, persistence_id) = s.split_once(':').ok_or_else(malformed)?;
        if persistence_id.is_empty() || seq.is_empty() || !seq.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(malformed());
        }
        let sequence_nr = seq.parse().map_err(|_| malformed())?;
        Ok(Self {
            sequence_nr,
            persistence_id: persistence_id.to_string(),
        })
    }
}

impl fmt::Display for EventRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.sequence_nr, self.persistence_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── PersistentRecord ──

    #[test]
    fn test_record_builder() {
        let record = PersistentRecord::new("a", 3, "hello").with_tags(["green", "blue"]);
        assert_eq!(record.persistence_id, "a");
        assert_eq!(record.sequence_nr, 3);
        assert_eq!(record.payload, Bytes::from("hello"));
        assert!(!record.deleted);
        assert!(record.tags.contains("green"));
        assert!(record.tags.contains("blue"));
    }

    // ── EventRef round trip ──

    #[test]
    fn test_event_ref_display_parse() {
        let reference = EventRef::new(42, "user-7");
        let text = reference.to_string();
        assert_eq!(text, "42:user-7");
        assert_eq!(text.parse::<EventRef>().unwrap(), reference);
    }

    #[test]
    fn test_event_ref_id_may_contain_colons() {
        // Only the first colon separates; identifiers keep the rest.
        let reference: EventRef = "7:ns:entity".parse().unwrap();
        assert_eq!(reference.sequence_nr, 7);
        assert_eq!(reference.persistence_id, "ns:entity");
    }

    // ── Malformed shapes ──

    #[test]
    fn test_event_ref_rejects_bad_shapes() {
        for bad in ["", "42", ":pid", "42:", "-1:pid", "4x2:pid", "9999999999999999999999:p"] {
            assert!(
                bad.parse::<EventRef>().is_err(),
                "expected {bad:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_event_ref_rejects_non_utf8() {
        assert!(EventRef::from_bytes(&[0xff, 0xfe, b':', b'x']).is_err());
    }
}
