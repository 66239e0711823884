//! Event envelopes and query offsets.

use bytes::Bytes;

/// Starting offset for a by-tag query.
///
/// Offsets are inclusive: `Sequence(2)` yields the envelope at tag index 2
/// and onward, and `NoOffset` is equivalent to `Sequence(0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Offset {
    /// Start from the beginning of the tag sequence.
    #[default]
    NoOffset,

    /// Start from this tag-local index, inclusive.
    Sequence(u64),
}

impl Offset {
    /// The first index the query will examine.
    #[must_use]
    pub(crate) fn starting_index(self) -> u64 {
        match self {
            Offset::NoOffset => 0,
            Offset::Sequence(index) => index,
        }
    }
}

/// The element emitted downstream by every query.
///
/// `offset` is query-local: the sequence number for by-id queries, the
/// tag-local index for by-tag queries. Within one query it is strictly
/// increasing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Query-local offset of this envelope.
    pub offset: u64,

    /// Persistence id of the underlying record.
    pub persistence_id: String,

    /// Sequence number of the underlying record.
    pub sequence_nr: u64,

    /// Event payload.
    pub payload: Bytes,
}

impl EventEnvelope {
    /// Creates a new envelope.
    #[must_use]
    pub fn new(
        offset: u64,
        persistence_id: impl Into<String>,
        sequence_nr: u64,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            offset,
            persistence_id: persistence_id.into(),
            sequence_nr,
            payload: payload.into(),
        }
    }
}
