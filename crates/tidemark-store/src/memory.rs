//! In-memory store backend.
//!
//! [`MemoryStore`] implements [`EventStore`] over plain `BTreeMap`s and is the
//! backend the test suites run against. It also carries the minimal write
//! side the end-to-end scenarios need — [`append`](MemoryStore::append) and
//! [`delete_to`](MemoryStore::delete_to) — so a journal can be preloaded and
//! mutated without a real store. Appends persist first and publish second, so
//! a notification always refers to data a range read can already see.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use fxhash::FxHashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::codec::{JsonCodec, RecordCodec};
use crate::error::{CodecError, StoreError};
use crate::keys;
use crate::record::{EventRef, PersistentRecord};
use crate::store::{EventStore, NotificationListener};

/// In-memory sorted sets plus pub/sub, cheap to clone.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

struct Inner {
    codec: Arc<dyn RecordCodec>,
    /// Sorted sets: key → (score → value).
    sets: RwLock<FxHashMap<String, BTreeMap<u64, Bytes>>>,
    /// Pub/sub channels: name → live senders. Senders whose receiver is gone
    /// are pruned on the next publish.
    channels: RwLock<FxHashMap<String, Vec<mpsc::UnboundedSender<Bytes>>>>,
}

impl MemoryStore {
    /// Creates an empty store using the JSON codec.
    #[must_use]
    pub fn new() -> Self {
        Self::with_codec(Arc::new(JsonCodec))
    }

    /// Creates an empty store using a custom record codec.
    #[must_use]
    pub fn with_codec(codec: Arc<dyn RecordCodec>) -> Self {
        Self {
            inner: Arc::new(Inner {
                codec,
                sets: RwLock::new(FxHashMap::default()),
                channels: RwLock::new(FxHashMap::default()),
            }),
        }
    }

    /// Appends an event to one journal and returns its sequence number.
    ///
    /// The record is inserted at the next sequence number (starting at 1),
    /// an event reference is appended at the next dense index (starting at 0)
    /// of every tag's sorted set, and one notification per touched channel is
    /// published once everything is visible.
    ///
    /// # Errors
    ///
    /// Returns `CodecError` if the record cannot be encoded.
    pub fn append<I, S>(
        &self,
        persistence_id: &str,
        payload: impl Into<Bytes>,
        tags: I,
    ) -> Result<u64, CodecError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags: BTreeSet<String> = tags.into_iter().map(Into::into).collect();

        let mut tag_indices = Vec::with_capacity(tags.len());
        let sequence_nr = {
            let mut sets = self.inner.sets.write();

            let journal = sets.entry(keys::journal_key(persistence_id)).or_default();
            let sequence_nr = journal.last_key_value().map_or(0, |(seq, _)| *seq) + 1;
            let record = PersistentRecord::new(persistence_id, sequence_nr, payload.into())
                .with_tags(tags.iter().cloned());
            let encoded = self.inner.codec.encode(&record)?;
            journal.insert(sequence_nr, encoded);

            for tag in &tags {
                let set = sets.entry(keys::tag_key(tag)).or_default();
                let index = set.last_key_value().map_or(0, |(index, _)| *index + 1);
                let reference = EventRef::new(sequence_nr, persistence_id);
                set.insert(index, Bytes::from(reference.to_string()));
                tag_indices.push((tag.clone(), index));
            }

            sequence_nr
        };

        self.publish(&keys::journal_channel(persistence_id), sequence_nr);
        for (tag, index) in tag_indices {
            self.publish(&keys::tag_channel(&tag), index);
        }
        Ok(sequence_nr)
    }

    /// Tombstones every record of `persistence_id` with sequence number
    /// `<= to`. The rows stay in the sorted set so sequence numbers remain
    /// dense; queries filter them out.
    ///
    /// # Errors
    ///
    /// Returns `CodecError` if a stored record fails to round-trip.
    pub fn delete_to(&self, persistence_id: &str, to: u64) -> Result<(), CodecError> {
        let mut sets = self.inner.sets.write();
        let Some(journal) = sets.get_mut(&keys::journal_key(persistence_id)) else {
            return Ok(());
        };
        for (_, value) in journal.range_mut(..=to) {
            let mut record = self.inner.codec.decode(value)?;
            if !record.deleted {
                record.deleted = true;
                *value = self.inner.codec.encode(&record)?;
            }
        }
        Ok(())
    }

    /// Returns the highest sequence number of one journal, 0 when empty.
    #[must_use]
    pub fn highest_sequence_nr(&self, persistence_id: &str) -> u64 {
        self.inner
            .sets
            .read()
            .get(&keys::journal_key(persistence_id))
            .and_then(BTreeMap::last_key_value)
            .map_or(0, |(seq, _)| *seq)
    }

    fn publish(&self, channel: &str, index: u64) {
        let payload = Bytes::from(index.to_string());
        let mut channels = self.inner.channels.write();
        if let Some(senders) = channels.get_mut(channel) {
            senders.retain(|tx| tx.send(payload.clone()).is_ok());
            if senders.is_empty() {
                channels.remove(channel);
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn range(&self, key: &str, lo: u64, hi: u64) -> Result<Vec<Bytes>, StoreError> {
        if lo > hi {
            return Ok(Vec::new());
        }
        Ok(self
            .inner
            .sets
            .read()
            .get(key)
            .map(|set| set.range(lo..=hi).map(|(_, value)| value.clone()).collect())
            .unwrap_or_default())
    }

    async fn subscribe(&self, channel: &str) -> Result<NotificationListener, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .channels
            .write()
            .entry(channel.to_string())
            .or_default()
            .push(tx);
        Ok(NotificationListener::new(rx))
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sets = self.inner.sets.read();
        f.debug_struct("MemoryStore")
            .field("keys", &sets.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;

    const NO_TAGS: [&str; 0] = [];

    // ── Appends and sequence numbers ──

    #[test]
    fn test_append_assigns_dense_sequence_numbers() {
        let store = MemoryStore::new();
        assert_eq!(store.append("a", "one", NO_TAGS).unwrap(), 1);
        assert_eq!(store.append("a", "two", NO_TAGS).unwrap(), 2);
        assert_eq!(store.append("b", "one", NO_TAGS).unwrap(), 1);
        assert_eq!(store.highest_sequence_nr("a"), 2);
        assert_eq!(store.highest_sequence_nr("missing"), 0);
    }

    #[tokio::test]
    async fn test_append_writes_tag_references() {
        let store = MemoryStore::new();
        store.append("a", "a green apple", ["green"]).unwrap();
        store.append("b", "a green leaf", ["green"]).unwrap();

        let raw = store.range(&keys::tag_key("green"), 0, 10).await.unwrap();
        let refs: Vec<EventRef> = raw
            .iter()
            .map(|b| EventRef::from_bytes(b).unwrap())
            .collect();
        assert_eq!(refs, vec![EventRef::new(1, "a"), EventRef::new(1, "b")]);
    }

    // ── Range reads ──

    #[tokio::test]
    async fn test_range_is_ascending_and_closed() {
        let store = MemoryStore::new();
        for payload in ["one", "two", "three"] {
            store.append("a", payload, NO_TAGS).unwrap();
        }

        let raw = store.range(&keys::journal_key("a"), 2, 3).await.unwrap();
        let records: Vec<PersistentRecord> =
            raw.iter().map(|b| JsonCodec.decode(b).unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sequence_nr, 2);
        assert_eq!(records[1].sequence_nr, 3);
    }

    #[tokio::test]
    async fn test_range_empty_cases() {
        let store = MemoryStore::new();
        store.append("a", "one", NO_TAGS).unwrap();

        assert!(store.range("journal:missing", 0, 10).await.unwrap().is_empty());
        // Inverted interval.
        assert!(store.range(&keys::journal_key("a"), 5, 2).await.unwrap().is_empty());
        // Past the end.
        assert!(store.range(&keys::journal_key("a"), 2, 10).await.unwrap().is_empty());
    }

    // ── Deletion ──

    #[tokio::test]
    async fn test_delete_to_tombstones_in_place() {
        let store = MemoryStore::new();
        for payload in ["h-1", "h-2", "h-3"] {
            store.append("h", payload, NO_TAGS).unwrap();
        }
        store.delete_to("h", 2).unwrap();

        let raw = store.range(&keys::journal_key("h"), 1, 3).await.unwrap();
        let records: Vec<PersistentRecord> =
            raw.iter().map(|b| JsonCodec.decode(b).unwrap()).collect();
        // Rows stay; only the marker flips.
        assert_eq!(records.len(), 3);
        assert!(records[0].deleted);
        assert!(records[1].deleted);
        assert!(!records[2].deleted);
    }

    #[test]
    fn test_delete_to_unknown_journal_is_noop() {
        let store = MemoryStore::new();
        store.delete_to("missing", 10).unwrap();
    }

    // ── Pub/sub ──

    #[tokio::test]
    async fn test_append_publishes_after_persisting() {
        let store = MemoryStore::new();
        let mut journal_sub = store
            .subscribe(&keys::journal_channel("a"))
            .await
            .unwrap();
        let mut tag_sub = store.subscribe(&keys::tag_channel("green")).await.unwrap();

        store.append("a", "a green apple", ["green"]).unwrap();

        let seq = codec::decode_notification(&journal_sub.recv().await.unwrap()).unwrap();
        assert_eq!(seq, 1);
        let index = codec::decode_notification(&tag_sub.recv().await.unwrap()).unwrap();
        assert_eq!(index, 0);

        // The notified data is already visible.
        let raw = store.range(&keys::journal_key("a"), seq, seq).await.unwrap();
        assert_eq!(raw.len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_listener_stops_delivery() {
        let store = MemoryStore::new();
        let listener = store.subscribe(&keys::journal_channel("a")).await.unwrap();
        drop(listener);

        // Publishing prunes the dead sender instead of erroring.
        store.append("a", "one", NO_TAGS).unwrap();

        let mut fresh = store.subscribe(&keys::journal_channel("a")).await.unwrap();
        store.append("a", "two", NO_TAGS).unwrap();
        let seq = codec::decode_notification(&fresh.recv().await.unwrap()).unwrap();
        assert_eq!(seq, 2);
    }
}
