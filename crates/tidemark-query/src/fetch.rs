//! Page fetchers.
//!
//! [`PageFetcher`] is the seam the source state machine drives: one call per
//! range read, returning the decoded, filtered page plus how far the cursor
//! moves. The two implementations specialize it per query family:
//!
//! - [`ByIdFetcher`] — reads the per-identifier sorted set; values decode to
//!   full persistent records and the envelope offset is the sequence number.
//! - [`ByTagFetcher`] — reads the per-tag sorted set of event references and
//!   resolves each reference with an in-order point read against the journal;
//!   the envelope offset is the tag-local index.
//!
//! Filtering never stalls the cursor: deleted records, dangling references
//! and out-of-range rows are dropped from the page but still counted in its
//! advance, so the next page resumes strictly after the last examined index.

use std::sync::Arc;

use async_trait::async_trait;
use tidemark_store::{keys, EventRef, EventStore, RecordCodec};

use crate::envelope::EventEnvelope;
use crate::error::QueryError;

/// One applied range read.
pub(crate) struct Page {
    /// How far the cursor moves past the page start: one past the last
    /// examined index, filtered rows included. Zero means the read was empty.
    pub advance: u64,

    /// Envelopes that survived filtering, in ascending offset order.
    pub envelopes: Vec<EventEnvelope>,
}

/// Executes one page of a query.
#[async_trait]
pub(crate) trait PageFetcher: Send + Sync {
    /// Reads, decodes and filters the closed interval `[lo, hi]`.
    async fn fetch_page(&self, lo: u64, hi: u64) -> Result<Page, QueryError>;
}

/// Rejects a store that answers with more values than the window holds.
fn ensure_window(len: usize, lo: u64, hi: u64) -> Result<(), QueryError> {
    let window = (hi - lo).saturating_add(1);
    if len as u64 > window {
        return Err(QueryError::Protocol(format!(
            "store returned {len} values for a window of {window}"
        )));
    }
    Ok(())
}

/// Pages over one persistence id's journal.
pub(crate) struct ByIdFetcher {
    store: Arc<dyn EventStore>,
    codec: Arc<dyn RecordCodec>,
    key: String,
}

impl ByIdFetcher {
    pub(crate) fn new(
        store: Arc<dyn EventStore>,
        codec: Arc<dyn RecordCodec>,
        persistence_id: &str,
    ) -> Self {
        Self {
            store,
            codec,
            key: keys::journal_key(persistence_id),
        }
    }
}

#[async_trait]
impl PageFetcher for ByIdFetcher {
    async fn fetch_page(&self, lo: u64, hi: u64) -> Result<Page, QueryError> {
        let raw = self.store.range(&self.key, lo, hi).await?;
        ensure_window(raw.len(), lo, hi)?;

        let mut advance = raw.len() as u64;
        let mut envelopes = Vec::with_capacity(raw.len());
        for bytes in &raw {
            let record = self.codec.decode(bytes)?;
            // Resume one past the highest score we have seen. Scores are
            // contiguous from `lo` except on the first page of a from-0
            // query, where the journal starts at 1.
            advance = advance.max(record.sequence_nr.saturating_add(1).saturating_sub(lo));
            if record.deleted || record.sequence_nr < lo || record.sequence_nr > hi {
                continue;
            }
            envelopes.push(EventEnvelope::new(
                record.sequence_nr,
                record.persistence_id,
                record.sequence_nr,
                record.payload,
            ));
        }
        Ok(Page { advance, envelopes })
    }
}

/// Pages over one tag's event references.
pub(crate) struct ByTagFetcher {
    store: Arc<dyn EventStore>,
    codec: Arc<dyn RecordCodec>,
    key: String,
}

impl ByTagFetcher {
    pub(crate) fn new(
        store: Arc<dyn EventStore>,
        codec: Arc<dyn RecordCodec>,
        tag: &str,
    ) -> Self {
        Self {
            store,
            codec,
            key: keys::tag_key(tag),
        }
    }
}

#[async_trait]
impl PageFetcher for ByTagFetcher {
    async fn fetch_page(&self, lo: u64, hi: u64) -> Result<Page, QueryError> {
        let raw = self.store.range(&self.key, lo, hi).await?;
        ensure_window(raw.len(), lo, hi)?;

        let mut envelopes = Vec::with_capacity(raw.len());
        for (position, bytes) in raw.iter().enumerate() {
            let reference = EventRef::from_bytes(bytes)?;
            let tag_index = lo + position as u64;

            let journal_key = keys::journal_key(&reference.persistence_id);
            let row = self
                .store
                .range(&journal_key, reference.sequence_nr, reference.sequence_nr)
                .await?;
            ensure_window(row.len(), reference.sequence_nr, reference.sequence_nr)?;
            let Some(stored) = row.first() else {
                // The journal row is gone (cleaned store); the reference
                // dangles. Skip it, the index is still consumed.
                tracing::debug!(
                    persistence_id = %reference.persistence_id,
                    sequence_nr = reference.sequence_nr,
                    tag_index,
                    "skipping dangling tag reference"
                );
                continue;
            };
            let record = self.codec.decode(stored)?;
            if record.deleted {
                continue;
            }
            envelopes.push(EventEnvelope::new(
                tag_index,
                reference.persistence_id,
                reference.sequence_nr,
                record.payload,
            ));
        }
        Ok(Page {
            advance: raw.len() as u64,
            envelopes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidemark_store::{JsonCodec, MemoryStore};

    const NO_TAGS: [&str; 0] = [];

    fn fixtures() -> (MemoryStore, Arc<dyn EventStore>, Arc<dyn RecordCodec>) {
        let store = MemoryStore::new();
        let shared: Arc<dyn EventStore> = Arc::new(store.clone());
        (store, shared, Arc::new(JsonCodec))
    }

    // ── ByIdFetcher ──

    #[tokio::test]
    async fn test_by_id_page_in_order() {
        let (store, shared, codec) = fixtures();
        for payload in ["b-1", "b-2", "b-3"] {
            store.append("b", payload, NO_TAGS).unwrap();
        }

        let fetcher = ByIdFetcher::new(shared, codec, "b");
        let page = fetcher.fetch_page(1, 3).await.unwrap();

        assert_eq!(page.advance, 3);
        let offsets: Vec<u64> = page.envelopes.iter().map(|e| e.offset).collect();
        assert_eq!(offsets, vec![1, 2, 3]);
        assert_eq!(page.envelopes[0].payload, "b-1");
    }

    #[tokio::test]
    async fn test_by_id_advance_spans_low_start() {
        let (store, shared, codec) = fixtures();
        store.append("b", "b-1", NO_TAGS).unwrap();
        store.append("b", "b-2", NO_TAGS).unwrap();

        // A page starting at 0 examines up to sequence number 2, so the next
        // page must resume at 3, not at 2.
        let fetcher = ByIdFetcher::new(shared, codec, "b");
        let page = fetcher.fetch_page(0, 9).await.unwrap();
        assert_eq!(page.advance, 3);
        assert_eq!(page.envelopes.len(), 2);
    }

    #[tokio::test]
    async fn test_by_id_filters_deleted_but_advances() {
        let (store, shared, codec) = fixtures();
        for payload in ["h-1", "h-2", "h-3"] {
            store.append("h", payload, NO_TAGS).unwrap();
        }
        store.delete_to("h", 2).unwrap();

        let fetcher = ByIdFetcher::new(shared, codec, "h");
        let page = fetcher.fetch_page(1, 3).await.unwrap();

        assert_eq!(page.advance, 3);
        assert_eq!(page.envelopes.len(), 1);
        assert_eq!(page.envelopes[0].payload, "h-3");
    }

    #[tokio::test]
    async fn test_by_id_empty_page() {
        let (_, shared, codec) = fixtures();
        let fetcher = ByIdFetcher::new(shared, codec, "missing");
        let page = fetcher.fetch_page(1, 100).await.unwrap();
        assert_eq!(page.advance, 0);
        assert!(page.envelopes.is_empty());
    }

    #[tokio::test]
    async fn test_by_id_garbage_record_is_fatal() {
        let (store, shared, _) = fixtures();
        store.append("a", "one", NO_TAGS).unwrap();

        struct Garbage;
        impl RecordCodec for Garbage {
            fn encode(
                &self,
                _: &tidemark_store::PersistentRecord,
            ) -> Result<bytes::Bytes, tidemark_store::CodecError> {
                unimplemented!()
            }
            fn decode(
                &self,
                _: &[u8],
            ) -> Result<tidemark_store::PersistentRecord, tidemark_store::CodecError> {
                Err(tidemark_store::CodecError::MalformedRecord("boom".into()))
            }
        }

        let fetcher = ByIdFetcher::new(shared, Arc::new(Garbage), "a");
        assert!(matches!(
            fetcher.fetch_page(1, 10).await,
            Err(QueryError::Decode(_))
        ));
    }

    // ── ByTagFetcher ──

    #[tokio::test]
    async fn test_by_tag_resolves_references() {
        let (store, shared, codec) = fixtures();
        store.append("a", "hello", NO_TAGS).unwrap();
        store.append("a", "a green apple", ["green"]).unwrap();
        store.append("b", "a green leaf", ["green"]).unwrap();

        let fetcher = ByTagFetcher::new(shared, codec, "green");
        let page = fetcher.fetch_page(0, 99).await.unwrap();

        assert_eq!(page.advance, 2);
        assert_eq!(
            page.envelopes,
            vec![
                EventEnvelope::new(0, "a", 2, "a green apple"),
                EventEnvelope::new(1, "b", 1, "a green leaf"),
            ]
        );
    }

    #[tokio::test]
    async fn test_by_tag_offset_window() {
        let (store, shared, codec) = fixtures();
        for (pid, payload) in [("a", "a green apple"), ("a", "a green banana"), ("b", "a green leaf")] {
            store.append(pid, payload, ["green"]).unwrap();
        }

        let fetcher = ByTagFetcher::new(shared, codec, "green");
        let page = fetcher.fetch_page(2, 99).await.unwrap();

        assert_eq!(page.advance, 1);
        assert_eq!(page.envelopes, vec![EventEnvelope::new(2, "b", 1, "a green leaf")]);
    }

    #[tokio::test]
    async fn test_by_tag_filters_deleted_but_advances() {
        let (store, shared, codec) = fixtures();
        store.append("a", "a green apple", ["green"]).unwrap();
        store.append("b", "a green leaf", ["green"]).unwrap();
        store.delete_to("a", 1).unwrap();

        let fetcher = ByTagFetcher::new(shared, codec, "green");
        let page = fetcher.fetch_page(0, 99).await.unwrap();

        assert_eq!(page.advance, 2);
        assert_eq!(page.envelopes, vec![EventEnvelope::new(1, "b", 1, "a green leaf")]);
    }

    #[tokio::test]
    async fn test_by_tag_skips_dangling_reference() {
        let (_, shared, codec) = fixtures();

        // A tag set whose only reference points at a journal row that no
        // longer exists.
        struct Dangling(Arc<dyn EventStore>);
        #[async_trait]
        impl EventStore for Dangling {
            async fn range(
                &self,
                key: &str,
                lo: u64,
                hi: u64,
            ) -> Result<Vec<bytes::Bytes>, tidemark_store::StoreError> {
                if key.starts_with("tag:") {
                    Ok(vec![bytes::Bytes::from("9:ghost")])
                } else {
                    self.0.range(key, lo, hi).await
                }
            }
            async fn subscribe(
                &self,
                channel: &str,
            ) -> Result<tidemark_store::NotificationListener, tidemark_store::StoreError>
            {
                self.0.subscribe(channel).await
            }
        }

        let fetcher = ByTagFetcher::new(Arc::new(Dangling(shared)), codec, "green");
        let page = fetcher.fetch_page(0, 99).await.unwrap();
        // The index is consumed even though nothing was emitted.
        assert_eq!(page.advance, 1);
        assert!(page.envelopes.is_empty());
    }

    #[tokio::test]
    async fn test_by_tag_overfull_point_read_is_protocol_error() {
        let (store, shared, codec) = fixtures();
        store.append("a", "a green apple", ["green"]).unwrap();

        // A store that answers a point read with two rows.
        struct Overfull(Arc<dyn EventStore>);
        #[async_trait]
        impl EventStore for Overfull {
            async fn range(
                &self,
                key: &str,
                lo: u64,
                hi: u64,
            ) -> Result<Vec<bytes::Bytes>, tidemark_store::StoreError> {
                let mut rows = self.0.range(key, lo, hi).await?;
                if key.starts_with("journal:") {
                    rows.extend(rows.clone());
                }
                Ok(rows)
            }
            async fn subscribe(
                &self,
                channel: &str,
            ) -> Result<tidemark_store::NotificationListener, tidemark_store::StoreError>
            {
                self.0.subscribe(channel).await
            }
        }

        let fetcher = ByTagFetcher::new(Arc::new(Overfull(shared)), codec, "green");
        assert!(matches!(
            fetcher.fetch_page(0, 99).await,
            Err(QueryError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_by_tag_malformed_reference_is_fatal() {
        let (_, shared, codec) = fixtures();

        struct BadRefs(Arc<dyn EventStore>);
        #[async_trait]
        impl EventStore for BadRefs {
            async fn range(
                &self,
                key: &str,
                lo: u64,
                hi: u64,
            ) -> Result<Vec<bytes::Bytes>, tidemark_store::StoreError> {
                if key.starts_with("tag:") {
                    Ok(vec![bytes::Bytes::from("not-a-reference")])
                } else {
                    self.0.range(key, lo, hi).await
                }
            }
            async fn subscribe(
                &self,
                channel: &str,
            ) -> Result<tidemark_store::NotificationListener, tidemark_store::StoreError>
            {
                self.0.subscribe(channel).await
            }
        }

        let fetcher = ByTagFetcher::new(Arc::new(BadRefs(shared)), codec, "green");
        assert!(matches!(
            fetcher.fetch_page(0, 99).await,
            Err(QueryError::Decode(_))
        ));
    }

    // ── Window guard ──

    #[test]
    fn test_ensure_window() {
        assert!(ensure_window(3, 0, 2).is_ok());
        assert!(ensure_window(0, 5, 5).is_ok());
        assert!(ensure_window(2, 5, 5).is_err());
        // The unbounded window never overflows.
        assert!(ensure_window(usize::MAX, 0, u64::MAX).is_ok());
    }
}
