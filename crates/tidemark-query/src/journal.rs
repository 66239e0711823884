//! The read journal facade.
//!
//! [`ReadJournal`] wires a store, a record codec and a [`QueryConfig`] into
//! the four query operations. Current variants return their stream directly;
//! live variants are async because the change subscription must be
//! established before the first read — otherwise a write racing the query
//! start could slip between the snapshot and the subscription.

use std::sync::Arc;

use tidemark_store::{keys, EventStore, JsonCodec, RecordCodec};

use crate::config::QueryConfig;
use crate::envelope::Offset;
use crate::error::QueryError;
use crate::fetch::{ByIdFetcher, ByTagFetcher};
use crate::source::EnvelopeStream;

/// Entry point for read-side queries against one journal store.
#[derive(Clone)]
pub struct ReadJournal {
    store: Arc<dyn EventStore>,
    codec: Arc<dyn RecordCodec>,
    config: QueryConfig,
}

impl ReadJournal {
    /// Creates a read journal over `store` with an explicit codec and config.
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>, codec: Arc<dyn RecordCodec>, config: QueryConfig) -> Self {
        Self {
            store,
            codec,
            config,
        }
    }

    /// Creates a read journal with the JSON codec and default configuration.
    #[must_use]
    pub fn with_defaults(store: Arc<dyn EventStore>) -> Self {
        Self::new(store, Arc::new(JsonCodec), QueryConfig::default())
    }

    /// Returns the configuration queries run with.
    #[must_use]
    pub fn config(&self) -> QueryConfig {
        self.config
    }

    /// Finite query over one journal: every event with sequence number in
    /// `[from, to]` (both inclusive) that exists when the stream exhausts the
    /// store, in sequence order. `from = 0` is equivalent to `from = 1`;
    /// `to = 0` or `from > to` yield an immediately completed empty stream.
    #[must_use]
    pub fn current_events_by_persistence_id(
        &self,
        persistence_id: &str,
        from: u64,
        to: u64,
    ) -> EnvelopeStream {
        let fetcher = self.by_id_fetcher(persistence_id);
        EnvelopeStream::new(fetcher, None, false, from.max(1), to, self.config.max())
    }

    /// Live variant of
    /// [`current_events_by_persistence_id`](Self::current_events_by_persistence_id):
    /// once the store is exhausted the stream follows new writes instead of
    /// completing. With an unbounded `to` it only ends on drop or fatal
    /// error; with a finite `to` it completes once the cursor passes it.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Store` if the change subscription cannot be
    /// established.
    pub async fn events_by_persistence_id(
        &self,
        persistence_id: &str,
        from: u64,
        to: u64,
    ) -> Result<EnvelopeStream, QueryError> {
        let listener = self
            .store
            .subscribe(&keys::journal_channel(persistence_id))
            .await?;
        let fetcher = self.by_id_fetcher(persistence_id);
        Ok(EnvelopeStream::new(
            fetcher,
            Some(listener),
            true,
            from.max(1),
            to,
            self.config.max(),
        ))
    }

    /// Finite query over one tag: every tagged event with tag index at or
    /// after `offset` that exists when the stream exhausts the store, in tag
    /// order.
    #[must_use]
    pub fn current_events_by_tag(&self, tag: &str, offset: Offset) -> EnvelopeStream {
        let fetcher = self.by_tag_fetcher(tag);
        EnvelopeStream::new(
            fetcher,
            None,
            false,
            offset.starting_index(),
            u64::MAX,
            self.config.max(),
        )
    }

    /// Live variant of [`current_events_by_tag`](Self::current_events_by_tag):
    /// follows new tagged writes; only ends on drop or fatal error.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Store` if the change subscription cannot be
    /// established.
    pub async fn events_by_tag(
        &self,
        tag: &str,
        offset: Offset,
    ) -> Result<EnvelopeStream, QueryError> {
        let listener = self.store.subscribe(&keys::tag_channel(tag)).await?;
        let fetcher = self.by_tag_fetcher(tag);
        Ok(EnvelopeStream::new(
            fetcher,
            Some(listener),
            true,
            offset.starting_index(),
            u64::MAX,
            self.config.max(),
        ))
    }

    fn by_id_fetcher(&self, persistence_id: &str) -> Arc<ByIdFetcher> {
        Arc::new(ByIdFetcher::new(
            Arc::clone(&self.store),
            Arc::clone(&self.codec),
            persistence_id,
        ))
    }

    fn by_tag_fetcher(&self, tag: &str) -> Arc<ByTagFetcher> {
        Arc::new(ByTagFetcher::new(
            Arc::clone(&self.store),
            Arc::clone(&self.codec),
            tag,
        ))
    }
}

impl std::fmt::Debug for ReadJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadJournal")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
