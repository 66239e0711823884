//! # Tidemark
//!
//! Read-side query engine for an event-sourced journal backed by a key-value
//! store with sorted sets and pub/sub.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use tidemark::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryStore::new());
//!     store.append("a", "a green apple", ["green"])?;
//!
//!     let journal = ReadJournal::with_defaults(store);
//!     let mut greens = journal.current_events_by_tag("green", Offset::NoOffset);
//!     while let Some(envelope) = greens.next().await {
//!         println!("{:?}", envelope?);
//!     }
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export the query engine surface
pub use tidemark_query::*;

// Re-export the store gateway
pub use tidemark_store::{
    decode_notification, CodecError, EventRef, EventStore, JsonCodec, MemoryStore,
    NotificationListener, PersistentRecord, RecordCodec, StoreError,
};

/// Key and channel naming.
pub use tidemark_store::keys;

#[cfg(feature = "redis-store")]
pub use tidemark_store::RedisStore;

/// Commonly used types and traits.
///
/// ```rust,ignore
/// use tidemark::prelude::*;
/// ```
pub mod prelude {
    // Queries
    pub use tidemark_query::{
        EnvelopeStream, EventEnvelope, Offset, QueryConfig, QueryError, ReadJournal,
    };

    // Store gateway
    pub use tidemark_store::{EventStore, JsonCodec, MemoryStore, PersistentRecord, RecordCodec};

    #[cfg(feature = "redis-store")]
    pub use tidemark_store::RedisStore;

    // Standard library re-exports for convenience
    pub use std::sync::Arc;
}
