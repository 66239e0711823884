//! # Tidemark Store
//!
//! Store gateway for the tidemark query engine. Wraps the two capabilities
//! the read side needs from the backing key-value store — paged range reads
//! over sorted sets and pub/sub subscriptions — plus the codecs that turn
//! stored bytes back into persistent records and event references.
//!
//! ## Schema
//!
//! ```text
//! journal:<pid>          sorted set   score = sequenceNr, value = record bytes
//! tag:<tag>              sorted set   score = tag index,   value = "<seqNr>:<pid>"
//! channel:journal:<pid>  pub/sub      payload = ASCII sequenceNr of latest write
//! channel:tag:<tag>      pub/sub      payload = ASCII tag index of latest write
//! ```
//!
//! ## Backends
//!
//! - [`MemoryStore`] — always available; drives the test suites and carries
//!   the minimal write side they need.
//! - `RedisStore` — behind the `redis-store` feature.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Record serialization and notification payload parsing.
pub mod codec;

/// Store and codec error types.
pub mod error;

/// Key and channel naming.
pub mod keys;

/// In-memory backend.
pub mod memory;

/// Persistent records and event references.
pub mod record;

/// The `EventStore` trait and subscription listener.
pub mod store;

/// Redis backend.
#[cfg(feature = "redis-store")]
pub mod redis;

pub use codec::{decode_notification, JsonCodec, RecordCodec};
pub use error::{CodecError, StoreError};
pub use memory::MemoryStore;
pub use record::{EventRef, PersistentRecord};
pub use store::{EventStore, NotificationListener};

#[cfg(feature = "redis-store")]
pub use crate::redis::RedisStore;
