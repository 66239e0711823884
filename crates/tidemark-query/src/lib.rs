//! # Tidemark Query
//!
//! Read-side query engine for an event-sourced journal persisted in a
//! sorted-set store. Two query families — by persistence id and by tag —
//! each come in a **current** (finite snapshot) and a **live**
//! (follow-the-tail) variant, exposed by [`ReadJournal`]:
//!
//! 1. [`ReadJournal::current_events_by_persistence_id`]
//! 2. [`ReadJournal::events_by_persistence_id`]
//! 3. [`ReadJournal::current_events_by_tag`]
//! 4. [`ReadJournal::events_by_tag`]
//!
//! Every query returns an [`EnvelopeStream`]: a demand-driven, backpressured
//! async `Stream` of [`EventEnvelope`]s in strictly increasing offset order.
//! Live variants hold a change subscription and re-query whenever the journal
//! publishes a notification.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tidemark_query::{Offset, ReadJournal};
//! use tokio_stream::StreamExt;
//!
//! let journal = ReadJournal::with_defaults(store);
//!
//! let mut greens = journal.events_by_tag("green", Offset::NoOffset).await?;
//! while let Some(envelope) = greens.next().await {
//!     let envelope = envelope?;
//!     println!("{} #{}: {:?}", envelope.persistence_id, envelope.offset, envelope.payload);
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![cfg_attr(
    test,
    allow(
        clippy::items_after_statements,
        clippy::ignored_unit_patterns,
        clippy::unreadable_literal
    )
)]

/// Query configuration.
pub mod config;

/// Event envelopes and query offsets.
pub mod envelope;

/// Query error types.
pub mod error;

mod fetch;

/// The read journal facade.
pub mod journal;

/// The per-query source state machine.
pub mod source;

pub use config::{QueryConfig, DEFAULT_PAGE_SIZE};
pub use envelope::{EventEnvelope, Offset};
pub use error::QueryError;
pub use journal::ReadJournal;
pub use source::EnvelopeStream;
