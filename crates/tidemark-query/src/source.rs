//! The per-query source state machine.
//!
//! [`EnvelopeStream`] fuses a small finite state machine with a cooperative
//! async `Stream`. Everything the machine reacts to is funneled through
//! `poll_next`, so all state lives behind a single writer:
//!
//! - downstream demand is the poll itself;
//! - the one in-flight range read is an owned future stored in the state and
//!   polled here;
//! - change notifications are drained from the subscription channel at the
//!   top of every poll;
//! - cancellation is dropping the stream, which releases the subscription
//!   and abandons the in-flight read.
//!
//! # States
//!
//! ```text
//!            pull, buffer empty
//!   Idle ──────────────────────────▶ Querying ──────▶ NotifiedWhenQuerying
//!    ▲                                │    ▲  notification       │
//!    │  page applied                  │    │                     │ empty page:
//!    ◀─────────────────────────────────    └─────────────────────┘ requery
//!    │                                │
//!    │         notification           │ empty page, live
//!    └──────── WaitingForNotification ◀
//! ```
//!
//! A current query completes on its first empty page (or once the cursor
//! passes `to`); a live query parks instead and re-queries when notified. A
//! notification racing an in-flight read flips `Querying` into
//! `NotifiedWhenQuerying`, which forces one more read even if the in-flight
//! one comes back empty — that read may have missed the event the
//! notification announced. Any number of notifications collapse into that
//! single obligation.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::Stream;
use tidemark_store::{decode_notification, NotificationListener};

use crate::envelope::EventEnvelope;
use crate::error::QueryError;
use crate::fetch::{Page, PageFetcher};

type PageFuture = BoxFuture<'static, Result<Page, QueryError>>;

enum SourceState {
    /// No read in flight; the next pull serves the buffer or starts one.
    Idle,
    /// One range read in flight.
    Querying(PageFuture),
    /// A notification arrived while the read was in flight; its result may
    /// be stale, so one more read follows regardless of what it returns.
    NotifiedWhenQuerying(PageFuture),
    /// Live query out of data, parked until a notification arrives.
    WaitingForNotification,
    /// Completed or failed; every further poll returns `None`.
    Done,
}

impl SourceState {
    fn name(&self) -> &'static str {
        match self {
            SourceState::Idle => "idle",
            SourceState::Querying(_) => "querying",
            SourceState::NotifiedWhenQuerying(_) => "notified-when-querying",
            SourceState::WaitingForNotification => "waiting-for-notification",
            SourceState::Done => "done",
        }
    }
}

/// A demand-driven stream of event envelopes, one query's worth.
///
/// Yields `Ok` envelopes in strictly increasing offset order, or a single
/// fatal `Err` after which the stream ends. Current queries complete on
/// exhaustion; live queries only end on cancellation (drop) or error.
///
/// All fields are `Unpin`, so the stream works directly with `tokio::select!`
/// and the usual combinators without explicit pinning.
pub struct EnvelopeStream {
    fetcher: Arc<dyn PageFetcher>,
    /// Subscription for live queries; `None` for current queries, and reset
    /// to `None` if the publishing side goes away (liveness loss).
    listener: Option<NotificationListener>,
    live: bool,
    /// Page size; also the practical buffer bound.
    max: u64,
    /// Inclusive upper bound on the queried index.
    to: u64,
    /// Next index to examine. Never rewound.
    current_sequence_nr: u64,
    buffer: VecDeque<EventEnvelope>,
    state: SourceState,
}

impl EnvelopeStream {
    pub(crate) fn new(
        fetcher: Arc<dyn PageFetcher>,
        listener: Option<NotificationListener>,
        live: bool,
        from: u64,
        to: u64,
        max: u64,
    ) -> Self {
        debug_assert!(live || listener.is_none());
        Self {
            fetcher,
            listener,
            live,
            max,
            to,
            current_sequence_nr: from,
            buffer: VecDeque::new(),
            state: SourceState::Idle,
        }
    }

    /// Returns `true` for live queries.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Drains pending notifications, applying at most one state change:
    /// an in-flight read becomes stale-suspect, a parked machine re-queries.
    fn poll_notifications(&mut self, cx: &mut Context<'_>) {
        loop {
            let Some(listener) = self.listener.as_mut() else {
                return;
            };
            match listener.poll_recv(cx) {
                Poll::Ready(Some(payload)) => {
                    if let Some(index) = decode_notification(&payload) {
                        tracing::trace!(index, state = self.state.name(), "change notification");
                        self.on_notification();
                    }
                }
                Poll::Ready(None) => {
                    // Publisher gone. Liveness loss, not failure: the query
                    // parks until cancelled.
                    tracing::debug!("notification channel closed, live query loses liveness");
                    self.listener = None;
                    return;
                }
                Poll::Pending => return,
            }
        }
    }

    fn on_notification(&mut self) {
        self.state = match std::mem::replace(&mut self.state, SourceState::Idle) {
            SourceState::Querying(read) => SourceState::NotifiedWhenQuerying(read),
            // Wake a parked machine; the Idle path below issues the read.
            SourceState::WaitingForNotification => SourceState::Idle,
            other => other,
        };
    }

    fn start_query(&mut self) {
        let lo = self.current_sequence_nr;
        let hi = lo.saturating_add(self.max - 1).min(self.to);
        let fetcher = Arc::clone(&self.fetcher);
        self.state =
            SourceState::Querying(Box::pin(async move { fetcher.fetch_page(lo, hi).await }));
    }

    fn complete(&mut self) {
        self.state = SourceState::Done;
        // Release the subscription; no envelope is produced past this point.
        self.listener = None;
    }
}

impl Stream for EnvelopeStream {
    type Item = Result<EventEnvelope, QueryError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if matches!(this.state, SourceState::Done) {
                return Poll::Ready(None);
            }

            this.poll_notifications(cx);

            // One envelope per pull while the buffer lasts. A new page is
            // only ever fetched once the buffer is empty.
            if let Some(envelope) = this.buffer.pop_front() {
                if this.buffer.is_empty() && this.current_sequence_nr > this.to {
                    // That was the envelope at `to`; nothing further can be
                    // in range.
                    this.complete();
                }
                return Poll::Ready(Some(Ok(envelope)));
            }

            match &mut this.state {
                SourceState::Idle => {
                    if this.current_sequence_nr > this.to {
                        this.complete();
                        return Poll::Ready(None);
                    }
                    this.start_query();
                    // Poll the fresh read on the next pass.
                }
                SourceState::Querying(read) | SourceState::NotifiedWhenQuerying(read) => {
                    let result = match read.as_mut().poll(cx) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(result) => result,
                    };
                    let notified =
                        matches!(this.state, SourceState::NotifiedWhenQuerying(_));

                    match result {
                        Err(err) => {
                            this.complete();
                            return Poll::Ready(Some(Err(err)));
                        }
                        Ok(page) => {
                            let examined_any = page.advance > 0;
                            this.current_sequence_nr =
                                this.current_sequence_nr.saturating_add(page.advance);
                            this.buffer.extend(page.envelopes);

                            if examined_any || notified {
                                // Deliver from the buffer, or — when the page
                                // was entirely filtered out or promised by a
                                // notification — requery through Idle.
                                this.state = SourceState::Idle;
                            } else if this.live {
                                this.state = SourceState::WaitingForNotification;
                                return Poll::Pending;
                            } else {
                                this.complete();
                                return Poll::Ready(None);
                            }
                        }
                    }
                }
                SourceState::WaitingForNotification => return Poll::Pending,
                // Handled at the top of the loop.
                SourceState::Done => return Poll::Ready(None),
            }
        }
    }
}

impl fmt::Debug for EnvelopeStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvelopeStream")
            .field("state", &self.state.name())
            .field("live", &self.live)
            .field("current_sequence_nr", &self.current_sequence_nr)
            .field("to", &self.to)
            .field("buffered", &self.buffer.len())
            .finish_non_exhaustive()
    }
}
