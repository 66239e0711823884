//! Redis store backend.
//!
//! Maps the gateway onto Redis: sorted-set range reads via `ZRANGEBYSCORE`
//! and change subscriptions via Redis pub/sub. Each subscription owns a
//! dedicated pub/sub connection whose messages are forwarded into the
//! listener channel by a background task; dropping the listener aborts the
//! task and with it the subscription.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::error::StoreError;
use crate::store::{EventStore, NotificationListener};

/// Redis-backed [`EventStore`].
///
/// Range reads share one multiplexed connection; subscriptions open their own
/// pub/sub connection, as the protocol requires.
#[derive(Clone)]
pub struct RedisStore {
    client: ::redis::Client,
    connection: ::redis::aio::MultiplexedConnection,
}

impl RedisStore {
    /// Connects to Redis at `url` (e.g. `redis://127.0.0.1:6379/0`).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ConnectionFailed` if the URL is invalid or the
    /// server is unreachable.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = ::redis::Client::open(url)
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;
        Ok(Self { client, connection })
    }
}

#[async_trait]
impl EventStore for RedisStore {
    async fn range(&self, key: &str, lo: u64, hi: u64) -> Result<Vec<Bytes>, StoreError> {
        if lo > hi {
            return Ok(Vec::new());
        }
        let mut connection = self.connection.clone();
        let values: Vec<Vec<u8>> = ::redis::cmd("ZRANGEBYSCORE")
            .arg(key)
            .arg(lo)
            .arg(hi)
            .query_async(&mut connection)
            .await
            .map_err(|e| StoreError::ReadFailed(e.to_string()))?;
        Ok(values.into_iter().map(Bytes::from).collect())
    }

    async fn subscribe(&self, channel: &str) -> Result<NotificationListener, StoreError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| StoreError::SubscribeFailed(e.to_string()))?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| StoreError::SubscribeFailed(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let forwarder = tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while let Some(message) = messages.next().await {
                let payload = Bytes::copy_from_slice(message.get_payload_bytes());
                if tx.send(payload).is_err() {
                    break;
                }
            }
        });
        Ok(NotificationListener::with_forwarder(rx, forwarder))
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}
