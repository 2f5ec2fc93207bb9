//! Message bus wrappers (§4.7).
//!
//! A producer and consumer pair over `rdkafka`: connect-with-retry,
//! manual commit, a restartable lazy message sequence, and graceful
//! shutdown on SIGINT/SIGTERM (see DESIGN.md).

use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{Message, OwnedMessage};
use rdkafka::producer::{FutureProducer, FutureRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;

use crate::config::BusConfig;
use crate::error::BusError;

async fn retry_backoff(attempt: u32, base_delay_ms: u64) {
    let delay = base_delay_ms.saturating_mul(1u64 << attempt.min(10));
    tokio::time::sleep(Duration::from_millis(delay)).await;
}

pub struct BusProducer {
    producer: FutureProducer,
}

impl BusProducer {
    /// Connects with exponential backoff, aborting after
    /// `connect_retry_attempts` — fatal to worker startup, per §7.
    pub async fn connect(config: &BusConfig) -> Result<Self, BusError> {
        let mut attempt = 0;
        loop {
            let result = ClientConfig::new()
                .set("bootstrap.servers", &config.bootstrap_servers)
                .set("compression.type", "gzip")
                .set("message.timeout.ms", "10000")
                .create::<FutureProducer>();
            match result {
                Ok(producer) => return Ok(Self { producer }),
                Err(e) if attempt + 1 >= config.connect_retry_attempts => {
                    return Err(BusError::ConnectFailed(e.to_string()))
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "bus producer connect failed, retrying");
                    retry_backoff(attempt, config.connect_retry_base_delay_ms).await;
                    attempt += 1;
                }
            }
        }
    }

    pub async fn publish<T: Serialize + Sync>(&self, topic: &str, value: &T) -> Result<(), BusError> {
        let payload = serde_json::to_vec(value)?;
        self.producer
            .send(
                FutureRecord::<(), Vec<u8>>::to(topic).payload(&payload),
                Duration::from_secs(10),
            )
            .await
            .map_err(|(e, _)| BusError::Publish(e.to_string()))?;
        Ok(())
    }
}

/// A single-topic consumer under one consumer group, auto-commit
/// disabled, reading from the earliest unacknowledged offset.
pub struct BusConsumer {
    consumer: StreamConsumer,
    shutdown: watch::Receiver<bool>,
}

impl BusConsumer {
    pub async fn connect(config: &BusConfig, topic: &str) -> Result<Self, BusError> {
        let mut attempt = 0;
        let consumer: StreamConsumer = loop {
            let result = ClientConfig::new()
                .set("bootstrap.servers", &config.bootstrap_servers)
                .set("group.id", &config.group_id)
                .set("enable.auto.commit", "false")
                .set("auto.offset.reset", "earliest")
                .create();
            match result {
                Ok(consumer) => break consumer,
                Err(e) if attempt + 1 >= config.connect_retry_attempts => {
                    return Err(BusError::ConnectFailed(e.to_string()))
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "bus consumer connect failed, retrying");
                    retry_backoff(attempt, config.connect_retry_base_delay_ms).await;
                    attempt += 1;
                }
            }
        };

        consumer
            .subscribe(&[topic])
            .map_err(|e| BusError::ConnectFailed(e.to_string()))?;

        Ok(Self { consumer, shutdown: install_shutdown_signal() })
    }

    /// A restartable lazy sequence: blocks until a message is available
    /// or shutdown has been signaled, in which case it returns `None`
    /// after the in-flight message (there is none pending at the point
    /// shutdown wins the race).
    pub async fn next_message<T: DeserializeOwned>(
        &mut self,
    ) -> Result<Option<(T, OwnedMessage)>, BusError> {
        if *self.shutdown.borrow() {
            return Ok(None);
        }
        tokio::select! {
            biased;
            _ = self.shutdown.changed() => Ok(None),
            result = self.consumer.recv() => {
                let borrowed = result.map_err(|e| BusError::Consume(e.to_string()))?;
                let payload = borrowed
                    .payload()
                    .ok_or_else(|| BusError::Consume("message had no payload".to_string()))?;
                let value: T = serde_json::from_slice(payload)?;
                Ok(Some((value, borrowed.detach())))
            }
        }
    }

    /// Advances the offset to the last yielded message. Decoupled from
    /// retrieval so the caller commits only after the Ledger write that
    /// message caused is durable — the load-bearing property of §4.7.
    pub fn commit(&self, message: &OwnedMessage) -> Result<(), BusError> {
        self.consumer
            .commit_message(message, CommitMode::Sync)
            .map_err(|e| BusError::Commit(e.to_string()))
    }
}

/// Installs SIGINT/SIGTERM handlers and returns a watch channel that
/// flips to `true` once either fires.
fn install_shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut terminate = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sig) => sig,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to install SIGTERM handler");
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        tracing::info!("shutdown signal received, draining in-flight message then stopping");
        let _ = tx.send(true);
    });
    rx
}
