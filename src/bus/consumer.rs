//! Consumer loop with bounded retries and dead-letter routing.
//!
//! Offsets are committed only after the message has been handled, retried
//! or dead-lettered. Retries re-publish the original payload to the same
//! topic with an incremented `retry_count` header, so the retry budget
//! survives consumer restarts. Unprocessable payloads skip retries and go
//! straight to `<topic>.dlq` with provenance headers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Headers, Message};
use tokio::sync::watch;

use super::producer::EventBus;
use super::BusError;

pub const MAX_RETRIES: i32 = 3;
pub const RETRY_COUNT_HEADER: &str = "retry_count";
pub const DLQ_TOPIC_SUFFIX: &str = ".dlq";

#[derive(Debug)]
pub enum HandlerError {
    /// The payload can never be processed; dead-letter without retrying.
    Reject(String),
    /// Transient handler failure; eligible for retry.
    Failed(anyhow::Error),
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, payload: &[u8]) -> Result<(), HandlerError>;
}

/// What to do with a message after the handler ran.
#[derive(Debug, PartialEq)]
pub enum Disposition {
    Commit,
    Retry { next_retry_count: i32 },
    DeadLetter { retry_count: i32, reason: String },
}

pub fn dispose(
    outcome: Result<(), HandlerError>,
    retry_count: i32,
    max_retries: i32,
) -> Disposition {
    match outcome {
        Ok(()) => Disposition::Commit,
        Err(HandlerError::Reject(reason)) => Disposition::DeadLetter {
            retry_count,
            reason,
        },
        Err(HandlerError::Failed(_)) if retry_count < max_retries => Disposition::Retry {
            next_retry_count: retry_count + 1,
        },
        Err(HandlerError::Failed(err)) => Disposition::DeadLetter {
            retry_count,
            reason: format!("max retries exceeded: {err}"),
        },
    }
}

/// Provenance headers attached to dead-lettered messages.
pub fn dlq_headers(
    original_topic: &str,
    partition: i32,
    offset: i64,
    retry_count: i32,
    reason: &str,
    timestamp: &str,
) -> Vec<(String, Vec<u8>)> {
    vec![
        ("original_topic".to_string(), original_topic.as_bytes().to_vec()),
        ("original_partition".to_string(), partition.to_string().into_bytes()),
        ("original_offset".to_string(), offset.to_string().into_bytes()),
        (RETRY_COUNT_HEADER.to_string(), retry_count.to_string().into_bytes()),
        ("failure_reason".to_string(), reason.as_bytes().to_vec()),
        ("timestamp".to_string(), timestamp.as_bytes().to_vec()),
    ]
}

pub struct BusConsumer {
    consumer: StreamConsumer,
    bus: Arc<dyn EventBus>,
    topic: String,
    handler: Arc<dyn MessageHandler>,
    max_retries: i32,
}

impl BusConsumer {
    pub fn connect(
        brokers: &str,
        topic: &str,
        group_id: &str,
        bus: Arc<dyn EventBus>,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Self, BusError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()?;
        consumer.subscribe(&[topic])?;

        Ok(Self {
            consumer,
            bus,
            topic: topic.to_string(),
            handler,
            max_retries: MAX_RETRIES,
        })
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(topic = %self.topic, "starting bus consumer");
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!(topic = %self.topic, "stopping bus consumer");
                    return;
                }
                next = self.consumer.recv() => match next {
                    Err(err) => {
                        tracing::error!(topic = %self.topic, error = %err, "failed to read message");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                    Ok(msg) => self.process(&msg).await,
                },
            }
        }
    }

    async fn process(&self, msg: &BorrowedMessage<'_>) {
        let payload = msg.payload().unwrap_or_default();
        let retry_count = retry_count_of(msg);

        let outcome = self.handler.handle(payload).await;
        match dispose(outcome, retry_count, self.max_retries) {
            Disposition::Commit => {}
            Disposition::Retry { next_retry_count } => {
                tracing::info!(
                    topic = %self.topic,
                    retry_count = next_retry_count,
                    "retrying message"
                );
                let key = String::from_utf8_lossy(msg.key().unwrap_or_default()).into_owned();
                let headers = vec![(
                    RETRY_COUNT_HEADER.to_string(),
                    next_retry_count.to_string().into_bytes(),
                )];
                if let Err(err) = self.bus.publish(&self.topic, &key, payload, &headers).await {
                    tracing::error!(topic = %self.topic, error = %err, "failed to republish for retry");
                    // Leave the offset uncommitted so the broker redelivers.
                    return;
                }
            }
            Disposition::DeadLetter { retry_count, reason } => {
                tracing::warn!(
                    topic = %self.topic,
                    retry_count,
                    reason = %reason,
                    "sending message to DLQ"
                );
                if !self.send_to_dlq(msg, retry_count, &reason).await {
                    return;
                }
            }
        }

        if let Err(err) = self.consumer.commit_message(msg, CommitMode::Async) {
            tracing::error!(topic = %self.topic, error = %err, "failed to commit offset");
        }
    }

    async fn send_to_dlq(&self, msg: &BorrowedMessage<'_>, retry_count: i32, reason: &str) -> bool {
        let timestamp = msg
            .timestamp()
            .to_millis()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_else(Utc::now)
            .to_rfc3339_opts(SecondsFormat::Secs, true);

        let headers = dlq_headers(
            &self.topic,
            msg.partition(),
            msg.offset(),
            retry_count,
            reason,
            &timestamp,
        );
        let key = String::from_utf8_lossy(msg.key().unwrap_or_default()).into_owned();
        let dlq_topic = format!("{}{}", self.topic, DLQ_TOPIC_SUFFIX);

        match self
            .bus
            .publish(&dlq_topic, &key, msg.payload().unwrap_or_default(), &headers)
            .await
        {
            Ok(()) => {
                tracing::info!(topic = %dlq_topic, reason = %reason, "message sent to DLQ");
                true
            }
            Err(err) => {
                tracing::error!(
                    topic = %dlq_topic,
                    error = %err,
                    reason = %reason,
                    "failed to send message to DLQ"
                );
                false
            }
        }
    }
}

fn retry_count_of(msg: &BorrowedMessage<'_>) -> i32 {
    let Some(headers) = msg.headers() else {
        return 0;
    };
    for header in headers.iter() {
        if header.key == RETRY_COUNT_HEADER {
            if let Some(value) = header.value {
                if let Ok(count) = std::str::from_utf8(value).unwrap_or("").parse() {
                    return count;
                }
            }
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(msg: &str) -> Result<(), HandlerError> {
        Err(HandlerError::Failed(anyhow::anyhow!(msg.to_string())))
    }

    #[test]
    fn success_commits() {
        assert_eq!(dispose(Ok(()), 0, MAX_RETRIES), Disposition::Commit);
    }

    #[test]
    fn poison_goes_straight_to_dlq() {
        let disposition = dispose(
            Err(HandlerError::Reject("unmarshal error: expected value".to_string())),
            0,
            MAX_RETRIES,
        );
        assert_eq!(
            disposition,
            Disposition::DeadLetter {
                retry_count: 0,
                reason: "unmarshal error: expected value".to_string(),
            }
        );
    }

    #[test]
    fn transient_failures_increment_the_retry_count() {
        assert_eq!(
            dispose(failed("db down"), 0, MAX_RETRIES),
            Disposition::Retry { next_retry_count: 1 }
        );
        assert_eq!(
            dispose(failed("db down"), 2, MAX_RETRIES),
            Disposition::Retry { next_retry_count: 3 }
        );
    }

    #[test]
    fn exhausted_retries_dead_letter_with_the_final_count() {
        let disposition = dispose(failed("db down"), 3, MAX_RETRIES);
        assert_eq!(
            disposition,
            Disposition::DeadLetter {
                retry_count: 3,
                reason: "max retries exceeded: db down".to_string(),
            }
        );
    }

    #[test]
    fn dlq_headers_carry_provenance() {
        let headers = dlq_headers("payments", 2, 1337, 3, "max retries exceeded: db down", "t");
        let names: Vec<&str> = headers.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "original_topic",
                "original_partition",
                "original_offset",
                "retry_count",
                "failure_reason",
                "timestamp",
            ]
        );
        assert_eq!(headers[0].1, b"payments".to_vec());
        assert_eq!(headers[2].1, b"1337".to_vec());
        assert_eq!(headers[3].1, b"3".to_vec());
    }
}
