pub mod consumer;
pub mod events;
pub mod producer;

use thiserror::Error;

#[derive(Debug, Error)]
#[error("bus error: {0}")]
pub struct BusError(pub String);

impl From<rdkafka::error::KafkaError> for BusError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        Self(err.to_string())
    }
}

impl From<serde_json::Error> for BusError {
    fn from(err: serde_json::Error) -> Self {
        Self(format!("failed to encode event: {err}"))
    }
}
