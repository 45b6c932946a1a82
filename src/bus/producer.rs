use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;

use super::events::{self, OrderCreated, PaymentProcessed};
use super::BusError;

/// Publish side of the event bus: append a keyed message with optional
/// byte-valued headers to a topic.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
        headers: &[(String, Vec<u8>)],
    ) -> Result<(), BusError>;
}

pub struct KafkaBus {
    producer: FutureProducer,
}

impl KafkaBus {
    /// Producer tuned for low-latency control-plane events rather than
    /// throughput: one message per batch, 10 ms linger.
    pub fn connect(brokers: &str) -> Result<Self, BusError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("batch.num.messages", "1")
            .set("linger.ms", "10")
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer })
    }
}

#[async_trait]
impl EventBus for KafkaBus {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
        headers: &[(String, Vec<u8>)],
    ) -> Result<(), BusError> {
        let mut record = FutureRecord::to(topic).key(key).payload(payload);
        if !headers.is_empty() {
            let mut owned = OwnedHeaders::new();
            for (name, value) in headers {
                owned = owned.insert(Header {
                    key: name.as_str(),
                    value: Some(value),
                });
            }
            record = record.headers(owned);
        }

        self.producer
            .send(record, Timeout::After(Duration::from_secs(5)))
            .await
            .map_err(|(err, _)| BusError::from(err))?;
        Ok(())
    }
}

/// Events the order core emits.
#[async_trait]
pub trait OrderEvents: Send + Sync {
    async fn order_created(
        &self,
        order_id: i64,
        user_id: i64,
        total_amount: i64,
    ) -> Result<(), BusError>;
}

pub struct OrderEventProducer {
    bus: Arc<dyn EventBus>,
    topic: String,
}

impl OrderEventProducer {
    pub fn new(bus: Arc<dyn EventBus>, topic: String) -> Self {
        Self { bus, topic }
    }
}

#[async_trait]
impl OrderEvents for OrderEventProducer {
    async fn order_created(
        &self,
        order_id: i64,
        user_id: i64,
        total_amount: i64,
    ) -> Result<(), BusError> {
        let event = OrderCreated::new(order_id, user_id, total_amount);
        let payload = serde_json::to_vec(&event)?;
        self.bus
            .publish(&self.topic, &events::order_key(order_id), &payload, &[])
            .await?;

        tracing::info!(order_id, "published OrderCreated event");
        Ok(())
    }
}

/// Events the payment core emits.
#[async_trait]
pub trait PaymentEvents: Send + Sync {
    async fn payment_processed(
        &self,
        order_id: i64,
        status: &str,
        payment_id: &str,
        payment_url: &str,
    ) -> Result<(), BusError>;
}

pub struct PaymentEventProducer {
    bus: Arc<dyn EventBus>,
    topic: String,
}

impl PaymentEventProducer {
    pub fn new(bus: Arc<dyn EventBus>, topic: String) -> Self {
        Self { bus, topic }
    }
}

#[async_trait]
impl PaymentEvents for PaymentEventProducer {
    async fn payment_processed(
        &self,
        order_id: i64,
        status: &str,
        payment_id: &str,
        payment_url: &str,
    ) -> Result<(), BusError> {
        let event = PaymentProcessed::new(order_id, status, payment_id, payment_url);
        let payload = serde_json::to_vec(&event)?;
        self.bus
            .publish(&self.topic, &events::payment_key(order_id), &payload, &[])
            .await?;

        tracing::info!(order_id, status, "published PaymentProcessed event");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingBus {
        published: Mutex<Vec<(String, String, Vec<u8>)>>,
    }

    #[async_trait]
    impl EventBus for RecordingBus {
        async fn publish(
            &self,
            topic: &str,
            key: &str,
            payload: &[u8],
            _headers: &[(String, Vec<u8>)],
        ) -> Result<(), BusError> {
            self.published.lock().unwrap().push((
                topic.to_string(),
                key.to_string(),
                payload.to_vec(),
            ));
            Ok(())
        }
    }

    #[tokio::test]
    async fn order_created_lands_on_the_orders_topic_with_order_key() {
        let bus = Arc::new(RecordingBus::default());
        let producer = OrderEventProducer::new(bus.clone(), "orders".to_string());

        producer.order_created(7, 42, 3000).await.unwrap();

        let published = bus.published.lock().unwrap();
        let (topic, key, payload) = &published[0];
        assert_eq!(topic, "orders");
        assert_eq!(key, "order-7");

        let event: OrderCreated = serde_json::from_slice(payload).unwrap();
        assert_eq!(event.total_amount, 3000);
    }

    #[tokio::test]
    async fn payment_processed_lands_on_the_payments_topic_with_payment_key() {
        let bus = Arc::new(RecordingBus::default());
        let producer = PaymentEventProducer::new(bus.clone(), "payments".to_string());

        producer
            .payment_processed(7, events::STATUS_SUCCESS, "pay-1", "")
            .await
            .unwrap();

        let published = bus.published.lock().unwrap();
        let (topic, key, _) = &published[0];
        assert_eq!(topic, "payments");
        assert_eq!(key, "payment-7");
    }
}
