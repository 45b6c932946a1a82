//! Payment core: turns `OrderCreated` events into provider payments and
//! reconciles terminal payment state from provider webhooks.

use std::sync::Arc;

use async_trait::async_trait;

use crate::bus::consumer::{HandlerError, MessageHandler};
use crate::bus::events::{self, OrderCreated};
use crate::bus::producer::PaymentEvents;
use crate::error::ServiceError;
use crate::models::{NewPayment, PaymentStatus};
use crate::provider::PaymentProvider;
use crate::repo::PaymentStore;

const CURRENCY: &str = "RUB";

pub struct PaymentService {
    store: Arc<dyn PaymentStore>,
    provider: Arc<dyn PaymentProvider>,
    events: Arc<dyn PaymentEvents>,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        provider: Arc<dyn PaymentProvider>,
        events: Arc<dyn PaymentEvents>,
    ) -> Self {
        Self {
            store,
            provider,
            events,
        }
    }

    /// Derived from the order id so a redelivered `OrderCreated` reuses
    /// the same key and cannot mint a second provider payment.
    fn idempotence_key(order_id: i64) -> String {
        format!("order-{order_id}")
    }

    /// Creates the provider payment, persists it as pending and announces
    /// the confirmation URL. Provider and store failures bubble up and
    /// trigger the consumer's retry path. A redelivered event replays the
    /// same provider operation and leaves the stored payment untouched;
    /// only the PENDING announcement is repeated.
    pub async fn handle_order_created(&self, event: &OrderCreated) -> Result<(), ServiceError> {
        tracing::info!(order_id = event.order_id, "handling order created event");

        let description = format!("Order #{}", event.order_id);
        let created = self
            .provider
            .create_payment(
                event.total_amount,
                CURRENCY,
                &description,
                &Self::idempotence_key(event.order_id),
            )
            .await?;

        let payment = NewPayment {
            order_id: event.order_id,
            external_id: created.external_id.clone(),
            amount: event.total_amount,
            currency: CURRENCY.to_string(),
            status: PaymentStatus::Pending,
            confirmation_url: created.confirmation_url.clone(),
        };
        let inserted = self
            .store
            .insert(&payment)
            .await
            .map_err(|err| err.context("payment.handle_order_created"))?;

        if inserted {
            tracing::info!(
                order_id = event.order_id,
                payment_id = %created.external_id,
                url = %created.confirmation_url,
                "payment created"
            );
        } else {
            tracing::info!(
                order_id = event.order_id,
                payment_id = %created.external_id,
                "payment already recorded for order"
            );
        }

        // The payment exists either way; a lost PENDING event only delays
        // the confirmation URL reaching the order.
        if let Err(err) = self
            .events
            .payment_processed(
                event.order_id,
                events::STATUS_PENDING,
                &created.external_id,
                &created.confirmation_url,
            )
            .await
        {
            tracing::error!(
                order_id = event.order_id,
                error = %err,
                "failed to publish payment pending event"
            );
        }

        Ok(())
    }

    /// Provider webhook reconciliation: update the stored payment, then
    /// tell the order side whether the payment settled or fell through.
    pub async fn process_webhook(
        &self,
        external_id: &str,
        provider_status: &str,
    ) -> Result<(), ServiceError> {
        tracing::info!(payment_id = external_id, status = provider_status, "processing webhook");

        let status = PaymentStatus::from_provider(provider_status);
        self.store
            .update_status_by_external_id(external_id, status)
            .await
            .map_err(|err| err.context("payment.process_webhook"))?;

        let payment = self.store.get_by_external_id(external_id).await?;

        let bus_status = if status == PaymentStatus::Succeeded {
            events::STATUS_SUCCESS
        } else {
            events::STATUS_FAILURE
        };

        self.events
            .payment_processed(
                payment.order_id,
                bus_status,
                external_id,
                &payment.confirmation_url,
            )
            .await
            .map_err(|err| {
                ServiceError::Unavailable(format!("failed to publish payment event: {err}"))
            })?;

        Ok(())
    }
}

/// Bus adapter feeding `OrderCreated` events into the payment core.
pub struct OrderCreatedHandler {
    service: Arc<PaymentService>,
}

impl OrderCreatedHandler {
    pub fn new(service: Arc<PaymentService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl MessageHandler for OrderCreatedHandler {
    async fn handle(&self, payload: &[u8]) -> Result<(), HandlerError> {
        let event: OrderCreated = serde_json::from_slice(payload)
            .map_err(|err| HandlerError::Reject(format!("unmarshal error: {err}")))?;

        if event.event_type != events::ORDER_CREATED_TYPE {
            return Ok(());
        }

        self.service
            .handle_order_created(&event)
            .await
            .map_err(|err| HandlerError::Failed(anyhow::Error::new(err)))
    }
}
