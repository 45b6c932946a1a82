//! Order core: transactional creation, status lifecycle, and the consumer
//! side of the payment choreography.

use std::sync::Arc;

use async_trait::async_trait;

use crate::bus::consumer::{HandlerError, MessageHandler};
use crate::bus::events::{self, PaymentProcessed};
use crate::bus::producer::OrderEvents;
use crate::error::ServiceError;
use crate::models::{NewOrderItem, OrderStatus, OrderWithItems};
use crate::repo::OrderStore;

pub struct OrderService {
    store: Arc<dyn OrderStore>,
    events: Arc<dyn OrderEvents>,
}

impl OrderService {
    pub fn new(store: Arc<dyn OrderStore>, events: Arc<dyn OrderEvents>) -> Self {
        Self { store, events }
    }

    /// Creates the order and its item snapshot in one transaction, then
    /// announces it on the bus. A publish failure is logged but does not
    /// undo the committed order; reconciliation picks up stragglers.
    pub async fn create(
        &self,
        user_id: i64,
        items: Vec<NewOrderItem>,
    ) -> Result<OrderWithItems, ServiceError> {
        if items.is_empty() {
            return Err(ServiceError::Validation(
                "order must contain at least one item".to_string(),
            ));
        }
        for item in &items {
            if item.quantity < 1 {
                return Err(ServiceError::Validation(
                    "quantity must be at least 1".to_string(),
                ));
            }
            if item.price_at_purchase <= 0 {
                return Err(ServiceError::Validation(
                    "price must be positive".to_string(),
                ));
            }
        }

        let total_amount: i64 = items
            .iter()
            .map(|item| item.price_at_purchase * i64::from(item.quantity))
            .sum();

        let order = self
            .store
            .create(user_id, total_amount, &items)
            .await
            .map_err(|err| err.context("order.create"))?;

        if let Err(err) = self
            .events
            .order_created(order.order.id, user_id, total_amount)
            .await
        {
            tracing::error!(
                order_id = order.order.id,
                error = %err,
                "failed to publish OrderCreated event"
            );
        }

        tracing::info!(order_id = order.order.id, user_id, "order created");
        Ok(order)
    }

    pub async fn get(&self, order_id: i64) -> Result<OrderWithItems, ServiceError> {
        self.store.get(order_id).await
    }

    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<OrderWithItems>, ServiceError> {
        self.store.list_for_user(user_id).await
    }

    /// Manual transition (shipping, cancellation). Rejects moves the
    /// lifecycle does not allow.
    pub async fn set_status(&self, order_id: i64, status: OrderStatus) -> Result<(), ServiceError> {
        let changed = self
            .store
            .transition_status(order_id, status, &OrderStatus::sources(status))
            .await?;

        if !changed {
            let current = self.store.get(order_id).await?;
            return Err(ServiceError::Validation(format!(
                "cannot transition order {order_id} from {} to {}",
                current.order.status.as_str(),
                status.as_str()
            )));
        }

        tracing::info!(order_id, status = status.as_str(), "order status updated");
        Ok(())
    }

    /// Applies a `PaymentProcessed` event: maps the payment outcome onto
    /// the order lifecycle and refreshes the payment URL when one is
    /// carried. Events that arrive after the order left the reachable
    /// states are ignored, which keeps redelivery idempotent.
    pub async fn handle_payment_processed(
        &self,
        event: &PaymentProcessed,
    ) -> Result<(), ServiceError> {
        let next = match event.status.as_str() {
            events::STATUS_SUCCESS => OrderStatus::Paid,
            events::STATUS_PENDING => OrderStatus::PendingPayment,
            _ => OrderStatus::PaymentFailed,
        };

        let changed = self
            .store
            .transition_status(event.order_id, next, &OrderStatus::sources(next))
            .await?;

        if !changed {
            // A missing order is a handler failure worth retrying; a live
            // order in a conflicting terminal state is not.
            let current = self.store.get(event.order_id).await?;
            tracing::info!(
                order_id = event.order_id,
                current = current.order.status.as_str(),
                incoming = %event.status,
                "ignoring payment event for settled order"
            );
            return Ok(());
        }

        if !event.payment_url.is_empty() {
            if let Err(err) = self
                .store
                .update_payment_url(event.order_id, &event.payment_url)
                .await
            {
                tracing::error!(
                    order_id = event.order_id,
                    error = %err,
                    "failed to update payment url"
                );
            }
        }

        tracing::info!(
            order_id = event.order_id,
            status = next.as_str(),
            "order status updated"
        );
        Ok(())
    }
}

/// Bus adapter feeding `PaymentProcessed` events into the order core.
pub struct PaymentProcessedHandler {
    service: Arc<OrderService>,
}

impl PaymentProcessedHandler {
    pub fn new(service: Arc<OrderService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl MessageHandler for PaymentProcessedHandler {
    async fn handle(&self, payload: &[u8]) -> Result<(), HandlerError> {
        let event: PaymentProcessed = serde_json::from_slice(payload)
            .map_err(|err| HandlerError::Reject(format!("unmarshal error: {err}")))?;

        if event.event_type != events::PAYMENT_PROCESSED_TYPE {
            return Ok(());
        }

        self.service
            .handle_payment_processed(&event)
            .await
            .map_err(|err| HandlerError::Failed(anyhow::Error::new(err)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use crate::bus::BusError;
    use crate::models::{Order, OrderItem};

    #[derive(Default)]
    struct FakeOrderStore {
        orders: Mutex<HashMap<i64, OrderWithItems>>,
        next_id: Mutex<i64>,
    }

    impl FakeOrderStore {
        fn status_of(&self, order_id: i64) -> OrderStatus {
            self.orders.lock().unwrap()[&order_id].order.status
        }

        fn seed(&self, order_id: i64, status: OrderStatus) {
            let now = Utc::now();
            self.orders.lock().unwrap().insert(
                order_id,
                OrderWithItems {
                    order: Order {
                        id: order_id,
                        user_id: 42,
                        status,
                        total_amount: 3000,
                        payment_url: String::new(),
                        created_at: now,
                        updated_at: now,
                    },
                    items: Vec::new(),
                },
            );
        }
    }

    #[async_trait]
    impl OrderStore for FakeOrderStore {
        async fn create(
            &self,
            user_id: i64,
            total_amount: i64,
            items: &[NewOrderItem],
        ) -> Result<OrderWithItems, ServiceError> {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            let order_id = *next;
            let now = Utc::now();
            let order = OrderWithItems {
                order: Order {
                    id: order_id,
                    user_id,
                    status: OrderStatus::PendingPayment,
                    total_amount,
                    payment_url: String::new(),
                    created_at: now,
                    updated_at: now,
                },
                items: items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| OrderItem {
                        id: index as i64 + 1,
                        order_id,
                        sneaker_id: item.sneaker_id,
                        quantity: item.quantity,
                        price_at_purchase: item.price_at_purchase,
                        created_at: now,
                    })
                    .collect(),
            };
            self.orders.lock().unwrap().insert(order_id, order.clone());
            Ok(order)
        }

        async fn get(&self, order_id: i64) -> Result<OrderWithItems, ServiceError> {
            self.orders
                .lock()
                .unwrap()
                .get(&order_id)
                .cloned()
                .ok_or_else(|| ServiceError::NotFound(format!("order {order_id} not found")))
        }

        async fn list_for_user(&self, user_id: i64) -> Result<Vec<OrderWithItems>, ServiceError> {
            Ok(self
                .orders
                .lock()
                .unwrap()
                .values()
                .filter(|order| order.order.user_id == user_id)
                .cloned()
                .collect())
        }

        async fn transition_status(
            &self,
            order_id: i64,
            status: OrderStatus,
            allowed_from: &[OrderStatus],
        ) -> Result<bool, ServiceError> {
            let mut orders = self.orders.lock().unwrap();
            let Some(order) = orders.get_mut(&order_id) else {
                return Ok(false);
            };
            if !allowed_from.contains(&order.order.status) {
                return Ok(false);
            }
            order.order.status = status;
            order.order.updated_at = Utc::now();
            Ok(true)
        }

        async fn update_payment_url(
            &self,
            order_id: i64,
            payment_url: &str,
        ) -> Result<(), ServiceError> {
            let mut orders = self.orders.lock().unwrap();
            let order = orders
                .get_mut(&order_id)
                .ok_or_else(|| ServiceError::NotFound(format!("order {order_id} not found")))?;
            order.order.payment_url = payment_url.to_string();
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeOrderEvents {
        published: Mutex<Vec<(i64, i64, i64)>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl OrderEvents for FakeOrderEvents {
        async fn order_created(
            &self,
            order_id: i64,
            user_id: i64,
            total_amount: i64,
        ) -> Result<(), BusError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(BusError("broker unreachable".to_string()));
            }
            self.published
                .lock()
                .unwrap()
                .push((order_id, user_id, total_amount));
            Ok(())
        }
    }

    fn items() -> Vec<NewOrderItem> {
        vec![NewOrderItem {
            sneaker_id: 7,
            quantity: 2,
            price_at_purchase: 1500,
        }]
    }

    fn payment_event(order_id: i64, status: &str, url: &str) -> PaymentProcessed {
        PaymentProcessed::new(order_id, status, "pay-1", url)
    }

    #[tokio::test]
    async fn create_computes_the_total_and_publishes() {
        let store = Arc::new(FakeOrderStore::default());
        let bus = Arc::new(FakeOrderEvents::default());
        let service = OrderService::new(store.clone(), bus.clone());

        let order = service.create(42, items()).await.unwrap();

        assert_eq!(order.order.total_amount, 3000);
        assert_eq!(order.order.status, OrderStatus::PendingPayment);
        assert_eq!(*bus.published.lock().unwrap(), vec![(order.order.id, 42, 3000)]);
    }

    #[tokio::test]
    async fn total_matches_the_item_snapshot() {
        let store = Arc::new(FakeOrderStore::default());
        let service = OrderService::new(store, Arc::new(FakeOrderEvents::default()));

        let order = service
            .create(
                42,
                vec![
                    NewOrderItem { sneaker_id: 1, quantity: 2, price_at_purchase: 1500 },
                    NewOrderItem { sneaker_id: 2, quantity: 3, price_at_purchase: 700 },
                ],
            )
            .await
            .unwrap();

        let expected: i64 = order
            .items
            .iter()
            .map(|item| item.price_at_purchase * i64::from(item.quantity))
            .sum();
        assert_eq!(order.order.total_amount, expected);
        assert_eq!(order.order.total_amount, 5100);
    }

    #[tokio::test]
    async fn publish_failure_keeps_the_committed_order() {
        let store = Arc::new(FakeOrderStore::default());
        let bus = Arc::new(FakeOrderEvents::default());
        bus.fail.store(true, Ordering::SeqCst);
        let service = OrderService::new(store.clone(), bus);

        let order = service.create(42, items()).await.unwrap();
        assert!(store.orders.lock().unwrap().contains_key(&order.order.id));
    }

    #[tokio::test]
    async fn create_rejects_empty_and_invalid_items() {
        let service = OrderService::new(
            Arc::new(FakeOrderStore::default()),
            Arc::new(FakeOrderEvents::default()),
        );

        assert!(matches!(
            service.create(42, Vec::new()).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            service
                .create(42, vec![NewOrderItem { sneaker_id: 7, quantity: 0, price_at_purchase: 10 }])
                .await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn success_event_marks_the_order_paid() {
        let store = Arc::new(FakeOrderStore::default());
        store.seed(55, OrderStatus::PendingPayment);
        let service = OrderService::new(store.clone(), Arc::new(FakeOrderEvents::default()));

        service
            .handle_payment_processed(&payment_event(55, events::STATUS_SUCCESS, ""))
            .await
            .unwrap();

        assert_eq!(store.status_of(55), OrderStatus::Paid);
    }

    #[tokio::test]
    async fn pending_event_refreshes_the_payment_url() {
        let store = Arc::new(FakeOrderStore::default());
        store.seed(55, OrderStatus::PendingPayment);
        let service = OrderService::new(store.clone(), Arc::new(FakeOrderEvents::default()));

        service
            .handle_payment_processed(&payment_event(
                55,
                events::STATUS_PENDING,
                "https://pay.example/xyz",
            ))
            .await
            .unwrap();

        let order = store.get(55).await.unwrap();
        assert_eq!(order.order.status, OrderStatus::PendingPayment);
        assert_eq!(order.order.payment_url, "https://pay.example/xyz");
    }

    #[tokio::test]
    async fn unknown_event_status_fails_the_payment() {
        let store = Arc::new(FakeOrderStore::default());
        store.seed(55, OrderStatus::PendingPayment);
        let service = OrderService::new(store.clone(), Arc::new(FakeOrderEvents::default()));

        service
            .handle_payment_processed(&payment_event(55, "SOMETHING_ELSE", ""))
            .await
            .unwrap();

        assert_eq!(store.status_of(55), OrderStatus::PaymentFailed);
    }

    #[tokio::test]
    async fn redelivered_success_is_idempotent() {
        let store = Arc::new(FakeOrderStore::default());
        store.seed(55, OrderStatus::PendingPayment);
        let service = OrderService::new(store.clone(), Arc::new(FakeOrderEvents::default()));

        let event = payment_event(55, events::STATUS_SUCCESS, "");
        service.handle_payment_processed(&event).await.unwrap();
        service.handle_payment_processed(&event).await.unwrap();

        assert_eq!(store.status_of(55), OrderStatus::Paid);
    }

    #[tokio::test]
    async fn late_success_does_not_resurrect_a_cancelled_order() {
        let store = Arc::new(FakeOrderStore::default());
        store.seed(55, OrderStatus::Cancelled);
        let service = OrderService::new(store.clone(), Arc::new(FakeOrderEvents::default()));

        service
            .handle_payment_processed(&payment_event(55, events::STATUS_SUCCESS, ""))
            .await
            .unwrap();

        assert_eq!(store.status_of(55), OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn event_for_a_missing_order_is_a_handler_failure() {
        let service = OrderService::new(
            Arc::new(FakeOrderStore::default()),
            Arc::new(FakeOrderEvents::default()),
        );

        let result = service
            .handle_payment_processed(&payment_event(999, events::STATUS_SUCCESS, ""))
            .await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn manual_shipping_requires_a_paid_order() {
        let store = Arc::new(FakeOrderStore::default());
        store.seed(55, OrderStatus::PendingPayment);
        let service = OrderService::new(store.clone(), Arc::new(FakeOrderEvents::default()));

        assert!(matches!(
            service.set_status(55, OrderStatus::Shipped).await,
            Err(ServiceError::Validation(_))
        ));

        service.set_status(55, OrderStatus::Cancelled).await.unwrap();
        assert_eq!(store.status_of(55), OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn poison_payload_is_rejected_not_retried() {
        let service = Arc::new(OrderService::new(
            Arc::new(FakeOrderStore::default()),
            Arc::new(FakeOrderEvents::default()),
        ));
        let handler = PaymentProcessedHandler::new(service);

        let result = handler.handle(b"{not json").await;
        match result {
            Err(HandlerError::Reject(reason)) => assert!(reason.starts_with("unmarshal error:")),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn foreign_event_types_are_skipped() {
        let service = Arc::new(OrderService::new(
            Arc::new(FakeOrderStore::default()),
            Arc::new(FakeOrderEvents::default()),
        ));
        let handler = PaymentProcessedHandler::new(service);

        let payload = serde_json::json!({
            "event_type": "SomethingElse",
            "order_id": 1,
            "status": "SUCCESS",
            "payment_id": "p",
            "timestamp": "2024-01-01T00:00:00Z",
        });
        handler
            .handle(serde_json::to_vec(&payload).unwrap().as_slice())
            .await
            .unwrap();
    }
}
