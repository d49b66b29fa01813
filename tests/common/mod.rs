#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use rust_decimal::Decimal;
use sea_orm::DbErr;
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;

use order_lifecycle::{
    config::AppConfig,
    entities::{order_change, payment_collection},
    errors::ServiceError,
    events::{Event, EventSender},
    models::{Actor, OrderAggregate},
    repositories::{InMemoryOrderStore, NewOrder, OrderStore, UnitOfWork},
    services::{
        order_formatter::OrderView,
        order_lifecycle::{
            AddLineItemRequest, CreateDraftOrderRequest, FulfillOrderRequest, FulfillmentItem,
            PageSettings,
        },
        payment_collections::{CreatePaymentCollectionRequest, MarkAsPaidRequest},
        AppServices,
    },
    AppState,
};

/// Delegates to an in-memory store and fails every commit once tripped.
#[derive(Default)]
pub struct FailingStore {
    inner: InMemoryOrderStore,
    fail_commits: AtomicBool,
}

impl FailingStore {
    pub fn trip(&self) {
        self.fail_commits.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl OrderStore for FailingStore {
    async fn create_order(&self, new_order: NewOrder) -> Result<OrderAggregate, ServiceError> {
        self.inner.create_order(new_order).await
    }

    async fn load(&self, order_id: i64) -> Result<Option<OrderAggregate>, ServiceError> {
        self.inner.load(order_id).await
    }

    async fn list(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<OrderAggregate>, u64), ServiceError> {
        self.inner.list(offset, limit).await
    }

    async fn changes_for(&self, order_id: i64) -> Result<Vec<order_change::Model>, ServiceError> {
        self.inner.changes_for(order_id).await
    }

    async fn find_payment_collection(
        &self,
        collection_id: i64,
    ) -> Result<Option<payment_collection::Model>, ServiceError> {
        self.inner.find_payment_collection(collection_id).await
    }

    async fn commit(&self, unit: UnitOfWork) -> Result<order_change::Model, ServiceError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(ServiceError::StorageError(DbErr::Custom(
                "connection reset".into(),
            )));
        }
        self.inner.commit(unit).await
    }
}

/// Services over a fresh in-memory store, with the notification channel kept for inspection.
pub struct TestApp {
    pub store: Arc<dyn OrderStore>,
    pub services: AppServices,
    pub event_sender: EventSender,
    pub actor: Actor,
    events: mpsc::Receiver<Event>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemoryOrderStore::new()))
    }

    pub fn with_store(store: Arc<dyn OrderStore>) -> Self {
        let (tx, rx) = mpsc::channel(256);
        let event_sender = EventSender::new(tx);
        let services =
            AppServices::new(store.clone(), event_sender.clone(), PageSettings::default());
        Self {
            store,
            services,
            event_sender,
            actor: Actor::new("ops@example.com").expect("valid actor"),
            events: rx,
        }
    }

    /// Notifications published so far, in order.
    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub async fn draft(&self) -> OrderView {
        self.services
            .orders
            .create_draft(
                CreateDraftOrderRequest {
                    email: Some("buyer@example.com".into()),
                    currency_code: Some("usd".into()),
                    ..Default::default()
                },
                &self.actor,
            )
            .await
            .expect("draft order")
    }

    pub async fn add_item(&self, order_id: i64, quantity: i32, unit_price: Decimal) -> OrderView {
        self.services
            .orders
            .add_line_item(
                order_id,
                AddLineItemRequest {
                    title: "Widget".into(),
                    quantity,
                    unit_price,
                    ..Default::default()
                },
                &self.actor,
            )
            .await
            .expect("line item")
    }

    /// A placed order with one line item of `quantity` units.
    pub async fn pending_order(&self, quantity: i32, unit_price: Decimal) -> OrderView {
        let draft = self.draft().await;
        self.add_item(draft.id, quantity, unit_price).await;
        self.services
            .orders
            .place_order(draft.id, None, &self.actor)
            .await
            .expect("placed order")
    }

    pub async fn request_payment(&self, order_id: i64) -> i64 {
        self.services
            .payment_collections
            .create(
                CreatePaymentCollectionRequest {
                    order_id,
                    ..Default::default()
                },
                &self.actor,
            )
            .await
            .expect("payment collection")
            .id
    }

    pub async fn pay_in_full(&self, order_id: i64) -> OrderView {
        let collection_id = self.request_payment(order_id).await;
        self.services
            .payment_collections
            .mark_as_paid(
                collection_id,
                MarkAsPaidRequest {
                    order_id: Some(order_id),
                    expected_version: None,
                },
                &self.actor,
            )
            .await
            .expect("marked as paid");
        self.order(order_id).await
    }

    pub async fn fulfill_all(&self, order_id: i64) -> OrderView {
        let order = self.order(order_id).await;
        let items = order
            .items
            .iter()
            .filter(|item| item.quantity > item.fulfilled_quantity)
            .map(|item| FulfillmentItem {
                id: item.id,
                quantity: item.quantity - item.fulfilled_quantity,
            })
            .collect();
        self.services
            .orders
            .fulfill(
                order_id,
                FulfillOrderRequest {
                    items,
                    ..Default::default()
                },
                &self.actor,
            )
            .await
            .expect("fulfilled")
    }

    /// A pending order that is paid and fully fulfilled.
    pub async fn completable_order(&self) -> OrderView {
        let order = self.pending_order(2, Decimal::new(2500, 2)).await;
        self.pay_in_full(order.id).await;
        self.fulfill_all(order.id).await
    }

    pub async fn order(&self, order_id: i64) -> OrderView {
        self.services
            .orders
            .get_order(order_id)
            .await
            .expect("order exists")
    }

    pub async fn change_count(&self, order_id: i64) -> usize {
        self.store
            .changes_for(order_id)
            .await
            .expect("change log")
            .len()
    }
}

/// Router over an in-memory store, for HTTP-level tests.
pub fn test_router() -> Router {
    let mut cfg = AppConfig::new(
        "sqlite::memory:".into(),
        "127.0.0.1".into(),
        18_080,
        "test".into(),
    );
    cfg.store_backend = "in-memory".into();
    let (tx, rx) = mpsc::channel(256);
    tokio::spawn(order_lifecycle::events::process_events(rx));
    let state = AppState::new(cfg, Arc::new(InMemoryOrderStore::new()), EventSender::new(tx));
    order_lifecycle::app_router(state)
}

pub async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    actor: Option<&str>,
    body: Option<Value>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(actor) = actor {
        builder = builder.header("x-actor-id", actor);
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    };
    router.clone().oneshot(request).await.expect("response")
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
