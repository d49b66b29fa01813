use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::entities::{order, order_item, payment_collection, shipping_method};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender, OrderEvent, OrderEventHandler};
use crate::models::{Actor, OrderAggregate, OrderTotals};
use crate::repositories::{OrderStore, UnitOfWork, UNSAVED_ID};
use crate::services::order_changes::OrderChangeEmitter;

/// An order loaded for modification.
///
/// Edits are made on a working copy; nothing is written until the owning
/// [`MutationPipeline`] commits it.
#[derive(Debug)]
pub struct OrderMutation {
    original: OrderAggregate,
    working: OrderAggregate,
    actor: Actor,
    now: DateTime<Utc>,
    raised: Vec<OrderEvent>,
    notifications: Vec<Event>,
    change_metadata: Map<String, Value>,
}

impl OrderMutation {
    pub fn new(aggregate: OrderAggregate, actor: Actor, now: DateTime<Utc>) -> Self {
        Self {
            original: aggregate.clone(),
            working: aggregate,
            actor,
            now,
            raised: Vec::new(),
            notifications: Vec::new(),
            change_metadata: Map::new(),
        }
    }

    pub fn aggregate(&self) -> &OrderAggregate {
        &self.working
    }

    pub fn order(&self) -> &order::Model {
        &self.working.order
    }

    pub fn order_mut(&mut self) -> &mut order::Model {
        &mut self.working.order
    }

    pub fn items_mut(&mut self) -> &mut Vec<order_item::Model> {
        &mut self.working.items
    }

    pub fn payment_collections_mut(&mut self) -> &mut Vec<payment_collection::Model> {
        &mut self.working.payment_collections
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn add_item(&mut self, mut item: order_item::Model) {
        item.id = UNSAVED_ID;
        item.order_id = self.working.order.id;
        self.working.items.push(item);
    }

    pub fn add_shipping_method(&mut self, mut method: shipping_method::Model) {
        method.id = UNSAVED_ID;
        method.order_id = self.working.order.id;
        self.working.shipping_methods.push(method);
    }

    pub fn add_payment_collection(&mut self, mut collection: payment_collection::Model) {
        collection.id = UNSAVED_ID;
        collection.order_id = self.working.order.id;
        self.working.payment_collections.push(collection);
    }

    pub fn remove_payment_collection(
        &mut self,
        collection_id: i64,
    ) -> Option<payment_collection::Model> {
        let index = self
            .working
            .payment_collections
            .iter()
            .position(|c| c.id == collection_id)?;
        Some(self.working.payment_collections.remove(index))
    }

    /// Queues a domain event for the handlers registered on the pipeline.
    pub fn raise(&mut self, event: OrderEvent) {
        self.raised.push(event);
    }

    /// Queues a notification published once the mutation is committed.
    pub fn notify(&mut self, event: Event) {
        self.notifications.push(event);
    }

    /// Adds a key to the metadata of the change-log entry this mutation writes.
    pub fn annotate(&mut self, key: &str, value: impl Into<Value>) {
        self.change_metadata.insert(key.to_string(), value.into());
    }

    fn take_raised(&mut self) -> Vec<OrderEvent> {
        std::mem::take(&mut self.raised)
    }

    /// Splits the working copy into the rows the store must write.
    fn into_unit(self, description: &str) -> (UnitOfWork, Vec<Event>) {
        let OrderMutation {
            original,
            working,
            actor,
            now,
            notifications,
            change_metadata,
            ..
        } = self;

        let (new_items, updated_items) = split_rows(&original.items, working.items, |i| i.id);
        let (new_shipping_methods, _) =
            split_rows(&original.shipping_methods, working.shipping_methods, |s| s.id);
        let deleted_payment_collections = original
            .payment_collections
            .iter()
            .map(|c| c.id)
            .filter(|id| !working.payment_collections.iter().any(|c| c.id == *id))
            .collect();
        let (new_payment_collections, updated_payment_collections) = split_rows(
            &original.payment_collections,
            working.payment_collections,
            |c| c.id,
        );

        let change = OrderChangeEmitter::stage(
            &working.order,
            description,
            &actor,
            now,
            change_metadata,
        );

        let unit = UnitOfWork {
            order: working.order,
            expected_version: original.order.version,
            new_items,
            updated_items,
            new_shipping_methods,
            new_payment_collections,
            updated_payment_collections,
            deleted_payment_collections,
            change,
        };
        (unit, notifications)
    }
}

/// Separates unsaved rows from persisted rows that differ from their loaded copy.
fn split_rows<T: PartialEq>(
    original: &[T],
    working: Vec<T>,
    id: impl Fn(&T) -> i64,
) -> (Vec<T>, Vec<T>) {
    let mut inserted = Vec::new();
    let mut updated = Vec::new();
    for row in working {
        if id(&row) == UNSAVED_ID {
            inserted.push(row);
        } else if original.iter().any(|o| id(o) == id(&row) && *o != row) {
            updated.push(row);
        }
    }
    (inserted, updated)
}

/// Loads orders for modification and commits them as single units of work.
///
/// A commit dispatches raised domain events to the registered handlers, recomputes
/// totals, advances the version, writes exactly one change-log entry and finally
/// publishes the queued notifications.
#[derive(Clone)]
pub struct MutationPipeline {
    store: Arc<dyn OrderStore>,
    handlers: Vec<Arc<dyn OrderEventHandler>>,
    event_sender: EventSender,
}

impl MutationPipeline {
    pub fn new(store: Arc<dyn OrderStore>, event_sender: EventSender) -> Self {
        Self {
            store,
            handlers: Vec::new(),
            event_sender,
        }
    }

    pub fn with_handler(mut self, handler: Arc<dyn OrderEventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    pub fn event_sender(&self) -> &EventSender {
        &self.event_sender
    }

    pub async fn load(&self, order_id: i64) -> Result<OrderAggregate, ServiceError> {
        self.store
            .load(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    /// Loads the order and checks the caller's version token, when one is given.
    pub async fn begin(
        &self,
        order_id: i64,
        expected_version: Option<i32>,
        actor: &Actor,
    ) -> Result<OrderMutation, ServiceError> {
        let aggregate = self.load(order_id).await?;
        if let Some(expected) = expected_version {
            if aggregate.order.version != expected {
                return Err(ServiceError::Conflict(format!(
                    "Order {} is at version {}, request expected version {}",
                    order_id, aggregate.order.version, expected
                )));
            }
        }
        Ok(OrderMutation::new(aggregate, actor.clone(), Utc::now()))
    }

    #[instrument(skip(self, mutation), fields(order_id = mutation.order().id, actor = %mutation.actor()))]
    pub async fn commit(
        &self,
        mut mutation: OrderMutation,
        description: &str,
    ) -> Result<OrderAggregate, ServiceError> {
        self.dispatch(&mut mutation)?;

        let totals = OrderTotals::compute(&mutation.working.items, &mutation.working.shipping_methods)?;
        let now = mutation.now;
        let order = mutation.order_mut();
        totals.apply_to(order);
        order.version += 1;
        order.updated_at = now;

        let order_id = order.id;
        let (unit, notifications) = mutation.into_unit(description);
        let change = self.store.commit(unit).await?;
        info!(
            order_id,
            version = change.version,
            status = %change.status,
            description,
            "order change committed"
        );

        let aggregate = self.load(order_id).await?;
        let mut published = Vec::with_capacity(notifications.len() + 1);
        published.push(Event::OrderUpdated {
            order_id,
            version: change.version,
            description: description.to_string(),
        });
        published.extend(notifications);
        self.event_sender.publish_all(published).await;
        Ok(aggregate)
    }

    fn dispatch(&self, mutation: &mut OrderMutation) -> Result<(), ServiceError> {
        loop {
            let raised = mutation.take_raised();
            if raised.is_empty() {
                return Ok(());
            }
            for event in &raised {
                for handler in &self.handlers {
                    debug!(handler = handler.name(), event = ?event, "dispatching order event");
                    handler.handle(event, mutation)?;
                }
            }
        }
    }
}
