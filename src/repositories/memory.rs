use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::{version_conflict, NewOrder, OrderStore, UnitOfWork};
use crate::entities::{order, order_change, order_item, payment_collection, shipping_method};
use crate::errors::ServiceError;
use crate::models::OrderAggregate;

#[derive(Debug, Default)]
struct Tables {
    last_id: i64,
    orders: BTreeMap<i64, order::Model>,
    items: BTreeMap<i64, order_item::Model>,
    shipping_methods: BTreeMap<i64, shipping_method::Model>,
    payment_collections: BTreeMap<i64, payment_collection::Model>,
    changes: BTreeMap<i64, order_change::Model>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn aggregate(&self, order: &order::Model) -> OrderAggregate {
        let id = order.id;
        OrderAggregate {
            order: order.clone(),
            items: self
                .items
                .values()
                .filter(|i| i.order_id == id)
                .cloned()
                .collect(),
            shipping_methods: self
                .shipping_methods
                .values()
                .filter(|s| s.order_id == id)
                .cloned()
                .collect(),
            payment_collections: self
                .payment_collections
                .values()
                .filter(|c| c.order_id == id)
                .cloned()
                .collect(),
        }
    }

    /// Every referenced child row must exist and belong to the order.
    fn check_ownership(&self, unit: &UnitOfWork) -> Result<(), ServiceError> {
        let order_id = unit.order_id();
        for item in &unit.updated_items {
            match self.items.get(&item.id) {
                Some(existing) if existing.order_id == order_id => {}
                _ => return Err(missing_row("order item", item.id, order_id)),
            }
        }
        let collection_ids = unit
            .updated_payment_collections
            .iter()
            .map(|c| c.id)
            .chain(unit.deleted_payment_collections.iter().copied());
        for id in collection_ids {
            match self.payment_collections.get(&id) {
                Some(existing) if existing.order_id == order_id => {}
                _ => return Err(missing_row("payment collection", id, order_id)),
            }
        }
        Ok(())
    }
}

fn missing_row(kind: &str, id: i64, order_id: i64) -> ServiceError {
    ServiceError::db_error(format!("{} {} does not belong to order {}", kind, id, order_id))
}

/// Order store kept entirely in process memory.
///
/// Each call runs inside one critical section of a single lock, so a commit is
/// observed either completely or not at all.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    tables: RwLock<Tables>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    #[instrument(skip(self, new_order))]
    async fn create_order(&self, new_order: NewOrder) -> Result<OrderAggregate, ServiceError> {
        let mut tables = self.tables.write().await;

        let mut order = new_order.order;
        order.id = tables.next_id();
        for mut method in new_order.shipping_methods {
            method.id = tables.next_id();
            method.order_id = order.id;
            tables.shipping_methods.insert(method.id, method);
        }
        tables.orders.insert(order.id, order.clone());

        debug!(order_id = order.id, "order inserted");
        Ok(tables.aggregate(&order))
    }

    async fn load(&self, order_id: i64) -> Result<Option<OrderAggregate>, ServiceError> {
        let tables = self.tables.read().await;
        Ok(tables.orders.get(&order_id).map(|o| tables.aggregate(o)))
    }

    async fn list(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<OrderAggregate>, u64), ServiceError> {
        let tables = self.tables.read().await;
        let count = tables.orders.len() as u64;
        let page = tables
            .orders
            .values()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .map(|o| tables.aggregate(o))
            .collect();
        Ok((page, count))
    }

    async fn changes_for(&self, order_id: i64) -> Result<Vec<order_change::Model>, ServiceError> {
        let tables = self.tables.read().await;
        Ok(tables
            .changes
            .values()
            .filter(|c| c.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn find_payment_collection(
        &self,
        collection_id: i64,
    ) -> Result<Option<payment_collection::Model>, ServiceError> {
        let tables = self.tables.read().await;
        Ok(tables.payment_collections.get(&collection_id).cloned())
    }

    #[instrument(skip(self, unit), fields(order_id = unit.order_id(), expected_version = unit.expected_version))]
    async fn commit(&self, unit: UnitOfWork) -> Result<order_change::Model, ServiceError> {
        unit.check_version_step()?;
        let mut tables = self.tables.write().await;
        let order_id = unit.order_id();

        match tables.orders.get(&order_id) {
            None => {
                return Err(ServiceError::NotFound(format!(
                    "Order {} not found",
                    order_id
                )))
            }
            Some(stored) if stored.version != unit.expected_version => {
                return Err(version_conflict(order_id, unit.expected_version));
            }
            Some(_) => {}
        }
        tables.check_ownership(&unit)?;

        // Nothing below can fail.
        let now = unit.order.updated_at;
        for mut item in unit.new_items {
            item.id = tables.next_id();
            item.order_id = order_id;
            item.created_at = now;
            item.updated_at = now;
            tables.items.insert(item.id, item);
        }
        for item in unit.updated_items {
            tables.items.insert(item.id, item);
        }
        for mut method in unit.new_shipping_methods {
            method.id = tables.next_id();
            method.order_id = order_id;
            method.created_at = now;
            method.updated_at = now;
            tables.shipping_methods.insert(method.id, method);
        }
        for mut collection in unit.new_payment_collections {
            collection.id = tables.next_id();
            collection.order_id = order_id;
            collection.created_at = now;
            collection.updated_at = now;
            tables.payment_collections.insert(collection.id, collection);
        }
        for collection in unit.updated_payment_collections {
            tables.payment_collections.insert(collection.id, collection);
        }
        for id in &unit.deleted_payment_collections {
            tables.payment_collections.remove(id);
        }
        tables.orders.insert(order_id, unit.order);

        let change = order_change::Model {
            id: tables.next_id(),
            order_id,
            version: unit.change.version,
            status: unit.change.status,
            requested_by: unit.change.requested_by,
            requested_at: unit.change.requested_at,
            confirmed_by: unit.change.confirmed_by,
            confirmed_at: unit.change.confirmed_at,
            metadata: unit.change.metadata,
            created_at: now,
            updated_at: now,
        };
        tables.changes.insert(change.id, change.clone());

        debug!(change_id = change.id, "unit of work applied");
        Ok(change)
    }
}
