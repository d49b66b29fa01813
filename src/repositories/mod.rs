use async_trait::async_trait;

use crate::entities::{order, order_change, order_item, payment_collection, shipping_method};
use crate::errors::ServiceError;
use crate::models::OrderAggregate;

pub mod memory;
pub mod order_repository;

pub use memory::InMemoryOrderStore;
pub use order_repository::SeaOrmOrderStore;

/// Placeholder id carried by rows that have not been persisted yet.
pub const UNSAVED_ID: i64 = 0;

/// A draft order and the shipping methods created with it.
///
/// Row ids and `order_id` references are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order: order::Model,
    pub shipping_methods: Vec<shipping_method::Model>,
}

/// A change-log row waiting to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderChange {
    pub version: i32,
    pub status: crate::models::OrderStatus,
    pub requested_by: String,
    pub requested_at: chrono::DateTime<chrono::Utc>,
    pub confirmed_by: String,
    pub confirmed_at: chrono::DateTime<chrono::Utc>,
    pub metadata: serde_json::Value,
}

/// Everything one accepted mutation writes, applied all-or-nothing.
///
/// `order.version` must already be `expected_version + 1`. New child rows carry
/// [`UNSAVED_ID`] and are attached to `order.id` by the store.
#[derive(Debug, Clone)]
pub struct UnitOfWork {
    pub order: order::Model,
    pub expected_version: i32,
    pub new_items: Vec<order_item::Model>,
    pub updated_items: Vec<order_item::Model>,
    pub new_shipping_methods: Vec<shipping_method::Model>,
    pub new_payment_collections: Vec<payment_collection::Model>,
    pub updated_payment_collections: Vec<payment_collection::Model>,
    pub deleted_payment_collections: Vec<i64>,
    pub change: NewOrderChange,
}

impl UnitOfWork {
    pub fn order_id(&self) -> i64 {
        self.order.id
    }

    fn check_version_step(&self) -> Result<(), ServiceError> {
        if self.order.version != self.expected_version + 1 {
            return Err(ServiceError::InternalError(format!(
                "Order {} must advance from version {} by exactly one, got {}",
                self.order.id, self.expected_version, self.order.version
            )));
        }
        if self.change.version != self.order.version || self.change.status != self.order.status {
            return Err(ServiceError::InternalError(format!(
                "Change entry for order {} does not match the committed order state",
                self.order.id
            )));
        }
        Ok(())
    }
}

/// Persistence boundary of the order lifecycle.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts a draft order with its initial shipping methods. No change entry is written.
    async fn create_order(&self, new_order: NewOrder) -> Result<OrderAggregate, ServiceError>;

    async fn load(&self, order_id: i64) -> Result<Option<OrderAggregate>, ServiceError>;

    /// Orders by ascending id, skipping `offset` rows; returns the page and the total count.
    async fn list(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<OrderAggregate>, u64), ServiceError>;

    /// The order's change log, oldest first.
    async fn changes_for(&self, order_id: i64) -> Result<Vec<order_change::Model>, ServiceError>;

    async fn find_payment_collection(
        &self,
        collection_id: i64,
    ) -> Result<Option<payment_collection::Model>, ServiceError>;

    /// Applies the unit atomically after a compare-and-increment on the order version.
    ///
    /// Fails with `Conflict` and writes nothing when the stored version differs from
    /// `expected_version`.
    async fn commit(&self, unit: UnitOfWork) -> Result<order_change::Model, ServiceError>;
}

fn version_conflict(order_id: i64, expected: i32) -> ServiceError {
    ServiceError::Conflict(format!(
        "Order {} was modified concurrently; expected version {}",
        order_id, expected
    ))
}
