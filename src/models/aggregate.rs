use crate::entities::{order, order_item, payment_collection, shipping_method};
use crate::errors::ServiceError;

/// An order row with every row it owns, loaded together.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAggregate {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    pub shipping_methods: Vec<shipping_method::Model>,
    pub payment_collections: Vec<payment_collection::Model>,
}

impl OrderAggregate {
    pub fn id(&self) -> i64 {
        self.order.id
    }

    pub fn item(&self, item_id: i64) -> Result<&order_item::Model, ServiceError> {
        self.items.iter().find(|i| i.id == item_id).ok_or_else(|| {
            ServiceError::NotFound(format!(
                "Line item {} not found on order {}",
                item_id, self.order.id
            ))
        })
    }

    pub fn payment_collection(&self, collection_id: i64) -> Option<&payment_collection::Model> {
        self.payment_collections
            .iter()
            .find(|c| c.id == collection_id)
    }

    /// True when the order has lines and every line is fully fulfilled.
    pub fn all_items_fulfilled(&self) -> bool {
        !self.items.is_empty() && self.items.iter().all(|i| i.is_fully_fulfilled())
    }
}
