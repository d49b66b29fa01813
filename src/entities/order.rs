use crate::models::status::{FulfillmentStatus, OrderStatus, PaymentStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// The `orders` table.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub email: Option<String>,
    pub customer_id: Option<String>,
    pub region_id: Option<String>,
    pub sales_channel_id: Option<String>,

    /// ISO 4217 code, upper-cased.
    pub currency_code: String,

    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub fulfillment_status: FulfillmentStatus,

    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub item_total: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub shipping_total: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub tax_total: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub discount_total: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total: Decimal,

    #[sea_orm(column_type = "Json")]
    pub metadata: Json,

    /// Optimistic lock token, bumped by one on every accepted mutation.
    pub version: i32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
    #[sea_orm(has_many = "super::shipping_method::Entity")]
    ShippingMethod,
    #[sea_orm(has_many = "super::payment_collection::Entity")]
    PaymentCollection,
    #[sea_orm(has_many = "super::order_change::Entity")]
    OrderChange,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

impl Related<super::shipping_method::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ShippingMethod.def()
    }
}

impl Related<super::payment_collection::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PaymentCollection.def()
    }
}

impl Related<super::order_change::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderChange.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Terminal or closed orders accept no further line-level edits.
    pub fn is_editable(&self) -> bool {
        matches!(self.status, OrderStatus::Draft | OrderStatus::Pending)
    }
}
