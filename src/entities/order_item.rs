use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;
use crate::models::money;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub order_id: i64,
    pub title: String,
    pub variant_id: Option<String>,
    pub product_id: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub unit_price: Decimal,
    pub quantity: i32,
    /// Units already handed to fulfillment; never exceeds `quantity`.
    pub fulfilled_quantity: i32,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub tax_total: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub discount_total: Decimal,
    #[sea_orm(column_type = "Json")]
    pub metadata: Json,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn subtotal(&self) -> Result<Decimal, ServiceError> {
        money::line_subtotal(self.unit_price, self.quantity)
    }

    pub fn total(&self) -> Result<Decimal, ServiceError> {
        money::line_total(self.subtotal()?, self.tax_total, self.discount_total)
    }

    pub fn remaining_quantity(&self) -> i32 {
        (self.quantity - self.fulfilled_quantity).max(0)
    }

    pub fn is_fully_fulfilled(&self) -> bool {
        self.fulfilled_quantity >= self.quantity
    }
}
