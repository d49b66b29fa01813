use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::{order_change, order_item, payment_collection, shipping_method};
use crate::models::money::{paid_total, refunded_total};
use crate::models::{
    FulfillmentStatus, OrderAggregate, OrderStatus, PaymentCollectionStatus, PaymentStatus,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItemView {
    pub id: i64,
    pub title: String,
    pub variant_id: Option<String>,
    pub product_id: Option<String>,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub fulfilled_quantity: i32,
    pub subtotal: Decimal,
    pub tax_total: Decimal,
    pub discount_total: Decimal,
    pub total: Decimal,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingMethodView {
    pub id: i64,
    pub name: String,
    pub shipping_option_id: Option<String>,
    pub amount: Decimal,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCollectionView {
    pub id: i64,
    pub order_id: i64,
    pub status: PaymentCollectionStatus,
    pub currency_code: String,
    pub amount: Decimal,
    pub authorized_amount: Decimal,
    pub captured_amount: Decimal,
    pub refunded_amount: Decimal,
    pub completed_at: Option<DateTime<Utc>>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Settlement figures derived from the order's payment collections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderSummary {
    pub paid_total: Decimal,
    pub refunded_total: Decimal,
    /// Amount still owed; negative when more was collected than the order total.
    pub pending_difference: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderView {
    pub id: i64,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub fulfillment_status: FulfillmentStatus,
    pub currency_code: String,
    pub email: Option<String>,
    pub customer_id: Option<String>,
    pub region_id: Option<String>,
    pub sales_channel_id: Option<String>,
    pub item_total: Decimal,
    pub shipping_total: Decimal,
    pub tax_total: Decimal,
    pub discount_total: Decimal,
    pub total: Decimal,
    pub metadata: Value,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub items: Vec<LineItemView>,
    pub shipping_methods: Vec<ShippingMethodView>,
    pub payment_collections: Vec<PaymentCollectionView>,
    pub summary: OrderSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderListView {
    pub orders: Vec<OrderView>,
    pub count: u64,
    pub offset: u64,
    pub limit: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderChangeView {
    pub id: i64,
    pub order_id: i64,
    pub version: i32,
    pub status: OrderStatus,
    pub description: Option<String>,
    pub requested_by: String,
    pub requested_at: DateTime<Utc>,
    pub confirmed_by: String,
    pub confirmed_at: DateTime<Utc>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// Read-side projections of orders and their change log. Pure.
pub struct OrderFormatter;

impl OrderFormatter {
    pub fn format_order(aggregate: &OrderAggregate) -> OrderView {
        let order = &aggregate.order;
        // Persisted amounts were range-checked on write.
        let paid = paid_total(&aggregate.payment_collections).unwrap_or(Decimal::MAX);
        let refunded = refunded_total(&aggregate.payment_collections).unwrap_or(Decimal::MAX);

        OrderView {
            id: order.id,
            status: order.status,
            payment_status: order.payment_status,
            fulfillment_status: order.fulfillment_status,
            currency_code: order.currency_code.clone(),
            email: order.email.clone(),
            customer_id: order.customer_id.clone(),
            region_id: order.region_id.clone(),
            sales_channel_id: order.sales_channel_id.clone(),
            item_total: order.item_total,
            shipping_total: order.shipping_total,
            tax_total: order.tax_total,
            discount_total: order.discount_total,
            total: order.total,
            metadata: object_or_empty(&order.metadata),
            version: order.version,
            created_at: order.created_at,
            updated_at: order.updated_at,
            canceled_at: order.canceled_at,
            completed_at: order.completed_at,
            items: aggregate.items.iter().map(Self::format_item).collect(),
            shipping_methods: aggregate
                .shipping_methods
                .iter()
                .map(Self::format_shipping_method)
                .collect(),
            payment_collections: aggregate
                .payment_collections
                .iter()
                .map(Self::format_payment_collection)
                .collect(),
            summary: OrderSummary {
                paid_total: paid,
                refunded_total: refunded,
                pending_difference: order.total.saturating_sub(paid).saturating_add(refunded),
            },
        }
    }

    pub fn format_list(orders: &[OrderAggregate], count: u64, offset: u64, limit: u64) -> OrderListView {
        OrderListView {
            orders: orders.iter().map(Self::format_order).collect(),
            count,
            offset,
            limit,
        }
    }

    pub fn format_item(item: &order_item::Model) -> LineItemView {
        LineItemView {
            id: item.id,
            title: item.title.clone(),
            variant_id: item.variant_id.clone(),
            product_id: item.product_id.clone(),
            unit_price: item.unit_price,
            quantity: item.quantity,
            fulfilled_quantity: item.fulfilled_quantity,
            subtotal: item.subtotal().unwrap_or(Decimal::MAX),
            tax_total: item.tax_total,
            discount_total: item.discount_total,
            total: item.total().unwrap_or(Decimal::MAX),
            metadata: object_or_empty(&item.metadata),
        }
    }

    pub fn format_shipping_method(method: &shipping_method::Model) -> ShippingMethodView {
        ShippingMethodView {
            id: method.id,
            name: method.name.clone(),
            shipping_option_id: method.shipping_option_id.clone(),
            amount: method.amount,
            metadata: object_or_empty(&method.metadata),
        }
    }

    pub fn format_payment_collection(collection: &payment_collection::Model) -> PaymentCollectionView {
        PaymentCollectionView {
            id: collection.id,
            order_id: collection.order_id,
            status: collection.status,
            currency_code: collection.currency_code.clone(),
            amount: collection.amount,
            authorized_amount: collection.authorized_amount,
            captured_amount: collection.captured_amount,
            refunded_amount: collection.refunded_amount,
            completed_at: collection.completed_at,
            metadata: object_or_empty(&collection.metadata),
            created_at: collection.created_at,
            updated_at: collection.updated_at,
        }
    }

    pub fn format_change(change: &order_change::Model) -> OrderChangeView {
        OrderChangeView {
            id: change.id,
            order_id: change.order_id,
            version: change.version,
            status: change.status,
            description: change.description().map(str::to_string),
            requested_by: change.requested_by.clone(),
            requested_at: change.requested_at,
            confirmed_by: change.confirmed_by.clone(),
            confirmed_at: change.confirmed_at,
            metadata: object_or_empty(&change.metadata),
            created_at: change.created_at,
        }
    }
}

/// Null or non-object metadata renders as an empty object.
fn object_or_empty(value: &Value) -> Value {
    match value {
        Value::Object(_) => value.clone(),
        _ => Value::Object(Default::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::order;
    use rust_decimal_macros::dec;

    fn bare_aggregate() -> OrderAggregate {
        let now = Utc::now();
        OrderAggregate {
            order: order::Model {
                id: 42,
                email: None,
                customer_id: Some("cus_1".into()),
                region_id: None,
                sales_channel_id: None,
                currency_code: "USD".into(),
                status: OrderStatus::Pending,
                payment_status: PaymentStatus::PartiallyPaid,
                fulfillment_status: FulfillmentStatus::NotFulfilled,
                item_total: dec!(20.00),
                shipping_total: dec!(0),
                tax_total: dec!(0),
                discount_total: dec!(0),
                total: dec!(20.00),
                metadata: Value::Null,
                version: 2,
                created_at: now,
                updated_at: now,
                canceled_at: None,
                completed_at: None,
            },
            items: Vec::new(),
            shipping_methods: Vec::new(),
            payment_collections: vec![payment_collection::Model {
                id: 3,
                order_id: 42,
                currency_code: "USD".into(),
                amount: dec!(12.50),
                authorized_amount: dec!(0),
                captured_amount: dec!(12.50),
                refunded_amount: dec!(0),
                status: PaymentCollectionStatus::Paid,
                completed_at: Some(now),
                metadata: serde_json::json!({"source": "manual"}),
                created_at: now,
                updated_at: now,
            }],
        }
    }

    #[test]
    fn absent_relations_render_as_empty_lists_and_null_fields() {
        let view = OrderFormatter::format_order(&bare_aggregate());
        let json = serde_json::to_value(&view).unwrap();

        assert_eq!(json["items"], serde_json::json!([]));
        assert_eq!(json["shipping_methods"], serde_json::json!([]));
        assert_eq!(json["email"], Value::Null);
        assert_eq!(json["metadata"], serde_json::json!({}));
        assert_eq!(json["status"], "pending");
        assert_eq!(json["payment_status"], "partially_paid");
    }

    #[test]
    fn summary_tracks_paid_collections() {
        let view = OrderFormatter::format_order(&bare_aggregate());
        assert_eq!(view.summary.paid_total, dec!(12.50));
        assert_eq!(view.summary.refunded_total, dec!(0));
        assert_eq!(view.summary.pending_difference, dec!(7.50));
    }
}
