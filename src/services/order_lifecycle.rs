use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::entities::{order, order_item, shipping_method};
use crate::errors::ServiceError;
use crate::events::{Event, OrderEvent};
use crate::metrics;
use crate::models::money::{checked_sum, ensure_non_negative, line_subtotal, round_money};
use crate::models::{
    parse_status, Actor, FulfillmentStatus, OrderStatus, OrderTotals, PaymentStatus,
};
use crate::repositories::{NewOrder, UNSAVED_ID};
use crate::services::mutation::{MutationPipeline, OrderMutation};
use crate::services::order_formatter::{OrderChangeView, OrderFormatter, OrderListView, OrderView};

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct AddShippingMethodRequest {
    #[validate(length(min = 1, max = 255, message = "Shipping method name is required"))]
    pub name: String,
    pub shipping_option_id: Option<String>,
    pub amount: Decimal,
    pub metadata: Option<Value>,
    pub expected_version: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CreateDraftOrderRequest {
    #[validate(email(message = "Email must be a valid address"))]
    pub email: Option<String>,
    pub customer_id: Option<String>,
    pub region_id: Option<String>,
    pub sales_channel_id: Option<String>,
    #[validate(required(message = "Currency code is required"))]
    pub currency_code: Option<String>,
    pub metadata: Option<Value>,
    #[serde(default)]
    pub shipping_methods: Vec<AddShippingMethodRequest>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct AddLineItemRequest {
    #[validate(length(min = 1, max = 255, message = "Line item title is required"))]
    pub title: String,
    pub variant_id: Option<String>,
    pub product_id: Option<String>,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    pub unit_price: Decimal,
    pub tax_total: Option<Decimal>,
    pub discount_total: Option<Decimal>,
    pub metadata: Option<Value>,
    pub expected_version: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentItem {
    pub id: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FulfillOrderRequest {
    #[serde(default)]
    pub items: Vec<FulfillmentItem>,
    pub location_id: Option<String>,
    pub metadata: Option<Value>,
    pub expected_version: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchiveOrderRequest {
    pub order_id: Option<i64>,
    pub expected_version: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateStatusFieldsRequest {
    pub payment_status: Option<String>,
    pub fulfillment_status: Option<String>,
    pub expected_version: Option<i32>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ListOrdersQuery {
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

/// Limits applied to list requests.
#[derive(Debug, Clone, Copy)]
pub struct PageSettings {
    pub default_limit: u64,
    pub max_limit: u64,
}

impl Default for PageSettings {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 100,
        }
    }
}

impl PageSettings {
    pub fn clamp(&self, limit: Option<u64>) -> u64 {
        limit
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit.max(1))
    }
}

/// The only component allowed to move an order's status triple.
///
/// Every accepted mutation goes through the [`MutationPipeline`] and therefore
/// writes exactly one change-log entry.
#[derive(Clone)]
pub struct OrderLifecycleService {
    pipeline: MutationPipeline,
    paging: PageSettings,
}

impl OrderLifecycleService {
    pub fn new(pipeline: MutationPipeline, paging: PageSettings) -> Self {
        Self { pipeline, paging }
    }

    /// Creates a draft order. The initial state is the implicit baseline of the change log.
    #[instrument(skip(self, request), fields(actor = %actor))]
    pub async fn create_draft(
        &self,
        request: CreateDraftOrderRequest,
        actor: &Actor,
    ) -> Result<OrderView, ServiceError> {
        metrics::observe("create_draft", self.create_draft_inner(request, actor).await)
    }

    async fn create_draft_inner(
        &self,
        request: CreateDraftOrderRequest,
        actor: &Actor,
    ) -> Result<OrderView, ServiceError> {
        request.validate()?;
        let currency_code = normalize_currency(request.currency_code.as_deref())?;
        let metadata = metadata_object(request.metadata, "metadata")?;

        let now = Utc::now();
        let mut shipping_methods = Vec::with_capacity(request.shipping_methods.len());
        for method in request.shipping_methods {
            shipping_methods.push(build_shipping_method(method, now)?);
        }
        let totals = OrderTotals::compute(&[], &shipping_methods)?;

        let mut order = order::Model {
            id: UNSAVED_ID,
            email: request.email,
            customer_id: request.customer_id,
            region_id: request.region_id,
            sales_channel_id: request.sales_channel_id,
            currency_code,
            status: OrderStatus::Draft,
            payment_status: PaymentStatus::NotPaid,
            fulfillment_status: FulfillmentStatus::NotFulfilled,
            item_total: Decimal::ZERO,
            shipping_total: Decimal::ZERO,
            tax_total: Decimal::ZERO,
            discount_total: Decimal::ZERO,
            total: Decimal::ZERO,
            metadata: Value::Object(metadata),
            version: 1,
            created_at: now,
            updated_at: now,
            canceled_at: None,
            completed_at: None,
        };
        totals.apply_to(&mut order);

        let aggregate = self
            .pipeline
            .store()
            .create_order(NewOrder {
                order,
                shipping_methods,
            })
            .await?;

        info!(order_id = aggregate.id(), actor = %actor, "draft order created");
        self.pipeline
            .event_sender()
            .publish_all(vec![Event::OrderCreated(aggregate.id())])
            .await;
        Ok(OrderFormatter::format_order(&aggregate))
    }

    #[instrument(skip(self, request), fields(actor = %actor))]
    pub async fn add_line_item(
        &self,
        order_id: i64,
        request: AddLineItemRequest,
        actor: &Actor,
    ) -> Result<OrderView, ServiceError> {
        metrics::observe(
            "add_line_item",
            self.add_line_item_inner(order_id, request, actor).await,
        )
    }

    async fn add_line_item_inner(
        &self,
        order_id: i64,
        request: AddLineItemRequest,
        actor: &Actor,
    ) -> Result<OrderView, ServiceError> {
        request.validate()?;
        let tax_total = request.tax_total.unwrap_or(Decimal::ZERO);
        let discount_total = request.discount_total.unwrap_or(Decimal::ZERO);
        ensure_non_negative("unit_price", request.unit_price)?;
        ensure_non_negative("tax_total", tax_total)?;
        ensure_non_negative("discount_total", discount_total)?;
        let unit_price = round_money(request.unit_price);
        let tax_total = round_money(tax_total);
        let discount_total = round_money(discount_total);
        let subtotal = line_subtotal(unit_price, request.quantity)?;
        let gross = checked_sum("Line item", [subtotal, tax_total])?;
        if discount_total > gross {
            return Err(ServiceError::ValidationError(
                "discount_total must not exceed the line subtotal plus tax".into(),
            ));
        }
        let metadata = metadata_object(request.metadata, "metadata")?;

        let mut mutation = self
            .pipeline
            .begin(order_id, request.expected_version, actor)
            .await?;
        ensure_editable(mutation.order(), "Line items")?;

        let now = mutation.now();
        let title = request.title;
        mutation.add_item(order_item::Model {
            id: UNSAVED_ID,
            order_id,
            title: title.clone(),
            variant_id: request.variant_id,
            product_id: request.product_id,
            unit_price,
            quantity: request.quantity,
            fulfilled_quantity: 0,
            tax_total,
            discount_total,
            metadata: Value::Object(metadata),
            created_at: now,
            updated_at: now,
        });

        let order = mutation.order_mut();
        if order.fulfillment_status == FulfillmentStatus::Fulfilled {
            order.fulfillment_status = FulfillmentStatus::PartiallyFulfilled;
        }
        let line_total = gross - discount_total;
        if order.payment_status == PaymentStatus::Paid && line_total > Decimal::ZERO {
            order.payment_status = PaymentStatus::PartiallyPaid;
        }
        mutation.annotate("title", title);
        mutation.annotate("quantity", request.quantity);

        self.commit(mutation, "Line item added").await
    }

    #[instrument(skip(self, request), fields(actor = %actor))]
    pub async fn add_shipping_method(
        &self,
        order_id: i64,
        request: AddShippingMethodRequest,
        actor: &Actor,
    ) -> Result<OrderView, ServiceError> {
        metrics::observe(
            "add_shipping_method",
            self.add_shipping_method_inner(order_id, request, actor).await,
        )
    }

    async fn add_shipping_method_inner(
        &self,
        order_id: i64,
        request: AddShippingMethodRequest,
        actor: &Actor,
    ) -> Result<OrderView, ServiceError> {
        let expected_version = request.expected_version;
        let method = build_shipping_method(request, Utc::now())?;

        let mut mutation = self.pipeline.begin(order_id, expected_version, actor).await?;
        ensure_editable(mutation.order(), "Shipping methods")?;

        let name = method.name.clone();
        let amount = method.amount;
        mutation.add_shipping_method(method);
        let order = mutation.order_mut();
        if order.payment_status == PaymentStatus::Paid && amount > Decimal::ZERO {
            order.payment_status = PaymentStatus::PartiallyPaid;
        }
        mutation.annotate("name", name);

        self.commit(mutation, "Shipping method added").await
    }

    /// Moves a draft to `pending`.
    #[instrument(skip(self), fields(actor = %actor))]
    pub async fn place_order(
        &self,
        order_id: i64,
        expected_version: Option<i32>,
        actor: &Actor,
    ) -> Result<OrderView, ServiceError> {
        metrics::observe(
            "place_order",
            self.place_order_inner(order_id, expected_version, actor).await,
        )
    }

    async fn place_order_inner(
        &self,
        order_id: i64,
        expected_version: Option<i32>,
        actor: &Actor,
    ) -> Result<OrderView, ServiceError> {
        let mut mutation = self.pipeline.begin(order_id, expected_version, actor).await?;
        if mutation.order().status != OrderStatus::Draft {
            return Err(ServiceError::InvalidState(
                "Only draft orders can be placed".into(),
            ));
        }
        if mutation.aggregate().items.is_empty() {
            return Err(ServiceError::InvalidState(
                "Cannot place an order without line items".into(),
            ));
        }

        mutation.order_mut().status = OrderStatus::Pending;
        mutation.notify(Event::OrderPlaced(order_id));
        self.commit(mutation, "Order placed").await
    }

    /// Records fulfillment of line-item quantities.
    ///
    /// Stock is not checked here; inventory belongs to another service.
    #[instrument(skip(self, request), fields(actor = %actor, items = request.items.len()))]
    pub async fn fulfill(
        &self,
        order_id: i64,
        request: FulfillOrderRequest,
        actor: &Actor,
    ) -> Result<OrderView, ServiceError> {
        metrics::observe("fulfill", self.fulfill_inner(order_id, request, actor).await)
    }

    async fn fulfill_inner(
        &self,
        order_id: i64,
        request: FulfillOrderRequest,
        actor: &Actor,
    ) -> Result<OrderView, ServiceError> {
        let mut mutation = self
            .pipeline
            .begin(order_id, request.expected_version, actor)
            .await?;

        match mutation.order().fulfillment_status {
            FulfillmentStatus::Fulfilled => {
                return Err(ServiceError::InvalidState(
                    "Order is already fulfilled".into(),
                ))
            }
            FulfillmentStatus::Canceled => {
                return Err(ServiceError::InvalidState(
                    "Cannot fulfill a canceled order".into(),
                ))
            }
            _ => {}
        }

        let requested = collect_fulfillment_quantities(&request.items)?;
        for (item_id, quantity) in &requested {
            let item = mutation.aggregate().item(*item_id)?;
            let remaining = item.remaining_quantity();
            if *quantity > remaining {
                return Err(ServiceError::ValidationError(format!(
                    "Cannot fulfill {} of line item {}; only {} remaining",
                    quantity, item_id, remaining
                )));
            }
        }
        let request_metadata = metadata_object(request.metadata, "metadata")?;

        let now = mutation.now();
        for item in mutation.items_mut() {
            if let Some(quantity) = requested.get(&item.id) {
                item.fulfilled_quantity += *quantity;
                item.updated_at = now;
            }
        }

        let fully = mutation.aggregate().all_items_fulfilled();
        let order = mutation.order_mut();
        order.fulfillment_status = if fully {
            FulfillmentStatus::Fulfilled
        } else {
            FulfillmentStatus::PartiallyFulfilled
        };
        merge_metadata(&mut order.metadata, request_metadata);

        if let Some(location_id) = request.location_id {
            mutation.annotate("location_id", location_id);
        }
        mutation.annotate(
            "items",
            requested
                .iter()
                .map(|(id, quantity)| serde_json::json!({ "id": id, "quantity": quantity }))
                .collect::<Vec<_>>(),
        );
        mutation.notify(Event::OrderFulfilled {
            order_id,
            partially: !fully,
        });

        let description = if fully {
            "Order fulfilled"
        } else {
            "Order partially fulfilled"
        };
        self.commit(mutation, description).await
    }

    /// Cancels the order and, through the cancel event, its open payment collections.
    #[instrument(skip(self), fields(actor = %actor))]
    pub async fn cancel(
        &self,
        order_id: i64,
        expected_version: Option<i32>,
        actor: &Actor,
    ) -> Result<OrderView, ServiceError> {
        metrics::observe(
            "cancel",
            self.cancel_inner(order_id, expected_version, actor).await,
        )
    }

    async fn cancel_inner(
        &self,
        order_id: i64,
        expected_version: Option<i32>,
        actor: &Actor,
    ) -> Result<OrderView, ServiceError> {
        let mut mutation = self.pipeline.begin(order_id, expected_version, actor).await?;
        match mutation.order().status {
            OrderStatus::Canceled => {
                return Err(ServiceError::InvalidState(
                    "Order is already canceled".into(),
                ))
            }
            OrderStatus::Completed | OrderStatus::Archived => {
                return Err(ServiceError::InvalidState(
                    "Completed or archived orders cannot be canceled".into(),
                ))
            }
            _ => {}
        }

        let now = mutation.now();
        let order = mutation.order_mut();
        order.status = OrderStatus::Canceled;
        order.payment_status = PaymentStatus::Canceled;
        order.fulfillment_status = FulfillmentStatus::Canceled;
        order.canceled_at = Some(now);

        mutation.raise(OrderEvent::Canceled { order_id });
        mutation.notify(Event::OrderCanceled(order_id));
        self.commit(mutation, "Order canceled").await
    }

    #[instrument(skip(self), fields(actor = %actor))]
    pub async fn complete(
        &self,
        order_id: i64,
        expected_version: Option<i32>,
        actor: &Actor,
    ) -> Result<OrderView, ServiceError> {
        metrics::observe(
            "complete",
            self.complete_inner(order_id, expected_version, actor).await,
        )
    }

    async fn complete_inner(
        &self,
        order_id: i64,
        expected_version: Option<i32>,
        actor: &Actor,
    ) -> Result<OrderView, ServiceError> {
        let mut mutation = self.pipeline.begin(order_id, expected_version, actor).await?;
        check_completable(mutation.order())?;

        let now = mutation.now();
        let order = mutation.order_mut();
        order.status = OrderStatus::Completed;
        order.completed_at = Some(now);

        mutation.notify(Event::OrderCompleted(order_id));
        self.commit(mutation, "Order completed").await
    }

    #[instrument(skip(self, request), fields(actor = %actor))]
    pub async fn archive(
        &self,
        order_id: i64,
        request: ArchiveOrderRequest,
        actor: &Actor,
    ) -> Result<OrderView, ServiceError> {
        metrics::observe(
            "archive",
            self.archive_inner(order_id, request, actor).await,
        )
    }

    async fn archive_inner(
        &self,
        order_id: i64,
        request: ArchiveOrderRequest,
        actor: &Actor,
    ) -> Result<OrderView, ServiceError> {
        match request.order_id {
            None => {
                return Err(ServiceError::ValidationError(
                    "order_id is required".into(),
                ))
            }
            Some(requested) if requested != order_id => {
                warn!(requested, order_id, "archive request targets a different order");
                return Err(ServiceError::ValidationError(format!(
                    "Order id {} in request does not match order {}",
                    requested, order_id
                )));
            }
            Some(_) => {}
        }

        let mut mutation = self
            .pipeline
            .begin(order_id, request.expected_version, actor)
            .await?;
        match mutation.order().status {
            OrderStatus::Archived => {
                return Err(ServiceError::InvalidState(
                    "Order is already archived".into(),
                ))
            }
            OrderStatus::Completed | OrderStatus::Canceled => {}
            _ => {
                return Err(ServiceError::InvalidState(
                    "Only completed or canceled orders can be archived".into(),
                ))
            }
        }

        mutation.order_mut().status = OrderStatus::Archived;
        mutation.notify(Event::OrderArchived(order_id));
        self.commit(mutation, "Order archived").await
    }

    /// Administrative force-set of the payment and fulfillment statuses.
    ///
    /// No cross-field rule is checked; the override is still recorded in the change log.
    #[instrument(skip(self, request), fields(actor = %actor))]
    pub async fn update_status_fields(
        &self,
        order_id: i64,
        request: UpdateStatusFieldsRequest,
        actor: &Actor,
    ) -> Result<OrderView, ServiceError> {
        metrics::observe(
            "update_status_fields",
            self.update_status_fields_inner(order_id, request, actor).await,
        )
    }

    async fn update_status_fields_inner(
        &self,
        order_id: i64,
        request: UpdateStatusFieldsRequest,
        actor: &Actor,
    ) -> Result<OrderView, ServiceError> {
        if request.payment_status.is_none() && request.fulfillment_status.is_none() {
            return Err(ServiceError::ValidationError(
                "At least one of payment_status or fulfillment_status is required".into(),
            ));
        }
        let payment_status = request
            .payment_status
            .as_deref()
            .map(|raw| parse_status::<PaymentStatus>("payment status", raw))
            .transpose()?;
        let fulfillment_status = request
            .fulfillment_status
            .as_deref()
            .map(|raw| parse_status::<FulfillmentStatus>("fulfillment status", raw))
            .transpose()?;

        let mut mutation = self
            .pipeline
            .begin(order_id, request.expected_version, actor)
            .await?;

        let mut applied = Vec::new();
        if let Some(status) = payment_status {
            let previous = mutation.order().payment_status;
            mutation.order_mut().payment_status = status;
            mutation.annotate("previous_payment_status", previous.to_string());
            applied.push(format!("payment_status={}", status));
        }
        if let Some(status) = fulfillment_status {
            let previous = mutation.order().fulfillment_status;
            mutation.order_mut().fulfillment_status = status;
            mutation.annotate("previous_fulfillment_status", previous.to_string());
            applied.push(format!("fulfillment_status={}", status));
        }

        warn!(order_id, overrides = %applied.join(", "), "status fields force-set");
        mutation.notify(Event::OrderStatusOverridden {
            order_id,
            payment_status: payment_status.map(|s| s.to_string()),
            fulfillment_status: fulfillment_status.map(|s| s.to_string()),
        });
        let description = format!("Status fields overridden: {}", applied.join(", "));
        self.commit(mutation, &description).await
    }

    pub async fn get_order(&self, order_id: i64) -> Result<OrderView, ServiceError> {
        let aggregate = self.pipeline.load(order_id).await?;
        Ok(OrderFormatter::format_order(&aggregate))
    }

    pub async fn get_draft_order(&self, order_id: i64) -> Result<OrderView, ServiceError> {
        let aggregate = self.pipeline.load(order_id).await?;
        if aggregate.order.status != OrderStatus::Draft {
            return Err(ServiceError::InvalidState(format!(
                "Order {} is not a draft order",
                order_id
            )));
        }
        Ok(OrderFormatter::format_order(&aggregate))
    }

    #[instrument(skip(self))]
    pub async fn list_orders(&self, query: ListOrdersQuery) -> Result<OrderListView, ServiceError> {
        let offset = query.offset.unwrap_or(0);
        let limit = self.paging.clamp(query.limit);
        let (orders, count) = self.pipeline.store().list(offset, limit).await?;
        Ok(OrderFormatter::format_list(&orders, count, offset, limit))
    }

    /// The order's change log, oldest first.
    pub async fn list_changes(&self, order_id: i64) -> Result<Vec<OrderChangeView>, ServiceError> {
        // Surfaces NotFound for unknown orders instead of an empty log.
        self.pipeline.load(order_id).await?;
        let changes = self.pipeline.store().changes_for(order_id).await?;
        Ok(changes.iter().map(OrderFormatter::format_change).collect())
    }

    async fn commit(
        &self,
        mutation: OrderMutation,
        description: &str,
    ) -> Result<OrderView, ServiceError> {
        let aggregate = self.pipeline.commit(mutation, description).await?;
        Ok(OrderFormatter::format_order(&aggregate))
    }
}

/// Preconditions of `complete`, checked in order; the first failure wins.
fn check_completable(order: &order::Model) -> Result<(), ServiceError> {
    if order.status == OrderStatus::Completed {
        return Err(ServiceError::InvalidState(
            "Order is already completed".into(),
        ));
    }
    if matches!(order.status, OrderStatus::Archived | OrderStatus::Canceled) {
        return Err(ServiceError::InvalidState(
            "Cannot complete an archived or canceled order".into(),
        ));
    }
    if order.payment_status != PaymentStatus::Paid {
        return Err(ServiceError::InvalidState(
            "Cannot complete an order with unpaid payment status".into(),
        ));
    }
    if order.fulfillment_status != FulfillmentStatus::Fulfilled {
        return Err(ServiceError::InvalidState(
            "Cannot complete an order that is not fulfilled".into(),
        ));
    }
    Ok(())
}

fn ensure_editable(order: &order::Model, what: &str) -> Result<(), ServiceError> {
    if order.is_editable() {
        return Ok(());
    }
    Err(ServiceError::InvalidState(format!(
        "{} can only be added to draft or pending orders",
        what
    )))
}

fn normalize_currency(raw: Option<&str>) -> Result<String, ServiceError> {
    let code = raw.map(str::trim).unwrap_or_default();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ServiceError::ValidationError(
            "Currency code must be a three-letter ISO 4217 code".into(),
        ));
    }
    Ok(code.to_ascii_uppercase())
}

fn metadata_object(raw: Option<Value>, field: &str) -> Result<Map<String, Value>, ServiceError> {
    match raw {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(ServiceError::ValidationError(format!(
            "{} must be a JSON object",
            field
        ))),
    }
}

/// Request keys overwrite existing keys.
fn merge_metadata(target: &mut Value, incoming: Map<String, Value>) {
    if incoming.is_empty() {
        return;
    }
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(existing) = target {
        existing.extend(incoming);
    }
}

/// Validates requested quantities and sums duplicate line item ids.
fn collect_fulfillment_quantities(
    items: &[FulfillmentItem],
) -> Result<BTreeMap<i64, i32>, ServiceError> {
    if items.is_empty() {
        return Err(ServiceError::ValidationError("No items to fulfill".into()));
    }
    let mut requested: BTreeMap<i64, i32> = BTreeMap::new();
    for item in items {
        if item.quantity <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "Fulfillment quantity for line item {} must be greater than 0",
                item.id
            )));
        }
        let total = requested.entry(item.id).or_insert(0);
        *total = total.checked_add(item.quantity).ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "Fulfillment quantity for line item {} is too large",
                item.id
            ))
        })?;
    }
    Ok(requested)
}

fn build_shipping_method(
    request: AddShippingMethodRequest,
    now: chrono::DateTime<Utc>,
) -> Result<shipping_method::Model, ServiceError> {
    request.validate()?;
    ensure_non_negative("Shipping amount", request.amount)?;
    let metadata = metadata_object(request.metadata, "metadata")?;
    Ok(shipping_method::Model {
        id: UNSAVED_ID,
        order_id: UNSAVED_ID,
        name: request.name,
        shipping_option_id: request.shipping_option_id,
        amount: round_money(request.amount),
        metadata: Value::Object(metadata),
        created_at: now,
        updated_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    fn order_with(
        status: OrderStatus,
        payment: PaymentStatus,
        fulfillment: FulfillmentStatus,
    ) -> order::Model {
        let now = Utc::now();
        order::Model {
            id: 1,
            email: None,
            customer_id: None,
            region_id: None,
            sales_channel_id: None,
            currency_code: "USD".into(),
            status,
            payment_status: payment,
            fulfillment_status: fulfillment,
            item_total: Decimal::ZERO,
            shipping_total: Decimal::ZERO,
            tax_total: Decimal::ZERO,
            discount_total: Decimal::ZERO,
            total: Decimal::ZERO,
            metadata: serde_json::json!({}),
            version: 1,
            created_at: now,
            updated_at: now,
            canceled_at: None,
            completed_at: None,
        }
    }

    #[rstest]
    #[case(OrderStatus::Completed, PaymentStatus::NotPaid, FulfillmentStatus::NotFulfilled, "Order is already completed")]
    #[case(OrderStatus::Archived, PaymentStatus::Paid, FulfillmentStatus::Fulfilled, "Cannot complete an archived or canceled order")]
    #[case(OrderStatus::Canceled, PaymentStatus::Paid, FulfillmentStatus::Fulfilled, "Cannot complete an archived or canceled order")]
    #[case(OrderStatus::Pending, PaymentStatus::PartiallyPaid, FulfillmentStatus::NotFulfilled, "Cannot complete an order with unpaid payment status")]
    #[case(OrderStatus::Pending, PaymentStatus::Paid, FulfillmentStatus::PartiallyFulfilled, "Cannot complete an order that is not fulfilled")]
    fn complete_preconditions_first_failure_wins(
        #[case] status: OrderStatus,
        #[case] payment: PaymentStatus,
        #[case] fulfillment: FulfillmentStatus,
        #[case] message: &str,
    ) {
        let err = check_completable(&order_with(status, payment, fulfillment)).unwrap_err();
        assert_matches!(err, ServiceError::InvalidState(ref m) if m == message);
    }

    #[test]
    fn paid_and_fulfilled_pending_order_is_completable() {
        let order = order_with(
            OrderStatus::Pending,
            PaymentStatus::Paid,
            FulfillmentStatus::Fulfilled,
        );
        assert!(check_completable(&order).is_ok());
    }

    #[test]
    fn fulfillment_quantities_are_validated_and_summed() {
        assert_matches!(
            collect_fulfillment_quantities(&[]),
            Err(ServiceError::ValidationError(ref m)) if m == "No items to fulfill"
        );
        assert_matches!(
            collect_fulfillment_quantities(&[FulfillmentItem { id: 4, quantity: 0 }]),
            Err(ServiceError::ValidationError(_))
        );

        let summed = collect_fulfillment_quantities(&[
            FulfillmentItem { id: 4, quantity: 1 },
            FulfillmentItem { id: 5, quantity: 2 },
            FulfillmentItem { id: 4, quantity: 2 },
        ])
        .unwrap();
        assert_eq!(summed.get(&4), Some(&3));
        assert_eq!(summed.get(&5), Some(&2));
    }

    #[test]
    fn metadata_merge_overwrites_conflicting_keys() {
        let mut target = serde_json::json!({"gift": false, "note": "keep"});
        let incoming = metadata_object(Some(serde_json::json!({"gift": true})), "metadata").unwrap();
        merge_metadata(&mut target, incoming);
        assert_eq!(target, serde_json::json!({"gift": true, "note": "keep"}));
    }

    #[test]
    fn non_object_metadata_is_rejected() {
        assert!(metadata_object(Some(serde_json::json!([1, 2])), "metadata").is_err());
        assert!(metadata_object(Some(Value::Null), "metadata").unwrap().is_empty());
    }

    #[rstest]
    #[case(Some("usd"), Ok("USD"))]
    #[case(Some(" eur "), Ok("EUR"))]
    #[case(Some("US"), Err(()))]
    #[case(Some("U5D"), Err(()))]
    #[case(None, Err(()))]
    fn currency_codes_are_normalized(#[case] raw: Option<&str>, #[case] expected: Result<&str, ()>) {
        let result = normalize_currency(raw);
        match expected {
            Ok(code) => assert_eq!(result.unwrap(), code),
            Err(()) => assert_matches!(result, Err(ServiceError::ValidationError(_))),
        }
    }

    #[test]
    fn page_limit_is_clamped() {
        let paging = PageSettings::default();
        assert_eq!(paging.clamp(None), 10);
        assert_eq!(paging.clamp(Some(0)), 1);
        assert_eq!(paging.clamp(Some(500)), 100);
        assert_eq!(paging.clamp(Some(25)), 25);
    }
}
