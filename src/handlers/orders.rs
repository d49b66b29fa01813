use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};

use super::{CallerActor, VersionQuery};
use crate::errors::ServiceError;
use crate::services::order_formatter::{OrderChangeView, OrderListView, OrderView};
use crate::services::order_lifecycle::{
    AddLineItemRequest, AddShippingMethodRequest, ArchiveOrderRequest, CreateDraftOrderRequest,
    FulfillOrderRequest, ListOrdersQuery, UpdateStatusFieldsRequest,
};
use crate::{ApiResponse, ApiResult, AppState};

/// Create a draft order
pub async fn create_draft_order(
    State(state): State<AppState>,
    CallerActor(actor): CallerActor,
    Json(payload): Json<CreateDraftOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.create_draft(payload, &actor).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(order))))
}

pub async fn get_draft_order(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<OrderView> {
    let order = state.services.orders.get_draft_order(id).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// List orders by row offset
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> ApiResult<OrderListView> {
    let orders = state.services.orders.list_orders(query).await?;
    Ok(Json(ApiResponse::success(orders)))
}

pub async fn get_order(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<OrderView> {
    let order = state.services.orders.get_order(id).await?;
    Ok(Json(ApiResponse::success(order)))
}

pub async fn add_line_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    CallerActor(actor): CallerActor,
    Json(payload): Json<AddLineItemRequest>,
) -> ApiResult<OrderView> {
    let order = state.services.orders.add_line_item(id, payload, &actor).await?;
    Ok(Json(ApiResponse::success(order)))
}

pub async fn add_shipping_method(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    CallerActor(actor): CallerActor,
    Json(payload): Json<AddShippingMethodRequest>,
) -> ApiResult<OrderView> {
    let order = state
        .services
        .orders
        .add_shipping_method(id, payload, &actor)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

pub async fn place_order(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(version): Query<VersionQuery>,
    CallerActor(actor): CallerActor,
) -> ApiResult<OrderView> {
    let order = state
        .services
        .orders
        .place_order(id, version.expected_version, &actor)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

pub async fn fulfill_order(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    CallerActor(actor): CallerActor,
    Json(payload): Json<FulfillOrderRequest>,
) -> ApiResult<OrderView> {
    let order = state.services.orders.fulfill(id, payload, &actor).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Cancel an order and its open payment collections
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(version): Query<VersionQuery>,
    CallerActor(actor): CallerActor,
) -> ApiResult<OrderView> {
    let order = state
        .services
        .orders
        .cancel(id, version.expected_version, &actor)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

pub async fn complete_order(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(version): Query<VersionQuery>,
    CallerActor(actor): CallerActor,
) -> ApiResult<OrderView> {
    let order = state
        .services
        .orders
        .complete(id, version.expected_version, &actor)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Archive a completed or canceled order
pub async fn archive_order(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    CallerActor(actor): CallerActor,
    Json(payload): Json<ArchiveOrderRequest>,
) -> ApiResult<OrderView> {
    let order = state.services.orders.archive(id, payload, &actor).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Administrative override of payment and fulfillment status
pub async fn update_status_fields(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    CallerActor(actor): CallerActor,
    Json(payload): Json<UpdateStatusFieldsRequest>,
) -> ApiResult<OrderView> {
    let order = state
        .services
        .orders
        .update_status_fields(id, payload, &actor)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

pub async fn list_order_changes(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Vec<OrderChangeView>> {
    let changes = state.services.orders.list_changes(id).await?;
    Ok(Json(ApiResponse::success(changes)))
}
