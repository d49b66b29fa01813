use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};

use super::{CallerActor, VersionQuery};
use crate::errors::ServiceError;
use crate::services::order_formatter::PaymentCollectionView;
use crate::services::payment_collections::{CreatePaymentCollectionRequest, MarkAsPaidRequest};
use crate::{ApiResponse, ApiResult, AppState};

pub async fn create_payment_collection(
    State(state): State<AppState>,
    CallerActor(actor): CallerActor,
    Json(payload): Json<CreatePaymentCollectionRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let collection = state
        .services
        .payment_collections
        .create(payload, &actor)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(collection))))
}

/// Delete a payment collection that holds no funds
pub async fn delete_payment_collection(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(version): Query<VersionQuery>,
    CallerActor(actor): CallerActor,
) -> ApiResult<()> {
    state
        .services
        .payment_collections
        .delete(id, version.expected_version, &actor)
        .await?;
    Ok(Json(ApiResponse::message(format!(
        "Payment collection {} deleted",
        id
    ))))
}

pub async fn mark_payment_collection_paid(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    CallerActor(actor): CallerActor,
    Json(payload): Json<MarkAsPaidRequest>,
) -> ApiResult<PaymentCollectionView> {
    let collection = state
        .services
        .payment_collections
        .mark_as_paid(id, payload, &actor)
        .await?;
    Ok(Json(ApiResponse::success(collection)))
}
