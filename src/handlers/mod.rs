use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;

use crate::models::Actor;
use crate::AppState;

pub mod orders;
pub mod payment_collections;

/// Header carrying the identity of the caller behind a request.
pub const ACTOR_HEADER: &str = "x-actor-id";

/// Caller identity taken from the `x-actor-id` header, falling back to the
/// configured system actor.
#[derive(Debug, Clone)]
pub struct CallerActor(pub Actor);

#[async_trait]
impl FromRequestParts<AppState> for CallerActor {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let actor = parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Actor::new(value))
            .unwrap_or_else(|| state.fallback_actor());
        Ok(CallerActor(actor))
    }
}

/// Optional optimistic-lock token passed as `?expected_version=N`.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct VersionQuery {
    pub expected_version: Option<i32>,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "up",
            "version": env!("CARGO_PKG_VERSION"),
            "environment": state.config.environment,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}

pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::render(),
    )
}
