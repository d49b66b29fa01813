//! Order lifecycle back-office library
//!
//! Drafts, fulfills, cancels, completes and archives orders while keeping the
//! status triple, payment collections and the order change log consistent.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod metrics;
pub mod migrator;
pub mod models;
pub mod repositories;
pub mod services;

use axum::{
    routing::{delete, get, post},
    Router,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::models::Actor;
use crate::repositories::OrderStore;
use crate::services::{order_lifecycle::PageSettings, AppServices};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::AppConfig>,
    pub event_sender: events::EventSender,
    pub services: AppServices,
}

impl AppState {
    pub fn new(
        config: config::AppConfig,
        store: Arc<dyn OrderStore>,
        event_sender: events::EventSender,
    ) -> Self {
        let paging = PageSettings {
            default_limit: config.default_page_size,
            max_limit: config.max_page_size,
        };
        Self {
            services: AppServices::new(store, event_sender.clone(), paging),
            config: Arc::new(config),
            event_sender,
        }
    }

    /// Actor recorded when a request carries no caller identity.
    pub fn fallback_actor(&self) -> Actor {
        Actor::new(&self.config.system_actor).unwrap_or_else(Actor::system)
    }
}

// Common response wrappers
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<axum::Json<ApiResponse<T>>, errors::ServiceError>;

pub fn api_routes() -> Router<AppState> {
    let orders = Router::new()
        .route("/orders", get(handlers::orders::list_orders))
        .route("/orders/draft", post(handlers::orders::create_draft_order))
        .route("/orders/draft/:id", get(handlers::orders::get_draft_order))
        .route("/orders/:id", get(handlers::orders::get_order))
        .route("/orders/:id/line-items", post(handlers::orders::add_line_item))
        .route(
            "/orders/:id/shipping-methods",
            post(handlers::orders::add_shipping_method),
        )
        .route("/orders/:id/place", post(handlers::orders::place_order))
        .route("/orders/:id/fulfillments", post(handlers::orders::fulfill_order))
        .route("/orders/:id/cancel", post(handlers::orders::cancel_order))
        .route("/orders/:id/complete", post(handlers::orders::complete_order))
        .route("/orders/:id/archive", post(handlers::orders::archive_order))
        .route("/orders/:id/status", post(handlers::orders::update_status_fields))
        .route("/orders/:id/changes", get(handlers::orders::list_order_changes));

    let payment_collections = Router::new()
        .route(
            "/payment-collections",
            post(handlers::payment_collections::create_payment_collection),
        )
        .route(
            "/payment-collections/:id",
            delete(handlers::payment_collections::delete_payment_collection),
        )
        .route(
            "/payment-collections/:id/mark-as-paid",
            post(handlers::payment_collections::mark_payment_collection_paid),
        );

    orders.merge(payment_collections)
}

/// Full application router with health, metrics and request tracing.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .nest("/api", api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
