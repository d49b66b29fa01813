//! Runs the lifecycle against the SeaORM store on an in-memory SQLite database.

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal_macros::dec;

use order_lifecycle::config::AppConfig;
use order_lifecycle::db;
use order_lifecycle::errors::ServiceError;
use order_lifecycle::models::{OrderStatus, PaymentCollectionStatus};
use order_lifecycle::repositories::SeaOrmOrderStore;
use order_lifecycle::services::order_lifecycle::ArchiveOrderRequest;

async fn sqlite_app() -> TestApp {
    let mut cfg = AppConfig::new(
        "sqlite::memory:".into(),
        "127.0.0.1".into(),
        18_080,
        "test".into(),
    );
    // One connection keeps every query on the same in-memory database.
    cfg.db_max_connections = 1;
    cfg.db_min_connections = 1;

    let pool = db::establish_connection_from_app_config(&cfg)
        .await
        .expect("failed to create test database");
    db::run_migrations(&pool).await.expect("migrations");
    db::check_connection(&pool).await.expect("connection");

    TestApp::with_store(Arc::new(SeaOrmOrderStore::new(Arc::new(pool))))
}

#[tokio::test]
#[ignore = "requires the sqlx SQLite driver at test time"]
async fn lifecycle_round_trip_through_sqlite() {
    let app = sqlite_app().await;

    let order = app.completable_order().await;
    let completed = app
        .services
        .orders
        .complete(order.id, Some(order.version), &app.actor)
        .await
        .unwrap();
    assert_eq!(completed.status, OrderStatus::Completed);

    let archived = app
        .services
        .orders
        .archive(
            order.id,
            ArchiveOrderRequest {
                order_id: Some(order.id),
                expected_version: None,
            },
            &app.actor,
        )
        .await
        .unwrap();
    assert_eq!(archived.status, OrderStatus::Archived);
    assert_eq!(archived.total, dec!(50.00));

    let changes = app.services.orders.list_changes(order.id).await.unwrap();
    assert_eq!(changes.last().unwrap().version, archived.version);
    assert!(changes.windows(2).all(|w| w[0].version < w[1].version));
}

#[tokio::test]
#[ignore = "requires the sqlx SQLite driver at test time"]
async fn sqlite_cancel_cascades_and_rejects_stale_versions() {
    let app = sqlite_app().await;
    let order = app.pending_order(1, dec!(30)).await;
    app.request_payment(order.id).await;
    let current = app.order(order.id).await;

    let stale = app
        .services
        .orders
        .cancel(order.id, Some(current.version - 1), &app.actor)
        .await
        .unwrap_err();
    assert_matches!(stale, ServiceError::Conflict(_));

    let canceled = app
        .services
        .orders
        .cancel(order.id, Some(current.version), &app.actor)
        .await
        .unwrap();
    assert_eq!(canceled.status, OrderStatus::Canceled);
    assert!(canceled
        .payment_collections
        .iter()
        .all(|c| c.status == PaymentCollectionStatus::Canceled));
}
