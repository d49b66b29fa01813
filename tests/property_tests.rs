//! Property-based tests for the guarded lifecycle operations.
//!
//! Random operation sequences are replayed against a fresh in-memory store and
//! the order invariants are checked after every step. The administrative
//! status override is deliberately absent from the generated operations.

mod common;

use common::TestApp;
use proptest::prelude::*;
use rust_decimal::Decimal;

use order_lifecycle::models::{FulfillmentStatus, OrderStatus, PaymentStatus};
use order_lifecycle::services::order_formatter::OrderView;
use order_lifecycle::services::order_lifecycle::{
    AddLineItemRequest, AddShippingMethodRequest, ArchiveOrderRequest, FulfillOrderRequest,
    FulfillmentItem,
};
use order_lifecycle::services::payment_collections::{
    CreatePaymentCollectionRequest, MarkAsPaidRequest,
};

#[derive(Debug, Clone)]
enum Op {
    AddItem { quantity: i32, cents: i64, tax_cents: i64 },
    AddShipping { cents: i64 },
    Place,
    Fulfill { item: usize, quantity: i32 },
    RequestPayment,
    PayOpenCollection,
    Cancel,
    Complete,
    Archive,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1i32..5, 0i64..10_000, 0i64..500)
            .prop_map(|(quantity, cents, tax_cents)| Op::AddItem { quantity, cents, tax_cents }),
        1 => (0i64..2_000).prop_map(|cents| Op::AddShipping { cents }),
        2 => Just(Op::Place),
        3 => (0usize..3, 1i32..4).prop_map(|(item, quantity)| Op::Fulfill { item, quantity }),
        2 => Just(Op::RequestPayment),
        2 => Just(Op::PayOpenCollection),
        1 => Just(Op::Cancel),
        2 => Just(Op::Complete),
        1 => Just(Op::Archive),
    ]
}

fn totals_are_consistent(order: &OrderView) -> bool {
    order.total == order.item_total + order.tax_total + order.shipping_total - order.discount_total
}

/// Applies one operation; `true` when it was accepted.
async fn apply(app: &TestApp, order_id: i64, op: &Op) -> bool {
    let services = &app.services;
    let actor = &app.actor;
    match op {
        Op::AddItem {
            quantity,
            cents,
            tax_cents,
        } => services
            .orders
            .add_line_item(
                order_id,
                AddLineItemRequest {
                    title: "Generated".into(),
                    quantity: *quantity,
                    unit_price: Decimal::new(*cents, 2),
                    tax_total: Some(Decimal::new(*tax_cents, 2)),
                    ..Default::default()
                },
                actor,
            )
            .await
            .is_ok(),
        Op::AddShipping { cents } => services
            .orders
            .add_shipping_method(
                order_id,
                AddShippingMethodRequest {
                    name: "Generated".into(),
                    amount: Decimal::new(*cents, 2),
                    ..Default::default()
                },
                actor,
            )
            .await
            .is_ok(),
        Op::Place => services.orders.place_order(order_id, None, actor).await.is_ok(),
        Op::Fulfill { item, quantity } => {
            let order = app.order(order_id).await;
            let Some(line) = order.items.get(*item) else {
                return false;
            };
            services
                .orders
                .fulfill(
                    order_id,
                    FulfillOrderRequest {
                        items: vec![FulfillmentItem {
                            id: line.id,
                            quantity: *quantity,
                        }],
                        ..Default::default()
                    },
                    actor,
                )
                .await
                .is_ok()
        }
        Op::RequestPayment => services
            .payment_collections
            .create(
                CreatePaymentCollectionRequest {
                    order_id,
                    ..Default::default()
                },
                actor,
            )
            .await
            .is_ok(),
        Op::PayOpenCollection => {
            let order = app.order(order_id).await;
            let Some(collection) = order.payment_collections.first() else {
                return false;
            };
            services
                .payment_collections
                .mark_as_paid(
                    collection.id,
                    MarkAsPaidRequest {
                        order_id: Some(order_id),
                        expected_version: None,
                    },
                    actor,
                )
                .await
                .is_ok()
        }
        Op::Cancel => services.orders.cancel(order_id, None, actor).await.is_ok(),
        Op::Complete => services.orders.complete(order_id, None, actor).await.is_ok(),
        Op::Archive => services
            .orders
            .archive(
                order_id,
                ArchiveOrderRequest {
                    order_id: Some(order_id),
                    expected_version: None,
                },
                actor,
            )
            .await
            .is_ok(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn lifecycle_invariants_hold_for_any_operation_sequence(
        ops in proptest::collection::vec(op_strategy(), 1..24)
    ) {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        runtime.block_on(async {
            let app = TestApp::new();
            let order_id = app.draft().await.id;

            for op in &ops {
                let before = app.order(order_id).await;
                let changes_before = app.change_count(order_id).await;

                let accepted = apply(&app, order_id, op).await;

                let after = app.order(order_id).await;
                let changes = app.services.orders.list_changes(order_id).await.expect("change log");
                prop_assert!(totals_are_consistent(&after), "inconsistent totals after {:?}", op);

                if accepted {
                    prop_assert_eq!(changes.len(), changes_before + 1, "{:?} must write one change", op);
                    prop_assert_eq!(after.version, before.version + 1);
                    let last = changes.last().expect("change entry");
                    prop_assert_eq!(last.status, after.status);
                    prop_assert_eq!(last.version, after.version);
                } else {
                    prop_assert_eq!(changes.len(), changes_before, "rejected {:?} wrote a change", op);
                    prop_assert_eq!(after.version, before.version);
                    prop_assert_eq!(after.status, before.status);
                }

                match op {
                    Op::Complete if accepted => {
                        prop_assert_eq!(before.payment_status, PaymentStatus::Paid);
                        prop_assert_eq!(before.fulfillment_status, FulfillmentStatus::Fulfilled);
                        prop_assert_eq!(after.status, OrderStatus::Completed);
                    }
                    Op::Archive if accepted => {
                        prop_assert!(matches!(
                            before.status,
                            OrderStatus::Completed | OrderStatus::Canceled
                        ));
                    }
                    Op::Cancel if accepted => {
                        prop_assert!(after
                            .payment_collections
                            .iter()
                            .all(|c| c.status == order_lifecycle::models::PaymentCollectionStatus::Canceled));
                    }
                    Op::Cancel => {
                        prop_assert!(matches!(
                            before.status,
                            OrderStatus::Canceled | OrderStatus::Completed | OrderStatus::Archived
                        ));
                    }
                    _ => {}
                }

                for item in &after.items {
                    prop_assert!(item.fulfilled_quantity <= item.quantity);
                }
            }
            Ok(())
        })?;
    }

    #[test]
    fn complete_fails_unless_paid_and_fulfilled(
        pay in any::<bool>(),
        fulfill in any::<bool>(),
        quantity in 1i32..4,
        cents in 1i64..5_000,
    ) {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        runtime.block_on(async {
            let app = TestApp::new();
            let order = app.pending_order(quantity, Decimal::new(cents, 2)).await;
            if pay {
                app.pay_in_full(order.id).await;
            }
            if fulfill {
                app.fulfill_all(order.id).await;
            }
            let before = app.order(order.id).await;

            let result = app.services.orders.complete(order.id, None, &app.actor).await;

            let after = app.order(order.id).await;
            if pay && fulfill {
                prop_assert!(result.is_ok());
                prop_assert_eq!(after.status, OrderStatus::Completed);
            } else {
                prop_assert!(result.is_err());
                prop_assert_eq!(after.status, before.status);
                prop_assert_eq!(after.version, before.version);
            }
            Ok(())
        })?;
    }
}
