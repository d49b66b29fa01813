use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{info, instrument};

use crate::entities::payment_collection;
use crate::errors::ServiceError;
use crate::events::{Event, OrderEvent, OrderEventHandler};
use crate::metrics;
use crate::models::money::{checked_sum, derive_payment_status, round_money};
use crate::models::{Actor, OrderStatus, PaymentCollectionStatus, PaymentStatus};
use crate::repositories::UNSAVED_ID;
use crate::services::mutation::{MutationPipeline, OrderMutation};
use crate::services::order_formatter::{OrderFormatter, PaymentCollectionView};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreatePaymentCollectionRequest {
    pub order_id: i64,
    /// Defaults to the order total.
    pub amount: Option<Decimal>,
    pub metadata: Option<Value>,
    pub expected_version: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarkAsPaidRequest {
    pub order_id: Option<i64>,
    pub expected_version: Option<i32>,
}

/// Cancels every open payment collection of an order that is being canceled.
///
/// Runs inside the cancel mutation, so the collections are written in the same
/// unit of work as the order. Already canceled collections are left untouched.
#[derive(Debug, Default)]
pub struct PaymentCollectionCascade;

impl OrderEventHandler for PaymentCollectionCascade {
    fn name(&self) -> &'static str {
        "payment_collection_cascade"
    }

    fn handle(&self, event: &OrderEvent, mutation: &mut OrderMutation) -> Result<(), ServiceError> {
        let OrderEvent::Canceled { order_id } = event;
        let now = mutation.now();

        let mut canceled = Vec::new();
        for collection in mutation.payment_collections_mut() {
            if collection.status == PaymentCollectionStatus::Canceled {
                continue;
            }
            collection.status = PaymentCollectionStatus::Canceled;
            collection.updated_at = now;
            canceled.push(collection.id);
        }

        if !canceled.is_empty() {
            info!(order_id, collections = ?canceled, "payment collections canceled with order");
            mutation.annotate("canceled_payment_collections", canceled.clone());
        }
        for collection_id in canceled {
            mutation.notify(Event::PaymentCollectionCanceled {
                collection_id,
                order_id: *order_id,
            });
        }
        Ok(())
    }
}

/// Requests, removes and settles payment collections of an order.
#[derive(Clone)]
pub struct PaymentCollectionService {
    pipeline: MutationPipeline,
}

impl PaymentCollectionService {
    pub fn new(pipeline: MutationPipeline) -> Self {
        Self { pipeline }
    }

    #[instrument(skip(self, request), fields(order_id = request.order_id, actor = %actor))]
    pub async fn create(
        &self,
        request: CreatePaymentCollectionRequest,
        actor: &Actor,
    ) -> Result<PaymentCollectionView, ServiceError> {
        metrics::observe(
            "create_payment_collection",
            self.create_inner(request, actor).await,
        )
    }

    async fn create_inner(
        &self,
        request: CreatePaymentCollectionRequest,
        actor: &Actor,
    ) -> Result<PaymentCollectionView, ServiceError> {
        let mut mutation = self
            .pipeline
            .begin(request.order_id, request.expected_version, actor)
            .await?;
        if matches!(
            mutation.order().status,
            OrderStatus::Canceled | OrderStatus::Archived
        ) {
            return Err(ServiceError::InvalidState(
                "Cannot request payment for a canceled or archived order".into(),
            ));
        }

        let amount = round_money(request.amount.unwrap_or(mutation.order().total));
        if amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Payment collection amount must be greater than 0".into(),
            ));
        }
        let metadata = match request.metadata {
            None | Some(Value::Null) => serde_json::json!({}),
            Some(value @ Value::Object(_)) => value,
            Some(_) => {
                return Err(ServiceError::ValidationError(
                    "metadata must be a JSON object".into(),
                ))
            }
        };

        checked_sum(
            "Payment collection",
            mutation
                .aggregate()
                .payment_collections
                .iter()
                .map(|c| c.amount)
                .chain([amount]),
        )?;

        let existing: HashSet<i64> = mutation
            .aggregate()
            .payment_collections
            .iter()
            .map(|c| c.id)
            .collect();
        let now = mutation.now();
        let currency_code = mutation.order().currency_code.clone();
        mutation.add_payment_collection(payment_collection::Model {
            id: UNSAVED_ID,
            order_id: request.order_id,
            currency_code,
            amount,
            authorized_amount: Decimal::ZERO,
            captured_amount: Decimal::ZERO,
            refunded_amount: Decimal::ZERO,
            status: PaymentCollectionStatus::Awaiting,
            completed_at: None,
            metadata,
            created_at: now,
            updated_at: now,
        });
        if mutation.order().payment_status == PaymentStatus::NotPaid {
            mutation.order_mut().payment_status = PaymentStatus::Awaiting;
        }
        mutation.annotate("amount", amount.to_string());

        let aggregate = self
            .pipeline
            .commit(mutation, "Payment collection requested")
            .await?;
        let created = aggregate
            .payment_collections
            .iter()
            .filter(|c| !existing.contains(&c.id))
            .max_by_key(|c| c.id)
            .ok_or_else(|| {
                ServiceError::InternalError("Created payment collection was not persisted".into())
            })?;

        self.pipeline
            .event_sender()
            .publish_all(vec![Event::PaymentCollectionCreated {
                collection_id: created.id,
                order_id: created.order_id,
            }])
            .await;
        Ok(OrderFormatter::format_payment_collection(created))
    }

    /// Removes a payment collection and re-derives the order's payment status.
    /// Authorized or captured collections are kept.
    #[instrument(skip(self), fields(actor = %actor))]
    pub async fn delete(
        &self,
        collection_id: i64,
        expected_version: Option<i32>,
        actor: &Actor,
    ) -> Result<(), ServiceError> {
        metrics::observe(
            "delete_payment_collection",
            self.delete_inner(collection_id, expected_version, actor).await,
        )
    }

    async fn delete_inner(
        &self,
        collection_id: i64,
        expected_version: Option<i32>,
        actor: &Actor,
    ) -> Result<(), ServiceError> {
        let collection = self.find(collection_id).await?;
        if collection.status.holds_funds() {
            return Err(ServiceError::InvalidState(
                "Cannot delete a payment collection that is authorized or captured".into(),
            ));
        }

        let mut mutation = self
            .pipeline
            .begin(collection.order_id, expected_version, actor)
            .await?;
        // Re-checked against the freshly loaded order.
        match mutation.remove_payment_collection(collection_id) {
            Some(current) if current.status.holds_funds() => {
                return Err(ServiceError::InvalidState(
                    "Cannot delete a payment collection that is authorized or captured".into(),
                ))
            }
            Some(_) => {}
            None => {
                return Err(ServiceError::NotFound(format!(
                    "Payment collection {} not found",
                    collection_id
                )))
            }
        }

        if matches!(
            mutation.order().payment_status,
            PaymentStatus::NotPaid
                | PaymentStatus::Awaiting
                | PaymentStatus::PartiallyPaid
                | PaymentStatus::Paid
        ) {
            let status = derive_payment_status(
                mutation.order().total,
                &mutation.aggregate().payment_collections,
            )?;
            mutation.order_mut().payment_status = status;
        }
        mutation.annotate("payment_collection_id", collection_id);
        mutation.notify(Event::PaymentCollectionDeleted {
            collection_id,
            order_id: collection.order_id,
        });

        self.pipeline
            .commit(mutation, "Payment collection deleted")
            .await?;
        Ok(())
    }

    /// Settles a collection manually and recomputes the order's payment status.
    #[instrument(skip(self, request), fields(actor = %actor))]
    pub async fn mark_as_paid(
        &self,
        collection_id: i64,
        request: MarkAsPaidRequest,
        actor: &Actor,
    ) -> Result<PaymentCollectionView, ServiceError> {
        metrics::observe(
            "mark_payment_collection_paid",
            self.mark_as_paid_inner(collection_id, request, actor).await,
        )
    }

    async fn mark_as_paid_inner(
        &self,
        collection_id: i64,
        request: MarkAsPaidRequest,
        actor: &Actor,
    ) -> Result<PaymentCollectionView, ServiceError> {
        let order_id = request.order_id.ok_or_else(|| {
            ServiceError::ValidationError("order_id is required".into())
        })?;
        let collection = self.find(collection_id).await?;
        if collection.order_id != order_id {
            return Err(ServiceError::ValidationError(format!(
                "Payment collection {} does not belong to order {}",
                collection_id, order_id
            )));
        }

        let mut mutation = self
            .pipeline
            .begin(order_id, request.expected_version, actor)
            .await?;
        let now = mutation.now();
        let collection = mutation
            .payment_collections_mut()
            .iter_mut()
            .find(|c| c.id == collection_id)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Payment collection {} not found", collection_id))
            })?;
        match collection.status {
            PaymentCollectionStatus::Paid => {
                return Err(ServiceError::InvalidState(
                    "Payment collection is already paid".into(),
                ))
            }
            PaymentCollectionStatus::Canceled => {
                return Err(ServiceError::InvalidState(
                    "Cannot mark a canceled payment collection as paid".into(),
                ))
            }
            _ => {}
        }
        collection.status = PaymentCollectionStatus::Paid;
        collection.captured_amount = collection.amount;
        collection.completed_at = Some(now);
        collection.updated_at = now;

        let payment_status = derive_payment_status(
            mutation.order().total,
            &mutation.aggregate().payment_collections,
        )?;
        mutation.order_mut().payment_status = payment_status;
        mutation.annotate("payment_collection_id", collection_id);
        mutation.annotate("payment_status", payment_status.to_string());
        mutation.notify(Event::PaymentCollectionPaid {
            collection_id,
            order_id,
        });

        let aggregate = self
            .pipeline
            .commit(mutation, "Payment collection marked as paid")
            .await?;
        aggregate
            .payment_collection(collection_id)
            .map(OrderFormatter::format_payment_collection)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Payment collection {} not found", collection_id))
            })
    }

    async fn find(&self, collection_id: i64) -> Result<payment_collection::Model, ServiceError> {
        self.pipeline
            .store()
            .find_payment_collection(collection_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Payment collection {} not found", collection_id))
            })
    }
}
