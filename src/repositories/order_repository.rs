use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionError,
    TransactionTrait,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::{version_conflict, NewOrder, OrderStore, UnitOfWork};
use crate::entities::{order, order_change, order_item, payment_collection, shipping_method};
use crate::errors::ServiceError;
use crate::models::OrderAggregate;

/// Order store backed by a relational database through SeaORM.
#[derive(Debug, Clone)]
pub struct SeaOrmOrderStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmOrderStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn load_children<C: ConnectionTrait>(
        conn: &C,
        orders: Vec<order::Model>,
    ) -> Result<Vec<OrderAggregate>, ServiceError> {
        if orders.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = orders.iter().map(|o| o.id).collect();

        let mut items = group_by_order(
            order_item::Entity::find()
                .filter(order_item::Column::OrderId.is_in(ids.clone()))
                .order_by_asc(order_item::Column::Id)
                .all(conn)
                .await?,
            |i| i.order_id,
        );
        let mut shipping_methods = group_by_order(
            shipping_method::Entity::find()
                .filter(shipping_method::Column::OrderId.is_in(ids.clone()))
                .order_by_asc(shipping_method::Column::Id)
                .all(conn)
                .await?,
            |s| s.order_id,
        );
        let mut collections = group_by_order(
            payment_collection::Entity::find()
                .filter(payment_collection::Column::OrderId.is_in(ids))
                .order_by_asc(payment_collection::Column::Id)
                .all(conn)
                .await?,
            |c| c.order_id,
        );

        Ok(orders
            .into_iter()
            .map(|order| OrderAggregate {
                items: items.remove(&order.id).unwrap_or_default(),
                shipping_methods: shipping_methods.remove(&order.id).unwrap_or_default(),
                payment_collections: collections.remove(&order.id).unwrap_or_default(),
                order,
            })
            .collect())
    }
}

fn group_by_order<T>(rows: Vec<T>, key: impl Fn(&T) -> i64) -> HashMap<i64, Vec<T>> {
    let mut grouped: HashMap<i64, Vec<T>> = HashMap::new();
    for row in rows {
        grouped.entry(key(&row)).or_default().push(row);
    }
    grouped
}

fn map_transaction_error(err: TransactionError<ServiceError>) -> ServiceError {
    match err {
        TransactionError::Connection(db_err) => ServiceError::StorageError(db_err),
        TransactionError::Transaction(service_err) => service_err,
    }
}

#[async_trait]
impl OrderStore for SeaOrmOrderStore {
    #[instrument(skip(self, new_order))]
    async fn create_order(&self, new_order: NewOrder) -> Result<OrderAggregate, ServiceError> {
        let aggregate = self
            .db
            .transaction::<_, OrderAggregate, ServiceError>(|txn| {
                Box::pin(async move {
                    let mut order_model = order::ActiveModel::from(new_order.order).reset_all();
                    order_model.id = NotSet;
                    let order = order_model.insert(txn).await?;

                    let mut shipping_methods = Vec::with_capacity(new_order.shipping_methods.len());
                    for method in new_order.shipping_methods {
                        let mut active = shipping_method::ActiveModel::from(method).reset_all();
                        active.id = NotSet;
                        active.order_id = Set(order.id);
                        shipping_methods.push(active.insert(txn).await?);
                    }

                    Ok(OrderAggregate {
                        order,
                        items: Vec::new(),
                        shipping_methods,
                        payment_collections: Vec::new(),
                    })
                })
            })
            .await
            .map_err(map_transaction_error)?;

        debug!(order_id = aggregate.order.id, "order inserted");
        Ok(aggregate)
    }

    async fn load(&self, order_id: i64) -> Result<Option<OrderAggregate>, ServiceError> {
        let Some(order) = order::Entity::find_by_id(order_id)
            .one(self.db.as_ref())
            .await?
        else {
            return Ok(None);
        };
        Ok(Self::load_children(self.db.as_ref(), vec![order])
            .await?
            .pop())
    }

    async fn list(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<OrderAggregate>, u64), ServiceError> {
        let count = order::Entity::find().count(self.db.as_ref()).await?;
        let orders = order::Entity::find()
            .order_by_asc(order::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(self.db.as_ref())
            .await?;
        let page = Self::load_children(self.db.as_ref(), orders).await?;
        Ok((page, count))
    }

    async fn changes_for(&self, order_id: i64) -> Result<Vec<order_change::Model>, ServiceError> {
        Ok(order_change::Entity::find()
            .filter(order_change::Column::OrderId.eq(order_id))
            .order_by_asc(order_change::Column::Id)
            .all(self.db.as_ref())
            .await?)
    }

    async fn find_payment_collection(
        &self,
        collection_id: i64,
    ) -> Result<Option<payment_collection::Model>, ServiceError> {
        Ok(payment_collection::Entity::find_by_id(collection_id)
            .one(self.db.as_ref())
            .await?)
    }

    #[instrument(skip(self, unit), fields(order_id = unit.order_id(), expected_version = unit.expected_version))]
    async fn commit(&self, unit: UnitOfWork) -> Result<order_change::Model, ServiceError> {
        unit.check_version_step()?;

        let change = self
            .db
            .transaction::<_, order_change::Model, ServiceError>(|txn| {
                Box::pin(async move {
                    let order_id = unit.order_id();
                    let now = unit.order.updated_at;

                    // Compare-and-increment: only the row still at the expected version is written.
                    let updated = order::Entity::update_many()
                        .set(order::ActiveModel::from(unit.order).reset_all())
                        .filter(order::Column::Id.eq(order_id))
                        .filter(order::Column::Version.eq(unit.expected_version))
                        .exec(txn)
                        .await?;
                    if updated.rows_affected == 0 {
                        let exists = order::Entity::find_by_id(order_id).one(txn).await?;
                        return Err(match exists {
                            None => ServiceError::NotFound(format!("Order {} not found", order_id)),
                            Some(_) => version_conflict(order_id, unit.expected_version),
                        });
                    }

                    for item in unit.new_items {
                        let mut active = order_item::ActiveModel::from(item).reset_all();
                        active.id = NotSet;
                        active.order_id = Set(order_id);
                        active.created_at = Set(now);
                        active.updated_at = Set(now);
                        active.insert(txn).await?;
                    }
                    for item in unit.updated_items {
                        let updated = order_item::Entity::update_many()
                            .set(order_item::ActiveModel::from(item.clone()).reset_all())
                            .filter(order_item::Column::Id.eq(item.id))
                            .filter(order_item::Column::OrderId.eq(order_id))
                            .exec(txn)
                            .await?;
                        if updated.rows_affected == 0 {
                            return Err(ServiceError::db_error(format!(
                                "order item {} does not belong to order {}",
                                item.id, order_id
                            )));
                        }
                    }
                    for method in unit.new_shipping_methods {
                        let mut active = shipping_method::ActiveModel::from(method).reset_all();
                        active.id = NotSet;
                        active.order_id = Set(order_id);
                        active.created_at = Set(now);
                        active.updated_at = Set(now);
                        active.insert(txn).await?;
                    }
                    for collection in unit.new_payment_collections {
                        let mut active =
                            payment_collection::ActiveModel::from(collection).reset_all();
                        active.id = NotSet;
                        active.order_id = Set(order_id);
                        active.created_at = Set(now);
                        active.updated_at = Set(now);
                        active.insert(txn).await?;
                    }
                    for collection in unit.updated_payment_collections {
                        let updated = payment_collection::Entity::update_many()
                            .set(payment_collection::ActiveModel::from(collection.clone()).reset_all())
                            .filter(payment_collection::Column::Id.eq(collection.id))
                            .filter(payment_collection::Column::OrderId.eq(order_id))
                            .exec(txn)
                            .await?;
                        if updated.rows_affected == 0 {
                            return Err(ServiceError::db_error(format!(
                                "payment collection {} does not belong to order {}",
                                collection.id, order_id
                            )));
                        }
                    }
                    if !unit.deleted_payment_collections.is_empty() {
                        let expected = unit.deleted_payment_collections.len() as u64;
                        let deleted = payment_collection::Entity::delete_many()
                            .filter(
                                payment_collection::Column::Id
                                    .is_in(unit.deleted_payment_collections),
                            )
                            .filter(payment_collection::Column::OrderId.eq(order_id))
                            .exec(txn)
                            .await?;
                        if deleted.rows_affected != expected {
                            return Err(ServiceError::db_error(format!(
                                "payment collections to delete do not all belong to order {}",
                                order_id
                            )));
                        }
                    }

                    let change = order_change::ActiveModel {
                        id: NotSet,
                        order_id: Set(order_id),
                        version: Set(unit.change.version),
                        status: Set(unit.change.status),
                        requested_by: Set(unit.change.requested_by),
                        requested_at: Set(unit.change.requested_at),
                        confirmed_by: Set(unit.change.confirmed_by),
                        confirmed_at: Set(unit.change.confirmed_at),
                        metadata: Set(unit.change.metadata),
                        created_at: Set(now),
                        updated_at: Set(now),
                    };
                    Ok(change.insert(txn).await?)
                })
            })
            .await
            .map_err(map_transaction_error)?;

        debug!(change_id = change.id, "unit of work committed");
        Ok(change)
    }
}
