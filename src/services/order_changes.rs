use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::entities::order;
use crate::models::Actor;
use crate::repositories::NewOrderChange;

/// Builds the single change-log entry written by each accepted mutation.
pub struct OrderChangeEmitter;

impl OrderChangeEmitter {
    /// Captures the post-mutation version and status of `order`.
    ///
    /// Every change is auto-confirmed: requester and confirmer are the same actor
    /// at the same instant. `description` always wins over a `description` key in
    /// `extra`.
    pub fn stage(
        order: &order::Model,
        description: &str,
        actor: &Actor,
        at: DateTime<Utc>,
        extra: Map<String, Value>,
    ) -> NewOrderChange {
        let mut metadata = extra;
        metadata.insert("description".into(), Value::String(description.to_string()));

        NewOrderChange {
            version: order.version,
            status: order.status,
            requested_by: actor.to_string(),
            requested_at: at,
            confirmed_by: actor.to_string(),
            confirmed_at: at,
            metadata: Value::Object(metadata),
        }
    }
}
