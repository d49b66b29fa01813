use crate::errors::ServiceError;
use crate::services::mutation::OrderMutation;

/// Facts raised by the lifecycle controller while an order mutation is still open.
///
/// Handlers run before the unit of work is committed, so everything they change
/// is persisted (or discarded) together with the order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderEvent {
    Canceled { order_id: i64 },
}

pub trait OrderEventHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn handle(&self, event: &OrderEvent, mutation: &mut OrderMutation) -> Result<(), ServiceError>;
}
