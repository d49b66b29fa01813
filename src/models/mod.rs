pub mod actor;
pub mod aggregate;
pub mod money;
pub mod status;

pub use actor::Actor;
pub use aggregate::OrderAggregate;
pub use money::OrderTotals;
pub use status::{
    parse_status, FulfillmentStatus, OrderStatus, PaymentCollectionStatus, PaymentStatus,
};
