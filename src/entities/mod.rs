pub mod order;
pub mod order_change;
pub mod order_item;
pub mod payment_collection;
pub mod shipping_method;
