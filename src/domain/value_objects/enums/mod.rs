pub mod billing_intervals;
pub mod entitlement_items;
pub mod order_statuses;
pub mod payment_providers;
pub mod product_types;
pub mod subscription_statuses;
