pub mod checkout;
pub mod payments_sync;
pub mod refunds;
pub mod subscriptions;
pub mod webhooks;
