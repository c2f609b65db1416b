pub mod checkout;
pub mod entitlements;
pub mod ledger;
pub mod manage_subscription;
pub mod pricing;
pub mod refunds;
pub mod support;
pub mod sync;
pub mod webhooks;
