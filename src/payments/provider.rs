use async_trait::async_trait;
use mockall::automock;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::enums::billing_intervals::BillingInterval;
use crate::domain::value_objects::enums::payment_providers::PaymentProvider;

/// Errors crossing the provider boundary. `Rejected` and `RefundFailed`
/// carry the provider's own message so it can be surfaced to the caller.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("provider rejected the payment: {0}")]
    Rejected(String),
    #[error("refund failed: {0}")]
    RefundFailed(String),
    #[error("invalid webhook signature")]
    InvalidSignature,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

#[derive(Debug, Clone)]
pub struct BuyerInfo {
    pub email: String,
    pub full_name: String,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct ChargeLineItem {
    pub product_id: Uuid,
    pub name: String,
    pub amount_minor: i64,
}

/// Provider-side status, normalized across both providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStatus {
    Pending,
    Trialing,
    Active,
    Paused,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct ChargeHandle {
    pub payment_id: String,
    /// Card provider: secret the front end uses to confirm the intent.
    pub client_secret: Option<String>,
    /// Wallet provider: URL the buyer must visit to approve the charge.
    pub approve_url: Option<String>,
    pub status: ProviderStatus,
}

#[derive(Debug, Clone)]
pub struct PlanSpec {
    pub product_id: Uuid,
    pub product_name: String,
    pub interval: BillingInterval,
    pub amount_minor: i64,
    pub currency: String,
    pub trial_days: Option<i32>,
}

impl PlanSpec {
    /// Deterministic key so repeated calls reuse the provider-side price/plan
    /// object instead of accumulating immutable duplicates.
    pub fn lookup_key(&self) -> String {
        format!(
            "{}-{}-{}-{}",
            self.product_id,
            self.interval,
            self.currency.to_lowercase(),
            self.amount_minor
        )
    }
}

#[derive(Debug, Clone)]
pub struct PlanHandle {
    pub plan_id: String,
}

#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    pub subscription_id: String,
    pub status: ProviderStatus,
    /// Wallet provider only: activation is deferred until the buyer approves
    /// out-of-band at this URL.
    pub approve_url: Option<String>,
    pub client_secret: Option<String>,
    pub period_start: Option<i64>,
    pub period_end: Option<i64>,
    pub trial_end: Option<i64>,
    /// Provider payment id of the most recent charge, when known.
    pub latest_payment_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TransactionDetail {
    pub transaction_id: String,
    pub fee_minor: Option<i64>,
    pub net_minor: Option<i64>,
    pub amount_minor: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct RefundHandle {
    pub refund_id: String,
    pub amount_minor: i64,
    /// The capture actually refunded; differs from the requested id when the
    /// wallet fallback resolved a subscription id to its latest capture.
    pub refunded_payment_id: String,
}

#[derive(Debug, Clone)]
pub struct PriceUpdate {
    /// False when the buyer must re-approve before the new price applies.
    pub applied: bool,
    pub approval_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RecurringDiscount {
    pub percent: Option<i32>,
    pub amount_minor: Option<i64>,
    pub currency: String,
}

/// Signature material accompanying a webhook delivery.
#[derive(Debug, Clone)]
pub enum WebhookSignature {
    Card {
        signature_header: String,
    },
    Wallet {
        transmission_id: String,
        transmission_time: String,
        transmission_sig: String,
        cert_url: String,
        auth_algo: String,
    },
}

/// Verified provider event, normalized to provider id + type + raw object.
#[derive(Debug, Clone)]
pub struct ProviderEvent {
    pub event_id: String,
    pub event_type: String,
    pub object: serde_json::Value,
}

/// Uniform capability set over both payment providers. Selected per row by
/// the `PaymentProvider` discriminant, never by inheritance.
#[automock]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn provider(&self) -> PaymentProvider;

    async fn create_one_time_charge(
        &self,
        amount_minor: i64,
        currency: &str,
        buyer: &BuyerInfo,
        line_items: &[ChargeLineItem],
    ) -> GatewayResult<ChargeHandle>;

    /// Idempotent per (product, interval, currency, amount): implementations
    /// reuse an existing provider-side plan keyed by `PlanSpec::lookup_key`.
    async fn create_recurring_plan(&self, plan: &PlanSpec) -> GatewayResult<PlanHandle>;

    /// Card provider: synchronous, returns trialing/active immediately.
    /// Wallet provider: only requests approval; the handle carries an
    /// approve URL and activation happens via a later activation call.
    async fn activate_recurring_plan<'a>(
        &self,
        plan: &PlanHandle,
        buyer: &BuyerInfo,
        payment_method_id: Option<&'a str>,
        trial_days: Option<i32>,
    ) -> GatewayResult<SubscriptionHandle>;

    async fn fetch_subscription(&self, subscription_id: &str) -> GatewayResult<SubscriptionHandle>;

    /// Best-effort: the wallet provider's transaction ledger may lag, so
    /// callers retry with backoff and tolerate None.
    async fn fetch_transaction_detail(
        &self,
        payment_id: &str,
    ) -> GatewayResult<Option<TransactionDetail>>;

    async fn issue_refund<'a>(
        &self,
        payment_id: &str,
        amount_minor: Option<i64>,
        currency: &str,
        reason: Option<&'a str>,
    ) -> GatewayResult<RefundHandle>;

    /// Card provider price edits apply next cycle; wallet edits require a
    /// new plan plus buyer re-approval, signalled by `approval_url`.
    async fn update_price(
        &self,
        subscription_id: &str,
        amount_minor: i64,
        currency: &str,
        interval: BillingInterval,
    ) -> GatewayResult<PriceUpdate>;

    async fn apply_recurring_discount(
        &self,
        subscription_id: &str,
        discount: &RecurringDiscount,
    ) -> GatewayResult<()>;

    async fn remove_recurring_discount(&self, subscription_id: &str) -> GatewayResult<()>;

    /// Idempotent: pausing an already-paused subscription is a no-op success.
    async fn pause(&self, subscription_id: &str) -> GatewayResult<()>;
    async fn resume(&self, subscription_id: &str) -> GatewayResult<()>;
    async fn cancel(&self, subscription_id: &str, at_period_end: bool) -> GatewayResult<()>;

    async fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &WebhookSignature,
    ) -> GatewayResult<ProviderEvent>;
}
