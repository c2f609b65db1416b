use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::payment_providers::PaymentProvider;
use super::pricing::RequestedPrice;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscriptionRequest {
    pub product_id: Uuid,
    pub email: String,
    pub full_name: String,
    pub password: Option<String>,
    pub payment_method: PaymentProvider,
    pub payment_method_id: Option<String>,
    pub coupon_code: Option<String>,
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub country_code: Option<String>,
}

impl CreateSubscriptionRequest {
    pub fn requested_price(&self) -> Option<RequestedPrice> {
        match (self.amount, self.currency.as_ref()) {
            (Some(amount_minor), Some(currency)) => Some(RequestedPrice {
                amount_minor,
                currency: currency.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscriptionResponse {
    pub subscription_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approve_url: Option<String>,
    pub status: String,
    pub db_subscription_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFreeTrialRequest {
    pub product_id: Uuid,
    pub email: String,
    pub full_name: String,
    pub password: Option<String>,
    pub payment_method_id: Option<String>,
    pub coupon_code: Option<String>,
    pub currency: Option<String>,
    pub amount: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFreeTrialResponse {
    pub success: bool,
    pub subscription_id: String,
    pub db_subscription_id: Uuid,
    pub trial_end_date: DateTime<Utc>,
    pub course_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOneTimePaymentRequest {
    /// One or more products charged together as a single basket.
    pub product_ids: Vec<Uuid>,
    pub email: String,
    pub full_name: String,
    pub payment_method: PaymentProvider,
    pub coupon_code: Option<String>,
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub country_code: Option<String>,
}

impl CreateOneTimePaymentRequest {
    pub fn requested_price(&self) -> Option<RequestedPrice> {
        match (self.amount, self.currency.as_ref()) {
            (Some(amount_minor), Some(currency)) => Some(RequestedPrice {
                amount_minor,
                currency: currency.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOneTimePaymentResponse {
    pub payment_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approve_url: Option<String>,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteOneTimePaymentRequest {
    pub payment_intent_id: String,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteOneTimePaymentResponse {
    pub success: bool,
    pub user_id: Uuid,
    pub course_ids: Vec<Uuid>,
    pub is_new_user: bool,
    /// Echoed only when the account was created with a generated password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivateWalletSubscriptionRequest {
    pub subscription_id: String,
    pub db_subscription_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivateWalletSubscriptionResponse {
    pub success: bool,
    pub subscription_id: String,
    pub user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ManageAction {
    Pause,
    Resume,
    Cancel,
    UpdatePrice,
    ApplyCoupon,
    RemoveCoupon,
    Delete,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ManageActionData {
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub coupon_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManageSubscriptionRequest {
    pub action: ManageAction,
    pub subscription_id: Uuid,
    #[serde(default)]
    pub data: ManageActionData,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManageSubscriptionResponse {
    pub success: bool,
    pub status: String,
    /// Present when the wallet provider requires buyer re-approval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRefundRequest {
    pub order_id: Uuid,
    pub amount: Option<i64>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRefundResponse {
    pub success: bool,
    pub refund_id: String,
    pub refund_amount: i64,
    pub is_full_refund: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub stripe_updated: u32,
    pub paypal_updated: u32,
    pub stripe_orders_created: u32,
    pub paypal_orders_created: u32,
}
