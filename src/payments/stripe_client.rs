use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{error, info};

use crate::domain::value_objects::enums::billing_intervals::BillingInterval;
use crate::domain::value_objects::enums::payment_providers::PaymentProvider;
use crate::payments::provider::{
    BuyerInfo, ChargeHandle, ChargeLineItem, GatewayError, GatewayResult, PaymentGateway,
    PlanHandle, PlanSpec, PriceUpdate, ProviderEvent, ProviderStatus, RecurringDiscount,
    RefundHandle, SubscriptionHandle, TransactionDetail, WebhookSignature,
};

type HmacSha256 = Hmac<Sha256>;

const API_BASE: &str = "https://api.stripe.com";

/// Card-provider client built on reqwest. All mutating calls are
/// form-encoded per the provider's API.
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    webhook_secret: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorDetails,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetails {
    #[serde(rename = "type")]
    type_: Option<String>,
    code: Option<String>,
    message: Option<String>,
    decline_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentIntentResp {
    id: String,
    status: String,
    client_secret: Option<String>,
    latest_charge: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct PriceResp {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PriceListResp {
    data: Vec<PriceResp>,
}

#[derive(Debug, Deserialize)]
struct CustomerResp {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SubscriptionResp {
    id: String,
    status: String,
    current_period_start: Option<i64>,
    current_period_end: Option<i64>,
    trial_end: Option<i64>,
    latest_invoice: Option<LatestInvoice>,
    #[serde(default)]
    items: SubscriptionItems,
}

#[derive(Debug, Deserialize, Default)]
struct SubscriptionItems {
    data: Vec<SubscriptionItem>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionItem {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LatestInvoice {
    Id(String),
    Object {
        payment_intent: Option<InvoicePaymentIntent>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InvoicePaymentIntent {
    Id(String),
    Object {
        id: String,
        client_secret: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct ChargeResp {
    id: String,
    balance_transaction: Option<BalanceTransactionRef>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BalanceTransactionRef {
    Id(String),
    Object(BalanceTransactionResp),
}

#[derive(Debug, Deserialize)]
struct BalanceTransactionResp {
    id: String,
    fee: i64,
    net: i64,
    amount: i64,
}

#[derive(Debug, Deserialize)]
struct RefundResp {
    id: String,
    amount: i64,
}

#[derive(Debug, Deserialize)]
struct CouponResp {
    id: String,
}

fn map_status(status: &str) -> ProviderStatus {
    match status {
        "trialing" => ProviderStatus::Trialing,
        "active" | "succeeded" => ProviderStatus::Active,
        "paused" => ProviderStatus::Paused,
        "canceled" => ProviderStatus::Cancelled,
        _ => ProviderStatus::Pending,
    }
}

impl StripeClient {
    pub fn new(secret_key: String, webhook_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key,
            webhook_secret,
        }
    }

    /// Parses a failed response into the provider's own message. Card
    /// declines become `Rejected`; everything else stays an internal error.
    async fn reject_on_failure(
        resp: reqwest::Response,
        context: &str,
    ) -> GatewayResult<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        let details = serde_json::from_str::<StripeErrorEnvelope>(&body)
            .ok()
            .map(|envelope| envelope.error);

        let message = details
            .as_ref()
            .and_then(|d| d.message.clone())
            .unwrap_or_else(|| format!("card provider request failed ({status})"));

        error!(
            status = %status,
            error_type = ?details.as_ref().and_then(|d| d.type_.clone()),
            error_code = ?details.as_ref().and_then(|d| d.code.clone()),
            decline_code = ?details.as_ref().and_then(|d| d.decline_code.clone()),
            context = %context,
            "stripe api request failed"
        );

        match details.as_ref().and_then(|d| d.type_.as_deref()) {
            Some("card_error") | Some("invalid_request_error") => {
                Err(GatewayError::Rejected(message))
            }
            _ => Err(GatewayError::Other(anyhow!(
                "Stripe API request failed: {context} (status {status})"
            ))),
        }
    }

    async fn post_form(
        &self,
        path: &str,
        body: &[(String, String)],
        context: &str,
    ) -> GatewayResult<reqwest::Response> {
        let resp = self
            .http
            .post(format!("{API_BASE}{path}"))
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(body)
            .send()
            .await
            .context(format!("sending {context}"))?;

        Self::reject_on_failure(resp, context).await
    }

    async fn get(&self, path_and_query: &str, context: &str) -> GatewayResult<reqwest::Response> {
        let resp = self
            .http
            .get(format!("{API_BASE}{path_and_query}"))
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .send()
            .await
            .context(format!("sending {context}"))?;

        Self::reject_on_failure(resp, context).await
    }

    async fn find_or_create_price(&self, plan: &PlanSpec) -> GatewayResult<String> {
        let lookup_key = plan.lookup_key();

        // Provider-side price objects are immutable; reuse by lookup key
        // instead of creating a duplicate on every call.
        let listed: PriceListResp = self
            .get(
                &format!("/v1/prices?lookup_keys[]={lookup_key}&active=true"),
                "list prices by lookup key",
            )
            .await?
            .json()
            .await
            .context("parsing price list")?;

        if let Some(existing) = listed.data.into_iter().next() {
            return Ok(existing.id);
        }

        let body = vec![
            ("currency".to_string(), plan.currency.to_lowercase()),
            ("unit_amount".to_string(), plan.amount_minor.to_string()),
            ("lookup_key".to_string(), lookup_key),
            (
                "recurring[interval]".to_string(),
                plan.interval.to_string(),
            ),
            (
                "product_data[name]".to_string(),
                plan.product_name.clone(),
            ),
        ];

        let created: PriceResp = self
            .post_form("/v1/prices", &body, "create price")
            .await?
            .json()
            .await
            .context("parsing created price")?;

        Ok(created.id)
    }

    async fn create_customer(
        &self,
        buyer: &BuyerInfo,
        payment_method_id: Option<&str>,
    ) -> GatewayResult<String> {
        let mut body = vec![
            ("email".to_string(), buyer.email.clone()),
            ("name".to_string(), buyer.full_name.clone()),
        ];
        if let Some(user_id) = buyer.user_id {
            body.push(("metadata[user_id]".to_string(), user_id.to_string()));
        }
        if let Some(pm) = payment_method_id {
            body.push(("payment_method".to_string(), pm.to_string()));
            body.push((
                "invoice_settings[default_payment_method]".to_string(),
                pm.to_string(),
            ));
        }

        let customer: CustomerResp = self
            .post_form("/v1/customers", &body, "create customer")
            .await?
            .json()
            .await
            .context("parsing created customer")?;

        Ok(customer.id)
    }

    fn subscription_handle(sub: SubscriptionResp) -> SubscriptionHandle {
        let (latest_payment_id, client_secret) = match sub.latest_invoice {
            Some(LatestInvoice::Object {
                payment_intent: Some(InvoicePaymentIntent::Object { id, client_secret }),
            }) => (Some(id), client_secret),
            Some(LatestInvoice::Object {
                payment_intent: Some(InvoicePaymentIntent::Id(id)),
            }) => (Some(id), None),
            _ => (None, None),
        };

        SubscriptionHandle {
            subscription_id: sub.id,
            status: map_status(&sub.status),
            approve_url: None,
            client_secret,
            period_start: sub.current_period_start,
            period_end: sub.current_period_end,
            trial_end: sub.trial_end,
            latest_payment_id,
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Card
    }

    async fn create_one_time_charge(
        &self,
        amount_minor: i64,
        currency: &str,
        buyer: &BuyerInfo,
        line_items: &[ChargeLineItem],
    ) -> GatewayResult<ChargeHandle> {
        let mut body = vec![
            ("amount".to_string(), amount_minor.to_string()),
            ("currency".to_string(), currency.to_lowercase()),
            ("receipt_email".to_string(), buyer.email.clone()),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
            ("metadata[full_name]".to_string(), buyer.full_name.clone()),
        ];
        for (idx, item) in line_items.iter().enumerate() {
            body.push((
                format!("metadata[product_{idx}]"),
                item.product_id.to_string(),
            ));
        }

        let intent: PaymentIntentResp = self
            .post_form("/v1/payment_intents", &body, "create payment intent")
            .await?
            .json()
            .await
            .context("parsing payment intent")?;

        info!(payment_intent_id = %intent.id, status = %intent.status, "stripe payment intent created");

        Ok(ChargeHandle {
            status: map_status(&intent.status),
            payment_id: intent.id,
            client_secret: intent.client_secret,
            approve_url: None,
        })
    }

    async fn create_recurring_plan(&self, plan: &PlanSpec) -> GatewayResult<PlanHandle> {
        let price_id = self.find_or_create_price(plan).await?;
        Ok(PlanHandle { plan_id: price_id })
    }

    async fn activate_recurring_plan<'a>(
        &self,
        plan: &PlanHandle,
        buyer: &BuyerInfo,
        payment_method_id: Option<&'a str>,
        trial_days: Option<i32>,
    ) -> GatewayResult<SubscriptionHandle> {
        let customer_id = self.create_customer(buyer, payment_method_id).await?;

        let mut body = vec![
            ("customer".to_string(), customer_id),
            ("items[0][price]".to_string(), plan.plan_id.clone()),
            (
                "payment_behavior".to_string(),
                "default_incomplete".to_string(),
            ),
            (
                "expand[]".to_string(),
                "latest_invoice.payment_intent".to_string(),
            ),
        ];
        if let Some(pm) = payment_method_id {
            body.push(("default_payment_method".to_string(), pm.to_string()));
        }
        if let Some(days) = trial_days {
            body.push(("trial_period_days".to_string(), days.to_string()));
        }

        let sub: SubscriptionResp = self
            .post_form("/v1/subscriptions", &body, "create subscription")
            .await?
            .json()
            .await
            .context("parsing created subscription")?;

        info!(subscription_id = %sub.id, status = %sub.status, "stripe subscription created");

        Ok(Self::subscription_handle(sub))
    }

    async fn fetch_subscription(&self, subscription_id: &str) -> GatewayResult<SubscriptionHandle> {
        let sub: SubscriptionResp = self
            .get(
                &format!("/v1/subscriptions/{subscription_id}"),
                "retrieve subscription",
            )
            .await?
            .json()
            .await
            .context("parsing subscription")?;

        Ok(Self::subscription_handle(sub))
    }

    async fn fetch_transaction_detail(
        &self,
        payment_id: &str,
    ) -> GatewayResult<Option<TransactionDetail>> {
        let intent: PaymentIntentResp = self
            .get(
                &format!(
                    "/v1/payment_intents/{payment_id}?expand[]=latest_charge.balance_transaction"
                ),
                "retrieve payment intent",
            )
            .await?
            .json()
            .await
            .context("parsing payment intent")?;

        let Some(latest_charge) = intent.latest_charge else {
            return Ok(None);
        };
        let charge: ChargeResp =
            serde_json::from_value(latest_charge).context("parsing latest charge")?;

        match charge.balance_transaction {
            Some(BalanceTransactionRef::Object(txn)) => Ok(Some(TransactionDetail {
                transaction_id: txn.id,
                fee_minor: Some(txn.fee),
                net_minor: Some(txn.net),
                amount_minor: Some(txn.amount),
            })),
            // Balance transaction not settled yet; callers retry with backoff.
            Some(BalanceTransactionRef::Id(_)) | None => Ok(Some(TransactionDetail {
                transaction_id: charge.id,
                fee_minor: None,
                net_minor: None,
                amount_minor: None,
            })),
        }
    }

    async fn issue_refund<'a>(
        &self,
        payment_id: &str,
        amount_minor: Option<i64>,
        _currency: &str,
        reason: Option<&'a str>,
    ) -> GatewayResult<RefundHandle> {
        let mut body = vec![("payment_intent".to_string(), payment_id.to_string())];
        if let Some(amount) = amount_minor {
            body.push(("amount".to_string(), amount.to_string()));
        }
        if let Some(reason) = reason {
            body.push(("metadata[reason]".to_string(), reason.to_string()));
        }

        let result = self.post_form("/v1/refunds", &body, "create refund").await;
        let resp = match result {
            Ok(resp) => resp,
            // Already-refunded, amount-exceeds-captured and malformed-id
            // failures all surface as refund failures, not generic errors.
            Err(GatewayError::Rejected(message)) => {
                return Err(GatewayError::RefundFailed(message));
            }
            Err(other) => return Err(other),
        };

        let refund: RefundResp = resp.json().await.context("parsing refund")?;
        Ok(RefundHandle {
            refund_id: refund.id,
            amount_minor: refund.amount,
            refunded_payment_id: payment_id.to_string(),
        })
    }

    async fn update_price(
        &self,
        subscription_id: &str,
        amount_minor: i64,
        currency: &str,
        interval: BillingInterval,
    ) -> GatewayResult<PriceUpdate> {
        let sub: SubscriptionResp = self
            .get(
                &format!("/v1/subscriptions/{subscription_id}"),
                "retrieve subscription for price update",
            )
            .await?
            .json()
            .await
            .context("parsing subscription")?;

        let item_id = sub
            .items
            .data
            .first()
            .map(|item| item.id.clone())
            .ok_or_else(|| anyhow!("subscription has no items"))?;

        let plan = PlanSpec {
            product_id: uuid::Uuid::nil(),
            product_name: String::new(),
            interval,
            amount_minor,
            currency: currency.to_string(),
            trial_days: None,
        };
        // Price objects are immutable, so a price edit swaps the item to a
        // new (or reused) price. Takes effect next cycle, no buyer action.
        let price_id = self.find_or_create_price(&plan).await?;

        let body = vec![
            ("items[0][id]".to_string(), item_id),
            ("items[0][price]".to_string(), price_id),
            ("proration_behavior".to_string(), "none".to_string()),
        ];
        self.post_form(
            &format!("/v1/subscriptions/{subscription_id}"),
            &body,
            "update subscription price",
        )
        .await?;

        Ok(PriceUpdate {
            applied: true,
            approval_url: None,
        })
    }

    async fn apply_recurring_discount(
        &self,
        subscription_id: &str,
        discount: &RecurringDiscount,
    ) -> GatewayResult<()> {
        let mut body = vec![("duration".to_string(), "forever".to_string())];
        match (discount.percent, discount.amount_minor) {
            (Some(percent), _) => body.push(("percent_off".to_string(), percent.to_string())),
            (None, Some(amount)) => {
                body.push(("amount_off".to_string(), amount.to_string()));
                body.push(("currency".to_string(), discount.currency.to_lowercase()));
            }
            (None, None) => return Err(GatewayError::Other(anyhow!("empty discount"))),
        }

        let coupon: CouponResp = self
            .post_form("/v1/coupons", &body, "create coupon")
            .await?
            .json()
            .await
            .context("parsing coupon")?;

        let body = vec![("discounts[0][coupon]".to_string(), coupon.id)];
        self.post_form(
            &format!("/v1/subscriptions/{subscription_id}"),
            &body,
            "attach coupon to subscription",
        )
        .await?;

        Ok(())
    }

    async fn remove_recurring_discount(&self, subscription_id: &str) -> GatewayResult<()> {
        let resp = self
            .http
            .delete(format!(
                "{API_BASE}/v1/subscriptions/{subscription_id}/discount"
            ))
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .send()
            .await
            .context("sending remove discount")?;

        // Removing an absent discount is a no-op success.
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::reject_on_failure(resp, "remove discount").await?;
        Ok(())
    }

    async fn pause(&self, subscription_id: &str) -> GatewayResult<()> {
        let body = vec![(
            "pause_collection[behavior]".to_string(),
            "void".to_string(),
        )];
        self.post_form(
            &format!("/v1/subscriptions/{subscription_id}"),
            &body,
            "pause subscription",
        )
        .await?;
        Ok(())
    }

    async fn resume(&self, subscription_id: &str) -> GatewayResult<()> {
        let body = vec![("pause_collection".to_string(), "".to_string())];
        self.post_form(
            &format!("/v1/subscriptions/{subscription_id}"),
            &body,
            "resume subscription",
        )
        .await?;
        Ok(())
    }

    async fn cancel(&self, subscription_id: &str, at_period_end: bool) -> GatewayResult<()> {
        if at_period_end {
            let body = vec![("cancel_at_period_end".to_string(), "true".to_string())];
            self.post_form(
                &format!("/v1/subscriptions/{subscription_id}"),
                &body,
                "cancel subscription at period end",
            )
            .await?;
            return Ok(());
        }

        let resp = self
            .http
            .delete(format!("{API_BASE}/v1/subscriptions/{subscription_id}"))
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .send()
            .await
            .context("sending cancel subscription")?;

        // Cancelling an already-cancelled subscription is a no-op success.
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::reject_on_failure(resp, "cancel subscription").await?;
        Ok(())
    }

    /// Verifies the `t=...,v1=...` signature header against the shared
    /// webhook secret.
    async fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &WebhookSignature,
    ) -> GatewayResult<ProviderEvent> {
        let WebhookSignature::Card { signature_header } = signature else {
            return Err(GatewayError::InvalidSignature);
        };

        let mut timestamp: Option<&str> = None;
        let mut provided_sig: Option<&str> = None;
        for part in signature_header.split(',') {
            if let Some(rest) = part.strip_prefix("t=") {
                timestamp = Some(rest);
            } else if let Some(rest) = part.strip_prefix("v1=") {
                provided_sig = Some(rest);
            }
        }
        let (Some(timestamp), Some(provided_sig)) = (timestamp, provided_sig) else {
            return Err(GatewayError::InvalidSignature);
        };

        let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| GatewayError::InvalidSignature)?;
        mac.update(signed_payload.as_bytes());
        let expected = mac.finalize().into_bytes();
        let provided = hex::decode(provided_sig).map_err(|_| GatewayError::InvalidSignature)?;

        if expected[..] != provided[..] {
            return Err(GatewayError::InvalidSignature);
        }

        #[derive(Deserialize)]
        struct RawEvent {
            id: String,
            #[serde(rename = "type")]
            type_: String,
            data: RawEventData,
        }
        #[derive(Deserialize)]
        struct RawEventData {
            object: serde_json::Value,
        }

        let event: RawEvent =
            serde_json::from_slice(payload).map_err(|err| GatewayError::Other(err.into()))?;

        Ok(ProviderEvent {
            event_id: event.id,
            event_type: event.type_,
            object: event.data.object,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed_header(secret: &str, timestamp: &str, payload: &[u8]) -> String {
        let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(signed_payload.as_bytes());
        let sig = hex::encode(mac.finalize().into_bytes());
        format!("t={timestamp},v1={sig}")
    }

    #[tokio::test]
    async fn verifies_valid_webhook_signature() {
        let client = StripeClient::new("sk_test_x".into(), "whsec_testing".into());
        let payload =
            br#"{"id":"evt_1","type":"payment_intent.succeeded","data":{"object":{"id":"pi_1"}}}"#;
        let header = signed_header("whsec_testing", "1700000000", payload);

        let event = client
            .verify_webhook(
                payload,
                &WebhookSignature::Card {
                    signature_header: header,
                },
            )
            .await
            .unwrap();

        assert_eq!(event.event_id, "evt_1");
        assert_eq!(event.event_type, "payment_intent.succeeded");
    }

    #[tokio::test]
    async fn rejects_tampered_webhook_payload() {
        let client = StripeClient::new("sk_test_x".into(), "whsec_testing".into());
        let payload =
            br#"{"id":"evt_1","type":"payment_intent.succeeded","data":{"object":{"id":"pi_1"}}}"#;
        let header = signed_header("whsec_testing", "1700000000", payload);

        let tampered =
            br#"{"id":"evt_2","type":"payment_intent.succeeded","data":{"object":{"id":"pi_2"}}}"#;
        let result = client
            .verify_webhook(
                tampered,
                &WebhookSignature::Card {
                    signature_header: header,
                },
            )
            .await;

        assert!(matches!(result, Err(GatewayError::InvalidSignature)));
    }

    #[test]
    fn plan_lookup_key_is_deterministic() {
        let plan = PlanSpec {
            product_id: uuid::Uuid::nil(),
            product_name: "Course".into(),
            interval: BillingInterval::Month,
            amount_minor: 2900,
            currency: "GBP".into(),
            trial_days: None,
        };
        assert_eq!(
            plan.lookup_key(),
            "00000000-0000-0000-0000-000000000000-month-gbp-2900"
        );
    }
}
