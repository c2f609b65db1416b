use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::domain::value_objects::enums::billing_intervals::BillingInterval;
use crate::domain::value_objects::enums::payment_providers::PaymentProvider;
use crate::payments::provider::{
    BuyerInfo, ChargeHandle, ChargeLineItem, GatewayError, GatewayResult, PaymentGateway,
    PlanHandle, PlanSpec, PriceUpdate, ProviderEvent, ProviderStatus, RecurringDiscount,
    RefundHandle, SubscriptionHandle, TransactionDetail, WebhookSignature,
};

/// How far back the transaction listing looks when a stored payment id turns
/// out to be a subscription id. Deliberately unchanged heuristic: several
/// charges in the window can make this pick the wrong cycle.
const CAPTURE_LOOKBACK_DAYS: i64 = 30;

/// Wallet-provider client. Subscription activation is approval-deferred:
/// creation returns an approve URL and a later activation call confirms
/// provider-side status.
pub struct PaypalClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    webhook_id: String,
    api_base: String,
    token_cache: RwLock<Option<CachedToken>>,
}

struct CachedToken {
    access_token: String,
    expires_at: std::time::Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResp {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct PaypalErrorBody {
    name: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct LinkDescription {
    rel: String,
    href: String,
}

fn approve_link(links: &[LinkDescription]) -> Option<String> {
    links
        .iter()
        .find(|link| link.rel == "approve")
        .map(|link| link.href.clone())
}

#[derive(Debug, Serialize, Deserialize)]
struct Money {
    currency_code: String,
    value: String,
}

/// Minor units to the provider's decimal string. Both supported providers
/// bill in two-decimal currencies here.
fn minor_to_decimal(amount_minor: i64) -> String {
    format!("{}.{:02}", amount_minor / 100, (amount_minor % 100).abs())
}

pub(crate) fn decimal_to_minor(value: &str) -> Option<i64> {
    let mut parts = value.splitn(2, '.');
    let whole: i64 = parts.next()?.parse().ok()?;
    let frac_str = parts.next().unwrap_or("0");
    let frac: i64 = format!("{frac_str:0<2}")[..2].parse().ok()?;
    Some(whole * 100 + if whole < 0 { -frac } else { frac })
}

fn map_status(status: &str) -> ProviderStatus {
    match status {
        "ACTIVE" | "APPROVED" => ProviderStatus::Active,
        "SUSPENDED" => ProviderStatus::Paused,
        "CANCELLED" | "EXPIRED" => ProviderStatus::Cancelled,
        _ => ProviderStatus::Pending,
    }
}

#[derive(Debug, Deserialize)]
struct SubscriptionResp {
    id: String,
    status: String,
    #[serde(default)]
    links: Vec<LinkDescription>,
    billing_info: Option<BillingInfo>,
}

#[derive(Debug, Deserialize)]
struct BillingInfo {
    next_billing_time: Option<chrono::DateTime<Utc>>,
    last_payment: Option<LastPayment>,
}

#[derive(Debug, Deserialize)]
struct LastPayment {
    time: Option<chrono::DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct TransactionsResp {
    #[serde(default)]
    transactions: Vec<TransactionResp>,
}

#[derive(Debug, Deserialize)]
struct TransactionResp {
    id: String,
    status: String,
    time: chrono::DateTime<Utc>,
    amount_with_breakdown: Option<AmountBreakdown>,
}

#[derive(Debug, Deserialize)]
struct AmountBreakdown {
    gross_amount: Option<Money>,
    fee_amount: Option<Money>,
    net_amount: Option<Money>,
}

#[derive(Debug, Deserialize)]
struct CaptureResp {
    id: String,
    seller_receivable_breakdown: Option<SellerBreakdown>,
}

#[derive(Debug, Deserialize)]
struct SellerBreakdown {
    gross_amount: Option<Money>,
    paypal_fee: Option<Money>,
    net_amount: Option<Money>,
}

#[derive(Debug, Deserialize)]
struct PlanResp {
    id: String,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlanListResp {
    #[serde(default)]
    plans: Vec<PlanResp>,
}

#[derive(Debug, Deserialize)]
struct PlanDetailResp {
    product_id: String,
}

impl PaypalClient {
    pub fn new(
        client_id: String,
        client_secret: String,
        webhook_id: String,
        api_base: String,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id,
            client_secret,
            webhook_id,
            api_base,
            token_cache: RwLock::new(None),
        }
    }

    async fn access_token(&self) -> Result<String> {
        {
            let cached = self.token_cache.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at > std::time::Instant::now() {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let resp = self
            .http
            .post(format!("{}/v1/oauth2/token", self.api_base))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .context("requesting oauth token")?;

        if !resp.status().is_success() {
            anyhow::bail!("wallet provider token request failed ({})", resp.status());
        }
        let token: TokenResp = resp.json().await.context("parsing oauth token")?;

        let mut cached = self.token_cache.write().await;
        // Refresh one minute early so in-flight calls never race expiry.
        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at: std::time::Instant::now()
                + std::time::Duration::from_secs(token.expires_in.saturating_sub(60)),
        });

        Ok(token.access_token)
    }

    async fn reject_on_failure(
        resp: reqwest::Response,
        context: &str,
    ) -> GatewayResult<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        let details = serde_json::from_str::<PaypalErrorBody>(&body).ok();
        let message = details
            .as_ref()
            .and_then(|d| d.message.clone())
            .unwrap_or_else(|| format!("wallet provider request failed ({status})"));

        error!(
            status = %status,
            error_name = ?details.as_ref().and_then(|d| d.name.clone()),
            response_body = %body,
            context = %context,
            "paypal api request failed"
        );

        if status.is_client_error() {
            Err(GatewayError::Rejected(message))
        } else {
            Err(GatewayError::Other(anyhow!(
                "PayPal API request failed: {context} (status {status})"
            )))
        }
    }

    async fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
        context: &str,
    ) -> GatewayResult<reqwest::Response> {
        let token = self.access_token().await?;
        let resp = self
            .http
            .post(format!("{}{path}", self.api_base))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .context(format!("sending {context}"))?;

        Self::reject_on_failure(resp, context).await
    }

    async fn get(&self, path_and_query: &str, context: &str) -> GatewayResult<reqwest::Response> {
        let token = self.access_token().await?;
        let resp = self
            .http
            .get(format!("{}{path_and_query}", self.api_base))
            .bearer_auth(token)
            .send()
            .await
            .context(format!("sending {context}"))?;

        Self::reject_on_failure(resp, context).await
    }

    /// Lifecycle posts (suspend/activate/cancel) where repeating the call
    /// against a row already in the target state must be a no-op success.
    async fn post_lifecycle(&self, path: &str, reason: &str, context: &str) -> GatewayResult<()> {
        let token = self.access_token().await.map_err(GatewayError::Other)?;
        let resp = self
            .http
            .post(format!("{}{path}", self.api_base))
            .bearer_auth(token)
            .json(&json!({ "reason": reason }))
            .send()
            .await
            .context(format!("sending {context}"))?;

        if resp.status() == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
            warn!(context = %context, "paypal lifecycle call was a no-op (already in target state)");
            return Ok(());
        }
        Self::reject_on_failure(resp, context).await?;
        Ok(())
    }

    fn catalog_product_id(plan: &PlanSpec) -> String {
        format!("PROD-{}", plan.product_id.simple())
    }

    async fn ensure_catalog_product(&self, plan: &PlanSpec) -> GatewayResult<String> {
        let product_id = Self::catalog_product_id(plan);
        let token = self.access_token().await.map_err(GatewayError::Other)?;

        let resp = self
            .http
            .post(format!("{}/v1/catalogs/products", self.api_base))
            .bearer_auth(token)
            .header("PayPal-Request-Id", product_id.clone())
            .json(&json!({
                "id": product_id,
                "name": plan.product_name,
                "type": "DIGITAL",
            }))
            .send()
            .await
            .context("sending create catalog product")?;

        // 409/422 means the deterministic id already exists; that is the
        // idempotent reuse we want.
        if resp.status().is_success()
            || resp.status() == reqwest::StatusCode::CONFLICT
            || resp.status() == reqwest::StatusCode::UNPROCESSABLE_ENTITY
        {
            return Ok(product_id);
        }
        Self::reject_on_failure(resp, "create catalog product").await?;
        Ok(product_id)
    }

    fn billing_cycles(plan: &PlanSpec) -> serde_json::Value {
        let mut cycles = Vec::new();
        let mut sequence = 1;
        if let Some(trial_days) = plan.trial_days {
            cycles.push(json!({
                "frequency": { "interval_unit": "DAY", "interval_count": trial_days },
                "tenure_type": "TRIAL",
                "sequence": sequence,
                "total_cycles": 1,
            }));
            sequence += 1;
        }
        cycles.push(json!({
            "frequency": {
                "interval_unit": plan.interval.as_str().to_uppercase(),
                "interval_count": 1,
            },
            "tenure_type": "REGULAR",
            "sequence": sequence,
            "total_cycles": 0,
            "pricing_scheme": {
                "fixed_price": Money {
                    currency_code: plan.currency.to_uppercase(),
                    value: minor_to_decimal(plan.amount_minor),
                },
            },
        }));
        json!(cycles)
    }

    async fn find_or_create_plan(&self, plan: &PlanSpec) -> GatewayResult<String> {
        let product_id = self.ensure_catalog_product(plan).await?;
        let lookup_key = plan.lookup_key();

        // Plans are immutable once created; the lookup key in the plan name
        // lets us reuse instead of accumulating duplicates.
        let listed: PlanListResp = self
            .get(
                &format!("/v1/billing/plans?product_id={product_id}&page_size=20"),
                "list billing plans",
            )
            .await?
            .json()
            .await
            .context("parsing plan list")?;

        if let Some(existing) = listed
            .plans
            .into_iter()
            .find(|p| p.name.as_deref() == Some(lookup_key.as_str()))
        {
            return Ok(existing.id);
        }

        let created: PlanResp = self
            .post_json(
                "/v1/billing/plans",
                json!({
                    "product_id": product_id,
                    "name": lookup_key,
                    "billing_cycles": Self::billing_cycles(plan),
                    "payment_preferences": {
                        "auto_bill_outstanding": true,
                        "payment_failure_threshold": 3,
                    },
                }),
                "create billing plan",
            )
            .await?
            .json()
            .await
            .context("parsing created plan")?;

        Ok(created.id)
    }

    fn subscription_handle(sub: SubscriptionResp) -> SubscriptionHandle {
        let approve_url = approve_link(&sub.links);
        let (period_start, period_end) = match sub.billing_info.as_ref() {
            Some(info) => (
                info.last_payment
                    .as_ref()
                    .and_then(|p| p.time)
                    .map(|t| t.timestamp()),
                info.next_billing_time.map(|t| t.timestamp()),
            ),
            None => (None, None),
        };

        SubscriptionHandle {
            subscription_id: sub.id,
            status: map_status(&sub.status),
            approve_url,
            client_secret: None,
            period_start,
            period_end,
            trial_end: None,
            latest_payment_id: None,
        }
    }

    /// Resolves the most recent completed capture for a subscription within
    /// the lookback window. Used when a stored payment id is actually a
    /// subscription id.
    async fn latest_completed_transaction(
        &self,
        subscription_id: &str,
    ) -> GatewayResult<Option<TransactionResp>> {
        let end = Utc::now();
        let start = end - Duration::days(CAPTURE_LOOKBACK_DAYS);
        let listed: TransactionsResp = self
            .get(
                &format!(
                    "/v1/billing/subscriptions/{subscription_id}/transactions?start_time={}&end_time={}",
                    start.to_rfc3339(),
                    end.to_rfc3339()
                ),
                "list subscription transactions",
            )
            .await?
            .json()
            .await
            .context("parsing subscription transactions")?;

        Ok(listed
            .transactions
            .into_iter()
            .filter(|txn| txn.status == "COMPLETED")
            .max_by_key(|txn| txn.time))
    }

    fn is_subscription_id(payment_id: &str) -> bool {
        payment_id.starts_with("I-")
    }
}

#[async_trait]
impl PaymentGateway for PaypalClient {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Wallet
    }

    async fn create_one_time_charge(
        &self,
        amount_minor: i64,
        currency: &str,
        buyer: &BuyerInfo,
        line_items: &[ChargeLineItem],
    ) -> GatewayResult<ChargeHandle> {
        let description = line_items
            .iter()
            .map(|item| item.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        #[derive(Debug, Deserialize)]
        struct OrderResp {
            id: String,
            status: String,
            #[serde(default)]
            links: Vec<LinkDescription>,
        }

        let order: OrderResp = self
            .post_json(
                "/v2/checkout/orders",
                json!({
                    "intent": "CAPTURE",
                    "purchase_units": [{
                        "amount": Money {
                            currency_code: currency.to_uppercase(),
                            value: minor_to_decimal(amount_minor),
                        },
                        "description": description,
                        "custom_id": buyer.email,
                    }],
                }),
                "create checkout order",
            )
            .await?
            .json()
            .await
            .context("parsing checkout order")?;

        info!(order_id = %order.id, status = %order.status, "paypal checkout order created");

        Ok(ChargeHandle {
            approve_url: approve_link(&order.links),
            status: if order.status == "COMPLETED" {
                ProviderStatus::Active
            } else {
                ProviderStatus::Pending
            },
            payment_id: order.id,
            client_secret: None,
        })
    }

    async fn create_recurring_plan(&self, plan: &PlanSpec) -> GatewayResult<PlanHandle> {
        let plan_id = self.find_or_create_plan(plan).await?;
        Ok(PlanHandle { plan_id })
    }

    async fn activate_recurring_plan<'a>(
        &self,
        plan: &PlanHandle,
        buyer: &BuyerInfo,
        _payment_method_id: Option<&'a str>,
        _trial_days: Option<i32>,
    ) -> GatewayResult<SubscriptionHandle> {
        let (given_name, surname) = match buyer.full_name.split_once(' ') {
            Some((first, rest)) => (first.to_string(), rest.to_string()),
            None => (buyer.full_name.clone(), String::new()),
        };

        let sub: SubscriptionResp = self
            .post_json(
                "/v1/billing/subscriptions",
                json!({
                    "plan_id": plan.plan_id,
                    "subscriber": {
                        "email_address": buyer.email,
                        "name": { "given_name": given_name, "surname": surname },
                    },
                }),
                "create subscription",
            )
            .await?
            .json()
            .await
            .context("parsing created subscription")?;

        info!(subscription_id = %sub.id, status = %sub.status, "paypal subscription requested");

        // Activation is deferred: the handle carries the approve URL and the
        // caller waits for the buyer to approve out-of-band.
        Ok(Self::subscription_handle(sub))
    }

    async fn fetch_subscription(&self, subscription_id: &str) -> GatewayResult<SubscriptionHandle> {
        let sub: SubscriptionResp = self
            .get(
                &format!("/v1/billing/subscriptions/{subscription_id}"),
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
        if Self::is_subscription_id(payment_id) {
            let Some(txn) = self.latest_completed_transaction(payment_id).await? else {
                return Ok(None);
            };
            let breakdown = txn.amount_with_breakdown;
            return Ok(Some(TransactionDetail {
                transaction_id: txn.id,
                fee_minor: breakdown
                    .as_ref()
                    .and_then(|b| b.fee_amount.as_ref())
                    .and_then(|m| decimal_to_minor(&m.value)),
                net_minor: breakdown
                    .as_ref()
                    .and_then(|b| b.net_amount.as_ref())
                    .and_then(|m| decimal_to_minor(&m.value)),
                amount_minor: breakdown
                    .as_ref()
                    .and_then(|b| b.gross_amount.as_ref())
                    .and_then(|m| decimal_to_minor(&m.value)),
            }));
        }

        let capture: CaptureResp = self
            .get(
                &format!("/v2/payments/captures/{payment_id}"),
                "retrieve capture",
            )
            .await?
            .json()
            .await
            .context("parsing capture")?;

        let breakdown = capture.seller_receivable_breakdown;
        Ok(Some(TransactionDetail {
            transaction_id: capture.id,
            fee_minor: breakdown
                .as_ref()
                .and_then(|b| b.paypal_fee.as_ref())
                .and_then(|m| decimal_to_minor(&m.value)),
            net_minor: breakdown
                .as_ref()
                .and_then(|b| b.net_amount.as_ref())
                .and_then(|m| decimal_to_minor(&m.value)),
            amount_minor: breakdown
                .as_ref()
                .and_then(|b| b.gross_amount.as_ref())
                .and_then(|m| decimal_to_minor(&m.value)),
        }))
    }

    async fn issue_refund<'a>(
        &self,
        payment_id: &str,
        amount_minor: Option<i64>,
        currency: &str,
        reason: Option<&'a str>,
    ) -> GatewayResult<RefundHandle> {
        // Older rows stored the subscription id where the capture id belongs;
        // resolve the most recent capture in the lookback window first.
        let capture_id = if Self::is_subscription_id(payment_id) {
            self.latest_completed_transaction(payment_id)
                .await?
                .map(|txn| txn.id)
                .ok_or_else(|| {
                    GatewayError::RefundFailed(format!(
                        "no completed transaction found for subscription {payment_id} in the last {CAPTURE_LOOKBACK_DAYS} days"
                    ))
                })?
        } else {
            payment_id.to_string()
        };

        let mut body = json!({});
        if let Some(amount) = amount_minor {
            body["amount"] = serde_json::to_value(Money {
                currency_code: currency.to_uppercase(),
                value: minor_to_decimal(amount),
            })
            .context("serializing refund amount")?;
        }
        if let Some(reason) = reason {
            body["note_to_payer"] = json!(reason);
        }

        let result = self
            .post_json(
                &format!("/v2/payments/captures/{capture_id}/refund"),
                body,
                "refund capture",
            )
            .await;
        let resp = match result {
            Ok(resp) => resp,
            Err(GatewayError::Rejected(message)) => {
                return Err(GatewayError::RefundFailed(message));
            }
            Err(other) => return Err(other),
        };

        #[derive(Debug, Deserialize)]
        struct RefundResp {
            id: String,
            amount: Option<Money>,
        }

        let refund: RefundResp = resp.json().await.context("parsing refund")?;
        let refunded_minor = refund
            .amount
            .as_ref()
            .and_then(|m| decimal_to_minor(&m.value))
            .or(amount_minor)
            .unwrap_or_default();

        Ok(RefundHandle {
            refund_id: refund.id,
            amount_minor: refunded_minor,
            refunded_payment_id: capture_id,
        })
    }

    async fn update_price(
        &self,
        subscription_id: &str,
        amount_minor: i64,
        currency: &str,
        interval: BillingInterval,
    ) -> GatewayResult<PriceUpdate> {
        // Wallet price edits need a fresh plan plus buyer re-approval.
        #[derive(Debug, Deserialize)]
        struct SubPlanResp {
            plan_id: String,
        }

        let sub: SubPlanResp = self
            .get(
                &format!("/v1/billing/subscriptions/{subscription_id}"),
                "retrieve subscription for price update",
            )
            .await?
            .json()
            .await
            .context("parsing subscription")?;

        let plan_detail: PlanDetailResp = self
            .get(
                &format!("/v1/billing/plans/{}", sub.plan_id),
                "retrieve current plan",
            )
            .await?
            .json()
            .await
            .context("parsing plan")?;

        let lookup_key = format!(
            "{}-{}-{}-{}",
            plan_detail.product_id,
            interval,
            currency.to_lowercase(),
            amount_minor
        );
        let new_plan: PlanResp = self
            .post_json(
                "/v1/billing/plans",
                json!({
                    "product_id": plan_detail.product_id,
                    "name": lookup_key,
                    "billing_cycles": [{
                        "frequency": {
                            "interval_unit": interval.as_str().to_uppercase(),
                            "interval_count": 1,
                        },
                        "tenure_type": "REGULAR",
                        "sequence": 1,
                        "total_cycles": 0,
                        "pricing_scheme": {
                            "fixed_price": Money {
                                currency_code: currency.to_uppercase(),
                                value: minor_to_decimal(amount_minor),
                            },
                        },
                    }],
                    "payment_preferences": { "auto_bill_outstanding": true },
                }),
                "create revision plan",
            )
            .await?
            .json()
            .await
            .context("parsing revision plan")?;

        #[derive(Debug, Deserialize)]
        struct ReviseResp {
            #[serde(default)]
            links: Vec<LinkDescription>,
        }

        let revised: ReviseResp = self
            .post_json(
                &format!("/v1/billing/subscriptions/{subscription_id}/revise"),
                json!({ "plan_id": new_plan.id }),
                "revise subscription",
            )
            .await?
            .json()
            .await
            .context("parsing revision")?;

        Ok(PriceUpdate {
            applied: false,
            approval_url: approve_link(&revised.links),
        })
    }

    async fn apply_recurring_discount(
        &self,
        _subscription_id: &str,
        _discount: &RecurringDiscount,
    ) -> GatewayResult<()> {
        // The wallet provider has no native recurring-discount object; the
        // discounted amount travels through update_price instead.
        Ok(())
    }

    async fn remove_recurring_discount(&self, _subscription_id: &str) -> GatewayResult<()> {
        Ok(())
    }

    async fn pause(&self, subscription_id: &str) -> GatewayResult<()> {
        self.post_lifecycle(
            &format!("/v1/billing/subscriptions/{subscription_id}/suspend"),
            "Paused by site admin",
            "suspend subscription",
        )
        .await
    }

    async fn resume(&self, subscription_id: &str) -> GatewayResult<()> {
        self.post_lifecycle(
            &format!("/v1/billing/subscriptions/{subscription_id}/activate"),
            "Resumed by site admin",
            "activate subscription",
        )
        .await
    }

    async fn cancel(&self, subscription_id: &str, _at_period_end: bool) -> GatewayResult<()> {
        // The wallet provider only supports immediate agreement cancellation;
        // access until period end is tracked on our own ledger row.
        self.post_lifecycle(
            &format!("/v1/billing/subscriptions/{subscription_id}/cancel"),
            "Cancelled by site admin",
            "cancel subscription",
        )
        .await
    }

    async fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &WebhookSignature,
    ) -> GatewayResult<ProviderEvent> {
        let WebhookSignature::Wallet {
            transmission_id,
            transmission_time,
            transmission_sig,
            cert_url,
            auth_algo,
        } = signature
        else {
            return Err(GatewayError::InvalidSignature);
        };

        let event: serde_json::Value =
            serde_json::from_slice(payload).map_err(|err| GatewayError::Other(err.into()))?;

        #[derive(Debug, Deserialize)]
        struct VerifyResp {
            verification_status: String,
        }

        let verification: VerifyResp = self
            .post_json(
                "/v1/notifications/verify-webhook-signature",
                json!({
                    "auth_algo": auth_algo,
                    "cert_url": cert_url,
                    "transmission_id": transmission_id,
                    "transmission_sig": transmission_sig,
                    "transmission_time": transmission_time,
                    "webhook_id": self.webhook_id,
                    "webhook_event": event,
                }),
                "verify webhook signature",
            )
            .await?
            .json()
            .await
            .context("parsing webhook verification")?;

        if verification.verification_status != "SUCCESS" {
            return Err(GatewayError::InvalidSignature);
        }

        let event_id = event
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let event_type = event
            .get("event_type")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let object = event.get("resource").cloned().unwrap_or(serde_json::Value::Null);

        Ok(ProviderEvent {
            event_id,
            event_type,
            object,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_minor_units_to_decimal_strings() {
        assert_eq!(minor_to_decimal(9000), "90.00");
        assert_eq!(minor_to_decimal(105), "1.05");
        assert_eq!(minor_to_decimal(30), "0.30");
    }

    #[test]
    fn parses_decimal_strings_to_minor_units() {
        assert_eq!(decimal_to_minor("90.00"), Some(9000));
        assert_eq!(decimal_to_minor("1.05"), Some(105));
        assert_eq!(decimal_to_minor("2.7"), Some(270));
        assert_eq!(decimal_to_minor("3"), Some(300));
        assert_eq!(decimal_to_minor("not money"), None);
    }

    #[test]
    fn recognizes_subscription_ids() {
        assert!(PaypalClient::is_subscription_id("I-BW452GLLEP1G"));
        assert!(!PaypalClient::is_subscription_id("8QU03480PH44524"));
    }
}
