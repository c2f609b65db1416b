use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::entities::orders::{InsertOrderEntity, OrderEntity};
use crate::domain::entities::subscriptions::{SubscriptionEntity, SubscriptionPeriodUpdate};
use crate::domain::entities::webhook_events::InsertWebhookEventEntity;
use crate::domain::repositories::enrollments::EnrollmentRepository;
use crate::domain::repositories::orders::OrderRepository;
use crate::domain::repositories::products::ProductRepository;
use crate::domain::repositories::subscriptions::SubscriptionRepository;
use crate::domain::repositories::users::UserRepository;
use crate::domain::repositories::webhook_events::WebhookEventRepository;
use crate::domain::value_objects::enums::entitlement_items::GrantSource;
use crate::domain::value_objects::enums::order_statuses::OrderStatus;
use crate::domain::value_objects::enums::payment_providers::PaymentProvider;
use crate::domain::value_objects::enums::subscription_statuses::SubscriptionStatus;
use crate::payments::paypal_client::decimal_to_minor;
use crate::payments::provider::{GatewayError, PaymentGateway, ProviderEvent, WebhookSignature};
use crate::usecases::entitlements::EntitlementGrantor;
use crate::usecases::ledger::LedgerWriter;
use crate::usecases::support::{best_effort, epoch_to_datetime};

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook signature verification failed")]
    InvalidSignature,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl WebhookError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            WebhookError::InvalidSignature => StatusCode::BAD_REQUEST,
            WebhookError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Payload slices we care about. Everything else in the provider object is
/// kept verbatim in the event log for replay.
#[derive(Debug, Deserialize)]
struct CardPaymentIntent {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CardInvoice {
    id: String,
    subscription: Option<String>,
    payment_intent: Option<String>,
    amount_paid: i64,
    currency: String,
    period_start: Option<i64>,
    period_end: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct CardSubscription {
    id: String,
    status: String,
    #[serde(default)]
    cancel_at_period_end: bool,
    current_period_start: Option<i64>,
    current_period_end: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct WalletSale {
    id: String,
    billing_agreement_id: Option<String>,
    amount: Option<WalletAmount>,
}

#[derive(Debug, Deserialize)]
struct WalletAmount {
    total: String,
}

#[derive(Debug, Deserialize)]
struct WalletSubscription {
    id: String,
    start_time: Option<String>,
    billing_info: Option<WalletBillingInfo>,
}

#[derive(Debug, Deserialize)]
struct WalletBillingInfo {
    next_billing_time: Option<String>,
}

fn iso_to_datetime(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|parsed| parsed.with_timezone(&Utc))
}

/// Card provider subscription statuses as they appear on the wire.
fn card_subscription_status(status: &str, cancel_at_period_end: bool) -> SubscriptionStatus {
    match status {
        "trialing" => SubscriptionStatus::Trialing,
        "active" if cancel_at_period_end => SubscriptionStatus::PendingCancellation,
        "active" => SubscriptionStatus::Active,
        "paused" => SubscriptionStatus::Paused,
        "canceled" => SubscriptionStatus::Cancelled,
        _ => SubscriptionStatus::Pending,
    }
}

/// Webhook intake. Every verified delivery lands in the durable event log
/// before any handler runs, and the (provider, event id) unique key makes
/// redeliveries no-ops. Handler failures are logged and swallowed so the
/// provider stops retrying; the logged payload stays available for replay.
pub struct WebhookUseCase<Wh, S, O, P, En, U, C, W>
where
    Wh: WebhookEventRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    O: OrderRepository + Send + Sync + 'static,
    P: ProductRepository + Send + Sync + 'static,
    En: EnrollmentRepository + Send + Sync + 'static,
    U: UserRepository + Send + Sync + 'static,
    C: PaymentGateway + 'static,
    W: PaymentGateway + 'static,
{
    webhook_repo: Arc<Wh>,
    subscription_repo: Arc<S>,
    order_repo: Arc<O>,
    product_repo: Arc<P>,
    ledger: Arc<LedgerWriter<O>>,
    grantor: Arc<EntitlementGrantor<P, En, U>>,
    card: Arc<C>,
    wallet: Arc<W>,
}

impl<Wh, S, O, P, En, U, C, W> WebhookUseCase<Wh, S, O, P, En, U, C, W>
where
    Wh: WebhookEventRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    O: OrderRepository + Send + Sync + 'static,
    P: ProductRepository + Send + Sync + 'static,
    En: EnrollmentRepository + Send + Sync + 'static,
    U: UserRepository + Send + Sync + 'static,
    C: PaymentGateway + 'static,
    W: PaymentGateway + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        webhook_repo: Arc<Wh>,
        subscription_repo: Arc<S>,
        order_repo: Arc<O>,
        product_repo: Arc<P>,
        ledger: Arc<LedgerWriter<O>>,
        grantor: Arc<EntitlementGrantor<P, En, U>>,
        card: Arc<C>,
        wallet: Arc<W>,
    ) -> Self {
        Self {
            webhook_repo,
            subscription_repo,
            order_repo,
            product_repo,
            ledger,
            grantor,
            card,
            wallet,
        }
    }

    fn gateway_for(&self, provider: PaymentProvider) -> &dyn PaymentGateway {
        match provider {
            PaymentProvider::Card => self.card.as_ref(),
            PaymentProvider::Wallet => self.wallet.as_ref(),
        }
    }

    pub async fn process(
        &self,
        provider: PaymentProvider,
        body: &[u8],
        signature: &WebhookSignature,
    ) -> std::result::Result<(), WebhookError> {
        let event = self
            .gateway_for(provider)
            .verify_webhook(body, signature)
            .await
            .map_err(|err| match err {
                GatewayError::InvalidSignature => WebhookError::InvalidSignature,
                other => WebhookError::Internal(anyhow::Error::new(other)),
            })?;

        let payload = serde_json::from_slice(body).unwrap_or_else(|_| event.object.clone());
        let row_id = self
            .webhook_repo
            .insert_if_new(InsertWebhookEventEntity {
                provider: provider.as_str().to_string(),
                event_id: event.event_id.clone(),
                event_type: event.event_type.clone(),
                payload,
            })
            .await?;
        let Some(row_id) = row_id else {
            debug!(
                provider = provider.as_str(),
                event_id = %event.event_id,
                "webhooks: duplicate delivery, skipping"
            );
            return Ok(());
        };

        match self.dispatch(provider, &event).await {
            Ok(()) => {
                best_effort(
                    "mark webhook processed",
                    self.webhook_repo.mark_processed(row_id),
                )
                .await;
            }
            Err(err) => {
                // The event row stays unprocessed so it can be replayed.
                warn!(
                    provider = provider.as_str(),
                    event_id = %event.event_id,
                    event_type = %event.event_type,
                    error = ?err,
                    "webhooks: handler failed, event retained"
                );
            }
        }
        Ok(())
    }

    async fn dispatch(&self, provider: PaymentProvider, event: &ProviderEvent) -> anyhow::Result<()> {
        match (provider, event.event_type.as_str()) {
            (PaymentProvider::Card, "payment_intent.succeeded") => {
                let intent: CardPaymentIntent = serde_json::from_value(event.object.clone())?;
                self.settle_pending_orders(PaymentProvider::Card, &intent.id)
                    .await
            }
            (PaymentProvider::Card, "invoice.payment_succeeded") => {
                let invoice: CardInvoice = serde_json::from_value(event.object.clone())?;
                self.record_card_renewal(invoice).await
            }
            (PaymentProvider::Card, "customer.subscription.updated") => {
                let sub: CardSubscription = serde_json::from_value(event.object.clone())?;
                self.apply_card_subscription_update(sub).await
            }
            (PaymentProvider::Card, "customer.subscription.deleted") => {
                let sub: CardSubscription = serde_json::from_value(event.object.clone())?;
                self.cancel_locally(&sub.id).await
            }
            (PaymentProvider::Wallet, "PAYMENT.SALE.COMPLETED") => {
                let sale: WalletSale = serde_json::from_value(event.object.clone())?;
                self.record_wallet_sale(sale).await
            }
            (PaymentProvider::Wallet, "BILLING.SUBSCRIPTION.ACTIVATED") => {
                let sub: WalletSubscription = serde_json::from_value(event.object.clone())?;
                self.activate_wallet_locally(sub).await
            }
            (PaymentProvider::Wallet, "BILLING.SUBSCRIPTION.CANCELLED") => {
                let sub: WalletSubscription = serde_json::from_value(event.object.clone())?;
                self.cancel_locally(&sub.id).await
            }
            (PaymentProvider::Wallet, "BILLING.SUBSCRIPTION.SUSPENDED") => {
                let sub: WalletSubscription = serde_json::from_value(event.object.clone())?;
                self.subscription_repo
                    .update_status_by_provider_subscription_id(
                        &sub.id,
                        SubscriptionStatus::Paused.as_str(),
                        None,
                    )
                    .await
            }
            (provider, event_type) => {
                debug!(
                    provider = provider.as_str(),
                    event_type, "webhooks: unhandled event type"
                );
                Ok(())
            }
        }
    }

    /// Completion fallback when the client never called back after paying:
    /// upgrades the pending rows for the payment and re-grants where a user
    /// is already attached. Account provisioning stays on the API path since
    /// only that path carries a password.
    async fn settle_pending_orders(
        &self,
        provider: PaymentProvider,
        payment_id: &str,
    ) -> anyhow::Result<()> {
        let rows = self
            .order_repo
            .find_by_provider_payment_id(provider.as_str(), payment_id)
            .await?;
        if rows.is_empty() {
            debug!(payment_id, "webhooks: payment has no order rows yet");
            return Ok(());
        }

        let detail = best_effort(
            "transaction detail lookup",
            self.gateway_for(provider).fetch_transaction_detail(payment_id),
        )
        .await
        .flatten();

        let weights: Vec<i64> = rows.iter().map(|row| row.amount_minor).collect();
        let fee_shares = detail
            .as_ref()
            .and_then(|d| d.fee_minor)
            .map(|fee| crate::usecases::ledger::allocate_proportionally(fee, &weights));

        for (index, row) in rows.iter().enumerate() {
            if row.status != OrderStatus::Pending.as_str() {
                continue;
            }
            let fee_minor = fee_shares.as_ref().map(|shares| shares[index]);
            let net_minor = fee_minor.map(|fee| row.amount_minor - fee);
            let upgraded = self
                .ledger
                .record_order(InsertOrderEntity {
                    user_id: row.user_id,
                    email: row.email.clone(),
                    full_name: row.full_name.clone(),
                    product_id: row.product_id,
                    amount_minor: row.amount_minor,
                    currency: row.currency.clone(),
                    provider: row.provider.clone(),
                    provider_payment_id: row.provider_payment_id.clone(),
                    provider_transaction_id: detail
                        .as_ref()
                        .map(|d| d.transaction_id.clone())
                        .or_else(|| row.provider_transaction_id.clone()),
                    status: OrderStatus::Completed.as_str().to_string(),
                    coupon_code: row.coupon_code.clone(),
                    discount_minor: row.discount_minor,
                    fee_minor,
                    net_minor,
                    subscription_id: row.subscription_id,
                    refund_minor: row.refund_minor,
                })
                .await?;
            if let Some(user_id) = upgraded.user_id {
                self.grant_for_order(user_id, &upgraded).await;
            }
        }
        info!(payment_id, rows = rows.len(), "webhooks: pending orders settled");
        Ok(())
    }

    async fn grant_for_order(&self, user_id: uuid::Uuid, order: &OrderEntity) {
        let product = match self.product_repo.find_active_by_id(order.product_id).await {
            Ok(Some(product)) => product,
            _ => return,
        };
        best_effort(
            "grant entitlements",
            self.grantor
                .grant(user_id, &product, GrantSource::Purchase, order.id),
        )
        .await;
    }

    async fn record_card_renewal(&self, invoice: CardInvoice) -> anyhow::Result<()> {
        let Some(provider_subscription_id) = invoice.subscription.as_deref() else {
            debug!(invoice_id = %invoice.id, "webhooks: invoice without subscription, skipping");
            return Ok(());
        };
        let Some(subscription) = self
            .subscription_repo
            .find_by_provider_subscription_id(provider_subscription_id)
            .await?
        else {
            warn!(
                provider_subscription_id,
                "webhooks: renewal for unknown subscription"
            );
            return Ok(());
        };

        let payment_id = invoice.payment_intent.clone().unwrap_or(invoice.id);
        let detail = best_effort(
            "renewal fee lookup",
            self.card.fetch_transaction_detail(&payment_id),
        )
        .await
        .flatten();

        self.record_renewal_order(&subscription, &payment_id, invoice.amount_paid, detail)
            .await?;

        self.subscription_repo
            .update_period_by_provider_subscription_id(
                provider_subscription_id,
                SubscriptionPeriodUpdate {
                    current_period_start: epoch_to_datetime(invoice.period_start),
                    current_period_end: epoch_to_datetime(invoice.period_end),
                    status: SubscriptionStatus::Active.as_str().to_string(),
                },
            )
            .await?;
        Ok(())
    }

    /// The renewal order is keyed on the provider payment id, so a redelivered
    /// invoice converges to the same row.
    async fn record_renewal_order(
        &self,
        subscription: &SubscriptionEntity,
        payment_id: &str,
        amount_minor: i64,
        detail: Option<crate::payments::provider::TransactionDetail>,
    ) -> anyhow::Result<()> {
        let fee_minor = detail.as_ref().and_then(|d| d.fee_minor);
        let order = self
            .ledger
            .record_order(InsertOrderEntity {
                user_id: subscription.user_id,
                email: subscription.email.clone(),
                full_name: subscription.full_name.clone(),
                product_id: subscription.product_id,
                amount_minor,
                currency: subscription.currency.clone(),
                provider: subscription.provider.clone(),
                provider_payment_id: payment_id.to_string(),
                provider_transaction_id: detail.map(|d| d.transaction_id),
                status: OrderStatus::Completed.as_str().to_string(),
                coupon_code: subscription.coupon_code.clone(),
                discount_minor: subscription.discount_minor,
                fee_minor,
                net_minor: fee_minor.map(|fee| amount_minor - fee),
                subscription_id: Some(subscription.id),
                refund_minor: 0,
            })
            .await?;

        if let Some(user_id) = subscription.user_id {
            let product = match self
                .product_repo
                .find_active_by_id(subscription.product_id)
                .await
            {
                Ok(Some(product)) => Some(product),
                _ => None,
            };
            if let Some(product) = product {
                best_effort(
                    "renewal re-grant",
                    self.grantor
                        .grant(user_id, &product, GrantSource::Subscription, subscription.id),
                )
                .await;
            }
        }
        info!(
            order_id = %order.id,
            subscription_id = %subscription.id,
            amount_minor,
            "webhooks: renewal recorded"
        );
        Ok(())
    }

    async fn apply_card_subscription_update(&self, sub: CardSubscription) -> anyhow::Result<()> {
        let status = card_subscription_status(&sub.status, sub.cancel_at_period_end);
        if status == SubscriptionStatus::Cancelled {
            return self.cancel_locally(&sub.id).await;
        }

        if sub.current_period_start.is_some() || sub.current_period_end.is_some() {
            self.subscription_repo
                .update_period_by_provider_subscription_id(
                    &sub.id,
                    SubscriptionPeriodUpdate {
                        current_period_start: epoch_to_datetime(sub.current_period_start),
                        current_period_end: epoch_to_datetime(sub.current_period_end),
                        status: status.as_str().to_string(),
                    },
                )
                .await?;
        } else {
            self.subscription_repo
                .update_status_by_provider_subscription_id(&sub.id, status.as_str(), None)
                .await?;
        }
        info!(provider_subscription_id = %sub.id, status = status.as_str(), "webhooks: subscription updated");
        Ok(())
    }

    /// Terminal cancellation: flips the local row and revokes its grants.
    async fn cancel_locally(&self, provider_subscription_id: &str) -> anyhow::Result<()> {
        let Some(subscription) = self
            .subscription_repo
            .find_by_provider_subscription_id(provider_subscription_id)
            .await?
        else {
            warn!(
                provider_subscription_id,
                "webhooks: cancellation for unknown subscription"
            );
            return Ok(());
        };

        self.subscription_repo
            .update_status_by_provider_subscription_id(
                provider_subscription_id,
                SubscriptionStatus::Cancelled.as_str(),
                Some(Utc::now()),
            )
            .await?;

        if let Ok(Some(product)) = self
            .product_repo
            .find_active_by_id(subscription.product_id)
            .await
        {
            best_effort(
                "revoke on cancellation",
                self.grantor
                    .revoke(subscription.user_id, &product, subscription.id),
            )
            .await;
        }
        info!(
            subscription_id = %subscription.id,
            "webhooks: subscription cancelled"
        );
        Ok(())
    }

    async fn record_wallet_sale(&self, sale: WalletSale) -> anyhow::Result<()> {
        let Some(agreement_id) = sale.billing_agreement_id.as_deref() else {
            // One-off sale: upgrade whatever pending rows reference it.
            return self
                .settle_pending_orders(PaymentProvider::Wallet, &sale.id)
                .await;
        };
        let Some(subscription) = self
            .subscription_repo
            .find_by_provider_subscription_id(agreement_id)
            .await?
        else {
            warn!(agreement_id, "webhooks: sale for unknown subscription");
            return Ok(());
        };

        let amount_minor = sale
            .amount
            .as_ref()
            .and_then(|amount| decimal_to_minor(&amount.total))
            .unwrap_or(subscription.amount_minor);
        let detail = best_effort(
            "wallet sale detail",
            self.wallet.fetch_transaction_detail(&sale.id),
        )
        .await
        .flatten();

        self.record_renewal_order(&subscription, &sale.id, amount_minor, detail)
            .await?;
        self.subscription_repo
            .update_status_by_provider_subscription_id(
                agreement_id,
                SubscriptionStatus::Active.as_str(),
                None,
            )
            .await?;
        Ok(())
    }

    async fn activate_wallet_locally(&self, sub: WalletSubscription) -> anyhow::Result<()> {
        let next_billing = sub
            .billing_info
            .as_ref()
            .and_then(|info| info.next_billing_time.as_deref());
        self.subscription_repo
            .update_period_by_provider_subscription_id(
                &sub.id,
                SubscriptionPeriodUpdate {
                    current_period_start: iso_to_datetime(sub.start_time.as_deref()),
                    current_period_end: iso_to_datetime(next_billing),
                    status: SubscriptionStatus::Active.as_str().to_string(),
                },
            )
            .await?;

        if let Some(subscription) = self
            .subscription_repo
            .find_by_provider_subscription_id(&sub.id)
            .await?
        {
            if let (Some(user_id), Ok(Some(product))) = (
                subscription.user_id,
                self.product_repo
                    .find_active_by_id(subscription.product_id)
                    .await,
            ) {
                best_effort(
                    "activation grant",
                    self.grantor
                        .grant(user_id, &product, GrantSource::Subscription, subscription.id),
                )
                .await;
            }
        }
        info!(provider_subscription_id = %sub.id, "webhooks: subscription activated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repositories::enrollments::MockEnrollmentRepository;
    use crate::domain::repositories::orders::MockOrderRepository;
    use crate::domain::repositories::products::MockProductRepository;
    use crate::domain::repositories::subscriptions::MockSubscriptionRepository;
    use crate::domain::repositories::users::MockUserRepository;
    use crate::domain::repositories::webhook_events::MockWebhookEventRepository;
    use crate::payments::provider::MockPaymentGateway;
    use serde_json::json;
    use uuid::Uuid;

    struct Fixture {
        webhook_repo: MockWebhookEventRepository,
        subscription_repo: MockSubscriptionRepository,
        order_repo: MockOrderRepository,
        ledger_orders: MockOrderRepository,
        product_repo: MockProductRepository,
        grantor_products: MockProductRepository,
        enrollment_repo: MockEnrollmentRepository,
        grantor_users: MockUserRepository,
        card: MockPaymentGateway,
        wallet: MockPaymentGateway,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                webhook_repo: MockWebhookEventRepository::new(),
                subscription_repo: MockSubscriptionRepository::new(),
                order_repo: MockOrderRepository::new(),
                ledger_orders: MockOrderRepository::new(),
                product_repo: MockProductRepository::new(),
                grantor_products: MockProductRepository::new(),
                enrollment_repo: MockEnrollmentRepository::new(),
                grantor_users: MockUserRepository::new(),
                card: MockPaymentGateway::new(),
                wallet: MockPaymentGateway::new(),
            }
        }

        #[allow(clippy::type_complexity)]
        fn build(
            self,
        ) -> WebhookUseCase<
            MockWebhookEventRepository,
            MockSubscriptionRepository,
            MockOrderRepository,
            MockProductRepository,
            MockEnrollmentRepository,
            MockUserRepository,
            MockPaymentGateway,
            MockPaymentGateway,
        > {
            WebhookUseCase::new(
                Arc::new(self.webhook_repo),
                Arc::new(self.subscription_repo),
                Arc::new(self.order_repo),
                Arc::new(self.product_repo),
                Arc::new(LedgerWriter::new(Arc::new(self.ledger_orders))),
                Arc::new(EntitlementGrantor::new(
                    Arc::new(self.grantor_products),
                    Arc::new(self.enrollment_repo),
                    Arc::new(self.grantor_users),
                )),
                Arc::new(self.card),
                Arc::new(self.wallet),
            )
        }
    }

    fn card_signature() -> WebhookSignature {
        WebhookSignature::Card {
            signature_header: "t=1,v1=abc".to_string(),
        }
    }

    fn expect_event(gateway: &mut MockPaymentGateway, event_type: &str, object: serde_json::Value) {
        let event_type = event_type.to_string();
        gateway.expect_verify_webhook().returning(move |_, _| {
            let event = ProviderEvent {
                event_id: "evt_1".to_string(),
                event_type: event_type.clone(),
                object: object.clone(),
            };
            Box::pin(async move { Ok(event) })
        });
    }

    fn subscription_row(provider_subscription_id: &str) -> SubscriptionEntity {
        SubscriptionEntity {
            id: Uuid::new_v4(),
            user_id: None,
            email: "buyer@example.com".to_string(),
            full_name: "Buyer".to_string(),
            product_id: Uuid::new_v4(),
            provider: "card".to_string(),
            provider_subscription_id: provider_subscription_id.to_string(),
            status: "active".to_string(),
            amount_minor: 2900,
            currency: "USD".to_string(),
            interval: "month".to_string(),
            current_period_start: None,
            current_period_end: None,
            trial_end: None,
            coupon_code: None,
            discount_minor: 0,
            cancelled_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn completed_order() -> OrderEntity {
        OrderEntity {
            id: Uuid::new_v4(),
            user_id: None,
            email: "buyer@example.com".to_string(),
            full_name: "Buyer".to_string(),
            product_id: Uuid::new_v4(),
            amount_minor: 2900,
            currency: "USD".to_string(),
            provider: "card".to_string(),
            provider_payment_id: "pi_renewal".to_string(),
            provider_transaction_id: None,
            status: "completed".to_string(),
            coupon_code: None,
            discount_minor: 0,
            fee_minor: None,
            net_minor: None,
            subscription_id: None,
            refund_minor: 0,
            refund_reason: None,
            provider_refund_id: None,
            refunded_at: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_delivery_short_circuits_before_any_handler() {
        let mut fixture = Fixture::new();
        expect_event(
            &mut fixture.card,
            "customer.subscription.deleted",
            json!({"id": "sub_1", "status": "canceled"}),
        );
        fixture
            .webhook_repo
            .expect_insert_if_new()
            .times(1)
            .returning(|_| Box::pin(async { Ok(None) }));
        // No subscription repo expectations: any handler call would panic.

        let usecase = fixture.build();
        usecase
            .process(PaymentProvider::Card, b"{}", &card_signature())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_without_logging_an_event() {
        let mut fixture = Fixture::new();
        fixture
            .card
            .expect_verify_webhook()
            .returning(|_, _| Box::pin(async { Err(GatewayError::InvalidSignature) }));

        let usecase = fixture.build();
        let err = usecase
            .process(PaymentProvider::Card, b"{}", &card_signature())
            .await
            .unwrap_err();

        assert!(matches!(err, WebhookError::InvalidSignature));
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn subscription_deleted_cancels_locally_and_revokes() {
        let row = subscription_row("sub_gone");
        let source_id = row.id;

        let mut fixture = Fixture::new();
        expect_event(
            &mut fixture.card,
            "customer.subscription.deleted",
            json!({"id": "sub_gone", "status": "canceled"}),
        );
        fixture
            .webhook_repo
            .expect_insert_if_new()
            .returning(|_| Box::pin(async { Ok(Some(7)) }));
        fixture
            .webhook_repo
            .expect_mark_processed()
            .withf(|id| *id == 7)
            .times(1)
            .returning(|_| Box::pin(async { Ok(()) }));
        fixture
            .subscription_repo
            .expect_find_by_provider_subscription_id()
            .returning(move |_| {
                let row = row.clone();
                Box::pin(async move { Ok(Some(row)) })
            });
        fixture
            .subscription_repo
            .expect_update_status_by_provider_subscription_id()
            .withf(|id, status, cancelled_at| {
                id == "sub_gone" && status == "cancelled" && cancelled_at.is_some()
            })
            .times(1)
            .returning(|_, _, _| Box::pin(async { Ok(()) }));
        fixture
            .product_repo
            .expect_find_active_by_id()
            .returning(|_| Box::pin(async { Ok(None) }));
        let _ = source_id;

        let usecase = fixture.build();
        usecase
            .process(PaymentProvider::Card, b"{}", &card_signature())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn invoice_payment_records_a_renewal_and_rolls_the_period() {
        let row = subscription_row("sub_renew");
        let subscription_id = row.id;

        let mut fixture = Fixture::new();
        expect_event(
            &mut fixture.card,
            "invoice.payment_succeeded",
            json!({
                "id": "in_1",
                "subscription": "sub_renew",
                "payment_intent": "pi_renewal",
                "amount_paid": 2900,
                "currency": "usd",
                "period_start": 1_700_000_000,
                "period_end": 1_702_592_000
            }),
        );
        fixture
            .webhook_repo
            .expect_insert_if_new()
            .returning(|_| Box::pin(async { Ok(Some(9)) }));
        fixture
            .webhook_repo
            .expect_mark_processed()
            .returning(|_| Box::pin(async { Ok(()) }));
        fixture
            .subscription_repo
            .expect_find_by_provider_subscription_id()
            .returning(move |_| {
                let row = row.clone();
                Box::pin(async move { Ok(Some(row)) })
            });
        fixture
            .card
            .expect_fetch_transaction_detail()
            .returning(|_| Box::pin(async { Ok(None) }));
        fixture
            .ledger_orders
            .expect_insert_or_backfill()
            .withf(move |order| {
                order.provider_payment_id == "pi_renewal"
                    && order.amount_minor == 2900
                    && order.status == "completed"
                    && order.subscription_id == Some(subscription_id)
            })
            .times(1)
            .returning(|_| Box::pin(async { Ok(completed_order()) }));
        fixture
            .subscription_repo
            .expect_update_period_by_provider_subscription_id()
            .withf(|id, update| {
                id == "sub_renew"
                    && update.status == "active"
                    && update.current_period_end.is_some()
            })
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(()) }));

        let usecase = fixture.build();
        usecase
            .process(PaymentProvider::Card, b"{}", &card_signature())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn wallet_suspension_pauses_the_local_row() {
        let mut fixture = Fixture::new();
        expect_event(
            &mut fixture.wallet,
            "BILLING.SUBSCRIPTION.SUSPENDED",
            json!({"id": "I-PAUSE"}),
        );
        fixture
            .webhook_repo
            .expect_insert_if_new()
            .returning(|_| Box::pin(async { Ok(Some(3)) }));
        fixture
            .webhook_repo
            .expect_mark_processed()
            .returning(|_| Box::pin(async { Ok(()) }));
        fixture
            .subscription_repo
            .expect_update_status_by_provider_subscription_id()
            .withf(|id, status, _| id == "I-PAUSE" && status == "paused")
            .times(1)
            .returning(|_, _, _| Box::pin(async { Ok(()) }));

        let usecase = fixture.build();
        usecase
            .process(
                PaymentProvider::Wallet,
                b"{}",
                &WebhookSignature::Wallet {
                    transmission_id: "t-1".to_string(),
                    transmission_time: "2026-01-01T00:00:00Z".to_string(),
                    transmission_sig: "sig".to_string(),
                    cert_url: "https://api.example.com/cert".to_string(),
                    auth_algo: "SHA256withRSA".to_string(),
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn handler_failure_still_acknowledges_the_delivery() {
        let mut fixture = Fixture::new();
        expect_event(
            &mut fixture.card,
            "customer.subscription.deleted",
            json!({"id": "sub_err", "status": "canceled"}),
        );
        fixture
            .webhook_repo
            .expect_insert_if_new()
            .returning(|_| Box::pin(async { Ok(Some(11)) }));
        fixture
            .subscription_repo
            .expect_find_by_provider_subscription_id()
            .returning(|_| Box::pin(async { Err(anyhow::anyhow!("db unavailable")) }));
        // mark_processed must NOT fire: the row stays replayable.

        let usecase = fixture.build();
        usecase
            .process(PaymentProvider::Card, b"{}", &card_signature())
            .await
            .unwrap();
    }
}
