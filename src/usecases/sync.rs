use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::domain::entities::orders::InsertOrderEntity;
use crate::domain::entities::subscriptions::{SubscriptionEntity, SubscriptionPeriodUpdate};
use crate::domain::repositories::orders::OrderRepository;
use crate::domain::repositories::subscriptions::SubscriptionRepository;
use crate::domain::value_objects::checkout::SyncReport;
use crate::domain::value_objects::enums::order_statuses::OrderStatus;
use crate::domain::value_objects::enums::payment_providers::PaymentProvider;
use crate::domain::value_objects::enums::subscription_statuses::SubscriptionStatus;
use crate::payments::provider::{PaymentGateway, SubscriptionHandle};
use crate::usecases::ledger::LedgerWriter;
use crate::usecases::support::{best_effort, epoch_to_datetime, subscription_status_from_provider};

/// Scheduled reconciliation against both providers. Webhooks are the fast
/// path; this sweep catches deliveries that were lost or arrived while the
/// service was down. Per-row failures are logged and skipped so one broken
/// subscription cannot stall the whole sweep.
pub struct SyncUseCase<S, O, C, W>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    O: OrderRepository + Send + Sync + 'static,
    C: PaymentGateway + 'static,
    W: PaymentGateway + 'static,
{
    subscription_repo: Arc<S>,
    order_repo: Arc<O>,
    ledger: Arc<LedgerWriter<O>>,
    card: Arc<C>,
    wallet: Arc<W>,
}

struct ProviderSweep {
    updated: u32,
    orders_created: u32,
}

impl<S, O, C, W> SyncUseCase<S, O, C, W>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    O: OrderRepository + Send + Sync + 'static,
    C: PaymentGateway + 'static,
    W: PaymentGateway + 'static,
{
    pub fn new(
        subscription_repo: Arc<S>,
        order_repo: Arc<O>,
        ledger: Arc<LedgerWriter<O>>,
        card: Arc<C>,
        wallet: Arc<W>,
    ) -> Self {
        Self {
            subscription_repo,
            order_repo,
            ledger,
            card,
            wallet,
        }
    }

    pub async fn run(&self) -> Result<SyncReport> {
        let card = self
            .sweep_provider(PaymentProvider::Card, self.card.as_ref())
            .await?;
        let wallet = self
            .sweep_provider(PaymentProvider::Wallet, self.wallet.as_ref())
            .await?;

        let report = SyncReport {
            stripe_updated: card.updated,
            paypal_updated: wallet.updated,
            stripe_orders_created: card.orders_created,
            paypal_orders_created: wallet.orders_created,
        };
        info!(
            stripe_updated = report.stripe_updated,
            paypal_updated = report.paypal_updated,
            stripe_orders_created = report.stripe_orders_created,
            paypal_orders_created = report.paypal_orders_created,
            "sync: sweep finished"
        );
        Ok(report)
    }

    async fn sweep_provider(
        &self,
        provider: PaymentProvider,
        gateway: &dyn PaymentGateway,
    ) -> Result<ProviderSweep> {
        let rows = self
            .subscription_repo
            .list_open_by_provider(provider.as_str())
            .await?;
        info!(
            provider = provider.as_str(),
            open = rows.len(),
            "sync: sweeping open subscriptions"
        );

        let mut sweep = ProviderSweep {
            updated: 0,
            orders_created: 0,
        };
        for row in rows {
            let handle = match gateway
                .fetch_subscription(&row.provider_subscription_id)
                .await
            {
                Ok(handle) => handle,
                Err(err) => {
                    warn!(
                        subscription_id = %row.id,
                        provider_subscription_id = %row.provider_subscription_id,
                        error = %err,
                        "sync: remote lookup failed, skipping row"
                    );
                    continue;
                }
            };

            if self.reconcile_row(&row, &handle).await? {
                sweep.updated += 1;
            }
            if self
                .backfill_missed_renewal(provider, gateway, &row, &handle)
                .await?
            {
                sweep.orders_created += 1;
            }
        }
        Ok(sweep)
    }

    /// Aligns local status and billing period with the provider. A local
    /// pending_cancellation is kept when the provider still reports active:
    /// the provider has no such state for an end-of-period cancel.
    async fn reconcile_row(
        &self,
        row: &SubscriptionEntity,
        handle: &SubscriptionHandle,
    ) -> Result<bool> {
        let remote = subscription_status_from_provider(handle.status);
        let target = if row.status == SubscriptionStatus::PendingCancellation.as_str()
            && remote == SubscriptionStatus::Active
        {
            SubscriptionStatus::PendingCancellation
        } else {
            remote
        };

        let remote_end = epoch_to_datetime(handle.period_end);
        let status_drifted = target.as_str() != row.status;
        let period_drifted = remote_end.is_some() && remote_end != row.current_period_end;
        if !status_drifted && !period_drifted {
            return Ok(false);
        }

        self.subscription_repo
            .update_period_by_provider_subscription_id(
                &row.provider_subscription_id,
                SubscriptionPeriodUpdate {
                    current_period_start: epoch_to_datetime(handle.period_start)
                        .or(row.current_period_start),
                    current_period_end: remote_end.or(row.current_period_end),
                    status: target.as_str().to_string(),
                },
            )
            .await?;
        info!(
            subscription_id = %row.id,
            from = %row.status,
            to = target.as_str(),
            "sync: subscription reconciled"
        );
        Ok(true)
    }

    /// Creates the order row for the latest provider payment when no local
    /// row references it, which happens when the renewal webhook was missed.
    async fn backfill_missed_renewal(
        &self,
        provider: PaymentProvider,
        gateway: &dyn PaymentGateway,
        row: &SubscriptionEntity,
        handle: &SubscriptionHandle,
    ) -> Result<bool> {
        let Some(payment_id) = handle.latest_payment_id.as_deref() else {
            return Ok(false);
        };
        let existing = self
            .order_repo
            .find_by_provider_payment_id(provider.as_str(), payment_id)
            .await?;
        if !existing.is_empty() {
            return Ok(false);
        }

        let detail = best_effort(
            "sync transaction detail",
            gateway.fetch_transaction_detail(payment_id),
        )
        .await
        .flatten();
        let amount_minor = detail
            .as_ref()
            .and_then(|d| d.amount_minor)
            .unwrap_or(row.amount_minor);
        let fee_minor = detail.as_ref().and_then(|d| d.fee_minor);

        let order = self
            .ledger
            .record_order(InsertOrderEntity {
                user_id: row.user_id,
                email: row.email.clone(),
                full_name: row.full_name.clone(),
                product_id: row.product_id,
                amount_minor,
                currency: row.currency.clone(),
                provider: provider.as_str().to_string(),
                provider_payment_id: payment_id.to_string(),
                provider_transaction_id: detail.map(|d| d.transaction_id),
                status: OrderStatus::Completed.as_str().to_string(),
                coupon_code: row.coupon_code.clone(),
                discount_minor: row.discount_minor,
                fee_minor,
                net_minor: fee_minor.map(|fee| amount_minor - fee),
                subscription_id: Some(row.id),
                refund_minor: 0,
            })
            .await?;
        info!(
            order_id = %order.id,
            subscription_id = %row.id,
            payment_id,
            "sync: missed renewal recorded"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::orders::OrderEntity;
    use crate::domain::repositories::orders::MockOrderRepository;
    use crate::domain::repositories::subscriptions::MockSubscriptionRepository;
    use crate::payments::provider::{MockPaymentGateway, ProviderStatus};
    use chrono::Utc;
    use uuid::Uuid;

    fn open_row(provider: &str, provider_subscription_id: &str) -> SubscriptionEntity {
        SubscriptionEntity {
            id: Uuid::new_v4(),
            user_id: Some(Uuid::new_v4()),
            email: "buyer@example.com".to_string(),
            full_name: "Buyer".to_string(),
            product_id: Uuid::new_v4(),
            provider: provider.to_string(),
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

    fn remote(status: ProviderStatus, latest_payment_id: Option<&str>) -> SubscriptionHandle {
        SubscriptionHandle {
            subscription_id: "sub_1".to_string(),
            status,
            approve_url: None,
            client_secret: None,
            period_start: Some(1_700_000_000),
            period_end: Some(1_702_592_000),
            trial_end: None,
            latest_payment_id: latest_payment_id.map(str::to_string),
        }
    }

    fn recorded_order() -> OrderEntity {
        OrderEntity {
            id: Uuid::new_v4(),
            user_id: None,
            email: "buyer@example.com".to_string(),
            full_name: "Buyer".to_string(),
            product_id: Uuid::new_v4(),
            amount_minor: 2900,
            currency: "USD".to_string(),
            provider: "card".to_string(),
            provider_payment_id: "pi_missed".to_string(),
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

    fn empty_wallet(subscription_repo: &mut MockSubscriptionRepository) {
        subscription_repo
            .expect_list_open_by_provider()
            .withf(|provider| provider == "wallet")
            .returning(|_| Box::pin(async { Ok(Vec::new()) }));
    }

    #[allow(clippy::type_complexity)]
    fn build(
        subscription_repo: MockSubscriptionRepository,
        order_repo: MockOrderRepository,
        ledger_orders: MockOrderRepository,
        card: MockPaymentGateway,
        wallet: MockPaymentGateway,
    ) -> SyncUseCase<MockSubscriptionRepository, MockOrderRepository, MockPaymentGateway, MockPaymentGateway>
    {
        SyncUseCase::new(
            Arc::new(subscription_repo),
            Arc::new(order_repo),
            Arc::new(LedgerWriter::new(Arc::new(ledger_orders))),
            Arc::new(card),
            Arc::new(wallet),
        )
    }

    #[tokio::test]
    async fn drifted_status_is_pulled_from_the_provider() {
        let mut subscription_repo = MockSubscriptionRepository::new();
        let mut order_repo = MockOrderRepository::new();
        let mut card = MockPaymentGateway::new();

        let row = open_row("card", "sub_drift");
        subscription_repo
            .expect_list_open_by_provider()
            .withf(|provider| provider == "card")
            .returning(move |_| {
                let rows = vec![row.clone()];
                Box::pin(async move { Ok(rows) })
            });
        empty_wallet(&mut subscription_repo);
        card.expect_fetch_subscription()
            .returning(|_| Ok(remote(ProviderStatus::Paused, Some("pi_seen"))));
        subscription_repo
            .expect_update_period_by_provider_subscription_id()
            .withf(|id, update| id == "sub_drift" && update.status == "paused")
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(()) }));
        order_repo
            .expect_find_by_provider_payment_id()
            .returning(|_, _| Box::pin(async { Ok(vec![recorded_order()]) }));

        let report = build(
            subscription_repo,
            order_repo,
            MockOrderRepository::new(),
            card,
            MockPaymentGateway::new(),
        )
        .run()
        .await
        .unwrap();

        assert_eq!(report.stripe_updated, 1);
        assert_eq!(report.stripe_orders_created, 0);
        assert_eq!(report.paypal_updated, 0);
    }

    #[tokio::test]
    async fn missed_renewal_payment_gets_an_order_row() {
        let mut subscription_repo = MockSubscriptionRepository::new();
        let mut order_repo = MockOrderRepository::new();
        let mut ledger_orders = MockOrderRepository::new();
        let mut card = MockPaymentGateway::new();

        let row = open_row("card", "sub_missed");
        let subscription_id = row.id;
        subscription_repo
            .expect_list_open_by_provider()
            .withf(|provider| provider == "card")
            .returning(move |_| {
                let rows = vec![row.clone()];
                Box::pin(async move { Ok(rows) })
            });
        empty_wallet(&mut subscription_repo);
        card.expect_fetch_subscription()
            .returning(|_| Ok(remote(ProviderStatus::Active, Some("pi_missed"))));
        // Status matches but the period is new, so the row still updates.
        subscription_repo
            .expect_update_period_by_provider_subscription_id()
            .returning(|_, _| Box::pin(async { Ok(()) }));
        order_repo
            .expect_find_by_provider_payment_id()
            .withf(|provider, payment_id| provider == "card" && payment_id == "pi_missed")
            .returning(|_, _| Box::pin(async { Ok(Vec::new()) }));
        card.expect_fetch_transaction_detail()
            .returning(|_| Ok(None));
        ledger_orders
            .expect_insert_or_backfill()
            .withf(move |order| {
                order.provider_payment_id == "pi_missed"
                    && order.subscription_id == Some(subscription_id)
                    && order.status == "completed"
                    && order.amount_minor == 2900
            })
            .times(1)
            .returning(|_| Box::pin(async { Ok(recorded_order()) }));

        let report = build(
            subscription_repo,
            order_repo,
            ledger_orders,
            card,
            MockPaymentGateway::new(),
        )
        .run()
        .await
        .unwrap();

        assert_eq!(report.stripe_orders_created, 1);
    }

    #[tokio::test]
    async fn remote_lookup_failure_skips_the_row_without_failing_the_sweep() {
        let mut subscription_repo = MockSubscriptionRepository::new();
        let mut card = MockPaymentGateway::new();

        let row = open_row("card", "sub_broken");
        subscription_repo
            .expect_list_open_by_provider()
            .withf(|provider| provider == "card")
            .returning(move |_| {
                let rows = vec![row.clone()];
                Box::pin(async move { Ok(rows) })
            });
        empty_wallet(&mut subscription_repo);
        card.expect_fetch_subscription().returning(|_| {
            Err(crate::payments::provider::GatewayError::Other(
                anyhow::anyhow!("provider timeout"),
            ))
        });

        let report = build(
            subscription_repo,
            MockOrderRepository::new(),
            MockOrderRepository::new(),
            card,
            MockPaymentGateway::new(),
        )
        .run()
        .await
        .unwrap();

        assert_eq!(report.stripe_updated, 0);
        assert_eq!(report.stripe_orders_created, 0);
    }

    #[tokio::test]
    async fn pending_cancellation_is_not_overwritten_by_an_active_provider_status() {
        let mut subscription_repo = MockSubscriptionRepository::new();
        let mut order_repo = MockOrderRepository::new();
        let mut card = MockPaymentGateway::new();

        let mut row = open_row("card", "sub_ending");
        row.status = "pending_cancellation".to_string();
        subscription_repo
            .expect_list_open_by_provider()
            .withf(|provider| provider == "card")
            .returning(move |_| {
                let rows = vec![row.clone()];
                Box::pin(async move { Ok(rows) })
            });
        empty_wallet(&mut subscription_repo);
        card.expect_fetch_subscription()
            .returning(|_| Ok(remote(ProviderStatus::Active, None)));
        // Period is new, so an update happens, but the local status survives.
        subscription_repo
            .expect_update_period_by_provider_subscription_id()
            .withf(|_, update| update.status == "pending_cancellation")
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(()) }));
        order_repo
            .expect_find_by_provider_payment_id()
            .never()
            .returning(|_, _| Box::pin(async { Ok(Vec::new()) }));

        let report = build(
            subscription_repo,
            order_repo,
            MockOrderRepository::new(),
            card,
            MockPaymentGateway::new(),
        )
        .run()
        .await
        .unwrap();

        assert_eq!(report.stripe_updated, 1);
    }
}
