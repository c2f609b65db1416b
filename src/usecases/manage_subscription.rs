use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::domain::repositories::orders::OrderRepository;
use crate::domain::repositories::products::ProductRepository;
use crate::domain::repositories::subscriptions::SubscriptionRepository;
use crate::domain::value_objects::checkout::{
    ManageAction, ManageSubscriptionRequest, ManageSubscriptionResponse,
};
use crate::domain::value_objects::enums::billing_intervals::BillingInterval;
use crate::domain::value_objects::enums::payment_providers::PaymentProvider;
use crate::domain::value_objects::enums::subscription_statuses::SubscriptionStatus;
use crate::domain::value_objects::pricing::CouponKind;
use crate::domain::entities::subscriptions::SubscriptionEntity;
use crate::payments::provider::{GatewayError, PaymentGateway, RecurringDiscount};

#[derive(Debug, Error)]
pub enum ManageError {
    #[error("subscription not found")]
    SubscriptionNotFound,
    #[error("invalid action: {0}")]
    InvalidAction(String),
    #[error("coupon not found or not applicable")]
    CouponNotApplicable,
    #[error("provider rejected the request: {0}")]
    Provider(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ManageError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            ManageError::SubscriptionNotFound => StatusCode::NOT_FOUND,
            ManageError::InvalidAction(_) | ManageError::CouponNotApplicable => {
                StatusCode::BAD_REQUEST
            }
            ManageError::Provider(_) => StatusCode::BAD_GATEWAY,
            ManageError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn map_gateway(err: GatewayError) -> ManageError {
    match err {
        GatewayError::Rejected(message) | GatewayError::RefundFailed(message) => {
            ManageError::Provider(message)
        }
        other => ManageError::Internal(anyhow::Error::new(other)),
    }
}

pub type ManageResult<T> = std::result::Result<T, ManageError>;

/// Admin-driven subscription actions. Every state change goes provider-first:
/// the local row only moves once the provider call succeeded, so the ledger
/// never claims a state the provider does not have.
pub struct ManageSubscriptionUseCase<S, O, P, C, W>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    O: OrderRepository + Send + Sync + 'static,
    P: ProductRepository + Send + Sync + 'static,
    C: PaymentGateway + 'static,
    W: PaymentGateway + 'static,
{
    subscription_repo: Arc<S>,
    order_repo: Arc<O>,
    product_repo: Arc<P>,
    card: Arc<C>,
    wallet: Arc<W>,
}

impl<S, O, P, C, W> ManageSubscriptionUseCase<S, O, P, C, W>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    O: OrderRepository + Send + Sync + 'static,
    P: ProductRepository + Send + Sync + 'static,
    C: PaymentGateway + 'static,
    W: PaymentGateway + 'static,
{
    pub fn new(
        subscription_repo: Arc<S>,
        order_repo: Arc<O>,
        product_repo: Arc<P>,
        card: Arc<C>,
        wallet: Arc<W>,
    ) -> Self {
        Self {
            subscription_repo,
            order_repo,
            product_repo,
            card,
            wallet,
        }
    }

    fn gateway_for(&self, provider: &str) -> &dyn PaymentGateway {
        match PaymentProvider::from_str(provider) {
            Some(PaymentProvider::Wallet) => self.wallet.as_ref(),
            _ => self.card.as_ref(),
        }
    }

    pub async fn handle(
        &self,
        req: ManageSubscriptionRequest,
    ) -> ManageResult<ManageSubscriptionResponse> {
        let subscription = self
            .subscription_repo
            .find_by_id(req.subscription_id)
            .await?
            .ok_or(ManageError::SubscriptionNotFound)?;
        let status = SubscriptionStatus::from_str(&subscription.status);

        info!(
            subscription_id = %subscription.id,
            current_status = %status,
            action = ?req.action,
            "subscriptions: admin action"
        );

        match req.action {
            ManageAction::Pause => self.pause(&subscription, status).await,
            ManageAction::Resume => self.resume(&subscription, status).await,
            ManageAction::Cancel => self.cancel(&subscription, status).await,
            ManageAction::UpdatePrice => {
                self.update_price(&subscription, status, req.data.amount, req.data.currency)
                    .await
            }
            ManageAction::ApplyCoupon => {
                self.apply_coupon(&subscription, status, req.data.coupon_code.as_deref())
                    .await
            }
            ManageAction::RemoveCoupon => self.remove_coupon(&subscription, status).await,
            ManageAction::Delete => self.delete(&subscription).await,
        }
    }

    fn reject_terminal(&self, status: SubscriptionStatus) -> ManageResult<()> {
        if status.is_terminal() {
            return Err(ManageError::InvalidAction(
                "subscription is cancelled".to_string(),
            ));
        }
        Ok(())
    }

    async fn pause(
        &self,
        subscription: &SubscriptionEntity,
        status: SubscriptionStatus,
    ) -> ManageResult<ManageSubscriptionResponse> {
        if status == SubscriptionStatus::Paused {
            // Already there; repeating the request is a no-op success.
            return Ok(ok_response(status));
        }
        self.reject_terminal(status)?;
        if !status.can_pause() {
            return Err(ManageError::InvalidAction(format!(
                "cannot pause a {status} subscription"
            )));
        }

        self.gateway_for(&subscription.provider)
            .pause(&subscription.provider_subscription_id)
            .await
            .map_err(map_gateway)?;
        self.subscription_repo
            .update_status(subscription.id, SubscriptionStatus::Paused.as_str(), None)
            .await?;
        Ok(ok_response(SubscriptionStatus::Paused))
    }

    async fn resume(
        &self,
        subscription: &SubscriptionEntity,
        status: SubscriptionStatus,
    ) -> ManageResult<ManageSubscriptionResponse> {
        if status == SubscriptionStatus::Active {
            return Ok(ok_response(status));
        }
        self.reject_terminal(status)?;
        if !status.can_resume() {
            return Err(ManageError::InvalidAction(format!(
                "cannot resume a {status} subscription"
            )));
        }

        self.gateway_for(&subscription.provider)
            .resume(&subscription.provider_subscription_id)
            .await
            .map_err(map_gateway)?;
        self.subscription_repo
            .update_status(subscription.id, SubscriptionStatus::Active.as_str(), None)
            .await?;
        Ok(ok_response(SubscriptionStatus::Active))
    }

    /// Admin cancel schedules at period end: the row parks in
    /// pending_cancellation and flips to cancelled when the provider's
    /// cancellation webhook lands.
    async fn cancel(
        &self,
        subscription: &SubscriptionEntity,
        status: SubscriptionStatus,
    ) -> ManageResult<ManageSubscriptionResponse> {
        self.reject_terminal(status)?;
        if !status.can_cancel() {
            return Err(ManageError::InvalidAction(format!(
                "cannot cancel a {status} subscription"
            )));
        }

        self.gateway_for(&subscription.provider)
            .cancel(&subscription.provider_subscription_id, true)
            .await
            .map_err(map_gateway)?;
        self.subscription_repo
            .update_status(
                subscription.id,
                SubscriptionStatus::PendingCancellation.as_str(),
                None,
            )
            .await?;
        Ok(ok_response(SubscriptionStatus::PendingCancellation))
    }

    async fn update_price(
        &self,
        subscription: &SubscriptionEntity,
        status: SubscriptionStatus,
        amount: Option<i64>,
        currency: Option<String>,
    ) -> ManageResult<ManageSubscriptionResponse> {
        self.reject_terminal(status)?;
        let amount = amount
            .filter(|a| *a > 0)
            .ok_or_else(|| ManageError::InvalidAction("update_price requires an amount".to_string()))?;
        let currency = currency.unwrap_or_else(|| subscription.currency.clone());
        let interval = BillingInterval::from_str(&subscription.interval);

        let update = self
            .gateway_for(&subscription.provider)
            .update_price(
                &subscription.provider_subscription_id,
                amount,
                &currency,
                interval,
            )
            .await
            .map_err(map_gateway)?;

        // The wallet provider needs buyer re-approval; the row keeps the old
        // amount until approval lands via webhook.
        if update.applied {
            self.subscription_repo
                .update_amount(
                    subscription.id,
                    amount,
                    subscription.coupon_code.clone(),
                    subscription.discount_minor,
                )
                .await?;
        }

        Ok(ManageSubscriptionResponse {
            success: true,
            status: status.as_str().to_string(),
            approval_url: update.approval_url,
            amount: Some(amount),
        })
    }

    async fn apply_coupon(
        &self,
        subscription: &SubscriptionEntity,
        status: SubscriptionStatus,
        coupon_code: Option<&str>,
    ) -> ManageResult<ManageSubscriptionResponse> {
        self.reject_terminal(status)?;
        let code = coupon_code.ok_or_else(|| {
            ManageError::InvalidAction("apply_coupon requires a coupon code".to_string())
        })?;

        let coupon = self
            .product_repo
            .find_coupon(code)
            .await?
            .filter(|c| c.applies_to(subscription.product_id))
            .ok_or(ManageError::CouponNotApplicable)?;

        let (percent, amount_minor, discount_minor) = match CouponKind::from_str(&coupon.kind) {
            CouponKind::Percent => {
                let pct = coupon.percent.unwrap_or(0);
                (
                    Some(pct),
                    None,
                    subscription.amount_minor * i64::from(pct) / 100,
                )
            }
            CouponKind::Fixed => {
                let fixed = coupon
                    .amount_minor
                    .unwrap_or(0)
                    .min(subscription.amount_minor);
                (None, Some(fixed), fixed)
            }
        };

        self.gateway_for(&subscription.provider)
            .apply_recurring_discount(
                &subscription.provider_subscription_id,
                &RecurringDiscount {
                    percent,
                    amount_minor,
                    currency: subscription.currency.clone(),
                },
            )
            .await
            .map_err(map_gateway)?;

        // The base amount never changes; only the coupon bookkeeping does.
        self.subscription_repo
            .update_amount(
                subscription.id,
                subscription.amount_minor,
                Some(coupon.code),
                discount_minor,
            )
            .await?;

        Ok(ManageSubscriptionResponse {
            success: true,
            status: status.as_str().to_string(),
            approval_url: None,
            amount: Some(subscription.amount_minor),
        })
    }

    async fn remove_coupon(
        &self,
        subscription: &SubscriptionEntity,
        status: SubscriptionStatus,
    ) -> ManageResult<ManageSubscriptionResponse> {
        self.reject_terminal(status)?;

        self.gateway_for(&subscription.provider)
            .remove_recurring_discount(&subscription.provider_subscription_id)
            .await
            .map_err(map_gateway)?;
        self.subscription_repo
            .update_amount(subscription.id, subscription.amount_minor, None, 0)
            .await?;

        Ok(ManageSubscriptionResponse {
            success: true,
            status: status.as_str().to_string(),
            approval_url: None,
            amount: Some(subscription.amount_minor),
        })
    }

    /// Hard delete for bookkeeping cleanup. Referencing orders are unlinked
    /// first so the ledger survives; the provider-side object is cancelled
    /// immediately, tolerating already-gone subscriptions.
    async fn delete(
        &self,
        subscription: &SubscriptionEntity,
    ) -> ManageResult<ManageSubscriptionResponse> {
        if let Err(err) = self
            .gateway_for(&subscription.provider)
            .cancel(&subscription.provider_subscription_id, false)
            .await
        {
            info!(
                subscription_id = %subscription.id,
                error = %err,
                "subscriptions: provider cancel during delete failed, continuing"
            );
        }

        let unlinked = self.order_repo.unlink_subscription(subscription.id).await?;
        self.subscription_repo.delete(subscription.id).await?;

        info!(
            subscription_id = %subscription.id,
            unlinked_orders = unlinked,
            "subscriptions: hard-deleted"
        );
        Ok(ManageSubscriptionResponse {
            success: true,
            status: "deleted".to_string(),
            approval_url: None,
            amount: None,
        })
    }
}

fn ok_response(status: SubscriptionStatus) -> ManageSubscriptionResponse {
    ManageSubscriptionResponse {
        success: true,
        status: status.as_str().to_string(),
        approval_url: None,
        amount: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::products::CouponEntity;
    use crate::domain::repositories::orders::MockOrderRepository;
    use crate::domain::repositories::products::MockProductRepository;
    use crate::domain::repositories::subscriptions::MockSubscriptionRepository;
    use crate::domain::value_objects::checkout::ManageActionData;
    use crate::payments::provider::{MockPaymentGateway, PriceUpdate};
    use chrono::Utc;
    use mockall::Sequence;
    use uuid::Uuid;

    type TestUseCase = ManageSubscriptionUseCase<
        MockSubscriptionRepository,
        MockOrderRepository,
        MockProductRepository,
        MockPaymentGateway,
        MockPaymentGateway,
    >;

    fn build(
        subs: MockSubscriptionRepository,
        orders: MockOrderRepository,
        products: MockProductRepository,
        card: MockPaymentGateway,
        wallet: MockPaymentGateway,
    ) -> TestUseCase {
        ManageSubscriptionUseCase::new(
            Arc::new(subs),
            Arc::new(orders),
            Arc::new(products),
            Arc::new(card),
            Arc::new(wallet),
        )
    }

    fn subscription(status: &str) -> SubscriptionEntity {
        SubscriptionEntity {
            id: Uuid::new_v4(),
            user_id: Some(Uuid::new_v4()),
            email: "buyer@example.com".to_string(),
            full_name: "Buyer".to_string(),
            product_id: Uuid::new_v4(),
            provider: "card".to_string(),
            provider_subscription_id: "sub_123".to_string(),
            status: status.to_string(),
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

    fn expect_find(subs: &mut MockSubscriptionRepository, row: SubscriptionEntity) {
        subs.expect_find_by_id().returning(move |_| {
            let row = row.clone();
            Box::pin(async move { Ok(Some(row)) })
        });
    }

    fn request(action: ManageAction, subscription_id: Uuid) -> ManageSubscriptionRequest {
        ManageSubscriptionRequest {
            action,
            subscription_id,
            data: ManageActionData::default(),
        }
    }

    #[tokio::test]
    async fn pausing_a_cancelled_subscription_is_rejected() {
        let row = subscription("cancelled");
        let id = row.id;
        let mut subs = MockSubscriptionRepository::new();
        expect_find(&mut subs, row);

        let usecase = build(
            subs,
            MockOrderRepository::new(),
            MockProductRepository::new(),
            MockPaymentGateway::new(),
            MockPaymentGateway::new(),
        );

        let err = usecase.handle(request(ManageAction::Pause, id)).await.unwrap_err();
        assert!(matches!(err, ManageError::InvalidAction(_)));
    }

    #[tokio::test]
    async fn pausing_an_already_paused_subscription_is_a_noop() {
        let row = subscription("paused");
        let id = row.id;
        let mut subs = MockSubscriptionRepository::new();
        expect_find(&mut subs, row);

        // No gateway or update_status expectations: any call would panic.
        let usecase = build(
            subs,
            MockOrderRepository::new(),
            MockProductRepository::new(),
            MockPaymentGateway::new(),
            MockPaymentGateway::new(),
        );

        let resp = usecase.handle(request(ManageAction::Pause, id)).await.unwrap();
        assert!(resp.success);
        assert_eq!(resp.status, "paused");
    }

    #[tokio::test]
    async fn cancel_parks_in_pending_cancellation() {
        let row = subscription("active");
        let id = row.id;
        let mut subs = MockSubscriptionRepository::new();
        expect_find(&mut subs, row);
        subs.expect_update_status()
            .withf(|_, status, _| status == "pending_cancellation")
            .times(1)
            .returning(|_, _, _| Box::pin(async { Ok(()) }));

        let mut card = MockPaymentGateway::new();
        card.expect_cancel()
            .withf(|_, at_period_end| *at_period_end)
            .times(1)
            .returning(|_, _| Ok(()));

        let usecase = build(
            subs,
            MockOrderRepository::new(),
            MockProductRepository::new(),
            card,
            MockPaymentGateway::new(),
        );

        let resp = usecase.handle(request(ManageAction::Cancel, id)).await.unwrap();
        assert_eq!(resp.status, "pending_cancellation");
    }

    #[tokio::test]
    async fn apply_then_remove_coupon_restores_the_row() {
        let row = subscription("active");
        let id = row.id;
        let product_id = row.product_id;

        let mut subs = MockSubscriptionRepository::new();
        expect_find(&mut subs, row);
        let mut seq = Sequence::new();
        subs.expect_update_amount()
            .withf(|_, amount, coupon, discount| {
                *amount == 2900 && coupon.as_deref() == Some("SAVE20") && *discount == 580
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Box::pin(async { Ok(()) }));
        subs.expect_update_amount()
            .withf(|_, amount, coupon, discount| {
                *amount == 2900 && coupon.is_none() && *discount == 0
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Box::pin(async { Ok(()) }));

        let mut products = MockProductRepository::new();
        products.expect_find_coupon().returning(move |code| {
            let coupon = CouponEntity {
                id: 1,
                code: code.to_string(),
                kind: "percent".to_string(),
                percent: Some(20),
                amount_minor: None,
                product_id: Some(product_id),
                is_active: true,
            };
            Box::pin(async move { Ok(Some(coupon)) })
        });

        let mut card = MockPaymentGateway::new();
        card.expect_apply_recurring_discount()
            .times(1)
            .returning(|_, _| Ok(()));
        card.expect_remove_recurring_discount()
            .times(1)
            .returning(|_| Ok(()));

        let usecase = build(
            subs,
            MockOrderRepository::new(),
            products,
            card,
            MockPaymentGateway::new(),
        );

        let mut apply = request(ManageAction::ApplyCoupon, id);
        apply.data.coupon_code = Some("SAVE20".to_string());
        let resp = usecase.handle(apply).await.unwrap();
        assert_eq!(resp.amount, Some(2900));

        let resp = usecase.handle(request(ManageAction::RemoveCoupon, id)).await.unwrap();
        assert_eq!(resp.amount, Some(2900));
    }

    #[tokio::test]
    async fn wallet_price_update_defers_until_reapproval() {
        let mut row = subscription("active");
        row.provider = "wallet".to_string();
        row.provider_subscription_id = "I-ABC".to_string();
        let id = row.id;

        let mut subs = MockSubscriptionRepository::new();
        expect_find(&mut subs, row);
        // No update_amount: the local row keeps the old price.

        let mut wallet = MockPaymentGateway::new();
        wallet
            .expect_update_price()
            .times(1)
            .returning(|_, _, _, _| {
                Ok(PriceUpdate {
                    applied: false,
                    approval_url: Some("https://wallet.example/approve".to_string()),
                })
            });

        let usecase = build(
            subs,
            MockOrderRepository::new(),
            MockProductRepository::new(),
            MockPaymentGateway::new(),
            wallet,
        );

        let mut req = request(ManageAction::UpdatePrice, id);
        req.data.amount = Some(3900);
        let resp = usecase.handle(req).await.unwrap();
        assert!(resp.approval_url.is_some());
        assert_eq!(resp.amount, Some(3900));
    }

    #[tokio::test]
    async fn delete_unlinks_orders_before_removing_the_row() {
        let row = subscription("active");
        let id = row.id;

        let mut seq = Sequence::new();
        let mut orders = MockOrderRepository::new();
        orders
            .expect_unlink_subscription()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Box::pin(async { Ok(2) }));

        let mut subs = MockSubscriptionRepository::new();
        expect_find(&mut subs, row);
        subs.expect_delete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Box::pin(async { Ok(()) }));

        let mut card = MockPaymentGateway::new();
        card.expect_cancel().returning(|_, _| Ok(()));

        let usecase = build(
            subs,
            orders,
            MockProductRepository::new(),
            card,
            MockPaymentGateway::new(),
        );

        let resp = usecase.handle(request(ManageAction::Delete, id)).await.unwrap();
        assert_eq!(resp.status, "deleted");
    }
}
