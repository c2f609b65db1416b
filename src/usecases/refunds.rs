use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::repositories::enrollments::EnrollmentRepository;
use crate::domain::repositories::orders::OrderRepository;
use crate::domain::repositories::products::ProductRepository;
use crate::domain::repositories::subscriptions::SubscriptionRepository;
use crate::domain::repositories::users::UserRepository;
use crate::domain::value_objects::checkout::{ProcessRefundRequest, ProcessRefundResponse};
use crate::domain::value_objects::enums::payment_providers::PaymentProvider;
use crate::domain::value_objects::enums::subscription_statuses::SubscriptionStatus;
use crate::payments::provider::{GatewayError, PaymentGateway};
use crate::usecases::entitlements::EntitlementGrantor;
use crate::usecases::ledger::LedgerWriter;
use crate::usecases::support::best_effort;

#[derive(Debug, Error)]
pub enum RefundError {
    #[error("order not found")]
    OrderNotFound,
    #[error("invalid refund: {0}")]
    InvalidRefund(String),
    #[error("provider refund failed: {0}")]
    Provider(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl RefundError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            RefundError::OrderNotFound => StatusCode::NOT_FOUND,
            RefundError::InvalidRefund(_) => StatusCode::BAD_REQUEST,
            RefundError::Provider(_) => StatusCode::BAD_GATEWAY,
            RefundError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type RefundResult<T> = std::result::Result<T, RefundError>;

/// Admin refunds. Provider-first: the ledger only records what the provider
/// confirmed, and a full refund of a subscription's order also cancels the
/// subscription and revokes its grants.
pub struct RefundUseCase<O, S, P, En, U, C, W>
where
    O: OrderRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: ProductRepository + Send + Sync + 'static,
    En: EnrollmentRepository + Send + Sync + 'static,
    U: UserRepository + Send + Sync + 'static,
    C: PaymentGateway + 'static,
    W: PaymentGateway + 'static,
{
    order_repo: Arc<O>,
    subscription_repo: Arc<S>,
    product_repo: Arc<P>,
    ledger: Arc<LedgerWriter<O>>,
    grantor: Arc<EntitlementGrantor<P, En, U>>,
    card: Arc<C>,
    wallet: Arc<W>,
}

impl<O, S, P, En, U, C, W> RefundUseCase<O, S, P, En, U, C, W>
where
    O: OrderRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: ProductRepository + Send + Sync + 'static,
    En: EnrollmentRepository + Send + Sync + 'static,
    U: UserRepository + Send + Sync + 'static,
    C: PaymentGateway + 'static,
    W: PaymentGateway + 'static,
{
    pub fn new(
        order_repo: Arc<O>,
        subscription_repo: Arc<S>,
        product_repo: Arc<P>,
        ledger: Arc<LedgerWriter<O>>,
        grantor: Arc<EntitlementGrantor<P, En, U>>,
        card: Arc<C>,
        wallet: Arc<W>,
    ) -> Self {
        Self {
            order_repo,
            subscription_repo,
            product_repo,
            ledger,
            grantor,
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

    pub async fn process_refund(
        &self,
        req: ProcessRefundRequest,
    ) -> RefundResult<ProcessRefundResponse> {
        let order = self
            .order_repo
            .find_by_id(req.order_id)
            .await?
            .ok_or(RefundError::OrderNotFound)?;

        let remaining = order.amount_minor - order.refund_minor;
        if remaining <= 0 {
            return Err(RefundError::InvalidRefund(
                "order is already fully refunded".to_string(),
            ));
        }
        let amount = req.amount.unwrap_or(remaining);
        if amount <= 0 || amount > remaining {
            return Err(RefundError::InvalidRefund(format!(
                "refund amount {amount} outside the refundable remainder {remaining}"
            )));
        }

        info!(
            order_id = %order.id,
            amount,
            remaining,
            provider = %order.provider,
            "refunds: issuing refund"
        );

        let handle = self
            .gateway_for(&order.provider)
            .issue_refund(
                &order.provider_payment_id,
                Some(amount),
                &order.currency,
                req.reason.as_deref(),
            )
            .await
            .map_err(|err| match err {
                GatewayError::RefundFailed(message) | GatewayError::Rejected(message) => {
                    RefundError::Provider(message)
                }
                other => RefundError::Internal(anyhow::Error::new(other)),
            })?;

        let outcome = self
            .ledger
            .apply_refund(
                &order,
                handle.amount_minor,
                req.reason.as_deref(),
                Some(&handle.refund_id),
            )
            .await?;

        if outcome.is_full {
            self.revoke_after_full_refund(&order).await;
        }

        Ok(ProcessRefundResponse {
            success: true,
            refund_id: handle.refund_id,
            refund_amount: handle.amount_minor,
            is_full_refund: outcome.is_full,
        })
    }

    /// A fully refunded order loses its grants; when the order belongs to a
    /// subscription the subscription is cancelled immediately as well. All
    /// best-effort: the money already moved back.
    async fn revoke_after_full_refund(&self, order: &crate::domain::entities::orders::OrderEntity) {
        let product = match self.product_repo.find_active_by_id(order.product_id).await {
            Ok(Some(product)) => product,
            Ok(None) => {
                warn!(order_id = %order.id, "refunds: product gone, skipping revoke");
                return;
            }
            Err(err) => {
                warn!(order_id = %order.id, error = %err, "refunds: product lookup failed, skipping revoke");
                return;
            }
        };

        best_effort(
            "revoke purchase grants",
            self.grantor.revoke(order.user_id, &product, order.id),
        )
        .await;

        let Some(subscription_id) = order.subscription_id else {
            return;
        };
        let subscription = match self.subscription_repo.find_by_id(subscription_id).await {
            Ok(Some(subscription)) => subscription,
            _ => return,
        };

        if let Err(err) = self
            .gateway_for(&subscription.provider)
            .cancel(&subscription.provider_subscription_id, false)
            .await
        {
            warn!(
                subscription_id = %subscription.id,
                error = %err,
                "refunds: provider cancel failed, continuing"
            );
        }
        best_effort(
            "cancel refunded subscription",
            self.subscription_repo.update_status(
                subscription.id,
                SubscriptionStatus::Cancelled.as_str(),
                Some(Utc::now()),
            ),
        )
        .await;
        best_effort(
            "revoke subscription grants",
            self.grantor.revoke(order.user_id, &product, subscription.id),
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::orders::OrderEntity;
    use crate::domain::entities::products::ProductEntity;
    use crate::domain::entities::subscriptions::SubscriptionEntity;
    use crate::domain::repositories::enrollments::MockEnrollmentRepository;
    use crate::domain::repositories::orders::MockOrderRepository;
    use crate::domain::repositories::products::MockProductRepository;
    use crate::domain::repositories::subscriptions::MockSubscriptionRepository;
    use crate::domain::repositories::users::MockUserRepository;
    use crate::payments::provider::{MockPaymentGateway, RefundHandle};
    use uuid::Uuid;

    struct Fixture {
        order_repo: MockOrderRepository,
        ledger_orders: MockOrderRepository,
        subscription_repo: MockSubscriptionRepository,
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
                order_repo: MockOrderRepository::new(),
                ledger_orders: MockOrderRepository::new(),
                subscription_repo: MockSubscriptionRepository::new(),
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
        ) -> RefundUseCase<
            MockOrderRepository,
            MockSubscriptionRepository,
            MockProductRepository,
            MockEnrollmentRepository,
            MockUserRepository,
            MockPaymentGateway,
            MockPaymentGateway,
        > {
            RefundUseCase::new(
                Arc::new(self.order_repo),
                Arc::new(self.subscription_repo),
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

    fn order(amount_minor: i64, refund_minor: i64, subscription_id: Option<Uuid>) -> OrderEntity {
        OrderEntity {
            id: Uuid::new_v4(),
            user_id: Some(Uuid::new_v4()),
            email: "buyer@example.com".to_string(),
            full_name: "Buyer".to_string(),
            product_id: Uuid::new_v4(),
            amount_minor,
            currency: "USD".to_string(),
            provider: "card".to_string(),
            provider_payment_id: "pi_123".to_string(),
            provider_transaction_id: Some("txn_1".to_string()),
            status: "completed".to_string(),
            coupon_code: None,
            discount_minor: 0,
            fee_minor: Some(300),
            net_minor: Some(9700),
            subscription_id,
            refund_minor,
            refund_reason: None,
            provider_refund_id: None,
            refunded_at: None,
            created_at: Utc::now(),
        }
    }

    fn product(id: Uuid) -> ProductEntity {
        ProductEntity {
            id,
            name: "Course".to_string(),
            product_type: "subscription".to_string(),
            base_amount_minor: 10000,
            base_currency: "USD".to_string(),
            billing_interval: Some("month".to_string()),
            trial_enabled: false,
            trial_days: 0,
            trial_amount_minor: 0,
            min_amount_minor: None,
            max_amount_minor: None,
            suggested_amount_minor: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn subscription(id: Uuid) -> SubscriptionEntity {
        SubscriptionEntity {
            id,
            user_id: Some(Uuid::new_v4()),
            email: "buyer@example.com".to_string(),
            full_name: "Buyer".to_string(),
            product_id: Uuid::new_v4(),
            provider: "card".to_string(),
            provider_subscription_id: "sub_123".to_string(),
            status: "active".to_string(),
            amount_minor: 10000,
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

    fn expect_order(repo: &mut MockOrderRepository, row: OrderEntity) {
        repo.expect_find_by_id().returning(move |_| {
            let row = row.clone();
            Box::pin(async move { Ok(Some(row)) })
        });
    }

    #[tokio::test]
    async fn full_refund_cancels_the_linked_subscription_and_revokes_grants() {
        let subscription_id = Uuid::new_v4();
        let row = order(10000, 0, Some(subscription_id));
        let order_id = row.id;
        let product_id = row.product_id;

        let mut fixture = Fixture::new();
        expect_order(&mut fixture.order_repo, row);
        fixture
            .card
            .expect_issue_refund()
            .withf(|_, amount, _, _| *amount == Some(10000))
            .times(1)
            .returning(|_, _, _, _| {
                Ok(RefundHandle {
                    refund_id: "re_1".to_string(),
                    amount_minor: 10000,
                    refunded_payment_id: "pi_123".to_string(),
                })
            });
        fixture
            .ledger_orders
            .expect_apply_refund()
            .withf(|_, update| update.status == "refunded" && update.refund_minor == 10000)
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(()) }));
        fixture
            .product_repo
            .expect_find_active_by_id()
            .returning(move |id| {
                let product = product(id);
                Box::pin(async move { Ok(Some(product)) })
            });
        fixture
            .enrollment_repo
            .expect_deactivate_for_source()
            .times(2) // once for the order, once for the subscription
            .returning(|_| Box::pin(async { Ok(1) }));
        fixture
            .grantor_users
            .expect_set_premium()
            .times(0..=2)
            .returning(|_, _| Box::pin(async { Ok(()) }));
        fixture
            .subscription_repo
            .expect_find_by_id()
            .returning(move |id| {
                let row = subscription(id);
                Box::pin(async move { Ok(Some(row)) })
            });
        fixture
            .card
            .expect_cancel()
            .withf(|_, at_period_end| !*at_period_end)
            .times(1)
            .returning(|_, _| Ok(()));
        fixture
            .subscription_repo
            .expect_update_status()
            .withf(|_, status, cancelled_at| status == "cancelled" && cancelled_at.is_some())
            .times(1)
            .returning(|_, _, _| Box::pin(async { Ok(()) }));

        let usecase = fixture.build();
        let resp = usecase
            .process_refund(ProcessRefundRequest {
                order_id,
                amount: None,
                reason: Some("requested_by_customer".to_string()),
            })
            .await
            .unwrap();

        assert!(resp.is_full_refund);
        assert_eq!(resp.refund_amount, 10000);
        let _ = product_id;
    }

    #[tokio::test]
    async fn partial_refund_leaves_the_subscription_alone() {
        let row = order(10000, 0, Some(Uuid::new_v4()));
        let order_id = row.id;

        let mut fixture = Fixture::new();
        expect_order(&mut fixture.order_repo, row);
        fixture
            .card
            .expect_issue_refund()
            .returning(|_, amount, _, _| {
                Ok(RefundHandle {
                    refund_id: "re_2".to_string(),
                    amount_minor: amount.unwrap_or(0),
                    refunded_payment_id: "pi_123".to_string(),
                })
            });
        fixture
            .ledger_orders
            .expect_apply_refund()
            .withf(|_, update| update.status == "partial_refund")
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(()) }));

        // No product lookup, no cancel, no revoke: partial refunds keep
        // everything granted.
        let usecase = fixture.build();
        let resp = usecase
            .process_refund(ProcessRefundRequest {
                order_id,
                amount: Some(4000),
                reason: None,
            })
            .await
            .unwrap();

        assert!(!resp.is_full_refund);
        assert_eq!(resp.refund_amount, 4000);
    }

    #[tokio::test]
    async fn refund_beyond_remainder_is_rejected() {
        let row = order(10000, 8000, None);
        let order_id = row.id;

        let mut fixture = Fixture::new();
        expect_order(&mut fixture.order_repo, row);

        let usecase = fixture.build();
        let err = usecase
            .process_refund(ProcessRefundRequest {
                order_id,
                amount: Some(4000),
                reason: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, RefundError::InvalidRefund(_)));
    }

    #[tokio::test]
    async fn provider_failure_leaves_the_ledger_untouched() {
        let row = order(10000, 0, None);
        let order_id = row.id;

        let mut fixture = Fixture::new();
        expect_order(&mut fixture.order_repo, row);
        fixture.card.expect_issue_refund().returning(|_, _, _, _| {
            Err(GatewayError::RefundFailed(
                "charge already disputed".to_string(),
            ))
        });
        // No apply_refund expectation: a ledger write would panic the mock.

        let usecase = fixture.build();
        let err = usecase
            .process_refund(ProcessRefundRequest {
                order_id,
                amount: None,
                reason: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, RefundError::Provider(_)));
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_GATEWAY);
    }
}
