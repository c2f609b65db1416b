use std::sync::Arc;

use chrono::{Duration, Utc};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth;
use crate::config::config_model::AuthConfig;
use crate::domain::entities::orders::InsertOrderEntity;
use crate::domain::entities::products::ProductEntity;
use crate::domain::entities::subscriptions::{InsertSubscriptionEntity, SubscriptionPeriodUpdate};
use crate::domain::entities::users::{InsertUserEntity, UserEntity};
use crate::domain::repositories::contact_tags::ContactTagRepository;
use crate::domain::repositories::enrollments::EnrollmentRepository;
use crate::domain::repositories::orders::OrderRepository;
use crate::domain::repositories::products::ProductRepository;
use crate::domain::repositories::subscriptions::SubscriptionRepository;
use crate::domain::repositories::users::UserRepository;
use crate::domain::value_objects::checkout::{
    ActivateWalletSubscriptionRequest, ActivateWalletSubscriptionResponse,
    CompleteOneTimePaymentRequest, CompleteOneTimePaymentResponse, CreateFreeTrialRequest,
    CreateFreeTrialResponse, CreateOneTimePaymentRequest, CreateOneTimePaymentResponse,
    CreateSubscriptionRequest, CreateSubscriptionResponse,
};
use crate::domain::value_objects::enums::billing_intervals::BillingInterval;
use crate::domain::value_objects::enums::entitlement_items::GrantSource;
use crate::domain::value_objects::enums::order_statuses::OrderStatus;
use crate::domain::value_objects::enums::payment_providers::PaymentProvider;
use crate::domain::value_objects::enums::product_types::ProductType;
use crate::domain::value_objects::enums::subscription_statuses::SubscriptionStatus;
use crate::infrastructure::mailer::MailerClient;
use crate::payments::provider::{
    BuyerInfo, ChargeLineItem, GatewayError, PaymentGateway, PlanSpec, ProviderStatus,
    RecurringDiscount, SubscriptionHandle,
};
use crate::usecases::entitlements::EntitlementGrantor;
use crate::usecases::ledger::{BasketCharge, LedgerWriter, allocate_proportionally};
use crate::usecases::pricing::PriceResolver;
use crate::usecases::support::{
    FEE_LOOKUP_RETRY, SIDE_EFFECT_RETRY, best_effort, epoch_to_datetime, retry_with_delay,
    subscription_status_from_provider,
};

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("product not found or inactive")]
    ProductNotFound,
    #[error("product is not a recurring product")]
    NotRecurring,
    #[error("product has no free trial configured")]
    TrialNotEnabled,
    #[error("basket mixes currencies")]
    MixedCurrencies,
    #[error("payment rejected: {0}")]
    PaymentRejected(String),
    #[error("no order found for payment {0}")]
    OrderNotFound(String),
    #[error("subscription not found")]
    SubscriptionNotFound,
    #[error("subscription has not been approved by the buyer yet")]
    NotApproved,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CheckoutError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            CheckoutError::ProductNotFound
            | CheckoutError::OrderNotFound(_)
            | CheckoutError::SubscriptionNotFound => StatusCode::NOT_FOUND,
            CheckoutError::NotRecurring
            | CheckoutError::TrialNotEnabled
            | CheckoutError::MixedCurrencies => StatusCode::BAD_REQUEST,
            CheckoutError::PaymentRejected(_) => StatusCode::PAYMENT_REQUIRED,
            CheckoutError::NotApproved => StatusCode::CONFLICT,
            CheckoutError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn map_gateway(err: GatewayError) -> CheckoutError {
    match err {
        GatewayError::Rejected(message) => CheckoutError::PaymentRejected(message),
        other => CheckoutError::Internal(anyhow::Error::new(other)),
    }
}

pub type CheckoutResult<T> = std::result::Result<T, CheckoutError>;

/// Checkout entry points: create or activate provider-side payment objects,
/// persist ledger rows, provision buyer accounts, and grant entitlements.
/// Essential provider calls are never auto-retried; everything after money
/// moves runs best-effort.
pub struct CheckoutUseCase<P, U, O, S, En, T, C, W, M>
where
    P: ProductRepository + Send + Sync + 'static,
    U: UserRepository + Send + Sync + 'static,
    O: OrderRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    En: EnrollmentRepository + Send + Sync + 'static,
    T: ContactTagRepository + Send + Sync + 'static,
    C: PaymentGateway + 'static,
    W: PaymentGateway + 'static,
    M: MailerClient + 'static,
{
    product_repo: Arc<P>,
    user_repo: Arc<U>,
    order_repo: Arc<O>,
    subscription_repo: Arc<S>,
    contact_tag_repo: Arc<T>,
    price_resolver: Arc<PriceResolver<P>>,
    grantor: Arc<EntitlementGrantor<P, En, U>>,
    ledger: Arc<LedgerWriter<O>>,
    card: Arc<C>,
    wallet: Arc<W>,
    mailer: Arc<M>,
    auth_config: AuthConfig,
}

impl<P, U, O, S, En, T, C, W, M> CheckoutUseCase<P, U, O, S, En, T, C, W, M>
where
    P: ProductRepository + Send + Sync + 'static,
    U: UserRepository + Send + Sync + 'static,
    O: OrderRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    En: EnrollmentRepository + Send + Sync + 'static,
    T: ContactTagRepository + Send + Sync + 'static,
    C: PaymentGateway + 'static,
    W: PaymentGateway + 'static,
    M: MailerClient + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        product_repo: Arc<P>,
        user_repo: Arc<U>,
        order_repo: Arc<O>,
        subscription_repo: Arc<S>,
        contact_tag_repo: Arc<T>,
        price_resolver: Arc<PriceResolver<P>>,
        grantor: Arc<EntitlementGrantor<P, En, U>>,
        ledger: Arc<LedgerWriter<O>>,
        card: Arc<C>,
        wallet: Arc<W>,
        mailer: Arc<M>,
        auth_config: AuthConfig,
    ) -> Self {
        Self {
            product_repo,
            user_repo,
            order_repo,
            subscription_repo,
            contact_tag_repo,
            price_resolver,
            grantor,
            ledger,
            card,
            wallet,
            mailer,
            auth_config,
        }
    }

    fn gateway_for(&self, provider: PaymentProvider) -> &dyn PaymentGateway {
        match provider {
            PaymentProvider::Card => self.card.as_ref(),
            PaymentProvider::Wallet => self.wallet.as_ref(),
        }
    }

    pub async fn create_subscription(
        &self,
        req: CreateSubscriptionRequest,
    ) -> CheckoutResult<CreateSubscriptionResponse> {
        info!(product_id = %req.product_id, method = %req.payment_method, "checkout: creating subscription");

        let product = self
            .product_repo
            .find_active_by_id(req.product_id)
            .await?
            .ok_or(CheckoutError::ProductNotFound)?;
        if !ProductType::from_str(&product.product_type).is_recurring() {
            return Err(CheckoutError::NotRecurring);
        }

        let resolved = self
            .price_resolver
            .resolve(
                &product,
                req.country_code.as_deref(),
                req.requested_price().as_ref(),
                req.coupon_code.as_deref(),
            )
            .await?;
        let interval =
            BillingInterval::from_str(product.billing_interval.as_deref().unwrap_or("month"));

        // Card-provider coupons on recurring products live provider-side so
        // renewals re-apply them; the plan then carries the undiscounted
        // amount. Everything else bakes the discount into the plan amount.
        let register_discount =
            resolved.register_provider_discount && req.payment_method == PaymentProvider::Card;
        let plan_amount = if register_discount {
            resolved.amount_minor + resolved.discount_minor
        } else {
            resolved.amount_minor
        };

        let gateway = self.gateway_for(req.payment_method);
        let plan = gateway
            .create_recurring_plan(&PlanSpec {
                product_id: product.id,
                product_name: product.name.clone(),
                interval,
                amount_minor: plan_amount,
                currency: resolved.currency.clone(),
                trial_days: None,
            })
            .await
            .map_err(map_gateway)?;

        let (user, _, _) = self
            .provision_user(&req.email, &req.full_name, req.password.as_deref())
            .await?;
        let buyer = BuyerInfo {
            email: req.email.clone(),
            full_name: req.full_name.clone(),
            user_id: Some(user.id),
        };

        let handle = gateway
            .activate_recurring_plan(&plan, &buyer, req.payment_method_id.as_deref(), None)
            .await
            .map_err(map_gateway)?;

        if register_discount {
            best_effort(
                "register provider discount",
                gateway.apply_recurring_discount(
                    &handle.subscription_id,
                    &RecurringDiscount {
                        percent: None,
                        amount_minor: Some(resolved.discount_minor),
                        currency: resolved.currency.clone(),
                    },
                ),
            )
            .await;
        }

        let status = subscription_status_from_provider(handle.status);
        let subscription = self
            .subscription_repo
            .insert_or_update(InsertSubscriptionEntity {
                user_id: Some(user.id),
                email: req.email.clone(),
                full_name: req.full_name.clone(),
                product_id: product.id,
                provider: req.payment_method.as_str().to_string(),
                provider_subscription_id: handle.subscription_id.clone(),
                status: status.as_str().to_string(),
                amount_minor: resolved.amount_minor,
                currency: resolved.currency.clone(),
                interval: interval.as_str().to_string(),
                current_period_start: epoch_to_datetime(handle.period_start),
                current_period_end: epoch_to_datetime(handle.period_end),
                trial_end: epoch_to_datetime(handle.trial_end),
                coupon_code: resolved.coupon_code.clone(),
                discount_minor: resolved.discount_minor,
            })
            .await?;

        // Card subscriptions come back trialing/active synchronously; wallet
        // subscriptions stay pending until the buyer approves out-of-band.
        if matches!(status, SubscriptionStatus::Active | SubscriptionStatus::Trialing) {
            self.settle_initial_charge(&subscription.id, &product, &handle, &req.email, &req.full_name, user.id, &resolved.currency, resolved.amount_minor, resolved.coupon_code.as_deref(), resolved.discount_minor)
                .await;
            best_effort(
                "grant entitlements",
                self.grantor
                    .grant(user.id, &product, GrantSource::Subscription, subscription.id),
            )
            .await;
            self.run_post_purchase_hooks(user.id, &req.email, "subscriber", "subscription-welcome")
                .await;
        }

        Ok(CreateSubscriptionResponse {
            subscription_id: handle.subscription_id,
            client_secret: handle.client_secret,
            approve_url: handle.approve_url,
            status: status.as_str().to_string(),
            db_subscription_id: subscription.id,
        })
    }

    pub async fn create_free_trial_subscription(
        &self,
        req: CreateFreeTrialRequest,
    ) -> CheckoutResult<CreateFreeTrialResponse> {
        info!(product_id = %req.product_id, "checkout: creating free trial subscription");

        let product = self
            .product_repo
            .find_active_by_id(req.product_id)
            .await?
            .ok_or(CheckoutError::ProductNotFound)?;
        if !ProductType::from_str(&product.product_type).is_recurring() {
            return Err(CheckoutError::NotRecurring);
        }
        if !product.trial_enabled || product.trial_days <= 0 {
            return Err(CheckoutError::TrialNotEnabled);
        }

        let requested = match (req.amount, req.currency.as_ref()) {
            (Some(amount_minor), Some(currency)) => {
                Some(crate::domain::value_objects::pricing::RequestedPrice {
                    amount_minor,
                    currency: currency.clone(),
                })
            }
            _ => None,
        };
        let resolved = self
            .price_resolver
            .resolve(&product, None, requested.as_ref(), req.coupon_code.as_deref())
            .await?;
        let interval =
            BillingInterval::from_str(product.billing_interval.as_deref().unwrap_or("month"));

        // Free trials run on the card provider only.
        let plan = self
            .card
            .create_recurring_plan(&PlanSpec {
                product_id: product.id,
                product_name: product.name.clone(),
                interval,
                amount_minor: resolved.amount_minor,
                currency: resolved.currency.clone(),
                trial_days: Some(product.trial_days),
            })
            .await
            .map_err(map_gateway)?;

        let (user, _, _) = self
            .provision_user(&req.email, &req.full_name, req.password.as_deref())
            .await?;
        let buyer = BuyerInfo {
            email: req.email.clone(),
            full_name: req.full_name.clone(),
            user_id: Some(user.id),
        };

        let handle = self
            .card
            .activate_recurring_plan(
                &plan,
                &buyer,
                req.payment_method_id.as_deref(),
                Some(product.trial_days),
            )
            .await
            .map_err(map_gateway)?;

        let trial_end = epoch_to_datetime(handle.trial_end)
            .unwrap_or_else(|| Utc::now() + Duration::days(i64::from(product.trial_days)));

        let subscription = self
            .subscription_repo
            .insert_or_update(InsertSubscriptionEntity {
                user_id: Some(user.id),
                email: req.email.clone(),
                full_name: req.full_name.clone(),
                product_id: product.id,
                provider: PaymentProvider::Card.as_str().to_string(),
                provider_subscription_id: handle.subscription_id.clone(),
                status: SubscriptionStatus::Trialing.as_str().to_string(),
                amount_minor: resolved.amount_minor,
                currency: resolved.currency.clone(),
                interval: interval.as_str().to_string(),
                current_period_start: epoch_to_datetime(handle.period_start),
                current_period_end: epoch_to_datetime(handle.period_end),
                trial_end: Some(trial_end),
                coupon_code: resolved.coupon_code.clone(),
                discount_minor: resolved.discount_minor,
            })
            .await?;

        let course_ids = best_effort(
            "grant entitlements",
            self.grantor
                .grant(user.id, &product, GrantSource::Subscription, subscription.id),
        )
        .await
        .unwrap_or_default();
        self.run_post_purchase_hooks(user.id, &req.email, "free-trial", "trial-onboarding")
            .await;

        Ok(CreateFreeTrialResponse {
            success: true,
            subscription_id: handle.subscription_id,
            db_subscription_id: subscription.id,
            trial_end_date: trial_end,
            course_ids,
        })
    }

    /// Creates the provider-side charge for a one-or-more-product basket and
    /// writes pending ledger rows. Completion (below) or the provider
    /// webhook upgrades them.
    pub async fn create_one_time_payment(
        &self,
        req: CreateOneTimePaymentRequest,
    ) -> CheckoutResult<CreateOneTimePaymentResponse> {
        info!(products = req.product_ids.len(), method = %req.payment_method, "checkout: creating one-time payment");

        let mut lines = Vec::with_capacity(req.product_ids.len());
        let mut currency: Option<String> = None;
        let mut total_discount = 0;
        // Requested (pay-what-you-feel) prices only make sense for a
        // single-product basket.
        let requested = if req.product_ids.len() == 1 {
            req.requested_price()
        } else {
            None
        };

        for product_id in &req.product_ids {
            let product = self
                .product_repo
                .find_active_by_id(*product_id)
                .await?
                .ok_or(CheckoutError::ProductNotFound)?;
            let resolved = self
                .price_resolver
                .resolve(
                    &product,
                    req.country_code.as_deref(),
                    requested.as_ref(),
                    req.coupon_code.as_deref(),
                )
                .await?;
            match &currency {
                Some(existing) if *existing != resolved.currency => {
                    return Err(CheckoutError::MixedCurrencies);
                }
                Some(_) => {}
                None => currency = Some(resolved.currency.clone()),
            }
            total_discount += resolved.discount_minor;
            lines.push(ChargeLineItem {
                product_id: product.id,
                name: product.name,
                amount_minor: resolved.amount_minor,
            });
        }
        let currency = currency.ok_or(CheckoutError::ProductNotFound)?;
        let total: i64 = lines.iter().map(|line| line.amount_minor).sum();

        let user = self.user_repo.find_by_email(&req.email).await?;
        let buyer = BuyerInfo {
            email: req.email.clone(),
            full_name: req.full_name.clone(),
            user_id: user.as_ref().map(|u| u.id),
        };

        let gateway = self.gateway_for(req.payment_method);
        let handle = gateway
            .create_one_time_charge(total, &currency, &buyer, &lines)
            .await
            .map_err(map_gateway)?;

        self.ledger
            .record_basket(
                BasketCharge {
                    user_id: buyer.user_id,
                    email: &req.email,
                    full_name: &req.full_name,
                    currency: &currency,
                    provider: req.payment_method,
                    provider_payment_id: &handle.payment_id,
                    detail: None,
                    status: OrderStatus::Pending,
                    subscription_id: None,
                    coupon_code: req.coupon_code.as_deref(),
                    discount_minor: total_discount,
                },
                &lines,
            )
            .await?;

        Ok(CreateOneTimePaymentResponse {
            payment_id: handle.payment_id,
            client_secret: handle.client_secret,
            approve_url: handle.approve_url,
            amount: total,
            currency,
        })
    }

    /// Called by the storefront once the card provider confirms the payment
    /// intent. Upgrades the pending ledger rows, provisions the buyer's
    /// account and grants entitlements.
    pub async fn complete_one_time_payment(
        &self,
        req: CompleteOneTimePaymentRequest,
    ) -> CheckoutResult<CompleteOneTimePaymentResponse> {
        info!(payment_intent_id = %req.payment_intent_id, "checkout: completing one-time payment");

        let orders = self
            .order_rows_for_payment(&req.payment_intent_id)
            .await?;
        let first = orders
            .first()
            .ok_or_else(|| CheckoutError::OrderNotFound(req.payment_intent_id.clone()))?
            .clone();

        // The provider's transaction ledger can lag a confirmed payment, so
        // the fee lookup retries a few times and then gives up. A missing
        // fee is backfilled later by the sync poll.
        let detail = retry_with_delay(FEE_LOOKUP_RETRY, "fee lookup", || {
            self.card.fetch_transaction_detail(&req.payment_intent_id)
        })
        .await
        .ok()
        .flatten();

        let (user, is_new_user, generated_password) = self
            .provision_user(&first.email, &first.full_name, req.password.as_deref())
            .await?;

        let amounts: Vec<i64> = orders.iter().map(|o| o.amount_minor).collect();
        let fee_shares = match detail.as_ref().and_then(|d| d.fee_minor) {
            Some(total_fee) => allocate_proportionally(total_fee, &amounts)
                .into_iter()
                .map(Some)
                .collect(),
            None => vec![None; orders.len()],
        };

        let mut course_ids = Vec::new();
        for (order, fee_share) in orders.iter().zip(fee_shares) {
            let upgraded = self
                .ledger
                .record_order(InsertOrderEntity {
                    user_id: Some(user.id),
                    email: order.email.clone(),
                    full_name: order.full_name.clone(),
                    product_id: order.product_id,
                    amount_minor: order.amount_minor,
                    currency: order.currency.clone(),
                    provider: order.provider.clone(),
                    provider_payment_id: order.provider_payment_id.clone(),
                    provider_transaction_id: detail.as_ref().map(|d| d.transaction_id.clone()),
                    status: OrderStatus::Completed.as_str().to_string(),
                    coupon_code: order.coupon_code.clone(),
                    discount_minor: order.discount_minor,
                    fee_minor: fee_share,
                    net_minor: fee_share.map(|fee| order.amount_minor - fee),
                    subscription_id: order.subscription_id,
                    refund_minor: 0,
                })
                .await?;

            if let Some(product) = self.product_repo.find_active_by_id(order.product_id).await? {
                if let Some(granted) = best_effort(
                    "grant entitlements",
                    self.grantor
                        .grant(user.id, &product, GrantSource::Purchase, upgraded.id),
                )
                .await
                {
                    course_ids.extend(granted);
                }
            }
        }
        course_ids.sort();
        course_ids.dedup();

        self.run_post_purchase_hooks(user.id, &first.email, "customer", "purchase-followup")
            .await;

        Ok(CompleteOneTimePaymentResponse {
            success: true,
            user_id: user.id,
            course_ids,
            is_new_user,
            password: generated_password,
        })
    }

    /// Second leg of the wallet checkout: the buyer has approved at the
    /// provider, the storefront reports back, and we confirm provider-side
    /// before activating locally. Safe to call repeatedly.
    pub async fn activate_wallet_subscription(
        &self,
        req: ActivateWalletSubscriptionRequest,
    ) -> CheckoutResult<ActivateWalletSubscriptionResponse> {
        info!(subscription_id = %req.subscription_id, "checkout: activating wallet subscription");

        let subscription = match req.db_subscription_id {
            Some(id) => self.subscription_repo.find_by_id(id).await?,
            None => {
                self.subscription_repo
                    .find_by_provider_subscription_id(&req.subscription_id)
                    .await?
            }
        }
        .ok_or(CheckoutError::SubscriptionNotFound)?;

        // Repeat activation calls short-circuit once the row is active with
        // an owner attached; the initial order was already written.
        if SubscriptionStatus::from_str(&subscription.status) == SubscriptionStatus::Active {
            if let Some(user_id) = subscription.user_id {
                let auth_token = self.mint_buyer_token(user_id, &subscription.email);
                return Ok(ActivateWalletSubscriptionResponse {
                    success: true,
                    subscription_id: req.subscription_id,
                    user_id,
                    auth_token,
                });
            }
        }

        let handle = self
            .wallet
            .fetch_subscription(&req.subscription_id)
            .await
            .map_err(map_gateway)?;
        if !matches!(handle.status, ProviderStatus::Active | ProviderStatus::Trialing) {
            warn!(subscription_id = %req.subscription_id, ?handle.status, "checkout: wallet subscription not approved yet");
            return Err(CheckoutError::NotApproved);
        }

        let (user, _, _) = self
            .provision_user(&subscription.email, &subscription.full_name, None)
            .await?;

        self.subscription_repo
            .attach_user(subscription.id, user.id)
            .await?;
        self.subscription_repo
            .update_period_by_provider_subscription_id(
                &req.subscription_id,
                SubscriptionPeriodUpdate {
                    current_period_start: epoch_to_datetime(handle.period_start),
                    current_period_end: epoch_to_datetime(handle.period_end),
                    status: SubscriptionStatus::Active.as_str().to_string(),
                },
            )
            .await?;

        // Exactly one initial order: keyed on the provider payment id, so a
        // concurrent webhook or a retried activation converges on one row.
        let payment_id = handle
            .latest_payment_id
            .clone()
            .unwrap_or_else(|| req.subscription_id.clone());
        let detail = best_effort(
            "wallet fee lookup",
            self.wallet.fetch_transaction_detail(&payment_id),
        )
        .await
        .flatten();
        self.ledger
            .record_order(InsertOrderEntity {
                user_id: Some(user.id),
                email: subscription.email.clone(),
                full_name: subscription.full_name.clone(),
                product_id: subscription.product_id,
                amount_minor: subscription.amount_minor,
                currency: subscription.currency.clone(),
                provider: PaymentProvider::Wallet.as_str().to_string(),
                provider_payment_id: payment_id,
                provider_transaction_id: detail.as_ref().map(|d| d.transaction_id.clone()),
                status: OrderStatus::Completed.as_str().to_string(),
                coupon_code: subscription.coupon_code.clone(),
                discount_minor: subscription.discount_minor,
                fee_minor: detail.as_ref().and_then(|d| d.fee_minor),
                net_minor: detail
                    .as_ref()
                    .and_then(|d| d.fee_minor)
                    .map(|fee| subscription.amount_minor - fee),
                subscription_id: Some(subscription.id),
                refund_minor: 0,
            })
            .await?;

        if let Some(product) = self
            .product_repo
            .find_active_by_id(subscription.product_id)
            .await?
        {
            best_effort(
                "grant entitlements",
                self.grantor
                    .grant(user.id, &product, GrantSource::Subscription, subscription.id),
            )
            .await;
        }
        self.run_post_purchase_hooks(user.id, &subscription.email, "subscriber", "subscription-welcome")
            .await;

        let auth_token = self.mint_buyer_token(user.id, &subscription.email);
        Ok(ActivateWalletSubscriptionResponse {
            success: true,
            subscription_id: req.subscription_id,
            user_id: user.id,
            auth_token,
        })
    }

    async fn order_rows_for_payment(
        &self,
        payment_id: &str,
    ) -> CheckoutResult<Vec<crate::domain::entities::orders::OrderEntity>> {
        let orders = self
            .order_repo
            .find_by_provider_payment_id(PaymentProvider::Card.as_str(), payment_id)
            .await?;
        if orders.is_empty() {
            return Err(CheckoutError::OrderNotFound(payment_id.to_string()));
        }
        Ok(orders)
    }

    /// Upserts the buyer account by email. Returns the user, whether the row
    /// is new, and the generated password when the caller supplied none.
    async fn provision_user(
        &self,
        email: &str,
        full_name: &str,
        password: Option<&str>,
    ) -> CheckoutResult<(UserEntity, bool, Option<String>)> {
        if let Some(existing) = self.user_repo.find_by_email(email).await? {
            return Ok((existing, false, None));
        }

        let (plain, generated) = match password {
            Some(given) if !given.is_empty() => (given.to_string(), None),
            _ => {
                let generated = auth::generate_password();
                (generated.clone(), Some(generated))
            }
        };
        let password_hash = auth::hash_password(&plain)?;

        let user = self
            .user_repo
            .insert_user(InsertUserEntity {
                email: email.to_string(),
                full_name: full_name.to_string(),
                password_hash,
                is_premium: false,
            })
            .await?;
        info!(user_id = %user.id, "checkout: provisioned new account");
        Ok((user, true, generated))
    }

    #[allow(clippy::too_many_arguments)]
    async fn settle_initial_charge(
        &self,
        subscription_id: &Uuid,
        product: &ProductEntity,
        handle: &SubscriptionHandle,
        email: &str,
        full_name: &str,
        user_id: Uuid,
        currency: &str,
        amount_minor: i64,
        coupon_code: Option<&str>,
        discount_minor: i64,
    ) {
        let Some(payment_id) = handle.latest_payment_id.as_deref() else {
            return;
        };
        let detail = best_effort(
            "card fee lookup",
            self.card.fetch_transaction_detail(payment_id),
        )
        .await
        .flatten();

        best_effort(
            "record initial subscription order",
            self.ledger.record_order(InsertOrderEntity {
                user_id: Some(user_id),
                email: email.to_string(),
                full_name: full_name.to_string(),
                product_id: product.id,
                amount_minor,
                currency: currency.to_string(),
                provider: PaymentProvider::Card.as_str().to_string(),
                provider_payment_id: payment_id.to_string(),
                provider_transaction_id: detail.as_ref().map(|d| d.transaction_id.clone()),
                status: OrderStatus::Completed.as_str().to_string(),
                coupon_code: coupon_code.map(str::to_string),
                discount_minor,
                fee_minor: detail.as_ref().and_then(|d| d.fee_minor),
                net_minor: detail
                    .as_ref()
                    .and_then(|d| d.fee_minor)
                    .map(|fee| amount_minor - fee),
                subscription_id: Some(*subscription_id),
                refund_minor: 0,
            }),
        )
        .await;
    }

    async fn run_post_purchase_hooks(&self, user_id: Uuid, email: &str, tag: &str, sequence: &str) {
        best_effort(
            "crm tag",
            retry_with_delay(SIDE_EFFECT_RETRY, "crm tag", || {
                self.contact_tag_repo.upsert_tag(user_id, tag)
            }),
        )
        .await;
        best_effort(
            "mailer sequence enrollment",
            retry_with_delay(SIDE_EFFECT_RETRY, "mailer sequence enrollment", || {
                self.mailer.enroll_in_sequence(email, sequence)
            }),
        )
        .await;
    }

    fn mint_buyer_token(&self, user_id: Uuid, email: &str) -> Option<String> {
        match auth::mint_token(
            &self.auth_config.jwt_secret,
            self.auth_config.token_ttl_seconds,
            user_id,
            email,
            "user",
        ) {
            Ok(token) => Some(token),
            Err(err) => {
                warn!(error = %err, "checkout: failed to mint auth token");
                None
            }
        }
    }
}
