use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};

use crate::config::config_model::DotEnvyConfig;
use crate::domain::repositories::contact_tags::ContactTagRepository;
use crate::domain::repositories::enrollments::EnrollmentRepository;
use crate::domain::repositories::orders::OrderRepository;
use crate::domain::repositories::products::ProductRepository;
use crate::domain::repositories::subscriptions::SubscriptionRepository;
use crate::domain::repositories::users::UserRepository;
use crate::domain::value_objects::checkout::{
    ActivateWalletSubscriptionRequest, CompleteOneTimePaymentRequest, CreateFreeTrialRequest,
    CreateOneTimePaymentRequest, CreateSubscriptionRequest,
};
use crate::infrastructure::axum_http::error_responses;
use crate::infrastructure::mailer::{HttpMailer, MailerClient};
use crate::infrastructure::postgres::{
    postgres_connection::PgPoolSquad,
    repositories::{
        contact_tags::ContactTagPostgres, enrollments::EnrollmentPostgres, orders::OrderPostgres,
        products::ProductPostgres, subscriptions::SubscriptionPostgres, users::UserPostgres,
    },
};
use crate::payments::paypal_client::PaypalClient;
use crate::payments::provider::PaymentGateway;
use crate::payments::stripe_client::StripeClient;
use crate::usecases::checkout::CheckoutUseCase;
use crate::usecases::entitlements::EntitlementGrantor;
use crate::usecases::ledger::LedgerWriter;
use crate::usecases::pricing::PriceResolver;

pub fn routes(db_pool: Arc<PgPoolSquad>, config: Arc<DotEnvyConfig>) -> Router {
    let product_repo = Arc::new(ProductPostgres::new(Arc::clone(&db_pool)));
    let user_repo = Arc::new(UserPostgres::new(Arc::clone(&db_pool)));
    let order_repo = Arc::new(OrderPostgres::new(Arc::clone(&db_pool)));
    let subscription_repo = Arc::new(SubscriptionPostgres::new(Arc::clone(&db_pool)));
    let contact_tag_repo = Arc::new(ContactTagPostgres::new(Arc::clone(&db_pool)));
    let enrollment_repo = Arc::new(EnrollmentPostgres::new(Arc::clone(&db_pool)));

    let price_resolver = Arc::new(PriceResolver::new(Arc::clone(&product_repo)));
    let grantor = Arc::new(EntitlementGrantor::new(
        Arc::clone(&product_repo),
        enrollment_repo,
        Arc::clone(&user_repo),
    ));
    let ledger = Arc::new(LedgerWriter::new(Arc::clone(&order_repo)));

    let card = Arc::new(StripeClient::new(
        config.stripe.secret_key.clone(),
        config.stripe.webhook_secret.clone(),
    ));
    let wallet = Arc::new(PaypalClient::new(
        config.paypal.client_id.clone(),
        config.paypal.client_secret.clone(),
        config.paypal.webhook_id.clone(),
        config.paypal.api_base.clone(),
    ));
    let mailer = Arc::new(HttpMailer::new(config.mailer.clone()));

    let checkout_usecase = CheckoutUseCase::new(
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
        config.auth.clone(),
    );

    Router::new()
        .route("/create-subscription", post(create_subscription))
        .route(
            "/create-free-trial-subscription",
            post(create_free_trial_subscription),
        )
        .route("/create-one-time-payment", post(create_one_time_payment))
        .route(
            "/complete-one-time-payment",
            post(complete_one_time_payment),
        )
        .route(
            "/activate-wallet-subscription",
            post(activate_wallet_subscription),
        )
        .with_state(Arc::new(checkout_usecase))
}

pub async fn create_subscription<P, U, O, S, En, T, C, W, M>(
    State(checkout_usecase): State<Arc<CheckoutUseCase<P, U, O, S, En, T, C, W, M>>>,
    Json(req): Json<CreateSubscriptionRequest>,
) -> impl IntoResponse
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
    match checkout_usecase.create_subscription(req).await {
        Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
        Err(err) => error_responses::respond(err.status_code(), err.to_string()),
    }
}

pub async fn create_free_trial_subscription<P, U, O, S, En, T, C, W, M>(
    State(checkout_usecase): State<Arc<CheckoutUseCase<P, U, O, S, En, T, C, W, M>>>,
    Json(req): Json<CreateFreeTrialRequest>,
) -> impl IntoResponse
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
    match checkout_usecase.create_free_trial_subscription(req).await {
        Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
        Err(err) => error_responses::respond(err.status_code(), err.to_string()),
    }
}

pub async fn create_one_time_payment<P, U, O, S, En, T, C, W, M>(
    State(checkout_usecase): State<Arc<CheckoutUseCase<P, U, O, S, En, T, C, W, M>>>,
    Json(req): Json<CreateOneTimePaymentRequest>,
) -> impl IntoResponse
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
    match checkout_usecase.create_one_time_payment(req).await {
        Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
        Err(err) => error_responses::respond(err.status_code(), err.to_string()),
    }
}

pub async fn complete_one_time_payment<P, U, O, S, En, T, C, W, M>(
    State(checkout_usecase): State<Arc<CheckoutUseCase<P, U, O, S, En, T, C, W, M>>>,
    Json(req): Json<CompleteOneTimePaymentRequest>,
) -> impl IntoResponse
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
    match checkout_usecase.complete_one_time_payment(req).await {
        Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
        Err(err) => error_responses::respond(err.status_code(), err.to_string()),
    }
}

pub async fn activate_wallet_subscription<P, U, O, S, En, T, C, W, M>(
    State(checkout_usecase): State<Arc<CheckoutUseCase<P, U, O, S, En, T, C, W, M>>>,
    Json(req): Json<ActivateWalletSubscriptionRequest>,
) -> impl IntoResponse
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
    match checkout_usecase.activate_wallet_subscription(req).await {
        Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
        Err(err) => error_responses::respond(err.status_code(), err.to_string()),
    }
}
