use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
};

use crate::config::config_model::DotEnvyConfig;
use crate::domain::repositories::enrollments::EnrollmentRepository;
use crate::domain::repositories::orders::OrderRepository;
use crate::domain::repositories::products::ProductRepository;
use crate::domain::repositories::subscriptions::SubscriptionRepository;
use crate::domain::repositories::users::UserRepository;
use crate::domain::repositories::webhook_events::WebhookEventRepository;
use crate::domain::value_objects::enums::payment_providers::PaymentProvider;
use crate::infrastructure::axum_http::error_responses;
use crate::infrastructure::postgres::{
    postgres_connection::PgPoolSquad,
    repositories::{
        enrollments::EnrollmentPostgres, orders::OrderPostgres, products::ProductPostgres,
        subscriptions::SubscriptionPostgres, users::UserPostgres,
        webhook_events::WebhookEventPostgres,
    },
};
use crate::payments::paypal_client::PaypalClient;
use crate::payments::provider::{PaymentGateway, WebhookSignature};
use crate::payments::stripe_client::StripeClient;
use crate::usecases::entitlements::EntitlementGrantor;
use crate::usecases::ledger::LedgerWriter;
use crate::usecases::webhooks::WebhookUseCase;

pub fn routes(db_pool: Arc<PgPoolSquad>, config: Arc<DotEnvyConfig>) -> Router {
    let webhook_repo = Arc::new(WebhookEventPostgres::new(Arc::clone(&db_pool)));
    let subscription_repo = Arc::new(SubscriptionPostgres::new(Arc::clone(&db_pool)));
    let order_repo = Arc::new(OrderPostgres::new(Arc::clone(&db_pool)));
    let product_repo = Arc::new(ProductPostgres::new(Arc::clone(&db_pool)));
    let enrollment_repo = Arc::new(EnrollmentPostgres::new(Arc::clone(&db_pool)));
    let user_repo = Arc::new(UserPostgres::new(Arc::clone(&db_pool)));

    let ledger = Arc::new(LedgerWriter::new(Arc::clone(&order_repo)));
    let grantor = Arc::new(EntitlementGrantor::new(
        Arc::clone(&product_repo),
        enrollment_repo,
        user_repo,
    ));
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

    let webhook_usecase = WebhookUseCase::new(
        webhook_repo,
        subscription_repo,
        order_repo,
        product_repo,
        ledger,
        grantor,
        card,
        wallet,
    );

    Router::new()
        .route("/stripe", post(stripe_webhook))
        .route("/paypal", post(paypal_webhook))
        .with_state(Arc::new(webhook_usecase))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

pub async fn stripe_webhook<Wh, S, O, P, En, U, C, W>(
    State(webhook_usecase): State<Arc<WebhookUseCase<Wh, S, O, P, En, U, C, W>>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse
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
    let Some(signature_header) = header_value(&headers, "stripe-signature") else {
        return error_responses::respond(
            StatusCode::BAD_REQUEST,
            "missing stripe-signature header".to_string(),
        );
    };
    let signature = WebhookSignature::Card { signature_header };

    match webhook_usecase
        .process(PaymentProvider::Card, &body, &signature)
        .await
    {
        Ok(()) => (StatusCode::OK, "OK").into_response(),
        Err(err) => error_responses::respond(err.status_code(), err.to_string()),
    }
}

pub async fn paypal_webhook<Wh, S, O, P, En, U, C, W>(
    State(webhook_usecase): State<Arc<WebhookUseCase<Wh, S, O, P, En, U, C, W>>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse
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
    let required = [
        "paypal-transmission-id",
        "paypal-transmission-time",
        "paypal-transmission-sig",
        "paypal-cert-url",
        "paypal-auth-algo",
    ];
    let mut values = Vec::with_capacity(required.len());
    for name in required {
        match header_value(&headers, name) {
            Some(value) => values.push(value),
            None => {
                return error_responses::respond(
                    StatusCode::BAD_REQUEST,
                    format!("missing {name} header"),
                );
            }
        }
    }
    let mut values = values.into_iter();
    let signature = WebhookSignature::Wallet {
        transmission_id: values.next().unwrap_or_default(),
        transmission_time: values.next().unwrap_or_default(),
        transmission_sig: values.next().unwrap_or_default(),
        cert_url: values.next().unwrap_or_default(),
        auth_algo: values.next().unwrap_or_default(),
    };

    match webhook_usecase
        .process(PaymentProvider::Wallet, &body, &signature)
        .await
    {
        Ok(()) => (StatusCode::OK, "OK").into_response(),
        Err(err) => error_responses::respond(err.status_code(), err.to_string()),
    }
}
