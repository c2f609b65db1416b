use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use tracing::info;

use crate::auth::AdminUser;
use crate::config::config_model::DotEnvyConfig;
use crate::domain::repositories::orders::OrderRepository;
use crate::domain::repositories::products::ProductRepository;
use crate::domain::repositories::subscriptions::SubscriptionRepository;
use crate::domain::value_objects::checkout::ManageSubscriptionRequest;
use crate::infrastructure::axum_http::error_responses;
use crate::infrastructure::postgres::{
    postgres_connection::PgPoolSquad,
    repositories::{
        orders::OrderPostgres, products::ProductPostgres, subscriptions::SubscriptionPostgres,
    },
};
use crate::payments::paypal_client::PaypalClient;
use crate::payments::provider::PaymentGateway;
use crate::payments::stripe_client::StripeClient;
use crate::usecases::manage_subscription::ManageSubscriptionUseCase;

pub fn routes(db_pool: Arc<PgPoolSquad>, config: Arc<DotEnvyConfig>) -> Router {
    let subscription_repo = Arc::new(SubscriptionPostgres::new(Arc::clone(&db_pool)));
    let order_repo = Arc::new(OrderPostgres::new(Arc::clone(&db_pool)));
    let product_repo = Arc::new(ProductPostgres::new(Arc::clone(&db_pool)));
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

    let manage_usecase = ManageSubscriptionUseCase::new(
        subscription_repo,
        order_repo,
        product_repo,
        card,
        wallet,
    );

    Router::new()
        .route("/manage", post(manage_subscription))
        .with_state(Arc::new(manage_usecase))
}

pub async fn manage_subscription<S, O, P, C, W>(
    State(manage_usecase): State<Arc<ManageSubscriptionUseCase<S, O, P, C, W>>>,
    admin: AdminUser,
    Json(req): Json<ManageSubscriptionRequest>,
) -> impl IntoResponse
where
    S: SubscriptionRepository + Send + Sync + 'static,
    O: OrderRepository + Send + Sync + 'static,
    P: ProductRepository + Send + Sync + 'static,
    C: PaymentGateway + 'static,
    W: PaymentGateway + 'static,
{
    info!(
        admin = %admin.0.user_id,
        subscription_id = %req.subscription_id,
        action = ?req.action,
        "subscriptions router: manage action requested"
    );
    match manage_usecase.handle(req).await {
        Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
        Err(err) => error_responses::respond(err.status_code(), err.to_string()),
    }
}
