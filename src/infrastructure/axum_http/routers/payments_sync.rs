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
use crate::domain::repositories::subscriptions::SubscriptionRepository;
use crate::infrastructure::axum_http::error_responses;
use crate::infrastructure::postgres::{
    postgres_connection::PgPoolSquad,
    repositories::{orders::OrderPostgres, subscriptions::SubscriptionPostgres},
};
use crate::payments::paypal_client::PaypalClient;
use crate::payments::provider::PaymentGateway;
use crate::payments::stripe_client::StripeClient;
use crate::usecases::ledger::LedgerWriter;
use crate::usecases::sync::SyncUseCase;

pub fn routes(db_pool: Arc<PgPoolSquad>, config: Arc<DotEnvyConfig>) -> Router {
    let subscription_repo = Arc::new(SubscriptionPostgres::new(Arc::clone(&db_pool)));
    let order_repo = Arc::new(OrderPostgres::new(Arc::clone(&db_pool)));
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

    let sync_usecase = SyncUseCase::new(subscription_repo, order_repo, ledger, card, wallet);

    Router::new()
        .route("/run", post(run_sync))
        .with_state(Arc::new(sync_usecase))
}

pub async fn run_sync<S, O, C, W>(
    State(sync_usecase): State<Arc<SyncUseCase<S, O, C, W>>>,
    admin: AdminUser,
) -> impl IntoResponse
where
    S: SubscriptionRepository + Send + Sync + 'static,
    O: OrderRepository + Send + Sync + 'static,
    C: PaymentGateway + 'static,
    W: PaymentGateway + 'static,
{
    info!(admin = %admin.0.user_id, "payments sync router: sweep requested");
    match sync_usecase.run().await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(err) => error_responses::respond(
            StatusCode::INTERNAL_SERVER_ERROR,
            err.to_string(),
        ),
    }
}
