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
use crate::domain::repositories::enrollments::EnrollmentRepository;
use crate::domain::repositories::orders::OrderRepository;
use crate::domain::repositories::products::ProductRepository;
use crate::domain::repositories::subscriptions::SubscriptionRepository;
use crate::domain::repositories::users::UserRepository;
use crate::domain::value_objects::checkout::ProcessRefundRequest;
use crate::infrastructure::axum_http::error_responses;
use crate::infrastructure::postgres::{
    postgres_connection::PgPoolSquad,
    repositories::{
        enrollments::EnrollmentPostgres, orders::OrderPostgres, products::ProductPostgres,
        subscriptions::SubscriptionPostgres, users::UserPostgres,
    },
};
use crate::payments::paypal_client::PaypalClient;
use crate::payments::provider::PaymentGateway;
use crate::payments::stripe_client::StripeClient;
use crate::usecases::entitlements::EntitlementGrantor;
use crate::usecases::ledger::LedgerWriter;
use crate::usecases::refunds::RefundUseCase;

pub fn routes(db_pool: Arc<PgPoolSquad>, config: Arc<DotEnvyConfig>) -> Router {
    let order_repo = Arc::new(OrderPostgres::new(Arc::clone(&db_pool)));
    let subscription_repo = Arc::new(SubscriptionPostgres::new(Arc::clone(&db_pool)));
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

    let refund_usecase = RefundUseCase::new(
        order_repo,
        subscription_repo,
        product_repo,
        ledger,
        grantor,
        card,
        wallet,
    );

    Router::new()
        .route("/process", post(process_refund))
        .with_state(Arc::new(refund_usecase))
}

pub async fn process_refund<O, S, P, En, U, C, W>(
    State(refund_usecase): State<Arc<RefundUseCase<O, S, P, En, U, C, W>>>,
    admin: AdminUser,
    Json(req): Json<ProcessRefundRequest>,
) -> impl IntoResponse
where
    O: OrderRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: ProductRepository + Send + Sync + 'static,
    En: EnrollmentRepository + Send + Sync + 'static,
    U: UserRepository + Send + Sync + 'static,
    C: PaymentGateway + 'static,
    W: PaymentGateway + 'static,
{
    info!(
        admin = %admin.0.user_id,
        order_id = %req.order_id,
        amount = ?req.amount,
        "refunds router: refund requested"
    );
    match refund_usecase.process_refund(req).await {
        Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
        Err(err) => error_responses::respond(err.status_code(), err.to_string()),
    }
}
