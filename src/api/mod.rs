//! HTTP surface: router assembly and shared handler state

pub mod health;
pub mod payments;
pub mod webhooks;

use crate::auth::JwtVerifier;
use crate::health::HealthChecker;
use crate::middleware::logging::{request_logging_middleware, UuidRequestId};
use crate::services::{PaymentOrchestrator, WebhookProcessor};
use axum::{
    extract::FromRef,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PaymentOrchestrator>,
    pub webhooks: Arc<WebhookProcessor>,
    pub jwt: JwtVerifier,
    pub health: HealthChecker,
    /// Ceiling applied to manual webhook retries
    pub max_webhook_retries: i32,
}

impl FromRef<AppState> for JwtVerifier {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/initialize", post(payments::initialize_payment))
        .route("/verify/{reference}", get(payments::verify_payment))
        .route("/webhook", post(webhooks::handle_webhook))
        .route("/charge-saved-card", post(payments::charge_saved_card))
        .route("/customer/payment-methods", get(payments::list_payment_methods))
        .route(
            "/customer/payment-methods/{method_id}/set-default",
            post(payments::set_default_payment_method),
        )
        .route("/banks", get(payments::list_banks))
        .route("/banks/resolve", get(payments::resolve_account))
        .route("/orders/{order_id}", get(payments::order_payments))
        .route("/webhooks/{log_id}/retry", post(webhooks::retry_webhook))
        .route("/{payment_id}", get(payments::get_payment))
        .route("/{payment_id}/refund", post(payments::refund_payment))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .route("/health/live", get(health::liveness))
        .nest("/api/v1/payments", payment_routes())
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}
