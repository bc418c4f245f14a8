pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod ports;
pub mod services;
pub mod startup;
pub mod utils;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::services::PaymentOrchestrator;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PaymentOrchestrator>,
    /// Present when the stores are Postgres-backed.
    pub db: Option<PgPool>,
    pub gateway_config: GatewayConfig,
    pub default_tenant_id: Option<Uuid>,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/webhook", post(handlers::webhook::receive))
        .route("/process-nonce", post(handlers::payments::process_nonce))
        .route("/form", get(handlers::form::form_descriptor))
        .route("/payments/search", get(handlers::payments::search_payments))
        .route("/payments/:payment_id", get(handlers::payments::get_payment))
        .route(
            "/payments/:payment_id/refresh",
            post(handlers::payments::refresh_payment),
        )
        .route(
            "/accounts/:account_id/payment-methods",
            get(handlers::payment_methods::list_payment_methods)
                .post(handlers::payment_methods::add_payment_method),
        )
        .route(
            "/accounts/:account_id/payment-methods/:payment_method_id",
            delete(handlers::payment_methods::delete_payment_method),
        )
        .route(
            "/accounts/:account_id/payment-methods/:payment_method_id/default",
            put(handlers::payment_methods::set_default_payment_method),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
