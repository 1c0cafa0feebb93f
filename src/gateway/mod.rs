//! HTTP Gateway
//!
//! axum router over the purchase coordinator, the ledger and the payment
//! service. User routes need a bearer JWT, admin routes additionally the
//! `admin` role, webhooks are verified per gateway instead.

pub mod auth;
pub mod handlers;
pub mod openapi;
pub mod state;
pub mod types;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{GatewayConfig, WorkersConfig};
use crate::worker::{ReconcileWorker, RecoveryWorker, StatusPoller};

pub use state::AppState;

/// Full application router
pub fn build_router(state: Arc<AppState>) -> Router {
    let account_routes = Router::new()
        .route("/balance", get(handlers::get_balance))
        .route("/transactions", get(handlers::get_transactions));

    let activation_routes = Router::new()
        .route(
            "/",
            post(handlers::create_activation).get(handlers::list_activations),
        )
        .route("/{id}", get(handlers::get_activation))
        .route("/{id}/cancel", post(handlers::cancel_activation));

    let rental_routes = Router::new()
        .route("/", post(handlers::create_rental))
        .route("/{id}", get(handlers::get_rental))
        .route("/{id}/messages", get(handlers::get_rental_messages))
        .route("/{id}/cancel", post(handlers::cancel_rental));

    // ==========================================================================
    // User Routes - Protected by JWT
    // ==========================================================================
    let user_routes = Router::new()
        .nest("/account", account_routes)
        .nest("/activations", activation_routes)
        .nest("/rentals", rental_routes)
        .layer(from_fn_with_state(state.clone(), auth::jwt_auth_middleware));

    // ==========================================================================
    // Admin Routes - JWT with role `admin`
    // ==========================================================================
    let admin_routes = Router::new()
        .route("/credit", post(handlers::admin_credit))
        .route(
            "/reconcile",
            get(handlers::reconcile_report).post(handlers::reconcile_apply),
        )
        .route("/purchases/{id}/refund", post(handlers::admin_refund))
        .layer(from_fn(auth::require_admin))
        .layer(from_fn_with_state(state.clone(), auth::jwt_auth_middleware));

    // ==========================================================================
    // Webhooks - verified by signature, no JWT
    // ==========================================================================
    let webhook_routes = Router::new()
        .route("/moneyfusion", post(handlers::moneyfusion_webhook))
        .route("/paydunya", post(handlers::paydunya_webhook))
        .route("/wave", post(handlers::wave_webhook));

    Router::new()
        .route("/api/v1/health", get(handlers::health_check))
        .nest("/api/v1", user_routes)
        .nest("/api/v1/admin", admin_routes)
        .nest("/api/v1/webhooks", webhook_routes)
        .with_state(state)
        // OpenAPI / Swagger UI (stateless, added after with_state)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
}

/// Start the background workers on the current runtime
pub fn spawn_workers(state: &AppState, config: &WorkersConfig) {
    if !config.enabled {
        tracing::warn!("Background workers disabled");
        return;
    }

    let poller = StatusPoller::new(state.coordinator.clone(), config);
    tokio::spawn(async move {
        poller.run().await;
    });

    let recovery = RecoveryWorker::new(state.coordinator.clone(), config);
    tokio::spawn(async move {
        recovery.run().await;
    });

    match &state.reconciler {
        Some(reconciler) => {
            let worker = ReconcileWorker::new(reconciler.clone(), config);
            tokio::spawn(async move {
                worker.run().await;
            });
        }
        None => tracing::warn!("Reconcile worker disabled (PostgreSQL required)"),
    }
}

/// Serve until the listener fails
pub async fn run_server(config: &GatewayConfig, state: Arc<AppState>) -> std::io::Result<()> {
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        tracing::error!(
            addr = %addr,
            error = %e,
            "Failed to bind; port {} may already be in use",
            config.port
        );
        e
    })?;

    tracing::info!(addr = %addr, "Gateway listening");
    tracing::info!("API Docs: http://{}/docs", addr);

    axum::serve(listener, app).await
}
