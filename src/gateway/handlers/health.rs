use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use super::super::state::AppState;
use super::super::types::{ApiResponse, error_codes};
use crate::providers::ProviderKind;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = 1703494800000_i64)]
    pub timestamp_ms: i64,
    /// Build revision
    #[schema(example = "a1b2c3d")]
    pub version: &'static str,
    /// Upstreams purchases can be routed to
    pub providers: Vec<ProviderKind>,
    /// PostgreSQL is wired and answered the ping
    pub database: bool,
}

/// Liveness plus a PostgreSQL ping
///
/// 503 with code 5001 when the database is wired but does not answer; the
/// reason only goes to the logs.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "Service healthy", body = HealthResponse, content_type = "application/json"),
        (status = 503, description = "PostgreSQL unreachable")
    ),
    tag = "System"
)]
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ApiResponse<HealthResponse>>) {
    let database = match &state.pg_db {
        None => false,
        Some(db) => {
            if let Err(e) = db.health_check().await {
                tracing::error!(error = %e, "[HEALTH] PostgreSQL ping failed");
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(ApiResponse {
                        code: error_codes::SERVICE_UNAVAILABLE,
                        msg: "database unavailable".to_string(),
                        data: None,
                    }),
                );
            }
            true
        }
    };

    let report = HealthResponse {
        timestamp_ms: Utc::now().timestamp_millis(),
        version: env!("GIT_HASH"),
        providers: state.coordinator.providers().kinds(),
        database,
    };
    (StatusCode::OK, Json(ApiResponse::success(report)))
}
