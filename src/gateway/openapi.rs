//! OpenAPI / Swagger UI Documentation
//!
//! - Swagger UI: `http://localhost:8080/docs`
//! - OpenAPI JSON: `http://localhost:8080/api-docs/openapi.json`

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::account::UserRole;
use crate::gateway::handlers::HealthResponse;
use crate::gateway::types::{
    AdminCreditRequest, CreateActivationRequest, CreateRentalRequest, CreditResponse,
    PurchaseView, WebhookAck,
};
use crate::ledger::{BalanceView, TransactionKind, TransactionRecord, TransactionStatus};
use crate::providers::{ProviderKind, SmsMessage};
use crate::purchase::PublicStatus;
use crate::reconcile::{Drift, ReconcileReport};

/// HS256 bearer token issued by the account service
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            let scheme = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .bearer_format("JWT")
                .description(Some("Claims: sub = user UUID, role = user | admin, exp"))
                .build();
            components.add_security_scheme("bearer_auth", SecurityScheme::Http(scheme));
        }
    }
}

/// Main API Documentation struct
#[derive(OpenApi)]
#[openapi(
    info(
        title = "SMS Ledger API",
        version = "1.0.0",
        description = "Prepaid balance for virtual phone numbers: activations, rentals, deposits and reconciliation.",
        license(
            name = "MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Development"),
    ),
    paths(
        crate::gateway::handlers::health_check,
        crate::gateway::handlers::get_balance,
        crate::gateway::handlers::get_transactions,
        crate::gateway::handlers::create_activation,
        crate::gateway::handlers::list_activations,
        crate::gateway::handlers::get_activation,
        crate::gateway::handlers::cancel_activation,
        crate::gateway::handlers::create_rental,
        crate::gateway::handlers::get_rental,
        crate::gateway::handlers::get_rental_messages,
        crate::gateway::handlers::cancel_rental,
        crate::gateway::handlers::moneyfusion_webhook,
        crate::gateway::handlers::paydunya_webhook,
        crate::gateway::handlers::wave_webhook,
        crate::gateway::handlers::admin_credit,
        crate::gateway::handlers::reconcile_report,
        crate::gateway::handlers::reconcile_apply,
        crate::gateway::handlers::admin_refund,
    ),
    components(
        schemas(
            HealthResponse,
            BalanceView,
            TransactionRecord,
            TransactionKind,
            TransactionStatus,
            CreateActivationRequest,
            CreateRentalRequest,
            PurchaseView,
            PublicStatus,
            ProviderKind,
            SmsMessage,
            WebhookAck,
            AdminCreditRequest,
            CreditResponse,
            ReconcileReport,
            Drift,
            UserRole,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "System", description = "Health checks and build info"),
        (name = "Account", description = "Balance and transaction history (auth required)"),
        (name = "Activations", description = "Single-use numbers (auth required)"),
        (name = "Rentals", description = "Leased numbers with an inbox (auth required)"),
        (name = "Webhooks", description = "Payment gateway notifications (signed, no JWT)"),
        (name = "Admin", description = "Credits, refunds and reconciliation (admin role)")
    )
)]
pub struct ApiDoc;
