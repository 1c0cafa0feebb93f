//! HTTP handlers
//!
//! Every handler answers with the [`ApiResponse`](super::types::ApiResponse)
//! envelope. Authenticated handlers read the caller from the
//! [`AuthUser`](super::auth::AuthUser) extension set by the JWT middleware.

pub mod account;
pub mod activation;
pub mod admin;
pub mod health;
pub mod helpers;
pub mod rental;
pub mod webhook;

pub use account::{get_balance, get_transactions};
pub use activation::{cancel_activation, create_activation, get_activation, list_activations};
pub use admin::{admin_credit, admin_refund, reconcile_apply, reconcile_report};
pub use health::{HealthResponse, health_check};
pub use rental::{cancel_rental, create_rental, get_rental, get_rental_messages};
pub use webhook::{moneyfusion_webhook, paydunya_webhook, wave_webhook};

// Re-export for OpenAPI path registration
pub use account::{__path_get_balance, __path_get_transactions};
pub use activation::{
    __path_cancel_activation, __path_create_activation, __path_get_activation,
    __path_list_activations,
};
pub use admin::{
    __path_admin_credit, __path_admin_refund, __path_reconcile_apply, __path_reconcile_report,
};
pub use health::__path_health_check;
pub use rental::{
    __path_cancel_rental, __path_create_rental, __path_get_rental, __path_get_rental_messages,
};
pub use webhook::{__path_moneyfusion_webhook, __path_paydunya_webhook, __path_wave_webhook};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::UserRole;
    use crate::config::{LedgerConfig, PricingConfig};
    use crate::gateway::auth::{AuthUser, TokenVerifier};
    use crate::gateway::state::AppState;
    use crate::gateway::types::{
        AdminCreditRequest, ApiError, CreateActivationRequest, CreateRentalRequest, ListQuery,
        error_codes,
    };
    use crate::ledger::memory::MemoryLedger;
    use crate::payments::{AccountDirectory, PaymentError, PaymentService};
    use crate::providers::mock::MockProvider;
    use crate::providers::{ActivationStatus, ProviderError, ProviderKind, ProviderRegistry};
    use crate::purchase::memory::MemoryPurchaseStore;
    use crate::purchase::{
        CoordinatorSettings, PriceBook, PublicStatus, PurchaseCoordinator, PurchaseState,
    };
    use async_trait::async_trait;
    use axum::{
        Extension, Json,
        body::Bytes,
        extract::{Path, Query, State},
        http::{HeaderMap, StatusCode},
    };
    use rust_decimal::Decimal;
    use std::sync::Arc;
    use uuid::Uuid;

    struct NoReferrals;

    #[async_trait]
    impl AccountDirectory for NoReferrals {
        async fn referrer_of(&self, _user_id: Uuid) -> Result<Option<Uuid>, PaymentError> {
            Ok(None)
        }

        async fn completed_deposit_count(&self, _user_id: Uuid) -> Result<i64, PaymentError> {
            Ok(1)
        }
    }

    struct TestApp {
        state: Arc<AppState>,
        ledger: Arc<MemoryLedger>,
        provider: Arc<MockProvider>,
        user: AuthUser,
    }

    fn app() -> TestApp {
        let user_id = Uuid::new_v4();
        let ledger = Arc::new(MemoryLedger::new().with_user(user_id, Decimal::TEN));
        let provider = Arc::new(MockProvider::new(ProviderKind::FiveSim));
        let mut providers = ProviderRegistry::new();
        providers.register(provider.clone());

        let coordinator = Arc::new(PurchaseCoordinator::new(
            Arc::new(MemoryPurchaseStore::new()),
            ledger.clone(),
            providers,
            PriceBook::new(&PricingConfig::default(), &LedgerConfig::default()),
            CoordinatorSettings::default(),
        ));
        let payments = Arc::new(PaymentService::new(
            ledger.clone(),
            Arc::new(NoReferrals),
            Decimal::ZERO,
            2,
        ));
        let state = AppState::new(
            coordinator,
            ledger.clone(),
            payments,
            Arc::new(TokenVerifier::new("test-secret")),
            2,
        );

        TestApp {
            state: Arc::new(state),
            ledger,
            provider,
            user: AuthUser {
                user_id,
                role: UserRole::User,
            },
        }
    }

    fn activation_request(max_price: Option<&str>) -> CreateActivationRequest {
        CreateActivationRequest {
            provider: ProviderKind::FiveSim,
            service: "wa".into(),
            country: "russia".into(),
            max_price: max_price.map(str::to_string),
            cid: None,
        }
    }

    fn data<T>(result: crate::gateway::types::ApiResult<T>) -> T {
        let (status, Json(body)) = result.unwrap_or_else(|e| panic!("handler failed: {:?}", e));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.code, error_codes::SUCCESS);
        body.data.unwrap()
    }

    fn error<T: std::fmt::Debug>(result: crate::gateway::types::ApiResult<T>) -> ApiError {
        result.expect_err("handler should fail")
    }

    #[tokio::test]
    async fn test_health_without_database() {
        let t = app();
        let (status, Json(body)) = health_check(State(t.state.clone())).await;
        assert_eq!(status, StatusCode::OK);
        let health = body.data.unwrap();
        assert!(!health.database);
        assert_eq!(health.providers, vec![ProviderKind::FiveSim]);
    }

    #[tokio::test]
    async fn test_buy_and_read_activation() {
        let t = app();
        let view = data(
            create_activation(
                State(t.state.clone()),
                Extension(t.user),
                Json(activation_request(None)),
            )
            .await,
        );
        assert_eq!(view.status, PublicStatus::Active);
        assert!(view.phone.is_some());

        let balance = data(get_balance(State(t.state.clone()), Extension(t.user)).await);
        assert_eq!(balance.frozen, view.price);
        assert_eq!(balance.available, Decimal::TEN - view.price);

        // Reading an ACTIVE activation polls the provider
        t.provider.push_status(Ok(ActivationStatus::Received {
            code: "123456".into(),
            text: None,
        }));
        let fresh = data(
            get_activation(State(t.state.clone()), Extension(t.user), Path(view.id.clone())).await,
        );
        assert_eq!(fresh.status, PublicStatus::Received);
        assert_eq!(fresh.sms_code.as_deref(), Some("123456"));
        assert_eq!(t.ledger.balance_of(t.user.user_id).balance(), Decimal::TEN - view.price);

        let list = data(
            list_activations(
                State(t.state.clone()),
                Extension(t.user),
                Query(ListQuery { limit: None }),
            )
            .await,
        );
        assert_eq!(list.len(), 1);
    }

    #[tokio::test]
    async fn test_max_price_rejected() {
        let t = app();
        let err = error(
            create_activation(
                State(t.state.clone()),
                Extension(t.user),
                Json(activation_request(Some("0.10"))),
            )
            .await,
        );
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(t.provider.buy_count(), 0);
    }

    #[tokio::test]
    async fn test_no_numbers_maps_to_422() {
        let t = app();
        t.provider.set_buy_error(ProviderError::NoNumbers);
        let err = error(
            create_activation(
                State(t.state.clone()),
                Extension(t.user),
                Json(activation_request(None)),
            )
            .await,
        );
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code, error_codes::NO_NUMBERS);
        assert_eq!(t.ledger.balance_of(t.user.user_id).frozen(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_cancel_activation_releases_hold() {
        let t = app();
        let view = data(
            create_activation(
                State(t.state.clone()),
                Extension(t.user),
                Json(activation_request(None)),
            )
            .await,
        );

        let stranger = AuthUser {
            user_id: Uuid::new_v4(),
            role: UserRole::User,
        };
        let err = error(
            cancel_activation(State(t.state.clone()), Extension(stranger), Path(view.id.clone()))
                .await,
        );
        assert_eq!(err.status, StatusCode::FORBIDDEN);

        let cancelled = data(
            cancel_activation(State(t.state.clone()), Extension(t.user), Path(view.id)).await,
        );
        assert_eq!(cancelled.status, PublicStatus::Cancelled);
        assert_eq!(t.ledger.balance_of(t.user.user_id).frozen(), Decimal::ZERO);
        assert_eq!(t.ledger.balance_of(t.user.user_id).balance(), Decimal::TEN);
    }

    #[tokio::test]
    async fn test_rental_routes_reject_activation_ids() {
        let t = app();
        let view = data(
            create_activation(
                State(t.state.clone()),
                Extension(t.user),
                Json(activation_request(None)),
            )
            .await,
        );
        let err = error(get_rental(State(t.state.clone()), Extension(t.user), Path(view.id)).await);
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let err = error(
            get_activation(State(t.state.clone()), Extension(t.user), Path("nope".into())).await,
        );
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_rental_inbox() {
        let t = app();
        let view = data(
            create_rental(
                State(t.state.clone()),
                Extension(t.user),
                Json(CreateRentalRequest {
                    provider: ProviderKind::FiveSim,
                    service: "tg".into(),
                    country: "russia".into(),
                    hours: 4,
                    max_price: None,
                    cid: Some("rent-1".into()),
                }),
            )
            .await,
        );
        assert_eq!(view.rent_hours, Some(4));

        t.provider.push_message("Your code is 4242");
        let messages = data(
            get_rental_messages(State(t.state.clone()), Extension(t.user), Path(view.id)).await,
        );
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].code.as_deref(), Some("4242"));
    }

    #[tokio::test]
    async fn test_admin_credit_idempotent() {
        let t = app();
        let admin = AuthUser {
            user_id: Uuid::new_v4(),
            role: UserRole::Admin,
        };
        let request = || AdminCreditRequest {
            user_id: t.user.user_id,
            amount: "5.50".into(),
            reference: "ticket-77".into(),
            description: None,
        };

        let first = data(admin_credit(State(t.state.clone()), Extension(admin), Json(request())).await);
        assert!(!first.replayed);
        assert_eq!(first.balance, Decimal::new(1550, 2));

        let again = data(admin_credit(State(t.state.clone()), Extension(admin), Json(request())).await);
        assert!(again.replayed);
        assert_eq!(t.ledger.balance_of(t.user.user_id).balance(), Decimal::new(1550, 2));
    }

    #[tokio::test]
    async fn test_admin_credit_reference_taken_by_other_user() {
        let t = app();
        let admin = AuthUser {
            user_id: Uuid::new_v4(),
            role: UserRole::Admin,
        };
        let other = Uuid::new_v4();
        t.ledger.set_balance(other, Decimal::ZERO, Decimal::ZERO);
        let request = |user_id| AdminCreditRequest {
            user_id,
            amount: "2".into(),
            reference: "ticket-9".into(),
            description: None,
        };

        data(admin_credit(State(t.state.clone()), Extension(admin), Json(request(t.user.user_id))).await);
        let err = error(admin_credit(State(t.state.clone()), Extension(admin), Json(request(other))).await);
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.code, error_codes::REFERENCE_CONFLICT);
        assert_eq!(t.ledger.balance_of(other).balance(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_admin_credit_unknown_user() {
        let t = app();
        let admin = AuthUser {
            user_id: Uuid::new_v4(),
            role: UserRole::Admin,
        };
        let err = error(
            admin_credit(
                State(t.state.clone()),
                Extension(admin),
                Json(AdminCreditRequest {
                    user_id: Uuid::new_v4(),
                    amount: "1".into(),
                    reference: "r".into(),
                    description: None,
                }),
            )
            .await,
        );
        assert_eq!(err.code, error_codes::USER_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_admin_refund_of_active_purchase() {
        let t = app();
        let view = data(
            create_activation(
                State(t.state.clone()),
                Extension(t.user),
                Json(activation_request(None)),
            )
            .await,
        );
        let admin = AuthUser {
            user_id: Uuid::new_v4(),
            role: UserRole::Admin,
        };
        let refunded =
            data(admin_refund(State(t.state.clone()), Extension(admin), Path(view.id.clone())).await);
        assert_eq!(refunded.state, PurchaseState::Cancelled.as_str());

        let err = error(admin_refund(State(t.state.clone()), Extension(admin), Path(view.id)).await);
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_reconcile_needs_database() {
        let t = app();
        let err = error(reconcile_report(State(t.state.clone())).await);
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_unconfigured_webhook_is_404() {
        let t = app();
        let err = error(
            wave_webhook(State(t.state.clone()), HeaderMap::new(), Bytes::from_static(b"{}")).await,
        );
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
