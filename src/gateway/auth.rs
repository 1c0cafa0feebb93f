//! Bearer token authentication
//!
//! Tokens are HS256 JWTs issued by the account service. `sub` is the user
//! UUID, `role` is `user` or `admin`.

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::account::UserRole;
use crate::gateway::{
    state::AppState,
    types::{ApiResponse, error_codes},
};

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// User UUID
    pub sub: String,
    #[serde(default)]
    pub role: String,
    pub exp: usize,
    #[serde(default)]
    pub iat: usize,
}

/// Authenticated caller, inserted into request extensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: UserRole,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Invalid user ID in token")]
    InvalidSubject,
}

pub struct TokenVerifier {
    decoding: DecodingKey,
    encoding: EncodingKey,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn verify(&self, token: &str) -> Result<AuthUser, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|_| AuthError::InvalidToken)?;
        let user_id = data
            .claims
            .sub
            .parse::<Uuid>()
            .map_err(|_| AuthError::InvalidSubject)?;
        Ok(AuthUser {
            user_id,
            role: UserRole::parse(&data.claims.role),
        })
    }

    /// Sign a token for `user_id`; used by operator tooling and tests
    pub fn issue(
        &self,
        user_id: Uuid,
        role: UserRole,
        ttl: Duration,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            role: role.as_str().to_string(),
            exp: (now + ttl).timestamp() as usize,
            iat: now.timestamp() as usize,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }
}

type AuthRejection = (StatusCode, Json<ApiResponse<()>>);

fn reject(status: StatusCode, code: i32, msg: &str) -> AuthRejection {
    (status, Json(ApiResponse::<()>::error(code, msg)))
}

pub async fn jwt_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AuthRejection> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            reject(
                StatusCode::UNAUTHORIZED,
                error_codes::MISSING_AUTH,
                "Missing Authorization header",
            )
        })?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        reject(
            StatusCode::UNAUTHORIZED,
            error_codes::AUTH_FAILED,
            "Invalid token format",
        )
    })?;

    match state.tokens.verify(token) {
        Ok(user) => {
            request.extensions_mut().insert(user);
            Ok(next.run(request).await)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Token rejected");
            Err(reject(
                StatusCode::UNAUTHORIZED,
                error_codes::AUTH_FAILED,
                &e.to_string(),
            ))
        }
    }
}

/// Runs after [`jwt_auth_middleware`]; only admins pass
pub async fn require_admin(request: Request<Body>, next: Next) -> Result<Response, AuthRejection> {
    match request.extensions().get::<AuthUser>() {
        Some(user) if user.is_admin() => Ok(next.run(request).await),
        Some(user) => {
            tracing::warn!(user_id = %user.user_id, "Admin route refused");
            Err(reject(
                StatusCode::FORBIDDEN,
                error_codes::FORBIDDEN,
                "Admin role required",
            ))
        }
        None => Err(reject(
            StatusCode::UNAUTHORIZED,
            error_codes::MISSING_AUTH,
            "Missing Authorization header",
        )),
    }
}
