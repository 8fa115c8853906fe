//! Bearer token authentication for the payment routes.

use crate::error::{AppError, AuthError};
use crate::middleware::error::get_request_id_from_headers;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default = "default_role")]
    pub role: String,
    pub exp: usize,
}

fn default_role() -> String {
    "customer".to_string()
}

/// HS256 verifier shared through router state
#[derive(Clone)]
pub struct JwtVerifier {
    key: Arc<DecodingKey>,
    validation: Arc<Validation>,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
            validation: Arc::new(Validation::new(Algorithm::HS256)),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                AppError::auth(AuthError::Unauthorized {
                    reason: format!("JWT validation failed: {}", e),
                })
            })
    }
}

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::auth(AuthError::Forbidden {
                reason: format!("role '{}' cannot perform this action", self.role),
            }))
        }
    }
}

fn unauthorized(reason: &str, parts: &Parts) -> AppError {
    let err = AppError::auth(AuthError::Unauthorized {
        reason: reason.to_string(),
    });
    match get_request_id_from_headers(&parts.headers) {
        Some(id) => err.with_request_id(id),
        None => err,
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    JwtVerifier: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .ok_or_else(|| unauthorized("Missing Authorization header", parts))?;

        let header = header
            .to_str()
            .map_err(|_| unauthorized("Invalid Authorization header", parts))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| unauthorized("Invalid Authorization header format", parts))?;

        let claims = JwtVerifier::from_ref(state).verify(token).map_err(|e| {
            match get_request_id_from_headers(&parts.headers) {
                Some(id) => e.with_request_id(id),
                None => e,
            }
        })?;

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| unauthorized("Invalid user ID in token", parts))?;

        Ok(AuthUser {
            user_id,
            email: claims.email,
            role: claims.role,
        })
    }
}
