//! Vendor credentials and request authentication.
//!
//! Passwords are stored as salted argon2 PHC strings. Logged-in vendors carry
//! an opaque bearer token that maps to a `vendor_sessions` row.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::db;
use crate::state::AppState;
use crate::utils::error::AppError;

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password hashing failed: {0}")]
    Hash(String),
}

pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hash(e.to_string()))
}

/// `Ok(false)` on a wrong password; `Err` only for a malformed stored hash.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(stored_hash).map_err(|e| PasswordError::Hash(e.to_string()))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::Hash(e.to_string())),
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_credentials(email: &str, password: &str) -> Result<(), AppError> {
    let email = email.trim();
    let well_formed = email
        .split_once('@')
        .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
        .unwrap_or(false);
    if !well_formed {
        return Err(AppError::ValidationError("A valid email is required".into()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::ValidationError(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// The authenticated vendor behind a request.
#[derive(Debug, Clone, Copy)]
pub struct VendorSession {
    pub vendor_id: Uuid,
    pub token: Uuid,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for VendorSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let raw = bearer_token(&parts.headers)
            .ok_or_else(|| AppError::AuthError("Missing bearer token".into()))?;
        let token = Uuid::parse_str(raw)
            .map_err(|_| AppError::AuthError("Invalid session token".into()))?;

        let session = db::vendors::find_session(&state.pool, token)
            .await?
            .ok_or_else(|| AppError::AuthError("Session not found".into()))?;

        if session.expires_at <= Utc::now() {
            db::vendors::delete_session(&state.pool, token).await?;
            return Err(AppError::AuthError("Session expired".into()));
        }

        Ok(VendorSession {
            vendor_id: session.vendor_id,
            token,
        })
    }
}

/// Operator access for maintenance endpoints, checked against `ADMIN_TOKEN`.
#[derive(Debug, Clone, Copy)]
pub struct AdminAccess;

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminAccess {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.admin_token.as_deref() else {
            return Err(AppError::Forbidden("Admin access is not configured".into()));
        };
        match bearer_token(&parts.headers) {
            Some(token) if token == expected => Ok(AdminAccess),
            Some(_) => Err(AppError::Forbidden("Invalid admin token".into())),
            None => Err(AppError::AuthError("Missing bearer token".into())),
        }
    }
}
