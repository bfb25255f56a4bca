use axum::extract::State;
use axum::response::Response;
use axum::Json;
use chrono::{Duration, Utc};
use tracing::info;

use crate::auth::{self, VendorSession};
use crate::db;
use crate::db::vendors::NewVendor;
use crate::models::vendor::{LoginRequest, LoginResponse, RegisterVendorRequest};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, empty_success, success};

const INVALID_LOGIN: &str = "Invalid email or password";

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterVendorRequest>,
) -> Result<Response, AppError> {
    if body.organization_name.trim().is_empty() {
        return Err(AppError::ValidationError("Organization name is required".into()));
    }
    auth::validate_credentials(&body.email, &body.password)?;

    let email = auth::normalize_email(&body.email);
    let password_hash = auth::hash_password(&body.password)?;

    let new = NewVendor {
        organization_name: body.organization_name.trim(),
        email: &email,
        phone: non_blank(&body.phone),
        password_hash: &password_hash,
        account_title: non_blank(&body.account_title),
        account_number: non_blank(&body.account_number),
        bank_name: non_blank(&body.bank_name),
    };

    let vendor = match db::vendors::insert_vendor(&state.pool, &new).await {
        Ok(vendor) => vendor,
        Err(e) if db::is_unique_violation(&e) => {
            return Err(AppError::Conflict("An account with this email already exists".into()))
        }
        Err(e) => return Err(e.into()),
    };

    info!(vendor_id = %vendor.id, "Vendor registered");
    Ok(created(vendor, "Vendor registered"))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Response, AppError> {
    let email = auth::normalize_email(&body.email);
    let vendor = db::vendors::find_by_email(&state.pool, &email)
        .await?
        .ok_or_else(|| AppError::AuthError(INVALID_LOGIN.into()))?;

    if !auth::verify_password(&body.password, &vendor.password_hash)? {
        return Err(AppError::AuthError(INVALID_LOGIN.into()));
    }

    let expires_at = Utc::now() + Duration::hours(state.config.session_ttl_hours);
    let session = db::vendors::create_session(&state.pool, vendor.id, expires_at).await?;

    info!(vendor_id = %vendor.id, "Vendor logged in");
    Ok(success(
        LoginResponse {
            token: session.token,
            expires_at: session.expires_at,
            vendor,
        },
        "Logged in",
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    session: VendorSession,
) -> Result<Response, AppError> {
    db::vendors::delete_session(&state.pool, session.token).await?;
    Ok(empty_success("Logged out"))
}

pub async fn me(
    State(state): State<AppState>,
    session: VendorSession,
) -> Result<Response, AppError> {
    let vendor = db::vendors::find_by_id(&state.pool, session.vendor_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Vendor account no longer exists".into()))?;
    Ok(success(vendor, "Vendor retrieved"))
}
