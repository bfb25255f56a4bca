use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::vendor::{Vendor, VendorSession};

const VENDOR_COLUMNS: &str = "id, organization_name, email, phone, password_hash, account_title, \
     account_number, bank_name, created_at";

pub struct NewVendor<'a> {
    pub organization_name: &'a str,
    pub email: &'a str,
    pub phone: Option<&'a str>,
    pub password_hash: &'a str,
    pub account_title: Option<&'a str>,
    pub account_number: Option<&'a str>,
    pub bank_name: Option<&'a str>,
}

pub async fn insert_vendor(pool: &PgPool, new: &NewVendor<'_>) -> Result<Vendor, sqlx::Error> {
    let query = format!(
        "INSERT INTO vendors (id, organization_name, email, phone, password_hash,
                              account_title, account_number, bank_name)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         RETURNING {VENDOR_COLUMNS}"
    );
    sqlx::query_as::<_, Vendor>(&query)
        .bind(Uuid::new_v4())
        .bind(new.organization_name)
        .bind(new.email)
        .bind(new.phone)
        .bind(new.password_hash)
        .bind(new.account_title)
        .bind(new.account_number)
        .bind(new.bank_name)
        .fetch_one(pool)
        .await
}

pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Vendor>, sqlx::Error> {
    let query = format!("SELECT {VENDOR_COLUMNS} FROM vendors WHERE email = $1");
    sqlx::query_as::<_, Vendor>(&query)
        .bind(email)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Vendor>, sqlx::Error> {
    let query = format!("SELECT {VENDOR_COLUMNS} FROM vendors WHERE id = $1");
    sqlx::query_as::<_, Vendor>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn create_session(
    pool: &PgPool,
    vendor_id: Uuid,
    expires_at: DateTime<Utc>,
) -> Result<VendorSession, sqlx::Error> {
    sqlx::query_as::<_, VendorSession>(
        "INSERT INTO vendor_sessions (token, vendor_id, expires_at)
         VALUES ($1, $2, $3)
         RETURNING token, vendor_id, created_at, expires_at",
    )
    .bind(Uuid::new_v4())
    .bind(vendor_id)
    .bind(expires_at)
    .fetch_one(pool)
    .await
}

pub async fn find_session(pool: &PgPool, token: Uuid) -> Result<Option<VendorSession>, sqlx::Error> {
    sqlx::query_as::<_, VendorSession>(
        "SELECT token, vendor_id, created_at, expires_at FROM vendor_sessions WHERE token = $1",
    )
    .bind(token)
    .fetch_optional(pool)
    .await
}

pub async fn delete_session(pool: &PgPool, token: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM vendor_sessions WHERE token = $1")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}
