use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Unpaid reservations lapse this long after creation.
pub const RESERVATION_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Reserved,
    Paid,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Reserved => "reserved",
            BookingStatus::Paid => "paid",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// `reserved` is the only state with outgoing transitions.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Reserved, BookingStatus::Paid)
                | (BookingStatus::Reserved, BookingStatus::Cancelled)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown booking status '{0}'")]
pub struct UnknownBookingStatus(String);

impl FromStr for BookingStatus {
    type Err = UnknownBookingStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reserved" => Ok(BookingStatus::Reserved),
            "paid" => Ok(BookingStatus::Paid),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(UnknownBookingStatus(other.to_string())),
        }
    }
}

impl TryFrom<String> for BookingStatus {
    type Error = UnknownBookingStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Booking {
    pub id: Uuid,
    pub event_id: Uuid,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub total_amount: Decimal,
    pub discount_applied: Decimal,
    pub platform_commission: Decimal,
    #[sqlx(try_from = "String")]
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Booking {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == BookingStatus::Reserved
            && self.expires_at.map(|expires| now > expires).unwrap_or(false)
    }

    /// Status as observed at `now`: an expired reservation reads as cancelled.
    pub fn effective_status(&self, now: DateTime<Utc>) -> BookingStatus {
        if self.is_expired(now) {
            BookingStatus::Cancelled
        } else {
            self.status
        }
    }
}

/// Ids of reservations whose window has passed at `now`.
pub fn lapsed_reservations(bookings: &[Booking], now: DateTime<Utc>) -> Vec<Uuid> {
    bookings
        .iter()
        .filter(|booking| booking.is_expired(now))
        .map(|booking| booking.id)
        .collect()
}

pub fn reservation_expiry(created_at: DateTime<Utc>) -> DateTime<Utc> {
    created_at + Duration::hours(RESERVATION_TTL_HOURS)
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BookingItem {
    pub id: Uuid,
    pub booking_id: Uuid,
    /// `None` for general admission on events without ticket categories.
    pub category_id: Option<Uuid>,
    pub category_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingWithItems {
    #[serde(flatten)]
    pub booking: Booking,
    pub items: Vec<BookingItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TicketSelection {
    pub category_id: Option<Uuid>,
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteRequest {
    pub items: Vec<TicketSelection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBookingRequest {
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub items: Vec<TicketSelection>,
}
