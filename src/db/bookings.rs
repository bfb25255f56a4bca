use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use thiserror::Error;
use uuid::Uuid;

use crate::models::booking::{
    lapsed_reservations, reservation_expiry, Booking, BookingItem, BookingStatus,
    BookingWithItems,
};
use crate::models::event::Event;
use crate::pricing::{PriceQuote, ResolvedLine};

const BOOKING_COLUMNS: &str = "id, event_id, customer_name, customer_email, customer_phone, \
     total_amount, discount_applied, platform_commission, status, created_at, expires_at, paid_at";

#[derive(Debug, Error)]
pub enum ReservationError {
    #[error("Not enough tickets left for '{0}'")]
    SoldOut(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub struct Customer<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub phone: Option<&'a str>,
}

/// Reserves inventory and records the booking in one transaction.
///
/// Each category is taken with a conditional increment that only succeeds
/// while `sold + requested <= quantity`, and the event total is guarded the
/// same way, so concurrent bookings can never oversell. Any failure rolls
/// the whole booking back.
pub async fn create_booking(
    pool: &PgPool,
    event: &Event,
    customer: &Customer<'_>,
    lines: &[ResolvedLine],
    quote: &PriceQuote,
    now: DateTime<Utc>,
) -> Result<BookingWithItems, ReservationError> {
    let mut tx = pool.begin().await?;

    for line in lines {
        let Some(category_id) = line.category_id else {
            continue;
        };
        let taken = sqlx::query(
            "UPDATE ticket_categories SET sold = sold + $1
             WHERE id = $2 AND event_id = $3 AND sold + $1 <= quantity",
        )
        .bind(line.quantity)
        .bind(category_id)
        .bind(event.id)
        .execute(&mut *tx)
        .await?;
        if taken.rows_affected() == 0 {
            return Err(ReservationError::SoldOut(line.category_name.clone()));
        }
    }

    let requested: i32 = lines.iter().map(|line| line.quantity).sum();
    let taken = sqlx::query(
        "UPDATE events SET tickets_sold = tickets_sold + $1
         WHERE id = $2 AND tickets_sold + $1 <= total_tickets",
    )
    .bind(requested)
    .bind(event.id)
    .execute(&mut *tx)
    .await?;
    if taken.rows_affected() == 0 {
        return Err(ReservationError::SoldOut(event.name.clone()));
    }

    let free = event.is_free();
    let (status, expires_at, paid_at) = if free {
        (BookingStatus::Paid, None, Some(now))
    } else {
        (BookingStatus::Reserved, Some(reservation_expiry(now)), None)
    };
    let commission = if free {
        Decimal::ZERO
    } else {
        quote.platform_commission
    };

    let query = format!(
        "INSERT INTO bookings (
            id, event_id, customer_name, customer_email, customer_phone, total_amount,
            discount_applied, platform_commission, status, created_at, expires_at, paid_at
         )
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
         RETURNING {BOOKING_COLUMNS}"
    );
    let booking = sqlx::query_as::<_, Booking>(&query)
        .bind(Uuid::new_v4())
        .bind(event.id)
        .bind(customer.name)
        .bind(customer.email)
        .bind(customer.phone)
        .bind(quote.total)
        .bind(quote.discount)
        .bind(commission)
        .bind(status.as_str())
        .bind(now)
        .bind(expires_at)
        .bind(paid_at)
        .fetch_one(&mut *tx)
        .await?;

    let mut items = Vec::with_capacity(lines.len());
    for line in lines {
        let item = sqlx::query_as::<_, BookingItem>(
            "INSERT INTO booking_items (id, booking_id, category_id, category_name, quantity, unit_price)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, booking_id, category_id, category_name, quantity, unit_price",
        )
        .bind(Uuid::new_v4())
        .bind(booking.id)
        .bind(line.category_id)
        .bind(&line.category_name)
        .bind(line.quantity)
        .bind(line.unit_price)
        .fetch_one(&mut *tx)
        .await?;
        items.push(item);
    }

    tx.commit().await?;

    Ok(BookingWithItems { booking, items })
}

async fn items_for(pool: &PgPool, booking_id: Uuid) -> Result<Vec<BookingItem>, sqlx::Error> {
    sqlx::query_as::<_, BookingItem>(
        "SELECT id, booking_id, category_id, category_name, quantity, unit_price
         FROM booking_items WHERE booking_id = $1 ORDER BY unit_price DESC",
    )
    .bind(booking_id)
    .fetch_all(pool)
    .await
}

pub async fn find_booking(pool: &PgPool, id: Uuid) -> Result<Option<Booking>, sqlx::Error> {
    let query = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1");
    sqlx::query_as::<_, Booking>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn with_items(pool: &PgPool, booking: Booking) -> Result<BookingWithItems, sqlx::Error> {
    let items = items_for(pool, booking.id).await?;
    Ok(BookingWithItems { booking, items })
}

async fn release_tickets(
    tx: &mut Transaction<'_, Postgres>,
    booking: &Booking,
) -> Result<(), sqlx::Error> {
    let items = sqlx::query_as::<_, BookingItem>(
        "SELECT id, booking_id, category_id, category_name, quantity, unit_price
         FROM booking_items WHERE booking_id = $1",
    )
    .bind(booking.id)
    .fetch_all(&mut **tx)
    .await?;

    for item in &items {
        if let Some(category_id) = item.category_id {
            sqlx::query("UPDATE ticket_categories SET sold = GREATEST(sold - $1, 0) WHERE id = $2")
                .bind(item.quantity)
                .bind(category_id)
                .execute(&mut **tx)
                .await?;
        }
    }

    let released: i32 = items.iter().map(|item| item.quantity).sum();
    sqlx::query("UPDATE events SET tickets_sold = GREATEST(tickets_sold - $1, 0) WHERE id = $2")
        .bind(released)
        .bind(booking.event_id)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

/// Moves a reservation to `cancelled` and returns its tickets to inventory.
///
/// Only a row still in `reserved` is touched, so racing callers cancel at
/// most once. Returns `None` if the booking had already left `reserved`.
pub async fn cancel_reservation(pool: &PgPool, id: Uuid) -> Result<Option<Booking>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let query = format!(
        "UPDATE bookings SET status = 'cancelled'
         WHERE id = $1 AND status = 'reserved'
         RETURNING {BOOKING_COLUMNS}"
    );
    let Some(booking) = sqlx::query_as::<_, Booking>(&query)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
    else {
        return Ok(None);
    };

    release_tickets(&mut tx, &booking).await?;
    tx.commit().await?;

    Ok(Some(booking))
}

/// Cancels an event's lapsed reservations so their tickets return to sale.
/// Returns how many were cancelled by this call.
pub async fn expire_lapsed_for_event(
    pool: &PgPool,
    event_id: Uuid,
    now: DateTime<Utc>,
) -> Result<usize, sqlx::Error> {
    let query = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE event_id = $1 AND status = 'reserved' AND expires_at < $2"
    );
    let candidates = sqlx::query_as::<_, Booking>(&query)
        .bind(event_id)
        .bind(now)
        .fetch_all(pool)
        .await?;

    let mut cancelled = 0;
    for id in lapsed_reservations(&candidates, now) {
        if cancel_reservation(pool, id).await?.is_some() {
            cancelled += 1;
        }
    }
    if cancelled > 0 {
        tracing::info!(event_id = %event_id, cancelled, "Lapsed reservations released");
    }
    Ok(cancelled)
}

/// Loads a booking, persisting the lazy `reserved -> cancelled` transition
/// when its reservation window has passed.
pub async fn load_current(
    pool: &PgPool,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<Booking>, sqlx::Error> {
    let Some(booking) = find_booking(pool, id).await? else {
        return Ok(None);
    };

    if !booking.is_expired(now) {
        return Ok(Some(booking));
    }

    tracing::info!(booking_id = %booking.id, "Reservation expired, cancelling");
    match cancel_reservation(pool, id).await? {
        Some(cancelled) => Ok(Some(cancelled)),
        // Someone else moved it first; report what is stored now.
        None => find_booking(pool, id).await,
    }
}

/// Manual payment confirmation for an unexpired reservation.
pub async fn mark_paid(
    pool: &PgPool,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<Booking>, sqlx::Error> {
    let query = format!(
        "UPDATE bookings SET status = 'paid', paid_at = $2
         WHERE id = $1 AND status = 'reserved' AND (expires_at IS NULL OR expires_at >= $2)
         RETURNING {BOOKING_COLUMNS}"
    );
    sqlx::query_as::<_, Booking>(&query)
        .bind(id)
        .bind(now)
        .fetch_optional(pool)
        .await
}

pub async fn list_for_event(pool: &PgPool, event_id: Uuid) -> Result<Vec<Booking>, sqlx::Error> {
    let query = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE event_id = $1 ORDER BY created_at DESC"
    );
    sqlx::query_as::<_, Booking>(&query)
        .bind(event_id)
        .fetch_all(pool)
        .await
}

/// One booking of a vendor's event with its ticket count, for analytics.
#[derive(Debug, Clone, FromRow)]
pub struct SaleRow {
    pub booking_id: Uuid,
    pub event_id: Uuid,
    #[sqlx(try_from = "String")]
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub total_amount: Decimal,
    pub platform_commission: Decimal,
    pub tickets: i64,
}

pub async fn sales_for_vendor(pool: &PgPool, vendor_id: Uuid) -> Result<Vec<SaleRow>, sqlx::Error> {
    sqlx::query_as::<_, SaleRow>(
        "SELECT b.id AS booking_id, b.event_id, b.status, b.created_at, b.expires_at, b.paid_at,
                b.total_amount, b.platform_commission,
                COALESCE(SUM(i.quantity), 0)::BIGINT AS tickets
         FROM bookings b
         JOIN events e ON e.id = b.event_id
         LEFT JOIN booking_items i ON i.booking_id = b.id
         WHERE e.vendor_id = $1
         GROUP BY b.id",
    )
    .bind(vendor_id)
    .fetch_all(pool)
    .await
}
