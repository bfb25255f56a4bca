use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::auth::normalize_email;
use crate::db;
use crate::db::bookings::Customer;
use crate::models::booking::{BookingStatus, CreateBookingRequest};
use crate::models::event::EventStatus;
use crate::pricing::{quote_event, resolve_selection};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

fn validate_customer(body: &CreateBookingRequest) -> Result<(), AppError> {
    if body.customer_name.trim().is_empty() {
        return Err(AppError::ValidationError("Name is required".into()));
    }
    if !body.customer_email.contains('@') {
        return Err(AppError::ValidationError("A valid email is required".into()));
    }
    if body.items.is_empty() {
        return Err(AppError::ValidationError("Select at least one ticket".into()));
    }
    Ok(())
}

pub async fn create_booking(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Json(body): Json<CreateBookingRequest>,
) -> Result<Response, AppError> {
    validate_customer(&body)?;

    let now = Utc::now();
    db::bookings::expire_lapsed_for_event(&state.pool, event_id, now).await?;
    let event = db::events::find_event(&state.pool, event_id, now)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event '{event_id}' was not found")))?;

    match event.status {
        EventStatus::Ended => return Err(AppError::Conflict("This event has ended".into())),
        EventStatus::Scheduled => {
            return Err(AppError::ValidationError(format!(
                "Ticket sales open at {}",
                event.tickets_live_from.to_rfc3339()
            )))
        }
        EventStatus::Live => {}
    }

    let lines = resolve_selection(&event, &body.items)?;
    let quote = quote_event(&event, &lines, now);

    let email = normalize_email(&body.customer_email);
    let customer = Customer {
        name: body.customer_name.trim(),
        email: &email,
        phone: body.customer_phone.as_deref(),
    };
    let booking =
        db::bookings::create_booking(&state.pool, &event, &customer, &lines, &quote, now).await?;

    info!(
        booking_id = %booking.booking.id,
        event_id = %event.id,
        tickets = quote.ticket_count,
        total = %quote.total,
        status = %booking.booking.status,
        "Booking created"
    );

    let message = match booking.booking.status {
        BookingStatus::Paid => "Booking confirmed",
        _ => "Tickets reserved; complete payment within 24 hours",
    };
    Ok(created(booking, message))
}

/// Reading a booking applies the lazy reservation expiry.
pub async fn get_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let booking = db::bookings::load_current(&state.pool, booking_id, Utc::now())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Booking '{booking_id}' was not found")))?;

    let booking = db::bookings::with_items(&state.pool, booking).await?;
    Ok(success(booking, "Booking retrieved"))
}

pub async fn cancel_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let booking = db::bookings::load_current(&state.pool, booking_id, Utc::now())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Booking '{booking_id}' was not found")))?;

    match booking.status {
        BookingStatus::Reserved => {}
        BookingStatus::Paid => {
            return Err(AppError::Conflict("Paid bookings cannot be cancelled".into()))
        }
        BookingStatus::Cancelled => {
            return Err(AppError::Conflict("Booking is already cancelled".into()))
        }
    }

    let cancelled = db::bookings::cancel_reservation(&state.pool, booking_id)
        .await?
        .ok_or_else(|| AppError::Conflict("Booking is no longer reserved".into()))?;

    info!(booking_id = %booking_id, "Reservation cancelled");
    Ok(success(cancelled, "Booking cancelled"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::booking::TicketSelection;

    fn request(name: &str, email: &str, items: usize) -> CreateBookingRequest {
        CreateBookingRequest {
            customer_name: name.to_string(),
            customer_email: email.to_string(),
            customer_phone: None,
            items: (0..items)
                .map(|_| TicketSelection {
                    category_id: None,
                    quantity: 1,
                })
                .collect(),
        }
    }

    #[test]
    fn test_customer_validation() {
        assert!(validate_customer(&request("Bilal", "bilal@example.com", 1)).is_ok());
        assert!(validate_customer(&request("  ", "bilal@example.com", 1)).is_err());
        assert!(validate_customer(&request("Bilal", "bilal", 1)).is_err());
        assert!(validate_customer(&request("Bilal", "bilal@example.com", 0)).is_err());
    }
}
