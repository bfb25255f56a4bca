use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::analytics;
use crate::auth::VendorSession;
use crate::db;
use crate::models::booking::BookingStatus;
use crate::models::event::{CreateEventRequest, DiscountRules, Event, UpdatePromotionsRequest};
use crate::pricing::MAX_UNIT_PRICE;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

fn check_percent(label: &str, percent: Decimal) -> Result<(), AppError> {
    if percent <= Decimal::ZERO || percent > Decimal::ONE_HUNDRED {
        return Err(AppError::ValidationError(format!(
            "{label} discount must be between 0 and 100 percent"
        )));
    }
    Ok(())
}

fn check_price(label: &str, price: Decimal) -> Result<(), AppError> {
    if price < Decimal::ZERO {
        return Err(AppError::ValidationError(format!("{label} cannot be negative")));
    }
    if price > MAX_UNIT_PRICE {
        return Err(AppError::ValidationError(format!(
            "{label} cannot exceed {MAX_UNIT_PRICE}"
        )));
    }
    Ok(())
}

pub fn validate_discounts(rules: &DiscountRules) -> Result<(), AppError> {
    if let Some(early) = rules.early_bird {
        check_percent("Early bird", early.discount_percent)?;
    }
    if let Some(flash) = rules.flash_sale {
        check_percent("Flash sale", flash.discount_percent)?;
        if flash.start_date >= flash.end_date {
            return Err(AppError::ValidationError(
                "Flash sale must end after it starts".into(),
            ));
        }
    }
    if let Some(group) = rules.group_booking {
        check_percent("Group", group.discount_percent)?;
        if group.min_tickets < 2 {
            return Err(AppError::ValidationError(
                "Group discounts need a minimum of at least 2 tickets".into(),
            ));
        }
    }
    Ok(())
}

/// Validates a new event and returns its total capacity.
///
/// With ticket categories the capacity is the sum of their quantities;
/// without them `total_tickets` is required.
pub fn validate_new_event(req: &CreateEventRequest) -> Result<i32, AppError> {
    for (field, value) in [("name", &req.name), ("city", &req.city), ("venue", &req.venue)] {
        if value.trim().is_empty() {
            return Err(AppError::ValidationError(format!("Event {field} is required")));
        }
    }
    if req.end_date <= req.start_date {
        return Err(AppError::ValidationError(
            "Event must end after it starts".into(),
        ));
    }
    check_price("Ticket price", req.ticket_price)?;
    validate_discounts(&req.discounts)?;

    if req.ticket_categories.is_empty() {
        return match req.total_tickets {
            Some(total) if total >= 1 => Ok(total),
            Some(_) => Err(AppError::ValidationError(
                "Total tickets must be at least 1".into(),
            )),
            None => Err(AppError::ValidationError(
                "Total tickets is required when no ticket categories are given".into(),
            )),
        };
    }

    let mut total: i32 = 0;
    for category in &req.ticket_categories {
        if category.name.trim().is_empty() {
            return Err(AppError::ValidationError("Ticket category name is required".into()));
        }
        check_price(&format!("Price for '{}'", category.name), category.price)?;
        if category.quantity < 1 {
            return Err(AppError::ValidationError(format!(
                "Quantity for '{}' must be at least 1",
                category.name
            )));
        }
        total = total
            .checked_add(category.quantity)
            .ok_or_else(|| AppError::ValidationError("Too many tickets".into()))?;
    }
    Ok(total)
}

/// Loads an event and checks that the session's vendor owns it.
async fn owned_event(
    state: &AppState,
    session: &VendorSession,
    event_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Event, AppError> {
    let event = db::events::find_event(&state.pool, event_id, now)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event '{event_id}' was not found")))?;

    if event.vendor_id != Some(session.vendor_id) {
        return Err(AppError::Forbidden("This event belongs to another vendor".into()));
    }
    Ok(event)
}

pub async fn create_event(
    State(state): State<AppState>,
    session: VendorSession,
    Json(body): Json<CreateEventRequest>,
) -> Result<Response, AppError> {
    let total_tickets = validate_new_event(&body)?;
    let event =
        db::events::insert_event(&state.pool, session.vendor_id, &body, total_tickets, Utc::now())
            .await?;

    info!(event_id = %event.id, vendor_id = %session.vendor_id, "Event created");
    Ok(created(event, "Event created"))
}

pub async fn list_my_events(
    State(state): State<AppState>,
    session: VendorSession,
) -> Result<Response, AppError> {
    let events = db::events::list_for_vendor(&state.pool, session.vendor_id, Utc::now()).await?;
    Ok(success(events, "Events retrieved"))
}

pub async fn update_promotions(
    State(state): State<AppState>,
    session: VendorSession,
    Path(event_id): Path<Uuid>,
    Json(body): Json<UpdatePromotionsRequest>,
) -> Result<Response, AppError> {
    validate_discounts(&body.discounts)?;

    let now = Utc::now();
    owned_event(&state, &session, event_id, now).await?;

    let event = db::events::update_promotions(
        &state.pool,
        event_id,
        session.vendor_id,
        &body.discounts,
        body.promotion_id,
        now,
    )
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Event '{event_id}' was not found")))?;

    info!(event_id = %event_id, "Promotions updated");
    Ok(success(event, "Promotions updated"))
}

/// Bookings of one event. Lapsed reservations are cancelled and released first.
pub async fn event_bookings(
    State(state): State<AppState>,
    session: VendorSession,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let now = Utc::now();
    owned_event(&state, &session, event_id, now).await?;

    db::bookings::expire_lapsed_for_event(&state.pool, event_id, now).await?;
    let bookings = db::bookings::list_for_event(&state.pool, event_id)
        .await?
        .into_iter()
        .map(|mut booking| {
            // One that lapsed between the sweep and the listing.
            booking.status = booking.effective_status(now);
            booking
        })
        .collect::<Vec<_>>();

    Ok(success(bookings, "Bookings retrieved"))
}

/// Records a manual payment against a reservation of the vendor's event.
pub async fn confirm_payment(
    State(state): State<AppState>,
    session: VendorSession,
    Path(booking_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let now = Utc::now();
    let booking = db::bookings::load_current(&state.pool, booking_id, now)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Booking '{booking_id}' was not found")))?;

    owned_event(&state, &session, booking.event_id, now).await?;

    match booking.status {
        BookingStatus::Paid => return Ok(success(booking, "Booking already paid")),
        BookingStatus::Cancelled => {
            return Err(AppError::Conflict(
                "Booking was cancelled or its reservation expired".into(),
            ))
        }
        BookingStatus::Reserved => {}
    }

    let paid = db::bookings::mark_paid(&state.pool, booking_id, now)
        .await?
        .ok_or_else(|| AppError::Conflict("Booking is no longer reserved".into()))?;

    info!(booking_id = %booking_id, amount = %paid.total_amount, "Payment confirmed");
    Ok(success(paid, "Payment confirmed"))
}

pub async fn analytics(
    State(state): State<AppState>,
    session: VendorSession,
) -> Result<Response, AppError> {
    let now = Utc::now();
    let events = db::events::list_for_vendor(&state.pool, session.vendor_id, now).await?;
    let sales = db::bookings::sales_for_vendor(&state.pool, session.vendor_id).await?;

    Ok(success(
        analytics::summarize(&events, &sales, now),
        "Analytics retrieved",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::{EarlyBird, FlashSale, GroupBooking, NewTicketCategory};
    use chrono::Duration;

    fn request() -> CreateEventRequest {
        let start = Utc::now() + Duration::days(10);
        CreateEventRequest {
            name: "Sufi Night".to_string(),
            description: None,
            start_date: start,
            end_date: start + Duration::hours(3),
            category: "music".to_string(),
            city: "Lahore".to_string(),
            venue: "Alhamra".to_string(),
            image_url: None,
            ticket_price: Decimal::from(1500),
            total_tickets: Some(200),
            tickets_live_from: None,
            ticket_categories: Vec::new(),
            discounts: DiscountRules::default(),
            promotion_id: None,
        }
    }

    fn category(name: &str, quantity: i32) -> NewTicketCategory {
        NewTicketCategory {
            name: name.to_string(),
            price: Decimal::from(2000),
            quantity,
        }
    }

    #[test]
    fn test_capacity_without_categories() {
        assert_eq!(validate_new_event(&request()).unwrap(), 200);

        let mut missing = request();
        missing.total_tickets = None;
        assert!(validate_new_event(&missing).is_err());

        let mut zero = request();
        zero.total_tickets = Some(0);
        assert!(validate_new_event(&zero).is_err());
    }

    #[test]
    fn test_capacity_is_sum_of_categories() {
        let mut req = request();
        req.total_tickets = Some(9999);
        req.ticket_categories = vec![category("VIP", 50), category("General", 250)];
        assert_eq!(validate_new_event(&req).unwrap(), 300);

        req.ticket_categories.push(category("Empty", 0));
        assert!(validate_new_event(&req).is_err());
    }

    #[test]
    fn test_rejects_bad_event_fields() {
        let mut blank = request();
        blank.venue = "  ".to_string();
        assert!(validate_new_event(&blank).is_err());

        let mut backwards = request();
        backwards.end_date = backwards.start_date - Duration::hours(1);
        assert!(validate_new_event(&backwards).is_err());

        let mut negative = request();
        negative.ticket_price = Decimal::from(-1);
        assert!(validate_new_event(&negative).is_err());

        let mut oversized = request();
        oversized.ticket_price = MAX_UNIT_PRICE + Decimal::ONE;
        assert!(validate_new_event(&oversized).is_err());

        let mut oversized_category = request();
        oversized_category.ticket_categories =
            vec![category("VIP", 10), category("Patron", 5)];
        oversized_category.ticket_categories[1].price = MAX_UNIT_PRICE + Decimal::ONE;
        assert!(validate_new_event(&oversized_category).is_err());

        let mut ceiling = request();
        ceiling.ticket_price = MAX_UNIT_PRICE;
        assert!(validate_new_event(&ceiling).is_ok());
    }

    #[test]
    fn test_discount_validation() {
        let now = Utc::now();
        let mut rules = DiscountRules {
            early_bird: Some(EarlyBird {
                discount_percent: Decimal::from(20),
                deadline: now,
            }),
            flash_sale: Some(FlashSale {
                discount_percent: Decimal::from(30),
                start_date: now,
                end_date: now + Duration::hours(2),
            }),
            group_booking: Some(GroupBooking {
                discount_percent: Decimal::from(10),
                min_tickets: 5,
            }),
        };
        assert!(validate_discounts(&rules).is_ok());

        rules.group_booking = Some(GroupBooking {
            discount_percent: Decimal::from(10),
            min_tickets: 1,
        });
        assert!(validate_discounts(&rules).is_err());

        rules.group_booking = None;
        rules.flash_sale = Some(FlashSale {
            discount_percent: Decimal::from(30),
            start_date: now,
            end_date: now,
        });
        assert!(validate_discounts(&rules).is_err());

        rules.flash_sale = None;
        rules.early_bird = Some(EarlyBird {
            discount_percent: Decimal::from(101),
            deadline: now,
        });
        assert!(validate_discounts(&rules).is_err());
    }
}
