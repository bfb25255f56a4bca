use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::escape_like;
use crate::models::event::{
    CreateEventRequest, DiscountRules, Event, EventFilter, EventRow, TicketCategory,
};

const EVENT_COLUMNS: &str = "id, vendor_id, name, description, start_date, end_date, category, \
     city, venue, image_url, ticket_price, total_tickets, tickets_sold, tickets_live_from, \
     early_bird_percent, early_bird_deadline, flash_sale_percent, flash_sale_start, \
     flash_sale_end, group_percent, group_min_tickets, promotion_id, source, external_id, created_at";

pub async fn categories_for(
    pool: &PgPool,
    event_ids: &[Uuid],
) -> Result<Vec<TicketCategory>, sqlx::Error> {
    sqlx::query_as::<_, TicketCategory>(
        "SELECT id, event_id, name, price, quantity, sold FROM ticket_categories
         WHERE event_id = ANY($1)
         ORDER BY price ASC, name ASC",
    )
    .bind(event_ids)
    .fetch_all(pool)
    .await
}

async fn with_categories(
    pool: &PgPool,
    rows: Vec<EventRow>,
    now: DateTime<Utc>,
) -> Result<Vec<Event>, sqlx::Error> {
    let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
    let mut by_event: HashMap<Uuid, Vec<TicketCategory>> = HashMap::new();
    for category in categories_for(pool, &ids).await? {
        by_event.entry(category.event_id).or_default().push(category);
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let categories = by_event.remove(&row.id).unwrap_or_default();
            Event::from_row(row, categories, now)
        })
        .collect())
}

/// Events that have not ended yet, soonest first.
pub async fn list_upcoming(
    pool: &PgPool,
    filter: &EventFilter,
    now: DateTime<Utc>,
) -> Result<Vec<Event>, sqlx::Error> {
    let query = format!(
        "SELECT {EVENT_COLUMNS} FROM events
         WHERE end_date > $1
           AND ($2::TEXT IS NULL OR LOWER(city) = LOWER($2))
           AND ($3::TEXT IS NULL OR category = $3)
           AND ($4::TEXT IS NULL OR name ILIKE '%' || $4 || '%')
         ORDER BY start_date ASC"
    );
    let rows = sqlx::query_as::<_, EventRow>(&query)
        .bind(now)
        .bind(filter.city.as_deref().map(str::trim).filter(|c| !c.is_empty()))
        .bind(filter.category.as_deref().map(str::trim).filter(|c| !c.is_empty()))
        .bind(
            filter
                .q
                .as_deref()
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .map(escape_like),
        )
        .fetch_all(pool)
        .await?;

    with_categories(pool, rows, now).await
}

pub async fn list_for_vendor(
    pool: &PgPool,
    vendor_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Vec<Event>, sqlx::Error> {
    let query = format!(
        "SELECT {EVENT_COLUMNS} FROM events WHERE vendor_id = $1 ORDER BY start_date DESC"
    );
    let rows = sqlx::query_as::<_, EventRow>(&query)
        .bind(vendor_id)
        .fetch_all(pool)
        .await?;

    with_categories(pool, rows, now).await
}

pub async fn find_event(
    pool: &PgPool,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<Event>, sqlx::Error> {
    let query = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1");
    let Some(row) = sqlx::query_as::<_, EventRow>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?
    else {
        return Ok(None);
    };

    let categories = categories_for(pool, &[row.id]).await?;
    Ok(Some(Event::from_row(row, categories, now)))
}

/// Inserts a vendor's event and its ticket categories in one transaction.
pub async fn insert_event(
    pool: &PgPool,
    vendor_id: Uuid,
    req: &CreateEventRequest,
    total_tickets: i32,
    now: DateTime<Utc>,
) -> Result<Event, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let rules = &req.discounts;

    let query = format!(
        "INSERT INTO events (
            id, vendor_id, name, description, start_date, end_date, category, city, venue,
            image_url, ticket_price, total_tickets, tickets_sold, tickets_live_from,
            early_bird_percent, early_bird_deadline, flash_sale_percent, flash_sale_start,
            flash_sale_end, group_percent, group_min_tickets, promotion_id
         )
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 0, $13,
                 $14, $15, $16, $17, $18, $19, $20, $21)
         RETURNING {EVENT_COLUMNS}"
    );
    let row = sqlx::query_as::<_, EventRow>(&query)
        .bind(Uuid::new_v4())
        .bind(vendor_id)
        .bind(req.name.trim())
        .bind(&req.description)
        .bind(req.start_date)
        .bind(req.end_date)
        .bind(req.category.trim().to_lowercase())
        .bind(req.city.trim())
        .bind(req.venue.trim())
        .bind(&req.image_url)
        .bind(req.ticket_price)
        .bind(total_tickets)
        .bind(req.tickets_live_from.unwrap_or(now))
        .bind(rules.early_bird.map(|r| r.discount_percent))
        .bind(rules.early_bird.map(|r| r.deadline))
        .bind(rules.flash_sale.map(|r| r.discount_percent))
        .bind(rules.flash_sale.map(|r| r.start_date))
        .bind(rules.flash_sale.map(|r| r.end_date))
        .bind(rules.group_booking.map(|r| r.discount_percent))
        .bind(rules.group_booking.map(|r| r.min_tickets))
        .bind(req.promotion_id)
        .fetch_one(&mut *tx)
        .await?;

    let mut categories = Vec::with_capacity(req.ticket_categories.len());
    for category in &req.ticket_categories {
        let inserted = sqlx::query_as::<_, TicketCategory>(
            "INSERT INTO ticket_categories (id, event_id, name, price, quantity, sold)
             VALUES ($1, $2, $3, $4, $5, 0)
             RETURNING id, event_id, name, price, quantity, sold",
        )
        .bind(Uuid::new_v4())
        .bind(row.id)
        .bind(category.name.trim())
        .bind(category.price)
        .bind(category.quantity)
        .fetch_one(&mut *tx)
        .await?;
        categories.push(inserted);
    }

    tx.commit().await?;

    Ok(Event::from_row(row, categories, now))
}

/// Replaces an event's promotion settings. `None` when the event does not
/// exist or belongs to another vendor.
pub async fn update_promotions(
    pool: &PgPool,
    event_id: Uuid,
    vendor_id: Uuid,
    rules: &DiscountRules,
    promotion_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<Option<Event>, sqlx::Error> {
    let query = format!(
        "UPDATE events SET
            early_bird_percent = $3, early_bird_deadline = $4,
            flash_sale_percent = $5, flash_sale_start = $6, flash_sale_end = $7,
            group_percent = $8, group_min_tickets = $9, promotion_id = $10
         WHERE id = $1 AND vendor_id = $2
         RETURNING {EVENT_COLUMNS}"
    );
    let Some(row) = sqlx::query_as::<_, EventRow>(&query)
        .bind(event_id)
        .bind(vendor_id)
        .bind(rules.early_bird.map(|r| r.discount_percent))
        .bind(rules.early_bird.map(|r| r.deadline))
        .bind(rules.flash_sale.map(|r| r.discount_percent))
        .bind(rules.flash_sale.map(|r| r.start_date))
        .bind(rules.flash_sale.map(|r| r.end_date))
        .bind(rules.group_booking.map(|r| r.discount_percent))
        .bind(rules.group_booking.map(|r| r.min_tickets))
        .bind(promotion_id)
        .fetch_optional(pool)
        .await?
    else {
        return Ok(None);
    };

    let categories = categories_for(pool, &[row.id]).await?;
    Ok(Some(Event::from_row(row, categories, now)))
}
