use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle of an event as seen by buyers. Derived from the clock, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Scheduled,
    Live,
    Ended,
}

impl EventStatus {
    pub fn at(now: DateTime<Utc>, tickets_live_from: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if now >= end {
            EventStatus::Ended
        } else if now >= tickets_live_from {
            EventStatus::Live
        } else {
            EventStatus::Scheduled
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EarlyBird {
    pub discount_percent: Decimal,
    pub deadline: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlashSale {
    pub discount_percent: Decimal,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupBooking {
    pub discount_percent: Decimal,
    pub min_tickets: i32,
}

/// The three optional discount rules attached to an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscountRules {
    pub early_bird: Option<EarlyBird>,
    pub flash_sale: Option<FlashSale>,
    pub group_booking: Option<GroupBooking>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketCategory {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
    pub sold: i32,
}

impl TicketCategory {
    pub fn remaining(&self) -> i32 {
        (self.quantity - self.sold).max(0)
    }
}

/// Flat `events` row as stored.
#[derive(Debug, Clone, FromRow)]
pub struct EventRow {
    pub id: Uuid,
    pub vendor_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub category: String,
    pub city: String,
    pub venue: String,
    pub image_url: Option<String>,
    pub ticket_price: Decimal,
    pub total_tickets: i32,
    pub tickets_sold: i32,
    pub tickets_live_from: DateTime<Utc>,
    pub early_bird_percent: Option<Decimal>,
    pub early_bird_deadline: Option<DateTime<Utc>>,
    pub flash_sale_percent: Option<Decimal>,
    pub flash_sale_start: Option<DateTime<Utc>>,
    pub flash_sale_end: Option<DateTime<Utc>>,
    pub group_percent: Option<Decimal>,
    pub group_min_tickets: Option<i32>,
    pub promotion_id: Option<Uuid>,
    pub source: Option<String>,
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl EventRow {
    /// Rebuilds the rule structs from their nullable columns. A rule is only
    /// present when all of its columns are set.
    pub fn discount_rules(&self) -> DiscountRules {
        let early_bird = match (self.early_bird_percent, self.early_bird_deadline) {
            (Some(discount_percent), Some(deadline)) => Some(EarlyBird {
                discount_percent,
                deadline,
            }),
            _ => None,
        };
        let flash_sale = match (
            self.flash_sale_percent,
            self.flash_sale_start,
            self.flash_sale_end,
        ) {
            (Some(discount_percent), Some(start_date), Some(end_date)) => Some(FlashSale {
                discount_percent,
                start_date,
                end_date,
            }),
            _ => None,
        };
        let group_booking = match (self.group_percent, self.group_min_tickets) {
            (Some(discount_percent), Some(min_tickets)) => Some(GroupBooking {
                discount_percent,
                min_tickets,
            }),
            _ => None,
        };

        DiscountRules {
            early_bird,
            flash_sale,
            group_booking,
        }
    }
}

/// Event as returned by the API: row fields, categories, rules and derived status.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: Uuid,
    pub vendor_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub category: String,
    pub city: String,
    pub venue: String,
    pub image_url: Option<String>,
    pub ticket_price: Decimal,
    pub total_tickets: i32,
    pub tickets_sold: i32,
    pub tickets_live_from: DateTime<Utc>,
    pub ticket_categories: Vec<TicketCategory>,
    #[serde(flatten)]
    pub discounts: DiscountRules,
    pub status: EventStatus,
    pub promotion_id: Option<Uuid>,
    pub source: Option<String>,
}

impl Event {
    pub fn from_row(row: EventRow, ticket_categories: Vec<TicketCategory>, now: DateTime<Utc>) -> Self {
        let discounts = row.discount_rules();
        let status = EventStatus::at(now, row.tickets_live_from, row.end_date);

        Self {
            id: row.id,
            vendor_id: row.vendor_id,
            name: row.name,
            description: row.description,
            start_date: row.start_date,
            end_date: row.end_date,
            category: row.category,
            city: row.city,
            venue: row.venue,
            image_url: row.image_url,
            ticket_price: row.ticket_price,
            total_tickets: row.total_tickets,
            tickets_sold: row.tickets_sold,
            tickets_live_from: row.tickets_live_from,
            ticket_categories,
            discounts,
            status,
            promotion_id: row.promotion_id,
            source: row.source,
        }
    }

    pub fn remaining_tickets(&self) -> i32 {
        (self.total_tickets - self.tickets_sold).max(0)
    }

    /// Free events skip the discount engine and are booked at zero cost.
    pub fn is_free(&self) -> bool {
        if self.ticket_categories.is_empty() {
            self.ticket_price.is_zero()
        } else {
            self.ticket_categories.iter().all(|c| c.price.is_zero())
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTicketCategory {
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateEventRequest {
    pub name: String,
    pub description: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default = "default_category")]
    pub category: String,
    pub city: String,
    pub venue: String,
    pub image_url: Option<String>,
    #[serde(default)]
    pub ticket_price: Decimal,
    pub total_tickets: Option<i32>,
    pub tickets_live_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ticket_categories: Vec<NewTicketCategory>,
    #[serde(flatten)]
    pub discounts: DiscountRules,
    pub promotion_id: Option<Uuid>,
}

fn default_category() -> String {
    "other".to_string()
}

/// Replaces all promotion settings of an event at once.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePromotionsRequest {
    #[serde(flatten)]
    pub discounts: DiscountRules,
    pub promotion_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventFilter {
    pub city: Option<String>,
    pub category: Option<String>,
    pub q: Option<String>,
}
