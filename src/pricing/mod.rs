//! Booking price computation.
//!
//! Flash sale and early bird are exclusive, with flash sale taking priority
//! when both windows are open. A group discount applies on top of that choice
//! only when it is larger. Platform commission is reported alongside the
//! total and never deducted from what the buyer pays.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::booking::TicketSelection;
use crate::models::event::{DiscountRules, Event};

/// 8%, retained by the platform on every paid booking.
pub const PLATFORM_COMMISSION_RATE: Decimal = Decimal::from_parts(8, 0, 0, false, 2);

/// Largest unit price the `NUMERIC(12, 2)` money columns hold: 9,999,999,999.99.
pub const MAX_UNIT_PRICE: Decimal = Decimal::from_parts(0xD4A5_0FFF, 0xE8, 0, false, 2);

const GENERAL_ADMISSION: &str = "General Admission";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AppliedDiscount {
    FlashSale,
    EarlyBird,
    GroupBooking,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceLine {
    pub unit_price: Decimal,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceQuote {
    pub gross: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub platform_commission: Decimal,
    pub ticket_count: i64,
    pub applied_discount: Option<AppliedDiscount>,
}

impl PriceQuote {
    pub fn zero(ticket_count: i64) -> Self {
        Self {
            gross: Decimal::ZERO,
            discount: Decimal::ZERO,
            total: Decimal::ZERO,
            platform_commission: Decimal::ZERO,
            ticket_count,
            applied_discount: None,
        }
    }
}

fn percent_of(amount: Decimal, percent: Decimal) -> Decimal {
    (amount * percent / Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn platform_commission(total: Decimal) -> Decimal {
    percent_of(total, PLATFORM_COMMISSION_RATE * Decimal::ONE_HUNDRED)
}

/// Prices a set of lines against an event's discount rules at `now`.
///
/// Quantities are assumed validated; see [`resolve_selection`].
pub fn quote(rules: &DiscountRules, lines: &[PriceLine], now: DateTime<Utc>) -> PriceQuote {
    let gross: Decimal = lines
        .iter()
        .map(|line| line.unit_price * Decimal::from(line.quantity))
        .sum();
    let ticket_count: i64 = lines.iter().map(|line| i64::from(line.quantity)).sum();

    let mut discount = Decimal::ZERO;
    let mut applied = None;

    let flash_active = rules
        .flash_sale
        .filter(|sale| sale.start_date <= now && now < sale.end_date);
    let early_active = rules.early_bird.filter(|bird| now < bird.deadline);

    if let Some(sale) = flash_active {
        discount = percent_of(gross, sale.discount_percent);
        applied = Some(AppliedDiscount::FlashSale);
    } else if let Some(bird) = early_active {
        discount = percent_of(gross, bird.discount_percent);
        applied = Some(AppliedDiscount::EarlyBird);
    }

    if let Some(group) = rules.group_booking {
        if ticket_count >= i64::from(group.min_tickets) {
            let group_discount = percent_of(gross, group.discount_percent);
            if group_discount > discount {
                discount = group_discount;
                applied = Some(AppliedDiscount::GroupBooking);
            }
        }
    }

    if applied.is_some() && discount.is_zero() {
        applied = None;
    }

    let total = gross - discount;

    PriceQuote {
        gross,
        discount,
        total,
        platform_commission: platform_commission(total),
        ticket_count,
        applied_discount: applied,
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SelectionError {
    #[error("Ticket category '{0}' does not belong to this event")]
    UnknownCategory(Uuid),

    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    #[error("This event sells tickets by category; choose a category")]
    CategoryRequired,

    #[error("Only {remaining} ticket(s) left for '{name}'")]
    ExceedsAvailability { name: String, remaining: i32 },
}

/// A selection line resolved against the event: the name and price at booking time.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLine {
    pub category_id: Option<Uuid>,
    pub category_name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
}

impl From<&ResolvedLine> for PriceLine {
    fn from(line: &ResolvedLine) -> Self {
        PriceLine {
            unit_price: line.unit_price,
            quantity: line.quantity,
        }
    }
}

/// Maps requested quantities onto the event's categories.
///
/// Repeated entries for one category are summed. Availability is checked
/// against the counts the caller loaded, which can be stale; the reservation
/// update in `db::bookings` is the authoritative check.
pub fn resolve_selection(
    event: &Event,
    selections: &[TicketSelection],
) -> Result<Vec<ResolvedLine>, SelectionError> {
    let mut requested: HashMap<Option<Uuid>, i32> = HashMap::new();
    for selection in selections {
        if selection.quantity <= 0 {
            return Err(SelectionError::InvalidQuantity);
        }
        let total = requested.entry(selection.category_id).or_insert(0);
        *total = total
            .checked_add(selection.quantity)
            .ok_or(SelectionError::InvalidQuantity)?;
    }

    if event.ticket_categories.is_empty() {
        if let Some(id) = requested.keys().flatten().next() {
            return Err(SelectionError::UnknownCategory(*id));
        }
        return match requested.get(&None) {
            Some(&quantity) if quantity > event.remaining_tickets() => {
                Err(SelectionError::ExceedsAvailability {
                    name: GENERAL_ADMISSION.to_string(),
                    remaining: event.remaining_tickets(),
                })
            }
            Some(&quantity) => Ok(vec![ResolvedLine {
                category_id: None,
                category_name: GENERAL_ADMISSION.to_string(),
                unit_price: event.ticket_price,
                quantity,
            }]),
            None => Ok(Vec::new()),
        };
    }

    if requested.contains_key(&None) {
        return Err(SelectionError::CategoryRequired);
    }
    for id in requested.keys().flatten() {
        if !event.ticket_categories.iter().any(|c| c.id == *id) {
            return Err(SelectionError::UnknownCategory(*id));
        }
    }

    let mut lines = Vec::new();
    for category in &event.ticket_categories {
        let Some(&quantity) = requested.get(&Some(category.id)) else {
            continue;
        };
        if quantity > category.remaining() {
            return Err(SelectionError::ExceedsAvailability {
                name: category.name.clone(),
                remaining: category.remaining(),
            });
        }
        lines.push(ResolvedLine {
            category_id: Some(category.id),
            category_name: category.name.clone(),
            unit_price: category.price,
            quantity,
        });
    }

    Ok(lines)
}

/// Prices resolved lines for an event. Free events bypass the discount rules.
pub fn quote_event(event: &Event, lines: &[ResolvedLine], now: DateTime<Utc>) -> PriceQuote {
    if event.is_free() {
        let ticket_count = lines.iter().map(|line| i64::from(line.quantity)).sum();
        return PriceQuote::zero(ticket_count);
    }

    let price_lines: Vec<PriceLine> = lines.iter().map(PriceLine::from).collect();
    quote(&event.discounts, &price_lines, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::{EarlyBird, EventStatus, FlashSale, GroupBooking, TicketCategory};
    use chrono::Duration;

    fn lines(count: i32, price: i64) -> Vec<PriceLine> {
        vec![PriceLine {
            unit_price: Decimal::from(price),
            quantity: count,
        }]
    }

    fn flash(now: DateTime<Utc>, percent: i64) -> FlashSale {
        FlashSale {
            discount_percent: Decimal::from(percent),
            start_date: now - Duration::hours(1),
            end_date: now + Duration::hours(1),
        }
    }

    fn early(now: DateTime<Utc>, percent: i64) -> EarlyBird {
        EarlyBird {
            discount_percent: Decimal::from(percent),
            deadline: now + Duration::days(2),
        }
    }

    fn group(percent: i64, min_tickets: i32) -> GroupBooking {
        GroupBooking {
            discount_percent: Decimal::from(percent),
            min_tickets,
        }
    }

    fn event(categories: Vec<(&str, i64, i32, i32)>, ticket_price: i64) -> Event {
        let now = Utc::now();
        let id = Uuid::new_v4();
        Event {
            id,
            vendor_id: Some(Uuid::new_v4()),
            name: "Qawwali Night".to_string(),
            description: None,
            start_date: now + Duration::days(10),
            end_date: now + Duration::days(10) + Duration::hours(4),
            category: "music".to_string(),
            city: "Karachi".to_string(),
            venue: "Beach Luxury".to_string(),
            image_url: None,
            ticket_price: Decimal::from(ticket_price),
            total_tickets: 100,
            tickets_sold: 90,
            tickets_live_from: now - Duration::days(1),
            ticket_categories: categories
                .into_iter()
                .map(|(name, price, quantity, sold)| TicketCategory {
                    id: Uuid::new_v4(),
                    event_id: id,
                    name: name.to_string(),
                    price: Decimal::from(price),
                    quantity,
                    sold,
                })
                .collect(),
            discounts: DiscountRules::default(),
            status: EventStatus::Live,
            promotion_id: None,
            source: None,
        }
    }

    #[test]
    fn test_no_discount_is_n_times_price() {
        let now = Utc::now();
        let quote = quote(&DiscountRules::default(), &lines(3, 1200), now);

        assert_eq!(quote.total, Decimal::from(3600));
        assert_eq!(quote.discount, Decimal::ZERO);
        assert_eq!(quote.applied_discount, None);
        assert_eq!(quote.ticket_count, 3);
    }

    #[test]
    fn test_zero_tickets_prices_to_zero() {
        let now = Utc::now();
        let rules = DiscountRules {
            flash_sale: Some(flash(now, 20)),
            group_booking: Some(group(10, 1)),
            ..Default::default()
        };
        let quote = quote(&rules, &[], now);

        assert_eq!(quote.total, Decimal::ZERO);
        assert_eq!(quote.discount, Decimal::ZERO);
        assert_eq!(quote.applied_discount, None);
    }

    #[test]
    fn test_flash_sale_beats_early_bird() {
        let now = Utc::now();
        let rules = DiscountRules {
            early_bird: Some(early(now, 25)),
            flash_sale: Some(flash(now, 10)),
            group_booking: None,
        };
        let quote = quote(&rules, &lines(2, 1000), now);

        assert_eq!(quote.discount, Decimal::from(200));
        assert_eq!(quote.total, Decimal::from(1800));
        assert_eq!(quote.applied_discount, Some(AppliedDiscount::FlashSale));
    }

    #[test]
    fn test_early_bird_applies_outside_flash_window() {
        let now = Utc::now();
        let rules = DiscountRules {
            early_bird: Some(early(now, 25)),
            flash_sale: Some(FlashSale {
                discount_percent: Decimal::from(50),
                start_date: now + Duration::hours(1),
                end_date: now + Duration::hours(2),
            }),
            group_booking: None,
        };
        let quote = quote(&rules, &lines(4, 100), now);

        assert_eq!(quote.discount, Decimal::from(100));
        assert_eq!(quote.applied_discount, Some(AppliedDiscount::EarlyBird));
    }

    #[test]
    fn test_flash_window_end_is_exclusive() {
        let now = Utc::now();
        let sale = FlashSale {
            discount_percent: Decimal::from(50),
            start_date: now - Duration::hours(1),
            end_date: now,
        };
        let rules = DiscountRules {
            flash_sale: Some(sale),
            ..Default::default()
        };

        assert_eq!(quote(&rules, &lines(1, 100), now).discount, Decimal::ZERO);
        assert_eq!(
            quote(&rules, &lines(1, 100), sale.start_date).discount,
            Decimal::from(50)
        );
    }

    #[test]
    fn test_group_discount_threshold() {
        let now = Utc::now();
        let rules = DiscountRules {
            group_booking: Some(group(10, 5)),
            ..Default::default()
        };

        let five = quote(&rules, &lines(5, 100), now);
        assert_eq!(five.discount, Decimal::from(50));
        assert_eq!(five.total, Decimal::from(450));
        assert_eq!(five.applied_discount, Some(AppliedDiscount::GroupBooking));

        let four = quote(&rules, &lines(4, 100), now);
        assert_eq!(four.discount, Decimal::ZERO);
        assert_eq!(four.total, Decimal::from(400));
    }

    #[test]
    fn test_group_threshold_counts_across_categories() {
        let now = Utc::now();
        let rules = DiscountRules {
            group_booking: Some(group(10, 5)),
            ..Default::default()
        };
        let mixed = vec![
            PriceLine {
                unit_price: Decimal::from(100),
                quantity: 3,
            },
            PriceLine {
                unit_price: Decimal::from(300),
                quantity: 2,
            },
        ];

        let quote = quote(&rules, &mixed, now);
        assert_eq!(quote.gross, Decimal::from(900));
        assert_eq!(quote.discount, Decimal::from(90));
    }

    #[test]
    fn test_group_never_lowers_larger_discount() {
        let now = Utc::now();
        let rules = DiscountRules {
            flash_sale: Some(flash(now, 30)),
            group_booking: Some(group(10, 2)),
            ..Default::default()
        };
        let quote = quote(&rules, &lines(6, 100), now);

        assert_eq!(quote.discount, Decimal::from(180));
        assert_eq!(quote.applied_discount, Some(AppliedDiscount::FlashSale));
    }

    #[test]
    fn test_group_replaces_smaller_early_bird() {
        let now = Utc::now();
        let rules = DiscountRules {
            early_bird: Some(early(now, 5)),
            group_booking: Some(group(20, 3)),
            ..Default::default()
        };
        let quote = quote(&rules, &lines(3, 1000), now);

        assert_eq!(quote.discount, Decimal::from(600));
        assert_eq!(quote.applied_discount, Some(AppliedDiscount::GroupBooking));
    }

    #[test]
    fn test_commission_is_eight_percent_of_total() {
        let now = Utc::now();
        let rules = DiscountRules {
            group_booking: Some(group(10, 5)),
            ..Default::default()
        };
        let quote = quote(&rules, &lines(5, 100), now);

        assert_eq!(quote.platform_commission, Decimal::from(36));
        assert_eq!(quote.total, Decimal::from(450));
    }

    #[test]
    fn test_discount_rounds_to_cents() {
        let now = Utc::now();
        let rules = DiscountRules {
            flash_sale: Some(flash(now, 15)),
            ..Default::default()
        };
        let quote = quote(&rules, &lines(1, 333), now);

        assert_eq!(quote.discount, Decimal::new(4995, 2));
        assert_eq!(quote.total, Decimal::new(28305, 2));
    }

    #[test]
    fn test_free_event_prices_to_zero() {
        let now = Utc::now();
        let mut free = event(vec![("Student", 0, 100, 0), ("Guest", 0, 50, 0)], 0);
        free.discounts.group_booking = Some(group(10, 1));
        let selection: Vec<TicketSelection> = free
            .ticket_categories
            .iter()
            .map(|c| TicketSelection {
                category_id: Some(c.id),
                quantity: 7,
            })
            .collect();

        let resolved = resolve_selection(&free, &selection).unwrap();
        let quote = quote_event(&free, &resolved, now);

        assert_eq!(quote.total, Decimal::ZERO);
        assert_eq!(quote.platform_commission, Decimal::ZERO);
        assert_eq!(quote.ticket_count, 14);
    }

    #[test]
    fn test_resolve_merges_duplicate_lines() {
        let ev = event(vec![("Regular", 1000, 50, 10), ("VIP", 5000, 10, 0)], 0);
        let regular = ev.ticket_categories[0].id;
        let selection = vec![
            TicketSelection {
                category_id: Some(regular),
                quantity: 2,
            },
            TicketSelection {
                category_id: Some(regular),
                quantity: 3,
            },
        ];

        let resolved = resolve_selection(&ev, &selection).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].quantity, 5);
        assert_eq!(resolved[0].unit_price, Decimal::from(1000));
    }

    #[test]
    fn test_resolve_rejects_overflowing_duplicates() {
        let ev = event(vec![("Regular", 1000, 10, 0)], 0);
        let regular = ev.ticket_categories[0].id;
        let huge = TicketSelection {
            category_id: Some(regular),
            quantity: i32::MAX,
        };

        assert_eq!(
            resolve_selection(&ev, &[huge.clone(), huge]),
            Err(SelectionError::InvalidQuantity)
        );

        let general = event(Vec::new(), 500);
        let huge = TicketSelection {
            category_id: None,
            quantity: i32::MAX,
        };
        assert_eq!(
            resolve_selection(&general, &[huge.clone(), huge]),
            Err(SelectionError::InvalidQuantity)
        );
    }

    #[test]
    fn test_resolve_rejects_bad_selections() {
        let ev = event(vec![("VIP", 5000, 10, 8)], 0);
        let vip = ev.ticket_categories[0].id;

        let over = resolve_selection(
            &ev,
            &[TicketSelection {
                category_id: Some(vip),
                quantity: 3,
            }],
        );
        assert_eq!(
            over,
            Err(SelectionError::ExceedsAvailability {
                name: "VIP".to_string(),
                remaining: 2
            })
        );

        let stranger = Uuid::new_v4();
        assert_eq!(
            resolve_selection(
                &ev,
                &[TicketSelection {
                    category_id: Some(stranger),
                    quantity: 1
                }]
            ),
            Err(SelectionError::UnknownCategory(stranger))
        );

        assert_eq!(
            resolve_selection(
                &ev,
                &[TicketSelection {
                    category_id: None,
                    quantity: 1
                }]
            ),
            Err(SelectionError::CategoryRequired)
        );

        assert_eq!(
            resolve_selection(
                &ev,
                &[TicketSelection {
                    category_id: Some(vip),
                    quantity: 0
                }]
            ),
            Err(SelectionError::InvalidQuantity)
        );
    }

    #[test]
    fn test_general_admission_uses_event_capacity() {
        let ev = event(Vec::new(), 800);
        let ok = resolve_selection(
            &ev,
            &[TicketSelection {
                category_id: None,
                quantity: 10,
            }],
        )
        .unwrap();
        assert_eq!(ok[0].category_name, GENERAL_ADMISSION);
        assert_eq!(ok[0].unit_price, Decimal::from(800));

        let too_many = resolve_selection(
            &ev,
            &[TicketSelection {
                category_id: None,
                quantity: 11,
            }],
        );
        assert!(matches!(
            too_many,
            Err(SelectionError::ExceedsAvailability { remaining: 10, .. })
        ));
    }
}
