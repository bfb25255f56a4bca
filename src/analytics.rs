//! Vendor sales summaries.
//!
//! Revenue counts paid bookings only. Open reservations are reported per event
//! so a vendor can see pending demand; lapsed ones count as cancelled.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::db::bookings::SaleRow;
use crate::models::booking::BookingStatus;
use crate::models::event::Event;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventSales {
    pub event_id: Uuid,
    pub name: String,
    pub start_date: DateTime<Utc>,
    pub capacity: i32,
    pub tickets_sold: i64,
    pub revenue: Decimal,
    pub platform_commission: Decimal,
    pub paid_bookings: usize,
    pub open_reservations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySales {
    pub date: NaiveDate,
    pub tickets: i64,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VendorAnalytics {
    pub total_events: usize,
    pub tickets_sold: i64,
    pub gross_revenue: Decimal,
    pub platform_commission: Decimal,
    pub net_payout: Decimal,
    pub events: Vec<EventSales>,
    pub daily: Vec<DailySales>,
}

pub fn summarize(events: &[Event], sales: &[SaleRow], now: DateTime<Utc>) -> VendorAnalytics {
    let mut per_event: Vec<EventSales> = events
        .iter()
        .map(|event| EventSales {
            event_id: event.id,
            name: event.name.clone(),
            start_date: event.start_date,
            capacity: event.total_tickets,
            tickets_sold: 0,
            revenue: Decimal::ZERO,
            platform_commission: Decimal::ZERO,
            paid_bookings: 0,
            open_reservations: 0,
        })
        .collect();
    let mut daily: BTreeMap<NaiveDate, DailySales> = BTreeMap::new();

    for sale in sales {
        let Some(entry) = per_event.iter_mut().find(|e| e.event_id == sale.event_id) else {
            continue;
        };

        let expired = sale.status == BookingStatus::Reserved
            && sale.expires_at.map(|at| now > at).unwrap_or(false);

        match sale.status {
            BookingStatus::Paid => {
                entry.tickets_sold += sale.tickets;
                entry.revenue += sale.total_amount;
                entry.platform_commission += sale.platform_commission;
                entry.paid_bookings += 1;

                // Revenue lands on the day payment was recorded.
                let date = sale.paid_at.unwrap_or(sale.created_at).date_naive();
                let day = daily.entry(date).or_insert(DailySales {
                    date,
                    tickets: 0,
                    revenue: Decimal::ZERO,
                });
                day.tickets += sale.tickets;
                day.revenue += sale.total_amount;
            }
            BookingStatus::Reserved if !expired => entry.open_reservations += 1,
            _ => {}
        }
    }

    let tickets_sold = per_event.iter().map(|e| e.tickets_sold).sum();
    let gross_revenue: Decimal = per_event.iter().map(|e| e.revenue).sum();
    let platform_commission: Decimal = per_event.iter().map(|e| e.platform_commission).sum();

    VendorAnalytics {
        total_events: per_event.len(),
        tickets_sold,
        gross_revenue,
        platform_commission,
        net_payout: gross_revenue - platform_commission,
        events: per_event,
        daily: daily.into_values().collect(),
    }
}
