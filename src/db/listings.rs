use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::ingest::{IngestError, ListingStore, ScrapedEvent};

/// Stores ingested listings as rows of the shared `events` table.
#[derive(Debug, Clone)]
pub struct PgListingStore {
    pool: PgPool,
}

impl PgListingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl ListingStore for PgListingStore {
    async fn delete_expired(&self, source: &str, now: DateTime<Utc>) -> Result<u64, IngestError> {
        let result = sqlx::query("DELETE FROM events WHERE source = $1 AND start_date < $2")
            .bind(source)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn listing_exists(&self, source: &str, external_id: &str) -> Result<bool, IngestError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM events WHERE source = $1 AND external_id = $2)",
        )
        .bind(source)
        .bind(external_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Single multi-row insert. A row another run inserted in the meantime is skipped.
    async fn insert_listings(&self, listings: &[ScrapedEvent]) -> Result<u64, IngestError> {
        if listings.is_empty() {
            return Ok(0);
        }

        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO events (id, name, description, start_date, end_date, category, city, \
             venue, image_url, ticket_price, total_tickets, tickets_sold, source, external_id) ",
        );
        builder.push_values(listings, |mut row, listing| {
            row.push_bind(Uuid::new_v4())
                .push_bind(listing.name.clone())
                .push_bind(
                    listing
                        .description
                        .clone()
                        .or_else(|| Some(format!("Imported from {}", listing.source_url))),
                )
                .push_bind(listing.start_date)
                .push_bind(listing.end_date)
                .push_bind(listing.category.clone())
                .push_bind(listing.city.clone())
                .push_bind(listing.venue.clone())
                .push_bind(listing.image_url.clone())
                .push_bind(listing.price)
                .push_bind(listing.total_tickets)
                .push_bind(listing.tickets_sold)
                .push_bind(listing.source.clone())
                .push_bind(listing.external_id.clone());
        });
        builder.push(" ON CONFLICT (source, external_id) DO NOTHING");

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
