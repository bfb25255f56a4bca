//! Listing ingestion: reconciles one external site's events into the events table.
//!
//! A run sweeps expired rows from the source, discovers detail links on the
//! site's homepage, skips listings already stored under the same
//! `(source, external_id)`, scrapes the rest one at a time with a fixed pause
//! between fetches and inserts what is still upcoming in one write.
//!
//! Re-running is safe: already stored listings are skipped, and a run that
//! dies halfway leaves the remainder for the next one.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod client;
pub mod extract;

use crate::pricing::MAX_UNIT_PRICE;

pub use client::HttpFetcher;

pub const DEFAULT_CAPACITY: i32 = 500;
pub const DEFAULT_CITY: &str = "Karachi";
pub const DEFAULT_VENUE: &str = "Venue TBA";
const DEFAULT_LEAD_DAYS: i64 = 7;
const DEFAULT_DURATION_HOURS: i64 = 3;
/// Listings carry no start time; 14:00 UTC is 7pm in Pakistan.
const DEFAULT_START_TIME_UTC: (u32, u32) = (14, 0);

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Could not extract {field} from {url}")]
    Extract { field: &'static str, url: String },
}

/// Fetches a page's markup.
pub trait PageFetcher {
    fn fetch_page(&self, url: &str) -> impl Future<Output = Result<String, IngestError>> + Send;
}

/// Persistence the ingestion run needs.
pub trait ListingStore {
    /// Deletes rows of `source` that started before `now`; returns how many.
    fn delete_expired(
        &self,
        source: &str,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, IngestError>> + Send;

    fn listing_exists(
        &self,
        source: &str,
        external_id: &str,
    ) -> impl Future<Output = Result<bool, IngestError>> + Send;

    fn insert_listings(
        &self,
        listings: &[ScrapedEvent],
    ) -> impl Future<Output = Result<u64, IngestError>> + Send;
}

/// An event scraped from the source, ready to insert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScrapedEvent {
    pub source: String,
    pub external_id: String,
    pub source_url: String,
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub city: String,
    pub venue: String,
    pub price: Decimal,
    pub category: String,
    pub total_tickets: i32,
    pub tickets_sold: i32,
}

#[derive(Debug, Clone)]
pub struct IngestSettings {
    /// Value stored in `events.source`.
    pub source: String,
    /// Site name as it appears in page titles.
    pub site_name: String,
    pub base_url: String,
    pub fetch_delay: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub expired_removed: u64,
    pub discovered: usize,
    pub skipped_existing: usize,
    pub skipped_past: usize,
    pub failed: usize,
    pub inserted: u64,
}

/// Prices the money columns cannot hold are dropped rather than failing the bulk insert.
fn listing_price(html: &str, url: &str) -> Decimal {
    match extract::extract_price(html) {
        Some(price) if price <= MAX_UNIT_PRICE => price,
        Some(price) => {
            warn!(url, %price, "Ignoring out of range price");
            Decimal::ZERO
        }
        None => Decimal::ZERO,
    }
}

/// Builds the insertable record for one detail page.
pub fn scrape_listing(
    settings: &IngestSettings,
    url: &str,
    external_id: &str,
    html: &str,
    now: DateTime<Utc>,
) -> Result<ScrapedEvent, IngestError> {
    let name = extract::extract_name(html, &settings.site_name).ok_or_else(|| {
        IngestError::Extract {
            field: "name",
            url: url.to_string(),
        }
    })?;

    let (hour, minute) = DEFAULT_START_TIME_UTC;
    let start_time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default();
    let start_date = extract::extract_start_date(html, now.date_naive())
        .map(|date| date.and_time(start_time).and_utc())
        .unwrap_or_else(|| now + ChronoDuration::days(DEFAULT_LEAD_DAYS));

    let category = extract::classify_category(&name, html).to_string();

    Ok(ScrapedEvent {
        source: settings.source.clone(),
        external_id: external_id.to_string(),
        source_url: url.to_string(),
        description: extract::extract_description(html),
        image_url: extract::extract_image(html, &settings.base_url),
        start_date,
        end_date: start_date + ChronoDuration::hours(DEFAULT_DURATION_HOURS),
        city: extract::extract_city(html).unwrap_or(DEFAULT_CITY).to_string(),
        venue: extract::extract_venue(html).unwrap_or_else(|| DEFAULT_VENUE.to_string()),
        price: listing_price(html, url),
        category,
        total_tickets: DEFAULT_CAPACITY,
        tickets_sold: 0,
        name,
    })
}

pub struct Ingester<F, S> {
    fetcher: F,
    store: S,
    settings: IngestSettings,
}

impl<F, S> Ingester<F, S>
where
    F: PageFetcher,
    S: ListingStore,
{
    pub fn new(fetcher: F, store: S, settings: IngestSettings) -> Self {
        Self {
            fetcher,
            store,
            settings,
        }
    }

    pub async fn run(&self) -> Result<IngestReport, IngestError> {
        self.run_at(Utc::now()).await
    }

    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<IngestReport, IngestError> {
        let source = self.settings.source.as_str();
        let mut report = IngestReport {
            expired_removed: self.store.delete_expired(source, now).await?,
            ..Default::default()
        };
        info!(source, removed = report.expired_removed, "Expired listings removed");

        let homepage = self.fetcher.fetch_page(&self.settings.base_url).await?;
        let links = extract::discover_event_links(&homepage, &self.settings.base_url);
        report.discovered = links.len();
        info!(source, discovered = links.len(), "Event links discovered");

        let mut queued = Vec::new();
        let mut fetched_any = false;

        for url in &links {
            let Some(external_id) = extract::external_id(url) else {
                warn!(url = %url, "Skipping link without an identifier");
                report.failed += 1;
                continue;
            };

            if self.store.listing_exists(source, &external_id).await? {
                debug!(external_id = %external_id, "Listing already stored");
                report.skipped_existing += 1;
                continue;
            }

            if fetched_any && !self.settings.fetch_delay.is_zero() {
                tokio::time::sleep(self.settings.fetch_delay).await;
            }
            fetched_any = true;

            let scraped = match self.fetcher.fetch_page(url).await {
                Ok(html) => scrape_listing(&self.settings, url, &external_id, &html, now),
                Err(e) => Err(e),
            };

            match scraped {
                Ok(listing) if listing.start_date > now => {
                    if !queued.iter().any(|q: &ScrapedEvent| q.external_id == listing.external_id) {
                        queued.push(listing);
                    }
                }
                Ok(listing) => {
                    debug!(external_id = %external_id, start = %listing.start_date, "Listing already started");
                    report.skipped_past += 1;
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Failed to scrape listing, skipping");
                    report.failed += 1;
                }
            }
        }

        if !queued.is_empty() {
            report.inserted = self.store.insert_listings(&queued).await?;
        }

        info!(
            source,
            inserted = report.inserted,
            skipped_existing = report.skipped_existing,
            failed = report.failed,
            "Ingestion run finished"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const BASE: &str = "https://ticketwala.pk";

    struct FakeFetcher {
        pages: HashMap<String, String>,
        requested: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        fn new(pages: &[(&str, &str)]) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|(url, html)| (url.to_string(), html.to_string()))
                    .collect(),
                requested: Mutex::new(Vec::new()),
            }
        }

        fn requested(&self) -> Vec<String> {
            self.requested.lock().unwrap().clone()
        }
    }

    impl PageFetcher for &FakeFetcher {
        async fn fetch_page(&self, url: &str) -> Result<String, IngestError> {
            self.requested.lock().unwrap().push(url.to_string());
            self.pages.get(url).cloned().ok_or_else(|| IngestError::Extract {
                field: "page",
                url: url.to_string(),
            })
        }
    }

    #[derive(Debug, Clone)]
    struct StoredRow {
        source: Option<String>,
        external_id: Option<String>,
        start_date: DateTime<Utc>,
    }

    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<Vec<StoredRow>>,
    }

    impl MemoryStore {
        fn rows(&self) -> Vec<StoredRow> {
            self.rows.lock().unwrap().clone()
        }
    }

    impl ListingStore for &MemoryStore {
        async fn delete_expired(&self, source: &str, now: DateTime<Utc>) -> Result<u64, IngestError> {
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|row| !(row.source.as_deref() == Some(source) && row.start_date < now));
            Ok((before - rows.len()) as u64)
        }

        async fn listing_exists(&self, source: &str, external_id: &str) -> Result<bool, IngestError> {
            Ok(self.rows.lock().unwrap().iter().any(|row| {
                row.source.as_deref() == Some(source)
                    && row.external_id.as_deref() == Some(external_id)
            }))
        }

        async fn insert_listings(&self, listings: &[ScrapedEvent]) -> Result<u64, IngestError> {
            let mut rows = self.rows.lock().unwrap();
            for listing in listings {
                rows.push(StoredRow {
                    source: Some(listing.source.clone()),
                    external_id: Some(listing.external_id.clone()),
                    start_date: listing.start_date,
                });
            }
            Ok(listings.len() as u64)
        }
    }

    fn settings() -> IngestSettings {
        IngestSettings {
            source: "ticketwala".to_string(),
            site_name: "Ticketwala".to_string(),
            base_url: BASE.to_string(),
            fetch_delay: Duration::ZERO,
        }
    }

    fn now() -> DateTime<Utc> {
        "2026-03-01T10:00:00Z".parse().unwrap()
    }

    const HOMEPAGE: &str = r#"
        <a href="/events/sufi-night">Sufi Night</a>
        <a href="/events/comedy-jam">Comedy Jam</a>
        <a href="/events/sufi-night">Sufi Night (again)</a>
        <a href="/events/old-show">Old Show</a>
    "#;

    const SUFI: &str = r#"<html><head><title>Sufi Night | Ticketwala</title>
        <meta property="og:image" content="https://cdn.ticketwala.pk/sufi.jpg"></head>
        <body><h1>Sufi Night</h1><p>14 March 2026</p><p>Venue: Alhamra Arts Council</p>
        <p>Lahore</p><p>Tickets Rs. 3,000</p><p>An evening of qawwali music</p></body></html>"#;

    const COMEDY: &str = r#"<html><head><title>Comedy Jam - Ticketwala</title></head>
        <body><p>Karachi stand-up comedy, date to be announced</p></body></html>"#;

    const OLD_SHOW: &str = r#"<h1>Old Show</h1><p>Held on 2026-02-01 and 2025-12-24</p>"#;

    fn site() -> FakeFetcher {
        FakeFetcher::new(&[
            (BASE, HOMEPAGE),
            ("https://ticketwala.pk/events/sufi-night", SUFI),
            ("https://ticketwala.pk/events/comedy-jam", COMEDY),
            ("https://ticketwala.pk/events/old-show", OLD_SHOW),
        ])
    }

    #[test]
    fn test_scrape_listing_fields() {
        let listing = scrape_listing(
            &settings(),
            "https://ticketwala.pk/events/sufi-night",
            "sufi-night",
            SUFI,
            now(),
        )
        .unwrap();

        assert_eq!(listing.name, "Sufi Night");
        assert_eq!(listing.city, "Lahore");
        assert_eq!(listing.venue, "Alhamra Arts Council");
        assert_eq!(listing.price, Decimal::from(3000));
        assert_eq!(listing.category, "music");
        assert_eq!(listing.image_url.as_deref(), Some("https://cdn.ticketwala.pk/sufi.jpg"));
        assert_eq!(
            listing.start_date,
            "2026-03-14T14:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert_eq!(listing.total_tickets, DEFAULT_CAPACITY);
        assert_eq!(listing.tickets_sold, 0);
    }

    #[test]
    fn test_scrape_listing_defaults() {
        let listing = scrape_listing(
            &settings(),
            "https://ticketwala.pk/events/comedy-jam",
            "comedy-jam",
            COMEDY,
            now(),
        )
        .unwrap();

        assert_eq!(listing.name, "Comedy Jam");
        assert_eq!(listing.start_date, now() + ChronoDuration::days(7));
        assert_eq!(listing.city, "Karachi");
        assert_eq!(listing.venue, DEFAULT_VENUE);
        assert_eq!(listing.price, Decimal::ZERO);
        assert_eq!(listing.category, "comedy");
        assert_eq!(listing.image_url, None);
    }

    #[test]
    fn test_scrape_listing_ignores_oversized_price() {
        let html = "<h1>Mega Gala</h1><p>Tickets Rs 10,000,000,000,000</p>";
        let listing = scrape_listing(&settings(), "u", "mega-gala", html, now()).unwrap();
        assert_eq!(listing.price, Decimal::ZERO);

        let html = "<h1>Mega Gala</h1><p>Tickets Rs 9,999,999,999.99</p>";
        let listing = scrape_listing(&settings(), "u", "mega-gala", html, now()).unwrap();
        assert_eq!(listing.price, MAX_UNIT_PRICE);
    }

    #[test]
    fn test_scrape_listing_without_name_fails() {
        let result = scrape_listing(&settings(), "u", "u", "<p>nothing</p>", now());
        assert!(matches!(result, Err(IngestError::Extract { field: "name", .. })));
    }

    #[tokio::test]
    async fn test_run_inserts_new_listings() {
        let fetcher = site();
        let store = MemoryStore::default();
        let ingester = Ingester::new(&fetcher, &store, settings());

        let report = ingester.run_at(now()).await.unwrap();

        assert_eq!(report.discovered, 3);
        // old-show has no future date, so it defaults to a week out.
        assert_eq!(report.inserted, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(store.rows().len(), 3);
    }

    #[tokio::test]
    async fn test_second_run_inserts_nothing() {
        let fetcher = site();
        let store = MemoryStore::default();
        let ingester = Ingester::new(&fetcher, &store, settings());

        ingester.run_at(now()).await.unwrap();
        let fetched_first = fetcher.requested().len();

        let second = ingester.run_at(now()).await.unwrap();

        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped_existing, 3);
        assert_eq!(store.rows().len(), 3);
        // Only the homepage is fetched again.
        assert_eq!(fetcher.requested().len(), fetched_first + 1);
    }

    #[tokio::test]
    async fn test_sweep_only_touches_own_source() {
        let fetcher = FakeFetcher::new(&[(BASE, "<p>no events today</p>")]);
        let store = MemoryStore::default();
        let past = now() - ChronoDuration::days(2);
        store.rows.lock().unwrap().extend([
            StoredRow {
                source: Some("ticketwala".to_string()),
                external_id: Some("finished".to_string()),
                start_date: past,
            },
            StoredRow {
                source: None,
                external_id: None,
                start_date: past,
            },
            StoredRow {
                source: Some("ticketwala".to_string()),
                external_id: Some("upcoming".to_string()),
                start_date: now() + ChronoDuration::days(2),
            },
        ]);

        let report = Ingester::new(&fetcher, &store, settings())
            .run_at(now())
            .await
            .unwrap();

        assert_eq!(report.expired_removed, 1);
        assert_eq!(report.discovered, 0);
        assert_eq!(report.inserted, 0);
        let remaining: Vec<_> = store
            .rows()
            .into_iter()
            .map(|row| row.external_id)
            .collect();
        assert_eq!(remaining, vec![None, Some("upcoming".to_string())]);
    }

    #[tokio::test]
    async fn test_failed_detail_page_is_skipped() {
        let fetcher = FakeFetcher::new(&[
            (BASE, HOMEPAGE),
            ("https://ticketwala.pk/events/sufi-night", SUFI),
        ]);
        let store = MemoryStore::default();

        let report = Ingester::new(&fetcher, &store, settings())
            .run_at(now())
            .await
            .unwrap();

        assert_eq!(report.failed, 2);
        assert_eq!(report.inserted, 1);
    }

    #[tokio::test]
    async fn test_pauses_between_detail_fetches() {
        let delay = Duration::from_millis(40);
        let fetcher = site();
        let store = MemoryStore::default();
        let ingester = Ingester::new(
            &fetcher,
            &store,
            IngestSettings {
                fetch_delay: delay,
                ..settings()
            },
        );

        let started = tokio::time::Instant::now();
        let report = ingester.run_at(now()).await.unwrap();

        assert_eq!(report.inserted, 3);
        // Three detail fetches, no pause before the first.
        assert!(started.elapsed() >= delay * 2);
    }

    #[tokio::test]
    async fn test_stored_listings_add_no_pause() {
        let fetcher = site();
        let store = MemoryStore::default();
        for external_id in ["sufi-night", "comedy-jam"] {
            store.rows.lock().unwrap().push(StoredRow {
                source: Some("ticketwala".to_string()),
                external_id: Some(external_id.to_string()),
                start_date: now() + ChronoDuration::days(5),
            });
        }
        let ingester = Ingester::new(
            &fetcher,
            &store,
            IngestSettings {
                fetch_delay: Duration::from_secs(5),
                ..settings()
            },
        );

        let started = tokio::time::Instant::now();
        let report = ingester.run_at(now()).await.unwrap();

        assert_eq!(report.skipped_existing, 2);
        assert_eq!(report.inserted, 1);
        // The only fetched detail page is the first one, so nothing sleeps.
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_homepage_failure_aborts_run() {
        let fetcher = FakeFetcher::new(&[]);
        let store = MemoryStore::default();

        let result = Ingester::new(&fetcher, &store, settings())
            .run_at(now())
            .await;

        assert!(result.is_err());
        assert!(store.rows().is_empty());
    }
}
