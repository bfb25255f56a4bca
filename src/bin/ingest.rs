//! One listing ingestion pass, for cron.

use std::process::ExitCode;

use dotenvy::dotenv;
use tracing_subscriber::EnvFilter;

use eventbook_server::config::Config;
use eventbook_server::db::{self, PgListingStore};
use eventbook_server::ingest::{HttpFetcher, IngestError, IngestReport, Ingester};

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("eventbook_server=info,ingest=info")),
        )
        .init();

    match run(Config::from_env()).await {
        Ok(report) => {
            tracing::info!(
                expired_removed = report.expired_removed,
                discovered = report.discovered,
                skipped_existing = report.skipped_existing,
                skipped_past = report.skipped_past,
                failed = report.failed,
                inserted = report.inserted,
                "Ingestion finished"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Ingestion failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<IngestReport, IngestError> {
    let pool = db::connect(&config).await?;
    db::migrate(&pool)
        .await
        .map_err(|e| IngestError::Database(e.into()))?;

    let fetcher = HttpFetcher::new(&config.ingest.user_agent, config.ingest.timeout)?;
    let store = PgListingStore::new(pool);

    Ingester::new(fetcher, store, config.ingest.settings())
        .run()
        .await
}
