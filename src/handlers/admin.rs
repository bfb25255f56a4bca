use axum::extract::State;
use axum::response::Response;
use tracing::info;

use crate::auth::AdminAccess;
use crate::db::PgListingStore;
use crate::ingest::Ingester;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

/// Runs one listing ingestion pass and reports what it did.
pub async fn run_ingest(
    _admin: AdminAccess,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    let ingester = Ingester::new(
        state.fetcher.clone(),
        PgListingStore::new(state.pool.clone()),
        state.config.ingest.settings(),
    );

    let report = ingester.run().await?;
    info!(inserted = report.inserted, failed = report.failed, "Ingestion finished");

    Ok(success(report, "Ingestion completed"))
}
