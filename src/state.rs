use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::ingest::HttpFetcher;

/// Shared by every handler. Sessions live in the database, not here.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub fetcher: HttpFetcher,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config, fetcher: HttpFetcher) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            fetcher,
        }
    }
}
