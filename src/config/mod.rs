use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

use crate::ingest::client::BROWSER_USER_AGENT;
use crate::ingest::IngestSettings;

const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub production: bool,
    pub admin_token: Option<String>,
    pub session_ttl_hours: i64,
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub source: String,
    pub site_name: String,
    pub source_url: String,
    pub user_agent: String,
    pub delay: Duration,
    pub timeout: Duration,
}

impl IngestConfig {
    pub fn settings(&self) -> IngestSettings {
        IngestSettings {
            source: self.source.clone(),
            site_name: self.site_name.clone(),
            base_url: self.source_url.clone(),
            fetch_delay: self.delay,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/eventbook".to_string()),
            database_max_connections: try_load("DATABASE_MAX_CONNECTIONS", 5),
            port: try_load("PORT", 3001),
            allowed_origins: parse_origins(
                &env::var("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| DEFAULT_ALLOWED_ORIGINS.to_string()),
            ),
            production: env::var("RUST_ENV")
                .map(|v| v.to_lowercase() == "production")
                .unwrap_or(false),
            admin_token: env::var("ADMIN_TOKEN").ok().filter(|t| !t.trim().is_empty()),
            session_ttl_hours: try_load("SESSION_TTL_HOURS", 168),
            ingest: IngestConfig {
                source: "ticketwala".to_string(),
                site_name: "Ticketwala".to_string(),
                source_url: env::var("INGEST_SOURCE_URL")
                    .unwrap_or_else(|_| "https://ticketwala.pk".to_string()),
                user_agent: env::var("INGEST_USER_AGENT")
                    .unwrap_or_else(|_| BROWSER_USER_AGENT.to_string()),
                delay: Duration::from_millis(try_load("INGEST_DELAY_MS", 500)),
                timeout: Duration::from_secs(try_load("INGEST_TIMEOUT_SECS", 20)),
            },
        }
    }
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => parse_or(key, &raw, default),
        Err(_) => default,
    }
}

fn parse_or<T>(key: &str, raw: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    raw.trim().parse().unwrap_or_else(|e| {
        warn!("Invalid value '{raw}' for {key} ({e}), using default {default}");
        default
    })
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}
