pub mod analytics;
pub mod auth;
pub mod config;
pub mod db;
pub mod handlers;
pub mod ingest;
pub mod models;
pub mod pricing;
pub mod routes;
pub mod state;
pub mod utils;
