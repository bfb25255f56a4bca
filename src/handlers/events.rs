use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use crate::db;
use crate::models::booking::QuoteRequest;
use crate::models::event::EventFilter;
use crate::pricing::{quote_event, resolve_selection};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

pub async fn list_events(
    State(state): State<AppState>,
    Query(filter): Query<EventFilter>,
) -> Result<Response, AppError> {
    let events = db::events::list_upcoming(&state.pool, &filter, Utc::now()).await?;
    Ok(success(events, "Events retrieved"))
}

pub async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let event = db::events::find_event(&state.pool, event_id, Utc::now())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event '{event_id}' was not found")))?;
    Ok(success(event, "Event retrieved"))
}

/// Prices a selection without reserving anything.
pub async fn quote(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Json(body): Json<QuoteRequest>,
) -> Result<Response, AppError> {
    let now = Utc::now();
    let event = db::events::find_event(&state.pool, event_id, now)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event '{event_id}' was not found")))?;

    let lines = resolve_selection(&event, &body.items)?;
    Ok(success(quote_event(&event, &lines, now), "Price calculated"))
}
