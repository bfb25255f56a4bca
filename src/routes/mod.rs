use axum::routing::{get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer};
use crate::handlers::{admin, bookings, events, health_check, vendor_events, vendors};
use crate::state::AppState;

pub fn create_routes(state: AppState) -> Router {
    let public = Router::new()
        .route("/events", get(events::list_events))
        .route("/events/:id", get(events::get_event))
        .route("/events/:id/quote", post(events::quote))
        .route("/events/:id/bookings", post(bookings::create_booking))
        .route("/bookings/:id", get(bookings::get_booking))
        .route("/bookings/:id/cancel", post(bookings::cancel_booking));

    let vendor = Router::new()
        .route("/vendors/register", post(vendors::register))
        .route("/vendors/login", post(vendors::login))
        .route("/vendors/logout", post(vendors::logout))
        .route("/vendors/me", get(vendors::me))
        .route(
            "/vendor/events",
            get(vendor_events::list_my_events).post(vendor_events::create_event),
        )
        .route(
            "/vendor/events/:id/promotions",
            put(vendor_events::update_promotions),
        )
        .route("/vendor/events/:id/bookings", get(vendor_events::event_bookings))
        .route(
            "/vendor/bookings/:id/confirm-payment",
            post(vendor_events::confirm_payment),
        )
        .route("/vendor/analytics", get(vendor_events::analytics));

    let operator = Router::new().route("/admin/ingest", post(admin::run_ingest));

    let security = create_security_headers_layer(&state.config);
    let cors = create_cors_layer(&state.config);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", public.merge(vendor).merge(operator))
        .layer(TraceLayer::new_for_http())
        .layer(security)
        .layer(cors)
        .with_state(state)
}
