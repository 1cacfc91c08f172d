pub mod advisors;
pub mod appointments;
pub mod booking;
pub mod calendar;
pub mod health;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/booking/start", post(booking::start))
        .route("/api/booking/message", post(booking::message))
        .route("/api/advisors", get(advisors::list_advisors))
        .route("/api/advisors/:id/slots", get(advisors::advisor_slots))
        .route(
            "/api/advisors/:id/appointments",
            get(advisors::advisor_appointments),
        )
        .route("/api/advisors/:id/blocks", post(advisors::set_block))
        .route(
            "/api/students/:id/appointments",
            get(appointments::student_appointments),
        )
        .route(
            "/api/appointments/:id/cancel",
            post(appointments::cancel_appointment),
        )
        .route(
            "/api/appointments/:id/confirm",
            post(appointments::confirm_appointment),
        )
        .route("/calendar/:appointment_id", get(calendar::download_ics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
