use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};

use crate::errors::{AppError, BookingError};
use crate::services::calendar::generate_ics;
use crate::state::AppState;

// GET /calendar/:appointment_id
pub async fn download_ics(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> Result<Response, AppError> {
    let appointment_id = raw_id.strip_suffix(".ics").unwrap_or(&raw_id);

    let appointment = state.booking.get_appointment(appointment_id)?;
    let advisor = state
        .directory
        .get_advisor(&appointment.advisor_id)?
        .ok_or_else(|| BookingError::NotFound(format!("advisor {}", appointment.advisor_id)))?;

    let ics = generate_ics(&appointment, &advisor);
    let filename = format!("appointment-{appointment_id}.ics");

    Ok((
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        ics,
    )
        .into_response())
}
