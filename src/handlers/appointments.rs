use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, BookingError};
use crate::models::Appointment;
use crate::services::booking::CancelOutcome;
use crate::state::AppState;

// GET /api/students/:id/appointments
#[derive(Deserialize)]
pub struct StudentAppointmentsQuery {
    #[serde(default)]
    pub include_cancelled: bool,
}

pub async fn student_appointments(
    State(state): State<Arc<AppState>>,
    Path(student_id): Path<String>,
    Query(params): Query<StudentAppointmentsQuery>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    if state.directory.get_student(&student_id)?.is_none() {
        return Err(BookingError::NotFound(format!("student {student_id}")).into());
    }
    Ok(Json(
        state
            .booking
            .list_student_appointments(&student_id, params.include_cancelled)?,
    ))
}

// POST /api/appointments/:id/cancel
#[derive(Deserialize)]
pub struct CancelRequest {
    pub student_id: String,
}

#[derive(Serialize)]
pub struct CancelResponse {
    appointment: Appointment,
    already_cancelled: bool,
}

pub async fn cancel_appointment(
    State(state): State<Arc<AppState>>,
    Path(appointment_id): Path<String>,
    Json(payload): Json<CancelRequest>,
) -> Result<Json<CancelResponse>, AppError> {
    let outcome = state.booking.cancel(&appointment_id, &payload.student_id)?;
    let already_cancelled = matches!(outcome, CancelOutcome::AlreadyCancelled(_));
    Ok(Json(CancelResponse {
        appointment: outcome.appointment().clone(),
        already_cancelled,
    }))
}

// POST /api/appointments/:id/confirm
pub async fn confirm_appointment(
    State(state): State<Arc<AppState>>,
    Path(appointment_id): Path<String>,
) -> Result<Json<Appointment>, AppError> {
    Ok(Json(state.booking.confirm(&appointment_id)?))
}
