use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::NaiveDateTime;

use crate::models::calendar::format_slot;
use crate::models::AppointmentStatus;

/// Failures of the booking transaction manager.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("the slot at {} is no longer available, please pick another time", format_slot(.0))]
    SlotUnavailable(NaiveDateTime),

    #[error("{} is in the past, please pick a future time", format_slot(.0))]
    PastDateTime(NaiveDateTime),

    #[error("you already have a {status} appointment on {}, please pick a different time", format_slot(.slot_datetime))]
    DuplicateBooking {
        appointment_id: String,
        slot_datetime: NaiveDateTime,
        status: AppointmentStatus,
    },

    #[error("{} is outside advising hours ({hours})", format_slot(.slot_datetime))]
    OutsideWorkingHours {
        slot_datetime: NaiveDateTime,
        hours: String,
    },

    #[error("cannot {action} an appointment that is {status}")]
    InvalidTransition {
        action: &'static str,
        status: AppointmentStatus,
    },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for BookingError {
    fn from(e: rusqlite::Error) -> Self {
        BookingError::Storage(e.into())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Booking(#[from] BookingError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Booking(BookingError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Booking(BookingError::SlotUnavailable(_))
            | AppError::Booking(BookingError::DuplicateBooking { .. })
            | AppError::Booking(BookingError::InvalidTransition { .. }) => StatusCode::CONFLICT,
            AppError::Booking(BookingError::PastDateTime(_))
            | AppError::Booking(BookingError::OutsideWorkingHours { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Booking(BookingError::Storage(_)) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
