use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, BookingError};
use crate::models::{Advisor, Appointment, DateRange, ProgramLevel, Slot};
use crate::services::slots::local_now;
use crate::state::AppState;

fn require_advisor(state: &AppState, advisor_id: &str) -> Result<Advisor, AppError> {
    state
        .directory
        .get_advisor(advisor_id)?
        .ok_or_else(|| BookingError::NotFound(format!("advisor {advisor_id}")).into())
}

#[derive(Deserialize)]
pub struct RangeQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl RangeQuery {
    /// Defaults to today through the booking horizon, and is clamped to it.
    fn resolve(&self, today: NaiveDate, horizon_days: i64) -> Result<DateRange, AppError> {
        let horizon_end = today + Duration::days(horizon_days);
        let from = self.from.unwrap_or(today).max(today);
        let to = self.to.unwrap_or(horizon_end).min(horizon_end);
        if to < from {
            return Err(AppError::BadRequest(format!(
                "empty date range {from} to {to}"
            )));
        }
        Ok(DateRange::new(from, to))
    }
}

// GET /api/advisors
#[derive(Deserialize)]
pub struct AdvisorsQuery {
    pub program: Option<String>,
}

pub async fn list_advisors(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AdvisorsQuery>,
) -> Result<Json<Vec<Advisor>>, AppError> {
    let levels = match params.program.as_deref() {
        Some(program) => vec![ProgramLevel::parse(program).ok_or_else(|| {
            AppError::BadRequest(format!("unknown program level: {program}"))
        })?],
        None => vec![ProgramLevel::Undergraduate, ProgramLevel::Graduate],
    };

    let mut advisors = Vec::new();
    for level in levels {
        advisors.extend(state.directory.list_advisors(level)?);
    }
    Ok(Json(advisors))
}

// GET /api/advisors/:id/slots
pub async fn advisor_slots(
    State(state): State<Arc<AppState>>,
    Path(advisor_id): Path<String>,
    Query(params): Query<RangeQuery>,
) -> Result<Json<Vec<Slot>>, AppError> {
    require_advisor(&state, &advisor_id)?;
    let range = params.resolve(local_now().date(), state.config.horizon_days)?;
    Ok(Json(state.slots.available_slots(&advisor_id, range)?))
}

// GET /api/advisors/:id/appointments
pub async fn advisor_appointments(
    State(state): State<Arc<AppState>>,
    Path(advisor_id): Path<String>,
    Query(params): Query<RangeQuery>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    require_advisor(&state, &advisor_id)?;
    let range = params.resolve(local_now().date(), state.config.horizon_days)?;
    Ok(Json(
        state.booking.list_advisor_appointments(&advisor_id, range)?,
    ))
}

// POST /api/advisors/:id/blocks
#[derive(Deserialize)]
pub struct BlockRequest {
    pub slot: NaiveDateTime,
    #[serde(default = "default_blocked")]
    pub blocked: bool,
}

fn default_blocked() -> bool {
    true
}

#[derive(Serialize)]
pub struct BlockResponse {
    advisor_id: String,
    slot: NaiveDateTime,
    blocked: bool,
}

pub async fn set_block(
    State(state): State<Arc<AppState>>,
    Path(advisor_id): Path<String>,
    Json(payload): Json<BlockRequest>,
) -> Result<Json<BlockResponse>, AppError> {
    if payload.blocked {
        state.booking.block_slot(&advisor_id, payload.slot)?;
    } else {
        state.booking.unblock_slot(&advisor_id, payload.slot)?;
    }

    Ok(Json(BlockResponse {
        advisor_id,
        slot: payload.slot,
        blocked: payload.blocked,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_range_defaults_to_horizon() {
        let q = RangeQuery { from: None, to: None };
        let range = q.resolve(date("2030-01-07"), 30).unwrap();
        assert_eq!(range, DateRange::new(date("2030-01-07"), date("2030-02-06")));
    }

    #[test]
    fn test_range_is_capped_at_horizon() {
        let q = RangeQuery {
            from: Some(date("2030-01-10")),
            to: Some(date("2030-12-31")),
        };
        let range = q.resolve(date("2030-01-07"), 7).unwrap();
        assert_eq!(range.end, date("2030-01-14"));
    }

    #[test]
    fn test_range_start_is_clamped_to_today() {
        let q = RangeQuery {
            from: Some(date("1000-01-01")),
            to: None,
        };
        let range = q.resolve(date("2030-01-07"), 30).unwrap();
        assert_eq!(range, DateRange::new(date("2030-01-07"), date("2030-02-06")));
        assert!(range.days().count() <= 31);
    }

    #[test]
    fn test_range_entirely_past_or_beyond_horizon_is_bad_request() {
        let past = RangeQuery {
            from: Some(date("2029-01-01")),
            to: Some(date("2029-01-31")),
        };
        assert!(matches!(
            past.resolve(date("2030-01-07"), 30),
            Err(AppError::BadRequest(_))
        ));
        let beyond = RangeQuery {
            from: Some(date("2031-01-01")),
            to: None,
        };
        assert!(matches!(
            beyond.resolve(date("2030-01-07"), 30),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_inverted_range_is_bad_request() {
        let q = RangeQuery {
            from: Some(date("2030-01-10")),
            to: Some(date("2030-01-08")),
        };
        assert!(matches!(
            q.resolve(date("2030-01-07"), 30),
            Err(AppError::BadRequest(_))
        ));
    }
}
