use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use rusqlite::ErrorCode;

use crate::db::{queries, Database};
use crate::errors::BookingError;
use crate::models::calendar::normalize;
use crate::models::{Appointment, AppointmentStatus, BlockStatus, DateRange, WorkingHours};
use crate::services::slots::{self, local_now};

/// Result of a cancel request. Cancelling twice is reported, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum CancelOutcome {
    Cancelled(Appointment),
    AlreadyCancelled(Appointment),
}

impl CancelOutcome {
    pub fn appointment(&self) -> &Appointment {
        match self {
            CancelOutcome::Cancelled(a) | CancelOutcome::AlreadyCancelled(a) => a,
        }
    }
}

/// The only writer of appointments and calendar blocks. Every write runs in
/// one `BEGIN IMMEDIATE` transaction that re-checks availability first.
pub struct BookingManager {
    db: Arc<Database>,
    hours: WorkingHours,
}

impl BookingManager {
    pub fn new(db: Arc<Database>, hours: WorkingHours) -> Self {
        Self { db, hours }
    }

    pub fn book(
        &self,
        student_id: &str,
        advisor_id: &str,
        slot: NaiveDateTime,
        reason: Option<&str>,
    ) -> Result<Appointment, BookingError> {
        self.book_at(student_id, advisor_id, slot, reason, local_now())
    }

    pub(crate) fn book_at(
        &self,
        student_id: &str,
        advisor_id: &str,
        slot: NaiveDateTime,
        reason: Option<&str>,
        now: NaiveDateTime,
    ) -> Result<Appointment, BookingError> {
        let slot = normalize(slot);

        let appointment = self.db.transaction(|tx| -> Result<Appointment, BookingError> {
            if queries::get_student(tx, student_id)?.is_none() {
                return Err(BookingError::NotFound(format!("student {student_id}")));
            }
            if queries::get_advisor(tx, advisor_id)?.is_none() {
                return Err(BookingError::NotFound(format!("advisor {advisor_id}")));
            }
            if slot < now {
                return Err(BookingError::PastDateTime(slot));
            }
            if !self.hours.contains(&slot) {
                return Err(BookingError::OutsideWorkingHours {
                    slot_datetime: slot,
                    hours: self.hours.to_human_readable(),
                });
            }
            if let Some(existing) = queries::find_active_for_student(tx, student_id, &slot)? {
                return Err(BookingError::DuplicateBooking {
                    appointment_id: existing.appointment_id,
                    slot_datetime: existing.slot_datetime,
                    status: existing.status,
                });
            }
            if !slots::is_available_in(tx, advisor_id, slot, now)? {
                return Err(BookingError::SlotUnavailable(slot));
            }

            let created = Utc::now().naive_utc();
            let appointment = Appointment {
                appointment_id: uuid::Uuid::new_v4().to_string(),
                student_id: student_id.to_string(),
                advisor_id: advisor_id.to_string(),
                slot_datetime: slot,
                status: AppointmentStatus::Booked,
                reason: reason
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string),
                notification_sent: false,
                created_at: created,
                updated_at: created,
            };

            queries::create_appointment(tx, &appointment).map_err(|e| match e.sqlite_error_code() {
                Some(ErrorCode::ConstraintViolation) => BookingError::SlotUnavailable(slot),
                _ => BookingError::from(e),
            })?;
            slots::mark_unavailable(tx, advisor_id, slot, BlockStatus::Booked)?;

            Ok(appointment)
        })?;

        tracing::info!(
            appointment_id = %appointment.appointment_id,
            student_id,
            advisor_id,
            slot = %appointment.slot_datetime,
            "appointment booked"
        );
        Ok(appointment)
    }

    pub fn cancel(&self, appointment_id: &str, student_id: &str) -> Result<CancelOutcome, BookingError> {
        let outcome = self.db.transaction(|tx| -> Result<CancelOutcome, BookingError> {
            let appointment = queries::get_appointment(tx, appointment_id)?
                .filter(|a| a.student_id == student_id)
                .ok_or_else(|| BookingError::NotFound(format!("appointment {appointment_id}")))?;

            if !appointment.is_active() {
                return Ok(CancelOutcome::AlreadyCancelled(appointment));
            }

            queries::update_appointment_status(tx, appointment_id, AppointmentStatus::Cancelled)?;
            slots::mark_available(tx, &appointment.advisor_id, appointment.slot_datetime)?;

            Ok(CancelOutcome::Cancelled(Appointment {
                status: AppointmentStatus::Cancelled,
                updated_at: Utc::now().naive_utc(),
                ..appointment
            }))
        })?;

        match &outcome {
            CancelOutcome::Cancelled(a) => {
                tracing::info!(appointment_id, student_id, slot = %a.slot_datetime, "appointment cancelled")
            }
            CancelOutcome::AlreadyCancelled(_) => {
                tracing::info!(appointment_id, student_id, "appointment already cancelled")
            }
        }
        Ok(outcome)
    }

    /// `booked -> confirmed`. Confirming a confirmed appointment returns it unchanged.
    pub fn confirm(&self, appointment_id: &str) -> Result<Appointment, BookingError> {
        let appointment = self.db.transaction(|tx| -> Result<Appointment, BookingError> {
            let appointment = queries::get_appointment(tx, appointment_id)?
                .ok_or_else(|| BookingError::NotFound(format!("appointment {appointment_id}")))?;

            match appointment.status {
                AppointmentStatus::Confirmed => Ok(appointment),
                AppointmentStatus::Cancelled => Err(BookingError::InvalidTransition {
                    action: "confirm",
                    status: appointment.status,
                }),
                AppointmentStatus::Booked => {
                    queries::update_appointment_status(tx, appointment_id, AppointmentStatus::Confirmed)?;
                    Ok(Appointment {
                        status: AppointmentStatus::Confirmed,
                        updated_at: Utc::now().naive_utc(),
                        ..appointment
                    })
                }
            }
        })?;

        tracing::info!(appointment_id, "appointment confirmed");
        Ok(appointment)
    }

    /// Advisor-initiated unavailability. Refuses slots that hold a live appointment.
    pub fn block_slot(&self, advisor_id: &str, slot: NaiveDateTime) -> Result<(), BookingError> {
        let slot = normalize(slot);
        self.db.transaction(|tx| -> Result<(), BookingError> {
            if queries::get_advisor(tx, advisor_id)?.is_none() {
                return Err(BookingError::NotFound(format!("advisor {advisor_id}")));
            }
            if !self.hours.contains(&slot) {
                return Err(BookingError::OutsideWorkingHours {
                    slot_datetime: slot,
                    hours: self.hours.to_human_readable(),
                });
            }
            if queries::find_active_for_advisor(tx, advisor_id, &slot)?.is_some() {
                return Err(BookingError::SlotUnavailable(slot));
            }
            slots::mark_unavailable(tx, advisor_id, slot, BlockStatus::Blocked)?;
            Ok(())
        })?;

        tracing::info!(advisor_id, slot = %slot, "slot blocked");
        Ok(())
    }

    pub fn unblock_slot(&self, advisor_id: &str, slot: NaiveDateTime) -> Result<(), BookingError> {
        let slot = normalize(slot);
        self.db.transaction(|tx| -> Result<(), BookingError> {
            if queries::get_advisor(tx, advisor_id)?.is_none() {
                return Err(BookingError::NotFound(format!("advisor {advisor_id}")));
            }
            match queries::get_calendar_block(tx, advisor_id, &slot)? {
                Some(block) if block.status == BlockStatus::Blocked => {
                    slots::mark_available(tx, advisor_id, slot)?;
                }
                _ => {}
            }
            Ok(())
        })?;

        tracing::info!(advisor_id, slot = %slot, "slot unblocked");
        Ok(())
    }

    pub fn get_appointment(&self, appointment_id: &str) -> Result<Appointment, BookingError> {
        self.db
            .read(|conn| queries::get_appointment(conn, appointment_id))?
            .ok_or_else(|| BookingError::NotFound(format!("appointment {appointment_id}")))
    }

    pub fn list_student_appointments(
        &self,
        student_id: &str,
        include_cancelled: bool,
    ) -> Result<Vec<Appointment>, BookingError> {
        Ok(self.db.read(|conn| {
            queries::get_appointments_for_student(conn, student_id, include_cancelled)
        })?)
    }

    pub fn list_advisor_appointments(
        &self,
        advisor_id: &str,
        range: DateRange,
    ) -> Result<Vec<Appointment>, BookingError> {
        Ok(self.db.read(|conn| {
            queries::get_appointments_for_advisor(
                conn,
                advisor_id,
                &range.start_datetime(),
                &range.end_datetime(),
            )
        })?)
    }

    pub fn mark_notification_sent(&self, appointment_id: &str) -> Result<(), BookingError> {
        let updated = self.db.transaction(|tx| -> Result<bool, BookingError> {
            Ok(queries::mark_notification_sent(tx, appointment_id)?)
        })?;
        if !updated {
            return Err(BookingError::NotFound(format!("appointment {appointment_id}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{Advisor, ProgramLevel, Student};
    use crate::services::slots::SlotEngine;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn setup() -> (BookingManager, SlotEngine) {
        let conn = db::init_db(":memory:").unwrap();
        for id in ["S1", "S2"] {
            queries::save_student(
                &conn,
                &Student {
                    student_id: id.into(),
                    email: format!("{}@example.edu", id.to_lowercase()),
                    name: format!("Student {id}"),
                    program_level: ProgramLevel::Undergraduate,
                },
            )
            .unwrap();
        }
        for id in ["A1", "A2"] {
            queries::save_advisor(
                &conn,
                &Advisor {
                    advisor_id: id.into(),
                    name: format!("Advisor {id}"),
                    email: format!("{}@example.edu", id.to_lowercase()),
                    phone: None,
                    title: None,
                    program_level: ProgramLevel::Undergraduate,
                    office_location: None,
                },
            )
            .unwrap();
        }
        let db = Arc::new(Database::new(conn));
        (
            BookingManager::new(db.clone(), WorkingHours::default()),
            SlotEngine::new(db, WorkingHours::default()),
        )
    }

    #[test]
    fn test_book_then_cancel_toggles_availability() {
        let (manager, engine) = setup();
        let slot = dt("2030-01-07 14:00");

        let appt = manager.book("S1", "A1", slot, Some("course planning")).unwrap();
        assert_eq!(appt.status, AppointmentStatus::Booked);
        assert_eq!(appt.slot_datetime, slot);
        assert_eq!(appt.reason.as_deref(), Some("course planning"));
        assert!(!engine.is_available("A1", slot).unwrap());

        let outcome = manager.cancel(&appt.appointment_id, "S1").unwrap();
        assert!(matches!(outcome, CancelOutcome::Cancelled(_)));
        assert!(engine.is_available("A1", slot).unwrap());
    }

    #[test]
    fn test_cancel_twice_is_reported_noop() {
        let (manager, engine) = setup();
        let slot = dt("2030-01-07 14:00");
        let appt = manager.book("S1", "A1", slot, None).unwrap();
        manager.cancel(&appt.appointment_id, "S1").unwrap();

        // someone else takes the freed slot; a second cancel must not free it again
        manager.book("S2", "A1", slot, None).unwrap();
        let outcome = manager.cancel(&appt.appointment_id, "S1").unwrap();
        assert!(matches!(outcome, CancelOutcome::AlreadyCancelled(_)));
        assert!(!engine.is_available("A1", slot).unwrap());
    }

    #[test]
    fn test_cancel_requires_ownership() {
        let (manager, _) = setup();
        let appt = manager.book("S1", "A1", dt("2030-01-07 14:00"), None).unwrap();
        let err = manager.cancel(&appt.appointment_id, "S2").unwrap_err();
        assert!(matches!(err, BookingError::NotFound(_)));
    }

    #[test]
    fn test_second_booking_of_slot_is_unavailable() {
        let (manager, _) = setup();
        let slot = dt("2030-01-07 14:00");
        manager.book("S1", "A1", slot, None).unwrap();
        let err = manager.book("S2", "A1", slot, None).unwrap_err();
        assert!(matches!(err, BookingError::SlotUnavailable(s) if s == slot));
    }

    #[test]
    fn test_student_cannot_hold_two_appointments_at_same_instant() {
        let (manager, _) = setup();
        let slot = dt("2030-01-07 14:00");
        let first = manager.book("S1", "A1", slot, None).unwrap();
        let err = manager.book("S1", "A2", slot, None).unwrap_err();
        match err {
            BookingError::DuplicateBooking {
                appointment_id,
                slot_datetime,
                status,
            } => {
                assert_eq!(appointment_id, first.appointment_id);
                assert_eq!(slot_datetime, slot);
                assert_eq!(status, AppointmentStatus::Booked);
            }
            other => panic!("expected duplicate, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_past_and_off_grid_and_unknown() {
        let (manager, _) = setup();
        assert!(matches!(
            manager.book("S1", "A1", dt("2001-01-08 10:00"), None),
            Err(BookingError::PastDateTime(_))
        ));
        assert!(matches!(
            manager.book("S1", "A1", dt("2030-01-07 18:00"), None),
            Err(BookingError::OutsideWorkingHours { .. })
        ));
        assert!(matches!(
            manager.book("S1", "A1", dt("2030-01-07 10:15"), None),
            Err(BookingError::OutsideWorkingHours { .. })
        ));
        assert!(matches!(
            manager.book("S9", "A1", dt("2030-01-07 10:00"), None),
            Err(BookingError::NotFound(_))
        ));
        assert!(matches!(
            manager.book("S1", "A9", dt("2030-01-07 10:00"), None),
            Err(BookingError::NotFound(_))
        ));
    }

    #[test]
    fn test_book_at_uses_supplied_clock() {
        let (manager, _) = setup();
        let err = manager
            .book_at("S1", "A1", dt("2030-01-07 10:00"), None, dt("2030-01-07 11:00"))
            .unwrap_err();
        assert!(matches!(err, BookingError::PastDateTime(_)));
    }

    #[test]
    fn test_confirm_transitions() {
        let (manager, _) = setup();
        let appt = manager.book("S1", "A1", dt("2030-01-07 14:00"), None).unwrap();

        let confirmed = manager.confirm(&appt.appointment_id).unwrap();
        assert_eq!(confirmed.status, AppointmentStatus::Confirmed);
        // idempotent
        assert_eq!(
            manager.confirm(&appt.appointment_id).unwrap().status,
            AppointmentStatus::Confirmed
        );

        manager.cancel(&appt.appointment_id, "S1").unwrap();
        assert!(matches!(
            manager.confirm(&appt.appointment_id),
            Err(BookingError::InvalidTransition { .. })
        ));
        assert!(matches!(manager.confirm("missing"), Err(BookingError::NotFound(_))));
    }

    #[test]
    fn test_blocked_slot_cannot_be_booked_until_unblocked() {
        let (manager, engine) = setup();
        let slot = dt("2030-01-07 09:00");
        manager.block_slot("A1", slot).unwrap();
        assert!(!engine.is_available("A1", slot).unwrap());
        assert!(matches!(
            manager.book("S1", "A1", slot, None),
            Err(BookingError::SlotUnavailable(_))
        ));

        manager.unblock_slot("A1", slot).unwrap();
        assert!(manager.book("S1", "A1", slot, None).is_ok());
    }

    #[test]
    fn test_block_refuses_booked_slot() {
        let (manager, _) = setup();
        let slot = dt("2030-01-07 09:00");
        manager.book("S1", "A1", slot, None).unwrap();
        assert!(matches!(
            manager.block_slot("A1", slot),
            Err(BookingError::SlotUnavailable(_))
        ));
        // unblocking a booked slot leaves the booking marker alone
        manager.unblock_slot("A1", slot).unwrap();
        assert!(matches!(
            manager.book("S2", "A1", slot, None),
            Err(BookingError::SlotUnavailable(_))
        ));
    }

    #[test]
    fn test_listing_and_notification_flag() {
        let (manager, _) = setup();
        let late = manager.book("S1", "A1", dt("2030-01-08 10:00"), None).unwrap();
        let early = manager.book("S1", "A2", dt("2030-01-07 10:00"), None).unwrap();
        manager.cancel(&late.appointment_id, "S1").unwrap();

        let active = manager.list_student_appointments("S1", false).unwrap();
        assert_eq!(active.len(), 1);
        let all = manager.list_student_appointments("S1", true).unwrap();
        assert_eq!(all[0].appointment_id, early.appointment_id);
        assert_eq!(all.len(), 2);

        let range = DateRange::new(
            dt("2030-01-07 00:00").date(),
            dt("2030-01-09 00:00").date(),
        );
        assert!(manager.list_advisor_appointments("A1", range).unwrap().is_empty());
        assert_eq!(manager.list_advisor_appointments("A2", range).unwrap().len(), 1);

        manager.mark_notification_sent(&early.appointment_id).unwrap();
        assert!(manager.get_appointment(&early.appointment_id).unwrap().notification_sent);
        assert!(matches!(
            manager.mark_notification_sent("missing"),
            Err(BookingError::NotFound(_))
        ));
    }
}
