use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use rusqlite::Connection;

use crate::db::{queries, Database};
use crate::models::calendar::normalize;
use crate::models::{BlockStatus, DateRange, Slot, WorkingHours};

pub fn local_now() -> NaiveDateTime {
    normalize(Local::now().naive_local())
}

/// Generates an advisor's slot grid and answers availability against the store.
pub struct SlotEngine {
    db: Arc<Database>,
    hours: WorkingHours,
}

impl SlotEngine {
    pub fn new(db: Arc<Database>, hours: WorkingHours) -> Self {
        Self { db, hours }
    }

    pub fn hours(&self) -> &WorkingHours {
        &self.hours
    }

    /// Every bookable slot in `range`, ignoring current bookings.
    pub fn generate_slots(&self, advisor_id: &str, range: DateRange) -> Vec<Slot> {
        generate_slots(&self.hours, advisor_id, range)
    }

    pub fn is_available(&self, advisor_id: &str, slot: NaiveDateTime) -> anyhow::Result<bool> {
        self.db
            .read(|conn| is_available_in(conn, advisor_id, slot, local_now()))
    }

    pub fn available_slots(&self, advisor_id: &str, range: DateRange) -> anyhow::Result<Vec<Slot>> {
        self.available_slots_at(advisor_id, range, local_now())
    }

    pub fn available_slots_at(
        &self,
        advisor_id: &str,
        range: DateRange,
        now: NaiveDateTime,
    ) -> anyhow::Result<Vec<Slot>> {
        let candidates = self.generate_slots(advisor_id, range);
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let busy = self.db.read(|conn| {
            queries::get_busy_slots(
                conn,
                advisor_id,
                &range.start_datetime(),
                &range.end_datetime(),
            )
        })?;

        Ok(candidates
            .into_iter()
            .filter(|slot| slot.start >= now && !busy.contains(&slot.start))
            .collect())
    }
}

pub fn generate_slots(hours: &WorkingHours, advisor_id: &str, range: DateRange) -> Vec<Slot> {
    range
        .days()
        .flat_map(|date| hours.slot_starts(date))
        .map(|start| Slot::new(advisor_id, start))
        .collect()
}

/// Availability of one slot, evaluated on `conn` so it can run inside the
/// same transaction as the write that depends on it.
pub fn is_available_in(
    conn: &Connection,
    advisor_id: &str,
    slot: NaiveDateTime,
    now: NaiveDateTime,
) -> anyhow::Result<bool> {
    let slot = normalize(slot);
    if slot < now {
        return Ok(false);
    }

    if let Some(block) = queries::get_calendar_block(conn, advisor_id, &slot)? {
        if matches!(block.status, BlockStatus::Booked | BlockStatus::Blocked) {
            return Ok(false);
        }
    }

    Ok(queries::find_active_for_advisor(conn, advisor_id, &slot)?.is_none())
}

/// Idempotent: re-marking an unavailable slot just updates its status.
pub(crate) fn mark_unavailable(
    conn: &Connection,
    advisor_id: &str,
    slot: NaiveDateTime,
    status: BlockStatus,
) -> anyhow::Result<()> {
    queries::upsert_calendar_block(conn, advisor_id, &normalize(slot), status)
}

/// Clears a booked marker outright; a blocked marker is flipped back to available.
/// Marking an already-free slot is a no-op.
pub(crate) fn mark_available(
    conn: &Connection,
    advisor_id: &str,
    slot: NaiveDateTime,
) -> anyhow::Result<()> {
    let slot = normalize(slot);
    match queries::get_calendar_block(conn, advisor_id, &slot)? {
        Some(block) if block.status == BlockStatus::Blocked => {
            queries::upsert_calendar_block(conn, advisor_id, &slot, BlockStatus::Available)
        }
        Some(_) => queries::delete_calendar_block(conn, advisor_id, &slot).map(|_| ()),
        None => Ok(()),
    }
}
