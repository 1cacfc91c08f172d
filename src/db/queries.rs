use std::collections::HashSet;

use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{
    Advisor, Appointment, AppointmentStatus, BlockStatus, CalendarBlock, ProgramLevel, Student,
};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn ts(dt: &NaiveDateTime) -> String {
    dt.format(TS_FORMAT).to_string()
}

fn parse_ts(s: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT)
        .map_err(|e| anyhow::anyhow!("invalid stored timestamp {s:?}: {e}"))
}

fn now() -> String {
    ts(&Utc::now().naive_utc())
}

// ── Students ──

pub fn get_student(conn: &Connection, student_id: &str) -> anyhow::Result<Option<Student>> {
    let row = conn
        .query_row(
            "SELECT student_id, email, name, program_level FROM students WHERE student_id = ?1",
            params![student_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?;

    row.map(|(student_id, email, name, level)| {
        Ok(Student {
            student_id,
            email,
            name,
            program_level: parse_level(&level)?,
        })
    })
    .transpose()
}

pub fn save_student(conn: &Connection, student: &Student) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO students (student_id, email, name, program_level)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(student_id) DO UPDATE SET
           email = excluded.email,
           name = excluded.name,
           program_level = excluded.program_level",
        params![
            student.student_id,
            student.email,
            student.name,
            student.program_level.as_str(),
        ],
    )?;
    Ok(())
}

// ── Advisors ──

const ADVISOR_COLUMNS: &str =
    "advisor_id, name, email, phone, title, program_level, office_location";

pub fn list_advisors(conn: &Connection, level: ProgramLevel) -> anyhow::Result<Vec<Advisor>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ADVISOR_COLUMNS} FROM advisors WHERE program_level = ?1 ORDER BY name ASC"
    ))?;
    let rows = stmt.query_map(params![level.as_str()], |row| Ok(parse_advisor_row(row)))?;

    let mut advisors = vec![];
    for row in rows {
        advisors.push(row??);
    }
    Ok(advisors)
}

pub fn get_advisor(conn: &Connection, advisor_id: &str) -> anyhow::Result<Option<Advisor>> {
    let result = conn
        .query_row(
            &format!("SELECT {ADVISOR_COLUMNS} FROM advisors WHERE advisor_id = ?1"),
            params![advisor_id],
            |row| Ok(parse_advisor_row(row)),
        )
        .optional()?;
    result.transpose()
}

pub fn save_advisor(conn: &Connection, advisor: &Advisor) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO advisors (advisor_id, name, email, phone, title, program_level, office_location)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(advisor_id) DO UPDATE SET
           name = excluded.name,
           email = excluded.email,
           phone = excluded.phone,
           title = excluded.title,
           program_level = excluded.program_level,
           office_location = excluded.office_location",
        params![
            advisor.advisor_id,
            advisor.name,
            advisor.email,
            advisor.phone,
            advisor.title,
            advisor.program_level.as_str(),
            advisor.office_location,
        ],
    )?;
    Ok(())
}

fn parse_advisor_row(row: &rusqlite::Row) -> anyhow::Result<Advisor> {
    let level: String = row.get(5)?;
    Ok(Advisor {
        advisor_id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        title: row.get(4)?,
        program_level: parse_level(&level)?,
        office_location: row.get(6)?,
    })
}

fn parse_level(s: &str) -> anyhow::Result<ProgramLevel> {
    ProgramLevel::parse(s).ok_or_else(|| anyhow::anyhow!("unknown program level: {s}"))
}

// ── Appointments ──

const APPOINTMENT_COLUMNS: &str = "appointment_id, student_id, advisor_id, slot_datetime, status, reason, notification_sent, created_at, updated_at";

pub fn create_appointment(conn: &Connection, appt: &Appointment) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO appointments (appointment_id, student_id, advisor_id, slot_datetime, status, reason, notification_sent, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            appt.appointment_id,
            appt.student_id,
            appt.advisor_id,
            ts(&appt.slot_datetime),
            appt.status.as_str(),
            appt.reason,
            appt.notification_sent as i32,
            ts(&appt.created_at),
            ts(&appt.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_appointment(conn: &Connection, id: &str) -> anyhow::Result<Option<Appointment>> {
    let result = conn
        .query_row(
            &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE appointment_id = ?1"),
            params![id],
            |row| Ok(parse_appointment_row(row)),
        )
        .optional()?;
    result.transpose()
}

/// Live (booked or confirmed) appointment for an advisor's slot, if any.
pub fn find_active_for_advisor(
    conn: &Connection,
    advisor_id: &str,
    slot: &NaiveDateTime,
) -> anyhow::Result<Option<Appointment>> {
    let result = conn
        .query_row(
            &format!(
                "SELECT {APPOINTMENT_COLUMNS} FROM appointments
                 WHERE advisor_id = ?1 AND slot_datetime = ?2 AND status IN ('booked', 'confirmed')"
            ),
            params![advisor_id, ts(slot)],
            |row| Ok(parse_appointment_row(row)),
        )
        .optional()?;
    result.transpose()
}

/// Live appointment the student already holds at exactly `slot`, with any advisor.
pub fn find_active_for_student(
    conn: &Connection,
    student_id: &str,
    slot: &NaiveDateTime,
) -> anyhow::Result<Option<Appointment>> {
    let result = conn
        .query_row(
            &format!(
                "SELECT {APPOINTMENT_COLUMNS} FROM appointments
                 WHERE student_id = ?1 AND slot_datetime = ?2 AND status IN ('booked', 'confirmed')
                 LIMIT 1"
            ),
            params![student_id, ts(slot)],
            |row| Ok(parse_appointment_row(row)),
        )
        .optional()?;
    result.transpose()
}

pub fn get_appointments_for_student(
    conn: &Connection,
    student_id: &str,
    include_cancelled: bool,
) -> anyhow::Result<Vec<Appointment>> {
    let sql = if include_cancelled {
        format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments
             WHERE student_id = ?1 ORDER BY slot_datetime ASC"
        )
    } else {
        format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments
             WHERE student_id = ?1 AND status != 'cancelled' ORDER BY slot_datetime ASC"
        )
    };

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![student_id], |row| Ok(parse_appointment_row(row)))?;

    let mut appointments = vec![];
    for row in rows {
        appointments.push(row??);
    }
    Ok(appointments)
}

pub fn get_appointments_for_advisor(
    conn: &Connection,
    advisor_id: &str,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
) -> anyhow::Result<Vec<Appointment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments
         WHERE advisor_id = ?1 AND slot_datetime >= ?2 AND slot_datetime <= ?3
           AND status IN ('booked', 'confirmed')
         ORDER BY slot_datetime ASC"
    ))?;
    let rows = stmt.query_map(params![advisor_id, ts(start), ts(end)], |row| {
        Ok(parse_appointment_row(row))
    })?;

    let mut appointments = vec![];
    for row in rows {
        appointments.push(row??);
    }
    Ok(appointments)
}

pub fn update_appointment_status(
    conn: &Connection,
    id: &str,
    status: AppointmentStatus,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE appointments SET status = ?1, updated_at = ?2 WHERE appointment_id = ?3",
        params![status.as_str(), now(), id],
    )?;
    Ok(count > 0)
}

pub fn mark_notification_sent(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE appointments SET notification_sent = 1, updated_at = ?1 WHERE appointment_id = ?2",
        params![now(), id],
    )?;
    Ok(count > 0)
}

fn parse_appointment_row(row: &rusqlite::Row) -> anyhow::Result<Appointment> {
    let slot_str: String = row.get(3)?;
    let status_str: String = row.get(4)?;
    let created_at_str: String = row.get(7)?;
    let updated_at_str: String = row.get(8)?;

    Ok(Appointment {
        appointment_id: row.get(0)?,
        student_id: row.get(1)?,
        advisor_id: row.get(2)?,
        slot_datetime: parse_ts(&slot_str)?,
        status: AppointmentStatus::parse(&status_str)?,
        reason: row.get(5)?,
        notification_sent: row.get::<_, i32>(6)? != 0,
        created_at: parse_ts(&created_at_str)?,
        updated_at: parse_ts(&updated_at_str)?,
    })
}

// ── Calendar blocks ──

pub fn get_calendar_block(
    conn: &Connection,
    advisor_id: &str,
    slot: &NaiveDateTime,
) -> anyhow::Result<Option<CalendarBlock>> {
    let row = conn
        .query_row(
            "SELECT advisor_id, slot_datetime, status FROM calendar_blocks
             WHERE advisor_id = ?1 AND slot_datetime = ?2",
            params![advisor_id, ts(slot)],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;

    row.map(|(advisor_id, slot_str, status)| {
        Ok(CalendarBlock {
            advisor_id,
            slot_datetime: parse_ts(&slot_str)?,
            status: BlockStatus::parse(&status)?,
        })
    })
    .transpose()
}

pub fn upsert_calendar_block(
    conn: &Connection,
    advisor_id: &str,
    slot: &NaiveDateTime,
    status: BlockStatus,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO calendar_blocks (advisor_id, slot_datetime, status) VALUES (?1, ?2, ?3)
         ON CONFLICT(advisor_id, slot_datetime) DO UPDATE SET status = excluded.status",
        params![advisor_id, ts(slot), status.as_str()],
    )?;
    Ok(())
}

pub fn delete_calendar_block(
    conn: &Connection,
    advisor_id: &str,
    slot: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "DELETE FROM calendar_blocks WHERE advisor_id = ?1 AND slot_datetime = ?2",
        params![advisor_id, ts(slot)],
    )?;
    Ok(count > 0)
}

/// Every slot start in `[start, end]` that a block or a live appointment occupies.
pub fn get_busy_slots(
    conn: &Connection,
    advisor_id: &str,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
) -> anyhow::Result<HashSet<NaiveDateTime>> {
    let mut stmt = conn.prepare(
        "SELECT slot_datetime FROM calendar_blocks
           WHERE advisor_id = ?1 AND slot_datetime >= ?2 AND slot_datetime <= ?3
             AND status IN ('booked', 'blocked')
         UNION
         SELECT slot_datetime FROM appointments
           WHERE advisor_id = ?1 AND slot_datetime >= ?2 AND slot_datetime <= ?3
             AND status IN ('booked', 'confirmed')",
    )?;
    let rows = stmt.query_map(params![advisor_id, ts(start), ts(end)], |row| {
        row.get::<_, String>(0)
    })?;

    let mut busy = HashSet::new();
    for row in rows {
        busy.insert(parse_ts(&row?)?);
    }
    Ok(busy)
}
