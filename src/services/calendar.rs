use crate::models::calendar::SLOT_MINUTES;
use crate::models::{Advisor, Appointment};

const ICS_TS: &str = "%Y%m%dT%H%M%S";

pub fn generate_ics(appointment: &Appointment, advisor: &Advisor) -> String {
    let dtstart = appointment.slot_datetime.format(ICS_TS).to_string();
    let dtend = (appointment.slot_datetime + chrono::Duration::minutes(SLOT_MINUTES))
        .format(ICS_TS)
        .to_string();
    let dtstamp = appointment.created_at.format(ICS_TS).to_string();
    let uid = format!("{}@advising", appointment.appointment_id);

    let summary = escape_text(&format!("Advising appointment with {}", advisor.name));
    let description = escape_text(
        appointment
            .reason
            .as_deref()
            .unwrap_or("No reason given"),
    );
    let status = match appointment.status {
        crate::models::AppointmentStatus::Cancelled => "CANCELLED",
        _ => "CONFIRMED",
    };

    let mut event = format!(
        "BEGIN:VCALENDAR\r\n\
         VERSION:2.0\r\n\
         PRODID:-//Advising//Appointment Booking//EN\r\n\
         BEGIN:VEVENT\r\n\
         UID:{uid}\r\n\
         DTSTAMP:{dtstamp}\r\n\
         DTSTART:{dtstart}\r\n\
         DTEND:{dtend}\r\n\
         SUMMARY:{summary}\r\n\
         DESCRIPTION:{description}\r\n\
         STATUS:{status}\r\n\
         ORGANIZER;CN={}:mailto:{}\r\n",
        escape_text(&advisor.name),
        advisor.email,
    );
    if let Some(location) = &advisor.office_location {
        event.push_str(&format!("LOCATION:{}\r\n", escape_text(location)));
    }
    event.push_str("END:VEVENT\r\nEND:VCALENDAR\r\n");
    event
}

// RFC 5545 TEXT escaping
fn escape_text(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace('\n', "\\n")
}
