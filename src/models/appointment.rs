use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub appointment_id: String,
    pub student_id: String,
    pub advisor_id: String,
    pub slot_datetime: NaiveDateTime,
    pub status: AppointmentStatus,
    pub reason: Option<String>,
    pub notification_sent: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Appointment {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Booked,
    Confirmed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Booked => "booked",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "booked" | "pending" => Ok(AppointmentStatus::Booked),
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            other => Err(anyhow::anyhow!("unknown appointment status: {other}")),
        }
    }

    /// Booked and confirmed appointments hold their slot.
    pub fn is_active(&self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled)
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse() {
        assert_eq!(AppointmentStatus::parse("booked").unwrap(), AppointmentStatus::Booked);
        assert_eq!(AppointmentStatus::parse("BOOKED").unwrap(), AppointmentStatus::Booked);
        assert_eq!(AppointmentStatus::parse("pending").unwrap(), AppointmentStatus::Booked);
        assert_eq!(AppointmentStatus::parse("cancelled").unwrap(), AppointmentStatus::Cancelled);
        assert!(AppointmentStatus::parse("lost").is_err());
    }

    #[test]
    fn test_only_cancelled_is_inactive() {
        assert!(AppointmentStatus::Booked.is_active());
        assert!(AppointmentStatus::Confirmed.is_active());
        assert!(!AppointmentStatus::Cancelled.is_active());
    }
}
