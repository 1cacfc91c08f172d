pub mod webhook;

use async_trait::async_trait;

use crate::models::{Advisor, Appointment};

/// Delivers booking confirmations. A failed send never unwinds the booking.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_confirmation(&self, appointment: &Appointment, advisor: &Advisor) -> anyhow::Result<()>;
}

/// Used when no delivery endpoint is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_confirmation(&self, appointment: &Appointment, advisor: &Advisor) -> anyhow::Result<()> {
        tracing::info!(
            appointment_id = %appointment.appointment_id,
            student_id = %appointment.student_id,
            advisor = %advisor.name,
            slot = %appointment.slot_datetime,
            "[notify] confirmation (log only)"
        );
        Ok(())
    }
}
