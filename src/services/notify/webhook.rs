use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;

use super::Notifier;
use crate::models::calendar::format_slot;
use crate::models::{Advisor, Appointment};
use crate::services::calendar::generate_ics;

/// POSTs a JSON confirmation, with the `.ics` attached inline, to a
/// notification gateway.
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_confirmation(&self, appointment: &Appointment, advisor: &Advisor) -> anyhow::Result<()> {
        let body = json!({
            "type": "appointment_confirmation",
            "appointment_id": appointment.appointment_id,
            "student_id": appointment.student_id,
            "advisor": {
                "advisor_id": advisor.advisor_id,
                "name": advisor.name,
                "email": advisor.email,
                "office_location": advisor.office_location,
            },
            "slot_datetime": appointment.slot_datetime,
            "when": format_slot(&appointment.slot_datetime),
            "reason": appointment.reason,
            "ics": generate_ics(appointment, advisor),
        });

        self.client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .context("failed to call notification webhook")?
            .error_for_status()
            .context("notification webhook returned error")?;

        Ok(())
    }
}
