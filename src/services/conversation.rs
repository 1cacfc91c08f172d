use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::errors::BookingError;
use crate::models::calendar::{format_date, format_slot};
use crate::models::{
    Advisor, AdvisorRef, BookingAction, BookingContext, ConversationState, DateRange,
    DateSuggestion, ProgramLevel, Slot, Turn,
};
use crate::services::booking::BookingManager;
use crate::services::directory::Directory;
use crate::services::notify::Notifier;
use crate::services::resolver::times::parse_ordinal;
use crate::services::resolver::{DateResolution, DateTimeResolver};
use crate::services::slots::{local_now, SlotEngine};

const CANCEL_WORDS: &[&str] = &["cancel", "nevermind", "never mind", "forget it", "stop"];
const UNDERGRAD_WORDS: &[&str] = &[
    "undergraduate", "undergrad", "bachelor", "bachelors", "bachelor's", "bs", "b.s", "b.s.", "bsc",
];
const GRAD_WORDS: &[&str] = &[
    "graduate", "grad", "master", "masters", "master's", "ms", "m.s", "m.s.", "msc",
];
const SKIP_WORDS: &[&str] = &["", "skip", "none", "no reason", "n/a", "na", "nothing", "no"];
const YES_WORDS: &[&str] = &[
    "yes", "y", "yeah", "yep", "confirm", "book it", "sure", "okay", "ok", "sounds good", "correct",
];
const NO_WORDS: &[&str] = &["no", "n", "nope", "change", "modify", "edit", "wrong"];
const OTHER_ADVISOR: &[&str] = &[
    "different advisor", "another advisor", "other advisor", "change advisor", "switch advisor",
];
const OTHER_DATE: &[&str] = &["different day", "another day", "different date", "another date", "other date"];

/// First alternative-date window, in days after the requested date.
const NEAR_WINDOW_DAYS: i64 = 14;
const MAX_SUGGESTIONS: usize = 5;

const PROGRAM_PROMPT: &str =
    "Are you an undergraduate (BS) or graduate (MS) student?";
const ENDED: &str =
    "This booking conversation has ended. Start a new one to book another appointment.";

/// Drives one booking dialogue. Each call takes the caller's context by
/// reference and returns a fresh one; a rejected transition hands the
/// original back unchanged.
pub struct BookingConversation {
    directory: Arc<dyn Directory>,
    slots: Arc<SlotEngine>,
    booking: Arc<BookingManager>,
    resolver: Arc<DateTimeResolver>,
    notifier: Arc<dyn Notifier>,
}

impl BookingConversation {
    pub fn new(
        directory: Arc<dyn Directory>,
        slots: Arc<SlotEngine>,
        booking: Arc<BookingManager>,
        resolver: Arc<DateTimeResolver>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            directory,
            slots,
            booking,
            resolver,
            notifier,
        }
    }

    fn horizon_days(&self) -> i64 {
        self.resolver.horizon_days()
    }

    pub fn initialize_booking(&self, student_id: &str) -> Result<(BookingContext, String), BookingError> {
        if self.directory.get_student(student_id)?.is_none() {
            return Err(BookingError::NotFound(format!("student {student_id}")));
        }
        tracing::info!(student_id, "booking conversation started");
        Ok((
            BookingContext::new(student_id),
            format!("I'd be happy to help you book an advising appointment! {PROGRAM_PROMPT}"),
        ))
    }

    pub async fn process(&self, utterance: &str, context: &BookingContext) -> anyhow::Result<Turn> {
        self.process_at(utterance, context, local_now()).await
    }

    pub async fn process_at(
        &self,
        utterance: &str,
        context: &BookingContext,
        now: NaiveDateTime,
    ) -> anyhow::Result<Turn> {
        let text = normalize_utterance(utterance);

        if context.state.is_terminal() {
            return Ok(Turn::new(context.clone(), ENDED, BookingAction::Error));
        }

        if is_cancel(&text, context.state) {
            tracing::info!(student_id = %context.student_id, from = context.state.as_str(), "booking conversation cancelled");
            return Ok(Turn::new(
                context.with_state(ConversationState::Cancelled),
                "Booking cancelled. Let me know if you'd like to start over!",
                BookingAction::Cancelled,
            ));
        }

        if !context.satisfies(context.state) {
            let state = context.furthest_reachable();
            tracing::warn!(
                student_id = %context.student_id,
                state = context.state.as_str(),
                fallback = state.as_str(),
                "context missing prerequisites"
            );
            return Ok(Turn::new(
                context.with_state(state),
                format!("Let's pick up where we can. {}", self.prompt_for(state)),
                BookingAction::Prompt,
            ));
        }

        let turn = match context.state {
            ConversationState::NeedProgram => self.handle_program(&text, context)?,
            ConversationState::NeedAdvisor => self.handle_advisor(&text, context),
            ConversationState::NeedDate => self.handle_date(utterance, &text, context, now).await?,
            ConversationState::NeedTime => self.handle_time(utterance, &text, context).await,
            ConversationState::NeedReason => self.handle_reason(utterance, &text, context),
            ConversationState::Confirming => self.handle_confirm(&text, context, now).await?,
            ConversationState::Complete | ConversationState::Cancelled => {
                Turn::new(context.clone(), ENDED, BookingAction::Error)
            }
        };

        if turn.state() != context.state {
            tracing::info!(
                student_id = %context.student_id,
                from = context.state.as_str(),
                to = turn.state().as_str(),
                "booking state transition"
            );
        }
        Ok(turn)
    }

    fn handle_program(&self, text: &str, context: &BookingContext) -> anyhow::Result<Turn> {
        let Some(level) = match_program(text) else {
            return Ok(Turn::new(
                context.clone(),
                format!("I didn't catch that. {PROGRAM_PROMPT}"),
                BookingAction::Clarify,
            ));
        };

        let advisors = self.directory.list_advisors(level)?;
        if advisors.is_empty() {
            return Ok(Turn::new(
                context.clone(),
                format!(
                    "I couldn't find any {} advisors right now. Please contact the advising office, or tell me a different program level.",
                    level.as_str()
                ),
                BookingAction::NoSlots,
            ));
        }

        let next = BookingContext {
            state: ConversationState::NeedAdvisor,
            program_level: Some(level),
            candidate_advisors: advisors.clone(),
            ..context.clone()
        };
        let message = format!(
            "Great, {} it is. Which advisor would you like to meet with?\n{}",
            level.label(),
            advisor_list(&advisors)
        );
        Ok(Turn::new(next, message, BookingAction::ShowAdvisors { advisors }))
    }

    fn handle_advisor(&self, text: &str, context: &BookingContext) -> Turn {
        let advisors = &context.candidate_advisors;
        match match_advisor(text, advisors) {
            AdvisorMatch::One(advisor) => {
                let next = BookingContext {
                    state: ConversationState::NeedDate,
                    advisor: Some(AdvisorRef::from(advisor)),
                    requested_dates: vec![],
                    available_slots: vec![],
                    suggested_dates: vec![],
                    slot: None,
                    ..context.clone()
                };
                let message = format!(
                    "You've selected {} ({}). What date works for you? You can say things like \"tomorrow\", \"next Monday\" or \"next week\" (up to {} days ahead).",
                    advisor.name,
                    advisor.display_title(),
                    self.horizon_days()
                );
                Turn::new(next, message, BookingAction::Prompt)
            }
            AdvisorMatch::Several(names) => Turn::new(
                context.clone(),
                format!("That matches more than one advisor ({}). Which one did you mean?", names.join(", ")),
                BookingAction::Clarify,
            ),
            AdvisorMatch::None => Turn::new(
                context.clone(),
                format!(
                    "I couldn't match that to an advisor. Please pick one by name or number:\n{}",
                    advisor_list(advisors)
                ),
                BookingAction::ShowAdvisors {
                    advisors: advisors.clone(),
                },
            ),
        }
    }

    async fn handle_date(
        &self,
        utterance: &str,
        text: &str,
        context: &BookingContext,
        now: NaiveDateTime,
    ) -> anyhow::Result<Turn> {
        if contains_any(text, OTHER_ADVISOR) {
            return Ok(self.back_to_advisors(context));
        }

        let today = now.date();
        let (dates, period) = match self.resolver.resolve_date(utterance, today).await {
            Some(resolution) => {
                let period = match &resolution {
                    DateResolution::Period(spec) => Some(spec.describe()),
                    DateResolution::Dates(_) => None,
                };
                (resolution.dates(today, self.horizon_days()), period)
            }
            None => match suggestion_by_ordinal(text, &context.suggested_dates) {
                Some(date) => (vec![date], None),
                None => (vec![], None),
            },
        };

        if dates.is_empty() {
            return Ok(Turn::new(
                context.clone(),
                format!(
                    "I couldn't work out a date from that. Please give a date between today and {} days from now, like \"tomorrow\", \"next Tuesday\" or \"{}\".",
                    self.horizon_days(),
                    (today + Duration::days(1)).format("%B %-d")
                ),
                BookingAction::Clarify,
            ));
        }

        let advisor = advisor_ref(context)?;
        let available = self.available_on(&advisor.advisor_id, &dates, now)?;

        if !available.is_empty() {
            let next = BookingContext {
                state: ConversationState::NeedTime,
                requested_dates: dates,
                available_slots: available.clone(),
                suggested_dates: vec![],
                slot: None,
                ..context.clone()
            };
            let window = period.map(|p| format!(" for {p}")).unwrap_or_default();
            let message = format!(
                "Here are {}'s open times{window}:\n{}\nWhich time works best?",
                advisor.name,
                slot_list(&available)
            );
            return Ok(Turn::new(next, message, BookingAction::ShowSlots { slots: available }));
        }

        let suggestions = self.suggest_alternatives(&advisor.advisor_id, &dates, now)?;
        let requested = dates
            .iter()
            .map(format_date)
            .collect::<Vec<_>>()
            .join(" or ");

        let next = BookingContext {
            requested_dates: dates,
            available_slots: vec![],
            suggested_dates: suggestions.clone(),
            ..context.clone()
        };

        if suggestions.is_empty() {
            return Ok(Turn::new(
                next,
                format!(
                    "{} has no open times on {requested}, and nothing in the next {} days either. You could try a different advisor.",
                    advisor.name,
                    self.horizon_days()
                ),
                BookingAction::NoSlots,
            ));
        }

        let list = suggestions
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{}. {} ({} open)", i + 1, format_date(&s.date), s.slot_count))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(Turn::new(
            next,
            format!(
                "{} has no open times on {requested}. These dates have availability:\n{list}\nPick one, or tell me another date.",
                advisor.name
            ),
            BookingAction::SuggestAlternatives { dates: suggestions },
        ))
    }

    async fn handle_time(&self, utterance: &str, text: &str, context: &BookingContext) -> Turn {
        if contains_any(text, OTHER_DATE) {
            let next = BookingContext {
                state: ConversationState::NeedDate,
                available_slots: vec![],
                slot: None,
                ..context.clone()
            };
            return Turn::new(next, "Sure. Which date would you like instead?", BookingAction::Prompt);
        }

        match self.resolver.resolve_time(utterance, &context.available_slots).await {
            Some(slot) => {
                let message = format!(
                    "Excellent, I've selected {}.\nIs there a specific reason for this appointment (e.g. course planning, graduation requirements)? This is optional, you can say 'skip'.",
                    slot.display()
                );
                let next = BookingContext {
                    state: ConversationState::NeedReason,
                    slot: Some(slot),
                    ..context.clone()
                };
                Turn::new(next, message, BookingAction::Prompt)
            }
            None => Turn::new(
                context.clone(),
                format!(
                    "I couldn't match that to one of the open times. Please pick one by time or number:\n{}",
                    slot_list(&context.available_slots)
                ),
                BookingAction::ShowSlots {
                    slots: context.available_slots.clone(),
                },
            ),
        }
    }

    fn handle_reason(&self, utterance: &str, text: &str, context: &BookingContext) -> Turn {
        let reason = if SKIP_WORDS.contains(&text) {
            None
        } else {
            Some(utterance.trim().to_string())
        };
        let next = BookingContext {
            state: ConversationState::Confirming,
            reason,
            ..context.clone()
        };
        let message = summary(&next);
        Turn::new(next, message, BookingAction::ConfirmSummary)
    }

    async fn handle_confirm(
        &self,
        text: &str,
        context: &BookingContext,
        now: NaiveDateTime,
    ) -> anyhow::Result<Turn> {
        let yes = contains_any(text, YES_WORDS);
        let no = contains_any(text, NO_WORDS);

        match (yes, no) {
            (true, false) => self.commit(context, now).await,
            (false, true) if contains_any(text, &["advisor"]) => Ok(self.back_to_advisors(context)),
            (false, true) => {
                let next = BookingContext {
                    state: ConversationState::NeedDate,
                    requested_dates: vec![],
                    available_slots: vec![],
                    suggested_dates: vec![],
                    slot: None,
                    reason: None,
                    ..context.clone()
                };
                Ok(Turn::new(
                    next,
                    "No problem! Which date would you like instead? (Say \"different advisor\" to change advisors.)",
                    BookingAction::Modify,
                ))
            }
            _ => Ok(Turn::new(
                context.clone(),
                "Please say 'yes' to confirm this appointment or 'no' to make changes.",
                BookingAction::Clarify,
            )),
        }
    }

    async fn commit(&self, context: &BookingContext, now: NaiveDateTime) -> anyhow::Result<Turn> {
        let advisor = advisor_ref(context)?;
        let slot = context
            .slot
            .clone()
            .ok_or_else(|| anyhow::anyhow!("confirming without a chosen slot"))?;

        let mut appointment = match self.booking.book_at(
            &context.student_id,
            &advisor.advisor_id,
            slot.start,
            context.reason.as_deref(),
            now,
        ) {
            Ok(appointment) => appointment,
            Err(BookingError::Storage(e)) => return Err(e),
            Err(e) => return self.recover_from_rejection(context, e, now),
        };

        let notified = match self.directory.get_advisor(&advisor.advisor_id) {
            Ok(Some(full)) => match self.notifier.send_confirmation(&appointment, &full).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(appointment_id = %appointment.appointment_id, error = %e, "confirmation notification failed");
                    false
                }
            },
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(appointment_id = %appointment.appointment_id, error = %e, "could not load advisor for notification");
                false
            }
        };
        if notified {
            match self.booking.mark_notification_sent(&appointment.appointment_id) {
                Ok(()) => appointment.notification_sent = true,
                Err(e) => tracing::warn!(appointment_id = %appointment.appointment_id, error = %e, "failed to record notification"),
            }
        }

        let mut message = format!(
            "Your appointment is booked!\nAppointment ID: {}\nAdvisor: {}\nWhen: {}\nStatus: {}",
            appointment.appointment_id,
            advisor.name,
            format_slot(&appointment.slot_datetime),
            appointment.status
        );
        if notified {
            message.push_str("\nA confirmation has been sent to you.");
        } else {
            message.push_str("\nWe couldn't send a confirmation right now, but your appointment is saved.");
        }

        let next = BookingContext {
            state: ConversationState::Complete,
            appointment_id: Some(appointment.appointment_id.clone()),
            ..context.clone()
        };
        Ok(Turn::new(next, message, BookingAction::Booked { appointment }))
    }

    /// The commit was refused; steer the student back to a step that can fix it.
    fn recover_from_rejection(
        &self,
        context: &BookingContext,
        error: BookingError,
        now: NaiveDateTime,
    ) -> anyhow::Result<Turn> {
        tracing::info!(student_id = %context.student_id, error = %error, "booking rejected at commit");

        if let BookingError::NotFound(what) = &error {
            if what.starts_with("advisor") {
                return Ok(self.back_to_advisors(context));
            }
            return Ok(Turn::new(
                context.with_state(ConversationState::Cancelled),
                format!("Sorry, I couldn't book the appointment: {error}. Please sign in again and start over."),
                BookingAction::Error,
            ));
        }

        let advisor = advisor_ref(context)?;
        let available = self.available_on(&advisor.advisor_id, &context.requested_dates, now)?;
        if available.is_empty() {
            let next = BookingContext {
                state: ConversationState::NeedDate,
                available_slots: vec![],
                slot: None,
                ..context.clone()
            };
            return Ok(Turn::new(
                next,
                format!("Sorry, I couldn't book the appointment: {error}. Which other date would work?"),
                BookingAction::Error,
            ));
        }

        let next = BookingContext {
            state: ConversationState::NeedTime,
            available_slots: available.clone(),
            slot: None,
            ..context.clone()
        };
        Ok(Turn::new(
            next,
            format!(
                "Sorry, I couldn't book the appointment: {error}.\nThese times are still open:\n{}",
                slot_list(&available)
            ),
            BookingAction::ShowSlots { slots: available },
        ))
    }

    fn back_to_advisors(&self, context: &BookingContext) -> Turn {
        let next = BookingContext {
            state: ConversationState::NeedAdvisor,
            advisor: None,
            requested_dates: vec![],
            available_slots: vec![],
            suggested_dates: vec![],
            slot: None,
            ..context.clone()
        };
        let advisors = context.candidate_advisors.clone();
        Turn::new(
            next,
            format!("Sure. Which advisor would you like instead?\n{}", advisor_list(&advisors)),
            BookingAction::ShowAdvisors { advisors },
        )
    }

    fn available_on(
        &self,
        advisor_id: &str,
        dates: &[NaiveDate],
        now: NaiveDateTime,
    ) -> anyhow::Result<Vec<Slot>> {
        let (Some(first), Some(last)) = (dates.iter().min(), dates.iter().max()) else {
            return Ok(vec![]);
        };
        let wanted: HashSet<&NaiveDate> = dates.iter().collect();
        let slots = self
            .slots
            .available_slots_at(advisor_id, DateRange::new(*first, *last), now)?;
        Ok(slots.into_iter().filter(|s| wanted.contains(&s.date())).collect())
    }

    /// Dates after the latest requested one, ranked by open-slot count. The
    /// near window is searched first; the rest of the horizon only if it is empty.
    fn suggest_alternatives(
        &self,
        advisor_id: &str,
        requested: &[NaiveDate],
        now: NaiveDateTime,
    ) -> anyhow::Result<Vec<DateSuggestion>> {
        let today = now.date();
        let limit = today + Duration::days(self.horizon_days());
        let anchor = requested.iter().max().copied().unwrap_or(today).max(today);

        let near = DateRange::new(anchor + Duration::days(1), (anchor + Duration::days(NEAR_WINDOW_DAYS)).min(limit));
        let suggestions = self.rank_dates(advisor_id, near, now)?;
        if !suggestions.is_empty() {
            return Ok(suggestions);
        }

        let far = DateRange::new(
            anchor + Duration::days(NEAR_WINDOW_DAYS + 1),
            (anchor + Duration::days(self.horizon_days())).min(limit),
        );
        self.rank_dates(advisor_id, far, now)
    }

    fn rank_dates(
        &self,
        advisor_id: &str,
        range: DateRange,
        now: NaiveDateTime,
    ) -> anyhow::Result<Vec<DateSuggestion>> {
        if range.start > range.end {
            return Ok(vec![]);
        }

        let mut counts: BTreeMap<NaiveDate, usize> = BTreeMap::new();
        for slot in self.slots.available_slots_at(advisor_id, range, now)? {
            *counts.entry(slot.date()).or_default() += 1;
        }

        let mut ranked: Vec<DateSuggestion> = counts
            .into_iter()
            .map(|(date, slot_count)| DateSuggestion { date, slot_count })
            .collect();
        // stable: equal counts keep date order
        ranked.sort_by(|a, b| b.slot_count.cmp(&a.slot_count));
        ranked.truncate(MAX_SUGGESTIONS);
        Ok(ranked)
    }

    fn prompt_for(&self, state: ConversationState) -> String {
        match state {
            ConversationState::NeedAdvisor => "Which advisor would you like to meet with?".to_string(),
            ConversationState::NeedDate => "What date works for you?".to_string(),
            ConversationState::NeedTime => "Which time works best?".to_string(),
            ConversationState::Confirming => "Shall I book it? Say 'yes' or 'no'.".to_string(),
            _ => PROGRAM_PROMPT.to_string(),
        }
    }
}

fn advisor_ref(context: &BookingContext) -> anyhow::Result<AdvisorRef> {
    context
        .advisor
        .clone()
        .ok_or_else(|| anyhow::anyhow!("no advisor chosen in state {}", context.state.as_str()))
}

/// Lowercased, trimmed, trailing punctuation dropped.
fn normalize_utterance(utterance: &str) -> String {
    utterance
        .trim()
        .trim_end_matches(['.', '!', '?'])
        .trim()
        .to_lowercase()
}

/// In `need_reason` only an utterance that is exactly a cancel phrase counts,
/// so a reason such as "thinking about whether to stop my minor" is kept.
fn is_cancel(text: &str, state: ConversationState) -> bool {
    if state == ConversationState::NeedReason {
        return CANCEL_WORDS.contains(&text);
    }
    contains_any(text, CANCEL_WORDS)
}

fn contains_any(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| contains_phrase(text, p))
}

/// Whole-word (or whole-phrase) containment.
fn contains_phrase(text: &str, phrase: &str) -> bool {
    text.match_indices(phrase).any(|(i, _)| {
        let before = text[..i].chars().next_back();
        let after = text[i + phrase.len()..].chars().next();
        !before.is_some_and(|c| c.is_alphanumeric()) && !after.is_some_and(|c| c.is_alphanumeric())
    })
}

fn match_program(text: &str) -> Option<ProgramLevel> {
    let undergrad = contains_any(text, UNDERGRAD_WORDS);
    let grad = contains_any(text, GRAD_WORDS);
    match (undergrad, grad) {
        (true, false) => Some(ProgramLevel::Undergraduate),
        (false, true) => Some(ProgramLevel::Graduate),
        _ => None,
    }
}

enum AdvisorMatch<'a> {
    One(&'a Advisor),
    Several(Vec<String>),
    None,
}

fn match_advisor<'a>(text: &str, advisors: &'a [Advisor]) -> AdvisorMatch<'a> {
    if let Some(advisor) = advisors.iter().find(|a| {
        contains_phrase(text, &a.advisor_id.to_lowercase())
            || contains_phrase(text, &a.email.to_lowercase())
    }) {
        return AdvisorMatch::One(advisor);
    }

    let by_name: Vec<&'a Advisor> = advisors
        .iter()
        .filter(|a| {
            let email_local = a.email.split('@').next().unwrap_or("").to_lowercase();
            (email_local.len() >= 3 && contains_phrase(text, &email_local))
                || name_tokens(&a.name).any(|token| contains_phrase(text, &token))
        })
        .collect();

    match by_name.as_slice() {
        [one] => return AdvisorMatch::One(*one),
        [] => {}
        several => {
            // a full name beats a shared first or last name
            let full: Vec<&'a Advisor> = several
                .iter()
                .copied()
                .filter(|a| contains_phrase(text, &a.name.to_lowercase()))
                .collect();
            if let [one] = full.as_slice() {
                return AdvisorMatch::One(*one);
            }
            return AdvisorMatch::Several(several.iter().map(|a| a.name.clone()).collect());
        }
    }

    match parse_ordinal(text) {
        Some(n) if n <= advisors.len() => AdvisorMatch::One(&advisors[n - 1]),
        _ => AdvisorMatch::None,
    }
}

fn name_tokens(name: &str) -> impl Iterator<Item = String> + '_ {
    name.split(|c: char| c.is_whitespace() || c == ',')
        .map(|t| t.trim_matches('.').to_lowercase())
        .filter(|t| t.len() >= 3 && !matches!(t.as_str(), "dr" | "prof" | "mrs" | "phd"))
}

fn suggestion_by_ordinal(text: &str, suggestions: &[DateSuggestion]) -> Option<NaiveDate> {
    if suggestions.is_empty() {
        return None;
    }
    let n = parse_ordinal(text)?;
    suggestions.get(n.checked_sub(1)?).map(|s| s.date)
}

fn advisor_list(advisors: &[Advisor]) -> String {
    advisors
        .iter()
        .enumerate()
        .map(|(i, a)| format!("{}. {} ({})", i + 1, a.name, a.display_title()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Numbered across dates so an ordinal reply maps straight to an index.
fn slot_list(slots: &[Slot]) -> String {
    let mut out = String::new();
    let mut current: Option<NaiveDate> = None;
    for (i, slot) in slots.iter().enumerate() {
        if current != Some(slot.date()) {
            current = Some(slot.date());
            out.push_str(&format!("{}:\n", format_date(&slot.date())));
        }
        out.push_str(&format!("  {}. {}\n", i + 1, slot.time_label()));
    }
    out.trim_end().to_string()
}

fn summary(context: &BookingContext) -> String {
    let mut out = String::from("Appointment summary:\n");
    if let Some(advisor) = &context.advisor {
        out.push_str(&format!("- Advisor: {}\n", advisor.name));
    }
    if let Some(slot) = &context.slot {
        out.push_str(&format!("- Date: {}\n", format_date(&slot.date())));
        out.push_str(&format!("- Time: {}\n", slot.time_label()));
    }
    if let Some(reason) = &context.reason {
        out.push_str(&format!("- Reason: {reason}\n"));
    }
    out.push_str("Does this look correct? Say 'yes' to confirm or 'no' to make changes.");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, queries, Database};
    use crate::models::{Appointment, AppointmentStatus, Student, WorkingHours};
    use crate::services::directory::SqliteDirectory;
    use crate::services::notify::LogNotifier;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // 2030-01-07 is a Monday
    fn now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2030-01-07 09:00", "%Y-%m-%d %H:%M").unwrap()
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn advisor(id: &str, name: &str, level: ProgramLevel) -> Advisor {
        Advisor {
            advisor_id: id.into(),
            name: name.into(),
            email: id.into(),
            phone: None,
            title: Some("Academic Advisor".into()),
            program_level: level,
            office_location: None,
        }
    }

    struct FailingNotifier(AtomicUsize);

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn send_confirmation(&self, _a: &Appointment, _adv: &Advisor) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("smtp down")
        }
    }

    struct Fixture {
        conversation: BookingConversation,
        booking: Arc<BookingManager>,
        slots: Arc<SlotEngine>,
    }

    fn fixture_with(notifier: Arc<dyn Notifier>) -> Fixture {
        let conn = db::init_db(":memory:").unwrap();
        queries::save_student(
            &conn,
            &Student {
                student_id: "S1".into(),
                email: "s1@example.edu".into(),
                name: "Sam".into(),
                program_level: ProgramLevel::Undergraduate,
            },
        )
        .unwrap();
        for a in [
            advisor("ada@example.edu", "Ada Lovelace", ProgramLevel::Undergraduate),
            advisor("alan@example.edu", "Alan Turing", ProgramLevel::Undergraduate),
            advisor("grace@example.edu", "Grace Hopper", ProgramLevel::Graduate),
        ] {
            queries::save_advisor(&conn, &a).unwrap();
        }

        let db = Arc::new(Database::new(conn));
        let slots = Arc::new(SlotEngine::new(db.clone(), WorkingHours::default()));
        let booking = Arc::new(BookingManager::new(db.clone(), WorkingHours::default()));
        let conversation = BookingConversation::new(
            Arc::new(SqliteDirectory::new(db)),
            slots.clone(),
            booking.clone(),
            Arc::new(DateTimeResolver::rules_only(30)),
            notifier,
        );
        Fixture {
            conversation,
            booking,
            slots,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(LogNotifier))
    }

    async fn step(f: &Fixture, ctx: &BookingContext, text: &str) -> Turn {
        f.conversation.process_at(text, ctx, now()).await.unwrap()
    }

    async fn at_date(f: &Fixture) -> BookingContext {
        let (ctx, _) = f.conversation.initialize_booking("S1").unwrap();
        let ctx = step(f, &ctx, "I'm an undergrad").await.context;
        step(f, &ctx, "Ada please").await.context
    }

    #[tokio::test]
    async fn test_full_booking_flow() {
        let f = fixture();
        let (ctx, prompt) = f.conversation.initialize_booking("S1").unwrap();
        assert!(prompt.contains("undergraduate"));
        assert_eq!(ctx.state, ConversationState::NeedProgram);

        let turn = step(&f, &ctx, "undergraduate").await;
        assert_eq!(turn.state(), ConversationState::NeedAdvisor);
        assert!(matches!(&turn.action, BookingAction::ShowAdvisors { advisors } if advisors.len() == 2));

        let turn = step(&f, &turn.context, "ada@example.edu").await;
        assert_eq!(turn.state(), ConversationState::NeedDate);

        let turn = step(&f, &turn.context, "next Monday").await;
        assert_eq!(turn.state(), ConversationState::NeedTime);
        assert_eq!(turn.context.requested_dates, vec![d("2030-01-14")]);

        let turn = step(&f, &turn.context, "2pm").await;
        assert_eq!(turn.state(), ConversationState::NeedReason);
        let chosen = turn.context.slot.clone().unwrap();
        assert_eq!(chosen.start, d("2030-01-14").and_hms_opt(14, 0, 0).unwrap());

        let turn = step(&f, &turn.context, "skip").await;
        assert_eq!(turn.state(), ConversationState::Confirming);
        assert_eq!(turn.context.reason, None);

        let turn = step(&f, &turn.context, "yes").await;
        assert_eq!(turn.state(), ConversationState::Complete);
        let BookingAction::Booked { appointment } = &turn.action else {
            panic!("expected booked action, got {:?}", turn.action);
        };
        assert_eq!(appointment.status, AppointmentStatus::Booked);
        assert_eq!(appointment.slot_datetime, chosen.start);
        assert!(appointment.notification_sent);

        let remaining = f
            .slots
            .available_slots_at("ada@example.edu", DateRange::single(d("2030-01-14")), now())
            .unwrap();
        assert!(!remaining.iter().any(|s| s.start == chosen.start));
    }

    #[tokio::test]
    async fn test_unknown_student_cannot_start() {
        let f = fixture();
        assert!(matches!(
            f.conversation.initialize_booking("S9"),
            Err(BookingError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unrecognized_program_keeps_context() {
        let f = fixture();
        let (ctx, _) = f.conversation.initialize_booking("S1").unwrap();
        let turn = step(&f, &ctx, "I study biology").await;
        assert_eq!(turn.context, ctx);
        assert_eq!(turn.action, BookingAction::Clarify);
    }

    #[test]
    fn test_program_vocabulary() {
        assert_eq!(match_program("graduate"), Some(ProgramLevel::Graduate));
        assert_eq!(match_program("undergraduate"), Some(ProgramLevel::Undergraduate));
        assert_eq!(match_program("ms student"), Some(ProgramLevel::Graduate));
        assert_eq!(match_program("bs or ms"), None);
    }

    #[tokio::test]
    async fn test_global_cancel_from_any_state() {
        let f = fixture();
        let ctx = at_date(&f).await;
        let turn = step(&f, &ctx, "never mind").await;
        assert_eq!(turn.state(), ConversationState::Cancelled);
        assert_eq!(turn.action, BookingAction::Cancelled);
        // original context untouched
        assert_eq!(ctx.state, ConversationState::NeedDate);

        let after = step(&f, &turn.context, "undergraduate").await;
        assert_eq!(after.state(), ConversationState::Cancelled);
    }

    #[tokio::test]
    async fn test_reason_containing_cancel_word_is_kept() {
        let f = fixture();
        let ctx = at_date(&f).await;
        let ctx = step(&f, &ctx, "next monday").await.context;
        let ctx = step(&f, &ctx, "10am").await.context;
        let turn = step(&f, &ctx, "Whether to stop my minor").await;
        assert_eq!(turn.state(), ConversationState::Confirming);
        assert_eq!(turn.context.reason.as_deref(), Some("Whether to stop my minor"));

        let turn = step(&f, &ctx, "cancel").await;
        assert_eq!(turn.state(), ConversationState::Cancelled);
    }

    #[tokio::test]
    async fn test_advisor_by_number_and_no_match() {
        let f = fixture();
        let (ctx, _) = f.conversation.initialize_booking("S1").unwrap();
        let ctx = step(&f, &ctx, "undergrad").await.context;

        let turn = step(&f, &ctx, "2").await;
        assert_eq!(turn.context.advisor.unwrap().name, "Alan Turing");

        let turn = step(&f, &ctx, "someone nice").await;
        assert_eq!(turn.state(), ConversationState::NeedAdvisor);
        assert_eq!(turn.context, ctx);
    }

    #[tokio::test]
    async fn test_weekend_request_suggests_alternatives_then_ordinal_picks_first() {
        let f = fixture();
        let ctx = at_date(&f).await;
        // block part of Tuesday so it ranks below the full days
        for hour in 8..12 {
            f.booking
                .block_slot("ada@example.edu", d("2030-01-15").and_hms_opt(hour, 0, 0).unwrap())
                .unwrap();
        }

        let turn = step(&f, &ctx, "Saturday").await;
        assert_eq!(turn.state(), ConversationState::NeedDate);
        let BookingAction::SuggestAlternatives { dates } = &turn.action else {
            panic!("expected suggestions, got {:?}", turn.action);
        };
        assert!(dates.len() <= 5 && !dates.is_empty());
        for pair in dates.windows(2) {
            assert!(pair[0].slot_count >= pair[1].slot_count);
        }
        assert!(dates.iter().all(|s| s.date > d("2030-01-12")));

        let first = dates[0].date;
        let turn = step(&f, &turn.context, "the first one").await;
        assert_eq!(turn.state(), ConversationState::NeedTime);
        assert!(!turn.context.available_slots.is_empty());
        assert!(turn.context.available_slots.iter().all(|s| s.date() == first));
    }

    #[tokio::test]
    async fn test_iso_echo_of_suggestion_moves_to_time() {
        let f = fixture();
        let ctx = at_date(&f).await;
        let turn = step(&f, &ctx, "sunday").await;
        let BookingAction::SuggestAlternatives { dates } = &turn.action else {
            panic!("expected suggestions");
        };
        let iso = dates[0].date.format("%Y-%m-%d").to_string();
        let turn = step(&f, &turn.context, &iso).await;
        assert_eq!(turn.state(), ConversationState::NeedTime);
    }

    #[tokio::test]
    async fn test_unparseable_date_and_time_hold_state() {
        let f = fixture();
        let ctx = at_date(&f).await;
        let turn = step(&f, &ctx, "whenever suits").await;
        assert_eq!(turn.context, ctx);

        let ctx = step(&f, &ctx, "tomorrow").await.context;
        assert_eq!(ctx.state, ConversationState::NeedTime);
        let turn = step(&f, &ctx, "11pm").await;
        assert_eq!(turn.state(), ConversationState::NeedTime);
        assert_eq!(turn.context, ctx);
    }

    #[tokio::test]
    async fn test_negative_confirmation_returns_to_date() {
        let f = fixture();
        let ctx = at_date(&f).await;
        let ctx = step(&f, &ctx, "tomorrow").await.context;
        let ctx = step(&f, &ctx, "afternoon").await.context;
        let ctx = step(&f, &ctx, "course planning").await.context;
        assert_eq!(ctx.state, ConversationState::Confirming);

        let held = step(&f, &ctx, "hmm let me think").await;
        assert_eq!(held.context, ctx);
        assert_eq!(held.action, BookingAction::Clarify);

        let turn = step(&f, &ctx, "no").await;
        assert_eq!(turn.state(), ConversationState::NeedDate);
        assert_eq!(turn.action, BookingAction::Modify);
        assert!(turn.context.slot.is_none());
        assert!(turn.context.advisor.is_some());

        let turn = step(&f, &ctx, "no, change advisor").await;
        assert_eq!(turn.state(), ConversationState::NeedAdvisor);
        assert!(turn.context.advisor.is_none());
    }

    #[tokio::test]
    async fn test_lost_race_offers_remaining_slots() {
        let f = fixture();
        let ctx = at_date(&f).await;
        let ctx = step(&f, &ctx, "tomorrow").await.context;
        let ctx = step(&f, &ctx, "2pm").await.context;
        let ctx = step(&f, &ctx, "skip").await.context;

        // someone else books the same slot in the meantime
        let slot = ctx.slot.clone().unwrap();
        take_slot(&f, slot.start);

        let turn = step(&f, &ctx, "yes").await;
        assert_eq!(turn.state(), ConversationState::NeedTime);
        assert!(turn.message.contains("no longer available"));
        assert!(!turn.context.available_slots.iter().any(|s| s.start == slot.start));
    }

    fn take_slot(f: &Fixture, start: NaiveDateTime) {
        f.booking.block_slot("ada@example.edu", start).unwrap();
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_unwind_booking() {
        let notifier = Arc::new(FailingNotifier(AtomicUsize::new(0)));
        let f = fixture_with(notifier.clone());
        let ctx = at_date(&f).await;
        let ctx = step(&f, &ctx, "tomorrow").await.context;
        let ctx = step(&f, &ctx, "9am").await.context;
        let ctx = step(&f, &ctx, "none").await.context;
        let turn = step(&f, &ctx, "book it").await;

        assert_eq!(turn.state(), ConversationState::Complete);
        assert_eq!(notifier.0.load(Ordering::SeqCst), 1);
        let id = turn.context.appointment_id.unwrap();
        let stored = f.booking.get_appointment(&id).unwrap();
        assert_eq!(stored.status, AppointmentStatus::Booked);
        assert!(!stored.notification_sent);
    }

    #[tokio::test]
    async fn test_missing_prerequisites_fall_back() {
        let f = fixture();
        let mut ctx = BookingContext::new("S1");
        ctx.state = ConversationState::Confirming;
        let turn = step(&f, &ctx, "yes").await;
        assert_eq!(turn.state(), ConversationState::NeedProgram);
    }

    #[tokio::test]
    async fn test_full_fortnight_falls_back_to_later_window() {
        let f = fixture();
        let ctx = at_date(&f).await;
        // Saturday 2030-01-12 is requested; fill every slot of the next 14 days
        for date in DateRange::new(d("2030-01-13"), d("2030-01-26")).days() {
            for slot in f.slots.generate_slots("ada@example.edu", DateRange::single(date)) {
                f.booking.block_slot("ada@example.edu", slot.start).unwrap();
            }
        }

        let turn = step(&f, &ctx, "Saturday").await;
        let BookingAction::SuggestAlternatives { dates } = &turn.action else {
            panic!("expected suggestions, got {:?}", turn.action);
        };
        let suggested: Vec<NaiveDate> = dates.iter().map(|s| s.date).collect();
        assert_eq!(
            suggested,
            vec![d("2030-01-28"), d("2030-01-29"), d("2030-01-30"), d("2030-01-31"), d("2030-02-01")]
        );
        assert!(dates.iter().all(|s| s.slot_count == 18));

        // the displayed date reads back as that one date
        let turn = step(&f, &turn.context, &format_date(&d("2030-01-29"))).await;
        assert_eq!(turn.state(), ConversationState::NeedTime);
        assert_eq!(turn.context.requested_dates, vec![d("2030-01-29")]);
    }

    #[tokio::test]
    async fn test_period_is_named_and_part_of_day_backs_up_clock_time() {
        let f = fixture();
        let ctx = at_date(&f).await;

        let turn = step(&f, &ctx, "next week").await;
        assert_eq!(turn.state(), ConversationState::NeedTime);
        assert!(turn.message.contains("for next week"), "{}", turn.message);

        let ctx = step(&f, &ctx, "next monday").await.context;
        let turn = step(&f, &ctx, "in the afternoon, around 6pm").await;
        assert_eq!(turn.state(), ConversationState::NeedReason);
        assert_eq!(
            turn.context.slot.unwrap().start,
            d("2030-01-14").and_hms_opt(12, 0, 0).unwrap()
        );

        let turn = step(&f, &ctx, "evening").await;
        assert_eq!(turn.state(), ConversationState::NeedTime);
    }

    #[test]
    fn test_short_advisor_id_matches_whole_word_only() {
        let mut a1 = advisor("a1", "Ada Lovelace", ProgramLevel::Undergraduate);
        a1.email = "ada@example.edu".into();
        let mut a12 = advisor("a12", "Alan Turing", ProgramLevel::Undergraduate);
        a12.email = "alan@example.edu".into();
        let advisors = vec![a1, a12];

        assert!(matches!(match_advisor("a12", &advisors), AdvisorMatch::One(a) if a.name == "Alan Turing"));
        assert!(matches!(match_advisor("book with a1 please", &advisors), AdvisorMatch::One(a) if a.name == "Ada Lovelace"));
    }

    #[test]
    fn test_contains_phrase_is_whole_word() {
        assert!(contains_phrase("ok then", "ok"));
        assert!(!contains_phrase("book", "ok"));
        assert!(contains_phrase("please stop.", "stop"));
        assert!(!contains_phrase("nonstop", "stop"));
    }
}
