use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Advisor, Appointment, ProgramLevel, Slot};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    NeedProgram,
    NeedAdvisor,
    NeedDate,
    NeedTime,
    NeedReason,
    Confirming,
    Complete,
    Cancelled,
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationState::NeedProgram => "need_program",
            ConversationState::NeedAdvisor => "need_advisor",
            ConversationState::NeedDate => "need_date",
            ConversationState::NeedTime => "need_time",
            ConversationState::NeedReason => "need_reason",
            ConversationState::Confirming => "confirming",
            ConversationState::Complete => "complete",
            ConversationState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConversationState::Complete | ConversationState::Cancelled)
    }
}

/// Chosen advisor, as much of it as later turns need.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdvisorRef {
    pub advisor_id: String,
    pub name: String,
    pub title: Option<String>,
}

impl From<&Advisor> for AdvisorRef {
    fn from(advisor: &Advisor) -> Self {
        Self {
            advisor_id: advisor.advisor_id.clone(),
            name: advisor.name.clone(),
            title: advisor.title.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DateSuggestion {
    pub date: NaiveDate,
    pub slot_count: usize,
}

/// Everything one booking dialogue has collected so far. Transitions never
/// mutate a context in place; they return a new one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingContext {
    pub student_id: String,
    pub state: ConversationState,
    pub program_level: Option<ProgramLevel>,
    pub candidate_advisors: Vec<Advisor>,
    pub advisor: Option<AdvisorRef>,
    pub requested_dates: Vec<NaiveDate>,
    pub available_slots: Vec<Slot>,
    pub suggested_dates: Vec<DateSuggestion>,
    pub slot: Option<Slot>,
    pub reason: Option<String>,
    pub appointment_id: Option<String>,
}

impl BookingContext {
    pub fn new(student_id: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
            state: ConversationState::NeedProgram,
            program_level: None,
            candidate_advisors: vec![],
            advisor: None,
            requested_dates: vec![],
            available_slots: vec![],
            suggested_dates: vec![],
            slot: None,
            reason: None,
            appointment_id: None,
        }
    }

    /// Same context, moved to `state`.
    pub fn with_state(&self, state: ConversationState) -> Self {
        Self {
            state,
            ..self.clone()
        }
    }

    /// Whether `state` may be entered with what has been collected.
    pub fn satisfies(&self, state: ConversationState) -> bool {
        match state {
            ConversationState::NeedProgram | ConversationState::Cancelled => true,
            ConversationState::NeedAdvisor => self.program_level.is_some(),
            ConversationState::NeedDate => self.program_level.is_some() && self.advisor.is_some(),
            ConversationState::NeedTime => {
                self.satisfies(ConversationState::NeedDate) && !self.available_slots.is_empty()
            }
            ConversationState::NeedReason | ConversationState::Confirming => {
                self.satisfies(ConversationState::NeedDate) && self.slot.is_some()
            }
            ConversationState::Complete => self.appointment_id.is_some(),
        }
    }

    /// Furthest non-terminal state whose prerequisites are all present.
    pub fn furthest_reachable(&self) -> ConversationState {
        [
            ConversationState::Confirming,
            ConversationState::NeedTime,
            ConversationState::NeedDate,
            ConversationState::NeedAdvisor,
        ]
        .into_iter()
        .find(|s| self.satisfies(*s))
        .unwrap_or(ConversationState::NeedProgram)
    }
}

/// Rendering hint for the chat client.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BookingAction {
    Prompt,
    Clarify,
    ShowAdvisors { advisors: Vec<Advisor> },
    ShowSlots { slots: Vec<Slot> },
    SuggestAlternatives { dates: Vec<DateSuggestion> },
    NoSlots,
    ConfirmSummary,
    Modify,
    Booked { appointment: Appointment },
    Cancelled,
    Error,
}

/// Result of feeding one utterance to the state machine.
#[derive(Debug, Clone)]
pub struct Turn {
    pub context: BookingContext,
    pub message: String,
    pub action: BookingAction,
}

impl Turn {
    pub fn new(context: BookingContext, message: impl Into<String>, action: BookingAction) -> Self {
        Self {
            context,
            message: message.into(),
            action,
        }
    }

    pub fn state(&self) -> ConversationState {
        self.context.state
    }
}
