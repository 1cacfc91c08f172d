pub mod appointment;
pub mod calendar;
pub mod conversation;
pub mod directory;
pub mod extraction;

pub use appointment::{Appointment, AppointmentStatus};
pub use calendar::{BlockStatus, CalendarBlock, DateRange, Slot, WorkingHours};
pub use conversation::{
    AdvisorRef, BookingAction, BookingContext, ConversationState, DateSuggestion, Turn,
};
pub use directory::{Advisor, ProgramLevel, Student};
pub use extraction::ExtractedBookingInfo;
