pub mod ai;
pub mod booking;
pub mod calendar;
pub mod conversation;
pub mod directory;
pub mod notify;
pub mod resolver;
pub mod sessions;
pub mod slots;
