pub mod booking;
pub mod calendar;
pub mod ledger;
pub mod notifications;
pub mod schedule;
pub mod time_slots;
