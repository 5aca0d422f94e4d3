//! Consultation Booking Service
//!
//! Availability and booking engine for staff consultations. Clients query
//! bookable slots computed from working hours, vacations, external calendar
//! busy periods and existing bookings, then book one; a booking is admitted
//! only if no other time-blocking booking of the same staff member overlaps it.
//!
//! # Modules
//!
//! - `services::time_slots`: slot generation and the shared availability view
//! - `services::booking`: admission, cancellation and the booking lifecycle
//! - `services::ledger`: CSV-backed booking store with atomic check-and-insert
//! - `client`: calendar provider client (busy periods and event creation)
//! - `auth`: request signing, cancel tokens and admin claims

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;

#[cfg(test)]
mod client_mock;

// Re-export the main API types for ease of use
pub use client::CalendarClient;
pub use config::AppConfig;
pub use error::{BookingError, BookingResult};
pub use handlers::api::AppState;
pub use routes::create_router;
