use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BookingError;

/// Half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeInterval {
    /// Returns `None` unless `start < end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn overlaps(&self, other: &TimeInterval) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, other: &TimeInterval) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Confirmed,
    PendingApproval,
    Cancelled,
    Completed,
    NoShow,
}

impl BookingStatus {
    /// Statuses that hold the staff member's time.
    pub fn blocks_time(self) -> bool {
        matches!(self, BookingStatus::Confirmed | BookingStatus::PendingApproval)
    }

    /// Allowed lifecycle moves. Staying in place is always allowed.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;

        if self == next {
            return true;
        }

        matches!(
            (self, next),
            (PendingApproval, Confirmed)
                | (PendingApproval, Cancelled)
                | (Confirmed, Cancelled)
                | (Confirmed, Completed)
                | (Confirmed, NoShow)
        )
    }
}

/// Client identity captured with a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ClientInfo {
    /// Trim fields and lower-case the email; reject obviously bad input.
    pub fn normalized(self) -> Result<Self, BookingError> {
        let name = self.name.trim().to_string();
        let email = self.email.trim().to_lowercase();

        if name.is_empty() {
            return Err(BookingError::Validation("client name is required".into()));
        }

        let plausible_email = match email.split_once('@') {
            Some((local, domain)) => !local.is_empty() && domain.contains('.') && !email.contains(' '),
            None => false,
        };
        if !plausible_email {
            return Err(BookingError::Validation(format!(
                "client email '{}' is not a valid address",
                email
            )));
        }

        let clean = |value: Option<String>| {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Ok(Self {
            name,
            email,
            phone: clean(self.phone),
            notes: clean(self.notes),
        })
    }
}

/// Durable booking record, one CSV row in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub staff_id: String,
    pub consultation_type_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    // Buffers in force when the booking was admitted
    pub buffer_before_minutes: u32,
    pub buffer_after_minutes: u32,
    pub status: BookingStatus,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: Option<String>,
    pub client_notes: Option<String>,
    pub cancel_token: String,
    pub calendar_event_id: Option<String>,
    pub meeting_link: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// The interval including turnaround buffers, used for conflict checks.
    pub fn buffered_interval(&self) -> TimeInterval {
        TimeInterval {
            start: self.start_time - Duration::minutes(self.buffer_before_minutes as i64),
            end: self.end_time + Duration::minutes(self.buffer_after_minutes as i64),
        }
    }

    /// True if this booking holds time that overlaps `interval` for `staff_id`.
    pub fn blocks(&self, staff_id: &str, interval: &TimeInterval) -> bool {
        self.staff_id == staff_id
            && self.status.blocks_time()
            && self.buffered_interval().overlaps(interval)
    }
}

/// Booking view without the cancel token, for admin listings and notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingSummary {
    pub id: Uuid,
    pub staff_id: String,
    pub consultation_type_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: BookingStatus,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: Option<String>,
    pub client_notes: Option<String>,
    pub calendar_event_id: Option<String>,
    pub meeting_link: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Booking> for BookingSummary {
    fn from(booking: &Booking) -> Self {
        Self {
            id: booking.id,
            staff_id: booking.staff_id.clone(),
            consultation_type_id: booking.consultation_type_id.clone(),
            start_time: booking.start_time,
            end_time: booking.end_time,
            status: booking.status,
            client_name: booking.client_name.clone(),
            client_email: booking.client_email.clone(),
            client_phone: booking.client_phone.clone(),
            client_notes: booking.client_notes.clone(),
            calendar_event_id: booking.calendar_event_id.clone(),
            meeting_link: booking.meeting_link.clone(),
            created_at: booking.created_at,
            updated_at: booking.updated_at,
        }
    }
}

/// A bookable slot for one staff member. Recomputed on every query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateSlot {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub staff_id: String,
}

/// A time bucket in the shared calendar view with every staff member free in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableSlot {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub available_staff: Vec<String>,
}
