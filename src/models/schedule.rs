use chrono::{Duration, FixedOffset, NaiveDate, NaiveTime, Offset, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::BookingError;

pub const MAX_DURATION_MINUTES: u32 = 480;
pub const MAX_BUFFER_MINUTES: u32 = 60;
pub const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

fn default_true() -> bool {
    true
}

/// A staff member who can be booked for consultations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    /// Fixed offset of the staff member's local time from UTC.
    #[serde(default)]
    pub utc_offset_minutes: i32,
    /// Opaque reference into the external calendar provider.
    #[serde(default)]
    pub calendar_id: Option<String>,
}

impl StaffMember {
    pub fn timezone(&self) -> FixedOffset {
        // Range is checked at ingress; fall back to UTC rather than panic.
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    pub fn validate(&self) -> Result<(), BookingError> {
        if self.id.trim().is_empty() {
            return Err(BookingError::Validation("staff id must not be empty".into()));
        }
        if !(-MAX_UTC_OFFSET_MINUTES..=MAX_UTC_OFFSET_MINUTES).contains(&self.utc_offset_minutes) {
            return Err(BookingError::Validation(format!(
                "staff {} has utc_offset_minutes {} outside +/-{}",
                self.id, self.utc_offset_minutes, MAX_UTC_OFFSET_MINUTES
            )));
        }
        Ok(())
    }
}

/// Whether a new booking is confirmed straight away or needs approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfirmationMode {
    #[default]
    Immediate,
    Manual,
}

/// Mode adjustment applied when the client booked recently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecentModeOverride {
    #[default]
    Keep,
    SwitchToManual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsultationType {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub duration_minutes: u32,
    #[serde(default)]
    pub buffer_before_minutes: u32,
    #[serde(default)]
    pub buffer_after_minutes: u32,
    #[serde(default)]
    pub mode: ConfirmationMode,
    #[serde(default)]
    pub recent_mode_override: RecentModeOverride,
    #[serde(default)]
    pub display_order: i32,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl ConsultationType {
    pub fn duration(&self) -> Duration {
        Duration::minutes(self.duration_minutes as i64)
    }

    pub fn buffer_before(&self) -> Duration {
        Duration::minutes(self.buffer_before_minutes as i64)
    }

    pub fn buffer_after(&self) -> Duration {
        Duration::minutes(self.buffer_after_minutes as i64)
    }

    /// Duration plus both buffers: the span a booking reserves.
    pub fn total_duration(&self) -> Duration {
        self.buffer_before() + self.duration() + self.buffer_after()
    }

    /// Mode a new booking gets, taking the recent-customer override into account.
    pub fn effective_mode(&self, recent_customer: bool) -> ConfirmationMode {
        match (self.mode, self.recent_mode_override, recent_customer) {
            (ConfirmationMode::Manual, _, _) => ConfirmationMode::Manual,
            (ConfirmationMode::Immediate, RecentModeOverride::SwitchToManual, true) => {
                ConfirmationMode::Manual
            }
            _ => ConfirmationMode::Immediate,
        }
    }

    pub fn validate(&self) -> Result<(), BookingError> {
        if self.id.trim().is_empty() {
            return Err(BookingError::Validation(
                "consultation type id must not be empty".into(),
            ));
        }
        if self.duration_minutes < 1 || self.duration_minutes > MAX_DURATION_MINUTES {
            return Err(BookingError::Validation(format!(
                "consultation type {} duration {} must be within 1..={} minutes",
                self.id, self.duration_minutes, MAX_DURATION_MINUTES
            )));
        }
        if self.buffer_before_minutes > MAX_BUFFER_MINUTES
            || self.buffer_after_minutes > MAX_BUFFER_MINUTES
        {
            return Err(BookingError::Validation(format!(
                "consultation type {} buffers must be within 0..={} minutes",
                self.id, MAX_BUFFER_MINUTES
            )));
        }
        Ok(())
    }
}

/// Weekly recurring working interval in the staff member's local time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHourRule {
    pub staff_id: String,
    pub day_of_week: Weekday,
    #[serde(with = "clock_time")]
    pub start_time: NaiveTime,
    #[serde(with = "clock_time")]
    pub end_time: NaiveTime,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl WorkingHourRule {
    pub fn validate(&self) -> Result<(), BookingError> {
        if self.start_time >= self.end_time {
            return Err(BookingError::Validation(format!(
                "working hours for staff {} on {} start at {} but end at {}",
                self.staff_id, self.day_of_week, self.start_time, self.end_time
            )));
        }
        Ok(())
    }
}

/// A whole day off for one staff member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VacationException {
    pub staff_id: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub reason: Option<String>,
}

/// `HH:MM` (or `HH:MM:SS`) wall-clock times in the schedule catalog.
mod clock_time {
    use chrono::NaiveTime;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(|e| D::Error::custom(format!("invalid time '{}': {}", raw, e)))
    }
}
