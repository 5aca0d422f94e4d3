use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::UpstreamError;
use crate::models::booking::{Booking, TimeInterval};
use crate::models::schedule::{ConsultationType, StaffMember};

/// Reference to an event created in the external calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEventRef {
    pub event_id: String,
    #[serde(default)]
    pub meeting_link: Option<String>,
}

/// Source of busy periods from a staff member's external calendar.
#[async_trait]
pub trait BusyPeriodSource: Send + Sync {
    async fn busy_periods(
        &self,
        staff: &StaffMember,
        window: TimeInterval,
    ) -> Result<Vec<TimeInterval>, UpstreamError>;
}

/// Creates and removes calendar events for bookings.
#[async_trait]
pub trait CalendarEventSink: Send + Sync {
    /// `Ok(None)` when the staff member has no external calendar.
    async fn create_event(
        &self,
        booking: &Booking,
        staff: &StaffMember,
        consultation_type: &ConsultationType,
    ) -> Result<Option<CalendarEventRef>, UpstreamError>;

    async fn delete_event(&self, staff: &StaffMember, event_id: &str) -> Result<(), UpstreamError>;
}

/// Stand-in used when no calendar provider is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCalendar;

#[async_trait]
impl BusyPeriodSource for NoCalendar {
    async fn busy_periods(
        &self,
        _staff: &StaffMember,
        _window: TimeInterval,
    ) -> Result<Vec<TimeInterval>, UpstreamError> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl CalendarEventSink for NoCalendar {
    async fn create_event(
        &self,
        _booking: &Booking,
        _staff: &StaffMember,
        _consultation_type: &ConsultationType,
    ) -> Result<Option<CalendarEventRef>, UpstreamError> {
        Ok(None)
    }

    async fn delete_event(&self, _staff: &StaffMember, _event_id: &str) -> Result<(), UpstreamError> {
        Ok(())
    }
}

/// Busy periods for `staff`, or none if the source fails.
///
/// Availability display must keep working while the calendar integration is
/// degraded; the ledger check at admission stays authoritative.
pub async fn busy_periods_or_empty(
    source: &dyn BusyPeriodSource,
    staff: &StaffMember,
    window: TimeInterval,
) -> Vec<TimeInterval> {
    match source.busy_periods(staff, window).await {
        Ok(periods) => {
            debug!(
                "Calendar reported {} busy periods for staff {}",
                periods.len(),
                staff.id
            );
            periods
        }
        Err(err) => {
            warn!(
                "Busy-period lookup failed for staff {}, continuing without external busy periods: {}",
                staff.id, err
            );
            Vec::new()
        }
    }
}
