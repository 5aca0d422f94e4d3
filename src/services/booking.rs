use chrono::{DateTime, Duration, Utc};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::{generate_cancel_token, AdminClaims};
use crate::error::{BookingError, BookingResult, UpstreamError};
use crate::models::booking::{Booking, BookingStatus, BookingSummary, ClientInfo};
use crate::models::schedule::{ConfirmationMode, ConsultationType, StaffMember};
use crate::services::calendar::CalendarEventSink;
use crate::services::ledger::{Admission, BookingLedger, TokenCancellation, Transition};
use crate::services::notifications::{
    dispatch_in_background, NotificationDispatcher, NotificationEvent, NotificationKind,
};
use crate::services::schedule::ScheduleStore;
use crate::services::time_slots::SlotGenerator;

pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy)]
pub struct BookingSettings {
    /// Bookings created within this window make a client "recent". Zero disables the check.
    pub recency_window: Duration,
    /// Upper bound for each post-commit side effect.
    pub side_effect_timeout: std::time::Duration,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            recency_window: Duration::days(30),
            side_effect_timeout: std::time::Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdmissionRequest {
    pub staff_id: String,
    pub consultation_type_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub client: ClientInfo,
}

/// Admission controller and booking lifecycle.
///
/// The ledger's atomic insert is the single source of truth for double
/// booking. Calendar events and notifications run after the commit and never
/// undo it.
pub struct BookingService {
    schedule: Arc<ScheduleStore>,
    ledger: Arc<BookingLedger>,
    slots: Arc<SlotGenerator>,
    calendar: Arc<dyn CalendarEventSink>,
    notifier: Arc<dyn NotificationDispatcher>,
    settings: BookingSettings,
}

impl BookingService {
    pub fn new(
        schedule: Arc<ScheduleStore>,
        ledger: Arc<BookingLedger>,
        slots: Arc<SlotGenerator>,
        calendar: Arc<dyn CalendarEventSink>,
        notifier: Arc<dyn NotificationDispatcher>,
        settings: BookingSettings,
    ) -> Self {
        Self {
            schedule,
            ledger,
            slots,
            calendar,
            notifier,
            settings,
        }
    }

    /// Validate, re-check and atomically store a booking request.
    pub async fn admit_booking(
        &self,
        request: AdmissionRequest,
        now: DateTime<Utc>,
    ) -> BookingResult<Booking> {
        let client = request.client.normalized()?;

        if request.start_time >= request.end_time {
            return Err(BookingError::Validation(format!(
                "start {} must be before end {}",
                request.start_time, request.end_time
            )));
        }

        let consultation_type = self
            .slots
            .active_consultation_type(&request.consultation_type_id)?;
        let staff = self.slots.active_staff(&request.staff_id)?;

        // The client picked the slot from an older view of the type
        if request.end_time - request.start_time != consultation_type.duration() {
            return Err(BookingError::Conflict(format!(
                "consultation type {} now lasts {} minutes",
                consultation_type.id, consultation_type.duration_minutes
            )));
        }

        self.slots
            .check_slot_fits(&staff, &consultation_type, request.start_time, now)
            .await
            .map_err(BookingError::Conflict)?;

        let recent_customer = self.is_recent_customer(&client.email, now)?;
        let status = match consultation_type.effective_mode(recent_customer) {
            ConfirmationMode::Immediate => BookingStatus::Confirmed,
            ConfirmationMode::Manual => BookingStatus::PendingApproval,
        };
        debug!(
            "Client {} recent={} gets status {:?}",
            client.email, recent_customer, status
        );

        let booking = Booking {
            id: Uuid::new_v4(),
            staff_id: staff.id.clone(),
            consultation_type_id: consultation_type.id.clone(),
            start_time: request.start_time,
            end_time: request.end_time,
            buffer_before_minutes: consultation_type.buffer_before_minutes,
            buffer_after_minutes: consultation_type.buffer_after_minutes,
            status,
            client_name: client.name,
            client_email: client.email,
            client_phone: client.phone,
            client_notes: client.notes,
            cancel_token: generate_cancel_token(),
            calendar_event_id: None,
            meeting_link: None,
            created_at: now,
            updated_at: now,
        };

        let booking = match self.ledger.insert_if_free(booking)? {
            Admission::Admitted(booking) => booking,
            Admission::Conflict { conflicting_id } => {
                info!(
                    "Rejected booking for staff {} at {}: overlaps booking {}",
                    staff.id, request.start_time, conflicting_id
                );
                return Err(BookingError::Conflict(format!(
                    "staff {} is already booked at {}",
                    staff.id, request.start_time
                )));
            }
        };

        info!(
            "Admitted booking {} for {} with staff {} at {}",
            booking.id, booking.client_email, booking.staff_id, booking.start_time
        );

        Ok(self
            .run_post_commit_effects(booking, &staff, &consultation_type, now)
            .await)
    }

    /// True if the client created any booking inside the recency window.
    pub fn is_recent_customer(&self, email: &str, now: DateTime<Utc>) -> BookingResult<bool> {
        if self.settings.recency_window <= Duration::zero() {
            return Ok(false);
        }
        Ok(self
            .ledger
            .has_booking_for_email(email, now - self.settings.recency_window, now)?)
    }

    /// Client-side cancellation with the token returned at admission.
    ///
    /// Repeating a successful cancellation returns the cancelled booking again
    /// without a second notification.
    pub async fn cancel_booking(
        &self,
        booking_id: Uuid,
        cancel_token: Option<&str>,
        now: DateTime<Utc>,
    ) -> BookingResult<Booking> {
        let token = cancel_token
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(BookingError::InvalidToken)?;

        match self.ledger.cancel_with_token(booking_id, token, now)? {
            TokenCancellation::Cancelled(booking) => {
                self.remove_calendar_event(&booking).await;
                self.notify(&booking);
                Ok(booking)
            }
            TokenCancellation::AlreadyCancelled(booking) => {
                debug!("Booking {} was already cancelled", booking_id);
                Ok(booking)
            }
            TokenCancellation::Rejected => Err(BookingError::InvalidToken),
            TokenCancellation::NotCancellable(booking) => Err(BookingError::Validation(format!(
                "booking {} is {:?} and can no longer be cancelled",
                booking.id, booking.status
            ))),
        }
    }

    pub async fn admin_cancel(
        &self,
        claims: &AdminClaims,
        booking_id: Uuid,
        now: DateTime<Utc>,
    ) -> BookingResult<Booking> {
        self.update_status(claims, booking_id, BookingStatus::Cancelled, now).await
    }

    /// Move a booking through its lifecycle on behalf of an administrator.
    pub async fn update_status(
        &self,
        _claims: &AdminClaims,
        booking_id: Uuid,
        next: BookingStatus,
        now: DateTime<Utc>,
    ) -> BookingResult<Booking> {
        if matches!(next, BookingStatus::Completed | BookingStatus::NoShow) {
            let booking = self
                .ledger
                .find(booking_id)?
                .ok_or_else(|| BookingError::NotFound(format!("booking {}", booking_id)))?;
            if booking.end_time > now {
                return Err(BookingError::Validation(format!(
                    "booking {} has not ended yet",
                    booking_id
                )));
            }
        }

        match self.ledger.transition(booking_id, next, now)? {
            Transition::Changed { previous, booking } => {
                info!(
                    "Admin moved booking {} from {:?} to {:?}",
                    booking_id, previous, next
                );
                if next == BookingStatus::Cancelled {
                    self.remove_calendar_event(&booking).await;
                }
                self.notify(&booking);
                Ok(booking)
            }
            Transition::Unchanged(booking) => Ok(booking),
            Transition::NotAllowed(booking) => Err(BookingError::Validation(format!(
                "cannot move booking {} from {:?} to {:?}",
                booking_id, booking.status, next
            ))),
            Transition::NotFound => Err(BookingError::NotFound(format!("booking {}", booking_id))),
        }
    }

    /// Newest-first page of bookings and the total count. Pages start at 1.
    pub fn list_bookings(
        &self,
        _claims: &AdminClaims,
        page: usize,
        page_size: usize,
    ) -> BookingResult<(usize, Vec<BookingSummary>)> {
        if page == 0 {
            return Err(BookingError::Validation("page starts at 1".into()));
        }
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        let offset = (page - 1).saturating_mul(page_size);

        let (total, bookings) = self.ledger.list(offset, page_size)?;
        Ok((total, bookings.iter().map(BookingSummary::from).collect()))
    }

    pub fn reload_schedule(&self, _claims: &AdminClaims, path: &Path) -> BookingResult<()> {
        self.schedule.reload(path)
    }

    async fn run_post_commit_effects(
        &self,
        mut booking: Booking,
        staff: &StaffMember,
        consultation_type: &ConsultationType,
        now: DateTime<Utc>,
    ) -> Booking {
        let timeout = self.settings.side_effect_timeout;
        let created = match tokio::time::timeout(
            timeout,
            self.calendar.create_event(&booking, staff, consultation_type),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout(timeout)),
        };

        match created {
            Ok(Some(event)) => match self.ledger.attach_calendar_event(booking.id, &event, now) {
                Ok(Some(updated)) => booking = updated,
                Ok(None) => {}
                Err(err) => {
                    error!(
                        "Calendar event {} created but not recorded for booking {}: {}",
                        event.event_id, booking.id, err
                    );
                    booking.calendar_event_id = Some(event.event_id);
                    booking.meeting_link = event.meeting_link;
                }
            },
            Ok(None) => debug!("Staff {} has no external calendar", staff.id),
            Err(err) => warn!(
                "Calendar event for booking {} was not created, booking stays admitted: {}",
                booking.id, err
            ),
        }

        self.notify_with(&booking, Some(staff.clone()), Some(consultation_type.clone()));
        booking
    }

    /// Best-effort removal of a cancelled booking's calendar event.
    async fn remove_calendar_event(&self, booking: &Booking) {
        let Some(event_id) = booking.calendar_event_id.as_deref() else {
            return;
        };
        let Some(staff) = self.schedule.staff(&booking.staff_id) else {
            warn!(
                "Staff {} is no longer in the schedule, calendar event {} stays",
                booking.staff_id, event_id
            );
            return;
        };

        let timeout = self.settings.side_effect_timeout;
        let deleted = match tokio::time::timeout(timeout, self.calendar.delete_event(&staff, event_id))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout(timeout)),
        };

        match deleted {
            Ok(()) => info!("Removed calendar event {} of booking {}", event_id, booking.id),
            Err(err) => error!(
                "Calendar event {} of cancelled booking {} was not removed: {}",
                event_id, booking.id, err
            ),
        }
    }

    fn notify(&self, booking: &Booking) {
        let staff = self.schedule.staff(&booking.staff_id);
        let consultation_type = self.schedule.consultation_type(&booking.consultation_type_id);
        self.notify_with(booking, staff, consultation_type);
    }

    fn notify_with(
        &self,
        booking: &Booking,
        staff: Option<StaffMember>,
        consultation_type: Option<ConsultationType>,
    ) {
        let event = NotificationEvent {
            kind: NotificationKind::for_status(booking.status),
            booking: BookingSummary::from(booking),
            staff,
            consultation_type,
        };
        dispatch_in_background(Arc::clone(&self.notifier), event);
    }
}
