use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, WriterBuilder};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::tokens_match;
use crate::error::LedgerError;
use crate::models::booking::{Booking, BookingStatus, TimeInterval};
use crate::services::calendar::CalendarEventRef;

/// Result of the atomic check-and-insert.
#[derive(Debug)]
pub enum Admission {
    Admitted(Booking),
    /// Nothing was written; `conflicting_id` already holds the time.
    Conflict { conflicting_id: Uuid },
}

/// Result of a token-authenticated cancellation.
#[derive(Debug)]
pub enum TokenCancellation {
    Cancelled(Booking),
    AlreadyCancelled(Booking),
    /// Unknown id or wrong token; callers must not tell these apart.
    Rejected,
    NotCancellable(Booking),
}

/// Result of a status change.
#[derive(Debug)]
pub enum Transition {
    Changed { previous: BookingStatus, booking: Booking },
    Unchanged(Booking),
    NotAllowed(Booking),
    NotFound,
}

/// Durable booking store backed by a CSV file.
///
/// Every operation runs inside one critical section on `file_mutex`, so the
/// overlap check and the append in [`BookingLedger::insert_if_free`] cannot
/// interleave with another writer.
pub struct BookingLedger {
    csv_path: PathBuf,
    file_mutex: Mutex<()>,
}

impl BookingLedger {
    /// Open the ledger, creating the file (and its directory) if needed.
    pub fn open(csv_path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let csv_path = csv_path.as_ref().to_path_buf();

        if !csv_path.exists() {
            if let Some(dir) = csv_path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
                fs::create_dir_all(dir)?;
            }
            info!("Creating new booking ledger at {}", csv_path.display());
            File::create(&csv_path)?;
        }

        Ok(Self {
            csv_path,
            file_mutex: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.csv_path
    }

    /// Insert `booking` unless a time-blocking booking of the same staff member
    /// overlaps its buffered interval.
    pub fn insert_if_free(&self, booking: Booking) -> Result<Admission, LedgerError> {
        let _lock = self.lock()?;

        let requested = booking.buffered_interval();
        let existing = self.read_all()?;

        if let Some(conflict) = existing
            .iter()
            .find(|other| other.blocks(&booking.staff_id, &requested))
        {
            info!(
                "Rejected booking for staff {} at {}: overlaps booking {}",
                booking.staff_id, booking.start_time, conflict.id
            );
            return Ok(Admission::Conflict {
                conflicting_id: conflict.id,
            });
        }

        self.append(&booking)?;

        info!(
            "Stored booking {} for staff {} at {} with status {:?}",
            booking.id, booking.staff_id, booking.start_time, booking.status
        );

        Ok(Admission::Admitted(booking))
    }

    /// Buffered intervals of time-blocking bookings for `staff_id` overlapping `window`.
    pub fn blocking_intervals(
        &self,
        staff_id: &str,
        window: &TimeInterval,
    ) -> Result<Vec<TimeInterval>, LedgerError> {
        let _lock = self.lock()?;

        let intervals: Vec<TimeInterval> = self
            .read_all()?
            .iter()
            .filter(|booking| booking.blocks(staff_id, window))
            .map(Booking::buffered_interval)
            .collect();

        debug!(
            "Found {} blocking bookings for staff {} between {} and {}",
            intervals.len(),
            staff_id,
            window.start,
            window.end
        );

        Ok(intervals)
    }

    pub fn find(&self, booking_id: Uuid) -> Result<Option<Booking>, LedgerError> {
        let _lock = self.lock()?;
        Ok(self.read_all()?.into_iter().find(|b| b.id == booking_id))
    }

    /// Cancel with the capability token stored on the booking.
    pub fn cancel_with_token(
        &self,
        booking_id: Uuid,
        cancel_token: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenCancellation, LedgerError> {
        let _lock = self.lock()?;
        let mut bookings = self.read_all()?;

        let Some(index) = bookings.iter().position(|b| b.id == booking_id) else {
            warn!("Cancellation attempted for unknown booking {}", booking_id);
            return Ok(TokenCancellation::Rejected);
        };

        if !tokens_match(&bookings[index].cancel_token, cancel_token) {
            warn!("Cancellation token mismatch for booking {}", booking_id);
            return Ok(TokenCancellation::Rejected);
        }

        match bookings[index].status {
            BookingStatus::Cancelled => {
                return Ok(TokenCancellation::AlreadyCancelled(bookings[index].clone()))
            }
            status if !status.can_transition_to(BookingStatus::Cancelled) => {
                return Ok(TokenCancellation::NotCancellable(bookings[index].clone()))
            }
            _ => {}
        }

        bookings[index].status = BookingStatus::Cancelled;
        bookings[index].updated_at = now;
        let cancelled = bookings[index].clone();

        self.rewrite_all(&bookings)?;
        info!("Cancelled booking {} with client token", booking_id);

        Ok(TokenCancellation::Cancelled(cancelled))
    }

    /// Move a booking to `next` if the lifecycle allows it.
    pub fn transition(
        &self,
        booking_id: Uuid,
        next: BookingStatus,
        now: DateTime<Utc>,
    ) -> Result<Transition, LedgerError> {
        let _lock = self.lock()?;
        let mut bookings = self.read_all()?;

        let Some(index) = bookings.iter().position(|b| b.id == booking_id) else {
            return Ok(Transition::NotFound);
        };

        let previous = bookings[index].status;
        if previous == next {
            return Ok(Transition::Unchanged(bookings[index].clone()));
        }
        if !previous.can_transition_to(next) {
            return Ok(Transition::NotAllowed(bookings[index].clone()));
        }

        bookings[index].status = next;
        bookings[index].updated_at = now;
        let booking = bookings[index].clone();

        self.rewrite_all(&bookings)?;
        info!(
            "Booking {} moved from {:?} to {:?}",
            booking_id, previous, next
        );

        Ok(Transition::Changed { previous, booking })
    }

    /// Record the external calendar event created for a booking.
    pub fn attach_calendar_event(
        &self,
        booking_id: Uuid,
        event: &CalendarEventRef,
        now: DateTime<Utc>,
    ) -> Result<Option<Booking>, LedgerError> {
        let _lock = self.lock()?;
        let mut bookings = self.read_all()?;

        let Some(booking) = bookings.iter_mut().find(|b| b.id == booking_id) else {
            warn!(
                "Booking {} disappeared before its calendar event could be recorded",
                booking_id
            );
            return Ok(None);
        };

        booking.calendar_event_id = Some(event.event_id.clone());
        booking.meeting_link = event.meeting_link.clone();
        booking.updated_at = now;
        let updated = booking.clone();

        self.rewrite_all(&bookings)?;
        Ok(Some(updated))
    }

    /// True if `email` has any booking created within `[since, until]`.
    pub fn has_booking_for_email(
        &self,
        email: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<bool, LedgerError> {
        let _lock = self.lock()?;
        let email = email.trim().to_lowercase();

        Ok(self.read_all()?.iter().any(|booking| {
            booking.client_email.eq_ignore_ascii_case(&email)
                && booking.created_at >= since
                && booking.created_at <= until
        }))
    }

    /// Newest-first page of bookings and the total count.
    pub fn list(&self, offset: usize, limit: usize) -> Result<(usize, Vec<Booking>), LedgerError> {
        let _lock = self.lock()?;
        let mut bookings = self.read_all()?;
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = bookings.len();
        let page = bookings.into_iter().skip(offset).take(limit).collect();
        Ok((total, page))
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>, LedgerError> {
        self.file_mutex.lock().map_err(|_| LedgerError::Poisoned)
    }

    // Caller must hold the lock
    fn read_all(&self) -> Result<Vec<Booking>, LedgerError> {
        let file = match File::open(&self.csv_path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);
        let mut bookings = Vec::new();
        for record in reader.deserialize::<Booking>() {
            bookings.push(record?);
        }

        Ok(bookings)
    }

    // Caller must hold the lock
    fn append(&self, booking: &Booking) -> Result<(), LedgerError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.csv_path)?;
        let needs_headers = file.metadata()?.len() == 0;

        let mut writer = WriterBuilder::new()
            .has_headers(needs_headers)
            .from_writer(file);
        writer.serialize(booking)?;
        writer.flush()?;

        Ok(())
    }

    // Caller must hold the lock. Writes a sibling file and renames it over the ledger.
    fn rewrite_all(&self, bookings: &[Booking]) -> Result<(), LedgerError> {
        let tmp_path = self.csv_path.with_extension("csv.tmp");

        {
            let file = File::create(&tmp_path)?;
            let mut writer = WriterBuilder::new().has_headers(true).from_writer(file);
            for booking in bookings {
                writer.serialize(booking)?;
            }
            writer.flush()?;
        }

        fs::rename(&tmp_path, &self.csv_path)?;
        Ok(())
    }
}
