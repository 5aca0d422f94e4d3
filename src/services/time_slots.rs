use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use futures::future::try_join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{BookingError, BookingResult};
use crate::models::booking::{AvailableSlot, CandidateSlot, TimeInterval};
use crate::models::schedule::{ConsultationType, StaffMember};
use crate::services::calendar::{busy_periods_or_empty, BusyPeriodSource};
use crate::services::ledger::BookingLedger;
use crate::services::schedule::ScheduleStore;

/// Tunables for slot generation.
#[derive(Debug, Clone, Copy)]
pub struct SlotRules {
    /// Distance between consecutive candidate starts.
    pub step: Duration,
    /// Lead time between `now` and the earliest bookable start.
    pub minimum_notice: Duration,
    /// Longest range a single query may cover.
    pub max_query_span: Duration,
}

impl Default for SlotRules {
    fn default() -> Self {
        Self {
            step: Duration::minutes(30),
            minimum_notice: Duration::hours(2),
            max_query_span: Duration::days(62),
        }
    }
}

/// Computes bookable slots from working hours, vacations, busy periods and the ledger.
///
/// Results are snapshots; the admission path re-checks everything before it writes.
pub struct SlotGenerator {
    schedule: Arc<ScheduleStore>,
    ledger: Arc<BookingLedger>,
    busy_source: Arc<dyn BusyPeriodSource>,
    rules: SlotRules,
}

impl SlotGenerator {
    pub fn new(
        schedule: Arc<ScheduleStore>,
        ledger: Arc<BookingLedger>,
        busy_source: Arc<dyn BusyPeriodSource>,
        rules: SlotRules,
    ) -> Self {
        Self {
            schedule,
            ledger,
            busy_source,
            rules,
        }
    }

    /// Bookable slots for one staff member in `[range_start, range_end)`.
    pub async fn compute_available_slots(
        &self,
        staff_id: &str,
        consultation_type_id: &str,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> BookingResult<Vec<CandidateSlot>> {
        let range = self.validate_range(range_start, range_end)?;
        let consultation_type = self.active_consultation_type(consultation_type_id)?;
        let staff = self.active_staff(staff_id)?;

        let slots = self
            .slots_for_staff(&staff, &consultation_type, range, now)
            .await?;

        info!(
            "Computed {} slots for staff {} and consultation type {} between {} and {}",
            slots.len(),
            staff.id,
            consultation_type.id,
            range.start,
            range.end
        );

        Ok(slots)
    }

    /// Shared calendar view: every time bucket where at least one staff member is free.
    ///
    /// Staff members are evaluated concurrently and independently.
    pub async fn compute_shared_availability(
        &self,
        consultation_type_id: &str,
        staff_filter: Option<&str>,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> BookingResult<Vec<AvailableSlot>> {
        let range = self.validate_range(range_start, range_end)?;
        let consultation_type = self.active_consultation_type(consultation_type_id)?;

        let staff = match staff_filter {
            Some(staff_id) => vec![self.active_staff(staff_id)?],
            None => self.schedule.active_staff(),
        };

        let per_staff = try_join_all(
            staff
                .iter()
                .map(|member| self.slots_for_staff(member, &consultation_type, range, now)),
        )
        .await?;

        let merged = merge_by_time(per_staff.into_iter().flatten());

        info!(
            "Computed {} shared slots across {} staff for consultation type {}",
            merged.len(),
            staff.len(),
            consultation_type.id
        );

        Ok(merged)
    }

    /// Re-validate a requested start against current schedule, notice and busy periods.
    ///
    /// Does not consult the ledger: the ledger's own atomic insert does that.
    /// Returns the reason the slot does not fit.
    pub async fn check_slot_fits(
        &self,
        staff: &StaffMember,
        consultation_type: &ConsultationType,
        start_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), String> {
        if start_time < now + self.rules.minimum_notice {
            return Err(format!(
                "start {} is within the minimum booking notice of {} minutes",
                start_time,
                self.rules.minimum_notice.num_minutes()
            ));
        }

        let buffered = buffered_interval(start_time, consultation_type);
        let tz = staff.timezone();
        let day = buffered.start.with_timezone(&tz).date_naive();

        if self.schedule.is_vacation(&staff.id, day) {
            return Err(format!("staff {} is on vacation on {}", staff.id, day));
        }

        let within_hours = self
            .schedule
            .working_intervals(&staff.id, day)
            .into_iter()
            .filter_map(|(open, close)| local_interval(day, open, close, tz))
            .any(|shift| shift.contains(&buffered));
        if !within_hours {
            return Err(format!(
                "{} - {} is outside the working hours of staff {}",
                buffered.start, buffered.end, staff.id
            ));
        }

        let busy = busy_periods_or_empty(self.busy_source.as_ref(), staff, buffered).await;
        if busy.iter().any(|period| period.overlaps(&buffered)) {
            return Err(format!("staff {} is busy in the external calendar", staff.id));
        }

        Ok(())
    }

    pub(crate) fn active_consultation_type(&self, type_id: &str) -> BookingResult<ConsultationType> {
        self.schedule
            .consultation_type(type_id)
            .filter(|t| t.active)
            .ok_or_else(|| {
                BookingError::Validation(format!("unknown or inactive consultation type {}", type_id))
            })
    }

    pub(crate) fn active_staff(&self, staff_id: &str) -> BookingResult<StaffMember> {
        self.schedule
            .staff(staff_id)
            .filter(|s| s.active)
            .ok_or_else(|| BookingError::Validation(format!("unknown or inactive staff {}", staff_id)))
    }

    fn validate_range(
        &self,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> BookingResult<TimeInterval> {
        let range = TimeInterval::new(range_start, range_end).ok_or_else(|| {
            BookingError::Validation(format!(
                "range start {} must be before range end {}",
                range_start, range_end
            ))
        })?;

        if range.duration() > self.rules.max_query_span {
            return Err(BookingError::Validation(format!(
                "range covers more than {} days",
                self.rules.max_query_span.num_days()
            )));
        }

        Ok(range)
    }

    async fn slots_for_staff(
        &self,
        staff: &StaffMember,
        consultation_type: &ConsultationType,
        range: TimeInterval,
        now: DateTime<Utc>,
    ) -> BookingResult<Vec<CandidateSlot>> {
        let tz = staff.timezone();
        let days = local_days(&range, tz);
        let Some(window) = days_window(&days, tz) else {
            return Ok(Vec::new());
        };

        // One fetch per staff member for the whole window
        let busy = busy_periods_or_empty(self.busy_source.as_ref(), staff, window).await;
        let booked = self.ledger.blocking_intervals(&staff.id, &window)?;

        let earliest_start = now + self.rules.minimum_notice;
        let total = consultation_type.total_duration();
        let mut slots = Vec::new();

        for day in days {
            if self.schedule.is_vacation(&staff.id, day) {
                debug!("Staff {} is on vacation on {}, skipping day", staff.id, day);
                continue;
            }

            let shifts = self.schedule.working_intervals(&staff.id, day);
            if shifts.is_empty() {
                debug!("Staff {} has no working hours on {}", staff.id, day);
                continue;
            }

            for (open, close) in shifts {
                let Some(shift) = local_interval(day, open, close, tz) else {
                    continue;
                };

                for buffered in candidate_windows(&shift, total, self.rules.step) {
                    let slot_start = buffered.start + consultation_type.buffer_before();

                    if slot_start < range.start || slot_start >= range.end {
                        continue;
                    }
                    if slot_start < earliest_start {
                        continue;
                    }
                    if busy.iter().any(|period| period.overlaps(&buffered)) {
                        debug!("Candidate {} overlaps a calendar busy period", slot_start);
                        continue;
                    }
                    if booked.iter().any(|held| held.overlaps(&buffered)) {
                        debug!("Candidate {} overlaps an existing booking", slot_start);
                        continue;
                    }

                    slots.push(CandidateSlot {
                        start_time: slot_start,
                        end_time: slot_start + consultation_type.duration(),
                        staff_id: staff.id.clone(),
                    });
                }
            }
        }

        // Overlapping split-shift rules can yield the same start twice
        slots.sort_by_key(|slot| slot.start_time);
        slots.dedup_by_key(|slot| slot.start_time);

        Ok(slots)
    }
}

/// The interval a booking starting at `start_time` reserves, buffers included.
pub fn buffered_interval(start_time: DateTime<Utc>, consultation_type: &ConsultationType) -> TimeInterval {
    TimeInterval {
        start: start_time - consultation_type.buffer_before(),
        end: start_time + consultation_type.duration() + consultation_type.buffer_after(),
    }
}

/// Buffered windows of length `total` stepping through `shift` from its start.
pub fn candidate_windows(shift: &TimeInterval, total: Duration, step: Duration) -> Vec<TimeInterval> {
    let mut windows = Vec::new();
    if step <= Duration::zero() || total <= Duration::zero() {
        return windows;
    }

    let mut start = shift.start;
    while start + total <= shift.end {
        windows.push(TimeInterval {
            start,
            end: start + total,
        });
        start += step;
    }

    windows
}

/// Group per-staff slots into shared time buckets, ordered by start.
pub fn merge_by_time(slots: impl IntoIterator<Item = CandidateSlot>) -> Vec<AvailableSlot> {
    let mut buckets: BTreeMap<(DateTime<Utc>, DateTime<Utc>), Vec<String>> = BTreeMap::new();

    for slot in slots {
        buckets
            .entry((slot.start_time, slot.end_time))
            .or_default()
            .push(slot.staff_id);
    }

    buckets
        .into_iter()
        .map(|((start_time, end_time), mut available_staff)| {
            available_staff.sort();
            available_staff.dedup();
            AvailableSlot {
                start_time,
                end_time,
                available_staff,
            }
        })
        .collect()
}

/// Local calendar days touched by `range`.
fn local_days(range: &TimeInterval, tz: FixedOffset) -> Vec<NaiveDate> {
    let first = range.start.with_timezone(&tz).date_naive();
    let last = (range.end - Duration::nanoseconds(1))
        .with_timezone(&tz)
        .date_naive();

    first.iter_days().take_while(|day| *day <= last).collect()
}

/// From local midnight of the first day to local midnight after the last.
fn days_window(days: &[NaiveDate], tz: FixedOffset) -> Option<TimeInterval> {
    let midnight = NaiveTime::from_hms_opt(0, 0, 0)?;
    let first = days.first()?;
    let after_last = days.last()?.succ_opt()?;

    let start = tz.from_local_datetime(&first.and_time(midnight)).single()?;
    let end = tz.from_local_datetime(&after_last.and_time(midnight)).single()?;
    TimeInterval::new(start.with_timezone(&Utc), end.with_timezone(&Utc))
}

fn local_interval(day: NaiveDate, open: NaiveTime, close: NaiveTime, tz: FixedOffset) -> Option<TimeInterval> {
    let start = tz.from_local_datetime(&day.and_time(open)).single()?;
    let end = tz.from_local_datetime(&day.and_time(close)).single()?;
    TimeInterval::new(start.with_timezone(&Utc), end.with_timezone(&Utc))
}
