use async_trait::async_trait;
use mockall::mock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::UpstreamError;
use crate::models::booking::{Booking, TimeInterval};
use crate::models::schedule::{ConsultationType, StaffMember};
use crate::services::calendar::{BusyPeriodSource, CalendarEventRef, CalendarEventSink};
use crate::services::notifications::{NotificationDispatcher, NotificationEvent};

// Mock busy-period source for the calendar provider
mock! {
    pub BusySource {}

    #[async_trait]
    impl BusyPeriodSource for BusySource {
        async fn busy_periods(
            &self,
            staff: &StaffMember,
            window: TimeInterval,
        ) -> Result<Vec<TimeInterval>, UpstreamError>;
    }
}

// Mock event sink for the calendar provider
mock! {
    pub EventSink {}

    #[async_trait]
    impl CalendarEventSink for EventSink {
        async fn create_event(
            &self,
            booking: &Booking,
            staff: &StaffMember,
            consultation_type: &ConsultationType,
        ) -> Result<Option<CalendarEventRef>, UpstreamError>;

        async fn delete_event(&self, staff: &StaffMember, event_id: &str) -> Result<(), UpstreamError>;
    }
}

mock! {
    pub Dispatcher {}

    #[async_trait]
    impl NotificationDispatcher for Dispatcher {
        async fn dispatch(&self, event: &NotificationEvent) -> Result<(), UpstreamError>;
    }
}

/// Busy source that always reports the same periods.
pub fn busy_source_with(periods: Vec<TimeInterval>) -> Arc<MockBusySource> {
    let mut source = MockBusySource::new();
    source
        .expect_busy_periods()
        .returning(move |_, _| Ok(periods.clone()));
    Arc::new(source)
}

/// Busy source whose provider is down.
pub fn failing_busy_source() -> Arc<MockBusySource> {
    let mut source = MockBusySource::new();
    source
        .expect_busy_periods()
        .returning(|_, _| Err(UpstreamError::Status(503)));
    Arc::new(source)
}

/// Keeps every delivered event for later assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Poll until at least `count` events arrived or about a second passed.
    pub async fn wait_for_events(&self, count: usize) -> Vec<NotificationEvent> {
        for _ in 0..100 {
            let events = self.events();
            if events.len() >= count {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.events()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingNotifier {
    async fn dispatch(&self, event: &NotificationEvent) -> Result<(), UpstreamError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Calendar that never answers in time.
pub struct StalledCalendar;

#[async_trait]
impl CalendarEventSink for StalledCalendar {
    async fn create_event(
        &self,
        _booking: &Booking,
        _staff: &StaffMember,
        _consultation_type: &ConsultationType,
    ) -> Result<Option<CalendarEventRef>, UpstreamError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(None)
    }

    async fn delete_event(&self, _staff: &StaffMember, _event_id: &str) -> Result<(), UpstreamError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    }
}

/// Calendar provider whose free/busy view contains the events it created.
#[derive(Default)]
pub struct InMemoryCalendar {
    events: Mutex<HashMap<String, (String, TimeInterval)>>,
}

impl InMemoryCalendar {
    pub fn event_count(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

#[async_trait]
impl BusyPeriodSource for InMemoryCalendar {
    async fn busy_periods(
        &self,
        staff: &StaffMember,
        window: TimeInterval,
    ) -> Result<Vec<TimeInterval>, UpstreamError> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .values()
            .filter(|(staff_id, interval)| *staff_id == staff.id && interval.overlaps(&window))
            .map(|(_, interval)| *interval)
            .collect())
    }
}

#[async_trait]
impl CalendarEventSink for InMemoryCalendar {
    async fn create_event(
        &self,
        booking: &Booking,
        staff: &StaffMember,
        _consultation_type: &ConsultationType,
    ) -> Result<Option<CalendarEventRef>, UpstreamError> {
        let event_id = format!("evt-{}", booking.id);
        let interval = TimeInterval {
            start: booking.start_time,
            end: booking.end_time,
        };
        self.events
            .lock()
            .unwrap()
            .insert(event_id.clone(), (staff.id.clone(), interval));
        Ok(Some(CalendarEventRef {
            event_id,
            meeting_link: None,
        }))
    }

    async fn delete_event(&self, _staff: &StaffMember, event_id: &str) -> Result<(), UpstreamError> {
        self.events.lock().unwrap().remove(event_id);
        Ok(())
    }
}
