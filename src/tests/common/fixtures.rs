use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

use crate::auth::AdminClaims;
use crate::client_mock::RecordingNotifier;
use crate::config::AppConfig;
use crate::handlers::api::AppState;
use crate::models::booking::ClientInfo;
use crate::models::schedule::{
    ConfirmationMode, ConsultationType, RecentModeOverride, StaffMember, VacationException,
    WorkingHourRule,
};
use crate::services::booking::{AdmissionRequest, BookingService, BookingSettings};
use crate::services::calendar::{BusyPeriodSource, CalendarEventSink, NoCalendar};
use crate::services::ledger::BookingLedger;
use crate::services::schedule::{ScheduleCatalog, ScheduleStore};
use crate::services::time_slots::{SlotGenerator, SlotRules};

pub const ADMIN_TOKEN: &str = "test-admin-token";

/// 2030-01-07 is a Monday.
pub fn monday(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 7, hour, minute, 0).unwrap()
}

pub fn monday_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 1, 7).unwrap()
}

/// The evening before the fixture Monday, far enough for any notice rule.
pub fn sunday_evening() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 6, 18, 0, 0).unwrap()
}

/// A Monday two to three weeks from today, for tests that run against the real clock.
pub fn upcoming_monday() -> NaiveDate {
    let mut date = Utc::now().date_naive() + Duration::days(14);
    while date.weekday() != Weekday::Mon {
        date = date.succ_opt().unwrap();
    }
    date
}

pub fn at(date: NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(hour, minute, 0).unwrap())
}

pub fn staff(id: &str, name: &str) -> StaffMember {
    StaffMember {
        id: id.to_string(),
        name: name.to_string(),
        email: Some(format!("{}@clinic.example", id)),
        active: true,
        utc_offset_minutes: 0,
        calendar_id: None,
    }
}

pub fn consultation_type(id: &str, duration: u32, before: u32, after: u32) -> ConsultationType {
    ConsultationType {
        id: id.to_string(),
        name: format!("{} consultation", id),
        description: None,
        duration_minutes: duration,
        buffer_before_minutes: before,
        buffer_after_minutes: after,
        mode: ConfirmationMode::Immediate,
        recent_mode_override: RecentModeOverride::Keep,
        display_order: 0,
        active: true,
    }
}

pub fn working_hours(staff_id: &str, day: Weekday, open: (u32, u32), close: (u32, u32)) -> WorkingHourRule {
    WorkingHourRule {
        staff_id: staff_id.to_string(),
        day_of_week: day,
        start_time: NaiveTime::from_hms_opt(open.0, open.1, 0).unwrap(),
        end_time: NaiveTime::from_hms_opt(close.0, close.1, 0).unwrap(),
        active: true,
    }
}

pub fn vacation(staff_id: &str, date: NaiveDate) -> VacationException {
    VacationException {
        staff_id: staff_id.to_string(),
        date,
        reason: Some("holiday".to_string()),
    }
}

/// Alice works Mondays 09:00-12:00 UTC, Bob Mondays 10:00-12:00 UTC.
///
/// Types: `intro` (30 min, immediate), `buffered` (30 min, 5/5 buffers),
/// `review` (60 min, manual) and `followup` (30 min, manual for recent clients).
pub fn catalog() -> ScheduleCatalog {
    let mut review = consultation_type("review", 60, 0, 0);
    review.mode = ConfirmationMode::Manual;
    review.display_order = 3;

    let mut followup = consultation_type("followup", 30, 0, 0);
    followup.recent_mode_override = RecentModeOverride::SwitchToManual;
    followup.display_order = 2;

    let mut buffered = consultation_type("buffered", 30, 5, 5);
    buffered.display_order = 1;

    ScheduleCatalog {
        staff: vec![staff("alice", "Alice Adams"), staff("bob", "Bob Brown")],
        consultation_types: vec![review, followup, buffered, consultation_type("intro", 30, 0, 0)],
        working_hours: vec![
            working_hours("alice", Weekday::Mon, (9, 0), (12, 0)),
            working_hours("bob", Weekday::Mon, (10, 0), (12, 0)),
        ],
        vacations: Vec::new(),
    }
}

pub fn rules() -> SlotRules {
    SlotRules::default()
}

/// Fully wired services over a temporary ledger.
pub struct TestEnv {
    pub dir: TempDir,
    pub schedule: Arc<ScheduleStore>,
    pub ledger: Arc<BookingLedger>,
    pub slots: Arc<SlotGenerator>,
    pub bookings: Arc<BookingService>,
    pub notifier: Arc<RecordingNotifier>,
}

pub struct EnvBuilder {
    catalog: ScheduleCatalog,
    busy: Arc<dyn BusyPeriodSource>,
    calendar: Arc<dyn CalendarEventSink>,
    rules: SlotRules,
    settings: BookingSettings,
}

impl EnvBuilder {
    pub fn new() -> Self {
        Self {
            catalog: catalog(),
            busy: Arc::new(NoCalendar),
            calendar: Arc::new(NoCalendar),
            rules: rules(),
            settings: BookingSettings {
                recency_window: Duration::days(30),
                side_effect_timeout: std::time::Duration::from_secs(2),
            },
        }
    }

    pub fn catalog(mut self, catalog: ScheduleCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn busy(mut self, busy: Arc<dyn BusyPeriodSource>) -> Self {
        self.busy = busy;
        self
    }

    pub fn calendar(mut self, calendar: Arc<dyn CalendarEventSink>) -> Self {
        self.calendar = calendar;
        self
    }

    pub fn rules(mut self, rules: SlotRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn settings(mut self, settings: BookingSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> TestEnv {
        let dir = tempdir().unwrap();
        let ledger = Arc::new(BookingLedger::open(dir.path().join("bookings.csv")).unwrap());
        let schedule = Arc::new(ScheduleStore::from_catalog(self.catalog).unwrap());
        let notifier = Arc::new(RecordingNotifier::default());

        let slots = Arc::new(SlotGenerator::new(
            Arc::clone(&schedule),
            Arc::clone(&ledger),
            self.busy,
            self.rules,
        ));
        let bookings = Arc::new(BookingService::new(
            Arc::clone(&schedule),
            Arc::clone(&ledger),
            Arc::clone(&slots),
            self.calendar,
            notifier.clone(),
            self.settings,
        ));

        TestEnv {
            dir,
            schedule,
            ledger,
            slots,
            bookings,
            notifier,
        }
    }
}

pub fn default_env() -> TestEnv {
    EnvBuilder::new().build()
}

impl TestEnv {
    /// Application state for the router; admin routes need `admin_token`.
    pub fn app_state(&self, admin_token: Option<&str>) -> Arc<AppState> {
        let mut config = AppConfig::from_lookup(|_| None).unwrap();
        config.admin_token = admin_token.map(str::to_string);
        config.ledger_path = self.ledger.path().to_path_buf();
        config.schedule_path = self.dir.path().join("schedule.json");

        Arc::new(AppState {
            config,
            schedule: Arc::clone(&self.schedule),
            slots: Arc::clone(&self.slots),
            bookings: Arc::clone(&self.bookings),
        })
    }
}

pub fn admin() -> AdminClaims {
    AdminClaims::verify(Some(&format!("Bearer {}", ADMIN_TOKEN)), Some(ADMIN_TOKEN)).unwrap()
}

pub fn client(email: &str) -> ClientInfo {
    ClientInfo {
        name: "Casey Client".to_string(),
        email: email.to_string(),
        phone: Some("+1 555 0100".to_string()),
        notes: None,
    }
}

pub fn request(staff_id: &str, type_id: &str, start: DateTime<Utc>, minutes: i64, email: &str) -> AdmissionRequest {
    AdmissionRequest {
        staff_id: staff_id.to_string(),
        consultation_type_id: type_id.to_string(),
        start_time: start,
        end_time: start + Duration::minutes(minutes),
        client: client(email),
    }
}
