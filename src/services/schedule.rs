use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard};
use tracing::{info, warn};

use crate::error::BookingError;
use crate::models::schedule::{ConsultationType, StaffMember, VacationException, WorkingHourRule};

/// Typed schedule configuration, as stored in the schedule JSON file.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ScheduleCatalog {
    #[serde(default)]
    pub staff: Vec<StaffMember>,
    #[serde(default)]
    pub consultation_types: Vec<ConsultationType>,
    #[serde(default)]
    pub working_hours: Vec<WorkingHourRule>,
    #[serde(default)]
    pub vacations: Vec<VacationException>,
}

impl ScheduleCatalog {
    /// Reject the whole catalog if any record is malformed or dangling.
    pub fn validate(&self) -> Result<(), BookingError> {
        let mut staff_ids = HashSet::new();
        for staff in &self.staff {
            staff.validate()?;
            if !staff_ids.insert(staff.id.as_str()) {
                return Err(BookingError::Validation(format!(
                    "duplicate staff id {}",
                    staff.id
                )));
            }
        }

        let mut type_ids = HashSet::new();
        for ctype in &self.consultation_types {
            ctype.validate()?;
            if !type_ids.insert(ctype.id.as_str()) {
                return Err(BookingError::Validation(format!(
                    "duplicate consultation type id {}",
                    ctype.id
                )));
            }
        }

        for rule in &self.working_hours {
            rule.validate()?;
            if !staff_ids.contains(rule.staff_id.as_str()) {
                return Err(BookingError::Validation(format!(
                    "working hours reference unknown staff {}",
                    rule.staff_id
                )));
            }
        }

        for vacation in &self.vacations {
            if !staff_ids.contains(vacation.staff_id.as_str()) {
                return Err(BookingError::Validation(format!(
                    "vacation references unknown staff {}",
                    vacation.staff_id
                )));
            }
        }

        Ok(())
    }
}

/// Read side for staff, consultation types, working hours and vacations.
pub struct ScheduleStore {
    catalog: RwLock<ScheduleCatalog>,
}

impl ScheduleStore {
    pub fn from_catalog(catalog: ScheduleCatalog) -> Result<Self, BookingError> {
        catalog.validate()?;
        Ok(Self {
            catalog: RwLock::new(catalog),
        })
    }

    /// Load the catalog file. A missing file yields an empty schedule.
    pub fn load(path: &Path) -> Result<Self, BookingError> {
        Self::from_catalog(read_catalog(path)?)
    }

    /// Swap in a new validated catalog; the old one stays on error.
    pub fn replace(&self, catalog: ScheduleCatalog) -> Result<(), BookingError> {
        catalog.validate()?;
        let mut guard = self
            .catalog
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = catalog;
        Ok(())
    }

    pub fn reload(&self, path: &Path) -> Result<(), BookingError> {
        self.replace(read_catalog(path)?)?;
        info!("Reloaded schedule catalog from {}", path.display());
        Ok(())
    }

    pub fn staff(&self, staff_id: &str) -> Option<StaffMember> {
        self.read().staff.iter().find(|s| s.id == staff_id).cloned()
    }

    pub fn active_staff(&self) -> Vec<StaffMember> {
        self.read().staff.iter().filter(|s| s.active).cloned().collect()
    }

    pub fn consultation_type(&self, type_id: &str) -> Option<ConsultationType> {
        self.read()
            .consultation_types
            .iter()
            .find(|t| t.id == type_id)
            .cloned()
    }

    /// Active consultation types in display order.
    pub fn active_consultation_types(&self) -> Vec<ConsultationType> {
        let mut types: Vec<ConsultationType> = self
            .read()
            .consultation_types
            .iter()
            .filter(|t| t.active)
            .cloned()
            .collect();
        types.sort_by(|a, b| a.display_order.cmp(&b.display_order).then(a.name.cmp(&b.name)));
        types
    }

    /// Active local working intervals for `staff_id` on `date`, ordered by start.
    pub fn working_intervals(&self, staff_id: &str, date: NaiveDate) -> Vec<(NaiveTime, NaiveTime)> {
        let weekday = date.weekday();
        let mut intervals: Vec<(NaiveTime, NaiveTime)> = self
            .read()
            .working_hours
            .iter()
            .filter(|rule| rule.active && rule.staff_id == staff_id && rule.day_of_week == weekday)
            .map(|rule| (rule.start_time, rule.end_time))
            .collect();
        intervals.sort();
        intervals
    }

    pub fn is_vacation(&self, staff_id: &str, date: NaiveDate) -> bool {
        self.read()
            .vacations
            .iter()
            .any(|v| v.staff_id == staff_id && v.date == date)
    }

    fn read(&self) -> RwLockReadGuard<'_, ScheduleCatalog> {
        // Writers only swap whole validated catalogs, so a poisoned guard still holds one
        self.catalog.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn read_catalog(path: &Path) -> Result<ScheduleCatalog, BookingError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(
                "Schedule catalog {} not found, starting with no staff or consultation types",
                path.display()
            );
            return Ok(ScheduleCatalog::default());
        }
        Err(e) => {
            warn!("Failed to read schedule catalog {}: {}", path.display(), e);
            return Err(BookingError::ScheduleUnavailable(e));
        }
    };

    let catalog: ScheduleCatalog = serde_json::from_str(&raw).map_err(|e| {
        BookingError::Validation(format!(
            "failed to parse schedule catalog {}: {}",
            path.display(),
            e
        ))
    })?;

    info!(
        "Loaded {} staff, {} consultation types, {} working-hour rules and {} vacations",
        catalog.staff.len(),
        catalog.consultation_types.len(),
        catalog.working_hours.len(),
        catalog.vacations.len()
    );

    Ok(catalog)
}
