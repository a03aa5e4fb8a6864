//! Appointment type and lifecycle

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ScheduleError;
use crate::types::geo::ServiceLocation;

/// A single field-service appointment.
///
/// Lifecycle: created unassigned (no date) → assigned to a day-cluster →
/// ordered within the day (`scheduled_start` set) → optionally re-optimized.
/// An appointment belongs to at most one day-cluster at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: Uuid,
    /// Date the customer originally asked for. The assignment engine tries
    /// this day first before nearby working days.
    pub requested_date: Option<NaiveDate>,
    /// Service duration in minutes.
    pub duration_minutes: i32,
    pub location: ServiceLocation,
    /// Higher value = more urgent. Unset counts as 0 in strategy scoring.
    pub priority: Option<i32>,
    /// Set once the appointment is ordered within a day.
    pub scheduled_start: Option<NaiveTime>,
}

impl Appointment {
    pub fn new(location: ServiceLocation, duration_minutes: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            requested_date: None,
            duration_minutes,
            location,
            priority: None,
            scheduled_start: None,
        }
    }

    pub fn with_requested_date(mut self, date: NaiveDate) -> Self {
        self.requested_date = Some(date);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn priority_or_default(&self) -> i32 {
        self.priority.unwrap_or(0)
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled_start.is_some()
    }

    /// Clear scheduling state, e.g. before moving to another cluster.
    pub fn unschedule(&mut self) {
        self.scheduled_start = None;
    }

    /// Fail-fast validation of caller-supplied input.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.duration_minutes <= 0 {
            return Err(ScheduleError::InvalidInput(format!(
                "appointment {} has non-positive duration {}",
                self.id, self.duration_minutes
            )));
        }
        self.location.point.validate()
    }
}
