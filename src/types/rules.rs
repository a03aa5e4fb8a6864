//! Business rules configuration

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;

/// Scheduling constraints for a technician day.
///
/// Supplied by the caller at construction time — the core never reads
/// configuration from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessRules {
    pub day_start: NaiveTime,
    pub day_end: NaiveTime,
    pub working_weekdays: Vec<Weekday>,
    pub max_appointments_per_day: usize,
    pub max_service_radius_km: f64,
    pub default_duration_minutes: i32,
    /// Inter-appointment buffer in minutes.
    pub buffer_minutes: i32,
    /// Peak traffic windows; driving estimates inside these get the
    /// rush-hour multiplier.
    pub peak_windows: Vec<(NaiveTime, NaiveTime)>,
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            day_start: NaiveTime::from_hms_opt(8, 0, 0).expect("valid time"),
            day_end: NaiveTime::from_hms_opt(17, 0, 0).expect("valid time"),
            working_weekdays: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            max_appointments_per_day: 8,
            max_service_radius_km: 50.0,
            default_duration_minutes: 60,
            buffer_minutes: 15,
            peak_windows: vec![
                (
                    NaiveTime::from_hms_opt(7, 0, 0).expect("valid time"),
                    NaiveTime::from_hms_opt(9, 0, 0).expect("valid time"),
                ),
                (
                    NaiveTime::from_hms_opt(16, 0, 0).expect("valid time"),
                    NaiveTime::from_hms_opt(18, 0, 0).expect("valid time"),
                ),
            ],
        }
    }
}

impl BusinessRules {
    /// Length of the service window in minutes.
    pub fn window_minutes(&self) -> i32 {
        let start = self.day_start.num_seconds_from_midnight() as i32;
        let end = self.day_end.num_seconds_from_midnight() as i32;
        (end - start) / 60
    }

    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        self.working_weekdays.contains(&date.weekday())
    }

    /// Whether a departure time falls inside any peak window.
    pub fn is_peak(&self, time: NaiveTime) -> bool {
        self.peak_windows
            .iter()
            .any(|(start, end)| time >= *start && time < *end)
    }

    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.day_end <= self.day_start {
            return Err(ScheduleError::InvalidInput(format!(
                "day end {} is not after day start {}",
                self.day_end, self.day_start
            )));
        }
        if self.max_appointments_per_day == 0 {
            return Err(ScheduleError::InvalidInput(
                "max appointments per day must be positive".into(),
            ));
        }
        if self.max_service_radius_km <= 0.0 {
            return Err(ScheduleError::InvalidInput(
                "max service radius must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_window_is_nine_hours() {
        let rules = BusinessRules::default();
        assert_eq!(rules.window_minutes(), 9 * 60);
    }

    #[test]
    fn test_weekend_is_not_working_day() {
        let rules = BusinessRules::default();
        // 2025-06-14 is a Saturday
        let saturday = NaiveDate::from_ymd_opt(2025, 6, 14).unwrap();
        let monday = NaiveDate::from_ymd_opt(2025, 6, 16).unwrap();
        assert!(!rules.is_working_day(saturday));
        assert!(rules.is_working_day(monday));
    }

    #[test]
    fn test_peak_detection() {
        let rules = BusinessRules::default();
        assert!(rules.is_peak(NaiveTime::from_hms_opt(8, 30, 0).unwrap()));
        assert!(rules.is_peak(NaiveTime::from_hms_opt(17, 0, 0).unwrap()));
        assert!(!rules.is_peak(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
    }

    #[test]
    fn test_inverted_window_rejected() {
        let rules = BusinessRules {
            day_start: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            day_end: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            ..Default::default()
        };
        assert!(rules.validate().is_err());
    }
}
