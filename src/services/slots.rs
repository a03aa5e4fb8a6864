//! Slot availability finder
//!
//! Enumerates candidate start times for a new appointment against one day's
//! existing bookings. Empty days are scanned at a coarse granularity; days
//! with bookings are searched gap by gap, with travel legs to the
//! neighbouring stops deciding feasibility.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ScheduleError;
use crate::services::analyzer::travel_efficiency_score;
use crate::services::estimator::TravelEstimator;
use crate::services::{add_minutes, minutes_between};
use crate::types::{Appointment, BusinessRules, ServiceLocation, TravelMode};

/// Step between candidates when the day is empty.
const OPEN_DAY_STEP_MIN: i32 = 30;

/// Step between candidates inside a gap.
const GAP_STEP_MIN: i32 = 15;

/// A candidate start/end window for a new appointment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotCandidate {
    pub start: NaiveTime,
    pub end: NaiveTime,
    /// Travel minutes from the preceding stop (0 at the start of day).
    pub travel_before_minutes: i32,
    /// Travel minutes to the following stop (0 at the end of day).
    pub travel_after_minutes: i32,
    /// 0–100; higher is better.
    pub efficiency: i32,
    pub reason: String,
}

/// Finds open slots for a single new appointment.
pub struct SlotFinder {
    estimator: Arc<TravelEstimator>,
}

impl SlotFinder {
    pub fn new(estimator: Arc<TravelEstimator>) -> Self {
        Self { estimator }
    }

    /// Enumerate candidate slots for `location` on `date`.
    ///
    /// `existing` is the day's already-booked appointments; entries without
    /// a scheduled start are ignored. A day at capacity yields an empty
    /// result (infeasible, not an error).
    pub async fn find_slots(
        &self,
        date: NaiveDate,
        location: &ServiceLocation,
        duration_minutes: i32,
        existing: &[Appointment],
        rules: &BusinessRules,
    ) -> Result<Vec<SlotCandidate>, ScheduleError> {
        if duration_minutes <= 0 {
            return Err(ScheduleError::InvalidInput(format!(
                "non-positive service duration {}",
                duration_minutes
            )));
        }
        location.point.validate()?;
        rules.validate()?;

        let mut bookings: Vec<&Appointment> = existing
            .iter()
            .filter(|a| a.scheduled_start.is_some())
            .collect();
        bookings.sort_by_key(|a| a.scheduled_start);

        if bookings.len() >= rules.max_appointments_per_day {
            debug!(
                "day {} already at capacity ({}), no slots",
                date, rules.max_appointments_per_day
            );
            return Ok(Vec::new());
        }

        let mut candidates = if bookings.is_empty() {
            self.open_day_candidates(duration_minutes, rules)
        } else {
            self.gap_candidates(location, duration_minutes, &bookings, rules)
                .await
        };

        // Best efficiency first; ties break by earliest start.
        candidates.sort_by(|a, b| b.efficiency.cmp(&a.efficiency).then(a.start.cmp(&b.start)));
        Ok(candidates)
    }

    /// No bookings yet: scan the whole window at the coarse step.
    fn open_day_candidates(
        &self,
        duration_minutes: i32,
        rules: &BusinessRules,
    ) -> Vec<SlotCandidate> {
        let mut candidates = Vec::new();
        let mut start = rules.day_start;
        while minutes_between(start, rules.day_end) >= duration_minutes {
            candidates.push(SlotCandidate {
                start,
                end: add_minutes(start, duration_minutes),
                travel_before_minutes: 0,
                travel_after_minutes: 0,
                efficiency: 100,
                reason: "open day".to_string(),
            });
            start = add_minutes(start, OPEN_DAY_STEP_MIN);
        }
        candidates
    }

    /// Search every gap between consecutive bookings, including before the
    /// first and after the last.
    async fn gap_candidates(
        &self,
        location: &ServiceLocation,
        duration_minutes: i32,
        bookings: &[&Appointment],
        rules: &BusinessRules,
    ) -> Vec<SlotCandidate> {
        let mut candidates = Vec::new();

        for gap_idx in 0..=bookings.len() {
            let prev = if gap_idx == 0 { None } else { Some(bookings[gap_idx - 1]) };
            let next = bookings.get(gap_idx).copied();

            let gap_start = match prev {
                Some(p) => add_minutes(
                    p.scheduled_start.unwrap_or(rules.day_start),
                    p.duration_minutes,
                ),
                None => rules.day_start,
            };
            let gap_end = match next {
                Some(n) => n.scheduled_start.unwrap_or(rules.day_end),
                None => rules.day_end,
            };
            if gap_end <= gap_start {
                continue;
            }

            let travel_before = match prev {
                Some(p) => {
                    self.estimator
                        .travel_time(
                            p.location.point,
                            location.point,
                            TravelMode::Driving,
                            Some(gap_start),
                            None,
                        )
                        .await
                        .duration_minutes
                }
                None => 0,
            };
            let travel_after = match next {
                Some(n) => {
                    self.estimator
                        .travel_time(
                            location.point,
                            n.location.point,
                            TravelMode::Driving,
                            None,
                            None,
                        )
                        .await
                        .duration_minutes
                }
                None => 0,
            };

            let gap_minutes = minutes_between(gap_start, gap_end);
            if gap_minutes < travel_before + duration_minutes + travel_after {
                continue;
            }

            let efficiency = travel_efficiency_score(travel_before + travel_after);
            let reason = match (prev, next) {
                (None, Some(_)) => "first stop of the day".to_string(),
                (Some(_), None) => "last stop of the day".to_string(),
                _ => format!("detour +{} min between existing stops", travel_before + travel_after),
            };

            let mut start = add_minutes(gap_start, travel_before);
            loop {
                let end = add_minutes(start, duration_minutes);
                if minutes_between(gap_start, end) + travel_after > gap_minutes {
                    break;
                }
                candidates.push(SlotCandidate {
                    start,
                    end,
                    travel_before_minutes: travel_before,
                    travel_after_minutes: travel_after,
                    efficiency,
                    reason: reason.clone(),
                });
                start = add_minutes(start, GAP_STEP_MIN);
            }
        }

        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoPoint;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 16).unwrap()
    }

    fn location(lat: f64, lng: f64) -> ServiceLocation {
        ServiceLocation::from_point(GeoPoint::new(lat, lng))
    }

    fn booked(lat: f64, lng: f64, start: NaiveTime, duration: i32) -> Appointment {
        let mut a = Appointment::new(location(lat, lng), duration);
        a.scheduled_start = Some(start);
        a
    }

    fn finder() -> SlotFinder {
        SlotFinder::new(Arc::new(TravelEstimator::new(BusinessRules::default())))
    }

    #[tokio::test]
    async fn test_empty_day_covers_full_window() {
        let rules = BusinessRules::default();
        let slots = finder()
            .find_slots(monday(), &location(50.0, 14.0), 60, &[], &rules)
            .await
            .unwrap();

        assert!(!slots.is_empty());
        assert_eq!(slots.first().unwrap().start, rules.day_start);
        // Last candidate still fits the 60-minute service before day end.
        let last = slots.last().unwrap();
        assert!(last.end <= rules.day_end);
        // 08:00–17:00 window, 30-minute step, 60-minute service → 17 starts
        assert_eq!(slots.len(), 17);
        assert!(slots.iter().all(|s| s.efficiency == 100));
    }

    #[tokio::test]
    async fn test_day_at_capacity_returns_empty() {
        let rules = BusinessRules {
            max_appointments_per_day: 2,
            ..Default::default()
        };
        let existing = vec![
            booked(50.0, 14.0, hm(9, 0), 60),
            booked(50.1, 14.1, hm(11, 0), 60),
        ];
        let slots = finder()
            .find_slots(monday(), &location(50.2, 14.2), 30, &existing, &rules)
            .await
            .unwrap();
        assert!(slots.is_empty());
    }

    #[tokio::test]
    async fn test_non_positive_duration_rejected() {
        let rules = BusinessRules::default();
        let err = finder()
            .find_slots(monday(), &location(50.0, 14.0), 0, &[], &rules)
            .await
            .unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_invalid_coordinates_rejected() {
        let rules = BusinessRules::default();
        let err = finder()
            .find_slots(monday(), &location(95.0, 14.0), 60, &[], &rules)
            .await
            .unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidInput(_)));
    }

    /// Spec scenario: 09:30–16:00 day, one booking 11:00–12:00 at P, a
    /// 60-minute request at Q ~10 km from P (travel ≈ 20 min). Candidates
    /// must exist both before the 10:40 cutoff and from 12:20 on, and never
    /// overlap the booked hour.
    #[tokio::test]
    async fn test_candidates_respect_travel_around_booking() {
        let rules = BusinessRules {
            day_start: hm(9, 30),
            day_end: hm(16, 0),
            ..Default::default()
        };
        // Q is ~10 km east of P at this latitude.
        let p = booked(50.0, 14.0, hm(11, 0), 60);
        let q = location(50.0, 14.1395);

        let slots = finder()
            .find_slots(monday(), &q, 60, &[p], &rules)
            .await
            .unwrap();

        assert!(!slots.is_empty());

        let before: Vec<&SlotCandidate> =
            slots.iter().filter(|s| s.start < hm(11, 0)).collect();
        let after: Vec<&SlotCandidate> =
            slots.iter().filter(|s| s.start >= hm(12, 0)).collect();
        assert!(!before.is_empty(), "expected candidates before the booking");
        assert!(!after.is_empty(), "expected candidates after the booking");

        for slot in &before {
            // End + 20 min travel must not run into the 11:00 booking.
            assert!(slot.end <= hm(10, 40), "slot {} ends too late", slot.start);
        }
        for slot in &after {
            // 20 min travel from P after its 12:00 departure.
            assert!(slot.start >= hm(12, 20), "slot {} starts too early", slot.start);
        }
        // No candidate overlaps the booked interval.
        for slot in &slots {
            assert!(slot.end <= hm(11, 0) || slot.start >= hm(12, 0));
        }
    }

    #[tokio::test]
    async fn test_gap_too_small_is_skipped() {
        let rules = BusinessRules {
            day_start: hm(8, 0),
            day_end: hm(10, 0),
            ..Default::default()
        };
        // Booking fills 08:00–09:30; remaining 30-minute gap cannot take a
        // 60-minute service.
        let existing = vec![booked(50.0, 14.0, hm(8, 0), 90)];
        let slots = finder()
            .find_slots(monday(), &location(50.0, 14.01), 60, &existing, &rules)
            .await
            .unwrap();
        assert!(slots.is_empty());
    }

    #[tokio::test]
    async fn test_slots_sorted_by_efficiency_then_start() {
        let rules = BusinessRules::default();
        let existing = vec![booked(50.0, 14.0, hm(11, 0), 60)];
        let slots = finder()
            .find_slots(monday(), &location(50.05, 14.05), 45, &existing, &rules)
            .await
            .unwrap();

        for pair in slots.windows(2) {
            assert!(
                pair[0].efficiency > pair[1].efficiency
                    || (pair[0].efficiency == pair[1].efficiency
                        && pair[0].start <= pair[1].start)
            );
        }
    }
}
