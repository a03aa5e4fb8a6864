//! Day-cluster and timeline types

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::appointment::Appointment;

/// The set of appointments assigned to one technician-day.
///
/// The cluster owns the visiting order; appointment identity stays with the
/// appointments themselves. Travel totals and the efficiency score are
/// recomputed whenever the ordering changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayCluster {
    pub date: NaiveDate,
    pub appointments: Vec<Appointment>,
    /// Total travel distance in meters, including the return to base.
    pub total_distance_m: u64,
    /// Total travel time in minutes, including the return to base.
    pub total_travel_minutes: i32,
    /// 0–100 heuristic; see the analyzer for the formula.
    pub efficiency_score: i32,
}

impl DayCluster {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            appointments: Vec::new(),
            total_distance_m: 0,
            total_travel_minutes: 0,
            efficiency_score: 100,
        }
    }

    pub fn len(&self) -> usize {
        self.appointments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.appointments.is_empty()
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.appointments.iter().any(|a| a.id == *id)
    }

    /// Remove an appointment from this cluster, clearing its scheduling
    /// state. Reassignment must remove from the prior cluster first so an
    /// appointment never belongs to two clusters.
    pub fn remove_appointment(&mut self, id: &Uuid) -> Option<Appointment> {
        let idx = self.appointments.iter().position(|a| a.id == *id)?;
        let mut appointment = self.appointments.remove(idx);
        appointment.unschedule();
        Some(appointment)
    }

    /// Sum of service durations in minutes.
    pub fn service_minutes(&self) -> i32 {
        self.appointments.iter().map(|a| a.duration_minutes).sum()
    }
}

/// What occupies one stretch of a technician-day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum SlotKind {
    Appointment { appointment_id: Uuid },
    Travel,
    Idle,
}

/// One minute-by-minute stretch of a day's plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineSlot {
    pub kind: SlotKind,
    pub start: NaiveTime,
    pub end: NaiveTime,
    /// Travel slots only.
    pub distance_m: Option<u64>,
    /// Travel slots only.
    pub duration_minutes: Option<i32>,
}

/// A day-cluster expanded into an ordered sequence of slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    pub date: NaiveDate,
    pub slots: Vec<TimelineSlot>,
}

impl Timeline {
    pub fn empty(date: NaiveDate) -> Self {
        Self { date, slots: Vec::new() }
    }

    /// Slots are contiguous when each starts where the previous ended.
    pub fn is_contiguous(&self) -> bool {
        self.slots
            .windows(2)
            .all(|pair| pair[0].end == pair[1].start)
    }

    pub fn appointment_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s.kind, SlotKind::Appointment { .. }))
            .count()
    }
}
