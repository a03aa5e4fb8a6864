//! Geographic primitives: points, service locations, waypoints

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ScheduleError;
use crate::types::appointment::Appointment;

/// A WGS84 coordinate pair (degrees)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Validate coordinate ranges. Malformed points fail fast.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        if !self.lat.is_finite() || !self.lng.is_finite() {
            return Err(ScheduleError::InvalidInput(format!(
                "non-finite coordinates ({}, {})",
                self.lat, self.lng
            )));
        }
        if self.lat < -90.0 || self.lat > 90.0 {
            return Err(ScheduleError::InvalidInput(format!(
                "latitude {} out of range [-90, 90]",
                self.lat
            )));
        }
        if self.lng < -180.0 || self.lng > 180.0 {
            return Err(ScheduleError::InvalidInput(format!(
                "longitude {} out of range [-180, 180]",
                self.lng
            )));
        }
        Ok(())
    }

    /// Stable string key for cache lookups and location dedup.
    /// 6 decimal places ≈ 0.1 m resolution.
    pub fn key(&self) -> String {
        format!("{:.6},{:.6}", self.lat, self.lng)
    }
}

/// Travel mode for time estimation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TravelMode {
    Driving,
    Cycling,
    Walking,
}

impl TravelMode {
    /// Assumed average speed in km/h for closed-form estimates.
    pub fn assumed_speed_kmh(&self) -> f64 {
        match self {
            TravelMode::Driving => 40.0,
            TravelMode::Cycling => 15.0,
            TravelMode::Walking => 5.0,
        }
    }
}

/// A customer destination or dispatch base point
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceLocation {
    pub point: GeoPoint,
    pub street: String,
    pub city: String,
    pub postal_code: String,
}

impl ServiceLocation {
    pub fn new(point: GeoPoint, street: impl Into<String>, city: impl Into<String>, postal_code: impl Into<String>) -> Self {
        Self {
            point,
            street: street.into(),
            city: city.into(),
            postal_code: postal_code.into(),
        }
    }

    /// Bare-coordinates location (no postal address known).
    pub fn from_point(point: GeoPoint) -> Self {
        Self {
            point,
            street: String::new(),
            city: String::new(),
            postal_code: String::new(),
        }
    }
}

/// A routing waypoint in one of three addressable forms.
///
/// All variants resolve to a `GeoPoint` before entering the scheduling
/// algorithms — callers never pass unresolved waypoints past this boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum Waypoint {
    Point { point: GeoPoint },
    Address { location: ServiceLocation },
    AppointmentRef { appointment_id: Uuid },
}

impl Waypoint {
    /// Resolve the waypoint to coordinates. Appointment references are
    /// looked up in the provided appointment list.
    pub fn resolve(&self, appointments: &[Appointment]) -> Result<GeoPoint, ScheduleError> {
        let point = match self {
            Waypoint::Point { point } => *point,
            Waypoint::Address { location } => location.point,
            Waypoint::AppointmentRef { appointment_id } => appointments
                .iter()
                .find(|a| a.id == *appointment_id)
                .map(|a| a.location.point)
                .ok_or_else(|| {
                    ScheduleError::InvalidInput(format!(
                        "waypoint references unknown appointment {}",
                        appointment_id
                    ))
                })?,
        };
        point.validate()?;
        Ok(point)
    }
}
