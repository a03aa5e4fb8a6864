//! Geographic calculations

use chrono::NaiveTime;

use crate::types::{BusinessRules, GeoPoint, TravelMode};

/// Earth radius in kilometers
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Fixed buffer added to every closed-form travel estimate (parking,
/// walking to the door) in minutes.
pub const FIXED_TRAVEL_BUFFER_MIN: i32 = 5;

/// Multiplier on driving estimates departing inside a peak window.
pub const RUSH_HOUR_MULTIPLIER: f64 = 1.3;

/// Calculate Haversine distance between two points in kilometers
pub fn haversine_km(from: GeoPoint, to: GeoPoint) -> f64 {
    let d_lat = (to.lat - from.lat).to_radians();
    let d_lng = (to.lng - from.lng).to_radians();

    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);

    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Closed-form travel time estimate in minutes.
///
/// `ceil(km / speed * 60)` plus the fixed buffer. Driving legs departing
/// inside a peak window get the rush-hour multiplier before the buffer.
pub fn estimate_travel_minutes(
    from: GeoPoint,
    to: GeoPoint,
    mode: TravelMode,
    departure: Option<NaiveTime>,
    rules: &BusinessRules,
) -> i32 {
    let km = haversine_km(from, to);
    if km < f64::EPSILON {
        return 0;
    }

    let mut minutes = km / mode.assumed_speed_kmh() * 60.0;
    if mode == TravelMode::Driving {
        if let Some(at) = departure {
            if rules.is_peak(at) {
                minutes *= RUSH_HOUR_MULTIPLIER;
            }
        }
    }

    minutes.ceil() as i32 + FIXED_TRAVEL_BUFFER_MIN
}

/// Straight-line distance in meters, rounded.
pub fn haversine_m(from: GeoPoint, to: GeoPoint) -> u64 {
    (haversine_km(from, to) * 1000.0).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prague() -> GeoPoint {
        GeoPoint::new(50.0755, 14.4378)
    }

    fn brno() -> GeoPoint {
        GeoPoint::new(49.1951, 16.6068)
    }

    #[test]
    fn test_haversine_prague_brno() {
        // Prague to Brno is approximately 185 km
        let distance = haversine_km(prague(), brno());
        assert!((distance - 185.0).abs() < 5.0);
    }

    #[test]
    fn test_haversine_same_point() {
        let distance = haversine_km(prague(), prague());
        assert!(distance.abs() < 0.001);
    }

    #[test]
    fn test_haversine_symmetric() {
        let ab = haversine_km(prague(), brno());
        let ba = haversine_km(brno(), prague());
        assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn test_estimate_ten_km_drive() {
        // ~10 km due east at this latitude
        let from = GeoPoint::new(50.0, 14.0);
        let to = GeoPoint::new(50.0, 14.1395);
        let rules = BusinessRules::default();
        let minutes = estimate_travel_minutes(from, to, TravelMode::Driving, None, &rules);
        // 10 km at 40 km/h = 15 min + 5 min buffer
        assert_eq!(minutes, 20);
    }

    #[test]
    fn test_rush_hour_inflates_driving() {
        let from = GeoPoint::new(50.0, 14.0);
        let to = GeoPoint::new(50.0, 14.1395);
        let rules = BusinessRules::default();
        let off_peak = estimate_travel_minutes(
            from,
            to,
            TravelMode::Driving,
            NaiveTime::from_hms_opt(12, 0, 0),
            &rules,
        );
        let peak = estimate_travel_minutes(
            from,
            to,
            TravelMode::Driving,
            NaiveTime::from_hms_opt(8, 0, 0),
            &rules,
        );
        assert!(peak > off_peak);
    }

    #[test]
    fn test_rush_hour_does_not_affect_walking() {
        let from = GeoPoint::new(50.0, 14.0);
        let to = GeoPoint::new(50.0, 14.01);
        let rules = BusinessRules::default();
        let off_peak = estimate_travel_minutes(
            from,
            to,
            TravelMode::Walking,
            NaiveTime::from_hms_opt(12, 0, 0),
            &rules,
        );
        let peak = estimate_travel_minutes(
            from,
            to,
            TravelMode::Walking,
            NaiveTime::from_hms_opt(8, 0, 0),
            &rules,
        );
        assert_eq!(peak, off_peak);
    }

    #[test]
    fn test_zero_distance_has_no_buffer() {
        let rules = BusinessRules::default();
        assert_eq!(
            estimate_travel_minutes(prague(), prague(), TravelMode::Driving, None, &rules),
            0
        );
    }
}
