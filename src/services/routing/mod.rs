//! Routing oracle abstraction
//!
//! The scheduling core depends on this trait, not on a specific provider.
//! `ValhallaOracle` talks to a real routing engine; `HaversineOracle` is the
//! deterministic substitute used in tests and as the degraded-mode baseline.

mod valhalla;

pub use valhalla::{ValhallaConfig, ValhallaOracle};

use anyhow::Result;
use async_trait::async_trait;

use crate::services::geo;
use crate::types::{GeoPoint, TravelMode};

/// Distance/duration for one travel leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegEstimate {
    /// Distance in meters.
    pub distance_m: u64,
    /// Duration in minutes.
    pub duration_minutes: i32,
}

/// An oracle-computed visiting order with per-leg estimates.
///
/// `order` holds indices into the waypoint slice passed to `route`.
/// `legs` has `waypoints.len() + 1` entries: origin → first stop, stop →
/// stop, last stop → destination.
#[derive(Debug, Clone)]
pub struct RouteEstimate {
    pub order: Vec<usize>,
    pub legs: Vec<LegEstimate>,
}

impl RouteEstimate {
    /// Check the shape invariants against a waypoint count.
    pub fn is_valid_for(&self, waypoint_count: usize) -> bool {
        if self.order.len() != waypoint_count || self.legs.len() != waypoint_count + 1 {
            return false;
        }
        // order must be a permutation of 0..n
        let mut seen = vec![false; waypoint_count];
        for &idx in &self.order {
            if idx >= waypoint_count || seen[idx] {
                return false;
            }
            seen[idx] = true;
        }
        true
    }

    pub fn total_distance_m(&self) -> u64 {
        self.legs.iter().map(|l| l.distance_m).sum()
    }

    pub fn total_duration_minutes(&self) -> i32 {
        self.legs.iter().map(|l| l.duration_minutes).sum()
    }
}

/// External routing engine. May fail with rate-limit or network errors;
/// callers must tolerate both and fall back to closed-form estimates.
#[async_trait]
pub trait RoutingOracle: Send + Sync {
    /// Road-network distance/duration for a single leg.
    async fn leg(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
        mode: TravelMode,
    ) -> Result<LegEstimate>;

    /// Optimal visiting order through the waypoints, starting at `origin`
    /// and ending at `destination`.
    async fn route(
        &self,
        origin: GeoPoint,
        waypoints: &[GeoPoint],
        destination: GeoPoint,
        mode: TravelMode,
    ) -> Result<RouteEstimate>;

    /// Oracle name for logging.
    fn name(&self) -> &str;
}

/// Deterministic oracle built on great-circle distance.
///
/// Keeps the input visiting order; travel times use the assumed
/// mode speed. Useful for tests and offline runs.
pub struct HaversineOracle {
    average_speed_kmh: f64,
}

impl Default for HaversineOracle {
    fn default() -> Self {
        Self {
            average_speed_kmh: TravelMode::Driving.assumed_speed_kmh(),
        }
    }
}

impl HaversineOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_speed(average_speed_kmh: f64) -> Self {
        Self { average_speed_kmh }
    }

    fn leg_between(&self, from: GeoPoint, to: GeoPoint) -> LegEstimate {
        let km = geo::haversine_km(from, to);
        LegEstimate {
            distance_m: (km * 1000.0).round() as u64,
            duration_minutes: (km / self.average_speed_kmh * 60.0).ceil() as i32,
        }
    }
}

#[async_trait]
impl RoutingOracle for HaversineOracle {
    async fn leg(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
        _mode: TravelMode,
    ) -> Result<LegEstimate> {
        Ok(self.leg_between(origin, destination))
    }

    async fn route(
        &self,
        origin: GeoPoint,
        waypoints: &[GeoPoint],
        destination: GeoPoint,
        _mode: TravelMode,
    ) -> Result<RouteEstimate> {
        let order: Vec<usize> = (0..waypoints.len()).collect();
        let mut legs = Vec::with_capacity(waypoints.len() + 1);

        let mut current = origin;
        for &idx in &order {
            legs.push(self.leg_between(current, waypoints[idx]));
            current = waypoints[idx];
        }
        legs.push(self.leg_between(current, destination));

        Ok(RouteEstimate { order, legs })
    }

    fn name(&self) -> &str {
        "Haversine"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    fn prague() -> GeoPoint {
        GeoPoint::new(50.0755, 14.4378)
    }

    fn brno() -> GeoPoint {
        GeoPoint::new(49.1951, 16.6068)
    }

    #[tokio::test]
    async fn test_haversine_oracle_leg_symmetric() {
        let oracle = HaversineOracle::new();
        let ab = tokio_test::assert_ok!(oracle.leg(prague(), brno(), TravelMode::Driving).await);
        let ba = tokio_test::assert_ok!(oracle.leg(brno(), prague(), TravelMode::Driving).await);
        assert_eq!(ab, ba);
        // ~185 km straight line
        assert!(ab.distance_m > 180_000 && ab.distance_m < 190_000);
    }

    #[tokio::test]
    async fn test_haversine_oracle_speed_scales_duration() {
        let fast = HaversineOracle::with_speed(80.0);
        let slow = HaversineOracle::with_speed(20.0);
        let quick = tokio_test::assert_ok!(fast.leg(prague(), brno(), TravelMode::Driving).await);
        let crawl = tokio_test::assert_ok!(slow.leg(prague(), brno(), TravelMode::Driving).await);
        assert_eq!(quick.distance_m, crawl.distance_m);
        assert!(crawl.duration_minutes > quick.duration_minutes);
    }

    #[tokio::test]
    async fn test_haversine_oracle_route_shape() {
        let oracle = HaversineOracle::new();
        let waypoints = vec![brno(), GeoPoint::new(49.8209, 18.2625)];
        let route = oracle
            .route(prague(), &waypoints, prague(), TravelMode::Driving)
            .await
            .unwrap();

        assert!(route.is_valid_for(waypoints.len()));
        assert_eq!(route.legs.len(), 3);
        assert!(route.total_distance_m() > 0);
        assert!(route.total_duration_minutes() > 0);
    }

    #[tokio::test]
    async fn test_route_with_no_waypoints() {
        let oracle = HaversineOracle::new();
        let route = oracle
            .route(prague(), &[], brno(), TravelMode::Driving)
            .await
            .unwrap();
        assert!(route.order.is_empty());
        assert_eq!(route.legs.len(), 1);
    }

    #[test]
    fn test_route_estimate_rejects_bad_permutation() {
        let leg = LegEstimate { distance_m: 0, duration_minutes: 0 };
        let estimate = RouteEstimate {
            order: vec![0, 0],
            legs: vec![leg; 3],
        };
        assert!(!estimate.is_valid_for(2));
    }
}
