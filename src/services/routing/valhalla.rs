//! Valhalla routing engine adapter
//!
//! Valhalla API documentation:
//! https://valhalla.github.io/valhalla/api/matrix/api-reference/
//! https://valhalla.github.io/valhalla/api/optimized/api-reference/

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{LegEstimate, RouteEstimate, RoutingOracle};
use crate::types::{GeoPoint, TravelMode};

/// Valhalla client configuration
#[derive(Debug, Clone)]
pub struct ValhallaConfig {
    /// Base URL of Valhalla server (e.g., "http://localhost:8002")
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for ValhallaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8002".to_string(),
            timeout_seconds: 30,
        }
    }
}

impl ValhallaConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }
}

/// Routing oracle backed by a Valhalla server
pub struct ValhallaOracle {
    client: reqwest::Client,
    config: ValhallaConfig,
}

impl ValhallaOracle {
    pub fn new(config: ValhallaConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { client, config })
    }

    fn costing_for(mode: TravelMode) -> &'static str {
        match mode {
            TravelMode::Driving => "auto",
            TravelMode::Cycling => "bicycle",
            TravelMode::Walking => "pedestrian",
        }
    }

    fn to_location(point: GeoPoint) -> ValhallaLocation {
        ValhallaLocation {
            lat: point.lat,
            lon: point.lng,
            // 500m snap radius tolerates geocoded coordinates that sit on a
            // building centroid rather than the road edge
            radius: Some(500),
        }
    }
}

#[async_trait]
impl RoutingOracle for ValhallaOracle {
    async fn leg(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
        mode: TravelMode,
    ) -> Result<LegEstimate> {
        let request = MatrixRequest {
            sources: vec![Self::to_location(origin)],
            targets: vec![Self::to_location(destination)],
            costing: Self::costing_for(mode).to_string(),
            units: "kilometers".to_string(),
        };
        let url = format!("{}/sources_to_targets", self.config.base_url);

        debug!("Requesting leg estimate from Valhalla");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("failed to send matrix request to Valhalla")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Valhalla matrix returned error {}: {}", status, body);
        }

        let matrix: MatrixResponse = response
            .json()
            .await
            .context("failed to parse Valhalla matrix response")?;

        let cell = matrix
            .sources_to_targets
            .first()
            .and_then(|row| row.first())
            .context("Valhalla matrix response missing cell")?;

        let distance_km = cell.distance.context("Valhalla returned no distance")?;
        let time_s = cell.time.context("Valhalla returned no duration")?;

        Ok(LegEstimate {
            distance_m: (distance_km * 1000.0).round() as u64,
            duration_minutes: (time_s / 60.0).ceil() as i32,
        })
    }

    async fn route(
        &self,
        origin: GeoPoint,
        waypoints: &[GeoPoint],
        destination: GeoPoint,
        mode: TravelMode,
    ) -> Result<RouteEstimate> {
        if waypoints.is_empty() {
            let leg = self.leg(origin, destination, mode).await?;
            return Ok(RouteEstimate { order: vec![], legs: vec![leg] });
        }

        let mut locations = Vec::with_capacity(waypoints.len() + 2);
        locations.push(Self::to_location(origin));
        locations.extend(waypoints.iter().map(|&p| Self::to_location(p)));
        locations.push(Self::to_location(destination));

        let request = OptimizedRouteRequest {
            locations,
            costing: Self::costing_for(mode).to_string(),
            directions_type: "none".to_string(),
        };
        let url = format!("{}/optimized_route", self.config.base_url);

        debug!(
            "Requesting optimized route from Valhalla for {} waypoints",
            waypoints.len()
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("failed to send route request to Valhalla")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Valhalla optimized_route returned error {}: {}", status, body);
        }

        let route: OptimizedRouteResponse = response
            .json()
            .await
            .context("failed to parse Valhalla route response")?;

        // Interior trip locations carry the original request index; subtract
        // one to map back to the caller's waypoint slice (origin was index 0).
        let order: Vec<usize> = route
            .trip
            .locations
            .iter()
            .skip(1)
            .take(waypoints.len())
            .filter_map(|l| l.original_index)
            .map(|idx| idx.saturating_sub(1))
            .collect();

        let legs: Vec<LegEstimate> = route
            .trip
            .legs
            .iter()
            .map(|leg| LegEstimate {
                distance_m: (leg.summary.length * 1000.0).round() as u64,
                duration_minutes: (leg.summary.time / 60.0).ceil() as i32,
            })
            .collect();

        let estimate = RouteEstimate { order, legs };
        if !estimate.is_valid_for(waypoints.len()) {
            anyhow::bail!(
                "Valhalla returned malformed route: {} order entries, {} legs for {} waypoints",
                estimate.order.len(),
                estimate.legs.len(),
                waypoints.len()
            );
        }

        Ok(estimate)
    }

    fn name(&self) -> &str {
        "Valhalla"
    }
}

// Valhalla API types

#[derive(Debug, Serialize)]
struct MatrixRequest {
    sources: Vec<ValhallaLocation>,
    targets: Vec<ValhallaLocation>,
    costing: String,
    units: String,
}

#[derive(Debug, Serialize, Clone)]
struct ValhallaLocation {
    lat: f64,
    lon: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    radius: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct MatrixResponse {
    sources_to_targets: Vec<Vec<MatrixCell>>,
}

#[derive(Debug, Deserialize)]
struct MatrixCell {
    /// Distance in kilometers (when units="kilometers")
    distance: Option<f64>,
    /// Time in seconds
    time: Option<f64>,
}

#[derive(Debug, Serialize)]
struct OptimizedRouteRequest {
    locations: Vec<ValhallaLocation>,
    costing: String,
    directions_type: String,
}

#[derive(Debug, Deserialize)]
struct OptimizedRouteResponse {
    trip: Trip,
}

#[derive(Debug, Deserialize)]
struct Trip {
    locations: Vec<TripLocation>,
    legs: Vec<TripLeg>,
}

#[derive(Debug, Deserialize)]
struct TripLocation {
    original_index: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct TripLeg {
    summary: LegSummary,
}

#[derive(Debug, Deserialize)]
struct LegSummary {
    /// Length in kilometers
    length: f64,
    /// Time in seconds
    time: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ValhallaConfig::default();
        assert_eq!(config.base_url, "http://localhost:8002");
        assert_eq!(config.timeout_seconds, 30);
    }

    #[test]
    fn test_config_custom_url() {
        let config = ValhallaConfig::new("http://valhalla:8002");
        assert_eq!(config.base_url, "http://valhalla:8002");
    }

    #[test]
    fn test_costing_mapping() {
        assert_eq!(ValhallaOracle::costing_for(TravelMode::Driving), "auto");
        assert_eq!(ValhallaOracle::costing_for(TravelMode::Cycling), "bicycle");
        assert_eq!(ValhallaOracle::costing_for(TravelMode::Walking), "pedestrian");
    }

    #[test]
    fn test_oracle_name() {
        let oracle = ValhallaOracle::new(ValhallaConfig::default()).unwrap();
        assert_eq!(oracle.name(), "Valhalla");
    }

    #[tokio::test]
    #[ignore = "Requires running Valhalla server"]
    async fn test_leg_prague_brno() {
        let oracle = ValhallaOracle::new(ValhallaConfig::default()).unwrap();
        let leg = oracle
            .leg(
                GeoPoint::new(50.0755, 14.4378),
                GeoPoint::new(49.1951, 16.6068),
                TravelMode::Driving,
            )
            .await
            .unwrap();

        // Prague to Brno is ~205 km by road, ~2 hours
        let km = leg.distance_m as f64 / 1000.0;
        assert!(km > 190.0 && km < 230.0, "Expected ~205 km, got {} km", km);
        assert!(leg.duration_minutes > 90 && leg.duration_minutes < 180);
    }
}
