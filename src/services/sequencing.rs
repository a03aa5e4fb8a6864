//! Route sequencing optimizer
//!
//! Orders one day-cluster's appointments for minimal travel. The oracle path
//! asks the routing engine for an optimized visiting order; the fallback is
//! a nearest-neighbor walk over straight-line distances. Both paths produce
//! the same shape of result, so the choice is recorded, not thrown.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ScheduleError;
use crate::services::analyzer::cluster_efficiency_score;
use crate::services::estimator::TravelEstimator;
use crate::services::geo;
use crate::services::routing::{LegEstimate, RoutingOracle};
use crate::services::{add_minutes, minutes_between};
use crate::types::{
    BusinessRules, DayCluster, GeoPoint, ServiceLocation, SlotKind, Timeline, TimelineSlot,
    TravelMode,
};

/// Per-call budget for the route oracle.
const ORACLE_ROUTE_TIMEOUT: Duration = Duration::from_secs(10);

/// Which path produced the ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SequencePath {
    Oracle,
    NearestNeighbor,
}

/// A sequenced day: reordered cluster, expanded timeline, and the path used.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequencedDay {
    pub cluster: DayCluster,
    pub timeline: Timeline,
    pub path: SequencePath,
}

/// Orders appointments within a day and expands the plan into a timeline.
pub struct RouteSequencer {
    estimator: Arc<TravelEstimator>,
    oracle: Option<Arc<dyn RoutingOracle>>,
}

impl RouteSequencer {
    /// Sequencer without an oracle — always nearest-neighbor.
    pub fn new(estimator: Arc<TravelEstimator>) -> Self {
        Self { estimator, oracle: None }
    }

    pub fn with_oracle(estimator: Arc<TravelEstimator>, oracle: Arc<dyn RoutingOracle>) -> Self {
        Self { estimator, oracle: Some(oracle) }
    }

    /// Order `cluster`'s appointments starting and ending at `base`, set
    /// their start times and build the day's timeline.
    ///
    /// Deterministic for a given oracle response; the fallback is fully
    /// deterministic.
    pub async fn sequence_day(
        &self,
        mut cluster: DayCluster,
        base: &ServiceLocation,
        rules: &BusinessRules,
        cancel: Option<&CancellationToken>,
    ) -> Result<SequencedDay, ScheduleError> {
        base.point.validate()?;
        rules.validate()?;

        if cluster.appointments.is_empty() {
            let timeline = Timeline::empty(cluster.date);
            return Ok(SequencedDay {
                cluster,
                timeline,
                path: SequencePath::NearestNeighbor,
            });
        }
        for appointment in &cluster.appointments {
            appointment.validate()?;
        }

        let waypoints: Vec<GeoPoint> =
            cluster.appointments.iter().map(|a| a.location.point).collect();

        let (order, legs, path) = match self.oracle_route(&waypoints, base, cancel).await {
            Some((order, legs)) => (order, legs, SequencePath::Oracle),
            None => {
                let order = nearest_neighbor_order(base.point, &waypoints);
                let legs = self.fallback_legs(base.point, &waypoints, &order);
                (order, legs, SequencePath::NearestNeighbor)
            }
        };

        // Reorder appointments to the visiting order.
        let mut slots_by_index: Vec<Option<_>> =
            cluster.appointments.into_iter().map(Some).collect();
        let mut ordered = Vec::with_capacity(order.len());
        for &idx in &order {
            let appointment = slots_by_index
                .get_mut(idx)
                .and_then(Option::take)
                .ok_or_else(|| {
                    ScheduleError::InvalidInput(format!("route order index {} out of range", idx))
                })?;
            ordered.push(appointment);
        }
        cluster.appointments = ordered;

        let timeline = build_timeline(&mut cluster, &legs, rules);

        cluster.total_travel_minutes = legs.iter().map(|l| l.duration_minutes).sum();
        cluster.total_distance_m = legs.iter().map(|l| l.distance_m).sum();
        cluster.efficiency_score = cluster_efficiency_score(
            cluster.total_travel_minutes,
            cluster.len(),
            avg_consecutive_km(&cluster),
        );

        debug!(
            "sequenced {} stops for {} via {:?}: {} min travel",
            cluster.len(),
            cluster.date,
            path,
            cluster.total_travel_minutes
        );
        Ok(SequencedDay { cluster, timeline, path })
    }

    /// Sequence several clusters concurrently. Clusters share no mutable
    /// state, so their days can run in parallel; the estimator's semaphore
    /// still bounds oracle traffic.
    pub async fn sequence_days(
        &self,
        clusters: Vec<DayCluster>,
        base: &ServiceLocation,
        rules: &BusinessRules,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<SequencedDay>, ScheduleError> {
        let pending = clusters
            .into_iter()
            .map(|cluster| self.sequence_day(cluster, base, rules, cancel));
        futures::future::join_all(pending).await.into_iter().collect()
    }

    /// Oracle path; `None` means fall back.
    async fn oracle_route(
        &self,
        waypoints: &[GeoPoint],
        base: &ServiceLocation,
        cancel: Option<&CancellationToken>,
    ) -> Option<(Vec<usize>, Vec<LegEstimate>)> {
        let oracle = self.oracle.as_ref()?;
        if cancel.map_or(false, |c| c.is_cancelled()) {
            return None;
        }

        let call = tokio::time::timeout(
            ORACLE_ROUTE_TIMEOUT,
            oracle.route(base.point, waypoints, base.point, TravelMode::Driving),
        );
        let outcome = if let Some(token) = cancel {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("route oracle call cancelled, using nearest-neighbor");
                    return None;
                }
                result = call => result,
            }
        } else {
            call.await
        };

        match outcome {
            Ok(Ok(estimate)) if estimate.is_valid_for(waypoints.len()) => {
                Some((estimate.order, estimate.legs))
            }
            Ok(Ok(estimate)) => {
                warn!(
                    "oracle {} returned malformed route ({} order entries for {} waypoints), \
                     using nearest-neighbor",
                    oracle.name(),
                    estimate.order.len(),
                    waypoints.len()
                );
                None
            }
            Ok(Err(err)) => {
                warn!(
                    "oracle {} route failed, using nearest-neighbor: {}",
                    oracle.name(),
                    err
                );
                None
            }
            Err(_) => {
                warn!("oracle {} route timed out, using nearest-neighbor", oracle.name());
                None
            }
        }
    }

    /// Closed-form legs for a given visiting order, base to base.
    fn fallback_legs(
        &self,
        base: GeoPoint,
        waypoints: &[GeoPoint],
        order: &[usize],
    ) -> Vec<LegEstimate> {
        let mut legs = Vec::with_capacity(order.len() + 1);
        let mut position = base;
        for &idx in order {
            legs.push(self.estimator.fallback_leg(position, waypoints[idx], TravelMode::Driving, None));
            position = waypoints[idx];
        }
        legs.push(self.estimator.fallback_leg(position, base, TravelMode::Driving, None));
        legs
    }
}

/// Repeatedly visit the nearest unvisited stop; ties break by input index.
fn nearest_neighbor_order(base: GeoPoint, waypoints: &[GeoPoint]) -> Vec<usize> {
    let mut remaining: Vec<usize> = (0..waypoints.len()).collect();
    let mut order = Vec::with_capacity(waypoints.len());
    let mut position = base;

    while !remaining.is_empty() {
        let mut best = 0usize;
        let mut best_km = f64::INFINITY;
        for (slot, &idx) in remaining.iter().enumerate() {
            let km = geo::haversine_km(position, waypoints[idx]);
            if km < best_km {
                best_km = km;
                best = slot;
            }
        }
        let idx = remaining.remove(best);
        position = waypoints[idx];
        order.push(idx);
    }
    order
}

/// Walk the visiting order from day start: travel, appointment, buffer,
/// repeat, then the trailing leg back to base. Sets each appointment's
/// start time as a side effect.
fn build_timeline(cluster: &mut DayCluster, legs: &[LegEstimate], rules: &BusinessRules) -> Timeline {
    let mut slots = Vec::new();
    let mut cursor = rules.day_start;

    for (i, appointment) in cluster.appointments.iter_mut().enumerate() {
        let leg = legs[i];
        if leg.duration_minutes > 0 {
            let arrival = add_minutes(cursor, leg.duration_minutes);
            slots.push(TimelineSlot {
                kind: SlotKind::Travel,
                start: cursor,
                end: arrival,
                distance_m: Some(leg.distance_m),
                duration_minutes: Some(leg.duration_minutes),
            });
            cursor = arrival;
        }

        // Honour a pre-set start time by idling until it.
        if let Some(fixed) = appointment.scheduled_start {
            let wait = minutes_between(cursor, fixed);
            if wait > 0 {
                slots.push(TimelineSlot {
                    kind: SlotKind::Idle,
                    start: cursor,
                    end: fixed,
                    distance_m: None,
                    duration_minutes: Some(wait),
                });
                cursor = fixed;
            }
        }

        let end = add_minutes(cursor, appointment.duration_minutes);
        appointment.scheduled_start = Some(cursor);
        slots.push(TimelineSlot {
            kind: SlotKind::Appointment { appointment_id: appointment.id },
            start: cursor,
            end,
            distance_m: None,
            duration_minutes: Some(appointment.duration_minutes),
        });
        cursor = end;

        if rules.buffer_minutes > 0 {
            let buffered = add_minutes(cursor, rules.buffer_minutes);
            slots.push(TimelineSlot {
                kind: SlotKind::Idle,
                start: cursor,
                end: buffered,
                distance_m: None,
                duration_minutes: Some(rules.buffer_minutes),
            });
            cursor = buffered;
        }
    }

    if let Some(back) = legs.last() {
        if back.duration_minutes > 0 {
            let arrival = add_minutes(cursor, back.duration_minutes);
            slots.push(TimelineSlot {
                kind: SlotKind::Travel,
                start: cursor,
                end: arrival,
                distance_m: Some(back.distance_m),
                duration_minutes: Some(back.duration_minutes),
            });
        }
    }

    Timeline { date: cluster.date, slots }
}

fn avg_consecutive_km(cluster: &DayCluster) -> Option<f64> {
    if cluster.appointments.len() < 2 {
        return None;
    }
    let total: f64 = cluster
        .appointments
        .windows(2)
        .map(|pair| geo::haversine_km(pair[0].location.point, pair[1].location.point))
        .sum();
    Some(total / (cluster.appointments.len() - 1) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::NaiveDate;

    use crate::services::routing::{HaversineOracle, RouteEstimate};
    use crate::types::Appointment;

    fn base() -> ServiceLocation {
        ServiceLocation::from_point(GeoPoint::new(50.0, 14.0))
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 16).unwrap()
    }

    fn cluster_with(stops: &[(f64, f64)]) -> DayCluster {
        let mut cluster = DayCluster::new(monday());
        for &(lat, lng) in stops {
            cluster.appointments.push(Appointment::new(
                ServiceLocation::from_point(GeoPoint::new(lat, lng)),
                60,
            ));
        }
        cluster
    }

    fn estimator() -> Arc<TravelEstimator> {
        Arc::new(TravelEstimator::new(BusinessRules::default()))
    }

    /// Oracle that always errors, as if the routing engine were down.
    struct DownOracle;

    #[async_trait]
    impl RoutingOracle for DownOracle {
        async fn leg(&self, _o: GeoPoint, _d: GeoPoint, _m: TravelMode) -> Result<LegEstimate> {
            anyhow::bail!("connection refused")
        }

        async fn route(
            &self,
            _o: GeoPoint,
            _w: &[GeoPoint],
            _d: GeoPoint,
            _m: TravelMode,
        ) -> Result<RouteEstimate> {
            anyhow::bail!("connection refused")
        }

        fn name(&self) -> &str {
            "Down"
        }
    }

    #[tokio::test]
    async fn test_failing_oracle_still_sequences_everything() {
        let sequencer = RouteSequencer::with_oracle(estimator(), Arc::new(DownOracle));
        let cluster = cluster_with(&[(50.05, 14.0), (50.01, 14.0), (50.09, 14.0)]);
        let rules = BusinessRules::default();

        let day = sequencer
            .sequence_day(cluster, &base(), &rules, None)
            .await
            .unwrap();

        assert_eq!(day.path, SequencePath::NearestNeighbor);
        assert_eq!(day.cluster.len(), 3);
        assert!(day.cluster.total_distance_m > 0);
        // Nearest-neighbor from base visits south-to-north here.
        let lats: Vec<f64> = day
            .cluster
            .appointments
            .iter()
            .map(|a| a.location.point.lat)
            .collect();
        assert_eq!(lats, vec![50.01, 50.05, 50.09]);
    }

    #[tokio::test]
    async fn test_sequencing_is_idempotent_in_distance() {
        let sequencer = RouteSequencer::new(estimator());
        let rules = BusinessRules::default();
        let stops = [(50.03, 14.02), (50.01, 14.05), (50.06, 14.01)];

        let first = sequencer
            .sequence_day(cluster_with(&stops), &base(), &rules, None)
            .await
            .unwrap();
        let second = sequencer
            .sequence_day(first.cluster.clone(), &base(), &rules, None)
            .await
            .unwrap();

        assert_eq!(first.cluster.total_distance_m, second.cluster.total_distance_m);
    }

    #[tokio::test]
    async fn test_timeline_is_contiguous_and_sets_starts() {
        let sequencer = RouteSequencer::new(estimator());
        let rules = BusinessRules::default();
        let cluster = cluster_with(&[(50.05, 14.0), (50.1, 14.0)]);

        let day = sequencer
            .sequence_day(cluster, &base(), &rules, None)
            .await
            .unwrap();

        assert!(day.timeline.is_contiguous());
        assert_eq!(day.timeline.appointment_count(), 2);
        assert!(day.cluster.appointments.iter().all(|a| a.scheduled_start.is_some()));
        // First slot is the leg out from base.
        assert!(matches!(day.timeline.slots[0].kind, SlotKind::Travel));
        assert_eq!(day.timeline.slots[0].start, rules.day_start);
        // Last slot is the leg back to base.
        assert!(matches!(day.timeline.slots.last().unwrap().kind, SlotKind::Travel));
    }

    #[tokio::test]
    async fn test_oracle_path_recorded_when_available() {
        let sequencer =
            RouteSequencer::with_oracle(estimator(), Arc::new(HaversineOracle::new()));
        let rules = BusinessRules::default();
        let cluster = cluster_with(&[(50.02, 14.0), (50.04, 14.0)]);

        let day = sequencer
            .sequence_day(cluster, &base(), &rules, None)
            .await
            .unwrap();
        assert_eq!(day.path, SequencePath::Oracle);
        assert_eq!(day.cluster.len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_token_uses_fallback() {
        let sequencer =
            RouteSequencer::with_oracle(estimator(), Arc::new(HaversineOracle::new()));
        let rules = BusinessRules::default();
        let token = CancellationToken::new();
        token.cancel();

        let day = sequencer
            .sequence_day(cluster_with(&[(50.02, 14.0)]), &base(), &rules, Some(&token))
            .await
            .unwrap();
        assert_eq!(day.path, SequencePath::NearestNeighbor);
    }

    #[tokio::test]
    async fn test_empty_cluster_yields_empty_timeline() {
        let sequencer = RouteSequencer::new(estimator());
        let rules = BusinessRules::default();

        let day = sequencer
            .sequence_day(DayCluster::new(monday()), &base(), &rules, None)
            .await
            .unwrap();
        assert!(day.timeline.slots.is_empty());
        assert_eq!(day.cluster.len(), 0);
    }

    #[test]
    fn test_nearest_neighbor_tie_breaks_by_index() {
        let base = GeoPoint::new(50.0, 14.0);
        // Two stops at the same point; the earlier index wins.
        let waypoints = vec![GeoPoint::new(50.01, 14.0), GeoPoint::new(50.01, 14.0)];
        let order = nearest_neighbor_order(base, &waypoints);
        assert_eq!(order, vec![0, 1]);
    }
}
