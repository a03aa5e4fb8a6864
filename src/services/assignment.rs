//! Day-cluster assignment engine
//!
//! Greedily distributes a backlog of unassigned appointments across the
//! working days of a date range. Placement honours capacity, service radius
//! and the projected day total (service + buffers + travel chain); whatever
//! cannot be placed lands in the residual list with a reason code instead
//! of failing the batch.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::ScheduleError;
use crate::services::analyzer::cluster_efficiency_score;
use crate::services::estimator::TravelEstimator;
use crate::services::geo;
use crate::types::{Appointment, BusinessRules, DayCluster, ServiceLocation, TravelMode};

/// How the backlog is ordered before greedy placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationStrategy {
    /// Nearest to the dispatch base first.
    MinimalTravel,
    /// Highest priority first, then requested date.
    MaximumAppointments,
    /// Blended score: `2 * priority - distance_from_base_km`.
    Balanced,
}

impl OptimizationStrategy {
    /// How many nearby working days to try besides the requested date.
    fn nearby_day_candidates(self) -> usize {
        match self {
            Self::MinimalTravel | Self::Balanced => 3,
            Self::MaximumAppointments => 5,
        }
    }
}

/// Why an appointment ended up unplaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResidualReason {
    /// Every candidate day was already at capacity.
    CapacityExceeded,
    /// Location is beyond the service radius from the base.
    OutOfRadius,
    /// No candidate day could absorb the projected time.
    NoFeasibleWindow,
    /// The batch was cancelled before this appointment was placed.
    Cancelled,
}

/// An unplaced appointment, carried whole so the caller can re-submit it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResidualAppointment {
    pub appointment: Appointment,
    pub reason: ResidualReason,
}

/// Result of one batch assignment run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentOutcome {
    /// Non-empty clusters, ordered by date. Arrival order within a day is
    /// insertion order; true sequencing is a separate pass.
    pub clusters: Vec<DayCluster>,
    pub residual: Vec<ResidualAppointment>,
}

/// Internal per-day feasibility verdict.
enum PlacementFailure {
    AtCapacity,
    WindowExceeded,
}

/// Distributes a backlog across working days.
pub struct AssignmentEngine {
    estimator: Arc<TravelEstimator>,
}

impl AssignmentEngine {
    pub fn new(estimator: Arc<TravelEstimator>) -> Self {
        Self { estimator }
    }

    /// Assign `backlog` to working days in `[range_start, range_end]`.
    ///
    /// Individual placement failures never abort the batch; they accumulate
    /// in the residual list. A cancelled token stops placement at the next
    /// appointment boundary and residualizes the rest.
    pub async fn assign_backlog(
        &self,
        backlog: Vec<Appointment>,
        range_start: NaiveDate,
        range_end: NaiveDate,
        base: &ServiceLocation,
        strategy: OptimizationStrategy,
        rules: &BusinessRules,
        cancel: Option<&CancellationToken>,
    ) -> Result<AssignmentOutcome, ScheduleError> {
        if range_end < range_start {
            return Err(ScheduleError::InvalidInput(format!(
                "date range end {} precedes start {}",
                range_end, range_start
            )));
        }
        base.point.validate()?;
        rules.validate()?;
        for appointment in &backlog {
            appointment.validate()?;
        }

        let working_days = working_days_in(range_start, range_end, rules);
        let mut clusters: Vec<DayCluster> =
            working_days.iter().map(|&date| DayCluster::new(date)).collect();
        let mut residual = Vec::new();

        // Radius pre-filter runs before any ordering or day search.
        let mut candidates = Vec::with_capacity(backlog.len());
        for appointment in backlog {
            let km = geo::haversine_km(base.point, appointment.location.point);
            if km > rules.max_service_radius_km {
                debug!(
                    "appointment {} is {:.1} km from base, outside the {:.1} km radius",
                    appointment.id, km, rules.max_service_radius_km
                );
                residual.push(ResidualAppointment {
                    appointment,
                    reason: ResidualReason::OutOfRadius,
                });
            } else {
                candidates.push(appointment);
            }
        }

        sort_backlog(&mut candidates, base, strategy);

        let mut pending = candidates.into_iter();
        while let Some(appointment) = pending.next() {
            if cancel.map_or(false, |c| c.is_cancelled()) {
                info!("assignment batch cancelled, residualizing remaining appointments");
                residual.push(ResidualAppointment {
                    appointment,
                    reason: ResidualReason::Cancelled,
                });
                residual.extend(pending.map(|a| ResidualAppointment {
                    appointment: a,
                    reason: ResidualReason::Cancelled,
                }));
                break;
            }

            let day_order = candidate_days(&working_days, &appointment, range_start, strategy);
            if day_order.is_empty() {
                residual.push(ResidualAppointment {
                    appointment,
                    reason: ResidualReason::NoFeasibleWindow,
                });
                continue;
            }

            let mut all_capacity = true;
            let mut placed = false;
            for date in day_order {
                let cluster = clusters
                    .iter_mut()
                    .find(|c| c.date == date)
                    .ok_or_else(|| {
                        ScheduleError::InvalidInput(format!("no cluster for day {}", date))
                    })?;

                match self
                    .try_place(cluster, &appointment, base, rules, cancel)
                    .await
                {
                    Ok(()) => {
                        placed = true;
                        break;
                    }
                    Err(PlacementFailure::AtCapacity) => {}
                    Err(PlacementFailure::WindowExceeded) => all_capacity = false,
                }
            }

            if !placed {
                let reason = if all_capacity {
                    ResidualReason::CapacityExceeded
                } else {
                    ResidualReason::NoFeasibleWindow
                };
                debug!("appointment {} unplaced: {:?}", appointment.id, reason);
                residual.push(ResidualAppointment { appointment, reason });
            }
        }

        clusters.retain(|c| !c.appointments.is_empty());
        info!(
            "assigned {} appointments over {} days, {} residual",
            clusters.iter().map(DayCluster::len).sum::<usize>(),
            clusters.len(),
            residual.len()
        );
        Ok(AssignmentOutcome { clusters, residual })
    }

    /// Try adding `appointment` to `cluster`, updating travel totals and the
    /// efficiency score on success.
    async fn try_place(
        &self,
        cluster: &mut DayCluster,
        appointment: &Appointment,
        base: &ServiceLocation,
        rules: &BusinessRules,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), PlacementFailure> {
        if cluster.len() >= rules.max_appointments_per_day {
            return Err(PlacementFailure::AtCapacity);
        }

        // Projected travel chain in insertion order, base to base.
        let mut stops: Vec<&Appointment> = cluster.appointments.iter().collect();
        stops.push(appointment);

        let mut travel_minutes = 0i32;
        let mut distance_m = 0u64;
        let mut position = base.point;
        for stop in &stops {
            let leg = self
                .estimator
                .travel_time(position, stop.location.point, TravelMode::Driving, None, cancel)
                .await;
            travel_minutes += leg.duration_minutes;
            distance_m += leg.distance_m;
            position = stop.location.point;
        }
        let back = self
            .estimator
            .travel_time(position, base.point, TravelMode::Driving, None, cancel)
            .await;
        travel_minutes += back.duration_minutes;
        distance_m += back.distance_m;

        let service_minutes = cluster.service_minutes() + appointment.duration_minutes;
        let buffer_minutes = stops.len() as i32 * rules.buffer_minutes;
        let projected = service_minutes + buffer_minutes + travel_minutes;
        if projected > rules.window_minutes() {
            return Err(PlacementFailure::WindowExceeded);
        }

        cluster.appointments.push(appointment.clone());
        cluster.total_travel_minutes = travel_minutes;
        cluster.total_distance_m = distance_m;
        cluster.efficiency_score = cluster_efficiency_score(
            travel_minutes,
            cluster.len(),
            avg_consecutive_km(&cluster.appointments),
        );
        Ok(())
    }
}

/// Working days in the inclusive range, in calendar order.
fn working_days_in(start: NaiveDate, end: NaiveDate, rules: &BusinessRules) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut date = start;
    while date <= end {
        if rules.is_working_day(date) {
            days.push(date);
        }
        date = match date.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }
    days
}

fn sort_backlog(backlog: &mut [Appointment], base: &ServiceLocation, strategy: OptimizationStrategy) {
    match strategy {
        OptimizationStrategy::MinimalTravel => {
            backlog.sort_by(|a, b| {
                let da = geo::haversine_km(base.point, a.location.point);
                let db = geo::haversine_km(base.point, b.location.point);
                da.total_cmp(&db)
            });
        }
        OptimizationStrategy::MaximumAppointments => {
            backlog.sort_by(|a, b| {
                b.priority_or_default()
                    .cmp(&a.priority_or_default())
                    .then_with(|| match (a.requested_date, b.requested_date) {
                        (Some(da), Some(db)) => da.cmp(&db),
                        (Some(_), None) => std::cmp::Ordering::Less,
                        (None, Some(_)) => std::cmp::Ordering::Greater,
                        (None, None) => std::cmp::Ordering::Equal,
                    })
            });
        }
        OptimizationStrategy::Balanced => {
            backlog.sort_by(|a, b| {
                let score = |appt: &Appointment| {
                    2.0 * appt.priority_or_default() as f64
                        - geo::haversine_km(base.point, appt.location.point)
                };
                score(b).total_cmp(&score(a))
            });
        }
    }
}

/// Requested date first, then nearby working days by calendar distance.
fn candidate_days(
    working_days: &[NaiveDate],
    appointment: &Appointment,
    range_start: NaiveDate,
    strategy: OptimizationStrategy,
) -> Vec<NaiveDate> {
    let anchor = appointment.requested_date.unwrap_or(range_start);

    let mut nearby: Vec<NaiveDate> = working_days
        .iter()
        .copied()
        .filter(|&d| d != anchor)
        .collect();
    nearby.sort_by_key(|&d| ((d - anchor).num_days().abs(), d));
    nearby.truncate(strategy.nearby_day_candidates());

    let mut days = Vec::with_capacity(nearby.len() + 1);
    if working_days.contains(&anchor) {
        days.push(anchor);
    }
    days.extend(nearby);
    days
}

/// Average straight-line distance between consecutive stops, insertion order.
fn avg_consecutive_km(appointments: &[Appointment]) -> Option<f64> {
    if appointments.len() < 2 {
        return None;
    }
    let total: f64 = appointments
        .windows(2)
        .map(|pair| geo::haversine_km(pair[0].location.point, pair[1].location.point))
        .sum();
    Some(total / (appointments.len() - 1) as f64)
}
