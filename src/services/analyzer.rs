//! Efficiency and capacity analysis
//!
//! Scores finished day-clusters, aggregates utilization metrics and derives
//! ranked recommendations. The scoring constants are product-tuned; keep
//! them in sync with the slot finder, which uses the same travel penalty.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::services::geo;
use crate::types::{BusinessRules, DayCluster};

/// A 3+ stop day whose average consecutive-stop distance is under this
/// earns the dense-clustering bonus.
const DENSE_CLUSTER_KM: f64 = 5.0;

/// Dense-clustering bonus points.
const DENSE_CLUSTER_BONUS: i32 = 20;

/// Single legs longer than this trigger a long-leg recommendation.
const LONG_LEG_KM: f64 = 25.0;

/// Utilization below this (with few appointments) reads as a slack day.
const LOW_UTILIZATION: f64 = 0.60;

/// Utilization at or above this reads as an overpacked day.
const HIGH_UTILIZATION: f64 = 0.95;

/// Travel-time penalty: 10 points per started 10 minutes, capped at 50.
pub fn travel_efficiency_score(total_travel_minutes: i32) -> i32 {
    let penalty = ((total_travel_minutes.max(0) / 10) * 10).min(50);
    (100 - penalty).clamp(0, 100)
}

/// Full cluster efficiency: travel penalty plus the dense-clustering bonus
/// for 3+ stop days, clamped to [0, 100].
pub fn cluster_efficiency_score(
    total_travel_minutes: i32,
    stop_count: usize,
    avg_consecutive_km: Option<f64>,
) -> i32 {
    let mut score = travel_efficiency_score(total_travel_minutes);
    if stop_count >= 3 {
        if let Some(km) = avg_consecutive_km {
            if km < DENSE_CLUSTER_KM {
                score += DENSE_CLUSTER_BONUS;
            }
        }
    }
    score.clamp(0, 100)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecommendationCategory {
    LowUtilization,
    AddBufferTime,
    LongLeg,
    TravelCost,
}

/// High is reserved for cost findings above the configured euro threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecommendationPriority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub category: RecommendationCategory,
    pub priority: RecommendationPriority,
    pub date: Option<NaiveDate>,
    pub message: String,
    pub estimated_cost_eur: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayMetrics {
    pub date: NaiveDate,
    pub appointment_count: usize,
    /// assigned / max per day.
    pub utilization: f64,
    pub efficiency_score: i32,
    pub total_travel_minutes: i32,
    pub total_distance_km: f64,
    pub longest_leg_km: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateMetrics {
    pub day_count: usize,
    pub appointment_count: usize,
    pub average_utilization: f64,
    pub average_efficiency: f64,
    pub total_travel_minutes: i32,
    pub total_distance_km: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub days: Vec<DayMetrics>,
    pub aggregate: AggregateMetrics,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Travel cost per kilometer.
    pub cost_per_km_eur: f64,
    /// Daily travel cost above this becomes a high-priority finding.
    pub high_cost_threshold_eur: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            cost_per_km_eur: 0.30,
            high_cost_threshold_eur: 50.0,
        }
    }
}

/// Computes per-day and aggregate metrics with ranked recommendations.
pub struct ScheduleAnalyzer {
    config: AnalyzerConfig,
}

impl Default for ScheduleAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}

impl ScheduleAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, clusters: &[DayCluster], rules: &BusinessRules) -> AnalysisReport {
        let mut days = Vec::with_capacity(clusters.len());
        let mut recommendations: Vec<Recommendation> = Vec::new();

        for cluster in clusters {
            let metrics = self.day_metrics(cluster, rules);
            self.recommend_for_day(&metrics, &mut recommendations);
            days.push(metrics);
        }

        // One recommendation per category, ranked High > Medium > Low.
        let mut seen = std::collections::HashSet::new();
        recommendations.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.date.cmp(&b.date)));
        recommendations.retain(|r| seen.insert(r.category));

        let aggregate = Self::aggregate(&days);
        AnalysisReport { days, aggregate, recommendations }
    }

    fn day_metrics(&self, cluster: &DayCluster, rules: &BusinessRules) -> DayMetrics {
        let legs = consecutive_leg_distances_km(cluster);
        let longest_leg_km = legs.iter().copied().fold(0.0, f64::max);
        let avg_consecutive_km = if legs.is_empty() {
            None
        } else {
            Some(legs.iter().sum::<f64>() / legs.len() as f64)
        };

        DayMetrics {
            date: cluster.date,
            appointment_count: cluster.len(),
            utilization: cluster.len() as f64 / rules.max_appointments_per_day as f64,
            efficiency_score: cluster_efficiency_score(
                cluster.total_travel_minutes,
                cluster.len(),
                avg_consecutive_km,
            ),
            total_travel_minutes: cluster.total_travel_minutes,
            total_distance_km: cluster.total_distance_m as f64 / 1000.0,
            longest_leg_km,
        }
    }

    fn recommend_for_day(&self, day: &DayMetrics, out: &mut Vec<Recommendation>) {
        if day.utilization < LOW_UTILIZATION && day.appointment_count < 5 {
            out.push(Recommendation {
                category: RecommendationCategory::LowUtilization,
                priority: RecommendationPriority::Low,
                date: Some(day.date),
                message: format!(
                    "{}: only {} appointments ({:.0}% of capacity); consider pulling work forward",
                    day.date,
                    day.appointment_count,
                    day.utilization * 100.0
                ),
                estimated_cost_eur: None,
            });
        }

        if day.utilization >= HIGH_UTILIZATION {
            out.push(Recommendation {
                category: RecommendationCategory::AddBufferTime,
                priority: RecommendationPriority::Medium,
                date: Some(day.date),
                message: format!(
                    "{}: day is at {:.0}% capacity; add buffer time to absorb overruns",
                    day.date,
                    day.utilization * 100.0
                ),
                estimated_cost_eur: None,
            });
        }

        if day.longest_leg_km > LONG_LEG_KM {
            out.push(Recommendation {
                category: RecommendationCategory::LongLeg,
                priority: RecommendationPriority::Medium,
                date: Some(day.date),
                message: format!(
                    "{}: longest leg is {:.1} km; regroup distant stops onto a dedicated day",
                    day.date, day.longest_leg_km
                ),
                estimated_cost_eur: None,
            });
        }

        let travel_cost = day.total_distance_km * self.config.cost_per_km_eur;
        if travel_cost > self.config.high_cost_threshold_eur {
            out.push(Recommendation {
                category: RecommendationCategory::TravelCost,
                priority: RecommendationPriority::High,
                date: Some(day.date),
                message: format!(
                    "{}: estimated travel cost {:.2} € exceeds the {:.2} € threshold",
                    day.date, travel_cost, self.config.high_cost_threshold_eur
                ),
                estimated_cost_eur: Some(travel_cost),
            });
        }
    }

    fn aggregate(days: &[DayMetrics]) -> AggregateMetrics {
        let day_count = days.len();
        if day_count == 0 {
            return AggregateMetrics {
                day_count: 0,
                appointment_count: 0,
                average_utilization: 0.0,
                average_efficiency: 0.0,
                total_travel_minutes: 0,
                total_distance_km: 0.0,
            };
        }

        AggregateMetrics {
            day_count,
            appointment_count: days.iter().map(|d| d.appointment_count).sum(),
            average_utilization: days.iter().map(|d| d.utilization).sum::<f64>() / day_count as f64,
            average_efficiency: days.iter().map(|d| d.efficiency_score as f64).sum::<f64>()
                / day_count as f64,
            total_travel_minutes: days.iter().map(|d| d.total_travel_minutes).sum(),
            total_distance_km: days.iter().map(|d| d.total_distance_km).sum(),
        }
    }
}

/// Straight-line distances between consecutive stops in visiting order.
fn consecutive_leg_distances_km(cluster: &DayCluster) -> Vec<f64> {
    cluster
        .appointments
        .windows(2)
        .map(|pair| geo::haversine_km(pair[0].location.point, pair[1].location.point))
        .collect()
}
