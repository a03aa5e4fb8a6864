//! Geospatial scheduling core for field-service appointment booking.
//!
//! Four cooperating components:
//! - [`services::estimator::TravelEstimator`] — distances and travel times,
//!   routing oracle with a closed-form haversine fallback
//! - [`services::slots::SlotFinder`] — candidate slots for one new
//!   appointment against a day's existing bookings
//! - [`services::assignment::AssignmentEngine`] — batch assignment of a
//!   backlog across a date range into day-clusters
//! - [`services::sequencing::RouteSequencer`] — intra-day visiting order and
//!   timeline expansion
//!
//! plus [`services::analyzer::ScheduleAnalyzer`] for efficiency and capacity
//! reporting over finished clusters.
//!
//! The crate holds no persistent state between invocations beyond the
//! estimator's travel-time cache; persistence and transport are the
//! caller's concern.

pub mod error;
pub mod services;
pub mod types;

pub use error::ScheduleError;
pub use services::analyzer::{AnalysisReport, AnalyzerConfig, ScheduleAnalyzer};
pub use services::assignment::{
    AssignmentEngine, AssignmentOutcome, OptimizationStrategy, ResidualAppointment,
    ResidualReason,
};
pub use services::estimator::{TravelEstimator, TravelEstimatorConfig};
pub use services::routing::{
    HaversineOracle, LegEstimate, RouteEstimate, RoutingOracle, ValhallaConfig, ValhallaOracle,
};
pub use services::sequencing::{RouteSequencer, SequencePath, SequencedDay};
pub use services::slots::{SlotCandidate, SlotFinder};
pub use types::{
    Appointment, BusinessRules, DayCluster, GeoPoint, ServiceLocation, SlotKind, Timeline,
    TimelineSlot, TravelMode, Waypoint,
};
