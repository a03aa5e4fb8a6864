//! Error taxonomy for the scheduling core
//!
//! Only two conditions surface as `Err`: malformed input (fails fast) and
//! an oracle problem that escaped local recovery (internal use; the public
//! operations always recover via the closed-form fallback). Infeasible
//! requests are expressed as empty results and residual lists, never errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Malformed coordinates, non-positive durations, inverted windows.
    /// Surfaced immediately with no partial processing.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Routing oracle failed after retries. Recovered locally via the
    /// closed-form estimate; never fatal to a batch.
    #[error("routing oracle unavailable: {0}")]
    OracleUnavailable(String),
}
