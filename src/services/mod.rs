//! Business logic services

pub mod analyzer;
pub mod assignment;
pub mod estimator;
pub mod geo;
pub mod routing;
pub mod sequencing;
pub mod slots;

use chrono::NaiveTime;

/// Add minutes to a time of day, clamped to the end of the day.
pub(crate) fn add_minutes(time: NaiveTime, minutes: i32) -> NaiveTime {
    let total = time.signed_duration_since(NaiveTime::MIN).num_minutes() as i32 + minutes;
    let clamped = total.clamp(0, 24 * 60 - 1);
    NaiveTime::from_num_seconds_from_midnight_opt(clamped as u32 * 60, 0)
        .unwrap_or(NaiveTime::MIN)
}

/// Whole minutes from `from` to `to`; negative when `to` is earlier.
pub(crate) fn minutes_between(from: NaiveTime, to: NaiveTime) -> i32 {
    to.signed_duration_since(from).num_minutes() as i32
}
