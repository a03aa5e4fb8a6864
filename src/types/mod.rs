//! Type definitions

pub mod appointment;
pub mod cluster;
pub mod geo;
pub mod rules;

pub use appointment::*;
pub use cluster::*;
pub use geo::*;
pub use rules::*;
