//! Hourly energy accumulation and its durable snapshot format.

pub mod accumulator;
pub mod snapshot;

pub use accumulator::EnergyAccumulator;

/// Number of hourly buckets in one day of history.
pub const HOURS_PER_DAY: usize = 24;
