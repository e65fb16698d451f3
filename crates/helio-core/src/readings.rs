//! Inverter telemetry and the quantities derived from it.
//!
//! [`InverterReadings`] is the decoded live parameter block the broker client
//! queues for the monitor task. [`PowerBalance`] is what the task actually
//! integrates: the household/yield/surplus split computed from one report.

use core::fmt::{self, Display};

/// One decoded report from the inverter.
///
/// Powers are in watts. A positive `feed_in_power` is export to the grid,
/// a negative one is import. A positive `battery_power` is charge.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InverterReadings {
    /// DC power of the first photovoltaic string (W).
    pub pv1_power: i32,
    /// DC power of the second photovoltaic string (W).
    pub pv2_power: i32,
    /// AC output on phase R (W).
    pub grid_power_r: i32,
    /// AC output on phase S (W).
    pub grid_power_s: i32,
    /// AC output on phase T (W).
    pub grid_power_t: i32,
    /// Power exchanged with the grid (W, export positive).
    pub feed_in_power: i32,
    /// Battery charge power (W).
    pub battery_power: i32,
    /// Battery state of charge (%).
    pub battery_capacity: u8,
    /// Battery pack temperature (degrees C).
    pub battery_temperature: i16,
    /// Inverter temperature (degrees C).
    pub inverter_temperature: i16,
    /// The grid side is up.
    pub grid_online: bool,
}

impl InverterReadings {
    /// Combined AC output of the three inverter phases (W).
    pub fn inverter_total(&self) -> i32 {
        self.grid_power_r + self.grid_power_s + self.grid_power_t
    }

    /// Combined DC yield of both photovoltaic strings (W).
    pub fn photovoltaic_total(&self) -> i32 {
        self.pv1_power + self.pv2_power
    }
}

impl Display for InverterReadings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pv: {} W, inverter: {} W, feed-in: {} W, battery: {} W ({} %)",
            self.photovoltaic_total(),
            self.inverter_total(),
            self.feed_in_power,
            self.battery_power,
            self.battery_capacity
        )
    }
}

/// Instantaneous power split derived from one readings report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerBalance {
    /// Household draw: inverter output minus grid feed-in (W).
    pub consumption: f32,
    /// Total photovoltaic yield (W).
    pub photovoltaic: f32,
    /// Yield left over after the household is served (W).
    pub free_energy: f32,
}

impl PowerBalance {
    pub fn from_readings(readings: &InverterReadings) -> Self {
        let consumption = (readings.inverter_total() - readings.feed_in_power) as f32;
        let photovoltaic = readings.photovoltaic_total() as f32;
        Self {
            consumption,
            photovoltaic,
            free_energy: photovoltaic - consumption,
        }
    }

    /// The component of this balance that feeds the given quantity's
    /// accumulator.
    pub fn power_of(&self, quantity: Quantity) -> f32 {
        match quantity {
            Quantity::Consumption => self.consumption,
            Quantity::Photovoltaic => self.photovoltaic,
            Quantity::FreeEnergy => self.free_energy,
        }
    }
}

impl Display for PowerBalance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "consumption: {:.0} W, photovoltaic: {:.0} W, free: {:.0} W",
            self.consumption, self.photovoltaic, self.free_energy
        )
    }
}

/// A tracked measurement stream, each with its own accumulator and durable
/// day record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    /// Household consumption.
    Consumption,
    /// Photovoltaic yield.
    Photovoltaic,
    /// Surplus yield after consumption.
    FreeEnergy,
}

impl Quantity {
    /// Number of tracked quantities.
    pub const COUNT: usize = 3;

    /// All tracked quantities, in accumulator-array order.
    pub const ALL: [Quantity; Self::COUNT] =
        [Self::Consumption, Self::Photovoltaic, Self::FreeEnergy];

    /// Index of this quantity in per-quantity arrays.
    pub const fn index(self) -> usize {
        match self {
            Self::Consumption => 0,
            Self::Photovoltaic => 1,
            Self::FreeEnergy => 2,
        }
    }

    /// Short label for logs and the dashboard.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Consumption => "consumption",
            Self::Photovoltaic => "photovoltaic",
            Self::FreeEnergy => "free energy",
        }
    }

    /// Suffix appended to the `/DDMM` stem of this quantity's day record.
    pub const fn record_suffix(self) -> &'static str {
        match self {
            Self::Consumption => "",
            Self::Photovoltaic => "PV",
            Self::FreeEnergy => "FE",
        }
    }
}
