//! Dashboard collaborator contract.
//!
//! The core owns no visual state; it reports numeric summaries and alert
//! transitions through the [`Dashboard`] trait. The concrete dashboard is
//! also touched by other tasks (a button callback, for one), so the monitor
//! task reaches it only through [`SharedDashboard`]: the closure-scoped lock
//! cannot be left held on any exit path.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use crate::readings::{InverterReadings, PowerBalance, Quantity};

/// Which full-screen state the dashboard should present.
///
/// When several apply, `Offline` beats `NoBroker` and both beat `Live`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertState {
    /// Everything up: show the live energy view.
    Live,
    /// Network is up but the broker session is down.
    NoBroker,
    /// No network link.
    Offline,
}

/// Daily energy totals, one per tracked quantity (Wh).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DailyTotals([f32; Quantity::COUNT]);

impl DailyTotals {
    pub const fn new() -> Self {
        Self([0.0; Quantity::COUNT])
    }

    pub fn set(&mut self, quantity: Quantity, energy_wh: f32) {
        self.0[quantity.index()] = energy_wh;
    }

    pub fn of(&self, quantity: Quantity) -> f32 {
        self.0[quantity.index()]
    }
}

/// The UI collaborator, as seen from the monitor task.
pub trait Dashboard {
    /// Update one bar of the historical chart.
    fn set_hour_value(&mut self, quantity: Quantity, hour: u8, energy_wh: f32);

    /// Update the per-day energy totals.
    fn set_daily_totals(&mut self, totals: &DailyTotals);

    /// Switch the full-screen alert. Called once per transition, not per
    /// tick.
    fn set_alert(&mut self, alert: AlertState);

    /// Show a diagnostic line on the settings screen. The producer already
    /// truncated it to the queue's bounded length.
    fn set_status_text(&mut self, text: &str);

    /// Refresh the live view: panels, battery, grid and the derived powers.
    fn show_readings(&mut self, readings: &InverterReadings, balance: &PowerBalance);

    /// Drop the historical chart, at day rollover.
    fn clear_history(&mut self);
}

/// The dashboard behind its lock. Access from the monitor task goes through
/// `lock(|dashboard| ...)`, so release is structural.
pub type SharedDashboard<D> = Mutex<CriticalSectionRawMutex, RefCell<D>>;
