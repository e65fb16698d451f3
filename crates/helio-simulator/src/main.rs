//! Desktop simulator for the helio-rs monitoring core.
//!
//! Drives the monitor task with synthetic inverter telemetry on a compressed
//! clock: ticks run back to back instead of once per second, so a full day of
//! accumulation, checkpoints and the midnight rollover plays out in around a
//! second of real time.
//!
//! Storage lands in `./sdcard`. The run length in simulated hours is the
//! first command line argument; the default of 36 crosses one midnight and
//! so shows the rollover. A shorter run, for example `helio-simulator 8`
//! executed twice, leaves the day records behind and demonstrates restart
//! recovery: the second run restores the first run's history before
//! continuing.
//!
//! The scripted scenario: time sync shortly after boot, a broker outage in
//! the afternoon of day one, a network outage in the night of day two.

use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::Rc;
use std::{fs, io};

use chrono::{DateTime, Datelike, NaiveDate, Timelike};
use log::{debug, info};

use helio_core::app_state::{post_readings, post_status, readings_receiver, status_receiver};
use helio_core::clock::{Clock, LocalTime};
use helio_core::dashboard::{AlertState, DailyTotals, Dashboard, SharedDashboard};
use helio_core::energy::HOURS_PER_DAY;
use helio_core::monitor::MonitorTask;
use helio_core::readings::{InverterReadings, PowerBalance, Quantity};
use helio_core::storage::{RecordText, Storage, StorageError};

// ---------------------------------------------------------------------------
// Scenario constants
// ---------------------------------------------------------------------------

/// Simulated hours to run when no argument is given.
const DEFAULT_SIM_HOURS: i64 = 36;

/// Seconds between inverter reports.
const READING_INTERVAL_SECS: i64 = 2;

/// Seconds after boot until the scripted time sync completes.
const TIME_SYNC_AFTER_SECS: i64 = 10;

/// Peak photovoltaic yield of the simulated array (W).
const PEAK_PV_W: f32 = 4200.0;

// ---------------------------------------------------------------------------
// Collaborator implementations
// ---------------------------------------------------------------------------

/// Simulated wall clock: a shared epoch counter decomposed into civil time.
#[derive(Clone)]
struct SimClock(Rc<Cell<i64>>);

impl SimClock {
    fn starting_at(epoch_secs: i64) -> Self {
        Self(Rc::new(Cell::new(epoch_secs)))
    }

    fn advance(&self, secs: i64) {
        self.0.set(self.0.get() + secs);
    }
}

impl Clock for SimClock {
    fn now(&self) -> LocalTime {
        let epoch_secs = self.0.get();
        let civil = DateTime::from_timestamp(epoch_secs, 0)
            .expect("simulated epoch in range")
            .naive_utc();
        LocalTime {
            epoch_secs,
            hour: civil.hour() as u8,
            minute: civil.minute() as u8,
            second: civil.second() as u8,
            day: civil.day() as u8,
            month: civil.month() as u8,
        }
    }
}

/// Connectivity flags, set each tick by the scenario script.
#[derive(Clone, Default)]
struct SimLink(Rc<Cell<(bool, bool, bool)>>);

impl SimLink {
    fn set(&self, time_valid: bool, connected: bool, broker: bool) {
        self.0.set((time_valid, connected, broker));
    }
}

impl helio_core::link::Connectivity for SimLink {
    fn is_time_valid(&self) -> bool {
        self.0.get().0
    }

    fn is_connected(&self) -> bool {
        self.0.get().1
    }

    fn is_broker_active(&self) -> bool {
        self.0.get().2
    }
}

/// Storage collaborator over a plain directory.
struct DirStorage {
    root: PathBuf,
}

impl DirStorage {
    fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl Storage for DirStorage {
    fn mount(&mut self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root).map_err(|e| StorageError::mount(&e))
    }

    fn read_file(&mut self, path: &str) -> Result<RecordText, StorageError> {
        match fs::read_to_string(self.full_path(path)) {
            Ok(contents) => {
                let mut text = RecordText::new();
                for ch in contents.chars() {
                    if text.push(ch).is_err() {
                        break;
                    }
                }
                Ok(text)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(RecordText::new()),
            Err(e) => Err(StorageError::read(&e)),
        }
    }

    fn write_file(&mut self, path: &str, contents: &str) -> Result<(), StorageError> {
        fs::write(self.full_path(path), contents).map_err(|e| StorageError::write(&e))
    }

    fn delete_file(&mut self, path: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.full_path(path)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::delete(&e)),
        }
    }
}

/// Dashboard that renders to the log instead of a panel.
#[derive(Default)]
struct ConsoleDashboard {
    hour_values: [[f32; HOURS_PER_DAY]; Quantity::COUNT],
    totals: DailyTotals,
}

impl Dashboard for ConsoleDashboard {
    fn set_hour_value(&mut self, quantity: Quantity, hour: u8, energy_wh: f32) {
        self.hour_values[quantity.index()][usize::from(hour)] = energy_wh;
    }

    fn set_daily_totals(&mut self, totals: &DailyTotals) {
        self.totals = *totals;
    }

    fn set_alert(&mut self, alert: AlertState) {
        match alert {
            AlertState::Live => info!("[dashboard] live view"),
            AlertState::NoBroker => info!("[dashboard] ALERT: no broker"),
            AlertState::Offline => info!("[dashboard] ALERT: disconnected"),
        }
    }

    fn set_status_text(&mut self, text: &str) {
        info!("[dashboard] status: {text}");
    }

    fn show_readings(&mut self, _readings: &InverterReadings, balance: &PowerBalance) {
        debug!("[dashboard] {balance}");
    }

    fn clear_history(&mut self) {
        info!("[dashboard] chart cleared");
        self.hour_values = Default::default();
    }
}

impl ConsoleDashboard {
    /// Render the day chart: one row per quantity, one column per hour,
    /// scaled to the busiest bucket.
    fn print_chart(&self) {
        const GLYPHS: [char; 5] = [' ', '.', ':', '|', '#'];
        for quantity in Quantity::ALL {
            let row = &self.hour_values[quantity.index()];
            let peak = row.iter().cloned().fold(1.0f32, f32::max);
            let bars: String = row
                .iter()
                .map(|wh| {
                    let level = (wh / peak * (GLYPHS.len() - 1) as f32).round() as usize;
                    GLYPHS[level.min(GLYPHS.len() - 1)]
                })
                .collect();
            info!(
                "{:<13} |{bars}| {:8.1} Wh",
                quantity.label(),
                self.totals.of(quantity)
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Synthetic telemetry
// ---------------------------------------------------------------------------

/// Generates plausible inverter reports: a daylight bell for the array, a
/// household load with morning and evening shoulders, deterministic jitter.
struct SunSim;

impl SunSim {
    fn reading_at(&self, now: &LocalTime) -> InverterReadings {
        let hour = f32::from(now.hour) + f32::from(now.minute) / 60.0;

        // Daylight between roughly 05:30 and 20:30, peaking past noon.
        let daylight = ((hour - 5.5) / 15.0 * core::f32::consts::PI).sin();
        let pv = if daylight > 0.0 {
            PEAK_PV_W * daylight * daylight
        } else {
            0.0
        };

        let load = 280.0
            + 450.0 * gauss(hour, 7.5, 1.2)
            + 900.0 * gauss(hour, 19.5, 1.8)
            + 60.0 * (now.epoch_secs as f32 / 47.0).sin();

        let pv = pv.max(0.0) as i32;
        let load = load.max(0.0) as i32;

        InverterReadings {
            pv1_power: pv * 3 / 5,
            pv2_power: pv - pv * 3 / 5,
            grid_power_r: pv / 3,
            grid_power_s: pv / 3,
            grid_power_t: pv - 2 * (pv / 3),
            feed_in_power: pv - load,
            battery_power: 0,
            battery_capacity: (55.0 + 35.0 * daylight.max(0.0)) as u8,
            battery_temperature: 24,
            inverter_temperature: (31 + pv / 400) as i16,
            grid_online: true,
        }
    }
}

fn gauss(x: f32, mu: f32, sigma: f32) -> f32 {
    (-((x - mu) * (x - mu)) / (2.0 * sigma * sigma)).exp()
}

// ---------------------------------------------------------------------------
// Scenario script
// ---------------------------------------------------------------------------

/// Connectivity over the simulated timeline.
fn scripted_links(elapsed_secs: i64, now: &LocalTime) -> (bool, bool, bool) {
    let time_valid = elapsed_secs >= TIME_SYNC_AFTER_SECS;

    // A short network outage in the night of day two.
    let connected = !(now.day == 22 && now.hour == 3 && now.minute < 2);

    // The broker drops for a few minutes in the afternoon of day one.
    let broker = connected && !(now.day == 21 && now.hour == 15 && now.minute < 3);

    (time_valid, connected, broker)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let sim_hours: i64 = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(DEFAULT_SIM_HOURS);

    info!("starting helio-rs simulator: {sim_hours} simulated hours, storage in ./sdcard");

    let start = NaiveDate::from_ymd_opt(2025, 6, 21)
        .unwrap()
        .and_hms_opt(11, 55, 0)
        .unwrap()
        .and_utc()
        .timestamp();

    let clock = SimClock::starting_at(start);
    let link = SimLink::default();
    let storage = DirStorage::new("./sdcard");
    let dashboard: SharedDashboard<ConsoleDashboard> =
        SharedDashboard::new(RefCell::new(ConsoleDashboard::default()));
    let inverter = SunSim;

    let mut monitor = MonitorTask::new(
        clock.clone(),
        link.clone(),
        storage,
        &dashboard,
        status_receiver(),
        readings_receiver(),
    );

    let mut time_was_valid = false;

    // -----------------------------------------------------------------------
    // Main loop: one iteration per simulated second
    // -----------------------------------------------------------------------
    for elapsed in 0..sim_hours * 3600 {
        clock.advance(1);
        let now = clock.now();

        let (time_valid, connected, broker) = scripted_links(elapsed, &now);
        link.set(time_valid, connected, broker);
        if time_valid && !time_was_valid {
            time_was_valid = true;
            post_status("time synchronized");
        }

        if elapsed % READING_INTERVAL_SECS == 0 {
            post_readings(inverter.reading_at(&now));
        }

        monitor.tick();

        // Hourly progress line.
        if now.minute == 0 && now.second == 0 {
            let totals = dashboard.lock(|cell| cell.borrow().totals);
            info!(
                "{:02}.{:02}. {:02}:00  consumption {:7.1} Wh  photovoltaic {:7.1} Wh  free {:7.1} Wh",
                now.day,
                now.month,
                now.hour,
                totals.of(Quantity::Consumption),
                totals.of(Quantity::Photovoltaic),
                totals.of(Quantity::FreeEnergy),
            );
        }
    }

    info!("simulation finished, final chart:");
    dashboard.lock(|cell| cell.borrow().print_chart());
    info!("day records remaining in ./sdcard are restored by the next run");
}
