//! The monitor task: a single polling loop that turns queued inverter
//! telemetry into hourly energy history and keeps that history durable.
//!
//! One tick, nominally every second:
//! 1. drain queued status text to the dashboard
//! 2. take the freshest queued readings report, if any
//! 3. derive the power balance, show it live, and integrate it once the
//!    clock is trusted
//! 4. drive the persistence scheduler (restore, checkpoints, rollover)
//! 5. switch the dashboard alert on connectivity edges
//!
//! The task is the sole writer of the accumulators and its own bookkeeping,
//! so none of that state needs locking. Collaborators are handed in at
//! construction; the task reaches no global but the queues it was given.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Receiver;
use embassy_time::{Duration, Timer};
use log::{debug, info};

use crate::app_state::{READINGS_QUEUE_DEPTH, STATUS_QUEUE_DEPTH, StatusMessage};
use crate::clock::{Clock, LocalTime};
use crate::dashboard::{DailyTotals, Dashboard, SharedDashboard};
use crate::energy::EnergyAccumulator;
use crate::link::{Connectivity, LinkEdges};
use crate::readings::{InverterReadings, PowerBalance, Quantity};
use crate::storage::Storage;
use crate::storage::scheduler::{PersistAction, PersistenceScheduler};
use crate::storage::store::EnergyStore;

pub type StatusReceiver<'a> =
    Receiver<'a, CriticalSectionRawMutex, StatusMessage, STATUS_QUEUE_DEPTH>;
pub type ReadingsReceiver<'a> =
    Receiver<'a, CriticalSectionRawMutex, InverterReadings, READINGS_QUEUE_DEPTH>;

pub struct MonitorTask<'a, C, K, S, D>
where
    C: Connectivity,
    K: Clock,
    S: Storage,
    D: Dashboard,
{
    clock: K,
    link: C,
    store: EnergyStore<S>,
    dashboard: &'a SharedDashboard<D>,
    status_rx: StatusReceiver<'a>,
    readings_rx: ReadingsReceiver<'a>,
    scheduler: PersistenceScheduler,
    accumulators: [EnergyAccumulator; Quantity::COUNT],
    edges: LinkEdges,
    /// Calendar date seen on the previous tick. At midnight this is the day
    /// whose records the rollover must delete.
    previous_date: Option<(u8, u8)>,
}

impl<'a, C, K, S, D> MonitorTask<'a, C, K, S, D>
where
    C: Connectivity,
    K: Clock,
    S: Storage,
    D: Dashboard,
{
    pub fn new(
        clock: K,
        link: C,
        storage: S,
        dashboard: &'a SharedDashboard<D>,
        status_rx: StatusReceiver<'a>,
        readings_rx: ReadingsReceiver<'a>,
    ) -> Self {
        let edges = LinkEdges::new(link.is_connected());
        Self {
            clock,
            link,
            store: EnergyStore::new(storage),
            dashboard,
            status_rx,
            readings_rx,
            scheduler: PersistenceScheduler::new(),
            accumulators: [const { EnergyAccumulator::new() }; Quantity::COUNT],
            edges,
            previous_date: None,
        }
    }

    /// Run forever at the nominal cadence. The sleep is the task's only
    /// suspension point; everything inside a tick is synchronous.
    pub async fn run(&mut self) -> ! {
        info!("monitor task started");
        loop {
            Timer::after(Duration::from_secs(1)).await;
            self.tick();
        }
    }

    /// One pass of the polling loop. Public so hosts without an executor
    /// (the simulator, the tests) can drive the task directly.
    pub fn tick(&mut self) {
        let now = self.clock.now();

        self.forward_status();
        if let Some(readings) = self.freshest_reading() {
            self.apply_readings(&readings, &now);
        }
        self.drive_persistence(&now);
        self.watch_links();

        self.previous_date = Some((now.day, now.month));
    }

    /// Read access to one quantity's accumulated day.
    pub fn accumulator(&self, quantity: Quantity) -> &EnergyAccumulator {
        &self.accumulators[quantity.index()]
    }

    fn with_dashboard<R>(&self, f: impl FnOnce(&mut D) -> R) -> R {
        self.dashboard.lock(|cell| f(&mut cell.borrow_mut()))
    }

    fn forward_status(&mut self) {
        while let Ok(message) = self.status_rx.try_receive() {
            self.with_dashboard(|dashboard| dashboard.set_status_text(&message));
        }
    }

    /// The readings queue is a freshness buffer: when several reports piled
    /// up between ticks only the newest matters.
    fn freshest_reading(&mut self) -> Option<InverterReadings> {
        let mut latest = None;
        while let Ok(readings) = self.readings_rx.try_receive() {
            latest = Some(readings);
        }
        latest
    }

    fn apply_readings(&mut self, readings: &InverterReadings, now: &LocalTime) {
        let balance = PowerBalance::from_readings(readings);
        debug!("readings: {readings} -> {balance}");
        self.with_dashboard(|dashboard| dashboard.show_readings(readings, &balance));

        // Samples taken against an unsynchronized clock would land in the
        // wrong bucket; they are shown live but never integrated.
        if !self.scheduler.is_normal() {
            return;
        }

        let hour = now.hour;
        let mut totals = DailyTotals::new();
        let mut hour_values = [0.0f32; Quantity::COUNT];
        for quantity in Quantity::ALL {
            let accumulator = &mut self.accumulators[quantity.index()];
            accumulator.update(balance.power_of(quantity), now);
            hour_values[quantity.index()] = accumulator.energy_for_hour(usize::from(hour));
            totals.set(quantity, accumulator.daily_total());
        }

        self.with_dashboard(|dashboard| {
            for quantity in Quantity::ALL {
                dashboard.set_hour_value(quantity, hour, hour_values[quantity.index()]);
            }
            dashboard.set_daily_totals(&totals);
        });
    }

    fn drive_persistence(&mut self, now: &LocalTime) {
        match self.scheduler.poll(self.link.is_time_valid(), now) {
            PersistAction::Idle => {}
            PersistAction::InitialLoad => self.restore_history(now),
            PersistAction::Checkpoint => self.checkpoint(now),
            PersistAction::Rollover => self.rollover(now),
        }
    }

    /// One-shot after time sync: pull today's records back in and replay the
    /// whole chart. With the medium unavailable the accumulators simply
    /// continue from their empty state.
    fn restore_history(&mut self, now: &LocalTime) {
        info!("restoring today's history");
        let mut totals = DailyTotals::new();
        for quantity in Quantity::ALL {
            if let Some(buckets) = self.store.load(quantity, now) {
                self.accumulators[quantity.index()].load_buckets(&buckets);
            }
            totals.set(quantity, self.accumulators[quantity.index()].daily_total());
        }

        let accumulators = &self.accumulators;
        self.dashboard.lock(|cell| {
            let mut dashboard = cell.borrow_mut();
            for quantity in Quantity::ALL {
                for (hour, energy_wh) in accumulators[quantity.index()].hours() {
                    dashboard.set_hour_value(quantity, hour as u8, energy_wh);
                }
            }
            dashboard.set_daily_totals(&totals);
        });
    }

    fn checkpoint(&mut self, now: &LocalTime) {
        debug!("checkpoint at {:02}:{:02}", now.hour, now.minute);
        for quantity in Quantity::ALL {
            self.store
                .save(quantity, &self.accumulators[quantity.index()], now);
        }
    }

    /// Midnight: a fresh day of buckets, the ended day's records dropped, the
    /// chart cleared. The integration baselines survive so the first sample
    /// of the new day integrates normally.
    fn rollover(&mut self, now: &LocalTime) {
        let (day, month) = self.previous_date.unwrap_or((now.day, now.month));
        info!("day rollover, dropping records of {day:02}.{month:02}.");
        for quantity in Quantity::ALL {
            self.accumulators[quantity.index()].reset();
            self.store.delete(quantity, day, month);
        }
        self.with_dashboard(|dashboard| {
            dashboard.clear_history();
            dashboard.set_daily_totals(&DailyTotals::new());
        });
    }

    fn watch_links(&mut self) {
        let connected = self.link.is_connected();
        let broker = self.link.is_broker_active();
        if let Some(alert) = self.edges.observe(connected, broker) {
            info!("connectivity changed: network {connected}, broker {broker}");
            self.with_dashboard(|dashboard| dashboard.set_alert(alert));
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use alloc::collections::BTreeMap;
    use alloc::string::{String, ToString};
    use alloc::vec::Vec;
    use core::cell::{Cell, RefCell};
    use std::rc::Rc;

    use embassy_sync::channel::Channel;

    use crate::dashboard::AlertState;
    use crate::energy::{HOURS_PER_DAY, snapshot};
    use crate::storage::{RecordText, StorageError, record_path};

    use super::*;

    const EPSILON: f32 = 1e-3;

    // -- collaborator doubles ------------------------------------------------

    #[derive(Clone)]
    struct TestClock(Rc<Cell<LocalTime>>);

    impl TestClock {
        fn starting_at(time: LocalTime) -> Self {
            Self(Rc::new(Cell::new(time)))
        }

        fn set(&self, time: LocalTime) {
            self.0.set(time);
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> LocalTime {
            self.0.get()
        }
    }

    #[derive(Clone, Default)]
    struct TestLink(Rc<Cell<(bool, bool, bool)>>);

    impl TestLink {
        fn set(&self, time_valid: bool, connected: bool, broker: bool) {
            self.0.set((time_valid, connected, broker));
        }
    }

    impl Connectivity for TestLink {
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

    #[derive(Default)]
    struct TestStorageState {
        files: BTreeMap<String, String>,
        fail_writes: bool,
        writes: u32,
        deletes: Vec<String>,
    }

    #[derive(Clone, Default)]
    struct TestStorage(Rc<RefCell<TestStorageState>>);

    impl Storage for TestStorage {
        fn mount(&mut self) -> Result<(), StorageError> {
            Ok(())
        }

        fn read_file(&mut self, path: &str) -> Result<RecordText, StorageError> {
            let state = self.0.borrow();
            let mut text = RecordText::new();
            if let Some(contents) = state.files.get(path) {
                for ch in contents.chars() {
                    if text.push(ch).is_err() {
                        break;
                    }
                }
            }
            Ok(text)
        }

        fn write_file(&mut self, path: &str, contents: &str) -> Result<(), StorageError> {
            let mut state = self.0.borrow_mut();
            state.writes += 1;
            if state.fail_writes {
                return Err(StorageError::write(&"io"));
            }
            state.files.insert(path.to_string(), contents.to_string());
            Ok(())
        }

        fn delete_file(&mut self, path: &str) -> Result<(), StorageError> {
            let mut state = self.0.borrow_mut();
            state.deletes.push(path.to_string());
            state.files.remove(path);
            Ok(())
        }
    }

    #[derive(Default)]
    struct TestDashboard {
        hour_values: [[f32; HOURS_PER_DAY]; Quantity::COUNT],
        hour_updates: u32,
        totals: DailyTotals,
        totals_updates: u32,
        alerts: Vec<AlertState>,
        statuses: Vec<String>,
        live_updates: u32,
        history_cleared: u32,
    }

    impl Dashboard for TestDashboard {
        fn set_hour_value(&mut self, quantity: Quantity, hour: u8, energy_wh: f32) {
            self.hour_values[quantity.index()][usize::from(hour)] = energy_wh;
            self.hour_updates += 1;
        }

        fn set_daily_totals(&mut self, totals: &DailyTotals) {
            self.totals = *totals;
            self.totals_updates += 1;
        }

        fn set_alert(&mut self, alert: AlertState) {
            self.alerts.push(alert);
        }

        fn set_status_text(&mut self, text: &str) {
            self.statuses.push(text.to_string());
        }

        fn show_readings(&mut self, _readings: &InverterReadings, _balance: &PowerBalance) {
            self.live_updates += 1;
        }

        fn clear_history(&mut self) {
            self.history_cleared += 1;
        }
    }

    // -- harness -------------------------------------------------------------

    fn at(hour: u8, minute: u8, second: u8) -> LocalTime {
        at_on(21, 6, hour, minute, second)
    }

    fn at_on(day: u8, month: u8, hour: u8, minute: u8, second: u8) -> LocalTime {
        let day_base = i64::from(day) * 86_400;
        LocalTime {
            epoch_secs: day_base
                + i64::from(hour) * 3600
                + i64::from(minute) * 60
                + i64::from(second),
            hour,
            minute,
            second,
            day,
            month,
        }
    }

    fn flat_readings(pv: i32, load: i32) -> InverterReadings {
        // Phases carry the full yield; the surplus goes out as feed-in.
        InverterReadings {
            pv1_power: pv / 2,
            pv2_power: pv - pv / 2,
            grid_power_r: pv / 3,
            grid_power_s: pv / 3,
            grid_power_t: pv - 2 * (pv / 3),
            feed_in_power: pv - load,
            ..Default::default()
        }
    }

    struct Harness {
        clock: TestClock,
        link: TestLink,
        storage: TestStorage,
        dashboard: Rc<SharedDashboard<TestDashboard>>,
        status: Rc<Channel<CriticalSectionRawMutex, StatusMessage, STATUS_QUEUE_DEPTH>>,
        readings: Rc<Channel<CriticalSectionRawMutex, InverterReadings, READINGS_QUEUE_DEPTH>>,
    }

    impl Harness {
        fn new(start: LocalTime) -> Self {
            Self {
                clock: TestClock::starting_at(start),
                link: TestLink::default(),
                storage: TestStorage::default(),
                dashboard: Rc::new(SharedDashboard::new(RefCell::new(TestDashboard::default()))),
                status: Rc::new(Channel::new()),
                readings: Rc::new(Channel::new()),
            }
        }

        fn task(&self) -> MonitorTask<'_, TestLink, TestClock, TestStorage, TestDashboard> {
            MonitorTask::new(
                self.clock.clone(),
                self.link.clone(),
                self.storage.clone(),
                &self.dashboard,
                self.status.receiver(),
                self.readings.receiver(),
            )
        }

        fn dashboard<R>(&self, f: impl FnOnce(&TestDashboard) -> R) -> R {
            self.dashboard.lock(|cell| f(&cell.borrow()))
        }

        /// Tick through the scheduler's two boot transitions into `Normal`.
        fn reach_normal(
            &self,
            task: &mut MonitorTask<'_, TestLink, TestClock, TestStorage, TestDashboard>,
        ) {
            self.link.set(true, true, true);
            task.tick();
            task.tick();
        }
    }

    // -- tests ---------------------------------------------------------------

    #[test]
    fn test_no_accumulation_before_time_sync() {
        let harness = Harness::new(at(10, 0, 0));
        let mut task = harness.task();
        harness.link.set(false, true, true);

        harness.readings.try_send(flat_readings(2000, 500)).unwrap();
        task.tick();
        harness.clock.set(at(10, 0, 30));
        harness.readings.try_send(flat_readings(2000, 500)).unwrap();
        task.tick();

        // Live view updated both times, but nothing was integrated.
        harness.dashboard(|d| {
            assert_eq!(d.live_updates, 2);
            assert_eq!(d.hour_updates, 0);
        });
        assert_eq!(task.accumulator(Quantity::Photovoltaic).daily_total(), 0.0);
    }

    #[test]
    fn test_accumulation_and_chart_updates_when_normal() {
        let harness = Harness::new(at(10, 0, 0));
        let mut task = harness.task();
        harness.reach_normal(&mut task);

        harness.readings.try_send(flat_readings(2000, 500)).unwrap();
        task.tick();
        harness.clock.set(at(10, 30, 0));
        harness.readings.try_send(flat_readings(2000, 500)).unwrap();
        task.tick();

        // 2000 W for half an hour.
        let pv = task.accumulator(Quantity::Photovoltaic).energy_for_hour(10);
        assert!((pv - 1000.0).abs() < EPSILON);
        harness.dashboard(|d| {
            assert!((d.hour_values[Quantity::Photovoltaic.index()][10] - pv).abs() < EPSILON);
            assert!((d.totals.of(Quantity::Photovoltaic) - pv).abs() < EPSILON);
            assert!(d.totals.of(Quantity::Consumption) > 0.0);
        });
    }

    #[test]
    fn test_only_the_freshest_reading_counts() {
        let harness = Harness::new(at(9, 0, 0));
        let mut task = harness.task();
        harness.reach_normal(&mut task);

        harness.readings.try_send(flat_readings(1000, 500)).unwrap();
        task.tick();

        // Three reports pile up; only the last one (zero yield) is consulted.
        harness.clock.set(at(9, 30, 0));
        harness.readings.try_send(flat_readings(9000, 500)).unwrap();
        harness.readings.try_send(flat_readings(5000, 500)).unwrap();
        harness.readings.try_send(flat_readings(0, 500)).unwrap();
        task.tick();

        // Trapezoid of 1000 W and 0 W over half an hour is 250 Wh; had the
        // 9 kW report been integrated this would be far larger.
        let pv = task.accumulator(Quantity::Photovoltaic).energy_for_hour(9);
        assert!((pv - 250.0).abs() < EPSILON);
    }

    #[test]
    fn test_initial_load_replays_whole_chart() {
        let harness = Harness::new(at(14, 2, 0));

        // Yesterday's session left a consumption record for today.
        let mut buckets = [0.0f32; HOURS_PER_DAY];
        buckets[8] = 120.5;
        buckets[9] = 340.25;
        let text = snapshot::encode(&buckets).unwrap();
        harness.storage.0.borrow_mut().files.insert(
            record_path(21, 6, Quantity::Consumption).as_str().to_string(),
            text.as_str().to_string(),
        );

        let mut task = harness.task();
        harness.reach_normal(&mut task);

        let restored = task.accumulator(Quantity::Consumption);
        assert!((restored.energy_for_hour(8) - 120.5).abs() < EPSILON);
        assert!((restored.energy_for_hour(9) - 340.25).abs() < EPSILON);

        harness.dashboard(|d| {
            // All 24 hours of all quantities were replayed.
            assert_eq!(d.hour_updates as usize, HOURS_PER_DAY * Quantity::COUNT);
            assert!((d.hour_values[Quantity::Consumption.index()][9] - 340.25).abs() < EPSILON);
            assert!((d.totals.of(Quantity::Consumption) - 460.75).abs() < EPSILON);
        });
    }

    #[test]
    fn test_checkpoint_writes_once_per_eligible_minute() {
        let harness = Harness::new(at(11, 1, 0));
        let mut task = harness.task();
        harness.reach_normal(&mut task);

        harness.clock.set(at(11, 5, 0));
        task.tick();
        assert_eq!(harness.storage.0.borrow().writes, Quantity::COUNT as u32);

        // More ticks inside the same minute change nothing.
        harness.clock.set(at(11, 5, 30));
        task.tick();
        assert_eq!(harness.storage.0.borrow().writes, Quantity::COUNT as u32);

        harness.clock.set(at(11, 10, 0));
        task.tick();
        assert_eq!(harness.storage.0.borrow().writes, 2 * Quantity::COUNT as u32);
    }

    #[test]
    fn test_failed_checkpoint_is_retried_next_eligible_minute() {
        let harness = Harness::new(at(11, 4, 0));
        let mut task = harness.task();
        harness.reach_normal(&mut task);
        harness.storage.0.borrow_mut().fail_writes = true;

        harness.clock.set(at(11, 5, 0));
        task.tick();
        assert!(harness.storage.0.borrow().files.is_empty());

        harness.storage.0.borrow_mut().fail_writes = false;
        harness.clock.set(at(11, 10, 0));
        task.tick();
        assert_eq!(
            harness.storage.0.borrow().files.len(),
            Quantity::COUNT
        );
    }

    #[test]
    fn test_rollover_resets_deletes_and_clears() {
        let harness = Harness::new(at_on(21, 6, 23, 57, 0));
        let mut task = harness.task();
        harness.reach_normal(&mut task);

        harness.readings.try_send(flat_readings(1200, 400)).unwrap();
        task.tick();
        harness.clock.set(at_on(21, 6, 23, 58, 0));
        harness.readings.try_send(flat_readings(1200, 400)).unwrap();
        task.tick();
        assert!(task.accumulator(Quantity::Consumption).daily_total() > 0.0);

        // Midnight. The date has already advanced; the records to drop are
        // the ones of the day that just ended.
        harness.clock.set(at_on(22, 6, 0, 0, 0));
        task.tick();

        for quantity in Quantity::ALL {
            assert_eq!(task.accumulator(quantity).daily_total(), 0.0);
        }
        let deletes = harness.storage.0.borrow().deletes.clone();
        assert_eq!(deletes.len(), Quantity::COUNT);
        assert!(deletes.iter().all(|path| path.starts_with("/2106")));
        harness.dashboard(|d| assert_eq!(d.history_cleared, 1));

        // A second tick in the same minute must not repeat any of it.
        harness.clock.set(at_on(22, 6, 0, 0, 1));
        task.tick();
        assert_eq!(harness.storage.0.borrow().deletes.len(), Quantity::COUNT);
        harness.dashboard(|d| assert_eq!(d.history_cleared, 1));
    }

    #[test]
    fn test_alert_edges_fire_once_per_transition() {
        let harness = Harness::new(at(12, 0, 0));
        let mut task = harness.task();
        harness.link.set(true, true, true);
        task.tick(); // broker seeds pessimistic, so this is the Live edge
        task.tick();

        harness.link.set(true, true, false);
        task.tick();
        task.tick();

        harness.link.set(true, false, false);
        task.tick();

        harness.link.set(true, true, true);
        task.tick();

        harness.dashboard(|d| {
            assert_eq!(
                d.alerts,
                [
                    AlertState::Live,
                    AlertState::NoBroker,
                    AlertState::Offline,
                    AlertState::Live
                ]
            );
        });
    }

    #[test]
    fn test_status_messages_reach_the_dashboard() {
        let harness = Harness::new(at(12, 0, 0));
        let mut task = harness.task();

        let mut message = StatusMessage::new();
        message.push_str("time synchronized").unwrap();
        harness.status.try_send(message).unwrap();
        task.tick();

        harness.dashboard(|d| assert_eq!(d.statuses, ["time synchronized"]));
    }
}
