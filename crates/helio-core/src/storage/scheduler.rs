//! Checkpoint and rollover scheduling.
//!
//! A pure state machine, polled once per monitor tick. It decides *when*
//! persistence work is due from the wall clock and its validity flag alone;
//! it performs no I/O, so the cadence guarantees can be tested over simulated
//! days in milliseconds.
//!
//! No decision is made before the clock has synchronized: samples and
//! calendar math against an unsynchronized clock would corrupt the hourly
//! history on disk.

use log::info;

use crate::clock::LocalTime;

/// Minutes between checkpoints. Together with the minute de-duplication this
/// bounds the write frequency regardless of the tick rate, which is what
/// keeps the flash wear in check.
const CHECKPOINT_INTERVAL_MIN: u8 = 5;

/// Where the scheduler is in its boot sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    /// The wall clock cannot be trusted yet.
    AwaitingTimeSync,
    /// Time is valid; the one-shot restore of durable records is still due.
    AwaitingInitialLoad,
    /// Steady state: checkpoints and the midnight rollover.
    Normal,
}

/// What the poll decided for this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistAction {
    /// Nothing due.
    Idle,
    /// Valid time just arrived: load every tracked quantity's record once and
    /// replay it into the dashboard.
    InitialLoad,
    /// Write every tracked quantity's record.
    Checkpoint,
    /// Midnight: reset the accumulators and drop the ended day's records.
    Rollover,
}

pub struct PersistenceScheduler {
    phase: SchedulerPhase,
    /// Minute that already produced a checkpoint or rollover, so a minute-long
    /// window of eligible ticks triggers exactly once.
    last_processed_minute: Option<u8>,
}

impl PersistenceScheduler {
    pub const fn new() -> Self {
        Self {
            phase: SchedulerPhase::AwaitingTimeSync,
            last_processed_minute: None,
        }
    }

    pub const fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    /// Samples may only be accumulated in the steady state.
    pub const fn is_normal(&self) -> bool {
        matches!(self.phase, SchedulerPhase::Normal)
    }

    /// Advance the machine by one tick. At most one transition or action per
    /// poll: the restore fires on the poll after the time gate opens.
    ///
    /// `time_valid` is monotonic once true for a given boot; the machine
    /// never walks backward.
    pub fn poll(&mut self, time_valid: bool, now: &LocalTime) -> PersistAction {
        match self.phase {
            SchedulerPhase::AwaitingTimeSync => {
                if time_valid {
                    info!("wall clock is valid, restore pending");
                    self.phase = SchedulerPhase::AwaitingInitialLoad;
                }
                PersistAction::Idle
            }
            SchedulerPhase::AwaitingInitialLoad => {
                self.phase = SchedulerPhase::Normal;
                PersistAction::InitialLoad
            }
            SchedulerPhase::Normal => {
                if now.hour == 0 && now.minute == 0 {
                    if self.claim_minute(now.minute) {
                        return PersistAction::Rollover;
                    }
                } else if now.minute % CHECKPOINT_INTERVAL_MIN == 0 && self.claim_minute(now.minute)
                {
                    return PersistAction::Checkpoint;
                }
                PersistAction::Idle
            }
        }
    }

    fn claim_minute(&mut self, minute: u8) -> bool {
        if self.last_processed_minute == Some(minute) {
            return false;
        }
        self.last_processed_minute = Some(minute);
        true
    }
}

impl Default for PersistenceScheduler {
    fn default() -> Self {
        Self::new()
    }
}
