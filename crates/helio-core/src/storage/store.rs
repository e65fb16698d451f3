//! Execution of persistence decisions against the storage collaborator.
//!
//! Every storage and codec failure is absorbed here with a log line. Callers
//! get best-effort results: a failed load is an empty day, a failed write is
//! retried at the next eligible minute. Nothing in this module can take the
//! monitor task down.

use log::{info, warn};

use crate::clock::LocalTime;
use crate::energy::{EnergyAccumulator, HOURS_PER_DAY, snapshot};
use crate::readings::Quantity;

use super::{Storage, record_path};

/// The persistence half of the monitor: owns the storage collaborator and
/// translates scheduler actions into record I/O.
pub struct EnergyStore<S> {
    storage: S,
    mounted: bool,
}

impl<S: Storage> EnergyStore<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            mounted: false,
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Mount lazily, once it succeeds stay mounted. An unmountable medium is
    /// a degradation, not a fault; the next operation tries again.
    fn ensure_mounted(&mut self) -> bool {
        if self.mounted {
            return true;
        }
        match self.storage.mount() {
            Ok(()) => {
                info!("storage mounted");
                self.mounted = true;
                true
            }
            Err(e) => {
                warn!("storage unavailable: {e}");
                false
            }
        }
    }

    /// Load one quantity's record for the given day.
    ///
    /// `None` only when the medium is unavailable or unreadable. A missing or
    /// damaged record is not an error; it decodes to whatever could be
    /// salvaged, down to an all-zero day.
    pub fn load(&mut self, quantity: Quantity, now: &LocalTime) -> Option<[f32; HOURS_PER_DAY]> {
        if !self.ensure_mounted() {
            return None;
        }
        let path = record_path(now.day, now.month, quantity);
        match self.storage.read_file(&path) {
            Ok(text) => Some(snapshot::decode(&text)),
            Err(e) => {
                warn!("load of {path} failed: {e}");
                None
            }
        }
    }

    /// Checkpoint one accumulator. Returns whether the write landed.
    pub fn save(
        &mut self,
        quantity: Quantity,
        accumulator: &EnergyAccumulator,
        now: &LocalTime,
    ) -> bool {
        if !self.ensure_mounted() {
            return false;
        }
        let path = record_path(now.day, now.month, quantity);
        let Ok(text) = snapshot::encode(accumulator.buckets()) else {
            warn!("snapshot of {} overflowed the record buffer", quantity.label());
            return false;
        };
        match self.storage.write_file(&path, &text) {
            Ok(()) => true,
            Err(e) => {
                warn!("checkpoint of {path} failed: {e}");
                false
            }
        }
    }

    /// Drop one quantity's record for the day that just ended.
    pub fn delete(&mut self, quantity: Quantity, day: u8, month: u8) {
        if !self.ensure_mounted() {
            return;
        }
        let path = record_path(day, month, quantity);
        if let Err(e) = self.storage.delete_file(&path) {
            warn!("delete of {path} failed: {e}");
        }
    }
}
