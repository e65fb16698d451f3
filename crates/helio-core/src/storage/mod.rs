//! Durable storage contract and day-record naming.
//!
//! The monitoring core never talks to a block device directly; it goes
//! through the [`Storage`] trait, implemented over `embedded-sdmmc` for real
//! hardware ([`sd_card`]) and over `std::fs` in the simulator. Every failure
//! behind this trait is recoverable: the worst outcome is the loss of the
//! current day's chart.

pub mod scheduler;
pub mod sd_card;
pub mod store;

use core::fmt::{Debug, Write};

use heapless::String;
use thiserror_no_std::Error;

use crate::readings::Quantity;

/// Longest record path: `/` + `DDMM` + the two-character quantity suffix.
pub const RECORD_PATH_MAX: usize = 12;

/// Capacity of one record's contents. Sized for a full day snapshot with
/// plenty of slack for hand-edited files.
pub const RECORD_TEXT_MAX: usize = 1280;

pub type RecordPath = String<RECORD_PATH_MAX>;
pub type RecordText = String<RECORD_TEXT_MAX>;

/// The durable storage collaborator.
///
/// Implementations are synchronous and may block briefly; the monitor task
/// calls them only from within a tick.
pub trait Storage {
    /// Bring the medium up. Safe to call again after a failure.
    fn mount(&mut self) -> Result<(), StorageError>;

    /// Read a whole file. A missing file is NOT an error and yields empty
    /// content; content beyond [`RECORD_TEXT_MAX`] is truncated.
    fn read_file(&mut self, path: &str) -> Result<RecordText, StorageError>;

    /// Create or overwrite a file with the given contents.
    fn write_file(&mut self, path: &str, contents: &str) -> Result<(), StorageError>;

    /// Delete a file. Deleting a file that does not exist is not an error.
    fn delete_file(&mut self, path: &str) -> Result<(), StorageError>;
}

/// What went wrong behind the [`Storage`] trait. All variants are
/// recoverable; the persistence layer logs them and moves on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("mount failed: {0}")]
    Mount(String<64>),
    #[error("read failed: {0}")]
    Read(String<64>),
    #[error("write failed: {0}")]
    Write(String<64>),
    #[error("delete failed: {0}")]
    Delete(String<64>),
}

impl StorageError {
    pub fn mount<E: Debug>(cause: &E) -> Self {
        Self::Mount(describe(cause))
    }

    pub fn read<E: Debug>(cause: &E) -> Self {
        Self::Read(describe(cause))
    }

    pub fn write<E: Debug>(cause: &E) -> Self {
        Self::Write(describe(cause))
    }

    pub fn delete<E: Debug>(cause: &E) -> Self {
        Self::Delete(describe(cause))
    }
}

/// Best-effort bounded rendering of an underlying error.
fn describe<E: Debug>(cause: &E) -> String<64> {
    let mut text = String::new();
    let _ = write!(text, "{cause:?}");
    text
}

/// Durable record path for one quantity on one calendar day: `/DDMM` plus
/// the quantity suffix, always in the storage root. Exactly one record per
/// quantity and day is live at a time.
pub fn record_path(day: u8, month: u8, quantity: Quantity) -> RecordPath {
    let mut path = RecordPath::new();
    let _ = write!(path, "/{day:02}{month:02}{}", quantity.record_suffix());
    path
}
