//! Shared plumbing between the producer tasks and the monitor task.
//!
//! The two inbound queues live here as channel statics because their
//! producers (the broker client, the time-sync task) run on other tasks.
//! Sends never block: when a queue is full the newest item is dropped, which
//! is acceptable because the monitor only consumes the freshest readings
//! report each tick anyway.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};

use crate::readings::InverterReadings;

/// Depth of the status-text queue.
pub const STATUS_QUEUE_DEPTH: usize = 5;

/// Depth of the readings queue. It is a freshness buffer, not a work list;
/// depth only papers over scheduling jitter.
pub const READINGS_QUEUE_DEPTH: usize = 5;

/// Bounded status line for the dashboard's settings screen.
pub type StatusMessage = heapless::String<64>;

/// Queue of free-text status messages.
pub static STATUS_CHANNEL: Channel<CriticalSectionRawMutex, StatusMessage, STATUS_QUEUE_DEPTH> =
    Channel::new();

/// Queue of decoded inverter reports.
pub static READINGS_CHANNEL: Channel<CriticalSectionRawMutex, InverterReadings, READINGS_QUEUE_DEPTH> =
    Channel::new();

pub fn status_sender()
-> Sender<'static, CriticalSectionRawMutex, StatusMessage, STATUS_QUEUE_DEPTH> {
    STATUS_CHANNEL.sender()
}

pub fn status_receiver()
-> Receiver<'static, CriticalSectionRawMutex, StatusMessage, STATUS_QUEUE_DEPTH> {
    STATUS_CHANNEL.receiver()
}

pub fn readings_sender()
-> Sender<'static, CriticalSectionRawMutex, InverterReadings, READINGS_QUEUE_DEPTH> {
    READINGS_CHANNEL.sender()
}

pub fn readings_receiver()
-> Receiver<'static, CriticalSectionRawMutex, InverterReadings, READINGS_QUEUE_DEPTH> {
    READINGS_CHANNEL.receiver()
}

/// Queue a status line, truncating it to the bounded length. Drops the
/// message instead of blocking when the queue is full.
pub fn post_status(text: &str) {
    let mut message = StatusMessage::new();
    for ch in text.chars() {
        if message.push(ch).is_err() {
            break;
        }
    }
    let _ = STATUS_CHANNEL.try_send(message);
}

/// Queue a readings report, dropping it when the monitor is behind.
pub fn post_readings(readings: InverterReadings) {
    let _ = READINGS_CHANNEL.try_send(readings);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_status_truncates_to_capacity() {
        while STATUS_CHANNEL.try_receive().is_ok() {}

        let mut long = alloc::string::String::new();
        for _ in 0..100 {
            long.push('x');
        }

        post_status(&long);

        let message = STATUS_CHANNEL.try_receive().unwrap();
        assert_eq!(message.len(), 64);
    }
}
