//! Connectivity state and its edge detection.

use crate::dashboard::AlertState;

/// Connectivity collaborator, polled once per tick.
pub trait Connectivity {
    /// The wall clock has synchronized. Once true it stays true until
    /// reboot; the persistence machinery depends on that.
    fn is_time_valid(&self) -> bool;

    /// The network link is up.
    fn is_connected(&self) -> bool;

    /// The telemetry broker session is established.
    fn is_broker_active(&self) -> bool;
}

/// Tick-to-tick change detector for the connectivity flags.
///
/// Yields an [`AlertState`] only when a flag actually flipped, so the
/// dashboard switches once per transition instead of once per tick.
pub struct LinkEdges {
    last_connected: bool,
    last_broker: bool,
}

impl LinkEdges {
    /// `connected_now` seeds the network flag so an already-up link produces
    /// no spurious edge on the first tick. The broker flag starts pessimistic
    /// because the session always comes up after the link.
    pub const fn new(connected_now: bool) -> Self {
        Self {
            last_connected: connected_now,
            last_broker: false,
        }
    }

    pub fn observe(&mut self, connected: bool, broker: bool) -> Option<AlertState> {
        let changed = connected != self.last_connected || broker != self.last_broker;
        self.last_connected = connected;
        self.last_broker = broker;
        if !changed {
            return None;
        }
        Some(if !connected {
            AlertState::Offline
        } else if !broker {
            AlertState::NoBroker
        } else {
            AlertState::Live
        })
    }
}
