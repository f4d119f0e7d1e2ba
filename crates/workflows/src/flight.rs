//! Single-flight bookkeeping for AI operations.
//!
//! Each unit of work (the scaffolder, one file, one chat session) gets at
//! most one operation in flight. A claim hands back a ticket; dropping the
//! ticket frees the slot. Cancelling bumps the slot's epoch, so a ticket
//! that outlives a cancel can tell its result went stale.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// What a flight is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlightKey {
    Scaffold,
    File(Uuid),
    Session(Uuid),
}

#[derive(Default)]
struct Slot {
    epoch: u64,
    busy: bool,
}

/// Cloning hands out another handle to the same table.
#[derive(Clone, Default)]
pub struct FlightTable {
    slots: Arc<Mutex<HashMap<FlightKey, Slot>>>,
}

impl FlightTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for `key`. `None` while an operation is in flight.
    pub fn begin(&self, key: FlightKey) -> Option<Ticket> {
        let mut slots = self.slots.lock();
        let slot = slots.entry(key).or_default();
        if slot.busy {
            return None;
        }
        slot.busy = true;
        let epoch = slot.epoch;
        drop(slots);
        Some(Ticket {
            table: self.clone(),
            key,
            epoch,
        })
    }

    /// Invalidate whatever is in flight for `key` and free the slot. The
    /// cancelled operation keeps running, but its ticket goes stale.
    pub fn cancel(&self, key: FlightKey) {
        let mut slots = self.slots.lock();
        let slot = slots.entry(key).or_default();
        slot.epoch += 1;
        slot.busy = false;
    }

    pub fn is_busy(&self, key: FlightKey) -> bool {
        self.slots.lock().get(&key).map_or(false, |slot| slot.busy)
    }

    fn is_current(&self, key: FlightKey, epoch: u64) -> bool {
        self.slots
            .lock()
            .get(&key)
            .map_or(false, |slot| slot.epoch == epoch)
    }

    fn release(&self, key: FlightKey, epoch: u64) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get_mut(&key) {
            // A stale ticket must not free a slot someone else reclaimed.
            if slot.epoch == epoch {
                slot.busy = false;
            }
        }
    }
}

/// Proof of a claimed slot.
pub struct Ticket {
    table: FlightTable,
    key: FlightKey,
    epoch: u64,
}

impl Ticket {
    /// False once the flight was cancelled. Results arriving on a stale
    /// ticket must be discarded.
    pub fn is_current(&self) -> bool {
        self.table.is_current(self.key, self.epoch)
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.table.release(self.key, self.epoch);
    }
}
