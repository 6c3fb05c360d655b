//! Single-slot channel for late listener failures.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Error;

#[derive(Debug, Default)]
enum Slot {
    #[default]
    Empty,
    Pending(Error),
    Taken,
}

/// Read handle onto the start error of one `start_async` call.
///
/// The slot is written at most once and read at most once. Every start
/// allocates a new slot, so an error from an earlier run is never observed.
#[derive(Debug, Clone, Default)]
pub struct StartError {
    slot: Arc<Mutex<Slot>>,
}

impl StartError {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Store the failure. Returns `false` if the slot was already used.
    pub(crate) fn fill(&self, error: Error) -> bool {
        let mut slot = self.slot.lock();
        match *slot {
            Slot::Empty => {
                *slot = Slot::Pending(error);
                true
            }
            _ => false,
        }
    }

    /// Take the pending error without blocking.
    pub fn take(&self) -> Option<Error> {
        let mut slot = self.slot.lock();
        match std::mem::take(&mut *slot) {
            Slot::Pending(error) => {
                *slot = Slot::Taken;
                Some(error)
            }
            other => {
                *slot = other;
                None
            }
        }
    }

    /// Whether an error is waiting to be taken.
    pub fn is_pending(&self) -> bool {
        matches!(*self.slot.lock(), Slot::Pending(_))
    }
}
