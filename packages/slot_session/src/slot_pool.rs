use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{Result, SessionError};

/// Default number of slots when nothing else is configured.
pub const DEFAULT_MAX_SLOTS: u16 = 20;

/// A stable, 1-based slot number identifying one active client.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slot(pub u16);

impl Slot {
    /// The string form handed to the media subsystem as its connection id.
    pub fn connection_id(self) -> String {
        self.0.to_string()
    }

    /// Parse a media-subsystem connection id back into a slot.
    pub fn from_connection_id(id: &str) -> Option<Slot> {
        match id.trim().parse::<u16>() {
            Ok(0) | Err(_) => None,
            Ok(n) => Some(Slot(n)),
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bounded set of slot numbers `1..=capacity`.
///
/// Allocation always hands out the numerically smallest free slot, so slot
/// numbers stay low and stable for long running sessions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotPool {
    capacity: u16,
    free: BTreeSet<Slot>,
}

impl SlotPool {
    /// A pool with every slot free.
    pub fn new(capacity: u16) -> Self {
        Self {
            capacity,
            free: (1..=capacity).map(Slot).collect(),
        }
    }

    /// Rebuild a pool from a persisted free list.
    ///
    /// Entries outside `1..=capacity` are discarded.
    pub fn from_free(capacity: u16, free: impl IntoIterator<Item = Slot>) -> Self {
        Self {
            capacity,
            free: free
                .into_iter()
                .filter(|s| s.0 >= 1 && s.0 <= capacity)
                .collect(),
        }
    }

    pub fn capacity(&self) -> u16 {
        self.capacity
    }

    /// Number of free slots.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn is_free(&self, slot: Slot) -> bool {
        self.free.contains(&slot)
    }

    /// Whether `slot` lies inside `1..=capacity`.
    pub fn contains(&self, slot: Slot) -> bool {
        slot.0 >= 1 && slot.0 <= self.capacity
    }

    /// Take the smallest free slot.
    pub fn acquire(&mut self) -> Result<Slot> {
        self.free.pop_first().ok_or(SessionError::CapacityExceeded {
            capacity: self.capacity,
        })
    }

    /// Return a slot to the pool. Releasing an already free slot is a no-op.
    pub fn release(&mut self, slot: Slot) -> Result<()> {
        if !self.contains(slot) {
            return Err(SessionError::InvalidSlot(slot));
        }
        self.free.insert(slot);
        Ok(())
    }

    /// Free slots in ascending order.
    pub fn free_slots(&self) -> Vec<Slot> {
        self.free.iter().copied().collect()
    }
}
