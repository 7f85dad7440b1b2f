//! Session Table
//!
//! Maps connection identities to slots. The table keeps no state of its
//! own beyond the capacity: every operation reads the mapping and the free
//! list from the [`StateStore`], so reopening the table over the same store
//! picks up exactly where it left off.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};
use crate::slot_pool::{Slot, SlotPool};
use crate::store::{StateStore, keys};

/// Outcome of a successful [`SessionTable::bind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub slot: Slot,
    /// False when the identity was already bound and the existing slot was returned.
    pub newly_bound: bool,
}

struct TableState {
    by_conn: BTreeMap<String, Slot>,
    pool: SlotPool,
}

pub struct SessionTable {
    store: Arc<dyn StateStore>,
    /// Pool capacity. Every bind, unbind and reopen runs under this lock;
    /// lookups read the store directly.
    capacity: Mutex<u16>,
}

impl SessionTable {
    /// Open the table over `store`, reconciling any persisted state with `capacity`.
    pub fn open(store: Arc<dyn StateStore>, capacity: u16) -> Result<Self> {
        let table = Self {
            store,
            capacity: Mutex::new(capacity),
        };
        table.reconcile(capacity)?;
        Ok(table)
    }

    /// Re-read the store and reconcile it against a new capacity. Waits for
    /// in-flight binds and unbinds; none run until the reopen completes.
    pub async fn reopen(&self, capacity: u16) -> Result<()> {
        let mut current = self.capacity.lock().await;
        self.reconcile(capacity)?;
        *current = capacity;
        Ok(())
    }

    pub async fn capacity(&self) -> u16 {
        *self.capacity.lock().await
    }

    /// Make the persisted free list and mapping satisfy the pool invariant:
    /// disjoint, and together covering exactly `1..=capacity`.
    fn reconcile(&self, capacity: u16) -> Result<()> {
        let stored_map = self.store.slot_map();
        let stored_free: Option<Vec<Slot>> = self.store.fetch(keys::FREE_SLOTS);

        // Two identities claiming one slot: keep the first.
        let mut seen = BTreeSet::new();
        let mut by_conn = BTreeMap::new();
        for (conn, slot) in stored_map.iter() {
            if seen.insert(*slot) {
                by_conn.insert(conn.clone(), *slot);
            } else {
                warn!(conn = %conn, slot = %slot, "Dropping duplicate slot claim");
            }
        }

        let expected_free: Vec<Slot> = (1..=capacity)
            .map(Slot)
            .filter(|s| !seen.contains(s))
            .collect();

        let consistent = by_conn.len() == stored_map.len()
            && stored_free.as_ref().is_some_and(|free| {
                let mut sorted = free.clone();
                sorted.sort();
                sorted.dedup();
                sorted == expected_free
            });

        if consistent {
            debug!(
                capacity,
                bound = by_conn.len(),
                "Session table state is consistent"
            );
            return Ok(());
        }

        if stored_free.is_some() {
            warn!(
                capacity,
                bound = by_conn.len(),
                "Rebuilding free slot list from bound sessions"
            );
        } else {
            info!(capacity, "Initializing slot pool");
        }

        self.save(&TableState {
            by_conn,
            pool: SlotPool::from_free(capacity, expected_free),
        })
    }

    fn load(&self, capacity: u16) -> TableState {
        let by_conn = self.store.slot_map();
        let free: Vec<Slot> = self.store.fetch_or(keys::FREE_SLOTS, Vec::new());
        TableState {
            by_conn,
            pool: SlotPool::from_free(capacity, free),
        }
    }

    /// Free list and mapping are written together so a failed write leaves
    /// neither half behind.
    fn save(&self, state: &TableState) -> Result<()> {
        let free = serde_json::to_value(state.pool.free_slots())
            .map_err(|e| SessionError::Store(e.to_string()))?;
        let by_conn =
            serde_json::to_value(&state.by_conn).map_err(|e| SessionError::Store(e.to_string()))?;
        self.store
            .set_many(vec![(keys::FREE_SLOTS, free), (keys::SLOT_BY_CONN, by_conn)])
    }

    /// Bind `identity` to the smallest free slot. Idempotent per identity.
    pub async fn bind(&self, identity: &str) -> Result<Binding> {
        let capacity = self.capacity.lock().await;
        let mut state = self.load(*capacity);

        if let Some(slot) = state.by_conn.get(identity) {
            return Ok(Binding {
                slot: *slot,
                newly_bound: false,
            });
        }

        let slot = state.pool.acquire()?;
        state.by_conn.insert(identity.to_string(), slot);
        self.save(&state)?;
        debug!(conn = %identity, slot = %slot, "Bound session");
        Ok(Binding {
            slot,
            newly_bound: true,
        })
    }

    /// Remove the binding for `identity` and return its slot to the pool.
    pub async fn unbind(&self, identity: &str) -> Result<Slot> {
        let capacity = self.capacity.lock().await;
        let mut state = self.load(*capacity);

        let slot = state
            .by_conn
            .remove(identity)
            .ok_or_else(|| SessionError::NotFound(identity.to_string()))?;

        if state.pool.contains(slot) {
            state.pool.release(slot)?;
        } else {
            info!(slot = %slot, capacity = *capacity, "Retiring slot above capacity");
        }
        self.save(&state)?;
        debug!(conn = %identity, slot = %slot, "Unbound session");
        Ok(slot)
    }

    pub fn lookup(&self, identity: &str) -> Result<Slot> {
        self.store
            .slot_map()
            .get(identity)
            .copied()
            .ok_or_else(|| SessionError::NotFound(identity.to_string()))
    }

    /// Reverse lookup: which identity holds `slot`.
    pub fn identity_of(&self, slot: Slot) -> Option<String> {
        self.store
            .slot_map()
            .into_iter()
            .find_map(|(conn, s)| (s == slot).then_some(conn))
    }

    /// All bindings, ordered by slot.
    pub fn entries(&self) -> Vec<(String, Slot)> {
        let mut entries: Vec<(String, Slot)> = self.store.slot_map().into_iter().collect();
        entries.sort_by_key(|(_, slot)| *slot);
        entries
    }

    /// Free slots in ascending order.
    pub fn free_slots(&self) -> Vec<Slot> {
        let mut free: Vec<Slot> = self.store.fetch_or(keys::FREE_SLOTS, Vec::new());
        free.sort();
        free
    }
}
