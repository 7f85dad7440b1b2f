//! Device State Store
//!
//! Latest sensor and touch snapshot per slot, written through to a
//! [`TabularSink`] that downstream consumers read by slot number. The
//! touch-count cache and the one-shot trigger pulse live in the
//! [`StateStore`] under transient keys: they follow the session across a
//! core reinitialization but never reach disk.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::slot_pool::Slot;
use crate::store::{StateStore, keys};

/// Motion, orientation and geolocation readings. Absent fields are `0.0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorFields {
    /// Acceleration x/y/z
    pub ax: f64,
    pub ay: f64,
    pub az: f64,
    /// Gyroscope alpha/beta/gamma
    pub ga: f64,
    pub gb: f64,
    pub gg: f64,
    /// Orientation alpha/beta/gamma
    pub oa: f64,
    pub ob: f64,
    pub og: f64,
    pub lat: f64,
    pub lon: f64,
}

/// One active touch point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TouchPoint {
    pub id: u32,
    pub x: f64,
    pub y: f64,
    pub state: i64,
}

/// One row of the sensor table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorRow {
    pub slot: Slot,
    pub connected: bool,
    #[serde(flatten)]
    pub fields: SensorFields,
    pub touch_count: u32,
    /// Trigger pulse as sampled by the sensor update that wrote this row, `0` or `1`.
    pub trig: u8,
}

impl SensorRow {
    /// Canonical zero state of a slot with nobody on it.
    pub fn disconnected(slot: Slot) -> Self {
        Self {
            slot,
            connected: false,
            fields: SensorFields::default(),
            touch_count: 0,
            trig: 0,
        }
    }

    /// Zeroed row for a slot that just got a client.
    pub fn connected(slot: Slot) -> Self {
        Self {
            connected: true,
            ..Self::disconnected(slot)
        }
    }
}

/// Row-addressable storage consumed downstream.
///
/// Implementations must apply each call atomically with respect to other
/// calls for the same slot.
pub trait TabularSink: Send + Sync {
    /// Drop every row of both tables.
    fn clear(&self) -> Result<()>;
    fn sensor_row(&self, slot: Slot) -> Option<SensorRow>;
    /// All sensor rows ordered by slot.
    fn sensor_rows(&self) -> Vec<SensorRow>;
    /// Insert or replace the sensor row keyed by `row.slot`.
    fn replace_sensor_row(&self, row: SensorRow) -> Result<()>;
    fn touch_rows(&self, slot: Slot) -> Vec<TouchPoint>;
    /// Delete all touch rows of `slot` and append `points` in order.
    fn replace_touch_rows(&self, slot: Slot, points: Vec<TouchPoint>) -> Result<()>;
    /// Delete the sensor row and every touch row of `slot`.
    fn remove_slot(&self, slot: Slot) -> Result<()>;
}

#[derive(Debug, Default)]
struct Tables {
    sensor: BTreeMap<Slot, SensorRow>,
    touch: BTreeMap<Slot, Vec<TouchPoint>>,
}

/// In-process sink. Both tables sit behind one lock.
#[derive(Debug, Default)]
pub struct MemoryTable {
    tables: RwLock<Tables>,
}

impl MemoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total touch rows across all slots.
    pub fn touch_row_count(&self) -> usize {
        self.tables.read().touch.values().map(Vec::len).sum()
    }
}

impl TabularSink for MemoryTable {
    fn clear(&self) -> Result<()> {
        let mut tables = self.tables.write();
        tables.sensor.clear();
        tables.touch.clear();
        Ok(())
    }

    fn sensor_row(&self, slot: Slot) -> Option<SensorRow> {
        self.tables.read().sensor.get(&slot).copied()
    }

    fn sensor_rows(&self) -> Vec<SensorRow> {
        self.tables.read().sensor.values().copied().collect()
    }

    fn replace_sensor_row(&self, row: SensorRow) -> Result<()> {
        self.tables.write().sensor.insert(row.slot, row);
        Ok(())
    }

    fn touch_rows(&self, slot: Slot) -> Vec<TouchPoint> {
        self.tables
            .read()
            .touch
            .get(&slot)
            .cloned()
            .unwrap_or_default()
    }

    fn replace_touch_rows(&self, slot: Slot, points: Vec<TouchPoint>) -> Result<()> {
        let mut tables = self.tables.write();
        if points.is_empty() {
            tables.touch.remove(&slot);
        } else {
            tables.touch.insert(slot, points);
        }
        Ok(())
    }

    fn remove_slot(&self, slot: Slot) -> Result<()> {
        let mut tables = self.tables.write();
        tables.sensor.remove(&slot);
        tables.touch.remove(&slot);
        Ok(())
    }
}

/// Per-slot device state over a sink and the durable store.
pub struct DeviceStateStore {
    sink: Arc<dyn TabularSink>,
    store: Arc<dyn StateStore>,
}

impl DeviceStateStore {
    pub fn new(sink: Arc<dyn TabularSink>, store: Arc<dyn StateStore>) -> Self {
        Self { sink, store }
    }

    pub fn sink(&self) -> &Arc<dyn TabularSink> {
        &self.sink
    }

    /// Publish a zeroed, connected row for a freshly bound slot.
    pub fn connect(&self, slot: Slot) -> Result<()> {
        self.store.remove(&keys::touch_count(slot))?;
        self.store.remove(&keys::trigger(slot))?;
        self.sink.replace_sensor_row(SensorRow::connected(slot))
    }

    /// Write a full sensor row, sampling (and resetting) the trigger pulse.
    pub fn upsert(&self, slot: Slot, fields: SensorFields) -> Result<SensorRow> {
        let trig = self.consume_trigger(slot)?;
        let touch_count = self.touch_count(slot);
        let row = SensorRow {
            slot,
            connected: true,
            fields,
            touch_count,
            trig: u8::from(trig),
        };
        self.sink.replace_sensor_row(row)?;
        Ok(row)
    }

    /// Replace the touch rows of `slot` with `points` and cache the count.
    pub fn upsert_touch(&self, slot: Slot, points: Vec<TouchPoint>) -> Result<()> {
        let count = points.len() as u32;
        if self.touch_count(slot) != count {
            self.store.put(&keys::touch_count(slot), &count)?;
        }
        self.sink.replace_touch_rows(slot, points)?;

        // Keep the sensor row's count current between sensor frames
        if let Some(mut row) = self.sink.sensor_row(slot) {
            if row.touch_count != count {
                row.touch_count = count;
                self.sink.replace_sensor_row(row)?;
            }
        }
        debug!(slot = %slot, count, "Touch rows replaced");
        Ok(())
    }

    /// Arm the one-shot trigger pulse.
    pub fn set_trigger(&self, slot: Slot) -> Result<()> {
        self.store.put(&keys::trigger(slot), &true)
    }

    /// Read the trigger pulse and clear it in the same step.
    pub fn consume_trigger(&self, slot: Slot) -> Result<bool> {
        let key = keys::trigger(slot);
        let armed: bool = self.store.fetch_or(&key, false);
        if armed {
            self.store.put(&key, &false)?;
        }
        Ok(armed)
    }

    pub fn touch_count(&self, slot: Slot) -> u32 {
        self.store.fetch_or(&keys::touch_count(slot), 0)
    }

    /// Drop every row for `slot` and forget its cached touch count and pulse.
    pub fn reset(&self, slot: Slot) -> Result<()> {
        self.sink.remove_slot(slot)?;
        self.store.remove(&keys::touch_count(slot))?;
        self.store.remove(&keys::trigger(slot))
    }

    /// Current row, or the disconnected zero state when the slot has none.
    pub fn snapshot(&self, slot: Slot) -> SensorRow {
        self.sink
            .sensor_row(slot)
            .unwrap_or_else(|| SensorRow::disconnected(slot))
    }

    pub fn touches(&self, slot: Slot) -> Vec<TouchPoint> {
        self.sink.touch_rows(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{JsonFileStore, MemoryStore};

    fn device() -> (DeviceStateStore, Arc<MemoryTable>) {
        let sink = Arc::new(MemoryTable::new());
        let store = DeviceStateStore::new(sink.clone(), Arc::new(MemoryStore::new()));
        (store, sink)
    }

    fn points(n: u32) -> Vec<TouchPoint> {
        (0..n)
            .map(|i| TouchPoint {
                id: i,
                x: i as f64 * 0.1,
                y: 0.5,
                state: 1,
            })
            .collect()
    }

    #[test]
    fn test_connect_publishes_zeroed_row() {
        let (device, _) = device();
        device.connect(Slot(2)).unwrap();

        let row = device.snapshot(Slot(2));
        assert!(row.connected);
        assert_eq!(row.fields, SensorFields::default());
        assert_eq!(row.touch_count, 0);
    }

    #[test]
    fn test_trigger_pulse_delivered_once() {
        let (device, _) = device();
        device.set_trigger(Slot(1)).unwrap();

        let first = device.upsert(Slot(1), SensorFields::default()).unwrap();
        let second = device.upsert(Slot(1), SensorFields::default()).unwrap();
        assert_eq!(first.trig, 1);
        assert_eq!(second.trig, 0);
    }

    #[test]
    fn test_sensor_row_merges_touch_count() {
        let (device, _) = device();
        device.upsert_touch(Slot(1), points(2)).unwrap();

        let row = device
            .upsert(
                Slot(1),
                SensorFields {
                    ax: 1.5,
                    lat: 37.5,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(row.touch_count, 2);
        assert_eq!(row.fields.ax, 1.5);
        assert_eq!(row.fields.lat, 37.5);
    }

    #[test]
    fn test_touch_replace_leaves_no_stale_rows() {
        let (device, sink) = device();
        device.upsert_touch(Slot(1), points(3)).unwrap();
        device.upsert_touch(Slot(2), points(2)).unwrap();
        device.upsert_touch(Slot(1), points(1)).unwrap();

        assert_eq!(device.touches(Slot(1)).len(), 1);
        assert_eq!(device.touches(Slot(2)).len(), 2);
        assert_eq!(sink.touch_row_count(), 3);
        assert_eq!(device.touch_count(Slot(1)), 1);
    }

    #[test]
    fn test_touch_updates_existing_row_count() {
        let (device, _) = device();
        device.connect(Slot(1)).unwrap();
        device.upsert_touch(Slot(1), points(4)).unwrap();
        assert_eq!(device.snapshot(Slot(1)).touch_count, 4);
    }

    #[test]
    fn test_reset_clears_rows_and_caches() {
        let (device, sink) = device();
        device.upsert(Slot(3), SensorFields { ax: 2.0, ..Default::default() }).unwrap();
        device.upsert_touch(Slot(3), points(2)).unwrap();
        device.set_trigger(Slot(3)).unwrap();

        device.reset(Slot(3)).unwrap();

        assert_eq!(device.snapshot(Slot(3)), SensorRow::disconnected(Slot(3)));
        assert!(device.touches(Slot(3)).is_empty());
        assert_eq!(sink.touch_row_count(), 0);
        assert_eq!(device.touch_count(Slot(3)), 0);
        assert!(!device.consume_trigger(Slot(3)).unwrap());
    }

    #[test]
    fn test_per_frame_state_stays_off_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("session.json");
        let store: Arc<dyn StateStore> = Arc::new(JsonFileStore::open(&path).unwrap());
        let device = DeviceStateStore::new(Arc::new(MemoryTable::new()), store);

        device.connect(Slot(1)).unwrap();
        device.upsert_touch(Slot(1), points(2)).unwrap();
        device.upsert_touch(Slot(1), points(2)).unwrap();
        device.set_trigger(Slot(1)).unwrap();
        let row = device.upsert(Slot(1), SensorFields::default()).unwrap();
        assert_eq!(row.touch_count, 2);
        assert_eq!(row.trig, 1);

        device.reset(Slot(1)).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_sensor_rows_ordered_by_slot() {
        let (device, sink) = device();
        device.connect(Slot(5)).unwrap();
        device.connect(Slot(1)).unwrap();
        device.connect(Slot(3)).unwrap();

        let slots: Vec<Slot> = sink.sensor_rows().iter().map(|r| r.slot).collect();
        assert_eq!(slots, vec![Slot(1), Slot(3), Slot(5)]);
    }

    #[test]
    fn test_sensor_row_serializes_flat() {
        let row = SensorRow::connected(Slot(4));
        let json = serde_json::to_value(row).unwrap();
        assert_eq!(json["slot"], 4);
        assert_eq!(json["connected"], true);
        assert_eq!(json["ax"], 0.0);
        assert_eq!(json["trig"], 0);
    }
}
