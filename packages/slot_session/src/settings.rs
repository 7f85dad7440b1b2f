use serde::{Deserialize, Serialize};

use crate::slot_pool::DEFAULT_MAX_SLOTS;

/// Host-side settings pushed to every client, plus the slot capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeSettings {
    /// Sensor frames per second requested from clients
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_true")]
    pub wake_lock: bool,
    #[serde(default = "default_true")]
    pub haptic: bool,
    #[serde(default = "default_true")]
    pub sensor_motion: bool,
    #[serde(default = "default_true")]
    pub sensor_orientation: bool,
    #[serde(default = "default_true")]
    pub sensor_geolocation: bool,
    #[serde(default = "default_true")]
    pub sensor_touch: bool,
    #[serde(default)]
    pub dev_mode: bool,
    #[serde(default)]
    pub camera: bool,
    #[serde(default)]
    pub microphone: bool,
    /// Slot pool capacity
    #[serde(default = "default_max_clients")]
    pub max_clients: u16,
}

fn default_sample_rate() -> u32 {
    30
}

fn default_true() -> bool {
    true
}

fn default_max_clients() -> u16 {
    DEFAULT_MAX_SLOTS
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            wake_lock: true,
            haptic: true,
            sensor_motion: true,
            sensor_orientation: true,
            sensor_geolocation: true,
            sensor_touch: true,
            dev_mode: false,
            camera: false,
            microphone: false,
            max_clients: default_max_clients(),
        }
    }
}

/// The `config` frame body. Flags go out as `0`/`1`; clients parse every
/// value as an integer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigPayload {
    pub sample_rate: u32,
    pub wake_lock: u8,
    pub haptic: u8,
    pub sensor_motion: u8,
    pub sensor_orientation: u8,
    pub sensor_geolocation: u8,
    pub sensor_touch: u8,
    pub dev_mode: u8,
    pub camera: u8,
    pub microphone: u8,
}

impl From<&BridgeSettings> for ConfigPayload {
    fn from(s: &BridgeSettings) -> Self {
        let flag = |b: bool| u8::from(b);
        Self {
            sample_rate: s.sample_rate,
            wake_lock: flag(s.wake_lock),
            haptic: flag(s.haptic),
            sensor_motion: flag(s.sensor_motion),
            sensor_orientation: flag(s.sensor_orientation),
            sensor_geolocation: flag(s.sensor_geolocation),
            sensor_touch: flag(s.sensor_touch),
            dev_mode: flag(s.dev_mode),
            camera: flag(s.camera),
            microphone: flag(s.microphone),
        }
    }
}
