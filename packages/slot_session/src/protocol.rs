//! Client Protocol
//!
//! One flat JSON object per text frame, discriminated by `type`. Inbound
//! frames are decoded per variant with lenient numeric handling (absent,
//! null or unparsable numbers become zero); outbound frames are plain serde.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::device::{SensorFields, TouchPoint};
use crate::error::{Result, SessionError};
use crate::settings::ConfigPayload;
use crate::slot_pool::Slot;

/// Upper bound on touch points accepted from one frame.
pub const MAX_TOUCH_POINTS: usize = 64;

/// Messages sent FROM the client TO the bridge
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Sensor(SensorFields),
    /// Complete set of active touches; `points.len()` is the reported count.
    Touch { points: Vec<TouchPoint> },
    Trigger,
    Hello,
    WebrtcOffer { sdp: String },
    WebrtcIce {
        candidate: String,
        sdp_m_line_index: u32,
        sdp_mid: String,
    },
    /// Well-formed frame with a `type` this bridge does not handle.
    Unknown(String),
}

/// Read-only view over a decoded frame.
struct Fields<'a>(&'a Map<String, Value>);

impl Fields<'_> {
    fn f64(&self, key: &str) -> f64 {
        match self.0.get(key) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
            Some(Value::Bool(b)) => f64::from(u8::from(*b)),
            _ => 0.0,
        }
    }

    fn i64(&self, key: &str) -> i64 {
        let v = self.f64(key);
        if v.is_finite() { v.trunc() as i64 } else { 0 }
    }

    fn string(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }
}

impl ClientMessage {
    /// Decode one text frame.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| SessionError::MalformedMessage(e.to_string()))?;
        let obj = value
            .as_object()
            .ok_or_else(|| SessionError::MalformedMessage("frame is not an object".into()))?;
        let fields = Fields(obj);
        let kind = fields
            .string("type")
            .ok_or_else(|| SessionError::MalformedMessage("missing type".into()))?;

        match kind {
            "sensor" => Ok(Self::Sensor(SensorFields {
                ax: fields.f64("ax"),
                ay: fields.f64("ay"),
                az: fields.f64("az"),
                ga: fields.f64("ga"),
                gb: fields.f64("gb"),
                gg: fields.f64("gg"),
                oa: fields.f64("oa"),
                ob: fields.f64("ob"),
                og: fields.f64("og"),
                lat: fields.f64("lat"),
                lon: fields.f64("lon"),
            })),
            "touch" => {
                let count = fields.i64("count").clamp(0, MAX_TOUCH_POINTS as i64) as u32;
                let points = (0..count)
                    .map(|i| TouchPoint {
                        id: i,
                        x: fields.f64(&format!("t{}x", i)),
                        y: fields.f64(&format!("t{}y", i)),
                        state: fields.i64(&format!("t{}s", i)),
                    })
                    .collect();
                Ok(Self::Touch { points })
            }
            "trigger" => Ok(Self::Trigger),
            "hello" => Ok(Self::Hello),
            "webrtc_offer" => {
                let sdp = fields.string("sdp").ok_or_else(|| {
                    SessionError::MalformedMessage("webrtc_offer without sdp".into())
                })?;
                Ok(Self::WebrtcOffer {
                    sdp: sdp.to_string(),
                })
            }
            "webrtc_ice" => {
                let candidate = fields.string("candidate").ok_or_else(|| {
                    SessionError::MalformedMessage("webrtc_ice without candidate".into())
                })?;
                Ok(Self::WebrtcIce {
                    candidate: candidate.to_string(),
                    sdp_m_line_index: fields.i64("sdpMLineIndex").max(0) as u32,
                    sdp_mid: fields.string("sdpMid").unwrap_or_default().to_string(),
                })
            }
            other => Ok(Self::Unknown(other.to_string())),
        }
    }
}

/// Messages sent FROM the bridge TO the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Ack {
        slot: Slot,
    },
    Rejected {
        reason: String,
    },
    Config(ConfigPayload),
    WebrtcOffer {
        sdp: String,
    },
    WebrtcAnswer {
        sdp: String,
    },
    /// `candidate: null` marks end of candidates and carries no other fields.
    WebrtcIce {
        candidate: Option<String>,
        #[serde(
            rename = "sdpMLineIndex",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        sdp_m_line_index: Option<u32>,
        #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
        sdp_mid: Option<String>,
    },
    WebrtcState {
        state: String,
    },
}

impl ServerMessage {
    pub fn end_of_candidates() -> Self {
        Self::WebrtcIce {
            candidate: None,
            sdp_m_line_index: None,
            sdp_mid: None,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
