use serde::{Serialize, Serializer};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

// ---------------------------------------------------------------------------
// Public type alias
// ---------------------------------------------------------------------------

/// Read-only mirror of [`SystemState`] for the web layer. The scheduler loop
/// is the only writer; it replaces the contents once per tick.
pub type SharedState = Arc<RwLock<SystemState>>;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// Connection state of a network link (transport or messaging).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// One successful sensor read. Both channels always come from the same read,
/// so a partially-valid sample cannot be represented.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SensorSample {
    pub temperature: f64,
    pub humidity: f64,
}

/// A reported sensor value: a number once a sample exists, the string
/// `"unknown"` before that.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Reading {
    Known(f64),
    Unknown,
}

impl Serialize for Reading {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Reading::Known(v) => serializer.serialize_f64(*v),
            Reading::Unknown => serializer.serialize_str("unknown"),
        }
    }
}

/// Device-level state mutated only from within the scheduler loop's tick.
#[derive(Clone, Debug)]
pub struct DeviceState {
    /// Last-known-good sensor sample. `None` until the first valid read.
    pub sample: Option<SensorSample>,
    /// The toggleable status flag, mirrored to the status LED.
    pub status: bool,
}

impl DeviceState {
    pub fn new() -> Self {
        Self {
            sample: None,
            status: true,
        }
    }

    pub fn temperature(&self) -> Reading {
        match self.sample {
            Some(s) => Reading::Known(s.temperature),
            None => Reading::Unknown,
        }
    }

    pub fn humidity(&self) -> Reading {
        match self.sample {
            Some(s) => Reading::Known(s.humidity),
            None => Reading::Unknown,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SystemState {
    pub started_at: Instant,
    pub device: DeviceState,
    pub transport: LinkState,
    pub messaging: LinkState,
}

// ---------------------------------------------------------------------------
// JSON response (what /api/sensors returns)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct SensorsResponse {
    pub temperature: Reading,
    pub humidity: Reading,
    pub status: bool,
    /// Milliseconds since boot.
    pub uptime: u64,
    /// Available system memory in bytes.
    pub free_heap: u64,
}

// ---------------------------------------------------------------------------
// Construction & snapshots
// ---------------------------------------------------------------------------

impl SystemState {
    pub fn new(started_at: Instant) -> Self {
        Self {
            started_at,
            device: DeviceState::new(),
            transport: LinkState::Disconnected,
            messaging: LinkState::Disconnected,
        }
    }

    pub fn uptime_ms(&self, now: Instant) -> u64 {
        now.duration_since(self.started_at).as_millis() as u64
    }

    pub fn sensors_response(&self, now: Instant, free_heap: u64) -> SensorsResponse {
        SensorsResponse {
            temperature: self.device.temperature(),
            humidity: self.device.humidity(),
            status: self.device.status,
            uptime: self.uptime_ms(now),
            free_heap,
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
