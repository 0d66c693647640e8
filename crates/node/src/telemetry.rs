use serde::Serialize;
use std::time::Instant;

use crate::state::{Reading, SystemState};

// ---------------------------------------------------------------------------
// Outbound wire payloads
// ---------------------------------------------------------------------------

/// Periodic telemetry published to `<prefix>/sensors`.
#[derive(Debug, Serialize)]
pub struct TelemetryMsg<'a> {
    pub device: &'a str,
    /// Milliseconds since boot.
    pub timestamp: u64,
    pub temperature: Reading,
    pub humidity: Reading,
    pub status: bool,
}

impl<'a> TelemetryMsg<'a> {
    pub fn new(device: &'a str, state: &SystemState, now: Instant) -> Self {
        Self {
            device,
            timestamp: state.uptime_ms(now),
            temperature: state.device.temperature(),
            humidity: state.device.humidity(),
            status: state.device.status,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("telemetry message serializes")
    }
}

/// Fire-and-forget device event published to `<prefix>/events`.
#[derive(Debug, Serialize)]
pub struct EventMsg<'a> {
    pub event: &'a str,
}

impl EventMsg<'static> {
    pub fn button_press() -> Self {
        Self {
            event: "button_press",
        }
    }
}

impl<'a> EventMsg<'a> {
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("event message serializes")
    }
}

// ===========================================================================
// Tests
// ===========================================================================
