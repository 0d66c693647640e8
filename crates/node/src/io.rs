//! Status LED and push button. The `gpio` feature gates the real rppal
//! drivers; without it, mock implementations track state and log
//! transitions.

use anyhow::Result;

#[cfg(feature = "gpio")]
use rppal::gpio::{Gpio, InputPin, Level, OutputPin};

// ---------------------------------------------------------------------------
// Real GPIO (production - requires rppal + Raspberry Pi hardware)
// ---------------------------------------------------------------------------

#[cfg(feature = "gpio")]
pub struct StatusLed {
    pin: OutputPin,
}

#[cfg(feature = "gpio")]
impl StatusLed {
    pub fn new(pin_num: u8, initial: bool) -> Result<Self> {
        let pin = Gpio::new()?.get(pin_num)?.into_output();
        let mut led = Self { pin };
        led.set(initial);
        Ok(led)
    }

    pub fn set(&mut self, on: bool) {
        if on {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
    }
}

#[cfg(feature = "gpio")]
pub struct PushButton {
    pin: InputPin,
}

#[cfg(feature = "gpio")]
impl PushButton {
    pub fn new(pin_num: u8) -> Result<Self> {
        let pin = Gpio::new()?.get(pin_num)?.into_input_pullup();
        Ok(Self { pin })
    }

    /// Active low: pressed while the pin reads low.
    pub fn is_pressed(&self) -> bool {
        self.pin.read() == Level::Low
    }
}

// ---------------------------------------------------------------------------
// Mocks (development - no hardware, state held in memory)
// ---------------------------------------------------------------------------

#[cfg(not(feature = "gpio"))]
pub struct StatusLed {
    pub(crate) on: bool,
}

#[cfg(not(feature = "gpio"))]
impl StatusLed {
    pub fn new(pin_num: u8, initial: bool) -> Result<Self> {
        tracing::info!("[mock-gpio] status led registered (gpio {pin_num} not wired)");
        Ok(Self { on: initial })
    }

    pub fn set(&mut self, on: bool) {
        if self.on != on {
            tracing::debug!("[mock-gpio] led set {}", if on { "ON" } else { "OFF" });
        }
        self.on = on;
    }
}

#[cfg(not(feature = "gpio"))]
pub struct PushButton {
    pub(crate) pressed: bool,
}

#[cfg(not(feature = "gpio"))]
impl PushButton {
    pub fn new(pin_num: u8) -> Result<Self> {
        tracing::info!("[mock-gpio] push button registered (gpio {pin_num} not wired)");
        Ok(Self { pressed: false })
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }
}

// ===========================================================================
// Tests
// ===========================================================================
