//! TOML config file loading and validation. A missing file is not an error;
//! the device boots on documented defaults so an unprovisioned unit still
//! comes up. `MQTT_HOST`, `MQTT_PORT` and `WEB_PORT` override the file.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::env;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use tracing::warn;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceSection,
    #[serde(default)]
    pub mqtt: MqttSection,
    #[serde(default)]
    pub transport: TransportSection,
    #[serde(default)]
    pub web: WebSection,
    #[serde(default)]
    pub gpio: GpioSection,
}

#[derive(Debug, Deserialize)]
pub struct DeviceSection {
    #[serde(default = "default_device_name")]
    pub name: String,
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
}

#[derive(Debug, Deserialize)]
pub struct MqttSection {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TransportSection {
    /// Address probed to decide whether the transport link is up.
    /// Defaults to the broker address.
    #[serde(default)]
    pub probe_addr: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WebSection {
    #[serde(default = "default_web_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct GpioSection {
    #[serde(default = "default_led_pin")]
    pub led_pin: i64,
    #[serde(default = "default_button_pin")]
    pub button_pin: i64,
}

fn default_device_name() -> String {
    "climate-node".to_string()
}

fn default_topic_prefix() -> String {
    "devices/climate-node".to_string()
}

fn default_mqtt_host() -> String {
    "127.0.0.1".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_web_port() -> u16 {
    8080
}

fn default_led_pin() -> i64 {
    17
}

fn default_button_pin() -> i64 {
    27
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            name: default_device_name(),
            topic_prefix: default_topic_prefix(),
        }
    }
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            username: None,
            password: None,
        }
    }
}

impl Default for WebSection {
    fn default() -> Self {
        Self {
            port: default_web_port(),
        }
    }
}

impl Default for GpioSection {
    fn default() -> Self {
        Self {
            led_pin: default_led_pin(),
            button_pin: default_button_pin(),
        }
    }
}

// ---------------------------------------------------------------------------
// GPIO whitelist
// ---------------------------------------------------------------------------

/// BCM GPIO pins available on the Raspberry Pi 40-pin header for general
/// use. GPIO 0-1 are reserved for the ID EEPROM and must never be used.
const VALID_GPIO_PINS: &[i64] = &[
    2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27,
];

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate all config entries. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.device.name.trim().is_empty() {
            errors.push("device.name is empty".to_string());
        }

        let prefix = &self.device.topic_prefix;
        if prefix.trim().is_empty() {
            errors.push("device.topic_prefix is empty".to_string());
        } else {
            if prefix.ends_with('/') {
                errors.push(format!("device.topic_prefix '{prefix}' ends with '/'"));
            }
            if prefix.contains('+') || prefix.contains('#') {
                errors.push(format!(
                    "device.topic_prefix '{prefix}' contains an MQTT wildcard"
                ));
            }
        }

        if self.mqtt.host.trim().is_empty() {
            errors.push("mqtt.host is empty".to_string());
        }
        if self.mqtt.port == 0 {
            errors.push("mqtt.port must be nonzero".to_string());
        }
        if self.web.port == 0 {
            errors.push("web.port must be nonzero".to_string());
        }

        if !VALID_GPIO_PINS.contains(&self.gpio.led_pin) {
            errors.push(format!(
                "gpio.led_pin {} is not a valid BCM GPIO pin (allowed: 2-27)",
                self.gpio.led_pin
            ));
        }
        if !VALID_GPIO_PINS.contains(&self.gpio.button_pin) {
            errors.push(format!(
                "gpio.button_pin {} is not a valid BCM GPIO pin (allowed: 2-27)",
                self.gpio.button_pin
            ));
        }
        if self.gpio.led_pin == self.gpio.button_pin {
            errors.push(format!(
                "gpio.led_pin and gpio.button_pin are both {}",
                self.gpio.led_pin
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    /// Resolve the transport probe target to a socket address.
    pub fn resolve_probe_addr(&self) -> Result<SocketAddr> {
        let target = match &self.transport.probe_addr {
            Some(addr) => addr.clone(),
            None => format!("{}:{}", self.mqtt.host, self.mqtt.port),
        };
        target
            .to_socket_addrs()
            .with_context(|| format!("resolving transport probe address '{target}'"))?
            .next()
            .ok_or_else(|| anyhow!("no address found for '{target}'"))
    }

    pub fn credentials(&self) -> Option<(&str, &str)> {
        self.mqtt
            .username
            .as_deref()
            .zip(self.mqtt.password.as_deref())
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

pub fn load(path: &str) -> Result<Config> {
    let mut cfg = if Path::new(path).exists() {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("reading config '{path}'"))?;
        toml::from_str(&raw).with_context(|| format!("parsing config '{path}'"))?
    } else {
        warn!(%path, "config file not found, using defaults");
        Config::default()
    };

    apply_env_overrides(&mut cfg);
    cfg.validate()?;
    Ok(cfg)
}

fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(host) = env::var("MQTT_HOST") {
        cfg.mqtt.host = host;
    }
    if let Some(port) = env::var("MQTT_PORT").ok().and_then(|s| s.parse().ok()) {
        cfg.mqtt.port = port;
    }
    if let Some(port) = env::var("WEB_PORT").ok().and_then(|s| s.parse().ok()) {
        cfg.web.port = port;
    }
}

// ===========================================================================
// Tests
// ===========================================================================
