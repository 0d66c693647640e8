mod commands;
mod config;
mod io;
mod link;
mod messaging;
mod mqtt;
mod runtime;
mod sensor;
mod state;
mod telemetry;
mod update;
mod web;

use anyhow::Result;
use std::env;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::io::{PushButton, StatusLed};
use crate::link::TcpProbe;
use crate::mqtt::MqttDriver;
use crate::runtime::{Runtime, TICK_INTERVAL};
use crate::state::SystemState;
use crate::update::{IdleUpdate, LogObserver};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ──────────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::load(&config_path)?;
    info!(
        device = %cfg.device.name,
        prefix = %cfg.device.topic_prefix,
        broker = %format!("{}:{}", cfg.mqtt.host, cfg.mqtt.port),
        "starting"
    );

    // ── Shared state (read by the web layer) ────────────────────────
    let shared = Arc::new(RwLock::new(SystemState::new(Instant::now())));

    // ── Web server ──────────────────────────────────────────────────
    let web_state = Arc::clone(&shared);
    let web_port = cfg.web.port;
    tokio::spawn(async move {
        web::serve(web_state, web_port).await;
    });

    // ── Drivers ─────────────────────────────────────────────────────
    let transport = TcpProbe::new(cfg.resolve_probe_addr()?);
    let messaging = MqttDriver::spawn(
        &cfg.device.name,
        &cfg.mqtt.host,
        cfg.mqtt.port,
        cfg.credentials(),
    );

    #[cfg(feature = "sim")]
    let sensor = sensor::SimSensor::new();
    #[cfg(not(feature = "sim"))]
    let sensor = sensor::NullSensor;

    let led = StatusLed::new(cfg.gpio.led_pin as u8, true)?;
    let button = PushButton::new(cfg.gpio.button_pin as u8)?;

    // ── Scheduler loop ──────────────────────────────────────────────
    let mut runtime = Runtime::new(
        &cfg.device.name,
        &cfg.device.topic_prefix,
        transport,
        messaging,
        sensor,
        IdleUpdate,
        Box::new(LogObserver),
        led,
        button,
        Instant::now(),
    );

    info!("device initialisation complete");

    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    loop {
        ticker.tick().await;
        runtime.tick(Instant::now());

        let mut st = shared.write().await;
        *st = runtime.snapshot();
    }
}
