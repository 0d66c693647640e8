//! The cooperative scheduler loop. One tick polls every activity in fixed
//! priority order: update servicing, transport supervision, messaging
//! supervision, inbound command dispatch, sensor sampling, telemetry
//! publishing, local input. Nothing here blocks; waits are deadlines checked
//! on later ticks.

use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::commands::{self, Command};
use crate::io::{PushButton, StatusLed};
use crate::link::{LinkSupervisor, TransportDriver};
use crate::messaging::{InboundMessage, MessagingDriver, MessagingSupervisor};
use crate::mqtt;
use crate::sensor::{self, SensorDriver};
use crate::state::SystemState;
use crate::telemetry::{EventMsg, TelemetryMsg};
use crate::update::{UpdateObserver, UpdateService};

pub(crate) const SAMPLE_INTERVAL: Duration = Duration::from_millis(5_000);
pub(crate) const PUBLISH_INTERVAL: Duration = Duration::from_millis(10_000);
pub(crate) const DEBOUNCE: Duration = Duration::from_millis(200);

/// Cadence at which the binary drives [`Runtime::tick`].
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// Schedule timer
// ---------------------------------------------------------------------------

/// Periodic activity timer. Fires at most once per check and only after the
/// full interval has elapsed; firing resets the timer to `now`, so a missed
/// window does not produce catch-up bursts.
pub struct ScheduleTimer {
    interval: Duration,
    last_fired: Instant,
}

impl ScheduleTimer {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            last_fired: now,
        }
    }

    pub fn due(&mut self, now: Instant) -> bool {
        if now.duration_since(self.last_fired) >= self.interval {
            self.last_fired = now;
            true
        } else {
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

pub struct Runtime<T, M, S, U> {
    device_name: String,
    telemetry_topic: String,
    events_topic: String,
    state: SystemState,
    transport: LinkSupervisor<T>,
    messaging: MessagingSupervisor<M>,
    sensor: S,
    update: U,
    update_observer: Box<dyn UpdateObserver>,
    led: StatusLed,
    button: PushButton,
    sample_timer: ScheduleTimer,
    publish_timer: ScheduleTimer,
    /// Debounce deadline; local input is ignored until it passes.
    input_muted_until: Option<Instant>,
}

impl<T, M, S, U> Runtime<T, M, S, U>
where
    T: TransportDriver,
    M: MessagingDriver,
    S: SensorDriver,
    U: UpdateService,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device_name: &str,
        topic_prefix: &str,
        transport: T,
        messaging: M,
        sensor: S,
        update: U,
        update_observer: Box<dyn UpdateObserver>,
        mut led: StatusLed,
        button: PushButton,
        now: Instant,
    ) -> Self {
        let state = SystemState::new(now);
        led.set(state.device.status);

        Self {
            device_name: device_name.to_string(),
            telemetry_topic: mqtt::telemetry_topic(topic_prefix),
            events_topic: mqtt::events_topic(topic_prefix),
            state,
            transport: LinkSupervisor::new(transport),
            messaging: MessagingSupervisor::new(messaging, mqtt::commands_topic(topic_prefix)),
            sensor,
            update,
            update_observer,
            led,
            button,
            sample_timer: ScheduleTimer::new(SAMPLE_INTERVAL, now),
            publish_timer: ScheduleTimer::new(PUBLISH_INTERVAL, now),
            input_muted_until: None,
        }
    }

    /// One full pass through the activity list.
    pub fn tick(&mut self, now: Instant) {
        self.update.service(self.update_observer.as_mut());

        self.transport.ensure(now);
        let transport_up = self.transport.is_connected();
        self.messaging.ensure(now, transport_up);
        self.state.transport = self.transport.state();
        self.state.messaging = self.messaging.state();

        if let Some(msg) = self.messaging.take_inbound() {
            self.handle_message(msg);
        }

        if self.sample_timer.due(now) {
            self.run_sample();
        }

        if self.publish_timer.due(now) {
            self.publish_telemetry(now);
        }

        self.poll_button(now);
    }

    /// Clone of the current state, mirrored into [`crate::state::SharedState`]
    /// by the caller.
    pub fn snapshot(&self) -> SystemState {
        self.state.clone()
    }

    // -- activities ---------------------------------------------------------

    fn handle_message(&mut self, msg: InboundMessage) {
        match commands::parse(&msg.topic, &msg.payload) {
            Some(Command::ToggleStatus) => {
                info!("toggle_status command received");
                self.toggle_status();
            }
            None => {}
        }
    }

    /// Single path for both the remote command and the local button: flip
    /// the flag and mirror it to the LED.
    fn toggle_status(&mut self) {
        self.state.device.status = !self.state.device.status;
        self.led.set(self.state.device.status);
        info!(status = self.state.device.status, "status flag toggled");
    }

    fn run_sample(&mut self) {
        if let Some(sample) = sensor::sample(&mut self.sensor) {
            info!(
                temperature = sample.temperature,
                humidity = sample.humidity,
                "sensor sample"
            );
            self.state.device.sample = Some(sample);
        }
        // A failed read was already logged; previous values are retained.
    }

    fn publish_telemetry(&mut self, now: Instant) {
        if !self.messaging.is_connected() {
            return;
        }
        let payload = TelemetryMsg::new(&self.device_name, &self.state, now).encode();
        match self.messaging.publish(&self.telemetry_topic, payload) {
            // No intra-tick retry; the next scheduled publish tries again.
            Err(e) => warn!("telemetry publish failed: {e:#}"),
            Ok(()) => debug!("telemetry published"),
        }
    }

    fn poll_button(&mut self, now: Instant) {
        if let Some(until) = self.input_muted_until {
            if now < until {
                return;
            }
            self.input_muted_until = None;
        }

        if !self.button.is_pressed() {
            return;
        }

        info!("button pressed");
        self.toggle_status();

        if self.messaging.is_connected() {
            // Best-effort: a failed event publish is neither retried nor
            // surfaced.
            let _ = self
                .messaging
                .publish(&self.events_topic, EventMsg::button_press().encode());
        }

        self.input_muted_until = Some(now + DEBOUNCE);
    }
}

// ===========================================================================
// Tests
// ===========================================================================
