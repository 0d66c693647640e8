//! Messaging link supervision. The publish/subscribe link rides on the
//! transport link: it may only connect while the transport is up, and it is
//! forced down the tick the transport drops.
//!
//! Unlike the transport supervisor's bounded budgets, connect attempts here
//! retry forever, 5 s apart. A device with no transport should fall through
//! fast and retry the lower link; one with transport but no broker keeps
//! trying, since the broker is expected to be reachable.

use anyhow::Result;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::state::LinkState;

pub(crate) const RETRY_DELAY: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Driver trait & inbound messages
// ---------------------------------------------------------------------------

/// One message received from the broker. Ephemeral: dispatched within the
/// tick that drains it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// The external messaging driver: connect/publish/subscribe/receive
/// primitives. All calls must return without blocking the tick.
pub trait MessagingDriver {
    fn connect(&mut self) -> Result<()>;
    fn subscribe(&mut self, topic: &str) -> Result<()>;
    fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<()>;
    fn try_recv(&mut self) -> Option<InboundMessage>;
    fn is_connected(&self) -> bool;
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

pub struct MessagingSupervisor<D> {
    pub(crate) driver: D,
    command_topic: String,
    connected: bool,
    transport_up: bool,
    /// `None` means attempt on the next supervising call.
    next_attempt: Option<Instant>,
    /// Capacity-1 inbox. A second arrival before dispatch overwrites the
    /// first (last write wins).
    inbox: Option<InboundMessage>,
}

impl<D: MessagingDriver> MessagingSupervisor<D> {
    pub fn new(driver: D, command_topic: String) -> Self {
        Self {
            driver,
            command_topic,
            connected: false,
            transport_up: false,
            next_attempt: None,
            inbox: None,
        }
    }

    pub fn state(&self) -> LinkState {
        if !self.transport_up {
            LinkState::Disconnected
        } else if self.connected {
            LinkState::Connected
        } else {
            LinkState::Connecting
        }
    }

    pub fn is_connected(&self) -> bool {
        self.transport_up && self.connected
    }

    /// Advance the supervision state machine by one poll. Called every tick,
    /// after the transport supervisor.
    pub fn ensure(&mut self, now: Instant, transport_up: bool) {
        self.transport_up = transport_up;
        if !transport_up {
            if self.connected {
                warn!("transport down, messaging link marked disconnected");
            }
            self.connected = false;
            self.next_attempt = None;
            return;
        }

        if self.connected {
            if self.driver.is_connected() {
                return;
            }
            warn!("messaging link lost");
            self.connected = false;
            self.next_attempt = None;
        }

        if let Some(at) = self.next_attempt {
            if now < at {
                return;
            }
        }

        info!("attempting messaging connect");
        match self.connect_and_subscribe() {
            Ok(()) => {
                info!(topic = %self.command_topic, "messaging link up, subscribed");
                self.connected = true;
                self.next_attempt = None;
            }
            Err(e) => {
                warn!(
                    "messaging connect failed: {e:#}, retrying in {}s",
                    RETRY_DELAY.as_secs()
                );
                self.next_attempt = Some(now + RETRY_DELAY);
            }
        }
    }

    fn connect_and_subscribe(&mut self) -> Result<()> {
        self.driver.connect()?;
        self.driver.subscribe(&self.command_topic)?;
        Ok(())
    }

    /// Drain at most one pending message. Anything already buffered by the
    /// driver collapses into the capacity-1 inbox first.
    pub fn take_inbound(&mut self) -> Option<InboundMessage> {
        if self.connected {
            while let Some(msg) = self.driver.try_recv() {
                if self.inbox.is_some() {
                    debug!("pending inbound message overwritten");
                }
                self.inbox = Some(msg);
            }
        }
        self.inbox.take()
    }

    pub fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.driver.publish(topic, payload)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct FakeMessaging {
        connect_ok: bool,
        connects: u32,
        subscriptions: Vec<String>,
        published: Vec<(String, Vec<u8>)>,
        queued: VecDeque<InboundMessage>,
        session_up: bool,
    }

    impl MessagingDriver for FakeMessaging {
        fn connect(&mut self) -> Result<()> {
            self.connects += 1;
            if self.connect_ok {
                self.session_up = true;
                Ok(())
            } else {
                bail!("broker unreachable")
            }
        }

        fn subscribe(&mut self, topic: &str) -> Result<()> {
            self.subscriptions.push(topic.to_string());
            Ok(())
        }

        fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<()> {
            self.published.push((topic.to_string(), payload));
            Ok(())
        }

        fn try_recv(&mut self) -> Option<InboundMessage> {
            self.queued.pop_front()
        }

        fn is_connected(&self) -> bool {
            self.session_up
        }
    }

    fn supervisor(connect_ok: bool) -> MessagingSupervisor<FakeMessaging> {
        let driver = FakeMessaging {
            connect_ok,
            ..Default::default()
        };
        MessagingSupervisor::new(driver, "devices/test/commands".to_string())
    }

    // -- transport gating ---------------------------------------------------

    #[test]
    fn no_attempt_while_transport_down() {
        let mut sup = supervisor(true);
        let t0 = Instant::now();
        sup.ensure(t0, false);
        assert_eq!(sup.state(), LinkState::Disconnected);
        assert_eq!(sup.driver.connects, 0);
    }

    #[test]
    fn transport_drop_forces_disconnected() {
        let mut sup = supervisor(true);
        let t0 = Instant::now();
        sup.ensure(t0, true);
        assert_eq!(sup.state(), LinkState::Connected);

        sup.ensure(t0 + Duration::from_millis(100), false);
        assert_eq!(sup.state(), LinkState::Disconnected);
        assert!(!sup.is_connected());
    }

    #[test]
    fn never_connecting_while_transport_down() {
        let mut sup = supervisor(false);
        let t0 = Instant::now();
        // A failed attempt leaves a pending retry; dropping transport must
        // still report Disconnected, not Connecting.
        sup.ensure(t0, true);
        assert_eq!(sup.state(), LinkState::Connecting);
        sup.ensure(t0 + Duration::from_millis(100), false);
        assert_eq!(sup.state(), LinkState::Disconnected);
    }

    // -- connect & subscribe ------------------------------------------------

    #[test]
    fn connects_and_subscribes_on_first_attempt() {
        let mut sup = supervisor(true);
        sup.ensure(Instant::now(), true);
        assert!(sup.is_connected());
        assert_eq!(sup.driver.subscriptions, vec!["devices/test/commands"]);
    }

    #[test]
    fn retries_every_five_seconds_without_bound() {
        let mut sup = supervisor(false);
        let t0 = Instant::now();

        sup.ensure(t0, true);
        assert_eq!(sup.driver.connects, 1);

        // Inside the retry window nothing happens.
        sup.ensure(t0 + Duration::from_secs(4), true);
        assert_eq!(sup.driver.connects, 1);

        // Attempts land every 5 s, indefinitely.
        for i in 1..=4u64 {
            sup.ensure(t0 + Duration::from_secs(5 * i), true);
        }
        assert_eq!(sup.driver.connects, 5);
        assert_eq!(sup.state(), LinkState::Connecting);

        // A late success still goes through.
        sup.driver.connect_ok = true;
        sup.ensure(t0 + Duration::from_secs(25), true);
        assert!(sup.is_connected());
    }

    #[test]
    fn resubscribes_on_every_reconnect() {
        let mut sup = supervisor(true);
        let t0 = Instant::now();
        sup.ensure(t0, true);

        // Session drops out from under us.
        sup.driver.session_up = false;
        sup.ensure(t0 + Duration::from_millis(100), true);
        assert!(sup.is_connected());
        assert_eq!(sup.driver.subscriptions.len(), 2);
    }

    // -- inbox --------------------------------------------------------------

    fn msg(n: u8) -> InboundMessage {
        InboundMessage {
            topic: "devices/test/commands".to_string(),
            payload: vec![n],
        }
    }

    #[test]
    fn take_inbound_returns_one_message() {
        let mut sup = supervisor(true);
        sup.ensure(Instant::now(), true);
        sup.driver.queued.push_back(msg(1));

        assert_eq!(sup.take_inbound(), Some(msg(1)));
        assert_eq!(sup.take_inbound(), None);
    }

    #[test]
    fn inbox_keeps_only_the_latest_message() {
        let mut sup = supervisor(true);
        sup.ensure(Instant::now(), true);
        sup.driver.queued.push_back(msg(1));
        sup.driver.queued.push_back(msg(2));

        assert_eq!(sup.take_inbound(), Some(msg(2)));
        assert_eq!(sup.take_inbound(), None);
    }

    #[test]
    fn inbox_not_drained_while_disconnected() {
        let mut sup = supervisor(true);
        sup.driver.queued.push_back(msg(1));
        assert_eq!(sup.take_inbound(), None);
    }
}
