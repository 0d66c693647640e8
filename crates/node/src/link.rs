//! Transport link supervision: bring the lower network link up, watch it,
//! and bring it back with bounded retries when it drops.
//!
//! The original blocking wait-loops are reworked as a state machine polled
//! once per tick:
//!
//! ```text
//! Down ──(begin/reconnect)──▶ Probing{attempt,budget} ──(is_up)──▶ Up
//!  ▲                              │                                 │
//!  └────────[budget exhausted]────┘◀───────────[link lost]──────────┘
//! ```
//!
//! Exhausting the budget is not fatal: the device keeps running degraded and
//! a fresh probe sequence starts on the next supervising call.

use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::state::LinkState;

/// Status checks for the first bring-up, 500 ms apart.
pub(crate) const CONNECT_MAX_ATTEMPTS: u32 = 20;
/// Status checks for each recovery sequence, 500 ms apart.
pub(crate) const RECONNECT_MAX_ATTEMPTS: u32 = 10;
pub(crate) const ATTEMPT_INTERVAL: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Driver trait
// ---------------------------------------------------------------------------

/// The external transport driver: connect/status/reconnect primitives.
pub trait TransportDriver {
    /// Kick off the initial bring-up. Must not block.
    fn begin(&mut self);
    /// Kick off a recovery attempt after the link dropped. Must not block.
    fn reconnect(&mut self);
    /// Current link status.
    fn is_up(&mut self) -> bool;
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug)]
enum Phase {
    Down,
    Probing {
        attempt: u32,
        budget: u32,
        next_check: Instant,
    },
    Up,
}

pub struct LinkSupervisor<D> {
    pub(crate) driver: D,
    phase: Phase,
    ever_connected: bool,
}

impl<D: TransportDriver> LinkSupervisor<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            phase: Phase::Down,
            ever_connected: false,
        }
    }

    pub fn state(&self) -> LinkState {
        match self.phase {
            Phase::Down => LinkState::Disconnected,
            Phase::Probing { .. } => LinkState::Connecting,
            Phase::Up => LinkState::Connected,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.phase, Phase::Up)
    }

    /// Advance the supervision state machine by one poll. Called every tick.
    pub fn ensure(&mut self, now: Instant) {
        if let Phase::Up = self.phase {
            if self.driver.is_up() {
                return;
            }
            warn!("transport link lost");
            self.phase = Phase::Down;
        }

        match self.phase {
            Phase::Down => {
                let budget = if self.ever_connected {
                    info!(budget = RECONNECT_MAX_ATTEMPTS, "reconnecting transport link");
                    self.driver.reconnect();
                    RECONNECT_MAX_ATTEMPTS
                } else {
                    info!(budget = CONNECT_MAX_ATTEMPTS, "connecting transport link");
                    self.driver.begin();
                    CONNECT_MAX_ATTEMPTS
                };
                self.phase = Phase::Probing {
                    attempt: 0,
                    budget,
                    next_check: now + ATTEMPT_INTERVAL,
                };
            }
            Phase::Probing {
                attempt,
                budget,
                next_check,
            } => {
                if now < next_check {
                    return;
                }
                let attempt = attempt + 1;
                if self.driver.is_up() {
                    info!(attempts = attempt, "transport link up");
                    self.ever_connected = true;
                    self.phase = Phase::Up;
                } else if attempt >= budget {
                    warn!(
                        attempts = attempt,
                        "transport connect failed, continuing degraded"
                    );
                    self.phase = Phase::Down;
                } else {
                    debug!(attempt, "transport not up yet");
                    self.phase = Phase::Probing {
                        attempt,
                        budget,
                        next_check: now + ATTEMPT_INTERVAL,
                    };
                }
            }
            Phase::Up => {}
        }
    }
}

// ---------------------------------------------------------------------------
// TCP probe driver (production)
// ---------------------------------------------------------------------------

const PROBE_TIMEOUT: Duration = Duration::from_millis(250);
/// While the link is up, re-probe at most this often so the per-tick monitor
/// does not open a connection on every pass.
const PROBE_CACHE: Duration = Duration::from_secs(5);

/// Treats the transport link as up while `addr` accepts TCP connections.
/// On a hosted device this stands in for the platform's WiFi status call.
pub struct TcpProbe {
    addr: SocketAddr,
    last_up: bool,
    checked_at: Option<Instant>,
}

impl TcpProbe {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            last_up: false,
            checked_at: None,
        }
    }

    fn probe(&mut self) -> bool {
        self.last_up = TcpStream::connect_timeout(&self.addr, PROBE_TIMEOUT).is_ok();
        self.checked_at = Some(Instant::now());
        self.last_up
    }
}

impl TransportDriver for TcpProbe {
    fn begin(&mut self) {
        self.checked_at = None;
    }

    fn reconnect(&mut self) {
        self.checked_at = None;
    }

    fn is_up(&mut self) -> bool {
        if self.last_up {
            if let Some(at) = self.checked_at {
                if at.elapsed() < PROBE_CACHE {
                    return true;
                }
            }
        }
        self.probe()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Scripted transport: comes up once `checks` reaches `up_after`
    /// (`u32::MAX` = never).
    struct FakeTransport {
        up_after: u32,
        checks: u32,
        begins: u32,
        reconnects: u32,
        forced_down: bool,
    }

    impl FakeTransport {
        fn new(up_after: u32) -> Self {
            Self {
                up_after,
                checks: 0,
                begins: 0,
                reconnects: 0,
                forced_down: false,
            }
        }
    }

    impl TransportDriver for FakeTransport {
        fn begin(&mut self) {
            self.begins += 1;
        }

        fn reconnect(&mut self) {
            self.reconnects += 1;
        }

        fn is_up(&mut self) -> bool {
            if self.forced_down {
                return false;
            }
            self.checks += 1;
            self.checks >= self.up_after
        }
    }

    /// Drive `ensure` with 100 ms ticks for `ms` simulated milliseconds.
    fn run_for(sup: &mut LinkSupervisor<FakeTransport>, t0: Instant, from_ms: u64, to_ms: u64) {
        let mut t = from_ms;
        while t <= to_ms {
            sup.ensure(t0 + Duration::from_millis(t));
            t += 100;
        }
    }

    // -- bring-up ------------------------------------------------------------

    #[test]
    fn starts_disconnected() {
        let sup = LinkSupervisor::new(FakeTransport::new(1));
        assert_eq!(sup.state(), LinkState::Disconnected);
    }

    #[test]
    fn connects_on_third_check_after_1500_ms() {
        let mut sup = LinkSupervisor::new(FakeTransport::new(3));
        let t0 = Instant::now();

        sup.ensure(t0);
        assert_eq!(sup.state(), LinkState::Connecting);

        // Checks land at 500 ms and 1000 ms; still down.
        run_for(&mut sup, t0, 100, 1400);
        assert_eq!(sup.state(), LinkState::Connecting);

        sup.ensure(t0 + Duration::from_millis(1500));
        assert_eq!(sup.state(), LinkState::Connected);
        assert_eq!(sup.driver.checks, 3);
    }

    #[test]
    fn checks_are_spaced_by_the_attempt_interval() {
        let mut sup = LinkSupervisor::new(FakeTransport::new(u32::MAX));
        let t0 = Instant::now();

        sup.ensure(t0);
        // Many ticks inside one interval must not add checks.
        run_for(&mut sup, t0, 100, 400);
        assert_eq!(sup.driver.checks, 0);

        sup.ensure(t0 + Duration::from_millis(500));
        assert_eq!(sup.driver.checks, 1);
    }

    #[test]
    fn initial_bring_up_gives_up_after_twenty_checks() {
        let mut sup = LinkSupervisor::new(FakeTransport::new(u32::MAX));
        let t0 = Instant::now();

        sup.ensure(t0);
        assert_eq!(sup.driver.begins, 1);

        // 20 checks at 500 ms apart exhaust the budget at 10 s.
        run_for(&mut sup, t0, 100, 10_000);
        assert!(sup.driver.checks >= 20);
        assert_eq!(sup.driver.begins, 1);

        // Exhaustion is not fatal: the next supervising call starts a fresh
        // sequence with a new begin.
        sup.ensure(t0 + Duration::from_millis(10_100));
        assert_eq!(sup.driver.begins, 2);
    }

    #[test]
    fn recovery_uses_the_smaller_budget_and_reconnect() {
        let mut sup = LinkSupervisor::new(FakeTransport::new(1));
        let t0 = Instant::now();

        sup.ensure(t0);
        sup.ensure(t0 + Duration::from_millis(500));
        assert_eq!(sup.state(), LinkState::Connected);

        // Drop the link.
        sup.driver.forced_down = true;
        sup.ensure(t0 + Duration::from_millis(600));
        assert_eq!(sup.state(), LinkState::Connecting);
        assert_eq!(sup.driver.reconnects, 1);

        // Recovery budget is 10 checks, 500 ms apart: exhausted by 5.6 s.
        run_for(&mut sup, t0, 700, 5_600);
        assert_eq!(sup.state(), LinkState::Disconnected);

        sup.driver.forced_down = false;
        sup.driver.up_after = 0; // next check succeeds
        sup.ensure(t0 + Duration::from_millis(5_700));
        assert_eq!(sup.driver.reconnects, 2);
    }

    #[test]
    fn link_loss_is_detected_while_up() {
        let mut sup = LinkSupervisor::new(FakeTransport::new(1));
        let t0 = Instant::now();

        sup.ensure(t0);
        sup.ensure(t0 + Duration::from_millis(500));
        assert!(sup.is_connected());

        sup.driver.forced_down = true;
        sup.ensure(t0 + Duration::from_millis(600));
        assert!(!sup.is_connected());
    }
}
