//! Firmware update servicing. The update mechanism itself is an external
//! collaborator; the runtime gives it one servicing slot at the top of every
//! tick and observes its progress through a hook interface invoked
//! synchronously from that slot.

use tracing::{error, info};

// ---------------------------------------------------------------------------
// Events & observer
// ---------------------------------------------------------------------------

/// Progress reported by an update mechanism. The shipped [`IdleUpdate`]
/// never emits these; real mechanisms construct them during servicing.
#[allow(dead_code)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateEvent {
    Started,
    Progress { done: u64, total: u64 },
    Completed,
    Failed { reason: String },
}

pub trait UpdateObserver {
    fn on_event(&mut self, event: &UpdateEvent);
}

/// Default observer: logs update progress.
pub struct LogObserver;

impl UpdateObserver for LogObserver {
    fn on_event(&mut self, event: &UpdateEvent) {
        match event {
            UpdateEvent::Started => info!("update starting"),
            UpdateEvent::Progress { done, total } => {
                let pct = if *total == 0 { 0 } else { done * 100 / total };
                info!(pct, "update progress");
            }
            UpdateEvent::Completed => info!("update complete"),
            UpdateEvent::Failed { reason } => error!(%reason, "update failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// An update mechanism the runtime services once per tick. Implementations
/// must do a bounded amount of work per call and report through `observer`.
pub trait UpdateService {
    fn service(&mut self, observer: &mut dyn UpdateObserver);
}

/// Shipped default: no update channel wired.
pub struct IdleUpdate;

impl UpdateService for IdleUpdate {
    fn service(&mut self, _observer: &mut dyn UpdateObserver) {}
}

// ===========================================================================
// Tests
// ===========================================================================
