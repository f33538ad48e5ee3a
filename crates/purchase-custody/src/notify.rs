//! # Notifications
//!
//! Each committed transition publishes one [`Notice`]. Sinks cannot fail
//! the call: publishing happens after the ledger is settled, and a sink
//! that drops a notice only loses the notice.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use purchase_core::{EscrowId, Timestamp};
use purchase_state::{PurchaseEvent, PurchaseState};

/// A committed transition, as seen by observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    /// The escrow that transitioned.
    pub escrow_id: EscrowId,
    /// What happened.
    pub event: PurchaseEvent,
    /// State after the transition.
    pub state: PurchaseState,
    /// When the call committed.
    pub timestamp: Timestamp,
}

/// Destination for notices.
pub trait EventSink: Send + Sync {
    /// Deliver one notice.
    fn publish(&self, notice: &Notice);
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn publish(&self, notice: &Notice) {
        (**self).publish(notice);
    }
}

/// Logs every notice at `info` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, notice: &Notice) {
        tracing::info!(
            escrow_id = %notice.escrow_id,
            state = %notice.state,
            "{}",
            notice.event
        );
    }
}

/// Keeps every notice in memory, in publication order.
#[derive(Debug, Default)]
pub struct MemorySink {
    notices: Mutex<Vec<Notice>>,
}

impl MemorySink {
    /// An empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all notices received so far.
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    /// Events received so far, without context.
    pub fn events(&self) -> Vec<PurchaseEvent> {
        self.notices.lock().iter().map(|n| n.event).collect()
    }
}

impl EventSink for MemorySink {
    fn publish(&self, notice: &Notice) {
        self.notices.lock().push(notice.clone());
    }
}
