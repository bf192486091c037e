use std::sync::{PoisonError, RwLock};

use escrow_types::{EscrowEvent, LoanId};
use tracing::{info, warn};

/// Consumer of escrow notifications.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &EscrowEvent);
}

/// Append-only in-memory record of published notifications.
#[derive(Debug, Default)]
pub struct EventLog {
    events: RwLock<Vec<EscrowEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EscrowEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn events_for(&self, loan_id: &LoanId) -> Vec<EscrowEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.loan_id() == *loan_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for EventLog {
    fn publish(&self, event: &EscrowEvent) {
        info!(loan_id = %event.loan_id(), event = event.name(), "{}", event);
        // Appends are single pushes, so a poisoned log is still well formed.
        let mut events = self.events.write().unwrap_or_else(|poisoned| {
            warn!(loan_id = %event.loan_id(), "Event log lock poisoned; recovering");
            poisoned.into_inner()
        });
        events.push(event.clone());
    }
}
