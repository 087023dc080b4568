//! Registry Notifications
//!
//! Events are produced by successful commands only, carry the values fixed at
//! command time, and are published on a broadcast channel. Publishing never
//! blocks and never waits for subscribers.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::registry::types::{Address, Severity};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RegistryEvent {
    AuditorRegistered {
        auditor: Address,
        name: String,
    },
    AuditSubmitted {
        report_id: u64,
        contract_address: Address,
        auditor: Address,
        security_score: u8,
    },
    FindingAdded {
        report_id: u64,
        finding_index: u64,
        severity: Severity,
        title: String,
    },
}

impl RegistryEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RegistryEvent::AuditorRegistered { .. } => "AuditorRegistered",
            RegistryEvent::AuditSubmitted { .. } => "AuditSubmitted",
            RegistryEvent::FindingAdded { .. } => "FindingAdded",
        }
    }
}

/// Fan-out of registry events to any number of subscribers
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RegistryEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.sender.subscribe()
    }

    /// Publish events in order; returns how many subscribers were listening
    pub fn publish(&self, events: &[RegistryEvent]) -> usize {
        let mut listeners = 0;
        for event in events {
            // No subscribers is not an error
            listeners = self.sender.send(event.clone()).unwrap_or(0);
            debug!(event = event.name(), listeners, "Published registry event");
        }
        listeners
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
