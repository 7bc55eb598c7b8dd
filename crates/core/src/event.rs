//! Governance event system — decoupled notification of gating decisions.
//!
//! Events are published when the governance layer makes a decision worth
//! observing (agreement lifecycle, denials, resource alerts). External
//! observability collaborators subscribe; nothing inside the core reacts to
//! its own events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::agreement::AgreementId;

/// All governance events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GovernanceEvent {
    /// A new agreement passed consensus and the compulsory-policy check
    AgreementCreated {
        id: AgreementId,
        consumer_id: String,
        provider_id: String,
        timestamp: DateTime<Utc>,
    },

    /// An agreement was deactivated
    AgreementDeactivated {
        id: AgreementId,
        timestamp: DateTime<Utc>,
    },

    /// A usage increment was refused because it would exceed a quota
    QuotaDenied {
        id: AgreementId,
        metric: String,
        requested: f64,
        timestamp: DateTime<Utc>,
    },

    /// An operation's parameters violated an ethical policy
    PolicyDenied {
        id: AgreementId,
        policy: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Host resource usage crossed a configured threshold
    ResourceAlert {
        cpu_percent: f64,
        memory_mb: f64,
        timestamp: DateTime<Utc>,
    },

    /// A task passed the full gating pipeline and was handed to the executor
    TaskAdmitted {
        id: AgreementId,
        operation: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for governance events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub. Components can
/// subscribe to receive all events and filter for what they care about.
pub struct EventBus {
    sender: broadcast::Sender<Arc<GovernanceEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: GovernanceEvent) {
        // Ignore send errors (no subscribers = that's fine)
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<GovernanceEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
