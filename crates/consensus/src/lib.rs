//! Consensus gate — quorum approval at agreement creation.
//!
//! The gate is consulted exactly once, during `create`, and never retried
//! automatically. With zero peers configured it approves unconditionally
//! (single-party deployment mode — an explicit, auditable escape hatch).
//! Otherwise every peer is asked for a vote concurrently and creation
//! proceeds iff approvals reach ⌈2/3 × peers⌉.
//!
//! Peer failures and timeouts count as "no" votes, never as errors: the
//! gate degrades toward rejection under partial peer unavailability rather
//! than stalling agreement creation.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use covenant_core::Agreement;

/// One peer that can vote on a proposed agreement.
///
/// Implementations must be non-blocking beyond their own timeout; a vote
/// that cannot be obtained is `false`.
#[async_trait]
pub trait ApprovalPeer: Send + Sync {
    async fn vote(&self, agreement: &Agreement) -> bool;
}

/// Expected JSON body of a peer's approval response.
#[derive(Debug, Deserialize)]
struct VoteResponse {
    approve: bool,
}

/// HTTP peer: POSTs the agreement as JSON, expects `{ "approve": bool }`.
pub struct HttpPeer {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpPeer {
    /// Build a peer with a per-request timeout. A single unresponsive peer
    /// can therefore delay creation by at most the timeout, not stall it.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            endpoint: endpoint.into(),
            client,
        }
    }
}

#[async_trait]
impl ApprovalPeer for HttpPeer {
    async fn vote(&self, agreement: &Agreement) -> bool {
        let result = self
            .client
            .post(&self.endpoint)
            .json(agreement)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                match response.json::<VoteResponse>().await {
                    Ok(body) => body.approve,
                    Err(e) => {
                        warn!(peer = %self.endpoint, error = %e, "Unparseable vote counted as no");
                        false
                    }
                }
            }
            Ok(response) => {
                warn!(peer = %self.endpoint, status = %response.status(), "Non-success vote counted as no");
                false
            }
            Err(e) => {
                warn!(peer = %self.endpoint, error = %e, "Unreachable peer counted as no");
                false
            }
        }
    }
}

/// The consensus gate.
pub struct ConsensusGate {
    peers: Vec<Box<dyn ApprovalPeer>>,
}

impl ConsensusGate {
    /// A gate with no peers: single-party mode, approves everything.
    pub fn single_party() -> Self {
        Self { peers: Vec::new() }
    }

    pub fn new(peers: Vec<Box<dyn ApprovalPeer>>) -> Self {
        Self { peers }
    }

    /// Build HTTP peers from configured endpoints.
    pub fn from_endpoints(endpoints: &[String], timeout: Duration) -> Self {
        let peers = endpoints
            .iter()
            .map(|e| Box::new(HttpPeer::new(e.clone(), timeout)) as Box<dyn ApprovalPeer>)
            .collect();
        Self { peers }
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Votes needed for approval: ⌈2/3 × peers⌉.
    pub fn quorum(&self) -> usize {
        quorum_for(self.peers.len())
    }

    /// Ask every peer for a vote and tally the quorum.
    ///
    /// Returns `(approved, approvals, needed)` so creation failures can
    /// report the tally.
    pub async fn approve(&self, agreement: &Agreement) -> (bool, usize, usize) {
        if self.peers.is_empty() {
            debug!(agreement = %agreement.id, "No consensus peers configured — auto-approving");
            return (true, 0, 0);
        }

        let votes = futures::future::join_all(
            self.peers.iter().map(|peer| peer.vote(agreement)),
        )
        .await;

        let approvals = votes.iter().filter(|v| **v).count();
        let needed = self.quorum();
        let approved = approvals >= needed;
        if approved {
            info!(
                agreement = %agreement.id,
                approvals,
                needed,
                peers = self.peers.len(),
                "Consensus reached"
            );
        } else {
            warn!(
                agreement = %agreement.id,
                approvals,
                needed,
                peers = self.peers.len(),
                "Consensus rejected"
            );
        }
        (approved, approvals, needed)
    }
}

/// ⌈2/3 × n⌉ without floating point.
fn quorum_for(peer_count: usize) -> usize {
    (2 * peer_count).div_ceil(3)
}
