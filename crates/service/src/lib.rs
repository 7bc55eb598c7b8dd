//! Governance service — the facade the transport layer calls.
//!
//! Composes the agreement store, policy engine, usage meter, consensus
//! gate, and admission controller into the five external operations, plus
//! the full task-gating pipeline:
//!
//! ```text
//! request ──▶ admission ──▶ agreement ──▶ policy ──▶ usage ──▶ executor
//!             controller    store         engine     meter
//!             (503-style    (not found /  (policy    (quota
//!              refusal)      invalid)      violation) exceeded)
//! ```
//!
//! Every refusal is a typed [`GovernanceError`]; the task executor is a
//! black box invoked only after all four gates admit the operation.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use covenant_admission::{AdmissionController, AdmissionStatus};
use covenant_consensus::ConsensusGate;
use covenant_core::{
    Agreement, AgreementId, CreateAgreement, EventBus, GovernanceError, GovernanceEvent, Result,
};
use covenant_meter::UsageMeter;
use covenant_policy::{Compliance, PolicyEngine};
use covenant_store::{AgreementStatus, AgreementStore};

/// Metric charged once per admitted task.
pub const CALLS_METRIC: &str = "calls";

/// What the executor reports back for an admitted task.
///
/// Execution failures are the executor's own business; they never map
/// into the governance error taxonomy, which only describes refusals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: serde_json::Value,
}

/// The black-box task executor. Invoked only after admission succeeds;
/// everything before it is this crate's concern, everything after is not.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(
        &self,
        agreement_id: &AgreementId,
        operation: &str,
        params: &serde_json::Value,
    ) -> ExecutionResult;
}

/// Default executor for deployments that wire the real one externally:
/// acknowledges the admitted task and echoes what was admitted.
pub struct LoggingExecutor;

#[async_trait]
impl TaskExecutor for LoggingExecutor {
    async fn execute(
        &self,
        agreement_id: &AgreementId,
        operation: &str,
        _params: &serde_json::Value,
    ) -> ExecutionResult {
        info!(agreement = %agreement_id, operation, "Task admitted (no executor wired)");
        ExecutionResult {
            success: true,
            output: serde_json::json!({ "admitted": true, "operation": operation }),
        }
    }
}

/// Combined verification report for one agreement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgreementReport {
    pub id: AgreementId,
    pub valid: bool,
    pub ethical_status: bool,
    pub active: bool,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub usage_current: HashMap<String, f64>,
    pub usage_limits: HashMap<String, f64>,
}

/// Result of a fully admitted and executed task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub agreement_id: AgreementId,
    pub operation: String,
    pub success: bool,
    pub output: serde_json::Value,
    pub calls_used: f64,
}

/// The governance facade.
pub struct GovernanceService {
    store: Arc<AgreementStore>,
    policy: Arc<PolicyEngine>,
    meter: Arc<UsageMeter>,
    consensus: Arc<ConsensusGate>,
    admission: Arc<AdmissionController>,
    events: Arc<EventBus>,
    executor: Arc<dyn TaskExecutor>,
}

impl GovernanceService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<AgreementStore>,
        policy: Arc<PolicyEngine>,
        meter: Arc<UsageMeter>,
        consensus: Arc<ConsensusGate>,
        admission: Arc<AdmissionController>,
        events: Arc<EventBus>,
        executor: Arc<dyn TaskExecutor>,
    ) -> Self {
        Self {
            store,
            policy,
            meter,
            consensus,
            admission,
            events,
            executor,
        }
    }

    pub fn store(&self) -> &Arc<AgreementStore> {
        &self.store
    }

    pub fn policy(&self) -> &Arc<PolicyEngine> {
        &self.policy
    }

    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    // ── The five external operations ──────────────────────────────────

    /// Create an agreement. Local validation (terms shape, compulsory
    /// policy coverage) runs first, then the consensus gate votes on the
    /// prepared record, and only an approved record is committed; it is
    /// never visible before quorum.
    pub async fn create_agreement(&self, request: CreateAgreement) -> Result<Agreement> {
        let prepared = self
            .store
            .prepare(request, &self.policy.compulsory_names())?;

        let (approved, approvals, needed) = self.consensus.approve(&prepared).await;
        if !approved {
            return Err(GovernanceError::ConsensusRejected { approvals, needed });
        }

        let agreement = self.store.commit(prepared);

        self.events.publish(GovernanceEvent::AgreementCreated {
            id: agreement.id.clone(),
            consumer_id: agreement.consumer_id.clone(),
            provider_id: agreement.provider_id.clone(),
            timestamp: Utc::now(),
        });
        Ok(agreement)
    }

    /// Verify an agreement: store status plus current usage and declared
    /// limits, assembled into one report.
    pub fn verify_agreement(&self, id: &AgreementId) -> Result<AgreementReport> {
        let status: AgreementStatus = self.store.verify(id)?;
        let usage_limits = self.meter.limits_for(id)?;
        Ok(AgreementReport {
            id: id.clone(),
            valid: status.valid,
            ethical_status: status.ethical_status,
            active: status.active,
            expires_at: status.expires_at,
            usage_current: self.meter.usage_snapshot(id),
            usage_limits,
        })
    }

    /// Evaluate one named policy against operation parameters.
    ///
    /// Returns the verdict as data: non-compliance here is an answer, not
    /// an error. Unknown agreements are `NotFound`; unknown policies fail
    /// closed inside the engine.
    pub fn evaluate_compliance(
        &self,
        id: &AgreementId,
        policy_name: &str,
        params: &serde_json::Value,
    ) -> Result<Compliance> {
        // Existence check only: evaluation is deterministic and must not
        // depend on expiry racing the call.
        self.store.get(id)?;
        Ok(self.policy.evaluate(policy_name, params))
    }

    /// Record usage against an agreement's quota.
    pub fn record_usage(&self, id: &AgreementId, metric: &str, quantity: f64) -> Result<f64> {
        match self.meter.record_usage(id, metric, quantity) {
            Ok(total) => Ok(total),
            Err(err) => {
                if matches!(err, GovernanceError::QuotaExceeded { .. }) {
                    self.events.publish(GovernanceEvent::QuotaDenied {
                        id: id.clone(),
                        metric: metric.into(),
                        requested: quantity,
                        timestamp: Utc::now(),
                    });
                }
                Err(err)
            }
        }
    }

    /// Current admission status (the transport's pre-flight check).
    pub fn admission_check(&self) -> AdmissionStatus {
        self.admission.status()
    }

    // ── Lifecycle and pipeline ────────────────────────────────────────

    /// Deactivate an agreement (idempotent).
    pub fn deactivate_agreement(&self, id: &AgreementId) -> Result<()> {
        self.store.deactivate(id)?;
        self.events.publish(GovernanceEvent::AgreementDeactivated {
            id: id.clone(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// The full gating pipeline for one proposed task.
    ///
    /// Order is fixed: admission → agreement validity → every policy the
    /// agreement names → usage meter (one call) → executor. The first gate
    /// to refuse wins and nothing after it runs.
    pub async fn submit_task(
        &self,
        id: &AgreementId,
        operation: &str,
        params: &serde_json::Value,
    ) -> Result<TaskOutcome> {
        if !self.admission.has_available_resources() {
            return Err(GovernanceError::ResourceUnavailable {
                reason: "host resource usage over configured thresholds".into(),
            });
        }

        let agreement = self.store.ensure_valid(id)?;

        if let Err(err) = self.policy.evaluate_all(&agreement.ethical_policies, params) {
            if let GovernanceError::PolicyViolation { policy, reason } = &err {
                self.events.publish(GovernanceEvent::PolicyDenied {
                    id: id.clone(),
                    policy: policy.clone(),
                    reason: reason.clone(),
                    timestamp: Utc::now(),
                });
            }
            return Err(err);
        }

        let calls_used = self.record_usage(id, CALLS_METRIC, 1.0)?;

        debug!(agreement = %id, operation, "Task passed all gates");
        self.events.publish(GovernanceEvent::TaskAdmitted {
            id: id.clone(),
            operation: operation.into(),
            timestamp: Utc::now(),
        });

        let result = self.executor.execute(id, operation, params).await;

        Ok(TaskOutcome {
            agreement_id: id.clone(),
            operation: operation.into(),
            success: result.success,
            output: result.output,
            calls_used,
        })
    }
}
