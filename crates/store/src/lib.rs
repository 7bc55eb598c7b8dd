//! In-memory agreement records — create, verify, deactivate.
//!
//! Records are retained for audit: deactivation flips the `active` flag but
//! never deletes, and nothing mutates a record after deactivation. Validity
//! is computed fresh on every read from `active` and `expires_at`.
//!
//! Creation splits into [`AgreementStore::prepare`] (validate and build)
//! and [`AgreementStore::commit`] (insert) so the service layer can run the
//! consensus gate in between — a record is never visible without quorum
//! approval.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use tracing::{debug, info};

use covenant_core::{Agreement, AgreementId, CreateAgreement, GovernanceError, Result, Terms};

/// Fresh verification status for one agreement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgreementStatus {
    /// `active && now < expires_at`, computed at call time.
    pub valid: bool,
    /// True iff the agreement names at least one ethical policy.
    ///
    /// This only says the agreement is ethically scoped; whether a specific
    /// operation complies is the policy engine's verdict, evaluated
    /// separately.
    pub ethical_status: bool,
    pub active: bool,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// The agreement store.
///
/// Thread-safe via `RwLock`: verifications proceed concurrently; creates
/// and deactivations are mutually exclusive writes.
pub struct AgreementStore {
    records: RwLock<HashMap<AgreementId, Agreement>>,
}

impl AgreementStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Validate a creation request and build the record without inserting
    /// it. The service layer runs the consensus gate on the prepared record
    /// and only then calls [`commit`](Self::commit), so peers vote on
    /// exactly the record that becomes visible.
    ///
    /// Fails with `InvalidTerms` when the terms are not a key-value map or
    /// a party id is empty, and with `MissingCompulsoryPolicy` when any
    /// compulsory name is absent from the request's policy list.
    pub fn prepare(
        &self,
        request: CreateAgreement,
        compulsory: &HashSet<String>,
    ) -> Result<Agreement> {
        if request.consumer_id.trim().is_empty() || request.provider_id.trim().is_empty() {
            return Err(GovernanceError::InvalidTerms(
                "consumer_id and provider_id must be non-empty".into(),
            ));
        }

        let terms = Terms::from_value(request.terms)?;

        let named: HashSet<&str> = request
            .ethical_policies
            .iter()
            .map(String::as_str)
            .collect();
        // Report the lexicographically first missing policy so the error
        // is deterministic regardless of set iteration order.
        let mut missing: Vec<&String> = compulsory
            .iter()
            .filter(|name| !named.contains(name.as_str()))
            .collect();
        missing.sort();
        if let Some(policy) = missing.first() {
            return Err(GovernanceError::MissingCompulsoryPolicy {
                policy: (*policy).clone(),
            });
        }

        Ok(Agreement::new(
            request.consumer_id,
            request.provider_id,
            terms,
            request.ethical_policies,
        ))
    }

    /// Insert a prepared record atomically; it is immediately visible to
    /// verification.
    pub fn commit(&self, agreement: Agreement) -> Agreement {
        let mut records = self.records.write().unwrap();
        let inserted = agreement.clone();
        records.insert(agreement.id.clone(), agreement);
        info!(
            agreement = %inserted.id,
            consumer = %inserted.consumer_id,
            provider = %inserted.provider_id,
            expires_at = %inserted.expires_at,
            "Agreement created"
        );
        inserted
    }

    /// Validate, build, and insert in one step: the single-party path
    /// where no consensus gate sits between preparation and commit.
    pub fn create(
        &self,
        request: CreateAgreement,
        compulsory: &HashSet<String>,
    ) -> Result<Agreement> {
        let agreement = self.prepare(request, compulsory)?;
        Ok(self.commit(agreement))
    }

    /// Fresh verification status. `NotFound` for unknown ids.
    pub fn verify(&self, id: &AgreementId) -> Result<AgreementStatus> {
        let records = self.records.read().unwrap();
        let agreement = records
            .get(id)
            .ok_or_else(|| GovernanceError::NotFound(id.clone()))?;

        Ok(AgreementStatus {
            valid: agreement.is_valid(Utc::now()),
            ethical_status: !agreement.ethical_policies.is_empty(),
            active: agreement.active,
            expires_at: agreement.expires_at,
        })
    }

    /// Get a copy of the full record.
    pub fn get(&self, id: &AgreementId) -> Result<Agreement> {
        self.records
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| GovernanceError::NotFound(id.clone()))
    }

    /// Return the record if it is currently valid, else the typed failure.
    pub fn ensure_valid(&self, id: &AgreementId) -> Result<Agreement> {
        let agreement = self.get(id)?;
        match agreement.invalidity_reason(Utc::now()) {
            None => Ok(agreement),
            Some(reason) => Err(GovernanceError::AgreementInvalid {
                id: id.clone(),
                reason: reason.into(),
            }),
        }
    }

    /// Deactivate an agreement. Idempotent: deactivating an already
    /// inactive record is a no-op success. `NotFound` for unknown ids.
    pub fn deactivate(&self, id: &AgreementId) -> Result<()> {
        let mut records = self.records.write().unwrap();
        let agreement = records
            .get_mut(id)
            .ok_or_else(|| GovernanceError::NotFound(id.clone()))?;

        if agreement.active {
            agreement.active = false;
            info!(agreement = %id, "Agreement deactivated");
        } else {
            debug!(agreement = %id, "Deactivation of already-inactive agreement (no-op)");
        }
        Ok(())
    }

    /// Number of stored records, active or not (nothing is ever deleted).
    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().unwrap().is_empty()
    }

    /// All stored agreement ids, for reporting.
    pub fn ids(&self) -> Vec<AgreementId> {
        self.records.read().unwrap().keys().cloned().collect()
    }
}

impl Default for AgreementStore {
    fn default() -> Self {
        Self::new()
    }
}
