//! Usage metering — per-agreement, per-metric quota enforcement.
//!
//! Each agreement owns a ledger mapping metric names to cumulative
//! consumption. `record_usage` re-verifies the agreement, reads the
//! declared limit from its terms, and performs the check-then-increment as
//! one atomic unit under a per-agreement mutex: no caller ever observes a
//! torn state between the check and the write, and agreements never
//! contend with each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, warn};

use covenant_core::{AgreementId, GovernanceError, Result};
use covenant_store::AgreementStore;

type Ledger = HashMap<String, f64>;

/// The usage meter.
///
/// The outer lock only guards the map of ledgers (insertion of a ledger the
/// first time an agreement is metered); quota checks run under the
/// individual agreement's mutex so the lock granularity is per-ledger, not
/// global.
pub struct UsageMeter {
    store: Arc<AgreementStore>,
    ledgers: RwLock<HashMap<AgreementId, Arc<Mutex<Ledger>>>>,
}

impl UsageMeter {
    pub fn new(store: Arc<AgreementStore>) -> Self {
        Self {
            store,
            ledgers: RwLock::new(HashMap::new()),
        }
    }

    /// Record consumption of `quantity` units of `metric`.
    ///
    /// Returns the new cumulative total on success. Fails with
    /// `AgreementInvalid`/`NotFound` when the agreement cannot be used,
    /// `InvalidQuantity` for non-finite or negative quantities, and
    /// `QuotaExceeded` when the increment would cross the declared
    /// `max_<metric>` limit, in which case the ledger is unchanged.
    pub fn record_usage(&self, id: &AgreementId, metric: &str, quantity: f64) -> Result<f64> {
        // (a) re-verify the agreement is valid
        let agreement = self.store.ensure_valid(id)?;

        // (b) guard the quantity itself; a negative increment would let a
        // caller drain its own ledger
        if !quantity.is_finite() || quantity < 0.0 {
            return Err(GovernanceError::InvalidQuantity {
                metric: metric.into(),
            });
        }

        let limit = agreement.terms.limit_for(metric);
        let ledger = self.ledger_for(id);

        // (c) + (d) as one atomic unit
        let mut entries = ledger.lock().unwrap();
        let current = entries.get(metric).copied().unwrap_or(0.0);
        if let Some(limit) = limit {
            if current + quantity > limit {
                warn!(
                    agreement = %id,
                    metric,
                    current,
                    requested = quantity,
                    limit,
                    "Usage increment refused: quota exceeded"
                );
                return Err(GovernanceError::QuotaExceeded {
                    metric: metric.into(),
                });
            }
        }

        let total = current + quantity;
        entries.insert(metric.to_string(), total);
        debug!(agreement = %id, metric, total, "Usage recorded");
        Ok(total)
    }

    /// Current consumption per metric. Empty for agreements never metered.
    pub fn usage_snapshot(&self, id: &AgreementId) -> HashMap<String, f64> {
        let ledgers = self.ledgers.read().unwrap();
        match ledgers.get(id) {
            Some(ledger) => ledger.lock().unwrap().clone(),
            None => HashMap::new(),
        }
    }

    /// Declared limits from the agreement's terms, for reporting.
    pub fn limits_for(&self, id: &AgreementId) -> Result<HashMap<String, f64>> {
        Ok(self.store.get(id)?.terms.limits())
    }

    fn ledger_for(&self, id: &AgreementId) -> Arc<Mutex<Ledger>> {
        if let Some(ledger) = self.ledgers.read().unwrap().get(id) {
            return ledger.clone();
        }
        let mut ledgers = self.ledgers.write().unwrap();
        ledgers
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(HashMap::new())))
            .clone()
    }
}
