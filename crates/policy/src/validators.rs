//! Baseline validators — content safety and fair use.
//!
//! Both are pure functions over the operation's parameter set: no side
//! effects, no network access, bounded evaluation time.

use crate::engine::{Compliance, PolicyEngine, PolicyValidator};

/// Parameter inspected by the fair-use validator.
pub const QUANTITY_PARAM: &str = "quantity";

/// Rejects parameter payloads containing any denylisted term.
///
/// Every string value in the payload is scanned, recursively through nested
/// objects and arrays, case-insensitively. Keys are not scanned; only
/// values carry caller-supplied content.
pub struct ContentSafetyValidator {
    denylist: Vec<String>,
}

impl ContentSafetyValidator {
    pub fn new(denylist: Vec<String>) -> Self {
        let denylist = denylist
            .into_iter()
            .map(|term| term.to_lowercase())
            .filter(|term| !term.is_empty())
            .collect();
        Self { denylist }
    }

    /// Find the first denylisted term anywhere in the value tree.
    fn scan(&self, value: &serde_json::Value) -> Option<&str> {
        match value {
            serde_json::Value::String(s) => {
                let lowered = s.to_lowercase();
                self.denylist
                    .iter()
                    .find(|term| lowered.contains(term.as_str()))
                    .map(String::as_str)
            }
            serde_json::Value::Array(items) => items.iter().find_map(|v| self.scan(v)),
            serde_json::Value::Object(map) => map.values().find_map(|v| self.scan(v)),
            _ => None,
        }
    }
}

impl PolicyValidator for ContentSafetyValidator {
    fn check(&self, params: &serde_json::Value) -> Compliance {
        match self.scan(params) {
            Some(term) => Compliance::reject(format!(
                "parameters contain denylisted term '{term}'"
            )),
            None => Compliance::pass(),
        }
    }
}

/// Rejects a single operation whose declared `quantity` exceeds a ceiling.
///
/// This bounds what any one operation can claim regardless of remaining
/// quota; cumulative consumption is the usage meter's concern.
pub struct FairUseValidator {
    max_quantity: f64,
}

impl FairUseValidator {
    pub fn new(max_quantity: f64) -> Self {
        Self { max_quantity }
    }
}

impl PolicyValidator for FairUseValidator {
    fn check(&self, params: &serde_json::Value) -> Compliance {
        let Some(quantity) = params.get(QUANTITY_PARAM).and_then(|v| v.as_f64()) else {
            // No declared quantity means nothing for fair-use to bound.
            return Compliance::pass();
        };

        if !quantity.is_finite() || quantity < 0.0 {
            return Compliance::reject(format!(
                "declared quantity {quantity} is not a non-negative number"
            ));
        }
        if quantity > self.max_quantity {
            return Compliance::reject(format!(
                "declared quantity {quantity} exceeds fair-use ceiling {}",
                self.max_quantity
            ));
        }
        Compliance::pass()
    }
}

/// Names of the built-in compulsory policies.
pub const CONTENT_SAFETY: &str = "content_safety";
pub const FAIR_USE: &str = "fair_use";

impl PolicyEngine {
    /// An engine pre-loaded with the two baseline validators, both
    /// compulsory: `content_safety` and `fair_use`.
    pub fn with_defaults(denylist: Vec<String>, fair_use_ceiling: f64) -> Self {
        let engine = Self::empty();
        engine.register(
            CONTENT_SAFETY,
            true,
            Box::new(ContentSafetyValidator::new(denylist)),
        );
        engine.register(FAIR_USE, true, Box::new(FairUseValidator::new(fair_use_ceiling)));
        engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn safety() -> ContentSafetyValidator {
        ContentSafetyValidator::new(vec!["harmful".into(), "weapon".into()])
    }

    #[test]
    fn content_safety_rejects_denylisted_term() {
        let verdict = safety().check(&serde_json::json!({"content": "a harmful plan"}));
        assert!(!verdict.compliant);
        assert!(verdict.reason.contains("harmful"));
    }

    #[test]
    fn content_safety_is_case_insensitive() {
        let verdict = safety().check(&serde_json::json!({"content": "build a WEAPON"}));
        assert!(!verdict.compliant);
    }

    #[test]
    fn content_safety_scans_nested_values() {
        let verdict = safety().check(&serde_json::json!({
            "task": {"steps": ["benign", {"detail": "harmful payload"}]}
        }));
        assert!(!verdict.compliant);
    }

    #[test]
    fn content_safety_passes_clean_params() {
        let verdict = safety().check(&serde_json::json!({
            "content": "summarize the quarterly report",
            "quantity": 3
        }));
        assert!(verdict.compliant);
    }

    #[test]
    fn content_safety_ignores_keys() {
        // Keys are schema, not caller content.
        let verdict = safety().check(&serde_json::json!({"harmful": "fine value"}));
        assert!(verdict.compliant);
    }

    #[test]
    fn fair_use_enforces_ceiling() {
        let validator = FairUseValidator::new(1000.0);
        assert!(validator.check(&serde_json::json!({"quantity": 1000})).compliant);
        let verdict = validator.check(&serde_json::json!({"quantity": 1001}));
        assert!(!verdict.compliant);
        assert!(verdict.reason.contains("1000"));
    }

    #[test]
    fn fair_use_passes_when_no_quantity_declared() {
        let validator = FairUseValidator::new(1000.0);
        assert!(validator.check(&serde_json::json!({"content": "x"})).compliant);
    }

    #[test]
    fn fair_use_rejects_negative_quantity() {
        let validator = FairUseValidator::new(1000.0);
        assert!(!validator.check(&serde_json::json!({"quantity": -5})).compliant);
    }

    #[test]
    fn default_engine_has_both_compulsory_policies() {
        let engine = PolicyEngine::with_defaults(vec!["harmful".into()], 1000.0);
        let compulsory = engine.compulsory_names();
        assert!(compulsory.contains(CONTENT_SAFETY));
        assert!(compulsory.contains(FAIR_USE));

        let verdict = engine.evaluate(CONTENT_SAFETY, &serde_json::json!({"content": "harmful plan"}));
        assert!(!verdict.compliant);
    }
}
