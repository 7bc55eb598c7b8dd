//! Policy registry and evaluation.
//!
//! The engine evaluates named validators against an operation's parameters
//! and returns a [`Compliance`] verdict the governance pipeline must obey.

use covenant_core::GovernanceError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use tracing::{debug, warn};

/// The outcome of evaluating one policy against an operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Compliance {
    /// Whether the parameters comply with the policy.
    pub compliant: bool,
    /// Human-readable explanation, surfaced verbatim to the caller.
    pub reason: String,
}

impl Compliance {
    /// A passing verdict.
    pub fn pass() -> Self {
        Self {
            compliant: true,
            reason: String::new(),
        }
    }

    /// A rejecting verdict with the given reason.
    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            compliant: false,
            reason: reason.into(),
        }
    }
}

/// A named, pure validator mapping operation parameters to a verdict.
///
/// Implementations must be side-effect free: no network, no filesystem, no
/// mutable state. That keeps evaluation synchronous and deterministic.
pub trait PolicyValidator: Send + Sync {
    fn check(&self, params: &serde_json::Value) -> Compliance;
}

/// Adapter for using a plain function or closure as a validator.
pub struct FnValidator<F>(pub F);

impl<F> PolicyValidator for FnValidator<F>
where
    F: Fn(&serde_json::Value) -> Compliance + Send + Sync,
{
    fn check(&self, params: &serde_json::Value) -> Compliance {
        (self.0)(params)
    }
}

struct RegisteredPolicy {
    compulsory: bool,
    validator: Box<dyn PolicyValidator>,
}

/// The policy engine.
///
/// Thread-safe. Holds the validator registry; registration is append-only
/// (a name can be replaced but never removed), consistent with the
/// immutable-core philosophy of the agreement records it guards.
pub struct PolicyEngine {
    policies: RwLock<HashMap<String, RegisteredPolicy>>,
}

impl PolicyEngine {
    /// Create an empty engine with no validators.
    pub fn empty() -> Self {
        Self {
            policies: RwLock::new(HashMap::new()),
        }
    }

    /// Add or replace a named validator.
    pub fn register(
        &self,
        name: impl Into<String>,
        compulsory: bool,
        validator: Box<dyn PolicyValidator>,
    ) {
        let name = name.into();
        debug!(policy = %name, compulsory, "Policy registered");
        self.policies.write().unwrap().insert(
            name,
            RegisteredPolicy {
                compulsory,
                validator,
            },
        );
    }

    /// Names every agreement must reference to be creatable.
    pub fn compulsory_names(&self) -> HashSet<String> {
        self.policies
            .read()
            .unwrap()
            .iter()
            .filter(|(_, p)| p.compulsory)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// All registered policy names.
    pub fn names(&self) -> Vec<String> {
        self.policies.read().unwrap().keys().cloned().collect()
    }

    /// Evaluate one named policy against an operation's parameters.
    ///
    /// Fails closed: an unknown name is non-compliant with reason
    /// "policy not found", never an automatic pass.
    pub fn evaluate(&self, policy_name: &str, params: &serde_json::Value) -> Compliance {
        let policies = self.policies.read().unwrap();
        let Some(registered) = policies.get(policy_name) else {
            warn!(policy = %policy_name, "Evaluation requested for unregistered policy");
            return Compliance::reject("policy not found");
        };

        let verdict = registered.validator.check(params);
        if verdict.compliant {
            debug!(policy = %policy_name, "Policy passed");
        } else {
            warn!(policy = %policy_name, reason = %verdict.reason, "Policy violation");
        }
        verdict
    }

    /// Evaluate every named policy in order; the first violation wins.
    pub fn evaluate_all(
        &self,
        policy_names: &[String],
        params: &serde_json::Value,
    ) -> Result<(), GovernanceError> {
        for name in policy_names {
            let verdict = self.evaluate(name, params);
            if !verdict.compliant {
                return Err(GovernanceError::PolicyViolation {
                    policy: name.clone(),
                    reason: verdict.reason,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with(name: &str, compulsory: bool, compliant: bool) -> PolicyEngine {
        let engine = PolicyEngine::empty();
        let verdict = move |_: &serde_json::Value| {
            if compliant {
                Compliance::pass()
            } else {
                Compliance::reject("always rejects")
            }
        };
        engine.register(name, compulsory, Box::new(FnValidator(verdict)));
        engine
    }

    #[test]
    fn unknown_policy_fails_closed() {
        let engine = PolicyEngine::empty();
        let verdict = engine.evaluate("ghost", &serde_json::json!({}));
        assert!(!verdict.compliant);
        assert_eq!(verdict.reason, "policy not found");
    }

    #[test]
    fn registered_policy_evaluates() {
        let engine = engine_with("pass_all", false, true);
        assert!(engine.evaluate("pass_all", &serde_json::json!({})).compliant);

        let engine = engine_with("reject_all", false, false);
        let verdict = engine.evaluate("reject_all", &serde_json::json!({}));
        assert!(!verdict.compliant);
        assert_eq!(verdict.reason, "always rejects");
    }

    #[test]
    fn compulsory_names_only_lists_compulsory() {
        let engine = engine_with("must_have", true, true);
        engine.register(
            "optional",
            false,
            Box::new(FnValidator(|_: &serde_json::Value| Compliance::pass())),
        );

        let compulsory = engine.compulsory_names();
        assert!(compulsory.contains("must_have"));
        assert!(!compulsory.contains("optional"));
        assert_eq!(compulsory.len(), 1);
    }

    #[test]
    fn register_replaces_existing_name() {
        let engine = engine_with("flip", false, false);
        assert!(!engine.evaluate("flip", &serde_json::json!({})).compliant);

        engine.register(
            "flip",
            false,
            Box::new(FnValidator(|_: &serde_json::Value| Compliance::pass())),
        );
        assert!(engine.evaluate("flip", &serde_json::json!({})).compliant);
        assert_eq!(engine.names().len(), 1);
    }

    #[test]
    fn evaluate_all_reports_first_violation() {
        let engine = PolicyEngine::empty();
        engine.register(
            "first",
            false,
            Box::new(FnValidator(|_: &serde_json::Value| Compliance::pass())),
        );
        engine.register(
            "second",
            false,
            Box::new(FnValidator(|_: &serde_json::Value| Compliance::reject("nope"))),
        );

        let names = vec!["first".to_string(), "second".to_string()];
        let err = engine.evaluate_all(&names, &serde_json::json!({})).unwrap_err();
        match err {
            GovernanceError::PolicyViolation { policy, reason } => {
                assert_eq!(policy, "second");
                assert_eq!(reason, "nope");
            }
            other => panic!("expected PolicyViolation, got {other:?}"),
        }
    }

    #[test]
    fn evaluate_all_fails_closed_on_unknown_name() {
        let engine = PolicyEngine::empty();
        let names = vec!["missing".to_string()];
        let err = engine.evaluate_all(&names, &serde_json::json!({})).unwrap_err();
        assert!(matches!(err, GovernanceError::PolicyViolation { .. }));
    }

    #[test]
    fn evaluation_is_deterministic() {
        let engine = engine_with("stable", false, false);
        let params = serde_json::json!({"content": "whatever"});
        let first = engine.evaluate("stable", &params);
        for _ in 0..5 {
            let again = engine.evaluate("stable", &params);
            assert_eq!(again.compliant, first.compliant);
            assert_eq!(again.reason, first.reason);
        }
    }
}
