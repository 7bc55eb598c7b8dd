//! Agreement records — the governance contract between two parties.
//!
//! An agreement binds an automated task consumer and a task provider to a
//! set of terms (numeric quotas, an optional expiration override, free-form
//! policy parameters) and an ordered list of ethical policies that every
//! operation under the agreement must be checked against.
//!
//! The identifier is content-derived: a SHA-256 digest of the parties, the
//! canonicalized terms, and the creation timestamp. Identical inputs always
//! produce the same id.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::GovernanceError;

/// Default agreement lifetime when terms carry no override.
pub const DEFAULT_VALIDITY_DAYS: i64 = 30;

/// Term key that overrides the default expiration, in seconds from creation.
pub const EXPIRES_IN_SECS_TERM: &str = "expires_in_secs";

/// Prefix for per-metric limit terms (`max_calls` caps metric `calls`).
pub const LIMIT_TERM_PREFIX: &str = "max_";

/// Content-derived agreement identifier (hex SHA-256).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgreementId(String);

impl AgreementId {
    /// Derive the id from the agreement's identifying content.
    pub fn derive(
        consumer_id: &str,
        provider_id: &str,
        terms: &Terms,
        created_at: DateTime<Utc>,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(consumer_id.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(provider_id.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(terms.canonical_json().as_bytes());
        hasher.update(b"\x1f");
        hasher.update(created_at.to_rfc3339().as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Wrap an already-derived id (lookups, tests).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AgreementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The open key-value term map attached to an agreement.
///
/// Terms are immutable after creation. Numeric limits use the `max_<metric>`
/// convention; everything else is free-form policy parameterization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Terms(serde_json::Map<String, serde_json::Value>);

impl Terms {
    pub fn new(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(map)
    }

    /// Parse terms from an arbitrary JSON value.
    ///
    /// Anything that is not a JSON object is rejected: terms must be a
    /// key-value map.
    pub fn from_value(value: serde_json::Value) -> Result<Self, GovernanceError> {
        match value {
            serde_json::Value::Object(map) => Ok(Self(map)),
            serde_json::Value::Null => Ok(Self::default()),
            other => Err(GovernanceError::InvalidTerms(format!(
                "terms must be a key-value map, got {}",
                json_type_name(&other)
            ))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Declared limit for a metric, read from the `max_<metric>` term.
    /// `None` means unlimited.
    pub fn limit_for(&self, metric: &str) -> Option<f64> {
        self.0
            .get(&format!("{LIMIT_TERM_PREFIX}{metric}"))
            .and_then(|v| v.as_f64())
    }

    /// All declared `max_*` limits, keyed by metric name.
    pub fn limits(&self) -> std::collections::HashMap<String, f64> {
        self.0
            .iter()
            .filter_map(|(k, v)| {
                let metric = k.strip_prefix(LIMIT_TERM_PREFIX)?;
                Some((metric.to_string(), v.as_f64()?))
            })
            .collect()
    }

    /// Optional expiration override in seconds from creation.
    /// Non-numeric or non-positive values are ignored.
    pub fn expires_in_secs(&self) -> Option<i64> {
        self.0
            .get(EXPIRES_IN_SECS_TERM)
            .and_then(|v| v.as_i64())
            .filter(|secs| *secs > 0)
    }

    /// Deterministic JSON rendering used for id derivation.
    ///
    /// `serde_json::Map` preserves insertion order, so keys are sorted here
    /// to make the digest independent of how the caller assembled the map.
    fn canonical_json(&self) -> String {
        let mut keys: Vec<&String> = self.0.keys().collect();
        keys.sort();
        let ordered: Vec<String> = keys
            .into_iter()
            .map(|k| format!("{}:{}", k, self.0[k]))
            .collect();
        format!("{{{}}}", ordered.join(","))
    }
}

/// Request payload for creating an agreement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAgreement {
    pub consumer_id: String,
    pub provider_id: String,

    /// Open key-value term map. Accepts any JSON object.
    #[serde(default)]
    pub terms: serde_json::Value,

    /// Ordered set of policy names checked for every operation.
    #[serde(default)]
    pub ethical_policies: Vec<String>,
}

/// One governance contract between a task consumer and a task provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agreement {
    pub id: AgreementId,
    pub consumer_id: String,
    pub provider_id: String,
    pub terms: Terms,

    /// Ordered, deduplicated policy names. Superset of the engine's
    /// compulsory set (enforced at creation).
    pub ethical_policies: Vec<String>,

    /// Flipped to false at most once by deactivation; never back.
    pub active: bool,

    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Agreement {
    /// Build a new agreement record. The id is derived from the content;
    /// `expires_at` comes from the terms override or the 30-day default.
    pub fn new(
        consumer_id: impl Into<String>,
        provider_id: impl Into<String>,
        terms: Terms,
        ethical_policies: Vec<String>,
    ) -> Self {
        let consumer_id = consumer_id.into();
        let provider_id = provider_id.into();
        let created_at = Utc::now();
        let expires_at = match terms.expires_in_secs() {
            Some(secs) => created_at + Duration::seconds(secs),
            None => created_at + Duration::days(DEFAULT_VALIDITY_DAYS),
        };

        // Preserve first-occurrence order while dropping duplicates.
        let mut seen = std::collections::HashSet::new();
        let ethical_policies: Vec<String> = ethical_policies
            .into_iter()
            .filter(|p| seen.insert(p.clone()))
            .collect();

        let id = AgreementId::derive(&consumer_id, &provider_id, &terms, created_at);
        Self {
            id,
            consumer_id,
            provider_id,
            terms,
            ethical_policies,
            active: true,
            created_at,
            expires_at,
        }
    }

    /// An agreement is valid iff it is active and not yet expired.
    /// Always computed fresh, never cached.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.active && now < self.expires_at
    }

    /// Why the agreement is not valid right now, if it isn't.
    pub fn invalidity_reason(&self, now: DateTime<Utc>) -> Option<&'static str> {
        if !self.active {
            Some("deactivated")
        } else if now >= self.expires_at {
            Some("expired")
        } else {
            None
        }
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
