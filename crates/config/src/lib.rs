//! Configuration loading, validation, and management for Covenant.
//!
//! Loads configuration from `covenant.toml` with environment variable
//! overrides. Validates all settings at startup; the governance components
//! receive the validated config by reference and never read ambient state.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `covenant.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP gateway settings
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Policy engine settings
    #[serde(default)]
    pub policies: PolicyConfig,

    /// Consensus gate settings
    #[serde(default)]
    pub consensus: ConsensusConfig,

    /// Resource admission settings
    #[serde(default)]
    pub admission: AdmissionConfig,

    /// Agreement lifecycle settings
    #[serde(default)]
    pub agreements: AgreementConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    47712
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Policy engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Terms rejected by the content-safety validator wherever they appear
    /// in an operation's string parameters (case-insensitive).
    #[serde(default = "default_denylist")]
    pub content_denylist: Vec<String>,

    /// Per-operation ceiling enforced by the fair-use validator on the
    /// declared `quantity` parameter.
    #[serde(default = "default_fair_use_ceiling")]
    pub fair_use_max_quantity: f64,

    /// Additional policy names to treat as compulsory beyond the built-in
    /// validators. Each needs a validator registered at startup.
    #[serde(default)]
    pub extra_compulsory: Vec<String>,
}

fn default_denylist() -> Vec<String> {
    [
        "harmful", "weapon", "exploit", "malware", "attack", "destroy", "illegal",
    ]
    .map(String::from)
    .to_vec()
}

fn default_fair_use_ceiling() -> f64 {
    1000.0
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            content_denylist: default_denylist(),
            fair_use_max_quantity: default_fair_use_ceiling(),
            extra_compulsory: vec![],
        }
    }
}

/// Consensus gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Peer approval endpoints. Empty = single-party mode (auto-approve).
    #[serde(default)]
    pub peers: Vec<String>,

    /// Per-peer query timeout. A timed-out peer counts as a "no" vote.
    #[serde(default = "default_consensus_timeout")]
    pub timeout_secs: u64,
}

fn default_consensus_timeout() -> u64 {
    3
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            peers: vec![],
            timeout_secs: default_consensus_timeout(),
        }
    }
}

/// Resource admission configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// New work is refused while process CPU is at or above this percentage.
    #[serde(default = "default_max_cpu")]
    pub max_cpu_percent: f64,

    /// New work is refused while process RSS is at or above this many MB.
    #[serde(default = "default_max_memory")]
    pub max_memory_mb: f64,

    /// Fixed sampling interval for the resource probe.
    #[serde(default = "default_sample_interval")]
    pub sample_interval_secs: u64,

    /// Rolling history capacity (oldest sample evicted on overflow).
    #[serde(default = "default_window")]
    pub window_samples: usize,
}

fn default_max_cpu() -> f64 {
    85.0
}
fn default_max_memory() -> f64 {
    1024.0
}
fn default_sample_interval() -> u64 {
    5
}
fn default_window() -> usize {
    12
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_cpu_percent: default_max_cpu(),
            max_memory_mb: default_max_memory(),
            sample_interval_secs: default_sample_interval(),
            window_samples: default_window(),
        }
    }
}

/// Agreement lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgreementConfig {
    /// Default validity period when terms carry no `expires_in_secs`.
    #[serde(default = "default_validity_days")]
    pub default_validity_days: u32,
}

fn default_validity_days() -> u32 {
    30
}

impl Default for AgreementConfig {
    fn default() -> Self {
        Self {
            default_validity_days: default_validity_days(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (`./covenant.toml`).
    ///
    /// Environment overrides applied after file loading:
    /// - `COVENANT_HOST`, `COVENANT_PORT`
    /// - `COVENANT_PEERS` (comma-separated endpoint list)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_overrides(Path::new("covenant.toml"))
    }

    /// Load from a specific file path, then apply environment overrides.
    pub fn load_with_overrides(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;

        if let Ok(host) = std::env::var("COVENANT_HOST") {
            config.gateway.host = host;
        }
        if let Ok(port) = std::env::var("COVENANT_PORT") {
            config.gateway.port = port.parse().map_err(|_| {
                ConfigError::ValidationError(format!("COVENANT_PORT is not a port number: {port}"))
            })?;
        }
        if let Ok(peers) = std::env::var("COVENANT_PEERS") {
            config.consensus.peers = peers
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.admission.max_cpu_percent <= 0.0 || self.admission.max_cpu_percent > 100.0 {
            return Err(ConfigError::ValidationError(
                "admission.max_cpu_percent must be in (0, 100]".into(),
            ));
        }
        if self.admission.max_memory_mb <= 0.0 {
            return Err(ConfigError::ValidationError(
                "admission.max_memory_mb must be positive".into(),
            ));
        }
        if self.admission.window_samples == 0 {
            return Err(ConfigError::ValidationError(
                "admission.window_samples must be at least 1".into(),
            ));
        }
        if self.admission.sample_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "admission.sample_interval_secs must be at least 1".into(),
            ));
        }
        if self.policies.fair_use_max_quantity <= 0.0 {
            return Err(ConfigError::ValidationError(
                "policies.fair_use_max_quantity must be positive".into(),
            ));
        }
        for peer in &self.consensus.peers {
            if !peer.starts_with("http://") && !peer.starts_with("https://") {
                return Err(ConfigError::ValidationError(format!(
                    "consensus peer is not an http(s) endpoint: {peer}"
                )));
            }
        }
        Ok(())
    }

    /// Generate a default config TOML string (for documentation and setup).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gateway.port, 47712);
        assert!(config.consensus.peers.is_empty());
        assert_eq!(config.policies.fair_use_max_quantity, 1000.0);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.gateway.port, config.gateway.port);
        assert_eq!(parsed.admission.max_cpu_percent, config.admission.max_cpu_percent);
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/covenant.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().gateway.port, 47712);
    }

    #[test]
    fn invalid_cpu_threshold_rejected() {
        let mut config = AppConfig::default();
        config.admission.max_cpu_percent = 0.0;
        assert!(config.validate().is_err());

        config.admission.max_cpu_percent = 150.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_window_rejected() {
        let mut config = AppConfig::default();
        config.admission.window_samples = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_http_peer_rejected() {
        let mut config = AppConfig::default();
        config.consensus.peers = vec!["not-a-url".into()];
        assert!(config.validate().is_err());

        config.consensus.peers = vec!["https://peer.example.com/approve".into()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("covenant.toml");
        std::fs::write(
            &path,
            r#"
[gateway]
port = 9000

[policies]
content_denylist = ["forbidden"]
fair_use_max_quantity = 50.0

[consensus]
peers = ["http://peer-a:9000/vote", "http://peer-b:9000/vote"]
timeout_secs = 2

[admission]
max_cpu_percent = 27.0
max_memory_mb = 256.0
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.gateway.port, 9000);
        assert_eq!(config.policies.content_denylist, vec!["forbidden"]);
        assert_eq!(config.policies.fair_use_max_quantity, 50.0);
        assert_eq!(config.consensus.peers.len(), 2);
        assert_eq!(config.admission.max_cpu_percent, 27.0);
        // Unspecified fields keep their defaults
        assert_eq!(config.admission.window_samples, 12);
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("max_cpu_percent"));
        assert!(toml_str.contains("47712"));
    }
}
