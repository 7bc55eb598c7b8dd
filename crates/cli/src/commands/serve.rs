//! `covenant serve` — wire the governance components and run the gateway.

use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use covenant_admission::{AdmissionController, ProcProbe, Thresholds, spawn_sampler};
use covenant_config::AppConfig;
use covenant_consensus::ConsensusGate;
use covenant_core::EventBus;
use covenant_meter::UsageMeter;
use covenant_policy::PolicyEngine;
use covenant_service::{GovernanceService, LoggingExecutor};
use covenant_store::AgreementStore;

pub async fn run(config_path: Option<PathBuf>, port_override: Option<u16>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(|| PathBuf::from("covenant.toml"));
    let mut config = AppConfig::load_with_overrides(&path)
        .with_context(|| format!("loading config from {}", path.display()))?;
    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    let service = build_service(&config);

    // The sampler runs for the life of the process; request handling never
    // waits on it.
    let sampler = spawn_sampler(
        service.admission().clone(),
        Arc::new(ProcProbe::new()),
        Duration::from_secs(config.admission.sample_interval_secs),
    );

    info!(
        peers = config.consensus.peers.len(),
        max_cpu = config.admission.max_cpu_percent,
        max_memory_mb = config.admission.max_memory_mb,
        "Covenant governance layer starting"
    );

    let result = covenant_gateway::serve(service, &config.gateway.host, config.gateway.port).await;
    sampler.abort();
    result.map_err(|e| anyhow::anyhow!(e.to_string()))
}

/// Construct the full governance stack from validated configuration.
pub fn build_service(config: &AppConfig) -> Arc<GovernanceService> {
    let events = Arc::new(EventBus::default());
    let store = Arc::new(AgreementStore::new());
    let policy = Arc::new(PolicyEngine::with_defaults(
        config.policies.content_denylist.clone(),
        config.policies.fair_use_max_quantity,
    ));
    let meter = Arc::new(UsageMeter::new(store.clone()));
    let consensus = Arc::new(ConsensusGate::from_endpoints(
        &config.consensus.peers,
        Duration::from_secs(config.consensus.timeout_secs),
    ));
    let admission = Arc::new(AdmissionController::new(
        Thresholds {
            max_cpu_percent: config.admission.max_cpu_percent,
            max_memory_mb: config.admission.max_memory_mb,
        },
        config.admission.window_samples,
        events.clone(),
    ));

    Arc::new(GovernanceService::new(
        store,
        policy,
        meter,
        consensus,
        admission,
        events,
        Arc::new(LoggingExecutor),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_service_from_default_config() {
        let config = AppConfig::default();
        let service = build_service(&config);
        assert!(service.store().is_empty());
        assert!(service.admission().has_available_resources());
    }
}
