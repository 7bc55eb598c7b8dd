//! `covenant check-config` — load, validate, and summarize configuration.

use anyhow::Context;
use std::path::PathBuf;

use covenant_config::AppConfig;

pub fn run(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(|| PathBuf::from("covenant.toml"));
    let config = AppConfig::load_with_overrides(&path)
        .with_context(|| format!("loading config from {}", path.display()))?;

    println!("Configuration OK ({})", path.display());
    println!("  gateway:    {}:{}", config.gateway.host, config.gateway.port);
    println!(
        "  policies:   {} denylist terms, fair-use ceiling {}",
        config.policies.content_denylist.len(),
        config.policies.fair_use_max_quantity
    );
    if config.consensus.peers.is_empty() {
        println!("  consensus:  single-party mode (no peers — creation auto-approves)");
    } else {
        println!(
            "  consensus:  {} peers, {}s timeout",
            config.consensus.peers.len(),
            config.consensus.timeout_secs
        );
    }
    println!(
        "  admission:  cpu < {}%, memory < {} MB, sampling every {}s over {} samples",
        config.admission.max_cpu_percent,
        config.admission.max_memory_mb,
        config.admission.sample_interval_secs,
        config.admission.window_samples
    );

    Ok(())
}
