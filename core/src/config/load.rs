use std::path::Path;

use anyhow::Context;

use super::types::StoreConfig;

/// Looked up in the current directory by [`load_default`].
pub const DEFAULT_CONFIG_FILE: &str = "statekeeper.toml";

impl StoreConfig {
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        toml::from_str::<StoreConfig>(s).context("Failed to parse store config")
    }

    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config from {:?}", path.as_ref()))?;
        Self::from_toml_str(&s)
    }
}

pub fn load_default() -> anyhow::Result<StoreConfig> {
    let local_config = Path::new(DEFAULT_CONFIG_FILE);

    let mut cfg = if local_config.exists() {
        StoreConfig::load(local_config)?
    } else {
        StoreConfig::default()
    };

    apply_overrides(&mut cfg, |key| std::env::var(key).ok())?;
    Ok(cfg)
}

/// Environment variable overrides (highest priority).
pub fn apply_overrides<F>(cfg: &mut StoreConfig, lookup: F) -> anyhow::Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = value("STATEKEEPER_RETRY_DELAY_MS") {
        cfg.retry.delay_ms = v
            .trim()
            .parse()
            .with_context(|| format!("STATEKEEPER_RETRY_DELAY_MS: invalid number {v:?}"))?;
    }
    if let Some(v) = value("STATEKEEPER_REUSE_RETRY_COUNT") {
        cfg.retry.reuse_retry_count = v
            .trim()
            .parse()
            .with_context(|| format!("STATEKEEPER_REUSE_RETRY_COUNT: invalid number {v:?}"))?;
    }
    if let Some(v) = value("STATEKEEPER_DEFAULT_POLICY") {
        cfg.conflict.default_policy = v.parse().map_err(anyhow::Error::msg)?;
    }
    if let Some(v) = value("STATEKEEPER_EVENTS_CAPACITY") {
        cfg.events.capacity = v
            .trim()
            .parse()
            .with_context(|| format!("STATEKEEPER_EVENTS_CAPACITY: invalid number {v:?}"))?;
    }

    Ok(())
}
