use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::conflict::ConflictPolicy;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub conflict: ConflictConfig,

    #[serde(default)]
    pub events: EventsConfig,

    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Linear backoff seed: the n-th retry waits `delay_ms × n`.
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,

    /// Retry count implied by the reuse policy when an action sets none.
    #[serde(default = "default_reuse_retry_count")]
    pub reuse_retry_count: u32,
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_reuse_retry_count() -> u32 {
    3
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_retry_delay_ms(),
            reuse_retry_count: default_reuse_retry_count(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictConfig {
    /// Policy for asynchronous actions that do not declare one.
    #[serde(default = "default_policy")]
    pub default_policy: ConflictPolicy,

    /// Fallback of the reuse policy when arguments differ.
    #[serde(default = "default_reuse_fallback")]
    pub reuse_fallback: ConflictPolicy,
}

fn default_policy() -> ConflictPolicy {
    ConflictPolicy::KeepAll
}

fn default_reuse_fallback() -> ConflictPolicy {
    ConflictPolicy::KeepAll
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            default_policy: default_policy(),
            reuse_fallback: default_reuse_fallback(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Buffer of the store event channel; slow receivers lag, commits never block.
    #[serde(default = "default_events_capacity")]
    pub capacity: usize,
}

fn default_events_capacity() -> usize {
    256
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_events_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Warn when the optimistic effect log grows past this many entries.
    #[serde(default = "default_warn_threshold")]
    pub warn_threshold: usize,
}

fn default_warn_threshold() -> usize {
    1000
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            warn_threshold: default_warn_threshold(),
        }
    }
}
