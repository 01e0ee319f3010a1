//! Store event feed for inspection tools.

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::history::EffectKind;

/// Published on the store's broadcast channel after each change.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    Committed {
        action: String,
        instance: String,
        kind: EffectKind,
        version: u64,
        timestamp: DateTime<Utc>,
    },
    LoadingChanged {
        action: String,
        instance: String,
        loading: bool,
        timestamp: DateTime<Utc>,
    },
    RolledBack {
        action: String,
        instance: String,
        /// Number of later effects re-applied on top of the restored snapshot.
        replayed: usize,
        version: u64,
        timestamp: DateTime<Utc>,
    },
    ActionFailed {
        action: String,
        instance: String,
        error: String,
        handled: bool,
        timestamp: DateTime<Utc>,
    },
    ActionAborted {
        action: String,
        instance: String,
        timestamp: DateTime<Utc>,
    },
    PropsChanged {
        version: u64,
        timestamp: DateTime<Utc>,
    },
}

impl StoreEvent {
    /// Action the event belongs to, if any.
    pub fn action(&self) -> Option<&str> {
        match self {
            Self::Committed { action, .. }
            | Self::LoadingChanged { action, .. }
            | Self::RolledBack { action, .. }
            | Self::ActionFailed { action, .. }
            | Self::ActionAborted { action, .. } => Some(action),
            Self::PropsChanged { .. } => None,
        }
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        serde_json::to_string(self).context("Failed to serialize store event")
    }
}
