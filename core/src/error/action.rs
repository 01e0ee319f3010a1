use std::sync::Arc;

use thiserror::Error;

/// Failure of a single dispatched action.
///
/// Cloneable so that one settled call can be shared between every caller
/// holding its pending handle.
#[derive(Error, Debug, Clone)]
pub enum ActionError {
    #[error("action '{action}' is already running")]
    Conflict { action: String },

    #[error("action '{action}' was aborted")]
    Aborted { action: String },

    #[error("action '{action}' failed: {error}")]
    Call {
        action: String,
        error: Arc<anyhow::Error>,
    },

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("action '{action}' was dropped before it settled")]
    Dropped { action: String },

    #[error("action '{action}' needs a Tokio runtime to run")]
    NoRuntime { action: String },
}

impl ActionError {
    pub(crate) fn call(action: &str, error: anyhow::Error) -> Self {
        Self::Call {
            action: action.to_string(),
            error: Arc::new(error),
        }
    }

    /// Name of the action this error belongs to.
    pub fn action(&self) -> &str {
        match self {
            Self::Conflict { action }
            | Self::Aborted { action }
            | Self::Call { action, .. }
            | Self::Dropped { action }
            | Self::NoRuntime { action } => action,
            Self::UnknownAction(action) => action,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }

    /// The underlying error returned by the call function, if any.
    pub fn call_error(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Call { error, .. } => Some(error.as_ref()),
            _ => None,
        }
    }
}
