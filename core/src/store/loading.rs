use crate::error::ActionError;

/// Progress of the latest call of one `(action, instance)` pair.
#[derive(Debug, Clone, Default)]
pub struct LoadingState {
    pub loading: bool,
    /// Error of the last failed call; cleared when a call succeeds.
    pub error: Option<ActionError>,
    pub aborted: bool,
}

impl LoadingState {
    pub(crate) fn started(loading: bool) -> Self {
        Self {
            loading,
            ..Self::default()
        }
    }

    pub(crate) fn failed(error: ActionError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    pub(crate) fn aborted() -> Self {
        Self {
            aborted: true,
            ..Self::default()
        }
    }

    pub fn is_idle(&self) -> bool {
        !self.loading
    }
}
