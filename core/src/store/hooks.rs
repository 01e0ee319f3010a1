use std::sync::Arc;

use crate::action::{ArgsOf, Model, StateOf};
use crate::error::ActionError;
use crate::executor::RetryablePredicate;

use super::Store;

pub type Listener<M> = Arc<dyn Fn(&Arc<StateOf<M>>) + Send + Sync>;
pub type NoticeHook = Arc<dyn Fn(&Notice) + Send + Sync>;
pub type FailureHook<M> = Arc<dyn Fn(&FailureReport<M>) + Send + Sync>;
pub type LifecycleHook<M> = Arc<dyn Fn(&Store<M>) + Send + Sync>;

/// Message produced by an action's success or error mapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub action: String,
    pub instance: String,
    pub message: String,
}

/// Context handed to the failure hook.
pub struct FailureReport<M: Model> {
    pub action: String,
    pub instance: String,
    pub args: ArgsOf<M>,
    /// State at the moment the call failed, before any rollback.
    pub state: Arc<StateOf<M>>,
    pub error: ActionError,
    /// Whether the action declares an error effect or error message.
    pub handled: bool,
}

pub(crate) struct Hooks<M: Model> {
    pub retryable: RetryablePredicate,
    pub on_success: Option<NoticeHook>,
    pub on_error: Option<NoticeHook>,
    pub on_unhandled_error: Option<FailureHook<M>>,
    pub on_mount: Option<LifecycleHook<M>>,
    pub on_unmount: Option<LifecycleHook<M>>,
}

impl<M: Model> Default for Hooks<M> {
    fn default() -> Self {
        Self {
            retryable: Arc::new(|_| true),
            on_success: None,
            on_error: None,
            on_unhandled_error: None,
            on_mount: None,
            on_unmount: None,
        }
    }
}

/// Registered state listeners, in subscription order.
pub(crate) struct Listeners<M: Model> {
    next_id: u64,
    entries: Vec<(u64, Listener<M>)>,
}

impl<M: Model> Default for Listeners<M> {
    fn default() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }
}

impl<M: Model> Listeners<M> {
    pub fn add(&mut self, listener: Listener<M>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push((id, listener));
        id
    }

    pub fn remove(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    /// Copies the listeners out so none runs under the registry lock.
    pub fn snapshot(&self) -> Vec<Listener<M>> {
        self.entries.iter().map(|(_, l)| Arc::clone(l)).collect()
    }
}
