//! Commit path: the only place the state snapshot is swapped.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::action::{ArgsOf, Model, PropsOf, StateOf};
use crate::derived::{DerivedEngine, DerivedValues};
use crate::history::{EffectKind, HistoryEntry, OptimisticHistory, Replay};
use crate::util::lock;

use super::events::StoreEvent;
use super::hooks::{FailureReport, Notice};
use super::loading::LoadingState;
use super::Store;

pub(crate) type LoadingKey = (String, String);

pub(crate) struct StoreCore<M: Model> {
    pub state: Arc<StateOf<M>>,
    pub props: Arc<PropsOf<M>>,
    pub derived: DerivedValues,
    pub engine: DerivedEngine<M>,
    pub loading: HashMap<LoadingKey, LoadingState>,
    pub history: OptimisticHistory<M>,
    /// Bumped on every visible change.
    pub version: u64,
    pub outbox: Outbox<M>,
}

impl<M: Model> StoreCore<M> {
    pub fn replace_state(&mut self, next: Arc<StateOf<M>>) {
        self.derived = self.engine.evaluate(&next, &self.props);
        self.state = next;
        self.bump();
    }

    pub fn replace_props(&mut self, next: Arc<PropsOf<M>>) {
        self.derived = self.engine.evaluate(&self.state, &next);
        self.props = next;
        self.bump();
    }

    /// Records a visible change and queues the current state for listeners.
    pub fn bump(&mut self) {
        self.version += 1;
        self.outbox.queue.push_back(Arc::clone(&self.state));
    }
}

/// States waiting for the listeners, in version order.
///
/// Only one thread delivers at a time. The others queue their state and
/// return, so listeners never see versions out of order.
pub(crate) struct Outbox<M: Model> {
    queue: VecDeque<Arc<StateOf<M>>>,
    flushing: bool,
}

impl<M: Model> Default for Outbox<M> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            flushing: false,
        }
    }
}

/// Hands delivery back if a listener panics.
struct FlushGuard<'a, M: Model>(&'a Store<M>);

impl<M: Model> Drop for FlushGuard<'_, M> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut core = lock(&self.0.inner.core);
            core.outbox.flushing = false;
            core.outbox.queue.clear();
        }
    }
}

impl<M: Model> Store<M> {
    /// Applies `replay` to the current state and publishes the result.
    /// `call_id` is the resolver call that owns the effect, if any.
    pub(crate) fn commit(
        &self,
        action: &str,
        instance: &str,
        call_id: Option<u64>,
        kind: EffectKind,
        args: &ArgsOf<M>,
        replay: Replay<M>,
    ) {
        let (version, log_len) = {
            let mut core = lock(&self.inner.core);
            let before = Arc::clone(&core.state);
            let next = Arc::new(replay(&before));
            let entry = HistoryEntry::new(action, instance, call_id, kind, args.clone(), replay);
            core.history.record(entry, &before);
            core.replace_state(next);
            (core.version, core.history.len())
        };

        debug!(
            store = %self.inner.id,
            action,
            instance,
            kind = ?kind,
            version,
            "effect committed"
        );
        if log_len == self.inner.config.history.warn_threshold + 1 {
            warn!(
                store = %self.inner.id,
                entries = log_len,
                "optimistic history is growing; an optimistic call may never settle"
            );
        }

        self.emit(StoreEvent::Committed {
            action: action.to_string(),
            instance: instance.to_string(),
            kind,
            version,
            timestamp: Utc::now(),
        });
        self.notify();
    }

    /// Undoes the optimistic effect of a failed call. No-op if the call has
    /// none pending.
    pub(crate) fn rollback(&self, action: &str, instance: &str, call_id: u64) {
        let (version, replayed) = {
            let mut core = lock(&self.inner.core);
            let Some(rollback) = core.history.rollback(call_id) else {
                return;
            };
            core.replace_state(rollback.state);
            (core.version, rollback.replayed)
        };

        info!(
            store = %self.inner.id,
            action,
            instance,
            replayed,
            "optimistic effect rolled back"
        );
        self.emit(StoreEvent::RolledBack {
            action: action.to_string(),
            instance: instance.to_string(),
            replayed,
            version,
            timestamp: Utc::now(),
        });
        self.notify();
    }

    pub(crate) fn resolve_optimistic(&self, action: &str, instance: &str, call_id: u64) {
        let resolved = lock(&self.inner.core).history.resolve(call_id);
        debug!(
            store = %self.inner.id,
            action,
            instance,
            call_id,
            resolved,
            "optimistic effect confirmed"
        );
    }

    pub(crate) fn set_loading(&self, action: &str, instance: &str, state: LoadingState) {
        let loading = state.loading;
        {
            let mut core = lock(&self.inner.core);
            core.loading
                .insert((action.to_string(), instance.to_string()), state);
            core.bump();
        }

        self.emit(StoreEvent::LoadingChanged {
            action: action.to_string(),
            instance: instance.to_string(),
            loading,
            timestamp: Utc::now(),
        });
        self.notify();
    }

    pub(crate) fn notify_success(&self, action: &str, instance: &str, message: String) {
        if let Some(hook) = &self.inner.hooks.on_success {
            hook(&Notice {
                action: action.to_string(),
                instance: instance.to_string(),
                message,
            });
        }
    }

    pub(crate) fn notify_error(&self, action: &str, instance: &str, message: String) {
        if let Some(hook) = &self.inner.hooks.on_error {
            hook(&Notice {
                action: action.to_string(),
                instance: instance.to_string(),
                message,
            });
        }
    }

    pub(crate) fn report_failure(&self, report: FailureReport<M>) {
        self.emit(StoreEvent::ActionFailed {
            action: report.action.clone(),
            instance: report.instance.clone(),
            error: report.error.to_string(),
            handled: report.handled,
            timestamp: Utc::now(),
        });
        if let Some(hook) = &self.inner.hooks.on_unhandled_error {
            hook(&report);
        }
    }

    pub(crate) fn emit(&self, event: StoreEvent) {
        let _ = self.inner.events.send(event);
    }

    /// Delivers queued states to the listeners unless another thread is
    /// already doing so. A listener that dispatches gets its own change
    /// delivered after it returns.
    pub(crate) fn notify(&self) {
        {
            let mut core = lock(&self.inner.core);
            if core.outbox.flushing {
                return;
            }
            core.outbox.flushing = true;
        }

        let _guard = FlushGuard(self);
        loop {
            let next = {
                let mut core = lock(&self.inner.core);
                let next = core.outbox.queue.pop_front();
                if next.is_none() {
                    core.outbox.flushing = false;
                }
                next
            };
            let Some(state) = next else {
                return;
            };
            let listeners = lock(&self.inner.listeners).snapshot();
            for listener in listeners {
                listener(&state);
            }
        }
    }
}
