//! The state store: current snapshot, loading bookkeeping, listeners and
//! the dispatch entry point.

mod builder;
mod commit;
mod events;
mod hooks;
mod loading;

pub use builder::StoreBuilder;
pub use events::StoreEvent;
pub use hooks::{FailureReport, Listener, Notice};
pub use loading::LoadingState;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::action::{ActionDef, ArgsOf, Model, OutputOf, Pending, PropsOf, StateOf};
use crate::config::StoreConfig;
use crate::conflict::{ConflictResolver, DEFAULT_INSTANCE};
use crate::derived::DerivedValues;
use crate::error::ActionError;
use crate::executor;
use crate::util::lock;

use self::commit::StoreCore;
use self::hooks::{Hooks, Listeners};

pub(crate) struct StoreInner<M: Model> {
    pub id: Uuid,
    pub config: StoreConfig,
    pub actions: HashMap<String, ActionDef<M>>,
    pub hooks: Hooks<M>,
    pub core: Mutex<StoreCore<M>>,
    pub conflicts: Mutex<ConflictResolver<M>>,
    /// Latest side-effect ticket per advanced-sync action.
    pub debounce: Mutex<HashMap<String, u64>>,
    pub listeners: Mutex<Listeners<M>>,
    pub events: broadcast::Sender<StoreEvent>,
}

/// Handle to a store. Clones share the same state.
pub struct Store<M: Model> {
    pub(crate) inner: Arc<StoreInner<M>>,
}

impl<M: Model> Clone for Store<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Model> fmt::Debug for Store<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.inner.id)
            .field("actions", &self.inner.actions.len())
            .field("version", &self.version())
            .finish()
    }
}

impl<M: Model> Store<M> {
    pub fn builder(props: PropsOf<M>) -> StoreBuilder<M> {
        StoreBuilder::new(props)
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn get_state(&self) -> Arc<StateOf<M>> {
        Arc::clone(&lock(&self.inner.core).state)
    }

    pub fn get_props(&self) -> Arc<PropsOf<M>> {
        Arc::clone(&lock(&self.inner.core).props)
    }

    /// Replaces the props, re-evaluates derived fields and notifies listeners.
    pub fn set_props(&self, props: PropsOf<M>) {
        let version = {
            let mut core = lock(&self.inner.core);
            core.replace_props(Arc::new(props));
            core.version
        };
        debug!(store = %self.inner.id, version, "props replaced");
        self.emit(StoreEvent::PropsChanged {
            version,
            timestamp: chrono::Utc::now(),
        });
        self.notify();
    }

    /// Incremented on every commit, rollback, loading change and props change.
    pub fn version(&self) -> u64 {
        lock(&self.inner.core).version
    }

    pub fn derived<T>(&self, name: &str) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        lock(&self.inner.core).derived.get(name)
    }

    pub fn derived_values(&self) -> DerivedValues {
        lock(&self.inner.core).derived.clone()
    }

    pub fn get_loading_state(&self, action: &str) -> LoadingState {
        self.get_instance_loading_state(action, DEFAULT_INSTANCE)
    }

    /// Loading state of one instance of a parallel action.
    pub fn get_instance_loading_state(&self, action: &str, instance: &str) -> LoadingState {
        lock(&self.inner.core)
            .loading
            .get(&(action.to_string(), instance.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Calls `listener` after every change with the current snapshot, in
    /// version order. The listener stays registered until the returned
    /// [`Subscription`] is dropped or unsubscribed.
    pub fn subscribe<F>(&self, listener: F) -> Subscription<M>
    where
        F: Fn(&Arc<StateOf<M>>) + Send + Sync + 'static,
    {
        let id = lock(&self.inner.listeners).add(Arc::new(listener));
        Subscription {
            store: Arc::downgrade(&self.inner),
            id: Some(id),
        }
    }

    pub fn events(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    /// Runs the action registered under `name`.
    ///
    /// Sync actions have committed by the time this returns. Async actions
    /// run their call up to its first suspension point here and finish on
    /// the ambient Tokio runtime; without one they resolve
    /// [`ActionError::NoRuntime`] and leave the state untouched.
    pub fn dispatch(&self, name: &str, args: ArgsOf<M>) -> Pending<OutputOf<M>> {
        let Some(action) = self.inner.actions.get(name) else {
            return Pending::ready(Err(ActionError::UnknownAction(name.to_string())));
        };
        debug!(store = %self.inner.id, action = name, kind = action.kind(), "dispatch");

        match action {
            ActionDef::Sync(action) => executor::dispatch_sync(self, name, action, args),
            ActionDef::AdvancedSync(action) => executor::dispatch_advanced(self, name, action, args),
            ActionDef::Async(action) => executor::dispatch_async(self, name, action, args),
        }
    }

    /// Cancels the in-flight call of an abortable action. `instance`
    /// selects the call of a parallel action.
    pub fn abort(&self, action: &str, instance: Option<&str>) -> bool {
        executor::abort(self, action, instance)
    }

    pub fn mount(&self) {
        if let Some(hook) = &self.inner.hooks.on_mount {
            hook(self);
        }
    }

    pub fn unmount(&self) {
        if let Some(hook) = &self.inner.hooks.on_unmount {
            hook(self);
        }
    }

    /// True while an optimistic effect is unresolved.
    pub fn is_recording(&self) -> bool {
        lock(&self.inner.core).history.is_recording()
    }

    pub fn history_len(&self) -> usize {
        lock(&self.inner.core).history.len()
    }

    pub fn pending_optimistic(&self) -> usize {
        lock(&self.inner.core).history.pending_count()
    }

    /// True while a call of `(action, instance)` holds its slot.
    pub fn is_busy(&self, action: &str, instance: &str) -> bool {
        lock(&self.inner.conflicts).is_busy(action, instance)
    }

    /// Calls waiting for the slot of `(action, instance)`.
    pub fn queued_calls(&self, action: &str, instance: &str) -> usize {
        lock(&self.inner.conflicts).queued(action, instance)
    }
}

/// Returned by [`Store::subscribe`]. Dropping it removes the listener.
#[must_use = "dropping a Subscription removes its listener"]
pub struct Subscription<M: Model> {
    store: Weak<StoreInner<M>>,
    id: Option<u64>,
}

impl<M: Model> Subscription<M> {
    /// Returns false if the store is already gone.
    pub fn unsubscribe(mut self) -> bool {
        self.remove()
    }

    fn remove(&mut self) -> bool {
        let Some(id) = self.id.take() else {
            return false;
        };
        match self.store.upgrade() {
            Some(inner) => lock(&inner.listeners).remove(id),
            None => false,
        }
    }
}

impl<M: Model> Drop for Subscription<M> {
    fn drop(&mut self) {
        self.remove();
    }
}
