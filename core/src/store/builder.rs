use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

use crate::action::{ActionDef, AsyncAction, Model, PropsOf, StateOf};
use crate::config::StoreConfig;
use crate::conflict::{ConflictPolicy, ConflictResolver};
use crate::derived::{DerivedEngine, DerivedField};
use crate::error::ConfigError;
use crate::executor::LinearBackoff;
use crate::history::{OptimisticHistory, SnapshotFn};

use super::commit::{Outbox, StoreCore};
use super::hooks::{FailureReport, Hooks, Listeners, Notice};
use super::{Store, StoreInner};

type InitialState<M> = Box<dyn FnOnce() -> StateOf<M> + Send>;

/// Collects the store-scoped configuration and validates it in [`build`].
///
/// [`build`]: StoreBuilder::build
pub struct StoreBuilder<M: Model> {
    props: PropsOf<M>,
    initial_state: Option<InitialState<M>>,
    actions: Vec<(String, ActionDef<M>)>,
    derived: Vec<DerivedField<M>>,
    snapshot: SnapshotFn<M>,
    hooks: Hooks<M>,
    config: StoreConfig,
}

impl<M: Model> StoreBuilder<M> {
    pub fn new(props: PropsOf<M>) -> Self {
        Self {
            props,
            initial_state: None,
            actions: Vec::new(),
            derived: Vec::new(),
            snapshot: Arc::new(|state: &Arc<StateOf<M>>| Arc::clone(state)),
            hooks: Hooks::default(),
            config: StoreConfig::default(),
        }
    }

    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn initial_state<F>(mut self, factory: F) -> Self
    where
        F: FnOnce() -> StateOf<M> + Send + 'static,
    {
        self.initial_state = Some(Box::new(factory));
        self
    }

    pub fn action(mut self, name: impl Into<String>, action: impl Into<ActionDef<M>>) -> Self {
        self.actions.push((name.into(), action.into()));
        self
    }

    pub fn derived(mut self, field: DerivedField<M>) -> Self {
        self.derived.push(field);
        self
    }

    /// Copies the state stored before each optimistic effect.
    ///
    /// The default shares the immutable snapshot. Supply a deep copy when the
    /// state reaches shared mutable data that later effects may change.
    pub fn snapshot_with<F>(mut self, copy: F) -> Self
    where
        F: Fn(&StateOf<M>) -> StateOf<M> + Send + Sync + 'static,
    {
        self.snapshot = Arc::new(move |state: &Arc<StateOf<M>>| Arc::new(copy(state)));
        self
    }

    /// Decides which call errors are retried. Defaults to every error.
    pub fn retryable<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&anyhow::Error) -> bool + Send + Sync + 'static,
    {
        self.hooks.retryable = Arc::new(predicate);
        self
    }

    pub fn on_success<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Notice) + Send + Sync + 'static,
    {
        self.hooks.on_success = Some(Arc::new(hook));
        self
    }

    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Notice) + Send + Sync + 'static,
    {
        self.hooks.on_error = Some(Arc::new(hook));
        self
    }

    /// Invoked for every failed call, handled or not.
    pub fn on_unhandled_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&FailureReport<M>) + Send + Sync + 'static,
    {
        self.hooks.on_unhandled_error = Some(Arc::new(hook));
        self
    }

    pub fn on_mount<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Store<M>) + Send + Sync + 'static,
    {
        self.hooks.on_mount = Some(Arc::new(hook));
        self
    }

    pub fn on_unmount<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Store<M>) + Send + Sync + 'static,
    {
        self.hooks.on_unmount = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> Result<Store<M>, ConfigError> {
        let initial_state = self.initial_state.ok_or(ConfigError::MissingInitialState)?;

        let mut actions = HashMap::with_capacity(self.actions.len());
        for (name, action) in self.actions {
            let action = match action {
                ActionDef::Async(action) => {
                    ActionDef::Async(prepare_async(&name, action, &self.config)?)
                }
                other => other,
            };
            if actions.insert(name.clone(), action).is_some() {
                return Err(ConfigError::DuplicateAction(name));
            }
        }

        let mut engine = DerivedEngine::new(self.derived)?;
        let state = Arc::new(initial_state());
        let props = Arc::new(self.props);
        let derived = engine.evaluate(&state, &props);

        let id = Uuid::new_v4();
        info!(
            store = %id,
            actions = actions.len(),
            derived = derived.len(),
            "store created"
        );

        let (events, _) = broadcast::channel(self.config.events.capacity.max(1));
        let core = StoreCore {
            state,
            props,
            derived,
            engine,
            loading: HashMap::new(),
            history: OptimisticHistory::new(self.snapshot),
            version: 0,
            outbox: Outbox::default(),
        };

        Ok(Store {
            inner: Arc::new(StoreInner {
                id,
                config: self.config,
                actions,
                hooks: self.hooks,
                core: Mutex::new(core),
                conflicts: Mutex::new(ConflictResolver::default()),
                debounce: Mutex::new(HashMap::new()),
                listeners: Mutex::new(Listeners::default()),
                events,
            }),
        })
    }
}

/// Fills in configured defaults and checks the parallel instance-id deriver.
fn prepare_async<M: Model>(
    name: &str,
    mut action: AsyncAction<M>,
    config: &StoreConfig,
) -> Result<AsyncAction<M>, ConfigError> {
    let policy = *action.conflict.get_or_insert(config.conflict.default_policy);

    match policy {
        ConflictPolicy::Parallel if action.instance_id.is_none() => {
            return Err(ConfigError::MissingInstanceId(name.to_string()));
        }
        ConflictPolicy::Reuse => {
            if action.retry.is_none() {
                action.retry = Some(Arc::new(LinearBackoff::new(
                    config.retry.reuse_retry_count,
                    config.retry.delay(),
                )));
            }
            if action.reuse_fallback.is_none() {
                action.reuse_fallback = Some(config.conflict.reuse_fallback.as_fallback());
            }
        }
        _ => {}
    }

    Ok(action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::SyncAction;
    use crate::derived::DerivedField;

    struct Plain;

    impl Model for Plain {
        type State = u32;
        type Props = ();
        type Args = u32;
        type Output = u32;
    }

    fn builder() -> StoreBuilder<Plain> {
        StoreBuilder::new(()).initial_state(|| 0)
    }

    #[test]
    fn missing_initial_state_is_rejected() {
        let err = StoreBuilder::<Plain>::new(()).build().unwrap_err();
        assert_eq!(err, ConfigError::MissingInitialState);
    }

    #[test]
    fn duplicate_action_is_rejected() {
        let err = builder()
            .action("add", SyncAction::<Plain>::new(|s: &u32, a: &u32| s + a))
            .action("add", SyncAction::<Plain>::new(|s: &u32, a: &u32| s + a))
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::DuplicateAction("add".to_string()));
    }

    #[test]
    fn parallel_requires_instance_id() {
        let action = AsyncAction::<Plain>::new(|ctx| async move { Ok(ctx.args) })
            .conflict(ConflictPolicy::Parallel);
        let err = builder().action("load", action).build().unwrap_err();
        assert_eq!(err, ConfigError::MissingInstanceId("load".to_string()));
    }

    #[test]
    fn reuse_gets_default_retry_and_fallback() {
        let mut config = StoreConfig::default();
        config.retry.reuse_retry_count = 4;
        config.conflict.reuse_fallback = ConflictPolicy::KeepLast;

        let action = AsyncAction::<Plain>::new(|ctx| async move { Ok(ctx.args) })
            .conflict(ConflictPolicy::Reuse);
        let action = prepare_async("load", action, &config).unwrap();

        assert_eq!(action.retry.as_ref().map(|r| r.max_retries()), Some(4));
        assert_eq!(action.fallback(), ConflictPolicy::KeepLast);
    }

    #[test]
    fn undeclared_policy_uses_configured_default() {
        let mut config = StoreConfig::default();
        config.conflict.default_policy = ConflictPolicy::Ignore;

        let action = AsyncAction::<Plain>::new(|ctx| async move { Ok(ctx.args) });
        let action = prepare_async("load", action, &config).unwrap();
        assert_eq!(action.policy(), ConflictPolicy::Ignore);
    }

    #[test]
    fn cyclic_derived_fields_fail_to_build() {
        let err = builder()
            .derived(DerivedField::<Plain>::new("a", |_, _, _| 1_u32).depends_on_derived(["b"]))
            .derived(DerivedField::<Plain>::new("b", |_, _, _| 2_u32).depends_on_derived(["a"]))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::CircularDependency(_)));
    }
}
