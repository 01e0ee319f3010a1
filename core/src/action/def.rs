use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};

use crate::conflict::ConflictPolicy;
use crate::error::ActionError;
use crate::executor::{AbortSignal, LinearBackoff, RetryStrategy};
use crate::store::Store;

use super::model::{ArgsOf, Model, OutputOf, StateOf};

/// Pure state transform: `(state, args) -> next state`.
pub type Effect<M> = Arc<dyn Fn(&StateOf<M>, &ArgsOf<M>) -> StateOf<M> + Send + Sync>;

/// Commits the value a call resolved with.
pub type SuccessEffect<M> =
    Arc<dyn Fn(&StateOf<M>, &OutputOf<M>, &ArgsOf<M>) -> StateOf<M> + Send + Sync>;

/// Commits a failed (or aborted) call.
pub type ErrorEffect<M> = Arc<dyn Fn(&StateOf<M>, &Failure, &ArgsOf<M>) -> StateOf<M> + Send + Sync>;

pub type CallFuture<M> = BoxFuture<'static, anyhow::Result<OutputOf<M>>>;

/// Starts one attempt of an asynchronous call. `None` means the call
/// declined to run.
pub type CallFn<M> = Arc<dyn Fn(CallContext<M>) -> Option<CallFuture<M>> + Send + Sync>;

pub type InstanceIdFn<M> = Arc<dyn Fn(&ArgsOf<M>) -> String + Send + Sync>;

pub type SideEffect<M> = Arc<dyn Fn(&Store<M>, &ArgsOf<M>) + Send + Sync>;

pub type SuccessMessage<M> = Arc<dyn Fn(&OutputOf<M>, &ArgsOf<M>) -> String + Send + Sync>;

pub type ErrorMessage<M> = Arc<dyn Fn(&ActionError, &ArgsOf<M>) -> String + Send + Sync>;

/// Error handed to error effects.
#[derive(Debug, Clone)]
pub struct Failure {
    pub error: ActionError,
    /// Set when the call was cancelled through `Store::abort`.
    pub aborted: bool,
}

/// Input of one call attempt.
pub struct CallContext<M: Model> {
    pub args: ArgsOf<M>,
    /// 1 for the first attempt, incremented on every retry.
    pub attempt: u32,
    /// Present only for abortable actions.
    pub signal: Option<AbortSignal>,
}

/// A declared state transition.
pub enum ActionDef<M: Model> {
    Sync(SyncAction<M>),
    AdvancedSync(AdvancedSyncAction<M>),
    Async(AsyncAction<M>),
}

impl<M: Model> ActionDef<M> {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sync(_) => "sync",
            Self::AdvancedSync(_) => "advanced_sync",
            Self::Async(_) => "async",
        }
    }
}

impl<M: Model> From<SyncAction<M>> for ActionDef<M> {
    fn from(action: SyncAction<M>) -> Self {
        Self::Sync(action)
    }
}

impl<M: Model> From<AdvancedSyncAction<M>> for ActionDef<M> {
    fn from(action: AdvancedSyncAction<M>) -> Self {
        Self::AdvancedSync(action)
    }
}

impl<M: Model> From<AsyncAction<M>> for ActionDef<M> {
    fn from(action: AsyncAction<M>) -> Self {
        Self::Async(action)
    }
}

pub struct SyncAction<M: Model> {
    pub(crate) reduce: Effect<M>,
}

impl<M: Model> SyncAction<M> {
    pub fn new<F>(reduce: F) -> Self
    where
        F: Fn(&StateOf<M>, &ArgsOf<M>) -> StateOf<M> + Send + Sync + 'static,
    {
        Self {
            reduce: Arc::new(reduce),
        }
    }
}

/// Sync transform followed by an optional debounced side effect.
pub struct AdvancedSyncAction<M: Model> {
    pub(crate) reduce: Effect<M>,
    pub(crate) side_effect: Option<SideEffect<M>>,
    pub(crate) debounce: Duration,
}

impl<M: Model> AdvancedSyncAction<M> {
    pub fn new<F>(reduce: F) -> Self
    where
        F: Fn(&StateOf<M>, &ArgsOf<M>) -> StateOf<M> + Send + Sync + 'static,
    {
        Self {
            reduce: Arc::new(reduce),
            side_effect: None,
            debounce: Duration::ZERO,
        }
    }

    /// Runs `effect` after the transform commits. Calls landing inside the
    /// debounce window replace the pending side effect.
    pub fn side_effect<F>(mut self, debounce: Duration, effect: F) -> Self
    where
        F: Fn(&Store<M>, &ArgsOf<M>) + Send + Sync + 'static,
    {
        self.side_effect = Some(Arc::new(effect));
        self.debounce = debounce;
        self
    }
}

pub struct AsyncAction<M: Model> {
    pub(crate) call: CallFn<M>,
    pub(crate) pre_effect: Option<Effect<M>>,
    pub(crate) optimistic_effect: Option<Effect<M>>,
    pub(crate) success_effect: Option<SuccessEffect<M>>,
    pub(crate) error_effect: Option<ErrorEffect<M>>,
    pub(crate) conflict: Option<ConflictPolicy>,
    pub(crate) reuse_fallback: Option<ConflictPolicy>,
    pub(crate) instance_id: Option<InstanceIdFn<M>>,
    pub(crate) retry: Option<Arc<dyn RetryStrategy>>,
    pub(crate) abortable: bool,
    pub(crate) success_message: Option<SuccessMessage<M>>,
    pub(crate) error_message: Option<ErrorMessage<M>>,
    pub(crate) reject_on_error: bool,
}

impl<M: Model> Clone for AsyncAction<M> {
    fn clone(&self) -> Self {
        Self {
            call: self.call.clone(),
            pre_effect: self.pre_effect.clone(),
            optimistic_effect: self.optimistic_effect.clone(),
            success_effect: self.success_effect.clone(),
            error_effect: self.error_effect.clone(),
            conflict: self.conflict,
            reuse_fallback: self.reuse_fallback,
            instance_id: self.instance_id.clone(),
            retry: self.retry.clone(),
            abortable: self.abortable,
            success_message: self.success_message.clone(),
            error_message: self.error_message.clone(),
            reject_on_error: self.reject_on_error,
        }
    }
}

impl<M: Model> AsyncAction<M> {
    /// Action whose call always runs.
    pub fn new<F, Fut>(call: F) -> Self
    where
        F: Fn(CallContext<M>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<OutputOf<M>>> + Send + 'static,
    {
        Self::from_call(Arc::new(move |ctx| Some(call(ctx).boxed())))
    }

    /// Action whose call may decline to run by returning `None`, e.g. when a
    /// required input is missing. A declined call applies no effects.
    pub fn optional<F, Fut>(call: F) -> Self
    where
        F: Fn(CallContext<M>) -> Option<Fut> + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<OutputOf<M>>> + Send + 'static,
    {
        Self::from_call(Arc::new(move |ctx| call(ctx).map(FutureExt::boxed)))
    }

    fn from_call(call: CallFn<M>) -> Self {
        Self {
            call,
            pre_effect: None,
            optimistic_effect: None,
            success_effect: None,
            error_effect: None,
            conflict: None,
            reuse_fallback: None,
            instance_id: None,
            retry: None,
            abortable: false,
            success_message: None,
            error_message: None,
            reject_on_error: false,
        }
    }

    /// Committed before the call starts; the action is marked loading.
    pub fn pre_effect<F>(mut self, effect: F) -> Self
    where
        F: Fn(&StateOf<M>, &ArgsOf<M>) -> StateOf<M> + Send + Sync + 'static,
    {
        self.pre_effect = Some(Arc::new(effect));
        self
    }

    /// Committed before the call starts and rolled back if it fails.
    pub fn optimistic<F>(mut self, effect: F) -> Self
    where
        F: Fn(&StateOf<M>, &ArgsOf<M>) -> StateOf<M> + Send + Sync + 'static,
    {
        self.optimistic_effect = Some(Arc::new(effect));
        self
    }

    pub fn on_success<F>(mut self, effect: F) -> Self
    where
        F: Fn(&StateOf<M>, &OutputOf<M>, &ArgsOf<M>) -> StateOf<M> + Send + Sync + 'static,
    {
        self.success_effect = Some(Arc::new(effect));
        self
    }

    /// Declaring an error effect marks the action's errors as handled.
    pub fn on_error<F>(mut self, effect: F) -> Self
    where
        F: Fn(&StateOf<M>, &Failure, &ArgsOf<M>) -> StateOf<M> + Send + Sync + 'static,
    {
        self.error_effect = Some(Arc::new(effect));
        self
    }

    pub fn conflict(mut self, policy: ConflictPolicy) -> Self {
        self.conflict = Some(policy);
        self
    }

    /// Policy used by [`ConflictPolicy::Reuse`] when arguments differ.
    pub fn reuse_fallback(mut self, policy: ConflictPolicy) -> Self {
        self.reuse_fallback = Some(policy.as_fallback());
        self
    }

    /// Parallel policy keyed by the instance id derived from the args.
    pub fn parallel<F>(mut self, instance_id: F) -> Self
    where
        F: Fn(&ArgsOf<M>) -> String + Send + Sync + 'static,
    {
        self.conflict = Some(ConflictPolicy::Parallel);
        self.instance_id = Some(Arc::new(instance_id));
        self
    }

    /// Retries up to `count` times, waiting `delay × attempt` in between.
    pub fn retry(self, count: u32, delay: Duration) -> Self {
        self.retry_strategy(LinearBackoff::new(count, delay))
    }

    pub fn retry_strategy<S>(mut self, strategy: S) -> Self
    where
        S: RetryStrategy + 'static,
    {
        self.retry = Some(Arc::new(strategy));
        self
    }

    /// The call receives an [`AbortSignal`] and can be cancelled.
    pub fn abortable(mut self) -> Self {
        self.abortable = true;
        self
    }

    pub fn success_message<F>(mut self, message: F) -> Self
    where
        F: Fn(&OutputOf<M>, &ArgsOf<M>) -> String + Send + Sync + 'static,
    {
        self.success_message = Some(Arc::new(message));
        self
    }

    /// Declaring an error message marks the action's errors as handled.
    pub fn error_message<F>(mut self, message: F) -> Self
    where
        F: Fn(&ActionError, &ArgsOf<M>) -> String + Send + Sync + 'static,
    {
        self.error_message = Some(Arc::new(message));
        self
    }

    /// Handled errors still reject the caller's pending result.
    pub fn reject_on_error(mut self) -> Self {
        self.reject_on_error = true;
        self
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.conflict.unwrap_or_default()
    }

    pub(crate) fn fallback(&self) -> ConflictPolicy {
        self.reuse_fallback
            .unwrap_or(ConflictPolicy::KeepAll)
            .as_fallback()
    }

    pub(crate) fn is_handled(&self) -> bool {
        self.error_effect.is_some() || self.error_message.is_some()
    }
}
