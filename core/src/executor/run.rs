use chrono::Utc;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::action::{
    ActionDef, ActionResult, ArgsOf, AsyncAction, CallContext, Failure, Model, Outcome, OutputOf,
    Pending,
};
use crate::conflict::{Admission, ConflictPolicy, Sender, Started, DEFAULT_INSTANCE};
use crate::error::ActionError;
use crate::history::EffectKind;
use crate::store::{FailureReport, LoadingState, Store, StoreEvent};
use crate::util::lock;

use super::{bind, bind_error, bind_success, call_with_retry, RetryRun};

pub(crate) fn dispatch_async<M: Model>(
    store: &Store<M>,
    name: &str,
    action: &AsyncAction<M>,
    args: ArgsOf<M>,
) -> Pending<OutputOf<M>> {
    let policy = action.policy();
    let instance = match (&action.instance_id, policy) {
        (Some(instance_id), ConflictPolicy::Parallel) => instance_id(&args),
        _ => DEFAULT_INSTANCE.to_string(),
    };

    let admission =
        lock(&store.inner.conflicts).admit(name, &instance, policy, action.fallback(), args);

    let (pending, decision) = match admission {
        Admission::Start(started) => {
            let pending = started.pending.clone();
            run_queue(store, name, &instance, action, Some(started));
            return pending;
        }
        Admission::Queued(pending) => (pending, "queued"),
        Admission::Joined(pending) => (pending, "joined in-flight call"),
        Admission::Rejected(pending) => (pending, "rejected"),
        Admission::Ignored(pending) => (pending, "ignored"),
    };

    debug!(
        store = %store.id(),
        action = name,
        instance = %instance,
        policy = %policy,
        decision,
        "call conflicts with one in flight"
    );
    pending
}

/// Cancels the in-flight call of `(name, instance)` and starts the next
/// queued one. Returns false when nothing was cancelled.
pub(crate) fn abort<M: Model>(store: &Store<M>, name: &str, instance: Option<&str>) -> bool {
    let Some(ActionDef::Async(action)) = store.inner.actions.get(name) else {
        return false;
    };
    if !action.abortable {
        return false;
    }

    let instance = instance.unwrap_or(DEFAULT_INSTANCE);
    let Some((signal, next)) = lock(&store.inner.conflicts).abort(name, instance) else {
        return false;
    };

    signal.abort();
    info!(store = %store.id(), action = name, instance, "call aborted");
    store.set_loading(name, instance, LoadingState::aborted());
    store.emit(StoreEvent::ActionAborted {
        action: name.to_string(),
        instance: instance.to_string(),
        timestamp: Utc::now(),
    });

    run_queue(store, name, instance, action, next);
    true
}

/// Launches `next`; calls that do not run hand the slot straight to the
/// following one.
fn run_queue<M: Model>(
    store: &Store<M>,
    name: &str,
    instance: &str,
    action: &AsyncAction<M>,
    mut next: Option<Started<M>>,
) {
    while let Some(started) = next {
        let call_id = started.call_id;
        let Launch::Declined(tx, result) = launch(store, name, instance, action, started) else {
            return;
        };
        next = lock(&store.inner.conflicts).release(name, instance, call_id);
        let _ = tx.send(result);
    }
}

enum Launch<M: Model> {
    Spawned,
    /// Nothing was committed; the slot is still held by the call.
    Declined(Sender<M>, ActionResult<OutputOf<M>>),
}

/// Runs everything up to the first suspension point and spawns the rest.
fn launch<M: Model>(
    store: &Store<M>,
    name: &str,
    instance: &str,
    action: &AsyncAction<M>,
    started: Started<M>,
) -> Launch<M> {
    let Started {
        call_id,
        args,
        signal,
        tx,
        ..
    } = started;

    let Ok(runtime) = Handle::try_current() else {
        warn!(store = %store.id(), action = name, instance, "dispatched outside a Tokio runtime");
        let err = ActionError::NoRuntime {
            action: name.to_string(),
        };
        return Launch::Declined(tx, Err(err));
    };

    let ctx = CallContext {
        args: args.clone(),
        attempt: 1,
        signal: action.abortable.then(|| signal.clone()),
    };
    let Some(first) = (action.call)(ctx) else {
        debug!(store = %store.id(), action = name, instance, "call skipped");
        return Launch::Declined(tx, Ok(Outcome::Skipped));
    };

    debug!(store = %store.id(), action = name, instance, call_id, "call started");
    store.set_loading(
        name,
        instance,
        LoadingState::started(action.optimistic_effect.is_none()),
    );
    let call = Some(call_id);
    if let Some(effect) = &action.pre_effect {
        let replay = bind::<M>(effect, &args);
        store.commit(name, instance, call, EffectKind::Pre, &args, replay);
    }
    if let Some(effect) = &action.optimistic_effect {
        let replay = bind::<M>(effect, &args);
        store.commit(name, instance, call, EffectKind::Optimistic, &args, replay);
    }

    let store = store.clone();
    let action = action.clone();
    let name = name.to_string();
    let instance = instance.to_string();
    runtime.spawn(async move {
        let result = call_with_retry(
            RetryRun {
                action: &name,
                call: &action.call,
                args: &args,
                signal: &signal,
                abortable: action.abortable,
                strategy: action.retry.as_deref(),
                retryable: &store.inner.hooks.retryable,
            },
            first,
        )
        .await;

        let settle = Settle {
            store: &store,
            name: &name,
            instance: &instance,
            call_id,
            action: &action,
            args: &args,
        };
        let outcome = if signal.is_aborted() {
            settle.aborted()
        } else {
            match result {
                Ok(Some(value)) => settle.succeeded(value),
                Ok(None) => settle.skipped_retry(),
                Err(err) => settle.failed(err),
            }
        };

        // Free the slot before the caller can observe the result.
        let next = lock(&store.inner.conflicts).release(&name, &instance, call_id);
        let _ = tx.send(outcome);
        run_queue(&store, &name, &instance, &action, next);
    });
    Launch::Spawned
}

struct Settle<'a, M: Model> {
    store: &'a Store<M>,
    name: &'a str,
    instance: &'a str,
    call_id: u64,
    action: &'a AsyncAction<M>,
    args: &'a ArgsOf<M>,
}

impl<M: Model> Settle<'_, M> {
    fn succeeded(&self, value: OutputOf<M>) -> ActionResult<OutputOf<M>> {
        let Self {
            store,
            name,
            instance,
            call_id,
            action,
            args,
        } = *self;

        if let Some(effect) = &action.success_effect {
            store.commit(
                name,
                instance,
                Some(call_id),
                EffectKind::Success,
                args,
                bind_success::<M>(effect, &value, args),
            );
        }
        store.resolve_optimistic(name, instance, call_id);
        store.set_loading(name, instance, LoadingState::default());
        if let Some(message) = &action.success_message {
            store.notify_success(name, instance, message(&value, args));
        }
        Ok(Outcome::Done(value))
    }

    /// A retry attempt declined to run; the optimistic effect stands.
    fn skipped_retry(&self) -> ActionResult<OutputOf<M>> {
        debug!(
            store = %self.store.id(),
            action = self.name,
            instance = self.instance,
            "retry skipped"
        );
        self.store
            .resolve_optimistic(self.name, self.instance, self.call_id);
        self.store
            .set_loading(self.name, self.instance, LoadingState::default());
        Ok(Outcome::Skipped)
    }

    fn failed(&self, err: anyhow::Error) -> ActionResult<OutputOf<M>> {
        let Self {
            store,
            name,
            instance,
            call_id,
            action,
            args,
        } = *self;

        let error = ActionError::call(name, err);
        let handled = action.is_handled();
        warn!(store = %store.id(), action = name, instance, handled, error = %error, "call failed");

        let state = store.get_state();
        if let Some(effect) = &action.error_effect {
            let failure = Failure {
                error: error.clone(),
                aborted: false,
            };
            store.commit(
                name,
                instance,
                Some(call_id),
                EffectKind::Error,
                args,
                bind_error::<M>(effect, failure, args),
            );
        }
        store.rollback(name, instance, call_id);
        store.set_loading(name, instance, LoadingState::failed(error.clone()));
        if let Some(message) = &action.error_message {
            store.notify_error(name, instance, message(&error, args));
        }
        store.report_failure(FailureReport {
            action: name.to_string(),
            instance: instance.to_string(),
            args: args.clone(),
            state,
            error: error.clone(),
            handled,
        });

        if handled && !action.reject_on_error {
            Ok(Outcome::Failed(error))
        } else {
            Err(error)
        }
    }

    /// Whatever the call settled with after an abort is discarded.
    fn aborted(&self) -> ActionResult<OutputOf<M>> {
        let Self {
            store,
            name,
            instance,
            call_id,
            action,
            args,
        } = *self;

        debug!(store = %store.id(), action = name, instance, "aborted call settled");
        if let Some(effect) = &action.error_effect {
            let failure = Failure {
                error: ActionError::Aborted {
                    action: name.to_string(),
                },
                aborted: true,
            };
            store.commit(
                name,
                instance,
                Some(call_id),
                EffectKind::Error,
                args,
                bind_error::<M>(effect, failure, args),
            );
        }
        store.rollback(name, instance, call_id);
        Ok(Outcome::Aborted)
    }
}
