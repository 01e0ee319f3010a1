//! Runs dispatched actions.
//!
//! ```text
//! Store::dispatch(name, args)
//!   ↓
//! Sync / AdvancedSync → commit (+ debounced side effect)
//! Async → ConflictResolver::admit()
//!   ↓ Start
//! call(attempt 1) → pre-effect → optimistic effect
//!   ↓ tokio::spawn
//! call_with_retry() → settle (success / error / aborted) → next queued call
//! ```

mod abort;
mod retry;
mod run;
mod sync;

pub use abort::AbortSignal;
pub use retry::{LinearBackoff, RetryStrategy, RetryablePredicate};

pub(crate) use retry::{call_with_retry, RetryRun};
pub(crate) use run::{abort, dispatch_async};
pub(crate) use sync::{dispatch_advanced, dispatch_sync};

use std::sync::Arc;

use crate::action::{ArgsOf, Effect, ErrorEffect, Failure, Model, OutputOf, SuccessEffect};
use crate::history::Replay;

/// Fixes the arguments of an effect so it can be replayed later.
pub(crate) fn bind<M: Model>(effect: &Effect<M>, args: &ArgsOf<M>) -> Replay<M> {
    let effect = Arc::clone(effect);
    let args = args.clone();
    Arc::new(move |state| effect(state, &args))
}

pub(crate) fn bind_success<M: Model>(
    effect: &SuccessEffect<M>,
    value: &OutputOf<M>,
    args: &ArgsOf<M>,
) -> Replay<M> {
    let effect = Arc::clone(effect);
    let value = value.clone();
    let args = args.clone();
    Arc::new(move |state| effect(state, &value, &args))
}

pub(crate) fn bind_error<M: Model>(
    effect: &ErrorEffect<M>,
    failure: Failure,
    args: &ArgsOf<M>,
) -> Replay<M> {
    let effect = Arc::clone(effect);
    let args = args.clone();
    Arc::new(move |state| effect(state, &failure, &args))
}
