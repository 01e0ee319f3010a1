//! In-process state container that runs declared actions: conflict
//! policies for overlapping calls, optimistic effects with rollback by
//! replay, retries, cooperative aborts and memoized derived state.

pub mod action;
pub mod config;
pub mod conflict;
pub mod derived;
pub mod error;
pub mod executor;
pub mod graph;
pub mod history;
pub mod store;
mod util;

pub use action::{
    ActionDef, ActionResult, AdvancedSyncAction, AsyncAction, CallContext, Failure, Model,
    Outcome, Pending, SyncAction,
};
pub use config::StoreConfig;
pub use conflict::{ConflictPolicy, DEFAULT_INSTANCE};
pub use derived::{Dep, DerivedField, DerivedValues};
pub use error::{ActionError, ConfigError};
pub use executor::{AbortSignal, LinearBackoff, RetryStrategy};
pub use store::{
    FailureReport, LoadingState, Notice, Store, StoreBuilder, StoreEvent, Subscription,
};
