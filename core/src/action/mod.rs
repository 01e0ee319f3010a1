//! Action definitions and dispatch results.

pub mod def;
pub mod model;
pub mod outcome;

pub use def::{
    ActionDef, AdvancedSyncAction, AsyncAction, CallContext, CallFn, CallFuture, Effect,
    ErrorEffect, Failure, SuccessEffect, SyncAction,
};
pub use model::{ArgsOf, Model, OutputOf, PropsOf, StateOf};
pub use outcome::{ActionResult, Outcome, Pending};
