//! Conflict policies and the per-slot bookkeeping that applies them.

mod policy;
mod resolver;

pub use policy::ConflictPolicy;
pub(crate) use resolver::{Admission, ConflictResolver, Sender, Started};

/// Instance id of every non-parallel call.
pub const DEFAULT_INSTANCE: &str = "default";
