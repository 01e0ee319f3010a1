//! Derived state: memoized values computed from state, props and other
//! derived fields.

pub mod engine;
pub mod field;

pub use engine::DerivedEngine;
pub use field::{Dep, DepValue, DerivedField, DerivedValue, DerivedValues};
