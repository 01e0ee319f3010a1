use thiserror::Error;

/// Errors raised while assembling a store. Always fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing initial state factory")]
    MissingInitialState,

    #[error("Duplicate action name: {0}")]
    DuplicateAction(String),

    #[error("Action '{0}' uses the parallel policy without an instance id deriver")]
    MissingInstanceId(String),

    #[error("Duplicate derived field: {0}")]
    DuplicateDerived(String),

    #[error("Dependency not found: derived field '{field}' depends on '{missing_dep}'")]
    DependencyNotFound { field: String, missing_dep: String },

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),
}
