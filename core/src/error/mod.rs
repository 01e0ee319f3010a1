pub mod action;
pub mod config;

pub use action::ActionError;
pub use config::ConfigError;
