mod load;
mod types;

pub use load::{apply_overrides, load_default, DEFAULT_CONFIG_FILE};
pub use types::{ConflictConfig, EventsConfig, HistoryConfig, RetryConfig, StoreConfig};
