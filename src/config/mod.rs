pub mod discovery;
pub mod error;
pub mod loader;
pub mod types;

pub use discovery::{discover, discover_verbose, DiscoveryResult};
pub use error::ConfigError;
pub use loader::{expand_path, load, load_single_file};
pub use types::{Config, FilterRule, FilterSpec};
