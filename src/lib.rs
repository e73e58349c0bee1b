// Hostwatch Library - Public API

// Re-export error types
pub mod error;
pub use error::{HostwatchError, Result};

// Module declarations
pub mod config;
pub mod host;
pub mod http;
pub mod monitor;
pub mod platform;

// Re-export commonly used types
pub use config::Config;

// Initialize logging
pub fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}
