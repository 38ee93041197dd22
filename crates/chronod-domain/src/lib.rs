pub mod config;
pub mod error;

pub use config::{ConfigError, ConfigSeverity, DaemonConfig};
pub use error::{Error, Result};
