pub mod config;
pub mod directory;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use directory::{DirectoryError, Member, UserDirectory};
