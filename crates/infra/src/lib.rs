//! Infrastructure layer: job queue storage, processing, domain record
//! storage, external service adapters, config.

pub mod config;
pub mod content;
pub mod db;
pub mod external;
pub mod jobs;

pub use config::{ConfigError, ProcessorConfig};
