//! KDL configuration parsing for BuildIt CI/CD.
//!
//! This crate handles parsing of:
//! - Pipeline definitions (buildit.kdl)
//! - Server configuration

pub mod error;
mod kdl_ext;
pub mod pipeline;
pub mod system;

pub use error::{ConfigError, ConfigResult};
pub use pipeline::{load_pipeline, parse_pipeline};
pub use system::{LogFormat, ServerConfig, SystemConfig, load_system_config, parse_system_config};
