//! copilot-core - Shared functionality for copilot-mcp
//!
//! Configuration, standard paths and the JSON-lines logger used by the
//! MCP server.

pub mod config;
pub mod logging;
pub mod paths;

pub use config::{Config, ConfigError};
pub use logging::{truncate, LoggerConfig};
pub use paths::Paths;
