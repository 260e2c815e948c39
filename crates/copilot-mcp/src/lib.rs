//! copilot-mcp
//!
//! MCP server exposing code editing tools backed by the Copilot CLI.
//! Each tool call renders a prompt template and runs `copilot` once.
//! Implements MCP over stdio using JSON-RPC 2.0.

pub mod assistant;
pub mod handler;
pub mod prompts;
pub mod protocol;
pub mod render;
pub mod server;
pub mod tools;

pub use assistant::Assistant;
pub use handler::build_server;
pub use prompts::{PromptCatalog, PromptSource};
pub use server::McpServer;
