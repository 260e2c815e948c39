//! copilot-mcp
//!
//! Usage:
//!   copilot-mcp
//!
//! The server communicates over stdio using JSON-RPC 2.0. Configuration
//! comes from `~/.config/copilot-mcp/config.json` and the environment.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use copilot_core::{logging, Config, LoggerConfig, Paths};
use copilot_mcp::{build_server, Assistant, PromptCatalog, PromptSource};

#[derive(Parser)]
#[command(name = "copilot-mcp")]
#[command(version, about = "MCP server exposing code editing tools backed by the Copilot CLI")]
#[command(help_template = "{name} (MCP over stdio). Run with an MCP client; no CLI options.\n")]
struct Cli {
    /// Anything else on the command line is ignored
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, hide = true)]
    _args: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    Cli::parse();

    let paths = Paths::new();
    let config = Config::from_env(&paths).context("Failed to load configuration")?;

    // stdout is for MCP protocol; logs go to a file, else stderr
    let logger = LoggerConfig::resolve(&config.log_level, &config.log_dir(&paths));
    logging::init(&logger).context("Failed to initialize logging")?;

    let source = PromptSource::from_dir(config.prompts_dir.clone());
    let catalog = PromptCatalog::load(&source)
        .await
        .context("Failed to load prompts")?;

    let assistant = Assistant::from_config(&config).context("Failed to resolve working directory")?;
    let working_dir = assistant.working_dir().display().to_string();

    let server = build_server(Arc::new(catalog), Arc::new(assistant));
    info!(
        command = %config.assistant_command,
        working_dir = %working_dir,
        "copilot-mcp server is running over stdio"
    );

    server.run_stdio().await
}
