//! Standard paths used by copilot-mcp

use std::path::PathBuf;

/// Standard copilot-mcp paths
pub struct Paths {
    /// Config directory (~/.config/copilot-mcp)
    pub config: PathBuf,
    /// Preferred log directory (~/.local/share/copilot-mcp/logs on Linux)
    pub logs: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    pub fn new() -> Self {
        let config = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("copilot-mcp");

        // No platform data dir: keep logs next to the working directory
        let logs = dirs::data_local_dir()
            .map(|dir| dir.join("copilot-mcp").join("logs"))
            .unwrap_or_else(|| PathBuf::from("logs"));

        Self { config, logs }
    }

    /// Default location of the JSON config file
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.json")
    }
}
