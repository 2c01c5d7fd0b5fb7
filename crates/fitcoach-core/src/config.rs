use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};

/// Compile-time base URL override, e.g. `FITCOACH_API_BASE=https://coach.example cargo build`
pub const BUILD_API_BASE: Option<&str> = option_env!("FITCOACH_API_BASE");

/// Where the backend listens when nothing overrides it
pub const DEFAULT_API_BASE: &str = "http://localhost:8080";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    pub api_base: Option<String>,
    #[serde(default = "default_include_context")]
    pub include_context: bool,
}

fn default_include_context() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            api_base: None,
            include_context: default_include_context(),
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    /// Pick the backend origin: explicit override, then config file, then build env, then default.
    pub fn resolve_api_base(&self, cli_override: Option<&str>) -> String {
        let base = cli_override
            .filter(|s| !s.trim().is_empty())
            .or(self.api_base.as_deref().filter(|s| !s.trim().is_empty()))
            .or(BUILD_API_BASE.filter(|s| !s.trim().is_empty()))
            .unwrap_or(DEFAULT_API_BASE);
        base.trim().trim_end_matches('/').to_string()
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("fitcoach"))
    }

    fn get_config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }
}
