//! Configuration management for nixgen
//!
//! Handles loading and default configuration values.
//! Lookup order: `$NIXGEN_CONFIG`, `/etc/nixgen/config.toml`,
//! `~/.config/nixgen/config.toml`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// System-wide config file
pub const SYSTEM_CONFIG_PATH: &str = "/etc/nixgen/config.toml";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Flake reference or path to the system configuration
    pub config_location: String,
    /// Program used to re-execute with root privileges
    pub root_command: String,
    /// Skip confirmation prompts unless a command overrides it
    pub no_confirm: bool,
    pub apply: ApplyOptions,
    pub diff: DiffOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_location: String::new(),
            root_command: "sudo".to_string(),
            no_confirm: false,
            apply: ApplyOptions::default(),
            diff: DiffOptions::default(),
        }
    }
}

impl Config {
    /// Get the config file path
    pub fn path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os("NIXGEN_CONFIG") {
            return Some(PathBuf::from(path));
        }

        let system = PathBuf::from(SYSTEM_CONFIG_PATH);
        if system.exists() {
            return Some(system);
        }

        dirs::config_dir().map(|d| d.join("nixgen").join("config.toml"))
    }

    /// Load config from file, or fall back to defaults if none exists
    pub fn load() -> Result<Self> {
        match Self::path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                debug!("no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;

        toml::from_str(&content).with_context(|| format!("Failed to parse config from {:?}", path))
    }

    /// Configured flake reference or configuration path, if any
    pub fn config_location(&self) -> Option<&str> {
        Some(self.config_location.trim()).filter(|s| !s.is_empty())
    }
}

/// Defaults for `apply` and generation switching
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ApplyOptions {
    /// Specialisation activated when none is given on the command line
    pub specialisation: Option<String>,
    /// Build through `nom` for nicer build logs
    pub use_nom: bool,
    /// Pass `--impure` to flake builds when `--tag` is used
    pub imply_impure_with_tag: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            specialisation: None,
            use_nom: false,
            imply_impure_with_tag: true,
        }
    }
}

/// Closure diff tool
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DiffOptions {
    /// Program and leading arguments; the two closure paths are appended
    pub command: Vec<String>,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            command: vec![
                "nix".to_string(),
                "store".to_string(),
                "diff-closures".to_string(),
            ],
        }
    }
}
