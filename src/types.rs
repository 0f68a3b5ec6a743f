//! Core data types for nixgen
//!
//! This module defines all shared data structures used throughout the application.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root directory holding the default `system` profile
pub const PROFILES_DIR: &str = "/nix/var/nix/profiles";
/// Directory holding named system profiles
pub const SYSTEM_PROFILES_DIR: &str = "/nix/var/nix/profiles/system-profiles";
/// Name of the default system profile
pub const DEFAULT_PROFILE: &str = "system";

/// Placeholder shown for metadata that could not be read
pub const UNKNOWN: &str = "unknown";

/// Represents a NixOS generation registered in a profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Generation {
    pub number: u64,
    pub creation_date: Option<DateTime<Local>>,
    pub is_current: bool,
    pub nixos_version: Option<String>,
    pub nixpkgs_revision: Option<String>,
    pub configuration_revision: Option<String>,
    pub kernel_version: Option<String>,
    pub description: Option<String>,
    pub specialisations: Vec<String>,
}

impl Generation {
    /// A generation with no metadata besides its number
    #[cfg(test)]
    pub fn bare(number: u64) -> Self {
        Self {
            number,
            creation_date: None,
            is_current: false,
            nixos_version: None,
            nixpkgs_revision: None,
            configuration_revision: None,
            kernel_version: None,
            description: None,
            specialisations: Vec::new(),
        }
    }

    /// Format the date for display
    pub fn formatted_date(&self) -> String {
        self.creation_date
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| UNKNOWN.to_string())
    }

    pub fn display_version(&self) -> &str {
        self.nixos_version.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn display_kernel(&self) -> &str {
        self.kernel_version.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn display_description(&self) -> &str {
        self.description.as_deref().unwrap_or("(unknown)")
    }
}

/// A named profile: a symlink to the current generation plus its numbered links
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub directory: PathBuf,
}

impl Profile {
    pub fn new(name: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            directory: directory.into(),
        }
    }

    /// Resolve a profile by name using the standard NixOS locations
    pub fn named(name: &str) -> Self {
        if name == DEFAULT_PROFILE {
            Self::new(name, PROFILES_DIR)
        } else {
            Self::new(name, SYSTEM_PROFILES_DIR)
        }
    }

    /// The profile symlink itself, e.g. `/nix/var/nix/profiles/system`
    pub fn link_path(&self) -> PathBuf {
        self.directory.join(&self.name)
    }

    /// File name of a generation link, e.g. `system-42-link`
    pub fn link_name(&self, number: u64) -> String {
        format!("{}-{}-link", self.name, number)
    }

    /// Path of a generation link
    pub fn generation_path(&self, number: u64) -> PathBuf {
        self.directory.join(self.link_name(number))
    }

    /// Parse a directory entry name as a generation link of this profile
    ///
    /// The entry must be exactly `<name>-<digits>-link`. Entries of profiles
    /// sharing a name prefix (`system-foo-3-link` for profile `system`) are
    /// rejected because the middle part is not purely numeric.
    pub fn parse_link_name(&self, file_name: &str) -> Option<u64> {
        let digits = file_name
            .strip_prefix(self.name.as_str())?
            .strip_prefix('-')?
            .strip_suffix("-link")?;

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        digits.parse::<u64>().ok().filter(|n| *n > 0)
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::named(DEFAULT_PROFILE)
    }
}

/// Deletion policy for `generation delete`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionSpec {
    pub all: bool,
    pub from: Option<u64>,
    pub to: Option<u64>,
    pub older_than: Option<Duration>,
    pub keep: BTreeSet<u64>,
    pub min: Option<usize>,
    pub remove: BTreeSet<u64>,
}

impl DeletionSpec {
    /// Whether any selector besides `all` is set
    pub fn has_selectors(&self) -> bool {
        self.from.is_some()
            || self.to.is_some()
            || self.older_than.is_some()
            || !self.keep.is_empty()
            || self.min.is_some()
            || !self.remove.is_empty()
    }
}

/// What gets built, and whether activation follows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildType {
    /// Build the system closure only
    System,
    /// Build the system closure and activate it
    SystemActivation,
    Vm,
    VmWithBootloader,
}

impl BuildType {
    /// Attribute under `config.system.build` to build
    pub fn attribute(&self) -> &'static str {
        match self {
            BuildType::System | BuildType::SystemActivation => "toplevel",
            BuildType::Vm => "vm",
            BuildType::VmWithBootloader => "vmWithBootLoader",
        }
    }

    pub fn activates(&self) -> bool {
        matches!(self, BuildType::SystemActivation)
    }

    pub fn is_vm(&self) -> bool {
        matches!(self, BuildType::Vm | BuildType::VmWithBootloader)
    }
}

/// Argument passed to `switch-to-configuration`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationAction {
    Switch,
    Boot,
    Test,
    DryActivate,
}

impl ActivationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivationAction::Switch => "switch",
            ActivationAction::Boot => "boot",
            ActivationAction::Test => "test",
            ActivationAction::DryActivate => "dry-activate",
        }
    }

    /// Whether this action makes the new closure the profile's default
    pub fn sets_profile(&self) -> bool {
        matches!(self, ActivationAction::Switch | ActivationAction::Boot)
    }
}

/// How an operation ended when it did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// The operator answered no at a confirmation prompt
    Declined,
    /// Nothing needed doing; the message says why
    NothingToDo(String),
}

/// Closure path of the running system
pub fn current_system_path() -> &'static Path {
    Path::new("/run/current-system")
}
