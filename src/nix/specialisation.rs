//! Specialisation lookup inside a built closure
//!
//! Precedence: explicit flag, then the configured default, then the default
//! recorded in the closure itself. A name that does not exist in the closure
//! falls back to the base configuration with a warning.

use crate::config::Config;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Config file embedded in a closure by the NixOS module
pub const CLOSURE_CONFIG_PATH: &str = "etc/nixgen/config.toml";

/// The closure to activate after specialisation resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedClosure {
    pub path: PathBuf,
    pub specialisation: Option<String>,
}

/// Default specialisation recorded in the closure's own config
pub fn closure_default(closure: &Path) -> Option<String> {
    let path = closure.join(CLOSURE_CONFIG_PATH);
    let content = fs::read_to_string(&path).ok()?;
    match toml::from_str::<Config>(&content) {
        Ok(config) => config.apply.specialisation.filter(|s| !s.is_empty()),
        Err(e) => {
            debug!("ignoring unparsable {}: {}", path.display(), e);
            None
        }
    }
}

/// Path of a specialisation, if it exists and is activatable
pub fn specialisation_path(closure: &Path, name: &str) -> Option<PathBuf> {
    if name.is_empty() || name.contains('/') {
        return None;
    }
    let path = closure.join("specialisation").join(name);
    path.join("bin/switch-to-configuration")
        .exists()
        .then_some(path)
}

/// Pick the closure to activate
pub fn resolve(closure: &Path, explicit: Option<&str>, configured: Option<&str>) -> ResolvedClosure {
    let base = ResolvedClosure {
        path: closure.to_path_buf(),
        specialisation: None,
    };

    let name = explicit
        .map(str::to_string)
        .or_else(|| configured.map(str::to_string))
        .or_else(|| closure_default(closure));

    let Some(name) = name.filter(|n| !n.is_empty()) else {
        return base;
    };

    match specialisation_path(closure, &name) {
        Some(path) => ResolvedClosure {
            path,
            specialisation: Some(name),
        },
        None => {
            warn!(
                "specialisation '{}' does not exist in {}; using the base configuration",
                name,
                closure.display()
            );
            base
        }
    }
}
