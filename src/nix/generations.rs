//! Generation listing and parsing
//!
//! Reconstructs the generations of a profile from the profile directory alone:
//! generation links, the profile symlink and each closure's version manifest.
//! Nothing here mutates the profile.

use crate::error::{Error, Result};
use crate::types::{Generation, Profile};
use chrono::{DateTime, Local, Utc};
use serde::Deserialize;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use tracing::{debug, warn};

/// Contents of `<generation>/nixos-version.json`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct VersionManifest {
    nixos_version: Option<String>,
    nixpkgs_revision: Option<String>,
    configuration_revision: Option<String>,
    description: Option<String>,
}

/// List all generations of a profile, ascending by number
pub fn gather_generations(profile: &Profile) -> Result<Vec<Generation>> {
    let entries = fs::read_dir(&profile.directory)
        .map_err(|e| Error::resource(&profile.directory, e))?;

    let mut numbers = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::resource(&profile.directory, e))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(number) = profile.parse_link_name(name) {
            numbers.push(number);
        }
    }
    numbers.sort_unstable();

    let current = current_generation_number(profile);
    if current.is_none() && !numbers.is_empty() {
        warn!(
            "could not determine the current generation of profile '{}'",
            profile.name
        );
    }

    let generations = numbers
        .into_iter()
        .map(|number| read_generation(profile, number, current == Some(number)))
        .collect();

    Ok(generations)
}

/// Number of the generation the profile symlink points at
///
/// Returns `None` when the link is missing or does not name a generation of
/// this profile; callers treat that as degraded state, not an error.
pub fn current_generation_number(profile: &Profile) -> Option<u64> {
    let link = profile.link_path();
    let target = match fs::read_link(&link) {
        Ok(target) => target,
        Err(e) => {
            debug!("failed to read profile link {}: {}", link.display(), e);
            return None;
        }
    };

    let name = target.file_name()?.to_str()?;
    profile.parse_link_name(name)
}

/// Look up one generation by number
pub fn find_generation(profile: &Profile, number: u64) -> Result<Generation> {
    gather_generations(profile)?
        .into_iter()
        .find(|g| g.number == number)
        .ok_or_else(|| {
            Error::validation(format!(
                "generation {} does not exist in profile '{}'",
                number, profile.name
            ))
        })
}

/// Parse a single generation's metadata
///
/// Every field is best effort; a missing file only blanks that field.
fn read_generation(profile: &Profile, number: u64, is_current: bool) -> Generation {
    let link = profile.generation_path(number);
    let manifest = read_version_manifest(&link);

    let nixos_version = manifest
        .as_ref()
        .and_then(|m| m.nixos_version.clone())
        .or_else(|| read_plain_version(&link));

    let (nixpkgs_revision, configuration_revision, description) = match manifest {
        Some(m) => (m.nixpkgs_revision, m.configuration_revision, m.description),
        None => (None, None, None),
    };

    Generation {
        number,
        creation_date: creation_date(&link),
        is_current,
        nixos_version,
        nixpkgs_revision,
        configuration_revision,
        kernel_version: kernel_version(&link),
        description,
        specialisations: list_specialisations(&link),
    }
}

fn read_version_manifest(gen_path: &Path) -> Option<VersionManifest> {
    let path = gen_path.join("nixos-version.json");
    let content = fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&content) {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            debug!("ignoring malformed {}: {}", path.display(), e);
            None
        }
    }
}

fn read_plain_version(gen_path: &Path) -> Option<String> {
    fs::read_to_string(gen_path.join("nixos-version"))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Kernel version from `kernel-modules/lib/modules/<version>`
fn kernel_version(gen_path: &Path) -> Option<String> {
    let modules_dir = gen_path.join("kernel-modules/lib/modules");
    let mut versions: Vec<String> = fs::read_dir(modules_dir)
        .ok()?
        .flatten()
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    versions.sort();
    versions.into_iter().next()
}

/// Specialisation names, sorted
pub fn list_specialisations(closure: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(closure.join("specialisation")) else {
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

/// Birth time of the generation link, falling back to its change time
fn creation_date(link: &Path) -> Option<DateTime<Local>> {
    let meta = fs::symlink_metadata(link).ok()?;

    if let Ok(created) = meta.created() {
        return Some(DateTime::<Local>::from(created));
    }

    DateTime::<Utc>::from_timestamp(meta.ctime(), meta.ctime_nsec() as u32)
        .map(|d| d.with_timezone(&Local))
}
