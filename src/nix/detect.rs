//! Configuration source detection
//!
//! Decides where the system configuration lives:
//! - an explicit `--flake` reference or `--file` path
//! - `$NIXOS_CONFIG` or the configured `config_location`
//! - `/etc/nixos/flake.nix`, otherwise `<nixos-config>` from `NIX_PATH`

use crate::config::Config;
use crate::error::{Error, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Directory checked for a system flake when nothing else is configured
pub const DEFAULT_FLAKE_DIR: &str = "/etc/nixos";

/// Where the system configuration comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// `<uri>#nixosConfigurations.<attr>`
    Flake { uri: String, attr: String },
    /// A `configuration.nix`; `None` means `<nixos-config>` from `NIX_PATH`
    Legacy { path: Option<PathBuf> },
}

impl ConfigSource {
    pub fn is_flake(&self) -> bool {
        matches!(self, ConfigSource::Flake { .. })
    }
}

/// Resolve the configuration source
pub fn resolve_source(
    flake: Option<&str>,
    file: Option<&Path>,
    config: &Config,
) -> Result<ConfigSource> {
    if let Some(path) = file {
        return Ok(ConfigSource::Legacy {
            path: Some(path.to_path_buf()),
        });
    }

    if let Some(reference) = flake {
        return parse_flake_ref(reference, hostname);
    }

    let location = env::var("NIXOS_CONFIG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| config.config_location().map(str::to_string));

    if let Some(location) = location {
        debug!("using configuration location {}", location);
        return if looks_like_flake(&location) {
            parse_flake_ref(&location, hostname)
        } else {
            Ok(ConfigSource::Legacy {
                path: Some(PathBuf::from(location)),
            })
        };
    }

    if Path::new(DEFAULT_FLAKE_DIR).join("flake.nix").exists() {
        return parse_flake_ref(DEFAULT_FLAKE_DIR, hostname);
    }

    Ok(ConfigSource::Legacy { path: None })
}

/// Split `uri#attr`, defaulting the attribute to the hostname
pub fn parse_flake_ref(
    reference: &str,
    hostname: impl FnOnce() -> Option<String>,
) -> Result<ConfigSource> {
    let (uri, attr) = match reference.split_once('#') {
        Some((uri, attr)) => (uri, Some(attr.to_string())),
        None => (reference, None),
    };

    if uri.is_empty() {
        return Err(Error::validation(format!(
            "invalid flake reference '{}'",
            reference
        )));
    }

    let attr = match attr.filter(|a| !a.is_empty()) {
        Some(attr) => attr,
        None => hostname().ok_or_else(|| {
            Error::validation(format!(
                "could not determine the hostname; use '{}#<name>'",
                uri
            ))
        })?,
    };

    Ok(ConfigSource::Flake {
        uri: uri.to_string(),
        attr,
    })
}

fn looks_like_flake(location: &str) -> bool {
    if location.contains('#') {
        return true;
    }
    let schemes = ["github:", "gitlab:", "sourcehut:", "git+", "path:", "flake:", "tarball+"];
    if schemes.iter().any(|s| location.starts_with(s)) {
        return true;
    }
    Path::new(location).join("flake.nix").exists()
}

/// Get the system hostname
pub fn hostname() -> Option<String> {
    // Try /etc/hostname first
    if let Ok(hostname) = std::fs::read_to_string("/etc/hostname") {
        let hostname = hostname.trim().to_string();
        if !hostname.is_empty() {
            return Some(hostname);
        }
    }

    // Fallback to hostname command
    let output = Command::new("hostname").output().ok()?;
    let hostname = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Some(hostname).filter(|h| !h.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> Option<String> {
        Some("desktop".to_string())
    }

    #[test]
    fn test_parse_flake_ref_with_attr() {
        let source = parse_flake_ref("/etc/nixos#laptop", host).unwrap();
        assert_eq!(
            source,
            ConfigSource::Flake {
                uri: "/etc/nixos".into(),
                attr: "laptop".into()
            }
        );
    }

    #[test]
    fn test_parse_flake_ref_defaults_to_hostname() {
        let source = parse_flake_ref("github:me/dotfiles", host).unwrap();
        assert_eq!(
            source,
            ConfigSource::Flake {
                uri: "github:me/dotfiles".into(),
                attr: "desktop".into()
            }
        );
        let source = parse_flake_ref("/etc/nixos#", host).unwrap();
        assert!(matches!(source, ConfigSource::Flake { attr, .. } if attr == "desktop"));
    }

    #[test]
    fn test_parse_flake_ref_errors() {
        assert!(parse_flake_ref("#laptop", host).is_err());
        assert!(parse_flake_ref("/etc/nixos", || None).is_err());
    }

    #[test]
    fn test_explicit_file_wins() {
        let source = resolve_source(
            Some("/etc/nixos#laptop"),
            Some(Path::new("/srv/configuration.nix")),
            &Config::default(),
        )
        .unwrap();
        assert_eq!(
            source,
            ConfigSource::Legacy {
                path: Some(PathBuf::from("/srv/configuration.nix"))
            }
        );
        assert!(!source.is_flake());
    }

    #[test]
    fn test_looks_like_flake() {
        assert!(looks_like_flake("/etc/nixos#host"));
        assert!(looks_like_flake("github:owner/repo"));
        assert!(!looks_like_flake("/nonexistent/configuration.nix"));
    }
}
