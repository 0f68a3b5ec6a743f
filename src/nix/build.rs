//! Building system closures
//!
//! Flakes build `nixosConfigurations.<attr>.config.system.build.<attribute>`
//! with `nix build`; legacy configurations build `<nixpkgs/nixos>` with
//! `nix-build`. Both can go through `nom` for prettier logs.

use crate::error::{Error, Result};
use crate::nix::commands::{CommandRunner, NixCommand};
use crate::nix::detect::ConfigSource;
use crate::types::BuildType;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variable carrying the `--tag` description into the build
pub const GENERATION_TAG_VAR: &str = "NIXOS_GENERATION_TAG";

/// Everything a build needs to know
#[derive(Debug, Clone)]
pub struct BuildRequest<'a> {
    pub source: &'a ConfigSource,
    pub build_type: BuildType,
    pub dry: bool,
    pub out_link: &'a Path,
    pub tag: Option<&'a str>,
    pub impure: bool,
    pub use_nom: bool,
}

/// Builds a configuration into a store path
pub trait BuildInvoker {
    /// Returns the realised closure, or `None` for a dry build
    fn build(&self, request: &BuildRequest<'_>) -> Result<Option<PathBuf>>;
}

/// Builds with the Nix command line tools
pub struct NixBuilder<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> NixBuilder<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }
}

impl BuildInvoker for NixBuilder<'_> {
    fn build(&self, request: &BuildRequest<'_>) -> Result<Option<PathBuf>> {
        info!("building {}", request.build_type.attribute());
        self.runner.run(&build_command(request))?;

        if request.dry {
            return Ok(None);
        }

        fs::read_link(request.out_link)
            .map(Some)
            .map_err(|e| Error::resource(request.out_link, e))
    }
}

fn build_command(request: &BuildRequest<'_>) -> NixCommand {
    let attribute = request.build_type.attribute();

    let command = match request.source {
        ConfigSource::Flake { uri, attr } => {
            let program = if request.use_nom { "nom" } else { "nix" };
            let installable = format!(
                "{}#nixosConfigurations.{}.config.system.build.{}",
                uri, attr, attribute
            );
            // nom dispatches on its first argument, so `build` leads
            let mut command = NixCommand::new(program)
                .arg("build")
                .arg(installable)
                .args(["--extra-experimental-features", "nix-command flakes"])
                .arg("--out-link")
                .arg(request.out_link);
            if request.impure {
                command = command.arg("--impure");
            }
            command
        }
        ConfigSource::Legacy { path } => {
            let program = if request.use_nom { "nom-build" } else { "nix-build" };
            let mut command = NixCommand::new(program)
                .arg("<nixpkgs/nixos>")
                .args(["-A", attribute])
                .arg("--out-link")
                .arg(request.out_link);
            if let Some(path) = path {
                command = command
                    .arg("-I")
                    .arg(format!("nixos-config={}", path.display()));
            }
            command
        }
    };

    let command = if request.dry {
        command.arg("--dry-run")
    } else {
        command
    };

    match request.tag {
        Some(tag) => command.env(GENERATION_TAG_VAR, tag),
        None => command,
    }
}

/// Find the `run-<host>-vm` script inside a VM build
pub fn find_vm_runner(result: &Path) -> Result<PathBuf> {
    let pattern = result.join("bin").join("run-*-vm");
    let pattern = pattern.to_string_lossy();
    let mut matches = glob::glob(&pattern)
        .map_err(|e| Error::validation(format!("invalid VM runner pattern: {}", e)))?
        .flatten();

    matches.next().ok_or_else(|| {
        Error::validation(format!(
            "no run-*-vm script found in {}",
            result.join("bin").display()
        ))
    })
}
