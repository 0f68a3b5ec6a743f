//! Activation of new and existing generations
//!
//! `apply` builds a configuration and activates it; `switch` and `rollback`
//! activate a generation that already exists. Both share the tail of the
//! pipeline: diff, confirm, specialisation lookup, profile update and
//! `switch-to-configuration`, with the profile restored to its previous
//! generation when activation fails.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::nix::build::{find_vm_runner, BuildInvoker, BuildRequest};
use crate::nix::commands::{
    set_profile, switch_profile_generation, switch_to_configuration, update_channels,
    CommandRunner,
};
use crate::nix::detect::ConfigSource;
use crate::nix::diff::Differ;
use crate::nix::generations::{current_generation_number, find_generation, gather_generations};
use crate::nix::specialisation;
use crate::privilege::PrivilegeEscalation;
use crate::prompt::Confirm;
use crate::types::{ActivationAction, BuildType, Outcome, Profile};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Flags of `apply`
#[derive(Debug, Clone, Default)]
pub struct ApplyRequest {
    pub dry: bool,
    pub output: Option<PathBuf>,
    pub no_activate: bool,
    pub no_boot: bool,
    pub vm: bool,
    pub vm_with_bootloader: bool,
    pub install_bootloader: bool,
    pub tag: Option<String>,
    pub yes: bool,
    pub specialisation: Option<String>,
    /// Update the `nixos` channel (or all channels) before building
    pub upgrade: bool,
    pub upgrade_all: bool,
    pub use_nom: bool,
}

impl ApplyRequest {
    /// Reject flag combinations before any work starts
    pub fn validate(&self) -> Result<()> {
        if self.vm && self.vm_with_bootloader {
            return Err(Error::validation(
                "--vm and --vm-with-bootloader are mutually exclusive",
            ));
        }
        if self.no_activate && self.no_boot && self.install_bootloader {
            return Err(Error::validation(
                "--install-bootloader requires activation; drop --no-activate or --no-boot",
            ));
        }
        Ok(())
    }

    pub fn build_type(&self) -> BuildType {
        select_build_type(self.vm, self.vm_with_bootloader, self.no_activate, self.no_boot)
    }

    pub fn action(&self) -> ActivationAction {
        select_action(self.dry, self.no_activate, self.no_boot)
    }
}

/// Flags of `generation switch` and `generation rollback`
#[derive(Debug, Clone, Default)]
pub struct SwitchRequest {
    pub dry: bool,
    pub yes: bool,
    pub specialisation: Option<String>,
}

pub fn select_build_type(
    vm: bool,
    vm_with_bootloader: bool,
    no_activate: bool,
    no_boot: bool,
) -> BuildType {
    if vm {
        BuildType::Vm
    } else if vm_with_bootloader {
        BuildType::VmWithBootloader
    } else if no_activate && no_boot {
        BuildType::System
    } else {
        BuildType::SystemActivation
    }
}

/// A dry run always maps to `dry-activate`, whatever else is requested
pub fn select_action(dry: bool, no_activate: bool, no_boot: bool) -> ActivationAction {
    if dry {
        ActivationAction::DryActivate
    } else if !no_activate && !no_boot {
        ActivationAction::Switch
    } else if no_activate && !no_boot {
        ActivationAction::Boot
    } else {
        ActivationAction::Test
    }
}

/// What is being activated
#[derive(Debug, Clone)]
enum Target {
    /// A freshly built closure, added to the profile with `--set`
    Built(PathBuf),
    /// An existing generation, selected with `--switch-generation`
    Generation { number: u64, closure: PathBuf },
}

impl Target {
    fn closure(&self) -> &Path {
        match self {
            Target::Built(closure) => closure,
            Target::Generation { closure, .. } => closure,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ActivateOptions<'a> {
    yes: bool,
    specialisation: Option<&'a str>,
    install_bootloader: bool,
}

/// Orchestrates building and activating generations
pub struct ActivationEngine<'a> {
    pub runner: &'a dyn CommandRunner,
    pub builder: &'a dyn BuildInvoker,
    pub prompt: &'a dyn Confirm,
    pub privileges: &'a dyn PrivilegeEscalation,
    pub differ: &'a Differ,
    pub config: &'a Config,
    pub profile: &'a Profile,
    /// Closure of the running system, diffed against the activation target
    pub current_system: PathBuf,
}

impl ActivationEngine<'_> {
    /// Build a configuration and activate it
    pub fn apply(&self, source: &ConfigSource, request: &ApplyRequest) -> Result<Outcome> {
        request.validate()?;
        let build_type = request.build_type();
        debug!("build type {:?}", build_type);

        let upgrade = request.upgrade || request.upgrade_all;
        if upgrade && source.is_flake() {
            warn!("--upgrade only applies to channel-based configurations; ignoring");
        }
        let upgrade_channels = upgrade && !source.is_flake();

        // root's channels are the ones the system builds from
        if build_type.activates() || upgrade_channels {
            self.privileges.ensure_root()?;
        }

        if upgrade_channels {
            update_channels(self.runner, request.upgrade_all)?;
        }

        let scratch = tempfile::Builder::new()
            .prefix("nixgen-")
            .tempdir()
            .map_err(|e| Error::resource(std::env::temp_dir(), e))?;
        let out_link = request
            .output
            .clone()
            .unwrap_or_else(|| scratch.path().join("result"));

        let impure =
            request.tag.is_some() && source.is_flake() && self.config.apply.imply_impure_with_tag;
        let built = self.builder.build(&BuildRequest {
            source,
            build_type,
            // dry-activate still needs a real closure to activate
            dry: request.dry && !build_type.activates(),
            out_link: &out_link,
            tag: request.tag.as_deref(),
            impure,
            use_nom: request.use_nom || self.config.apply.use_nom,
        })?;

        let Some(closure) = built else {
            println!("Dry build finished; nothing was activated.");
            return Ok(Outcome::Completed);
        };

        if build_type.is_vm() {
            let vm_runner = find_vm_runner(&closure)?;
            println!("Built VM; start it with:\n  {}", vm_runner.display());
            return Ok(Outcome::Completed);
        }

        if !build_type.activates() {
            println!("Built {}", closure.display());
            return Ok(Outcome::Completed);
        }

        self.activate(
            Target::Built(closure),
            request.action(),
            ActivateOptions {
                yes: request.yes,
                specialisation: request.specialisation.as_deref(),
                install_bootloader: request.install_bootloader,
            },
        )
    }

    /// Activate an existing generation
    pub fn switch_generation(&self, number: u64, request: &SwitchRequest) -> Result<Outcome> {
        find_generation(self.profile, number)?;
        self.privileges.ensure_root()?;

        let action = if request.dry {
            ActivationAction::DryActivate
        } else {
            ActivationAction::Switch
        };
        let target = Target::Generation {
            number,
            closure: self.profile.generation_path(number),
        };

        self.activate(
            target,
            action,
            ActivateOptions {
                yes: request.yes,
                specialisation: request.specialisation.as_deref(),
                install_bootloader: false,
            },
        )
    }

    /// Activate the closest generation older than the current one
    pub fn rollback_generation(&self, request: &SwitchRequest) -> Result<Outcome> {
        let generations = gather_generations(self.profile)?;
        let current = generations
            .iter()
            .find(|g| g.is_current)
            .map(|g| g.number)
            .ok_or_else(|| {
                Error::validation(format!(
                    "cannot determine the current generation of profile '{}'",
                    self.profile.name
                ))
            })?;

        let previous = generations
            .iter()
            .map(|g| g.number)
            .filter(|n| *n < current)
            .max()
            .ok_or_else(|| {
                Error::validation(format!("no generation older than {} exists", current))
            })?;

        info!("rolling back from generation {} to {}", current, previous);
        self.switch_generation(previous, request)
    }

    fn activate(
        &self,
        target: Target,
        action: ActivationAction,
        options: ActivateOptions<'_>,
    ) -> Result<Outcome> {
        self.differ
            .show(self.runner, &self.current_system, target.closure());

        if !(options.yes || self.config.no_confirm) {
            let question = match &target {
                Target::Built(_) => format!("Activate this configuration ({})?", action.as_str()),
                Target::Generation { number, .. } => {
                    format!("Activate generation {} ({})?", number, action.as_str())
                }
            };
            if !self.prompt.confirm(&question)? {
                return Ok(Outcome::Declined);
            }
        }

        let resolved = specialisation::resolve(
            target.closure(),
            options.specialisation,
            self.config.apply.specialisation.as_deref(),
        );
        if let Some(name) = &resolved.specialisation {
            info!("activating specialisation '{}'", name);
        }

        if !action.sets_profile() {
            switch_to_configuration(
                self.runner,
                &resolved.path,
                action,
                options.install_bootloader,
            )?;
            return Ok(Outcome::Completed);
        }

        let anchor = current_generation_number(self.profile);
        if anchor.is_none() {
            warn!(
                "profile '{}' has no current generation; a failed activation cannot be rolled back",
                self.profile.name
            );
        }
        let guard = ProfileRollback::arm(self.runner, self.profile, anchor);

        let result = self.point_profile_at(&target).and_then(|()| {
            switch_to_configuration(
                self.runner,
                &resolved.path,
                action,
                options.install_bootloader,
            )
        });

        match result {
            Ok(()) => {
                guard.commit();
                Ok(Outcome::Completed)
            }
            Err(err) => {
                error!("activation failed: {}", err);
                Err(guard.roll_back(err))
            }
        }
    }

    fn point_profile_at(&self, target: &Target) -> Result<()> {
        match target {
            Target::Built(closure) => set_profile(self.runner, self.profile, closure),
            Target::Generation { number, .. } => {
                switch_profile_generation(self.runner, self.profile, *number)
            }
        }
    }
}

/// Restores the profile to its pre-activation generation unless committed
///
/// Consumed by exactly one of [`commit`](Self::commit) or
/// [`roll_back`](Self::roll_back). Dropping it unsettled (a panic between
/// arming and settling) restores the profile too.
struct ProfileRollback<'a> {
    runner: &'a dyn CommandRunner,
    profile: &'a Profile,
    anchor: Option<u64>,
    committed: bool,
    restored: bool,
}

impl<'a> ProfileRollback<'a> {
    fn arm(runner: &'a dyn CommandRunner, profile: &'a Profile, anchor: Option<u64>) -> Self {
        Self {
            runner,
            profile,
            anchor,
            committed: false,
            restored: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }

    /// Restore the anchor generation and return the error to report
    fn roll_back(mut self, original: Error) -> Error {
        self.restored = true;
        match restore_profile(self.runner, self.profile, self.anchor) {
            Ok(()) => original,
            Err(rollback) => Error::RollbackFailed {
                original: Box::new(original),
                rollback: Box::new(rollback),
                anchor: self.anchor,
            },
        }
    }
}

impl Drop for ProfileRollback<'_> {
    fn drop(&mut self) {
        if self.committed || self.restored {
            return;
        }
        if let Err(e) = restore_profile(self.runner, self.profile, self.anchor) {
            error!(
                "failed to restore profile '{}': {}; manual recovery is required",
                self.profile.name, e
            );
        }
    }
}

/// Point the profile back at `anchor`; a no-op when it already is
fn restore_profile(
    runner: &dyn CommandRunner,
    profile: &Profile,
    anchor: Option<u64>,
) -> Result<()> {
    let anchor = anchor.ok_or(Error::NoRollbackAnchor)?;

    if current_generation_number(profile) == Some(anchor) {
        debug!("profile '{}' already at generation {}", profile.name, anchor);
        return Ok(());
    }

    switch_profile_generation(runner, profile, anchor)?;
    warn!(
        "restored profile '{}' to generation {}",
        profile.name, anchor
    );
    Ok(())
}
