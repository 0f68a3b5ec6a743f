//! Deleting generations according to a retention policy

use crate::config::Config;
use crate::display;
use crate::error::Result;
use crate::nix::commands::{delete_generations, switch_to_configuration, CommandRunner};
use crate::nix::generations::gather_generations;
use crate::privilege::PrivilegeEscalation;
use crate::prompt::Confirm;
use crate::retention::{self, Resolution};
use crate::types::{ActivationAction, DeletionSpec, Generation, Outcome, Profile};
use chrono::Local;
use tracing::{debug, info};

pub struct DeletionExecutor<'a> {
    pub runner: &'a dyn CommandRunner,
    pub prompt: &'a dyn Confirm,
    pub privileges: &'a dyn PrivilegeEscalation,
    pub config: &'a Config,
    pub profile: &'a Profile,
}

impl DeletionExecutor<'_> {
    /// Resolve `spec`, preview, confirm and delete
    pub fn delete(&self, spec: &DeletionSpec, yes: bool) -> Result<Outcome> {
        let generations = gather_generations(self.profile)?;
        let numbers = match retention::resolve(&generations, spec, Local::now())? {
            Resolution::Remove(numbers) => numbers,
            Resolution::NothingToRemove => {
                return Ok(Outcome::NothingToDo(
                    "no generations matched; nothing to delete".to_string(),
                ));
            }
            Resolution::MinimumNotMet { min, total } => {
                return Ok(Outcome::NothingToDo(format!(
                    "profile '{}' has {} generation(s) and at least {} must be kept; nothing to delete",
                    self.profile.name, total, min
                )));
            }
        };

        self.privileges.ensure_root()?;

        let doomed: Vec<&Generation> = generations
            .iter()
            .filter(|g| numbers.contains(&g.number))
            .collect();
        display::print_deletion_preview(
            &self.profile.name,
            &doomed,
            generations.len() - numbers.len(),
        );

        if !(yes || self.config.no_confirm) {
            let question = format!("Delete {} generation(s)?", numbers.len());
            if !self.prompt.confirm(&question)? {
                return Ok(Outcome::Declined);
            }
        }

        delete_generations(self.runner, self.profile, &numbers)?;
        info!(
            "deleted generations {:?} from profile '{}'",
            numbers, self.profile.name
        );

        self.refresh_boot_entries()?;
        Ok(Outcome::Completed)
    }

    /// Regenerate boot entries so deleted generations disappear from the menu
    fn refresh_boot_entries(&self) -> Result<()> {
        let current = self.profile.link_path();
        if !current.join("bin/switch-to-configuration").exists() {
            debug!(
                "profile '{}' has no activation script; skipping boot entry refresh",
                self.profile.name
            );
            return Ok(());
        }
        switch_to_configuration(self.runner, &current, ActivationAction::Boot, false)
    }
}
