//! Command-line interface definitions

use crate::activation::{ApplyRequest, SwitchRequest};
use crate::error::Result;
use crate::retention::parse_period;
use crate::types::DeletionSpec;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "nixgen")]
#[command(version)]
#[command(about = "Manage, activate and roll back NixOS generations", long_about = None)]
pub struct Cli {
    /// System profile to operate on (default: system)
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inspect and manage existing generations
    #[command(subcommand)]
    Generation(GenerationCommands),

    /// Build the system configuration and activate it
    Apply(ApplyArgs),
}

#[derive(Subcommand, Debug)]
pub enum GenerationCommands {
    /// List the generations of the profile
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show closure differences between two generations
    Diff {
        before: u64,
        after: u64,
    },

    /// Activate an existing generation
    Switch {
        number: u64,

        #[command(flatten)]
        activation: SwitchArgs,
    },

    /// Activate the generation before the current one
    Rollback {
        #[command(flatten)]
        activation: SwitchArgs,
    },

    /// Delete generations by number, range, age or retention policy
    Delete(DeleteArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct SwitchArgs {
    /// Show what activation would do without changing anything
    #[arg(long)]
    pub dry: bool,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Activate this specialisation of the generation
    #[arg(short, long, value_name = "NAME")]
    pub specialisation: Option<String>,
}

impl From<SwitchArgs> for SwitchRequest {
    fn from(args: SwitchArgs) -> Self {
        SwitchRequest {
            dry: args.dry,
            yes: args.yes,
            specialisation: args.specialisation,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct DeleteArgs {
    /// Generation numbers to delete
    pub numbers: Vec<u64>,

    /// Delete every generation except the current one
    #[arg(long)]
    pub all: bool,

    /// Lowest generation of a range to delete
    #[arg(long, value_name = "N")]
    pub from: Option<u64>,

    /// Highest generation of a range to delete
    #[arg(long, value_name = "N")]
    pub to: Option<u64>,

    /// Delete generations older than a period such as 30d or "1w 2d"
    #[arg(long, value_name = "PERIOD")]
    pub older_than: Option<String>,

    /// Never delete this generation (repeatable)
    #[arg(long, value_name = "N")]
    pub keep: Vec<u64>,

    /// Always keep at least this many generations
    #[arg(long, value_name = "N")]
    pub min: Option<usize>,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

impl DeleteArgs {
    pub fn to_spec(&self) -> Result<DeletionSpec> {
        let older_than = self.older_than.as_deref().map(parse_period).transpose()?;
        Ok(DeletionSpec {
            all: self.all,
            from: self.from,
            to: self.to,
            older_than,
            keep: self.keep.iter().copied().collect(),
            min: self.min,
            remove: self.numbers.iter().copied().collect(),
        })
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct ApplyArgs {
    /// Flake reference, e.g. /etc/nixos#desktop
    #[arg(long, value_name = "REF", conflicts_with = "file")]
    pub flake: Option<String>,

    /// Path to a legacy configuration.nix
    #[arg(long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Build and dry-activate without changing the system
    #[arg(long)]
    pub dry: bool,

    /// Keep the build result at this path
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Do not activate the new configuration now
    #[arg(long)]
    pub no_activate: bool,

    /// Do not make the new configuration the boot default
    #[arg(long)]
    pub no_boot: bool,

    /// Build a QEMU virtual machine instead
    #[arg(long, conflicts_with = "vm_with_bootloader")]
    pub vm: bool,

    /// Build a QEMU virtual machine with a bootloader instead
    #[arg(long)]
    pub vm_with_bootloader: bool,

    /// (Re)install the bootloader during activation
    #[arg(long)]
    pub install_bootloader: bool,

    /// Description stored with the new generation
    #[arg(long, value_name = "STR")]
    pub tag: Option<String>,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Activate this specialisation
    #[arg(short, long, value_name = "NAME")]
    pub specialisation: Option<String>,

    /// Update the nixos channel before building (legacy configurations)
    #[arg(long)]
    pub upgrade: bool,

    /// Update all channels before building (legacy configurations)
    #[arg(long)]
    pub upgrade_all: bool,

    /// Build through nix-output-monitor
    #[arg(long)]
    pub use_nom: bool,
}

impl From<&ApplyArgs> for ApplyRequest {
    fn from(args: &ApplyArgs) -> Self {
        ApplyRequest {
            dry: args.dry,
            output: args.output.clone(),
            no_activate: args.no_activate,
            no_boot: args.no_boot,
            vm: args.vm,
            vm_with_bootloader: args.vm_with_bootloader,
            install_bootloader: args.install_bootloader,
            tag: args.tag.clone(),
            yes: args.yes,
            specialisation: args.specialisation.clone(),
            upgrade: args.upgrade,
            upgrade_all: args.upgrade_all,
            use_nom: args.use_nom,
        }
    }
}
