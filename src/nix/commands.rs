//! Command execution for profile and activation operations
//!
//! Every external interaction is a single blocking child process described by
//! a [`NixCommand`] and executed through a [`CommandRunner`], so callers can
//! substitute a recording runner in tests.

use crate::error::{Error, Result};
use crate::types::{ActivationAction, Profile};
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// A child process invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NixCommand {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub env: Vec<(String, String)>,
}

impl NixCommand {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Final path component of the program, e.g. `switch-to-configuration`
    #[cfg(test)]
    pub fn program_name(&self) -> String {
        Path::new(&self.program)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        for (key, value) in &self.env {
            command.env(key, value);
        }
        command
    }
}

impl fmt::Display for NixCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.env {
            write!(f, "{}={} ", key, value)?;
        }
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Executes child processes
pub trait CommandRunner {
    /// Run with inherited stdio, failing on a non-zero exit
    fn run(&self, command: &NixCommand) -> Result<()>;

    /// Run capturing stdout, failing on a non-zero exit
    fn output(&self, command: &NixCommand) -> Result<String>;
}

/// Runs commands on the host with `std::process`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, command: &NixCommand) -> Result<()> {
        debug!("running: {}", command);
        let status = command
            .to_command()
            .stdin(Stdio::inherit())
            .status()
            .map_err(|source| Error::Spawn {
                command: command.to_string(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(Error::CommandFailed {
                command: command.to_string(),
                code: status.code(),
            })
        }
    }

    fn output(&self, command: &NixCommand) -> Result<String> {
        debug!("running (captured): {}", command);
        let output = command
            .to_command()
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|source| Error::Spawn {
                command: command.to_string(),
                source,
            })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(Error::CommandFailed {
                command: command.to_string(),
                code: output.status.code(),
            })
        }
    }
}

/// Point the profile at a new closure, creating a new generation
pub fn set_profile(runner: &dyn CommandRunner, profile: &Profile, closure: &Path) -> Result<()> {
    info!("setting profile '{}' to {}", profile.name, closure.display());
    runner.run(&set_profile_command(profile, closure))
}

fn set_profile_command(profile: &Profile, closure: &Path) -> NixCommand {
    NixCommand::new("nix-env")
        .arg("--profile")
        .arg(profile.link_path())
        .arg("--set")
        .arg(closure)
}

/// Point the profile at an existing generation
pub fn switch_profile_generation(
    runner: &dyn CommandRunner,
    profile: &Profile,
    number: u64,
) -> Result<()> {
    info!("switching profile '{}' to generation {}", profile.name, number);
    runner.run(&switch_generation_command(profile, number))
}

fn switch_generation_command(profile: &Profile, number: u64) -> NixCommand {
    NixCommand::new("nix-env")
        .arg("--profile")
        .arg(profile.link_path())
        .arg("--switch-generation")
        .arg(number.to_string())
}

/// Delete one or more generations
pub fn delete_generations(
    runner: &dyn CommandRunner,
    profile: &Profile,
    numbers: &[u64],
) -> Result<()> {
    if numbers.is_empty() {
        return Ok(());
    }
    info!(
        "deleting {} generation(s) from profile '{}'",
        numbers.len(),
        profile.name
    );
    runner.run(&delete_command(profile, numbers))
}

fn delete_command(profile: &Profile, numbers: &[u64]) -> NixCommand {
    NixCommand::new("nix-env")
        .arg("--profile")
        .arg(profile.link_path())
        .arg("--delete-generations")
        .args(numbers.iter().map(|n| n.to_string()))
}

/// Run a closure's `switch-to-configuration` script
pub fn switch_to_configuration(
    runner: &dyn CommandRunner,
    closure: &Path,
    action: ActivationAction,
    install_bootloader: bool,
) -> Result<()> {
    info!(
        "activating {} ({})",
        closure.display(),
        action.as_str()
    );
    runner.run(&activation_command(closure, action, install_bootloader))
}

fn activation_command(
    closure: &Path,
    action: ActivationAction,
    install_bootloader: bool,
) -> NixCommand {
    let command =
        NixCommand::new(closure.join("bin/switch-to-configuration")).arg(action.as_str());
    if install_bootloader {
        command.env("NIXOS_INSTALL_BOOTLOADER", "1")
    } else {
        command
    }
}

/// Update Nix channels before a legacy (non-flake) build
pub fn update_channels(runner: &dyn CommandRunner, all: bool) -> Result<()> {
    let command = if all {
        NixCommand::new("nix-channel").arg("--update")
    } else {
        NixCommand::new("nix-channel").args(["--update", "nixos"])
    };
    info!("updating channels");
    runner.run(&command)
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::cell::RefCell;

    type Hook<'a> = Box<dyn Fn(&NixCommand) -> Result<()> + 'a>;

    /// Records every command and lets tests script side effects and failures
    pub struct RecordingRunner<'a> {
        pub calls: RefCell<Vec<NixCommand>>,
        hook: Hook<'a>,
        pub stdout: String,
    }

    impl<'a> RecordingRunner<'a> {
        pub fn new() -> Self {
            Self::with_hook(|_| Ok(()))
        }

        pub fn with_hook(hook: impl Fn(&NixCommand) -> Result<()> + 'a) -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                hook: Box::new(hook),
                stdout: String::new(),
            }
        }

        pub fn programs(&self) -> Vec<String> {
            self.calls.borrow().iter().map(|c| c.program_name()).collect()
        }

        pub fn rendered(&self) -> Vec<String> {
            self.calls.borrow().iter().map(|c| c.to_string()).collect()
        }
    }

    impl CommandRunner for RecordingRunner<'_> {
        fn run(&self, command: &NixCommand) -> Result<()> {
            self.calls.borrow_mut().push(command.clone());
            (self.hook)(command)
        }

        fn output(&self, command: &NixCommand) -> Result<String> {
            self.run(command)?;
            Ok(self.stdout.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::RecordingRunner;
    use super::*;
    use std::path::PathBuf;

    fn profile() -> Profile {
        Profile::new("system", "/nix/var/nix/profiles")
    }

    #[test]
    fn test_delete_command() {
        let cmd = delete_command(&profile(), &[140, 141]);
        assert_eq!(
            cmd.to_string(),
            "nix-env --profile /nix/var/nix/profiles/system --delete-generations 140 141"
        );
    }

    #[test]
    fn test_delete_nothing_runs_nothing() {
        let runner = RecordingRunner::new();
        delete_generations(&runner, &profile(), &[]).unwrap();
        assert!(runner.calls.borrow().is_empty());
    }

    #[test]
    fn test_profile_commands() {
        let closure = PathBuf::from("/nix/store/abc-nixos-system");
        assert_eq!(
            set_profile_command(&profile(), &closure).to_string(),
            "nix-env --profile /nix/var/nix/profiles/system --set /nix/store/abc-nixos-system"
        );
        assert_eq!(
            switch_generation_command(&profile(), 12).to_string(),
            "nix-env --profile /nix/var/nix/profiles/system --switch-generation 12"
        );
    }

    #[test]
    fn test_activation_command() {
        let closure = PathBuf::from("/nix/store/abc-nixos-system");
        let cmd = activation_command(&closure, ActivationAction::DryActivate, false);
        assert_eq!(cmd.program_name(), "switch-to-configuration");
        assert!(cmd.has_arg("dry-activate"));
        assert!(cmd.env.is_empty());

        let cmd = activation_command(&closure, ActivationAction::Boot, true);
        assert_eq!(
            cmd.env,
            vec![("NIXOS_INSTALL_BOOTLOADER".to_string(), "1".to_string())]
        );
    }

    #[test]
    fn test_system_runner_reports_exit_code() {
        let err = SystemRunner
            .run(&NixCommand::new("sh").args(["-c", "exit 7"]))
            .unwrap_err();
        match err {
            Error::CommandFailed { code, .. } => assert_eq!(code, Some(7)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_system_runner_captures_output() {
        let out = SystemRunner
            .output(&NixCommand::new("sh").args(["-c", "echo hello"]))
            .unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let err = SystemRunner
            .run(&NixCommand::new("/nonexistent/nixgen-test-binary"))
            .unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }
}
