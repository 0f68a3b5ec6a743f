//! Closure diffing through an external tool

use crate::config::DiffOptions;
use crate::error::{Error, Result};
use crate::nix::commands::{CommandRunner, NixCommand};
use std::path::Path;
use tracing::warn;

/// Output of the diff tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffReport {
    pub text: String,
}

impl DiffReport {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Runs the configured closure-diff command
#[derive(Debug, Clone)]
pub struct Differ {
    program: String,
    args: Vec<String>,
}

impl Differ {
    pub fn from_options(options: &DiffOptions) -> Self {
        let mut parts = options.command.iter().cloned();
        let program = parts.next().unwrap_or_default();
        Self {
            program,
            args: parts.collect(),
        }
    }

    pub fn diff(
        &self,
        runner: &dyn CommandRunner,
        before: &Path,
        after: &Path,
    ) -> Result<DiffReport> {
        if self.program.is_empty() {
            return Err(Error::validation("no diff command configured"));
        }

        let command = NixCommand::new(&self.program)
            .args(&self.args)
            .arg(before)
            .arg(after);
        let text = runner.output(&command)?;
        Ok(DiffReport { text })
    }

    /// Diff and print the report, downgrading failures to a warning
    pub fn show(&self, runner: &dyn CommandRunner, before: &Path, after: &Path) {
        match self.diff(runner, before, after) {
            Ok(report) if report.is_empty() => println!("No closure changes."),
            Ok(report) => print!("{}", report.text),
            Err(e) => warn!("failed to diff generations: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nix::commands::fake::RecordingRunner;
    use std::path::PathBuf;

    #[test]
    fn test_diff_appends_paths() {
        let mut runner = RecordingRunner::new();
        runner.stdout = "firefox: 121.0 → 122.0\n".to_string();
        let differ = Differ::from_options(&DiffOptions {
            command: vec!["nvd".into(), "diff".into()],
        });

        let report = differ
            .diff(
                &runner,
                &PathBuf::from("/run/current-system"),
                &PathBuf::from("/nix/store/new"),
            )
            .unwrap();
        assert!(report.text.contains("firefox"));
        assert_eq!(
            runner.rendered(),
            vec!["nvd diff /run/current-system /nix/store/new"]
        );
    }

    #[test]
    fn test_empty_command_is_rejected() {
        let runner = RecordingRunner::new();
        let differ = Differ::from_options(&DiffOptions { command: vec![] });
        let err = differ
            .diff(&runner, Path::new("/a"), Path::new("/b"))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_show_swallows_failures() {
        let runner = RecordingRunner::with_hook(|cmd| {
            Err(Error::CommandFailed {
                command: cmd.to_string(),
                code: Some(1),
            })
        });
        let differ = Differ::from_options(&DiffOptions::default());
        differ.show(&runner, Path::new("/a"), Path::new("/b"));
        assert_eq!(runner.calls.borrow().len(), 1);
    }
}
