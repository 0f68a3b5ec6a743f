//! Re-executing with root privileges

use crate::error::{Error, Result};
use std::os::unix::process::CommandExt;
use std::process::Command;
use tracing::info;

/// Ensures the process runs with root privileges
pub trait PrivilegeEscalation {
    fn ensure_root(&self) -> Result<()>;
}

/// Re-executes the current command line through `sudo`, `doas`, `run0`, ...
#[derive(Debug, Clone)]
pub struct RootCommand {
    pub program: String,
}

impl RootCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

/// Check if we're running as root
pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

impl PrivilegeEscalation for RootCommand {
    fn ensure_root(&self) -> Result<()> {
        if is_root() {
            return Ok(());
        }

        let denied = |reason: String| {
            Error::PermissionDenied(format!(
                "{}; re-run this command as root (for example with `sudo`)",
                reason
            ))
        };

        let root_command = which::which(&self.program)
            .map_err(|e| denied(format!("cannot find root command '{}': {}", self.program, e)))?;
        let exe = std::env::current_exe()
            .map_err(|e| denied(format!("cannot locate the running executable: {}", e)))?;

        info!("re-executing with {}", root_command.display());

        // exec only returns on failure
        let err = Command::new(&root_command)
            .arg(exe)
            .args(std::env::args_os().skip(1))
            .exec();

        Err(denied(format!(
            "failed to re-execute through {}: {}",
            root_command.display(),
            err
        )))
    }
}

/// Accepts any privilege level; for commands that only read
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEscalation;

impl PrivilegeEscalation for NoEscalation {
    fn ensure_root(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_root_command_is_permission_denied() {
        if is_root() {
            return;
        }
        let err = RootCommand::new("nixgen-no-such-root-command")
            .ensure_root()
            .unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));
        assert_eq!(err.exit_code(), crate::error::EXIT_PERMISSION_DENIED);
    }

    #[test]
    fn test_no_escalation() {
        assert!(NoEscalation.ensure_root().is_ok());
    }
}
