//! Error types for generation management
//!
//! Every failure carries enough information to pick a process exit code, so
//! child-process statuses travel upward as values instead of shared state.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for generation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Exit code for invalid arguments and conflicting selectors
pub const EXIT_VALIDATION: i32 = 2;
/// Exit code for unreadable profile state
pub const EXIT_RESOURCE_ACCESS: i32 = 3;
/// Exit code for failed privilege escalation
pub const EXIT_PERMISSION_DENIED: i32 = 4;

#[derive(Error, Debug)]
pub enum Error {
    /// Bad flags, malformed ranges, conflicting keep/remove sets
    #[error("{0}")]
    Validation(String),

    /// A directory or file that must be readable could not be read
    #[error("failed to access {}: {source}", .path.display())]
    ResourceAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A child process exited unsuccessfully
    #[error("`{command}` failed{}", exit_suffix(.code))]
    CommandFailed { command: String, code: Option<i32> },

    /// A child process could not be started at all
    #[error("failed to execute `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Re-executing with elevated privileges failed
    #[error("{0}")]
    PermissionDenied(String),

    /// No generation was current before activation, so there is nothing to restore
    #[error("no pre-activation generation was recorded")]
    NoRollbackAnchor,

    /// Activation failed and restoring the previous generation failed too
    #[error(
        "{original}\nrolling back to generation {} also failed: {rollback}\n\
         the profile may point at an unverified generation; manual recovery is required",
        anchor_label(.anchor)
    )]
    RollbackFailed {
        original: Box<Error>,
        rollback: Box<Error>,
        anchor: Option<u64>,
    },
}

fn exit_suffix(code: &Option<i32>) -> String {
    match *code {
        Some(code) => format!(" with exit code {}", code),
        None => " (terminated by signal)".to_string(),
    }
}

fn anchor_label(anchor: &Option<u64>) -> String {
    anchor
        .map(|n| n.to_string())
        .unwrap_or_else(|| "(unknown)".to_string())
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn resource(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ResourceAccess {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for this error
    ///
    /// Child exit statuses are passed through verbatim when known.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Validation(_) => EXIT_VALIDATION,
            Error::ResourceAccess { .. } => EXIT_RESOURCE_ACCESS,
            Error::PermissionDenied(_) => EXIT_PERMISSION_DENIED,
            Error::CommandFailed { code, .. } => code.filter(|c| *c != 0).unwrap_or(1),
            Error::RollbackFailed { original, .. } => original.exit_code(),
            Error::Spawn { .. } | Error::NoRollbackAnchor => 1,
        }
    }
}
