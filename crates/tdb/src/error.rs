//! Error types for the tdb engine.
//!
//! Every failure raised by the core carries a build trace: the ordered
//! chain of target names from the initiating request down to the failing
//! target. A trace is attached exactly once; an error that already
//! carries one passes through unchanged.

use std::sync::Arc;

use camino::Utf8PathBuf;
use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, BuildError>;

/// What went wrong, independent of where in the target graph it happened.
#[derive(Debug, Clone, Error)]
pub enum BuildErrorKind {
    // === Configuration errors ===
    #[error("rule for `{target}` declares both a build function and a command")]
    ConflictingRule { target: String },

    #[error("rule for `{target}` has an empty command vector")]
    EmptyCommand { target: String },

    // === Resolution errors ===
    #[error("no rule to build `{target}` and no artifact exists")]
    MissingTarget { target: String },

    #[error("dependency cycle detected at `{target}`")]
    Cycle { target: String },

    // === Command rewriting errors ===
    #[error("unknown command directive `{directive}`")]
    UnknownDirective { directive: String },

    #[error("`tdb:prereq` used in a rule with no prerequisites")]
    NoPrereq,

    // === Command execution errors ===
    #[error("failed to spawn `{program}`: {message}")]
    Spawn { program: String, message: String },

    #[error("command `{program}` failed: {status}")]
    CommandFailed {
        program: String,
        status: std::process::ExitStatus,
    },

    // === Artifact verification errors ===
    #[error("expected `{path}` to be a regular file after build")]
    NotAFile { path: Utf8PathBuf },

    #[error("expected `{path}` to be a directory after build")]
    NotADirectory { path: Utf8PathBuf },

    // === IO errors ===
    #[error("{path}: {message}")]
    Io { path: Utf8PathBuf, message: String },

    // === User callable failures ===
    #[error("{0}")]
    Other(Arc<eyre::Report>),
}

/// A traced engine failure.
#[derive(Debug, Clone, Error)]
#[error("{kind}")]
pub struct BuildError {
    pub kind: BuildErrorKind,
    /// Target names from the root request down to the failing target.
    /// Empty until the failure crosses a resolver boundary.
    pub trace: Vec<String>,
}

impl BuildError {
    pub fn new(kind: BuildErrorKind) -> Self {
        Self {
            kind,
            trace: Vec::new(),
        }
    }

    /// Wrap an arbitrary displayable failure, e.g. from inside a user
    /// build callable.
    pub fn msg(message: impl std::fmt::Display) -> Self {
        Self::new(BuildErrorKind::Other(Arc::new(eyre::eyre!("{message}"))))
    }

    pub(crate) fn io(path: impl Into<Utf8PathBuf>, error: std::io::Error) -> Self {
        Self::new(BuildErrorKind::Io {
            path: path.into(),
            message: error.to_string(),
        })
    }

    /// Attach a trace unless one is already present. Recognition of
    /// already-traced failures keeps the innermost (most specific) chain.
    pub fn with_trace(mut self, trace: &[String]) -> Self {
        if self.trace.is_empty() {
            self.trace = trace.to_vec();
        }
        self
    }

    /// The trace rendered for human consumption, or `None` when the
    /// failure never crossed a resolver boundary.
    pub fn trace_line(&self) -> Option<String> {
        if self.trace.is_empty() {
            None
        } else {
            Some(self.trace.join(" -> "))
        }
    }
}

impl From<std::io::Error> for BuildError {
    fn from(error: std::io::Error) -> Self {
        Self::new(BuildErrorKind::Other(Arc::new(eyre::Report::new(error))))
    }
}

impl From<eyre::Report> for BuildError {
    fn from(report: eyre::Report) -> Self {
        Self::new(BuildErrorKind::Other(Arc::new(report)))
    }
}
