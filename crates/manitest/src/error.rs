//! Error types for a manitest run.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that stop a run. A manifest that fails to compile is not one of
/// these: it ends the run normally with a broken status.
#[derive(Debug, Error)]
pub enum ManitestError {
    /// The node file or settings could not be used.
    #[error(transparent)]
    Input(#[from] manitest_node::Error),

    /// Neither the operator nor the node supplied any class.
    #[error("no classes to compile for node {node}")]
    NoClasses { node: String },

    /// A generated file could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The compiler could not be started.
    #[error("failed to launch {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Reading the compiler's output failed.
    #[error("failed to read compiler output: {0}")]
    Output(#[source] io::Error),

    /// A termination signal arrived mid-run.
    #[error("interrupted by {0}")]
    Interrupted(&'static str),
}

impl ManitestError {
    /// Whether the run stopped before anything was written or launched.
    pub fn is_precondition(&self) -> bool {
        matches!(self, ManitestError::Input(_) | ManitestError::NoClasses { .. })
    }

    /// Whether the Puppet settings, not the node, are at fault.
    pub fn is_configuration(&self) -> bool {
        matches!(self, ManitestError::Input(e) if e.is_configuration())
    }
}

/// Result type for manitest operations.
pub type Result<T> = std::result::Result<T, ManitestError>;
