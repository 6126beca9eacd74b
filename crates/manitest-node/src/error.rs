//! Error types for loading node descriptors and settings.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading the inputs of a run.
#[derive(Debug, Error)]
pub enum Error {
    /// The node file does not exist.
    #[error("node file {} does not exist", path.display())]
    NodeFileMissing { path: PathBuf },

    /// The node file exists but could not be read.
    #[error("failed to read node file {}: {source}", path.display())]
    NodeFileUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The node file does not hold a node record.
    #[error("invalid node file ({reason}) - you should use something from /var/lib/puppet/yaml/node")]
    InvalidNode { reason: String },

    /// The settings file exists but could not be read.
    #[error("failed to read settings file {}: {source}", path.display())]
    SettingsUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// No section of the settings store defines a module path.
    #[error("no modulepath is configured for environment '{environment}' or any other section")]
    NoModulePath { environment: String },
}

impl Error {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Error::InvalidNode {
            reason: reason.into(),
        }
    }

    /// Whether this is a configuration problem rather than bad input.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::SettingsUnreadable { .. } | Error::NoModulePath { .. })
    }
}

/// Result type for input loading.
pub type Result<T> = std::result::Result<T, Error>;
