//! Inputs for a manitest dry compile: the cached node descriptor of the
//! target host and the settings store the module search path comes from.

pub mod error;
pub mod node;
pub mod settings;

pub use error::{Error, Result};
pub use node::{normalize_node_path, resolve_environment, NodeDescriptor, DEFAULT_ENVIRONMENT};
pub use settings::{Settings, DEFAULT_SETTINGS_PATH, MODULE_PATH_KEY};
