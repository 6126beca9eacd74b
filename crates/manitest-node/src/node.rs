//! Node descriptors
//!
//! A Puppet master caches one YAML record per node it has compiled for,
//! tagged `!ruby/object:Puppet::Node`. The record carries the node name,
//! its environment, the parameters (facts plus external-node parameters)
//! and the classes assigned to it. This module reads those records into a
//! plain [`NodeDescriptor`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use serde_yaml::Value;

use crate::error::{Error, Result};

/// The environment a node lands in when neither the operator nor the
/// descriptor names one.
pub const DEFAULT_ENVIRONMENT: &str = "production";

/// Ruby class tag a cached node record is written with.
const NODE_CLASS_TAG: &str = "ruby/object:Puppet::Node";

/// Extension node files are stored with.
const NODE_FILE_EXTENSION: &str = "yaml";

/// A target node as recorded by the master.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDescriptor {
    /// Certificate name of the node. Never empty.
    pub name: String,
    /// Environment recorded for the node, if any.
    pub environment: Option<String>,
    /// Node parameters in file order.
    pub parameters: IndexMap<String, String>,
    /// Classes assigned to the node, in file order.
    pub classes: Vec<String>,
}

/// Shape of the record once Ruby tags are stripped.
#[derive(Debug, Deserialize)]
struct RawNode {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    environment: Option<Value>,
    #[serde(default)]
    parameters: Option<IndexMap<String, Value>>,
    #[serde(default)]
    classes: Option<RawClasses>,
}

/// Classes come either as a plain list or, for parameterised classes, as a
/// mapping from class name to its parameters.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawClasses {
    List(Vec<String>),
    Map(IndexMap<String, Value>),
}

impl NodeDescriptor {
    /// Load a descriptor from a node file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                Error::NodeFileMissing {
                    path: path.to_path_buf(),
                }
            } else {
                Error::NodeFileUnreadable {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        tracing::debug!(path = %path.display(), "loading node descriptor");
        Self::from_yaml_str(&text)
    }

    /// Parse a descriptor from the text of a node file.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let document: Value =
            serde_yaml::from_str(text).map_err(|e| Error::invalid(e.to_string()))?;

        // The record itself may carry a class tag; anything but a node is
        // someone else's cache file.
        if let Value::Tagged(tagged) = &document {
            let tag = tagged.tag.to_string();
            let tag = tag.trim_start_matches('!');
            if tag.starts_with("ruby/object:") && tag != NODE_CLASS_TAG {
                return Err(Error::invalid(format!("record is a {tag}, not a node")));
            }
        }

        let document = strip_tags(document);
        if !document.is_mapping() {
            return Err(Error::invalid("record is not a mapping"));
        }

        let raw: RawNode =
            serde_yaml::from_value(document).map_err(|e| Error::invalid(e.to_string()))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawNode) -> Result<Self> {
        let name = raw
            .name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::invalid("node has no name"))?;

        let environment = raw.environment.as_ref().and_then(environment_name);

        let mut parameters = IndexMap::new();
        for (key, value) in raw.parameters.unwrap_or_default() {
            match render_parameter(&value) {
                Some(rendered) => {
                    parameters.insert(key, rendered);
                }
                None => {
                    tracing::warn!(parameter = %key, "skipping parameter without a scalar value")
                }
            }
        }

        let classes = match raw.classes {
            Some(RawClasses::List(classes)) => classes,
            Some(RawClasses::Map(classes)) => classes.into_keys().collect(),
            None => Vec::new(),
        };

        Ok(Self {
            name,
            environment,
            parameters,
            classes,
        })
    }
}

/// Drop Ruby type tags anywhere in the document, keeping the tagged values.
fn strip_tags(value: Value) -> Value {
    match value {
        Value::Tagged(tagged) => strip_tags(tagged.value),
        Value::Sequence(items) => Value::Sequence(items.into_iter().map(strip_tags).collect()),
        Value::Mapping(entries) => Value::Mapping(
            entries
                .into_iter()
                .map(|(key, value)| (strip_tags(key), strip_tags(value)))
                .collect(),
        ),
        other => other,
    }
}

/// Newer masters serialise the environment as an object with a `name`.
fn environment_name(value: &Value) -> Option<String> {
    let name = match value {
        Value::String(name) => name.as_str(),
        Value::Mapping(entries) => entries.get("name")?.as_str()?,
        _ => return None,
    };
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Render a parameter value the way it will be exported as a fact.
fn render_parameter(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Sequence(items) => Some(
            items
                .iter()
                .filter_map(render_parameter)
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Tagged(tagged) => render_parameter(&tagged.value),
        Value::Null | Value::Mapping(_) => None,
    }
}

/// Append the node file extension unless the path already ends with it.
pub fn normalize_node_path(path: impl Into<PathBuf>) -> PathBuf {
    let path = path.into();
    if path.as_os_str().to_string_lossy().ends_with(NODE_FILE_EXTENSION) {
        return path;
    }
    let mut raw = path.into_os_string();
    raw.push(".");
    raw.push(NODE_FILE_EXTENSION);
    PathBuf::from(raw)
}

/// Pick the environment a run compiles in: the operator's override first,
/// then the descriptor's own, then `default`.
pub fn resolve_environment(
    override_env: Option<&str>,
    node: &NodeDescriptor,
    default: &str,
) -> String {
    override_env
        .map(str::trim)
        .filter(|env| !env.is_empty())
        .map(str::to_string)
        .or_else(|| node.environment.clone())
        .unwrap_or_else(|| default.to_string())
}
