//! Generated inputs for the compiler
//!
//! Produces the isolated no-op `puppet.conf` and the one-node manifest a
//! dry compile runs against. Both are plain functions of their inputs.

use std::fmt;

use manitest_node::NodeDescriptor;

use crate::error::{ManitestError, Result};

/// Top-level manifest the generated node block imports.
pub const DEFAULT_SITE_MANIFEST: &str = "/etc/puppet/manifests/site.pp";

/// Settings that keep the compiler away from the real node state: its own
/// state directories, no fact sync, reports, graphs or plugin sync, and noop.
const PUPPET_CONF_TEMPLATE: &str = "
[main]
    vardir         = /var/lib/puppet
    logdir         = /var/log/puppet
    rundir         = /var/run/puppet
    ssldir         = $vardir/ssl
    templatedir    = /etc/puppet/templates
    node_terminus  = plain
    statedir       = /var/lib/puppet/state
    noop           = true
[puppet]
    localconfig    = $vardir/localconfig
    factsync       = false
    report         = false
    graph          = false
    pluginsync     = false
";

/// Contents of the generated `puppet.conf`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticConfig(String);

/// Contents of the generated node manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticManifest(String);

impl SyntheticConfig {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl SyntheticManifest {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SyntheticConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for SyntheticManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds the generated configuration and manifest.
#[derive(Debug, Clone)]
pub struct Synthesizer {
    /// Manifest imported inside the node block
    site_manifest: String,
}

impl Synthesizer {
    pub fn new(site_manifest: impl Into<String>) -> Self {
        Self {
            site_manifest: site_manifest.into(),
        }
    }

    /// Generate the isolated configuration pointing at `module_path`.
    pub fn config(&self, module_path: &str) -> SyntheticConfig {
        let mut conf = String::from(PUPPET_CONF_TEMPLATE);
        conf.push_str(&format!("\tmodulepath   = {}\n", module_path));
        SyntheticConfig(conf)
    }

    /// Generate a manifest with one node block for `node_name` that imports
    /// the site manifest and includes each class in order.
    pub fn manifest(&self, node_name: &str, classes: &[String]) -> SyntheticManifest {
        let mut pp = String::new();
        pp.push_str(&format!("node '{}' {{\n", node_name));
        pp.push_str(&format!("import '{}'\n", self.site_manifest));
        for class in classes {
            pp.push_str(&format!("\tinclude {}\n", class));
        }
        pp.push_str("}\n");
        SyntheticManifest(pp)
    }
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::new(DEFAULT_SITE_MANIFEST)
    }
}

/// Classes to compile: the operator's list when given, otherwise the
/// node's own. The two are never merged.
pub fn resolve_classes(override_classes: &[String], node: &NodeDescriptor) -> Result<Vec<String>> {
    let classes = if override_classes.is_empty() {
        node.classes.clone()
    } else {
        override_classes.to_vec()
    };

    if classes.is_empty() {
        return Err(ManitestError::NoClasses {
            node: node.name.clone(),
        });
    }
    Ok(classes)
}

/// Split a comma-separated class list, dropping blanks.
pub fn parse_class_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|class| !class.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn node(name: &str, classes: &[&str]) -> NodeDescriptor {
        NodeDescriptor {
            name: name.to_string(),
            environment: Some("prod".to_string()),
            parameters: IndexMap::new(),
            classes: classes.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn test_manifest_for_web01() {
        let synth = Synthesizer::default();
        let classes = vec!["nginx".to_string(), "monitoring".to_string()];
        let manifest = synth.manifest("web01", &classes);
        assert_eq!(
            manifest.as_str(),
            concat!(
                "node 'web01' {\n",
                "import '/etc/puppet/manifests/site.pp'\n",
                "\tinclude nginx\n",
                "\tinclude monitoring\n",
                "}\n"
            )
        );
    }

    #[test]
    fn test_one_include_per_class_after_import() {
        let synth = Synthesizer::new("/srv/site.pp");
        let classes: Vec<String> = ["a", "b::c", "d", "a"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        let manifest = synth.manifest("db01", &classes);
        let lines: Vec<&str> = manifest.as_str().lines().collect();

        let imports: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.starts_with("import "))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(imports, vec![1]);

        let includes: Vec<&str> = lines
            .iter()
            .filter_map(|l| l.trim().strip_prefix("include "))
            .collect();
        assert_eq!(includes, vec!["a", "b::c", "d", "a"]);
    }

    #[test]
    fn test_config_appends_module_path() {
        let conf = Synthesizer::default().config("/modules/prod");
        assert!(conf.as_str().ends_with("\tmodulepath   = /modules/prod\n"));
        assert!(conf.as_str().contains("noop           = true"));
        assert!(conf.as_str().contains("pluginsync     = false"));
        assert_eq!(conf.as_str().matches("modulepath").count(), 1);
    }

    #[test]
    fn test_synthesis_is_deterministic() {
        let synth = Synthesizer::default();
        let classes = vec!["nginx".to_string()];
        assert_eq!(synth.config("/m"), synth.config("/m"));
        assert_eq!(synth.manifest("web01", &classes), synth.manifest("web01", &classes));
    }

    #[test]
    fn test_override_replaces_node_classes() {
        let node = node("web01", &["nginx", "monitoring"]);
        let classes = resolve_classes(&["base".to_string()], &node).unwrap();
        assert_eq!(classes, vec!["base"]);
    }

    #[test]
    fn test_node_classes_without_override() {
        let node = node("web01", &["nginx", "monitoring"]);
        let classes = resolve_classes(&[], &node).unwrap();
        assert_eq!(classes, vec!["nginx", "monitoring"]);
    }

    #[test]
    fn test_empty_class_list_fails() {
        let node = node("web01", &[]);
        let err = resolve_classes(&[], &node).unwrap_err();
        assert!(matches!(err, ManitestError::NoClasses { ref node } if node == "web01"));
        assert!(err.is_precondition());
    }

    #[test]
    fn test_parse_class_list() {
        assert_eq!(
            parse_class_list("nginx, monitoring,,base "),
            vec!["nginx", "monitoring", "base"]
        );
        assert!(parse_class_list(" , ").is_empty());
    }
}
