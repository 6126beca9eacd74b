//! Fact export
//!
//! Facter lets `facter_<name>` environment variables override any fact, so
//! handing the node's parameters to the compiler under that prefix makes it
//! see the target node instead of the host running the tool. The variables
//! are only ever set on the child process.

use indexmap::IndexMap;

/// Prefix Facter reads fact overrides from.
pub const FACT_PREFIX: &str = "facter_";

/// Environment variables to hand to the compiler, in parameter order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactEnv {
    vars: IndexMap<String, String>,
}

impl FactEnv {
    /// Build the fact variables for a node's parameters. Parameters that
    /// cannot be expressed as environment variables are skipped with a
    /// warning.
    pub fn from_parameters(parameters: &IndexMap<String, String>) -> Self {
        let mut vars = IndexMap::new();
        for (name, value) in parameters {
            if let Err(reason) = check_exportable(name, value) {
                tracing::warn!("failed to set fact {name} => {value}: {reason}");
                continue;
            }
            vars.insert(format!("{FACT_PREFIX}{name}"), value.clone());
        }
        Self { vars }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn check_exportable(name: &str, value: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("empty name");
    }
    if name.contains('=') {
        return Err("name contains '='");
    }
    if name.contains('\0') || value.contains('\0') {
        return Err("contains a NUL byte");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_prefixes_every_parameter() {
        let facts = FactEnv::from_parameters(&params(&[
            ("hostname", "web01"),
            ("operatingsystem", "Debian"),
        ]));
        assert_eq!(facts.len(), 2);
        assert_eq!(facts.get("facter_hostname"), Some("web01"));
        assert_eq!(facts.get("facter_operatingsystem"), Some("Debian"));
        assert_eq!(facts.get("hostname"), None);
    }

    #[test]
    fn test_keeps_parameter_order() {
        let facts = FactEnv::from_parameters(&params(&[("b", "1"), ("a", "2"), ("c", "3")]));
        let names: Vec<&str> = facts.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["facter_b", "facter_a", "facter_c"]);
    }

    #[test]
    fn test_skips_unexportable_parameters() {
        let facts = FactEnv::from_parameters(&params(&[
            ("", "x"),
            ("a=b", "x"),
            ("nul", "x\0y"),
            ("ok", "fine"),
        ]));
        assert_eq!(facts.len(), 1);
        assert_eq!(facts.get("facter_ok"), Some("fine"));
    }

    #[test]
    fn test_empty_parameters() {
        assert!(FactEnv::from_parameters(&IndexMap::new()).is_empty());
    }
}
