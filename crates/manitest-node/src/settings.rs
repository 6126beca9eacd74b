//! Settings store
//!
//! Reads the ini-like `puppet.conf` into ordered sections and resolves the
//! module search path for an environment.

use std::fs;
use std::io;
use std::path::Path;

use indexmap::IndexMap;

use crate::error::{Error, Result};

/// Where the master keeps its settings.
pub const DEFAULT_SETTINGS_PATH: &str = "/etc/puppet/puppet.conf";

/// Key holding the module search path.
pub const MODULE_PATH_KEY: &str = "modulepath";

/// Section that collects keys given before any header.
const MAIN_SECTION: &str = "main";

/// Per-section key/value settings, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    sections: IndexMap<String, IndexMap<String, String>>,
}

impl Settings {
    /// Parse settings text. Lines that are neither headers, assignments,
    /// comments nor blank are skipped with a warning.
    pub fn parse(text: &str) -> Self {
        let mut settings = Settings::default();
        let mut current = MAIN_SECTION.to_string();

        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                current = header.trim().to_string();
                settings.sections.entry(current.clone()).or_default();
                continue;
            }

            match line.split_once('=') {
                Some((key, value)) => {
                    settings
                        .sections
                        .entry(current.clone())
                        .or_default()
                        .insert(key.trim().to_string(), value.trim().to_string());
                }
                None => {
                    tracing::warn!(lineno = index + 1, "ignoring malformed settings line: {line}")
                }
            }
        }

        settings
    }

    /// Load settings from disk. A missing file is an empty store.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(
                    path = %path.display(),
                    "settings file not found, using empty settings"
                );
                Ok(Self::default())
            }
            Err(source) => Err(Error::SettingsUnreadable {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Section names in file order.
    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// Look up a key in a section with `$name` references expanded.
    /// Empty values count as unset.
    pub fn get(&self, section: &str, key: &str) -> Option<String> {
        let value = self.sections.get(section)?.get(key)?;
        if value.is_empty() {
            return None;
        }
        Some(self.expand(section, value))
    }

    /// Module search path for `environment`: the environment's own section
    /// first, then the first section defining one, in file order.
    pub fn module_path(&self, environment: &str) -> Option<String> {
        if let Some(path) = self.get(environment, MODULE_PATH_KEY) {
            tracing::debug!(environment, %path, "module path from environment section");
            return Some(path);
        }

        let found = self
            .sections()
            .find_map(|section| self.get(section, MODULE_PATH_KEY).map(|path| (section, path)));
        if let Some((section, path)) = &found {
            tracing::debug!(environment, section, %path, "module path from fallback section");
        }
        found.map(|(_, path)| path)
    }

    /// Like [`Settings::module_path`], failing when nothing defines one.
    pub fn resolve_module_path(&self, environment: &str) -> Result<String> {
        self.module_path(environment)
            .ok_or_else(|| Error::NoModulePath {
                environment: environment.to_string(),
            })
    }

    /// Expand `$name` references once against the section, then `main`.
    /// Unknown references stay as written.
    fn expand(&self, section: &str, value: &str) -> String {
        let mut out = String::with_capacity(value.len());
        let mut rest = value;

        while let Some(pos) = rest.find('$') {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];
            let len = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            let name = &after[..len];

            match self.raw(section, name) {
                Some(replacement) if !name.is_empty() => out.push_str(replacement),
                _ => {
                    out.push('$');
                    out.push_str(name);
                }
            }
            rest = &after[len..];
        }

        out.push_str(rest);
        out
    }

    fn raw(&self, section: &str, key: &str) -> Option<&str> {
        [section, MAIN_SECTION]
            .iter()
            .filter_map(|s| self.sections.get(*s)?.get(key))
            .map(String::as_str)
            .find(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUPPET_CONF: &str = "
# site settings
[main]
    confdir = /etc/puppet
    vardir = /var/lib/puppet
    logdir = /var/log/puppet

[puppetmasterd]
    modulepath = $confdir/modules:/usr/share/puppet/modules

[prod]
    modulepath = /modules/prod

[dev]
    manifest = /srv/dev/site.pp
";

    #[test]
    fn test_sections_keep_file_order() {
        let settings = Settings::parse(PUPPET_CONF);
        let sections: Vec<&str> = settings.sections().collect();
        assert_eq!(sections, vec!["main", "puppetmasterd", "prod", "dev"]);
    }

    #[test]
    fn test_environment_section_wins() {
        let settings = Settings::parse(PUPPET_CONF);
        assert_eq!(settings.module_path("prod").as_deref(), Some("/modules/prod"));
    }

    #[test]
    fn test_falls_back_to_first_section_with_path() {
        let settings = Settings::parse(PUPPET_CONF);
        assert_eq!(
            settings.module_path("dev").as_deref(),
            Some("/etc/puppet/modules:/usr/share/puppet/modules")
        );
        assert_eq!(
            settings.module_path("unknown").as_deref(),
            Some("/etc/puppet/modules:/usr/share/puppet/modules")
        );
    }

    #[test]
    fn test_no_module_path_anywhere() {
        let settings = Settings::parse("[main]\nvardir = /var/lib/puppet\n");
        assert_eq!(settings.module_path("prod"), None);
        let err = settings.resolve_module_path("prod").unwrap_err();
        assert!(matches!(err, Error::NoModulePath { .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_empty_value_is_unset() {
        let settings = Settings::parse("[prod]\nmodulepath =\n[main]\nmodulepath = /m\n");
        assert_eq!(settings.module_path("prod").as_deref(), Some("/m"));
    }

    #[test]
    fn test_keys_before_header_go_to_main() {
        let settings = Settings::parse("modulepath = /top\n[other]\nx = y\n");
        assert_eq!(settings.get("main", "modulepath").as_deref(), Some("/top"));
    }

    #[test]
    fn test_unknown_reference_left_verbatim() {
        let settings = Settings::parse("[main]\nssldir = $vardir/ssl\nprice = 5$\n");
        assert_eq!(settings.get("main", "ssldir").as_deref(), Some("$vardir/ssl"));
        assert_eq!(settings.get("main", "price").as_deref(), Some("5$"));
    }

    #[test]
    fn test_duplicate_sections_merge() {
        let settings = Settings::parse("[a]\nx = 1\n[b]\n[a]\nx = 2\ny = 3\n");
        assert_eq!(settings.get("a", "x").as_deref(), Some("2"));
        assert_eq!(settings.get("a", "y").as_deref(), Some("3"));
        assert_eq!(settings.sections().count(), 2);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(dir.path().join("puppet.conf")).unwrap();
        assert_eq!(settings, Settings::default());
    }
}
