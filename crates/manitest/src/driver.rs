//! End-to-end dry compile
//!
//! Checks every precondition before anything touches the disk or starts a
//! process, then generates the inputs, runs the compiler and releases the
//! generated files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use manitest_node::{
    DEFAULT_ENVIRONMENT, DEFAULT_SETTINGS_PATH, NodeDescriptor, Settings, resolve_environment,
};

use crate::artifacts::Artifacts;
use crate::error::{ManitestError, Result};
use crate::facts::FactEnv;
use crate::orchestrator::{
    CompilationReport, CompilerCommand, Orchestrator, RunStatus, ScheduleTransactionMatcher,
    SuccessMatcher,
};
use crate::signals::Termination;
use crate::synth::{DEFAULT_SITE_MANIFEST, Synthesizer, resolve_classes};

/// Options for a dry compile
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Node file of the target host
    pub node_file: PathBuf,
    /// Settings file the module path is read from
    pub settings_file: PathBuf,
    /// Environment to compile in instead of the node's
    pub environment: Option<String>,
    /// Classes to compile instead of the node's
    pub classes: Vec<String>,
    /// Directory the run directory is created in
    pub tmpdir: PathBuf,
    /// Manifest imported by the generated node block
    pub site_manifest: String,
    /// Compiler to run
    pub compiler: CompilerCommand,
    /// Print the command line and compiler output
    pub echo_output: bool,
    /// Keep the generated files after the run
    pub retain_files: bool,
    /// Kill the compiler after this long
    pub timeout: Option<Duration>,
}

impl RunOptions {
    pub fn new(node_file: impl AsRef<Path>) -> Self {
        Self {
            node_file: node_file.as_ref().to_path_buf(),
            settings_file: PathBuf::from(DEFAULT_SETTINGS_PATH),
            environment: None,
            classes: Vec::new(),
            tmpdir: std::env::temp_dir(),
            site_manifest: DEFAULT_SITE_MANIFEST.to_string(),
            compiler: CompilerCommand::default(),
            echo_output: false,
            retain_files: false,
            timeout: None,
        }
    }

    pub fn settings_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_file = path.into();
        self
    }

    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn classes(mut self, classes: Vec<String>) -> Self {
        self.classes = classes;
        self
    }

    pub fn tmpdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tmpdir = dir.into();
        self
    }

    pub fn site_manifest(mut self, manifest: impl Into<String>) -> Self {
        self.site_manifest = manifest.into();
        self
    }

    pub fn compiler(mut self, compiler: CompilerCommand) -> Self {
        self.compiler = compiler;
        self
    }

    /// Debug mode: echo everything and keep the generated files.
    pub fn debug(mut self, debug: bool) -> Self {
        self.echo_output = debug;
        self.retain_files = debug;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Everything a run needs, resolved before any side effect.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub node: NodeDescriptor,
    pub environment: String,
    pub module_path: String,
    pub classes: Vec<String>,
}

/// Result of a completed run.
#[derive(Debug)]
pub struct RunOutcome {
    pub node: String,
    pub environment: String,
    pub module_path: String,
    pub classes: Vec<String>,
    pub status: RunStatus,
    pub report: CompilationReport,
    /// Directory holding the generated files, when they were kept.
    pub retained: Option<PathBuf>,
}

/// Dry-compiles one node.
pub struct Manitest {
    options: RunOptions,
}

impl Manitest {
    pub fn new(options: RunOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Run with Puppet's default success check.
    pub async fn run(&self) -> Result<RunOutcome> {
        self.run_with(ScheduleTransactionMatcher::default()).await
    }

    /// Run with a custom success check. A termination signal aborts the
    /// run; generated files are released on the way out.
    pub async fn run_with<M: SuccessMatcher>(&self, matcher: M) -> Result<RunOutcome> {
        // Handlers go in before anything is written or spawned.
        let mut termination = Termination::install();
        let prepared = self.prepare()?;

        tokio::select! {
            biased;
            signal = termination.recv() => {
                tracing::warn!("received {signal}, aborting");
                Err(ManitestError::Interrupted(signal))
            }
            result = self.execute(prepared, matcher) => result,
        }
    }

    /// Load and resolve the inputs.
    pub fn prepare(&self) -> Result<Prepared> {
        let node = NodeDescriptor::load(&self.options.node_file)?;
        let environment = resolve_environment(
            self.options.environment.as_deref(),
            &node,
            DEFAULT_ENVIRONMENT,
        );
        let classes = resolve_classes(&self.options.classes, &node)?;

        let settings = Settings::load(&self.options.settings_file)?;
        let module_path = settings.resolve_module_path(&environment)?;

        tracing::debug!(
            node = %node.name,
            %environment,
            %module_path,
            classes = classes.len(),
            "prepared dry compile"
        );

        Ok(Prepared {
            node,
            environment,
            module_path,
            classes,
        })
    }

    async fn execute<M: SuccessMatcher>(
        &self,
        prepared: Prepared,
        matcher: M,
    ) -> Result<RunOutcome> {
        let Prepared {
            node,
            environment,
            module_path,
            classes,
        } = prepared;

        let facts = FactEnv::from_parameters(&node.parameters);

        let synth = Synthesizer::new(self.options.site_manifest.clone());
        let config = synth.config(&module_path);
        let manifest = synth.manifest(&node.name, &classes);

        let artifacts = Artifacts::create(
            &self.options.tmpdir,
            &config,
            &manifest,
            self.options.retain_files,
        )?;

        let mut orchestrator = Orchestrator::new(self.options.compiler.clone(), matcher)
            .echo(self.options.echo_output)
            .timeout(self.options.timeout);
        let report = orchestrator
            .run(
                artifacts.config_path(),
                artifacts.manifest_path(),
                &node.name,
                &facts,
            )
            .await?;

        let retained = artifacts.release();
        tracing::info!(node = %node.name, status = %report.status, "dry compile finished");

        Ok(RunOutcome {
            node: node.name,
            environment,
            module_path,
            classes,
            status: report.status,
            report,
            retained,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_debug_sets_echo_and_retention() {
        let options = RunOptions::new("web01.yaml").debug(true);
        assert!(options.echo_output);
        assert!(options.retain_files);
    }

    #[test]
    fn test_prepare_resolves_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let node_file = dir.path().join("web01.yaml");
        let settings_file = dir.path().join("puppet.conf");
        fs::write(
            &node_file,
            "name: web01\nenvironment: prod\nclasses: [nginx, monitoring]\n",
        )
        .unwrap();
        fs::write(
            &settings_file,
            "[main]\nmodulepath = /modules/main\n[prod]\nmodulepath = /modules/prod\n",
        )
        .unwrap();

        let prepared = Manitest::new(RunOptions::new(&node_file).settings_file(&settings_file))
            .prepare()
            .unwrap();
        assert_eq!(prepared.environment, "prod");
        assert_eq!(prepared.module_path, "/modules/prod");
        assert_eq!(prepared.classes, vec!["nginx", "monitoring"]);

        let prepared = Manitest::new(
            RunOptions::new(&node_file)
                .settings_file(&settings_file)
                .environment("dev")
                .classes(vec!["base".to_string()]),
        )
        .prepare()
        .unwrap();
        assert_eq!(prepared.environment, "dev");
        assert_eq!(prepared.module_path, "/modules/main");
        assert_eq!(prepared.classes, vec!["base"]);
    }

    #[test]
    fn test_prepare_missing_node_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Manitest::new(RunOptions::new(dir.path().join("absent.yaml")))
            .prepare()
            .unwrap_err();
        assert!(matches!(
            err,
            ManitestError::Input(manitest_node::Error::NodeFileMissing { .. })
        ));
        assert!(err.is_precondition());
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_prepare_without_module_path_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let node_file = dir.path().join("web01.yaml");
        let settings_file = dir.path().join("puppet.conf");
        fs::write(&node_file, "name: web01\nclasses: [nginx]\n").unwrap();
        fs::write(&settings_file, "[main]\nvardir = /var/lib/puppet\n").unwrap();

        let err = Manitest::new(RunOptions::new(&node_file).settings_file(&settings_file))
            .prepare()
            .unwrap_err();
        assert!(err.is_precondition());
        assert!(err.is_configuration());
    }
}
