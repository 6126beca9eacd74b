//! Manitest CLI

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use manitest::artifacts::with_trailing_separator;
use manitest::orchestrator::DEFAULT_COMPILER;
use manitest::synth::{DEFAULT_SITE_MANIFEST, parse_class_list};
use manitest::{CompilerCommand, Manitest, ManitestError, RunOptions, RunStatus};
use manitest_node::{DEFAULT_SETTINGS_PATH, normalize_node_path};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "manitest")]
#[command(about = "Manitest compiles a manifest using another host's facts")]
#[command(version)]
struct Args {
    /// Cached node file of the host to compile for (".yaml" is appended if missing)
    #[arg(short = 'n', long = "yamlnodefile", value_name = "FILE")]
    node_file: PathBuf,

    /// Report whether the compilation is OK or broken
    #[arg(short, long)]
    verbose: bool,

    /// Echo the compiler command and output, and keep the generated files
    #[arg(short, long)]
    debug: bool,

    /// Environment to compile in (defaults to the node's environment)
    #[arg(short, long, value_name = "ENV")]
    environment: Option<String>,

    /// Directory for the generated files
    #[arg(short, long, value_name = "DIR")]
    tmpdir: Option<PathBuf>,

    /// Comma-separated classes to include instead of the node's own
    #[arg(short = 'p', long = "puppetclass", value_name = "CLASSES")]
    classes: Option<String>,

    /// Puppet settings file the module path is read from
    #[arg(
        short = 'c',
        long = "config",
        value_name = "FILE",
        default_value = DEFAULT_SETTINGS_PATH
    )]
    settings: PathBuf,

    /// Site manifest imported by the generated node block
    #[arg(long, value_name = "FILE", default_value = DEFAULT_SITE_MANIFEST)]
    site_manifest: String,

    /// Compiler binary
    #[arg(long, value_name = "PATH", default_value = DEFAULT_COMPILER)]
    puppet: PathBuf,

    /// Argument passed to the compiler ahead of the generated ones (repeatable)
    #[arg(long = "puppet-arg", value_name = "ARG", allow_hyphen_values = true)]
    puppet_args: Vec<String>,

    /// Kill the compiler and report broken after this many seconds
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();
    init_tracing(args.debug);

    let code = match run(args).await {
        Ok(status) => status.exit_code(),
        Err(e) => {
            let configuration = e
                .downcast_ref::<ManitestError>()
                .is_some_and(ManitestError::is_configuration);
            if configuration {
                eprintln!("Configuration error: {:#}", e);
            } else {
                eprintln!("Error: {:#}", e);
            }
            1
        }
    };
    process::exit(code);
}

fn init_tracing(debug: bool) {
    let default_filter = if debug {
        "manitest=debug,manitest_node=debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args) -> anyhow::Result<RunStatus> {
    let node_file = normalize_node_path(args.node_file);
    let tmpdir = with_trailing_separator(args.tmpdir.unwrap_or_else(std::env::temp_dir));
    let compiler = CompilerCommand::new(args.puppet).with_args(args.puppet_args);

    let mut options = RunOptions::new(&node_file)
        .settings_file(args.settings)
        .tmpdir(tmpdir)
        .site_manifest(args.site_manifest)
        .compiler(compiler)
        .debug(args.debug)
        .timeout(args.timeout.map(Duration::from_secs));
    if let Some(environment) = args.environment {
        options = options.environment(environment);
    }
    if let Some(classes) = args.classes {
        options = options.classes(parse_class_list(&classes));
    }

    let outcome = Manitest::new(options)
        .run()
        .await
        .with_context(|| format!("dry compile of {} failed", node_file.display()))?;

    if args.verbose {
        println!(
            "The manifest compilation for {} is {}",
            outcome.node, outcome.status
        );
    }
    if let Some(dir) = &outcome.retained {
        println!("Generated files kept in {}", dir.display());
    }

    Ok(outcome.status)
}
