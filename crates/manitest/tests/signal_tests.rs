//! Runs aborted by a termination signal
//!
//! The stand-in compiler signals the test process (`$PPID` of the shell).
//! Every registered handler in the process sees each signal, so the cases
//! run one after another inside a single test.

#![cfg(unix)]

use std::fs;
use std::path::PathBuf;

use manitest::{CompilerCommand, Manitest, ManitestError, RunOptions};
use tempfile::TempDir;

const WEB01: &str = "name: web01\nenvironment: prod\nclasses: [nginx]\n";

const PUPPET_CONF: &str = "[main]\nmodulepath = /modules/main\n";

struct Fixture {
    _root: TempDir,
    tmpdir: PathBuf,
    node_file: PathBuf,
    settings_file: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let tmpdir = root.path().join("tmp");
        fs::create_dir(&tmpdir).unwrap();
        let node_file = root.path().join("web01.yaml");
        fs::write(&node_file, WEB01).unwrap();
        let settings_file = root.path().join("puppet.conf");
        fs::write(&settings_file, PUPPET_CONF).unwrap();
        Self {
            _root: root,
            tmpdir,
            node_file,
            settings_file,
        }
    }

    fn options(&self, script: &str) -> RunOptions {
        RunOptions::new(&self.node_file)
            .settings_file(&self.settings_file)
            .tmpdir(&self.tmpdir)
            .compiler(CompilerCommand::new("/bin/sh").with_args(["-c", script, "puppet"]))
    }

    fn leftovers(&self) -> Vec<PathBuf> {
        fs::read_dir(&self.tmpdir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }
}

async fn assert_interrupted_and_cleaned_up(script: &str) {
    let fixture = Fixture::new();
    let err = Manitest::new(fixture.options(script))
        .run()
        .await
        .unwrap_err();

    assert!(
        matches!(err, ManitestError::Interrupted("SIGTERM")),
        "{script}: unexpected error {err:?}"
    );
    assert!(!err.is_precondition());
    assert_eq!(fixture.leftovers(), Vec::<PathBuf>::new(), "{script}");
}

#[tokio::test]
async fn test_terminate_signal_aborts_run_and_cleans_up() {
    // Signal while the compiler is running.
    assert_interrupted_and_cleaned_up("sleep 0.3; kill -TERM $PPID; exec sleep 5").await;

    // Signal as soon as the compiler starts, right after the files are written.
    for _ in 0..10 {
        assert_interrupted_and_cleaned_up("kill -TERM $PPID; exec sleep 5").await;
    }
}
