//! Running the compiler
//!
//! The compiler is started against the generated files with the node's
//! facts in its environment. Its stdout and stderr share one pipe, the way
//! `2>&1` would, and are read line by line until a [`SuccessMatcher`]
//! accepts the output, the output ends, or the optional timeout passes.
//! The compiler's exit status never decides the result.

use std::ffi::OsString;
use std::fmt;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

use crate::error::{ManitestError, Result};
use crate::facts::FactEnv;

/// Compiler binary used when none is configured.
pub const DEFAULT_COMPILER: &str = "/usr/bin/puppet";

const CREATING_DEFAULT_SCHEDULES: &str = "Creating default schedules";
const FINISHING_TRANSACTION: &str = "Finishing transaction";

/// How long a compiler that already reported success may take to exit
/// before it is killed.
const EXIT_GRACE: Duration = Duration::from_secs(5);

/// Decides from the compiler's output whether the compile succeeded.
pub trait SuccessMatcher {
    /// Feed the next output line. Returns true once the output seen so far
    /// signals success.
    fn observe(&mut self, line: &str) -> bool;
}

impl<M: SuccessMatcher + ?Sized> SuccessMatcher for Box<M> {
    fn observe(&mut self, line: &str) -> bool {
        (**self).observe(line)
    }
}

/// Puppet's debug output ends a successful noop run with "Creating default
/// schedules" directly followed by "Finishing transaction".
#[derive(Debug, Clone, Default)]
pub struct ScheduleTransactionMatcher {
    after_schedules: bool,
}

impl SuccessMatcher for ScheduleTransactionMatcher {
    fn observe(&mut self, line: &str) -> bool {
        let matched = self.after_schedules && line.contains(FINISHING_TRANSACTION);
        self.after_schedules = line.contains(CREATING_DEFAULT_SCHEDULES);
        matched
    }
}

/// Result of a dry compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Ok,
    Broken,
}

impl RunStatus {
    pub fn is_ok(self) -> bool {
        self == RunStatus::Ok
    }

    /// Process exit code for this status.
    pub fn exit_code(self) -> i32 {
        match self {
            RunStatus::Ok => 0,
            RunStatus::Broken => 1,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Ok => write!(f, "OK"),
            RunStatus::Broken => write!(f, "broken"),
        }
    }
}

/// Why reading the compiler's output stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The matcher accepted the output.
    Matched,
    /// The output ended without a match.
    EndOfOutput,
    /// The timeout passed first; the compiler was killed.
    TimedOut,
}

/// Output captured from one compiler run.
#[derive(Debug, Clone)]
pub struct CompilationReport {
    /// Lines read, in order, up to and including the matching one.
    pub lines: Vec<String>,
    pub status: RunStatus,
    pub outcome: Outcome,
    /// Exit status of the compiler, when it was reaped. Informational.
    pub exit_status: Option<ExitStatus>,
}

impl CompilationReport {
    /// The last `n` captured lines.
    pub fn tail(&self, n: usize) -> &[String] {
        &self.lines[self.lines.len().saturating_sub(n)..]
    }
}

/// The compiler program and any arguments that go before the generated
/// ones (e.g. `apply` for newer Puppet releases).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerCommand {
    pub program: PathBuf,
    pub leading_args: Vec<OsString>,
}

impl CompilerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.leading_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Arguments for compiling `manifest` as `node` under `config`.
    pub fn arguments(&self, config: &Path, node: &str, manifest: &Path) -> Vec<OsString> {
        let mut args = self.leading_args.clone();
        args.push("--config".into());
        args.push(config.into());
        args.push("--certname".into());
        args.push(node.into());
        args.push("--debug".into());
        args.push(manifest.into());
        args
    }

    /// Shell-quoted command line, for echoing to the operator.
    pub fn command_line(&self, args: &[OsString]) -> String {
        let words: Vec<String> = std::iter::once(self.program.as_os_str())
            .chain(args.iter().map(OsString::as_os_str))
            .map(|word| word.to_string_lossy().into_owned())
            .collect();
        shlex::try_join(words.iter().map(String::as_str)).unwrap_or_else(|_| words.join(" "))
    }
}

impl Default for CompilerCommand {
    fn default() -> Self {
        Self::new(DEFAULT_COMPILER)
    }
}

/// Runs the compiler and watches its output.
pub struct Orchestrator<M> {
    command: CompilerCommand,
    matcher: M,
    echo: bool,
    timeout: Option<Duration>,
}

impl<M: SuccessMatcher> Orchestrator<M> {
    pub fn new(command: CompilerCommand, matcher: M) -> Self {
        Self {
            command,
            matcher,
            echo: false,
            timeout: None,
        }
    }

    /// Print the command line and every output line as it arrives.
    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Give up and kill the compiler after this long.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Compile `manifest` for `node` with `config`, exporting `facts`.
    pub async fn run(
        &mut self,
        config: &Path,
        manifest: &Path,
        node: &str,
        facts: &FactEnv,
    ) -> Result<CompilationReport> {
        let args = self.command.arguments(config, node, manifest);
        if self.echo {
            println!("{}", self.command.command_line(&args));
        }

        let spawn_error = |source: io::Error| ManitestError::Spawn {
            program: self.command.program.clone(),
            source,
        };

        let (reader, writer) = io::pipe().map_err(spawn_error)?;
        // The command owns the write ends; dropping it right after spawning
        // leaves the child as the only writer, so the pipe ends with it.
        let mut child = {
            let mut cmd = Command::new(&self.command.program);
            cmd.args(&args)
                .envs(facts.iter())
                .stdin(Stdio::null())
                .stdout(writer.try_clone().map_err(spawn_error)?)
                .stderr(writer)
                .kill_on_drop(true);
            cmd.spawn().map_err(spawn_error)?
        };
        tracing::debug!(pid = ?child.id(), facts = facts.len(), "compiler started");

        let (tx, mut rx) = mpsc::unbounded_channel();
        thread::Builder::new()
            .name("compiler-output".to_string())
            .spawn(move || forward_lines(reader, tx))
            .map_err(ManitestError::Output)?;

        let deadline = self.timeout.map(|timeout| Instant::now() + timeout);
        let mut lines = Vec::new();
        let outcome = loop {
            let next = match deadline {
                Some(deadline) => match time::timeout_at(deadline, rx.recv()).await {
                    Ok(next) => next,
                    Err(_) => break Outcome::TimedOut,
                },
                None => rx.recv().await,
            };
            let Some(line) = next else {
                break Outcome::EndOfOutput;
            };

            let line = line.map_err(ManitestError::Output)?;
            if self.echo {
                println!("{line}");
            }
            let matched = self.matcher.observe(&line);
            lines.push(line);
            if matched {
                break Outcome::Matched;
            }
        };
        drop(rx);

        let status = if outcome == Outcome::Matched {
            RunStatus::Ok
        } else {
            RunStatus::Broken
        };
        tracing::debug!(?outcome, %status, lines = lines.len(), "compiler output finished");

        let exit_status = reap(&mut child, outcome, deadline).await;
        if let Some(exit_status) = exit_status {
            tracing::debug!(%exit_status, "compiler exited");
        }

        Ok(CompilationReport {
            lines,
            status,
            outcome,
            exit_status,
        })
    }
}

/// Read the merged output on a plain thread; a blocked read must not keep
/// the runtime from shutting down.
fn forward_lines(reader: impl io::Read, tx: mpsc::UnboundedSender<io::Result<String>>) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(|c: char| c == '\n' || c == '\r')
                    .to_string();
                if tx.send(Ok(line)).is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e));
                break;
            }
        }
    }
}

/// Wait for the compiler to exit as far as the outcome allows, then kill it.
async fn reap(
    child: &mut Child,
    outcome: Outcome,
    deadline: Option<Instant>,
) -> Option<ExitStatus> {
    let waited = match (outcome, deadline) {
        (Outcome::TimedOut, _) => None,
        (Outcome::Matched, _) => time::timeout(EXIT_GRACE, child.wait()).await.ok(),
        (Outcome::EndOfOutput, Some(deadline)) => {
            time::timeout_at(deadline, child.wait()).await.ok()
        }
        (Outcome::EndOfOutput, None) => Some(child.wait().await),
    };

    match waited {
        Some(Ok(status)) => return Some(status),
        Some(Err(e)) => {
            tracing::warn!("failed to wait for compiler: {e}");
            return None;
        }
        None => {}
    }

    tracing::debug!(?outcome, "killing compiler");
    if let Err(e) = child.start_kill() {
        tracing::debug!("compiler could not be killed: {e}");
    }
    child.wait().await.ok()
}
