//! External command execution
//!
//! Every shell-out of the bootstrap (rm, mkdir, git, npm, service, gcloud)
//! goes through the [`CommandRunner`] trait. [`HostRunner`] spawns real
//! processes with `tokio::process`; [`mock::MockRunner`] records invocations
//! so tests can assert on arguments without touching the host.

use crate::errors::{ProcessError, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, instrument};

/// How the child's stdio is wired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Child shares the parent's stdin/stdout/stderr
    Inherit,
    /// Output is collected into [`ExecResult`]
    Capture,
}

/// A single external command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub output: OutputMode,
}

impl CommandSpec {
    /// Create a command with streamed output and no explicit cwd
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            output: OutputMode::Inherit,
        }
    }

    /// Build a command from a pre-split argv (first element is the program)
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone()).args(args.iter().cloned()))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Capture output instead of streaming it
    pub fn capture(mut self) -> Self {
        self.output = OutputMode::Capture;
        self
    }

    /// Program followed by its arguments
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Render the command as a shell-quoted string for logs and errors
    pub fn command_line(&self) -> String {
        let mut words = Vec::with_capacity(self.args.len() + 1);
        words.push(self.program.as_str());
        words.extend(self.args.iter().map(String::as_str));
        shell_words::join(words)
    }
}

/// Result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Exit code, -1 when the process was terminated by a signal
    pub exit_code: i32,
    pub success: bool,
    /// Empty unless the command ran with [`OutputMode::Capture`]
    pub stdout: String,
    pub stderr: String,
}

/// Command execution abstraction
///
/// `run` only fails when the program cannot be spawned. A non-zero exit is
/// reported through [`ExecResult::success`]; use [`run_checked`] to turn it
/// into an error.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<ExecResult>;
}

impl<T: CommandRunner> CommandRunner for &T {
    async fn run(&self, spec: &CommandSpec) -> Result<ExecResult> {
        (*self).run(spec).await
    }
}

/// Run a command and fail on non-zero exit
pub async fn run_checked<R: CommandRunner>(runner: &R, spec: &CommandSpec) -> Result<ExecResult> {
    let result = runner.run(spec).await?;
    if result.success {
        Ok(result)
    } else {
        Err(ProcessError::ExitStatus {
            command: spec.command_line(),
            code: result.exit_code,
        }
        .into())
    }
}

/// Runs commands as child processes of the current process
#[derive(Debug, Clone, Default)]
pub struct HostRunner;

impl HostRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for HostRunner {
    #[instrument(skip(self), fields(command = %spec.command_line()))]
    async fn run(&self, spec: &CommandSpec) -> Result<ExecResult> {
        let mut command = Command::new(&spec.program);
        command.args(&spec.args);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        let spawn_error = |source| ProcessError::Spawn {
            program: spec.program.clone(),
            source,
        };

        let result = match spec.output {
            OutputMode::Inherit => {
                let status = command
                    .stdin(Stdio::inherit())
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit())
                    .status()
                    .await
                    .map_err(spawn_error)?;
                ExecResult {
                    exit_code: status.code().unwrap_or(-1),
                    success: status.success(),
                    ..Default::default()
                }
            }
            OutputMode::Capture => {
                let output = command
                    .stdin(Stdio::null())
                    .output()
                    .await
                    .map_err(spawn_error)?;
                ExecResult {
                    exit_code: output.status.code().unwrap_or(-1),
                    success: output.status.success(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                }
            }
        };

        debug!("Command exited with code {}", result.exit_code);
        Ok(result)
    }
}

pub mod mock {
    //! Recording command runner for tests
    //!
    //! Every invocation is appended to a history. By default each command
    //! succeeds with exit code 0; responses can be overridden per program, and
    //! side effects (e.g. creating a directory for `mkdir`) can be attached.

    use super::{CommandRunner, CommandSpec, ExecResult};
    use crate::errors::{ProcessError, Result};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    type Effect = Arc<dyn Fn(&CommandSpec) + Send + Sync>;

    /// Canned response for a program
    #[derive(Debug, Clone)]
    pub enum MockResponse {
        Exit { code: i32, stdout: String, stderr: String },
        SpawnError,
    }

    impl MockResponse {
        pub fn exit(code: i32) -> Self {
            MockResponse::Exit {
                code,
                stdout: String::new(),
                stderr: String::new(),
            }
        }
    }

    #[derive(Default, Clone)]
    pub struct MockRunner {
        history: Arc<Mutex<Vec<CommandSpec>>>,
        responses: Arc<Mutex<HashMap<String, MockResponse>>>,
        effects: Arc<Mutex<HashMap<String, Effect>>>,
    }

    impl std::fmt::Debug for MockRunner {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("MockRunner")
                .field("history", &self.history)
                .field("responses", &self.responses)
                .finish_non_exhaustive()
        }
    }

    impl MockRunner {
        pub fn new() -> Self {
            Self::default()
        }

        /// Override the response for every invocation of `program`
        pub fn respond(&self, program: &str, response: MockResponse) {
            self.responses
                .lock()
                .unwrap()
                .insert(program.to_string(), response);
        }

        /// Make `program` exit with the given non-zero code
        pub fn fail(&self, program: &str, code: i32) {
            self.respond(program, MockResponse::exit(code));
        }

        /// Make `program` impossible to spawn
        pub fn missing(&self, program: &str) {
            self.respond(program, MockResponse::SpawnError);
        }

        /// Run `effect` whenever `program` is invoked successfully
        pub fn on_run<F>(&self, program: &str, effect: F)
        where
            F: Fn(&CommandSpec) + Send + Sync + 'static,
        {
            self.effects
                .lock()
                .unwrap()
                .insert(program.to_string(), Arc::new(effect));
        }

        /// All invocations so far, in order
        pub fn history(&self) -> Vec<CommandSpec> {
            self.history.lock().unwrap().clone()
        }

        /// Invocations rendered as command lines
        pub fn command_lines(&self) -> Vec<String> {
            self.history().iter().map(CommandSpec::command_line).collect()
        }

        /// Invocations of a single program
        pub fn calls_to(&self, program: &str) -> Vec<CommandSpec> {
            self.history()
                .into_iter()
                .filter(|spec| spec.program == program)
                .collect()
        }
    }

    impl CommandRunner for MockRunner {
        async fn run(&self, spec: &CommandSpec) -> Result<ExecResult> {
            self.history.lock().unwrap().push(spec.clone());

            let response = self.responses.lock().unwrap().get(&spec.program).cloned();
            match response {
                Some(MockResponse::SpawnError) => Err(ProcessError::Spawn {
                    program: spec.program.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
                }
                .into()),
                Some(MockResponse::Exit {
                    code,
                    stdout,
                    stderr,
                }) => Ok(ExecResult {
                    exit_code: code,
                    success: code == 0,
                    stdout,
                    stderr,
                }),
                None => {
                    let effect = self.effects.lock().unwrap().get(&spec.program).cloned();
                    if let Some(effect) = effect {
                        effect(spec);
                    }
                    Ok(ExecResult {
                        exit_code: 0,
                        success: true,
                        ..Default::default()
                    })
                }
            }
        }
    }
}
