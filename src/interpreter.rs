use crate::command::{BuiltinRegistry, ExitCode};
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::env::Environment;
use crate::error::ShellError;
use crate::jobs::{FinishedJob, JobTable};
use crate::parser::parse_line;
use crate::pipeline::{Pipeline, wait_for_completion};
use crate::process::{OsProcessBackend, ProcessBackend};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::sync::Arc;

/// What happened to one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// Every dispatched stage finished; carries the last stage's status.
    Completed(ExitCode),
    /// The pipeline was moved to the job table without waiting.
    Background { job: usize, pids: Vec<u32> },
    /// `exit` ran and the shell should stop with this status.
    Exit(ExitCode),
}

/// A minimal shell that runs one pipeline per input line.
///
/// Each line goes through parse, build (redirects and pipes), dispatch and, unless it
/// was sent to the background, a wait for every spawned stage.
///
/// Example
/// ```no_run
/// use tiny_shell::{Interpreter, LineOutcome};
/// let mut sh = Interpreter::default();
/// let outcome = sh.execute_line("ls | cat > listing.txt").unwrap();
/// assert_eq!(outcome, LineOutcome::Completed(0));
/// ```
pub struct Interpreter<B: ProcessBackend = OsProcessBackend> {
    env: Environment,
    registry: Arc<BuiltinRegistry>,
    backend: B,
    jobs: JobTable<B::Process>,
    config: Config,
    last_status: ExitCode,
}

impl Default for Interpreter {
    /// The standard builtins and real processes.
    fn default() -> Self {
        Self::with_backend(BuiltinRegistry::standard(), OsProcessBackend)
    }
}

impl<B: ProcessBackend> Interpreter<B> {
    pub fn with_backend(registry: Arc<BuiltinRegistry>, backend: B) -> Self {
        Self {
            env: Environment::new(),
            registry,
            backend,
            jobs: JobTable::new(),
            config: Config::default(),
            last_status: 0,
        }
    }

    /// Apply startup configuration. A configured `path` replaces `PATH` for lookups.
    pub fn with_config(mut self, config: Config) -> Self {
        if let Some(path) = &config.path {
            self.env.set_var("PATH", path.clone());
        }
        self.config = config;
        self
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Status of the most recent line run through [`Interpreter::run_line`].
    pub fn last_status(&self) -> ExitCode {
        self.last_status
    }

    /// Run one line and report how it ended.
    ///
    /// Parse and setup errors are returned before anything starts. A spawn failure is
    /// returned only after the stages started before it have been waited on.
    pub fn execute_line(&mut self, line: &str) -> Result<LineOutcome, ShellError> {
        let stages = parse_line(line)?;
        let mut pipeline = Pipeline::build(&stages, &self.env.current_dir)?;
        let outcome =
            Dispatcher::new(&self.registry, &mut self.backend, &mut self.env).dispatch(&mut pipeline);

        if let Some(code) = outcome.exit_requested {
            return Ok(LineOutcome::Exit(code));
        }

        if pipeline.is_background() {
            let processes: Vec<B::Process> = pipeline
                .take_processes()
                .into_iter()
                .map(|(_, process)| process)
                .collect();
            let pids: Vec<u32> = processes.iter().map(|p| self.backend.id(p)).collect();
            let command = line.trim().trim_end_matches('&').trim_end();
            let job = self.jobs.add(command, processes);
            tracing::info!(job, ?pids, "started background job");
            return match outcome.spawn_failure {
                Some(err) => Err(err),
                None => Ok(LineOutcome::Background { job, pids }),
            };
        }

        wait_for_completion(&mut self.backend, &mut pipeline)?;
        match outcome.spawn_failure {
            Some(err) => Err(err),
            None => Ok(LineOutcome::Completed(pipeline.last_exit_code().unwrap_or(0))),
        }
    }

    /// Run one line, printing diagnostics the way an interactive shell does.
    pub fn run_line(&mut self, line: &str) -> ExitCode {
        let status = match self.execute_line(line) {
            Ok(LineOutcome::Completed(code) | LineOutcome::Exit(code)) => code,
            Ok(LineOutcome::Background { job, pids }) => {
                let pids: Vec<String> = pids.iter().map(u32::to_string).collect();
                println!("[{job}] {}", pids.join(" "));
                0
            }
            Err(err) => {
                eprintln!("{err}");
                err.exit_code()
            }
        };
        self.last_status = status;
        status
    }

    /// Poll background jobs and print the ones that finished.
    pub fn report_finished_jobs(&mut self) -> Vec<FinishedJob> {
        let finished = self.jobs.reap(&mut self.backend);
        for job in &finished {
            tracing::info!(job = job.id, exit_code = job.exit_code, "background job done");
            println!("[{}] done {}", job.id, job.command);
        }
        finished
    }

    /// Interactive loop until `exit` or end of input.
    ///
    /// Returns the status requested by `exit`, or that of the last line on end of input.
    pub fn repl(&mut self) -> rustyline::Result<ExitCode> {
        let mut rl = DefaultEditor::new()?;

        while !self.env.should_exit() {
            self.report_finished_jobs();
            match rl.readline(&self.config.prompt) {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    self.run_line(&line);
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err),
            }
        }

        self.report_finished_jobs();
        Ok(self.env.exit_request.unwrap_or(self.last_status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::RecordingBackend;
    use std::fs;

    fn shell_in(dir: &std::path::Path, backend: RecordingBackend) -> Interpreter<RecordingBackend> {
        let mut sh = Interpreter::with_backend(BuiltinRegistry::standard(), backend);
        sh.env_mut().current_dir = dir.to_path_buf();
        sh
    }

    #[test]
    fn test_builtin_output_redirected_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut sh = shell_in(dir.path(), RecordingBackend::default());

        let outcome = sh.execute_line("pwd > where.txt").unwrap();

        assert_eq!(outcome, LineOutcome::Completed(0));
        let written = fs::read_to_string(dir.path().join("where.txt")).unwrap();
        assert_eq!(written, format!("{}\n", dir.path().display()));
    }

    #[test]
    fn test_builtins_through_pipe() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes"), "line one\nline two\n").unwrap();
        let mut sh = shell_in(dir.path(), RecordingBackend::default());

        sh.execute_line("cat notes | cat | cat > copy").unwrap();

        let copy = fs::read_to_string(dir.path().join("copy")).unwrap();
        assert_eq!(copy, "line one\nline two\n");
        assert!(sh.backend().spawned.is_empty());
    }

    #[test]
    fn test_status_is_last_stage() {
        let dir = tempfile::tempdir().unwrap();
        let backend = RecordingBackend {
            exit_code: 5,
            ..RecordingBackend::default()
        };
        let mut sh = shell_in(dir.path(), backend);

        assert_eq!(sh.execute_line("a | b").unwrap(), LineOutcome::Completed(5));
        assert_eq!(sh.backend().waited, vec![1, 2]);
        assert_eq!(sh.execute_line("a | pwd > /dev/null").unwrap(), LineOutcome::Completed(0));
    }

    #[test]
    fn test_parse_error_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut sh = shell_in(dir.path(), RecordingBackend::default());

        let err = sh.execute_line("a | | b").unwrap_err();
        assert!(matches!(err, ShellError::Parse(_)));
        assert!(sh.backend().spawned.is_empty());
        assert_eq!(sh.run_line("a >"), 2);
        assert_eq!(sh.last_status(), 2);
    }

    #[test]
    fn test_missing_input_file_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut sh = shell_in(dir.path(), RecordingBackend::default());

        assert_eq!(sh.run_line("a | b < missing"), 1);
        assert!(sh.backend().spawned.is_empty());
    }

    #[test]
    fn test_spawn_failure_waits_for_started_stages() {
        let dir = tempfile::tempdir().unwrap();
        let backend = RecordingBackend {
            failing: vec!["nope".to_string()],
            ..RecordingBackend::default()
        };
        let mut sh = shell_in(dir.path(), backend);

        let err = sh.execute_line("first | nope | last").unwrap_err();

        assert!(matches!(err, ShellError::Spawn { .. }));
        assert_eq!(err.exit_code(), 127);
        assert_eq!(sh.backend().waited, vec![1]);
        assert_eq!(sh.backend().spawned.len(), 2);
    }

    #[test]
    fn test_background_job_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut sh = shell_in(dir.path(), RecordingBackend::default());

        let outcome = sh.execute_line("sleep 5 | cat &").unwrap();
        // `cat` is a builtin, so only `sleep` has a process.
        assert_eq!(
            outcome,
            LineOutcome::Background {
                job: 1,
                pids: vec![1],
            }
        );
        assert!(sh.backend().waited.is_empty());
        assert!(sh.report_finished_jobs().is_empty());

        sh.backend_mut().finished = true;
        let done = sh.report_finished_jobs();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].command, "sleep 5 | cat");
    }

    #[test]
    fn test_exit_is_not_waited_on() {
        let dir = tempfile::tempdir().unwrap();
        let mut sh = shell_in(dir.path(), RecordingBackend::default());

        assert_eq!(sh.execute_line("exit 3").unwrap(), LineOutcome::Exit(3));
        assert!(sh.env().should_exit());
        assert!(sh.backend().waited.is_empty());
    }

    #[test]
    fn test_config_path_replaces_search_path() {
        let config = Config {
            prompt: "> ".to_string(),
            path: Some("/opt/tools".to_string()),
        };
        let sh = Interpreter::with_backend(BuiltinRegistry::standard(), RecordingBackend::default())
            .with_config(config);
        assert_eq!(sh.env().get_var("PATH").as_deref(), Some("/opt/tools"));
        assert_eq!(sh.config().prompt, "> ");
    }
}
