//! The process-spawning port used by the dispatcher and the completion waiter.
//!
//! [`OsProcessBackend`] is the real implementation on top of `std::process`; tests
//! substitute a recording fake so the engine can run without touching the OS.

use crate::command::ExitCode;
use crate::env::Environment;
use crate::external::{find_command_path, status_to_exit_code};
use crate::stream::Stream;
use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;

/// Streams bound to a process at spawn time. `None` inherits the shell's own stream.
#[derive(Debug, Default)]
pub struct SpawnStdio {
    pub stdin: Option<Stream>,
    pub stdout: Option<Stream>,
    pub stderr: Option<Stream>,
}

/// Capability to start and reap external programs.
pub trait ProcessBackend {
    /// Handle to a running process; dropping it releases the record.
    type Process;

    /// Start `command` (program name followed by whitespace-separated arguments).
    ///
    /// Ownership of every stream in `stdio` passes to the backend, which closes its
    /// copies whether or not the spawn succeeds.
    fn spawn(
        &mut self,
        command: &str,
        stdio: SpawnStdio,
        env: &Environment,
    ) -> io::Result<Self::Process>;

    /// Block until every process has exited and return their exit codes in input order.
    fn wait_all(&mut self, processes: Vec<Self::Process>) -> io::Result<Vec<ExitCode>>;

    /// Non-blocking completion check.
    fn try_wait(&mut self, process: &mut Self::Process) -> io::Result<Option<ExitCode>>;

    /// OS process identifier, for diagnostics and job listings.
    fn id(&self, process: &Self::Process) -> u32;
}

/// Spawns real processes resolved through the environment's `PATH`.
#[derive(Debug, Default)]
pub struct OsProcessBackend;

impl ProcessBackend for OsProcessBackend {
    type Process = Child;

    fn spawn(&mut self, command: &str, stdio: SpawnStdio, env: &Environment) -> io::Result<Child> {
        let mut words = command.split_whitespace();
        let name = words.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "empty command")
        })?;

        let search_paths = env.get_var("PATH").unwrap_or_default();
        let program = find_command_path(
            OsStr::new(&search_paths),
            &env.current_dir,
            Path::new(name),
        )
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "command not found"))?;

        let child = Command::new(&program)
            .args(words)
            .stdin(stdio.stdin.map_or_else(Stdio::inherit, Stdio::from))
            .stdout(stdio.stdout.map_or_else(Stdio::inherit, Stdio::from))
            .stderr(stdio.stderr.map_or_else(Stdio::inherit, Stdio::from))
            .envs(env.vars.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&env.current_dir)
            .spawn()?;
        // `Command` is gone at this point, and with it our copies of the stage's streams.
        tracing::debug!(pid = child.id(), program = %program.display(), "spawned");
        Ok(child)
    }

    fn wait_all(&mut self, children: Vec<Child>) -> io::Result<Vec<ExitCode>> {
        let mut codes = vec![0; children.len()];
        let mut first_error = None;
        let (tx, rx) = mpsc::channel();

        thread::scope(|scope| {
            for (index, mut child) in children.into_iter().enumerate() {
                let tx = tx.clone();
                scope.spawn(move || {
                    let pid = child.id();
                    let status = child.wait();
                    let _ = tx.send((index, pid, status));
                });
            }
            drop(tx);

            // Exits arrive in completion order, not pipeline order.
            for (index, pid, status) in rx {
                match status {
                    Ok(status) => {
                        let code = status_to_exit_code(status);
                        tracing::debug!(pid, code, "reaped");
                        codes[index] = code;
                    }
                    Err(e) => {
                        tracing::warn!(pid, error = %e, "wait failed");
                        codes[index] = -1;
                        first_error.get_or_insert(e);
                    }
                }
            }
        });

        match first_error {
            Some(e) => Err(e),
            None => Ok(codes),
        }
    }

    fn try_wait(&mut self, child: &mut Child) -> io::Result<Option<ExitCode>> {
        Ok(child.try_wait()?.map(status_to_exit_code))
    }

    fn id(&self, child: &Child) -> u32 {
        child.id()
    }
}
