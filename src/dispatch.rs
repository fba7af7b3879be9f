use crate::command::{BuiltinIo, BuiltinRegistry, ExitCode, Handler};
use crate::env::Environment;
use crate::error::ShellError;
use crate::pipeline::Pipeline;
use crate::process::ProcessBackend;
use crate::unit::ExecutionUnit;
use std::io::{self, Read, Write};

/// How dispatch of a pipeline ended.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// A stage failed to start. Stages after it were not dispatched.
    pub spawn_failure: Option<ShellError>,
    /// The `exit` builtin ran; stages after it were not dispatched.
    pub exit_requested: Option<ExitCode>,
}

/// Routes each unit of a pipeline to a builtin handler or the process backend.
pub struct Dispatcher<'a, B: ProcessBackend> {
    registry: &'a BuiltinRegistry,
    backend: &'a mut B,
    env: &'a mut Environment,
}

impl<'a, B: ProcessBackend> Dispatcher<'a, B> {
    pub fn new(registry: &'a BuiltinRegistry, backend: &'a mut B, env: &'a mut Environment) -> Self {
        Self {
            registry,
            backend,
            env,
        }
    }

    /// Dispatch every unit in stage order.
    ///
    /// Builtins run to completion before the next unit is looked at; external stages are
    /// only started. When dispatch stops early, the remaining units' streams are closed
    /// right away so that stages already running see EOF or a broken pipe.
    pub fn dispatch(&mut self, pipeline: &mut Pipeline<B::Process>) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        let units = pipeline.units_mut();
        let mut stopped_at = None;

        for (index, unit) in units.iter_mut().enumerate() {
            if let Err(err) = self.dispatch_unit(unit) {
                outcome.spawn_failure = Some(err);
                stopped_at = Some(index + 1);
                break;
            }
            if let Some(code) = self.env.exit_request {
                outcome.exit_requested = Some(code);
                stopped_at = Some(index + 1);
                break;
            }
        }

        if let Some(next) = stopped_at {
            for unit in &mut units[next..] {
                unit.release_streams();
            }
            tracing::debug!(skipped = units.len() - next, "dispatch stopped early");
        }
        outcome
    }

    fn dispatch_unit(&mut self, unit: &mut ExecutionUnit<B::Process>) -> Result<(), ShellError> {
        let argv = unit.argv();
        let Some(name) = argv.first() else {
            // A redirect-only stage such as `> file`: opening the files was the whole job.
            unit.release_streams();
            unit.exit_code = Some(0);
            return Ok(());
        };

        if let Some(handler) = self.registry.lookup(name) {
            unit.is_builtin = true;
            let code = run_builtin(handler, unit, &argv, self.env);
            tracing::debug!(command = %name, code, "builtin finished");
            unit.exit_code = Some(code);
            return Ok(());
        }

        let stdio = unit.take_spawn_stdio();
        match self.backend.spawn(&unit.command_text, stdio, self.env) {
            Ok(process) => {
                tracing::debug!(
                    command = %unit.command_text,
                    pid = self.backend.id(&process),
                    redirected = unit.uses_redirected_streams,
                    "dispatched"
                );
                unit.process = Some(process);
                Ok(())
            }
            Err(source) => Err(ShellError::Spawn {
                command: unit.command_text.clone(),
                source,
            }),
        }
    }
}

/// Call a builtin with the unit's streams, falling back to the shell's own.
///
/// The unit's handles are moved out for the call and closed when it returns, so a
/// downstream stage sees EOF as soon as the builtin is done.
fn run_builtin<P>(
    handler: &Handler,
    unit: &mut ExecutionUnit<P>,
    argv: &[String],
    env: &mut Environment,
) -> ExitCode {
    let mut stdin = unit.stdin.take();
    let mut stdout = unit.stdout.take();
    let mut stderr = unit.stderr.take();
    let mut shell_stdin = io::stdin();
    let mut shell_stdout = io::stdout();
    let mut shell_stderr = io::stderr();

    let mut io = BuiltinIo {
        stdin: match stdin.as_mut() {
            Some(s) => s as &mut dyn Read,
            None => &mut shell_stdin,
        },
        stdout: match stdout.as_mut() {
            Some(s) => s as &mut dyn Write,
            None => &mut shell_stdout,
        },
        stderr: match stderr.as_mut() {
            Some(s) => s as &mut dyn Write,
            None => &mut shell_stderr,
        },
    };

    let code = handler(argv, &mut io, env);
    let _ = io.stdout.flush();
    let _ = io.stderr.flush();
    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_line;
    use crate::process::testing::{RecordingBackend, SpawnRecord};
    use crate::test_support::env_in;
    use std::fs;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    type Calls = Arc<Mutex<Vec<Vec<String>>>>;

    /// Registry with `probe` (records its argv, copies stdin to stdout) and the
    /// standard `exit`.
    fn probe_registry() -> (BuiltinRegistry, Calls) {
        let calls: Calls = Arc::default();
        let seen = Arc::clone(&calls);
        let mut registry = BuiltinRegistry::empty();
        registry.register("probe", move |args, io, _env| {
            seen.lock().unwrap().push(args.to_vec());
            match std::io::copy(io.stdin, io.stdout) {
                Ok(_) => 0,
                Err(_) => 1,
            }
        });
        registry.register("exit", crate::builtin::invoke::<crate::builtin::Exit>);
        (registry, calls)
    }

    fn run(
        line: &str,
        dir: &Path,
        registry: &BuiltinRegistry,
        backend: &mut RecordingBackend,
    ) -> (Pipeline<crate::process::testing::FakeProcess>, DispatchOutcome) {
        let mut env = env_in(dir);
        let mut pipeline = Pipeline::build(&parse_line(line).unwrap(), dir).unwrap();
        let outcome = Dispatcher::new(registry, backend, &mut env).dispatch(&mut pipeline);
        (pipeline, outcome)
    }

    #[test]
    fn test_builtin_invoked_once_with_name_first() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("in.txt"), "").unwrap();
        let (registry, calls) = probe_registry();
        let mut backend = RecordingBackend::default();

        let (pipeline, outcome) = run("probe a  b < in.txt", dir.path(), &registry, &mut backend);
        assert!(outcome.spawn_failure.is_none());
        assert!(pipeline.units()[0].is_builtin);
        assert_eq!(pipeline.units()[0].exit_code, Some(0));

        run("probe c < in.txt > out.txt", dir.path(), &registry, &mut backend);

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], ["probe", "a", "b"]);
        assert_eq!(calls[1], ["probe", "c"]);
        assert!(backend.spawned.is_empty());
    }

    #[test]
    fn test_unknown_command_goes_to_backend() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, _) = probe_registry();
        let mut backend = RecordingBackend::default();

        let (pipeline, _) = run("grep -v x", dir.path(), &registry, &mut backend);

        assert_eq!(
            backend.spawned,
            [SpawnRecord {
                command: "grep -v x".to_string(),
                stdin: false,
                stdout: false,
                stderr: false,
            }]
        );
        let unit = &pipeline.units()[0];
        assert!(!unit.is_builtin);
        assert!(unit.process.is_some());
    }

    #[test]
    fn test_no_stream_left_owned_after_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, _) = probe_registry();
        let mut backend = RecordingBackend::default();

        let (pipeline, outcome) = run(
            "gen 2> gen.err | probe | sort > sorted.txt",
            dir.path(),
            &registry,
            &mut backend,
        );
        assert!(outcome.spawn_failure.is_none());
        assert!(pipeline.units().iter().all(|u| !u.holds_streams()));

        assert_eq!(backend.spawned.len(), 2);
        assert!(backend.spawned[0].stdout && backend.spawned[0].stderr);
        assert!(!backend.spawned[0].stdin);
        assert!(backend.spawned[1].stdin && backend.spawned[1].stdout);
    }

    #[test]
    fn test_external_output_flows_into_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, _) = probe_registry();
        let mut backend = RecordingBackend {
            output: Some(b"produced upstream\n".to_vec()),
            ..RecordingBackend::default()
        };

        run("producer | probe > captured.txt", dir.path(), &registry, &mut backend);

        let captured = fs::read_to_string(dir.path().join("captured.txt")).unwrap();
        assert_eq!(captured, "produced upstream\n");
    }

    #[test]
    fn test_spawn_failure_stops_later_stages() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, calls) = probe_registry();
        let mut backend = RecordingBackend {
            failing: vec!["missing".to_string()],
            ..RecordingBackend::default()
        };

        let (pipeline, outcome) =
            run("first | missing | probe", dir.path(), &registry, &mut backend);

        match outcome.spawn_failure {
            Some(ShellError::Spawn { command, source }) => {
                assert_eq!(command, "missing");
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("expected spawn failure, got {:?}", other),
        }
        let commands: Vec<&str> = backend.spawned.iter().map(|s| s.command.as_str()).collect();
        assert_eq!(commands, ["first", "missing"]);
        assert!(calls.lock().unwrap().is_empty());

        let units = pipeline.units();
        assert!(units[0].process.is_some());
        assert!(units[1].process.is_none());
        assert!(units.iter().all(|u| !u.holds_streams()));
    }

    #[test]
    fn test_exit_stops_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, _) = probe_registry();
        let mut backend = RecordingBackend::default();

        let (pipeline, outcome) = run("exit 3 | tail", dir.path(), &registry, &mut backend);

        assert_eq!(outcome.exit_requested, Some(3));
        assert!(backend.spawned.is_empty());
        assert!(pipeline.units().iter().all(|u| !u.holds_streams()));
    }

    #[test]
    fn test_redirect_only_line_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, _) = probe_registry();
        let mut backend = RecordingBackend::default();

        let (pipeline, outcome) = run("> touched.txt", dir.path(), &registry, &mut backend);

        assert!(outcome.spawn_failure.is_none());
        assert!(backend.spawned.is_empty());
        assert_eq!(pipeline.last_exit_code(), Some(0));
        assert!(dir.path().join("touched.txt").exists());
    }
}
