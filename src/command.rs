use crate::env::Environment;
use std::collections::HashMap;
use std::fmt;
use std::io::{Read, Write};
use std::sync::{Arc, LazyLock};

/// Stage and line status; 0 is success.
pub type ExitCode = i32;

/// The standard streams a builtin runs against.
///
/// Each one is either a stream owned by the stage (file or pipe end) or the shell's
/// own standard stream; the builtin cannot tell the difference.
pub struct BuiltinIo<'a> {
    pub stdin: &'a mut dyn Read,
    pub stdout: &'a mut dyn Write,
    pub stderr: &'a mut dyn Write,
}

/// A builtin entry point.
///
/// `args[0]` is the command name itself, POSIX argv style. The call is synchronous and
/// the return value is the stage's exit code.
pub type Handler =
    Box<dyn Fn(&[String], &mut BuiltinIo<'_>, &mut Environment) -> ExitCode + Send + Sync>;

/// Name to handler mapping consulted by the dispatcher.
pub struct BuiltinRegistry {
    handlers: HashMap<String, Handler>,
}

static STANDARD: LazyLock<Arc<BuiltinRegistry>> =
    LazyLock::new(|| Arc::new(crate::builtin::standard_registry()));

impl BuiltinRegistry {
    /// A registry without any builtins; every command is external.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// The process-wide registry holding the shell's own builtins.
    ///
    /// Built on first use and read-only afterwards.
    pub fn standard() -> Arc<BuiltinRegistry> {
        Arc::clone(&STANDARD)
    }

    /// Add (or replace) a handler.
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(&[String], &mut BuiltinIo<'_>, &mut Environment) -> ExitCode + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Box::new(handler));
        self
    }

    pub fn lookup(&self, name: &str) -> Option<&Handler> {
        self.handlers.get(name)
    }

    /// Registered command names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for BuiltinRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinRegistry")
            .field("names", &self.names())
            .finish()
    }
}
