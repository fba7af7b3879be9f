use crate::command::ExitCode;
use crate::error::ShellError;
use crate::parser::StageDescriptor;
use crate::process::SpawnStdio;
use crate::stream::{Stream, StreamSlot};
use std::fs::File;
use std::io;
use std::path::Path;

/// Runtime record for one pipeline stage.
///
/// The three stream slots own the stage's file and pipe handles until dispatch hands
/// them to a builtin or a child process. `P` is the process backend's handle type.
#[derive(Debug)]
pub struct ExecutionUnit<P> {
    pub command_text: String,
    pub stdin: StreamSlot,
    pub stdout: StreamSlot,
    pub stderr: StreamSlot,
    pub uses_redirected_streams: bool,
    pub is_builtin: bool,
    pub background: bool,
    pub process: Option<P>,
    pub exit_code: Option<ExitCode>,
}

impl<P> ExecutionUnit<P> {
    /// A unit with no streams attached.
    pub fn new(command_text: impl Into<String>) -> Self {
        Self {
            command_text: command_text.into(),
            stdin: StreamSlot::None,
            stdout: StreamSlot::None,
            stderr: StreamSlot::None,
            uses_redirected_streams: false,
            is_builtin: false,
            background: false,
            process: None,
            exit_code: None,
        }
    }

    /// Build the unit for `stage`, opening its redirect files.
    ///
    /// Relative paths are resolved against `base_dir`. Input files must exist; output
    /// and error files are created or truncated. Files opened before a failing one
    /// are closed again when the error is returned.
    pub fn from_stage(stage: &StageDescriptor, base_dir: &Path) -> Result<Self, ShellError> {
        let mut unit = Self::new(stage.command_text());
        unit.background = stage.background;
        unit.uses_redirected_streams = stage.uses_redirected_streams();

        if let Some(path) = &stage.input_path {
            unit.stdin.set(open_redirect(base_dir, path, |p| File::open(p))?);
        }
        if let Some(path) = &stage.output_path {
            unit.stdout.set(open_redirect(base_dir, path, |p| File::create(p))?);
        }
        if let Some(path) = &stage.error_path {
            unit.stderr.set(open_redirect(base_dir, path, |p| File::create(p))?);
        }
        Ok(unit)
    }

    /// Command name followed by its arguments, split on whitespace.
    pub fn argv(&self) -> Vec<String> {
        self.command_text
            .split_whitespace()
            .map(str::to_owned)
            .collect()
    }

    /// Move every owned stream out, for binding to a child process.
    pub fn take_spawn_stdio(&mut self) -> SpawnStdio {
        SpawnStdio {
            stdin: self.stdin.take(),
            stdout: self.stdout.take(),
            stderr: self.stderr.take(),
        }
    }

    /// Close whatever streams the unit still owns.
    pub fn release_streams(&mut self) {
        self.stdin.close();
        self.stdout.close();
        self.stderr.close();
    }

    /// Whether any stream is still owned locally.
    pub fn holds_streams(&self) -> bool {
        self.stdin.is_owned() || self.stdout.is_owned() || self.stderr.is_owned()
    }
}

fn open_redirect(
    base_dir: &Path,
    path: &Path,
    open: fn(&Path) -> io::Result<File>,
) -> Result<Stream, ShellError> {
    let full = base_dir.join(path);
    open(&full)
        .map(Stream::File)
        .map_err(|source| ShellError::Redirect {
            path: path.to_path_buf(),
            source,
        })
}
