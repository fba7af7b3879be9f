use crate::command::{BuiltinIo, BuiltinRegistry, ExitCode};
use crate::env::Environment;
use anyhow::{Context, Result, anyhow, bail};
use argh::{EarlyExit, FromArgs};
use chrono::{DateTime, Local};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "ls" or "cd".
    fn name() -> &'static str;

    /// Executes the command against the stage's streams.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(self, io: &mut BuiltinIo<'_>, env: &mut Environment) -> Result<ExitCode>;
}

/// Registry entry point for `T`: parse `args[1..]` and run.
///
/// Usage errors and `Err` results are written to the builtin's stderr and give status 1.
pub(crate) fn invoke<T: BuiltinCommand>(
    args: &[String],
    io: &mut BuiltinIo<'_>,
    env: &mut Environment,
) -> ExitCode {
    let expanded = expand_short_flags(args.get(1..).unwrap_or(&[]));
    let refs: Vec<&str> = expanded.iter().map(String::as_str).collect();

    let command = match T::from_args(&[T::name()], &refs) {
        Ok(command) => command,
        Err(EarlyExit { output, status }) => {
            let (out, code) = match status {
                Ok(()) => (&mut *io.stdout, 0),
                Err(()) => (&mut *io.stderr, 1),
            };
            let _ = writeln!(out, "{}", output.trim_end());
            return code;
        }
    };

    match command.execute(io, env) {
        Ok(code) => code,
        Err(e) if is_broken_pipe(&e) => {
            tracing::debug!(command = T::name(), "reader went away");
            1
        }
        Err(e) => {
            let _ = writeln!(io.stderr, "{e:#}");
            1
        }
    }
}

fn is_broken_pipe(e: &anyhow::Error) -> bool {
    e.downcast_ref::<io::Error>()
        .is_some_and(|e| e.kind() == io::ErrorKind::BrokenPipe)
}

/// Split clustered short switches (`-rf` becomes `-r -f`); argh only knows single ones.
fn expand_short_flags(args: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        match arg.strip_prefix('-') {
            Some(flags)
                if flags.len() > 1 && flags.chars().all(|c| c.is_ascii_alphabetic()) =>
            {
                out.extend(flags.chars().map(|c| format!("-{c}")));
            }
            _ => out.push(arg.clone()),
        }
    }
    out
}

/// The shell's own commands.
pub(crate) fn standard_registry() -> BuiltinRegistry {
    let mut registry = BuiltinRegistry::empty();
    registry
        .register(Cd::name(), invoke::<Cd>)
        .register(Pwd::name(), invoke::<Pwd>)
        .register(Ls::name(), invoke::<Ls>)
        .register(Exit::name(), invoke::<Exit>)
        .register(Rm::name(), invoke::<Rm>)
        .register(Mkdir::name(), invoke::<Mkdir>)
        .register(Cat::name(), invoke::<Cat>)
        .register(Mv::name(), invoke::<Mv>)
        .register(Cp::name(), invoke::<Cp>);
    registry
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn execute(self, io: &mut BuiltinIo<'_>, env: &mut Environment) -> Result<ExitCode> {
        writeln!(io.stdout, "{}", env.current_dir.to_string_lossy())?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// Without a target the directory stays where it is.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(self, _io: &mut BuiltinIo<'_>, env: &mut Environment) -> Result<ExitCode> {
        let Some(target) = self.target.filter(|t| !t.is_empty()) else {
            return Ok(0);
        };

        let new_dir = env.current_dir.join(target);
        let canonical = fs::canonicalize(&new_dir)
            .with_context(|| format!("cd: can't canonicalize {}", new_dir.display()))?;

        env::set_current_dir(&canonical)
            .with_context(|| format!("cd: can't chdir to {}", canonical.display()))?;
        tracing::debug!(dir = %canonical.display(), "changed directory");
        env.current_dir = canonical;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// List a directory as a table of mode, last write time, size and name.
pub struct Ls {
    #[argh(positional)]
    /// directory to list; the current directory when omitted.
    pub dir: Option<String>,
}

impl Ls {
    fn row(io: &mut BuiltinIo<'_>, mode: &str, time: &str, size: &str, name: &str) -> io::Result<()> {
        writeln!(io.stdout, "{mode:<10}{time:<20}{size:>10}  {name}")
    }
}

impl BuiltinCommand for Ls {
    fn name() -> &'static str {
        "ls"
    }

    fn execute(self, io: &mut BuiltinIo<'_>, env: &mut Environment) -> Result<ExitCode> {
        let dir = match &self.dir {
            Some(d) => env.current_dir.join(d),
            None => env.current_dir.clone(),
        };
        let read_dir = fs::read_dir(&dir).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => anyhow!(
                "{}: No such file or directory",
                self.dir.as_deref().unwrap_or(".")
            ),
            _ => anyhow!(e).context(format!("ls: {}", dir.display())),
        })?;

        let mut entries = read_dir.collect::<io::Result<Vec<_>>>()?;
        entries.sort_by_key(|e| e.file_name());

        Self::row(io, "Mode", "Last Write Time", "Size", "Name")?;
        Self::row(io, "----", "---------------", "----", "----")?;
        for entry in entries {
            let meta = entry.path().symlink_metadata()?;
            let kind = meta.file_type();
            let mode = if kind.is_dir() {
                "d---"
            } else if kind.is_symlink() {
                "l---"
            } else {
                "f---"
            };
            let time = meta
                .modified()
                .map(|t| DateTime::<Local>::from(t).format("%m/%d/%Y %H:%M:%S").to_string())
                .unwrap_or_default();
            let size = if kind.is_dir() { 0 } else { meta.len() };
            Self::row(
                io,
                mode,
                &time,
                &size.to_string(),
                &entry.file_name().to_string_lossy(),
            )?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Exit the shell with the given status (default 0).
pub struct Exit {
    #[argh(positional)]
    /// exit status; only the low eight bits are kept.
    pub code: Option<i32>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(self, _io: &mut BuiltinIo<'_>, env: &mut Environment) -> Result<ExitCode> {
        let code = self.code.unwrap_or(0) & 0xff;
        env.exit_request = Some(code);
        Ok(code)
    }
}

#[derive(FromArgs)]
/// Remove files or directories.
pub struct Rm {
    #[argh(switch, short = 'f')]
    /// ignore nonexistent files and failed removals.
    pub force: bool,

    #[argh(switch, short = 'r')]
    /// remove directories and their contents recursively.
    pub recursive: bool,

    #[argh(positional, greedy)]
    /// paths to remove.
    pub paths: Vec<String>,
}

impl BuiltinCommand for Rm {
    fn name() -> &'static str {
        "rm"
    }

    fn execute(self, _io: &mut BuiltinIo<'_>, env: &mut Environment) -> Result<ExitCode> {
        if self.paths.is_empty() {
            bail!("rm: missing operands");
        }
        for name in &self.paths {
            let path = env.current_dir.join(name);
            let result = match path.symlink_metadata() {
                Ok(meta) if meta.is_dir() => {
                    if !self.recursive {
                        bail!("rm: cannot remove '{name}': Is a directory");
                    }
                    fs::remove_dir_all(&path)
                }
                Ok(_) => fs::remove_file(&path),
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => {}
                Err(_) if self.force => {}
                Err(e) => bail!("rm: cannot remove '{name}': {e}"),
            }
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Create directories.
pub struct Mkdir {
    #[argh(positional, greedy)]
    /// directories to create.
    pub dirs: Vec<String>,
}

impl BuiltinCommand for Mkdir {
    fn name() -> &'static str {
        "mkdir"
    }

    fn execute(self, _io: &mut BuiltinIo<'_>, env: &mut Environment) -> Result<ExitCode> {
        if self.dirs.is_empty() {
            bail!("mkdir: missing operand");
        }
        for dir in &self.dirs {
            fs::create_dir(env.current_dir.join(dir))
                .with_context(|| format!("mkdir: cannot create {dir}"))?;
        }
        Ok(0)
    }
}

#[derive(argh::FromArgs)]
/// print file(s) to stdout
pub struct Cat {
    #[argh(positional, greedy)]
    /// files to print. If none provided, copies stdin.
    pub files: Vec<String>,
}

impl BuiltinCommand for Cat {
    fn name() -> &'static str {
        "cat"
    }

    fn execute(self, io: &mut BuiltinIo<'_>, env: &mut Environment) -> Result<ExitCode> {
        if self.files.is_empty() {
            io::copy(io.stdin, io.stdout)?;
            return Ok(0);
        }
        for fname in &self.files {
            let mut f = fs::File::open(env.current_dir.join(fname))
                .map_err(|e| anyhow!("cat: {}: {}", fname, e))?;
            io::copy(&mut f, io.stdout)?;
        }
        Ok(0)
    }
}

/// `SOURCE DEST` operands shared by `mv` and `cp`.
fn source_and_dest(name: &str, operands: &[String], env: &Environment) -> Result<(PathBuf, PathBuf)> {
    match operands {
        [src, dest] => Ok((env.current_dir.join(src), env.current_dir.join(dest))),
        [_, _, _, ..] => bail!("{name}: more than one destination provided"),
        _ => bail!("{name}: missing operands"),
    }
}

fn refuse_overwrite(name: &str, force: bool, src: &str, dest: &Path) -> Result<()> {
    if !force && dest.symlink_metadata().is_ok() {
        bail!("{name}: {src} -> {} failed: destination exists", dest.display());
    }
    Ok(())
}

#[derive(FromArgs)]
/// Move or rename a file.
pub struct Mv {
    #[argh(switch, short = 'f')]
    /// replace an existing destination.
    pub force: bool,

    #[argh(positional, greedy)]
    /// source and destination.
    pub operands: Vec<String>,
}

impl BuiltinCommand for Mv {
    fn name() -> &'static str {
        "mv"
    }

    fn execute(self, _io: &mut BuiltinIo<'_>, env: &mut Environment) -> Result<ExitCode> {
        let (src, dest) = source_and_dest("mv", &self.operands, env)?;
        refuse_overwrite("mv", self.force, &self.operands[0], &dest)?;
        fs::rename(&src, &dest)
            .with_context(|| format!("mv: {} -> {} failed", self.operands[0], self.operands[1]))?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Copy a file.
pub struct Cp {
    #[argh(switch, short = 'f')]
    /// replace an existing destination.
    pub force: bool,

    #[argh(positional, greedy)]
    /// source and destination.
    pub operands: Vec<String>,
}

impl BuiltinCommand for Cp {
    fn name() -> &'static str {
        "cp"
    }

    fn execute(self, _io: &mut BuiltinIo<'_>, env: &mut Environment) -> Result<ExitCode> {
        let (src, dest) = source_and_dest("cp", &self.operands, env)?;
        refuse_overwrite("cp", self.force, &self.operands[0], &dest)?;
        fs::copy(&src, &dest)
            .with_context(|| format!("cp: {} -> {} failed", self.operands[0], self.operands[1]))?;
        Ok(0)
    }
}
