//! A tiny interactive shell.
//!
//! One input line is one pipeline: stages separated by `|`, each with optional
//! `<`, `>` and `2>` redirects, and a trailing `&` to run it in the background.
//! Stages are either builtins implemented in Rust (see [`command`]) or external
//! programs started through a [`process::ProcessBackend`].
//!
//! The main entry point is [`Interpreter`], which runs a line through the
//! [`parser`], builds the [`pipeline`] of execution units, hands each unit to the
//! [`dispatch`]er and waits for what was spawned.

pub mod buffer;
mod builtin;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod env;
pub mod error;
pub mod external;
mod interpreter;
pub mod jobs;
pub mod parser;
pub mod pipeline;
pub mod process;
pub mod stream;
pub mod unit;

pub use config::Config;
pub use error::ShellError;
pub use interpreter::{Interpreter, LineOutcome};
