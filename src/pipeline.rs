//! Turning parsed stages into execution units, connecting them with pipes, and
//! waiting for what was spawned.

use crate::command::ExitCode;
use crate::error::ShellError;
use crate::parser::StageDescriptor;
use crate::process::ProcessBackend;
use crate::stream::Stream;
use crate::unit::ExecutionUnit;
use std::io;
use std::path::Path;

/// The execution units for one input line, in stage order.
///
/// The sequence is fixed once built. Dropping the pipeline closes every handle its
/// units still own and releases their process records.
#[derive(Debug)]
pub struct Pipeline<P> {
    units: Vec<ExecutionUnit<P>>,
}

impl<P> Pipeline<P> {
    /// Open every stage's redirects, then wire adjacent stages with pipes.
    ///
    /// Nothing has been started yet, so any failure simply drops what was opened.
    pub fn build(stages: &[StageDescriptor], base_dir: &Path) -> Result<Self, ShellError> {
        let mut units = stages
            .iter()
            .map(|stage| ExecutionUnit::from_stage(stage, base_dir))
            .collect::<Result<Vec<_>, _>>()?;
        wire_pipes(&mut units)?;
        Ok(Self { units })
    }

    pub fn from_units(units: Vec<ExecutionUnit<P>>) -> Self {
        Self { units }
    }

    pub fn units(&self) -> &[ExecutionUnit<P>] {
        &self.units
    }

    pub fn units_mut(&mut self) -> &mut [ExecutionUnit<P>] {
        &mut self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Whether any stage carried `&`.
    pub fn is_background(&self) -> bool {
        self.units.iter().any(|u| u.background)
    }

    /// Exit code of the last stage, once known.
    pub fn last_exit_code(&self) -> Option<ExitCode> {
        self.units.last().and_then(|u| u.exit_code)
    }

    /// Move the process handles of spawned stages out of the pipeline, in stage order.
    pub fn take_processes(&mut self) -> Vec<(usize, P)> {
        self.units
            .iter_mut()
            .enumerate()
            .filter(|(_, u)| !u.is_builtin)
            .filter_map(|(i, u)| u.process.take().map(|p| (i, p)))
            .collect()
    }
}

/// Connect every adjacent pair of units with one anonymous pipe.
///
/// The producer gets the write end as stdout and the consumer the read end as stdin.
/// A pipe end replaces an explicit file redirect on the same stream.
pub fn wire_pipes<P>(units: &mut [ExecutionUnit<P>]) -> Result<(), ShellError> {
    for i in 1..units.len() {
        let (reader, writer) = io::pipe().map_err(ShellError::Pipe)?;
        let (upstream, downstream) = units.split_at_mut(i);
        let producer = &mut upstream[i - 1];
        let consumer = &mut downstream[0];

        if producer.stdout.set(Stream::PipeWriter(writer)).is_some() {
            tracing::warn!(stage = i - 1, "output redirect replaced by pipe");
        }
        if consumer.stdin.set(Stream::PipeReader(reader)).is_some() {
            tracing::warn!(stage = i, "input redirect replaced by pipe");
        }
        producer.uses_redirected_streams = true;
        consumer.uses_redirected_streams = true;
        tracing::debug!(from = i - 1, to = i, "wired pipe");
    }
    Ok(())
}

/// Block until every spawned stage has exited and record their exit codes.
///
/// Builtin stages have already finished and are never waited on. All processes are
/// waited on together so a later stage that exits first is not held up behind an
/// earlier one.
pub fn wait_for_completion<B: ProcessBackend>(
    backend: &mut B,
    pipeline: &mut Pipeline<B::Process>,
) -> Result<(), ShellError> {
    let (indices, processes): (Vec<usize>, Vec<B::Process>) =
        pipeline.take_processes().into_iter().unzip();
    if processes.is_empty() {
        return Ok(());
    }

    let codes = backend.wait_all(processes).map_err(ShellError::Wait)?;
    for (index, code) in indices.into_iter().zip(codes) {
        pipeline.units[index].exit_code = Some(code);
    }
    Ok(())
}
