//! Pipelines started with `&`.

use crate::command::ExitCode;
use crate::process::ProcessBackend;

/// A background pipeline that has fully exited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedJob {
    pub id: usize,
    pub command: String,
    /// Status of the last stage that was spawned.
    pub exit_code: ExitCode,
}

#[derive(Debug)]
struct Job<P> {
    id: usize,
    command: String,
    processes: Vec<P>,
    codes: Vec<Option<ExitCode>>,
}

/// Running background jobs, numbered from 1 in start order.
#[derive(Debug)]
pub struct JobTable<P> {
    jobs: Vec<Job<P>>,
    next_id: usize,
}

impl<P> Default for JobTable<P> {
    fn default() -> Self {
        Self {
            jobs: Vec::new(),
            next_id: 1,
        }
    }
}

impl<P> JobTable<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking the processes of one pipeline and return the job number.
    pub fn add(&mut self, command: impl Into<String>, processes: Vec<P>) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        let codes = vec![None; processes.len()];
        self.jobs.push(Job {
            id,
            command: command.into(),
            processes,
            codes,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Poll every tracked process without blocking and remove jobs whose processes
    /// have all exited.
    ///
    /// A process that cannot be polled is counted as finished with status -1.
    pub fn reap<B>(&mut self, backend: &mut B) -> Vec<FinishedJob>
    where
        B: ProcessBackend<Process = P>,
    {
        let mut finished = Vec::new();
        self.jobs.retain_mut(|job| {
            for (process, code) in job.processes.iter_mut().zip(job.codes.iter_mut()) {
                if code.is_some() {
                    continue;
                }
                *code = match backend.try_wait(process) {
                    Ok(status) => status,
                    Err(e) => {
                        tracing::warn!(job = job.id, error = %e, "polling background process failed");
                        Some(-1)
                    }
                };
            }
            if job.codes.iter().any(Option::is_none) {
                return true;
            }
            let exit_code = job.codes.last().copied().flatten().unwrap_or(0);
            tracing::debug!(job = job.id, exit_code, "background job finished");
            finished.push(FinishedJob {
                id: job.id,
                command: job.command.clone(),
                exit_code,
            });
            false
        });
        finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::RecordingBackend;

    #[test]
    fn test_ids_count_up_from_one() {
        let mut backend = RecordingBackend::default();
        let mut jobs = JobTable::new();
        assert_eq!(jobs.add("sleep 1", vec![backend.spawn_fake()]), 1);
        assert_eq!(jobs.add("sleep 2", vec![backend.spawn_fake()]), 2);
        assert_eq!(jobs.len(), 2);
    }

    #[test]
    fn test_running_jobs_stay_in_table() {
        let mut backend = RecordingBackend::default();
        let mut jobs = JobTable::new();
        jobs.add("sleep 5 | cat", vec![backend.spawn_fake(), backend.spawn_fake()]);

        assert!(jobs.reap(&mut backend).is_empty());
        assert_eq!(jobs.len(), 1);
    }

    #[test]
    fn test_finished_jobs_are_reported_once() {
        let mut backend = RecordingBackend {
            exit_code: 4,
            ..RecordingBackend::default()
        };
        let mut jobs = JobTable::new();
        jobs.add("make all", vec![backend.spawn_fake()]);

        backend.finished = true;
        let done = jobs.reap(&mut backend);
        assert_eq!(
            done,
            [FinishedJob {
                id: 1,
                command: "make all".to_string(),
                exit_code: 4,
            }]
        );
        assert!(jobs.is_empty());
        assert!(jobs.reap(&mut backend).is_empty());
    }

    #[test]
    fn test_job_without_processes_finishes_immediately() {
        let mut backend = RecordingBackend::default();
        let mut jobs = JobTable::new();
        jobs.add("pwd", Vec::new());
        let done = jobs.reap(&mut backend);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].exit_code, 0);
    }
}
