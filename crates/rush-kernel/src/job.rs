//! Running jobs and their outcomes.
//!
//! Every command-tree node, once started, is represented by a [`RunningJob`]
//! handle. `wait()` produces exactly one [`JobOutcome`]; the outcome is
//! cached, so a second `wait()` returns the same result instead of touching
//! the underlying child or channel again.

use std::fs::File;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::error::ShellError;

/// What a finished job reports: an exit code plus, for failures that were
/// more than a nonzero status, a message worth printing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub code: i32,
    pub err: Option<String>,
}

impl JobOutcome {
    pub fn success() -> Self {
        Self { code: 0, err: None }
    }

    pub fn exit(code: i32) -> Self {
        Self { code, err: None }
    }

    pub fn from_error(err: ShellError) -> Self {
        Self {
            code: 1,
            err: Some(err.to_string()),
        }
    }

    pub fn ok(&self) -> bool {
        self.code == 0
    }
}

enum JobState {
    /// Built-ins, assignments, and other operations whose result is known
    /// at start time.
    Completed(JobOutcome),
    /// An external child process.
    Child(tokio::process::Child),
    /// A coordinator task that reports through a one-shot channel.
    Channel(oneshot::Receiver<JobOutcome>),
    /// Two concurrent halves of `left | right`.
    Pipeline {
        left: Box<RunningJob>,
        right: Box<RunningJob>,
    },
    /// A job wrapped by a redirection that owns the opened file.
    Redirect {
        inner: Box<RunningJob>,
        file: Option<Arc<File>>,
    },
}

/// A handle to an in-flight command evaluation.
pub struct RunningJob {
    state: JobState,
    finished: Option<JobOutcome>,
}

impl RunningJob {
    pub fn completed(outcome: JobOutcome) -> Self {
        Self {
            state: JobState::Completed(outcome),
            finished: None,
        }
    }

    pub fn from_child(child: tokio::process::Child) -> Self {
        Self {
            state: JobState::Child(child),
            finished: None,
        }
    }

    pub fn from_channel(rx: oneshot::Receiver<JobOutcome>) -> Self {
        Self {
            state: JobState::Channel(rx),
            finished: None,
        }
    }

    pub fn pipeline(left: RunningJob, right: RunningJob) -> Self {
        Self {
            state: JobState::Pipeline {
                left: Box::new(left),
                right: Box::new(right),
            },
            finished: None,
        }
    }

    pub fn redirected(inner: RunningJob, file: Option<Arc<File>>) -> Self {
        Self {
            state: JobState::Redirect {
                inner: Box::new(inner),
                file,
            },
            finished: None,
        }
    }

    /// Wait for the job and return its outcome. Idempotent: the first
    /// outcome is cached and handed back on every later call.
    pub fn wait(
        &mut self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = JobOutcome> + Send + '_>> {
        Box::pin(self.wait_inner())
    }

    async fn wait_inner(&mut self) -> JobOutcome {
        if let Some(done) = &self.finished {
            return done.clone();
        }
        let outcome = match &mut self.state {
            JobState::Completed(outcome) => outcome.clone(),
            JobState::Child(child) => match child.wait().await {
                Ok(status) => JobOutcome::exit(status_code(status)),
                Err(e) => JobOutcome {
                    code: 1,
                    err: Some(format!("wait failed: {e}")),
                },
            },
            JobState::Channel(rx) => match rx.await {
                Ok(outcome) => outcome,
                Err(_) => JobOutcome {
                    code: 1,
                    err: Some("job coordinator dropped".into()),
                },
            },
            JobState::Pipeline { left, right } => {
                let outcome = right.wait().await;
                // The left side's status is collected but, absent a
                // pipefail option, does not affect the pipeline's result.
                let _left = left.wait().await;
                outcome
            }
            JobState::Redirect { inner, file } => {
                let outcome = inner.wait().await;
                file.take();
                outcome
            }
        };
        self.finished = Some(outcome.clone());
        outcome
    }
}

fn status_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    match status.code() {
        Some(code) => code,
        // Death by signal maps to the conventional 128+N.
        None => 128 + status.signal().unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completed_job_waits_instantly() {
        let mut job = RunningJob::completed(JobOutcome::exit(3));
        assert_eq!(job.wait().await, JobOutcome::exit(3));
    }

    #[tokio::test]
    async fn rewait_returns_the_same_outcome() {
        let (tx, rx) = oneshot::channel();
        let mut job = RunningJob::from_channel(rx);
        tx.send(JobOutcome::exit(5)).unwrap();
        assert_eq!(job.wait().await.code, 5);
        // The channel is spent; only the cache can answer now.
        assert_eq!(job.wait().await.code, 5);
    }

    #[tokio::test]
    async fn dropped_coordinator_is_a_failure() {
        let (tx, rx) = oneshot::channel::<JobOutcome>();
        drop(tx);
        let mut job = RunningJob::from_channel(rx);
        let outcome = job.wait().await;
        assert_eq!(outcome.code, 1);
        assert!(outcome.err.is_some());
    }
}
