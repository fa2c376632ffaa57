//! Bounded task execution and error aggregation.
//!
//! Submitted tasks all spawn immediately but at most `concurrency` of them
//! run at once. Every producer in a run (diff passes, transfer tasks, the
//! delete task) reports failures over one mpsc channel consumed by a single
//! sink, so no error state is ever shared between concurrent writers.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::{MultiError, SyncError};
use crate::message::{self, LogFormat};

/// Fixed-capacity worker pool for sync work items.
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<()>,
    error_tx: mpsc::UnboundedSender<SyncError>,
}

impl WorkerPool {
    pub fn new(concurrency: usize, error_tx: mpsc::UnboundedSender<SyncError>) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            tasks: JoinSet::new(),
            error_tx,
        }
    }

    /// Queue a task. It starts executing once a permit is free; its error,
    /// if any, is delivered to the sink.
    pub fn submit<F>(&mut self, task: F)
    where
        F: Future<Output = Result<(), SyncError>> + Send + 'static,
    {
        let semaphore = self.semaphore.clone();
        let error_tx = self.error_tx.clone();
        self.tasks.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            if let Err(err) = task.await {
                let _ = error_tx.send(err);
            }
        });
    }

    /// Wait for every queued task to finish.
    pub async fn join(self) {
        let Self {
            mut tasks,
            error_tx,
            ..
        } = self;
        drop(error_tx);
        while tasks.join_next().await.is_some() {}
    }
}

/// What the sink saw over a run's lifetime.
#[derive(Debug, Default)]
pub struct DrainSummary {
    errors: Vec<SyncError>,
    fatal: Option<SyncError>,
}

impl DrainSummary {
    pub fn fatal(&mut self) -> Option<SyncError> {
        self.fatal.take()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn into_result(self) -> Result<(), MultiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(MultiError::from(self.errors))
        }
    }
}

/// Single consumer of the run's error stream.
///
/// Cancellation-class errors are dropped, warnings are printed but never
/// fail the run, real failures are printed and folded into the combined
/// error. Resource exhaustion ends the drain immediately so the
/// orchestrator can abort the run without waiting for stragglers.
pub async fn drain_errors(
    mut rx: mpsc::UnboundedReceiver<SyncError>,
    command: String,
    operation: &'static str,
    format: LogFormat,
) -> DrainSummary {
    let mut summary = DrainSummary::default();

    while let Some(err) = rx.recv().await {
        if err.is_cancellation() {
            continue;
        }
        if err.is_resource_exhaustion() {
            message::print_fd_limit_guidance();
            message::print_error(&command, operation, &err, format);
            summary.fatal = Some(err);
            return summary;
        }
        if err.is_warning() {
            message::print_warning(&command, operation, &err, format);
            continue;
        }
        message::print_error(&command, operation, &err, format);
        summary.errors.push(err);
    }

    summary
}
