//! Fan-out over several pipeline branches.
//!
//! A [`PipelineGroup`] owns one [`Pipeline`] per destination. Every event
//! added to the group is copied into every branch; each branch runs its own
//! consumer task, so a slow or failing branch never blocks the others.

use super::{Pipeline, PipelineError};
use eventpipe_sdk::Event;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// A branch that failed a group operation.
#[derive(Debug)]
pub struct BranchFailure {
    pub branch: String,
    pub error: PipelineError,
}

impl fmt::Display for BranchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.branch, self.error)
    }
}

/// One or more branches failed. Branches not listed succeeded.
#[derive(Debug, Error)]
#[error("{} of {total} pipeline branches failed: {}", .failures.len(), describe_failures(.failures))]
pub struct GroupError {
    pub total: usize,
    pub failures: Vec<BranchFailure>,
}

fn describe_failures(failures: &[BranchFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl GroupError {
    fn check(total: usize, failures: Vec<BranchFailure>) -> Result<(), GroupError> {
        if failures.is_empty() {
            Ok(())
        } else {
            Err(GroupError { total, failures })
        }
    }
}

type BranchHandle = (String, JoinHandle<Result<(), PipelineError>>);

pub struct PipelineGroup {
    branches: Vec<Arc<Pipeline>>,
    workers: Mutex<Vec<BranchHandle>>,
    started: AtomicBool,
}

impl PipelineGroup {
    pub fn new(branches: Vec<Pipeline>) -> Self {
        Self {
            branches: branches.into_iter().map(Arc::new).collect(),
            workers: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    pub fn branch_names(&self) -> Vec<&str> {
        self.branches.iter().map(|b| b.name()).collect()
    }

    /// Spawn one consumer task per branch and return immediately.
    ///
    /// Branch errors are logged as they happen and collected by
    /// [`wait`](Self::wait). Starting twice is a no-op.
    pub async fn start(&self, shutdown_rx: watch::Receiver<bool>) {
        if self.started.swap(true, Ordering::AcqRel) {
            warn!(branches = ?self.branch_names(), "Pipeline group already started");
            return;
        }

        let mut workers = self.workers.lock().await;
        for branch in &self.branches {
            let pipeline = Arc::clone(branch);
            let shutdown_rx = shutdown_rx.clone();
            let handle = tokio::spawn(async move {
                let result = pipeline.start(shutdown_rx).await;
                match &result {
                    Ok(()) | Err(PipelineError::Cancelled) => {}
                    Err(e) => error!(pipeline = %pipeline.name(), error = %e, "Pipeline failed"),
                }
                result
            });
            workers.push((branch.name().to_owned(), handle));
        }
        info!(branches = self.branches.len(), "Pipeline group started");
    }

    /// Copy `event` into every branch.
    ///
    /// Every branch is attempted even if an earlier one fails; the error
    /// lists the branches that did not accept the event.
    pub async fn add_message(&self, event: Event) -> Result<(), GroupError> {
        let mut failures = Vec::new();
        let last = self.branches.len().saturating_sub(1);
        let mut event = Some(event);

        for (index, branch) in self.branches.iter().enumerate() {
            let copy = if index == last {
                event.take()
            } else {
                event.clone()
            };
            let Some(copy) = copy else {
                break;
            };
            if let Err(error) = branch.add_message(copy).await {
                failures.push(BranchFailure {
                    branch: branch.name().to_owned(),
                    error,
                });
            }
        }
        GroupError::check(self.branches.len(), failures)
    }

    /// Stop accepting events on every branch.
    pub async fn drain(&self) {
        for branch in &self.branches {
            branch.drain().await;
        }
    }

    /// Wait for every branch task to finish.
    ///
    /// Cancelled branches count as finished cleanly. Waiting on a group that
    /// was never started (or already waited on) returns immediately. A wait
    /// that is itself dropped (e.g. by a timeout) leaves unfinished branches
    /// for the next call.
    pub async fn wait(&self) -> Result<(), GroupError> {
        let mut workers = self.workers.lock().await;
        let mut failures = Vec::new();

        while let Some((_, handle)) = workers.first_mut() {
            let result = handle.await;
            let (branch, _) = workers.remove(0);
            match result {
                Ok(Ok(())) | Ok(Err(PipelineError::Cancelled)) => {}
                Ok(Err(error)) => failures.push(BranchFailure { branch, error }),
                Err(join_error) => failures.push(BranchFailure {
                    branch,
                    error: PipelineError::Worker(join_error),
                }),
            }
        }
        GroupError::check(self.branches.len(), failures)
    }

    /// Close every branch, continuing past failures.
    pub async fn close(&self) -> Result<(), GroupError> {
        let mut failures = Vec::new();
        for branch in &self.branches {
            if let Err(error) = branch.close().await {
                failures.push(BranchFailure {
                    branch: branch.name().to_owned(),
                    error,
                });
            }
        }
        GroupError::check(self.branches.len(), failures)
    }
}

impl fmt::Debug for PipelineGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineGroup")
            .field("branches", &self.branches)
            .field("started", &self.started.load(Ordering::Relaxed))
            .finish()
    }
}
