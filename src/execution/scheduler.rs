//! Job scheduling - concurrency limits and sibling cancellation

use std::sync::Arc;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};

/// Strategy for scheduling job execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingStrategy {
    /// Run one job at a time, in expansion order
    Sequential,

    /// Run every job at once
    #[default]
    Parallel,

    /// Limited parallelism (max N concurrent jobs)
    LimitedParallel(usize),
}

impl SchedulingStrategy {
    /// Concurrency cap implied by the strategy
    pub fn job_limit(&self) -> Option<usize> {
        match self {
            SchedulingStrategy::Sequential => Some(1),
            SchedulingStrategy::Parallel => None,
            SchedulingStrategy::LimitedParallel(max) => Some((*max).max(1)),
        }
    }
}

/// Gate that decides when a job may start
pub struct ExecutionScheduler {
    permits: Option<Arc<Semaphore>>,
    limit: Option<usize>,
}

impl ExecutionScheduler {
    /// Combine the strategy with a pipeline's `max_parallel`, taking the
    /// tighter of the two limits
    pub fn new(strategy: SchedulingStrategy, max_parallel: Option<usize>) -> Self {
        let limit = match (strategy.job_limit(), max_parallel.map(|m| m.max(1))) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        Self {
            permits: limit.map(|n| Arc::new(Semaphore::new(n))),
            limit,
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Shareable handle for job tasks
    pub fn gate(&self) -> JobGate {
        JobGate {
            permits: self.permits.clone(),
        }
    }
}

/// Cloneable permit source handed to each job task
#[derive(Clone)]
pub struct JobGate {
    permits: Option<Arc<Semaphore>>,
}

impl JobGate {
    /// Wait for a slot; `None` means unbounded (or the gate was closed)
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        match &self.permits {
            Some(semaphore) => semaphore.clone().acquire_owned().await.ok(),
            None => None,
        }
    }
}

/// Owner side of the cross-job cancellation signal
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// Receiver side of the cancellation signal, one per job
#[derive(Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn subscribe(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Signal every subscribed job to stop
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation has been requested
    pub async fn cancelled(&mut self) {
        loop {
            let cancelled = *self.rx.borrow_and_update();
            if cancelled {
                return;
            }
            if self.rx.changed().await.is_err() {
                // Sender gone without cancelling: never fires
                std::future::pending::<()>().await;
            }
        }
    }
}
