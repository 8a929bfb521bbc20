//! Caller-controlled cancellation and deadlines for store operations.
//!
//! An operation that is cancelled or runs past its deadline has its future
//! dropped. Backends rely on that: an sqlx transaction that is dropped
//! before commit is rolled back.

use crate::error::{Result, SchemaError};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

/// Cancels every context created from it
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

impl OperationContext {
    /// No deadline, not cancellable
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().deadline_after(timeout)
    }

    pub fn cancellable() -> (Self, CancelHandle) {
        let (sender, receiver) = watch::channel(false);
        let context = Self {
            deadline: None,
            cancel: Some(receiver),
        };
        (context, CancelHandle { sender })
    }

    /// Tighten the deadline to at most `timeout` from now. A timeout too
    /// large to represent sets no deadline.
    pub fn deadline_after(mut self, timeout: Duration) -> Self {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self;
        };
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    /// Apply `timeout` only if the caller set no deadline
    pub fn or_timeout(self, timeout: Option<Duration>) -> Self {
        match (self.deadline, timeout) {
            (None, Some(timeout)) => self.deadline_after(timeout),
            _ => self,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        let cancelled = self.cancel.as_ref().is_some_and(|rx| *rx.borrow());
        let expired = self.deadline.is_some_and(|d| Instant::now() >= d);
        cancelled || expired
    }

    /// Drive `operation` until it completes, the context is cancelled, or the
    /// deadline passes, whichever comes first.
    pub async fn run<T, F>(&self, operation: &str, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_cancelled() {
            return Err(SchemaError::Canceled(format!(
                "{} canceled before it started",
                operation
            )));
        }

        let cancelled = wait_cancelled(self.cancel.clone());
        let expired = wait_deadline(self.deadline);

        tokio::select! {
            biased;
            _ = cancelled => {
                warn!(operation, "Operation canceled by caller");
                Err(SchemaError::Canceled(format!("{} canceled by caller", operation)))
            }
            _ = expired => {
                warn!(operation, "Operation deadline exceeded");
                Err(SchemaError::Canceled(format!("{} deadline exceeded", operation)))
            }
            result = future => result,
        }
    }
}

async fn wait_cancelled(receiver: Option<watch::Receiver<bool>>) {
    if let Some(mut receiver) = receiver {
        if receiver.wait_for(|cancelled| *cancelled).await.is_ok() {
            return;
        }
    }
    // Handle dropped without cancelling, or no handle at all
    std::future::pending::<()>().await
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
