//! Per-call cancellation and deadline propagation.
//!
//! Every collaborator call receives a [`CallContext`]. Cancelling the
//! context (or passing its deadline) aborts in-flight remote calls and
//! stops failover iteration instead of proceeding to the next candidate.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::errors::DispatchError;

/// Cancellation/deadline context threaded through a dispatch call.
///
/// Cloning is cheap; clones observe the same cancellation signal.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

/// Handle used to cancel an associated [`CallContext`].
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Signal cancellation to every clone of the associated context.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl CallContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// A cancellable context plus the handle that cancels it.
    pub fn cancellable() -> (CancelHandle, Self) {
        let (tx, rx) = watch::channel(false);
        (
            CancelHandle { tx },
            Self {
                cancel: Some(rx),
                deadline: None,
            },
        )
    }

    /// A copy of this context that additionally expires after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        Self {
            cancel: self.cancel.clone(),
            deadline: Some(match self.deadline {
                Some(existing) => existing.min(deadline),
                None => deadline,
            }),
        }
    }

    /// Whether the context has been cancelled or its deadline has passed.
    pub fn is_cancelled(&self) -> bool {
        if let Some(rx) = &self.cancel {
            if *rx.borrow() {
                return true;
            }
        }
        matches!(self.deadline, Some(d) if Instant::now() >= d)
    }

    /// Resolves when the context is cancelled or its deadline passes.
    /// Pends forever for a background context.
    pub async fn cancelled(&self) {
        let wait_signal = async {
            match self.cancel.clone() {
                Some(mut rx) => {
                    while !*rx.borrow_and_update() {
                        if rx.changed().await.is_err() {
                            // Handle dropped without cancelling.
                            std::future::pending::<()>().await;
                        }
                    }
                }
                None => std::future::pending::<()>().await,
            }
        };
        match self.deadline {
            Some(d) => {
                tokio::select! {
                    _ = wait_signal => {}
                    _ = tokio::time::sleep_until(d) => {}
                }
            }
            None => wait_signal.await,
        }
    }

    /// Race a collaborator call against cancellation.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, DispatchError>
    where
        F: Future<Output = Result<T, DispatchError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(DispatchError::Cancelled),
            res = fut => res,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_background_never_cancelled() {
        let ctx = CallContext::background();
        assert!(!ctx.is_cancelled());
        let res = ctx.run(async { Ok::<_, DispatchError>(42) }).await;
        assert_eq!(res, Ok(42));
    }

    #[tokio::test]
    async fn test_cancel_aborts_run() {
        let (handle, ctx) = CallContext::cancellable();
        handle.cancel();
        assert!(ctx.is_cancelled());

        let res = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, DispatchError>(())
            })
            .await;
        assert_eq!(res, Err(DispatchError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let ctx = CallContext::background().with_timeout(Duration::from_millis(10));
        let res = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, DispatchError>(())
            })
            .await;
        assert_eq!(res, Err(DispatchError::Cancelled));
    }
}
