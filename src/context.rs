//! Per-call deadline and cancellation.
//!
//! Every store statement, topology read and primary connect runs through
//! [`CallContext::run`], so a caller can bound or abort a whole catalog or
//! router operation from outside.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::core::{StoreError, StoreResult};

#[derive(Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

/// Trips the cancellation token of the contexts derived from it.
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("canceled", &*self.tx.borrow())
            .finish()
    }
}

impl CallContext {
    /// No deadline, never canceled.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().timeout(timeout)
    }

    /// Tightens the deadline to `now + timeout`. Never extends an existing one.
    pub fn timeout(self, timeout: Duration) -> Self {
        self.deadline_at(Instant::now() + timeout)
    }

    pub fn deadline_at(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    /// Attaches a fresh cancellation token and returns its trigger.
    pub fn cancellable(mut self) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        self.cancel = Some(rx);
        (self, CancelHandle { tx })
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    pub fn check(&self) -> StoreResult<()> {
        if self.is_canceled() {
            return Err(StoreError::Canceled);
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(StoreError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Drives `fut` to completion unless the context is canceled or its
    /// deadline passes first.
    pub async fn run<T, E, F>(&self, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<StoreError>,
    {
        self.check()?;

        let guarded = async {
            match self.cancel.clone() {
                Some(mut rx) => tokio::select! {
                    out = fut => out,
                    _ = wait_for_cancel(&mut rx) => Err(StoreError::Canceled.into()),
                },
                None => fut.await,
            }
        };

        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, guarded)
                .await
                .unwrap_or_else(|_| Err(StoreError::DeadlineExceeded.into())),
            None => guarded.await,
        }
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("deadline", &self.deadline)
            .field("canceled", &self.is_canceled())
            .finish()
    }
}

async fn wait_for_cancel(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // handle dropped without canceling
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_background_runs_to_completion() {
        let ctx = CallContext::background();
        let out: StoreResult<i32> = ctx.run(async { Ok(7) }).await;
        assert_eq!(out.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let ctx = CallContext::with_timeout(Duration::from_millis(10));
        let out: StoreResult<()> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert_eq!(out.unwrap_err(), StoreError::DeadlineExceeded);
    }

    #[tokio::test]
    async fn test_cancel_before_and_during() {
        let (ctx, handle) = CallContext::background().cancellable();
        let waiter = {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                ctx.run::<(), StoreError, _>(async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                })
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();
        assert_eq!(waiter.await.unwrap().unwrap_err(), StoreError::Canceled);

        assert!(ctx.is_canceled());
        assert_eq!(ctx.check().unwrap_err(), StoreError::Canceled);
    }

    #[tokio::test]
    async fn test_timeout_never_extends_deadline() {
        let ctx = CallContext::with_timeout(Duration::from_millis(5));
        let first = ctx.deadline().unwrap();
        let ctx = ctx.timeout(Duration::from_secs(60));
        assert_eq!(ctx.deadline().unwrap(), first);
    }
}
