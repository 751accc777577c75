//! Request context: cancellation plus an optional deadline
//!
//! Every backing-store call and every gathering loop takes a
//! [`RequestContext`]. Cancelling it (or letting its deadline pass) makes
//! in-flight operations return [`Error::Cancelled`] or
//! [`Error::DeadlineExceeded`] without waiting for outstanding work.

use crate::{Error, Result};

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct RequestContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Derive a context that is cancelled together with `self`, but can also
    /// be cancelled on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derive a child context whose deadline is at most `timeout` from now.
    ///
    /// A timeout too long to represent adds no deadline.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = match (self.deadline, Instant::now().checked_add(timeout)) {
            (Some(existing), Some(deadline)) => Some(existing.min(deadline)),
            (existing, None) => existing,
            (None, deadline) => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The context's error if it is already done.
    pub fn err(&self) -> Option<Error> {
        if self.token.is_cancelled() {
            return Some(Error::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Error::DeadlineExceeded),
            _ => None,
        }
    }

    /// `Ok(())` while the context is live.
    pub fn check(&self) -> Result<()> {
        match self.err() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> Error {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => Error::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => Error::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                Error::Cancelled
            }
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_context_is_live() {
        let ctx = RequestContext::background();
        assert!(ctx.err().is_none());
        assert!(ctx.check().is_ok());
    }

    #[test]
    fn cancelling_parent_cancels_child() {
        let parent = RequestContext::background();
        let child = parent.child();
        parent.cancel();
        assert!(matches!(child.err(), Some(Error::Cancelled)));
    }

    #[test]
    fn cancelling_child_leaves_parent_live() {
        let parent = RequestContext::background();
        let child = parent.child();
        child.cancel();
        assert!(parent.err().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_fires() {
        let ctx = RequestContext::background().with_timeout(Duration::from_millis(50));
        assert!(ctx.err().is_none());
        let err = ctx.done().await;
        assert!(matches!(err, Error::DeadlineExceeded));
        assert!(matches!(ctx.err(), Some(Error::DeadlineExceeded)));
    }

    #[test]
    fn unrepresentable_timeout_adds_no_deadline() {
        let ctx = RequestContext::background().with_timeout(Duration::MAX);
        assert!(ctx.deadline().is_none());
        assert!(ctx.err().is_none());

        let outer = RequestContext::background().with_timeout(Duration::from_secs(1));
        assert_eq!(outer.with_timeout(Duration::MAX).deadline(), outer.deadline());
    }

    #[test]
    fn nested_timeout_keeps_earlier_deadline() {
        let outer = RequestContext::background().with_timeout(Duration::from_secs(1));
        let inner = outer.with_timeout(Duration::from_secs(60));
        assert_eq!(inner.deadline(), outer.deadline());
    }
}
