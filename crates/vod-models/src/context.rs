//! Per-request context: caller identity, deadline and cancellation.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Context passed as the first argument of every public I/O operation.
///
/// Carries the caller's identity where one exists, an optional deadline,
/// and the cancellation token that aborts in-flight network calls and
/// subprocesses. Logging stays ambient through `tracing`.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user_id: Option<Uuid>,
    pub deadline: Option<Instant>,
    pub cancel: CancellationToken,
}

impl RequestContext {
    /// A context with no identity and no deadline (process lifetime).
    pub fn new() -> Self {
        Self {
            user_id: None,
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    /// A context on behalf of an authenticated user.
    pub fn for_user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::new()
        }
    }

    pub fn with_deadline(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Derive a child context whose token is cancelled when this one is.
    pub fn child(&self) -> Self {
        Self {
            user_id: self.user_id,
            deadline: self.deadline,
            cancel: self.cancel.child_token(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time remaining until the deadline, if one is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_inherits_cancellation() {
        let ctx = RequestContext::new();
        let child = ctx.child();
        assert!(!child.is_cancelled());
        ctx.cancel.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn child_cancel_does_not_propagate_up() {
        let ctx = RequestContext::new();
        let child = ctx.child();
        child.cancel.cancel();
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn elapsed_deadline_reads_as_cancelled() {
        let ctx = RequestContext::new().with_deadline(Duration::ZERO);
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }
}
