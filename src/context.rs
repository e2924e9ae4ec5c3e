//! Cancellation and deadlines shared between a set and its callers.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::Interruption;

/// An execution context honored by every wait tick.
///
/// Clones share the same cancellation token, so cancelling any clone (or the
/// token returned by [`Context::token`]) interrupts waits on all of them.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled unless asked to.
    pub fn background() -> Self {
        Self::default()
    }

    /// Bind to an existing token, e.g. one shared with an observer task.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Interrupt waits once `deadline` passes. An earlier existing deadline is
    /// kept.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// A context cancelled together with this one, but which can also be
    /// cancelled on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Why waits under this context must stop, if they must.
    pub fn interruption(&self) -> Option<Interruption> {
        if self.token.is_cancelled() {
            Some(Interruption::Cancelled)
        } else if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            Some(Interruption::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Resolves when the context is cancelled or its deadline passes.
    pub async fn interrupted(&self) -> Interruption {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.token.cancelled() => Interruption::Cancelled,
                _ = tokio::time::sleep_until(deadline) => Interruption::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                Interruption::Cancelled
            }
        }
    }
}
