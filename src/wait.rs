//! Bounded, cancellable polling of workload readiness.

use std::{fmt, time::Duration};

use tokio::time::{Instant, sleep_until};
use tracing::{debug, trace};

use crate::{
    backend::{Backend, ReplicaStatus},
    context::Context,
    error::{Error, Result},
    kind::WorkloadKind,
};

/// Poll interval used by [`crate::ResourceSet::wait`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound for deadlines derived from huge timeouts.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// `start + timeout`, saturating at a year out.
pub fn deadline_after(start: Instant, timeout: Duration) -> Instant {
    start + timeout.min(FAR_FUTURE)
}

/// Where a single workload's wait stands after a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Pending,
    Ready,
    TimedOut,
}

impl PollState {
    /// Ready wins over an expired deadline, so a workload that becomes ready
    /// exactly at the deadline passes.
    pub fn next(status: ReplicaStatus, now: Instant, deadline: Instant) -> Self {
        if status.is_ready() {
            PollState::Ready
        } else if now >= deadline {
            PollState::TimedOut
        } else {
            PollState::Pending
        }
    }
}

impl fmt::Debug for Waiter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waiter")
            .field("namespace", &self.namespace)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

/// Polls one workload at a time until it is ready, the deadline passes or the
/// context interrupts.
///
/// Every status call is raced against the context and against the deadline
/// plus one interval, so a hung backend cannot hold a wait open.
#[derive(Clone)]
pub struct Waiter<'a> {
    backend: &'a dyn Backend,
    namespace: &'a str,
    context: &'a Context,
    interval: Duration,
}

impl<'a> Waiter<'a> {
    pub fn new(backend: &'a dyn Backend, namespace: &'a str, context: &'a Context) -> Self {
        Self {
            backend,
            namespace,
            context,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Wait for `kind`/`name` until `deadline`. `timeout` is the budget the
    /// deadline was derived from and is only used for reporting.
    pub async fn until_ready(
        &self,
        kind: WorkloadKind,
        name: &str,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<()> {
        debug!(message = "Waiting for workload.", %kind, name, ?timeout);
        let mut polls = 0_u32;

        loop {
            if let Some(reason) = self.context.interruption() {
                return Err(Error::WaitInterrupted {
                    kind,
                    name: name.to_owned(),
                    reason,
                });
            }

            // A status call may take at most one interval past the deadline.
            let status = tokio::select! {
                biased;

                reason = self.context.interrupted() => {
                    return Err(Error::WaitInterrupted {
                        kind,
                        name: name.to_owned(),
                        reason,
                    });
                }
                status = self.backend.replica_status(self.namespace, kind, name) => {
                    status.map_err(|source| Error::WaitBackend {
                        kind,
                        name: name.to_owned(),
                        source,
                    })?
                }
                _ = sleep_until(deadline + self.interval) => {
                    debug!(message = "Status query outlived the deadline.", %kind, name, polls);
                    return Err(Error::WaitTimeout {
                        kind,
                        name: name.to_owned(),
                        timeout,
                    });
                }
            };
            polls += 1;
            trace!(message = "Polled workload.", %kind, name, desired = status.desired, ready = status.ready, polls);

            match PollState::next(status, Instant::now(), deadline) {
                PollState::Ready => {
                    debug!(message = "Workload ready.", %kind, name, polls);
                    return Ok(());
                }
                PollState::TimedOut => {
                    return Err(Error::WaitTimeout {
                        kind,
                        name: name.to_owned(),
                        timeout,
                    });
                }
                PollState::Pending => {}
            }

            // Never sleep past the deadline, so the final poll lands on it.
            let tick = (Instant::now() + self.interval).min(deadline);
            tokio::select! {
                biased;

                reason = self.context.interrupted() => {
                    return Err(Error::WaitInterrupted {
                        kind,
                        name: name.to_owned(),
                        reason,
                    });
                }
                _ = sleep_until(tick) => {}
            }
        }
    }
}
