//! Out-of-band observation of pod states.
//!
//! A [`PodObserver`] polls the pods behind a label selector independently of
//! [`crate::ResourceSet::wait`]. Racing the two lets a test fail fast when a
//! workload gets stuck, e.g. on `ImagePullBackOff`, instead of waiting out
//! the whole readiness timeout.

use std::{fmt, sync::Arc, time::Duration};

use futures::{Stream, stream};
use snafu::ResultExt;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info};

use crate::{
    Result,
    backend::{Backend, waiting_reasons},
    context::Context,
    error::QuerySnafu,
    kind::ResourceKind,
    wait::deadline_after,
};

/// Reasons a container waits with when it will not start on its own.
pub const STUCK_REASONS: &[&str] = &[
    "ImagePullBackOff",
    "ErrImagePull",
    "InvalidImageName",
    "CrashLoopBackOff",
    "CreateContainerConfigError",
];

const DEFAULT_OBSERVE_INTERVAL: Duration = Duration::from_millis(250);

/// Polls the pods matching a label selector for container waiting reasons.
#[derive(Clone)]
pub struct PodObserver {
    backend: Arc<dyn Backend>,
    namespace: String,
    selector: String,
    interval: Duration,
    context: Context,
}

impl fmt::Debug for PodObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PodObserver")
            .field("namespace", &self.namespace)
            .field("selector", &self.selector)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl PodObserver {
    pub fn new(
        backend: Arc<dyn Backend>,
        namespace: impl Into<String>,
        selector: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            namespace: namespace.into(),
            selector: selector.into(),
            interval: DEFAULT_OBSERVE_INTERVAL,
            context: Context::background(),
        }
    }

    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    /// Current waiting reasons of every container of the matching pods.
    pub async fn waiting_reasons(&self) -> Result<Vec<String>> {
        let pods = self
            .backend
            .list_pods(&self.namespace, &self.selector)
            .await
            .context(QuerySnafu {
                kind: ResourceKind::Pod,
                name: self.selector.as_str(),
            })?;
        Ok(waiting_reasons(&pods))
    }

    /// Poll until a container waits with one of `reasons` and return that
    /// reason.
    ///
    /// Resolves to `None` when `timeout` passes, or the context is cancelled,
    /// without such a reason showing up. A query still running one interval
    /// past `timeout` is abandoned. Query failures end the observation with
    /// an error.
    pub async fn until_waiting_reason(
        &self,
        reasons: &[&str],
        timeout: Duration,
    ) -> Result<Option<String>> {
        let started = Instant::now();
        let deadline = deadline_after(started, timeout);
        debug!(message = "Observing pods.", selector = %self.selector, ?reasons, ?timeout);

        loop {
            if self.context.interruption().is_some() {
                return Ok(None);
            }

            // A query may take at most one interval past the deadline.
            let current = tokio::select! {
                biased;

                _ = self.context.interrupted() => return Ok(None),
                current = self.waiting_reasons() => current?,
                _ = sleep_until(deadline + self.interval) => return Ok(None),
            };
            let found = current
                .into_iter()
                .find(|reason| reasons.contains(&reason.as_str()));
            if let Some(reason) = found {
                info!(
                    message = "Observed waiting pod.",
                    selector = %self.selector,
                    %reason,
                    elapsed = ?started.elapsed(),
                );
                return Ok(Some(reason));
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }

            let tick = (Instant::now() + self.interval).min(deadline);
            tokio::select! {
                biased;

                _ = self.context.interrupted() => return Ok(None),
                _ = sleep_until(tick) => {}
            }
        }
    }

    /// Waiting reasons of the matching pods, one snapshot per interval.
    ///
    /// The first snapshot is taken immediately. The stream ends once the
    /// context interrupts, or after yielding the first query error.
    pub fn snapshots(&self) -> impl Stream<Item = Result<Vec<String>>> + '_ {
        stream::unfold(Some(Instant::now()), move |next| async move {
            let tick = next?;
            let snapshot = tokio::select! {
                biased;

                _ = self.context.interrupted() => return None,
                snapshot = async {
                    sleep_until(tick).await;
                    self.waiting_reasons().await
                } => snapshot,
            };
            let next = snapshot.is_ok().then(|| Instant::now() + self.interval);
            Some((snapshot, next))
        })
    }

    /// [`Self::until_waiting_reason`] with [`STUCK_REASONS`].
    pub async fn until_stuck(&self, timeout: Duration) -> Result<Option<String>> {
        self.until_waiting_reason(STUCK_REASONS, timeout).await
    }
}
