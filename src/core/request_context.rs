//! Request-scoped context for cancellation, deadlines, and stage timings.
//!
//! # Overview
//!
//! A [`RequestContext`] is created by the caller (usually the HTTP layer) for
//! every instantiation or resolution request and passed down to each
//! delegated call. It provides:
//!
//! - A [`CancellationToken`] the caller trips when the client goes away
//! - An optional deadline after which remaining work is abandoned
//! - A per-request profiler recording how long each stage took
//!
//! Nothing in the context outlives the request, and the core never holds
//! resources beyond it.
//!
//! # Example
//!
//! ```rust,no_run
//! use namedmaps::core::RequestContext;
//! use std::time::Duration;
//!
//! # async fn example() -> namedmaps::core::Result<()> {
//! let ctx = RequestContext::new().with_timeout(Duration::from_secs(5));
//! let answer = ctx.run("compute", async { Ok::<_, namedmaps::core::MapsError>(42) }).await?;
//! assert_eq!(answer, 42);
//! assert_eq!(ctx.timings()[0].stage, "compute");
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::error::{MapsError, Result};

/// Time spent in one named stage of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageTiming {
    /// Stage label (e.g. "getTemplate")
    pub stage: String,
    /// Elapsed wall time in milliseconds
    pub elapsed_ms: u64,
}

/// Context for a single request flowing through the core.
///
/// # Thread Safety
///
/// Shareable across `.await` points. The timing list uses a [`Mutex`] for
/// interior mutability; contention is impossible in practice because stages
/// run strictly in sequence.
#[derive(Debug, Default)]
pub struct RequestContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
    timings: Mutex<Vec<StageTiming>>,
}

impl RequestContext {
    /// Create a context with a fresh cancellation token and no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the caller's cancellation token.
    ///
    /// Cancelling `token` (or any parent it was derived from) aborts the
    /// remaining stages of the request.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Abandon remaining work once `deadline` passes.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Abandon remaining work once `timeout` has elapsed from now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Deadline, if one was set.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Run one delegated stage, racing it against cancellation and the deadline.
    ///
    /// The elapsed time is recorded under `stage` whether the stage succeeds
    /// or fails. An already-cancelled context fails without polling `fut`.
    ///
    /// # Errors
    ///
    /// Returns [`MapsError::Cancelled`] or [`MapsError::DeadlineExceeded`]
    /// when interrupted, otherwise whatever `fut` returned.
    pub async fn run<T, F>(&self, stage: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(MapsError::Cancelled {
                stage: stage.to_string(),
            });
        }

        let started = Instant::now();
        let outcome = match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => Err(MapsError::Cancelled { stage: stage.to_string() }),
                    () = tokio::time::sleep_until(deadline) => Err(MapsError::DeadlineExceeded { stage: stage.to_string() }),
                    result = fut => result,
                }
            }
            None => {
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => Err(MapsError::Cancelled { stage: stage.to_string() }),
                    result = fut => result,
                }
            }
        };

        self.record(stage, started.elapsed());
        outcome
    }

    /// Record a stage duration measured by the caller.
    pub fn record(&self, stage: &str, elapsed: Duration) {
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        if let Ok(mut timings) = self.timings.lock() {
            timings.push(StageTiming {
                stage: stage.to_string(),
                elapsed_ms,
            });
        }
    }

    /// Snapshot of the recorded stage timings in execution order.
    #[must_use]
    pub fn timings(&self) -> Vec<StageTiming> {
        self.timings.lock().map(|t| t.clone()).unwrap_or_default()
    }
}
