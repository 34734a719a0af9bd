//! Database status polling.
//!
//! A freshly created database is reported as `pending` until the cluster
//! finishes placing its shards. [`poll_until_active`] re-reads the status on
//! a fixed interval until it becomes `active` and aborts early if the
//! cluster reports the creation as failed. Once the deadline passes it gives
//! up with [`ClusterError::Timeout`], even mid-request.

use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, warn};

use cfbroker_core::BoxFuture;

use crate::client::DatabaseStatus;
use crate::error::{ClusterError, ClusterResult};

pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_CREATION_FAILED: &str = "creation-failed";

/// Time source for polling loops.
pub trait Clock: Send + Sync {
    /// Monotonic time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;

    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()>;

    /// Resolves once `remaining` has passed. In-flight status requests are
    /// raced against it so a slow request cannot outlast the poll deadline.
    fn deadline(&self, remaining: Duration) -> BoxFuture<'_, ()> {
        self.sleep(remaining)
    }
}

/// Clock backed by `tokio::time`.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Clock whose sleeps return immediately and advance its time (for testing).
#[derive(Debug, Default)]
pub struct ManualClock {
    elapsed_ms: AtomicU64,
    sleeps: AtomicU32,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sleeps performed so far.
    pub fn sleeps(&self) -> u32 {
        self.sleeps.load(Ordering::SeqCst)
    }

    pub fn advance(&self, duration: Duration) {
        self.elapsed_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()> {
        self.advance(duration);
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        Box::pin(async {})
    }

    /// Manual time only moves on explicit sleeps, so a request in flight
    /// is never cut short.
    fn deadline(&self, _remaining: Duration) -> BoxFuture<'_, ()> {
        Box::pin(std::future::pending())
    }
}

/// Poll a database's status until it is active.
///
/// `initial` is the status returned by the create call; `fetch` re-reads
/// it. Transport failures while polling are logged and polling continues;
/// an explicit rejection from the cluster ends the loop.
pub async fn poll_until_active<F, Fut>(
    initial: DatabaseStatus,
    mut fetch: F,
    clock: &dyn Clock,
    interval: Duration,
    timeout: Duration,
) -> ClusterResult<DatabaseStatus>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ClusterResult<DatabaseStatus>>,
{
    let uid = initial.uid;
    let started = clock.now();
    let mut current = initial;

    loop {
        match current.status.as_str() {
            STATUS_ACTIVE => {
                debug!(uid, "database is active");
                return Ok(current);
            }
            STATUS_CREATION_FAILED => return Err(ClusterError::CreationFailed { uid }),
            status => debug!(uid, %status, "database not active yet"),
        }

        let waited = clock.now().saturating_sub(started);
        if waited >= timeout {
            warn!(uid, ?waited, "gave up waiting for database to become active");
            return Err(ClusterError::Timeout { uid, waited });
        }
        clock.sleep(interval.min(timeout - waited)).await;

        let remaining = timeout.saturating_sub(clock.now().saturating_sub(started));
        let polled = tokio::select! {
            biased;
            polled = fetch() => polled,
            _ = clock.deadline(remaining) => {
                let waited = clock.now().saturating_sub(started);
                warn!(uid, ?waited, "status request outlasted the creation deadline");
                return Err(ClusterError::Timeout { uid, waited });
            }
        };

        match polled {
            Ok(status) => current = status,
            Err(e @ ClusterError::Rejected { .. }) => return Err(e),
            Err(e) => warn!(uid, error = %e, "database status poll failed"),
        }
    }
}
