use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::{debug, error, info};
use ulid::Ulid;

use crate::engine::EngineError;
use crate::model::ResourceId;

/// What a fired release task ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    /// Cancelled, disarmed, or already removed before the task got the room lock.
    AlreadyGone,
    /// Room held at least the occupancy threshold; reservation kept.
    Occupied(u32),
    /// Reservation had already started; reservation kept.
    Started,
}

struct PendingRelease {
    resource_id: ResourceId,
    handle: AbortHandle,
}

/// One deferred auto-release per reservation, run on the tokio worker pool
/// once the grace period after booking has elapsed.
///
/// A pending entry is removed exactly once: by [`claim`](Self::claim) when
/// the task fires, or by [`disarm`](Self::disarm) when it is cancelled.
/// Whichever removes it wins; the other side sees `false` and does nothing.
pub struct ReleaseScheduler {
    runtime: Handle,
    grace: Duration,
    pending: DashMap<Ulid, PendingRelease>,
    shut_down: AtomicBool,
}

impl ReleaseScheduler {
    pub fn new(runtime: Handle, grace: Duration) -> Self {
        Self {
            runtime,
            grace,
            pending: DashMap::new(),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn grace_period(&self) -> Duration {
        self.grace
    }

    /// Run `action` after the grace period unless the entry is disarmed first.
    ///
    /// The action must serialize with the caller of `arm` (the room lock) and
    /// call `claim` before acting, so a zero grace period cannot let it run
    /// before the pending entry is registered.
    pub fn arm<F>(&self, id: Ulid, resource_id: ResourceId, action: F) -> Result<(), EngineError>
    where
        F: FnOnce() -> Result<ReleaseOutcome, EngineError> + Send + 'static,
    {
        if self.is_shut_down() {
            return Err(EngineError::ShutDown);
        }
        if self.pending.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let grace = self.grace;
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(grace).await;
            run_release(id, action);
        });
        self.pending.insert(
            id,
            PendingRelease {
                resource_id,
                handle: task.abort_handle(),
            },
        );

        // Lost a race with shutdown() draining the map.
        if self.is_shut_down() {
            self.disarm(&id);
            return Err(EngineError::ShutDown);
        }
        self.report_pending();
        Ok(())
    }

    /// Taken by the firing task. `false` means someone else already disarmed it.
    pub fn claim(&self, id: &Ulid) -> bool {
        let claimed = self.pending.remove(id).is_some();
        self.report_pending();
        claimed
    }

    /// Remove and abort. `false` if nothing was pending (already fired or disarmed).
    pub fn disarm(&self, id: &Ulid) -> bool {
        let Some((_, pending)) = self.pending.remove(id) else {
            return false;
        };
        pending.handle.abort();
        debug!(
            "release for {id} disarmed (room {})",
            pending.resource_id
        );
        self.report_pending();
        true
    }

    pub fn is_armed(&self, id: &Ulid) -> bool {
        self.pending.contains_key(id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Stop arming and abort everything pending. Idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let ids: Vec<Ulid> = self.pending.iter().map(|e| *e.key()).collect();
        let aborted = ids.iter().filter(|id| self.disarm(id)).count();
        info!("release scheduler shut down, {aborted} pending releases aborted");
    }

    fn report_pending(&self) {
        metrics::gauge!(crate::observability::PENDING_RELEASES).set(self.pending.len() as f64);
    }
}

/// Nobody awaits a release task, so every failure ends here.
fn run_release<F>(id: Ulid, action: F)
where
    F: FnOnce() -> Result<ReleaseOutcome, EngineError>,
{
    match std::panic::catch_unwind(AssertUnwindSafe(action)) {
        Ok(Ok(ReleaseOutcome::Released)) => {}
        Ok(Ok(outcome)) => debug!("release for {id}: {outcome:?}"),
        Ok(Err(e)) => error!("release task for {id} failed: {e}"),
        Err(panic) => {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".into());
            error!("release task for {id} panicked: {msg}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    fn scheduler(grace_ms: u64) -> Arc<ReleaseScheduler> {
        Arc::new(ReleaseScheduler::new(
            Handle::current(),
            Duration::from_millis(grace_ms),
        ))
    }

    /// Action that claims its own entry and counts successful claims.
    fn counting_action(
        sched: &Arc<ReleaseScheduler>,
        id: Ulid,
        fired: &Arc<AtomicUsize>,
    ) -> impl FnOnce() -> Result<ReleaseOutcome, EngineError> + Send + 'static {
        let sched = sched.clone();
        let fired = fired.clone();
        move || {
            if !sched.claim(&id) {
                return Ok(ReleaseOutcome::AlreadyGone);
            }
            fired.fetch_add(1, Ordering::SeqCst);
            Ok(ReleaseOutcome::Released)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn fires_after_grace_period() {
        let sched = scheduler(20);
        let fired = Arc::new(AtomicUsize::new(0));
        let id = Ulid::new();
        sched.arm(id, 1, counting_action(&sched, id, &fired)).unwrap();
        assert!(sched.is_armed(&id));
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!sched.is_armed(&id));
        assert_eq!(sched.pending_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn disarm_prevents_firing() {
        let sched = scheduler(20);
        let fired = Arc::new(AtomicUsize::new(0));
        let id = Ulid::new();
        sched.arm(id, 1, counting_action(&sched, id, &fired)).unwrap();

        assert!(sched.disarm(&id));
        assert!(!sched.disarm(&id)); // second trigger is a no-op

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn claim_and_disarm_are_exclusive() {
        let sched = scheduler(60_000);
        let fired = Arc::new(AtomicUsize::new(0));
        let id = Ulid::new();
        sched.arm(id, 1, counting_action(&sched, id, &fired)).unwrap();

        assert!(sched.claim(&id));
        assert!(!sched.disarm(&id));
        assert!(!sched.claim(&id));
    }

    #[tokio::test]
    async fn one_entry_per_id() {
        let sched = scheduler(60_000);
        let fired = Arc::new(AtomicUsize::new(0));
        let id = Ulid::new();
        sched.arm(id, 1, counting_action(&sched, id, &fired)).unwrap();
        assert_eq!(
            sched.arm(id, 1, counting_action(&sched, id, &fired)),
            Err(EngineError::AlreadyExists(id))
        );
        assert_eq!(sched.pending_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_aborts_and_rejects() {
        let sched = scheduler(20);
        let fired = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let id = Ulid::new();
            sched.arm(id, 1, counting_action(&sched, id, &fired)).unwrap();
        }
        assert_eq!(sched.pending_count(), 3);

        sched.shutdown();
        sched.shutdown();
        assert!(sched.is_shut_down());
        assert_eq!(sched.pending_count(), 0);

        let id = Ulid::new();
        assert_eq!(
            sched.arm(id, 1, counting_action(&sched, id, &fired)),
            Err(EngineError::ShutDown)
        );

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failing_task_does_not_affect_others() {
        let sched = scheduler(10);
        let fired = Arc::new(AtomicUsize::new(0));

        let bad = Ulid::new();
        sched
            .arm(bad, 1, || -> Result<ReleaseOutcome, EngineError> {
                panic!("sensor bus exploded")
            })
            .unwrap();
        let failing = Ulid::new();
        sched
            .arm(failing, 1, || Err(EngineError::InvalidResource(1)))
            .unwrap();
        let good = Ulid::new();
        sched.arm(good, 1, counting_action(&sched, good, &fired)).unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // Worker pool still takes new work.
        let later = Ulid::new();
        sched.arm(later, 1, counting_action(&sched, later, &fired)).unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }
}
