/// Bounded worker pool for per-file conversions
///
/// One rayon pool per job, sized to the configured concurrency. Units are
/// submitted in enumeration order (rayon's injector queue is FIFO) and may
/// finish in any order. A settlement counter lets the monitor wait for the
/// pool to drain; each unit checks the job's cancellation flag before doing
/// any work, so units still queued when cancellation lands settle without
/// running.
use crate::error::Result;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct Settlement {
    submitted: Mutex<usize>,
    settled: Mutex<usize>,
    cv: Condvar,
}

/// Marks a unit as settled even if it unwinds
struct SettleGuard(Arc<Settlement>);

impl Drop for SettleGuard {
    fn drop(&mut self) {
        let mut settled = self.0.settled.lock();
        *settled += 1;
        self.0.cv.notify_all();
    }
}

pub(crate) struct WorkerPool {
    pool: rayon::ThreadPool,
    settlement: Arc<Settlement>,
}

impl WorkerPool {
    pub(crate) fn new(workers: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("preview-worker-{i}"))
            .panic_handler(|_| tracing::error!("preview worker panicked outside the conversion guard"))
            .build()?;

        Ok(Self {
            pool,
            settlement: Arc::new(Settlement::default()),
        })
    }

    /// Queue one unit of work
    pub(crate) fn submit<F>(&self, unit: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self.settlement.submitted.lock() += 1;
        let guard = SettleGuard(Arc::clone(&self.settlement));
        self.pool.spawn(move || {
            let _guard = guard;
            unit();
        });
    }

    pub(crate) fn submitted(&self) -> usize {
        *self.settlement.submitted.lock()
    }

    /// Wait up to `timeout` for every submitted unit to settle
    pub(crate) fn wait_idle(&self, timeout: Duration) -> bool {
        let submitted = self.submitted();
        let mut settled = self.settlement.settled.lock();
        if *settled >= submitted {
            return true;
        }
        self.settlement.cv.wait_for(&mut settled, timeout);
        *settled >= submitted
    }

    /// Block until every submitted unit has settled, then tear the pool down
    pub(crate) fn shutdown(self) {
        let submitted = self.submitted();
        let mut settled = self.settlement.settled.lock();
        while *settled < submitted {
            self.settlement.cv.wait(&mut settled);
        }
        drop(settled);
        drop(self.pool);
    }
}
