//! Shared job queue for worker pools whose jobs beget further jobs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

const QUEUE_CAPACITY: usize = 50_000;
const NAP_INTERVAL: Duration = Duration::from_millis(20);

struct Inner {
    queue: VecDeque<String>,
    active: usize,
}

/// Tracks pending jobs and in-flight workers for one worker pool.
///
/// A pool is finished only when the queue is empty *and* no worker is
/// mid-job: a worker that popped the last job may still enqueue new ones.
/// `take_job` therefore increments the active counter under the same lock
/// that pops the queue, so `has_work` can never observe a job as gone while
/// its worker is uncounted.
pub struct JobTracker {
    inner: Mutex<Inner>,
    space: Condvar,
    enqueued: AtomicU64,
    capacity: usize,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::with_capacity(QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                active: 0,
            }),
            space: Condvar::new(),
            enqueued: AtomicU64::new(0),
            capacity,
        }
    }

    /// Append a job. Blocks while the queue is at capacity; with the default
    /// capacity that is exceptional. No deduplication happens here.
    pub fn add_job(&self, job: impl Into<String>) {
        let job = job.into();
        let mut inner = self.inner.lock();
        while inner.queue.len() >= self.capacity {
            self.space.wait(&mut inner);
        }
        inner.queue.push_back(job);
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Non-blocking pop. A returned job counts as in-flight until the worker
    /// calls [`JobTracker::end_work`].
    pub fn take_job(&self) -> Option<String> {
        let mut inner = self.inner.lock();
        let job = inner.queue.pop_front()?;
        inner.active += 1;
        self.space.notify_one();
        Some(job)
    }

    pub fn end_work(&self) {
        let mut inner = self.inner.lock();
        debug_assert!(inner.active > 0, "end_work without a taken job");
        inner.active = inner.active.saturating_sub(1);
    }

    /// True while any job is queued or any worker is mid-job.
    pub fn has_work(&self) -> bool {
        let inner = self.inner.lock();
        !inner.queue.is_empty() || inner.active > 0
    }

    pub fn queued_jobs(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Jobs ever enqueued, for diagnostics.
    pub fn total_enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Brief yield for a worker that failed a take but cannot terminate yet.
    pub fn nap(&self) {
        thread::sleep(NAP_INTERVAL);
    }

    /// Spawn `workers` copies of `worker` and block until all of them exit.
    ///
    /// Combined with [`worker_loop`] this returns exactly when the queue has
    /// drained and no worker is mid-job, even though jobs enqueue new jobs.
    pub fn start_and_wait<F>(&self, workers: usize, worker: F)
    where
        F: Fn() + Sync,
    {
        thread::scope(|s| {
            for _ in 0..workers.max(1) {
                s.spawn(&worker);
            }
        });
    }
}

impl Default for JobTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Standard worker loop: take a job, run `work` on it, and exit once the
/// tracker reports no work anywhere in the pool.
pub fn worker_loop(jt: &JobTracker, work: impl Fn(&str)) {
    loop {
        match jt.take_job() {
            Some(job) => {
                work(&job);
                jt.end_work();
            }
            None => {
                if !jt.has_work() {
                    return;
                }
                jt.nap();
            }
        }
    }
}

/// Cooperative backoff shared by every worker of one clone.
///
/// Any worker that sees HTTP 429 trips the gate; every worker entering a
/// work unit then sleeps once before clearing it. A lost update on the
/// clear merely costs one extra sleep.
pub struct RateLimitGate {
    limited: AtomicBool,
    backoff: Duration,
}

impl RateLimitGate {
    pub fn new(backoff: Duration) -> Self {
        Self {
            limited: AtomicBool::new(false),
            backoff,
        }
    }

    pub fn trip(&self) {
        self.limited.store(true, Ordering::Release);
    }

    pub fn is_limited(&self) -> bool {
        self.limited.load(Ordering::Acquire)
    }

    pub fn wait_if_limited(&self) {
        if self.limited.load(Ordering::Acquire) {
            tracing::warn!(
                backoff_ms = self.backoff.as_millis() as u64,
                "rate limited, backing off"
            );
            thread::sleep(self.backoff);
            self.limited.store(false, Ordering::Release);
        }
    }
}
