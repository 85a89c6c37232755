//! Per-key debounced task runner.
//!
//! Each key has at most one pending timer. Scheduling again before it fires
//! resets the timer, so a burst of requests produces a single run. Runs for
//! the same key are serialized by a gate, so at most one is in flight.
//!
//! The job receives only the key. It must read whatever it writes at run
//! time, which is what makes a late run never write stale data.

use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

pub type CoalescedJob = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;

struct Pending {
    generation: u64,
    handle: JoinHandle<()>,
}

struct Inner {
    delay: Duration,
    job: CoalescedJob,
    generation: AtomicU64,
    pending: Mutex<HashMap<String, Pending>>,
    in_flight: Mutex<HashSet<String>>,
    gates: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Inner {
    fn gate(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        lock(&self.gates)
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    async fn run(&self, key: String) {
        let gate = self.gate(&key);
        let _running = gate.lock().await;
        lock(&self.in_flight).insert(key.clone());
        (self.job)(key.clone()).await;
        lock(&self.in_flight).remove(&key);
    }
}

/// Debounced scheduler keyed by scope. Cloning shares the same timers.
#[derive(Clone)]
pub struct CoalescingTask {
    inner: Arc<Inner>,
}

impl CoalescingTask {
    pub fn new(delay: Duration, job: CoalescedJob) -> Self {
        Self {
            inner: Arc::new(Inner {
                delay,
                job,
                generation: AtomicU64::new(0),
                pending: Mutex::new(HashMap::new()),
                in_flight: Mutex::new(HashSet::new()),
                gates: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn delay(&self) -> Duration {
        self.inner.delay
    }

    /// Starts or restarts the timer for `key`. Must be called within a
    /// tokio runtime.
    pub fn schedule(&self, key: &str) {
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let inner = Arc::clone(&self.inner);
        let owned_key = key.to_string();

        // Held across spawn so the timer cannot look itself up before it is registered.
        let mut pending = lock(&self.inner.pending);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(inner.delay).await;
            {
                let mut pending = lock(&inner.pending);
                match pending.get(&owned_key) {
                    Some(entry) if entry.generation == generation => {
                        pending.remove(&owned_key);
                    }
                    _ => return,
                }
            }
            inner.run(owned_key).await;
        });

        if let Some(previous) = pending.insert(key.to_string(), Pending { generation, handle }) {
            previous.handle.abort();
            tracing::trace!(key, "[CoalescingTask] Timer reset");
        }
    }

    /// Drops the pending timer for `key`. Returns whether one existed.
    pub fn cancel(&self, key: &str) -> bool {
        match lock(&self.inner.pending).remove(key) {
            Some(entry) => {
                entry.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancels any pending timer and runs the job now, waiting for it.
    pub async fn flush(&self, key: &str) {
        self.cancel(key);
        self.inner.run(key.to_string()).await;
    }

    /// Runs the job for `key` only if a timer is pending.
    pub async fn flush_pending(&self, key: &str) -> bool {
        if self.cancel(key) {
            self.inner.run(key.to_string()).await;
            true
        } else {
            false
        }
    }

    /// Awaits `work` while holding the gate for `key`, so it is ordered
    /// against any run of the job for the same key. Pending timers are left
    /// alone.
    pub async fn exclusive<F: Future>(&self, key: &str, work: F) -> F::Output {
        let gate = self.inner.gate(key);
        let _running = gate.lock().await;
        work.await
    }

    /// A timer is pending or a run is in flight.
    pub fn is_saving(&self, key: &str) -> bool {
        lock(&self.inner.pending).contains_key(key) || lock(&self.inner.in_flight).contains(key)
    }

    pub fn is_pending(&self, key: &str) -> bool {
        lock(&self.inner.pending).contains_key(key)
    }
}
