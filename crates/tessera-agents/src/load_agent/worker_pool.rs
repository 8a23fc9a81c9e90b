// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A fixed set of threads draining a shared task queue.

use anyhow::Context;
use crossbeam_channel::{Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tessera_core::{Task, TaskScheduler};

/// Counts tasks that were scheduled but have not finished yet.
#[derive(Default)]
struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    fn begin(&self) {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }

    fn finish(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn current(&self) -> usize {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_idle(&self, deadline: Option<Instant>) -> bool {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        while *count > 0 {
            match deadline {
                None => {
                    count = self
                        .idle
                        .wait(count)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    count = self
                        .idle
                        .wait_timeout(count, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
        true
    }
}

/// Runs resource loads on a fixed number of worker threads.
///
/// Hand it to a `ResourcePool` as its [`TaskScheduler`]. Tasks start in
/// submission order; with more than one worker they may finish in any
/// order. A panicking task is logged and does not take its worker down.
pub struct LoadWorkerPool {
    sender: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
    worker_ids: Vec<ThreadId>,
    in_flight: Arc<InFlight>,
}

impl LoadWorkerPool {
    /// Spawns `threads` workers. Zero threads is clamped to one.
    pub fn new(threads: usize) -> anyhow::Result<Self> {
        let threads = threads.max(1);
        let (sender, receiver) = crossbeam_channel::unbounded::<Task>();
        let in_flight = Arc::new(InFlight::default());

        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let receiver = receiver.clone();
            let in_flight = Arc::clone(&in_flight);
            let worker = thread::Builder::new()
                .name(format!("tessera-loader-{index}"))
                .spawn(move || Self::worker_loop(&receiver, &in_flight))
                .with_context(|| format!("failed to spawn load worker {index}"))?;
            workers.push(worker);
        }

        let worker_ids = workers.iter().map(|worker| worker.thread().id()).collect();
        log::info!("LoadWorkerPool: Started {threads} workers");
        Ok(Self {
            sender: Some(sender),
            workers,
            worker_ids,
            in_flight,
        })
    }

    fn worker_loop(receiver: &Receiver<Task>, in_flight: &InFlight) {
        for task in receiver.iter() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_default();
                log::error!("LoadWorkerPool: task panicked: {message}");
            }
            in_flight.finish();
        }
    }

    /// Number of worker threads.
    #[must_use]
    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    /// Number of tasks scheduled but not finished.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.in_flight.current()
    }

    /// Blocks until every scheduled task, including tasks scheduled by
    /// running tasks, has finished.
    ///
    /// # Panics
    ///
    /// Panics when called from one of this pool's workers, which would
    /// wait on itself.
    pub fn wait_idle(&self) {
        self.assert_not_worker();
        self.in_flight.wait_idle(None);
    }

    /// Like [`wait_idle`](Self::wait_idle), giving up after `timeout`.
    /// Returns `true` if the pool went idle in time.
    pub fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        self.assert_not_worker();
        self.in_flight.wait_idle(Some(Instant::now() + timeout))
    }

    fn assert_not_worker(&self) {
        assert!(
            !self.worker_ids.contains(&thread::current().id()),
            "LoadWorkerPool: a worker cannot wait for its own pool"
        );
    }
}

impl TaskScheduler for LoadWorkerPool {
    fn schedule(&self, task: Task) {
        self.in_flight.begin();
        let rejected = match &self.sender {
            Some(sender) => sender.send(task).err().map(|e| e.into_inner()),
            None => Some(task),
        };

        // Every worker is gone; run it here rather than lose the load.
        if let Some(task) = rejected {
            log::warn!("LoadWorkerPool: No worker available, running task inline");
            if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                log::error!("LoadWorkerPool: inline task panicked");
            }
            self.in_flight.finish();
        }
    }
}

impl Drop for LoadWorkerPool {
    fn drop(&mut self) {
        // Closing the channel lets workers drain what is queued, then exit.
        drop(self.sender.take());
        let current = thread::current().id();
        for worker in self.workers.drain(..) {
            if worker.thread().id() == current {
                // The last owner was dropped by a task on this worker.
                continue;
            }
            if worker.join().is_err() {
                log::error!("LoadWorkerPool: a worker thread panicked");
            }
        }
        log::debug!("LoadWorkerPool: Stopped");
    }
}

impl std::fmt::Debug for LoadWorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadWorkerPool")
            .field("threads", &self.threads())
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_runs_every_task() {
        let pool = LoadWorkerPool::new(4).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            pool.schedule(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        pool.wait_idle();

        assert_eq!(counter.load(Ordering::SeqCst), 100);
        assert_eq!(pool.pending(), 0);
    }

    #[test]
    fn test_panicking_task_keeps_worker_alive() {
        let pool = LoadWorkerPool::new(1).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        pool.schedule(Box::new(|| panic!("boom")));
        let after = Arc::clone(&counter);
        pool.schedule(Box::new(move || {
            after.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(pool.wait_idle_timeout(Duration::from_secs(5)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_threads_is_clamped() {
        let pool = LoadWorkerPool::new(0).unwrap();
        assert_eq!(pool.threads(), 1);
    }

    #[test]
    fn test_wait_idle_timeout_expires() {
        let pool = LoadWorkerPool::new(1).unwrap();
        let (release, gate) = crossbeam_channel::bounded::<()>(0);
        pool.schedule(Box::new(move || {
            let _ = gate.recv();
        }));

        assert!(!pool.wait_idle_timeout(Duration::from_millis(20)));
        release.send(()).unwrap();
        pool.wait_idle();
    }
}
