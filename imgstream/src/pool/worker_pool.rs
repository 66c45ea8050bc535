//! Worker threads draining a single global task queue.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use super::error::PoolError;
use super::stats::{PoolCounters, PoolStats};
use crate::panic::panic_message;

/// A unit of work the pool can run.
///
/// `run` consumes the task. Returning `Some(next)` appends `next` to the back
/// of the global queue, which is how a task re-schedules itself without
/// holding a worker (animation playback uses this).
pub trait Runnable: Send + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Execute the task on the current worker thread.
    fn run(self) -> Option<Self>
    where
        Self: Sized;
}

/// Queue contents guarded by the pool lock.
struct QueueState<T> {
    queue: VecDeque<T>,
    shutdown: bool,
}

/// State shared between the pool handle, submitters and workers.
struct Shared<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
    counters: PoolCounters,
}

impl<T: Runnable> Shared<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                shutdown: false,
            }),
            available: Condvar::new(),
            counters: PoolCounters::default(),
        }
    }

    fn enqueue(&self, task: T) -> Result<(), PoolError> {
        let mut state = self.state.lock();
        if state.shutdown {
            drop(state);
            // Dropping outside the lock: a task may own the last session reference.
            drop(task);
            return Err(PoolError::Stopped);
        }
        state.queue.push_back(task);
        drop(state);

        self.counters.record_enqueued();
        self.available.notify_one();
        Ok(())
    }

    fn requeue(&self, task: T) {
        let mut state = self.state.lock();
        if state.shutdown {
            drop(state);
            debug!(task = task.name(), "Continuation dropped during shutdown");
            drop(task);
            self.counters.record_abandoned(1);
            return;
        }
        state.queue.push_back(task);
        drop(state);

        self.counters.record_continuation();
        self.available.notify_one();
    }

    /// Block until a task is available. Returns `None` once shutdown is requested.
    fn next_task(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            self.available
                .wait_while(&mut state, |s| s.queue.is_empty() && !s.shutdown);

            if state.shutdown {
                return None;
            }
            if let Some(task) = state.queue.pop_front() {
                return Some(task);
            }
        }
    }

    fn execute(&self, task: T) {
        let name = task.name();
        match panic::catch_unwind(AssertUnwindSafe(move || task.run())) {
            Ok(Some(next)) => {
                self.counters.record_executed();
                self.requeue(next);
            }
            Ok(None) => self.counters.record_executed(),
            Err(payload) => {
                self.counters.record_panicked();
                error!(
                    task = name,
                    panic = %panic_message(payload.as_ref()),
                    "Task panicked, abandoning it"
                );
            }
        }
    }

    /// Flag shutdown and take every queued task out of the queue.
    fn begin_shutdown(&self) -> Option<VecDeque<T>> {
        let mut state = self.state.lock();
        if state.shutdown {
            return None;
        }
        state.shutdown = true;
        Some(std::mem::take(&mut state.queue))
    }
}

/// Cloneable handle producers use to submit tasks.
///
/// Submitters stay valid after the pool stops; submissions then fail with
/// [`PoolError::Stopped`].
pub struct PoolSubmitter<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for PoolSubmitter<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Runnable> PoolSubmitter<T> {
    /// Append a task to the global queue and wake one idle worker.
    ///
    /// If the pool is shutting down the task is dropped (releasing anything it
    /// owns) and [`PoolError::Stopped`] is returned.
    pub fn enqueue(&self, task: T) -> Result<(), PoolError> {
        self.shared.enqueue(task)
    }

    /// Whether the pool still accepts tasks.
    pub fn is_accepting(&self) -> bool {
        !self.shared.state.lock().shutdown
    }
}

impl<T> std::fmt::Debug for PoolSubmitter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolSubmitter").finish_non_exhaustive()
    }
}

/// Fixed-size pool of worker threads sharing one FIFO queue.
///
/// The pool is created once at startup and passed to whoever needs to submit
/// work (usually as a [`PoolSubmitter`]). Dropping the pool stops it.
///
/// # Example
///
/// ```ignore
/// use imgstream::pool::WorkerPool;
///
/// let mut pool = WorkerPool::start(4)?;
/// pool.enqueue(task)?;
/// pool.stop();
/// ```
pub struct WorkerPool<T: Runnable> {
    shared: Arc<Shared<T>>,
    workers: Vec<JoinHandle<()>>,
}

impl<T: Runnable> WorkerPool<T> {
    /// Spawn `worker_count` worker threads.
    pub fn start(worker_count: usize) -> Result<Self, PoolError> {
        if worker_count == 0 {
            return Err(PoolError::NoWorkers);
        }

        let mut pool = Self {
            shared: Arc::new(Shared::new()),
            workers: Vec::with_capacity(worker_count),
        };

        for index in 0..worker_count {
            let shared = Arc::clone(&pool.shared);
            let spawned = thread::Builder::new()
                .name(format!("imgstream-worker-{}", index))
                .spawn(move || worker_loop(shared, index));

            match spawned {
                Ok(handle) => pool.workers.push(handle),
                Err(e) => {
                    // Tear down the workers that did start before reporting.
                    pool.stop();
                    return Err(PoolError::Spawn(e));
                }
            }
        }

        info!(workers = worker_count, "Worker pool started");
        Ok(pool)
    }

    /// Append a task to the global queue and wake one idle worker.
    pub fn enqueue(&self, task: T) -> Result<(), PoolError> {
        self.shared.enqueue(task)
    }

    /// Get a cloneable submitter for producers.
    pub fn submitter(&self) -> PoolSubmitter<T> {
        PoolSubmitter {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Number of worker threads still owned by the pool.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Number of tasks waiting in the queue.
    pub fn queued(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Returns a snapshot of the pool statistics.
    pub fn stats(&self) -> PoolStats {
        self.shared.counters.snapshot()
    }

    /// Whether shutdown has been requested.
    pub fn is_shut_down(&self) -> bool {
        self.shared.state.lock().shutdown
    }

    /// Signal shutdown without waiting for the workers.
    ///
    /// Queued tasks are abandoned: they are removed from the queue and dropped
    /// without running. Workers exit as soon as their current task (if any)
    /// returns. Call [`join`](Self::join) afterwards to wait for them.
    pub fn shutdown(&self) {
        let Some(abandoned) = self.shared.begin_shutdown() else {
            return;
        };
        self.shared.available.notify_all();

        let count = abandoned.len();
        self.shared.counters.record_abandoned(count);
        drop(abandoned);

        info!(abandoned = count, "Worker pool shutting down");
    }

    /// Wait for all worker threads to exit.
    ///
    /// Should be called after [`shutdown`](Self::shutdown).
    pub fn join(&mut self) {
        for handle in self.workers.drain(..) {
            if let Err(e) = handle.join() {
                warn!("Worker thread panicked outside a task: {:?}", e);
            }
        }
    }

    /// Shut down and join every worker.
    pub fn stop(&mut self) {
        self.shutdown();
        self.join();
    }
}

impl<T: Runnable> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop<T: Runnable>(shared: Arc<Shared<T>>, index: usize) {
    debug!(worker = index, "Worker started");
    while let Some(task) = shared.next_task() {
        shared.execute(task);
    }
    debug!(worker = index, "Worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    // =========================================================================
    // Test helpers
    // =========================================================================

    enum TestTask {
        Count(Arc<AtomicUsize>),
        Record(Arc<Mutex<Vec<usize>>>, usize),
        Chain { counter: Arc<AtomicUsize>, remaining: usize },
        Block { started: mpsc::Sender<()>, release: mpsc::Receiver<()> },
        Panic,
    }

    impl Runnable for TestTask {
        fn name(&self) -> &'static str {
            match self {
                TestTask::Count(_) => "Count",
                TestTask::Record(..) => "Record",
                TestTask::Chain { .. } => "Chain",
                TestTask::Block { .. } => "Block",
                TestTask::Panic => "Panic",
            }
        }

        fn run(self) -> Option<Self> {
            match self {
                TestTask::Count(counter) => {
                    counter.fetch_add(1, Ordering::SeqCst);
                    None
                }
                TestTask::Record(log, value) => {
                    log.lock().push(value);
                    None
                }
                TestTask::Chain { counter, remaining } => {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (remaining > 0).then(|| TestTask::Chain {
                        counter,
                        remaining: remaining - 1,
                    })
                }
                TestTask::Block { started, release } => {
                    let _ = started.send(());
                    let _ = release.recv();
                    None
                }
                TestTask::Panic => panic!("task exploded"),
            }
        }
    }

    fn wait_for(condition: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    // =========================================================================
    // Tests
    // =========================================================================

    #[test]
    fn test_zero_workers_rejected() {
        let result = WorkerPool::<TestTask>::start(0);
        assert!(matches!(result, Err(PoolError::NoWorkers)));
    }

    #[test]
    fn test_executes_enqueued_tasks() {
        let mut pool = WorkerPool::start(4).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..100 {
            pool.enqueue(TestTask::Count(Arc::clone(&counter))).unwrap();
        }

        wait_for(|| counter.load(Ordering::SeqCst) == 100);
        pool.stop();

        let stats = pool.stats();
        assert_eq!(stats.enqueued, 100);
        assert_eq!(stats.executed, 100);
        assert_eq!(stats.abandoned, 0);
    }

    #[test]
    fn test_single_worker_preserves_fifo_order() {
        let mut pool = WorkerPool::start(1).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..50 {
            pool.enqueue(TestTask::Record(Arc::clone(&log), i)).unwrap();
        }

        wait_for(|| log.lock().len() == 50);
        pool.stop();

        let recorded = log.lock().clone();
        assert_eq!(recorded, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_continuation_is_requeued() {
        let mut pool = WorkerPool::start(2).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        pool.enqueue(TestTask::Chain {
            counter: Arc::clone(&counter),
            remaining: 9,
        })
        .unwrap();

        wait_for(|| counter.load(Ordering::SeqCst) == 10);
        pool.stop();

        let stats = pool.stats();
        assert_eq!(stats.enqueued, 1);
        assert_eq!(stats.continuations, 9);
        assert_eq!(stats.executed, 10);
    }

    #[test]
    fn test_panicking_task_does_not_kill_worker() {
        let mut pool = WorkerPool::start(1).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        pool.enqueue(TestTask::Panic).unwrap();
        pool.enqueue(TestTask::Count(Arc::clone(&counter))).unwrap();

        wait_for(|| counter.load(Ordering::SeqCst) == 1);
        assert_eq!(pool.worker_count(), 1);
        pool.stop();

        let stats = pool.stats();
        assert_eq!(stats.panicked, 1);
        assert_eq!(stats.executed, 1);
    }

    #[test]
    fn test_shutdown_abandons_queued_tasks() {
        let mut pool = WorkerPool::start(1).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();

        pool.enqueue(TestTask::Block {
            started: started_tx,
            release: release_rx,
        })
        .unwrap();
        started_rx.recv().unwrap();

        for _ in 0..25 {
            pool.enqueue(TestTask::Count(Arc::clone(&counter))).unwrap();
        }
        assert_eq!(pool.queued(), 25);

        pool.shutdown();
        assert_eq!(pool.queued(), 0);
        release_tx.send(()).unwrap();
        pool.join();

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(pool.worker_count(), 0);
        assert_eq!(pool.stats().abandoned, 25);
        // Abandoned tasks were dropped, releasing their references.
        assert_eq!(Arc::strong_count(&counter), 1);
    }

    #[test]
    fn test_enqueue_after_stop_fails_and_drops_task() {
        let mut pool = WorkerPool::start(2).unwrap();
        let submitter = pool.submitter();
        pool.stop();

        let counter = Arc::new(AtomicUsize::new(0));
        let result = submitter.enqueue(TestTask::Count(Arc::clone(&counter)));

        assert!(matches!(result, Err(PoolError::Stopped)));
        assert!(!submitter.is_accepting());
        assert_eq!(Arc::strong_count(&counter), 1);
    }

    #[test]
    fn test_stop_with_idle_workers_returns_promptly() {
        let mut pool = WorkerPool::<TestTask>::start(8).unwrap();
        let started = Instant::now();
        pool.stop();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(pool.is_shut_down());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut pool = WorkerPool::<TestTask>::start(2).unwrap();
        pool.stop();
        pool.stop();
        assert_eq!(pool.worker_count(), 0);
    }

    #[test]
    fn test_submitters_from_many_threads() {
        let mut pool = WorkerPool::start(4).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let producers: Vec<_> = (0..4)
            .map(|_| {
                let submitter = pool.submitter();
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..250 {
                        submitter
                            .enqueue(TestTask::Count(Arc::clone(&counter)))
                            .unwrap();
                    }
                })
            })
            .collect();

        for producer in producers {
            producer.join().unwrap();
        }

        wait_for(|| counter.load(Ordering::SeqCst) == 1000);
        pool.stop();
    }
}
