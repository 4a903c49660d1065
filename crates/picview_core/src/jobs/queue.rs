//! Job queue adapter and a worker-thread implementation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

use super::job::{Job, JobOutcome};
use super::runner::JobRunner;

/// Executes jobs off the window loop.
///
/// Contract: every enqueued job finishes exactly once unless it was
/// removed before execution started. `remove` is best effort.
pub trait JobQueue: Send + Sync {
    fn enqueue(&self, job: Arc<Job>);

    /// Drop a pending job, or request cancellation of a running one.
    fn remove(&self, job: &Job);
}

struct Shared {
    pending: Mutex<VecDeque<Arc<Job>>>,
    wake: Condvar,
    shutdown: AtomicBool,
}

/// FIFO queue drained by one background worker thread.
pub struct WorkerQueue {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerQueue {
    /// Spawn the worker thread.
    pub fn new(runner: Arc<dyn JobRunner>) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            pending: Mutex::new(VecDeque::new()),
            wake: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("picview-jobs".to_string())
            .spawn(move || worker_loop(&worker_shared, runner.as_ref()))?;

        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Number of jobs waiting to start.
    pub fn pending(&self) -> usize {
        self.shared.pending.lock().len()
    }

    /// Stop the worker after the current job. Pending jobs finish as
    /// cancelled.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.wake.notify_all();

        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                tracing::error!("Job worker panicked");
            }
        }

        let leftover: Vec<_> = self.shared.pending.lock().drain(..).collect();
        for job in leftover {
            job.finish(JobOutcome::Cancelled);
        }
    }
}

fn worker_loop(shared: &Shared, runner: &dyn JobRunner) {
    tracing::debug!("Job worker started");
    loop {
        let job = {
            let mut pending = shared.pending.lock();
            loop {
                if shared.shutdown.load(Ordering::SeqCst) {
                    tracing::debug!("Job worker stopping");
                    return;
                }
                if let Some(job) = pending.pop_front() {
                    break job;
                }
                shared.wake.wait(&mut pending);
            }
        };

        if job.is_cancelled() {
            job.finish(JobOutcome::Cancelled);
            continue;
        }

        tracing::debug!("Running {:?}", job);
        runner.run(&job);
        if !job.is_finished() {
            tracing::warn!("Runner returned without finishing job {}", job.id());
            job.finish(JobOutcome::Cancelled);
        }
    }
}

impl JobQueue for WorkerQueue {
    fn enqueue(&self, job: Arc<Job>) {
        self.shared.pending.lock().push_back(job);
        self.shared.wake.notify_one();
    }

    fn remove(&self, job: &Job) {
        let mut pending = self.shared.pending.lock();
        let before = pending.len();
        pending.retain(|queued| queued.id() != job.id());
        if pending.len() == before {
            // Already running; the runner checks between items.
            job.request_cancel();
        } else {
            tracing::debug!("Removed pending job {}", job.id());
        }
    }
}

impl Drop for WorkerQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::testing::FakeImage;
    use crate::jobs::JobSignal;
    use std::sync::mpsc;
    use std::time::Duration;

    /// Runner that blocks until released, so tests can observe a job
    /// while it runs.
    struct GateRunner {
        gate: Mutex<bool>,
        open: Condvar,
    }

    impl GateRunner {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                gate: Mutex::new(false),
                open: Condvar::new(),
            })
        }

        fn release(&self) {
            *self.gate.lock() = true;
            self.open.notify_all();
        }
    }

    impl JobRunner for GateRunner {
        fn run(&self, job: &Job) {
            let mut open = self.gate.lock();
            while !*open {
                self.open.wait(&mut open);
            }
            let outcome = if job.is_cancelled() {
                JobOutcome::Cancelled
            } else {
                JobOutcome::Success
            };
            job.finish(outcome);
        }
    }

    fn finished_channel(job: &Job) -> mpsc::Receiver<()> {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let _ = job.subscribe(move |signal| {
            if *signal == JobSignal::Finished {
                let _ = tx.lock().send(());
            }
        });
        rx
    }

    #[test]
    fn runs_jobs_in_order() {
        let runner = GateRunner::new();
        runner.release();
        let queue = WorkerQueue::new(runner).unwrap();

        let a = Job::load(FakeImage::new("a.png"));
        let b = Job::load(FakeImage::new("b.png"));
        let rx_b = finished_channel(&b);
        queue.enqueue(Arc::clone(&a));
        queue.enqueue(Arc::clone(&b));

        rx_b.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(a.is_finished());
        assert_eq!(b.outcome(), Some(JobOutcome::Success));
    }

    #[test]
    fn removing_pending_job_never_runs_it() {
        let runner = GateRunner::new();
        let queue = WorkerQueue::new(runner.clone()).unwrap();

        let blocker = Job::load(FakeImage::new("a.png"));
        let victim = Job::load(FakeImage::new("b.png"));
        let rx_blocker = finished_channel(&blocker);
        queue.enqueue(Arc::clone(&blocker));
        queue.enqueue(Arc::clone(&victim));

        // Wait until the worker has taken the blocker.
        while queue.pending() > 1 {
            thread::yield_now();
        }
        queue.remove(&victim);
        assert_eq!(queue.pending(), 0);

        runner.release();
        rx_blocker.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(!victim.is_finished());
    }

    #[test]
    fn removing_running_job_requests_cancel() {
        let runner = GateRunner::new();
        let queue = WorkerQueue::new(runner.clone()).unwrap();

        let job = Job::load(FakeImage::new("a.png"));
        let rx = finished_channel(&job);
        queue.enqueue(Arc::clone(&job));
        while queue.pending() > 0 {
            thread::yield_now();
        }

        queue.remove(&job);
        assert!(job.is_cancelled());
        runner.release();

        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(job.outcome(), Some(JobOutcome::Cancelled));
    }

    #[test]
    fn shutdown_cancels_leftovers() {
        let runner = GateRunner::new();
        let queue = WorkerQueue::new(runner.clone()).unwrap();

        let running = Job::load(FakeImage::new("a.png"));
        let waiting = Job::load(FakeImage::new("b.png"));
        queue.enqueue(Arc::clone(&running));
        while queue.pending() > 0 {
            thread::yield_now();
        }
        queue.enqueue(Arc::clone(&waiting));

        runner.release();
        queue.shutdown();
        assert!(running.is_finished());
        assert!(waiting.is_finished());
    }
}
