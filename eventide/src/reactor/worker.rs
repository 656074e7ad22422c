use crate::error::{CallbackError, SchedulingError};
use crate::queue::IntoOutcome;
use crate::runtime::Handle;

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::{debug, trace};

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send>;

/// A pool of threads for CPU-bound work.
///
/// Work is handed off by message passing: the input moves to a worker
/// thread, and the result (or the panic that replaced it) comes back as a
/// Poll-phase callback on the loop that submitted it. The loop never waits
/// on the pool beyond its normal Poll-phase blocking.
///
/// Dropping the pool closes the job channel and joins every worker.
pub struct WorkerPool {
    /// Sender side of the job channel; `None` once shut down.
    sender: Option<Sender<Job>>,

    /// Join handles for worker threads.
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `threads` worker threads.
    ///
    /// # Panics
    ///
    /// Panics if `threads == 0`.
    pub fn new(threads: usize) -> Self {
        assert!(threads > 0, "worker pool needs at least one thread");

        let (sender, receiver) = unbounded::<Job>();

        let handles = (0..threads)
            .map(|id| {
                let receiver = receiver.clone();
                thread::spawn(move || Self::run(id, receiver))
            })
            .collect();

        Self {
            sender: Some(sender),
            handles,
        }
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.handles.len()
    }

    /// Runs `work` on a worker thread and passes its result to `done` in
    /// the Poll phase of `handle`'s loop.
    ///
    /// A panic inside `work` reaches `done` as [`CallbackError::Panicked`].
    pub fn offload<T, W, C, R>(&self, handle: &Handle, work: W, done: C) -> Result<(), SchedulingError>
    where
        T: Send + 'static,
        W: FnOnce() -> T + Send + 'static,
        C: FnOnce(Result<T, CallbackError>) -> R + 'static,
        R: IntoOutcome,
    {
        let sender = self.sender.as_ref().ok_or(SchedulingError::TornDown)?;
        let completion = handle.register_io_with("worker-pool", done)?;

        let job: Job = Box::new(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(work)).map_err(|payload| {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());

                CallbackError::Panicked(message)
            });

            let _ = completion.complete(result);
        });

        sender.send(job).map_err(|_| SchedulingError::TornDown)
    }

    /// Worker thread body: run jobs until the channel closes.
    fn run(id: usize, receiver: Receiver<Job>) {
        debug!(worker = id, "worker started");

        while let Ok(job) = receiver.recv() {
            trace!(worker = id, "running offloaded job");
            job();
        }

        debug!(worker = id, "worker stopped");
    }
}

impl Drop for WorkerPool {
    /// Closes the job channel and joins all worker threads.
    fn drop(&mut self) {
        self.sender.take();

        for h in self.handles.drain(..) {
            let _ = h.join();
        }
    }
}
