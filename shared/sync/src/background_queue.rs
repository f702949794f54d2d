use std::thread::JoinHandle;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A single-worker FIFO queue backing ASYNC train mode. The Sync Dispatcher's
/// four termination-logic steps get enqueued as one job each call; the worker
/// drains them in submission order, bounding parameter staleness by queue
/// depth rather than letting jobs run out of order.
///
/// Grounded in the same `flume::unbounded` + `std::thread::spawn` shape the
/// teacher's local trainer uses for its own background step loop.
pub struct BackgroundQueue {
    sender: Option<flume::Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl BackgroundQueue {
    pub fn spawn() -> Self {
        let (sender, receiver) = flume::unbounded::<Job>();
        let worker = std::thread::spawn(move || {
            for job in receiver.iter() {
                job();
            }
        });
        Self {
            sender: Some(sender),
            worker: Some(worker),
        }
    }

    /// Enqueues `job` for the worker thread. Panics if called after
    /// [`Self::shutdown`] — submitting work to a torn-down queue is a
    /// programming error, not a recoverable condition.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) {
        self.sender
            .as_ref()
            .expect("submit called after shutdown")
            .send(Box::new(job))
            .expect("background worker thread panicked");
    }

    /// Drops the sender (closing the channel once drained) and joins the
    /// worker. Idempotent: a second call is a no-op.
    pub fn shutdown(&mut self) {
        if let Some(sender) = self.sender.take() {
            drop(sender);
        }
        if let Some(worker) = self.worker.take() {
            worker.join().expect("background worker thread panicked");
        }
    }
}

impl Drop for BackgroundQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}
