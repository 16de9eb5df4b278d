//! The serial operation queue (§5): a single FIFO drained by one background
//! consumer, the Rust shape of the "promise chain" the distilled design
//! calls for. This is the same "one thing runs at a time" idiom
//! `tandem-core::EngineLoop` gets for free from sequential `.await`s inside
//! one async method, adapted here into an explicit queue so the scheduler
//! can push work from a synchronous `handle_event` call.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Clone)]
pub struct OperationQueue {
    queue: Arc<Mutex<VecDeque<BoxFuture>>>,
    notify: Arc<Notify>,
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl OperationQueue {
    /// Spawns the single consumer task and returns a handle to push work onto
    /// it. The consumer runs for as long as this (or a clone of this) handle
    /// is alive; there is no explicit shutdown, matching `stop()`'s policy of
    /// not interrupting in-flight work.
    pub fn new() -> Self {
        let queue: Arc<Mutex<VecDeque<BoxFuture>>> = Arc::new(Mutex::new(VecDeque::new()));
        let notify = Arc::new(Notify::new());
        let pending = Arc::new(AtomicUsize::new(0));
        let idle = Arc::new(Notify::new());
        let worker_queue = queue.clone();
        let worker_notify = notify.clone();
        let worker_pending = pending.clone();
        let worker_idle = idle.clone();
        tokio::spawn(async move {
            loop {
                let next = worker_queue.lock().await.pop_front();
                match next {
                    Some(fut) => {
                        fut.await;
                        if worker_pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                            worker_idle.notify_waiters();
                        }
                    }
                    None => worker_notify.notified().await,
                }
            }
        });
        Self { queue, notify, pending, idle }
    }

    /// Chains `fut` onto the end of the queue. Returns immediately; `fut`
    /// runs once every future enqueued before it has completed.
    pub async fn enqueue<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.queue.lock().await.push_back(Box::pin(fut));
        self.notify.notify_one();
    }

    /// Resolves once every future enqueued so far (including ones already
    /// in flight) has completed. Used before stopping on mock-feed
    /// exhaustion so the last enqueued event isn't silently dropped by a
    /// `stop()` that races ahead of `handle_event_serial`.
    pub async fn drain(&self) {
        loop {
            let notified = self.idle.notified();
            if self.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Default for OperationQueue {
    fn default() -> Self {
        Self::new()
    }
}
