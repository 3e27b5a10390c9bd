//! Asynchronous delivery of ready batches with bounded retry.
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::hits::Hit;
use crate::hit_queue::HitQueue;
use crate::tracking_api::HitSender;

const MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

const LOCK_MESSAGE: &str = "thread holding dispatch lock should not panic";

/// Accepts ready batches from the processor and delivers them in the background.
pub trait Dispatcher: Send + Sync {
    /// Accept a batch for delivery. Returns whether the batch was accepted; implementations
    /// must not block on network I/O.
    fn dispatch_hit(&self, hit: Hit) -> bool;

    /// Block until the internal queue has been offered to the network once. Called on
    /// shutdown after the final flush.
    fn drain(&self);
}

struct DispatchQueue {
    queue: HitQueue,
    flush_lock: Mutex<()>,
    sender: Arc<dyn HitSender>,
    retry_delay: Duration,
}

impl DispatchQueue {
    /// Empty the queue via network delivery. Serialized so only one drain runs at a time.
    ///
    /// A batch that fails is retried in place after a fixed delay; after `MAX_RETRIES`
    /// consecutive failures the drain gives up and the remaining batches stay queued for the
    /// next submitted batch to pick up.
    fn drain_hits(&self) {
        let _guard = self.flush_lock.lock().expect(LOCK_MESSAGE);

        let mut retry_count = 0;
        while self.queue.size() > 0 {
            if retry_count > MAX_RETRIES {
                log::error!(
                    target: "flagship",
                    "batch failed to send {MAX_RETRIES} times; it will be retried on the next dispatch"
                );
                break;
            }

            let Some(mut hit) = self.queue.get(1).into_iter().next() else {
                continue;
            };
            hit.compute_queue_times();

            match self.sender.send_hit(&hit) {
                Ok(()) => {
                    log::debug!(target: "flagship", "dispatched batch successfully");
                    self.queue.remove(1);
                    retry_count = 0;
                }
                Err(err) => {
                    log::warn!(target: "flagship", "failed to dispatch batch: {err}");
                    std::thread::sleep(self.retry_delay);
                    retry_count += 1;
                }
            }
        }
    }
}

/// A queued [`Dispatcher`]: [`dispatch_hit`](Dispatcher::dispatch_hit) enqueues, reports
/// success, and delivery happens on a background thread.
pub struct QueueHitDispatcher {
    inner: Arc<DispatchQueue>,
}

impl QueueHitDispatcher {
    /// Create a dispatcher delivering through `sender`.
    pub fn new(sender: Arc<dyn HitSender>) -> QueueHitDispatcher {
        QueueHitDispatcher {
            inner: Arc::new(DispatchQueue {
                queue: HitQueue::new(),
                flush_lock: Mutex::new(()),
                sender,
                retry_delay: DEFAULT_RETRY_DELAY,
            }),
        }
    }

    /// Override the delay between delivery retries.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> QueueHitDispatcher {
        // The inner queue is not shared before the dispatcher is handed out.
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.retry_delay = retry_delay;
        }
        self
    }

    /// Number of batches waiting for delivery.
    pub fn pending(&self) -> usize {
        self.inner.queue.size()
    }
}

impl Dispatcher for QueueHitDispatcher {
    fn dispatch_hit(&self, hit: Hit) -> bool {
        self.inner.queue.add(hit);
        let inner = Arc::clone(&self.inner);
        std::thread::spawn(move || inner.drain_hits());
        true
    }

    fn drain(&self) {
        self.inner.drain_hits();
    }
}
