//! Turns a stream of hit submissions into a rate-limited, batched delivery stream.
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::dispatcher::Dispatcher;
use crate::exec_group::ExecGroup;
use crate::hit_queue::HitQueue;
use crate::hits::{BatchHit, Hit};

const LOCK_MESSAGE: &str = "thread holding flush lock should not panic";

/// Configuration for [`BatchHitProcessor`].
#[derive(Debug, Clone)]
pub struct BatchProcessorConfig {
    /// Number of hits per batch. Reaching it triggers a flush.
    ///
    /// Defaults to [`BatchProcessorConfig::DEFAULT_BATCH_SIZE`].
    pub batch_size: usize,
    /// Maximum number of queued hits. Submissions past it are dropped.
    ///
    /// Defaults to [`BatchProcessorConfig::DEFAULT_QUEUE_SIZE`].
    pub max_queue_size: usize,
    /// Interval of the background flush ticker, so low-traffic periods still drain.
    ///
    /// Defaults to [`BatchProcessorConfig::DEFAULT_FLUSH_INTERVAL`].
    pub flush_interval: Duration,
}

impl BatchProcessorConfig {
    /// Default value for [`BatchProcessorConfig::batch_size`].
    pub const DEFAULT_BATCH_SIZE: usize = 10;
    /// Default value for [`BatchProcessorConfig::max_queue_size`].
    pub const DEFAULT_QUEUE_SIZE: usize = 2000;
    /// Default value for [`BatchProcessorConfig::flush_interval`].
    pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

    /// Create a new `BatchProcessorConfig` using default configuration.
    pub fn new() -> BatchProcessorConfig {
        BatchProcessorConfig::default()
    }

    /// Update batch size with `batch_size`.
    pub fn with_batch_size(mut self, batch_size: usize) -> BatchProcessorConfig {
        self.batch_size = batch_size;
        self
    }

    /// Update maximum queue size with `max_queue_size`.
    pub fn with_queue_size(mut self, max_queue_size: usize) -> BatchProcessorConfig {
        self.max_queue_size = max_queue_size;
        self
    }

    /// Update flush interval with `flush_interval`.
    pub fn with_flush_interval(mut self, flush_interval: Duration) -> BatchProcessorConfig {
        self.flush_interval = flush_interval;
        self
    }
}

impl Default for BatchProcessorConfig {
    fn default() -> BatchProcessorConfig {
        BatchProcessorConfig {
            batch_size: BatchProcessorConfig::DEFAULT_BATCH_SIZE,
            max_queue_size: BatchProcessorConfig::DEFAULT_QUEUE_SIZE,
            flush_interval: BatchProcessorConfig::DEFAULT_FLUSH_INTERVAL,
        }
    }
}

/// Batches hits into a queue and hands full batches to the dispatcher, either when the batch
/// size is reached or on a regular flush tick.
///
/// The processor is cheap to clone; clones share the same queue and dispatcher.
#[derive(Clone)]
pub struct BatchHitProcessor {
    environment_id: String,
    batch_size: usize,
    max_queue_size: usize,
    flush_interval: Duration,
    queue: Arc<HitQueue>,
    /// Serializes flush runs so a ticker flush and a threshold flush never interleave.
    flush_lock: Arc<Mutex<()>>,
    /// Single-permit gate: at most one threshold-triggered flush task in flight.
    flushing: Arc<Mutex<bool>>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl BatchHitProcessor {
    /// Create a processor for the given environment, delivering through `dispatcher`.
    ///
    /// A batch size larger than the queue size is not an error: both values silently reset
    /// to their defaults, and a warning is logged.
    pub fn new(
        environment_id: impl Into<String>,
        dispatcher: Arc<dyn Dispatcher>,
        mut config: BatchProcessorConfig,
    ) -> BatchHitProcessor {
        if config.batch_size > config.max_queue_size {
            log::warn!(
                target: "flagship",
                "batch size {} is larger than queue size {}, resetting both to defaults",
                config.batch_size, config.max_queue_size
            );
            config.batch_size = BatchProcessorConfig::DEFAULT_BATCH_SIZE;
            config.max_queue_size = BatchProcessorConfig::DEFAULT_QUEUE_SIZE;
        }

        BatchHitProcessor {
            environment_id: environment_id.into(),
            batch_size: config.batch_size,
            max_queue_size: config.max_queue_size,
            flush_interval: config.flush_interval,
            queue: Arc::new(HitQueue::new()),
            flush_lock: Arc::new(Mutex::new(())),
            flushing: Arc::new(Mutex::new(false)),
            dispatcher,
        }
    }

    /// Queue the given visitor hit for batched delivery.
    ///
    /// Returns `false` without queuing when the queue is at capacity or the hit fails
    /// validation; the hit is dropped in both cases. Never blocks on delivery.
    pub fn process_hit(&self, visitor_id: &str, mut hit: Hit) -> bool {
        if self.queue.size() >= self.max_queue_size {
            log::warn!(target: "flagship", "hit queue is at capacity, discarding hit");
            return false;
        }

        hit.set_base_infos(&self.environment_id, visitor_id);
        let errors = hit.validate();
        if !errors.is_empty() {
            for err in &errors {
                log::error!(target: "flagship", "hit validation error: {err}");
            }
            return false;
        }

        self.queue.add(hit);

        if self.queue.size() < self.batch_size {
            return true;
        }

        self.try_spawn_flush();
        true
    }

    /// Number of hits waiting to be flushed.
    pub fn hits_count(&self) -> usize {
        self.queue.size()
    }

    /// Start a flush task unless one is already in flight; the in-flight flush will pick up
    /// the new hits on its next loop iteration.
    fn try_spawn_flush(&self) {
        {
            let mut flushing = self.flushing.lock().expect(LOCK_MESSAGE);
            if *flushing {
                return;
            }
            *flushing = true;
        }

        log::debug!(target: "flagship", "batch size reached, starting flush");
        let processor = self.clone();
        std::thread::spawn(move || {
            processor.flush_hits();
            *processor.flushing.lock().expect(LOCK_MESSAGE) = false;
        });
    }

    /// Drain the queue into batches and hand them to the dispatcher.
    ///
    /// Hits are only removed from the queue once the dispatcher accepted the batch built
    /// from them; when the dispatcher refuses, the loop stops and the hits are retried on
    /// the next flush.
    pub fn flush_hits(&self) {
        let _guard = self.flush_lock.lock().expect(LOCK_MESSAGE);

        while self.queue.size() > 0 {
            let mut hits = self.queue.get(self.batch_size).into_iter();
            let Some(first) = hits.next() else {
                break;
            };

            let mut batch = BatchHit::from_first(first);
            for hit in hits {
                batch.push(hit);
            }
            let count = batch.len();

            if self.dispatcher.dispatch_hit(Hit::Batch(batch)) {
                log::debug!(target: "flagship", "handed batch of {count} hits to the dispatcher");
                self.queue.remove(count);
            } else {
                log::warn!(
                    target: "flagship",
                    "dispatcher refused the batch; hits stay queued for the next flush"
                );
                break;
            }
        }
    }

    /// Start the background flush ticker on the given group.
    ///
    /// On cancellation the worker performs one final flush, then asks the dispatcher to
    /// drain its own retry queue so nothing is lost on shutdown.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the worker thread failed to start.
    pub fn start(&self, group: &ExecGroup) -> std::io::Result<()> {
        log::info!(target: "flagship", "batch hit processor started");
        let processor = self.clone();
        group.spawn("flagship-hit-processor", move |shutdown| loop {
            if shutdown.wait_timeout(processor.flush_interval) {
                log::info!(target: "flagship", "hit processor stopped, flushing remaining hits");
                processor.flush_hits();
                processor.dispatcher.drain();
                return;
            }
            log::debug!(target: "flagship", "hit processor ticked, flushing hits");
            processor.flush_hits();
        })
    }
}
