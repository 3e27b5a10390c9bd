//! A lifecycle supervisor for the SDK's background workers.
//!
//! Every background task (configuration poller, flush ticker) is spawned through an
//! [`ExecGroup`] so that a single [`ExecGroup::terminate_and_wait`] call stops and joins all
//! of them. Cancellation is cooperative: each worker observes the shared signal at its next
//! wait point and performs its final flush before returning.
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

const LOCK_MESSAGE: &str = "thread holding shutdown lock should not panic";

#[derive(Default)]
struct Shutdown {
    cancelled: Mutex<bool>,
    condvar: Condvar,
}

/// Handle passed to every worker. Lets the worker sleep between ticks while staying
/// responsive to cancellation.
#[derive(Clone)]
pub struct ShutdownSignal {
    shutdown: Arc<Shutdown>,
}

impl ShutdownSignal {
    /// Block for up to `timeout` or until the group is terminated.
    ///
    /// Returns `true` when the group has been terminated, `false` when the timeout elapsed.
    /// Workers typically use this as their ticker: timeout elapsed means "do a cycle of
    /// work", cancelled means "do the final cycle and return".
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let cancelled = self.shutdown.cancelled.lock().expect(LOCK_MESSAGE);
        let (cancelled, _timeout_result) = self
            .shutdown
            .condvar
            .wait_timeout_while(cancelled, timeout, |cancelled| !*cancelled)
            .expect(LOCK_MESSAGE);
        *cancelled
    }

    /// Whether the group has been terminated.
    pub fn is_cancelled(&self) -> bool {
        *self.shutdown.cancelled.lock().expect(LOCK_MESSAGE)
    }
}

/// Owns the SDK's background threads and a shared cancellation signal.
///
/// Threads spawned through the group receive a [`ShutdownSignal`];
/// [`ExecGroup::terminate_and_wait`] raises the signal and blocks until every thread has
/// returned. There is no shutdown timeout: a worker stuck in a network call during its final
/// flush delays shutdown until the call resolves.
#[derive(Default)]
pub struct ExecGroup {
    shutdown: Arc<Shutdown>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ExecGroup {
    /// Create a new group with no workers.
    pub fn new() -> ExecGroup {
        ExecGroup::default()
    }

    /// Spawn a named worker thread owned by this group.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the thread failed to start.
    pub fn spawn(
        &self,
        name: &str,
        f: impl FnOnce(ShutdownSignal) + Send + 'static,
    ) -> std::io::Result<()> {
        let signal = ShutdownSignal {
            shutdown: Arc::clone(&self.shutdown),
        };
        let handle = std::thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || f(signal))?;
        self.handles.lock().expect(LOCK_MESSAGE).push(handle);
        Ok(())
    }

    /// Raise the cancellation signal and block until every worker has returned.
    pub fn terminate_and_wait(&self) {
        {
            let mut cancelled = self.shutdown.cancelled.lock().expect(LOCK_MESSAGE);
            *cancelled = true;
            self.shutdown.condvar.notify_all();
        }

        let handles = std::mem::take(&mut *self.handles.lock().expect(LOCK_MESSAGE));
        for handle in handles {
            if handle.join().is_err() {
                log::error!(target: "flagship", "worker thread panicked during shutdown");
            }
        }
    }
}
