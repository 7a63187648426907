use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::ratelimit::{RateLimiter, RateLimitingCategory};
use crate::{sentry_debug, Envelope};

/// The hard cap of the delivery queue.
const MAX_QUEUE_SIZE: usize = 100;

struct WorkerState {
    queue: VecDeque<Envelope>,
    in_flight: bool,
    shutdown: bool,
}

struct Shared {
    state: Mutex<WorkerState>,
    work: Condvar,
    drained: Condvar,
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, WorkerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The delivery worker shared by the provided transports.
///
/// Envelopes are queued into a bounded FIFO, dropping the oldest entry on
/// overflow, and drained by exactly one background thread which consults
/// the rate-limit ledger before every send. Rate-limit updates observed
/// from a response apply before the next envelope is considered.
pub struct TransportThread {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl TransportThread {
    /// Spawns the delivery thread around the given send function.
    ///
    /// The send function performs the actual I/O and feeds response
    /// headers back into the passed [`RateLimiter`].
    pub fn new<SendFn>(mut send: SendFn) -> Self
    where
        SendFn: FnMut(Envelope, &mut RateLimiter) + Send + 'static,
    {
        let shared = Arc::new(Shared {
            state: Mutex::new(WorkerState {
                queue: VecDeque::new(),
                in_flight: false,
                shutdown: false,
            }),
            work: Condvar::new(),
            drained: Condvar::new(),
        });

        let worker_shared = shared.clone();
        let handle = thread::Builder::new()
            .name("sentry-transport".into())
            .spawn(move || {
                let mut rl = RateLimiter::new();

                loop {
                    let envelope = {
                        let mut state = worker_shared.lock();
                        loop {
                            if state.shutdown {
                                // release whatever is still queued
                                state.queue.clear();
                                worker_shared.drained.notify_all();
                                return;
                            }
                            if let Some(envelope) = state.queue.pop_front() {
                                state.in_flight = true;
                                break envelope;
                            }
                            state = worker_shared
                                .work
                                .wait(state)
                                .unwrap_or_else(PoisonError::into_inner);
                        }
                    };

                    if let Some(time_left) = rl.is_disabled(RateLimitingCategory::Any) {
                        sentry_debug!(
                            "[worker] skipping send, rate limited for {}s",
                            time_left.as_secs()
                        );
                    } else {
                        match rl.filter_envelope(envelope) {
                            Some(envelope) => send(envelope, &mut rl),
                            None => {
                                sentry_debug!(
                                    "[worker] envelope discarded due to per-item rate limits"
                                );
                            }
                        }
                    }

                    let mut state = worker_shared.lock();
                    state.in_flight = false;
                    if state.queue.is_empty() {
                        worker_shared.drained.notify_all();
                    }
                }
            })
            .ok();

        Self { shared, handle }
    }

    /// Queues an envelope for delivery, dropping the oldest queued envelope
    /// when the queue is full. After shutdown, envelopes are discarded.
    pub fn send(&self, envelope: Envelope) {
        let mut state = self.shared.lock();
        if state.shutdown {
            return;
        }
        if state.queue.len() >= MAX_QUEUE_SIZE {
            state.queue.pop_front();
            sentry_debug!("[worker] queue full, dropping oldest envelope");
        }
        state.queue.push_back(envelope);
        self.shared.work.notify_one();
    }

    /// Waits until the queue is drained and nothing is in flight, or the
    /// deadline expired. Returns `true` if drained in time.
    pub fn flush(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        loop {
            if state.queue.is_empty() && !state.in_flight {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            // keep the worker moving so queued items are not starved
            self.shared.work.notify_one();
            let (guard, _) = self
                .shared
                .drained
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    /// Flushes with the given deadline, then stops and joins the worker.
    pub fn shutdown(&mut self, timeout: Duration) -> bool {
        let drained = self.flush(timeout);
        self.stop_and_join();
        drained
    }

    fn stop_and_join(&mut self) {
        {
            let mut state = self.shared.lock();
            state.shutdown = true;
            self.shared.work.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }

    #[cfg(test)]
    fn queue_len(&self) -> usize {
        self.shared.lock().queue.len()
    }
}

impl Drop for TransportThread {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
