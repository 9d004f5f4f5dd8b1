//! Bounded message queues.
//!
//! One `MessageQueue` sits behind every linked input and every host-facing
//! stream. The queue owns the overflow policy:
//!
//! - **blocking**: a full queue suspends the sender until a consumer takes a
//!   message (backpressure).
//! - **non-blocking**: a full queue discards its oldest message, so the sender
//!   never waits.
//!
//! Closing a queue is terminal. Every waiter, sender or receiver, is woken
//! and observes [`RuntimeError::QueueClosed`]; the queue never reopens.

use crate::pipeline::error::RuntimeError;
use crate::pipeline::message::SharedMessage;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

struct QueueState {
    buf: VecDeque<SharedMessage>,
    max_size: usize,
    blocking: bool,
    closed: bool,
    dropped: u64,
}

pub struct MessageQueue {
    name: String,
    state: Mutex<QueueState>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl MessageQueue {
    /// Create a queue. `max_size` is clamped to at least 1.
    pub fn new(name: impl Into<String>, max_size: usize, blocking: bool) -> Self {
        let max_size = max_size.max(1);
        Self {
            name: name.into(),
            state: Mutex::new(QueueState {
                buf: VecDeque::with_capacity(max_size),
                max_size,
                blocking,
                closed: false,
                dropped: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn closed_error(&self) -> RuntimeError {
        RuntimeError::QueueClosed(self.name.clone())
    }

    /// Enqueue a message, applying the queue's overflow policy.
    ///
    /// Suspends while a blocking queue is full.
    pub fn send(&self, msg: SharedMessage) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(self.closed_error());
            }
            if state.buf.len() < state.max_size {
                state.buf.push_back(msg);
                self.not_empty.notify_one();
                return Ok(());
            }
            if !state.blocking {
                state.buf.pop_front();
                state.dropped += 1;
                tracing::trace!("Queue '{}' full, dropped oldest message", self.name);
                state.buf.push_back(msg);
                self.not_empty.notify_one();
                return Ok(());
            }
            self.not_full.wait(&mut state);
        }
    }

    /// Enqueue without ever suspending.
    ///
    /// Returns `Ok(false)` when a blocking queue is full and the message was
    /// not enqueued.
    pub fn try_send(&self, msg: SharedMessage) -> Result<bool, RuntimeError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(self.closed_error());
        }
        if state.buf.len() >= state.max_size {
            if state.blocking {
                return Ok(false);
            }
            state.buf.pop_front();
            state.dropped += 1;
        }
        state.buf.push_back(msg);
        self.not_empty.notify_one();
        Ok(true)
    }

    /// Dequeue the oldest message, suspending until one arrives or the queue
    /// is closed.
    pub fn get(&self) -> Result<SharedMessage, RuntimeError> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(self.closed_error());
            }
            if let Some(msg) = state.buf.pop_front() {
                self.not_full.notify_one();
                return Ok(msg);
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Like [`get`](Self::get) but gives up after `timeout` with `Ok(None)`.
    pub fn get_timeout(&self, timeout: Duration) -> Result<Option<SharedMessage>, RuntimeError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(self.closed_error());
            }
            if let Some(msg) = state.buf.pop_front() {
                self.not_full.notify_one();
                return Ok(Some(msg));
            }
            if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                // A message may have raced the deadline.
                if state.closed {
                    return Err(self.closed_error());
                }
                let msg = state.buf.pop_front();
                if msg.is_some() {
                    self.not_full.notify_one();
                }
                return Ok(msg);
            }
        }
    }

    /// Dequeue the oldest message if there is one. Never suspends.
    pub fn try_get(&self) -> Result<Option<SharedMessage>, RuntimeError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(self.closed_error());
        }
        let msg = state.buf.pop_front();
        if msg.is_some() {
            self.not_full.notify_one();
        }
        Ok(msg)
    }

    /// Drain everything currently buffered, oldest first.
    pub fn try_get_all(&self) -> Result<Vec<SharedMessage>, RuntimeError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(self.closed_error());
        }
        let msgs: Vec<_> = state.buf.drain(..).collect();
        if !msgs.is_empty() {
            self.not_full.notify_all();
        }
        Ok(msgs)
    }

    /// Whether a message is ready.
    pub fn has(&self) -> bool {
        !self.state.lock().buf.is_empty()
    }

    pub fn len(&self) -> usize {
        self.state.lock().buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_size(&self) -> usize {
        self.state.lock().max_size
    }

    pub fn is_blocking(&self) -> bool {
        self.state.lock().blocking
    }

    /// Number of messages discarded by the drop-oldest policy so far.
    pub fn dropped(&self) -> u64 {
        self.state.lock().dropped
    }

    /// Resize the queue. Shrinking discards the oldest surplus messages.
    pub fn set_max_size(&self, max_size: usize) -> Result<(), RuntimeError> {
        if max_size == 0 {
            return Err(RuntimeError::InvalidQueueSize(self.name.clone()));
        }
        let mut state = self.state.lock();
        state.max_size = max_size;
        while state.buf.len() > max_size {
            state.buf.pop_front();
            state.dropped += 1;
        }
        self.not_full.notify_all();
        Ok(())
    }

    /// Switch the overflow policy. Senders waiting on a full queue are woken
    /// so they can re-check under the new policy.
    pub fn set_blocking(&self, blocking: bool) {
        let mut state = self.state.lock();
        state.blocking = blocking;
        self.not_full.notify_all();
    }

    /// Close the queue, discarding buffered messages and waking all waiters.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.buf.clear();
        self.not_empty.notify_all();
        self.not_full.notify_all();
        tracing::debug!("Queue '{}' closed", self.name);
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl std::fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MessageQueue")
            .field("name", &self.name)
            .field("len", &state.buf.len())
            .field("max_size", &state.max_size)
            .field("blocking", &state.blocking)
            .field("closed", &state.closed)
            .finish()
    }
}
