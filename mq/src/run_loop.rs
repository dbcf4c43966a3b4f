// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! The loop executed by a queue's owning thread.
//!
//! [`RunLoop::run`] is the body of every owner thread, whether spawned by
//! [`MessageQueueCreater`](crate::MessageQueueCreater) or adopted via
//! [`bind_current_thread`](crate::bind_current_thread): park on the queue's
//! [`WakeCondition`](crate::WakeCondition), wake, drain due messages, repeat — until
//! the break flag is set and the ready list is empty, or the embedder's breaker
//! predicate fires.
//!
//! The breaker predicate is evaluated once per iteration head. It exists for
//! embedders that interleave a queue with an external event source (e.g. a GUI main
//! loop): the host loop runs the queue for a while, breaks out, services its own
//! events, and comes back.

use crate::{queue_state::{PassOutcome, QueueState},
            registry::registry};
use std::sync::Arc;

/// Runs the calling thread's queue. [`run`](Self::run) binds the thread to a queue
/// first if it does not own one yet.
#[allow(missing_debug_implementations)]
#[derive(Default)]
pub struct RunLoop {
    breaker: Option<Box<dyn FnMut() -> bool>>,
}

impl RunLoop {
    #[must_use]
    pub fn new() -> Self { Self { breaker: None } }

    /// A run loop that also exits whenever `breaker` returns `true`. Exiting through
    /// the breaker leaves the queue intact; [`run`](Self::run) can be called again.
    #[must_use]
    pub fn with_breaker(breaker: impl FnMut() -> bool + 'static) -> Self {
        Self {
            breaker: Some(Box::new(breaker)),
        }
    }

    /// Dispatches the calling thread's queue until it is broken.
    ///
    /// On a break-flag exit, remaining timed entries are discarded (firing their
    /// cancellation hooks) and waiters are released. On a breaker-predicate exit the
    /// queue is left as-is.
    pub fn run(&mut self) {
        let queue = registry().bind_current_thread();
        tracing::debug!(queue = queue.id().0, "run loop entered");
        loop {
            if let Some(breaker) = self.breaker.as_mut() {
                if breaker() {
                    tracing::debug!(queue = queue.id().0, "run loop left via breaker");
                    return;
                }
            }
            if queue.run_pass() == PassOutcome::Break {
                break;
            }
        }
        queue.drain_on_break();
        tracing::debug!(queue = queue.id().0, "run loop exited");
    }

    /// Dispatches the calling thread's queue until it has no ready work, no running
    /// callback, and no pending timers other than periodic (anti-idle) entries.
    ///
    /// Periodic entries are excluded from the idleness check — they never drain, and
    /// would otherwise keep this call alive forever.
    pub fn run_until_idle(&mut self) {
        let queue: Arc<QueueState> = registry().bind_current_thread();
        while !queue.is_idle_ignoring_anti_idle() {
            if queue.run_pass() == PassOutcome::Break {
                queue.drain_on_break();
                return;
            }
        }
    }
}
