// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Pluggable parking primitive for queue owner threads.
//!
//! A queue's run loop parks inside [`WakeCondition::wait`] whenever it has nothing to
//! dispatch, and every posting operation calls [`WakeCondition::notify`] to interrupt
//! that park. The default implementation, [`CondvarWake`], is backed by a
//! [`std::sync::Condvar`]. Embedders integrating a queue with an external event source
//! (a UI main loop, an I/O poller) provide their own implementation and hand it to
//! [`MessageQueueCreater::with_condition`], so "park" can mean "pump the host loop".
//!
//! # Contract
//!
//! `wait` has condition-variable semantics: it receives the queue's lock guard, must
//! release the lock while parked, and must reacquire it before returning. The guard is
//! opaque — implementations move it through [`ParkGuard`] without inspecting queue
//! internals. `notify` is called with the lock held and must wake any thread parked in
//! `wait` on the same condition.
//!
//! Spurious wakeups are fine: the run loop re-checks its lists on every wakeup.
//!
//! # Type Identity
//!
//! [`WakeCondition::type_name`] lets a handler ask "what kind of loop am I running in"
//! (e.g. to detect a UI-main-loop integration) via
//! [`current_wake_condition`](crate::current_wake_condition).
//!
//! [`MessageQueueCreater::with_condition`]: crate::MessageQueueCreater::with_condition

use crate::queue_state::QueueInner;
use std::{sync::{Condvar, MutexGuard, PoisonError},
          time::Duration};

/// Opaque wrapper around a parked queue's lock guard.
///
/// Moves the lock through [`WakeCondition::wait`] and back without exposing queue
/// internals to implementations.
#[allow(missing_debug_implementations)]
pub struct ParkGuard<'q>(pub(crate) MutexGuard<'q, QueueInner>);

/// Parking/notifying capability abstracting condvars or external event loops.
pub trait WakeCondition: Send + Sync + 'static {
    /// Identifies the concrete implementation, so handlers can inspect what kind of
    /// loop their queue is driven by.
    fn type_name(&self) -> &'static str;

    /// Parks the calling thread for at most `timeout`, releasing the queue lock while
    /// parked and reacquiring it before returning.
    ///
    /// Returns early when [`notify`](Self::notify) is called. Spurious early returns
    /// are permitted.
    fn wait<'q>(&self, guard: ParkGuard<'q>, timeout: Duration) -> ParkGuard<'q>;

    /// Wakes any thread parked in [`wait`](Self::wait). Called with the queue lock
    /// held (the guard witnesses that).
    fn notify(&self, guard: &mut ParkGuard<'_>);
}

/// The default wake condition: a [`std::sync::Condvar`].
#[derive(Debug, Default)]
pub struct CondvarWake {
    condvar: Condvar,
}

impl CondvarWake {
    #[must_use]
    pub fn new() -> Self {
        Self {
            condvar: Condvar::new(),
        }
    }
}

impl WakeCondition for CondvarWake {
    fn type_name(&self) -> &'static str { "CondvarWake" }

    fn wait<'q>(&self, guard: ParkGuard<'q>, timeout: Duration) -> ParkGuard<'q> {
        // A poisoned lock still hands the guard back; dispatch bookkeeping is
        // protected by its own drop guard, so the queue state remains consistent.
        let (inner, _timed_out) = self
            .condvar
            .wait_timeout(guard.0, timeout)
            .unwrap_or_else(PoisonError::into_inner);
        ParkGuard(inner)
    }

    fn notify(&self, _guard: &mut ParkGuard<'_>) { self.condvar.notify_all(); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MessageQueueCreater, Timing, install_message_handler, post_message};
    use crate::message::Message;
    use std::sync::{Arc, mpsc};
    use std::time::Instant;

    #[test]
    fn test_condvar_wake_type_name() {
        assert_eq!(CondvarWake::new().type_name(), "CondvarWake");
    }

    /// A parked queue must wake promptly when a message is posted, long before the
    /// park sentinel elapses.
    #[test]
    fn test_posting_interrupts_a_parked_queue() {
        let creater = MessageQueueCreater::new("condvar-wake-test");
        let queue = creater.create();
        assert!(queue.is_valid());

        let (sender, receiver) = mpsc::channel();
        let handler = install_message_handler(queue, false, move |_post, _message| {
            drop(sender.send(Instant::now()));
        });

        // Give the owner thread time to enter its long park.
        std::thread::sleep(Duration::from_millis(50));

        let posted_at = Instant::now();
        let post = post_message(handler, Message::default(), Timing::Immediately);
        assert!(!post.is_null());

        let dispatched_at = receiver
            .recv_timeout(Duration::from_secs(5))
            .expect("handler never ran");
        assert!(dispatched_at.duration_since(posted_at) < Duration::from_secs(1));

        creater.cancel_and_wait();
    }

    /// A custom wake condition supplied through the creater drives the queue.
    #[test]
    fn test_custom_wake_condition_is_used() {
        let creater =
            MessageQueueCreater::with_condition(Arc::new(CondvarWake::new()), "custom-cond");
        let queue = creater.create();
        assert!(queue.is_valid());

        let (sender, receiver) = mpsc::channel();
        let handler = install_message_handler(queue, false, move |_post, _message| {
            drop(sender.send(()));
        });
        let post = post_message(handler, Message::default(), Timing::Immediately);
        assert!(!post.is_null());
        receiver
            .recv_timeout(Duration::from_secs(5))
            .expect("handler never ran");

        creater.cancel_and_wait();
    }
}
