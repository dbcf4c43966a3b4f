// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! The public posting surface: install, post, cancel, wait, query.
//!
//! Every function here is callable from any thread. Posting failures are *returned*,
//! never thrown: an unknown handler or a queue in teardown yields [`PostId::NULL`]
//! with no side effects. See the crate docs for the ordering and cancellation
//! guarantees these operations provide.

use crate::{HandlerId, Message, PostId, QueueId, Timing, Title,
            queue_state::{HandlerFn, RunningFilter, SubmitMode},
            registry::registry,
            wake_condition::WakeCondition};
use std::{sync::Arc, thread::ThreadId};

// ─────────────────────────────── thread ↔ queue ───────────────────────────────

/// Idempotently associates the calling thread with a queue and returns its id.
/// Repeated calls from the same thread return the same id.
pub fn bind_current_thread() -> QueueId { registry().bind_current_thread().id() }

/// As [`bind_current_thread`], parking the owner on `cond` instead of the default
/// condvar. The condition only takes effect when this call creates the binding.
pub fn bind_current_thread_with(cond: Arc<dyn WakeCondition>) -> QueueId {
    registry().bind_current_thread_with(cond).id()
}

/// The queue bound to the calling thread, or [`QueueId::INVALID`] when the thread owns
/// no queue. Never creates a binding.
#[must_use]
pub fn current_thread_queue() -> QueueId {
    registry().queue_of_thread(std::thread::current().id())
}

/// The queue bound to `thread_id`, or [`QueueId::INVALID`].
#[must_use]
pub fn thread_to_queue(thread_id: ThreadId) -> QueueId { registry().queue_of_thread(thread_id) }

/// The owning thread of `queue`, if the queue is live.
#[must_use]
pub fn queue_to_thread(queue: QueueId) -> Option<ThreadId> { registry().thread_of_queue(queue) }

/// The wake condition driving the calling thread's queue, for "what kind of loop am I
/// in" introspection. `None` when the thread owns no queue.
#[must_use]
pub fn current_wake_condition() -> Option<Arc<dyn WakeCondition>> {
    let queue = current_thread_queue();
    registry().queue(queue).map(|state| state.wake_condition())
}

// ─────────────────────────────── handlers ───────────────────────────────

/// Installs `callback` on `queue`. Pass `recv_broadcast` to also receive broadcast
/// posts. Returns [`HandlerId::NULL`] when the queue is unknown.
pub fn install_message_handler(
    queue: QueueId,
    recv_broadcast: bool,
    callback: impl Fn(PostId, &mut Message) + Send + Sync + 'static,
) -> HandlerId {
    match registry().queue(queue) {
        Some(state) => {
            let callback: HandlerFn = Arc::new(callback);
            state.install(callback, recv_broadcast)
        }
        None => HandlerId::NULL,
    }
}

/// Uninstalls a handler: cancels its pending posts, blocks until a mid-flight
/// callback for it returns, then removes the record. After this returns, no callback
/// for `handler` ever fires and posting to it yields the null post.
pub fn uninstall_message_handler(handler: HandlerId) {
    if let Some(state) = registry().queue(handler.queue) {
        state.uninstall(handler);
    }
}

// ─────────────────────────────── posting ───────────────────────────────

/// Posts `message` to `handler` with the given timing. Returns the null post when the
/// handler is unknown or its queue is in teardown.
pub fn post_message(handler: HandlerId, message: Message, timing: Timing) -> PostId {
    match registry().queue(handler.queue) {
        Some(state) => state.submit(handler, message, timing, SubmitMode::Normal),
        None => PostId::NULL,
    }
}

/// Posts with coalescing: if a pending post with the same `(handler, title)` exists,
/// returns its id unchanged (`replace == false`) or cancels it and posts `message` in
/// its place (`replace == true`).
pub fn singleton_message(
    replace: bool,
    handler: HandlerId,
    message: Message,
    timing: Timing,
) -> PostId {
    match registry().queue(handler.queue) {
        Some(state) => state.submit_singleton(replace, handler, message, timing),
        None => PostId::NULL,
    }
}

/// Posts to the queue's broadcast pseudo-handler. At dispatch, every handler
/// installed with `recv_broadcast == true` is invoked with the same [`PostId`], in
/// install order. With zero subscribers the post still dispatches (as a no-op) and
/// then becomes not-found.
pub fn broadcast_message(queue: QueueId, message: Message, timing: Timing) -> PostId {
    match registry().queue(queue) {
        Some(state) => state.submit(
            HandlerId::broadcast(queue),
            message,
            timing,
            SubmitMode::Normal,
        ),
        None => PostId::NULL,
    }
}

/// Like [`post_message`], but an `Immediately` post jumps ahead of already-queued
/// immediates. It never overtakes the timer list and never preempts a running
/// callback; with any other timing this is identical to [`post_message`].
pub fn faster_message(handler: HandlerId, message: Message, timing: Timing) -> PostId {
    match registry().queue(handler.queue) {
        Some(state) => state.submit(handler, message, timing, SubmitMode::Faster),
        None => PostId::NULL,
    }
}

// ─────────────────────────────── cancellation ───────────────────────────────

/// Cancels one post. A pending entry is removed (observable as "not run"); a running
/// entry is flagged so a periodic series stops after the current iteration, and
/// waiters are released when the callback returns. Returns `true` iff something was
/// cancelled or suppressed — so a second call returns `false`.
pub fn cancel_message(post: PostId) -> bool {
    match registry().queue(post.queue()) {
        Some(state) => state.cancel_post(post),
        None => false,
    }
}

/// Removes every pending entry (ready or timed) targeting `handler`.
pub fn cancel_handler_messages(handler: HandlerId) {
    if let Some(state) = registry().queue(handler.queue) {
        state.cancel_for_handler(handler, None);
    }
}

/// Removes every pending entry targeting `handler` whose title equals `title`.
pub fn cancel_titled_messages(handler: HandlerId, title: Title) {
    if let Some(state) = registry().queue(handler.queue) {
        state.cancel_for_handler(handler, Some(title));
    }
}

// ─────────────────────────────── waiting / queries ───────────────────────────────

/// Blocks until `post` finishes dispatch and returns whether its callback ran. An
/// unknown post returns `false` immediately; a post cancelled before dispatch
/// releases its waiters with `false`.
///
/// Safe to call from the owning thread of the post's queue: the wait drains that
/// queue re-entrantly (honoring the break flag) until the post completes, so a queue
/// owner waiting on its own post cannot deadlock.
pub fn wait_message(post: PostId) -> bool {
    if post.is_null() {
        return false;
    }
    match registry().queue(post.queue()) {
        Some(state) => state.wait_post(post),
        None => false,
    }
}

/// Whether `post` is still known: pending in a list or currently running.
#[must_use]
pub fn found_message(post: PostId) -> bool {
    if post.is_null() {
        return false;
    }
    match registry().queue(post.queue()) {
        Some(state) => state.found(post),
        None => false,
    }
}

/// The published id of the entry currently running on `queue`, or the null post.
#[must_use]
pub fn running_post_id(queue: QueueId) -> PostId {
    match registry().queue(queue) {
        Some(state) => state.running_post_id(),
        None => PostId::NULL,
    }
}

/// Blocks until the running entry with this exact id (if any) has returned. A no-op
/// from the owning thread.
pub fn wait_running_end_post(post: PostId) {
    if let Some(state) = registry().queue(post.queue()) {
        state.wait_running_end(RunningFilter::Post(post));
    }
}

/// Blocks until no callback for `handler` is mid-flight. A no-op from the owning
/// thread.
pub fn wait_running_end_handler(handler: HandlerId) {
    if let Some(state) = registry().queue(handler.queue) {
        state.wait_running_end(RunningFilter::Handler(handler));
    }
}

/// Blocks until `queue` is between dispatches. A no-op from the owning thread.
pub fn wait_running_end_queue(queue: QueueId) {
    if let Some(state) = registry().queue(queue) {
        state.wait_running_end(RunningFilter::Any);
    }
}

/// Sets the queue's break flag and wakes its owner. The run loop exits once the ready
/// list is drained; new posts are refused from this point on.
pub fn break_run_loop(queue: QueueId) {
    if let Some(state) = registry().queue(queue) {
        state.request_break();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_operations_on_unknown_queue_are_inert() {
        let handler = HandlerId { queue: QueueId(u64::MAX), seq: 1 };
        let post = PostId { handler, seq: 1 };

        assert!(post_message(handler, Message::default(), Timing::Immediately).is_null());
        assert!(faster_message(handler, Message::default(), Timing::Immediately).is_null());
        assert!(singleton_message(true, handler, Message::default(), Timing::Immediately).is_null());
        assert!(broadcast_message(handler.queue, Message::default(), Timing::Immediately).is_null());
        assert!(!cancel_message(post));
        assert!(!wait_message(post));
        assert!(!found_message(post));
        assert_eq!(running_post_id(handler.queue), PostId::NULL);
    }

    #[test]
    fn test_null_post_queries_short_circuit() {
        assert!(!wait_message(PostId::NULL));
        assert!(!found_message(PostId::NULL));
    }

    #[test]
    fn test_install_on_unknown_queue_returns_null_handler() {
        let handler =
            install_message_handler(QueueId(u64::MAX), false, |_post, _message| {});
        assert_eq!(handler, HandlerId::NULL);
    }

    #[test]
    fn test_current_thread_queue_reflects_binding() {
        // This thread may already be bound by another test; binding is idempotent.
        let bound = bind_current_thread();
        assert_eq!(current_thread_queue(), bound);
        assert_eq!(thread_to_queue(std::thread::current().id()), bound);
        assert_eq!(queue_to_thread(bound), Some(std::thread::current().id()));
        assert!(current_wake_condition().is_some());
    }
}
