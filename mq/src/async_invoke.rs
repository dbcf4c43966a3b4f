// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Closure posting and cross-thread result carriage.
//!
//! The async-invoke layer is a convenience built entirely on [`post_message`]: a
//! closure is wrapped in a [`Message`] as an invocable body, posted to a handler whose
//! callback simply runs that body on the owning thread.
//!
//! Two levels of convenience:
//!
//! 1. **Fire-and-forget** — [`async_invoke`] and its timed/titled variants post a
//!    `FnMut()` closure. Periodic variants re-run the same closure every period.
//! 2. **Result carriage** — [`AsyncResult`] packages a one-shot producer, a result
//!    slot, and an optional completion callback `(&R, ok)`. [`wait_invoke`] uses it to
//!    give call-semantics equivalence across threads: called on the target queue's own
//!    thread the closure runs inline; called anywhere else it is posted, waited for,
//!    and its value carried back.
//!
//! # The cancellation notification contract
//!
//! If the *last* handle to an [`AsyncResult`] drops without the producer ever having
//! run — the post was cancelled, or its queue tore down — the completion callback
//! fires with `ok == false` and whatever the slot currently holds. That callback is
//! the only observable difference between "ran" and "never ran".

use crate::{HandlerId, Message, PostId, QueueId, Timing, Title,
            posting::{current_thread_queue, post_message, wait_message},
            registry::registry};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// ─────────────────────────────── invoke handlers ───────────────────────────────

/// Installs a fresh handler on `queue` whose callback runs the message's invocable
/// body. Returns [`HandlerId::NULL`] when the queue is unknown.
pub fn install_async_handler(queue: QueueId) -> HandlerId {
    match registry().queue(queue) {
        Some(state) => state.install(
            Arc::new(|_post, message: &mut Message| {
                message.body1.invoke();
            }),
            false,
        ),
        None => HandlerId::NULL,
    }
}

/// The queue's shared async-invoke handler, installed on first use and reused after
/// that. Returns [`HandlerId::NULL`] when the queue is unknown.
#[must_use]
pub fn def_async_invoke_handler(queue: QueueId) -> HandlerId {
    match registry().queue(queue) {
        Some(state) => state.async_invoke_handler(),
        None => HandlerId::NULL,
    }
}

// ─────────────────────────────── fire-and-forget ───────────────────────────────

/// Posts `func` for immediate execution on the handler's owning thread.
pub fn async_invoke(func: impl FnMut() + Send + 'static, handler: HandlerId) -> PostId {
    post_message(handler, Message::from_invocable(Title::NONE, func), Timing::Immediately)
}

/// As [`async_invoke`], with a title for singleton coalescing / title-scoped
/// cancellation.
pub fn async_invoke_titled(
    func: impl FnMut() + Send + 'static,
    title: Title,
    handler: HandlerId,
) -> PostId {
    post_message(handler, Message::from_invocable(title, func), Timing::Immediately)
}

/// Posts `func` to run once, `after_ms` milliseconds from now.
pub fn async_invoke_after(
    after_ms: u64,
    func: impl FnMut() + Send + 'static,
    handler: HandlerId,
) -> PostId {
    post_message(
        handler,
        Message::from_invocable(Title::NONE, func),
        Timing::After { delay_ms: after_ms },
    )
}

/// As [`async_invoke_after`], titled.
pub fn async_invoke_after_titled(
    after_ms: u64,
    func: impl FnMut() + Send + 'static,
    title: Title,
    handler: HandlerId,
) -> PostId {
    post_message(
        handler,
        Message::from_invocable(title, func),
        Timing::After { delay_ms: after_ms },
    )
}

/// Posts `func` to run after `after_ms`, then every `period_ms` until cancelled.
pub fn async_invoke_period(
    after_ms: u64,
    period_ms: u64,
    func: impl FnMut() + Send + 'static,
    handler: HandlerId,
) -> PostId {
    post_message(
        handler,
        Message::from_invocable(Title::NONE, func),
        Timing::Period { after_ms, period_ms },
    )
}

/// As [`async_invoke_period`], titled.
pub fn async_invoke_period_titled(
    after_ms: u64,
    period_ms: u64,
    func: impl FnMut() + Send + 'static,
    title: Title,
    handler: HandlerId,
) -> PostId {
    post_message(
        handler,
        Message::from_invocable(title, func),
        Timing::Period { after_ms, period_ms },
    )
}

// ─────────────────────────────── result carriage ───────────────────────────────

/// Where the produced value lives.
enum ResultSlot<R> {
    /// Self-allocated storage inside the carrier.
    Owned(R),
    /// Caller-provided shared storage, written on invoke.
    Shared(Arc<Mutex<R>>),
}

impl<R> ResultSlot<R> {
    fn with_value<T>(&self, f: impl FnOnce(&R) -> T) -> T {
        match self {
            ResultSlot::Owned(value) => f(value),
            ResultSlot::Shared(slot) => {
                let guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
                f(&guard)
            }
        }
    }

    fn store(&mut self, value: R) {
        match self {
            ResultSlot::Owned(slot) => *slot = value,
            ResultSlot::Shared(slot) => {
                *slot.lock().unwrap_or_else(PoisonError::into_inner) = value;
            }
        }
    }
}

type Producer<R> = Box<dyn FnOnce() -> R + Send>;
type CompletionCallback<R> = Box<dyn FnMut(&R, bool) + Send>;

struct AsyncResultState<R> {
    producer: Option<Producer<R>>,
    slot: ResultSlot<R>,
    callback: Option<CompletionCallback<R>>,
    valid: bool,
}

impl<R> Drop for AsyncResultState<R> {
    fn drop(&mut self) {
        if self.valid {
            return;
        }
        // Cancellation notification: the carrier dies without ever having run.
        let AsyncResultState { slot, callback, .. } = self;
        if let Some(callback) = callback.as_mut() {
            tracing::trace!("async result dropped without running");
            slot.with_value(|value| callback(value, false));
        }
    }
}

/// Shared carrier for returning a value across threads.
///
/// Cloning is shallow; the posted message holds one clone and the waiting caller
/// another. See the [module docs](self) for the cancellation contract.
///
/// The unit case is `AsyncResult<()>`; reference-like results use
/// [`with_slot`](Self::with_slot) with caller-provided shared storage.
#[allow(missing_debug_implementations)]
pub struct AsyncResult<R> {
    state: Arc<Mutex<AsyncResultState<R>>>,
}

impl<R> Clone for AsyncResult<R> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<R: Send + 'static> AsyncResult<R> {
    /// A carrier with self-allocated storage. The slot starts at `R::default()`,
    /// which is also what a cancellation callback observes if the producer never ran.
    pub fn new(producer: impl FnOnce() -> R + Send + 'static) -> Self
    where
        R: Default,
    {
        Self::build(producer, ResultSlot::Owned(R::default()), None)
    }

    /// A carrier with self-allocated storage and a completion callback.
    pub fn with_callback(
        producer: impl FnOnce() -> R + Send + 'static,
        callback: impl FnMut(&R, bool) + Send + 'static,
    ) -> Self
    where
        R: Default,
    {
        Self::build(
            producer,
            ResultSlot::Owned(R::default()),
            Some(Box::new(callback)),
        )
    }

    /// A carrier that writes into caller-provided shared storage.
    pub fn with_slot(
        producer: impl FnOnce() -> R + Send + 'static,
        slot: Arc<Mutex<R>>,
    ) -> Self {
        Self::build(producer, ResultSlot::Shared(slot), None)
    }

    /// A carrier with caller-provided storage and a completion callback.
    pub fn with_slot_and_callback(
        producer: impl FnOnce() -> R + Send + 'static,
        slot: Arc<Mutex<R>>,
        callback: impl FnMut(&R, bool) + Send + 'static,
    ) -> Self {
        Self::build(producer, ResultSlot::Shared(slot), Some(Box::new(callback)))
    }

    fn build(
        producer: impl FnOnce() -> R + Send + 'static,
        slot: ResultSlot<R>,
        callback: Option<CompletionCallback<R>>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(AsyncResultState {
                producer: Some(Box::new(producer)),
                slot,
                callback,
                valid: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AsyncResultState<R>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs the producer (at most once across all clones), stores the result, and
    /// fires the completion callback with `ok == true`. Subsequent calls are no-ops.
    pub fn invoke(&self) {
        let producer = self.lock().producer.take();
        let Some(producer) = producer else {
            return;
        };
        let value = producer();

        let mut state = self.lock();
        state.slot.store(value);
        state.valid = true;
        let AsyncResultState { slot, callback, .. } = &mut *state;
        if let Some(callback) = callback.as_mut() {
            slot.with_value(|value| callback(value, true));
        }
    }

    /// Whether the producer has run and the slot holds its result.
    #[must_use]
    pub fn is_valid(&self) -> bool { self.lock().valid }

    /// Takes the produced value out of a self-allocated slot, leaving
    /// `R::default()`. `None` if the producer never ran, or for shared-slot carriers
    /// (the caller already holds that storage).
    #[must_use]
    pub fn take(&self) -> Option<R>
    where
        R: Default,
    {
        let mut state = self.lock();
        if !state.valid {
            return None;
        }
        match &mut state.slot {
            ResultSlot::Owned(value) => Some(std::mem::take(value)),
            ResultSlot::Shared(_) => None,
        }
    }

    /// Reads the produced value by reference. `None` if the producer never ran.
    pub fn peek<T>(&self, f: impl FnOnce(&R) -> T) -> Option<T> {
        let state = self.lock();
        if !state.valid {
            return None;
        }
        Some(state.slot.with_value(f))
    }
}

/// Posts a carrier's producer for execution on the handler's owning thread.
pub fn async_invoke_result<R: Send + 'static>(
    result: &AsyncResult<R>,
    handler: HandlerId,
) -> PostId {
    let carrier = result.clone();
    async_invoke(move || carrier.invoke(), handler)
}

/// Runs `func` on the handler's owning thread and returns its value.
///
/// On that thread already, `func` runs inline. From any other thread it is posted
/// through an [`AsyncResult`] and waited for. `None` means the closure never ran: the
/// post was refused (unknown handler, queue in teardown) or cancelled.
pub fn wait_invoke<F, R>(func: F, handler: HandlerId) -> Option<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Default + Send + 'static,
{
    if handler.queue.is_valid() && current_thread_queue() == handler.queue {
        return Some(func());
    }
    let result = AsyncResult::new(func);
    let post = async_invoke_result(&result, handler);
    if post.is_null() {
        return None;
    }
    wait_message(post);
    result.take()
}

/// Runs a prepared carrier on the handler's owning thread (inline when already
/// there), waits, and reports whether it produced a value.
pub fn wait_invoke_result<R: Send + 'static>(
    result: &AsyncResult<R>,
    handler: HandlerId,
) -> bool {
    if handler.queue.is_valid() && current_thread_queue() == handler.queue {
        result.invoke();
        return result.is_valid();
    }
    let post = async_invoke_result(result, handler);
    if !post.is_null() {
        wait_message(post);
    }
    result.is_valid()
}
