// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Per-queue state and the scheduler that drives it.
//!
//! A [`QueueState`] is everything one queue owns: the ready list, the timer list, the
//! stack of running frames, the installed handler records, the break flag, and the
//! [`WakeCondition`] its owner thread parks on. All of it lives behind one mutex
//! ([`QueueInner`]); a separate condvar releases threads blocked in
//! [`wait_message`](crate::wait_message) and handler uninstall.
//!
//! # Scheduler pass
//!
//! [`QueueState::run_pass`] is one iteration of the owner thread's loop:
//!
//! ```text
//! lock ──► promote due timers ──► pop ready head ──► publish running frame
//!   │                │                                      │
//!   │          (ready empty?)                          unlock, invoke
//!   │                │                                      │
//!   │          park on WakeCondition                  relock, re-arm periodic,
//!   └────────────────┘                                release waiters
//! ```
//!
//! The lock is **never** held across a handler callback. Cancellation observed before
//! dispatch removes the entry; cancellation observed during dispatch flags the running
//! frame so a periodic entry is not re-armed.
//!
//! # Completion tokens
//!
//! Every entry carries a shared tri-state token ([`Completion`]). Waiters clone the
//! token under the queue lock and then sleep until it leaves
//! [`CompletionState::Pending`] — so "did my post run, or was it cancelled?" has one
//! race-free answer even after the entry itself is gone. Dropping an entry that never
//! ran marks its token cancelled.
//!
//! # Re-entrancy
//!
//! The running descriptor is a *stack*: when the owner thread waits on its own post,
//! the wait drains the queue inline, pushing a nested frame while the outer callback
//! is suspended. Exactly one callback executes at any instant; the published "running"
//! id is the top frame.

use crate::{HandlerId, Message, PostId, QueueId, Timing, Title,
            clock::{self, MAX_WAIT_MS},
            wake_condition::{ParkGuard, WakeCondition}};
use smallvec::SmallVec;
use std::{collections::VecDeque,
          sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError,
                 atomic::{AtomicU8, Ordering}},
          thread::{self, ThreadId},
          time::Duration};

/// A handler callback. Invoked only on the queue's owning thread, one at a time.
pub type HandlerFn = Arc<dyn Fn(PostId, &mut Message) + Send + Sync + 'static>;

/// Tri-state outcome of one posted entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompletionState {
    /// Not yet dispatched (pending in a list, or mid-callback).
    Pending,
    /// The callback ran to completion (for periodic entries: this iteration did).
    Finished,
    /// Removed before dispatch.
    Cancelled,
}

const COMPLETION_PENDING: u8 = 0;
const COMPLETION_FINISHED: u8 = 1;
const COMPLETION_CANCELLED: u8 = 2;

/// Shared completion token. Waiters hold a clone and sleep until it settles.
#[derive(Debug)]
pub(crate) struct Completion(AtomicU8);

impl Completion {
    pub(crate) fn new() -> Self { Self(AtomicU8::new(COMPLETION_PENDING)) }

    pub(crate) fn state(&self) -> CompletionState {
        match self.0.load(Ordering::SeqCst) {
            COMPLETION_FINISHED => CompletionState::Finished,
            COMPLETION_CANCELLED => CompletionState::Cancelled,
            _ => CompletionState::Pending,
        }
    }

    /// Pending → Finished. A token that already settled stays settled.
    fn finish(&self) {
        drop(self.0.compare_exchange(
            COMPLETION_PENDING,
            COMPLETION_FINISHED,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ));
    }

    /// Pending → Cancelled. A token that already settled stays settled.
    fn cancel_if_pending(&self) {
        drop(self.0.compare_exchange(
            COMPLETION_PENDING,
            COMPLETION_CANCELLED,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ));
    }
}

/// An installed handler.
pub(crate) struct HandlerRecord {
    pub(crate) id: HandlerId,
    pub(crate) callback: HandlerFn,
    pub(crate) recv_broadcast: bool,
}

/// One queued message, in either the ready list or the timer list.
pub(crate) struct MessageEntry {
    pub(crate) post_id: PostId,
    pub(crate) handler: HandlerId,
    pub(crate) message: Message,
    pub(crate) timing: Timing,
    /// Absolute due time on the [`clock`] timeline.
    pub(crate) due_ms: u64,
    /// This entry fans out to every broadcast-subscribed handler.
    pub(crate) recv_broadcast: bool,
    /// Posted through the singleton/coalescing path.
    pub(crate) singleton: bool,
    /// Excluded from idleness checks (periodic entries; they never drain).
    pub(crate) anti_idle: bool,
    pub(crate) completion: Arc<Completion>,
}

impl Drop for MessageEntry {
    fn drop(&mut self) {
        // An entry discarded before dispatch releases its waiters as "cancelled".
        self.completion.cancel_if_pending();
    }
}

/// One level of the running stack. The top frame is the published running entry.
#[derive(Debug)]
struct RunningFrame {
    post_id: PostId,
    handler: HandlerId,
    /// Set by [`QueueState::cancel_post`] while the callback is mid-flight;
    /// suppresses periodic re-arm.
    cancelled: bool,
    completion: Arc<Completion>,
}

/// Everything guarded by the queue lock.
pub(crate) struct QueueInner {
    /// Dispatchable now, in dispatch order. `FasterMessage` pushes the front.
    ready: VecDeque<MessageEntry>,
    /// Pending timed entries, ascending `(due_ms, insertion order)`.
    timers: Vec<MessageEntry>,
    /// Stack of running frames; non-empty while a callback executes.
    running: Vec<RunningFrame>,
    /// Once set, posting is refused and the run loop exits after draining ready work.
    break_requested: bool,
    /// Installed handlers, in install order (broadcast fan-out order).
    handlers: Vec<HandlerRecord>,
    /// Lazily-installed async-invoke handler for this queue.
    async_handler: Option<HandlerId>,
    next_handler_seq: u32,
    next_post_seq: u32,
}

impl QueueInner {
    /// `seq == 0` is never handed out.
    fn alloc_handler_seq(&mut self) -> u32 {
        let seq = self.next_handler_seq;
        self.next_handler_seq = match self.next_handler_seq.wrapping_add(1) {
            0 => 1,
            next => next,
        };
        seq
    }

    /// `seq == 0` is never handed out.
    fn alloc_post_seq(&mut self) -> u32 {
        let seq = self.next_post_seq;
        self.next_post_seq = match self.next_post_seq.wrapping_add(1) {
            0 => 1,
            next => next,
        };
        seq
    }
}

/// How an immediate entry joins the ready list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubmitMode {
    /// Appended at the tail.
    Normal,
    /// Inserted at the head, ahead of already-queued immediates (never ahead of the
    /// running callback, and never reordering the timer list).
    Faster,
}

/// Outcome of one scheduler pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PassOutcome {
    /// One entry was dispatched.
    Dispatched,
    /// Nothing was due; the thread parked and woke (possibly spuriously).
    Parked,
    /// The break flag is set and the ready list is drained; the loop should exit.
    Break,
}

/// Which running frames [`QueueState::wait_running_end`] waits out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunningFilter {
    Any,
    Handler(HandlerId),
    Post(PostId),
}

impl RunningFilter {
    fn matches(&self, frame: &RunningFrame) -> bool {
        match self {
            RunningFilter::Any => true,
            RunningFilter::Handler(handler) => frame.handler == *handler,
            RunningFilter::Post(post) => frame.post_id == *post,
        }
    }
}

/// Clears the running frame and releases waiters if a handler callback panics, so the
/// queue survives with consistent lock state.
struct DispatchGuard<'q> {
    queue: &'q QueueState,
    completion: Arc<Completion>,
    armed: bool,
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.completion.cancel_if_pending();
        let mut inner = self.queue.lock();
        drop(inner.running.pop());
        drop(inner);
        self.queue.finish_cv.notify_all();
    }
}

/// One message queue: id, owning thread, guarded state, and parking primitives.
#[allow(missing_debug_implementations)]
pub struct QueueState {
    id: QueueId,
    owner: ThreadId,
    inner: Mutex<QueueInner>,
    cond: Arc<dyn WakeCondition>,
    /// Releases threads blocked on entry completion (wait/uninstall paths).
    finish_cv: Condvar,
}

impl QueueState {
    pub(crate) fn new(id: QueueId, owner: ThreadId, cond: Arc<dyn WakeCondition>) -> Self {
        Self {
            id,
            owner,
            inner: Mutex::new(QueueInner {
                ready: VecDeque::new(),
                timers: Vec::new(),
                running: Vec::new(),
                break_requested: false,
                handlers: Vec::new(),
                async_handler: None,
                next_handler_seq: 1,
                next_post_seq: 1,
            }),
            cond,
            finish_cv: Condvar::new(),
        }
    }

    pub(crate) fn id(&self) -> QueueId { self.id }

    pub(crate) fn owner_thread(&self) -> ThreadId { self.owner }

    pub(crate) fn wake_condition(&self) -> Arc<dyn WakeCondition> { Arc::clone(&self.cond) }

    /// Acquires the queue lock, recovering from poisoning. Dispatch bookkeeping is
    /// protected by [`DispatchGuard`], so the state behind a poisoned lock is intact.
    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_finish<'q>(&self, guard: MutexGuard<'q, QueueInner>) -> MutexGuard<'q, QueueInner> {
        self.finish_cv
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Wakes the owner thread, consuming the lock guard.
    fn notify_owner(&self, inner: MutexGuard<'_, QueueInner>) {
        let mut park = ParkGuard(inner);
        self.cond.notify(&mut park);
        drop(park);
    }

    // ─────────────────────────────── handlers ───────────────────────────────

    pub(crate) fn install(&self, callback: HandlerFn, recv_broadcast: bool) -> HandlerId {
        let mut inner = self.lock();
        let seq = inner.alloc_handler_seq();
        let id = HandlerId { queue: self.id, seq };
        inner.handlers.push(HandlerRecord {
            id,
            callback,
            recv_broadcast,
        });
        drop(inner);
        tracing::debug!(queue = self.id.0, handler = seq, recv_broadcast, "handler installed");
        id
    }

    /// Discards every pending entry for `handler`, blocks until a mid-flight callback
    /// for it returns (unless called from the owning thread), then removes the record.
    pub(crate) fn uninstall(&self, handler: HandlerId) {
        let mut inner = self.lock();
        let recv_broadcast = match inner.handlers.iter().find(|record| record.id == handler) {
            Some(record) => record.recv_broadcast,
            None => return,
        };

        let removed = Self::extract_entries(&mut inner, |entry| entry.handler == handler);

        // A broadcast dispatch runs this handler's callback under the broadcast
        // pseudo-handler's frame, so that counts as "running" too.
        if thread::current().id() != self.owner {
            while inner.running.iter().any(|frame| {
                frame.handler == handler
                    || (frame.handler.is_broadcast() && recv_broadcast)
            }) {
                inner = self.wait_finish(inner);
            }
        }

        let record = inner
            .handlers
            .iter()
            .position(|record| record.id == handler)
            .map(|index| inner.handlers.remove(index));
        if inner.async_handler == Some(handler) {
            inner.async_handler = None;
        }
        drop(inner);

        // User payload / captured-state drops run outside the lock.
        drop(removed);
        drop(record);
        self.finish_cv.notify_all();
        tracing::debug!(queue = self.id.0, handler = handler.seq, "handler uninstalled");
    }

    /// The per-queue async-invoke handler, installed on first use. Its callback runs
    /// the message's first body slot.
    pub(crate) fn async_invoke_handler(&self) -> HandlerId {
        let mut inner = self.lock();
        if let Some(handler) = inner.async_handler {
            return handler;
        }
        let seq = inner.alloc_handler_seq();
        let id = HandlerId { queue: self.id, seq };
        inner.handlers.push(HandlerRecord {
            id,
            callback: Arc::new(|_post, message: &mut Message| {
                message.body1.invoke();
            }),
            recv_broadcast: false,
        });
        inner.async_handler = Some(id);
        id
    }

    // ─────────────────────────────── posting ───────────────────────────────

    /// Enqueues a message for `handler`. Returns the null post when the queue is in
    /// teardown or the handler is unknown.
    pub(crate) fn submit(
        &self,
        handler: HandlerId,
        message: Message,
        timing: Timing,
        mode: SubmitMode,
    ) -> PostId {
        let mut inner = self.lock();
        if !self.accepts(&inner, handler) {
            drop(inner);
            // `message` (and any user drop hooks in it) drops after the lock.
            return PostId::NULL;
        }
        let post = Self::submit_locked(&mut inner, handler, message, timing, mode, false);
        self.notify_owner(inner);
        post
    }

    /// Coalesces against a pending entry with the same `(handler, title)`: returns the
    /// existing post when `replace` is false, replaces it when `replace` is true.
    pub(crate) fn submit_singleton(
        &self,
        replace: bool,
        handler: HandlerId,
        message: Message,
        timing: Timing,
    ) -> PostId {
        let mut inner = self.lock();
        if !self.accepts(&inner, handler) {
            drop(inner);
            return PostId::NULL;
        }
        let title = message.title;

        let existing = inner
            .ready
            .iter()
            .chain(inner.timers.iter())
            .find(|entry| entry.handler == handler && entry.message.title == title)
            .map(|entry| entry.post_id);

        let mut replaced = Vec::new();
        if let Some(existing_post) = existing {
            if !replace {
                return existing_post;
            }
            replaced = Self::extract_entries(&mut inner, |entry| entry.post_id == existing_post);
        }

        let post =
            Self::submit_locked(&mut inner, handler, message, timing, SubmitMode::Normal, true);
        self.notify_owner(inner);

        if !replaced.is_empty() {
            tracing::trace!(
                queue = self.id.0,
                replaced = replaced.len(),
                with = post.seq,
                "singleton replaced"
            );
            drop(replaced);
            self.finish_cv.notify_all();
        }
        post
    }

    /// Whether a post for `handler` may enter the queue right now. Refusals are the
    /// two returned error modes: queue in teardown, unknown handler.
    fn accepts(&self, inner: &QueueInner, handler: HandlerId) -> bool {
        if inner.break_requested {
            tracing::trace!(queue = self.id.0, "post refused: queue shutting down");
            return false;
        }
        if !handler.is_broadcast()
            && !inner.handlers.iter().any(|record| record.id == handler)
        {
            tracing::debug!(
                queue = self.id.0,
                handler = handler.seq,
                "post refused: unknown handler"
            );
            return false;
        }
        true
    }

    fn submit_locked(
        inner: &mut QueueInner,
        handler: HandlerId,
        message: Message,
        timing: Timing,
        mode: SubmitMode,
        singleton: bool,
    ) -> PostId {
        let seq = inner.alloc_post_seq();
        let post_id = PostId { handler, seq };
        let now = clock::now_ms();
        let entry = MessageEntry {
            post_id,
            handler,
            message,
            timing,
            due_ms: now.saturating_add(timing.initial_delay_ms()),
            recv_broadcast: handler.is_broadcast(),
            singleton,
            anti_idle: matches!(timing, Timing::Period { .. }),
            completion: Arc::new(Completion::new()),
        };

        match timing {
            Timing::Immediately => match mode {
                SubmitMode::Normal => inner.ready.push_back(entry),
                SubmitMode::Faster => inner.ready.push_front(entry),
            },
            // `After(0)` included: it takes the timer path and is promoted at the
            // next scheduler pass.
            Timing::After { .. } | Timing::Period { .. } => {
                Self::insert_timer(inner, entry);
            }
        }
        post_id
    }

    // ─────────────────────────────── cancellation ───────────────────────────────

    /// Cancels one post. Removes it if still pending; flags it if mid-callback (which
    /// suppresses periodic re-arm). Idempotent: the second call returns `false`.
    pub(crate) fn cancel_post(&self, post: PostId) -> bool {
        let mut inner = self.lock();

        let removed = Self::extract_entries(&mut inner, |entry| entry.post_id == post);
        if !removed.is_empty() {
            self.notify_owner(inner);
            drop(removed);
            self.finish_cv.notify_all();
            tracing::trace!(queue = self.id.0, post = post.seq, "post cancelled before run");
            return true;
        }

        if let Some(frame) = inner
            .running
            .iter_mut()
            .rev()
            .find(|frame| frame.post_id == post)
        {
            if frame.cancelled {
                return false;
            }
            frame.cancelled = true;
            tracing::trace!(queue = self.id.0, post = post.seq, "post cancelled during run");
            return true;
        }

        false
    }

    /// Removes every pending entry targeting `handler`, optionally restricted by
    /// title equality.
    pub(crate) fn cancel_for_handler(&self, handler: HandlerId, title: Option<Title>) {
        let mut inner = self.lock();
        let removed = Self::extract_entries(&mut inner, |entry| {
            entry.handler == handler
                && title.is_none_or(|title| entry.message.title == title)
        });
        if removed.is_empty() {
            return;
        }
        self.notify_owner(inner);
        let count = removed.len();
        drop(removed);
        self.finish_cv.notify_all();
        tracing::trace!(queue = self.id.0, handler = handler.seq, count, "posts cancelled");
    }

    /// Removes matching entries from both lists and returns them, so callers can drop
    /// them (and run user payload drop hooks) outside the lock.
    fn extract_entries(
        inner: &mut QueueInner,
        mut matches: impl FnMut(&MessageEntry) -> bool,
    ) -> Vec<MessageEntry> {
        let mut removed = Vec::new();
        let mut index = 0;
        while index < inner.ready.len() {
            if matches(&inner.ready[index]) {
                if let Some(entry) = inner.ready.remove(index) {
                    removed.push(entry);
                }
            } else {
                index += 1;
            }
        }
        let mut index = 0;
        while index < inner.timers.len() {
            if matches(&inner.timers[index]) {
                removed.push(inner.timers.remove(index));
            } else {
                index += 1;
            }
        }
        removed
    }

    // ─────────────────────────────── queries ───────────────────────────────

    /// Whether the post is still pending or mid-callback.
    pub(crate) fn found(&self, post: PostId) -> bool {
        let inner = self.lock();
        inner.ready.iter().any(|entry| entry.post_id == post)
            || inner.timers.iter().any(|entry| entry.post_id == post)
            || inner.running.iter().any(|frame| frame.post_id == post)
    }

    /// The published id of the currently-running entry (the top frame), or the null
    /// post when the queue is between dispatches.
    pub(crate) fn running_post_id(&self) -> PostId {
        let inner = self.lock();
        inner
            .running
            .last()
            .map_or(PostId::NULL, |frame| frame.post_id)
    }

    /// No ready work, no running callback, and no pending timers other than anti-idle
    /// (periodic) entries.
    pub(crate) fn is_idle_ignoring_anti_idle(&self) -> bool {
        let inner = self.lock();
        inner.ready.is_empty()
            && inner.running.is_empty()
            && inner.timers.iter().all(|entry| entry.anti_idle)
    }

    // ─────────────────────────────── waiting ───────────────────────────────

    /// Blocks until `post` finishes dispatch. Returns `true` iff its callback ran
    /// (for periodic entries: the iteration pending at call time).
    ///
    /// Unknown posts return `false` immediately. When called from the owning thread,
    /// the queue is drained inline until the post completes, honoring the break flag
    /// — a queue owner waiting on its own post cannot deadlock.
    pub(crate) fn wait_post(&self, post: PostId) -> bool {
        let mut inner = self.lock();
        let Some(completion) = Self::find_completion(&inner, post) else {
            return false;
        };

        if thread::current().id() == self.owner {
            drop(inner);
            // Re-entrant drain: dispatch this queue inline until the awaited entry
            // settles.
            while completion.state() == CompletionState::Pending {
                if self.run_pass() == PassOutcome::Break {
                    self.drain_on_break();
                    break;
                }
            }
        } else {
            while completion.state() == CompletionState::Pending {
                inner = self.wait_finish(inner);
            }
            drop(inner);
        }

        completion.state() == CompletionState::Finished
    }

    /// Blocks the caller until no running frame matches `filter`. A no-op from the
    /// owning thread (any matching frame is the caller's own stack).
    pub(crate) fn wait_running_end(&self, filter: RunningFilter) {
        if thread::current().id() == self.owner {
            return;
        }
        let mut inner = self.lock();
        while inner.running.iter().any(|frame| filter.matches(frame)) {
            inner = self.wait_finish(inner);
        }
    }

    fn find_completion(inner: &QueueInner, post: PostId) -> Option<Arc<Completion>> {
        inner
            .running
            .iter()
            .rev()
            .find(|frame| frame.post_id == post)
            .map(|frame| Arc::clone(&frame.completion))
            .or_else(|| {
                inner
                    .ready
                    .iter()
                    .chain(inner.timers.iter())
                    .find(|entry| entry.post_id == post)
                    .map(|entry| Arc::clone(&entry.completion))
            })
    }

    // ─────────────────────────────── run loop body ───────────────────────────────

    /// Sets the break flag and wakes the owner. In-flight callbacks still complete;
    /// new posts are refused from this point on.
    pub(crate) fn request_break(&self) {
        let mut inner = self.lock();
        inner.break_requested = true;
        tracing::debug!(queue = self.id.0, "break requested");
        self.notify_owner(inner);
    }

    /// One scheduler pass. See the module docs for the shape.
    pub(crate) fn run_pass(&self) -> PassOutcome {
        let mut inner = self.lock();
        let now = clock::now_ms();
        Self::promote_due(&mut inner, now);

        if inner.break_requested && inner.ready.is_empty() {
            return PassOutcome::Break;
        }

        let Some(mut entry) = inner.ready.pop_front() else {
            let wait_ms = Self::next_wait_ms(&inner, now);
            let parked = self
                .cond
                .wait(ParkGuard(inner), Duration::from_millis(wait_ms));
            drop(parked);
            return PassOutcome::Parked;
        };

        let callbacks = Self::callbacks_for(&inner, &entry);
        inner.running.push(RunningFrame {
            post_id: entry.post_id,
            handler: entry.handler,
            cancelled: false,
            completion: Arc::clone(&entry.completion),
        });
        drop(inner);

        tracing::trace!(
            queue = self.id.0,
            post = entry.post_id.seq,
            singleton = entry.singleton,
            fan_out = callbacks.len(),
            "dispatch"
        );

        let mut guard = DispatchGuard {
            queue: self,
            completion: Arc::clone(&entry.completion),
            armed: true,
        };
        for callback in &callbacks {
            callback(entry.post_id, &mut entry.message);
        }
        guard.armed = false;
        drop(guard);

        let mut inner = self.lock();
        let frame_cancelled = inner.running.pop().is_some_and(|frame| frame.cancelled);
        entry.completion.finish();

        let mut rearm_period = entry.timing.period_ms();
        if frame_cancelled
            || inner.break_requested
            || !Self::handler_installed(&inner, &entry)
        {
            rearm_period = None;
        }

        let leftover = match rearm_period {
            Some(period_ms) => {
                entry.completion = Arc::new(Completion::new());
                entry.due_ms = clock::now_ms().saturating_add(period_ms);
                Self::insert_timer(&mut inner, entry);
                None
            }
            None => Some(entry),
        };
        drop(inner);

        self.finish_cv.notify_all();
        // Consumed entry (and its payload drop hooks) dropped outside the lock.
        drop(leftover);
        PassOutcome::Dispatched
    }

    /// Discards remaining timed entries after a break, releasing their waiters and
    /// firing their payload drop hooks. The ready list is already drained when the
    /// loop observes the break.
    pub(crate) fn drain_on_break(&self) {
        let mut inner = self.lock();
        let dropped = {
            let QueueInner { ready, timers, .. } = &mut *inner;
            ready.drain(..).chain(timers.drain(..)).collect::<Vec<_>>()
        };
        drop(inner);
        if !dropped.is_empty() {
            tracing::debug!(
                queue = self.id.0,
                count = dropped.len(),
                "pending posts dropped in teardown"
            );
        }
        drop(dropped);
        self.finish_cv.notify_all();
    }

    /// Moves every due timer entry to the ready tail, preserving `(due, insertion)`
    /// order.
    fn promote_due(inner: &mut QueueInner, now: u64) {
        let due = inner.timers.partition_point(|entry| entry.due_ms <= now);
        let QueueInner { ready, timers, .. } = inner;
        for entry in timers.drain(..due) {
            ready.push_back(entry);
        }
    }

    /// Stable insertion by ascending due time; equal due times keep insertion order.
    fn insert_timer(inner: &mut QueueInner, entry: MessageEntry) {
        let index = inner
            .timers
            .partition_point(|pending| pending.due_ms <= entry.due_ms);
        inner.timers.insert(index, entry);
    }

    fn next_wait_ms(inner: &QueueInner, now: u64) -> u64 {
        inner
            .timers
            .first()
            .map_or(MAX_WAIT_MS, |entry| entry.due_ms.saturating_sub(now))
            .min(MAX_WAIT_MS)
    }

    /// The callbacks one entry dispatches to: the single matching record, or every
    /// broadcast subscriber in install order.
    fn callbacks_for(inner: &QueueInner, entry: &MessageEntry) -> SmallVec<[HandlerFn; 4]> {
        if entry.recv_broadcast {
            inner
                .handlers
                .iter()
                .filter(|record| record.recv_broadcast)
                .map(|record| Arc::clone(&record.callback))
                .collect()
        } else {
            inner
                .handlers
                .iter()
                .find(|record| record.id == entry.handler)
                .map(|record| Arc::clone(&record.callback))
                .into_iter()
                .collect()
        }
    }

    fn handler_installed(inner: &QueueInner, entry: &MessageEntry) -> bool {
        entry.recv_broadcast
            || inner
                .handlers
                .iter()
                .any(|record| record.id == entry.handler)
    }
}
