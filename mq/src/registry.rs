// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Process-wide queue registry.
//!
//! One static, lazily-initialized singleton maps live queues to their owning threads
//! and back, and keeps the [`JoinHandle`]s of spawned owner threads so queue release
//! can join them. The registry lock is only ever taken to resolve or mutate these
//! mappings — never across a handler callback, and never while a queue's own lock is
//! held (lock order is always Registry → `QueueState`).
//!
//! The singleton is a [`OnceLock`] because the map types allocate and therefore cannot
//! be built in a `const` initializer; the payload is created on first use and lives
//! for the remainder of the process.

use crate::{QueueId,
            creater::MessageQueueCreater,
            queue_state::QueueState,
            wake_condition::{CondvarWake, WakeCondition}};
use rustc_hash::FxHashMap;
use std::{sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError},
          thread::{self, JoinHandle, ThreadId}};

static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// The process-wide registry singleton.
pub(crate) fn registry() -> &'static Registry { REGISTRY.get_or_init(Registry::new) }

struct RegistryInner {
    queues: FxHashMap<QueueId, Arc<QueueState>>,
    by_thread: FxHashMap<ThreadId, QueueId>,
    /// Owner threads spawned by [`MessageQueueCreater`], joined on release.
    joiners: FxHashMap<QueueId, JoinHandle<()>>,
    next_queue_id: u64,
}

/// Process-wide mapping of queue-id ↔ owning thread-id, plus spawned-thread joiners.
pub(crate) struct Registry {
    inner: Mutex<RegistryInner>,
}

impl Registry {
    fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                queues: FxHashMap::default(),
                by_thread: FxHashMap::default(),
                joiners: FxHashMap::default(),
                // QueueId 0 is reserved invalid.
                next_queue_id: 1,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Idempotently associates the calling OS thread with a queue. Repeated calls from
    /// the same thread return the same queue.
    pub(crate) fn bind_current_thread(&self) -> Arc<QueueState> {
        self.bind_current_thread_with(Arc::new(CondvarWake::new()))
    }

    /// As [`bind_current_thread`](Self::bind_current_thread), parking on the supplied
    /// wake condition. The condition only takes effect when this call creates the
    /// binding.
    pub(crate) fn bind_current_thread_with(
        &self,
        cond: Arc<dyn WakeCondition>,
    ) -> Arc<QueueState> {
        let thread_id = thread::current().id();
        let mut inner = self.lock();
        if let Some(existing) = inner.by_thread.get(&thread_id) {
            if let Some(state) = inner.queues.get(existing) {
                return Arc::clone(state);
            }
        }
        let id = QueueId(inner.next_queue_id);
        inner.next_queue_id += 1;
        let state = Arc::new(QueueState::new(id, thread_id, cond));
        inner.queues.insert(id, Arc::clone(&state));
        inner.by_thread.insert(thread_id, id);
        drop(inner);
        tracing::debug!(queue = id.0, "queue bound to current thread");
        state
    }

    pub(crate) fn queue(&self, id: QueueId) -> Option<Arc<QueueState>> {
        self.lock().queues.get(&id).map(Arc::clone)
    }

    /// The queue bound to `thread_id`, or [`QueueId::INVALID`].
    pub(crate) fn queue_of_thread(&self, thread_id: ThreadId) -> QueueId {
        self.lock()
            .by_thread
            .get(&thread_id)
            .copied()
            .unwrap_or(QueueId::INVALID)
    }

    pub(crate) fn thread_of_queue(&self, id: QueueId) -> Option<ThreadId> {
        self.lock().queues.get(&id).map(|state| state.owner_thread())
    }

    pub(crate) fn attach_joiner(&self, id: QueueId, handle: JoinHandle<()>) {
        self.lock().joiners.insert(id, handle);
    }

    pub(crate) fn take_joiner(&self, id: QueueId) -> Option<JoinHandle<()>> {
        self.lock().joiners.remove(&id)
    }

    /// Removes a queue from all mappings. The state (and any pending entries in it)
    /// drops when the last outstanding reference goes away.
    pub(crate) fn unregister(&self, id: QueueId) -> Option<Arc<QueueState>> {
        let mut inner = self.lock();
        let state = inner.queues.remove(&id);
        if let Some(state) = &state {
            let thread_id = state.owner_thread();
            // The thread may have re-bound to a fresh queue already; only drop the
            // mapping if it still points at us.
            if inner.by_thread.get(&thread_id) == Some(&id) {
                inner.by_thread.remove(&thread_id);
            }
        }
        drop(inner.joiners.remove(&id));
        drop(inner);
        if state.is_some() {
            tracing::debug!(queue = id.0, "queue unregistered");
        }
        state
    }
}

// ─────────────────────────────── default queues ───────────────────────────────

static DEF_MESSAGE_QUEUE: OnceLock<QueueId> = OnceLock::new();
static DEF_TASK_QUEUE: OnceLock<QueueId> = OnceLock::new();

/// The process-wide default message queue, spawned on first use. Collaborators post
/// interactive work here.
#[must_use]
pub fn get_def_message_queue() -> QueueId {
    *DEF_MESSAGE_QUEUE
        .get_or_init(|| MessageQueueCreater::create_new_message_queue("def-message"))
}

/// The process-wide default task queue, spawned on first use. Collaborators post
/// long-running work here so the default message queue stays responsive.
#[must_use]
pub fn get_def_task_queue() -> QueueId {
    *DEF_TASK_QUEUE.get_or_init(|| MessageQueueCreater::create_new_message_queue("def-task"))
}
