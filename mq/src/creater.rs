// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Queue lifecycle helper: adopt the current thread, or spawn a dedicated owner.
//!
//! [`MessageQueueCreater`] either hands out the calling thread's own queue (via
//! [`bind_current_thread`](crate::bind_current_thread)) or spawns a new thread whose
//! body is the [`RunLoop`], and later tears it down. Teardown is *blocking*: the owner
//! is told to break, woken, joined, and only then is the queue unregistered — so when
//! [`cancel_and_wait`](MessageQueueCreater::cancel_and_wait) returns, no callback for
//! that queue will ever run again.
//!
//! # Spawn handshake
//!
//! A queue id only exists once the owner thread has bound itself, so the spawned
//! thread reports its id back over a one-shot channel before entering its loop:
//!
//! ```text
//! creator                         owner thread
//!    │  spawn ───────────────────►│
//!    │                            │ bind_current_thread_with(cond)
//!    │◄─────────── send(queue_id) │
//!    │  attach join handle        │ RunLoop::run()   (parks, dispatches…)
//! ```

use crate::{QueueId,
            registry::registry,
            run_loop::RunLoop,
            wake_condition::{CondvarWake, WakeCondition}};
use std::{sync::{Arc, Mutex, PoisonError, mpsc},
          thread};

/// Failure to bring up a queue owner thread.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum SpawnError {
    /// The OS refused to create the thread.
    #[error("Failed to spawn queue owner thread")]
    #[diagnostic(
        code(r3bl_mq::creater::thread_spawn),
        help("Check system thread limits (e.g. `ulimit -u` on Linux).")
    )]
    ThreadSpawn(#[source] std::io::Error),

    /// The owner thread died before reporting its queue id.
    #[error("Queue owner thread exited before reporting its queue id")]
    #[diagnostic(code(r3bl_mq::creater::handshake))]
    Handshake,
}

/// Creates and releases queues with dedicated owner threads.
///
/// The name is carried into the owner thread's name (`mq-<name>`), which is what
/// shows up in debuggers and thread listings.
#[allow(missing_debug_implementations)]
pub struct MessageQueueCreater {
    name: String,
    cond: Arc<dyn WakeCondition>,
    queue_id: Mutex<QueueId>,
}

impl MessageQueueCreater {
    /// A creater whose queue parks on the default condvar wake condition.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self::with_condition(Arc::new(CondvarWake::new()), name)
    }

    /// A creater whose queue parks on an embedder-supplied [`WakeCondition`].
    #[must_use]
    pub fn with_condition(cond: Arc<dyn WakeCondition>, name: &str) -> Self {
        Self {
            name: name.to_string(),
            cond,
            queue_id: Mutex::new(QueueId::INVALID),
        }
    }

    /// The queue created by this creater, or [`QueueId::INVALID`] before
    /// [`create`](Self::create) / after [`cancel_and_wait`](Self::cancel_and_wait).
    #[must_use]
    pub fn get(&self) -> QueueId {
        *self.queue_id.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns the owner thread and returns its queue id. Idempotent: once created,
    /// the same id is returned. On spawn failure the error is logged and
    /// [`QueueId::INVALID`] is returned (posting to it yields the null post).
    pub fn create(&self) -> QueueId {
        self.try_create().unwrap_or_else(|error| {
            tracing::error!(name = %self.name, %error, "queue creation failed");
            QueueId::INVALID
        })
    }

    /// Spawns the owner thread and returns its queue id, or the spawn failure.
    ///
    /// # Errors
    ///
    /// [`SpawnError::ThreadSpawn`] when the OS refuses the thread;
    /// [`SpawnError::Handshake`] when the owner dies before reporting its id.
    pub fn try_create(&self) -> Result<QueueId, SpawnError> {
        let mut held = self.queue_id.lock().unwrap_or_else(PoisonError::into_inner);
        if held.is_valid() {
            return Ok(*held);
        }
        let queue = spawn_queue_thread(&self.name, Arc::clone(&self.cond))?;
        *held = queue;
        Ok(queue)
    }

    /// Tears the queue down: break, wake, join the owner thread, unregister. Blocking;
    /// after it returns no callback for this queue will run again. A no-op when
    /// nothing was created.
    pub fn cancel_and_wait(&self) {
        let queue = {
            let mut held = self.queue_id.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *held, QueueId::INVALID)
        };
        if queue.is_valid() {
            release_queue(queue);
        }
    }

    /// Spawns a standalone queue with a dedicated owner thread. Release it with
    /// [`release_new_message_queue`](Self::release_new_message_queue). Returns
    /// [`QueueId::INVALID`] on spawn failure (logged).
    #[must_use]
    pub fn create_new_message_queue(name: &str) -> QueueId {
        Self::create_new_with_condition(Arc::new(CondvarWake::new()), name)
    }

    /// As [`create_new_message_queue`](Self::create_new_message_queue), parking the
    /// owner on `cond`.
    #[must_use]
    pub fn create_new_with_condition(cond: Arc<dyn WakeCondition>, name: &str) -> QueueId {
        spawn_queue_thread(name, cond).unwrap_or_else(|error| {
            tracing::error!(name, %error, "queue creation failed");
            QueueId::INVALID
        })
    }

    /// Blocking release of a queue created with
    /// [`create_new_message_queue`](Self::create_new_message_queue).
    pub fn release_new_message_queue(queue: QueueId) { release_queue(queue); }
}

impl Drop for MessageQueueCreater {
    fn drop(&mut self) { self.cancel_and_wait(); }
}

fn spawn_queue_thread(
    name: &str,
    cond: Arc<dyn WakeCondition>,
) -> Result<QueueId, SpawnError> {
    let (sender, receiver) = mpsc::channel();
    let handle = thread::Builder::new()
        .name(format!("mq-{name}"))
        .spawn(move || {
            let state = registry().bind_current_thread_with(cond);
            drop(sender.send(state.id()));
            RunLoop::new().run();
        })
        .map_err(SpawnError::ThreadSpawn)?;

    let queue = receiver.recv().map_err(|_| SpawnError::Handshake)?;
    registry().attach_joiner(queue, handle);
    tracing::debug!(queue = queue.0, name, "queue owner thread spawned");
    Ok(queue)
}

/// Break + wake + join + unregister. Safe to call from any thread, including the
/// queue's own owner (the join is skipped there; the loop exits on its own).
fn release_queue(queue: QueueId) {
    let Some(state) = registry().queue(queue) else {
        return;
    };
    state.request_break();
    if let Some(handle) = registry().take_joiner(queue) {
        if thread::current().id() != state.owner_thread() {
            drop(handle.join());
        }
    }
    registry().unregister(queue);
    tracing::debug!(queue = queue.0, "queue released");
}
