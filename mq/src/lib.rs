// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words condvar runloop coalescing

//! Thread-affine message queues with run loops.
//!
//! Each message queue is pinned to exactly one owner thread. Handlers are installed on
//! a queue; messages — plain payloads or invocable closures — are posted to a handler
//! with immediate, delayed, or periodic timing, from any thread. The owner thread
//! parks on a pluggable [`WakeCondition`], wakes when work arrives or comes due, and
//! dispatches callbacks one at a time in strict per-queue FIFO order.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │ any thread                                                           │
//! │   post_message / singleton_message / broadcast_message / …           │
//! │        │                                                             │
//! │        ▼                                                             │
//! │   Registry (process-wide)  ── QueueId ──►  QueueState                │
//! │                                            ├── ready list   (FIFO)   │
//! │                                            ├── timer list   (by due) │
//! │                                            ├── running frame stack   │
//! │                                            └── WakeCondition ◄─ notify
//! ├──────────────────────────────────────────────────────────────────────┤
//! │ owner thread                RunLoop                                  │
//! │   park ──► wake ──► promote due timers ──► dispatch ──► re-arm ──► … │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Guarantees
//!
//! - **One callback at a time per queue.** Two queues run concurrently on two
//!   threads; within a queue, dispatch is cooperative and strictly ordered.
//! - **FIFO per handler.** Immediate posts from one thread dispatch in post order;
//!   timed posts dispatch by due time, ties broken by insertion order.
//! - **Race-safe cancellation.** [`cancel_message`] either removes a pending entry
//!   (observable as "not run") or flags a running periodic so it is not re-armed.
//! - **Cross-thread waiting.** [`wait_message`] blocks until a post finishes; called
//!   from the post's own queue thread it drains the queue re-entrantly instead of
//!   deadlocking.
//! - **Returned errors.** Posting to an unknown handler or a queue in teardown
//!   returns [`PostId::NULL`]; nothing in the posting paths panics the process.
//!
//! # Posting a message
//!
//! ```
//! use r3bl_mq::{Message, MessageQueueCreater, Timing, Title, install_message_handler,
//!               post_message};
//!
//! let creater = MessageQueueCreater::new("docs-post");
//! let queue = creater.create();
//!
//! let (sender, receiver) = std::sync::mpsc::channel();
//! let handler = install_message_handler(queue, false, move |_post, message| {
//!     sender.send(message.title).unwrap();
//! });
//!
//! let post = post_message(handler, Message::titled(Title(7)), Timing::Immediately);
//! assert!(!post.is_null());
//! assert_eq!(receiver.recv().unwrap(), Title(7));
//!
//! creater.cancel_and_wait();
//! ```
//!
//! # Calling across threads
//!
//! [`wait_invoke`] gives call-semantics equivalence: on the target queue's own thread
//! the closure runs inline; from anywhere else it is posted and its value carried
//! back.
//!
//! ```
//! use r3bl_mq::{MessageQueueCreater, def_async_invoke_handler, wait_invoke};
//!
//! let creater = MessageQueueCreater::new("docs-invoke");
//! let queue = creater.create();
//! let handler = def_async_invoke_handler(queue);
//!
//! assert_eq!(wait_invoke(|| 6 * 7, handler), Some(42));
//!
//! creater.cancel_and_wait();
//! ```
//!
//! # Module Contents
//!
//! | Module             | Provides                                                      |
//! | :----------------- | :------------------------------------------------------------ |
//! | [`ids`]            | [`QueueId`], [`HandlerId`], [`PostId`], [`Title`]             |
//! | [`message`]        | [`Message`], [`Payload`], [`Timing`]                          |
//! | [`clock`]          | Monotonic millisecond time source                             |
//! | [`wake_condition`] | [`WakeCondition`] trait, default [`CondvarWake`]              |
//! | [`queue_state`]    | Per-queue state and the scheduler                             |
//! | [`registry`]       | Process-wide queue registry, default queues                   |
//! | [`posting`]        | Post / cancel / wait / query operations                       |
//! | [`run_loop`]       | [`RunLoop`] with optional breaker predicate                   |
//! | [`creater`]        | [`MessageQueueCreater`] lifecycle helper                      |
//! | [`async_invoke`]   | Closure posting, [`AsyncResult`], [`wait_invoke`]             |

// Attach sources.
pub mod async_invoke;
pub mod clock;
pub mod creater;
pub mod ids;
pub mod message;
pub mod posting;
pub mod queue_state;
pub mod registry;
pub mod run_loop;
pub mod wake_condition;

#[cfg(test)]
mod tests;

// Re-export.
pub use async_invoke::*;
pub use clock::*;
pub use creater::*;
pub use ids::*;
pub use message::*;
pub use posting::*;
pub use queue_state::HandlerFn;
pub use registry::{get_def_message_queue, get_def_task_queue};
pub use run_loop::*;
pub use wake_condition::*;
