// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Identity types for queues, handlers, and posts.
//!
//! The id space is layered: a [`QueueId`] names a live queue, a [`HandlerId`] is a
//! `(queue, seq)` pair naming a callback installed on that queue, and a [`PostId`] is a
//! `(handler, seq)` pair naming one submitted message. In every layer `seq == 0` is
//! reserved:
//!
//! - [`QueueId::INVALID`] (`0`) never names a queue.
//! - A [`HandlerId`] with `seq == 0` is the queue's *broadcast pseudo-handler* — the
//!   address used by broadcast posts, which fan out to every broadcast-subscribed
//!   handler at dispatch.
//! - A [`PostId`] with `seq == 0` is the *null post*, returned by posting operations
//!   that refused the message.
//!
//! # Why Not Just `u64`/`u32`?
//!
//! Bare integers require remembering what `0` means at each layer. With these
//! newtypes, `post.is_null()` and `handler.is_broadcast()` read like documentation
//! and the compiler keeps the layers from being mixed up.

/// Names a live queue. `0` is reserved as [`QueueId::INVALID`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct QueueId(pub u64);

impl QueueId {
    /// The reserved "no queue" value.
    pub const INVALID: QueueId = QueueId(0);

    /// Whether this id names a (possibly released) queue, as opposed to
    /// [`QueueId::INVALID`].
    #[must_use]
    pub fn is_valid(&self) -> bool { self.0 != 0 }
}

/// Names a handler installed on a queue: `(queue, seq)`.
///
/// `seq == 0` denotes the queue's broadcast pseudo-handler; every other value names a
/// real installed callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HandlerId {
    pub queue: QueueId,
    pub seq: u32,
}

impl HandlerId {
    /// The all-zero null handler.
    pub const NULL: HandlerId = HandlerId {
        queue: QueueId::INVALID,
        seq: 0,
    };

    /// The broadcast pseudo-handler of `queue`.
    #[must_use]
    pub fn broadcast(queue: QueueId) -> HandlerId { HandlerId { queue, seq: 0 } }

    /// Whether this id addresses the broadcast pseudo-handler of its queue.
    #[must_use]
    pub fn is_broadcast(&self) -> bool { self.seq == 0 }

    /// The queue this handler lives on.
    #[must_use]
    pub fn queue(&self) -> QueueId { self.queue }
}

/// Names one submitted message: `(handler, seq)`.
///
/// `seq == 0` is the null post, returned when a posting operation refused the message
/// (unknown handler, queue in teardown).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PostId {
    pub handler: HandlerId,
    pub seq: u32,
}

impl PostId {
    /// The all-zero null post.
    pub const NULL: PostId = PostId {
        handler: HandlerId::NULL,
        seq: 0,
    };

    /// Whether this is the null post.
    #[must_use]
    pub fn is_null(&self) -> bool { self.seq == 0 }

    /// The handler this post targets.
    #[must_use]
    pub fn handler(&self) -> HandlerId { self.handler }

    /// The queue this post targets.
    #[must_use]
    pub fn queue(&self) -> QueueId { self.handler.queue }
}

/// Opaque machine-word-sized message title.
///
/// Used by singleton/coalescing posts and title-scoped cancellation. Equality is
/// bitwise; the library never interprets the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Title(pub u64);

impl Title {
    /// The default "untitled" title.
    pub const NONE: Title = Title(0);
}

impl From<u64> for Title {
    fn from(value: u64) -> Self { Title(value) }
}
