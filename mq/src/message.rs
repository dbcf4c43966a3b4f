// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Message payloads and delivery timing.
//!
//! A [`Message`] carries a [`Title`] plus two opaque body slots. Each slot is a
//! [`Payload`]: either nothing, an arbitrary boxed value that handlers downcast, or an
//! [`Invocable`] — a shared closure that the async-invoke handler runs on the owning
//! thread. Handlers that transport their own data use [`Payload::Value`]; the
//! async-invoke facility only ever needs the invoke capability.
//!
//! [`Timing`] selects when the message becomes ready: immediately, after a one-shot
//! delay, or periodically. Delays are monotonic milliseconds measured from the instant
//! of posting (see [`crate::clock`]).

use crate::Title;
use std::{any::Any,
          fmt,
          sync::{Arc, Mutex, PoisonError}};

/// A shared, repeatedly-callable closure carried inside a message body.
///
/// Cloning is shallow; all clones call the same underlying closure. Invocation is
/// serialized through an internal lock, but in practice only the owning thread of the
/// target queue ever invokes it.
#[derive(Clone)]
pub struct Invocable {
    func: Arc<Mutex<Box<dyn FnMut() + Send>>>,
}

impl Invocable {
    /// Wraps a closure for transport inside a [`Payload`].
    pub fn new(func: impl FnMut() + Send + 'static) -> Self {
        Self {
            func: Arc::new(Mutex::new(Box::new(func))),
        }
    }

    /// Calls the wrapped closure.
    pub fn invoke(&self) {
        let mut func = self.func.lock().unwrap_or_else(PoisonError::into_inner);
        (*func)();
    }
}

impl fmt::Debug for Invocable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Invocable")
    }
}

/// One type-erased message body slot.
#[derive(Default)]
pub enum Payload {
    /// Nothing in this slot.
    #[default]
    Empty,
    /// An opaque value. Handlers recover the concrete type via
    /// [`downcast_ref`](Self::downcast_ref) / [`downcast_mut`](Self::downcast_mut).
    Value(Box<dyn Any + Send>),
    /// A shared closure with an invoke capability.
    Invocable(Invocable),
}

impl Payload {
    /// Wraps an arbitrary value.
    pub fn value(value: impl Any + Send) -> Self { Payload::Value(Box::new(value)) }

    /// Whether this slot carries nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool { matches!(self, Payload::Empty) }

    /// Borrows the payload as `T`, if this slot holds a value of that type.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Payload::Value(value) => value.downcast_ref::<T>(),
            Payload::Empty | Payload::Invocable(_) => None,
        }
    }

    /// Mutably borrows the payload as `T`, if this slot holds a value of that type.
    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        match self {
            Payload::Value(value) => value.downcast_mut::<T>(),
            Payload::Empty | Payload::Invocable(_) => None,
        }
    }

    /// Runs the slot's closure if it holds one. Returns whether anything ran.
    pub fn invoke(&self) -> bool {
        match self {
            Payload::Invocable(invocable) => {
                invocable.invoke();
                true
            }
            Payload::Empty | Payload::Value(_) => false,
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Empty => f.write_str("Empty"),
            Payload::Value(_) => f.write_str("Value(..)"),
            Payload::Invocable(_) => f.write_str("Invocable"),
        }
    }
}

/// A posted message: a [`Title`] plus two opaque body slots.
#[derive(Debug, Default)]
pub struct Message {
    pub title: Title,
    pub body1: Payload,
    pub body2: Payload,
}

impl Message {
    /// A message with both body slots filled.
    #[must_use]
    pub fn new(title: Title, body1: Payload, body2: Payload) -> Self {
        Self { title, body1, body2 }
    }

    /// A message with a title and empty bodies.
    #[must_use]
    pub fn titled(title: Title) -> Self {
        Self {
            title,
            body1: Payload::Empty,
            body2: Payload::Empty,
        }
    }

    /// A message whose first body slot is a shared closure, for the async-invoke
    /// dispatch path.
    pub fn from_invocable(title: Title, func: impl FnMut() + Send + 'static) -> Self {
        Self {
            title,
            body1: Payload::Invocable(Invocable::new(func)),
            body2: Payload::Empty,
        }
    }
}

/// When a posted message becomes ready for dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timing {
    /// Ready as soon as it is enqueued.
    #[default]
    Immediately,
    /// Ready once `delay_ms` monotonic milliseconds have elapsed since posting.
    ///
    /// `After { delay_ms: 0 }` is *not* the same as [`Timing::Immediately`]: it goes
    /// through the timer list and is dispatched at the next scheduler pass.
    After { delay_ms: u64 },
    /// Ready after `after_ms`, then re-armed every `period_ms` after each dispatch.
    ///
    /// `period_ms == 0` degenerates to a one-shot with initial delay `after_ms`.
    Period { after_ms: u64, period_ms: u64 },
}

impl Timing {
    /// The delay before the first dispatch, in milliseconds.
    #[must_use]
    pub fn initial_delay_ms(&self) -> u64 {
        match self {
            Timing::Immediately => 0,
            Timing::After { delay_ms } => *delay_ms,
            Timing::Period { after_ms, .. } => *after_ms,
        }
    }

    /// The re-arm period, if this timing repeats.
    #[must_use]
    pub fn period_ms(&self) -> Option<u64> {
        match self {
            Timing::Period { period_ms, .. } if *period_ms > 0 => Some(*period_ms),
            Timing::Immediately | Timing::After { .. } | Timing::Period { .. } => None,
        }
    }
}
