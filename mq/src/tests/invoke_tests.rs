// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Cross-thread invoke with result carriage, and the cancellation notification
//! contract of [`AsyncResult`].

use crate::{AsyncResult, Message, MessageQueueCreater, Timing, Title, async_invoke_result,
            cancel_message, def_async_invoke_handler, post_message, queue_to_thread,
            wait_invoke, wait_invoke_result};
use pretty_assertions::assert_eq;
use std::{sync::{Arc, Mutex, mpsc,
                 atomic::{AtomicU32, Ordering}},
          time::Duration};

/// The producer runs exactly once, on the target queue's owning thread, and its value
/// comes back to the caller.
#[test]
fn test_wait_invoke_crosses_threads() {
    let creater = MessageQueueCreater::new("wait-invoke");
    let queue = creater.create();
    let handler = def_async_invoke_handler(queue);

    let runs = Arc::new(AtomicU32::new(0));
    let ran_on = Arc::new(Mutex::new(None));

    let runs_clone = Arc::clone(&runs);
    let ran_on_clone = Arc::clone(&ran_on);
    let answer = wait_invoke(
        move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            *ran_on_clone.lock().unwrap() = Some(std::thread::current().id());
            42
        },
        handler,
    );

    assert_eq!(answer, Some(42));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(*ran_on.lock().unwrap(), queue_to_thread(queue));
    assert_ne!(*ran_on.lock().unwrap(), Some(std::thread::current().id()));

    creater.cancel_and_wait();
}

/// A prepared carrier round-trips through `wait_invoke_result` into its shared slot.
#[test]
fn test_wait_invoke_result_fills_shared_slot() {
    let creater = MessageQueueCreater::new("invoke-slot");
    let queue = creater.create();
    let handler = def_async_invoke_handler(queue);

    let slot = Arc::new(Mutex::new(String::new()));
    let result = AsyncResult::with_slot(|| "carried".to_string(), Arc::clone(&slot));

    assert!(wait_invoke_result(&result, handler));
    assert!(result.is_valid());
    assert_eq!(*slot.lock().unwrap(), "carried");

    creater.cancel_and_wait();
}

/// Cancelling a posted carrier before it runs fires the completion callback with
/// `ok == false` once the last handle drops.
#[test]
fn test_cancelled_carrier_notifies_not_run() {
    let creater = MessageQueueCreater::new("carrier-cancel");
    let queue = creater.create();
    let handler = def_async_invoke_handler(queue);

    let (sender, receiver) = mpsc::channel();
    let result = AsyncResult::with_callback(
        || 7_u32,
        move |value: &u32, ok| drop(sender.send((*value, ok))),
    );

    // Post far in the future so the cancel always wins.
    let carrier = result.clone();
    let post = post_message(
        handler,
        Message::from_invocable(Title::NONE, move || carrier.invoke()),
        Timing::After { delay_ms: 100_000 },
    );
    assert!(!post.is_null());

    assert!(cancel_message(post));
    // The message held one handle; ours is the last.
    drop(result);
    assert_eq!(
        receiver.recv_timeout(Duration::from_secs(5)).unwrap(),
        (0, false)
    );

    creater.cancel_and_wait();
}

/// Queue teardown drops pending carriers, which also fires the cancellation
/// notification.
#[test]
fn test_teardown_notifies_pending_carriers() {
    let creater = MessageQueueCreater::new("carrier-teardown");
    let queue = creater.create();
    let handler = def_async_invoke_handler(queue);

    let (sender, receiver) = mpsc::channel();
    let result = AsyncResult::with_callback(
        || "never".to_string(),
        move |_value: &String, ok| drop(sender.send(ok)),
    );

    let carrier = result.clone();
    let post = post_message(
        handler,
        Message::from_invocable(Title::NONE, move || carrier.invoke()),
        Timing::After { delay_ms: 100_000 },
    );
    assert!(!post.is_null());

    creater.cancel_and_wait();
    drop(result);
    assert_eq!(receiver.recv_timeout(Duration::from_secs(5)).unwrap(), false);
}

/// An immediate carrier posted with `async_invoke_result` completes normally.
#[test]
fn test_async_invoke_result_completes() {
    let creater = MessageQueueCreater::new("carrier-ok");
    let queue = creater.create();
    let handler = def_async_invoke_handler(queue);

    let (sender, receiver) = mpsc::channel();
    let result = AsyncResult::with_callback(
        || 41 + 1,
        move |value: &i32, ok| drop(sender.send((*value, ok))),
    );

    let post = async_invoke_result(&result, handler);
    assert!(!post.is_null());
    assert_eq!(
        receiver.recv_timeout(Duration::from_secs(5)).unwrap(),
        (42, true)
    );
    assert_eq!(result.take(), Some(42));

    creater.cancel_and_wait();
}
