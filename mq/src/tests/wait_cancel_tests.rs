// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Waiting and cancellation: race-safe cancel, idempotence, uninstall drain
//! semantics, and the owner-thread re-entrant wait.

use crate::{Message, MessageQueueCreater, PostId, Timing, async_invoke,
            async_invoke_after, cancel_message, current_thread_queue,
            def_async_invoke_handler, found_message, install_message_handler,
            post_message, running_post_id, uninstall_message_handler, wait_message,
            wait_running_end_queue};
use pretty_assertions::assert_eq;
use std::{sync::{Arc, Mutex, mpsc},
          thread,
          time::{Duration, Instant}};

/// Waiting on a post that was never made returns immediately.
#[test]
fn test_wait_on_unknown_post() {
    let creater = MessageQueueCreater::new("wait-unknown");
    let queue = creater.create();
    let handler = install_message_handler(queue, false, |_post, _message| {});

    let bogus = PostId { handler, seq: u32::MAX };
    assert!(!wait_message(bogus));
    assert!(!found_message(bogus));

    creater.cancel_and_wait();
}

/// Cancel removes a pending post; the second cancel returns false; waiters observe
/// "not run".
#[test]
fn test_cancel_pending_is_idempotent() {
    let creater = MessageQueueCreater::new("cancel-idempotent");
    let queue = creater.create();
    let handler = install_message_handler(queue, false, |_post, _message| {});

    let post = post_message(handler, Message::default(), Timing::After { delay_ms: 100_000 });
    assert!(found_message(post));

    assert!(cancel_message(post));
    assert!(!cancel_message(post));
    assert!(!found_message(post));
    assert!(!wait_message(post));

    creater.cancel_and_wait();
}

/// Cancelling a post while its callback runs does not interrupt it: waiters are
/// released when the callback returns, and a periodic series stops re-arming.
#[test]
fn test_cancel_during_run_completes_current_iteration() {
    let creater = MessageQueueCreater::new("cancel-mid-run");
    let queue = creater.create();
    let handler = def_async_invoke_handler(queue);

    let (started_sender, started_receiver) = mpsc::channel();
    let (tick_sender, tick_receiver) = mpsc::channel();
    let post = crate::async_invoke_period(
        10,
        100,
        move || {
            drop(started_sender.send(()));
            thread::sleep(Duration::from_millis(120));
            drop(tick_sender.send(()));
        },
        handler,
    );

    started_receiver.recv_timeout(Duration::from_secs(5)).unwrap();
    // The callback is mid-flight: it is the published running entry now.
    assert_eq!(running_post_id(queue), post);
    assert!(cancel_message(post), "flags the running iteration");

    // The wait releases once the in-flight callback returns, and reports that it ran.
    assert!(wait_message(post));
    tick_receiver.recv_timeout(Duration::from_secs(5)).unwrap();

    // No re-arm: the series is over.
    assert!(!found_message(post));
    assert!(tick_receiver.recv_timeout(Duration::from_millis(400)).is_err());

    creater.cancel_and_wait();
}

/// Uninstall blocks until the handler's in-flight callback returns; afterwards the
/// handler is gone and posting to it is refused.
#[test]
fn test_uninstall_during_run_blocks_then_drains() {
    let creater = MessageQueueCreater::new("uninstall");
    let queue = creater.create();

    let (started_sender, started_receiver) = mpsc::channel();
    let handler = install_message_handler(queue, false, move |_post, _message| {
        drop(started_sender.send(()));
        thread::sleep(Duration::from_millis(150));
    });

    let post = post_message(handler, Message::default(), Timing::Immediately);
    assert!(!post.is_null());
    started_receiver.recv_timeout(Duration::from_secs(5)).unwrap();

    let uninstall_started = Instant::now();
    uninstall_message_handler(handler);
    assert!(
        uninstall_started.elapsed() >= Duration::from_millis(100),
        "uninstall must wait out the running callback"
    );

    let refused = post_message(handler, Message::default(), Timing::Immediately);
    assert!(refused.is_null());

    creater.cancel_and_wait();
}

/// Uninstall discards the handler's pending posts; the queue keeps serving other
/// handlers afterwards.
#[test]
fn test_uninstall_restores_queue_state() {
    let creater = MessageQueueCreater::new("uninstall-restore");
    let queue = creater.create();

    let doomed = install_message_handler(queue, false, |_post, _message| {});
    let pending = post_message(doomed, Message::default(), Timing::After { delay_ms: 100_000 });
    assert!(found_message(pending));

    uninstall_message_handler(doomed);
    assert!(!found_message(pending));
    assert!(!cancel_message(pending));

    let (sender, receiver) = mpsc::channel();
    let fresh = install_message_handler(queue, false, move |_post, _message| {
        drop(sender.send(()));
    });
    drop(post_message(fresh, Message::default(), Timing::Immediately));
    receiver.recv_timeout(Duration::from_secs(5)).unwrap();

    creater.cancel_and_wait();
}

/// The owner thread waiting on its own post drains the queue re-entrantly instead of
/// deadlocking, even while the queue is otherwise idle.
#[test]
fn test_wait_on_own_queue_does_not_deadlock() {
    let creater = MessageQueueCreater::new("self-wait");
    let queue = creater.create();
    let handler = def_async_invoke_handler(queue);

    let log = Arc::new(Mutex::new(Vec::new()));
    let (done_sender, done_receiver) = mpsc::channel();

    let log_outer = Arc::clone(&log);
    drop(async_invoke(
        move || {
            let own_queue = current_thread_queue();
            let own_handler = def_async_invoke_handler(own_queue);

            let log_inner = Arc::clone(&log_outer);
            let inner = async_invoke_after(
                10,
                move || log_inner.lock().unwrap().push("inner"),
                own_handler,
            );

            // Re-entrant drain: the owner itself dispatches `inner`.
            assert!(wait_message(inner));
            log_outer.lock().unwrap().push("outer-after-wait");
            drop(done_sender.send(()));
        },
        handler,
    ));

    done_receiver.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["inner", "outer-after-wait"]);

    creater.cancel_and_wait();
}

/// `wait_running_end_queue` blocks while a callback is mid-flight and returns once
/// the queue is between dispatches.
#[test]
fn test_wait_running_end_queue() {
    let creater = MessageQueueCreater::new("running-end");
    let queue = creater.create();

    let (started_sender, started_receiver) = mpsc::channel();
    let handler = install_message_handler(queue, false, move |_post, _message| {
        drop(started_sender.send(()));
        thread::sleep(Duration::from_millis(120));
    });

    drop(post_message(handler, Message::default(), Timing::Immediately));
    started_receiver.recv_timeout(Duration::from_secs(5)).unwrap();

    let waited_from = Instant::now();
    wait_running_end_queue(queue);
    assert!(waited_from.elapsed() >= Duration::from_millis(80));
    assert_eq!(running_post_id(queue), PostId::NULL);

    creater.cancel_and_wait();
}
