// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Dispatch-order guarantees: FIFO per handler, faster-message overtaking, and
//! re-entrant posting from inside a callback.

use crate::{Message, MessageQueueCreater, Timing, Title, async_invoke,
            def_async_invoke_handler, faster_message, install_message_handler,
            post_message, wait_message};
use pretty_assertions::assert_eq;
use std::{sync::{Arc, Mutex, mpsc},
          time::Duration};

/// Three immediate posts from one thread dispatch in post order with their titles.
#[test]
fn test_fifo_same_thread() {
    let creater = MessageQueueCreater::new("fifo");
    let queue = creater.create();

    let (sender, receiver) = mpsc::channel();
    let handler = install_message_handler(queue, false, move |post, message| {
        drop(sender.send((post, message.title)));
    });

    let p1 = post_message(handler, Message::titled(Title(1)), Timing::Immediately);
    let p2 = post_message(handler, Message::titled(Title(2)), Timing::Immediately);
    let p3 = post_message(handler, Message::titled(Title(3)), Timing::Immediately);

    let mut dispatched = Vec::new();
    for _ in 0..3 {
        dispatched.push(receiver.recv_timeout(Duration::from_secs(5)).unwrap());
    }
    assert_eq!(
        dispatched,
        vec![(p1, Title(1)), (p2, Title(2)), (p3, Title(3))]
    );

    creater.cancel_and_wait();
}

/// A faster post jumps ahead of queued immediates — but only entries that are still
/// queued, never the callback already running.
#[test]
fn test_faster_overtakes_queued_immediates() {
    let creater = MessageQueueCreater::new("faster");
    let queue = creater.create();

    // The gate callback holds the queue busy so the next two posts pile up behind it.
    let (gate_sender, gate_receiver) = mpsc::channel::<()>();
    let gate_receiver = Mutex::new(gate_receiver);
    let (started_sender, started_receiver) = mpsc::channel();
    let gate = install_message_handler(queue, false, move |_post, _message| {
        drop(started_sender.send(()));
        drop(gate_receiver.lock().unwrap().recv());
    });

    let (sender, receiver) = mpsc::channel();
    let handler = install_message_handler(queue, false, move |_post, message| {
        drop(sender.send(message.title));
    });

    drop(post_message(gate, Message::default(), Timing::Immediately));
    started_receiver
        .recv_timeout(Duration::from_secs(5))
        .unwrap();

    drop(post_message(handler, Message::titled(Title(1)), Timing::Immediately));
    drop(faster_message(handler, Message::titled(Title(2)), Timing::Immediately));
    gate_sender.send(()).unwrap();

    let first = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
    let second = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!((first, second), (Title(2), Title(1)));

    creater.cancel_and_wait();
}

/// A callback that re-posts to its own queue appends at the ready tail: the new
/// message runs only after the current callback returns.
#[test]
fn test_repost_from_callback_runs_after_current() {
    let creater = MessageQueueCreater::new("repost");
    let queue = creater.create();
    let handler = def_async_invoke_handler(queue);

    let log = Arc::new(Mutex::new(Vec::new()));
    let (done_sender, done_receiver) = mpsc::channel();

    let log_outer = Arc::clone(&log);
    let post = async_invoke(
        move || {
            let log_inner = Arc::clone(&log_outer);
            let done = done_sender.clone();
            let inner_post = async_invoke(
                move || {
                    log_inner.lock().unwrap().push("inner");
                    drop(done.send(()));
                },
                def_async_invoke_handler(crate::current_thread_queue()),
            );
            assert!(!inner_post.is_null());
            log_outer.lock().unwrap().push("outer-end");
        },
        handler,
    );
    assert!(!post.is_null());

    done_receiver.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["outer-end", "inner"]);

    // Both posts have completed; completed posts are no longer known.
    assert!(!wait_message(post));
    creater.cancel_and_wait();
}
