//! Single-threaded MessageQueue behavior: ordering, removal, and the
//! pending-exclusivity invariant.

use std::sync::{Arc, Mutex};

use looper_rt::{Dispatched, FakeClock, Handler, Message, MessageQueue};

fn init_logging() {
    let _ = env_logger::try_init();
}

struct Recorder {
    order: Mutex<Vec<i32>>,
}

impl Recorder {
    fn new() -> Self {
        Self {
            order: Mutex::new(Vec::new()),
        }
    }
}

impl Handler for Recorder {
    fn dispatch(&self, msg: &Dispatched) {
        self.order.lock().unwrap().push(msg.what);
    }
}

#[test]
fn ordering_by_deadline_then_fifo_on_ties() {
    init_logging();
    let clock = Arc::new(FakeClock::new());
    let queue = MessageQueue::with_clock(clock.clone());
    let handler: Arc<dyn Handler> = Arc::new(Recorder::new());

    assert!(queue.enqueue_message(Message::new(&handler, 1, 0, 0), 200));
    assert!(queue.enqueue_message(Message::new(&handler, 2, 0, 0), 100));
    assert!(queue.enqueue_message(Message::new(&handler, 3, 0, 0), 100));

    clock.set(1_000);

    let order: Vec<i32> = (0..3)
        .map(|_| queue.dequeue_message().unwrap().what)
        .collect();
    assert_eq!(order, vec![2, 3, 1]);
}

#[test]
fn remove_messages_what_drops_only_matching_opcode() {
    init_logging();
    let clock = Arc::new(FakeClock::new());
    let queue = MessageQueue::with_clock(clock.clone());
    let handler: Arc<dyn Handler> = Arc::new(Recorder::new());
    let handler_weak = Arc::downgrade(&handler);

    assert!(queue.enqueue_message(Message::new(&handler, 1, 0, 0), 100));
    assert!(queue.enqueue_message(Message::new(&handler, 2, 0, 0), 200));
    assert!(queue.enqueue_message(Message::new(&handler, 1, 0, 0), 300));
    assert!(queue.enqueue_message(Message::new(&handler, 3, 0, 0), 400));

    assert!(queue.remove_messages_what(&handler_weak, 1));
    assert!(!queue.remove_messages_what(&handler_weak, 1));

    clock.set(1_000);
    let order: Vec<i32> = (0..2)
        .map(|_| queue.dequeue_message().unwrap().what)
        .collect();
    assert_eq!(order, vec![2, 3]);
}

#[test]
fn remove_messages_clears_every_message_for_handler() {
    init_logging();
    let clock = Arc::new(FakeClock::new());
    let queue = MessageQueue::with_clock(clock.clone());
    let target: Arc<dyn Handler> = Arc::new(Recorder::new());
    let bystander: Arc<dyn Handler> = Arc::new(Recorder::new());
    let target_weak = Arc::downgrade(&target);

    assert!(queue.enqueue_message(Message::new(&target, 1, 0, 0), 100));
    assert!(queue.enqueue_message(Message::new(&bystander, 9, 0, 0), 150));
    assert!(queue.enqueue_message(Message::new(&target, 2, 0, 0), 200));

    assert!(queue.remove_messages(&target_weak));

    clock.set(1_000);
    let only = queue.dequeue_message().unwrap();
    assert_eq!(only.what, 9);
}

#[test]
fn reenqueue_of_pending_message_is_rejected() {
    init_logging();
    let clock = Arc::new(FakeClock::new());
    let queue = MessageQueue::with_clock(clock.clone());
    let handler: Arc<dyn Handler> = Arc::new(Recorder::new());
    let msg = Message::new(&handler, 7, 0, 0);

    assert!(queue.enqueue_message(msg.clone(), 100));
    assert!(msg.is_pending());
    assert!(!queue.enqueue_message(msg.clone(), 50));

    clock.set(1_000);
    let dispatched = queue.dequeue_message().unwrap();
    assert_eq!(dispatched.what, 7);
    assert_eq!(dispatched.exec_timestamp, 100);
    assert!(!msg.is_pending());
}

#[test]
fn enqueue_rejects_zero_timestamp_and_missing_handler() {
    init_logging();
    let queue = MessageQueue::with_clock(Arc::new(FakeClock::new()));
    let handler: Arc<dyn Handler> = Arc::new(Recorder::new());

    assert!(!queue.enqueue_message(Message::new(&handler, 1, 0, 0), 0));
}

#[test]
fn enqueue_after_quit_is_rejected() {
    init_logging();
    let queue = MessageQueue::with_clock(Arc::new(FakeClock::new()));
    let handler: Arc<dyn Handler> = Arc::new(Recorder::new());

    queue.quit();
    assert!(queue.is_quitting());
    assert!(!queue.enqueue_message(Message::new(&handler, 1, 0, 0), 100));
    assert!(queue.dequeue_message().is_none());
}

#[test]
fn recycle_clears_payload_and_reset_repopulates_it() {
    init_logging();
    let clock = Arc::new(FakeClock::new());
    let queue = MessageQueue::with_clock(clock.clone());
    let handler: Arc<dyn Handler> = Arc::new(Recorder::new());
    let msg = Message::new(&handler, 5, 11, 22);

    assert!(queue.enqueue_message(msg.clone(), 100));
    clock.set(1_000);
    let dispatched = queue.dequeue_message().unwrap();
    assert_eq!(dispatched.what, 5);
    assert!(!msg.is_pending());
    assert_eq!(msg.what(), 0);

    assert!(msg.reset(&handler, 6, 1, 2));
    assert!(queue.enqueue_message(msg.clone(), 2_000));
    clock.set(5_000);
    let second = queue.dequeue_message().unwrap();
    assert_eq!(second.what, 6);
    assert_eq!(second.arg1, 1);
    assert_eq!(second.arg2, 2);
}

#[test]
fn message_outliving_its_dropped_handler_is_not_dispatchable_but_does_not_panic() {
    init_logging();
    let clock = Arc::new(FakeClock::new());
    let queue = MessageQueue::with_clock(clock.clone());
    let msg;
    {
        let handler: Arc<dyn Handler> = Arc::new(Recorder::new());
        msg = Message::new(&handler, 1, 0, 0);
        assert!(queue.enqueue_message(msg.clone(), 100));
        // handler drops here; msg.handler is only a Weak reference.
    }

    clock.set(1_000);
    let dispatched = queue.dequeue_message().unwrap();
    assert!(dispatched.handler.upgrade().is_none());
}
