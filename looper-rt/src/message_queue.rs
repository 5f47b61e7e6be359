//! A thread-safe, time-ordered pending-work list.

use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::Duration;

use log::{debug, trace, warn};

use crate::clock::{Clock, SystemClock};
use crate::message::{Dispatched, Handler, Message, MessageState};

struct QueueState {
    head: Option<Arc<Message>>,
    quitting: bool,
}

/// A singly linked, deadline-ordered list of pending [`Message`]s shared
/// between one consumer thread (calling [`dequeue_message`](Self::dequeue_message))
/// and any number of producer threads (calling
/// [`enqueue_message`](Self::enqueue_message) and the `remove*` family).
///
/// Messages with a strictly smaller `exec_timestamp` are always
/// delivered first; messages with equal timestamps are delivered in
/// enqueue order.
pub struct MessageQueue {
    state: Mutex<QueueState>,
    wake: Condvar,
    clock: Arc<dyn Clock>,
}

impl MessageQueue {
    /// Creates a queue driven by the system monotonic clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    /// Creates a queue driven by a caller-supplied clock. Tests use this
    /// to substitute a [`crate::FakeClock`].
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                head: None,
                quitting: false,
            }),
            wake: Condvar::new(),
            clock,
        }
    }

    /// The queue's own notion of "now", on whichever clock it was built
    /// with.
    pub fn now_ns(&self) -> u64 {
        self.clock.now_ns()
    }

    pub fn is_quitting(&self) -> bool {
        self.state.lock().unwrap().quitting
    }

    /// Enqueues `msg` to become due at `exec_timestamp` nanoseconds on
    /// this queue's clock.
    ///
    /// Fails, leaving both the queue and `msg` unchanged, if
    /// `exec_timestamp` is zero, `msg` has no handler, `msg` is already
    /// pending in some queue, or this queue has quit.
    pub fn enqueue_message(&self, msg: Arc<Message>, exec_timestamp: u64) -> bool {
        if exec_timestamp == 0 {
            warn!("enqueue_message: rejecting zero exec_timestamp");
            return false;
        }

        let mut state = self.state.lock().unwrap();

        {
            let mut msg_state = msg.state.lock().unwrap();
            if msg_state.handler.is_none() {
                warn!("enqueue_message: rejecting message with no handler");
                return false;
            }
            if msg_state.exec_timestamp != 0 {
                warn!("enqueue_message: rejecting already-pending message");
                return false;
            }
            if state.quitting {
                trace!("enqueue_message: queue is quitting, dropping message");
                return false;
            }
            msg_state.exec_timestamp = exec_timestamp;
        }

        Self::insert_sorted(&mut state.head, msg, exec_timestamp);
        trace!("enqueue_message: inserted at t={exec_timestamp}");
        drop(state);
        self.wake.notify_one();
        true
    }

    /// Splices `msg` into the list rooted at `head`, preserving FIFO
    /// order among equal `exec_timestamp`s by walking past every node
    /// whose deadline is `<=` the new one before inserting.
    fn insert_sorted(head: &mut Option<Arc<Message>>, msg: Arc<Message>, exec_timestamp: u64) {
        let prepend = match head {
            None => true,
            Some(h) => exec_timestamp < h.state.lock().unwrap().exec_timestamp,
        };

        if prepend {
            msg.state.lock().unwrap().next = head.take();
            *head = Some(msg);
            return;
        }

        let mut cur = head.clone().expect("checked above");
        loop {
            let next = cur.state.lock().unwrap().next.clone();
            match next {
                Some(next_msg) if next_msg.state.lock().unwrap().exec_timestamp <= exec_timestamp => {
                    cur = next_msg;
                }
                _ => break,
            }
        }

        let mut cur_state = cur.state.lock().unwrap();
        let mut msg_state = msg.state.lock().unwrap();
        msg_state.next = cur_state.next.take();
        drop(msg_state);
        cur_state.next = Some(msg);
    }

    /// Blocks until a message becomes due or the queue quits.
    ///
    /// Returns `None` once [`quit`](Self::quit) has been called and no
    /// more messages will ever be delivered.
    pub fn dequeue_message(&self) -> Option<Dispatched> {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.quitting {
                return None;
            }

            let now = self.clock.now_ns();
            if let Some(head) = state.head.clone() {
                let due = head.state.lock().unwrap().exec_timestamp;
                if due <= now {
                    let next = head.state.lock().unwrap().next.take();
                    state.head = next;
                    return Some(Self::snapshot_and_recycle(&head));
                }

                let wait_ns = due - now;
                let (guard, _timed_out) = self
                    .wake
                    .wait_timeout(state, Duration::from_nanos(wait_ns))
                    .unwrap();
                state = guard;
            } else {
                state = self.wake.wait(state).unwrap();
            }
        }
    }

    fn snapshot_and_recycle(msg: &Arc<Message>) -> Dispatched {
        let dispatched = {
            let state = msg.state.lock().unwrap();
            Dispatched {
                handler: state
                    .handler
                    .clone()
                    .expect("a linked message always has a handler until it is recycled"),
                what: state.what,
                arg1: state.arg1,
                arg2: state.arg2,
                obj: state.obj.clone(),
                exec_timestamp: state.exec_timestamp,
            }
        };
        msg.recycle();
        dispatched
    }

    fn handler_matches(state: &MessageState, handler: &Weak<dyn Handler>) -> bool {
        match &state.handler {
            Some(h) => Weak::ptr_eq(h, handler),
            None => false,
        }
    }

    /// Removes every pending message addressed to `handler`. Returns
    /// whether any were removed. Does not wake a blocked dequeuer: the
    /// earliest remaining deadline can only be later than before.
    pub fn remove_messages(&self, handler: &Weak<dyn Handler>) -> bool {
        self.remove_matching(|state| Self::handler_matches(state, handler))
    }

    /// Removes every pending message addressed to `handler` whose opcode
    /// equals `what`. Returns whether any were removed.
    pub fn remove_messages_what(&self, handler: &Weak<dyn Handler>, what: i32) -> bool {
        self.remove_matching(|state| Self::handler_matches(state, handler) && state.what == what)
    }

    fn remove_matching<F>(&self, matches: F) -> bool
    where
        F: Fn(&MessageState) -> bool,
    {
        let mut state = self.state.lock().unwrap();
        let mut removed = false;

        while let Some(h) = state.head.clone() {
            if !matches(&h.state.lock().unwrap()) {
                break;
            }
            let next = h.state.lock().unwrap().next.take();
            h.recycle();
            state.head = next;
            removed = true;
        }

        let mut cur = state.head.clone();
        while let Some(node) = cur.clone() {
            let next = node.state.lock().unwrap().next.clone();
            let next_matches = next
                .as_ref()
                .is_some_and(|next_node| matches(&next_node.state.lock().unwrap()));

            if next_matches {
                let next_node = next.expect("checked above");
                let after = next_node.state.lock().unwrap().next.take();
                next_node.recycle();
                node.state.lock().unwrap().next = after;
                removed = true;
                // stay on `node`; its new `next` may also match.
            } else {
                cur = next;
            }
        }

        if removed {
            debug!("remove_matching: removed one or more messages");
        }
        removed
    }

    /// Removes at most one message, identified by pointer identity, if
    /// it is still addressed to `handler`. Returns whether it was found.
    pub fn remove_message(&self, handler: &Weak<dyn Handler>, target: &Arc<Message>) -> bool {
        let mut state = self.state.lock().unwrap();

        if let Some(h) = state.head.clone() {
            if Arc::ptr_eq(&h, target) && Self::handler_matches(&h.state.lock().unwrap(), handler) {
                let next = h.state.lock().unwrap().next.take();
                h.recycle();
                state.head = next;
                return true;
            }
        }

        let mut cur = state.head.clone();
        while let Some(node) = cur {
            let next = node.state.lock().unwrap().next.clone();
            if let Some(next_node) = &next {
                if Arc::ptr_eq(next_node, target)
                    && Self::handler_matches(&next_node.state.lock().unwrap(), handler)
                {
                    let after = next_node.state.lock().unwrap().next.take();
                    next_node.recycle();
                    node.state.lock().unwrap().next = after;
                    return true;
                }
            }
            cur = next;
        }

        false
    }

    /// Transitions the queue to quitting. Idempotent. Always wakes a
    /// blocked dequeuer on the transition, whether or not one happens to
    /// be asleep at the time: there is no race-free way to tell from
    /// here, and an extra wake on an empty, non-blocked queue is free.
    pub fn quit(&self) {
        let mut state = self.state.lock().unwrap();
        if state.quitting {
            return;
        }
        state.quitting = true;
        debug!("quit: queue is now quitting");
        drop(state);
        self.wake.notify_one();
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}
