//! The transport record dispatched by a [`crate::Looper`].

use std::any::Any;
use std::sync::{Arc, Mutex, Weak};

/// Receiver of dispatched messages.
///
/// `Message` holds its handler by [`Weak`] reference: a message must
/// never be the thing keeping a handler alive, or a Looper and the
/// handlers it targets could pin each other in a reference cycle that
/// never drops. A message whose handler has already been dropped is
/// simply skipped at dispatch time rather than treated as an error.
pub trait Handler: Send + Sync {
    fn dispatch(&self, msg: &Dispatched);
}

/// A snapshot of a [`Message`]'s payload, handed to
/// [`Handler::dispatch`] once the original has been unlinked and
/// recycled.
pub struct Dispatched {
    pub handler: Weak<dyn Handler>,
    pub what: i32,
    pub arg1: i64,
    pub arg2: i64,
    pub obj: Option<Arc<dyn Any + Send + Sync>>,
    pub exec_timestamp: u64,
}

/// Mutable, queue-owned state. One lock covers the payload, the pending
/// flag, and the intrusive `next` link together, so the test-and-set in
/// `enqueue_message` and any list splice always see a consistent message.
pub(crate) struct MessageState {
    pub(crate) handler: Option<Weak<dyn Handler>>,
    pub(crate) what: i32,
    pub(crate) arg1: i64,
    pub(crate) arg2: i64,
    pub(crate) obj: Option<Arc<dyn Any + Send + Sync>>,
    pub(crate) exec_timestamp: u64,
    pub(crate) next: Option<Arc<Message>>,
}

/// A pending unit of work: a target handler, a small integer payload,
/// and a deadline.
///
/// `Message` is shared-ownership (`Arc`): a caller may retain the same
/// handle the queue links into its list, reuse it for the next send once
/// dispatched, or hand it to a pool. The queue never acts on a
/// `Message`'s storage after the caller has stopped needing it: the
/// allocation is only freed once every `Arc` (the caller's and the
/// queue's) has dropped it.
///
/// A `Message` may be enqueued into at most one queue at a time; see
/// [`is_pending`](Message::is_pending).
pub struct Message {
    pub(crate) state: Mutex<MessageState>,
}

impl Message {
    /// Creates a new, not-yet-pending message addressed to `handler`.
    pub fn new(handler: &Arc<dyn Handler>, what: i32, arg1: i64, arg2: i64) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MessageState {
                handler: Some(Arc::downgrade(handler)),
                what,
                arg1,
                arg2,
                obj: None,
                exec_timestamp: 0,
                next: None,
            }),
        })
    }

    /// Attaches an opaque payload, replacing any previous one. Returns
    /// the same handle so calls can be chained onto [`Message::new`].
    pub fn with_obj(self: Arc<Self>, obj: Arc<dyn Any + Send + Sync>) -> Arc<Self> {
        self.state.lock().unwrap().obj = Some(obj);
        self
    }

    /// True iff this message is currently linked into some queue.
    pub fn is_pending(&self) -> bool {
        self.state.lock().unwrap().exec_timestamp != 0
    }

    pub fn what(&self) -> i32 {
        self.state.lock().unwrap().what
    }

    pub fn arg1(&self) -> i64 {
        self.state.lock().unwrap().arg1
    }

    pub fn arg2(&self) -> i64 {
        self.state.lock().unwrap().arg2
    }

    /// Re-populates a recycled (or fresh) message for the next send,
    /// mirroring the fields [`Message::new`] accepts. Fails without
    /// changing anything if the message is currently pending: reuse is
    /// only valid once a message has been dispatched, removed, or never
    /// enqueued.
    pub fn reset(&self, handler: &Arc<dyn Handler>, what: i32, arg1: i64, arg2: i64) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.exec_timestamp != 0 {
            return false;
        }
        state.handler = Some(Arc::downgrade(handler));
        state.what = what;
        state.arg1 = arg1;
        state.arg2 = arg2;
        true
    }

    /// Resets transport fields and clears the pending flag. Only called
    /// by the queue, immediately after unlinking a message: either
    /// because it was dispatched or because a `remove*` call dropped it.
    pub(crate) fn recycle(&self) {
        let mut state = self.state.lock().unwrap();
        state.handler = None;
        state.what = 0;
        state.arg1 = 0;
        state.arg2 = 0;
        state.obj = None;
        state.exec_timestamp = 0;
        state.next = None;
    }
}
