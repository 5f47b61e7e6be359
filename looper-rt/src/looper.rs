//! Per-thread binding of a [`MessageQueue`] to a dispatch loop.

use std::cell::RefCell;
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::thread;

use log::{debug, warn};

use crate::config::MAX_NUM_LOOPERS;
use crate::message_queue::MessageQueue;

thread_local! {
    static CURRENT_LOOPER: RefCell<Option<Arc<Looper>>> = const { RefCell::new(None) };
}

static GLOBAL_REGISTRY: OnceLock<LooperRegistry> = OnceLock::new();

fn global_registry() -> &'static LooperRegistry {
    GLOBAL_REGISTRY.get_or_init(|| LooperRegistry::with_capacity(MAX_NUM_LOOPERS))
}

/// A bounded, process-wide table of live Loopers, used by
/// [`Looper::prepare`] to cap how many Loopers may exist at once and for
/// diagnostic enumeration.
///
/// The default registry [`Looper::prepare`] uses is sized to
/// [`MAX_NUM_LOOPERS`]; build one directly with [`LooperRegistry::with_capacity`]
/// for a test or host that needs a different bound.
pub struct LooperRegistry {
    loopers: Mutex<Vec<Weak<Looper>>>,
    capacity: usize,
}

impl LooperRegistry {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            loopers: Mutex::new(Vec::new()),
            capacity,
        }
    }

    /// Registers `looper`, pruning dead entries first. Returns `false`
    /// without registering if the registry is already at capacity.
    pub fn register(&self, looper: &Arc<Looper>) -> bool {
        let mut loopers = self.loopers.lock().unwrap();
        loopers.retain(|w| w.strong_count() > 0);
        if loopers.len() >= self.capacity {
            return false;
        }
        loopers.push(Arc::downgrade(looper));
        true
    }

    /// Number of Loopers currently alive in this registry.
    pub fn live_count(&self) -> usize {
        let mut loopers = self.loopers.lock().unwrap();
        loopers.retain(|w| w.strong_count() > 0);
        loopers.len()
    }
}

/// A per-thread binding of a [`MessageQueue`] to a dispatch loop.
///
/// Install one on the calling thread with [`Looper::prepare`], then run
/// [`Looper::loop_`]. Other threads reach this Looper's queue via
/// [`Looper::queue`] to enqueue or cancel work.
pub struct Looper {
    queue: Arc<MessageQueue>,
}

impl Looper {
    /// Builds a standalone Looper, not bound to any thread-local slot or
    /// registry. [`Looper::prepare`] uses this internally; host code
    /// that manages its own thread binding (or wants to register a
    /// Looper into a custom-capacity [`LooperRegistry`]) can call it
    /// directly.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            queue: Arc::new(MessageQueue::new()),
        })
    }

    /// The Looper's queue, shared with producer threads.
    pub fn queue(&self) -> &Arc<MessageQueue> {
        &self.queue
    }

    /// Installs a fresh Looper on the calling thread's thread-local
    /// slot. Fails, leaving any existing Looper untouched, if this
    /// thread already has one, or if the process-wide registry is full.
    pub fn prepare() -> bool {
        let already_prepared = CURRENT_LOOPER.with(|slot| slot.borrow().is_some());
        if already_prepared {
            warn!("Looper::prepare: thread {:?} already has a Looper", thread::current().id());
            return false;
        }

        let looper = Self::new();
        if !global_registry().register(&looper) {
            warn!("Looper::prepare: registry at capacity ({MAX_NUM_LOOPERS} loopers)");
            return false;
        }

        debug!("Looper::prepare: installed on {:?}", thread::current().id());
        CURRENT_LOOPER.with(|slot| *slot.borrow_mut() = Some(looper));
        true
    }

    /// Returns the calling thread's Looper, if [`Looper::prepare`] has
    /// been called on it.
    pub fn my_looper() -> Option<Arc<Looper>> {
        CURRENT_LOOPER.with(|slot| slot.borrow().clone())
    }

    /// Runs the dispatch loop: repeatedly dequeues the next due message
    /// and invokes its handler, until the queue quits.
    pub fn loop_(looper: &Arc<Looper>) {
        while let Some(dispatched) = looper.queue.dequeue_message() {
            match dispatched.handler.upgrade() {
                Some(handler) => handler.dispatch(&dispatched),
                None => warn!("loop_: dropping message, handler no longer alive"),
            }
        }
        debug!("loop_: queue quit, exiting dispatch loop");
    }

    /// Tells this Looper's queue to stop accepting and delivering
    /// messages, unblocking any thread parked in [`Looper::loop_`].
    pub fn quit(&self) {
        self.queue.quit();
    }
}
