//! A per-thread cooperative event loop with a time-ordered
//! [`MessageQueue`](message_queue::MessageQueue), modelled on Android's
//! Looper/Handler/MessageQueue pattern.
//!
//! A thread calls [`Looper::prepare`] to install a Looper in thread-local
//! storage, then [`Looper::loop_`] to dispatch messages as they come due.
//! Other threads reach that Looper's queue (via [`Looper::queue`]) to
//! enqueue work or cancel it by handler identity.

pub mod clock;
pub mod config;
pub mod looper;
pub mod message;
pub mod message_queue;

pub use clock::{Clock, FakeClock, SystemClock};
pub use looper::{Looper, LooperRegistry};
pub use looper_rt_infra::{CircularBuffer, CircularBufferError};
pub use message::{Dispatched, Handler, Message};
pub use message_queue::MessageQueue;
