//! Supporting data structures for `looper-rt`.
//!
//! This crate holds collaborators that are useful alongside a `Looper`/
//! `MessageQueue` pair but are not themselves part of the dispatch core:
//! today, a bounded single-producer/single-consumer byte ring.

mod circular_buffer;

pub use circular_buffer::{CircularBuffer, CircularBufferError};
