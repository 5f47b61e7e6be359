// Copyright (c) 2025 vivo Mobile Communication Co., Ltd.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//       http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A bounded, single-producer/single-consumer byte ring storing
//! length-prefixed records.
//!
//! Ported in spirit from an atomic reusable ringbuffer by the Embassy
//! project contributors (MIT OR Apache-2.0), reworked here to frame each
//! `push` as one record (a 2-byte little-endian length followed by the
//! payload) rather than a raw byte stream, and to hand both sides a
//! shared `&self` the way the Embassy ring hands out `Reader`/`Writer`
//! over `&RingBuffer`.

use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

const LEN_PREFIX: usize = 2;

/// Failure modes for [`CircularBuffer`] operations. None of these are
/// bugs; they are the caller's signal to retry, resize, or drop data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircularBufferError {
    /// `data.len() + 2` does not fit even in an empty buffer, or
    /// `data.len()` exceeds the 2-byte length prefix's range.
    RecordTooLarge,
    /// Not enough free space for this record right now.
    Full,
    /// No record is available to pop.
    Empty,
    /// The caller's output slice is smaller than the stored record.
    /// The record is left in place; retry with a larger buffer.
    OutputTooSmall(usize),
}

impl fmt::Display for CircularBufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RecordTooLarge => write!(f, "record does not fit in buffer capacity"),
            Self::Full => write!(f, "not enough free space for record"),
            Self::Empty => write!(f, "buffer is empty"),
            Self::OutputTooSmall(need) => {
                write!(f, "output buffer too small, need {need} bytes")
            }
        }
    }
}

impl std::error::Error for CircularBufferError {}

/// A fixed-capacity byte ring of length-prefixed records.
///
/// One slot of `capacity` is always kept free so `read == write`
/// unambiguously means empty. Usable payload capacity is therefore
/// `capacity - 1` bytes, including the 2-byte length prefixes.
///
/// Safe for exactly one producer thread calling [`push`](Self::push) and
/// one consumer thread calling [`pop`](Self::pop) concurrently through a
/// shared `&CircularBuffer`; it is not safe for two pushers or two
/// poppers to race. The byte storage lives behind an [`UnsafeCell`] so
/// both sides can write through a shared reference; the `read`/`write`
/// atomics (`Acquire`/`Release` paired across the two sides) are what
/// makes that sound, the same discipline the ringbuffer this is ported
/// from uses between its `Reader` and `Writer` handles.
pub struct CircularBuffer {
    buf: UnsafeCell<Box<[u8]>>,
    capacity: usize,
    read: AtomicUsize,
    write: AtomicUsize,
    peak: AtomicUsize,
}

// SAFETY: `buf` is only ever touched through `write_wrapping` (the
// producer side) and `read_wrapping` (the consumer side). Callers are
// required to run at most one producer and one consumer concurrently,
// so the two sides never write the same byte at the same time; the
// `write`/`read` atomics, loaded with `Acquire` and stored with
// `Release`, establish happens-before edges that make each side's
// writes visible to the other before it reads them.
unsafe impl Sync for CircularBuffer {}

impl CircularBuffer {
    /// Creates a ring with room for `capacity` bytes of raw storage
    /// (including length prefixes). `capacity` must be at least 1.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "CircularBuffer capacity must be nonzero");
        Self {
            buf: UnsafeCell::new(vec![0u8; capacity].into_boxed_slice()),
            capacity,
            read: AtomicUsize::new(0),
            write: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    /// Raw storage capacity, including the length prefix each record pays.
    pub fn capacity_bytes(&self) -> usize {
        self.capacity()
    }

    /// Largest occupancy (in bytes) ever observed, for diagnostics.
    pub fn peak_bytes(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }

    fn occupied(&self, read: usize, write: usize) -> usize {
        (write + self.capacity() - read) % self.capacity()
    }

    /// True when no record is pending.
    pub fn is_empty(&self) -> bool {
        self.read.load(Ordering::Acquire) == self.write.load(Ordering::Acquire)
    }

    /// True when the next `push` of any size would fail for lack of space.
    pub fn is_full(&self) -> bool {
        let read = self.read.load(Ordering::Acquire);
        let write = self.write.load(Ordering::Acquire);
        (write + 1) % self.capacity() == read
    }

    fn buf_ptr(&self) -> *mut u8 {
        // SAFETY: the pointee is a `Box<[u8]>` allocated once in `new`
        // and never reallocated or moved for the life of `self`.
        unsafe { (*self.buf.get()).as_mut_ptr() }
    }

    /// Writes `data` starting at `at`, wrapping around the end of the
    /// buffer. Caller must be the sole producer and must not overlap
    /// this call with another `write_wrapping` call.
    fn write_wrapping(&self, mut at: usize, data: &[u8]) -> usize {
        let cap = self.capacity();
        let ptr = self.buf_ptr();
        for &byte in data {
            // SAFETY: `at < cap` is an invariant of the index math
            // below, and the single-producer contract means no other
            // call writes through `ptr` concurrently.
            unsafe { ptr.add(at).write(byte) };
            at = (at + 1) % cap;
        }
        at
    }

    /// Reads into `out` starting at `at`, wrapping around the end of
    /// the buffer. Caller must be the sole consumer and must not
    /// overlap this call with another `read_wrapping` call.
    fn read_wrapping(&self, mut at: usize, out: &mut [u8]) -> usize {
        let cap = self.capacity();
        let ptr = self.buf_ptr();
        for slot in out.iter_mut() {
            // SAFETY: same reasoning as `write_wrapping`, for the
            // single-consumer side; the producer never writes bytes
            // this call is about to read until `write` is published.
            *slot = unsafe { ptr.add(at).read() };
            at = (at + 1) % cap;
        }
        at
    }

    /// Appends one record. Fails without mutating the buffer if `data`
    /// cannot fit in the buffer's total capacity, if `data` is too
    /// long for the 2-byte length prefix to encode, or if there is
    /// currently not enough free space.
    ///
    /// Safe to call from one producer thread while a different thread
    /// calls [`pop`](Self::pop) concurrently.
    pub fn push(&self, data: &[u8]) -> Result<(), CircularBufferError> {
        if data.len() > u16::MAX as usize {
            return Err(CircularBufferError::RecordTooLarge);
        }

        let record_len = LEN_PREFIX + data.len();
        if record_len >= self.capacity() {
            return Err(CircularBufferError::RecordTooLarge);
        }

        let read = self.read.load(Ordering::Acquire);
        let write = self.write.load(Ordering::Relaxed);
        let occupied = self.occupied(read, write);
        let free = self.capacity() - 1 - occupied;
        if free < record_len {
            return Err(CircularBufferError::Full);
        }

        let len_bytes = (data.len() as u16).to_le_bytes();
        let mut at = self.write_wrapping(write, &len_bytes);
        at = self.write_wrapping(at, data);

        self.write.store(at, Ordering::Release);
        self.peak.fetch_max(occupied + record_len, Ordering::Relaxed);
        Ok(())
    }

    /// Pops the oldest record into `out`, returning the number of bytes
    /// written. Fails if the buffer is empty, or if `out` is smaller than
    /// the stored record: in that case the record is left in place.
    ///
    /// Safe to call from one consumer thread while a different thread
    /// calls [`push`](Self::push) concurrently.
    pub fn pop(&self, out: &mut [u8]) -> Result<usize, CircularBufferError> {
        let write = self.write.load(Ordering::Acquire);
        let read = self.read.load(Ordering::Relaxed);
        if read == write {
            return Err(CircularBufferError::Empty);
        }

        let mut len_bytes = [0u8; LEN_PREFIX];
        let after_len = self.read_wrapping(read, &mut len_bytes);
        let len = u16::from_le_bytes(len_bytes) as usize;

        if out.len() < len {
            return Err(CircularBufferError::OutputTooSmall(len));
        }

        let after_payload = self.read_wrapping(after_len, &mut out[..len]);
        self.read.store(after_payload, Ordering::Release);
        Ok(len)
    }
}
