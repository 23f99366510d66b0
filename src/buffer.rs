//! Fixed-capacity communication buffer shared between the bridge and its caller.
//!
//! Every byte-producing operation writes starting at offset 0 and reports the
//! byte count written; every byte-consuming operation reads a caller-specified
//! number of bytes from offset 0. Scalar-returning operations never touch the
//! buffer.
//!
//! # Capacity Contract
//!
//! No write may exceed capacity. A write that would overflow yields a distinct
//! [`BridgeError::BufferOverflow`] carrying the required and available sizes;
//! the buffer is never silently truncated. The single exception is the error
//! reporter, which uses [`CommBuffer::put_truncated`] to clamp diagnostics.
//!
//! # Sharing
//!
//! The caller owns the buffer and hands the session a [`SharedBuffer`] handle.
//! The handle is a cheap clone over one locked region; the session may be
//! rebound to a different buffer between calls, but exactly one buffer is
//! active at a time.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::error::BridgeError;

/// Default buffer capacity: 33 MB.
///
/// Large enough for a 2048x2048 region with four 16-bit channels.
pub const DEFAULT_BUFFER_CAPACITY: usize = 33_554_432;

// =============================================================================
// Communication Buffer
// =============================================================================

/// A fixed-capacity byte region with an explicit write cursor.
///
/// The cursor mirrors the rewind-then-transfer discipline of the wire
/// protocol: callers must [`CommBuffer::rewind`] before every transfer, then
/// append with [`CommBuffer::put`]. Multi-part outputs (the used-files
/// listing, lookup-table rows) append in sequence and report the final cursor
/// position as the byte count.
pub struct CommBuffer {
    data: Box<[u8]>,
    cursor: usize,
}

impl CommBuffer {
    /// Allocate a buffer of `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            cursor: 0,
        }
    }

    /// Total capacity in bytes. Fixed for the buffer's lifetime.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Current cursor position, equal to the bytes written since the last rewind.
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Reset the cursor to offset 0. Required immediately before each transfer.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Append `bytes` at the cursor, failing distinctly if they do not fit.
    ///
    /// On overflow nothing is written and the cursor is unchanged, so a
    /// multi-part transfer never leaves a partial trailing entry.
    pub fn put(&mut self, bytes: &[u8]) -> Result<(), BridgeError> {
        let required = self.cursor + bytes.len();
        if required > self.data.len() {
            return Err(BridgeError::BufferOverflow {
                required,
                available: self.data.len(),
            });
        }
        self.data[self.cursor..required].copy_from_slice(bytes);
        self.cursor = required;
        Ok(())
    }

    /// Append a slice of 16-bit samples in little-endian order.
    pub fn put_u16_slice_le(&mut self, samples: &[u16]) -> Result<(), BridgeError> {
        let required = self.cursor + samples.len() * 2;
        if required > self.data.len() {
            return Err(BridgeError::BufferOverflow {
                required,
                available: self.data.len(),
            });
        }
        for (i, sample) in samples.iter().enumerate() {
            let at = self.cursor + i * 2;
            self.data[at..at + 2].copy_from_slice(&sample.to_le_bytes());
        }
        self.cursor = required;
        Ok(())
    }

    /// Append as much of `bytes` as fits and return the count written.
    ///
    /// Reserved for the error reporter, which must always be able to record
    /// some diagnostic. Data paths use [`CommBuffer::put`].
    pub fn put_truncated(&mut self, bytes: &[u8]) -> usize {
        let room = self.data.len() - self.cursor;
        let n = bytes.len().min(room);
        self.data[self.cursor..self.cursor + n].copy_from_slice(&bytes[..n]);
        self.cursor += n;
        n
    }

    /// Read the first `len` bytes, the inbound-parameter convention.
    ///
    /// The length is a caller-passed parameter, never a terminator scan.
    pub fn read_prefix(&self, len: usize) -> Result<Vec<u8>, BridgeError> {
        if len > self.data.len() {
            return Err(BridgeError::InvalidRequest(format!(
                "requested {} parameter bytes from a {}-byte buffer",
                len,
                self.data.len()
            )));
        }
        Ok(self.data[..len].to_vec())
    }

    /// Write caller parameter bytes at offset 0 (the inbound direction).
    pub fn write_request(&mut self, bytes: &[u8]) -> Result<usize, BridgeError> {
        self.rewind();
        self.put(bytes)?;
        Ok(bytes.len())
    }
}

// =============================================================================
// Shared Handle
// =============================================================================

/// Clonable handle to a caller-owned [`CommBuffer`].
///
/// The bridge references the buffer, it never owns it: the caller keeps a
/// clone for writing request parameters and reading results back. All access
/// goes through one mutex, matching the single-lock concurrency strategy of
/// the bridge.
#[derive(Clone)]
pub struct SharedBuffer {
    inner: Arc<Mutex<CommBuffer>>,
}

impl SharedBuffer {
    /// Allocate a shared buffer with the default 33 MB capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }

    /// Allocate a shared buffer of `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CommBuffer::with_capacity(capacity))),
        }
    }

    /// Lock the underlying buffer for a transfer.
    pub fn lock(&self) -> MutexGuard<'_, CommBuffer> {
        self.inner.lock()
    }

    /// Buffer capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }

    /// Caller-side helper: place request parameter bytes at offset 0.
    pub fn write_request(&self, bytes: &[u8]) -> Result<usize, BridgeError> {
        self.inner.lock().write_request(bytes)
    }

    /// Caller-side helper: read back exactly `len` result bytes from offset 0.
    pub fn read_response(&self, len: usize) -> Result<Vec<u8>, BridgeError> {
        self.inner.lock().read_prefix(len)
    }
}

impl Default for SharedBuffer {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
