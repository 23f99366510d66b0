//! Error reporter sharing the communication buffer with result data.
//!
//! On any caught failure the session composes a diagnostic (message plus
//! cause chain), writes it at offset 0 of the communication buffer, and
//! records the exact byte length written. Callers retrieve the length via
//! the error-length query and must read back exactly that many bytes,
//! immediately after the call that returned a failure sentinel.

use crate::buffer::SharedBuffer;

/// Record of the last diagnostic materialized in the communication buffer.
///
/// The record is overwritten on every failure and deliberately NOT cleared
/// on success: it is only contractually meaningful immediately after a call
/// that returned a failure sentinel.
#[derive(Debug, Default)]
pub struct ErrorRecord {
    last_len: usize,
}

impl ErrorRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Byte length of the last recorded diagnostic.
    pub fn len(&self) -> usize {
        self.last_len
    }

    pub fn is_empty(&self) -> bool {
        self.last_len == 0
    }

    /// Write `diagnostic` into the buffer and remember its exact length.
    ///
    /// The text is truncated to at most capacity - 1 bytes, reserving one
    /// byte so the caller can always append a terminator safely. Truncation
    /// falls on a byte boundary; a diagnostic may lose a trailing multi-byte
    /// character, never its meaning.
    pub fn record(&mut self, buffer: &SharedBuffer, diagnostic: &str) {
        let mut buf = buffer.lock();
        let limit = buf.capacity().saturating_sub(1);
        let bytes = diagnostic.as_bytes();
        let clamped = &bytes[..bytes.len().min(limit)];
        buf.rewind();
        self.last_len = buf.put_truncated(clamped);
    }
}

// =============================================================================
// Tests
// =============================================================================
