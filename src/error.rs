use thiserror::Error;

/// Sentinel returned for any failure other than a buffer overflow.
pub const SENTINEL_FAILURE: i32 = -1;

/// Sentinel returned when an output would not fit in the communication buffer.
pub const SENTINEL_OVERFLOW: i32 = -2;

/// Sentinel returned by the physical-size queries on failure.
pub const SENTINEL_FAILURE_F64: f64 = -1.0;

/// Errors raised by the decoding engine behind the capability interface.
///
/// The engine never raises across the bridge boundary: every adapter call
/// returns a `Result` carrying one of these, and the session layer converts
/// it to the sentinel-plus-diagnostic contract.
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    /// No candidate reader recognizes the file
    #[error("Unsupported format: no reader recognizes {path}")]
    UnsupportedFormat { path: String },

    /// I/O error while probing or reading the file
    #[error("I/O error: {0}")]
    Io(String),

    /// Series or resolution index outside the valid range
    #[error("{kind} index {index} out of range (count is {count})")]
    IndexOutOfRange {
        kind: &'static str,
        index: usize,
        count: usize,
    },

    /// The engine failed to decode the requested pixels
    #[error("Decode failed: {0}")]
    Decode(String),

    /// Lookup table rows have an unexpected length
    #[error("Malformed lookup table: expected {expected}-entry rows, got {actual}")]
    MalformedLookupTable { expected: usize, actual: usize },

    /// The current image carries no lookup table
    #[error("No lookup table for the current image")]
    NoLookupTable,
}

impl AdapterError {
    /// Wrap a `std::io::Error` raised while touching the file.
    pub fn io(err: std::io::Error) -> Self {
        AdapterError::Io(err.to_string())
    }
}

/// Errors recovered at the operation boundary of the bridge.
///
/// No failure escapes a single operation: each public session method catches
/// one of these, records the diagnostic in the communication buffer, and
/// returns the matching sentinel.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// Failure surfaced by the format adapter
    #[error("Reader error: {0}")]
    Adapter(#[from] AdapterError),

    /// Output would not fit in the communication buffer
    #[error("Output too large for the communication buffer: needed {required} bytes but the buffer holds {available}")]
    BufferOverflow { required: usize, available: usize },

    /// An operation requiring an open file was called while closed
    #[error("No file is currently open")]
    NoFileOpen,

    /// No communication buffer has been bound yet
    #[error("No communication buffer is bound")]
    NoBufferBound,

    /// Request parameters are malformed (bad length, negative size, bad UTF-8)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The metadata document could not be serialized or parsed
    #[error("Metadata document error: {0}")]
    Metadata(String),
}

impl BridgeError {
    /// Map this error to the numeric sentinel reported to the caller.
    ///
    /// `-2` is reserved for buffer-capacity failures; everything else is `-1`.
    pub fn sentinel(&self) -> i32 {
        match self {
            BridgeError::BufferOverflow { .. } => SENTINEL_OVERFLOW,
            _ => SENTINEL_FAILURE,
        }
    }

    /// Compose the full diagnostic: the error message plus its cause chain.
    ///
    /// This is the text the error reporter materializes in the buffer.
    pub fn diagnostic(&self) -> String {
        let mut out = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            out.push_str("\ncaused by: ");
            out.push_str(&cause.to_string());
            source = cause.source();
        }
        out
    }
}

// =============================================================================
// Tests
// =============================================================================
