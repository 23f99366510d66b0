//! Pixel encoding codes shared with the decoding engine.
//!
//! The engine reports pixels with a small integer code; the bridge forwards
//! that code unchanged across the boundary and derives bit and byte widths
//! from it. The table is stable ABI: codes must never be renumbered.

use crate::error::AdapterError;

/// Pixel sample type, in the engine's canonical code order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float,
    Double,
    /// Bit-packed black and white, one sample per bit
    Bit,
}

impl PixelType {
    /// The wire code reported to callers.
    pub fn code(self) -> i32 {
        match self {
            PixelType::Int8 => 0,
            PixelType::UInt8 => 1,
            PixelType::Int16 => 2,
            PixelType::UInt16 => 3,
            PixelType::Int32 => 4,
            PixelType::UInt32 => 5,
            PixelType::Float => 6,
            PixelType::Double => 7,
            PixelType::Bit => 8,
        }
    }

    /// Decode a wire code.
    pub fn from_code(code: i32) -> Result<Self, AdapterError> {
        match code {
            0 => Ok(PixelType::Int8),
            1 => Ok(PixelType::UInt8),
            2 => Ok(PixelType::Int16),
            3 => Ok(PixelType::UInt16),
            4 => Ok(PixelType::Int32),
            5 => Ok(PixelType::UInt32),
            6 => Ok(PixelType::Float),
            7 => Ok(PixelType::Double),
            8 => Ok(PixelType::Bit),
            other => Err(AdapterError::Decode(format!(
                "unknown pixel type code {other}"
            ))),
        }
    }

    /// Storage bytes per sample per channel.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelType::Int8 | PixelType::UInt8 | PixelType::Bit => 1,
            PixelType::Int16 | PixelType::UInt16 => 2,
            PixelType::Int32 | PixelType::UInt32 | PixelType::Float => 4,
            PixelType::Double => 8,
        }
    }

    /// Storage bits per sample per channel.
    pub fn bits_per_pixel(self) -> usize {
        match self {
            PixelType::Bit => 1,
            other => other.bytes_per_pixel() * 8,
        }
    }

    /// Whether samples are signed two's-complement integers.
    pub fn is_signed_int(self) -> bool {
        matches!(self, PixelType::Int8 | PixelType::Int16 | PixelType::Int32)
    }

    /// The unsigned type of the same width, used by thumbnail normalization.
    ///
    /// Non-integer and already-unsigned types map to themselves.
    pub fn unsigned_companion(self) -> Self {
        match self {
            PixelType::Int8 => PixelType::UInt8,
            PixelType::Int16 => PixelType::UInt16,
            PixelType::Int32 => PixelType::UInt32,
            other => other,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
