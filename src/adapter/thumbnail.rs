//! Bridge-side thumbnail rendering.
//!
//! Backs the default [`crate::adapter::FormatAdapter::decode_thumbnail`]
//! implementation: a full coarsest-level plane comes in, a preview with
//! exact caller-requested dimensions comes out. The output is normalized so
//! callers can composite previews uniformly across modalities:
//!
//! - nearest-neighbor scaled to exactly `width` x `height`;
//! - always 3 or 4 interleaved channels: sources with 4 or more channels
//!   keep their first 4, sources with fewer fill the missing channels from
//!   channel 0;
//! - unsigned sample representation, whatever the source's signedness. The
//!   sample width and endianness are preserved.

use bytes::Bytes;

use crate::error::AdapterError;
use crate::pixel::PixelType;

/// Sample layout of a decoded source plane.
#[derive(Debug, Clone, Copy)]
pub struct PlaneLayout {
    pub width: u32,
    pub height: u32,
    /// Channels per pixel as decoded (the rgb channel count)
    pub channels: u32,
    /// Interleaved (RGBRGB...) or planar (RR..GG..BB..)
    pub interleaved: bool,
    pub pixel_type: PixelType,
    pub little_endian: bool,
}

/// Render a normalized thumbnail from a raw decoded plane.
///
/// `raw` must hold exactly
/// `width * height * channels * bytes_per_pixel` bytes.
pub fn render_thumbnail(
    raw: &[u8],
    src: &PlaneLayout,
    width: u32,
    height: u32,
) -> Result<Bytes, AdapterError> {
    if src.pixel_type == PixelType::Bit {
        return Err(AdapterError::Decode(
            "bit-packed planes are not supported for thumbnails".into(),
        ));
    }
    if width == 0 || height == 0 {
        return Err(AdapterError::Decode(
            "thumbnail dimensions must be nonzero".into(),
        ));
    }
    if src.width == 0 || src.height == 0 || src.channels == 0 {
        return Err(AdapterError::Decode("source plane is empty".into()));
    }

    let bpp = src.pixel_type.bytes_per_pixel();
    let src_w = src.width as usize;
    let src_h = src.height as usize;
    let src_c = src.channels as usize;
    let expected = src_w * src_h * src_c * bpp;
    if raw.len() != expected {
        return Err(AdapterError::Decode(format!(
            "source plane is {} bytes, expected {}",
            raw.len(),
            expected
        )));
    }

    let out_c = if src_c >= 4 { 4 } else { 3 };
    let out_w = width as usize;
    let out_h = height as usize;
    let mut out = vec![0u8; out_w * out_h * out_c * bpp];

    // Sign-bit flip converts two's complement to the unsigned value shifted
    // by half the range, reinterpreting samples as the unsigned companion
    // type of the same width.
    let flip_msb = src.pixel_type.unsigned_companion() != src.pixel_type;
    let msb = if src.little_endian { bpp - 1 } else { 0 };

    for oy in 0..out_h {
        let sy = oy * src_h / out_h;
        for ox in 0..out_w {
            let sx = ox * src_w / out_w;
            for ch in 0..out_c {
                // Fill channels the source lacks from channel 0
                let sc = if ch < src_c { ch } else { 0 };
                let src_at = if src.interleaved {
                    ((sy * src_w + sx) * src_c + sc) * bpp
                } else {
                    (sc * src_w * src_h + sy * src_w + sx) * bpp
                };
                let dst_at = ((oy * out_w + ox) * out_c + ch) * bpp;
                out[dst_at..dst_at + bpp].copy_from_slice(&raw[src_at..src_at + bpp]);
                if flip_msb {
                    out[dst_at + msb] ^= 0x80;
                }
            }
        }
    }

    Ok(Bytes::from(out))
}

// =============================================================================
// Tests
// =============================================================================
