//! Capability interface fulfilled by the external decoding engine.
//!
//! The bridge never talks to the engine's native object model. Instead the
//! engine is adapted to two small traits: [`ReaderOpener`], which probes and
//! opens files across the engine's candidate readers, and [`FormatAdapter`],
//! the capability surface of one opened resource. Both return `Result`s; a
//! raised condition never crosses this boundary.
//!
//! The optional on-disk memoization decorator wraps [`ReaderOpener`] and is
//! selected once at construction, see [`memo`].

pub mod memo;
pub mod thumbnail;

use std::path::Path;

use bytes::Bytes;

use crate::error::AdapterError;
use crate::pixel::PixelType;

pub use memo::{resolve_cache_dir, select_opener, MemoizedOpener};
pub use thumbnail::{render_thumbnail, PlaneLayout};

// =============================================================================
// Value Types
// =============================================================================

/// A pixel-space rectangle within the current resolution level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Physical pixel sizes for one series, in micrometers.
///
/// `None` means the file does not specify the size along that axis.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhysicalSizes {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

/// The 5-symbol permutation describing how a plane index maps to
/// (X, Y, Z, C, T) traversal. X and Y always come first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DimensionOrder {
    Xyzct,
    Xyztc,
    Xyczt,
    Xyctz,
    Xytcz,
    Xytzc,
}

impl DimensionOrder {
    /// The canonical 5-byte wire form, e.g. `"XYCZT"`.
    pub fn as_str(self) -> &'static str {
        match self {
            DimensionOrder::Xyzct => "XYZCT",
            DimensionOrder::Xyztc => "XYZTC",
            DimensionOrder::Xyczt => "XYCZT",
            DimensionOrder::Xyctz => "XYCTZ",
            DimensionOrder::Xytcz => "XYTCZ",
            DimensionOrder::Xytzc => "XYTZC",
        }
    }
}

// =============================================================================
// Format Adapter
// =============================================================================

/// Capability surface of one opened image resource.
///
/// Implementations are stateful: they carry a current series and a current
/// resolution, changed through [`FormatAdapter::set_series`] and
/// [`FormatAdapter::set_resolution`]. All dimensional and color-model queries
/// answer for the current selection. `set_series` must reset the current
/// resolution to 0.
///
/// Index validation belongs to the adapter: out-of-range series or
/// resolution indices fail with [`AdapterError::IndexOutOfRange`].
pub trait FormatAdapter: Send {
    /// Canonical name of the detected format, e.g. `"Aperio SVS"`.
    fn format_name(&self) -> &str;

    /// Path this adapter was opened with.
    fn current_file(&self) -> &str;

    /// Every file constituting the logical image, the opened path included.
    fn used_files(&self) -> Vec<String>;

    /// Whether the format is inherently single-file.
    fn is_single_file(&self) -> bool;

    fn series_count(&self) -> usize;

    fn set_series(&mut self, index: usize) -> Result<(), AdapterError>;

    /// Pyramid level count for the current series.
    fn resolution_count(&self) -> usize;

    fn set_resolution(&mut self, index: usize) -> Result<(), AdapterError>;

    /// Width of the current resolution in pixels.
    fn size_x(&self) -> u32;

    /// Height of the current resolution in pixels.
    fn size_y(&self) -> u32;

    /// Channel count.
    fn size_c(&self) -> u32;

    /// Depth (focal planes).
    fn size_z(&self) -> u32;

    /// Time points.
    fn size_t(&self) -> u32;

    /// Channel count after merging composite channels (RGB counts as one).
    fn effective_size_c(&self) -> u32;

    /// Plane count for the current series:
    /// `effective_size_c * size_z * size_t`.
    fn image_count(&self) -> u32 {
        self.effective_size_c() * self.size_z() * self.size_t()
    }

    fn dimension_order(&self) -> DimensionOrder;

    /// Whether the reported dimension order is certain.
    fn is_order_certain(&self) -> bool;

    fn optimal_tile_width(&self) -> u32;

    fn optimal_tile_height(&self) -> u32;

    fn pixel_type(&self) -> PixelType;

    /// Valid bits per sample; may be fewer than the storage width
    /// (e.g. 12-bit data stored as 16).
    fn bits_per_pixel(&self) -> u32 {
        self.pixel_type().bits_per_pixel() as u32
    }

    /// Channels returned by a single region decode. 3 or 4 for RGB(A)
    /// sources, otherwise 1.
    fn rgb_channel_count(&self) -> u32;

    /// Whether one decode call returns samples for multiple channels.
    fn is_rgb(&self) -> bool;

    /// Sample layout of decoded regions: interleaved (RGBRGB) or planar.
    fn is_interleaved(&self) -> bool;

    /// Endianness of multi-byte samples in decoded regions.
    fn is_little_endian(&self) -> bool;

    /// Whether sample values index into a lookup table.
    fn is_indexed_color(&self) -> bool;

    /// Whether the lookup table is merely decorative. Indexed but not
    /// false-color means the table must be applied for correct rendering.
    fn is_false_color(&self) -> bool;

    /// 8-bit lookup table: rows of 256 entries each.
    fn lookup_table_8(&self) -> Result<Vec<Vec<u8>>, AdapterError>;

    /// 16-bit lookup table: rows of 65536 samples each.
    fn lookup_table_16(&self) -> Result<Vec<Vec<u16>>, AdapterError>;

    /// Decode a region of the given plane at the current series/resolution.
    ///
    /// Must produce exactly
    /// `width * height * bytes_per_pixel * rgb_channel_count` bytes.
    fn open_region(&mut self, plane: u32, region: Region) -> Result<Bytes, AdapterError>;

    /// Decode a thumbnail with exact dimensions in one call.
    ///
    /// Selects the coarsest pyramid level, then produces a `width` x `height`
    /// preview normalized for uniform compositing: 3 or 4 interleaved
    /// channels, unsigned sample representation regardless of the source's
    /// signedness. Engines with a native scaler may override; the default
    /// reads the full coarsest plane and renders it bridge-side.
    fn decode_thumbnail(
        &mut self,
        plane: u32,
        width: u32,
        height: u32,
    ) -> Result<Bytes, AdapterError> {
        let coarsest = self.resolution_count().saturating_sub(1);
        self.set_resolution(coarsest)?;

        let full = Region::new(0, 0, self.size_x(), self.size_y());
        let raw = self.open_region(plane, full)?;
        let layout = PlaneLayout {
            width: full.width,
            height: full.height,
            channels: self.rgb_channel_count(),
            interleaved: self.is_interleaved(),
            pixel_type: self.pixel_type(),
            little_endian: self.is_little_endian(),
        };
        render_thumbnail(&raw, &layout, width, height)
    }

    /// Physical pixel sizes for a series, gathered during open.
    fn physical_sizes(&self, series: usize) -> Result<PhysicalSizes, AdapterError>;

    /// Release underlying file handles. Best-effort; never fails.
    fn close(&mut self);
}

// =============================================================================
// Reader Opener
// =============================================================================

/// Probe-and-open surface over the engine's candidate readers.
///
/// `open` walks the candidates and returns an adapter for the first one that
/// accepts the file. [`memo::MemoizedOpener`] decorates this trait to skip
/// probing when a prior open already identified the right reader.
pub trait ReaderOpener: Send {
    /// Whether any candidate reader can read `path`. Never retains state.
    fn is_compatible(&self, path: &Path) -> Result<bool, AdapterError>;

    /// Open `path`, probing candidate readers in order.
    fn open(&self, path: &Path) -> Result<Box<dyn FormatAdapter>, AdapterError>;

    /// Open with a format-name hint from a previous successful open.
    ///
    /// Implementations may use the hint to skip probing; the default ignores
    /// it. Must behave exactly like [`ReaderOpener::open`] when the hint is
    /// stale or unknown.
    fn open_with_hint(
        &self,
        path: &Path,
        hint: Option<&str>,
    ) -> Result<Box<dyn FormatAdapter>, AdapterError> {
        let _ = hint;
        self.open(path)
    }
}

// =============================================================================
// Tests
// =============================================================================
