//! The single reader session and its flat operation table.
//!
//! [`BridgeSession`] is the state machine tying the bridge together: it owns
//! at most one open format adapter, the current series/resolution selection,
//! the metadata snapshot, and the error record. Every public operation
//! mirrors one entry of the wire-level operation table and returns either an
//! integer status/byte-count or a double; `-1` is the generic failure
//! sentinel, `-2` means the output would not fit in the communication
//! buffer.
//!
//! # Failure policy
//!
//! No failure escapes a single operation. Each call is transactional: a
//! failed query leaves the session unchanged, a failed open leaves it
//! CLOSED. On any failure the diagnostic (message plus cause chain) is
//! materialized in the communication buffer and its exact byte length is
//! recorded; callers fetch it via [`BridgeSession::get_last_error_length`]
//! immediately after the failing call.
//!
//! # Concurrency
//!
//! The session is single-threaded by design: one open file, one buffer, one
//! error record. Callers needing cross-thread access wrap the whole session
//! in one mutex.

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;

use lru::LruCache;
use tracing::debug;

use crate::adapter::{select_opener, FormatAdapter, ReaderOpener, Region};
use crate::buffer::SharedBuffer;
use crate::config::BridgeConfig;
use crate::error::{AdapterError, BridgeError, SENTINEL_FAILURE_F64};
use crate::metadata::MetadataStore;
use crate::report::ErrorRecord;

/// Status returned by operations that carry no payload.
pub const OP_OK: i32 = 1;

/// Lookup tables cached per (series, resolution); the engine's readers do
/// not reliably serve them from cache.
const LUT_CACHE_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LutWidth {
    Eight,
    Sixteen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct LutKey {
    series: usize,
    resolution: usize,
    width: LutWidth,
}

enum CachedLut {
    Bytes(Arc<Vec<Vec<u8>>>),
    Words(Arc<Vec<Vec<u16>>>),
}

enum Axis {
    X,
    Y,
    Z,
}

// =============================================================================
// Bridge Session
// =============================================================================

/// Single-session bridge state machine.
///
/// States: CLOSED (no file) and OPEN (file bound, series and resolution
/// default to 0). See the module docs for the failure policy.
pub struct BridgeSession {
    opener: Box<dyn ReaderOpener>,
    buffer: Option<SharedBuffer>,
    reader: Option<Box<dyn FormatAdapter>>,
    current_series: usize,
    current_resolution: usize,
    metadata: MetadataStore,
    errors: ErrorRecord,
    lut_cache: LruCache<LutKey, CachedLut>,
}

impl BridgeSession {
    /// Build a session over the engine's opener.
    ///
    /// The memoizing decorator is selected here, once, from the configured
    /// cache directory; it is never swapped afterwards.
    pub fn new(opener: Box<dyn ReaderOpener>, config: &BridgeConfig) -> Self {
        let opener = select_opener(opener, config.cache_dir.as_deref());
        Self {
            opener,
            buffer: None,
            reader: None,
            current_series: 0,
            current_resolution: 0,
            metadata: MetadataStore::new(),
            errors: ErrorRecord::new(),
            lut_cache: LruCache::new(
                NonZeroUsize::new(LUT_CACHE_CAPACITY).expect("nonzero capacity"),
            ),
        }
    }

    /// Associate a caller-owned communication buffer.
    ///
    /// May be called again between operations to rebind; exactly one buffer
    /// is active at a time.
    pub fn bind_buffer(&mut self, buffer: SharedBuffer) {
        self.buffer = Some(buffer);
    }

    /// Whether a file is currently open.
    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    /// Currently selected series index.
    pub fn current_series(&self) -> usize {
        self.current_series
    }

    /// Currently selected resolution index.
    pub fn current_resolution(&self) -> usize {
        self.current_resolution
    }

    // =========================================================================
    // Error reporting
    // =========================================================================

    /// Byte length of the last recorded diagnostic.
    ///
    /// Only meaningful immediately after a call that returned a failure
    /// sentinel; the record is overwritten on every failure and deliberately
    /// not cleared on success.
    pub fn get_last_error_length(&self) -> i32 {
        self.errors.len() as i32
    }

    fn fail(&mut self, err: BridgeError) -> i32 {
        let sentinel = err.sentinel();
        debug!(error = %err, sentinel, "operation failed");
        if let Some(buffer) = &self.buffer {
            self.errors.record(buffer, &err.diagnostic());
        }
        sentinel
    }

    fn fail_f64(&mut self, err: BridgeError) -> f64 {
        self.fail(err);
        SENTINEL_FAILURE_F64
    }

    // =========================================================================
    // File lifecycle
    // =========================================================================

    /// Probe whether any candidate reader can read the named file.
    ///
    /// The name is the first `name_len` bytes of the buffer. Probing closes
    /// any open file first and never leaves the session OPEN. Returns 1 for
    /// compatible, 0 for incompatible.
    pub fn is_compatible(&mut self, name_len: i32) -> i32 {
        match self.try_is_compatible(name_len) {
            Ok(v) => v,
            Err(e) => self.fail(e),
        }
    }

    fn try_is_compatible(&mut self, name_len: i32) -> Result<i32, BridgeError> {
        let path = self.read_name(name_len)?;
        self.close_quietly();
        let compatible = self.opener.is_compatible(Path::new(&path))?;
        Ok(compatible as i32)
    }

    /// 1 if a file is open, 0 otherwise. Never touches the buffer.
    pub fn is_any_file_open(&mut self) -> i32 {
        self.reader.is_some() as i32
    }

    /// Open the file named by the first `name_len` buffer bytes.
    ///
    /// Any previously open file is closed first. On success the session is
    /// OPEN with series and resolution reset to 0 and the metadata snapshot
    /// replaced; on failure it is CLOSED.
    pub fn open(&mut self, name_len: i32) -> i32 {
        match self.try_open(name_len) {
            Ok(v) => v,
            Err(e) => self.fail(e),
        }
    }

    fn try_open(&mut self, name_len: i32) -> Result<i32, BridgeError> {
        let path = self.read_name(name_len)?;
        self.close_quietly();

        let mut adapter = self.opener.open(Path::new(&path))?;
        match MetadataStore::from_adapter(adapter.as_ref()) {
            Ok(snapshot) => self.metadata = snapshot,
            Err(e) => {
                adapter.close();
                return Err(e);
            }
        }

        debug!(path = %path, format = adapter.format_name(), "opened file");
        self.reader = Some(adapter);
        self.current_series = 0;
        self.current_resolution = 0;
        self.lut_cache.clear();
        Ok(OP_OK)
    }

    /// Release the open file. Idempotent and best-effort: calling while
    /// CLOSED is a no-op and never fails.
    ///
    /// The metadata snapshot survives until the next open.
    pub fn close(&mut self) -> i32 {
        self.close_quietly();
        OP_OK
    }

    fn close_quietly(&mut self) {
        if let Some(mut adapter) = self.reader.take() {
            debug!(path = adapter.current_file(), "closing file");
            adapter.close();
        }
        self.current_series = 0;
        self.current_resolution = 0;
        self.lut_cache.clear();
    }

    // =========================================================================
    // Identification
    // =========================================================================

    /// Write the canonical format name; returns the byte count written.
    pub fn get_format(&mut self) -> i32 {
        match self.try_get_format() {
            Ok(v) => v,
            Err(e) => self.fail(e),
        }
    }

    fn try_get_format(&mut self) -> Result<i32, BridgeError> {
        let name = self.adapter()?.format_name().to_owned();
        self.write_bytes(name.as_bytes())
    }

    /// Whether the named file would be the complete logical image on its
    /// own. Probes like [`BridgeSession::is_compatible`]: closes any open
    /// file and never leaves the session OPEN.
    pub fn is_single_file(&mut self, name_len: i32) -> i32 {
        match self.try_is_single_file(name_len) {
            Ok(v) => v,
            Err(e) => self.fail(e),
        }
    }

    fn try_is_single_file(&mut self, name_len: i32) -> Result<i32, BridgeError> {
        let path = self.read_name(name_len)?;
        self.close_quietly();
        let mut adapter = self.opener.open(Path::new(&path))?;
        let single = adapter.is_single_file();
        adapter.close();
        Ok(single as i32)
    }

    /// Write the current file path; returns the byte count written, or 0
    /// when no file is open (a defined result, not an error).
    pub fn get_current_file(&mut self) -> i32 {
        match self.try_get_current_file() {
            Ok(v) => v,
            Err(e) => self.fail(e),
        }
    }

    fn try_get_current_file(&mut self) -> Result<i32, BridgeError> {
        let path = match &self.reader {
            Some(adapter) => adapter.current_file().to_owned(),
            None => return Ok(0),
        };
        self.write_bytes(path.as_bytes())
    }

    /// Write the null-separated list of files constituting the image.
    ///
    /// The returned length includes the final terminator byte.
    pub fn get_used_files(&mut self) -> i32 {
        match self.try_get_used_files() {
            Ok(v) => v,
            Err(e) => self.fail(e),
        }
    }

    fn try_get_used_files(&mut self) -> Result<i32, BridgeError> {
        let files = self.adapter()?.used_files();
        let buffer = self.buffer()?.clone();
        let mut buf = buffer.lock();
        buf.rewind();
        for file in &files {
            buf.put(file.as_bytes())?;
            buf.put(&[0])?;
        }
        Ok(buf.position() as i32)
    }

    // =========================================================================
    // Series and resolution selection
    // =========================================================================

    pub fn get_series_count(&mut self) -> i32 {
        self.scalar(|a| a.series_count() as i32)
    }

    /// Select a series. Resets the current resolution to 0.
    pub fn set_series(&mut self, index: i32) -> i32 {
        match self.try_set_series(index) {
            Ok(v) => v,
            Err(e) => self.fail(e),
        }
    }

    fn try_set_series(&mut self, index: i32) -> Result<i32, BridgeError> {
        let index = nonneg(index, "series index")?;
        self.adapter_mut()?.set_series(index)?;
        self.current_series = index;
        self.current_resolution = 0;
        Ok(OP_OK)
    }

    /// Pyramid level count for the current series.
    pub fn get_resolution_count(&mut self) -> i32 {
        self.scalar(|a| a.resolution_count() as i32)
    }

    pub fn set_resolution(&mut self, index: i32) -> i32 {
        match self.try_set_resolution(index) {
            Ok(v) => v,
            Err(e) => self.fail(e),
        }
    }

    fn try_set_resolution(&mut self, index: i32) -> Result<i32, BridgeError> {
        let index = nonneg(index, "resolution index")?;
        self.adapter_mut()?.set_resolution(index)?;
        self.current_resolution = index;
        Ok(OP_OK)
    }

    // =========================================================================
    // Dimensional metadata (current series and resolution)
    // =========================================================================

    pub fn get_size_x(&mut self) -> i32 {
        self.scalar(|a| a.size_x() as i32)
    }

    pub fn get_size_y(&mut self) -> i32 {
        self.scalar(|a| a.size_y() as i32)
    }

    pub fn get_size_c(&mut self) -> i32 {
        self.scalar(|a| a.size_c() as i32)
    }

    pub fn get_size_z(&mut self) -> i32 {
        self.scalar(|a| a.size_z() as i32)
    }

    pub fn get_size_t(&mut self) -> i32 {
        self.scalar(|a| a.size_t() as i32)
    }

    pub fn get_effective_size_c(&mut self) -> i32 {
        self.scalar(|a| a.effective_size_c() as i32)
    }

    pub fn get_image_count(&mut self) -> i32 {
        self.scalar(|a| a.image_count() as i32)
    }

    /// Write the 5-symbol dimension order; returns 5 on success.
    pub fn get_dimension_order(&mut self) -> i32 {
        match self.try_get_dimension_order() {
            Ok(v) => v,
            Err(e) => self.fail(e),
        }
    }

    fn try_get_dimension_order(&mut self) -> Result<i32, BridgeError> {
        let order = self.adapter()?.dimension_order();
        self.write_bytes(order.as_str().as_bytes())
    }

    pub fn is_order_certain(&mut self) -> i32 {
        self.scalar(|a| a.is_order_certain() as i32)
    }

    pub fn get_optimal_tile_width(&mut self) -> i32 {
        self.scalar(|a| a.optimal_tile_width() as i32)
    }

    pub fn get_optimal_tile_height(&mut self) -> i32 {
        self.scalar(|a| a.optimal_tile_height() as i32)
    }

    // =========================================================================
    // Pixel encoding
    // =========================================================================

    pub fn get_pixel_type(&mut self) -> i32 {
        self.scalar(|a| a.pixel_type().code())
    }

    pub fn get_bits_per_pixel(&mut self) -> i32 {
        self.scalar(|a| a.bits_per_pixel() as i32)
    }

    pub fn get_bytes_per_pixel(&mut self) -> i32 {
        self.scalar(|a| a.pixel_type().bytes_per_pixel() as i32)
    }

    pub fn get_rgb_channel_count(&mut self) -> i32 {
        self.scalar(|a| a.rgb_channel_count() as i32)
    }

    pub fn is_rgb(&mut self) -> i32 {
        self.scalar(|a| a.is_rgb() as i32)
    }

    pub fn is_interleaved(&mut self) -> i32 {
        self.scalar(|a| a.is_interleaved() as i32)
    }

    pub fn is_little_endian(&mut self) -> i32 {
        self.scalar(|a| a.is_little_endian() as i32)
    }

    pub fn is_false_color(&mut self) -> i32 {
        self.scalar(|a| a.is_false_color() as i32)
    }

    pub fn is_indexed_color(&mut self) -> i32 {
        self.scalar(|a| a.is_indexed_color() as i32)
    }

    // =========================================================================
    // Lookup tables
    // =========================================================================

    /// Write the 8-bit lookup table as rows of 256 bytes; returns the byte
    /// count written. Fails distinctly if any row length is not 256.
    pub fn get_8bit_lookup_table(&mut self) -> i32 {
        match self.try_get_8bit_lookup_table() {
            Ok(v) => v,
            Err(e) => self.fail(e),
        }
    }

    fn try_get_8bit_lookup_table(&mut self) -> Result<i32, BridgeError> {
        let key = self.lut_key(LutWidth::Eight)?;
        let table = match self.lut_cache.get(&key) {
            Some(CachedLut::Bytes(table)) => Arc::clone(table),
            _ => {
                let raw = self.adapter()?.lookup_table_8()?;
                for row in &raw {
                    if row.len() != 256 {
                        return Err(AdapterError::MalformedLookupTable {
                            expected: 256,
                            actual: row.len(),
                        }
                        .into());
                    }
                }
                let table = Arc::new(raw);
                self.lut_cache.put(key, CachedLut::Bytes(Arc::clone(&table)));
                table
            }
        };

        let buffer = self.buffer()?.clone();
        let mut buf = buffer.lock();
        buf.rewind();
        for row in table.iter() {
            buf.put(row)?;
        }
        Ok(buf.position() as i32)
    }

    /// Write the 16-bit lookup table as rows of 65536 little-endian samples;
    /// returns the byte count written. Fails distinctly if any row length is
    /// not 65536.
    pub fn get_16bit_lookup_table(&mut self) -> i32 {
        match self.try_get_16bit_lookup_table() {
            Ok(v) => v,
            Err(e) => self.fail(e),
        }
    }

    fn try_get_16bit_lookup_table(&mut self) -> Result<i32, BridgeError> {
        let key = self.lut_key(LutWidth::Sixteen)?;
        let table = match self.lut_cache.get(&key) {
            Some(CachedLut::Words(table)) => Arc::clone(table),
            _ => {
                let raw = self.adapter()?.lookup_table_16()?;
                for row in &raw {
                    if row.len() != 65536 {
                        return Err(AdapterError::MalformedLookupTable {
                            expected: 65536,
                            actual: row.len(),
                        }
                        .into());
                    }
                }
                let table = Arc::new(raw);
                self.lut_cache.put(key, CachedLut::Words(Arc::clone(&table)));
                table
            }
        };

        let buffer = self.buffer()?.clone();
        let mut buf = buffer.lock();
        buf.rewind();
        for row in table.iter() {
            buf.put_u16_slice_le(row)?;
        }
        Ok(buf.position() as i32)
    }

    fn lut_key(&mut self, width: LutWidth) -> Result<LutKey, BridgeError> {
        self.adapter()?;
        Ok(LutKey {
            series: self.current_series,
            resolution: self.current_resolution,
            width,
        })
    }

    // =========================================================================
    // Pixel decode
    // =========================================================================

    /// Decode a pixel-space rectangle of a plane into the buffer; returns
    /// the byte count written, exactly
    /// `w * h * bytes_per_pixel * rgb_channel_count`.
    ///
    /// The expected size is computed before decoding: a rectangle that
    /// cannot fit yields the overflow sentinel with both sizes in the
    /// diagnostic, distinct from any decode failure.
    pub fn open_region(&mut self, plane: i32, x: i32, y: i32, w: i32, h: i32) -> i32 {
        match self.try_open_region(plane, x, y, w, h) {
            Ok(v) => v,
            Err(e) => self.fail(e),
        }
    }

    fn try_open_region(
        &mut self,
        plane: i32,
        x: i32,
        y: i32,
        w: i32,
        h: i32,
    ) -> Result<i32, BridgeError> {
        let plane = nonneg(plane, "plane")? as u32;
        let x = nonneg(x, "x")? as u32;
        let y = nonneg(y, "y")? as u32;
        let w = nonneg(w, "width")? as u32;
        let h = nonneg(h, "height")? as u32;

        let (bpp, channels) = {
            let adapter = self.adapter()?;
            (
                adapter.pixel_type().bytes_per_pixel(),
                adapter.rgb_channel_count() as usize,
            )
        };
        let required = (w as usize)
            .checked_mul(h as usize)
            .and_then(|n| n.checked_mul(bpp))
            .and_then(|n| n.checked_mul(channels))
            .ok_or_else(|| {
                BridgeError::InvalidRequest(format!("region size {w}x{h} overflows"))
            })?;
        let available = self.buffer()?.capacity();
        if required > available {
            return Err(BridgeError::BufferOverflow {
                required,
                available,
            });
        }

        let data = self
            .adapter_mut()?
            .open_region(plane, Region::new(x, y, w, h))?;
        if data.len() != required {
            return Err(AdapterError::Decode(format!(
                "engine returned {} bytes for region, expected {}",
                data.len(),
                required
            ))
            .into());
        }
        self.write_bytes(&data)
    }

    /// Decode a thumbnail with exact dimensions into the buffer; returns the
    /// byte count written.
    ///
    /// Side effect: the current resolution moves to the coarsest pyramid
    /// level. The result always has 3 or 4 interleaved channels with
    /// unsigned sample representation.
    pub fn open_thumbnail(&mut self, plane: i32, width: i32, height: i32) -> i32 {
        match self.try_open_thumbnail(plane, width, height) {
            Ok(v) => v,
            Err(e) => self.fail(e),
        }
    }

    fn try_open_thumbnail(
        &mut self,
        plane: i32,
        width: i32,
        height: i32,
    ) -> Result<i32, BridgeError> {
        let plane = nonneg(plane, "plane")? as u32;
        let width = nonneg(width, "width")? as u32;
        let height = nonneg(height, "height")? as u32;

        let coarsest = {
            let adapter = self.adapter_mut()?;
            let coarsest = adapter.resolution_count().saturating_sub(1);
            adapter.set_resolution(coarsest)?;
            coarsest
        };
        self.current_resolution = coarsest;

        let data = self
            .adapter_mut()?
            .decode_thumbnail(plane, width, height)?;
        self.write_bytes(&data)
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    /// Physical pixel size along X for a series, in micrometers.
    ///
    /// 0.0 when the file does not specify it, -1.0 on failure. Served from
    /// the snapshot taken at open, so it keeps answering after close.
    pub fn get_physical_size_x(&mut self, series: i32) -> f64 {
        match self.try_physical_size(series, Axis::X) {
            Ok(v) => v,
            Err(e) => self.fail_f64(e),
        }
    }

    /// Physical pixel size along Y for a series, in micrometers.
    pub fn get_physical_size_y(&mut self, series: i32) -> f64 {
        match self.try_physical_size(series, Axis::Y) {
            Ok(v) => v,
            Err(e) => self.fail_f64(e),
        }
    }

    /// Physical pixel size along Z for a series, in micrometers.
    pub fn get_physical_size_z(&mut self, series: i32) -> f64 {
        match self.try_physical_size(series, Axis::Z) {
            Ok(v) => v,
            Err(e) => self.fail_f64(e),
        }
    }

    fn try_physical_size(&mut self, series: i32, axis: Axis) -> Result<f64, BridgeError> {
        let index = nonneg(series, "series index")?;
        let sizes = self.metadata.physical_sizes(index).ok_or_else(|| {
            BridgeError::Adapter(AdapterError::IndexOutOfRange {
                kind: "series",
                index,
                count: self.metadata.series_count(),
            })
        })?;
        let value = match axis {
            Axis::X => sizes.x,
            Axis::Y => sizes.y,
            Axis::Z => sizes.z,
        };
        Ok(value.unwrap_or(0.0))
    }

    /// Serialize the metadata document into the buffer; returns the byte
    /// count written.
    pub fn dump_metadata_xml(&mut self) -> i32 {
        match self.try_dump_metadata_xml() {
            Ok(v) => v,
            Err(e) => self.fail(e),
        }
    }

    fn try_dump_metadata_xml(&mut self) -> Result<i32, BridgeError> {
        let xml = self.metadata.dump_xml()?;
        let available = self.buffer()?.capacity();
        if xml.len() > available {
            return Err(BridgeError::BufferOverflow {
                required: xml.len(),
                available,
            });
        }
        self.write_bytes(xml.as_bytes())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Dispatch an infallible scalar query against the open adapter.
    fn scalar(&mut self, op: impl FnOnce(&dyn FormatAdapter) -> i32) -> i32 {
        match self.adapter() {
            Ok(adapter) => op(adapter),
            Err(e) => self.fail(e),
        }
    }

    /// The open adapter, or the defined closed-state error.
    fn adapter(&self) -> Result<&dyn FormatAdapter, BridgeError> {
        self.reader.as_deref().ok_or(BridgeError::NoFileOpen)
    }

    fn adapter_mut(&mut self) -> Result<&mut (dyn FormatAdapter + 'static), BridgeError> {
        self.reader.as_deref_mut().ok_or(BridgeError::NoFileOpen)
    }

    fn buffer(&self) -> Result<&SharedBuffer, BridgeError> {
        self.buffer.as_ref().ok_or(BridgeError::NoBufferBound)
    }

    /// Read a UTF-8 file name of `len` bytes from the buffer's start.
    fn read_name(&self, len: i32) -> Result<String, BridgeError> {
        let len = nonneg(len, "name length")?;
        let bytes = self.buffer()?.lock().read_prefix(len)?;
        String::from_utf8(bytes)
            .map_err(|_| BridgeError::InvalidRequest("file name is not valid UTF-8".into()))
    }

    /// Write a complete result at buffer offset 0, reporting the byte count.
    fn write_bytes(&self, bytes: &[u8]) -> Result<i32, BridgeError> {
        let buffer = self.buffer()?;
        let mut buf = buffer.lock();
        buf.rewind();
        buf.put(bytes)?;
        Ok(bytes.len() as i32)
    }
}

fn nonneg(value: i32, what: &'static str) -> Result<usize, BridgeError> {
    usize::try_from(value)
        .map_err(|_| BridgeError::InvalidRequest(format!("{what} must be non-negative, got {value}")))
}

// =============================================================================
// Tests
// =============================================================================
