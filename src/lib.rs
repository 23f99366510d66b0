//! # Slide Bridge
//!
//! A language-boundary bridge exposing a stateful, multi-resolution
//! image-format reader to a calling runtime that cannot use the underlying
//! decoding engine's native object model.
//!
//! Callers such as tile servers need raw pixel regions, thumbnails, and
//! metadata from whole-slide and microscopy images without understanding the
//! engine's API. The bridge gives them a flat table of operations over a
//! shared fixed-capacity buffer: request parameters go in at offset 0, the
//! variable-length result or the error diagnostic comes back out, and every
//! operation returns an integer byte count/status or a double.
//!
//! ## Architecture
//!
//! - [`buffer`] - fixed-capacity communication buffer with the
//!   length-governed wire protocol
//! - [`report`] - error reporter sharing that buffer
//! - [`adapter`] - capability traits fulfilled by the external decoding
//!   engine, plus the optional memoizing decorator
//! - [`metadata`] - per-series physical pixel sizes and the XML dump
//! - [`pixel`] - stable pixel-type code table
//! - [`session`] - the single-session state machine dispatching every
//!   operation
//! - [`config`] - the typed settings surface handed in by the host
//!
//! ## Contract highlights
//!
//! - Exactly one file is open at a time; `open` closes the previous file.
//! - No write ever exceeds the buffer: outputs that would not fit return the
//!   distinct `-2` sentinel with required and available sizes in the
//!   diagnostic.
//! - No engine failure escapes an operation: every call returns a sentinel
//!   and materializes the diagnostic in the buffer for the caller to read
//!   back at the exact recorded length.
//!
//! ## Example
//!
//! ```no_run
//! use slide_bridge::{BridgeConfig, BridgeSession, SharedBuffer};
//! # fn engine_opener() -> Box<dyn slide_bridge::ReaderOpener> { unimplemented!() }
//!
//! let config = BridgeConfig::from_env();
//! let mut session = BridgeSession::new(engine_opener(), &config);
//!
//! let buffer = SharedBuffer::with_capacity(config.buffer_capacity);
//! session.bind_buffer(buffer.clone());
//!
//! let name = b"/data/slide.svs";
//! buffer.write_request(name).unwrap();
//! if session.open(name.len() as i32) == 1 {
//!     let width = session.get_size_x();
//!     let n = session.open_region(0, 0, 0, 512, 512);
//!     if n > 0 {
//!         let pixels = buffer.read_response(n as usize).unwrap();
//!         // hand `pixels` (and `width`) to the tile encoder
//!     }
//! }
//! ```

pub mod adapter;
pub mod buffer;
pub mod config;
pub mod error;
pub mod metadata;
pub mod pixel;
pub mod report;
pub mod session;

// Re-export commonly used types
pub use adapter::{
    resolve_cache_dir, select_opener, DimensionOrder, FormatAdapter, MemoizedOpener,
    PhysicalSizes, PlaneLayout, ReaderOpener, Region,
};
pub use buffer::{CommBuffer, SharedBuffer, DEFAULT_BUFFER_CAPACITY};
pub use config::{BridgeConfig, BUFFER_CAPACITY_ENV, CACHE_DIR_ENV};
pub use error::{
    AdapterError, BridgeError, SENTINEL_FAILURE, SENTINEL_FAILURE_F64, SENTINEL_OVERFLOW,
};
pub use metadata::MetadataStore;
pub use pixel::PixelType;
pub use report::ErrorRecord;
pub use session::{BridgeSession, OP_OK};
