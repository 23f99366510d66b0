//! Configuration surface for the bridge.
//!
//! The host runtime owns process startup; the bridge only receives this
//! small typed settings struct. Two knobs exist:
//!
//! - `SLIDE_BRIDGE_CACHEDIR` - directory for reader memo records. When the
//!   directory is unusable in any way, memoization is silently disabled.
//! - `SLIDE_BRIDGE_BUFFER_CAPACITY` - communication buffer size in bytes.

use std::env;
use std::path::PathBuf;

use tracing::warn;

use crate::buffer::DEFAULT_BUFFER_CAPACITY;

/// Environment variable naming the memo cache directory.
pub const CACHE_DIR_ENV: &str = "SLIDE_BRIDGE_CACHEDIR";

/// Environment variable overriding the communication buffer capacity.
pub const BUFFER_CAPACITY_ENV: &str = "SLIDE_BRIDGE_BUFFER_CAPACITY";

/// Smallest accepted buffer capacity. Below this not even a useful error
/// diagnostic fits.
pub const MIN_BUFFER_CAPACITY: usize = 1024;

/// Settings the host hands to the bridge at construction.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Candidate directory for reader memo records; validated later by
    /// the memoization layer.
    pub cache_dir: Option<PathBuf>,

    /// Capacity of the communication buffer in bytes.
    pub buffer_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl BridgeConfig {
    /// Read settings from the environment, falling back to defaults.
    ///
    /// An unparsable capacity is ignored with a warning rather than failing
    /// construction.
    pub fn from_env() -> Self {
        let cache_dir = env::var_os(CACHE_DIR_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let buffer_capacity = match env::var(BUFFER_CAPACITY_ENV) {
            Ok(raw) => match raw.parse::<usize>() {
                Ok(n) => n,
                Err(_) => {
                    warn!(value = %raw, "ignoring unparsable {BUFFER_CAPACITY_ENV}");
                    DEFAULT_BUFFER_CAPACITY
                }
            },
            Err(_) => DEFAULT_BUFFER_CAPACITY,
        };

        Self {
            cache_dir,
            buffer_capacity,
        }
    }

    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.buffer_capacity < MIN_BUFFER_CAPACITY {
            return Err(format!(
                "buffer_capacity must be at least {MIN_BUFFER_CAPACITY} bytes, got {}",
                self.buffer_capacity
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
