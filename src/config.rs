//! Configuration for the tile provider and the export binary.
//!
//! Two layers of configuration:
//! - [`TileProviderConfig`]: runtime knobs of the tiling engine (worker
//!   count, queue and cache budgets, tile geometry, background). Serde
//!   (de)serializable so it can be loaded from a JSON file.
//! - [`Config`]: command-line arguments of the `tilestack` export binary,
//!   parsed by clap with `TILESTACK_` environment variable fallbacks.
//!
//! # Environment Variables
//!
//! - `TILESTACK_WIDTH` / `TILESTACK_HEIGHT` / `TILESTACK_DEPTH` - Synthetic volume size
//! - `TILESTACK_Z` - Slice to export (default: middle of the volume)
//! - `TILESTACK_SCALE` - Data-to-scene zoom factor (default: 1.0)
//! - `TILESTACK_TILE_SIZE` - Tile edge in scene pixels (default: 256)
//! - `TILESTACK_WORKERS` - Fetch worker threads (default: 2)
//! - `TILESTACK_QUEUE_CAPACITY` - Maximum queued fetches (default: 10000)
//! - `TILESTACK_CACHE_MB` - Tile cache budget in MiB (default: 256)
//! - `TILESTACK_OUTPUT` - Output PNG path (default: slice.png)
//! - `TILESTACK_PROVIDER_CONFIG` - JSON file overriding the provider settings

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::error::ConfigError;
use crate::tiling::{DEFAULT_BLOCK_SIZE, DEFAULT_OVERLAP};

// =============================================================================
// Default Values
// =============================================================================

/// Default number of fetch worker threads.
pub const DEFAULT_WORKERS: usize = 2;

/// Default fetch queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Default composite background: opaque white.
pub const DEFAULT_BACKGROUND: [u8; 4] = [255, 255, 255, 255];

/// Default synthetic volume extent along x.
pub const DEFAULT_WIDTH: usize = 900;

/// Default synthetic volume extent along y.
pub const DEFAULT_HEIGHT: usize = 400;

/// Default synthetic volume extent along z.
pub const DEFAULT_DEPTH: usize = 16;

// =============================================================================
// Provider Configuration
// =============================================================================

/// Runtime settings of a [`TileProvider`](crate::tile::TileProvider).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileProviderConfig {
    /// Number of fetch worker threads
    pub workers: usize,

    /// Maximum number of queued fetches; further requests are dropped
    pub queue_capacity: usize,

    /// Tile cache budget in bytes, shared by all cache generations
    pub cache_memory: usize,

    /// Tile edge length in scene pixels
    pub tile_size: usize,

    /// Overlap between neighbouring tiles in scene pixels
    pub overlap: usize,

    /// RGBA color shown where no layer draws
    pub background: [u8; 4],
}

impl Default for TileProviderConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            cache_memory: DEFAULT_CACHE_CAPACITY,
            tile_size: DEFAULT_BLOCK_SIZE,
            overlap: DEFAULT_OVERLAP,
            background: DEFAULT_BACKGROUND,
        }
    }
}

impl TileProviderConfig {
    /// Check that every knob is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |field: &'static str, value: usize| {
            if value == 0 {
                Err(ConfigError::InvalidValue {
                    field,
                    message: "must be greater than 0".to_string(),
                })
            } else {
                Ok(())
            }
        };
        positive("workers", self.workers)?;
        positive("queue_capacity", self.queue_capacity)?;
        positive("cache_memory", self.cache_memory)?;
        positive("tile_size", self.tile_size)?;

        if self.workers > 256 {
            return Err(ConfigError::InvalidValue {
                field: "workers",
                message: format!("{} is more than 256 threads", self.workers),
            });
        }
        if self.overlap >= self.tile_size {
            return Err(ConfigError::InvalidValue {
                field: "overlap",
                message: format!(
                    "{} must be smaller than the tile size {}",
                    self.overlap, self.tile_size
                ),
            });
        }
        Ok(())
    }

    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// tilestack - render a volume slice through the tile compositing cache.
///
/// Builds a synthetic 5-D volume, stacks a few layers over it, waits for
/// every tile of the requested slice and writes the stitched result as PNG.
#[derive(Parser, Debug, Clone)]
#[command(name = "tilestack")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Volume
    // =========================================================================
    /// Volume extent along x.
    #[arg(long, default_value_t = DEFAULT_WIDTH, env = "TILESTACK_WIDTH")]
    pub width: usize,

    /// Volume extent along y.
    #[arg(long, default_value_t = DEFAULT_HEIGHT, env = "TILESTACK_HEIGHT")]
    pub height: usize,

    /// Volume extent along z.
    #[arg(long, default_value_t = DEFAULT_DEPTH, env = "TILESTACK_DEPTH")]
    pub depth: usize,

    /// z slice to export. Defaults to the middle of the volume.
    #[arg(short, long, env = "TILESTACK_Z")]
    pub z: Option<usize>,

    /// Opacity of the overlay layer (0.0 - 1.0).
    #[arg(long, default_value_t = 0.5, env = "TILESTACK_OVERLAY_OPACITY")]
    pub overlay_opacity: f64,

    // =========================================================================
    // Tiling
    // =========================================================================
    /// Data-to-scene zoom factor.
    #[arg(long, default_value_t = 1.0, env = "TILESTACK_SCALE")]
    pub scale: f64,

    /// Tile edge length in scene pixels.
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE, env = "TILESTACK_TILE_SIZE")]
    pub tile_size: usize,

    // =========================================================================
    // Provider
    // =========================================================================
    /// Number of fetch worker threads.
    #[arg(long, default_value_t = DEFAULT_WORKERS, env = "TILESTACK_WORKERS")]
    pub workers: usize,

    /// Maximum number of queued fetches.
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY, env = "TILESTACK_QUEUE_CAPACITY")]
    pub queue_capacity: usize,

    /// Tile cache budget in MiB.
    #[arg(long, default_value_t = DEFAULT_CACHE_CAPACITY / (1024 * 1024), env = "TILESTACK_CACHE_MB")]
    pub cache_mb: usize,

    /// JSON file with provider settings; overrides the flags above.
    #[arg(long, env = "TILESTACK_PROVIDER_CONFIG")]
    pub provider_config: Option<PathBuf>,

    // =========================================================================
    // Output
    // =========================================================================
    /// Path of the PNG to write.
    #[arg(short, long, default_value = "slice.png", env = "TILESTACK_OUTPUT")]
    pub output: PathBuf,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Config {
    /// Validate the arguments that are not provider settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 || self.depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "volume",
                message: format!(
                    "{}x{}x{} has no voxels",
                    self.width, self.height, self.depth
                ),
            });
        }
        if self.slice() >= self.depth {
            return Err(ConfigError::InvalidValue {
                field: "z",
                message: format!("{} is outside 0..{}", self.slice(), self.depth),
            });
        }
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "scale",
                message: format!("{} must be a positive number", self.scale),
            });
        }
        if !(0.0..=1.0).contains(&self.overlay_opacity) {
            return Err(ConfigError::InvalidValue {
                field: "overlay_opacity",
                message: format!("{} is outside 0.0 - 1.0", self.overlay_opacity),
            });
        }
        Ok(())
    }

    /// The z index to export.
    pub fn slice(&self) -> usize {
        self.z.unwrap_or(self.depth / 2)
    }

    /// Provider settings from the JSON file if given, else from the flags.
    pub fn provider(&self) -> Result<TileProviderConfig, ConfigError> {
        if let Some(path) = &self.provider_config {
            let json = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;
            return TileProviderConfig::from_json(&json);
        }

        let config = TileProviderConfig {
            workers: self.workers,
            queue_capacity: self.queue_capacity,
            cache_memory: self.cache_mb.saturating_mul(1024 * 1024),
            tile_size: self.tile_size,
            ..TileProviderConfig::default()
        };
        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// Tests
// =============================================================================
