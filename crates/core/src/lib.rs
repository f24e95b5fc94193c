//! Core library for building, merging and decoding Mapbox Vector Tiles
//! from a styled map's layers.
//!
//! The pipeline per layer is project, clip, simplify, encode; layers run
//! independently (optionally in parallel) and merge back in source order,
//! so the output bytes are deterministic for a given map and parameters.
//!
//! # Examples
//!
//! ```
//! use vectile_core::processor::{Datasource, Map, Processor, SourceFeature, StyleLayer};
//! use vectile_core::tile::Bounds;
//! use geo::{point, Geometry};
//!
//! struct Cities;
//!
//! impl Datasource for Cities {
//!     fn features(&self, _envelope: &Bounds) -> Vec<SourceFeature> {
//!         vec![SourceFeature::new(Some(1), Geometry::Point(point!(x: 13.4, y: 52.5)))]
//!     }
//! }
//!
//! struct CityLayer;
//!
//! impl StyleLayer for CityLayer {
//!     fn name(&self) -> &str {
//!         "cities"
//!     }
//!     fn visible(&self, _scale_denom: f64) -> bool {
//!         true
//!     }
//!     fn datasource(&self) -> Option<&dyn Datasource> {
//!         Some(&Cities)
//!     }
//! }
//!
//! struct World;
//!
//! impl Map for World {
//!     fn layers(&self) -> Vec<&dyn StyleLayer> {
//!         vec![&CityLayer]
//!     }
//! }
//!
//! let tile = Processor::new(&World).create_tile(0, 0, 0).unwrap();
//! assert!(!tile.is_empty());
//! ```

use thiserror::Error as ThisError;

pub mod clip;
pub mod compression;
pub mod decode;
pub mod mvt;
pub mod parallel;
pub mod processor;
pub mod projection;
pub mod raster;
pub mod render;
pub mod simplify;
pub mod tile;
pub mod vector_tile;

/// Errors surfaced by tile processing.
///
/// Malformed geometry is not here: it is recovered locally by dropping the
/// offending ring or feature, never surfaced.
#[derive(ThisError, Debug)]
pub enum Error {
    /// Internal invariant violated while building the binary form. Aborts
    /// the affected layer only.
    #[error("encode failed: {0}")]
    Encode(String),

    /// Malformed wire bytes. No partial result is produced.
    #[error("decode failed: {0}")]
    Decode(String),

    /// Corrupt compressed stream.
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// A raster operation was asked of an image representation the
    /// collaborator cannot handle.
    #[error("unsupported image type: {0}")]
    UnsupportedImageType(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

pub use clip::{ClipParams, FillType};
pub use compression::{compress, decompress};
pub use decode::{parse, DecodedFeature, LayerReader, TileReader};
pub use mvt::Value;
pub use processor::{
    create_mvt_merc, create_mvt_wafer_merc, Processor, ProcessorOptions, ThreadingMode,
};
pub use tile::{Bounds, MergePolicy, Tile, DEFAULT_BUFFER_SIZE, DEFAULT_TILE_SIZE};
