//! Tile buffer ownership and layer bookkeeping.
//!
//! A [`Tile`] owns an extent in projected (Web Mercator) meters, the tile
//! grid parameters (size and buffer), and an ordered list of encoded layer
//! messages. Layers are appended one at a time as processing finishes them;
//! the serialized tile is the concatenation of the stored layer messages,
//! each framed as a `Tile.layers` protobuf field.

use prost::bytes::BufMut;
use prost::encoding::{encode_key, encode_varint, WireType};
use prost::Message;

use crate::compression::{decompress, is_compressed};
use crate::vector_tile;
use crate::{Error, Result};

/// Tile extent in integer units (MVT spec default).
pub const DEFAULT_TILE_SIZE: u32 = 4096;

/// Default padding beyond the nominal extent, in tile units.
pub const DEFAULT_BUFFER_SIZE: i32 = 128;

/// Axis-aligned bounding box. Used both for extents in projected meters and
/// for clip windows in tile-local units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// An inverted box that expands to any geometry it is grown by.
    pub fn empty() -> Self {
        Self {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.min_x <= self.max_x && self.min_y <= self.max_y
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Grow this box to cover `other`.
    pub fn expand(&mut self, other: &Bounds) {
        self.min_x = self.min_x.min(other.min_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_x = self.max_x.max(other.max_x);
        self.max_y = self.max_y.max(other.max_y);
    }

    /// This box grown by `margin` on every side.
    pub fn buffered(&self, margin: f64) -> Bounds {
        Bounds {
            min_x: self.min_x - margin,
            min_y: self.min_y - margin,
            max_x: self.max_x + margin,
            max_y: self.max_y + margin,
        }
    }
}

/// What to do when a merged buffer carries a layer name the tile already has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// Keep the existing layer, drop the incoming one.
    #[default]
    Skip,
    /// Drop the existing layer, keep the incoming one (position preserved).
    Replace,
    /// Refuse the merge.
    Error,
}

#[derive(Debug, Clone)]
struct LayerEntry {
    name: String,
    data: Vec<u8>,
    features: usize,
}

/// A vector tile under construction or loaded from a buffer.
#[derive(Debug, Clone)]
pub struct Tile {
    extent: Bounds,
    coord: Option<(u64, u64, u64)>,
    tile_size: u32,
    buffer_size: i32,
    layers: Vec<LayerEntry>,
    painted: bool,
}

impl Tile {
    /// Create a tile covering an arbitrary extent in projected meters.
    pub fn new(extent: Bounds) -> Self {
        Self {
            extent,
            coord: None,
            tile_size: DEFAULT_TILE_SIZE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            layers: Vec::new(),
            painted: false,
        }
    }

    /// Create a tile addressed on the Web Mercator grid; the extent is
    /// derived from the tile coordinates.
    pub fn from_xyz(x: u64, y: u64, z: u64) -> Self {
        let mut tile = Self::new(crate::projection::merc_extent(x, y, z));
        tile.coord = Some((x, y, z));
        tile
    }

    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn with_extent(mut self, extent: Bounds) -> Self {
        self.extent = extent;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: i32) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn extent(&self) -> &Bounds {
        &self.extent
    }

    /// Tile grid coordinates, if this tile was addressed on the grid.
    pub fn coord(&self) -> Option<(u64, u64, u64)> {
        self.coord
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn buffer_size(&self) -> i32 {
        self.buffer_size
    }

    /// The extent grown by the buffer margin, in projected meters.
    pub fn buffered_extent(&self) -> Bounds {
        let margin = self.extent.width() * self.buffer_size as f64 / self.tile_size as f64;
        self.extent.buffered(margin)
    }

    /// True if no appended layer carries any feature.
    pub fn is_empty(&self) -> bool {
        self.layers.iter().all(|l| l.features == 0)
    }

    /// True if some feature geometry intersected the unbuffered extent.
    pub fn is_painted(&self) -> bool {
        self.painted
    }

    pub fn set_painted(&mut self, painted: bool) {
        self.painted = painted;
    }

    pub fn has_layer(&self, name: &str) -> bool {
        self.layers.iter().any(|l| l.name == name)
    }

    pub fn layers_size(&self) -> usize {
        self.layers.len()
    }

    /// Layer names in append order.
    pub fn layer_names(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().map(|l| l.name.as_str())
    }

    /// The encoded layer message for `name`, if present.
    pub fn get_layer(&self, name: &str) -> Option<&[u8]> {
        self.layers
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.data.as_slice())
    }

    /// Append one self-contained encoded layer message.
    ///
    /// Returns `Ok(true)` if the layer was appended, `Ok(false)` if the
    /// policy resolved a name collision by keeping the existing layer.
    pub fn append_layer(
        &mut self,
        name: &str,
        data: Vec<u8>,
        features: usize,
        policy: MergePolicy,
    ) -> Result<bool> {
        if let Some(pos) = self.layers.iter().position(|l| l.name == name) {
            match policy {
                MergePolicy::Skip => {
                    log::debug!("layer {:?} already present, skipping", name);
                    return Ok(false);
                }
                MergePolicy::Replace => {
                    self.layers[pos] = LayerEntry {
                        name: name.to_string(),
                        data,
                        features,
                    };
                    return Ok(true);
                }
                MergePolicy::Error => {
                    return Err(Error::Encode(format!("duplicate layer name {:?}", name)));
                }
            }
        }
        self.layers.push(LayerEntry {
            name: name.to_string(),
            data,
            features,
        });
        Ok(true)
    }

    /// Store opaque image bytes as a single raster feature in a new layer.
    pub fn add_image_layer(&mut self, name: &str, image: Vec<u8>) -> Result<()> {
        let layer = vector_tile::Layer {
            version: 2,
            name: name.to_string(),
            features: vec![vector_tile::Feature {
                id: None,
                tags: Vec::new(),
                r#type: Some(vector_tile::GeomType::Unknown as i32),
                geometry: Vec::new(),
                raster: Some(image),
            }],
            keys: Vec::new(),
            values: Vec::new(),
            extent: Some(self.tile_size),
        };
        self.append_layer(name, layer.encode_to_vec(), 1, MergePolicy::Error)?;
        self.painted = true;
        Ok(())
    }

    /// Serialize the tile: each stored layer message framed as a
    /// `Tile.layers` field, in append order.
    pub fn buffer(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.layers.iter().map(|l| l.data.len() + 4).sum());
        for layer in &self.layers {
            encode_key(3, WireType::LengthDelimited, &mut out);
            encode_varint(layer.data.len() as u64, &mut out);
            out.put_slice(&layer.data);
        }
        out
    }

    /// Parse another tile buffer and append its layers onto this tile.
    ///
    /// With [`MergePolicy::Error`] a name collision refuses the whole merge
    /// before anything is appended.
    pub fn merge_from_buffer(&mut self, buffer: &[u8], policy: MergePolicy) -> Result<()> {
        let parsed = vector_tile::Tile::decode(buffer)
            .map_err(|e| Error::Decode(format!("merge source: {}", e)))?;
        if policy == MergePolicy::Error {
            if let Some(layer) = parsed.layers.iter().find(|l| self.has_layer(&l.name)) {
                return Err(Error::Encode(format!(
                    "duplicate layer name {:?}",
                    layer.name
                )));
            }
        }
        for layer in parsed.layers {
            let features = layer.features.len();
            let name = layer.name.clone();
            self.append_layer(&name, layer.encode_to_vec(), features, policy)?;
            if features > 0 {
                self.painted = true;
            }
        }
        Ok(())
    }

    /// Like [`Tile::merge_from_buffer`], accepting a zlib or gzip compressed
    /// buffer as produced by [`crate::compression::compress`].
    pub fn merge_from_compressed_buffer(
        &mut self,
        buffer: &[u8],
        policy: MergePolicy,
    ) -> Result<()> {
        if is_compressed(buffer) {
            let raw = decompress(buffer)?;
            self.merge_from_buffer(&raw, policy)
        } else {
            self.merge_from_buffer(buffer, policy)
        }
    }
}
