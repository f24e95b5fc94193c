//! Wire schema for the vector tile format.
//!
//! Message layout follows the Mapbox Vector Tile 2.1 protobuf schema, plus the
//! `raster` feature field used to carry opaque image bytes in image layers.
//! Field tags are load-bearing: independent decoders read these buffers, so
//! the numbers here must never change.
//!
//! See <https://github.com/mapbox/vector-tile-spec/tree/master/2.1>.

use prost::{Enumeration, Message};

/// A complete tile: an ordered sequence of layers.
#[derive(Clone, PartialEq, Message)]
pub struct Tile {
    #[prost(message, repeated, tag = "3")]
    pub layers: Vec<Layer>,
}

/// A named layer of features sharing one extent and one key/value dictionary.
#[derive(Clone, PartialEq, Message)]
pub struct Layer {
    /// Schema version used by this layer. Always 2 for buffers we produce.
    #[prost(uint32, required, tag = "15", default = "1")]
    pub version: u32,

    #[prost(string, required, tag = "1")]
    pub name: String,

    #[prost(message, repeated, tag = "2")]
    pub features: Vec<Feature>,

    /// Deduplicated attribute keys; feature tags index into this table.
    #[prost(string, repeated, tag = "3")]
    pub keys: Vec<String>,

    /// Deduplicated attribute values; feature tags index into this table.
    #[prost(message, repeated, tag = "4")]
    pub values: Vec<Value>,

    /// Width and height of the layer's integer coordinate system.
    #[prost(uint32, optional, tag = "5", default = "4096")]
    pub extent: Option<u32>,
}

/// One feature: geometry command stream plus attribute tag pairs.
#[derive(Clone, PartialEq, Message)]
pub struct Feature {
    #[prost(uint64, optional, tag = "1")]
    pub id: Option<u64>,

    /// Pairs of indices into the layer's `keys` and `values` tables:
    /// `[key_idx, value_idx, key_idx, value_idx, ...]`.
    #[prost(uint32, repeated, tag = "2")]
    pub tags: Vec<u32>,

    #[prost(enumeration = "GeomType", optional, tag = "3", default = "Unknown")]
    pub r#type: Option<i32>,

    /// Zigzag-delta command stream. See the geometry encoder for the packing.
    #[prost(uint32, repeated, tag = "4")]
    pub geometry: Vec<u32>,

    /// Opaque encoded image bytes for raster features. When set, `geometry`
    /// is empty and `type` is `Unknown`.
    #[prost(bytes = "vec", optional, tag = "5")]
    pub raster: Option<Vec<u8>>,
}

/// Geometry type of a feature's command stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Enumeration)]
#[repr(i32)]
pub enum GeomType {
    Unknown = 0,
    Point = 1,
    Linestring = 2,
    Polygon = 3,
}

/// Attribute value. Exactly one field is set in a valid message.
#[derive(Clone, PartialEq, Message)]
pub struct Value {
    #[prost(string, optional, tag = "1")]
    pub string_value: Option<String>,
    #[prost(float, optional, tag = "2")]
    pub float_value: Option<f32>,
    #[prost(double, optional, tag = "3")]
    pub double_value: Option<f64>,
    #[prost(int64, optional, tag = "4")]
    pub int_value: Option<i64>,
    #[prost(uint64, optional, tag = "5")]
    pub uint_value: Option<u64>,
    #[prost(sint64, optional, tag = "6")]
    pub sint_value: Option<i64>,
    #[prost(bool, optional, tag = "7")]
    pub bool_value: Option<bool>,
}
