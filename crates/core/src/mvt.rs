//! MVT layer encoding.
//!
//! Geometry arrives here in tile-local floating coordinates (clipping and
//! simplification already done); this module quantizes to the integer grid
//! and packs the command stream:
//!
//! - **Zigzag encoding**: signed deltas as small unsigned varints
//! - **Command encoding**: `(command_id | count << 3)` with MoveTo=1,
//!   LineTo=2, ClosePath=7
//! - **Layer building**: features plus deduplicated key/value dictionaries
//!
//! Reference: <https://github.com/mapbox/vector-tile-spec>

use std::collections::HashMap;

use geo::orient::{Direction, Orient};
use geo::{Coord, Geometry, LineString, Polygon};
use prost::Message;

use crate::projection::quantize;
use crate::vector_tile::{self, GeomType};

pub(crate) const CMD_MOVE_TO: u32 = 1;
pub(crate) const CMD_LINE_TO: u32 = 2;
pub(crate) const CMD_CLOSE_PATH: u32 = 7;

/// Encode a signed integer using zigzag encoding, so small negative numbers
/// stay small on the wire: 0, -1, 1, -2, 2 map to 0, 1, 2, 3, 4.
#[inline]
pub fn zigzag_encode(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

/// Decode a zigzag-encoded unsigned integer back to signed.
#[inline]
pub fn zigzag_decode(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

/// Pack a command id with a repeat count.
#[inline]
pub fn command_encode(command_id: u32, count: u32) -> u32 {
    (command_id & 0x7) | (count << 3)
}

/// Unpack a command into (command_id, count).
#[inline]
pub fn command_decode(command: u32) -> (u32, u32) {
    (command & 0x7, command >> 3)
}

/// A feature attribute value. A closed variant: the wire format cannot carry
/// anything else, so neither can we.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    String(String),
}

impl Value {
    pub(crate) fn to_wire(&self) -> vector_tile::Value {
        let mut out = vector_tile::Value::default();
        match self {
            Value::Null => {}
            Value::Bool(b) => out.bool_value = Some(*b),
            Value::Int(i) => out.int_value = Some(*i),
            Value::UInt(u) => out.uint_value = Some(*u),
            Value::Double(d) => out.double_value = Some(*d),
            Value::String(s) => out.string_value = Some(s.clone()),
        }
        out
    }

    pub(crate) fn from_wire(value: &vector_tile::Value) -> Value {
        if let Some(s) = &value.string_value {
            Value::String(s.clone())
        } else if let Some(b) = value.bool_value {
            Value::Bool(b)
        } else if let Some(i) = value.int_value {
            Value::Int(i)
        } else if let Some(i) = value.sint_value {
            Value::Int(i)
        } else if let Some(u) = value.uint_value {
            Value::UInt(u)
        } else if let Some(d) = value.double_value {
            Value::Double(d)
        } else if let Some(f) = value.float_value {
            Value::Double(f as f64)
        } else {
            Value::Null
        }
    }
}

/// Integer delta cursor shared across every part of one feature's stream.
#[derive(Default)]
struct Cursor {
    x: i32,
    y: i32,
}

impl Cursor {
    fn delta(&mut self, x: i32, y: i32) -> (i32, i32) {
        let d = (x - self.x, y - self.y);
        self.x = x;
        self.y = y;
        d
    }
}

/// Quantize a coordinate sequence, collapsing runs that land on the same
/// grid point. Zero-length segments are not representable in the command
/// stream.
fn quantize_path<'a>(coords: impl Iterator<Item = &'a Coord<f64>>) -> Vec<(i32, i32)> {
    let mut out: Vec<(i32, i32)> = Vec::new();
    for c in coords {
        let p = quantize(c.x, c.y);
        if out.last() != Some(&p) {
            out.push(p);
        }
    }
    out
}

fn encode_point_group(points: &[(i32, i32)], cursor: &mut Cursor, out: &mut Vec<u32>) {
    if points.is_empty() {
        return;
    }
    out.push(command_encode(CMD_MOVE_TO, points.len() as u32));
    for &(x, y) in points {
        let (dx, dy) = cursor.delta(x, y);
        out.push(zigzag_encode(dx));
        out.push(zigzag_encode(dy));
    }
}

fn encode_path(line: &LineString<f64>, cursor: &mut Cursor, out: &mut Vec<u32>) {
    let points = quantize_path(line.0.iter());
    if points.len() < 2 {
        return;
    }
    encode_point_group(&points[..1], cursor, out);
    out.push(command_encode(CMD_LINE_TO, (points.len() - 1) as u32));
    for &(x, y) in &points[1..] {
        let (dx, dy) = cursor.delta(x, y);
        out.push(zigzag_encode(dx));
        out.push(zigzag_encode(dy));
    }
}

fn encode_ring(ring: &LineString<f64>, cursor: &mut Cursor, out: &mut Vec<u32>) {
    let mut points = quantize_path(ring.0.iter());
    // The closing vertex is implicit in ClosePath.
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    if points.len() < 3 {
        return;
    }
    encode_point_group(&points[..1], cursor, out);
    out.push(command_encode(CMD_LINE_TO, (points.len() - 1) as u32));
    for &(x, y) in &points[1..] {
        let (dx, dy) = cursor.delta(x, y);
        out.push(zigzag_encode(dx));
        out.push(zigzag_encode(dy));
    }
    out.push(command_encode(CMD_CLOSE_PATH, 1));
}

fn encode_polygon(polygon: &Polygon<f64>, cursor: &mut Cursor, out: &mut Vec<u32>) {
    // Tile coordinates are y-down, so the wire's clockwise exterior rings
    // are counter-clockwise on the raw coordinate values.
    let oriented = polygon.orient(Direction::Default);
    encode_ring(oriented.exterior(), cursor, out);
    for interior in oriented.interiors() {
        encode_ring(interior, cursor, out);
    }
}

/// Encode a tile-local geometry into a command stream.
///
/// Degenerate parts (single-vertex lines, collapsed rings) are dropped; an
/// entirely degenerate geometry yields an empty stream.
pub fn encode_geometry(geom: &Geometry<f64>) -> (Vec<u32>, GeomType) {
    let mut out = Vec::new();
    let mut cursor = Cursor::default();
    let geom_type = match geom {
        Geometry::Point(p) => {
            encode_point_group(&[quantize(p.x(), p.y())], &mut cursor, &mut out);
            GeomType::Point
        }
        Geometry::MultiPoint(mp) => {
            let points: Vec<(i32, i32)> =
                mp.0.iter().map(|p| quantize(p.x(), p.y())).collect();
            encode_point_group(&points, &mut cursor, &mut out);
            GeomType::Point
        }
        Geometry::LineString(ls) => {
            encode_path(ls, &mut cursor, &mut out);
            GeomType::Linestring
        }
        Geometry::MultiLineString(mls) => {
            for ls in &mls.0 {
                encode_path(ls, &mut cursor, &mut out);
            }
            GeomType::Linestring
        }
        Geometry::Polygon(p) => {
            encode_polygon(p, &mut cursor, &mut out);
            GeomType::Polygon
        }
        Geometry::MultiPolygon(mp) => {
            for p in &mp.0 {
                encode_polygon(p, &mut cursor, &mut out);
            }
            GeomType::Polygon
        }
        _ => GeomType::Unknown,
    };
    (out, geom_type)
}

/// Builder for one encoded layer: features plus the shared key/value
/// dictionaries.
pub struct LayerBuilder {
    name: String,
    extent: u32,
    features: Vec<vector_tile::Feature>,
    keys: Vec<String>,
    key_index: HashMap<String, u32>,
    values: Vec<vector_tile::Value>,
    value_index: HashMap<String, u32>,
}

impl LayerBuilder {
    pub fn new(name: impl Into<String>, extent: u32) -> Self {
        Self {
            name: name.into(),
            extent,
            features: Vec::new(),
            keys: Vec::new(),
            key_index: HashMap::new(),
            values: Vec::new(),
            value_index: HashMap::new(),
        }
    }

    fn get_or_insert_key(&mut self, key: &str) -> u32 {
        if let Some(&idx) = self.key_index.get(key) {
            idx
        } else {
            let idx = self.keys.len() as u32;
            self.keys.push(key.to_string());
            self.key_index.insert(key.to_string(), idx);
            idx
        }
    }

    fn get_or_insert_value(&mut self, value: &Value) -> u32 {
        // Debug formatting doubles as the dedup key; it is total over the
        // closed variant.
        let value_key = format!("{:?}", value);
        if let Some(&idx) = self.value_index.get(&value_key) {
            idx
        } else {
            let idx = self.values.len() as u32;
            self.values.push(value.to_wire());
            self.value_index.insert(value_key, idx);
            idx
        }
    }

    fn encode_tags(&mut self, attributes: &[(String, Value)]) -> Vec<u32> {
        let mut tags = Vec::with_capacity(attributes.len() * 2);
        for (key, value) in attributes {
            if matches!(value, Value::Null) {
                continue;
            }
            let key_idx = self.get_or_insert_key(key);
            let value_idx = self.get_or_insert_value(value);
            tags.push(key_idx);
            tags.push(value_idx);
        }
        tags
    }

    /// Add a vector feature. Returns false if the geometry quantized away to
    /// nothing and the feature was dropped.
    pub fn add_feature(
        &mut self,
        id: Option<u64>,
        geometry: &Geometry<f64>,
        attributes: &[(String, Value)],
    ) -> bool {
        let (commands, geom_type) = encode_geometry(geometry);
        if commands.is_empty() {
            return false;
        }
        let tags = self.encode_tags(attributes);
        self.features.push(vector_tile::Feature {
            id,
            tags,
            r#type: Some(geom_type as i32),
            geometry: commands,
            raster: None,
        });
        true
    }

    /// Add a raster feature carrying opaque encoded image bytes.
    pub fn add_raster_feature(&mut self, id: Option<u64>, raster: Vec<u8>) {
        self.features.push(vector_tile::Feature {
            id,
            tags: Vec::new(),
            r#type: Some(GeomType::Unknown as i32),
            geometry: Vec::new(),
            raster: Some(raster),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    pub fn build(self) -> vector_tile::Layer {
        vector_tile::Layer {
            version: 2,
            name: self.name,
            features: self.features,
            keys: self.keys,
            values: self.values,
            extent: Some(self.extent),
        }
    }

    /// Build and serialize; returns the layer message bytes and its feature
    /// count.
    pub fn encode(self) -> (Vec<u8>, usize) {
        let count = self.feature_count();
        (self.build().encode_to_vec(), count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, point, polygon};

    // ------------------------------------------------------------------------
    // Wire primitives
    // ------------------------------------------------------------------------

    #[test]
    fn test_zigzag_small_values() {
        assert_eq!(zigzag_encode(0), 0);
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
        assert_eq!(zigzag_encode(-2), 3);
        assert_eq!(zigzag_encode(2), 4);
    }

    #[test]
    fn test_zigzag_roundtrip() {
        for n in -5000..=5000 {
            assert_eq!(zigzag_decode(zigzag_encode(n)), n);
        }
    }

    #[test]
    fn test_command_encode_known_values() {
        // MoveTo count=1 packs to 9, ClosePath count=1 packs to 15.
        assert_eq!(command_encode(CMD_MOVE_TO, 1), 9);
        assert_eq!(command_encode(CMD_LINE_TO, 3), 26);
        assert_eq!(command_encode(CMD_CLOSE_PATH, 1), 15);
    }

    #[test]
    fn test_command_roundtrip() {
        for id in [CMD_MOVE_TO, CMD_LINE_TO, CMD_CLOSE_PATH] {
            for count in 1..200 {
                assert_eq!(command_decode(command_encode(id, count)), (id, count));
            }
        }
    }

    // ------------------------------------------------------------------------
    // Geometry encoding
    // ------------------------------------------------------------------------

    #[test]
    fn test_encode_point() {
        let (commands, tp) = encode_geometry(&Geometry::Point(point!(x: 2048.0, y: 1024.0)));
        assert_eq!(tp, GeomType::Point);
        assert_eq!(
            commands,
            vec![9, zigzag_encode(2048), zigzag_encode(1024)]
        );
    }

    #[test]
    fn test_encode_linestring_deltas() {
        let line = line_string![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
        ];
        let (commands, tp) = encode_geometry(&Geometry::LineString(line));
        assert_eq!(tp, GeomType::Linestring);
        assert_eq!(
            commands,
            vec![
                command_encode(CMD_MOVE_TO, 1),
                zigzag_encode(0),
                zigzag_encode(0),
                command_encode(CMD_LINE_TO, 2),
                zigzag_encode(10),
                zigzag_encode(0),
                zigzag_encode(0),
                zigzag_encode(10),
            ]
        );
    }

    #[test]
    fn test_encode_linestring_collapses_duplicate_grid_points() {
        // Two vertices quantize to the same grid point; the zero-length
        // segment must not appear in the stream.
        let line = line_string![
            (x: 0.0, y: 0.0),
            (x: 0.2, y: 0.1),
            (x: 10.0, y: 0.0),
        ];
        let (commands, _) = encode_geometry(&Geometry::LineString(line));
        assert_eq!(command_decode(commands[3]), (CMD_LINE_TO, 1));
    }

    #[test]
    fn test_encode_degenerate_line_dropped() {
        let line = line_string![(x: 1.0, y: 1.0), (x: 1.2, y: 1.1)];
        let (commands, _) = encode_geometry(&Geometry::LineString(line));
        assert!(commands.is_empty());
    }

    #[test]
    fn test_encode_polygon_ends_with_close_path() {
        let poly = polygon![
            (x: 0.0, y: 0.0),
            (x: 100.0, y: 0.0),
            (x: 100.0, y: 100.0),
            (x: 0.0, y: 100.0),
            (x: 0.0, y: 0.0),
        ];
        let (commands, tp) = encode_geometry(&Geometry::Polygon(poly));
        assert_eq!(tp, GeomType::Polygon);
        assert_eq!(command_decode(commands[0]).0, CMD_MOVE_TO);
        assert_eq!(command_decode(*commands.last().unwrap()).0, CMD_CLOSE_PATH);
        // MoveTo + 2 params + LineTo + 6 params + ClosePath
        assert_eq!(commands.len(), 11);
    }

    #[test]
    fn test_encode_polygon_winding_normalized() {
        // Same square wound both ways must encode identically.
        let cw = polygon![
            (x: 0.0, y: 0.0),
            (x: 0.0, y: 100.0),
            (x: 100.0, y: 100.0),
            (x: 100.0, y: 0.0),
            (x: 0.0, y: 0.0),
        ];
        let ccw = polygon![
            (x: 0.0, y: 0.0),
            (x: 100.0, y: 0.0),
            (x: 100.0, y: 100.0),
            (x: 0.0, y: 100.0),
            (x: 0.0, y: 0.0),
        ];
        let (a, _) = encode_geometry(&Geometry::Polygon(cw));
        let (b, _) = encode_geometry(&Geometry::Polygon(ccw));
        assert_eq!(a, b);
    }

    // ------------------------------------------------------------------------
    // Layer builder
    // ------------------------------------------------------------------------

    #[test]
    fn test_layer_builder_dedups_keys_and_values() {
        let mut builder = LayerBuilder::new("buildings", 4096);
        let p1 = Geometry::Point(point!(x: 10.0, y: 10.0));
        let p2 = Geometry::Point(point!(x: 20.0, y: 20.0));

        let props1 = vec![("kind".to_string(), Value::String("house".to_string()))];
        let props2 = vec![("kind".to_string(), Value::String("house".to_string()))];
        assert!(builder.add_feature(Some(1), &p1, &props1));
        assert!(builder.add_feature(Some(2), &p2, &props2));

        let layer = builder.build();
        assert_eq!(layer.version, 2);
        assert_eq!(layer.features.len(), 2);
        assert_eq!(layer.keys.len(), 1);
        assert_eq!(layer.values.len(), 1);
        assert_eq!(layer.features[0].tags, vec![0, 0]);
    }

    #[test]
    fn test_layer_builder_distinct_values_kept() {
        let mut builder = LayerBuilder::new("pois", 4096);
        let p = Geometry::Point(point!(x: 1.0, y: 1.0));
        builder.add_feature(None, &p, &[("rank".to_string(), Value::Int(1))]);
        builder.add_feature(None, &p, &[("rank".to_string(), Value::Int(2))]);

        let layer = builder.build();
        assert_eq!(layer.keys.len(), 1);
        assert_eq!(layer.values.len(), 2);
    }

    #[test]
    fn test_layer_builder_skips_null_attributes() {
        let mut builder = LayerBuilder::new("pois", 4096);
        let p = Geometry::Point(point!(x: 1.0, y: 1.0));
        builder.add_feature(
            None,
            &p,
            &[
                ("name".to_string(), Value::Null),
                ("rank".to_string(), Value::Int(7)),
            ],
        );

        let layer = builder.build();
        assert_eq!(layer.keys, vec!["rank".to_string()]);
        assert_eq!(layer.features[0].tags.len(), 2);
    }

    #[test]
    fn test_layer_builder_drops_degenerate_feature() {
        let mut builder = LayerBuilder::new("lines", 4096);
        let line = Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 0.1, y: 0.1)]);
        assert!(!builder.add_feature(None, &line, &[]));
        assert!(builder.is_empty());
    }

    #[test]
    fn test_raster_feature() {
        let mut builder = LayerBuilder::new("imagery", 4096);
        builder.add_raster_feature(Some(1), vec![0x89, 0x50, 0x4e, 0x47]);
        let layer = builder.build();
        assert_eq!(layer.features.len(), 1);
        assert_eq!(
            layer.features[0].raster.as_deref(),
            Some(&[0x89, 0x50, 0x4e, 0x47][..])
        );
        assert!(layer.features[0].geometry.is_empty());
    }

    #[test]
    fn test_value_wire_roundtrip() {
        for value in [
            Value::Bool(true),
            Value::Int(-42),
            Value::UInt(42),
            Value::Double(3.25),
            Value::String("name".to_string()),
            Value::Null,
        ] {
            assert_eq!(Value::from_wire(&value.to_wire()), value);
        }
    }
}
