//! Tile buffer parsing and feature decoding.
//!
//! [`parse`] validates the protobuf envelope of a whole buffer up front:
//! malformed bytes fail with a decode error and no partial result. Feature
//! command streams are left untouched until [`LayerReader::feature`] asks
//! for one, so a renderer can pull a handful of features out of a large
//! tile without decoding the rest. [`LayerReader::features_in_envelope`]
//! is the pull-based path: it scans each command stream for its bounding
//! box and only fully decodes features intersecting the filter window.

use geo::{Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
use prost::Message;

use crate::clip::ring_area;
use crate::mvt::{command_decode, zigzag_decode, Value, CMD_CLOSE_PATH, CMD_LINE_TO, CMD_MOVE_TO};
use crate::tile::Bounds;
use crate::vector_tile::{self, GeomType};
use crate::{Error, Result};

/// A fully decoded feature: typed geometry in tile-local coordinates, or an
/// opaque raster payload.
#[derive(Debug, Clone)]
pub struct DecodedFeature {
    pub id: Option<u64>,
    pub geometry: Option<Geometry<f64>>,
    pub attributes: Vec<(String, Value)>,
    pub raster: Option<Vec<u8>>,
}

/// An ordered view over the layers of a parsed tile buffer.
#[derive(Debug, Clone)]
pub struct TileReader {
    layers: Vec<LayerReader>,
}

/// Parse a complete tile buffer.
pub fn parse(buffer: &[u8]) -> Result<TileReader> {
    let tile = vector_tile::Tile::decode(buffer)
        .map_err(|e| Error::Decode(format!("tile envelope: {}", e)))?;
    Ok(TileReader {
        layers: tile.layers.into_iter().map(LayerReader::new).collect(),
    })
}

impl TileReader {
    pub fn layers(&self) -> &[LayerReader] {
        &self.layers
    }

    pub fn layers_size(&self) -> usize {
        self.layers.len()
    }

    pub fn layer(&self, index: usize) -> Option<&LayerReader> {
        self.layers.get(index)
    }

    pub fn layer_by_name(&self, name: &str) -> Option<&LayerReader> {
        self.layers.iter().find(|l| l.name() == name)
    }
}

/// One parsed layer; features decode on demand.
#[derive(Debug, Clone)]
pub struct LayerReader {
    raw: vector_tile::Layer,
}

impl LayerReader {
    fn new(raw: vector_tile::Layer) -> Self {
        Self { raw }
    }

    /// Parse a single standalone layer message.
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        let raw = vector_tile::Layer::decode(buffer)
            .map_err(|e| Error::Decode(format!("layer message: {}", e)))?;
        Ok(Self::new(raw))
    }

    pub fn name(&self) -> &str {
        &self.raw.name
    }

    pub fn version(&self) -> u32 {
        self.raw.version
    }

    pub fn extent(&self) -> u32 {
        self.raw.extent.unwrap_or(4096)
    }

    pub fn features_size(&self) -> usize {
        self.raw.features.len()
    }

    /// Decode the feature at `index`.
    pub fn feature(&self, index: usize) -> Result<DecodedFeature> {
        let raw = self
            .raw
            .features
            .get(index)
            .ok_or_else(|| Error::Decode(format!("feature index {} out of range", index)))?;

        let attributes = self.decode_tags(&raw.tags)?;

        if let Some(raster) = &raw.raster {
            return Ok(DecodedFeature {
                id: raw.id,
                geometry: None,
                attributes,
                raster: Some(raster.clone()),
            });
        }

        let geom_type = GeomType::try_from(raw.r#type.unwrap_or(0))
            .map_err(|_| Error::Decode(format!("unknown geometry type {:?}", raw.r#type)))?;
        if geom_type == GeomType::Unknown {
            return Err(Error::Decode(
                "feature has neither geometry nor raster".to_string(),
            ));
        }

        let geometry = decode_geometry(&raw.geometry, geom_type)?;
        Ok(DecodedFeature {
            id: raw.id,
            geometry: Some(geometry),
            attributes,
            raster: None,
        })
    }

    /// All features, decoded in order.
    pub fn features(&self) -> impl Iterator<Item = Result<DecodedFeature>> + '_ {
        (0..self.features_size()).map(move |i| self.feature(i))
    }

    /// Features whose tile-space bounding box intersects `envelope`.
    ///
    /// The box comes from a cheap scan of the command stream; only matching
    /// features are fully decoded. Raster features always match.
    pub fn features_in_envelope<'a>(
        &'a self,
        envelope: &'a Bounds,
    ) -> impl Iterator<Item = Result<DecodedFeature>> + 'a {
        self.raw
            .features
            .iter()
            .enumerate()
            .filter_map(move |(i, raw)| {
                if raw.raster.is_none() {
                    match command_stream_bounds(&raw.geometry) {
                        Ok(Some(bbox)) if bbox.intersects(envelope) => {}
                        Ok(_) => return None,
                        Err(e) => return Some(Err(e)),
                    }
                }
                Some(self.feature(i))
            })
    }

    fn decode_tags(&self, tags: &[u32]) -> Result<Vec<(String, Value)>> {
        if tags.len() % 2 != 0 {
            return Err(Error::Decode("odd tag count".to_string()));
        }
        let mut out = Vec::with_capacity(tags.len() / 2);
        for pair in tags.chunks_exact(2) {
            let key = self
                .raw
                .keys
                .get(pair[0] as usize)
                .ok_or_else(|| Error::Decode(format!("key index {} out of range", pair[0])))?;
            let value = self
                .raw
                .values
                .get(pair[1] as usize)
                .ok_or_else(|| Error::Decode(format!("value index {} out of range", pair[1])))?;
            out.push((key.clone(), Value::from_wire(value)));
        }
        Ok(out)
    }
}

/// Cursor state shared while walking one command stream.
struct StreamReader<'a> {
    commands: &'a [u32],
    pos: usize,
    x: i64,
    y: i64,
}

impl<'a> StreamReader<'a> {
    fn new(commands: &'a [u32]) -> Self {
        Self {
            commands,
            pos: 0,
            x: 0,
            y: 0,
        }
    }

    fn done(&self) -> bool {
        self.pos >= self.commands.len()
    }

    fn next_command(&mut self) -> Result<(u32, u32)> {
        let raw = self.commands[self.pos];
        self.pos += 1;
        let (id, count) = command_decode(raw);
        match id {
            CMD_MOVE_TO | CMD_LINE_TO => {
                if count == 0 {
                    return Err(Error::Decode(format!("command {} with zero count", id)));
                }
            }
            CMD_CLOSE_PATH => {
                if count != 1 {
                    return Err(Error::Decode("ClosePath count must be 1".to_string()));
                }
            }
            other => return Err(Error::Decode(format!("unknown command id {}", other))),
        }
        Ok((id, count))
    }

    fn next_point(&mut self) -> Result<Coord<f64>> {
        if self.pos + 2 > self.commands.len() {
            return Err(Error::Decode("truncated command stream".to_string()));
        }
        let dx = zigzag_decode(self.commands[self.pos]) as i64;
        let dy = zigzag_decode(self.commands[self.pos + 1]) as i64;
        self.pos += 2;
        self.x += dx;
        self.y += dy;
        if self.x.abs() > i32::MAX as i64 || self.y.abs() > i32::MAX as i64 {
            return Err(Error::Decode("coordinate overflow".to_string()));
        }
        Ok(Coord {
            x: self.x as f64,
            y: self.y as f64,
        })
    }
}

/// Decode a command stream into typed tile-local geometry.
pub fn decode_geometry(commands: &[u32], geom_type: GeomType) -> Result<Geometry<f64>> {
    match geom_type {
        GeomType::Point => decode_points(commands),
        GeomType::Linestring => decode_lines(commands),
        GeomType::Polygon => decode_polygons(commands),
        GeomType::Unknown => Err(Error::Decode("unknown geometry type".to_string())),
    }
}

fn decode_points(commands: &[u32]) -> Result<Geometry<f64>> {
    let mut reader = StreamReader::new(commands);
    let mut points = Vec::new();
    while !reader.done() {
        let (id, count) = reader.next_command()?;
        if id != CMD_MOVE_TO {
            return Err(Error::Decode("point geometry expects MoveTo only".to_string()));
        }
        for _ in 0..count {
            points.push(Point::from(reader.next_point()?));
        }
    }
    match points.len() {
        0 => Err(Error::Decode("empty point geometry".to_string())),
        1 => Ok(Geometry::Point(points[0])),
        _ => Ok(Geometry::MultiPoint(MultiPoint::new(points))),
    }
}

fn decode_lines(commands: &[u32]) -> Result<Geometry<f64>> {
    let mut reader = StreamReader::new(commands);
    let mut lines: Vec<LineString<f64>> = Vec::new();
    let mut current: Vec<Coord<f64>> = Vec::new();

    while !reader.done() {
        let (id, count) = reader.next_command()?;
        match id {
            CMD_MOVE_TO => {
                if count != 1 {
                    return Err(Error::Decode("line MoveTo count must be 1".to_string()));
                }
                if current.len() >= 2 {
                    lines.push(LineString::new(std::mem::take(&mut current)));
                } else {
                    current.clear();
                }
                current.push(reader.next_point()?);
            }
            CMD_LINE_TO => {
                if current.is_empty() {
                    return Err(Error::Decode("LineTo before MoveTo".to_string()));
                }
                for _ in 0..count {
                    current.push(reader.next_point()?);
                }
            }
            _ => return Err(Error::Decode("ClosePath in line geometry".to_string())),
        }
    }
    if current.len() >= 2 {
        lines.push(LineString::new(current));
    }

    match lines.len() {
        0 => Err(Error::Decode("empty line geometry".to_string())),
        1 => Ok(Geometry::LineString(lines.pop().unwrap())),
        _ => Ok(Geometry::MultiLineString(MultiLineString::new(lines))),
    }
}

fn decode_polygons(commands: &[u32]) -> Result<Geometry<f64>> {
    let mut reader = StreamReader::new(commands);
    let mut rings: Vec<LineString<f64>> = Vec::new();
    let mut current: Vec<Coord<f64>> = Vec::new();

    while !reader.done() {
        let (id, count) = reader.next_command()?;
        match id {
            CMD_MOVE_TO => {
                if count != 1 {
                    return Err(Error::Decode("ring MoveTo count must be 1".to_string()));
                }
                current.clear();
                current.push(reader.next_point()?);
            }
            CMD_LINE_TO => {
                if current.is_empty() {
                    return Err(Error::Decode("LineTo before MoveTo".to_string()));
                }
                for _ in 0..count {
                    current.push(reader.next_point()?);
                }
            }
            CMD_CLOSE_PATH => {
                if current.len() < 3 {
                    return Err(Error::Decode("ring closed with fewer than 3 points".to_string()));
                }
                let mut ring = std::mem::take(&mut current);
                ring.push(ring[0]);
                rings.push(LineString::new(ring));
            }
            _ => unreachable!("command ids validated in next_command"),
        }
    }
    if !current.is_empty() {
        return Err(Error::Decode("unclosed polygon ring".to_string()));
    }

    // Positive shoelace area marks an exterior ring; negative rings are
    // holes of the polygon opened before them. A tile with a leading hole
    // is treated leniently: the ring opens its own polygon.
    let mut polygons: Vec<Polygon<f64>> = Vec::new();
    let mut exterior: Option<(LineString<f64>, Vec<LineString<f64>>)> = None;
    for ring in rings {
        if ring_area(&ring) >= 0.0 || exterior.is_none() {
            if let Some((ext, holes)) = exterior.take() {
                polygons.push(Polygon::new(ext, holes));
            }
            exterior = Some((ring, Vec::new()));
        } else if let Some((_, holes)) = exterior.as_mut() {
            holes.push(ring);
        }
    }
    if let Some((ext, holes)) = exterior.take() {
        polygons.push(Polygon::new(ext, holes));
    }

    match polygons.len() {
        0 => Err(Error::Decode("empty polygon geometry".to_string())),
        1 => Ok(Geometry::Polygon(polygons.pop().unwrap())),
        _ => Ok(Geometry::MultiPolygon(MultiPolygon::new(polygons))),
    }
}

/// Bounding box of a command stream without building geometry.
///
/// Returns `None` for an empty stream.
pub fn command_stream_bounds(commands: &[u32]) -> Result<Option<Bounds>> {
    let mut reader = StreamReader::new(commands);
    let mut bounds = Bounds::empty();
    let mut seen = false;

    while !reader.done() {
        let (id, count) = reader.next_command()?;
        if id == CMD_CLOSE_PATH {
            continue;
        }
        for _ in 0..count {
            let c = reader.next_point()?;
            bounds.expand(&Bounds::new(c.x, c.y, c.x, c.y));
            seen = true;
        }
    }

    Ok(seen.then_some(bounds))
}
