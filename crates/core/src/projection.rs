//! Projection and tile-local coordinate transforms.
//!
//! Source geometry arrives in geographic coordinates (lon/lat degrees) or
//! already-projected Web Mercator meters. The processor projects it forward
//! onto the EPSG:3857 plane and then maps the tile's extent onto the integer
//! grid `[0, tile_size]` with [`ViewTransform`]. Quantization happens last,
//! at encode time, so clipping and simplification run in floating tile-local
//! space without compounding rounding error.

use std::f64::consts::PI;

use crate::tile::Bounds;

/// WGS84 equatorial radius in meters.
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Circumference of the Mercator plane, in meters.
pub const EARTH_CIRCUMFERENCE: f64 = 2.0 * PI * EARTH_RADIUS;

/// Half the Mercator plane: the plane spans `[-MERC_MAX, MERC_MAX]` on both
/// axes.
pub const MERC_MAX: f64 = EARTH_CIRCUMFERENCE / 2.0;

/// Latitude limit of the square Mercator plane.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Standardized rendering pixel size in meters, used to derive scale
/// denominators (OGC 0.28 mm per pixel).
pub const PIXEL_SIZE_M: f64 = 0.000_28;

/// A forward/inverse transform between a source SRS and projected meters.
pub trait Projection: Send + Sync {
    /// Source coordinates to projected meters.
    fn forward(&self, x: f64, y: f64) -> (f64, f64);
    /// Projected meters back to source coordinates.
    fn inverse(&self, x: f64, y: f64) -> (f64, f64);
}

/// Spherical Web Mercator (EPSG:4326 lon/lat degrees to EPSG:3857 meters).
#[derive(Debug, Clone, Copy, Default)]
pub struct WebMercator;

impl Projection for WebMercator {
    fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
        let x = lon.to_radians() * EARTH_RADIUS;
        let y = ((PI / 4.0) + lat.to_radians() / 2.0).tan().ln() * EARTH_RADIUS;
        (x, y)
    }

    fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let lon = (x / EARTH_RADIUS).to_degrees();
        let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
        (lon, lat)
    }
}

/// Identity transform for sources already in projected meters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Projection for Identity {
    fn forward(&self, x: f64, y: f64) -> (f64, f64) {
        (x, y)
    }

    fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        (x, y)
    }
}

/// Pick the transform for a map's SRS string. Anything already on the
/// Mercator plane is passed through untouched; everything else is treated as
/// geographic lon/lat.
pub fn projection_for_srs(srs: &str) -> Box<dyn Projection> {
    let lower = srs.to_ascii_lowercase();
    if lower.contains("3857") || lower.contains("900913") {
        Box::new(Identity)
    } else {
        Box::new(WebMercator)
    }
}

/// Extent of a Web Mercator grid tile in projected meters.
///
/// Row 0 is the top of the plane: tile y increases southward.
pub fn merc_extent(x: u64, y: u64, z: u64) -> Bounds {
    let n = (1u64 << z.min(62)) as f64;
    let size = EARTH_CIRCUMFERENCE / n;
    let min_x = -MERC_MAX + x as f64 * size;
    let max_y = MERC_MAX - y as f64 * size;
    Bounds::new(min_x, max_y - size, min_x + size, max_y)
}

/// Map scale denominator for an extent rendered at `width` pixels.
pub fn scale_denominator(extent: &Bounds, width: u32) -> f64 {
    let resolution = extent.width() / width.max(1) as f64;
    resolution / PIXEL_SIZE_M
}

/// Affine mapping from an extent in projected meters onto the tile-local
/// grid `[0, tile_size]`, y flipped so that north is up at y = 0.
#[derive(Debug, Clone, Copy)]
pub struct ViewTransform {
    extent: Bounds,
    tile_size: f64,
}

impl ViewTransform {
    pub fn new(extent: Bounds, tile_size: u32) -> Self {
        Self {
            extent,
            tile_size: tile_size as f64,
        }
    }

    /// Projected meters to tile-local floating coordinates.
    #[inline]
    pub fn to_tile(&self, x: f64, y: f64) -> (f64, f64) {
        let tx = (x - self.extent.min_x) / self.extent.width() * self.tile_size;
        let ty = (self.extent.max_y - y) / self.extent.height() * self.tile_size;
        (tx, ty)
    }

    /// Tile-local coordinates back to projected meters.
    #[inline]
    pub fn from_tile(&self, tx: f64, ty: f64) -> (f64, f64) {
        let x = self.extent.min_x + tx / self.tile_size * self.extent.width();
        let y = self.extent.max_y - ty / self.tile_size * self.extent.height();
        (x, y)
    }
}

/// Round tile-local floats to grid integers, clamped to the representable
/// range. Geometry far outside the padded extent has been clipped away
/// before this point; the clamp only backstops pathological input.
#[inline]
pub fn quantize(tx: f64, ty: f64) -> (i32, i32) {
    (
        tx.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32,
        ty.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32,
    )
}
