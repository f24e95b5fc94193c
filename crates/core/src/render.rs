//! Feeding a decoded tile back into a renderer.
//!
//! Rasterization lives outside this crate. What belongs here is the walk:
//! take a tile buffer, take the map's layer order and visibility rules, and
//! hand each visible, present layer's features to the renderer collaborator
//! through a pull-based iterator filtered to the render window.

use crate::decode::{parse, DecodedFeature, LayerReader};
use crate::processor::Map;
use crate::projection::scale_denominator;
use crate::tile::{Bounds, Tile};
use crate::Result;

/// Caller-facing knobs for one render pass. Zeroes mean "derive from the
/// map and tile".
#[derive(Debug, Clone)]
pub struct RenderParams {
    pub scale_factor: f64,
    pub scale_denom: f64,
    /// Overrides the tile's buffer size when set.
    pub buffer_size: Option<i32>,
    pub width: u32,
    pub height: u32,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.0,
            scale_denom: 0.0,
            buffer_size: None,
            width: 0,
            height: 0,
        }
    }
}

/// Resolved request geometry handed to the renderer with each layer.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    /// Tile extent in projected meters.
    pub extent: Bounds,
    pub tile_size: u32,
    pub buffer_size: i32,
    pub scale_factor: f64,
    pub scale_denom: f64,
    pub width: u32,
    pub height: u32,
}

/// The rendering collaborator contract.
///
/// Implementations draw; they surface
/// [`crate::Error::UnsupportedImageType`] for raster payloads or surface
/// types they cannot handle, and the error aborts the render immediately.
pub trait FeatureRenderer {
    fn apply_to_layer(
        &mut self,
        layer: &LayerReader,
        features: &mut dyn Iterator<Item = Result<DecodedFeature>>,
        request: &RenderRequest,
    ) -> Result<()>;
}

/// Walk the map's layers in order and feed each visible layer present in
/// the tile to the renderer.
///
/// Returns the names of the layers actually applied, in order. Layers
/// invisible at the scale denominator or absent from the buffer are
/// skipped, not errors.
pub fn render_tile<M: Map + ?Sized, R: FeatureRenderer>(
    tile: &Tile,
    map: &M,
    renderer: &mut R,
    params: &RenderParams,
) -> Result<Vec<String>> {
    let reader = parse(&tile.buffer())?;

    let width = if params.width > 0 { params.width } else { map.width() };
    let height = if params.height > 0 { params.height } else { map.height() };
    let scale_factor = if params.scale_factor > 0.0 {
        params.scale_factor
    } else {
        1.0
    };
    let scale_denom = if params.scale_denom > 0.0 {
        params.scale_denom
    } else {
        scale_denominator(tile.extent(), width)
    } * scale_factor;
    let buffer_size = params.buffer_size.unwrap_or_else(|| tile.buffer_size());

    let request = RenderRequest {
        extent: *tile.extent(),
        tile_size: tile.tile_size(),
        buffer_size,
        scale_factor,
        scale_denom,
        width,
        height,
    };

    let mut applied = Vec::new();
    for layer in map.layers() {
        if !layer.visible(scale_denom) {
            continue;
        }
        let Some(decoded) = reader.layer_by_name(layer.name()) else {
            continue;
        };

        // The decoded layer may use its own extent; scale the window.
        let ratio = decoded.extent() as f64 / request.tile_size as f64;
        let margin = buffer_size as f64 * ratio;
        let window = Bounds::new(
            -margin,
            -margin,
            decoded.extent() as f64 + margin,
            decoded.extent() as f64 + margin,
        );

        let mut features = decoded.features_in_envelope(&window);
        renderer.apply_to_layer(decoded, &mut features, &request)?;
        applied.push(decoded.name().to_string());
    }

    Ok(applied)
}
