//! Tile building: layer selection, the per-layer pipeline, and the worker
//! pool.
//!
//! A tile build walks the map's layers in order, keeps the ones visible at
//! the scale denominator, and runs each through project, clip, simplify,
//! encode. Layers never share mutable state, which is what licenses running
//! them concurrently: each worker produces a finished layer buffer into its
//! own slot, and the merge appends slots in source layer order. Completion
//! order cannot influence the output bytes.
//!
//! A failure inside one layer is logged and that layer omitted; sibling
//! layers are unaffected.

use std::sync::{mpsc, Mutex};
use std::thread;

use geo::{BoundingRect, Geometry, MapCoords};

use crate::clip::{clip_geometry, ClipParams, FillType};
use crate::compression::compress;
use crate::mvt::{LayerBuilder, Value};
use crate::parallel::jobs_by_chunks;
use crate::projection::{
    merc_extent, projection_for_srs, scale_denominator, Projection, ViewTransform,
};
use crate::raster::ScalingMethod;
use crate::simplify::simplify_geometry;
use crate::tile::{Bounds, MergePolicy, Tile, DEFAULT_BUFFER_SIZE, DEFAULT_TILE_SIZE};
use crate::{Error, Result};

/// Run layer units concurrently or one at a time on the caller's thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadingMode {
    #[default]
    Auto,
    Deferred,
}

/// Read-only configuration for one processing pass.
#[derive(Debug, Clone)]
pub struct ProcessorOptions {
    /// Rings below this tile-space area are dropped.
    pub area_threshold: f64,
    /// Keep sub-threshold rings anyway.
    pub process_all_rings: bool,
    /// Douglas-Peucker tolerance in tile units; 0 disables simplification.
    pub simplify_distance: f64,
    /// Union overlapping polygon parts within one feature.
    pub multi_polygon_union: bool,
    pub fill_type: FillType,
    /// Drop features matching no style rule before clipping.
    pub style_level_filter: bool,
    pub threading_mode: ThreadingMode,
    /// Worker count override; 0 means half the hardware threads.
    pub concurrency: usize,
    /// Format requested from the image encoder for raster sublayers.
    pub image_format: String,
    pub scaling_method: ScalingMethod,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            area_threshold: 0.1,
            process_all_rings: false,
            simplify_distance: 0.0,
            multi_polygon_union: false,
            fill_type: FillType::default(),
            style_level_filter: false,
            threading_mode: ThreadingMode::default(),
            concurrency: 0,
            image_format: "webp".to_string(),
            scaling_method: ScalingMethod::Bilinear,
        }
    }
}

/// One feature pulled from a datasource, in source coordinates.
#[derive(Debug, Clone)]
pub struct SourceFeature {
    pub id: Option<u64>,
    pub geometry: Option<Geometry<f64>>,
    pub attributes: Vec<(String, Value)>,
    /// Pre-encoded image bytes; a raster feature carries no vector geometry.
    pub raster: Option<Vec<u8>>,
}

impl SourceFeature {
    pub fn new(id: Option<u64>, geometry: Geometry<f64>) -> Self {
        Self {
            id,
            geometry: Some(geometry),
            attributes: Vec::new(),
            raster: None,
        }
    }

    pub fn with_attributes(mut self, attributes: Vec<(String, Value)>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn raster(id: Option<u64>, image: Vec<u8>) -> Self {
        Self {
            id,
            geometry: None,
            attributes: Vec::new(),
            raster: Some(image),
        }
    }
}

/// A layer's geometry source. Finite and restartable: each call yields the
/// features intersecting the envelope from the start.
pub trait Datasource: Send + Sync {
    /// `envelope` is in source coordinates.
    fn features(&self, envelope: &Bounds) -> Vec<SourceFeature>;
}

/// A styled map layer, as the processor needs to see it.
pub trait StyleLayer: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this layer participates at the given scale denominator.
    fn visible(&self, scale_denom: f64) -> bool;

    fn datasource(&self) -> Option<&dyn Datasource>;

    /// Style-rule predicate used by the style-level filter. The default
    /// keeps every feature.
    fn matches_style_filter(&self, _feature: &SourceFeature, _scale_denom: f64) -> bool {
        true
    }
}

/// The map being encoded. Read-only for the duration of a tile build and
/// safe to read from several worker threads at once.
pub trait Map: Sync {
    /// Layers in drawing order.
    fn layers(&self) -> Vec<&dyn StyleLayer>;

    fn srs(&self) -> &str {
        "epsg:4326"
    }

    /// Style-level buffer size, used when the caller does not pass one.
    fn buffer_size(&self) -> i32 {
        DEFAULT_BUFFER_SIZE
    }

    fn width(&self) -> u32 {
        256
    }

    fn height(&self) -> u32 {
        256
    }
}

/// A finished layer, ready to append onto the tile.
struct EncodedLayer {
    name: String,
    data: Vec<u8>,
    features: usize,
    painted: bool,
}

/// Per-build immutable state shared by every layer unit.
struct BuildContext {
    extent: Bounds,
    tile_size: u32,
    buffer_size: i32,
    scale_denom: f64,
    projection: Box<dyn Projection>,
}

/// Builds tiles from a map.
pub struct Processor<'a, M: Map + ?Sized> {
    map: &'a M,
    options: ProcessorOptions,
}

impl<'a, M: Map + ?Sized> Processor<'a, M> {
    pub fn new(map: &'a M) -> Self {
        Self {
            map,
            options: ProcessorOptions::default(),
        }
    }

    pub fn with_options(map: &'a M, options: ProcessorOptions) -> Self {
        Self { map, options }
    }

    pub fn options(&self) -> &ProcessorOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut ProcessorOptions {
        &mut self.options
    }

    /// Build the tile at grid coordinates (x, y, z) with default geometry
    /// parameters.
    pub fn create_tile(&self, x: u64, y: u64, z: u64) -> Result<Tile> {
        self.create_tile_with(x, y, z, DEFAULT_TILE_SIZE, None, 0.0, 0, 0)
    }

    /// Build the tile at (x, y, z).
    ///
    /// `buffer_size` of `None` falls back to the map's style-level buffer.
    /// `scale_denom <= 0` derives the denominator from the tile extent and
    /// the map's pixel width. `offset_x`/`offset_y` shift the nominal
    /// extent by that many tile units.
    #[allow(clippy::too_many_arguments)]
    pub fn create_tile_with(
        &self,
        x: u64,
        y: u64,
        z: u64,
        tile_size: u32,
        buffer_size: Option<i32>,
        scale_denom: f64,
        offset_x: i32,
        offset_y: i32,
    ) -> Result<Tile> {
        let mut extent = merc_extent(x, y, z);
        if offset_x != 0 || offset_y != 0 {
            let unit = extent.width() / tile_size as f64;
            let dx = offset_x as f64 * unit;
            let dy = offset_y as f64 * unit;
            extent = Bounds::new(
                extent.min_x + dx,
                extent.min_y - dy,
                extent.max_x + dx,
                extent.max_y - dy,
            );
        }

        let buffer_size = buffer_size.unwrap_or_else(|| self.map.buffer_size());
        let scale_denom = if scale_denom > 0.0 {
            scale_denom
        } else {
            scale_denominator(&extent, self.map.width())
        };

        let ctx = BuildContext {
            extent,
            tile_size,
            buffer_size,
            scale_denom,
            projection: projection_for_srs(self.map.srs()),
        };

        let all_layers = self.map.layers();
        let selected: Vec<&dyn StyleLayer> = all_layers
            .into_iter()
            .filter(|layer| {
                let visible = layer.visible(scale_denom);
                if !visible {
                    log::debug!(
                        "layer {:?} not visible at scale denominator {}",
                        layer.name(),
                        scale_denom
                    );
                }
                visible
            })
            .collect();

        let results = match self.options.threading_mode {
            ThreadingMode::Deferred => self.run_deferred(&selected, &ctx),
            ThreadingMode::Auto => self.run_parallel(&selected, &ctx),
        };

        let mut tile = Tile::from_xyz(x, y, z)
            .with_extent(extent)
            .with_tile_size(tile_size)
            .with_buffer_size(buffer_size);

        for (layer, result) in selected.iter().zip(results) {
            match result {
                Ok(Some(encoded)) => {
                    tile.append_layer(
                        &encoded.name,
                        encoded.data,
                        encoded.features,
                        MergePolicy::Skip,
                    )?;
                    if encoded.painted {
                        tile.set_painted(true);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    log::warn!("layer {:?} failed, omitting: {}", layer.name(), e);
                }
            }
        }

        Ok(tile)
    }

    fn run_deferred(
        &self,
        layers: &[&dyn StyleLayer],
        ctx: &BuildContext,
    ) -> Vec<Result<Option<EncodedLayer>>> {
        layers
            .iter()
            .map(|layer| self.process_layer(*layer, ctx))
            .collect()
    }

    /// Fan layer indices out over a fixed pool, collect `(index, result)`
    /// messages, and return results slotted back into submission order.
    fn run_parallel(
        &self,
        layers: &[&dyn StyleLayer],
        ctx: &BuildContext,
    ) -> Vec<Result<Option<EncodedLayer>>> {
        let total = layers.len();
        let jobs = jobs_by_chunks(total, self.options.concurrency);
        if jobs <= 1 {
            return self.run_deferred(layers, ctx);
        }

        let (task_tx, task_rx) = mpsc::channel::<usize>();
        let task_rx = Mutex::new(task_rx);
        let (result_tx, result_rx) = mpsc::channel::<(usize, Result<Option<EncodedLayer>>)>();

        for index in 0..total {
            // The receiver outlives every send.
            let _ = task_tx.send(index);
        }
        drop(task_tx);

        let mut slots: Vec<Option<Result<Option<EncodedLayer>>>> =
            (0..total).map(|_| None).collect();

        thread::scope(|s| {
            for _ in 0..jobs {
                let task_rx = &task_rx;
                let result_tx = result_tx.clone();
                s.spawn(move || loop {
                    let index = {
                        let rx = task_rx.lock().expect("task queue lock poisoned");
                        match rx.recv() {
                            Ok(index) => index,
                            Err(_) => break,
                        }
                    };
                    let result = self.process_layer(layers[index], ctx);
                    if result_tx.send((index, result)).is_err() {
                        break;
                    }
                });
            }
            drop(result_tx);

            while let Ok((index, result)) = result_rx.recv() {
                slots[index] = Some(result);
            }
        });

        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| Err(Error::Encode("layer worker died".to_string())))
            })
            .collect()
    }

    /// The whole per-layer pipeline: query, filter, project, clip, simplify,
    /// encode.
    fn process_layer(
        &self,
        layer: &dyn StyleLayer,
        ctx: &BuildContext,
    ) -> Result<Option<EncodedLayer>> {
        let Some(datasource) = layer.datasource() else {
            log::debug!("layer {:?} has no datasource", layer.name());
            return Ok(None);
        };

        let vt = ViewTransform::new(ctx.extent, ctx.tile_size);
        let buffer = ctx.buffer_size as f64;
        let tile_size = ctx.tile_size as f64;
        let clip_window = Bounds::new(-buffer, -buffer, tile_size + buffer, tile_size + buffer);
        let nominal_window = Bounds::new(0.0, 0.0, tile_size, tile_size);

        // Query envelope in source coordinates.
        let buffered = ctx
            .extent
            .buffered(ctx.extent.width() * buffer / tile_size);
        let (ax, ay) = ctx.projection.inverse(buffered.min_x, buffered.min_y);
        let (bx, by) = ctx.projection.inverse(buffered.max_x, buffered.max_y);
        let envelope = Bounds::new(ax.min(bx), ay.min(by), ax.max(bx), ay.max(by));

        let clip_params = ClipParams {
            area_threshold: self.options.area_threshold,
            process_all_rings: self.options.process_all_rings,
            fill_type: self.options.fill_type,
            multi_polygon_union: self.options.multi_polygon_union,
        };

        let mut builder = LayerBuilder::new(layer.name(), ctx.tile_size);
        let mut painted = false;

        for feature in datasource.features(&envelope) {
            if self.options.style_level_filter
                && !layer.matches_style_filter(&feature, ctx.scale_denom)
            {
                continue;
            }

            if let Some(raster) = feature.raster {
                builder.add_raster_feature(feature.id, raster);
                painted = true;
                continue;
            }

            let Some(geometry) = feature.geometry else {
                continue;
            };

            let tile_geom = geometry.map_coords(|c| {
                let (mx, my) = ctx.projection.forward(c.x, c.y);
                let (tx, ty) = vt.to_tile(mx, my);
                geo::Coord { x: tx, y: ty }
            });

            let Some(clipped) = clip_geometry(&tile_geom, &clip_window, &clip_params) else {
                continue;
            };
            let simplified = simplify_geometry(&clipped, self.options.simplify_distance);

            if builder.add_feature(feature.id, &simplified, &feature.attributes) {
                if let Some(rect) = simplified.bounding_rect() {
                    let bbox = Bounds::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y);
                    if bbox.intersects(&nominal_window) {
                        painted = true;
                    }
                }
            }
        }

        if builder.is_empty() {
            return Ok(None);
        }
        let name = layer.name().to_string();
        let (data, features) = builder.encode();
        Ok(Some(EncodedLayer {
            name,
            data,
            features,
            painted,
        }))
    }
}

/// One-call convenience: build the tile at (x, y, z) and return its buffer
/// compressed with zlib framing.
#[allow(clippy::too_many_arguments)]
pub fn create_mvt_merc<M: Map + ?Sized>(
    map: &M,
    x: u64,
    y: u64,
    z: u64,
    tile_size: u32,
    buffer_size: Option<i32>,
    scale_denom: f64,
    offset_x: i32,
    offset_y: i32,
    style_level_filter: bool,
) -> Result<Vec<u8>> {
    let options = ProcessorOptions {
        style_level_filter,
        ..Default::default()
    };
    let processor = Processor::with_options(map, options);
    let tile =
        processor.create_tile_with(x, y, z, tile_size, buffer_size, scale_denom, offset_x, offset_y)?;
    compress(&tile.buffer())
}

/// Build a span-by-span block of adjacent tiles in one call.
///
/// Returns uncompressed tile buffers in row-major order: the tile at column
/// `c`, row `r` lands at index `r * span + c`. Tiles are independent work
/// units; each builds its layers sequentially while the block itself is
/// chunked across workers.
pub fn create_mvt_wafer_merc<M: Map + ?Sized>(
    map: &M,
    x0: u64,
    y0: u64,
    z: u64,
    span: u64,
    options: &ProcessorOptions,
) -> Result<Vec<Vec<u8>>> {
    let coords: Vec<(u64, u64)> = (0..span)
        .flat_map(|row| (0..span).map(move |col| (x0 + col, y0 + row)))
        .collect();

    let tile_options = ProcessorOptions {
        threading_mode: ThreadingMode::Deferred,
        ..options.clone()
    };

    let total = coords.len();
    let jobs = jobs_by_chunks(total, options.concurrency);
    let chunk_size = total.div_ceil(jobs.max(1));

    let results: Vec<Result<Vec<u8>>> = thread::scope(|s| {
        let mut handles = Vec::with_capacity(jobs);
        for chunk in coords.chunks(chunk_size.max(1)) {
            let tile_options = &tile_options;
            handles.push(s.spawn(move || {
                chunk
                    .iter()
                    .map(|&(x, y)| {
                        let processor = Processor::with_options(map, tile_options.clone());
                        processor.create_tile(x, y, z).map(|tile| tile.buffer())
                    })
                    .collect::<Vec<_>>()
            }));
        }
        handles
            .into_iter()
            .flat_map(|h| h.join().expect("wafer worker panicked"))
            .collect()
    });

    results.into_iter().collect()
}
