//! Geometry simplification in tile-local units.
//!
//! Ramer-Douglas-Peucker via `geo::Simplify`, applied after clipping so the
//! visible boundary at the tile edge cannot shift. The tolerance is a
//! distance in tile units; a tolerance of zero disables simplification.
//!
//! Working in tile-local coordinates keeps the result independent of
//! latitude: the same shape simplifies the same way anywhere on the map.

use geo::{Geometry, LineString, MultiLineString, MultiPolygon, Polygon, Simplify};

/// Simplify a tile-local geometry with the given tolerance.
///
/// Points pass through unchanged. Degenerate inputs (lines with fewer than
/// two vertices) are returned as-is; the encoder drops them later.
pub fn simplify_geometry(geom: &Geometry<f64>, tolerance: f64) -> Geometry<f64> {
    if tolerance <= 0.0 {
        return geom.clone();
    }

    match geom {
        Geometry::Point(_) | Geometry::MultiPoint(_) => geom.clone(),

        Geometry::LineString(ls) => {
            if ls.0.len() < 2 {
                return geom.clone();
            }
            Geometry::LineString(ls.simplify(&tolerance))
        }

        Geometry::MultiLineString(mls) => {
            let lines: Vec<LineString<f64>> = mls
                .0
                .iter()
                .map(|ls| {
                    if ls.0.len() < 2 {
                        ls.clone()
                    } else {
                        ls.simplify(&tolerance)
                    }
                })
                .collect();
            Geometry::MultiLineString(MultiLineString::new(lines))
        }

        Geometry::Polygon(poly) => Geometry::Polygon(poly.simplify(&tolerance)),

        Geometry::MultiPolygon(mp) => {
            let polys: Vec<Polygon<f64>> = mp.0.iter().map(|p| p.simplify(&tolerance)).collect();
            Geometry::MultiPolygon(MultiPolygon::new(polys))
        }

        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Coord, EuclideanDistance, Line};

    fn wavy_line(points: usize, amplitude: f64) -> LineString<f64> {
        let coords: Vec<Coord<f64>> = (0..points)
            .map(|i| Coord {
                x: i as f64 * 4096.0 / (points - 1) as f64,
                y: 2048.0 + (i as f64 * 0.7).sin() * amplitude,
            })
            .collect();
        LineString::new(coords)
    }

    #[test]
    fn test_zero_tolerance_is_identity() {
        let line = Geometry::LineString(wavy_line(100, 5.0));
        assert_eq!(simplify_geometry(&line, 0.0), line);
    }

    #[test]
    fn test_simplify_reduces_vertices() {
        let original = wavy_line(1000, 3.0);
        let simplified = simplify_geometry(&Geometry::LineString(original.clone()), 10.0);
        let Geometry::LineString(out) = simplified else {
            panic!("expected LineString");
        };
        assert!(
            out.0.len() * 4 < original.0.len(),
            "expected material reduction, got {} of {}",
            out.0.len(),
            original.0.len()
        );
    }

    #[test]
    fn test_simplify_preserves_endpoints() {
        let original = wavy_line(1000, 3.0);
        let first = original.0[0];
        let last = *original.0.last().unwrap();
        let Geometry::LineString(out) =
            simplify_geometry(&Geometry::LineString(original), 10.0)
        else {
            panic!("expected LineString");
        };
        assert_eq!(out.0[0], first);
        assert_eq!(*out.0.last().unwrap(), last);
    }

    #[test]
    fn test_simplify_deviation_bounded_by_tolerance() {
        let original = wavy_line(1000, 3.0);
        let tolerance = 10.0;
        let Geometry::LineString(out) =
            simplify_geometry(&Geometry::LineString(original.clone()), tolerance)
        else {
            panic!("expected LineString");
        };

        // Every dropped vertex stays within tolerance of the simplified line.
        for c in &original.0 {
            let min_dist = out
                .lines()
                .map(|seg: Line<f64>| geo::Point::from(*c).euclidean_distance(&seg))
                .fold(f64::INFINITY, f64::min);
            assert!(
                min_dist <= tolerance + 1e-9,
                "vertex deviates {} > {}",
                min_dist,
                tolerance
            );
        }
    }

    #[test]
    fn test_points_unchanged() {
        let point = Geometry::Point(geo::point!(x: 17.0, y: 21.0));
        assert_eq!(simplify_geometry(&point, 50.0), point);
    }

    #[test]
    fn test_polygon_ring_simplified() {
        let coords: Vec<Coord<f64>> = (0..=72)
            .map(|i| {
                let angle = (i as f64) * 5.0_f64.to_radians();
                Coord {
                    x: 2048.0 + angle.cos() * 1000.0,
                    y: 2048.0 + angle.sin() * 1000.0,
                }
            })
            .collect();
        let poly = Polygon::new(LineString::new(coords), vec![]);
        let Geometry::Polygon(out) =
            simplify_geometry(&Geometry::Polygon(poly.clone()), 50.0)
        else {
            panic!("expected Polygon");
        };
        assert!(out.exterior().0.len() < poly.exterior().0.len());
    }
}
