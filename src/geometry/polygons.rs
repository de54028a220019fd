//! Polygon and polygon-set types (spec §3) plus the boolean/offset
//! operations of C1, backed by `geo-clipper`'s integer clipping library so
//! that results are bit-identical across runs for identical inputs (spec
//! §4.1: "Every operation is deterministic and must be reproducible
//! bit-identically across runs with identical inputs; this is required for
//! upstream caching.").

use crate::error::GeometryError;
use crate::geometry::{require_at_least_three, Point, AABB};
use geo::{Contains, LineString, MultiPolygon};
use geo::{Coord, EuclideanDistance};
use geo_clipper::{Clipper, EndType, JoinType};
use itertools::Itertools;

/// `geo-clipper` internally scales coordinates to its fixed-point
/// representation. Our coordinates are already integral micrometres, so a
/// scale of 1.0 is exact.
const CLIPPER_SCALE: f64 = 1.0;

/// An ordered ring of points; the last point implicitly connects to the
/// first (spec §3, "Polygon").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Polygon {
    pub points: Vec<Point>,
}

impl Polygon {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Signed area (shoelace formula); sign encodes winding. Positive is
    /// counter-clockwise in a conventional (y-up) coordinate frame.
    pub fn signed_area(&self) -> f64 {
        if self.points.len() < 3 {
            return 0.0;
        }
        self.points
            .iter()
            .circular_tuple_windows::<(_, _)>()
            .map(|(p1, p2)| (p1.x as f64) * (p2.y as f64) - (p2.x as f64) * (p1.y as f64))
            .sum::<f64>()
            / 2.0
    }

    pub fn is_counter_clockwise(&self) -> bool {
        self.signed_area() > 0.0
    }

    pub fn bounding_box(&self) -> Option<AABB> {
        let mut iter = self.points.iter();
        let first = *iter.next()?;
        let (mut min, mut max) = (first, first);
        for p in iter {
            min = Point::new(min.x.min(p.x), min.y.min(p.y));
            max = Point::new(max.x.max(p.x), max.y.max(p.y));
        }
        Some(AABB::new(min, max))
    }

    fn to_geo_line_string(&self) -> LineString<f64> {
        LineString::from(self.points.iter().map(|p| p.to_coord()).collect::<Vec<_>>())
    }

    fn contains_point(&self, p: Point) -> bool {
        let line = self.to_geo_line_string();
        let geo_poly = geo::Polygon::new(line, vec![]);
        geo_poly.contains(&p.to_coord())
    }
}

/// A sequence of polygons whose combined area is the symmetric difference
/// under the even-odd rule: holes are polygons with opposite winding nested
/// inside an outer polygon (spec §3, "Polygon set").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Polygons {
    inner: MultiPolygon<f64>,
}

impl Polygons {
    pub fn empty() -> Self {
        Self {
            inner: MultiPolygon(vec![]),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.0.len()
    }

    pub fn from_geo(inner: MultiPolygon<f64>) -> Self {
        Self { inner }
    }

    pub fn as_geo(&self) -> &MultiPolygon<f64> {
        &self.inner
    }

    /// Assembles a flat list of rings (as produced by a slicer or a
    /// polygon-offset result) into outer/hole pairs by winding and nesting.
    /// Grounded on the teacher crate's own
    /// `Slice::from_multiple_point_loop`: sort rings by decreasing area,
    /// then assign each clockwise ("hole") ring to the smallest
    /// already-placed outer ring that contains it.
    pub fn from_rings(rings: Vec<Vec<Point>>) -> Result<Self, GeometryError> {
        let mut rings_and_area: Vec<(Polygon, f64)> = rings
            .into_iter()
            .map(Polygon::new)
            .map(|poly| {
                let area = poly.signed_area();
                (poly, area)
            })
            .filter(|(_, area)| area.abs() > 1e-6)
            .collect();

        rings_and_area.sort_by(|(_, a1), (_, a2)| {
            a2.abs()
                .partial_cmp(&a1.abs())
                .expect("areas are never NaN")
        });

        let mut polygons: Vec<geo::Polygon<f64>> = vec![];

        for (ring, area) in rings_and_area {
            require_at_least_three(&ring.points)?;
            if area > 0.0 {
                polygons.push(geo::Polygon::new(ring.to_geo_line_string(), vec![]));
            } else {
                let hole_point = ring.points[0];
                let outer = polygons
                    .iter_mut()
                    .rev()
                    .find(|poly| poly.contains(&hole_point.to_coord()))
                    .ok_or(GeometryError::AmbiguousNesting)?;
                outer.interiors_push(ring.to_geo_line_string());
            }
        }

        Ok(Self {
            inner: MultiPolygon(polygons),
        })
    }

    pub fn union_with(&self, other: &Polygons) -> Polygons {
        Polygons::from_geo(self.inner.union(&other.inner, CLIPPER_SCALE))
    }

    pub fn difference_with(&self, other: &Polygons) -> Polygons {
        Polygons::from_geo(self.inner.difference(&other.inner, CLIPPER_SCALE))
    }

    pub fn intersection_with(&self, other: &Polygons) -> Polygons {
        Polygons::from_geo(self.inner.intersection(&other.inner, CLIPPER_SCALE))
    }

    pub fn xor_with(&self, other: &Polygons) -> Polygons {
        Polygons::from_geo(self.inner.xor(&other.inner, CLIPPER_SCALE))
    }

    /// Offsets every contained polygon by `delta` micrometres (negative
    /// shrinks, positive grows), with rounded joins on closed polygons.
    pub fn offset(&self, delta: i64) -> Polygons {
        Polygons::from_geo(self.inner.offset(
            delta as f64,
            JoinType::Round(2.0),
            EndType::ClosedPolygon,
            CLIPPER_SCALE,
        ))
    }

    /// Offset with mitred joins, used where sharp corners must be
    /// preserved (e.g. avoid-polygon construction around rectangular
    /// parts).
    pub fn offset_mitre(&self, delta: i64, miter_limit: f64) -> Polygons {
        Polygons::from_geo(self.inner.offset(
            delta as f64,
            JoinType::Miter(miter_limit),
            EndType::ClosedPolygon,
            CLIPPER_SCALE,
        ))
    }

    pub fn contains_point(&self, p: Point) -> bool {
        self.inner.contains(&p.to_coord())
    }

    /// The index of the polygon (in iteration order) whose area contains
    /// `p`, if any. Holes are not separate "parts" — this returns the
    /// enclosing outer polygon's index.
    pub fn part_containing(&self, p: Point) -> Option<usize> {
        self.inner
            .0
            .iter()
            .position(|poly| poly.contains(&p.to_coord()))
    }

    pub fn part(&self, index: usize) -> Option<Polygon> {
        self.inner.0.get(index).map(|poly| {
            Polygon::new(
                poly.exterior()
                    .points()
                    .map(|pt| Point::from_coord(pt.into()))
                    .collect(),
            )
        })
    }

    pub fn iter_rings(&self) -> impl Iterator<Item = Vec<Point>> + '_ {
        self.inner.0.iter().flat_map(|poly| {
            std::iter::once(poly.exterior())
                .chain(poly.interiors())
                .map(|line| line.points().map(|pt| Point::from_coord(pt.into())).collect())
        })
    }

    pub fn total_area(&self) -> f64 {
        self.inner
            .0
            .iter()
            .map(|poly| {
                let ring = Polygon::new(
                    poly.exterior()
                        .points()
                        .map(|pt| Point::from_coord(pt.into()))
                        .collect(),
                );
                ring.signed_area().abs()
            })
            .sum()
    }
}

/// Closest point on a polyline to `p`, returning the point and the index
/// of the segment it lies on (spec §4.2 `ClosestPoint`).
pub fn closest_point_on_polyline(points: &[Point], p: Point) -> Option<(Point, usize)> {
    if points.len() < 2 {
        return points.first().map(|&pt| (pt, 0));
    }
    let target: Coord<f64> = p.to_coord();
    let mut best: Option<(Point, usize, f64)> = None;
    for (i, (a, b)) in points.iter().tuple_windows().enumerate() {
        let seg = geo::Line::new(a.to_coord(), b.to_coord());
        let closest = closest_point_on_segment(seg, target);
        let dist = closest.euclidean_distance(&target);
        if best.as_ref().map(|(_, _, d)| dist < *d).unwrap_or(true) {
            best = Some((Point::from_coord(closest), i, dist));
        }
    }
    best.map(|(pt, i, _)| (pt, i))
}

fn closest_point_on_segment(seg: geo::Line<f64>, p: Coord<f64>) -> Coord<f64> {
    let (start, end) = (seg.start, seg.end);
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let len2 = dx * dx + dy * dy;
    if len2 <= f64::EPSILON {
        return start;
    }
    let t = (((p.x - start.x) * dx) + ((p.y - start.y) * dy)) / len2;
    let t = t.clamp(0.0, 1.0);
    Coord {
        x: start.x + t * dx,
        y: start.y + t * dy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(min: i64, max: i64) -> Vec<Point> {
        vec![
            Point::new(min, min),
            Point::new(max, min),
            Point::new(max, max),
            Point::new(min, max),
        ]
    }

    #[test]
    fn signed_area_of_ccw_square_is_positive() {
        let poly = Polygon::new(square(0, 10_000));
        assert!((poly.signed_area() - 100_000_000.0).abs() < 1.0);
    }

    #[test]
    fn from_rings_pairs_hole_with_outer() {
        let outer = square(0, 10_000);
        let mut hole = square(2_000, 4_000);
        hole.reverse(); // clockwise => negative area => treated as hole

        let polygons = Polygons::from_rings(vec![outer, hole]).unwrap();
        assert_eq!(polygons.len(), 1);
        assert!(polygons.contains_point(Point::new(1_000, 1_000)));
        assert!(!polygons.contains_point(Point::new(3_000, 3_000)));
    }

    #[test]
    fn offset_shrinks_square_inward() {
        let polygons = Polygons::from_rings(vec![square(0, 10_000)]).unwrap();
        let shrunk = polygons.offset(-1_000);
        assert!(shrunk.contains_point(Point::new(5_000, 5_000)));
        assert!(!shrunk.contains_point(Point::new(200, 200)));
    }

    #[test]
    fn closest_point_on_polyline_projects_onto_segment() {
        let points = vec![Point::new(0, 0), Point::new(10_000, 0)];
        let (closest, idx) = closest_point_on_polyline(&points, Point::new(5_000, 500)).unwrap();
        assert_eq!(idx, 0);
        assert_eq!(closest, Point::new(5_000, 0));
    }
}
