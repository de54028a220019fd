//! Uniform grid bucket index from a 2D point to nearby polygon segments
//! (spec C2). Immutable after build; correctness (no false negative within
//! the search distance) requires cell size >= search radius.

use crate::geometry::{distance_squared_to_segment, Point};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CellCoord(i64, i64);

#[derive(Debug, Clone, Copy)]
struct Segment {
    polygon_index: usize,
    segment_index: usize,
    a: Point,
    b: Point,
}

/// The result of `nearest_on_boundary`: the polygon/segment hit and the
/// projected point on that segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestPoint {
    pub polygon_index: usize,
    pub segment_index: usize,
    pub point: Point,
}

pub struct SpatialIndex {
    cell_size: i64,
    buckets: HashMap<CellCoord, Vec<Segment>>,
}

impl SpatialIndex {
    /// Builds the grid from every ring of `polygons`, at the given cell
    /// size. Every segment is inserted into every cell its bounding box
    /// touches.
    pub fn build(polygons: &[Vec<Point>], cell_size: i64) -> Self {
        let mut buckets: HashMap<CellCoord, Vec<Segment>> = HashMap::new();
        let cell_size = cell_size.max(1);

        for (polygon_index, ring) in polygons.iter().enumerate() {
            let n = ring.len();
            if n < 2 {
                continue;
            }
            for segment_index in 0..n {
                let a = ring[segment_index];
                let b = ring[(segment_index + 1) % n];
                let seg = Segment {
                    polygon_index,
                    segment_index,
                    a,
                    b,
                };
                for cell in Self::cells_touched(a, b, cell_size) {
                    buckets.entry(cell).or_default().push(seg);
                }
            }
        }

        Self { cell_size, buckets }
    }

    fn cell_of(p: Point, cell_size: i64) -> CellCoord {
        CellCoord(p.x.div_euclid(cell_size), p.y.div_euclid(cell_size))
    }

    fn cells_touched(a: Point, b: Point, cell_size: i64) -> Vec<CellCoord> {
        let (min_x, max_x) = (a.x.min(b.x), a.x.max(b.x));
        let (min_y, max_y) = (a.y.min(b.y), a.y.max(b.y));
        let (cx0, cy0) = (min_x.div_euclid(cell_size), min_y.div_euclid(cell_size));
        let (cx1, cy1) = (max_x.div_euclid(cell_size), max_y.div_euclid(cell_size));
        let mut cells = Vec::new();
        for cx in cx0..=cx1 {
            for cy in cy0..=cy1 {
                cells.push(CellCoord(cx, cy));
            }
        }
        cells
    }

    /// Finds the closest boundary point to `p` within `max_distance_squared`,
    /// optionally biasing the search with a penalty function applied to the
    /// squared distance before comparison (used by the combing engine to
    /// prefer crossings nearer the travel's other endpoint).
    pub fn nearest_on_boundary(
        &self,
        p: Point,
        max_distance_squared: i64,
        penalty_fn: Option<&dyn Fn(Point) -> i64>,
    ) -> Option<ClosestPoint> {
        let radius_cells = (((max_distance_squared as f64).sqrt() / self.cell_size as f64).ceil()
            as i64)
            .max(1);
        let center = Self::cell_of(p, self.cell_size);

        let mut best: Option<(ClosestPoint, i64)> = None;
        for cx in (center.0 - radius_cells)..=(center.0 + radius_cells) {
            for cy in (center.1 - radius_cells)..=(center.1 + radius_cells) {
                let Some(segments) = self.buckets.get(&CellCoord(cx, cy)) else {
                    continue;
                };
                for seg in segments {
                    let d2 = distance_squared_to_segment(p, seg.a, seg.b);
                    if d2 > max_distance_squared {
                        continue;
                    }
                    let projected = project_onto_segment(p, seg.a, seg.b);
                    let penalized = penalty_fn.map(|f| f(projected)).unwrap_or(d2);
                    if best.as_ref().map(|(_, b)| penalized < *b).unwrap_or(true) {
                        best = Some((
                            ClosestPoint {
                                polygon_index: seg.polygon_index,
                                segment_index: seg.segment_index,
                                point: projected,
                            },
                            penalized,
                        ));
                    }
                }
            }
        }
        best.map(|(cp, _)| cp)
    }

    /// Visits every segment in cells touched by `line_segment`'s bounding
    /// box. The visitor may stop traversal early by returning `false`.
    pub fn for_each_segment_near(
        &self,
        line_segment: (Point, Point),
        mut visitor: impl FnMut(usize, usize, Point, Point) -> bool,
    ) {
        let cells = Self::cells_touched(line_segment.0, line_segment.1, self.cell_size);
        let mut visited_pairs = std::collections::HashSet::new();
        for cell in cells {
            let Some(segments) = self.buckets.get(&cell) else {
                continue;
            };
            for seg in segments {
                if !visited_pairs.insert((seg.polygon_index, seg.segment_index)) {
                    continue;
                }
                if !visitor(seg.polygon_index, seg.segment_index, seg.a, seg.b) {
                    return;
                }
            }
        }
    }
}

fn project_onto_segment(p: Point, a: Point, b: Point) -> Point {
    let (ax, ay) = (a.x as f64, a.y as f64);
    let (bx, by) = (b.x as f64, b.y as f64);
    let dx = bx - ax;
    let dy = by - ay;
    let len2 = dx * dx + dy * dy;
    if len2 <= f64::EPSILON {
        return a;
    }
    let t = (((p.x as f64 - ax) * dx) + ((p.y as f64 - ay) * dy)) / len2;
    let t = t.clamp(0.0, 1.0);
    Point::new((ax + t * dx).round() as i64, (ay + t * dy).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<Point> {
        vec![
            Point::new(0, 0),
            Point::new(10_000, 0),
            Point::new(10_000, 10_000),
            Point::new(0, 10_000),
        ]
    }

    #[test]
    fn nearest_on_boundary_finds_closest_edge() {
        let index = SpatialIndex::build(&[square()], 2_000);
        let hit = index
            .nearest_on_boundary(Point::new(5_000, 100), 1_000_000, None)
            .unwrap();
        assert_eq!(hit.point, Point::new(5_000, 0));
        assert_eq!(hit.segment_index, 0);
    }

    #[test]
    fn nearest_on_boundary_respects_max_distance() {
        let index = SpatialIndex::build(&[square()], 2_000);
        assert!(index
            .nearest_on_boundary(Point::new(5_000, 5_000), 100, None)
            .is_none());
    }

    #[test]
    fn for_each_segment_near_can_stop_early() {
        let index = SpatialIndex::build(&[square()], 2_000);
        let mut count = 0;
        index.for_each_segment_near((Point::new(0, 0), Point::new(10_000, 0)), |_, _, _, _| {
            count += 1;
            false
        });
        assert_eq!(count, 1);
    }
}
