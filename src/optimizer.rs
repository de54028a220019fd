//! Path-order optimizers (spec §4.7): seam selection plus polygon/line
//! ordering for `add_polygons_by_optimizer`/`add_lines_by_optimizer`/
//! `add_lines_monotonic`. Grounded on the teacher's `plotter::walls`
//! seam-selection heuristic (sharpest-corner-by-turning-angle, nearest-to-
//! a-fixed-point), generalized here to the full `SeamStrategy` enum and
//! paired with a greedy nearest-neighbor polygon-order pass.

use crate::geometry::Point;
use crate::path::motion::SeamConfig;
use crate::settings::SeamStrategy;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

/// Where in a polygon's vertex list to start extruding, chosen per
/// `seam.strategy` (spec §4.7).
fn seam_index(polygon: &[Point], seam: &SeamConfig, reference: Option<Point>) -> usize {
    if polygon.is_empty() {
        return 0;
    }
    match seam.strategy {
        SeamStrategy::Random => rand::thread_rng().gen_range(0..polygon.len()),
        SeamStrategy::UserSpecified => {
            let target = seam.user_specified_point.or(reference).unwrap_or(polygon[0]);
            nearest_vertex(polygon, target)
        }
        SeamStrategy::SharpestCorner => sharpest_corner(polygon),
        SeamStrategy::Shortest => {
            let target = reference.unwrap_or(polygon[0]);
            nearest_vertex(polygon, target)
        }
    }
}

fn nearest_vertex(polygon: &[Point], target: Point) -> usize {
    polygon
        .iter()
        .enumerate()
        .min_by_key(|(_, &p)| p.distance_squared(target))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// The vertex whose interior angle is most acute, i.e. the turn with the
/// smallest cosine of the angle between its incoming and outgoing edges —
/// a good hiding spot for a seam on a convex-ish wall.
fn sharpest_corner(polygon: &[Point]) -> usize {
    let n = polygon.len();
    (0..n)
        .min_by(|&a, &b| turning_cosine(polygon, a).total_cmp(&turning_cosine(polygon, b)))
        .unwrap_or(0)
}

fn turning_cosine(polygon: &[Point], i: usize) -> f64 {
    let n = polygon.len();
    let prev = polygon[(i + n - 1) % n];
    let curr = polygon[i];
    let next = polygon[(i + 1) % n];
    let (ax, ay) = ((curr.x - prev.x) as f64, (curr.y - prev.y) as f64);
    let (bx, by) = ((next.x - curr.x) as f64, (next.y - curr.y) as f64);
    let dot = ax * bx + ay * by;
    let mag = (ax.hypot(ay) * bx.hypot(by)).max(1e-9);
    dot / mag
}

#[derive(Debug, Clone, Copy)]
pub struct PolygonPlacement {
    pub polygon_index: usize,
    pub start_index: usize,
}

/// Greedy nearest-neighbor polygon ordering: repeatedly pick whichever
/// remaining polygon's seam vertex is closest to the current position,
/// then advance the current position to that seam vertex (the walk
/// returns to its start, so the polygon's exit point is its seam point
/// too).
pub fn order_polygons_by_seam(
    polygons: &[Vec<Point>],
    seam: SeamConfig,
    start_position: Option<Point>,
) -> Vec<PolygonPlacement> {
    let mut remaining: Vec<usize> = (0..polygons.len()).collect();
    let mut placements = Vec::with_capacity(polygons.len());
    let mut current = start_position;

    while !remaining.is_empty() {
        let mut best: Option<(usize, usize, usize, i64)> = None; // (pos in remaining, poly idx, seam idx, dist)
        for (pos, &poly_idx) in remaining.iter().enumerate() {
            let seam_idx = seam_index(&polygons[poly_idx], &seam, current);
            let seam_point = polygons[poly_idx][seam_idx];
            let dist = current.map(|c| c.distance_squared(seam_point)).unwrap_or(0);
            if best.map_or(true, |(_, _, _, best_dist)| dist < best_dist) {
                best = Some((pos, poly_idx, seam_idx, dist));
            }
        }
        let (pos, poly_idx, seam_idx, _) = best.expect("remaining is non-empty");
        remaining.remove(pos);
        current = Some(polygons[poly_idx][seam_idx]);
        placements.push(PolygonPlacement { polygon_index: poly_idx, start_index: seam_idx });
    }
    placements
}

#[derive(Debug, Clone, Copy)]
pub struct LinePlacement {
    pub line_index: usize,
    pub reversed: bool,
}

/// Greedy nearest-neighbor ordering over open polylines, choosing whichever
/// free endpoint (start or end) is closer at each step (spec §4.7,
/// `add_lines_by_optimizer`'s shortest-path mode).
pub fn order_lines_by_shortest_path(lines: &[Vec<Point>], start_position: Option<Point>) -> Vec<LinePlacement> {
    let mut remaining: Vec<usize> = (0..lines.len()).filter(|&i| !lines[i].is_empty()).collect();
    let mut placements = Vec::with_capacity(remaining.len());
    let mut current = start_position;

    while !remaining.is_empty() {
        let mut best: Option<(usize, usize, bool, i64)> = None;
        for (pos, &idx) in remaining.iter().enumerate() {
            let line = &lines[idx];
            let first = *line.first().unwrap();
            let last = *line.last().unwrap();
            let dist_forward = current.map(|c| c.distance_squared(first)).unwrap_or(0);
            let dist_reversed = current.map(|c| c.distance_squared(last)).unwrap_or(0);
            if best.map_or(true, |(_, _, _, d)| dist_forward < d) {
                best = Some((pos, idx, false, dist_forward));
            }
            if best.map_or(true, |(_, _, _, d)| dist_reversed < d) {
                best = Some((pos, idx, true, dist_reversed));
            }
        }
        let (pos, idx, reversed, _) = best.expect("remaining is non-empty");
        remaining.remove(pos);
        let line = &lines[idx];
        current = Some(if reversed { line[0] } else { *line.last().unwrap() });
        placements.push(LinePlacement { line_index: idx, reversed });
    }
    placements
}

/// Orders lines by their projection onto `axis`, so the traversal sweeps
/// monotonically across the layer instead of splitting adjacent lines
/// between unrelated sections (spec §4.7, `add_lines_monotonic`).
pub fn order_lines_monotonic(lines: &[Vec<Point>], axis: Axis) -> Vec<LinePlacement> {
    let mut indices: Vec<usize> = (0..lines.len()).filter(|&i| !lines[i].is_empty()).collect();
    let projection = |p: Point| match axis {
        Axis::X => p.x,
        Axis::Y => p.y,
    };
    let average_projection = |line: &[Point]| -> i64 {
        let sum: i64 = line.iter().map(|&p| projection(p)).sum();
        sum / line.len() as i64
    };
    indices.sort_by_key(|&i| average_projection(&lines[i]));

    let mut placements = Vec::with_capacity(indices.len());
    let mut current: Option<Point> = None;
    for idx in indices {
        let line = &lines[idx];
        let first = *line.first().unwrap();
        let last = *line.last().unwrap();
        let reversed = current.is_some_and(|c| c.distance_squared(last) < c.distance_squared(first));
        current = Some(if reversed { first } else { last });
        placements.push(LinePlacement { line_index: idx, reversed });
    }
    placements
}
