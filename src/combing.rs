//! Combing engine (spec C4): routes travel moves through air and/or along
//! part boundaries, avoiding retraction where a collision-free path exists.
//!
//! Combing failure is reported as `None`, never as an error type — per
//! `error.rs`, the caller's fallback (retract and move in a straight line)
//! is a normal outcome, not an exceptional one.

use crate::geometry::{segment_intersection, Point, Polygons, SegmentIntersection};
use crate::settings::RetractionSettings;

/// One leg of a combing path: either routed inside a part, or through air.
#[derive(Debug, Clone, PartialEq)]
pub struct CombSegment {
    pub points: Vec<Point>,
    pub through_air: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CombResult {
    pub paths: Vec<CombSegment>,
    /// True iff the end was moved inside a region by the snap-to-inside
    /// step, so the caller must avoid an unretract blip before the final
    /// move (spec §4.4).
    pub unretract_before_last_move: bool,
    pub retract: bool,
}

struct Crossing {
    in_or_mid: Point,
    out: Point,
    part_index: usize,
}

pub struct CombingEngine<'a> {
    preferred: &'a Polygons,
    minimum: &'a Polygons,
    avoid: &'a Polygons,
    wall_line_width_0: f64,
    travel_avoid_distance: f64,
    move_inside_distance: f64,
}

impl<'a> CombingEngine<'a> {
    pub fn new(
        preferred: &'a Polygons,
        minimum: &'a Polygons,
        avoid: &'a Polygons,
        wall_line_width_0: f64,
        travel_avoid_distance: f64,
        move_inside_distance: f64,
    ) -> Self {
        Self {
            preferred,
            minimum,
            avoid,
            wall_line_width_0,
            travel_avoid_distance,
            move_inside_distance,
        }
    }

    /// Plans one travel move. `start_inside`/`end_inside` mirror the
    /// caller's own region test on each endpoint; only endpoints flagged
    /// `true` are snapped into a boundary part.
    pub fn plan(
        &self,
        start: Point,
        end: Point,
        start_inside: bool,
        end_inside: bool,
        max_ignore_distance: i64,
        retraction: &RetractionSettings,
    ) -> Option<CombResult> {
        if start.distance_squared(end) <= max_ignore_distance * max_ignore_distance {
            return Some(CombResult {
                paths: vec![CombSegment {
                    points: vec![start, end],
                    through_air: true,
                }],
                unretract_before_last_move: false,
                retract: false,
            });
        }

        if let Some(result) = self.try_same_part(self.preferred, start, end, start_inside, end_inside, false) {
            return Some(self.finish(result, retraction));
        }

        if let Some(mut result) =
            self.try_same_part(self.minimum, start, end, start_inside, end_inside, true)
        {
            for leg in result.paths.iter_mut() {
                for p in leg.points.iter_mut() {
                    if let Some(displaced) = self.displace_into_preferred(*p) {
                        *p = displaced;
                    }
                }
            }
            return Some(self.finish(result, retraction));
        }

        self.plan_with_crossing(start, end, retraction)
    }

    fn try_same_part(
        &self,
        boundary: &Polygons,
        start: Point,
        end: Point,
        start_inside: bool,
        end_inside: bool,
        snap_by_move_inside_distance: bool,
    ) -> Option<CombResult> {
        let push = if snap_by_move_inside_distance {
            self.move_inside_distance
        } else {
            self.wall_line_width_0
        };
        let snapped_start = if start_inside {
            Some(self.snap_inside(boundary, start, push)?)
        } else {
            None
        };
        let snapped_end = if end_inside {
            Some(self.snap_inside(boundary, end, push)?)
        } else {
            None
        };
        let ((snapped_start, part_a), (snapped_end, part_b)) = match (snapped_start, snapped_end) {
            (Some(a), Some(b)) => (a, b),
            _ => return None,
        };
        if part_a != part_b {
            return None;
        }
        let ring = boundary.part(part_a)?.points;
        let path = walk_through_rings(&[ring], snapped_start, snapped_end)?;
        Some(CombResult {
            paths: vec![CombSegment {
                points: path,
                through_air: false,
            }],
            unretract_before_last_move: false,
            retract: false,
        })
    }

    /// Pushes `p` into `boundary` by at least `push` micrometres, failing
    /// if no boundary point lies within the 2 mm² search radius (spec
    /// §4.4's snap-to-inside failure mode).
    fn snap_inside(&self, boundary: &Polygons, p: Point, push: f64) -> Option<(Point, usize)> {
        const MAX_SNAP_DISTANCE_SQUARED: i64 = 2_000_000; // 2 mm^2 in µm^2

        if let Some(idx) = boundary.part_containing(p) {
            return Some((p, idx));
        }

        let rings: Vec<Vec<Point>> = boundary.iter_rings().collect();
        let index = crate::geometry::spatial_index::SpatialIndex::build(&rings, 2_000);
        let hit = index.nearest_on_boundary(p, MAX_SNAP_DISTANCE_SQUARED, None)?;

        let direction = hit.point - p;
        let len = ((direction.x * direction.x + direction.y * direction.y) as f64).sqrt();
        let moved = if len < f64::EPSILON {
            hit.point
        } else {
            let scale = (len + push.max(1.0)) / len;
            Point::new(
                p.x + (direction.x as f64 * scale).round() as i64,
                p.y + (direction.y as f64 * scale).round() as i64,
            )
        };
        let part = boundary
            .part_containing(moved)
            .or(Some(hit.polygon_index))?;
        Some((moved, part))
    }

    /// Attempts to displace `p` outward into `self.preferred`, keeping the
    /// displacement only if it stays inside that boundary (spec §4.4 step 4).
    fn displace_into_preferred(&self, p: Point) -> Option<Point> {
        if self.preferred.contains_point(p) {
            return Some(p);
        }
        None
    }

    fn compute_crossing(&self, p: Point, other: Point) -> Option<Crossing> {
        let wall_offset = self.wall_line_width_0 / 2.0;
        let push = wall_offset;
        let (in_or_mid, part_index) = self.snap_inside_biased(self.preferred, p, other, push)?;

        let direction = other - in_or_mid;
        let len = ((direction.x * direction.x + direction.y * direction.y) as f64).sqrt();
        let reach = wall_offset + self.travel_avoid_distance;
        let out = if len < f64::EPSILON {
            in_or_mid
        } else {
            let scale = reach / len;
            Point::new(
                in_or_mid.x + (direction.x as f64 * scale).round() as i64,
                in_or_mid.y + (direction.y as f64 * scale).round() as i64,
            )
        };

        let max_crossing_distance_squared = {
            let d = std::f64::consts::SQRT_2 * (wall_offset + self.travel_avoid_distance);
            (d * d) as i64
        };
        if in_or_mid.distance_squared(out) > max_crossing_distance_squared {
            return None;
        }

        Some(Crossing {
            in_or_mid,
            out,
            part_index,
        })
    }

    /// Like `snap_inside`, but the nearest-boundary search is penalized
    /// toward `other` (spec §4.4 step 5's "nearest the other endpoint").
    fn snap_inside_biased(
        &self,
        boundary: &Polygons,
        p: Point,
        other: Point,
        push: f64,
    ) -> Option<(Point, usize)> {
        if let Some(idx) = boundary.part_containing(p) {
            return Some((p, idx));
        }
        let rings: Vec<Vec<Point>> = boundary.iter_rings().collect();
        let index = crate::geometry::spatial_index::SpatialIndex::build(&rings, 2_000);
        let penalty = |candidate: Point| candidate.distance_squared(other);
        // searches anywhere within a generous (500 mm radius) print volume
        // rather than an unbounded distance, to keep the cell scan bounded.
        const UNBOUNDED_SEARCH_DISTANCE_SQUARED: i64 = 250_000_000_000;
        let hit = index.nearest_on_boundary(p, UNBOUNDED_SEARCH_DISTANCE_SQUARED, Some(&penalty))?;

        let direction = hit.point - p;
        let len = ((direction.x * direction.x + direction.y * direction.y) as f64).sqrt();
        let moved = if len < f64::EPSILON {
            hit.point
        } else {
            let scale = (len + push.max(1.0)) / len;
            Point::new(
                p.x + (direction.x as f64 * scale).round() as i64,
                p.y + (direction.y as f64 * scale).round() as i64,
            )
        };
        let part = boundary
            .part_containing(moved)
            .or(Some(hit.polygon_index))?;
        Some((moved, part))
    }

    fn plan_with_crossing(&self, start: Point, end: Point, retraction: &RetractionSettings) -> Option<CombResult> {
        let start_crossing = self.compute_crossing(start, end)?;
        let end_crossing = self.compute_crossing(end, start)?;

        let start_ring = self.preferred.part(start_crossing.part_index)?.points;
        let inside_start =
            walk_through_rings(&[start_ring], start, start_crossing.in_or_mid)?;

        let end_ring = self.preferred.part(end_crossing.part_index)?.points;
        let inside_end = walk_through_rings(&[end_ring], end_crossing.in_or_mid, end)?;

        let avoid_rings: Vec<Vec<Point>> = self.avoid.iter_rings().collect();
        let routed_air = walk_through_rings(&avoid_rings, start_crossing.out, end_crossing.out);
        let straight_len = start_crossing.out.distance(end_crossing.out);
        let air_path = match routed_air {
            Some(routed) if path_length(&routed) < straight_len => routed,
            _ => vec![start_crossing.out, end_crossing.out],
        };

        let paths = vec![
            CombSegment {
                points: inside_start,
                through_air: false,
            },
            CombSegment {
                points: air_path,
                through_air: true,
            },
            CombSegment {
                points: inside_end,
                through_air: false,
            },
        ];

        Some(self.finish(
            CombResult {
                paths,
                unretract_before_last_move: false,
                retract: true,
            },
            retraction,
        ))
    }

    fn finish(&self, mut result: CombResult, retraction: &RetractionSettings) -> CombResult {
        let total_distance: f64 = result
            .paths
            .iter()
            .map(|leg| path_length(&leg.points))
            .sum();
        let crosses_boundary = result.paths.len() > 1;
        let multi_segment_air = result
            .paths
            .iter()
            .any(|leg| leg.through_air && leg.points.len() > 2);

        result.retract = result.retract
            || crosses_boundary
            || total_distance > retraction.combing_max_distance
            || (retraction.enable && multi_segment_air);
        result
    }
}

fn path_length(points: &[Point]) -> f64 {
    points.windows(2).map(|w| w[0].distance(w[1])).sum()
}

fn segment_vs_ring_intersections(ring: &[Point], a: Point, b: Point) -> Vec<(usize, Point)> {
    let n = ring.len();
    let mut hits = Vec::new();
    for i in 0..n {
        let p1 = ring[i];
        let p2 = ring[(i + 1) % n];
        match segment_intersection(a, b, p1, p2) {
            SegmentIntersection::Point(pt) => hits.push((i, pt)),
            SegmentIntersection::Collinear(p, q) => {
                hits.push((i, p));
                hits.push((i, q));
            }
            SegmentIntersection::None => {}
        }
    }
    hits
}

fn segment_crosses_any_ring(rings: &[Vec<Point>], a: Point, b: Point) -> bool {
    rings.iter().any(|ring| !segment_vs_ring_intersections(ring, a, b).is_empty())
}

fn nearest_ring_intersection(rings: &[Vec<Point>], a: Point, b: Point) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize, i64)> = None;
    for (ring_index, ring) in rings.iter().enumerate() {
        for (segment_index, pt) in segment_vs_ring_intersections(ring, a, b) {
            let d = a.distance_squared(pt);
            if best.map(|(_, _, bd)| d < bd).unwrap_or(true) {
                best = Some((ring_index, segment_index, d));
            }
        }
    }
    best.map(|(r, s, _)| (r, s))
}

fn walk_until_clear(
    rings: &[Vec<Point>],
    ring_index: usize,
    start_index: usize,
    forward: bool,
    end: Point,
) -> Option<Vec<Point>> {
    let ring = &rings[ring_index];
    let n = ring.len();
    if n == 0 {
        return None;
    }
    let mut via = Vec::new();
    let mut idx = start_index;
    for _ in 0..n {
        let v = ring[idx];
        via.push(v);
        if !segment_crosses_any_ring(rings, v, end) {
            return Some(via);
        }
        idx = if forward { (idx + 1) % n } else { (idx + n - 1) % n };
    }
    None
}

/// The direct-comb algorithm (spec §4.4 step 7): shoot the straight segment,
/// and whenever it collides with a ring, detour along whichever direction
/// around that ring is shorter (measured in vertices visited, not arc
/// length — a deliberate simplification of the source's arc-length
/// comparison).
fn walk_through_rings(rings: &[Vec<Point>], start: Point, end: Point) -> Option<Vec<Point>> {
    let mut path = vec![start];
    let mut current = start;
    let budget = (rings.iter().map(|r| r.len()).sum::<usize>().max(4)) * 2;

    for _ in 0..budget {
        match nearest_ring_intersection(rings, current, end) {
            None => {
                path.push(end);
                return Some(path);
            }
            Some((ring_index, segment_index)) => {
                let n = rings[ring_index].len();
                let forward = walk_until_clear(rings, ring_index, (segment_index + 1) % n, true, end);
                let backward = walk_until_clear(rings, ring_index, segment_index, false, end);
                let chosen = match (forward, backward) {
                    (Some(f), Some(b)) => {
                        if f.len() <= b.len() {
                            f
                        } else {
                            b
                        }
                    }
                    (Some(f), None) => f,
                    (None, Some(b)) => b,
                    (None, None) => return None,
                };
                current = *chosen.last().expect("walk_until_clear never returns empty");
                path.extend(chosen);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::test_fixtures::default_test_settings;

    fn square(min: i64, max: i64) -> Vec<Point> {
        vec![
            Point::new(min, min),
            Point::new(max, min),
            Point::new(max, max),
            Point::new(min, max),
        ]
    }

    #[test]
    fn short_travel_is_ignored_and_direct() {
        let preferred = Polygons::from_rings(vec![square(0, 100_000)]).unwrap();
        let minimum = preferred.clone();
        let avoid = Polygons::empty();
        let engine = CombingEngine::new(&preferred, &minimum, &avoid, 400.0, 625.0, 100.0);
        let retraction = default_test_settings().retraction;

        let result = engine
            .plan(
                Point::new(1_000, 1_000),
                Point::new(1_200, 1_000),
                true,
                true,
                500,
                &retraction,
            )
            .unwrap();
        assert_eq!(result.paths.len(), 1);
        assert!(result.paths[0].through_air);
        assert!(!result.retract);
    }

    #[test]
    fn travel_within_same_part_combs_without_retract() {
        let preferred = Polygons::from_rings(vec![square(0, 100_000)]).unwrap();
        let minimum = preferred.clone();
        let avoid = Polygons::empty();
        let engine = CombingEngine::new(&preferred, &minimum, &avoid, 400.0, 625.0, 100.0);
        let retraction = default_test_settings().retraction;

        let result = engine
            .plan(
                Point::new(5_000, 5_000),
                Point::new(90_000, 90_000),
                true,
                true,
                500,
                &retraction,
            )
            .unwrap();
        assert_eq!(result.paths.len(), 1);
        assert!(!result.paths[0].through_air);
    }

    #[test]
    fn travel_between_disjoint_parts_crosses_air() {
        let preferred =
            Polygons::from_rings(vec![square(0, 20_000), square(80_000, 100_000)]).unwrap();
        let minimum = preferred.clone();
        let avoid = preferred.offset(625);
        let engine = CombingEngine::new(&preferred, &minimum, &avoid, 400.0, 625.0, 100.0);
        let retraction = default_test_settings().retraction;

        let result = engine
            .plan(
                Point::new(10_000, 10_000),
                Point::new(90_000, 90_000),
                true,
                true,
                500,
                &retraction,
            )
            .unwrap();
        assert_eq!(result.paths.len(), 3);
        assert!(result.paths[1].through_air);
        assert!(result.retract);
    }

    #[test]
    fn snap_inside_fails_beyond_search_radius() {
        let preferred = Polygons::from_rings(vec![square(0, 20_000)]).unwrap();
        let minimum = preferred.clone();
        let avoid = Polygons::empty();
        let engine = CombingEngine::new(&preferred, &minimum, &avoid, 400.0, 625.0, 100.0);

        let far = Point::new(10_000_000, 10_000_000);
        assert!(engine.snap_inside(&preferred, far, 400.0).is_none());
    }
}
