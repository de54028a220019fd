//! Comb-boundary builder (spec C3): derives the "minimum" and "preferred"
//! inflated/deflated polygon sets the combing engine (C4) travels within.

use crate::geometry::Polygons;
use crate::settings::{CombingMode, CombingSettings};

/// A fixed inward offset applied before the wall-width term, regardless of
/// combing mode (spec §4.3).
const BASE_INSET: f64 = 10.0;

/// Raft layers (layer index < 0) use a flat outward offset instead of the
/// wall-width-derived inset.
const RAFT_OUTLINE_EXPANSION: i64 = 100;

#[derive(Debug, Clone)]
pub struct CombBoundaries {
    pub minimum: Polygons,
    pub preferred: Polygons,
}

impl CombBoundaries {
    fn both(polygons: Polygons) -> Self {
        Self {
            minimum: polygons.clone(),
            preferred: polygons,
        }
    }

    fn empty() -> Self {
        Self {
            minimum: Polygons::empty(),
            preferred: Polygons::empty(),
        }
    }
}

/// Builds both boundaries for one layer.
///
/// `inner_area` and `infill_area` are only consulted for
/// [`CombingMode::NoSkin`] and [`CombingMode::Infill`] respectively; pass
/// `None` when the caller has no such region for this layer (boundary
/// construction then falls back to the plain wall-offset result).
pub fn build(
    layer_index: i32,
    parts: &Polygons,
    inner_area: Option<&Polygons>,
    infill_area: Option<&Polygons>,
    raft_outline: Option<&Polygons>,
    settings: &CombingSettings,
) -> CombBoundaries {
    if layer_index < 0 {
        let raft = raft_outline.cloned().unwrap_or_else(Polygons::empty);
        return CombBoundaries::both(raft.offset(RAFT_OUTLINE_EXPANSION));
    }

    match settings.mode {
        CombingMode::Off => CombBoundaries::empty(),
        CombingMode::Infill => {
            CombBoundaries::both(infill_area.cloned().unwrap_or_else(Polygons::empty))
        }
        CombingMode::All | CombingMode::NoSkin | CombingMode::NoOuterSurfaces => {
            let minimum_offset = -(BASE_INSET + settings.wall_line_width_0);
            let preferred_offset = -(BASE_INSET
                + settings.wall_line_width_0
                + (settings.wall_line_count as f64 - 1.0) * settings.wall_line_width_x / 4.0);

            let mut minimum = parts.offset(minimum_offset.round() as i64);
            let mut preferred = parts.offset(preferred_offset.round() as i64);

            if settings.mode == CombingMode::NoSkin {
                if let (Some(inner), Some(infill)) = (inner_area, infill_area) {
                    let skin = inner.difference_with(infill);
                    minimum = minimum.difference_with(&skin);
                    preferred = preferred.difference_with(&skin);
                }
            }

            CombBoundaries { minimum, preferred }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::scene::MeshSettings;

    fn square(min: i64, max: i64) -> Vec<Point> {
        vec![
            Point::new(min, min),
            Point::new(max, min),
            Point::new(max, max),
            Point::new(min, max),
        ]
    }

    fn combing_settings(mode: CombingMode) -> CombingSettings {
        CombingSettings {
            mode,
            wall_line_width_0: 400.0,
            wall_line_width_x: 400.0,
            wall_line_count: 2,
            travel_avoid_other_parts: true,
            travel_avoid_supports: false,
            travel_avoid_distance: 625.0,
            max_ignore_distance: 500.0,
            move_inside_distance: 100.0,
        }
    }

    #[test]
    fn off_mode_produces_empty_boundaries() {
        let parts = Polygons::from_rings(vec![square(0, 10_000)]).unwrap();
        let boundaries = build(0, &parts, None, None, None, &combing_settings(CombingMode::Off));
        assert!(boundaries.minimum.is_empty());
        assert!(boundaries.preferred.is_empty());
    }

    #[test]
    fn all_mode_preferred_boundary_is_tighter_than_minimum() {
        let parts = Polygons::from_rings(vec![square(0, 10_000)]).unwrap();
        let boundaries = build(0, &parts, None, None, None, &combing_settings(CombingMode::All));
        assert!(boundaries.minimum.total_area() > boundaries.preferred.total_area());
        // both insets shrink the 10mm square, so the centre stays inside both
        assert!(boundaries.minimum.contains_point(Point::new(5_000, 5_000)));
        assert!(boundaries.preferred.contains_point(Point::new(5_000, 5_000)));
    }

    #[test]
    fn infill_mode_boundary_is_the_infill_area() {
        let parts = Polygons::from_rings(vec![square(0, 10_000)]).unwrap();
        let infill = Polygons::from_rings(vec![square(1_000, 9_000)]).unwrap();
        let boundaries = build(
            0,
            &parts,
            None,
            Some(&infill),
            None,
            &combing_settings(CombingMode::Infill),
        );
        assert_eq!(boundaries.minimum, infill);
        assert_eq!(boundaries.preferred, infill);
    }

    #[test]
    fn raft_layer_uses_expanded_raft_outline() {
        let raft = Polygons::from_rings(vec![square(0, 10_000)]).unwrap();
        let parts = Polygons::empty();
        let boundaries = build(-1, &parts, None, None, Some(&raft), &combing_settings(CombingMode::All));
        assert!(boundaries.minimum.contains_point(Point::new(-50, 5_000)));
    }

    #[test]
    fn no_skin_mode_subtracts_skin_from_boundary() {
        let parts = Polygons::from_rings(vec![square(0, 10_000)]).unwrap();
        let inner = Polygons::from_rings(vec![square(500, 9_500)]).unwrap();
        let infill = Polygons::from_rings(vec![square(2_000, 8_000)]).unwrap();
        let boundaries = build(
            0,
            &parts,
            Some(&inner),
            Some(&infill),
            None,
            &combing_settings(CombingMode::NoSkin),
        );
        // a point in the skin ring (inner minus infill) must be excluded
        assert!(!boundaries.preferred.contains_point(Point::new(1_000, 1_000)));
        // a point within the infill area remains part of the boundary
        assert!(boundaries.preferred.contains_point(Point::new(5_000, 5_000)));
    }

    #[test]
    fn infill_and_anti_overhang_is_and_not_or() {
        let both = MeshSettings {
            infill_mesh: true,
            anti_overhang_mesh: true,
            ..Default::default()
        };
        let only_infill = MeshSettings {
            infill_mesh: true,
            anti_overhang_mesh: false,
            ..Default::default()
        };
        assert!(both.is_infill_and_anti_overhang());
        assert!(!only_infill.is_infill_and_anti_overhang());
    }
}
