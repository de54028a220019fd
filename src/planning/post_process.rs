//! Coasting and back-pressure post-processors (spec §4.9): the last pass
//! over a finished layer plan before it is handed to a g-code writer.

use crate::geometry::Point;
use crate::path::extruder_plan::ExtruderPlan;
use crate::path::motion::{MotionKind, MotionRecord};
use crate::settings::{BackPressureSettings, CoastingSettings};
use crate::units::Velocity;

const MICROMETRES_PER_MM: f64 = 1000.0;
const MIN_COAST_DISTANCE_UM: f64 = 100.0;

fn total_length(points: &[Point]) -> f64 {
    points.windows(2).map(|w| w[0].distance(w[1])).sum()
}

fn coast_distance_um(volume: f64, layer_thickness_um: f64, line_width_um: f64) -> f64 {
    if layer_thickness_um <= 0.0 || line_width_um <= 0.0 {
        return 0.0;
    }
    let layer_thickness_mm = layer_thickness_um / MICROMETRES_PER_MM;
    let line_width_mm = line_width_um / MICROMETRES_PER_MM;
    (volume / layer_thickness_mm) / line_width_mm * MICROMETRES_PER_MM
}

/// Splits `path`'s tail into a travel move when it is immediately followed
/// by one, coasting over a distance derived from `coasting.volume` (spec
/// §4.9). Returns the shortened extrusion points and the new travel record
/// to insert after it, or `None` when coasting doesn't apply.
fn coast_path(path: &MotionRecord, coasting: &CoastingSettings, extrude_speed_factor: f64) -> Option<(Vec<Point>, MotionRecord)> {
    let points = &path.points;
    if points.len() < 2 {
        return None;
    }
    let total = total_length(points);
    let coast_dist = coast_distance_um(coasting.volume, path.layer_thickness, path.line_width);
    let min_dist = coast_distance_um(coasting.min_volume, path.layer_thickness, path.line_width);

    let mut effective_dist = coast_dist;
    if min_dist > 0.0 && total < min_dist {
        effective_dist = coast_dist * (total / min_dist);
    }
    if effective_dist < MIN_COAST_DISTANCE_UM {
        return None;
    }
    effective_dist = effective_dist.min(total);

    // Walk backward from the end, segment by segment, until the remaining
    // coast distance fits inside the current segment, then interpolate the
    // exact split point rather than snapping to a vertex.
    let n = points.len();
    let mut remaining = effective_dist;
    let mut split_index = 0;
    let mut split_point = None;
    let mut j = n - 2;
    loop {
        let seg_len = points[j].distance(points[j + 1]);
        if seg_len >= remaining {
            let t = if seg_len > 0.0 { (seg_len - remaining) / seg_len } else { 0.0 };
            split_point = Some(points[j].lerp(points[j + 1], t));
            split_index = j;
            break;
        }
        remaining -= seg_len;
        if j == 0 {
            break;
        }
        j -= 1;
    }
    let split_point = split_point?;

    let mut kept = points[..=split_index].to_vec();
    kept.push(split_point);
    let mut coasted_tail = vec![split_point];
    coasted_tail.extend_from_slice(&points[split_index + 1..]);

    let travel_speed = coasting.speed * path.nominal_speed.value() * extrude_speed_factor;
    let mut travel = MotionRecord::new_travel(path.mesh_id.clone(), Velocity::new(travel_speed));
    travel.feature_tag = crate::path::motion::FeatureTag::Travel;
    travel.points = coasted_tail;
    Some((kept, travel))
}

/// Rewrites every extrusion path immediately followed by a travel so its
/// tail coasts instead of extruding (spec §4.9). Skipped entirely when
/// `coasting.volume <= 0`.
pub fn apply_coasting(plan: &mut ExtruderPlan, coasting: &CoastingSettings) {
    if coasting.volume <= 0.0 {
        return;
    }
    let extrude_speed_factor = plan.extrude_speed_factor;
    let mut i = 0;
    while i < plan.paths.len() {
        let followed_by_travel = plan.paths.get(i + 1).is_some_and(|p| p.kind == MotionKind::Travel);
        let is_extrusion = plan.paths[i].kind == MotionKind::Extrusion;
        if is_extrusion && followed_by_travel {
            if let Some((kept, travel)) = coast_path(&plan.paths[i], coasting, extrude_speed_factor) {
                plan.paths[i].points = kept;
                plan.paths[i].done = true;
                plan.paths.insert(i + 1, travel);
                i += 1;
            }
        }
        i += 1;
    }
}

/// Sets `back_pressure_factor` on every positive-flow extrusion path so
/// that thinner-than-nominal actual extrusion width is compensated with a
/// speed reduction (spec §4.9). The factor is read later by the time
/// estimator and by the g-code writer at emission time; this pass does not
/// touch timing itself.
pub fn apply_back_pressure_compensation(plan: &mut ExtruderPlan, back_pressure: &BackPressureSettings) {
    let width_factor = back_pressure.speed_equalize_flow_width_factor / 100.0;
    for path in &mut plan.paths {
        if path.kind != MotionKind::Extrusion {
            continue;
        }
        let nominal_width = path.line_width;
        let flow = path.flow_ratio.value();
        if nominal_width <= 0.0 || flow <= 0.0 {
            continue;
        }
        let actual_width = flow * nominal_width;
        if actual_width <= 0.0 {
            continue;
        }
        let factor = 1.0 + (nominal_width / actual_width - 1.0) * width_factor;
        path.back_pressure_factor = factor.max(0.001);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::motion::{FeatureConfig, FeatureTag};
    use crate::settings::test_fixtures::default_test_settings;
    use crate::units::{Acceleration, Jerk, Ratio};

    fn wall_config() -> FeatureConfig {
        FeatureConfig {
            feature_tag: FeatureTag::OuterWall,
            line_width: 400.0,
            layer_thickness: 200.0,
            nominal_speed: Velocity::new(30.0),
            acceleration: Acceleration::new(1000.0),
            jerk: Jerk::new(8.0),
        }
    }

    fn extrusion(points: Vec<Point>, flow: f64) -> MotionRecord {
        let mut path = MotionRecord::new_extrusion(wall_config(), "mesh-a", Ratio::new(flow), false, 1.0);
        path.points = points;
        path
    }

    fn travel(points: Vec<Point>) -> MotionRecord {
        let mut path = MotionRecord::new_travel("non-mesh", Velocity::new(150.0));
        path.points = points;
        path
    }

    #[test]
    fn coasting_splits_the_tail_into_a_travel_when_volume_is_positive() {
        let mut settings = default_test_settings();
        settings.coasting = crate::settings::OptionalSetting::enabled(crate::settings::CoastingSettings {
            volume: 0.064,
            min_volume: 0.0,
            speed: 0.9,
        });
        let mut plan = ExtruderPlan::new(0, 1, false, false);
        plan.paths.push(extrusion(vec![Point::new(0, 0), Point::new(100_000, 0)], 1.0));
        plan.paths.push(travel(vec![Point::new(100_000, 0), Point::new(150_000, 0)]));

        apply_coasting(&mut plan, &settings.coasting);

        assert_eq!(plan.paths.len(), 3);
        assert_eq!(plan.paths[1].kind, MotionKind::Travel);
        assert!(plan.paths[0].points.last().unwrap().x < 100_000);
        assert_eq!(plan.paths[1].points.first(), plan.paths[0].points.last());
        assert_eq!(plan.paths[1].points.last(), Some(&Point::new(100_000, 0)));
    }

    #[test]
    fn coasting_is_skipped_when_volume_is_non_positive() {
        let settings = default_test_settings();
        assert_eq!(settings.coasting.volume, 0.064);
        let disabled = crate::settings::OptionalSetting::disabled(crate::settings::CoastingSettings {
            volume: 0.0,
            min_volume: 0.0,
            speed: 0.9,
        });
        let mut plan = ExtruderPlan::new(0, 1, false, false);
        plan.paths.push(extrusion(vec![Point::new(0, 0), Point::new(100_000, 0)], 1.0));
        plan.paths.push(travel(vec![Point::new(100_000, 0), Point::new(150_000, 0)]));
        apply_coasting(&mut plan, &disabled);
        assert_eq!(plan.paths.len(), 2);
    }

    #[test]
    fn coasting_is_skipped_for_very_short_tails() {
        let coasting = crate::settings::CoastingSettings { volume: 1e-9, min_volume: 0.0, speed: 0.9 };
        let mut plan = ExtruderPlan::new(0, 1, false, false);
        plan.paths.push(extrusion(vec![Point::new(0, 0), Point::new(100_000, 0)], 1.0));
        plan.paths.push(travel(vec![Point::new(100_000, 0), Point::new(150_000, 0)]));
        apply_coasting(&mut plan, &coasting);
        assert_eq!(plan.paths.len(), 2);
    }

    #[test]
    fn back_pressure_slows_down_underfilled_extrusion() {
        let mut settings = default_test_settings();
        settings.back_pressure.speed_equalize_flow_width_factor = 100.0;
        let mut plan = ExtruderPlan::new(0, 0, true, false);
        plan.paths.push(extrusion(vec![Point::new(0, 0), Point::new(1000, 0)], 0.5));
        apply_back_pressure_compensation(&mut plan, &settings.back_pressure);
        assert!(plan.paths[0].back_pressure_factor < 1.0);
    }

    #[test]
    fn back_pressure_leaves_full_flow_paths_untouched() {
        let settings = default_test_settings();
        let mut plan = ExtruderPlan::new(0, 0, true, false);
        plan.paths.push(extrusion(vec![Point::new(0, 0), Point::new(1000, 0)], 1.0));
        apply_back_pressure_compensation(&mut plan, &settings.back_pressure);
        assert_eq!(plan.paths[0].back_pressure_factor, 1.0);
    }
}
