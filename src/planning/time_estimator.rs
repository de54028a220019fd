//! Per-extruder-plan time and material estimation, minimum-layer-time
//! speed scaling, and fan-speed interpolation (spec §4.8).

use crate::path::extruder_plan::{ExtruderPlan, TimeEstimates};
use crate::path::motion::MotionKind;
use crate::settings::{CoolingSettings, RetractionSettings};
use crate::units::Duration;

const MICROMETRES_PER_MM: f64 = 1000.0;

/// Walks every path of `plan` once, filling in `time_estimates` and
/// `material_volume`. Retraction and prime each contribute half a
/// toggle-duration to the retracted-travel bucket, charged once per path
/// rather than per segment.
pub fn estimate_plan(plan: &mut ExtruderPlan, retraction: &RetractionSettings) {
    let mut estimates = TimeEstimates::default();
    for path in &plan.paths {
        let speed = path.nominal_speed.value() * path.speed_factor * path.back_pressure_factor;
        if speed > 0.0 {
            for window in path.points.windows(2) {
                let length_mm = window[0].distance(window[1]) / MICROMETRES_PER_MM;
                let time = length_mm / speed;
                match path.kind {
                    MotionKind::Extrusion => {
                        estimates.extrude += time;
                        estimates.material_volume += length_mm
                            * (path.layer_thickness / MICROMETRES_PER_MM)
                            * (path.line_width / MICROMETRES_PER_MM);
                    }
                    MotionKind::Travel => {
                        if path.retract {
                            estimates.retracted_travel += time;
                        } else {
                            estimates.unretracted_travel += time;
                        }
                    }
                }
            }
        }
        if path.retract {
            estimates.retracted_travel += retraction.distance / retraction.speed / 2.0;
        }
        if path.perform_prime {
            estimates.retracted_travel += retraction.distance / retraction.prime_speed / 2.0;
        }
    }
    plan.time_estimates = estimates;
    plan.mark_estimates_valid();
}

/// Scales extrusion speed down (and, if that alone can't reach the target,
/// records `extra_time`) so the plan's total time meets `min_layer_time`
/// (spec §4.8). `estimate_plan` must have already been run.
pub fn apply_minimum_layer_time(plan: &mut ExtruderPlan, cooling: &CoolingSettings) {
    let travel_time = plan.time_estimates.retracted_travel + plan.time_estimates.unretracted_travel;
    let total_time = plan.time_estimates.extrude + travel_time;
    if total_time >= cooling.min_layer_time {
        return;
    }

    let actual_extrude_time = plan.time_estimates.extrude;
    let target_extrude_time = (cooling.min_layer_time - travel_time).max(0.0);
    if actual_extrude_time <= f64::EPSILON || target_extrude_time <= f64::EPSILON {
        plan.extra_time = Duration::new(cooling.min_layer_time - total_time);
        return;
    }

    let mut factor = actual_extrude_time / target_extrude_time;
    for path in &plan.paths {
        if path.kind != MotionKind::Extrusion {
            continue;
        }
        let base_speed = path.nominal_speed.value() * path.speed_factor;
        if base_speed <= 0.0 {
            continue;
        }
        let clamp = cooling.min_speed / base_speed;
        if clamp > factor {
            factor = clamp;
        }
    }

    plan.extrude_speed_factor = factor;
    plan.time_estimates.extrude = actual_extrude_time / factor;

    let scaled_total = plan.time_estimates.extrude + travel_time;
    if scaled_total < cooling.min_layer_time {
        plan.extra_time = Duration::new(cooling.min_layer_time - scaled_total);
    }
}

/// Fan speed for a layer of total duration `total_layer_time`, linearly
/// interpolated between `fan_speed_max` (at or below `min_layer_time`) and
/// `fan_speed_min` (at or above `min_layer_time_fan_speed_max`), then
/// blended toward `fan_speed_0` for the first `fan_full_layer` non-raft
/// layers (spec §4.8).
pub fn fan_speed(total_layer_time: f64, layer_index: i32, is_raft_layer: bool, cooling: &CoolingSettings) -> f64 {
    let base = if total_layer_time < cooling.min_layer_time {
        cooling.fan_speed_max
    } else if total_layer_time >= cooling.min_layer_time_fan_speed_max {
        cooling.fan_speed_min
    } else {
        let span = cooling.min_layer_time_fan_speed_max - cooling.min_layer_time;
        let t = if span > 0.0 { (total_layer_time - cooling.min_layer_time) / span } else { 0.0 };
        cooling.fan_speed_max + (cooling.fan_speed_min - cooling.fan_speed_max) * t
    };

    if is_raft_layer || layer_index < 0 || cooling.fan_full_layer == 0 {
        return base;
    }
    if (layer_index as usize) < cooling.fan_full_layer {
        let blend = layer_index as f64 / cooling.fan_full_layer as f64;
        cooling.fan_speed_0 + (base - cooling.fan_speed_0) * blend
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::path::motion::{FeatureConfig, FeatureTag, MotionRecord};
    use crate::settings::test_fixtures::default_test_settings;
    use crate::units::{Acceleration, Jerk, Ratio, Velocity};

    fn wall_config(speed: f64) -> FeatureConfig {
        FeatureConfig {
            feature_tag: FeatureTag::OuterWall,
            line_width: 400.0,
            layer_thickness: 200.0,
            nominal_speed: Velocity::new(speed),
            acceleration: Acceleration::new(1000.0),
            jerk: Jerk::new(8.0),
        }
    }

    fn extrusion_path(speed: f64, points: Vec<Point>) -> MotionRecord {
        let mut path = MotionRecord::new_extrusion(wall_config(speed), "mesh-a", Ratio::new(1.0), false, 1.0);
        path.points = points;
        path
    }

    #[test]
    fn estimate_plan_buckets_extrude_time_and_material_volume() {
        let settings = default_test_settings();
        let mut plan = ExtruderPlan::new(0, 0, true, false);
        plan.paths.push(extrusion_path(60.0, vec![Point::new(0, 0), Point::new(60_000, 0)]));
        estimate_plan(&mut plan, &settings.retraction);
        assert!((plan.time_estimates.extrude - 1.0).abs() < 1e-9);
        assert!((plan.time_estimates.material_volume - 60.0 * 0.2 * 0.4).abs() < 1e-9);
        assert!(plan.estimates_are_valid());
    }

    #[test]
    fn estimate_plan_charges_half_retract_duration_once_per_path() {
        let settings = default_test_settings();
        let mut plan = ExtruderPlan::new(0, 0, true, false);
        let mut travel = MotionRecord::new_travel("non-mesh", Velocity::new(150.0));
        travel.points = vec![Point::new(0, 0), Point::new(10_000, 0)];
        travel.retract = true;
        plan.paths.push(travel);
        estimate_plan(&mut plan, &settings.retraction);
        let expected_retract_half = settings.retraction.distance / settings.retraction.speed / 2.0;
        assert!(plan.time_estimates.retracted_travel > expected_retract_half);
    }

    #[test]
    fn minimum_layer_time_slows_extrusion_to_reach_the_floor() {
        let mut settings = default_test_settings();
        settings.cooling.min_layer_time = 10.0;
        settings.cooling.min_speed = 1.0;
        let mut plan = ExtruderPlan::new(0, 1, false, false);
        plan.paths.push(extrusion_path(60.0, vec![Point::new(0, 0), Point::new(60_000, 0)]));
        estimate_plan(&mut plan, &settings.retraction);
        assert!((plan.time_estimates.extrude - 1.0).abs() < 1e-9);

        apply_minimum_layer_time(&mut plan, &settings.cooling);
        assert!((plan.time_estimates.extrude - 10.0).abs() < 1e-9);
        assert!((plan.extrude_speed_factor - 0.1).abs() < 1e-9);
        assert_eq!(plan.extra_time.value(), 0.0);
    }

    #[test]
    fn minimum_layer_time_records_extra_time_when_the_clamp_bites() {
        let mut settings = default_test_settings();
        settings.cooling.min_layer_time = 10.0;
        settings.cooling.min_speed = 50.0;
        let mut plan = ExtruderPlan::new(0, 1, false, false);
        plan.paths.push(extrusion_path(60.0, vec![Point::new(0, 0), Point::new(60_000, 0)]));
        estimate_plan(&mut plan, &settings.retraction);

        apply_minimum_layer_time(&mut plan, &settings.cooling);
        assert!(plan.time_estimates.extrude < 10.0);
        assert!(plan.extra_time.value() > 0.0);
    }

    #[test]
    fn fan_speed_interpolates_between_max_and_min() {
        let settings = default_test_settings();
        let cooling = &settings.cooling;
        assert_eq!(fan_speed(2.0, 5, false, cooling), cooling.fan_speed_max);
        assert_eq!(fan_speed(20.0, 5, false, cooling), cooling.fan_speed_min);
        let mid = fan_speed(7.5, 5, false, cooling);
        assert!(mid > cooling.fan_speed_min && mid < cooling.fan_speed_max);
    }

    #[test]
    fn fan_speed_blends_toward_fan_speed_0_on_early_non_raft_layers() {
        let mut settings = default_test_settings();
        settings.cooling.fan_speed_0 = 0.0;
        settings.cooling.fan_full_layer = 2;
        let cooling = &settings.cooling;
        let layer0 = fan_speed(2.0, 0, false, cooling);
        assert_eq!(layer0, 0.0);
        let layer_raft = fan_speed(2.0, 0, true, cooling);
        assert_eq!(layer_raft, cooling.fan_speed_max);
    }
}
