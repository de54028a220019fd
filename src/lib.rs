//! A layer path-planning core for fused-filament 3D printing: comb-boundary
//! construction, a combing engine, variable-density infill subdivision,
//! the layer-plan builder that emits ordered motion records, path-order
//! optimization, and the time/flow/fan/preheat/coasting passes that run
//! over a finished plan before a g-code writer sees it.
//!
//! This crate does not slice meshes, generate wall/skin/infill region
//! polygons, or emit g-code text — those are external collaborators (spec
//! §6) the caller supplies or consumes through the traits in [`scene`].

pub mod comb_boundary;
pub mod combing;
pub mod error;
pub mod fractal;
pub mod geometry;
pub mod optimizer;
pub mod path;
pub mod planning;
pub mod scene;
pub mod settings;
pub mod units;

pub use comb_boundary::{build as build_comb_boundaries, CombBoundaries};
pub use combing::{CombResult, CombSegment, CombingEngine};
pub use error::{ConfigurationError, FractalError, GeometryError, Result, SlicerErrors};
pub use path::extruder_plan::{ExtruderPlan, PathHandle, TemperatureInsert, TimeEstimates};
pub use path::layer_plan::LayerPlan;
pub use path::motion::{FeatureConfig, FeatureTag, MotionKind, MotionRecord, SeamConfig, NON_MESH};
pub use scene::{
    CombinedDensityProvider, DensityProvider, ExtruderSettings, MeshGroup, MeshSettings, Scene,
    SliceData, StatisticSelector, UniformDensityProvider,
};
pub use settings::Settings;

/// Runs the C8/C9 passes over a finished `LayerPlan`: time/material
/// estimation, minimum-layer-time speed scaling, fan speed, coasting, and
/// back-pressure compensation, in that order (spec §4.8/§4.9 — estimation
/// must run first since the later passes and the minimum-layer-time scale
/// both read the estimates it produces).
///
/// Preheat scheduling is not included here: it needs the *next* layer's
/// extruder ordering, which a single layer plan doesn't carry, so callers
/// invoke [`planning::preheat::schedule_extruder_switch`] themselves at
/// each extruder-switch boundary while walking layers in order.
pub fn finalize_layer_plan(layer: &mut LayerPlan, settings: &Settings) -> f64 {
    let mut layer_time = 0.0;
    for plan in &mut layer.extruder_plans {
        planning::post_process::apply_back_pressure_compensation(plan, &settings.back_pressure);
        if let Some(coasting) = settings.coasting.get() {
            planning::post_process::apply_coasting(plan, coasting);
        }
        planning::time_estimator::estimate_plan(plan, &settings.retraction);
        planning::time_estimator::apply_minimum_layer_time(plan, &settings.cooling);
        let estimates = &plan.time_estimates;
        let plan_time =
            estimates.extrude + estimates.retracted_travel + estimates.unretracted_travel + plan.extra_time.value();
        layer_time += plan_time;
    }
    for plan in &mut layer.extruder_plans {
        plan.fan_speed = planning::time_estimator::fan_speed(
            layer_time,
            layer.layer_index,
            layer.layer_index < 0,
            &settings.cooling,
        );
    }
    layer_time
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Polygons;
    use crate::path::motion::{FeatureConfig, FeatureTag};
    use crate::settings::test_fixtures::default_test_settings;
    use crate::units::{Acceleration, Jerk, Velocity};

    #[test]
    fn finalize_layer_plan_fills_in_time_estimates_and_fan_speed() {
        let settings = default_test_settings();
        let mut layer = LayerPlan::new(
            0,
            200_000,
            200_000,
            200_000,
            CombBoundaries { minimum: Polygons::empty(), preferred: Polygons::empty() },
            Polygons::empty(),
            &settings,
            0,
        );
        let config = FeatureConfig {
            feature_tag: FeatureTag::OuterWall,
            line_width: 400.0,
            layer_thickness: 200.0,
            nominal_speed: Velocity::new(30.0),
            acceleration: Acceleration::new(1000.0),
            jerk: Jerk::new(8.0),
        };
        let square = vec![
            geometry::Point::new(0, 0),
            geometry::Point::new(10_000, 0),
            geometry::Point::new(10_000, 10_000),
            geometry::Point::new(0, 10_000),
        ];
        layer.add_polygon(&square, 0, false, config, 0.0, false, 1.0, false);

        let layer_time = finalize_layer_plan(&mut layer, &settings);
        assert!(layer_time > 0.0);
        assert!(layer.extruder_plans[0].estimates_are_valid());
        assert!(layer.extruder_plans[0].fan_speed >= settings.cooling.fan_speed_min);
    }
}
