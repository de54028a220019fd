//! The settings surface consumed by the core (spec §6), grounded on the
//! teacher crate's own `settings.rs`: a top-level `Settings` struct,
//! `OptionalSetting<T>` for settings that can be switched off, and a
//! validation pass built from small repeated macros rather than hand
//! duplicating the same three checks per field.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};

macro_rules! setting_must_be_positive {
    ($settings:expr, $field:ident) => {{
        let value = $settings.$field;
        if value <= 0.0 {
            return Err(ConfigurationError::LessThanOrEqualToZero {
                setting: stringify!($field).to_string(),
                value,
            });
        }
    }};
}

macro_rules! setting_must_not_be_negative {
    ($settings:expr, $field:ident) => {{
        let value = $settings.$field;
        if value < 0.0 {
            return Err(ConfigurationError::LessThanZero {
                setting: stringify!($field).to_string(),
                value,
            });
        }
    }};
}

/// Wraps a setting that may be disabled entirely (e.g. skirt, support,
/// coasting). `Deref`s straight through to the inner value so call sites
/// read like `settings.coasting.coasting_volume` once enabled-ness has
/// been checked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptionalSetting<T> {
    enabled: bool,
    value: T,
}

impl<T> OptionalSetting<T> {
    pub fn enabled(value: T) -> Self {
        Self {
            enabled: true,
            value,
        }
    }

    pub fn disabled(value: T) -> Self {
        Self {
            enabled: false,
            value,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn get(&self) -> Option<&T> {
        self.enabled.then_some(&self.value)
    }
}

impl<T> Deref for OptionalSetting<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for OptionalSetting<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombingMode {
    Off,
    All,
    NoSkin,
    NoOuterSurfaces,
    Infill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeamStrategy {
    Random,
    UserSpecified,
    SharpestCorner,
    Shortest,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetractionSettings {
    pub enable: bool,
    pub distance: f64,
    pub speed: f64,
    pub prime_speed: f64,
    pub hop_enabled: bool,
    pub hop_height: f64,
    pub hop_only_when_collides: bool,
    pub hop_after_extruder_switch: bool,
    pub min_travel_distance: f64,
    pub combing_max_distance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CombingSettings {
    pub mode: CombingMode,
    pub wall_line_width_0: f64,
    pub wall_line_width_x: f64,
    pub wall_line_count: usize,
    pub travel_avoid_other_parts: bool,
    pub travel_avoid_supports: bool,
    pub travel_avoid_distance: f64,
    pub max_ignore_distance: f64,
    pub move_inside_distance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoolingSettings {
    pub min_layer_time: f64,
    pub min_layer_time_fan_speed_max: f64,
    pub fan_speed_min: f64,
    pub fan_speed_max: f64,
    pub fan_speed_0: f64,
    pub fan_full_layer: usize,
    pub min_speed: f64,
    pub lift_head: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoastingSettings {
    pub volume: f64,
    pub min_volume: f64,
    pub speed: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackPressureSettings {
    pub speed_equalize_flow_width_factor: f64,
    pub flow_rate_max_extrusion_offset: f64,
    pub flow_rate_extrusion_offset_factor: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BridgeSettings {
    pub wall_min_length: f64,
    pub wall_coast: f64,
    pub wall_overhang_speed_factor: f64,
    pub fan_speed: f64,
    pub wall_material_flow: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureSettings {
    pub print_temperature: f64,
    pub print_temperature_layer_0: f64,
    pub flow_dependent_temperature: bool,
    pub nozzle_heat_up_speed: f64,
    pub nozzle_cool_down_speed: f64,
    pub material_extrusion_cool_down_speed: f64,
}

/// Piecewise-linear flow (mm^3/s) -> temperature (degC) graph, ground
/// truthed against CuraEngine's `FlowTempGraph::getTemp` (see scenario D
/// of spec §8): below the first datum, the first temperature is returned;
/// above the last, the last; in between, linear interpolation between the
/// bracketing data points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowTempGraph {
    /// (flow mm^3/s, temperature degC) pairs, in increasing flow order.
    pub data: Vec<(f64, f64)>,
}

impl FlowTempGraph {
    pub fn get_temperature(
        &self,
        flow: f64,
        material_print_temperature: f64,
        flow_dependent_temperature: bool,
    ) -> f64 {
        if !flow_dependent_temperature || self.data.is_empty() {
            return material_print_temperature;
        }
        if self.data.len() == 1 {
            return self.data[0].1;
        }
        if flow < self.data[0].0 {
            log::warn!("flow-temperature query below the graph's lowest flow datum");
            return self.data[0].1;
        }
        let mut last = self.data[0];
        for &(next_flow, next_temp) in &self.data[1..] {
            if next_flow >= flow {
                let (last_flow, last_temp) = last;
                return last_temp
                    + (next_temp - last_temp) * (flow - last_flow) / (next_flow - last_flow);
            }
            last = (next_flow, next_temp);
        }
        log::warn!("flow-temperature query above the graph's highest flow datum");
        self.data.last().unwrap().1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovementParameter {
    pub travel: f64,
    pub outer_wall: f64,
    pub inner_wall: f64,
    pub skin: f64,
    pub infill: f64,
    pub support: f64,
    pub bridge: f64,
    pub small_feature: f64,
    pub small_feature_initial_layer: f64,
}

/// A complete settings file for the layer path-planning core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub layer_height: f64,
    pub initial_layer_line_width_factor: f64,

    pub retraction: RetractionSettings,
    pub combing: CombingSettings,
    pub cooling: CoolingSettings,
    pub coasting: OptionalSetting<CoastingSettings>,
    pub back_pressure: BackPressureSettings,
    pub bridge: BridgeSettings,
    pub temperature: TemperatureSettings,
    pub flow_temp_graph: FlowTempGraph,

    pub speed: MovementParameter,
    pub acceleration: MovementParameter,
    pub jerk: MovementParameter,

    pub seam: SeamStrategy,

    pub magic_spiralize: bool,
    pub smooth_spiralized_contours: bool,

    pub small_feature_max_length: f64,
    pub small_feature_speed_factor: f64,
    pub small_feature_speed_factor_0: f64,
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        setting_must_be_positive!(self, layer_height);
        setting_must_not_be_negative!(self.retraction, distance);
        setting_must_be_positive!(self.retraction, speed);
        setting_must_not_be_negative!(self.combing, travel_avoid_distance);
        setting_must_be_positive!(self.cooling, min_layer_time_fan_speed_max);
        if self.cooling.min_layer_time > self.cooling.min_layer_time_fan_speed_max {
            return Err(ConfigurationError::Unparseable {
                setting: "cool_min_layer_time".to_string(),
                reason: "must not exceed cool_min_layer_time_fan_speed_max".to_string(),
            });
        }
        if let Some(coasting) = self.coasting.get() {
            setting_must_not_be_negative!(coasting, volume);
            setting_must_not_be_negative!(coasting, min_volume);
        }
        Ok(())
    }

    /// Per-layer derived parameters, mirroring the teacher's
    /// `Settings::get_layer_settings`: the initial layer uses a distinct
    /// line-width factor.
    pub fn line_width_factor(&self, layer_index: i32) -> f64 {
        if layer_index <= 0 {
            self.initial_layer_line_width_factor
        } else {
            1.0
        }
    }
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::*;

    pub(crate) fn graph() -> FlowTempGraph {
        FlowTempGraph {
            data: vec![(1.5, 10.1), (25.1, 40.4), (26.5, 75.0), (50.0, 100.1)],
        }
    }

    pub(crate) fn default_test_settings() -> Settings {
        Settings {
            layer_height: 0.2,
            initial_layer_line_width_factor: 1.0,
            retraction: RetractionSettings {
                enable: true,
                distance: 4.0,
                speed: 35.0,
                prime_speed: 35.0,
                hop_enabled: false,
                hop_height: 0.2,
                hop_only_when_collides: false,
                hop_after_extruder_switch: true,
                min_travel_distance: 1500.0,
                combing_max_distance: 30000.0,
            },
            combing: CombingSettings {
                mode: CombingMode::All,
                wall_line_width_0: 400.0,
                wall_line_width_x: 400.0,
                wall_line_count: 2,
                travel_avoid_other_parts: true,
                travel_avoid_supports: false,
                travel_avoid_distance: 500.0,
                max_ignore_distance: 0.0,
                move_inside_distance: 100.0,
            },
            cooling: CoolingSettings {
                min_layer_time: 5.0,
                min_layer_time_fan_speed_max: 10.0,
                fan_speed_min: 50.0,
                fan_speed_max: 100.0,
                fan_speed_0: 0.0,
                fan_full_layer: 2,
                min_speed: 10.0,
                lift_head: false,
            },
            coasting: OptionalSetting::disabled(CoastingSettings {
                volume: 0.064,
                min_volume: 0.8,
                speed: 0.9,
            }),
            back_pressure: BackPressureSettings {
                speed_equalize_flow_width_factor: 100.0,
                flow_rate_max_extrusion_offset: 0.0,
                flow_rate_extrusion_offset_factor: 0.0,
            },
            bridge: BridgeSettings {
                wall_min_length: 5.0,
                wall_coast: 100.0,
                wall_overhang_speed_factor: 100.0,
                fan_speed: 100.0,
                wall_material_flow: 100.0,
            },
            temperature: TemperatureSettings {
                print_temperature: 200.0,
                print_temperature_layer_0: 200.0,
                flow_dependent_temperature: false,
                nozzle_heat_up_speed: 2.0,
                nozzle_cool_down_speed: 2.0,
                material_extrusion_cool_down_speed: 0.7,
            },
            flow_temp_graph: FlowTempGraph { data: vec![] },
            speed: MovementParameter {
                travel: 150.0,
                outer_wall: 30.0,
                inner_wall: 60.0,
                skin: 60.0,
                infill: 80.0,
                support: 60.0,
                bridge: 20.0,
                small_feature: 20.0,
                small_feature_initial_layer: 20.0,
            },
            acceleration: MovementParameter {
                travel: 5000.0,
                outer_wall: 1000.0,
                inner_wall: 1000.0,
                skin: 1000.0,
                infill: 1000.0,
                support: 1000.0,
                bridge: 1000.0,
                small_feature: 1000.0,
                small_feature_initial_layer: 1000.0,
            },
            jerk: MovementParameter {
                travel: 20.0,
                outer_wall: 8.0,
                inner_wall: 8.0,
                skin: 8.0,
                infill: 8.0,
                support: 8.0,
                bridge: 8.0,
                small_feature: 8.0,
                small_feature_initial_layer: 8.0,
            },
            seam: SeamStrategy::SharpestCorner,
            magic_spiralize: false,
            smooth_spiralized_contours: true,
            small_feature_max_length: 0.0,
            small_feature_speed_factor: 50.0,
            small_feature_speed_factor_0: 50.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_fixtures::*;

    #[test]
    fn flow_temp_interpolates_between_data_points() {
        let g = graph();
        let t = g.get_temperature(30.5, 200.0, true);
        assert!((t - 79.27).abs() < 0.01, "got {t}");
    }

    #[test]
    fn flow_temp_ignores_graph_when_not_flow_dependent() {
        let g = graph();
        assert_eq!(g.get_temperature(30.5, 200.0, false), 200.0);
    }

    #[test]
    fn flow_temp_clamps_below_and_above_range() {
        let g = graph();
        assert_eq!(g.get_temperature(1.0, 200.0, true), 10.1);
        assert_eq!(g.get_temperature(80.0, 200.0, true), 100.1);
    }

    #[test]
    fn validate_rejects_non_positive_layer_height() {
        let mut settings = default_test_settings();
        settings.layer_height = 0.0;
        assert!(settings.validate().is_err());
    }
}
