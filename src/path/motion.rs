//! The motion record (spec §3, unit of C6): one travel or extrusion move,
//! carrying every field a g-code writer needs to emit it without consulting
//! anything else.

use crate::geometry::Point;
use crate::settings::SeamStrategy;
use crate::units::{Acceleration, Jerk, Ratio, Velocity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionKind {
    Travel,
    Extrusion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureTag {
    OuterWall,
    InnerWall,
    Skin,
    Roofing,
    Ironing,
    Infill,
    Support,
    SupportInterface,
    SkirtBrim,
    PrimeTower,
    Travel,
    MoveRetraction,
    MoveCombing,
}

/// The sentinel mesh id for motions with no owning mesh (travel, skirt,
/// prime tower).
pub const NON_MESH: &str = "non-mesh";

/// The subset of a motion's configuration that determines whether a new
/// path can be appended to, or must split from, the current tail (spec
/// §4.6: "if configs match").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureConfig {
    pub feature_tag: FeatureTag,
    pub line_width: f64,
    pub layer_thickness: f64,
    pub nominal_speed: Velocity,
    pub acceleration: Acceleration,
    pub jerk: Jerk,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MotionRecord {
    pub kind: MotionKind,
    pub points: Vec<Point>,
    pub feature_tag: FeatureTag,
    pub mesh_id: String,
    pub flow_ratio: Ratio,
    pub line_width: f64,
    pub layer_thickness: f64,
    pub nominal_speed: Velocity,
    pub acceleration: Acceleration,
    pub jerk: Jerk,
    pub speed_factor: f64,
    pub back_pressure_factor: f64,
    pub retract: bool,
    pub unretract_before_last_move: bool,
    pub perform_z_hop: bool,
    pub perform_prime: bool,
    pub spiralize: bool,
    pub fan_speed: Option<f64>,
    pub done: bool,
    pub skip_aggressive_merge_hint: bool,
}

impl MotionRecord {
    pub fn new_travel(mesh_id: impl Into<String>, nominal_speed: Velocity) -> Self {
        Self {
            kind: MotionKind::Travel,
            points: Vec::new(),
            feature_tag: FeatureTag::Travel,
            mesh_id: mesh_id.into(),
            flow_ratio: Ratio::new(0.0),
            line_width: 0.0,
            layer_thickness: 0.0,
            nominal_speed,
            acceleration: Acceleration::new(0.0),
            jerk: Jerk::new(0.0),
            speed_factor: 1.0,
            back_pressure_factor: 1.0,
            retract: false,
            unretract_before_last_move: false,
            perform_z_hop: false,
            perform_prime: false,
            spiralize: false,
            fan_speed: None,
            done: false,
            skip_aggressive_merge_hint: false,
        }
    }

    pub fn new_extrusion(
        config: FeatureConfig,
        mesh_id: impl Into<String>,
        flow_ratio: Ratio,
        spiralize: bool,
        speed_factor: f64,
    ) -> Self {
        Self {
            kind: MotionKind::Extrusion,
            points: Vec::new(),
            feature_tag: config.feature_tag,
            mesh_id: mesh_id.into(),
            flow_ratio,
            line_width: config.line_width,
            layer_thickness: config.layer_thickness,
            nominal_speed: config.nominal_speed,
            acceleration: config.acceleration,
            jerk: config.jerk,
            speed_factor,
            back_pressure_factor: 1.0,
            retract: false,
            unretract_before_last_move: false,
            perform_z_hop: false,
            perform_prime: false,
            spiralize,
            fan_speed: None,
            done: false,
            skip_aggressive_merge_hint: false,
        }
    }

    pub fn config(&self) -> FeatureConfig {
        FeatureConfig {
            feature_tag: self.feature_tag,
            line_width: self.line_width,
            layer_thickness: self.layer_thickness,
            nominal_speed: self.nominal_speed,
            acceleration: self.acceleration,
            jerk: self.jerk,
        }
    }

    pub fn last_point(&self) -> Option<Point> {
        self.points.last().copied()
    }
}

/// Per-extruder-plan seam configuration handed to the path-order optimizer
/// (spec §4.7, `add_polygons_by_optimizer`).
#[derive(Debug, Clone, Copy)]
pub struct SeamConfig {
    pub strategy: SeamStrategy,
    pub user_specified_point: Option<Point>,
}
