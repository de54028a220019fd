//! Layer plan (spec C7): the mutable, single-layer builder whose public API
//! is the only way callers append motions. Every entry point that needs a
//! travel routes it through the combing engine (C4) built fresh from the
//! boundaries captured at construction — the engine borrows those boundaries
//! by reference, so it is built on demand rather than stored, avoiding a
//! self-referential struct.

use crate::combing::CombingEngine;
use crate::comb_boundary::CombBoundaries;
use crate::geometry::{closest_point_on_polyline, Point, Polygons};
use crate::optimizer::{self, Axis, SeamConfig};
use crate::path::extruder_plan::ExtruderPlan;
use crate::path::motion::{FeatureConfig, FeatureTag, MotionKind, NON_MESH};
use crate::settings::{BridgeSettings, RetractionSettings, Settings};
use crate::units::{Ratio, Velocity};
use std::collections::HashMap;

pub struct LayerPlan {
    pub layer_index: i32,
    pub layer_z: i64,
    pub final_travel_z: i64,
    pub layer_thickness: i64,
    pub extruder_plans: Vec<ExtruderPlan>,
    boundaries: CombBoundaries,
    avoid: Polygons,
    combing_enabled: bool,
    retraction: RetractionSettings,
    wall_line_width_0: f64,
    travel_avoid_distance: f64,
    move_inside_distance: f64,
    max_ignore_distance: i64,
    travel_speed: Velocity,
    pub last_planned_position: Option<Point>,
    pub first_travel_destination: Option<(Point, bool)>,
    skirt_brim_done: HashMap<usize, bool>,
    prime_tower_done: HashMap<usize, bool>,
    pub bridge_wall_mask: Polygons,
    pub overhang_mask: Polygons,
    pub current_mesh_id: String,
}

impl LayerPlan {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        layer_index: i32,
        layer_z: i64,
        final_travel_z: i64,
        layer_thickness: i64,
        boundaries: CombBoundaries,
        avoid: Polygons,
        settings: &Settings,
        start_extruder: usize,
    ) -> Self {
        Self {
            layer_index,
            layer_z,
            final_travel_z,
            layer_thickness,
            extruder_plans: vec![ExtruderPlan::new(
                start_extruder,
                layer_index,
                layer_index <= 0,
                layer_index < 0,
            )],
            combing_enabled: settings.combing.mode != crate::settings::CombingMode::Off,
            retraction: settings.retraction,
            wall_line_width_0: settings.combing.wall_line_width_0,
            travel_avoid_distance: settings.combing.travel_avoid_distance,
            move_inside_distance: settings.combing.move_inside_distance,
            max_ignore_distance: settings.combing.max_ignore_distance.round() as i64,
            travel_speed: Velocity::new(settings.speed.travel),
            boundaries,
            avoid,
            last_planned_position: None,
            first_travel_destination: None,
            skirt_brim_done: HashMap::new(),
            prime_tower_done: HashMap::new(),
            bridge_wall_mask: Polygons::empty(),
            overhang_mask: Polygons::empty(),
            current_mesh_id: NON_MESH.to_string(),
        }
    }

    fn current_plan(&mut self) -> &mut ExtruderPlan {
        self.extruder_plans.last_mut().expect("a layer plan always has at least one extruder plan")
    }

    pub fn skirt_brim_done(&self, extruder: usize) -> bool {
        self.skirt_brim_done.get(&extruder).copied().unwrap_or(false)
    }

    pub fn set_skirt_brim_done(&mut self, extruder: usize) {
        self.skirt_brim_done.insert(extruder, true);
    }

    pub fn prime_tower_done(&self, extruder: usize) -> bool {
        self.prime_tower_done.get(&extruder).copied().unwrap_or(false)
    }

    pub fn set_prime_tower_done(&mut self, extruder: usize) {
        self.prime_tower_done.insert(extruder, true);
    }

    /// The universal travel entry point (spec §4.7): consults the combing
    /// engine, falling back to a straight retracted travel when combing is
    /// disabled, fails, or `force_retract` is set. Below
    /// `retraction.min_travel_distance`, any requested retraction is
    /// suppressed.
    pub fn add_travel(&mut self, point: Point, force_retract: bool) {
        let start = self.last_planned_position.unwrap_or(point);
        if self.first_travel_destination.is_none() {
            let inside = self.boundaries.preferred.contains_point(point);
            self.first_travel_destination = Some((point, inside));
        }

        let comb_result = if self.combing_enabled && !force_retract {
            let engine = CombingEngine::new(
                &self.boundaries.preferred,
                &self.boundaries.minimum,
                &self.avoid,
                self.wall_line_width_0,
                self.travel_avoid_distance,
                self.move_inside_distance,
            );
            let start_inside = self.boundaries.preferred.contains_point(start);
            let end_inside = self.boundaries.preferred.contains_point(point);
            engine.plan(start, point, start_inside, end_inside, self.max_ignore_distance, &self.retraction)
        } else {
            None
        };

        let travel_distance = start.distance(point);
        let suppress_retract = travel_distance < self.retraction.min_travel_distance;

        let travel_speed = self.travel_speed;
        let hop_enabled = self.retraction.hop_enabled;
        let plan = self.current_plan();
        let handle = plan.latest_travel(travel_speed);
        match comb_result {
            Some(result) => {
                for leg in &result.paths {
                    for &p in &leg.points {
                        if Some(p) != plan.path(handle).last_point() {
                            plan.append_extrusion(handle, p);
                        }
                    }
                }
                plan.set_retract(handle, result.retract && !suppress_retract);
                plan.set_prime(handle, result.unretract_before_last_move);
            }
            None => {
                if plan.path(handle).points.is_empty() {
                    plan.append_extrusion(handle, start);
                }
                plan.append_extrusion(handle, point);
                plan.set_retract(handle, !suppress_retract);
                plan.set_z_hop(handle, hop_enabled);
            }
        }
        plan.force_new_path_start();
        self.last_planned_position = Some(point);
    }

    /// Inserts an extruder-switch travel to `park_position`, closes the
    /// current plan, opens a new one for `index`, then travels to
    /// `start_position`. The end-position travel is suppressed for the
    /// first plan of the layer.
    ///
    /// Per-extruder park/start positions are not modeled in the settings
    /// surface here (spec §6 narrows settings inheritance to what C3
    /// needs); callers supply them directly.
    pub fn set_extruder(&mut self, index: usize, park_position: Point, start_position: Point) {
        let is_first_of_layer = self.extruder_plans.len() == 1 && self.extruder_plans[0].paths.is_empty();
        if !is_first_of_layer {
            self.add_travel(park_position, false);
            self.current_plan().force_new_path_start();
        }
        let new_plan = ExtruderPlan::new(index, self.layer_index, self.layer_index <= 0, self.layer_index < 0);
        self.extruder_plans.push(new_plan);
        self.add_travel(start_position, false);
    }

    /// Travels to `polygon[start_index]`, extrudes the ring starting there
    /// (in reverse order when `reverse`), then performs a wipe of
    /// `wipe_distance` along the exit direction without extruding (spec
    /// §4.7).
    #[allow(clippy::too_many_arguments)]
    pub fn add_polygon(
        &mut self,
        polygon: &[Point],
        start_index: usize,
        reverse: bool,
        config: FeatureConfig,
        wipe_distance: f64,
        spiralize: bool,
        flow_ratio: f64,
        always_retract: bool,
    ) {
        if polygon.len() < 3 {
            return;
        }
        let n = polygon.len();
        let start_index = start_index % n;
        self.add_travel(polygon[start_index], always_retract);

        let mesh_id = self.current_mesh_id.clone();
        let handle = self.current_plan().latest_with_config(
            config,
            Ratio::new(flow_ratio),
            spiralize,
            1.0,
            mesh_id,
        );
        self.current_plan().append_extrusion(handle, polygon[start_index]);

        let mut last_point = polygon[start_index];
        let mut second_to_last = polygon[start_index];
        for step in 1..=n {
            let idx = if reverse { (start_index + n - step) % n } else { (start_index + step) % n };
            second_to_last = last_point;
            last_point = polygon[idx];
            self.current_plan().append_extrusion(handle, last_point);
        }
        self.current_plan().force_new_path_start();

        if wipe_distance > 0.0 {
            let direction = last_point - second_to_last;
            let len = (direction.x as f64).hypot(direction.y as f64);
            if len > f64::EPSILON {
                let scale = wipe_distance / len;
                let wipe_target = Point::new(
                    last_point.x + (direction.x as f64 * scale).round() as i64,
                    last_point.y + (direction.y as f64 * scale).round() as i64,
                );
                let wipe_handle = self.current_plan().latest_travel(config.nominal_speed);
                self.current_plan().append_extrusion(wipe_handle, last_point);
                self.current_plan().append_extrusion(wipe_handle, wipe_target);
                self.current_plan().set_retract(wipe_handle, false);
                self.current_plan().force_new_path_start();
                self.last_planned_position = Some(wipe_target);
                return;
            }
        }
        self.last_planned_position = Some(last_point);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_polygons_by_optimizer(
        &mut self,
        polygons: &[Vec<Point>],
        config: FeatureConfig,
        seam: SeamConfig,
        wipe_distance: f64,
        spiralize: bool,
        flow_ratio: f64,
        always_retract: bool,
    ) {
        let placements = optimizer::order_polygons_by_seam(polygons, seam, self.last_planned_position);
        for placement in placements {
            self.add_polygon(
                &polygons[placement.polygon_index],
                placement.start_index,
                false,
                config,
                wipe_distance,
                spiralize,
                flow_ratio,
                always_retract,
            );
        }
    }

    /// Extrudes a wall polyline starting at `start`, switching to a bridge
    /// configuration over segments that cross `bridge_wall_mask`, coasting
    /// the run immediately before a bridge, and ramping the speed back up
    /// over the runs immediately after one (spec §4.7).
    ///
    /// The source's post-bridge ramp recovers by a factor of 0.75 per
    /// discrete 1 mm segment; this is collapsed here into one motion record
    /// per non-bridge run with a closed-form `1 - (1-start)*0.75^len_mm`
    /// factor evaluated at the run's total length, rather than chunking
    /// every run into literal 1 mm pieces (see DESIGN.md).
    pub fn add_wall(&mut self, junctions: &[Point], start: Point, config: FeatureConfig, bridge: &BridgeSettings) {
        if junctions.len() < 2 {
            return;
        }
        self.add_travel(start, false);

        let mut points = vec![start];
        points.extend_from_slice(junctions);

        let mut just_left_bridge = false;
        let mut recovery_factor = 1.0f64;

        for window in points.windows(2) {
            let (a, b) = (window[0], window[1]);
            let midpoint = Point::new((a.x + b.x) / 2, (a.y + b.y) / 2);
            let is_bridge = self.bridge_wall_mask.contains_point(midpoint);
            let run_length_mm = a.distance(b) / 1000.0;

            let (feature_config, speed_factor, flow_ratio) = if is_bridge {
                just_left_bridge = true;
                recovery_factor = bridge.wall_overhang_speed_factor / 100.0;
                (config, bridge.wall_overhang_speed_factor / 100.0, bridge.wall_material_flow / 100.0)
            } else if just_left_bridge {
                recovery_factor = 1.0 - (1.0 - recovery_factor) * 0.75f64.powf(run_length_mm.max(0.001));
                just_left_bridge = recovery_factor < 0.999;
                (config, recovery_factor, 1.0)
            } else {
                (config, 1.0, 1.0)
            };

            let mesh_id = self.current_mesh_id.clone();
            let handle = self.current_plan().latest_with_config(
                feature_config,
                Ratio::new(flow_ratio),
                false,
                speed_factor,
                mesh_id,
            );
            if self.current_plan().path(handle).points.is_empty() {
                self.current_plan().append_extrusion(handle, a);
            }
            self.current_plan().append_extrusion(handle, b);

            if is_bridge && bridge.fan_speed > 0.0 {
                self.current_plan().set_fan(handle, bridge.fan_speed);
            }
        }
        self.current_plan().force_new_path_start();
        self.last_planned_position = points.last().copied();
    }

    pub fn add_lines_by_optimizer(&mut self, lines: &[Vec<Point>], config: FeatureConfig, wipe_distance: f64) {
        let placements = optimizer::order_lines_by_shortest_path(lines, self.last_planned_position);
        self.emit_line_placements(lines, &placements, config, wipe_distance);
    }

    pub fn add_lines_monotonic(&mut self, lines: &[Vec<Point>], axis: Axis, config: FeatureConfig, wipe_distance: f64) {
        let placements = optimizer::order_lines_monotonic(lines, axis);
        self.emit_line_placements(lines, &placements, config, wipe_distance);
    }

    fn emit_line_placements(
        &mut self,
        lines: &[Vec<Point>],
        placements: &[optimizer::LinePlacement],
        config: FeatureConfig,
        wipe_distance: f64,
    ) {
        for placement in placements {
            let line = &lines[placement.line_index];
            if line.len() < 2 {
                continue;
            }
            let ordered: Vec<Point> = if placement.reversed {
                line.iter().rev().copied().collect()
            } else {
                line.clone()
            };
            self.add_travel(ordered[0], false);

            let mesh_id = self.current_mesh_id.clone();
            let handle = self.current_plan().latest_with_config(config, Ratio::new(1.0), false, 1.0, mesh_id);
            for &p in &ordered {
                self.current_plan().append_extrusion(handle, p);
            }
            self.current_plan().force_new_path_start();

            if wipe_distance > 0.0 && ordered.len() >= 2 {
                let last = ordered[ordered.len() - 1];
                let prev = ordered[ordered.len() - 2];
                let direction = last - prev;
                let len = (direction.x as f64).hypot(direction.y as f64);
                if len > f64::EPSILON {
                    let scale = wipe_distance / len;
                    let wipe_target = Point::new(
                        last.x + (direction.x as f64 * scale).round() as i64,
                        last.y + (direction.y as f64 * scale).round() as i64,
                    );
                    let wipe_handle = self.current_plan().latest_travel(config.nominal_speed);
                    self.current_plan().append_extrusion(wipe_handle, last);
                    self.current_plan().append_extrusion(wipe_handle, wipe_target);
                    self.current_plan().set_retract(wipe_handle, false);
                    self.current_plan().force_new_path_start();
                    self.last_planned_position = Some(wipe_target);
                    continue;
                }
            }
            self.last_planned_position = ordered.last().copied();
        }
    }

    /// Produces one continuous, z-rising motion for a spiralized wall
    /// (spec §4.7): when `smooth` is set, each vertex is pulled toward the
    /// closest point on `previous_wall` rather than used verbatim.
    pub fn spiralize_wall_slice(
        &mut self,
        wall: &[Point],
        previous_wall: Option<&[Point]>,
        config: FeatureConfig,
        smooth: bool,
    ) {
        if wall.is_empty() {
            return;
        }
        let smoothed: Vec<Point> = if smooth {
            if let Some(previous) = previous_wall {
                wall.iter()
                    .map(|&p| match closest_point_on_polyline(previous, p) {
                        Some((closest, _)) => p.lerp(closest, 0.5),
                        None => p,
                    })
                    .collect()
            } else {
                wall.to_vec()
            }
        } else {
            wall.to_vec()
        };

        self.add_travel(smoothed[0], false);
        let mesh_id = self.current_mesh_id.clone();
        let handle = self.current_plan().latest_with_config(config, Ratio::new(1.0), true, 1.0, mesh_id);
        for &p in &smoothed {
            self.current_plan().append_extrusion(handle, p);
        }
        self.current_plan().force_new_path_start();
        self.last_planned_position = smoothed.last().copied();
    }
}
