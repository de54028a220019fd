//! Extruder plan and the C6 path-container operations (spec §4.6): the
//! container the operations work over is simply the plan's own `paths`
//! vector, since every operation is phrased in terms of "the current tail
//! path" of a single ordered sequence.

use crate::geometry::Point;
use crate::path::motion::{FeatureConfig, MotionRecord, NON_MESH};
use crate::units::{Duration, Ratio};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Handle to a path within a plan, returned by `latest_with_config` so a
/// caller can chain `append_extrusion`/`set_fan`/etc. against it without
/// re-deriving the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathHandle(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureInsert {
    pub path_index: usize,
    pub temperature: f64,
    pub wait: bool,
}

impl Eq for TemperatureInsert {}

/// Ordered only by `path_index` (spec §4.6 invariant: "processed in
/// non-decreasing `path_index` order"); wrapped in `Reverse` at the call
/// site to turn `BinaryHeap`'s max-heap into the min-heap the invariant
/// needs.
impl Ord for TemperatureInsert {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path_index.cmp(&other.path_index)
    }
}

impl PartialOrd for TemperatureInsert {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TimeEstimates {
    pub extrude: f64,
    pub retracted_travel: f64,
    pub unretracted_travel: f64,
    pub material_volume: f64,
}

#[derive(Debug, Clone)]
pub struct ExtruderPlan {
    pub extruder_index: usize,
    pub layer_index: i32,
    pub is_initial_layer: bool,
    pub is_raft_layer: bool,
    pub paths: Vec<MotionRecord>,
    temperature_inserts: BinaryHeap<std::cmp::Reverse<TemperatureInsert>>,
    pub fan_speed: f64,
    pub extrude_speed_factor: f64,
    pub extra_time: Duration,
    pub required_start_temperature: Option<f64>,
    pub previous_extruder_standby_temperature: Option<f64>,
    pub time_estimates: TimeEstimates,
    estimates_valid: bool,
}

impl ExtruderPlan {
    pub fn new(extruder_index: usize, layer_index: i32, is_initial_layer: bool, is_raft_layer: bool) -> Self {
        Self {
            extruder_index,
            layer_index,
            is_initial_layer,
            is_raft_layer,
            paths: Vec::new(),
            temperature_inserts: BinaryHeap::new(),
            fan_speed: 0.0,
            extrude_speed_factor: 1.0,
            extra_time: Duration::zero(),
            required_start_temperature: None,
            previous_extruder_standby_temperature: None,
            time_estimates: TimeEstimates::default(),
            estimates_valid: false,
        }
    }

    fn invalidate_estimates(&mut self) {
        self.estimates_valid = false;
    }

    pub fn estimates_are_valid(&self) -> bool {
        self.estimates_valid
    }

    pub fn mark_estimates_valid(&mut self) {
        self.estimates_valid = true;
    }

    /// Returns the tail path if its `FeatureConfig` and the remaining
    /// caller-supplied parameters match and it is not `done`; otherwise
    /// appends a fresh path and returns that (spec §4.6).
    pub fn latest_with_config(
        &mut self,
        config: FeatureConfig,
        flow_ratio: Ratio,
        spiralize: bool,
        speed_factor: f64,
        mesh_id: impl Into<String>,
    ) -> PathHandle {
        let mesh_id = mesh_id.into();
        if let Some(tail) = self.paths.last() {
            let reusable = !tail.done
                && tail.config() == config
                && tail.flow_ratio == flow_ratio
                && tail.spiralize == spiralize
                && tail.speed_factor == speed_factor
                && tail.mesh_id == mesh_id;
            if reusable {
                return PathHandle(self.paths.len() - 1);
            }
        }
        self.paths
            .push(MotionRecord::new_extrusion(config, mesh_id, flow_ratio, spiralize, speed_factor));
        self.invalidate_estimates();
        PathHandle(self.paths.len() - 1)
    }

    /// Starts (or reuses, per the same rule as `latest_with_config`) a
    /// travel path and returns its handle.
    pub fn latest_travel(&mut self, nominal_speed: crate::units::Velocity) -> PathHandle {
        let reusable = self
            .paths
            .last()
            .is_some_and(|tail| !tail.done && matches!(tail.kind, crate::path::motion::MotionKind::Travel));
        if reusable {
            return PathHandle(self.paths.len() - 1);
        }
        self.paths.push(MotionRecord::new_travel(NON_MESH, nominal_speed));
        self.invalidate_estimates();
        PathHandle(self.paths.len() - 1)
    }

    pub fn append_extrusion(&mut self, handle: PathHandle, point: Point) {
        self.paths[handle.0].points.push(point);
        self.invalidate_estimates();
    }

    /// Closes the tail path to further appending (spec §4.6).
    pub fn force_new_path_start(&mut self) {
        if let Some(tail) = self.paths.last_mut() {
            tail.done = true;
        }
    }

    pub fn set_fan(&mut self, handle: PathHandle, value: f64) {
        self.paths[handle.0].fan_speed = Some(value);
    }

    pub fn set_retract(&mut self, handle: PathHandle, retract: bool) {
        self.paths[handle.0].retract = retract;
        self.invalidate_estimates();
    }

    pub fn set_z_hop(&mut self, handle: PathHandle, z_hop: bool) {
        self.paths[handle.0].perform_z_hop = z_hop;
    }

    pub fn set_prime(&mut self, handle: PathHandle, prime: bool) {
        self.paths[handle.0].perform_prime = prime;
    }

    pub fn path(&self, handle: PathHandle) -> &MotionRecord {
        &self.paths[handle.0]
    }

    pub fn insert_temperature(&mut self, insert: TemperatureInsert) {
        self.temperature_inserts.push(std::cmp::Reverse(insert));
    }

    /// Drains all pending temperature inserts in non-decreasing
    /// `path_index` order.
    pub fn drain_temperature_inserts(&mut self) -> Vec<TemperatureInsert> {
        let mut out = Vec::with_capacity(self.temperature_inserts.len());
        while let Some(std::cmp::Reverse(insert)) = self.temperature_inserts.pop() {
            out.push(insert);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::motion::FeatureTag;
    use crate::units::{Acceleration, Jerk, Velocity};

    fn config() -> FeatureConfig {
        FeatureConfig {
            feature_tag: FeatureTag::Infill,
            line_width: 400.0,
            layer_thickness: 200.0,
            nominal_speed: Velocity::new(80.0),
            acceleration: Acceleration::new(1000.0),
            jerk: Jerk::new(8.0),
        }
    }

    #[test]
    fn latest_with_config_reuses_a_matching_open_tail() {
        let mut plan = ExtruderPlan::new(0, 0, true, false);
        let a = plan.latest_with_config(config(), Ratio::new(1.0), false, 1.0, "mesh-a");
        let b = plan.latest_with_config(config(), Ratio::new(1.0), false, 1.0, "mesh-a");
        assert_eq!(a, b);
        assert_eq!(plan.paths.len(), 1);
    }

    #[test]
    fn force_new_path_start_prevents_reuse() {
        let mut plan = ExtruderPlan::new(0, 0, true, false);
        let _ = plan.latest_with_config(config(), Ratio::new(1.0), false, 1.0, "mesh-a");
        plan.force_new_path_start();
        let b = plan.latest_with_config(config(), Ratio::new(1.0), false, 1.0, "mesh-a");
        assert_eq!(plan.paths.len(), 2);
        assert_eq!(b.0, 1);
    }

    #[test]
    fn differing_mesh_id_forces_a_new_path() {
        let mut plan = ExtruderPlan::new(0, 0, true, false);
        let a = plan.latest_with_config(config(), Ratio::new(1.0), false, 1.0, "mesh-a");
        let b = plan.latest_with_config(config(), Ratio::new(1.0), false, 1.0, "mesh-b");
        assert_ne!(a, b);
        assert_eq!(plan.paths.len(), 2);
    }

    #[test]
    fn temperature_inserts_drain_in_non_decreasing_path_index_order() {
        let mut plan = ExtruderPlan::new(0, 0, true, false);
        plan.insert_temperature(TemperatureInsert { path_index: 5, temperature: 200.0, wait: false });
        plan.insert_temperature(TemperatureInsert { path_index: 1, temperature: 210.0, wait: true });
        plan.insert_temperature(TemperatureInsert { path_index: 3, temperature: 205.0, wait: false });
        let drained = plan.drain_temperature_inserts();
        let indices: Vec<usize> = drained.iter().map(|i| i.path_index).collect();
        assert_eq!(indices, vec![1, 3, 5]);
    }

    #[test]
    fn appending_extrusion_invalidates_time_estimates() {
        let mut plan = ExtruderPlan::new(0, 0, true, false);
        plan.mark_estimates_valid();
        let handle = plan.latest_with_config(config(), Ratio::new(1.0), false, 1.0, "mesh-a");
        assert!(!plan.estimates_are_valid());
        plan.mark_estimates_valid();
        plan.append_extrusion(handle, Point::new(100, 100));
        assert!(!plan.estimates_are_valid());
    }
}
