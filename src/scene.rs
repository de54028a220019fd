//! External interfaces (spec §6): the read-only scene, the per-layer slice
//! data, and the density-provider callback. These are the boundary to the
//! collaborators this crate treats as external (mesh slicing, wall/infill
//! region generation, the g-code writer) — expressed as traits ("capability
//! sets", per spec §9's design note) rather than a class hierarchy, so a
//! caller can plug in whatever concrete scene/slice-data representation it
//! already has.

use crate::error::ConfigurationError;
use crate::geometry::{AABB3D, Polygons};
use crate::settings::{CombingSettings, Settings};

/// Per-extruder settings plus the retraction/wipe configuration the spec
/// keeps alongside it (spec §6, "A per-layer slice data object").
#[derive(Debug, Clone)]
pub struct ExtruderSettings {
    pub settings: Settings,
}

/// Per-mesh settings overrides. Only the fields the core actually consults
/// are modeled explicitly (combing mode, plus the two boolean flags used by
/// the comb-boundary builder) rather than a fully generic sparse property
/// bag — the spec names settings inheritance as a lookup *rule*, not a
/// generic string-keyed store, and no operation in §4 needs more than this.
#[derive(Debug, Clone, Default)]
pub struct MeshSettings {
    pub limit_to_extruder: Option<usize>,
    pub combing_override: Option<CombingSettings>,
    pub infill_mesh: bool,
    pub anti_overhang_mesh: bool,
}

impl MeshSettings {
    /// Settings inheritance (spec §6): mesh override, then
    /// `limit_to_extruder` indirection, then the scene default.
    pub fn resolve_combing<'a>(
        &'a self,
        extruders: &'a [ExtruderSettings],
        scene: &'a Settings,
    ) -> Result<&'a CombingSettings, ConfigurationError> {
        if let Some(combing) = &self.combing_override {
            return Ok(combing);
        }
        if let Some(idx) = self.limit_to_extruder {
            return extruders
                .get(idx)
                .map(|e| &e.settings.combing)
                .ok_or_else(|| ConfigurationError::Unresolved {
                    setting: "limit_to_extruder".to_string(),
                });
        }
        Ok(&scene.combing)
    }

    /// Per spec §9's Open Question: the source's `infill_mesh AND
    /// anti_overhang_mesh` test "looks like a typo for OR"; preserved as a
    /// literal AND here (see DESIGN.md).
    pub fn is_infill_and_anti_overhang(&self) -> bool {
        self.infill_mesh && self.anti_overhang_mesh
    }
}

#[derive(Debug, Clone, Default)]
pub struct MeshGroup {
    pub meshes: Vec<MeshSettings>,
}

/// The read-only "current slice" state (spec §9): the scene, the extruder
/// set, initialized once at slice start and read thereafter. Modeled as a
/// plain immutable value threaded through calls, per the design note's
/// explicit allowance — no process-wide mutable singleton is required.
#[derive(Debug, Clone)]
pub struct Scene {
    pub extruders: Vec<ExtruderSettings>,
    pub mesh_groups: Vec<MeshGroup>,
    pub global: Settings,
}

impl Scene {
    pub fn mesh(&self, group: usize, mesh: usize) -> Option<&MeshSettings> {
        self.mesh_groups.get(group)?.meshes.get(mesh)
    }
}

/// Per-layer geometry and retraction configuration (spec §6).
pub trait SliceData {
    fn outlines(&self, layer: i32, include_support: bool, include_prime_tower: bool) -> Polygons;
    fn raft_outline(&self) -> Polygons;
    fn retraction_config(&self, extruder: usize) -> Option<&crate::settings::RetractionSettings>;
}

/// `(axis_aligned_box_3d) -> float in [0, 1]` (spec §6). A trait rather
/// than a boxed closure so density providers can be composed (per §9,
/// "a combined provider is constructed from two such values plus a
/// statistic selector").
pub trait DensityProvider {
    fn query(&self, region: AABB3D) -> f64;
}

impl<F: Fn(AABB3D) -> f64> DensityProvider for F {
    fn query(&self, region: AABB3D) -> f64 {
        (self)(region)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatisticSelector {
    Minimum,
    Maximum,
    Average,
}

/// Combines two density providers under a chosen statistic, grounded on
/// CuraEngine's `CombinedDensityProvider`.
pub struct CombinedDensityProvider<A, B> {
    pub a: A,
    pub b: B,
    pub statistic: StatisticSelector,
}

impl<A: DensityProvider, B: DensityProvider> DensityProvider for CombinedDensityProvider<A, B> {
    fn query(&self, region: AABB3D) -> f64 {
        let a = self.a.query(region);
        let b = self.b.query(region);
        match self.statistic {
            StatisticSelector::Minimum => a.min(b),
            StatisticSelector::Maximum => a.max(b),
            StatisticSelector::Average => (a + b) / 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct UniformDensityProvider(pub f64);

impl DensityProvider for UniformDensityProvider {
    fn query(&self, _region: AABB3D) -> f64 {
        self.0
    }
}
