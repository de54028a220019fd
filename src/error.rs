//! Error kinds for the layer path-planning core (spec §7).
//!
//! Combing failure is deliberately *not* represented here: the combing
//! engine reports failure as a plain `bool`/`Option`, never an exception.

use thiserror::Error;

/// Fatal at slice start; the whole slice is aborted. Produced by the
/// settings-validation pass and by settings lookups that fail to resolve.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("setting `{setting}` must be greater than zero, got {value}")]
    LessThanOrEqualToZero { setting: String, value: f64 },

    #[error("setting `{setting}` must not be negative, got {value}")]
    LessThanZero { setting: String, value: f64 },

    #[error("setting `{setting}` could not be resolved through extruder/scene inheritance")]
    Unresolved { setting: String },

    #[error("setting `{setting}` has an unparseable value: {reason}")]
    Unparseable { setting: String, reason: String },
}

/// Layer-scoped: the offending feature is skipped, a warning is logged, the
/// layer proceeds (spec §7).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    #[error("clipping operation produced a degenerate result (coincident self-intersecting edges)")]
    DegenerateClip,

    #[error("polygon has fewer than three vertices where at least three were required")]
    TooFewVertices,

    #[error("could not determine winding/nesting while assembling a polygon set")]
    AmbiguousNesting,
}

/// The density field was everywhere below (or above) the minimal realizable
/// density for the subdivision tree; only the root realizes. Not a layer
/// abort — the caller may emit an empty layer for this feature.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FractalError {
    #[error("density field admits no realizable subdivision within the requested depth")]
    Unrealizable,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SlicerErrors {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("geometry error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("fractal subdivision error: {0}")]
    Fractal(#[from] FractalError),
}

pub type Result<T> = std::result::Result<T, SlicerErrors>;
