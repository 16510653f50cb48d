pub mod geometry;
pub mod topology;
pub mod operations;
pub mod validation;

use serde::{Deserialize, Serialize};

// Re-export key types at crate root for convenience.
pub use geometry::{CurveId, GeometryError, GeometryEvaluator, Point3d, SurfaceId, Vec3};
pub use geometry::store::GeometryStore;
pub use operations::reverse::{reverse_body, reverse_face, reverse_wire, ReverseError};
pub use operations::split::{split_edge_at_discontinuities, SplitError};
pub use operations::wire::{build_free_wire, build_wire, BuildError, BuiltWire};
pub use topology::brep::{EntityStore, Sense, TopologyError};
pub use validation::{audit_body, audit_wire, AuditError, AuditReport};

/// Tolerance configuration for geometric comparisons.
///
/// Passed explicitly to every operation that compares positions or
/// parameters; the kernel keeps no global tolerance state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerance {
    /// Points closer than this are considered coincident (model units).
    pub coincidence: f64,
    /// Parameter-space tolerance for curve evaluations.
    pub parametric: f64,
    /// Angles smaller than this (radians) are considered zero.
    pub angular: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            coincidence: 1e-7,
            parametric: 1e-9,
            angular: 1e-10,
        }
    }
}

impl Tolerance {
    /// A tolerance with the given coincidence distance and default
    /// parametric/angular thresholds.
    pub fn with_coincidence(coincidence: f64) -> Self {
        Self {
            coincidence,
            ..Self::default()
        }
    }

    /// Load a tolerance from JSON. Missing fields fall back to defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn points_coincident(&self, a: &Point3d, b: &Point3d) -> bool {
        nalgebra::distance(a, b) < self.coincidence
    }

    pub fn params_equal(&self, a: f64, b: f64) -> bool {
        approx::abs_diff_eq!(a, b, epsilon = self.parametric)
    }

    pub fn is_zero_length(&self, length: f64) -> bool {
        length.abs() < self.coincidence
    }
}
