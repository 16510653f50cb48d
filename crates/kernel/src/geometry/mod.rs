pub mod curves;
pub mod nurbs;
pub mod surfaces;
pub mod store;

use slotmap::new_key_type;
use thiserror::Error;

/// A point in 3D space.
pub type Point3d = nalgebra::Point3<f64>;

/// A vector in 3D space.
pub type Vec3 = nalgebra::Vector3<f64>;

/// Continuity order reported at parameters where a curve is infinitely
/// differentiable.
pub const SMOOTH: u32 = u32::MAX;

new_key_type! {
    /// Opaque handle to a curve owned by a [`GeometryEvaluator`].
    pub struct CurveId;
    /// Opaque handle to a surface owned by a [`GeometryEvaluator`].
    pub struct SurfaceId;
}

/// Failures reported by a geometry evaluator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("unknown curve handle {0:?}")]
    UnknownCurve(CurveId),

    #[error("unknown surface handle {0:?}")]
    UnknownSurface(SurfaceId),

    #[error("parameter {t} outside open interval ({min}, {max})")]
    ParameterOutOfRange { t: f64, min: f64, max: f64 },

    #[error("segment endpoints coincide")]
    DegenerateSegment,

    #[error("invalid NURBS definition: {reason}")]
    InvalidNurbs { reason: String },
}

/// The boundary between topology and curve/surface mathematics.
///
/// Topology only ever holds [`CurveId`]/[`SurfaceId`] handles; every
/// geometric question goes through this trait. Subdivided pieces keep the
/// parent's parameterization, so a parameter valid on the parent is valid on
/// whichever piece contains it.
pub trait GeometryEvaluator {
    fn position_at(&self, curve: CurveId, t: f64) -> Result<Point3d, GeometryError>;

    fn tangent_at(&self, curve: CurveId, t: f64) -> Result<Vec3, GeometryError>;

    /// Parametric continuity order at `t`, or [`SMOOTH`].
    fn continuity_order_at(&self, curve: CurveId, t: f64) -> Result<u32, GeometryError>;

    fn param_range(&self, curve: CurveId) -> Result<(f64, f64), GeometryError>;

    /// Split `curve` at interior parameter `t` into two new curves. The
    /// original curve is left untouched.
    fn subdivide(&mut self, curve: CurveId, t: f64) -> Result<(CurveId, CurveId), GeometryError>;

    fn is_closed(&self, curve: CurveId) -> Result<bool, GeometryError>;

    /// Interior parameters, ascending, where the continuity order is below
    /// `order`.
    fn discontinuities(&self, curve: CurveId, order: u32) -> Result<Vec<f64>, GeometryError>;

    /// Create a straight segment parameterized by arc length from `start`.
    fn line_segment(&mut self, start: Point3d, end: Point3d) -> Result<CurveId, GeometryError>;

    /// Drop a curve that topology no longer references. Unknown handles are
    /// ignored.
    fn release_curve(&mut self, curve: CurveId);

    /// Unit normal of `surface` at (or nearest to) `point`.
    fn surface_normal_at(&self, surface: SurfaceId, point: &Point3d) -> Result<Vec3, GeometryError>;

    /// Approximate arc length over the full parameter range.
    fn curve_length(&self, curve: CurveId, num_samples: usize) -> Result<f64, GeometryError> {
        let (t0, t1) = self.param_range(curve)?;
        let samples = num_samples.max(1);
        let mut length = 0.0;
        let mut prev = self.position_at(curve, t0)?;
        for i in 1..=samples {
            let t = t0 + (t1 - t0) * (i as f64 / samples as f64);
            let curr = self.position_at(curve, t)?;
            length += nalgebra::distance(&prev, &curr);
            prev = curr;
        }
        Ok(length)
    }
}
