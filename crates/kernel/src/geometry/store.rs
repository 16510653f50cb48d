use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use tracing::trace;

use super::curves::{Curve, LineSegment};
use super::surfaces::Surface;
use super::{CurveId, GeometryError, GeometryEvaluator, Point3d, SurfaceId, Vec3};

/// In-process geometry evaluator: owns every curve and surface that
/// topology refers to by handle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeometryStore {
    pub curves: SlotMap<CurveId, Curve>,
    pub surfaces: SlotMap<SurfaceId, Surface>,
}

impl GeometryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_curve(&mut self, curve: Curve) -> CurveId {
        self.curves.insert(curve)
    }

    pub fn add_surface(&mut self, surface: Surface) -> SurfaceId {
        self.surfaces.insert(surface)
    }

    pub fn curve(&self, id: CurveId) -> Result<&Curve, GeometryError> {
        self.curves.get(id).ok_or(GeometryError::UnknownCurve(id))
    }

    pub fn surface(&self, id: SurfaceId) -> Result<&Surface, GeometryError> {
        self.surfaces.get(id).ok_or(GeometryError::UnknownSurface(id))
    }
}

impl GeometryEvaluator for GeometryStore {
    fn position_at(&self, curve: CurveId, t: f64) -> Result<Point3d, GeometryError> {
        Ok(self.curve(curve)?.evaluate(t))
    }

    fn tangent_at(&self, curve: CurveId, t: f64) -> Result<Vec3, GeometryError> {
        Ok(self.curve(curve)?.derivative(t))
    }

    fn continuity_order_at(&self, curve: CurveId, t: f64) -> Result<u32, GeometryError> {
        Ok(self.curve(curve)?.continuity_at(t))
    }

    fn param_range(&self, curve: CurveId) -> Result<(f64, f64), GeometryError> {
        Ok(self.curve(curve)?.param_range())
    }

    fn subdivide(&mut self, curve: CurveId, t: f64) -> Result<(CurveId, CurveId), GeometryError> {
        let (left, right) = self.curve(curve)?.split_at(t)?;
        trace!(?curve, t, kind = left.curve_type_name(), "subdivided curve");
        Ok((self.curves.insert(left), self.curves.insert(right)))
    }

    fn is_closed(&self, curve: CurveId) -> Result<bool, GeometryError> {
        Ok(self.curve(curve)?.is_closed())
    }

    fn discontinuities(&self, curve: CurveId, order: u32) -> Result<Vec<f64>, GeometryError> {
        Ok(self.curve(curve)?.discontinuities(order))
    }

    fn line_segment(&mut self, start: Point3d, end: Point3d) -> Result<CurveId, GeometryError> {
        let line = LineSegment::from_points(start, end)?;
        Ok(self.curves.insert(Curve::Line(line)))
    }

    fn release_curve(&mut self, curve: CurveId) {
        self.curves.remove(curve);
    }

    fn surface_normal_at(&self, surface: SurfaceId, point: &Point3d) -> Result<Vec3, GeometryError> {
        Ok(self.surface(surface)?.normal_near(point))
    }
}
