use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use super::nurbs::NurbsCurve;
use super::{GeometryError, Point3d, Vec3, SMOOTH};

/// Bounded curve kinds the built-in evaluator understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Curve {
    Line(LineSegment),
    Arc(CircleArc),
    Nurbs(NurbsCurve),
}

/// A straight segment: `origin + direction * t` for `t` in `range`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineSegment {
    pub origin: Point3d,
    /// Unit direction.
    pub direction: Vec3,
    pub range: (f64, f64),
}

impl LineSegment {
    /// Segment from `a` to `b`, parameterized by arc length from `a`.
    pub fn from_points(a: Point3d, b: Point3d) -> Result<Self, GeometryError> {
        let delta = b - a;
        let length = delta.norm();
        let direction = delta
            .try_normalize(1e-15)
            .ok_or(GeometryError::DegenerateSegment)?;
        Ok(Self {
            origin: a,
            direction,
            range: (0.0, length),
        })
    }

    pub fn evaluate(&self, t: f64) -> Point3d {
        self.origin + self.direction * t
    }
}

/// A circular arc over `range` (radians, measured from `x_axis`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircleArc {
    pub center: Point3d,
    pub normal: Vec3,
    /// Reference direction in the plane (x-axis of the local frame).
    pub x_axis: Vec3,
    pub radius: f64,
    pub range: (f64, f64),
}

impl CircleArc {
    /// Full circle starting on an arbitrary in-plane direction.
    pub fn full(center: Point3d, normal: Vec3, radius: f64) -> Self {
        let normal = normal.normalize();
        // Compute a perpendicular x_axis
        let x_axis = if normal.x.abs() < 0.9 {
            Vec3::x().cross(&normal).normalize()
        } else {
            Vec3::y().cross(&normal).normalize()
        };
        Self {
            center,
            normal,
            x_axis,
            radius,
            range: (0.0, TAU),
        }
    }

    pub fn with_range(mut self, start: f64, end: f64) -> Self {
        self.range = (start, end);
        self
    }

    fn y_axis(&self) -> Vec3 {
        self.normal.cross(&self.x_axis)
    }

    pub fn evaluate(&self, t: f64) -> Point3d {
        self.center
            + self.x_axis * (self.radius * t.cos())
            + self.y_axis() * (self.radius * t.sin())
    }

    pub fn derivative(&self, t: f64) -> Vec3 {
        self.x_axis * (-self.radius * t.sin()) + self.y_axis() * (self.radius * t.cos())
    }

    pub fn is_full(&self) -> bool {
        (self.range.1 - self.range.0 - TAU).abs() < 1e-12
    }
}

impl Curve {
    /// Evaluate the curve at parameter t.
    pub fn evaluate(&self, t: f64) -> Point3d {
        match self {
            Curve::Line(l) => l.evaluate(t),
            Curve::Arc(a) => a.evaluate(t),
            Curve::Nurbs(n) => n.evaluate(t),
        }
    }

    /// Evaluate the derivative at parameter t.
    pub fn derivative(&self, t: f64) -> Vec3 {
        match self {
            Curve::Line(l) => l.direction,
            Curve::Arc(a) => a.derivative(t),
            Curve::Nurbs(n) => n.derivative(t),
        }
    }

    pub fn param_range(&self) -> (f64, f64) {
        match self {
            Curve::Line(l) => l.range,
            Curve::Arc(a) => a.range,
            Curve::Nurbs(n) => n.domain(),
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            Curve::Line(_) => false,
            Curve::Arc(a) => a.is_full(),
            Curve::Nurbs(n) => n.is_closed(),
        }
    }

    pub fn continuity_at(&self, t: f64) -> u32 {
        match self {
            Curve::Line(_) | Curve::Arc(_) => SMOOTH,
            Curve::Nurbs(n) => n.continuity_at(t),
        }
    }

    pub fn discontinuities(&self, order: u32) -> Vec<f64> {
        match self {
            Curve::Line(_) | Curve::Arc(_) => Vec::new(),
            Curve::Nurbs(n) => n.discontinuities(order),
        }
    }

    /// Split at interior parameter `t`; both pieces keep this curve's
    /// parameterization.
    pub fn split_at(&self, t: f64) -> Result<(Curve, Curve), GeometryError> {
        let (t0, t1) = self.param_range();
        let interior = t > t0 && t < t1;
        match self {
            Curve::Line(l) if interior => Ok((
                Curve::Line(LineSegment { range: (t0, t), ..*l }),
                Curve::Line(LineSegment { range: (t, t1), ..*l }),
            )),
            Curve::Arc(a) if interior => Ok((
                Curve::Arc(a.with_range(t0, t)),
                Curve::Arc(a.with_range(t, t1)),
            )),
            Curve::Nurbs(n) => {
                let (left, right) = n.split_at(t)?;
                Ok((Curve::Nurbs(left), Curve::Nurbs(right)))
            }
            _ => Err(GeometryError::ParameterOutOfRange { t, min: t0, max: t1 }),
        }
    }

    /// Classify the curve type for logging/debugging.
    pub fn curve_type_name(&self) -> &'static str {
        match self {
            Curve::Line(_) => "Line",
            Curve::Arc(_) => "Arc",
            Curve::Nurbs(_) => "Nurbs",
        }
    }
}
