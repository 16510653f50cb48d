use serde::{Deserialize, Serialize};

use super::{Point3d, Vec3};

/// Surface kinds a face may reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Surface {
    Plane(Plane),
    Sphere(Sphere),
}

/// An infinite plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub origin: Point3d,
    pub normal: Vec3,
}

impl Plane {
    pub fn new(origin: Point3d, normal: Vec3) -> Self {
        Self {
            origin,
            normal: normal.normalize(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    pub center: Point3d,
    pub radius: f64,
}

impl Surface {
    /// Natural (sense-independent) unit normal nearest to `p`.
    pub fn normal_near(&self, p: &Point3d) -> Vec3 {
        match self {
            Surface::Plane(pl) => pl.normal,
            Surface::Sphere(s) => (p - s.center).try_normalize(1e-15).unwrap_or(Vec3::z()),
        }
    }
}
