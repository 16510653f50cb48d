//! Loop winding and face orientation.
//!
//! A face is consistently oriented when the Newell normal of its outer loop
//! points the same way as its surface normal, or the opposite way for a
//! `Reversed` face.

use crate::geometry::{GeometryEvaluator, Point3d, Vec3};
use crate::topology::brep::*;
use crate::Tolerance;

use super::AuditError;

/// Interior samples taken along each coedge when building a loop polygon.
/// Needed for loops whose vertices alone are collinear (a circle, a lens).
const SAMPLES_PER_COEDGE: usize = 3;

/// Newell's normal of a closed polygon. Unnormalized: its length is twice
/// the polygon's area.
pub fn newell_normal(points: &[Point3d]) -> Vec3 {
    let n = points.len();
    let mut normal = Vec3::zeros();
    for i in 0..n {
        let a = &points[i];
        let b = &points[(i + 1) % n];
        normal.x += (a.y - b.y) * (a.z + b.z);
        normal.y += (a.z - b.z) * (a.x + b.x);
        normal.z += (a.x - b.x) * (a.y + b.y);
    }
    normal
}

/// Points along a loop in traversal order: each coedge's effective start
/// vertex followed by interior samples of its curve.
pub fn loop_polygon<G: GeometryEvaluator>(
    store: &EntityStore,
    geom: &G,
    loop_id: LoopId,
) -> Result<Vec<Point3d>, AuditError> {
    let coedges = store.loop_coedges(loop_id)?;
    let mut points = Vec::with_capacity(coedges.len() * (SAMPLES_PER_COEDGE + 1));
    for c in coedges {
        let coedge = store.coedge(c)?;
        let start = store.coedge_start_vertex(c)?;
        points.push(store.vertex(start)?.point);

        let curve = store.edge(coedge.edge)?.curve;
        let (t0, t1) = geom.param_range(curve)?;
        for i in 1..=SAMPLES_PER_COEDGE {
            let s = i as f64 / (SAMPLES_PER_COEDGE + 1) as f64;
            let t = if coedge.sense.is_forward() {
                t0 + (t1 - t0) * s
            } else {
                t1 - (t1 - t0) * s
            };
            points.push(geom.position_at(curve, t)?);
        }
    }
    Ok(points)
}

/// How a face's outer loop winding relates to its sense and surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FaceOrientation {
    Consistent,
    /// Winding disagrees with the sense-adjusted surface normal.
    Inverted { alignment: f64 },
    /// The outer loop encloses no area, so no winding can be measured.
    Indeterminate,
}

/// Compare a face's outer-loop winding against its surface normal.
pub fn face_orientation<G: GeometryEvaluator>(
    store: &EntityStore,
    geom: &G,
    face_id: FaceId,
    tol: &Tolerance,
) -> Result<FaceOrientation, AuditError> {
    let face = store.face(face_id)?;
    let polygon = loop_polygon(store, geom, face.outer_loop)?;
    if polygon.len() < 3 {
        return Ok(FaceOrientation::Indeterminate);
    }

    let winding = newell_normal(&polygon);
    let Some(winding) = winding.try_normalize(tol.coincidence * tol.coincidence) else {
        return Ok(FaceOrientation::Indeterminate);
    };

    let centroid = polygon
        .iter()
        .fold(Vec3::zeros(), |acc, p| acc + p.coords)
        / polygon.len() as f64;
    let surface_normal = geom.surface_normal_at(face.surface, &Point3d::from(centroid))?;
    let expected = if face.sense.is_forward() {
        surface_normal
    } else {
        -surface_normal
    };

    let alignment = winding.dot(&expected);
    if alignment > tol.angular {
        Ok(FaceOrientation::Consistent)
    } else {
        Ok(FaceOrientation::Inverted { alignment })
    }
}
