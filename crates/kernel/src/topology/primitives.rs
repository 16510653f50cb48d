use std::collections::HashMap;

use tracing::{info, instrument};

use super::brep::*;
use crate::geometry::store::GeometryStore;
use crate::geometry::surfaces::{Plane, Surface};
use crate::geometry::{GeometryError, GeometryEvaluator, Point3d, Vec3};

/// Build an axis-aligned cuboid body with corners `min` and `max`.
///
/// Every face loop runs counter-clockwise around the outward normal, every
/// face is `Forward`, and every edge is shared by exactly two coedges of
/// opposite sense.
#[instrument(skip(store, geom), fields(min = ?[min.x, min.y, min.z], max = ?[max.x, max.y, max.z]))]
pub fn make_cuboid(
    store: &mut EntityStore,
    geom: &mut GeometryStore,
    min: Point3d,
    max: Point3d,
) -> Result<BodyId, GeometryError> {
    if (0..3).any(|axis| max[axis] - min[axis] <= 0.0) {
        return Err(GeometryError::DegenerateSegment);
    }
    let (x0, y0, z0) = (min.x, min.y, min.z);
    let (x1, y1, z1) = (max.x, max.y, max.z);

    // 8 corners of the cuboid
    let v = [
        Point3d::new(x0, y0, z0), // 0: bottom-front-left
        Point3d::new(x1, y0, z0), // 1: bottom-front-right
        Point3d::new(x1, y1, z0), // 2: bottom-back-right
        Point3d::new(x0, y1, z0), // 3: bottom-back-left
        Point3d::new(x0, y0, z1), // 4: top-front-left
        Point3d::new(x1, y0, z1), // 5: top-front-right
        Point3d::new(x1, y1, z1), // 6: top-back-right
        Point3d::new(x0, y1, z1), // 7: top-back-left
    ];

    // Each face: corner indices in counter-clockwise order seen from outside.
    let face_defs: [([usize; 4], Vec3); 6] = [
        ([0, 3, 2, 1], -Vec3::z()), // bottom (z = z0)
        ([4, 5, 6, 7], Vec3::z()),  // top    (z = z1)
        ([0, 4, 7, 3], -Vec3::x()), // left   (x = x0)
        ([1, 2, 6, 5], Vec3::x()),  // right  (x = x1)
        ([0, 1, 5, 4], -Vec3::y()), // front  (y = y0)
        ([3, 7, 6, 2], Vec3::y()),  // back   (y = y1)
    ];

    let vertex_ids: Vec<VertexId> = v
        .iter()
        .map(|p| {
            store.vertices.insert(Vertex {
                point: *p,
                tolerance: crate::Tolerance::default().coincidence,
                edges: vec![],
            })
        })
        .collect();

    let body_id = store.bodies.insert(Body::new());
    let lump_id = store.lumps.insert(Lump {
        shells: vec![],
        body: body_id,
    });
    let shell_id = store.shells.insert(Shell {
        faces: vec![],
        wires: vec![],
        lump: lump_id,
    });
    store.bodies[body_id].lumps.push(lump_id);
    store.lumps[lump_id].shells.push(shell_id);

    // Canonical (low, high) corner pair -> edge created by the first face using it.
    let mut edge_map: HashMap<(usize, usize), EdgeId> = HashMap::new();

    for (corners, normal) in face_defs {
        let center = nalgebra::center(&v[corners[0]], &v[corners[2]]);
        let surface = geom.add_surface(Surface::Plane(Plane::new(center, normal)));

        let loop_id = store.loops.insert(Loop {
            first: None,
            owner: LoopOwner::Face(FaceId::default()),
        });
        let face_id = store.faces.insert(Face {
            surface,
            outer_loop: loop_id,
            inner_loops: vec![],
            sense: Sense::Forward,
            shell: shell_id,
        });
        store.loops[loop_id].owner = LoopOwner::Face(face_id);
        store.shells[shell_id].faces.push(face_id);

        let mut coedges = Vec::with_capacity(4);
        for i in 0..4 {
            let a = corners[i];
            let b = corners[(i + 1) % 4];
            let key = (a.min(b), a.max(b));

            let (edge_id, sense) = match edge_map.get(&key) {
                Some(&edge_id) => (edge_id, Sense::Reversed),
                None => {
                    let curve = geom.line_segment(v[a], v[b])?;
                    let edge_id = store.edges.insert(Edge {
                        curve,
                        start: vertex_ids[a],
                        end: vertex_ids[b],
                        coedges: vec![],
                    });
                    store.vertices[vertex_ids[a]].edges.push(edge_id);
                    store.vertices[vertex_ids[b]].edges.push(edge_id);
                    edge_map.insert(key, edge_id);
                    (edge_id, Sense::Forward)
                }
            };

            let coedge_id = store.coedges.insert(Coedge {
                edge: edge_id,
                sense,
                next: None,
                previous: None,
                loop_id,
            });
            store.edges[edge_id].coedges.push(coedge_id);
            coedges.push(coedge_id);
        }

        for i in 0..4 {
            store.coedges[coedges[i]].next = Some(coedges[(i + 1) % 4]);
            store.coedges[coedges[i]].previous = Some(coedges[(i + 3) % 4]);
        }
        store.loops[loop_id].first = Some(coedges[0]);
    }

    info!(?body_id, edges = edge_map.len(), "created cuboid primitive");
    Ok(body_id)
}
