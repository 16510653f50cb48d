//! End-to-end scenarios: wire building, reversal, splitting on solids, and
//! failure atomicity.

use topo_kernel::geometry::curves::Curve;
use topo_kernel::geometry::nurbs::NurbsCurve;
use topo_kernel::topology::brep::{BodyId, EdgeId};
use topo_kernel::topology::primitives::make_cuboid;
use topo_kernel::validation::{audit_body, audit_wire};
use topo_kernel::*;

fn p(x: f64, y: f64, z: f64) -> Point3d {
    Point3d::new(x, y, z)
}

fn unit_cuboid(store: &mut EntityStore, geom: &mut GeometryStore) -> BodyId {
    make_cuboid(store, geom, p(0.0, 0.0, 0.0), p(1.0, 1.0, 1.0)).unwrap()
}

/// Evaluator that delegates to a [`GeometryStore`] but fails `subdivide`
/// and `line_segment` once a budget of successful calls is spent.
struct FlakyEvaluator {
    inner: GeometryStore,
    subdivisions_left: usize,
    segments_left: usize,
}

impl FlakyEvaluator {
    fn new(inner: GeometryStore) -> Self {
        Self {
            inner,
            subdivisions_left: usize::MAX,
            segments_left: usize::MAX,
        }
    }

    fn injected() -> GeometryError {
        GeometryError::InvalidNurbs {
            reason: "injected failure".into(),
        }
    }
}

impl GeometryEvaluator for FlakyEvaluator {
    fn position_at(&self, curve: CurveId, t: f64) -> Result<Point3d, GeometryError> {
        self.inner.position_at(curve, t)
    }

    fn tangent_at(&self, curve: CurveId, t: f64) -> Result<Vec3, GeometryError> {
        self.inner.tangent_at(curve, t)
    }

    fn continuity_order_at(&self, curve: CurveId, t: f64) -> Result<u32, GeometryError> {
        self.inner.continuity_order_at(curve, t)
    }

    fn param_range(&self, curve: CurveId) -> Result<(f64, f64), GeometryError> {
        self.inner.param_range(curve)
    }

    fn subdivide(&mut self, curve: CurveId, t: f64) -> Result<(CurveId, CurveId), GeometryError> {
        if self.subdivisions_left == 0 {
            return Err(Self::injected());
        }
        self.subdivisions_left -= 1;
        self.inner.subdivide(curve, t)
    }

    fn is_closed(&self, curve: CurveId) -> Result<bool, GeometryError> {
        self.inner.is_closed(curve)
    }

    fn discontinuities(&self, curve: CurveId, order: u32) -> Result<Vec<f64>, GeometryError> {
        self.inner.discontinuities(curve, order)
    }

    fn line_segment(&mut self, start: Point3d, end: Point3d) -> Result<CurveId, GeometryError> {
        if self.segments_left == 0 {
            return Err(Self::injected());
        }
        self.segments_left -= 1;
        self.inner.line_segment(start, end)
    }

    fn release_curve(&mut self, curve: CurveId) {
        self.inner.release_curve(curve)
    }

    fn surface_normal_at(&self, surface: SurfaceId, point: &Point3d) -> Result<Vec3, GeometryError> {
        self.inner.surface_normal_at(surface, point)
    }
}

/// Give a cuboid edge a degree-1 curve with interior knots on the same
/// straight line, so the edge is only C0 at those knots.
fn make_edge_kinked(
    store: &mut EntityStore,
    geom: &mut GeometryStore,
    edge: EdgeId,
    interior: &[f64],
) {
    let e = store.edge(edge).unwrap().clone();
    let a = store.vertex(e.start).unwrap().point;
    let b = store.vertex(e.end).unwrap().point;
    let mut points = vec![a];
    points.extend(interior.iter().map(|&s| a + (b - a) * s));
    points.push(b);

    geom.release_curve(e.curve);
    let poly = NurbsCurve::polyline(&points).unwrap();
    store.edges[edge].curve = geom.add_curve(Curve::Nurbs(poly));
}

#[test]
fn scenario_a_closed_square_and_reverse() {
    let mut store = EntityStore::new();
    let mut geom = GeometryStore::new();
    let pts = [
        p(0.0, 0.0, 0.0),
        p(3.0, 0.0, 0.0),
        p(3.0, 3.0, 0.0),
        p(0.0, 3.0, 0.0),
        p(0.0, 0.0, 0.0),
    ];
    let built = build_wire(&mut store, &mut geom, None, &pts, &Tolerance::default()).unwrap();
    let wire = store.wire(built.wire).unwrap().clone();
    assert!(wire.closed);

    let edges = store.wire_edges(built.wire).unwrap();
    assert_eq!(edges.len(), 4);
    let coedges = store.loop_coedges(wire.loop_id).unwrap();
    let senses: Vec<Sense> = coedges.iter().map(|&c| store.coedges[c].sense).collect();

    reverse_wire(&mut store, built.wire).unwrap();

    let reversed = store.wire_edges(built.wire).unwrap();
    assert_eq!(reversed, vec![edges[0], edges[3], edges[2], edges[1]]);
    for (&c, sense) in coedges.iter().zip(senses) {
        assert_eq!(store.coedges[c].sense, sense.flipped());
    }
    assert!(audit_wire(&store, &geom, built.wire, &Tolerance::default())
        .unwrap()
        .is_valid());
}

#[test]
fn scenario_b_single_point_wire() {
    let mut store = EntityStore::new();
    let mut geom = GeometryStore::new();
    let built = build_wire(&mut store, &mut geom, None, &[p(1.0, 1.0, 1.0)], &Tolerance::default())
        .unwrap();

    assert!(store.wire_edges(built.wire).unwrap().is_empty());
    let vertices = store.wire_vertices(built.wire).unwrap();
    assert_eq!(vertices.len(), 1);
    assert_eq!(store.vertices[vertices[0]].point, p(1.0, 1.0, 1.0));
    assert_eq!(store.count_topology(built.body).unwrap(), (1, 0, 0));
    assert!(geom.curves.is_empty());

    // Reversing an empty loop is a no-op.
    reverse_wire(&mut store, built.wire).unwrap();
    assert!(audit_body(&store, &geom, built.body, &Tolerance::default())
        .unwrap()
        .is_valid());
}

#[test]
fn scenario_c_wire_merged_into_cuboid() {
    let mut store = EntityStore::new();
    let mut geom = GeometryStore::new();
    let body = unit_cuboid(&mut store, &mut geom);
    let lumps_before = store.body(body).unwrap().lumps.clone();
    let cuboid_faces = store.body_faces(body).unwrap();

    // Starts at the cuboid corner (1, 1, 1) and leads away from it.
    let path = [
        p(1.0, 1.0, 1.0),
        p(2.0, 1.0, 1.0),
        p(2.0, 2.0, 1.0),
        p(2.0, 2.0, 2.0),
    ];
    let built = build_wire(&mut store, &mut geom, Some(body), &path, &Tolerance::default()).unwrap();

    assert_eq!(built.body, body);
    let lumps = &store.body(body).unwrap().lumps;
    assert_eq!(lumps.len(), lumps_before.len() + 1);
    assert_eq!(&lumps[..lumps_before.len()], &lumps_before[..]);
    assert_eq!(lumps[lumps.len() - 1], built.lump);

    let shells = &store.lump(built.lump).unwrap().shells;
    assert_eq!(shells, &vec![built.shell]);
    assert_eq!(store.shell(built.shell).unwrap().wires, vec![built.wire]);
    assert_eq!(store.wire_edges(built.wire).unwrap().len(), 3);

    // The cuboid is untouched and vertices are not shared.
    assert_eq!(store.body_faces(body).unwrap(), cuboid_faces);
    assert_eq!(store.count_topology(body).unwrap(), (8 + 4, 12 + 3, 6));
    assert!(audit_body(&store, &geom, body, &Tolerance::default())
        .unwrap()
        .is_valid());
}

#[test]
fn reverse_body_flips_faces_and_wires() {
    let mut store = EntityStore::new();
    let mut geom = GeometryStore::new();
    let body = unit_cuboid(&mut store, &mut geom);
    let path = [p(2.0, 0.0, 0.0), p(3.0, 0.0, 0.0), p(3.0, 1.0, 0.0)];
    let built = build_wire(&mut store, &mut geom, Some(body), &path, &Tolerance::default()).unwrap();
    let before = store.clone();

    reverse_body(&mut store, body).unwrap();
    assert_eq!(store.entity_count(), before.entity_count());
    for face in store.body_faces(body).unwrap() {
        assert_eq!(store.face(face).unwrap().sense, Sense::Reversed);
    }
    let mut vertices = store.wire_vertices(built.wire).unwrap();
    vertices.reverse();
    assert_eq!(vertices, before.wire_vertices(built.wire).unwrap());
    assert!(audit_body(&store, &geom, body, &Tolerance::default())
        .unwrap()
        .is_valid());

    reverse_body(&mut store, body).unwrap();
    for (id, coedge) in &before.coedges {
        assert_eq!(&store.coedges[id], coedge);
    }
    for (id, face) in &before.faces {
        assert_eq!(&store.faces[id], face);
    }
}

#[test]
fn split_cuboid_edge_keeps_both_faces_closed() {
    let mut store = EntityStore::new();
    let mut geom = GeometryStore::new();
    let body = unit_cuboid(&mut store, &mut geom);
    let edge = store.edges.keys().next().unwrap();
    let faces_using: Vec<_> = store.edges[edge]
        .coedges
        .iter()
        .map(|&c| store.coedges[c].loop_id)
        .collect();
    make_edge_kinked(&mut store, &mut geom, edge, &[0.25, 0.5]);

    let pieces =
        split_edge_at_discontinuities(&mut store, &mut geom, edge, 1, &Tolerance::default())
            .unwrap();
    assert_eq!(pieces.len(), 3);

    for loop_id in faces_using {
        assert!(store.loop_is_cycle(loop_id).unwrap());
        assert_eq!(store.loop_coedges(loop_id).unwrap().len(), 6);
    }
    for &piece in &pieces {
        let coedges = &store.edge(piece).unwrap().coedges;
        assert_eq!(coedges.len(), 2);
        assert_ne!(store.coedges[coedges[0]].sense, store.coedges[coedges[1]].sense);
    }

    let (v, e, f) = store.count_topology(body).unwrap();
    assert_eq!((v, e, f), (10, 14, 6));
    assert_eq!(v as i64 - e as i64 + f as i64, 2);

    let report = audit_body(&store, &geom, body, &Tolerance::default()).unwrap();
    assert!(report.is_valid(), "{:?}", report.violations);
}

#[test]
fn split_rolls_back_on_evaluator_failure() {
    let mut store = EntityStore::new();
    let mut geom = GeometryStore::new();
    let body = unit_cuboid(&mut store, &mut geom);
    let edge = store.edges.keys().next().unwrap();
    make_edge_kinked(&mut store, &mut geom, edge, &[0.2, 0.4, 0.6]);

    let before = store.clone();
    let mut flaky = FlakyEvaluator::new(geom);
    flaky.subdivisions_left = 2;
    let curves_before = flaky.inner.curves.len();

    let err = split_edge_at_discontinuities(&mut store, &mut flaky, edge, 1, &Tolerance::default());
    assert!(matches!(err, Err(SplitError::EvaluatorFailure(_))));

    assert_eq!(flaky.inner.curves.len(), curves_before);
    assert_eq!(store.entity_count(), before.entity_count());
    for (id, coedge) in &before.coedges {
        assert_eq!(&store.coedges[id], coedge);
    }
    for (id, edge) in &before.edges {
        assert_eq!(&store.edges[id], edge);
    }
    assert!(audit_body(&store, &flaky, body, &Tolerance::default())
        .unwrap()
        .is_valid());
}

#[test]
fn build_rolls_back_on_evaluator_failure() {
    let mut store = EntityStore::new();
    let mut geom = GeometryStore::new();
    let body = unit_cuboid(&mut store, &mut geom);
    let count = store.entity_count();

    let mut flaky = FlakyEvaluator::new(geom);
    flaky.segments_left = 2;
    let curves_before = flaky.inner.curves.len();
    let path = [p(2.0, 0.0, 0.0), p(3.0, 0.0, 0.0), p(3.0, 1.0, 0.0), p(4.0, 1.0, 0.0)];

    let err = build_wire(&mut store, &mut flaky, Some(body), &path, &Tolerance::default());
    assert!(matches!(err, Err(BuildError::EvaluatorFailure(_))));
    assert_eq!(store.entity_count(), count);
    assert_eq!(store.body(body).unwrap().lumps.len(), 1);
    assert_eq!(flaky.inner.curves.len(), curves_before);
}

#[test]
fn build_into_full_store_fails_cleanly() {
    let mut store = EntityStore::new();
    let mut geom = GeometryStore::new();
    let body = unit_cuboid(&mut store, &mut geom);
    let count = store.entity_count();
    store.set_capacity_limit(Some(count + 5));

    // 3 vertices, 2 edges, 2 coedges, loop, wire, shell, lump.
    let path = [p(2.0, 0.0, 0.0), p(3.0, 0.0, 0.0), p(3.0, 1.0, 0.0)];
    let err = build_wire(&mut store, &mut geom, Some(body), &path, &Tolerance::default());
    assert_eq!(
        err,
        Err(BuildError::AllocationFailure {
            requested: 11,
            available: 5
        })
    );
    assert_eq!(store.entity_count(), count);
    assert_eq!(geom.curves.len(), 12);
}

#[test]
fn remove_body_releases_everything() {
    let mut store = EntityStore::new();
    let mut geom = GeometryStore::new();
    let body = unit_cuboid(&mut store, &mut geom);
    let path = [p(2.0, 0.0, 0.0), p(3.0, 0.0, 0.0), p(3.0, 1.0, 0.0)];
    build_wire(&mut store, &mut geom, Some(body), &path, &Tolerance::default()).unwrap();
    let other = build_wire(&mut store, &mut geom, None, &path, &Tolerance::default()).unwrap();
    let survivors = store.entity_count() - 8 - 12 - 24 - 6 - 6 - 1 - 1 - 1 - 11;

    let released = store.remove_body(body).unwrap();
    assert_eq!(released.curves.len(), 12 + 2);
    assert_eq!(released.surfaces.len(), 6);
    assert_eq!(store.entity_count(), survivors);
    assert!(store.body(body).is_err());
    assert!(store.body(other.body).is_ok());

    for curve in released.curves {
        geom.release_curve(curve);
    }
    assert_eq!(geom.curves.len(), 2);
}

#[test]
fn tolerance_loaded_from_json_drives_coalescing() {
    let tol = Tolerance::from_json(r#"{ "coincidence": 0.01 }"#).unwrap();
    let mut store = EntityStore::new();
    let mut geom = GeometryStore::new();
    let pts = [p(0.0, 0.0, 0.0), p(0.005, 0.0, 0.0), p(1.0, 0.0, 0.0)];
    let built = build_wire(&mut store, &mut geom, None, &pts, &tol).unwrap();
    assert_eq!(store.wire_edges(built.wire).unwrap().len(), 1);
}
