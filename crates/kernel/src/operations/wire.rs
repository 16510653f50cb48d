use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::geometry::{CurveId, GeometryError, GeometryEvaluator, Point3d};
use crate::topology::brep::*;
use crate::Tolerance;

/// Failures of wire construction. The store is unchanged whenever one is
/// returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    #[error("wire construction needs at least one point")]
    EmptyInput,

    #[error("arena exhausted: wire needs {requested} entities, {available} available")]
    AllocationFailure { requested: usize, available: usize },

    #[error("geometry evaluator failed: {0}")]
    EvaluatorFailure(#[from] GeometryError),

    #[error("body {0:?} does not exist")]
    UnknownBody(BodyId),

    #[error(transparent)]
    Topology(TopologyError),
}

impl From<TopologyError> for BuildError {
    fn from(err: TopologyError) -> Self {
        match err {
            TopologyError::CapacityExceeded {
                requested,
                available,
            } => BuildError::AllocationFailure {
                requested,
                available,
            },
            other => BuildError::Topology(other),
        }
    }
}

/// Handles of a wire built into a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltWire {
    pub body: BodyId,
    /// The lump created to hold the wire.
    pub lump: LumpId,
    pub shell: ShellId,
    pub wire: WireId,
}

/// Points after duplicate removal, with closure decided.
struct Chain {
    points: Vec<Point3d>,
    closed: bool,
}

impl Chain {
    fn from_points(points: &[Point3d], tol: &Tolerance) -> Self {
        let mut distinct: Vec<Point3d> = Vec::with_capacity(points.len());
        for p in points {
            if distinct.last().is_none_or(|last| !tol.points_coincident(last, p)) {
                distinct.push(*p);
            }
        }

        let closed = distinct.len() >= 3
            && tol.points_coincident(&distinct[0], &distinct[distinct.len() - 1]);
        if closed {
            // The closing point is the first vertex again.
            distinct.pop();
        }
        Self {
            points: distinct,
            closed,
        }
    }

    fn edge_count(&self) -> usize {
        match (self.points.len(), self.closed) {
            (0 | 1, _) => 0,
            (n, true) => n,
            (n, false) => n - 1,
        }
    }

    /// Entities the wire itself needs: vertices, edges, coedges, loop, wire.
    fn entity_count(&self) -> usize {
        let vertices = self.points.len().max(1);
        vertices + 2 * self.edge_count() + 2
    }
}

/// Build a wire through `points` and place it in a body.
///
/// With `existing_body`, the wire is appended as a new lump (holding one new
/// shell) at the end of the body's lump list; nothing already in the body is
/// touched. Without it, a fresh body is created.
#[instrument(skip(store, geom, points), fields(num_points = points.len()))]
pub fn build_wire<G: GeometryEvaluator>(
    store: &mut EntityStore,
    geom: &mut G,
    existing_body: Option<BodyId>,
    points: &[Point3d],
    tol: &Tolerance,
) -> Result<BuiltWire, BuildError> {
    if points.is_empty() {
        return Err(BuildError::EmptyInput);
    }
    if let Some(body) = existing_body {
        if !store.bodies.contains_key(body) {
            return Err(BuildError::UnknownBody(body));
        }
    }

    let chain = Chain::from_points(points, tol);
    // Shell and lump, plus the body when none was given.
    let container = if existing_body.is_some() { 2 } else { 3 };
    store.reserve(chain.entity_count() + container)?;
    let curves = stage_curves(geom, &chain)?;

    let body = existing_body.unwrap_or_else(|| store.bodies.insert(Body::new()));
    let lump = store.lumps.insert(Lump {
        shells: vec![],
        body,
    });
    let shell = store.shells.insert(Shell {
        faces: vec![],
        wires: vec![],
        lump,
    });
    let wire = commit_wire(store, &chain, curves, Some(shell), tol);

    store.shells[shell].wires.push(wire);
    store.lumps[lump].shells.push(shell);
    store.bodies[body].lumps.push(lump);

    info!(
        ?body,
        ?wire,
        edges = chain.edge_count(),
        closed = chain.closed,
        merged = existing_body.is_some(),
        "built wire"
    );
    Ok(BuiltWire {
        body,
        lump,
        shell,
        wire,
    })
}

/// Build a wire through `points` that is not owned by any shell.
#[instrument(skip(store, geom, points), fields(num_points = points.len()))]
pub fn build_free_wire<G: GeometryEvaluator>(
    store: &mut EntityStore,
    geom: &mut G,
    points: &[Point3d],
    tol: &Tolerance,
) -> Result<WireId, BuildError> {
    if points.is_empty() {
        return Err(BuildError::EmptyInput);
    }
    let chain = Chain::from_points(points, tol);
    store.reserve(chain.entity_count())?;
    let curves = stage_curves(geom, &chain)?;
    let wire = commit_wire(store, &chain, curves, None, tol);
    info!(?wire, edges = chain.edge_count(), closed = chain.closed, "built free wire");
    Ok(wire)
}

/// Create one line segment per edge. On failure the segments created so far
/// are released.
fn stage_curves<G: GeometryEvaluator>(geom: &mut G, chain: &Chain) -> Result<Vec<CurveId>, BuildError> {
    let n = chain.points.len();
    let mut curves = Vec::with_capacity(chain.edge_count());
    for i in 0..chain.edge_count() {
        let start = chain.points[i];
        let end = chain.points[(i + 1) % n];
        match geom.line_segment(start, end) {
            Ok(curve) => curves.push(curve),
            Err(err) => {
                debug!(segment = i, %err, "line segment failed, releasing staged curves");
                for curve in curves {
                    geom.release_curve(curve);
                }
                return Err(err.into());
            }
        }
    }
    Ok(curves)
}

/// Link staged curves into vertices, edges, coedges, a loop and a wire.
/// Capacity has already been reserved, so nothing here can fail.
fn commit_wire(
    store: &mut EntityStore,
    chain: &Chain,
    curves: Vec<CurveId>,
    shell: Option<ShellId>,
    tol: &Tolerance,
) -> WireId {
    let wire = store.wires.insert(Wire {
        loop_id: LoopId::default(),
        shell,
        closed: chain.closed,
        isolated_vertex: None,
    });
    let loop_id = store.loops.insert(Loop {
        first: None,
        owner: LoopOwner::Wire(wire),
    });
    store.wires[wire].loop_id = loop_id;

    let vertices: Vec<VertexId> = chain
        .points
        .iter()
        .map(|p| {
            store.vertices.insert(Vertex {
                point: *p,
                tolerance: tol.coincidence,
                edges: vec![],
            })
        })
        .collect();

    if curves.is_empty() {
        store.wires[wire].isolated_vertex = vertices.first().copied();
        debug!(?wire, "degenerate single-vertex wire");
        return wire;
    }

    let n = vertices.len();
    let mut coedges = Vec::with_capacity(curves.len());
    for (i, curve) in curves.into_iter().enumerate() {
        let start = vertices[i];
        let end = vertices[(i + 1) % n];
        let edge = store.edges.insert(Edge {
            curve,
            start,
            end,
            coedges: vec![],
        });
        store.vertices[start].edges.push(edge);
        store.vertices[end].edges.push(edge);

        let coedge = store.coedges.insert(Coedge {
            edge,
            sense: Sense::Forward,
            next: None,
            previous: None,
            loop_id,
        });
        store.edges[edge].coedges.push(coedge);
        coedges.push(coedge);
    }

    let count = coedges.len();
    for i in 0..count {
        let has_next = chain.closed || i + 1 < count;
        let has_previous = chain.closed || i > 0;
        let coedge = &mut store.coedges[coedges[i]];
        coedge.next = has_next.then(|| coedges[(i + 1) % count]);
        coedge.previous = has_previous.then(|| coedges[(i + count - 1) % count]);
    }
    store.loops[loop_id].first = Some(coedges[0]);
    wire
}
