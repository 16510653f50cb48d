use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::geometry::{CurveId, GeometryError, GeometryEvaluator, Point3d};
use crate::topology::brep::*;
use crate::Tolerance;

/// Samples used to decide whether an edge's curve has collapsed to a point.
const LENGTH_SAMPLES: usize = 32;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SplitError {
    #[error("edge {edge:?} has a degenerate curve (length {length})")]
    DegenerateCurve { edge: EdgeId, length: f64 },

    #[error("geometry evaluator failed: {0}")]
    EvaluatorFailure(#[from] GeometryError),

    #[error("arena exhausted: split needs {requested} entities, {available} available")]
    AllocationFailure { requested: usize, available: usize },

    #[error(transparent)]
    Topology(TopologyError),
}

impl From<TopologyError> for SplitError {
    fn from(err: TopologyError) -> Self {
        match err {
            TopologyError::CapacityExceeded {
                requested,
                available,
            } => SplitError::AllocationFailure {
                requested,
                available,
            },
            other => SplitError::Topology(other),
        }
    }
}

/// Curves and vertex positions produced before any topology is touched.
struct StagedSplit {
    pieces: Vec<CurveId>,
    positions: Vec<Point3d>,
}

/// Split an edge wherever its curve's continuity drops below
/// `required_order`.
///
/// Returns the replacement edges in parametric order, or `[edge]` when the
/// curve is already continuous enough. Every coedge on the edge is replaced
/// by a chain of coedges with the same sense, so both loops of a manifold
/// edge stay closed.
#[instrument(skip(store, geom, tol))]
pub fn split_edge_at_discontinuities<G: GeometryEvaluator>(
    store: &mut EntityStore,
    geom: &mut G,
    edge: EdgeId,
    required_order: u32,
    tol: &Tolerance,
) -> Result<Vec<EdgeId>, SplitError> {
    let old = store.edge(edge)?.clone();
    let (t0, t1) = geom.param_range(old.curve)?;

    let mut params: Vec<f64> = geom
        .discontinuities(old.curve, required_order)?
        .into_iter()
        .filter(|&t| t > t0 + tol.parametric && t < t1 - tol.parametric)
        .collect();
    params.sort_by(f64::total_cmp);
    params.dedup_by(|a, b| tol.params_equal(*a, *b));

    if params.is_empty() {
        debug!("no discontinuities below required order");
        return Ok(vec![edge]);
    }

    let length = geom.curve_length(old.curve, LENGTH_SAMPLES)?;
    if tol.is_zero_length(length) {
        return Err(SplitError::DegenerateCurve { edge, length });
    }

    // Both end vertices and every loop through this edge get relinked.
    store.vertex(old.start)?;
    store.vertex(old.end)?;
    for &c in &old.coedges {
        let loop_id = store.coedge(c)?.loop_id;
        store.loop_coedges(loop_id)?;
    }

    let k = params.len();
    let uses = old.coedges.len();
    store.reserve(k + (k + 1) + (k + 1) * uses)?;

    let staged = stage_split(geom, old.curve, &params)?;
    debug!(pieces = staged.pieces.len(), "staged split curves");

    let new_edges = commit_split(store, edge, &old, staged, tol);
    geom.release_curve(old.curve);

    info!(
        ?edge,
        pieces = new_edges.len(),
        coedges_replaced = uses,
        "split edge at discontinuities"
    );
    Ok(new_edges)
}

/// Subdivide `curve` successively at `params` and evaluate the new vertex
/// positions. On failure every curve created here is released.
fn stage_split<G: GeometryEvaluator>(
    geom: &mut G,
    curve: CurveId,
    params: &[f64],
) -> Result<StagedSplit, GeometryError> {
    let mut pieces = Vec::with_capacity(params.len() + 1);
    let mut positions = Vec::with_capacity(params.len());
    let mut remainder = curve;

    for &t in params {
        let step = geom.position_at(curve, t).and_then(|position| {
            geom.subdivide(remainder, t)
                .map(|halves| (position, halves))
        });
        match step {
            Ok((position, (left, right))) => {
                if remainder != curve {
                    geom.release_curve(remainder);
                }
                pieces.push(left);
                positions.push(position);
                remainder = right;
            }
            Err(err) => {
                debug!(t, %err, "subdivision failed, releasing staged curves");
                if remainder != curve {
                    geom.release_curve(remainder);
                }
                for piece in pieces {
                    geom.release_curve(piece);
                }
                return Err(err);
            }
        }
    }
    pieces.push(remainder);
    Ok(StagedSplit { pieces, positions })
}

/// Replace `edge` with one edge per staged piece and relink every coedge
/// that used it. Capacity and handles were checked by the caller.
fn commit_split(
    store: &mut EntityStore,
    edge: EdgeId,
    old: &Edge,
    staged: StagedSplit,
    tol: &Tolerance,
) -> Vec<EdgeId> {
    // start, interior vertices in parametric order, end
    let mut chain = Vec::with_capacity(staged.positions.len() + 2);
    chain.push(old.start);
    for point in staged.positions {
        chain.push(store.vertices.insert(Vertex {
            point,
            tolerance: tol.coincidence,
            edges: vec![],
        }));
    }
    chain.push(old.end);

    for vertex_id in [old.start, old.end] {
        store.vertices[vertex_id].edges.retain(|&e| e != edge);
    }

    let mut new_edges = Vec::with_capacity(staged.pieces.len());
    for (i, curve) in staged.pieces.into_iter().enumerate() {
        let (start, end) = (chain[i], chain[i + 1]);
        let new_edge = store.edges.insert(Edge {
            curve,
            start,
            end,
            coedges: vec![],
        });
        for vertex_id in [start, end] {
            let edges = &mut store.vertices[vertex_id].edges;
            if !edges.contains(&new_edge) {
                edges.push(new_edge);
            }
        }
        new_edges.push(new_edge);
    }

    for &old_coedge in &old.coedges {
        // Read fresh: an earlier replacement may have relinked this coedge.
        let template = store.coedges[old_coedge];
        let ordered: Vec<EdgeId> = if template.sense.is_forward() {
            new_edges.clone()
        } else {
            new_edges.iter().rev().copied().collect()
        };

        let replacement: Vec<CoedgeId> = ordered
            .into_iter()
            .map(|e| {
                let c = store.coedges.insert(Coedge {
                    edge: e,
                    next: None,
                    previous: None,
                    ..template
                });
                store.edges[e].coedges.push(c);
                c
            })
            .collect();
        for pair in replacement.windows(2) {
            store.coedges[pair[0]].next = Some(pair[1]);
            store.coedges[pair[1]].previous = Some(pair[0]);
        }

        let head = replacement[0];
        let tail = replacement[replacement.len() - 1];

        let previous = match template.previous {
            Some(p) if p == old_coedge => Some(tail),
            Some(p) => {
                store.coedges[p].next = Some(head);
                Some(p)
            }
            None => None,
        };
        let next = match template.next {
            Some(n) if n == old_coedge => Some(head),
            Some(n) => {
                store.coedges[n].previous = Some(tail);
                Some(n)
            }
            None => None,
        };
        store.coedges[head].previous = previous;
        store.coedges[tail].next = next;

        let loop_data = &mut store.loops[template.loop_id];
        if loop_data.first == Some(old_coedge) {
            loop_data.first = Some(head);
        }
        store.coedges.remove(old_coedge);
    }

    store.edges.remove(edge);
    new_edges
}
