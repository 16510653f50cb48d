//! Structural audit of bodies and wires.
//!
//! Checks run per loop and per edge:
//! - **Loop structure**: `next`/`previous` form a cycle (faces, closed wires)
//!   or a head-to-tail path (open wires).
//! - **Vertex joins**: each coedge ends where the next one starts.
//! - **Face orientation**: outer-loop winding agrees with the face sense.
//! - **Edge uses**: one coedge per wire edge, two per manifold face edge.
//! - **Vertex on curve**: edge vertices sit on the curve's end points.

pub mod orientation;

use std::fmt;

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::geometry::{GeometryError, GeometryEvaluator};
use crate::topology::brep::*;
use crate::Tolerance;

use orientation::FaceOrientation;

/// Failures that stop an audit before it can report findings.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AuditError {
    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Classification of an audit finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationCode {
    /// Loop links do not form a proper cycle or path.
    BrokenLoop,
    /// A face loop, or a wire flagged closed, is an open path (or the reverse).
    ClosureMismatch,
    /// Consecutive coedges do not share a vertex.
    VertexMismatch,
    /// Outer-loop winding disagrees with the face sense.
    BadFaceOrientation,
    /// Edge used by the wrong number of coedges.
    BadEdgeUseCount,
    /// Edge's coedge list does not mention a coedge that uses it.
    MissingBackReference,
    /// Vertex position does not match its edge's curve end point.
    VertexOffCurve,
}

impl fmt::Display for ViolationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The entity an audit finding is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef {
    Vertex(VertexId),
    Edge(EdgeId),
    Coedge(CoedgeId),
    Loop(LoopId),
    Wire(WireId),
    Face(FaceId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub code: ViolationCode,
    pub entity: EntityRef,
    pub message: String,
    /// Measured deviation, where one applies.
    pub value: Option<f64>,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}: {}", self.code, self.entity, self.message)?;
        if let Some(value) = self.value {
            write!(f, " value={value:.2e}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditReport {
    pub violations: Vec<Violation>,
    pub loops_checked: usize,
    pub edges_checked: usize,
}

impl AuditReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations_of(&self, code: ViolationCode) -> Vec<&Violation> {
        self.violations.iter().filter(|v| v.code == code).collect()
    }

    fn push(&mut self, code: ViolationCode, entity: EntityRef, message: impl Into<String>) {
        self.violations.push(Violation {
            code,
            entity,
            message: message.into(),
            value: None,
        });
    }
}

/// Which kind of owner a loop has, and so how many uses its edges expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopKind {
    Face,
    Wire { closed: bool },
}

impl LoopKind {
    fn expected_edge_uses(self) -> usize {
        match self {
            LoopKind::Face => 2,
            LoopKind::Wire { .. } => 1,
        }
    }
}

/// Audit every face and standalone wire of a body.
///
/// Structural problems are returned as violations in the report. An `Err`
/// means the body (or one of its containers) could not be reached at all.
#[instrument(skip(store, geom, tol))]
pub fn audit_body<G: GeometryEvaluator>(
    store: &EntityStore,
    geom: &G,
    body: BodyId,
    tol: &Tolerance,
) -> Result<AuditReport, AuditError> {
    let mut report = AuditReport::default();

    for face_id in store.body_faces(body)? {
        audit_face(store, geom, face_id, tol, &mut report)?;
    }
    for wire_id in store.body_wires(body)? {
        audit_wire_into(store, geom, wire_id, tol, &mut report)?;
    }

    info!(
        valid = report.is_valid(),
        violations = report.violations.len(),
        loops = report.loops_checked,
        edges = report.edges_checked,
        "body audit complete"
    );
    Ok(report)
}

/// Audit a single wire, owned by a shell or free.
#[instrument(skip(store, geom, tol))]
pub fn audit_wire<G: GeometryEvaluator>(
    store: &EntityStore,
    geom: &G,
    wire: WireId,
    tol: &Tolerance,
) -> Result<AuditReport, AuditError> {
    let mut report = AuditReport::default();
    audit_wire_into(store, geom, wire, tol, &mut report)?;
    debug!(violations = report.violations.len(), "wire audit complete");
    Ok(report)
}

fn audit_face<G: GeometryEvaluator>(
    store: &EntityStore,
    geom: &G,
    face_id: FaceId,
    tol: &Tolerance,
    report: &mut AuditReport,
) -> Result<(), AuditError> {
    let mut outer_ok = true;
    for loop_id in store.face_loops(face_id)? {
        let ok = audit_loop(store, geom, loop_id, LoopKind::Face, tol, report)?;
        if loop_id == store.face(face_id)?.outer_loop {
            outer_ok = ok;
        }
    }
    if !outer_ok {
        return Ok(());
    }

    match orientation::face_orientation(store, geom, face_id, tol)? {
        FaceOrientation::Consistent => {}
        FaceOrientation::Inverted { alignment } => report.violations.push(Violation {
            code: ViolationCode::BadFaceOrientation,
            entity: EntityRef::Face(face_id),
            message: "outer loop winds against the face normal".into(),
            value: Some(alignment),
        }),
        FaceOrientation::Indeterminate => {
            debug!(?face_id, "outer loop encloses no area, orientation not checked");
        }
    }
    Ok(())
}

fn audit_wire_into<G: GeometryEvaluator>(
    store: &EntityStore,
    geom: &G,
    wire_id: WireId,
    tol: &Tolerance,
    report: &mut AuditReport,
) -> Result<(), AuditError> {
    let wire = store.wire(wire_id)?;
    if let Some(v) = wire.isolated_vertex {
        store.vertex(v)?;
        if store.loop_data(wire.loop_id)?.first.is_some() {
            report.push(
                ViolationCode::ClosureMismatch,
                EntityRef::Wire(wire_id),
                "wire has both an isolated vertex and coedges",
            );
        }
        return Ok(());
    }
    let kind = LoopKind::Wire {
        closed: wire.closed,
    };
    audit_loop(store, geom, wire.loop_id, kind, tol, report)?;
    Ok(())
}

/// Check one loop. Returns whether its link structure was sound enough for
/// winding checks.
fn audit_loop<G: GeometryEvaluator>(
    store: &EntityStore,
    geom: &G,
    loop_id: LoopId,
    kind: LoopKind,
    tol: &Tolerance,
    report: &mut AuditReport,
) -> Result<bool, AuditError> {
    report.loops_checked += 1;

    let coedges = match store.loop_coedges(loop_id) {
        Ok(coedges) => coedges,
        Err(TopologyError::CorruptLoop { reason, .. }) => {
            report.push(ViolationCode::BrokenLoop, EntityRef::Loop(loop_id), reason);
            return Ok(false);
        }
        Err(err) => return Err(err.into()),
    };
    let Some(&last) = coedges.last() else {
        if kind == LoopKind::Face {
            report.push(ViolationCode::BrokenLoop, EntityRef::Loop(loop_id), "face loop has no coedges");
        }
        return Ok(false);
    };

    let is_cycle = store.coedge(last)?.next.is_some();
    let expect_cycle = match kind {
        LoopKind::Face => true,
        LoopKind::Wire { closed } => closed,
    };
    if is_cycle != expect_cycle {
        let message = if expect_cycle {
            "loop should be a cycle but is an open path"
        } else {
            "open wire loop wraps around"
        };
        report.push(ViolationCode::ClosureMismatch, EntityRef::Loop(loop_id), message);
    }

    let pairs = coedges.len() - usize::from(!is_cycle);
    for i in 0..pairs {
        let (a, b) = (coedges[i], coedges[(i + 1) % coedges.len()]);
        if store.coedge_end_vertex(a)? != store.coedge_start_vertex(b)? {
            report.push(
                ViolationCode::VertexMismatch,
                EntityRef::Coedge(b),
                "coedge does not start where its predecessor ends",
            );
        }
    }

    for &c in &coedges {
        let edge_id = store.coedge(c)?.edge;
        let edge = store.edge(edge_id)?;
        report.edges_checked += 1;

        if !edge.coedges.contains(&c) {
            report.push(
                ViolationCode::MissingBackReference,
                EntityRef::Edge(edge_id),
                "edge does not list a coedge that uses it",
            );
        }
        let expected = kind.expected_edge_uses();
        if edge.coedges.len() != expected {
            report.push(
                ViolationCode::BadEdgeUseCount,
                EntityRef::Edge(edge_id),
                format!("edge has {} coedges, expected {expected}", edge.coedges.len()),
            );
        }
        check_vertices_on_curve(store, geom, edge_id, tol, report)?;
    }
    Ok(true)
}

fn check_vertices_on_curve<G: GeometryEvaluator>(
    store: &EntityStore,
    geom: &G,
    edge_id: EdgeId,
    tol: &Tolerance,
    report: &mut AuditReport,
) -> Result<(), AuditError> {
    let edge = store.edge(edge_id)?;
    let (t0, t1) = geom.param_range(edge.curve)?;
    for (vertex_id, t) in [(edge.start, t0), (edge.end, t1)] {
        let vertex = store.vertex(vertex_id)?;
        let on_curve = geom.position_at(edge.curve, t)?;
        let gap = nalgebra::distance(&vertex.point, &on_curve);
        if gap > vertex.tolerance.max(tol.coincidence) {
            report.violations.push(Violation {
                code: ViolationCode::VertexOffCurve,
                entity: EntityRef::Vertex(vertex_id),
                message: format!("vertex is off the curve end of edge {edge_id:?}"),
                value: Some(gap),
            });
        }
    }
    Ok(())
}
