use std::collections::HashSet;

use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::geometry::{CurveId, Point3d, SurfaceId};

// ─── Entity Keys ─────────────────────────────────────────────────────────────

new_key_type! {
    pub struct VertexId;
    pub struct EdgeId;
    pub struct CoedgeId;
    pub struct LoopId;
    pub struct WireId;
    pub struct FaceId;
    pub struct ShellId;
    pub struct LumpId;
    pub struct BodyId;
}

// ─── Topological Entities ───────────────────────────────────────────────────

/// Direction in which a coedge (or face) uses its edge (or surface).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sense {
    Forward,
    Reversed,
}

impl Sense {
    pub fn flipped(self) -> Self {
        match self {
            Sense::Forward => Sense::Reversed,
            Sense::Reversed => Sense::Forward,
        }
    }

    pub fn is_forward(self) -> bool {
        self == Sense::Forward
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub point: Point3d,
    pub tolerance: f64,
    /// Incident edges (back-references, not owned).
    pub edges: Vec<EdgeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub curve: CurveId,
    /// Vertex at the low end of the curve's parameter range.
    pub start: VertexId,
    /// Vertex at the high end; equal to `start` for a closed curve.
    pub end: VertexId,
    /// Coedges using this edge (back-references, not owned).
    pub coedges: Vec<CoedgeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coedge {
    pub edge: EdgeId,
    pub sense: Sense,
    pub next: Option<CoedgeId>,
    pub previous: Option<CoedgeId>,
    pub loop_id: LoopId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopOwner {
    Face(FaceId),
    Wire(WireId),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Loop {
    /// Representative coedge of a cycle, or the head of an open path.
    pub first: Option<CoedgeId>,
    pub owner: LoopOwner,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wire {
    pub loop_id: LoopId,
    pub shell: Option<ShellId>,
    /// false for an open path: the head has no `previous`, the tail no `next`.
    pub closed: bool,
    /// The sole vertex of a zero-edge wire.
    pub isolated_vertex: Option<VertexId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Face {
    pub surface: SurfaceId,
    pub outer_loop: LoopId,
    pub inner_loops: Vec<LoopId>,
    /// Forward if the face normal agrees with the surface normal.
    pub sense: Sense,
    pub shell: ShellId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shell {
    pub faces: Vec<FaceId>,
    pub wires: Vec<WireId>,
    pub lump: LumpId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lump {
    pub shells: Vec<ShellId>,
    pub body: BodyId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub lumps: Vec<LumpId>,
    pub transform: Matrix4<f64>,
}

impl Body {
    pub fn new() -> Self {
        Self {
            lumps: Vec::new(),
            transform: Matrix4::identity(),
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TopologyError {
    #[error("stale or unknown {kind} handle")]
    StaleHandle { kind: &'static str },

    #[error("loop {loop_id:?} is not a proper coedge cycle: {reason}")]
    CorruptLoop { loop_id: LoopId, reason: &'static str },

    #[error("arena exhausted: requested {requested} entities, {available} available")]
    CapacityExceeded { requested: usize, available: usize },
}

fn stale(kind: &'static str) -> TopologyError {
    TopologyError::StaleHandle { kind }
}

/// Handles released by [`EntityStore::remove_body`] that belong to the
/// geometry domain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReleasedGeometry {
    pub curves: Vec<CurveId>,
    pub surfaces: Vec<SurfaceId>,
}

// ─── Entity Store ────────────────────────────────────────────────────────────

/// Arena-based storage for all topological entities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityStore {
    pub vertices: SlotMap<VertexId, Vertex>,
    pub edges: SlotMap<EdgeId, Edge>,
    pub coedges: SlotMap<CoedgeId, Coedge>,
    pub loops: SlotMap<LoopId, Loop>,
    pub wires: SlotMap<WireId, Wire>,
    pub faces: SlotMap<FaceId, Face>,
    pub shells: SlotMap<ShellId, Shell>,
    pub lumps: SlotMap<LumpId, Lump>,
    pub bodies: SlotMap<BodyId, Body>,
    /// Upper bound on live entities, if any.
    capacity_limit: Option<usize>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that refuses to grow beyond `limit` live entities.
    pub fn with_capacity_limit(limit: usize) -> Self {
        Self {
            capacity_limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn set_capacity_limit(&mut self, limit: Option<usize>) {
        self.capacity_limit = limit;
    }

    /// Total number of live entities of every kind.
    pub fn entity_count(&self) -> usize {
        self.vertices.len()
            + self.edges.len()
            + self.coedges.len()
            + self.loops.len()
            + self.wires.len()
            + self.faces.len()
            + self.shells.len()
            + self.lumps.len()
            + self.bodies.len()
    }

    /// Check that `requested` more entities fit. Nothing is allocated.
    pub fn reserve(&self, requested: usize) -> Result<(), TopologyError> {
        let Some(limit) = self.capacity_limit else {
            return Ok(());
        };
        let available = limit.saturating_sub(self.entity_count());
        if requested > available {
            return Err(TopologyError::CapacityExceeded {
                requested,
                available,
            });
        }
        Ok(())
    }

    pub fn vertex(&self, id: VertexId) -> Result<&Vertex, TopologyError> {
        self.vertices.get(id).ok_or_else(|| stale("vertex"))
    }

    pub fn edge(&self, id: EdgeId) -> Result<&Edge, TopologyError> {
        self.edges.get(id).ok_or_else(|| stale("edge"))
    }

    pub fn coedge(&self, id: CoedgeId) -> Result<&Coedge, TopologyError> {
        self.coedges.get(id).ok_or_else(|| stale("coedge"))
    }

    pub fn loop_data(&self, id: LoopId) -> Result<&Loop, TopologyError> {
        self.loops.get(id).ok_or_else(|| stale("loop"))
    }

    pub fn wire(&self, id: WireId) -> Result<&Wire, TopologyError> {
        self.wires.get(id).ok_or_else(|| stale("wire"))
    }

    pub fn face(&self, id: FaceId) -> Result<&Face, TopologyError> {
        self.faces.get(id).ok_or_else(|| stale("face"))
    }

    pub fn shell(&self, id: ShellId) -> Result<&Shell, TopologyError> {
        self.shells.get(id).ok_or_else(|| stale("shell"))
    }

    pub fn lump(&self, id: LumpId) -> Result<&Lump, TopologyError> {
        self.lumps.get(id).ok_or_else(|| stale("lump"))
    }

    pub fn body(&self, id: BodyId) -> Result<&Body, TopologyError> {
        self.bodies.get(id).ok_or_else(|| stale("body"))
    }

    /// Vertex a coedge starts from, taking its sense into account.
    pub fn coedge_start_vertex(&self, id: CoedgeId) -> Result<VertexId, TopologyError> {
        let coedge = self.coedge(id)?;
        let edge = self.edge(coedge.edge)?;
        Ok(if coedge.sense.is_forward() { edge.start } else { edge.end })
    }

    /// Vertex a coedge ends at, taking its sense into account.
    pub fn coedge_end_vertex(&self, id: CoedgeId) -> Result<VertexId, TopologyError> {
        let coedge = self.coedge(id)?;
        let edge = self.edge(coedge.edge)?;
        Ok(if coedge.sense.is_forward() { edge.end } else { edge.start })
    }

    /// Walk a loop from its first coedge and return the coedges in traversal
    /// order, checking the link structure on the way.
    ///
    /// A closed loop must return to its first coedge; an open loop must start
    /// at a coedge with no `previous` and end at one with no `next`. Every
    /// coedge must point back at this loop and `previous` must mirror `next`.
    pub fn loop_coedges(&self, loop_id: LoopId) -> Result<Vec<CoedgeId>, TopologyError> {
        let loop_data = self.loop_data(loop_id)?;
        let Some(first) = loop_data.first else {
            return Ok(Vec::new());
        };
        let corrupt = |reason| TopologyError::CorruptLoop { loop_id, reason };

        let mut order = Vec::new();
        let mut current = first;
        loop {
            let coedge = self.coedges.get(current).ok_or(corrupt("dangling coedge link"))?;
            if coedge.loop_id != loop_id {
                return Err(corrupt("coedge belongs to another loop"));
            }
            order.push(current);
            if order.len() > self.coedges.len() {
                return Err(corrupt("cycle does not return to its first coedge"));
            }
            match coedge.next {
                None => {
                    if self.coedge(first)?.previous.is_some() {
                        return Err(corrupt("open path does not start at its head"));
                    }
                    break;
                }
                Some(next) if next == first => {
                    if self.coedge(first)?.previous != Some(current) {
                        return Err(corrupt("previous link does not mirror next"));
                    }
                    break;
                }
                Some(next) => {
                    let next_coedge =
                        self.coedges.get(next).ok_or(corrupt("dangling coedge link"))?;
                    if next_coedge.previous != Some(current) {
                        return Err(corrupt("previous link does not mirror next"));
                    }
                    current = next;
                }
            }
        }
        Ok(order)
    }

    /// Whether the coedges of a loop form a true cycle.
    pub fn loop_is_cycle(&self, loop_id: LoopId) -> Result<bool, TopologyError> {
        let coedges = self.loop_coedges(loop_id)?;
        match coedges.last() {
            Some(&last) => Ok(self.coedge(last)?.next.is_some()),
            None => Ok(false),
        }
    }

    /// Edges of a wire, in traversal order.
    pub fn wire_edges(&self, wire_id: WireId) -> Result<Vec<EdgeId>, TopologyError> {
        let wire = self.wire(wire_id)?;
        self.loop_coedges(wire.loop_id)?
            .into_iter()
            .map(|c| Ok(self.coedge(c)?.edge))
            .collect()
    }

    /// Distinct vertices of a wire, in traversal order.
    pub fn wire_vertices(&self, wire_id: WireId) -> Result<Vec<VertexId>, TopologyError> {
        let wire = self.wire(wire_id)?;
        if let Some(v) = wire.isolated_vertex {
            return Ok(vec![v]);
        }
        let coedges = self.loop_coedges(wire.loop_id)?;
        let mut out = Vec::with_capacity(coedges.len() + 1);
        for &c in &coedges {
            out.push(self.coedge_start_vertex(c)?);
        }
        if let Some(&last) = coedges.last() {
            let end = self.coedge_end_vertex(last)?;
            if !wire.closed {
                out.push(end);
            }
        }
        Ok(out)
    }

    /// All faces of a body, lump by lump, shell by shell.
    pub fn body_faces(&self, body_id: BodyId) -> Result<Vec<FaceId>, TopologyError> {
        let mut out = Vec::new();
        for shell_id in self.body_shells(body_id)? {
            out.extend(self.shell(shell_id)?.faces.iter().copied());
        }
        Ok(out)
    }

    /// All standalone wires of a body.
    pub fn body_wires(&self, body_id: BodyId) -> Result<Vec<WireId>, TopologyError> {
        let mut out = Vec::new();
        for shell_id in self.body_shells(body_id)? {
            out.extend(self.shell(shell_id)?.wires.iter().copied());
        }
        Ok(out)
    }

    pub fn body_shells(&self, body_id: BodyId) -> Result<Vec<ShellId>, TopologyError> {
        let mut out = Vec::new();
        for &lump_id in &self.body(body_id)?.lumps {
            out.extend(self.lump(lump_id)?.shells.iter().copied());
        }
        Ok(out)
    }

    /// Every loop of a face, outer loop first.
    pub fn face_loops(&self, face_id: FaceId) -> Result<Vec<LoopId>, TopologyError> {
        let face = self.face(face_id)?;
        let mut out = Vec::with_capacity(1 + face.inner_loops.len());
        out.push(face.outer_loop);
        out.extend(face.inner_loops.iter().copied());
        Ok(out)
    }

    /// Count (vertices, edges, faces) reachable from a body.
    pub fn count_topology(&self, body_id: BodyId) -> Result<(usize, usize, usize), TopologyError> {
        let mut edges = HashSet::new();
        let mut vertices = HashSet::new();
        let faces = self.body_faces(body_id)?;

        let mut loops = Vec::new();
        for &face_id in &faces {
            loops.extend(self.face_loops(face_id)?);
        }
        for wire_id in self.body_wires(body_id)? {
            let wire = self.wire(wire_id)?;
            loops.push(wire.loop_id);
            if let Some(v) = wire.isolated_vertex {
                vertices.insert(v);
            }
        }
        for loop_id in loops {
            for c in self.loop_coedges(loop_id)? {
                let edge_id = self.coedge(c)?.edge;
                let edge = self.edge(edge_id)?;
                edges.insert(edge_id);
                vertices.insert(edge.start);
                vertices.insert(edge.end);
            }
        }
        Ok((vertices.len(), edges.len(), faces.len()))
    }

    /// Destroy a body and everything it owns.
    ///
    /// Edges go once their last coedge goes, vertices once their last edge
    /// goes. Curve and surface handles that no surviving entity references
    /// are returned so the caller can release them from the evaluator.
    #[instrument(skip(self))]
    pub fn remove_body(&mut self, body_id: BodyId) -> Result<ReleasedGeometry, TopologyError> {
        let before = self.entity_count();
        let body = self.bodies.remove(body_id).ok_or_else(|| stale("body"))?;
        let mut released = ReleasedGeometry::default();

        for lump_id in body.lumps {
            let Some(lump) = self.lumps.remove(lump_id) else { continue };
            for shell_id in lump.shells {
                let Some(shell) = self.shells.remove(shell_id) else { continue };
                for face_id in shell.faces {
                    let Some(face) = self.faces.remove(face_id) else { continue };
                    released.surfaces.push(face.surface);
                    self.remove_loop(face.outer_loop, &mut released);
                    for inner in face.inner_loops {
                        self.remove_loop(inner, &mut released);
                    }
                }
                for wire_id in shell.wires {
                    let Some(wire) = self.wires.remove(wire_id) else { continue };
                    self.remove_loop(wire.loop_id, &mut released);
                    if let Some(v) = wire.isolated_vertex {
                        if self.vertices.get(v).is_some_and(|vx| vx.edges.is_empty()) {
                            self.vertices.remove(v);
                        }
                    }
                }
            }
        }

        let surviving: HashSet<SurfaceId> = self.faces.values().map(|f| f.surface).collect();
        released.surfaces.retain(|s| !surviving.contains(s));
        released.surfaces.sort();
        released.surfaces.dedup();

        debug!(
            ?body_id,
            removed = before - self.entity_count(),
            curves = released.curves.len(),
            "removed body"
        );
        Ok(released)
    }

    /// Remove a loop, its coedges, and any edges/vertices left unused.
    fn remove_loop(&mut self, loop_id: LoopId, released: &mut ReleasedGeometry) {
        if self.loops.remove(loop_id).is_none() {
            return;
        }

        let owned: Vec<CoedgeId> = self
            .coedges
            .iter()
            .filter(|(_, c)| c.loop_id == loop_id)
            .map(|(id, _)| id)
            .collect();

        for coedge_id in owned {
            let Some(coedge) = self.coedges.remove(coedge_id) else { continue };
            let Some(edge) = self.edges.get_mut(coedge.edge) else { continue };
            edge.coedges.retain(|&c| c != coedge_id);
            if !edge.coedges.is_empty() {
                continue;
            }
            let Some(edge) = self.edges.remove(coedge.edge) else { continue };
            released.curves.push(edge.curve);
            for vertex_id in [edge.start, edge.end] {
                let Some(vertex) = self.vertices.get_mut(vertex_id) else { continue };
                vertex.edges.retain(|&e| e != coedge.edge);
                if vertex.edges.is_empty() {
                    self.vertices.remove(vertex_id);
                }
            }
        }
    }
}
