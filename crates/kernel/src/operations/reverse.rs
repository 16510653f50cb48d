use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::topology::brep::*;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReverseError {
    #[error("loop {loop_id:?} cannot be reversed: {reason}")]
    CorruptLoop { loop_id: LoopId, reason: &'static str },

    #[error(transparent)]
    Topology(TopologyError),
}

impl From<TopologyError> for ReverseError {
    fn from(err: TopologyError) -> Self {
        match err {
            TopologyError::CorruptLoop { loop_id, reason } => {
                ReverseError::CorruptLoop { loop_id, reason }
            }
            other => ReverseError::Topology(other),
        }
    }
}

/// Everything a reversal will touch, gathered and validated before the first
/// mutation.
#[derive(Default)]
struct ReversalPlan {
    loops: Vec<(LoopId, Vec<CoedgeId>)>,
    faces: Vec<FaceId>,
}

impl ReversalPlan {
    fn add_loop(&mut self, store: &EntityStore, loop_id: LoopId) -> Result<(), ReverseError> {
        let coedges = store.loop_coedges(loop_id)?;
        self.loops.push((loop_id, coedges));
        Ok(())
    }

    fn add_wire(&mut self, store: &EntityStore, wire_id: WireId) -> Result<(), ReverseError> {
        let wire = store.wire(wire_id)?;
        self.add_loop(store, wire.loop_id)
    }

    fn add_face(&mut self, store: &EntityStore, face_id: FaceId) -> Result<(), ReverseError> {
        for loop_id in store.face_loops(face_id)? {
            self.add_loop(store, loop_id)?;
        }
        self.faces.push(face_id);
        Ok(())
    }

    fn coedge_count(&self) -> usize {
        self.loops.iter().map(|(_, c)| c.len()).sum()
    }

    /// Apply the reversal. Every handle was checked while planning.
    fn apply(self, store: &mut EntityStore) {
        for (loop_id, coedges) in &self.loops {
            for &c in coedges {
                let coedge = &mut store.coedges[c];
                std::mem::swap(&mut coedge.next, &mut coedge.previous);
                coedge.sense = coedge.sense.flipped();
            }
            // After the swap an open path's old tail has no `previous`.
            if let Some(&last) = coedges.last() {
                if store.coedges[last].previous.is_none() {
                    store.loops[*loop_id].first = Some(last);
                }
            }
        }
        for &face_id in &self.faces {
            let face = &mut store.faces[face_id];
            face.sense = face.sense.flipped();
        }
    }
}

/// Reverse the traversal direction of a wire.
#[instrument(skip(store))]
pub fn reverse_wire(store: &mut EntityStore, wire: WireId) -> Result<(), ReverseError> {
    let mut plan = ReversalPlan::default();
    plan.add_wire(store, wire)?;
    debug!(coedges = plan.coedge_count(), "reversing wire");
    plan.apply(store);
    Ok(())
}

/// Flip a face's sense and reverse all of its loops together.
#[instrument(skip(store))]
pub fn reverse_face(store: &mut EntityStore, face: FaceId) -> Result<(), ReverseError> {
    let mut plan = ReversalPlan::default();
    plan.add_face(store, face)?;
    debug!(loops = plan.loops.len(), coedges = plan.coedge_count(), "reversing face");
    plan.apply(store);
    Ok(())
}

/// Reverse every face and every standalone wire of a body.
#[instrument(skip(store))]
pub fn reverse_body(store: &mut EntityStore, body: BodyId) -> Result<(), ReverseError> {
    let mut plan = ReversalPlan::default();
    for face_id in store.body_faces(body)? {
        plan.add_face(store, face_id)?;
    }
    for wire_id in store.body_wires(body)? {
        plan.add_wire(store, wire_id)?;
    }

    let (faces, loops, coedges) = (plan.faces.len(), plan.loops.len(), plan.coedge_count());
    plan.apply(store);
    info!(?body, faces, loops, coedges, "reversed body");
    Ok(())
}
