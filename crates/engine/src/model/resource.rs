//! The resource graph (spec §3, "Resource graph"): directed edges from each
//! Result-arg to zero or one producer Result-arg, with a derived reverse
//! index of each producer's consumers.
//!
//! Per the design notes (§9), the producer/consumer edge is modeled as a
//! stable identifier rather than an owning reference — in idiomatic Rust
//! that identifier is a `Copy` integer (`ResourceId`), so clone + re-stitch
//! (spec §4.1) falls out of an ordinary deep clone with no pointer-identity
//! bookkeeping required.

use std::collections::{HashMap, HashSet};

use super::arg::{Arg, PointerTarget};
use super::program::Program;

/// Identity of a single Result-arg instance, unique within one program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct ResourceId(pub u64);

/// Hands out fresh, program-local resource ids.
#[derive(Debug, Default)]
pub struct ResourceIdGen {
    next: u64,
}

impl ResourceIdGen {
    pub fn next(&mut self) -> ResourceId {
        let id = ResourceId(self.next);
        self.next += 1;
        id
    }
}

/// Where a Result-arg instance lives, for diagnostics and Stage D's
/// resource-closure search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLoc {
    pub call_idx: usize,
}

/// Derived view over a `Program`'s resource edges. Recomputed from scratch
/// after every committed mutation — cheap (linear in argument-tree size)
/// and side-steps any incremental-bookkeeping bugs from stale indices after
/// a call is removed and later positions shift.
#[derive(Debug, Default)]
pub struct ResourceGraph {
    /// Every Result-arg id currently present, and which call it's in.
    pub present: HashMap<ResourceId, ResourceLoc>,
    /// producer id -> set of consumer ids that reference it.
    pub consumers: HashMap<ResourceId, HashSet<ResourceId>>,
}

impl ResourceGraph {
    pub fn build(program: &Program) -> ResourceGraph {
        let mut graph = ResourceGraph::default();
        for (call_idx, call) in program.calls.iter().enumerate() {
            for arg in &call.args {
                walk(arg, call_idx, &mut graph);
            }
        }
        graph
    }

    /// Invariant 1: every Result-arg's producer, if set, is still present.
    pub fn dangling_refs(&self) -> Vec<ResourceId> {
        let mut bad = Vec::new();
        for (&consumer, &producer_ref) in &self.producer_of_all() {
            if let Some(prod) = producer_ref {
                if !self.present.contains_key(&prod) {
                    bad.push(consumer);
                }
            }
        }
        bad
    }

    fn producer_of_all(&self) -> HashMap<ResourceId, Option<ResourceId>> {
        let mut out = HashMap::new();
        for (&prod, cons) in &self.consumers {
            for &c in cons {
                out.insert(c, Some(prod));
            }
        }
        for &id in self.present.keys() {
            out.entry(id).or_insert(None);
        }
        out
    }

    /// All resource ids produced anywhere within the given call.
    pub fn ids_in_call(&self, call_idx: usize) -> Vec<ResourceId> {
        self.present
            .iter()
            .filter(|(_, loc)| loc.call_idx == call_idx)
            .map(|(id, _)| *id)
            .collect()
    }
}

fn walk(arg: &Arg, call_idx: usize, graph: &mut ResourceGraph) {
    match arg {
        Arg::Result { id, producer, .. } => {
            graph.present.insert(*id, ResourceLoc { call_idx });
            if let Some(p) = producer {
                graph.consumers.entry(*p).or_default().insert(*id);
            }
        }
        Arg::Pointer { target: PointerTarget::Address { pointee, .. }, .. } => {
            walk(pointee, call_idx, graph);
        }
        Arg::Pointer { target: PointerTarget::Special(_), .. } => {}
        Arg::Group { elems, .. } => {
            for e in elems {
                walk(e, call_idx, graph);
            }
        }
        Arg::Union { inner, .. } => walk(inner, call_idx, graph),
        Arg::Const { .. } | Arg::Data { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_fixtures::two_resource_program;

    #[test]
    fn graph_links_producer_to_consumer() {
        let prog = two_resource_program();
        let graph = ResourceGraph::build(&prog);
        assert_eq!(graph.present.len(), 2);
        assert_eq!(graph.dangling_refs().len(), 0);
    }
}
