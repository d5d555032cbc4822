//! Stage D's resource-closure computation (spec §4.4): the transitive
//! closure of calls that share a resource handle or filename-buffer bytes
//! with the target call, used as a telemetry-free alternative to Stage B.

use std::collections::HashSet;

use crate::model::{Arg, Program, ResourceGraph, ResourceId};

/// Every call index *not* in the resource/filename closure of `k0`.
pub fn unrelated_calls(program: &Program, k0: usize) -> HashSet<usize> {
    let graph = ResourceGraph::build(program);
    let mut related: HashSet<usize> = HashSet::new();
    related.insert(k0);

    let mut changed = true;
    while changed {
        changed = false;
        for idx in 0..program.len() {
            if related.contains(&idx) {
                continue;
            }
            if related.iter().any(|&r| linked(program, &graph, idx, r)) {
                related.insert(idx);
                changed = true;
            }
        }
    }

    (0..program.len()).filter(|i| !related.contains(i)).collect()
}

fn linked(program: &Program, graph: &ResourceGraph, a: usize, b: usize) -> bool {
    shares_resource(graph, a, b) || shares_filename_bytes(program, a, b)
}

fn shares_resource(graph: &ResourceGraph, a: usize, b: usize) -> bool {
    let ids_a = graph.ids_in_call(a);
    let ids_b = graph.ids_in_call(b);
    ids_a.iter().any(|ia| ids_b.iter().any(|ib| produces(graph, *ia, *ib) || produces(graph, *ib, *ia)))
}

fn produces(graph: &ResourceGraph, producer: ResourceId, consumer: ResourceId) -> bool {
    graph.consumers.get(&producer).map_or(false, |set| set.contains(&consumer))
}

fn shares_filename_bytes(program: &Program, a: usize, b: usize) -> bool {
    let bytes_a = filename_bytes(&program.calls[a].args);
    if bytes_a.is_empty() {
        return false;
    }
    let bytes_b = filename_bytes(&program.calls[b].args);
    bytes_a.iter().any(|x| bytes_b.contains(x))
}

fn filename_bytes(args: &[Arg]) -> Vec<&[u8]> {
    let mut out = Vec::new();
    for arg in args {
        collect_filename_bytes(arg, &mut out);
    }
    out
}

fn collect_filename_bytes<'a>(arg: &'a Arg, out: &mut Vec<&'a [u8]>) {
    match arg {
        Arg::Data { bytes, .. } => out.push(bytes),
        Arg::Group { elems, .. } => {
            for e in elems {
                collect_filename_bytes(e, out);
            }
        }
        Arg::Union { inner, .. } => collect_filename_bytes(inner, out),
        Arg::Pointer { target: crate::model::PointerTarget::Address { pointee, .. }, .. } => {
            collect_filename_bytes(pointee, out);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_fixtures::{call_noop, call_open_r, call_use_r, syscall_table};
    use crate::model::ResourceIdGen;

    #[test]
    fn closure_keeps_resource_linked_calls_together() {
        let table = syscall_table();
        let mut ids = ResourceIdGen::default();
        let (open_call, open_id) = call_open_r(&mut ids, &table);
        let use_call = call_use_r(&table, Some(open_id), 3, ids.next());
        let noop1 = call_noop(&table);
        let noop2 = call_noop(&table);
        let noop3 = call_noop(&table);
        let program = Program::new("test", vec![open_call, use_call, noop1, noop2, noop3]);

        let unrelated = unrelated_calls(&program, 1);
        assert!(unrelated.contains(&2));
        assert!(unrelated.contains(&3));
        assert!(unrelated.contains(&4));
        assert!(!unrelated.contains(&0));
        assert!(!unrelated.contains(&1));
    }
}
