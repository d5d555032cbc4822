//! Operations over the argument tree (spec §4.1): pre-order traversal,
//! in-place replacement, and the two resource-graph edit primitives.

use std::collections::HashSet;
use std::sync::Arc;

use super::arg::{Arg, PointerTarget};
use super::path::{ArgPath, PathSeg};
use super::program::Program;
use super::resource::{ResourceGraph, ResourceId};
use super::types::TypeDesc;

/// Pre-order walk of one call's top-level argument list. `f` receives the
/// current argument, its type descriptor, and the path to it.
pub fn visit_preorder<'a>(args: &'a [Arg], f: &mut dyn FnMut(&'a Arg, &Arc<TypeDesc>, &ArgPath)) {
    for (i, arg) in args.iter().enumerate() {
        visit_one(arg, ArgPath::root(i), f);
    }
}

fn visit_one<'a>(arg: &'a Arg, path: ArgPath, f: &mut dyn FnMut(&'a Arg, &Arc<TypeDesc>, &ArgPath)) {
    f(arg, arg.ty(), &path);
    match arg {
        Arg::Group { elems, .. } => {
            for (i, e) in elems.iter().enumerate() {
                visit_one(e, path.child(PathSeg::Elem(i)), f);
            }
        }
        Arg::Union { inner, .. } => visit_one(inner, path.child(PathSeg::Field(0)), f),
        Arg::Pointer { target: PointerTarget::Address { pointee, .. }, .. } => {
            visit_one(pointee, path.child(PathSeg::Deref), f);
        }
        _ => {}
    }
}

/// Look up the argument at `path` within one call's top-level list.
pub fn get_at<'a>(args: &'a [Arg], path: &ArgPath) -> Option<&'a Arg> {
    let mut segs = path.segments().iter();
    let top = match segs.next()? {
        PathSeg::Field(i) => args.get(*i)?,
        _ => return None,
    };
    get_at_rec(top, segs.as_slice())
}

fn get_at_rec<'a>(arg: &'a Arg, segs: &[PathSeg]) -> Option<&'a Arg> {
    match segs.split_first() {
        None => Some(arg),
        Some((PathSeg::Elem(i), rest)) => match arg {
            Arg::Group { elems, .. } => get_at_rec(elems.get(*i)?, rest),
            _ => None,
        },
        Some((PathSeg::Field(_), rest)) => match arg {
            Arg::Union { inner, .. } => get_at_rec(inner, rest),
            _ => None,
        },
        Some((PathSeg::Deref, rest)) => match arg {
            Arg::Pointer { target: PointerTarget::Address { pointee, .. }, .. } => {
                get_at_rec(pointee, rest)
            }
            _ => None,
        },
    }
}

/// Replace the argument at `path` within one call's top-level list.
/// Because the tree is owned (`Vec`/`Box`, no parent back-pointers), the
/// replacement is atomic from the caller's point of view: either the whole
/// swap happens or (path not found) nothing does.
pub fn replace_at(args: &mut [Arg], path: &ArgPath, new_arg: Arg) -> bool {
    let mut segs = path.segments().iter();
    let top_idx = match segs.next() {
        Some(PathSeg::Field(i)) => *i,
        _ => return false,
    };
    match args.get_mut(top_idx) {
        Some(top) => replace_at_rec(top, segs.as_slice(), new_arg),
        None => false,
    }
}

fn replace_at_rec(arg: &mut Arg, segs: &[PathSeg], new_arg: Arg) -> bool {
    match segs.split_first() {
        None => {
            *arg = new_arg;
            true
        }
        Some((PathSeg::Elem(i), rest)) => match arg {
            Arg::Group { elems, .. } => match elems.get_mut(*i) {
                Some(e) => replace_at_rec(e, rest, new_arg),
                None => false,
            },
            _ => false,
        },
        Some((PathSeg::Field(_), rest)) => match arg {
            Arg::Union { inner, .. } => replace_at_rec(inner, rest, new_arg),
            _ => false,
        },
        Some((PathSeg::Deref, rest)) => match arg {
            Arg::Pointer { target: PointerTarget::Address { pointee, .. }, .. } => {
                replace_at_rec(pointee, rest, new_arg)
            }
            _ => false,
        },
    }
}

/// Clear every Result-arg across the whole program whose producer is `id`,
/// resetting it to its resource type's default (spec §4.1: "remove a
/// producer... clears every consumer's handle to default and empties the
/// reverse set"). The reverse set itself needs no separate bookkeeping: it
/// is rebuilt from scratch by `ResourceGraph::build` on demand.
pub fn remove_producer(program: &mut Program, id: ResourceId) {
    for call in &mut program.calls {
        for arg in &mut call.args {
            clear_producer_rec(arg, id);
        }
    }
}

/// Remove the call at `idx`, first cascading `remove_producer` over every
/// resource id it produces so no consumer elsewhere is left dangling
/// (invariant 1). The Call-level Minimizer's every drop step goes through
/// this rather than a bare `Vec::remove`.
pub fn remove_call(program: &mut Program, idx: usize) {
    let mut single = HashSet::new();
    single.insert(idx);
    remove_calls(program, &single);
}

/// Bulk version of [`remove_call`]: removes every call whose index is in
/// `drop`, cascading resource cleanup for all of them against one shared
/// `ResourceGraph` snapshot before any index shifts.
pub fn remove_calls(program: &mut Program, drop: &HashSet<usize>) {
    let graph = ResourceGraph::build(program);
    for &idx in drop {
        for id in graph.ids_in_call(idx) {
            remove_producer(program, id);
        }
    }
    let mut i = 0usize;
    program.calls.retain(|_| {
        let keep = !drop.contains(&i);
        i += 1;
        keep
    });
}

fn clear_producer_rec(arg: &mut Arg, id: ResourceId) {
    match arg {
        Arg::Result { ty, value, producer, .. } => {
            if *producer == Some(id) {
                *producer = None;
                *value = ty.scalar_default();
            }
        }
        Arg::Group { elems, .. } => {
            for e in elems {
                clear_producer_rec(e, id);
            }
        }
        Arg::Union { inner, .. } => clear_producer_rec(inner, id),
        Arg::Pointer { target: PointerTarget::Address { pointee, .. }, .. } => {
            clear_producer_rec(pointee, id);
        }
        _ => {}
    }
}

/// Detach a single consumer argument from its producer without resetting
/// its value (spec §4.1: "remove a resource consumer (cleans the
/// producer's reverse set)"). Like the reverse set itself, this is a
/// structural no-op under the derived-graph representation: once `arg` is
/// no longer reachable from the program, `ResourceGraph::build` simply
/// won't see it as a consumer any more. Exposed for callers that want to
/// explicitly unlink a still-present argument from its producer.
pub fn detach_consumer(arg: &mut Arg) {
    if let Arg::Result { producer, .. } = arg {
        *producer = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_fixtures::two_resource_program;

    #[test]
    fn preorder_visits_root_then_children() {
        let prog = two_resource_program();
        let mut seen = Vec::new();
        visit_preorder(&prog.calls[1].args, &mut |_, _, path| seen.push(path.to_string()));
        assert!(!seen.is_empty());
        assert_eq!(seen[0], "-f0");
    }

    #[test]
    fn replace_at_root_swaps_whole_arg() {
        let mut prog = two_resource_program();
        let new_val = prog.calls[1].args[0].clone();
        assert!(replace_at(&mut prog.calls[0].args, &ArgPath::root(0), new_val.clone()));
        assert_eq!(prog.calls[0].args[0], new_val);
    }

    #[test]
    fn remove_producer_clears_dependent_consumers() {
        let mut prog = two_resource_program();
        let producer_id = match &prog.calls[0].args[0] {
            Arg::Result { id, .. } => *id,
            _ => panic!("expected Result arg"),
        };
        remove_producer(&mut prog, producer_id);
        match &prog.calls[1].args[0] {
            Arg::Result { producer, value, .. } => {
                assert_eq!(*producer, None);
                assert_eq!(*value, 0);
            }
            _ => panic!("expected Result arg"),
        }
    }
}
