//! The Influence Matrix & Learner (spec §4.6): a dense bit relation over
//! syscall ids, seeded statically from shared resource types and updated
//! dynamically from coverage-hash divergence observed during Stage C.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use tracing::info;

use crate::model::SyscallTable;

const BITS_PER_WORD: usize = 64;

/// Dense `N x N` bit matrix, `M[s,d] = 1` meaning syscall `s` can causally
/// influence syscall `d` at a later position (spec §3). Backed by
/// word-packed atomics so dynamic learning (`fetch_or`, monotonic 0 -> 1)
/// needs no external lock, per §4.6's concurrency note and §9's "single
/// word-wise atomic-or" design note.
pub struct InfluenceMatrix {
    n: usize,
    words: Vec<AtomicU64>,
}

impl InfluenceMatrix {
    fn bit_index(&self, s: usize, d: usize) -> usize {
        s * self.n + d
    }

    fn empty(n: usize) -> Self {
        let word_count = ((n * n + BITS_PER_WORD - 1) / BITS_PER_WORD).max(1);
        InfluenceMatrix { n, words: (0..word_count).map(|_| AtomicU64::new(0)).collect() }
    }

    pub fn get(&self, s: usize, d: usize) -> bool {
        let bit = self.bit_index(s, d);
        let word = self.words[bit / BITS_PER_WORD].load(Ordering::Relaxed);
        (word >> (bit % BITS_PER_WORD)) & 1 == 1
    }

    /// Monotonic 0 -> 1 set. A no-op if already set (spec §4.6, §9).
    pub fn set(&self, s: usize, d: usize) {
        let bit = self.bit_index(s, d);
        let mask = 1u64 << (bit % BITS_PER_WORD);
        self.words[bit / BITS_PER_WORD].fetch_or(mask, Ordering::Relaxed);
    }

    pub fn syscall_count(&self) -> usize {
        self.n
    }

    /// Static construction (spec §4.6): for every typed resource, every
    /// (producer syscall, consumer syscall) pair with distinct ids gets a
    /// `1` bit. Consumers are every syscall whose schema takes that
    /// resource type as an argument anywhere in its top-level list;
    /// producers come from `ResourceDesc::compatible_ctors`.
    pub fn build_static(table: &SyscallTable) -> Arc<InfluenceMatrix> {
        let n = table.ids().map(|id| id as usize + 1).max().unwrap_or(0);
        let matrix = InfluenceMatrix::empty(n);

        for resource in resources_in(table) {
            let producers: Vec<u32> = resource
                .compatible_ctors
                .iter()
                .filter_map(|name| table.by_name(name).map(|m| m.id))
                .collect();
            let consumers: Vec<u32> =
                table.ids().filter(|&id| syscall_consumes(table, id, &resource.name)).collect();

            for &p in &producers {
                for &c in &consumers {
                    if p != c {
                        matrix.set(p as usize, c as usize);
                    }
                }
            }
        }

        Arc::new(matrix)
    }

    /// Dithering (spec §4.6): zero out a uniformly random `(100-p)/100`
    /// fraction of the currently-set ones. The seed is always logged
    /// (spec §9's Open Question is resolved this way, see SPEC_FULL §4.6).
    pub fn dither(&self, influence_proportion: u8, seed: u64) {
        info!(seed, influence_proportion, "dithering influence matrix with logged seed");
        let keep_fraction = influence_proportion.min(100) as f64 / 100.0;
        let mut rng = StdRng::seed_from_u64(seed);
        for s in 0..self.n {
            for d in 0..self.n {
                if self.get(s, d) && rng.gen::<f64>() >= keep_fraction {
                    self.clear(s, d);
                }
            }
        }
    }

    fn clear(&self, s: usize, d: usize) {
        let bit = self.bit_index(s, d);
        let mask = !(1u64 << (bit % BITS_PER_WORD));
        self.words[bit / BITS_PER_WORD].fetch_and(mask, Ordering::Relaxed);
    }

    /// Stage B's "relevant predecessors" set: closed BFS seeded with every
    /// `i < k0` directly influencing `k0`, then transitively closed
    /// backwards (spec §4.4).
    pub fn relevant_predecessors(&self, syscall_ids: &[u32], k0: usize) -> std::collections::HashSet<usize> {
        let mut relevant = std::collections::HashSet::new();
        let mut queue = VecDeque::new();

        for i in 0..k0 {
            if self.get(syscall_ids[i] as usize, syscall_ids[k0] as usize) {
                relevant.insert(i);
                queue.push_back(i);
            }
        }

        while let Some(i) = queue.pop_front() {
            for j in 0..i {
                if relevant.contains(&j) {
                    continue;
                }
                if self.get(syscall_ids[j] as usize, syscall_ids[i] as usize) {
                    relevant.insert(j);
                    queue.push_back(j);
                }
            }
        }

        relevant
    }
}

fn resources_in(table: &SyscallTable) -> Vec<crate::model::ResourceDesc> {
    use crate::model::TypeDesc;
    let mut seen = Vec::new();
    let mut names = std::collections::HashSet::new();
    for id in table.ids() {
        let Some(meta) = table.by_id(id) else { continue };
        for arg_ty in &meta.args {
            collect_resources(arg_ty, &mut seen, &mut names);
        }
    }
    seen
}

fn collect_resources(
    ty: &crate::model::TypeDesc,
    out: &mut Vec<crate::model::ResourceDesc>,
    seen: &mut std::collections::HashSet<String>,
) {
    use crate::model::TypeDesc;
    match ty {
        TypeDesc::Resource(r) => {
            if seen.insert(r.name.clone()) {
                out.push(r.clone());
            }
        }
        TypeDesc::Pointer { pointee: Some(inner) } => collect_resources(inner, out, seen),
        TypeDesc::Array { elem, .. } => collect_resources(elem, out, seen),
        TypeDesc::Struct { fields } | TypeDesc::Union { options: fields } => {
            for f in fields {
                collect_resources(&f.ty, out, seen);
            }
        }
        _ => {}
    }
}

fn syscall_consumes(table: &SyscallTable, id: u32, resource_name: &str) -> bool {
    let Some(meta) = table.by_id(id) else { return false };
    meta.args.iter().any(|ty| type_references(ty, resource_name))
}

fn type_references(ty: &crate::model::TypeDesc, resource_name: &str) -> bool {
    use crate::model::TypeDesc;
    match ty {
        TypeDesc::Resource(r) => r.name == resource_name,
        TypeDesc::Pointer { pointee: Some(inner) } => type_references(inner, resource_name),
        TypeDesc::Array { elem, .. } => type_references(elem, resource_name),
        TypeDesc::Struct { fields } | TypeDesc::Union { options: fields } => {
            fields.iter().any(|f| type_references(&f.ty, resource_name))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_fixtures::syscall_table;

    #[test]
    fn static_build_links_producer_to_consumer() {
        let table = syscall_table();
        let matrix = InfluenceMatrix::build_static(&table);
        let open_r = table.by_name("open_r").unwrap().id;
        let use_r = table.by_name("use_r").unwrap().id;
        let mk_f = table.by_name("mk_f").unwrap().id;
        assert!(matrix.get(open_r as usize, use_r as usize));
        assert!(!matrix.get(mk_f as usize, use_r as usize));
    }

    #[test]
    fn set_is_monotonic_and_idempotent() {
        let matrix = InfluenceMatrix::empty(4);
        assert!(!matrix.get(1, 2));
        matrix.set(1, 2);
        assert!(matrix.get(1, 2));
        matrix.set(1, 2);
        assert!(matrix.get(1, 2));
    }

    #[test]
    fn relevant_predecessors_closes_transitively() {
        let matrix = InfluenceMatrix::empty(4);
        // 0 -> 1 -> 2, and 2 is k0.
        matrix.set(1, 2);
        matrix.set(0, 1);
        let ids = vec![0u32, 1, 2];
        let relevant = matrix.relevant_predecessors(&ids, 2);
        assert_eq!(relevant, std::collections::HashSet::from([0, 1]));
    }

    #[test]
    fn dither_full_proportion_keeps_everything() {
        let matrix = InfluenceMatrix::empty(4);
        matrix.set(0, 1);
        matrix.dither(100, 42);
        assert!(matrix.get(0, 1));
    }

    #[test]
    fn dither_zero_proportion_clears_everything() {
        let matrix = InfluenceMatrix::empty(4);
        matrix.set(0, 1);
        matrix.dither(0, 42);
        assert!(!matrix.get(0, 1));
    }
}
