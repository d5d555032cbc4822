//! Argument paths: the keys `tried_paths` is built from, and the addressing
//! scheme the pre-order visitor and the size patcher both walk.

use std::fmt;

/// One step down an argument tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum PathSeg {
    /// A named struct field or the chosen union option, by declaration index.
    Field(usize),
    /// An array element, by current index.
    Elem(usize),
    /// Into a pointer's pointee.
    Deref,
}

impl fmt::Display for PathSeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Field indices are letter-prefixed so they never collide, as a
            // string key, with an array-element index at the same depth.
            PathSeg::Field(i) => write!(f, "-f{i}"),
            PathSeg::Elem(i) => write!(f, "-{i}"),
            PathSeg::Deref => write!(f, ">"),
        }
    }
}

/// Path to an argument within a single call's top-level argument list.
///
/// Rendered as `-fieldA-fieldB-3`-style strings (§9 design notes); `Deref`
/// renders as a trailing `>` so pointer-to-NULL shrinks are distinguishable
/// from struct-field shrinks at the same numeric offset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ArgPath {
    segs: Vec<PathSeg>,
}

impl ArgPath {
    pub fn root(top_level_index: usize) -> Self {
        ArgPath { segs: vec![PathSeg::Field(top_level_index)] }
    }

    #[must_use]
    pub fn child(&self, seg: PathSeg) -> Self {
        let mut segs = self.segs.clone();
        segs.push(seg);
        ArgPath { segs }
    }

    pub fn segments(&self) -> &[PathSeg] {
        &self.segs
    }
}

impl fmt::Display for ArgPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for seg in &self.segs {
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_field_and_index_path() {
        let p = ArgPath::root(0).child(PathSeg::Field(2)).child(PathSeg::Elem(3));
        assert_eq!(p.to_string(), "-f0-f2-3");
    }

    #[test]
    fn deref_suffix_is_distinguishable() {
        let p = ArgPath::root(1).child(PathSeg::Deref);
        assert_eq!(p.to_string(), "-f1>");
    }

    #[test]
    fn distinct_paths_hash_differently() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(ArgPath::root(0).child(PathSeg::Field(1)));
        set.insert(ArgPath::root(0).child(PathSeg::Elem(1)));
        assert_eq!(set.len(), 2);
    }
}
