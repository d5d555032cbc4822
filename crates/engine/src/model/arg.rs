//! The argument tree (spec §3, "Argument tree"): one value per declared
//! parameter, tagged by direction and backed by a shared type descriptor.

use std::sync::Arc;

use super::resource::ResourceId;
use super::types::TypeDesc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Dir {
    In,
    Out,
    InOut,
}

/// A special pointer value used in place of a concrete pointee (glossary:
/// "Special pointer"). NULL is the reserved sentinel at index 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SpecialPointer {
    Null,
    Unmapped,
    NonCanonical,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PointerTarget {
    Address { addr: u64, pointee: Box<Arg> },
    Special(SpecialPointer),
}

/// A value of one of the six argument-tree variants (spec §3 table).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Arg {
    Const { ty: Arc<TypeDesc>, dir: Dir, value: u64 },
    Pointer { ty: Arc<TypeDesc>, dir: Dir, target: PointerTarget },
    Group { ty: Arc<TypeDesc>, dir: Dir, elems: Vec<Arg> },
    Union { ty: Arc<TypeDesc>, dir: Dir, option: usize, inner: Box<Arg> },
    Data { ty: Arc<TypeDesc>, dir: Dir, bytes: Vec<u8>, terminator: bool },
    Result { ty: Arc<TypeDesc>, dir: Dir, value: u64, id: ResourceId, producer: Option<ResourceId> },
}

impl Arg {
    pub fn ty(&self) -> &Arc<TypeDesc> {
        match self {
            Arg::Const { ty, .. }
            | Arg::Pointer { ty, .. }
            | Arg::Group { ty, .. }
            | Arg::Union { ty, .. }
            | Arg::Data { ty, .. }
            | Arg::Result { ty, .. } => ty,
        }
    }

    pub fn dir(&self) -> Dir {
        match self {
            Arg::Const { dir, .. }
            | Arg::Pointer { dir, .. }
            | Arg::Group { dir, .. }
            | Arg::Union { dir, .. }
            | Arg::Data { dir, .. }
            | Arg::Result { dir, .. } => *dir,
        }
    }
}

// `PartialEq`/`Eq` on `Arg` intentionally ignore nothing — two args are
// equal iff their full committed state (including resource ids) matches.
// This backs the "no-op shrink is skipped without consulting the oracle"
// rule (spec §7): a proposal is compared against the baseline before it is
// ever handed to the oracle.
