//! Type descriptors: the shared, immutable schema that argument trees are
//! built against (spec §3, "Type descriptors").

use std::sync::Arc;

use super::predicate::Predicate;

/// Bit width of an integer/flag/pid argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum IntWidth {
    W8,
    W16,
    W32,
    W64,
}

impl IntWidth {
    /// Mask a raw value down to this width, as the wire format would.
    pub fn truncate(self, value: u64) -> u64 {
        match self {
            IntWidth::W8 => value & 0xff,
            IntWidth::W16 => value & 0xffff,
            IntWidth::W32 => value & 0xffff_ffff,
            IntWidth::W64 => value,
        }
    }
}

/// How an array's element count is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LenKind {
    FixedLen(usize),
    RandLen,
    RangeLen(usize, usize),
}

/// Kind of a Data (buffer) argument.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BufferKind {
    BlobRand,
    BlobRange(usize, usize),
    Filename { forbid_terminator: bool },
    Compressed,
}

/// A struct field or a union option: a name, its type, and (for struct
/// fields only) an optional conditional-presence predicate.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FieldDesc {
    pub name: String,
    pub ty: Arc<TypeDesc>,
    pub cond: Option<Predicate>,
    /// If set, this is an in-band size/length/offset field: its value must
    /// always equal the byte size of the sibling field at this declaration
    /// index (spec §4.2, invariant 2). Limited to a direct sibling rather
    /// than an arbitrary path — this spec's fixtures and the original
    /// implementation's common case never chain offsets through more than
    /// one level.
    pub size_of: Option<usize>,
}

impl FieldDesc {
    pub fn plain(name: impl Into<String>, ty: Arc<TypeDesc>) -> Self {
        FieldDesc { name: name.into(), ty, cond: None, size_of: None }
    }

    pub fn conditional(name: impl Into<String>, ty: Arc<TypeDesc>, cond: Predicate) -> Self {
        FieldDesc { name: name.into(), ty, cond: Some(cond), size_of: None }
    }

    pub fn size_field(name: impl Into<String>, ty: Arc<TypeDesc>, of_sibling: usize) -> Self {
        FieldDesc { name: name.into(), ty, cond: None, size_of: Some(of_sibling) }
    }
}

/// A resource type: a typed kernel handle produced by some calls and
/// consumed by others (spec §3, "Resource graph"; glossary "Resource").
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResourceDesc {
    pub name: String,
    pub default: u64,
    /// Names of syscalls whose schema can construct (produce) this
    /// resource; used to seed the influence matrix and for Stage D's
    /// resource-closure drop.
    pub compatible_ctors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TypeDesc {
    Int { width: IntWidth, default: u64 },
    Flags { width: IntWidth, default: u64 },
    Pid { width: IntWidth, default: u64, optional: bool },
    Pointer { pointee: Option<Arc<TypeDesc>> },
    Array { elem: Arc<TypeDesc>, kind: LenKind },
    Struct { fields: Vec<FieldDesc> },
    Union { options: Vec<FieldDesc> },
    Buffer { kind: BufferKind },
    Resource(ResourceDesc),
}

impl TypeDesc {
    /// The default scalar value a Const/Result argument of this type
    /// resets to during shrinking. Only meaningful for Int/Flags/Pid/Resource.
    pub fn scalar_default(&self) -> u64 {
        match self {
            TypeDesc::Int { default, .. }
            | TypeDesc::Flags { default, .. }
            | TypeDesc::Pid { default, .. } => *default,
            TypeDesc::Resource(r) => r.default,
            _ => 0,
        }
    }
}
