//! The Typed Argument Model (spec §4.1): argument variants, type
//! descriptors, the resource graph, and the operations the rest of the
//! engine mutates programs through.

pub mod arg;
pub mod path;
pub mod predicate;
pub mod program;
pub mod resource;
pub mod test_fixtures;
pub mod types;
pub mod visit;

pub use arg::{Arg, Dir, PointerTarget, SpecialPointer};
pub use path::{ArgPath, PathSeg};
pub use predicate::{CmpOp, Expr, Predicate, PredicateError};
pub use program::{Call, CallProps, CallTelemetry, Program, SyscallMeta, SyscallTable};
pub use resource::{ResourceGraph, ResourceId, ResourceIdGen, ResourceLoc};
pub use types::{BufferKind, FieldDesc, IntWidth, LenKind, ResourceDesc, TypeDesc};
pub use visit::{get_at, remove_call, remove_calls, remove_producer, replace_at, visit_preorder};
