//! Shared test fixtures: the five-pseudo-syscall universe from spec §8
//! (`open_r`, `use_r`, `mk_f`, `use_f`, `noop`), exposed so both this
//! crate's unit tests and its `tests/` integration tests can build small
//! programs against the same schema without duplicating it.
//!
//! Not behind `#[cfg(test)]` so integration tests (a separate compilation
//! unit) can reach it too — mirrors the teacher's dedicated testing crate,
//! scaled down to a module.

use std::sync::Arc;

use super::arg::{Arg, Dir, PointerTarget};
use super::program::{Call, Program, SyscallMeta, SyscallTable};
use super::resource::ResourceIdGen;
use super::types::{BufferKind, IntWidth, LenKind, ResourceDesc, TypeDesc};

pub const FD_DEFAULT: u64 = 0xffff_ffff;

pub fn fd_resource_ty() -> Arc<TypeDesc> {
    Arc::new(TypeDesc::Resource(ResourceDesc {
        name: "fd".to_string(),
        default: FD_DEFAULT,
        compatible_ctors: vec!["open_r".to_string()],
    }))
}

pub fn filename_resource_ty() -> Arc<TypeDesc> {
    Arc::new(TypeDesc::Resource(ResourceDesc {
        name: "filename".to_string(),
        default: 0,
        compatible_ctors: vec!["mk_f".to_string()],
    }))
}

/// Builds the registry used throughout this crate's tests: `open_r -> R`,
/// `use_r(R)`, `mk_f -> F`, `use_f(F)`, `noop`.
pub fn syscall_table() -> SyscallTable {
    let mut table = SyscallTable::new();
    table.register(SyscallMeta {
        name: "open_r".to_string(),
        id: 1,
        args: vec![fd_resource_ty()],
        no_minimize: false,
    });
    table.register(SyscallMeta {
        name: "use_r".to_string(),
        id: 2,
        args: vec![fd_resource_ty()],
        no_minimize: false,
    });
    table.register(SyscallMeta {
        name: "mk_f".to_string(),
        id: 3,
        args: vec![filename_resource_ty()],
        no_minimize: false,
    });
    table.register(SyscallMeta {
        name: "use_f".to_string(),
        id: 4,
        args: vec![filename_resource_ty()],
        no_minimize: false,
    });
    table.register(SyscallMeta { name: "noop".to_string(), id: 5, args: vec![], no_minimize: false });
    table
}

pub fn call_open_r(ids: &mut ResourceIdGen, meta: &SyscallTable) -> (Call, super::resource::ResourceId) {
    let id = ids.next();
    let call = Call::new(
        meta.by_name("open_r").unwrap(),
        vec![Arg::Result { ty: fd_resource_ty(), dir: Dir::Out, value: 3, id, producer: None }],
    );
    (call, id)
}

pub fn call_use_r(
    meta: &SyscallTable,
    producer: Option<super::resource::ResourceId>,
    value: u64,
    fresh_id: super::resource::ResourceId,
) -> Call {
    Call::new(
        meta.by_name("use_r").unwrap(),
        vec![Arg::Result { ty: fd_resource_ty(), dir: Dir::In, value, id: fresh_id, producer }],
    )
}

pub fn call_noop(meta: &SyscallTable) -> Call {
    Call::new(meta.by_name("noop").unwrap(), vec![])
}

/// `[open_r, use_r(R0)]`: the minimal producer/consumer pair, for resource
/// graph unit tests.
pub fn two_resource_program() -> Program {
    let table = syscall_table();
    let mut ids = ResourceIdGen::default();
    let (open_call, open_id) = call_open_r(&mut ids, &table);
    let use_call = call_use_r(&table, Some(open_id), 3, ids.next());
    Program::new("test", vec![open_call, use_call])
}

/// A call with one `RandLen` array argument of the given element values,
/// for argument-shrinking tests (spec §8 scenario 4).
pub fn call_with_rand_array(meta: &SyscallTable, name: &str, elems: Vec<u64>) -> Call {
    let elem_ty = Arc::new(TypeDesc::Int { width: IntWidth::W32, default: 0 });
    let arr_ty = Arc::new(TypeDesc::Array { elem: Arc::clone(&elem_ty), kind: LenKind::RandLen });
    let group = Arg::Group {
        ty: arr_ty,
        dir: Dir::In,
        elems: elems
            .into_iter()
            .map(|v| Arg::Const { ty: Arc::clone(&elem_ty), dir: Dir::In, value: v })
            .collect(),
    };
    Call::new(meta.by_name(name).unwrap(), vec![group])
}

/// A call with one pointer argument to a Const integer, for pointer-to-NULL
/// shrinking tests (spec §8 scenario 5).
pub fn call_with_pointer_to_int(meta: &SyscallTable, name: &str, value: u64) -> Call {
    let int_ty = Arc::new(TypeDesc::Int { width: IntWidth::W32, default: 0 });
    let ptr_ty = Arc::new(TypeDesc::Pointer { pointee: Some(Arc::clone(&int_ty)) });
    let arg = Arg::Pointer {
        ty: ptr_ty,
        dir: Dir::In,
        target: PointerTarget::Address {
            addr: 0x1000,
            pointee: Box::new(Arg::Const { ty: int_ty, dir: Dir::In, value }),
        },
    };
    Call::new(meta.by_name(name).unwrap(), vec![arg])
}

/// A call with one blob buffer argument, for buffer-halving tests (spec §8
/// scenario 6).
pub fn call_with_blob(meta: &SyscallTable, name: &str, len: usize, range_begin: usize) -> Call {
    let ty = Arc::new(TypeDesc::Buffer { kind: BufferKind::BlobRange(range_begin, len.max(range_begin)) });
    let arg = Arg::Data { ty, dir: Dir::In, bytes: vec![0xAA; len], terminator: false };
    Call::new(meta.by_name(name).unwrap(), vec![arg])
}
