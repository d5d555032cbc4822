//! The Size Patcher (spec §4.2): after any structural mutation, re-walk a
//! call's argument tree and (a) assign every length/size/offset field the
//! current concrete size of its referent, (b) evaluate each conditional
//! field's predicate and insert or remove it accordingly.

use std::collections::HashMap;
use std::sync::Arc;

use crate::model::{Arg, ArgPath, Call, Dir, FieldDesc, PathSeg, PointerTarget, TypeDesc};

/// Byte size of a concrete argument, as the wire serializer would compute it
/// (spec §4.2: "the actual byte size of its target").
pub fn byte_size(arg: &Arg) -> u64 {
    match arg {
        Arg::Const { ty, .. } => int_width_bytes(ty),
        Arg::Pointer { .. } => 8,
        Arg::Group { elems, .. } => elems.iter().map(byte_size).sum(),
        Arg::Union { inner, .. } => byte_size(inner),
        Arg::Data { bytes, .. } => bytes.len() as u64,
        Arg::Result { ty, .. } => int_width_bytes(ty),
    }
}

fn int_width_bytes(ty: &Arc<TypeDesc>) -> u64 {
    match ty.as_ref() {
        TypeDesc::Int { width, .. } | TypeDesc::Flags { width, .. } | TypeDesc::Pid { width, .. } => {
            match width {
                crate::model::IntWidth::W8 => 1,
                crate::model::IntWidth::W16 => 2,
                crate::model::IntWidth::W32 => 4,
                crate::model::IntWidth::W64 => 8,
            }
        }
        TypeDesc::Resource(_) => 4,
        _ => 8,
    }
}

fn scalar_value(arg: &Arg) -> u64 {
    match arg {
        Arg::Const { value, .. } | Arg::Result { value, .. } => *value,
        _ => byte_size(arg),
    }
}

/// Re-walks every top-level argument of `call`, assigning size fields and
/// re-evaluating conditional fields. Returns whether any conditional field
/// was inserted or removed — the Argument-level Minimizer uses this to
/// decide whether to restart its path memoization (spec §4.2, §4.5).
pub struct SizePatcher;

impl SizePatcher {
    pub fn patch(call: &mut Call) -> bool {
        let mut patched = false;
        let mut values: HashMap<ArgPath, u64> = HashMap::new();
        for (i, arg) in call.args.iter_mut().enumerate() {
            let path = ArgPath::root(i);
            patched |= patch_arg(arg, &path, &mut values);
        }
        patched
    }
}

fn patch_arg(arg: &mut Arg, path: &ArgPath, values: &mut HashMap<ArgPath, u64>) -> bool {
    let mut patched = false;
    match arg {
        Arg::Group { ty, elems, .. } => {
            if let TypeDesc::Struct { fields } = ty.as_ref().clone() {
                patched |= patch_struct(&fields, elems, path, values);
            } else {
                for (i, e) in elems.iter_mut().enumerate() {
                    patched |= patch_arg(e, &path.child(PathSeg::Elem(i)), values);
                }
            }
        }
        Arg::Union { inner, .. } => {
            patched |= patch_arg(inner, &path.child(PathSeg::Field(0)), values);
        }
        Arg::Pointer { target: PointerTarget::Address { pointee, .. }, .. } => {
            patched |= patch_arg(pointee, &path.child(PathSeg::Deref), values);
        }
        _ => {}
    }
    values.insert(path.clone(), scalar_value(arg));
    patched
}

/// Rebuild a struct's present-field list in declaration order. Presence for
/// field `i` is decided from the constant/predicate table built out of
/// already-decided earlier sibling values; a size-tracking field's value is
/// (re)computed from its referent regardless of whether its presence
/// changed.
///
/// Assumes — as the original program's schemas do in every case this
/// minimizer exercises — that a conditional field's predicate only ever
/// references sibling fields declared *before* it, so replaying the
/// decision greedily against the previous elements, in order, reproduces
/// the exact previous association between declared fields and present
/// elements (see `FieldDesc::size_of` doc comment for the matching
/// limitation on offset chains).
fn patch_struct(
    fields: &[FieldDesc],
    elems: &mut Vec<Arg>,
    base: &ArgPath,
    ancestor_values: &mut HashMap<ArgPath, u64>,
) -> bool {
    let mut old = std::mem::take(elems).into_iter();
    let mut consts: HashMap<String, u64> = HashMap::new();
    let mut sibling_values: HashMap<ArgPath, u64> = HashMap::new();
    // Maps a field's declaration index to its position in `new_elems`, so
    // `size_of` can reference a sibling by declaration index even when an
    // earlier conditional field was absent and shifted everything down.
    let mut position_of: HashMap<usize, usize> = HashMap::new();
    let mut new_elems = Vec::with_capacity(fields.len());
    let mut patched = false;

    for (i, field) in fields.iter().enumerate() {
        let present = match &field.cond {
            None => true,
            Some(pred) => pred.eval(&sibling_values, &consts),
        };

        if present {
            let mut value = match old.next() {
                Some(v) => v,
                None => {
                    patched = true;
                    default_arg(&field.ty)
                }
            };
            let child_path = base.child(PathSeg::Field(i));
            patched |= patch_arg(&mut value, &child_path, ancestor_values);

            if let Some(sibling_idx) = field.size_of {
                if let Some(&pos) = position_of.get(&sibling_idx) {
                    let size = byte_size(&new_elems[pos]);
                    set_scalar(&mut value, size);
                }
            }

            sibling_values.insert(ArgPath::root(i), scalar_value(&value));
            consts.insert(field.name.clone(), scalar_value(&value));
            position_of.insert(i, new_elems.len());
            new_elems.push(value);
        } else if old.clone().next().is_some() {
            // An old element exists but this field is no longer present:
            // consume (drop) it rather than shifting every later field's
            // matching out of alignment.
            let skipped = old.next();
            if skipped.is_some() {
                patched = true;
            }
        }
    }

    *elems = new_elems;
    patched
}

fn default_arg(ty: &Arc<TypeDesc>) -> Arg {
    match ty.as_ref() {
        TypeDesc::Int { default, .. } | TypeDesc::Flags { default, .. } | TypeDesc::Pid { default, .. } => {
            Arg::Const { ty: Arc::clone(ty), dir: Dir::In, value: *default }
        }
        TypeDesc::Resource(r) => {
            Arg::Result { ty: Arc::clone(ty), dir: Dir::In, value: r.default, id: crate::model::ResourceId(u64::MAX), producer: None }
        }
        TypeDesc::Pointer { .. } => Arg::Pointer {
            ty: Arc::clone(ty),
            dir: Dir::In,
            target: PointerTarget::Special(crate::model::SpecialPointer::Null),
        },
        TypeDesc::Array { .. } => Arg::Group { ty: Arc::clone(ty), dir: Dir::In, elems: vec![] },
        TypeDesc::Struct { fields } => {
            let elems = fields.iter().filter(|f| f.cond.is_none()).map(|f| default_arg(&f.ty)).collect();
            Arg::Group { ty: Arc::clone(ty), dir: Dir::In, elems }
        }
        TypeDesc::Union { options } => Arg::Union {
            ty: Arc::clone(ty),
            dir: Dir::In,
            option: 0,
            inner: Box::new(options.first().map(|f| default_arg(&f.ty)).unwrap_or(Arg::Const {
                ty: Arc::new(TypeDesc::Int { width: crate::model::IntWidth::W32, default: 0 }),
                dir: Dir::In,
                value: 0,
            })),
        },
        TypeDesc::Buffer { .. } => Arg::Data { ty: Arc::clone(ty), dir: Dir::In, bytes: vec![], terminator: false },
    }
}

fn set_scalar(arg: &mut Arg, new_value: u64) {
    match arg {
        Arg::Const { value, .. } | Arg::Result { value, .. } => *value = new_value,
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IntWidth, Predicate, SyscallMeta, SyscallTable};

    fn struct_with_optional_field() -> Arc<TypeDesc> {
        let int_ty = Arc::new(TypeDesc::Int { width: IntWidth::W32, default: 0 });
        let kind_field = FieldDesc::plain("kind", Arc::clone(&int_ty));
        let opt_field = FieldDesc::conditional(
            "extra",
            Arc::clone(&int_ty),
            Predicate::parse("kind == 1").unwrap(),
        );
        Arc::new(TypeDesc::Struct { fields: vec![kind_field, opt_field] })
    }

    fn call_with(ty: Arc<TypeDesc>, elems: Vec<Arg>) -> Call {
        let mut table = SyscallTable::new();
        table.register(SyscallMeta { name: "s".into(), id: 9, args: vec![Arc::clone(&ty)], no_minimize: false });
        Call::new(table.by_name("s").unwrap(), vec![Arg::Group { ty, dir: Dir::In, elems }])
    }

    #[test]
    fn conditional_field_is_removed_when_predicate_false() {
        let ty = struct_with_optional_field();
        let mut call = call_with(
            ty.clone(),
            vec![
                Arg::Const { ty: Arc::new(TypeDesc::Int { width: IntWidth::W32, default: 0 }), dir: Dir::In, value: 1 },
                Arg::Const { ty: Arc::new(TypeDesc::Int { width: IntWidth::W32, default: 0 }), dir: Dir::In, value: 42 },
            ],
        );
        // Flip kind to 2 so the "extra" field's predicate goes false.
        if let Arg::Group { elems, .. } = &mut call.args[0] {
            if let Arg::Const { value, .. } = &mut elems[0] {
                *value = 2;
            }
        }
        let patched = SizePatcher::patch(&mut call);
        assert!(patched);
        if let Arg::Group { elems, .. } = &call.args[0] {
            assert_eq!(elems.len(), 1);
        } else {
            panic!("expected group");
        }
    }

    #[test]
    fn conditional_field_is_inserted_when_predicate_true() {
        let ty = struct_with_optional_field();
        let mut call = call_with(
            ty.clone(),
            vec![Arg::Const {
                ty: Arc::new(TypeDesc::Int { width: IntWidth::W32, default: 0 }),
                dir: Dir::In,
                value: 2,
            }],
        );
        if let Arg::Group { elems, .. } = &mut call.args[0] {
            if let Arg::Const { value, .. } = &mut elems[0] {
                *value = 1;
            }
        }
        let patched = SizePatcher::patch(&mut call);
        assert!(patched);
        if let Arg::Group { elems, .. } = &call.args[0] {
            assert_eq!(elems.len(), 2);
        } else {
            panic!("expected group");
        }
    }

    #[test]
    fn size_field_tracks_referent_byte_size() {
        let int_ty = Arc::new(TypeDesc::Int { width: IntWidth::W32, default: 0 });
        let buf_ty = Arc::new(TypeDesc::Buffer { kind: crate::model::BufferKind::BlobRand });
        let data_field = FieldDesc::plain("data", Arc::clone(&buf_ty));
        let size_field = FieldDesc::size_field("len", Arc::clone(&int_ty), 0);
        let struct_ty = Arc::new(TypeDesc::Struct { fields: vec![data_field, size_field] });

        let mut call = call_with(
            struct_ty,
            vec![
                Arg::Data { ty: buf_ty, dir: Dir::In, bytes: vec![1, 2, 3, 4, 5], terminator: false },
                Arg::Const { ty: int_ty, dir: Dir::In, value: 0 },
            ],
        );
        SizePatcher::patch(&mut call);
        if let Arg::Group { elems, .. } = &call.args[0] {
            if let Arg::Const { value, .. } = &elems[1] {
                assert_eq!(*value, 5);
            } else {
                panic!("expected const size field");
            }
        }
    }

    #[test]
    fn unconditional_struct_is_unpatched() {
        let int_ty = Arc::new(TypeDesc::Int { width: IntWidth::W32, default: 0 });
        let ty = Arc::new(TypeDesc::Struct { fields: vec![FieldDesc::plain("a", Arc::clone(&int_ty))] });
        let mut call = call_with(ty, vec![Arg::Const { ty: int_ty, dir: Dir::In, value: 7 }]);
        assert!(!SizePatcher::patch(&mut call));
    }
}
