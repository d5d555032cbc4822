//! The Argument-level Minimizer (spec §4.5): depth-first, path-memoized
//! shrinking over one call's argument tree, dispatched by type variant.

use std::collections::HashSet;

use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::model::{self, Arg, ArgPath, BufferKind, LenKind, PathSeg, PointerTarget, Program, TypeDesc};
use crate::oracle::{Codec, Oracle, OracleAdapter, StepKind, Target};
use crate::sizepatch::SizePatcher;

/// Crash-mode (spec §8, boundary behaviors) disables array element removal,
/// integer/flag/resource shrinking, and stops buffer halving after the
/// first reject.
pub struct ArgMinimizer<'a, O, T, C> {
    adapter: &'a mut OracleAdapter<O, T, C>,
    crash_mode: bool,
}

/// Whether a committed step also restructured the call (inserted/removed a
/// conditional field, changed an array's length, nulled a pointer): such
/// commits invalidate every previously tried path, per §9's design note.
type Structural = bool;

impl<'a, O: Oracle, T: Target, C: Codec> ArgMinimizer<'a, O, T, C> {
    pub fn new(adapter: &'a mut OracleAdapter<O, T, C>, crash_mode: bool) -> Self {
        ArgMinimizer { adapter, crash_mode }
    }

    /// Shrink one surviving call to a local fixpoint of the shrink steps
    /// (spec §4.5). No-op for `no_minimize` calls.
    pub fn minimize_call(&mut self, program: &mut Program, call_idx: usize, k: i64) -> EngineResult<()> {
        if program.calls[call_idx].meta.no_minimize {
            return Ok(());
        }

        let mut tried: HashSet<String> = HashSet::new();
        loop {
            let top_level = program.calls[call_idx].args.len();
            let mut committed = None;
            for i in 0..top_level {
                let path = ArgPath::root(i);
                if let Some(structural) = self.shrink_at(program, call_idx, &path, &mut tried, k)? {
                    committed = Some(structural);
                    break;
                }
            }
            match committed {
                Some(true) => {
                    tried.clear();
                }
                Some(false) => {}
                None => break,
            }
        }
        Ok(())
    }

    fn shrink_at(
        &mut self,
        program: &mut Program,
        call_idx: usize,
        path: &ArgPath,
        tried: &mut HashSet<String>,
        k: i64,
    ) -> EngineResult<Option<Structural>> {
        let arg = model::get_at(&program.calls[call_idx].args, path)
            .expect("path produced by this call's own traversal")
            .clone();

        match &arg {
            Arg::Group { ty, elems, .. } => match ty.as_ref() {
                TypeDesc::Array { kind, .. } => {
                    self.shrink_array(program, call_idx, path, elems.len(), *kind, tried, k)
                }
                TypeDesc::Struct { fields } => {
                    for i in 0..fields.len().min(elems.len()) {
                        let child = path.child(PathSeg::Field(i));
                        if let Some(s) = self.shrink_at(program, call_idx, &child, tried, k)? {
                            return Ok(Some(s));
                        }
                    }
                    Ok(None)
                }
                _ => Ok(None),
            },
            Arg::Union { .. } => {
                let child = path.child(PathSeg::Field(0));
                self.shrink_at(program, call_idx, &child, tried, k)
            }
            Arg::Pointer { target, .. } => self.shrink_pointer(program, call_idx, path, target, tried, k),
            Arg::Const { ty, value, dir, .. } => {
                self.shrink_const(program, call_idx, path, ty, *value, *dir, tried, k)
            }
            Arg::Data { ty, dir, bytes, terminator } => {
                self.shrink_data(program, call_idx, path, ty, *dir, bytes, *terminator, tried, k)
            }
            Arg::Result { value, .. } => self.shrink_resource(program, call_idx, path, *value, tried, k),
        }
    }

    fn shrink_array(
        &mut self,
        program: &mut Program,
        call_idx: usize,
        path: &ArgPath,
        len: usize,
        kind: LenKind,
        tried: &mut HashSet<String>,
        k: i64,
    ) -> EngineResult<Option<Structural>> {
        if self.crash_mode {
            return self.recurse_into_elements(program, call_idx, path, len, tried, k);
        }

        let lo = match kind {
            LenKind::FixedLen(_) => {
                return self.recurse_into_elements(program, call_idx, path, len, tried, k);
            }
            LenKind::RandLen => 0,
            LenKind::RangeLen(lo, _) => lo,
        };

        let path_key = path.to_string();
        if len >= 3 && lo == 0 && !tried.contains(&path_key) {
            let current = model::get_at(&program.calls[call_idx].args, path).unwrap();
            let empty_arg = Arg::Group { ty: current.ty().clone(), dir: current.dir(), elems: vec![] };
            if let Some(s) = self.try_commit(program, call_idx, path, empty_arg, k)? {
                return Ok(Some(s));
            }
            tried.insert(path_key);
        }

        for idx in (0..len).rev() {
            let new_len = idx;
            if new_len < lo {
                continue;
            }
            let elem_path = path.child(PathSeg::Elem(idx));
            let elem_key = format!("{elem_path}-remove");
            if tried.contains(&elem_key) {
                continue;
            }
            let current = model::get_at(&program.calls[call_idx].args, path).unwrap().clone();
            let Arg::Group { ty, dir, mut elems } = current else { unreachable!() };
            elems.remove(idx);
            if let Some(s) =
                self.try_commit(program, call_idx, path, Arg::Group { ty, dir, elems }, k)?
            {
                return Ok(Some(s));
            }
            tried.insert(elem_key);
        }

        self.recurse_into_elements(program, call_idx, path, len, tried, k)
    }

    fn recurse_into_elements(
        &mut self,
        program: &mut Program,
        call_idx: usize,
        path: &ArgPath,
        len: usize,
        tried: &mut HashSet<String>,
        k: i64,
    ) -> EngineResult<Option<Structural>> {
        for idx in 0..len {
            let child = path.child(PathSeg::Elem(idx));
            if let Some(s) = self.shrink_at(program, call_idx, &child, tried, k)? {
                return Ok(Some(s));
            }
        }
        Ok(None)
    }

    fn shrink_pointer(
        &mut self,
        program: &mut Program,
        call_idx: usize,
        path: &ArgPath,
        target: &PointerTarget,
        tried: &mut HashSet<String>,
        k: i64,
    ) -> EngineResult<Option<Structural>> {
        if !matches!(target, PointerTarget::Address { .. }) {
            return Ok(None);
        }
        let path_key = path.to_string();
        if !tried.contains(&path_key) {
            let current = model::get_at(&program.calls[call_idx].args, path).unwrap().clone();
            let Arg::Pointer { ty, dir, .. } = current else { unreachable!() };
            let null_arg = Arg::Pointer {
                ty,
                dir,
                target: PointerTarget::Special(crate::model::SpecialPointer::Null),
            };
            if let Some(s) = self.try_commit(program, call_idx, path, null_arg, k)? {
                return Ok(Some(s));
            }
            tried.insert(path_key);
        }

        let deref_path = path.child(PathSeg::Deref);
        self.shrink_at(program, call_idx, &deref_path, tried, k)
    }

    fn shrink_const(
        &mut self,
        program: &mut Program,
        call_idx: usize,
        path: &ArgPath,
        ty: &std::sync::Arc<TypeDesc>,
        value: u64,
        dir: crate::model::Dir,
        tried: &mut HashSet<String>,
        k: i64,
    ) -> EngineResult<Option<Structural>> {
        if self.crash_mode {
            return Ok(None);
        }
        if let TypeDesc::Pid { optional, .. } = ty.as_ref() {
            if !optional {
                return Ok(None);
            }
        }

        let default = ty.scalar_default();
        let path_key = path.to_string();
        if value == default || tried.contains(&path_key) {
            return Ok(None);
        }

        // The Size Patcher runs on every commit (via `try_commit`); if this
        // default-value substitution toggles a conditional sibling field,
        // the committed `Structural` flag tells the driving loop to clear
        // `tried_paths` and re-derive them against the new layout.
        let candidate_arg = Arg::Const { ty: ty.clone(), dir, value: default };
        match self.try_commit(program, call_idx, path, candidate_arg, k)? {
            Some(structural) => Ok(Some(structural)),
            None => {
                tried.insert(path_key);
                Ok(None)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn shrink_data(
        &mut self,
        program: &mut Program,
        call_idx: usize,
        path: &ArgPath,
        ty: &std::sync::Arc<TypeDesc>,
        dir: crate::model::Dir,
        bytes: &[u8],
        terminator: bool,
        tried: &mut HashSet<String>,
        k: i64,
    ) -> EngineResult<Option<Structural>> {
        match ty.as_ref() {
            TypeDesc::Buffer { kind: BufferKind::BlobRand } => {
                self.shrink_blob(program, call_idx, path, ty, dir, bytes, terminator, 0, tried, k)
            }
            TypeDesc::Buffer { kind: BufferKind::BlobRange(lo, _) } => {
                self.shrink_blob(program, call_idx, path, ty, dir, bytes, terminator, *lo, tried, k)
            }
            TypeDesc::Buffer { kind: BufferKind::Filename { forbid_terminator } } => {
                self.shrink_filename(
                    program, call_idx, path, ty, dir, bytes, terminator, *forbid_terminator, tried, k,
                )
            }
            TypeDesc::Buffer { kind: BufferKind::Compressed } => Err(EngineError::InvariantViolation(format!(
                "compressed buffer at {path} reached the argument minimizer; such calls must carry no_minimize"
            ))),
            _ => Ok(None),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn shrink_blob(
        &mut self,
        program: &mut Program,
        call_idx: usize,
        path: &ArgPath,
        ty: &std::sync::Arc<TypeDesc>,
        dir: crate::model::Dir,
        bytes: &[u8],
        terminator: bool,
        range_begin: usize,
        tried: &mut HashSet<String>,
        k: i64,
    ) -> EngineResult<Option<Structural>> {
        let path_key = path.to_string();
        if tried.contains(&path_key) {
            return Ok(None);
        }

        let mut cur_len = bytes.len();
        let mut step = cur_len.saturating_sub(range_begin);
        let mut committed_any = false;

        while step > 0 && cur_len > range_begin {
            let new_len = cur_len.saturating_sub(step).max(range_begin);
            if new_len == cur_len {
                step /= 2;
                continue;
            }
            let candidate_arg =
                Arg::Data { ty: ty.clone(), dir, bytes: bytes[..new_len].to_vec(), terminator };
            if self.try_commit(program, call_idx, path, candidate_arg, k)?.is_some() {
                cur_len = new_len;
                committed_any = true;
                continue;
            }
            if self.crash_mode {
                break;
            }
            step /= 2;
        }

        if committed_any {
            Ok(Some(false))
        } else {
            tried.insert(path_key);
            Ok(None)
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn shrink_filename(
        &mut self,
        program: &mut Program,
        call_idx: usize,
        path: &ArgPath,
        ty: &std::sync::Arc<TypeDesc>,
        dir: crate::model::Dir,
        bytes: &[u8],
        terminator: bool,
        forbid_terminator: bool,
        tried: &mut HashSet<String>,
        k: i64,
    ) -> EngineResult<Option<Structural>> {
        let path_key = path.to_string();
        if tried.contains(&path_key) {
            return Ok(None);
        }

        let trimmed_len = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        let mut new_bytes = bytes[..trimmed_len].to_vec();
        let new_terminator = if forbid_terminator {
            false
        } else {
            new_bytes.push(0);
            true
        };

        if new_bytes == bytes && new_terminator == terminator {
            tried.insert(path_key);
            return Ok(None);
        }

        let candidate_arg = Arg::Data { ty: ty.clone(), dir, bytes: new_bytes, terminator: new_terminator };
        match self.try_commit(program, call_idx, path, candidate_arg, k)? {
            Some(s) => Ok(Some(s)),
            None => {
                tried.insert(path_key);
                Ok(None)
            }
        }
    }

    fn shrink_resource(
        &mut self,
        program: &mut Program,
        call_idx: usize,
        path: &ArgPath,
        value: u64,
        tried: &mut HashSet<String>,
        k: i64,
    ) -> EngineResult<Option<Structural>> {
        if self.crash_mode {
            return Ok(None);
        }
        let path_key = path.to_string();
        if tried.contains(&path_key) {
            return Ok(None);
        }

        let current = model::get_at(&program.calls[call_idx].args, path).unwrap().clone();
        let Arg::Result { ty, dir, id, .. } = current else { return Ok(None) };
        if value == ty.scalar_default() {
            tried.insert(path_key);
            return Ok(None);
        }
        let default = ty.scalar_default();
        let candidate_arg = Arg::Result { ty, dir, value: default, id, producer: None };

        match self.try_commit(program, call_idx, path, candidate_arg, k)? {
            Some(s) => Ok(Some(s)),
            None => {
                tried.insert(path_key);
                Ok(None)
            }
        }
    }

    /// Build a candidate from the baseline, replace the argument at `path`,
    /// run the Size Patcher, and consult the oracle. Skips the oracle
    /// entirely when the proposal is identical to the baseline (spec §7:
    /// "no-op shrink... skipped without consulting the oracle").
    fn try_commit(
        &mut self,
        program: &mut Program,
        call_idx: usize,
        path: &ArgPath,
        new_arg: Arg,
        k: i64,
    ) -> EngineResult<Option<Structural>> {
        let old_arg = model::get_at(&program.calls[call_idx].args, path).unwrap();
        if *old_arg == new_arg {
            return Ok(None);
        }

        let mut candidate = program.deep_clone();
        model::replace_at(&mut candidate.calls[call_idx].args, path, new_arg);
        let patched = SizePatcher::patch(&mut candidate.calls[call_idx]);

        let accepted = self.adapter.check(&candidate, k, StepKind::ArgLevel, true)?;
        if accepted {
            debug!(call_idx, %path, patched, "argument-level commit");
            *program = candidate;
            Ok(Some(patched))
        } else {
            debug!(call_idx, %path, "argument-level reject");
            Ok(None)
        }
    }
}
