//! Programs, calls, and call properties (spec §3).

use std::collections::HashMap;
use std::sync::Arc;

use super::arg::Arg;
use super::types::TypeDesc;

/// A call's stable syscall metadata handle (spec §3, "Call").
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SyscallMeta {
    pub name: String,
    pub id: u32,
    pub args: Vec<Arc<TypeDesc>>,
    pub no_minimize: bool,
}

/// Immutable, name-indexed registry of syscall metadata, built once at
/// startup and shared across sessions (SPEC_FULL §3, "Syscall metadata
/// registry").
#[derive(Debug, Default)]
pub struct SyscallTable {
    by_name: HashMap<String, Arc<SyscallMeta>>,
    by_id: HashMap<u32, Arc<SyscallMeta>>,
}

impl SyscallTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, meta: SyscallMeta) -> Arc<SyscallMeta> {
        let meta = Arc::new(meta);
        self.by_name.insert(meta.name.clone(), Arc::clone(&meta));
        self.by_id.insert(meta.id, Arc::clone(&meta));
        meta
    }

    pub fn by_name(&self, name: &str) -> Option<Arc<SyscallMeta>> {
        self.by_name.get(name).cloned()
    }

    pub fn by_id(&self, id: u32) -> Option<Arc<SyscallMeta>> {
        self.by_id.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.by_id.keys().copied()
    }
}

/// Fault-injection and rerun knobs, independent of the argument tree
/// (spec §3, "Call properties"). Default = all zero/false.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CallProps {
    pub fail_nth: u64,
    pub r#async: bool,
    pub rerun: u64,
}

/// Per-call telemetry observed during the *last* oracle invocation that
/// touched this call (spec §3: "during minimization only"). Not part of a
/// program's committed identity — cleared on every clone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CallTelemetry {
    pub cov_hash: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Call {
    pub meta: Arc<SyscallMeta>,
    pub args: Vec<Arg>,
    pub props: CallProps,
    pub telemetry: Option<CallTelemetry>,
}

impl Call {
    pub fn new(meta: Arc<SyscallMeta>, args: Vec<Arg>) -> Self {
        Call { meta, args, props: CallProps::default(), telemetry: None }
    }
}

/// Ordered sequence of calls (spec §3, "Program"). `target` is an opaque tag
/// identifying which `SyscallTable`/resource universe the program was built
/// against (SPEC_FULL §3), used only to catch cross-target session misuse.
///
/// `Program` and everything reachable from it derive `Serialize`/
/// `Deserialize` so a host's `Codec` impl can hand the CLI's JSON transport a
/// free round trip; the engine itself never imports `serde_json`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Program {
    pub target: String,
    pub calls: Vec<Call>,
}

impl Program {
    pub fn new(target: impl Into<String>, calls: Vec<Call>) -> Self {
        Program { target: target.into(), calls }
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Deep copy. Resource ids are plain `Copy` values, so no pointer-
    /// identity remapping is needed to keep the resource graph consistent
    /// after the clone (spec §4.1; see `model::resource` doc comment).
    #[must_use]
    pub fn deep_clone(&self) -> Program {
        self.clone()
    }
}
