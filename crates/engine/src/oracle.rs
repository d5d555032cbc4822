//! The Oracle Adapter (spec §4.3): a thin contract over the host-supplied
//! equivalence predicate, plus the sanitize/structural-validate pass that
//! runs before every oracle consultation.

use crate::error::{EngineError, EngineResult};
use crate::model::{Call, Program, ResourceGraph};

/// Advisory tag carried on every oracle call so the host can break down its
/// minimization statistics (spec §6: "lets the host instrument
/// minimization statistics").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    CallLevel = 1,
    ArgLevel = 2,
}

/// Per-call coverage-hash telemetry optionally returned alongside an oracle
/// verdict (spec §4.3). Absence disables dynamic-influence learning.
#[derive(Debug, Clone)]
pub struct Telemetry {
    pub per_call_cov_hash: Vec<u32>,
    pub execution_reached: bool,
}

/// `pred(P, k, step_kind) -> Bool` (spec §6). Implementors may stash
/// telemetry from the most recent call and surface it via `telemetry()`.
pub trait Oracle {
    fn pred(&mut self, program: &Program, k: i64, step: StepKind) -> bool;

    fn telemetry(&self) -> Option<Telemetry> {
        None
    }

    /// Set once the oracle could not be consulted at all after exhausting
    /// its retry budget (spec §7), as opposed to returning a verdict.
    /// Checked by `OracleAdapter::check` after every `pred()` call.
    fn infrastructure_failure(&self) -> Option<String> {
        None
    }
}

/// Target-specific argument neutralization, run before every oracle call
/// (spec §6: `target.neutralize(call, fix_structure)`). An external
/// collaborator — the engine only depends on this trait.
pub trait Target {
    fn neutralize(&self, call: &mut Call, fix_structure: bool);
}

/// Program (de)serialization, an external collaborator (spec §1's
/// out-of-scope list; spec §6's round-trip contract). The adapter only
/// needs `serialize ∘ deserialize` to be the identity on any program it
/// is asked to validate.
pub trait Codec {
    fn serialize(&self, program: &Program) -> Vec<u8>;
    fn deserialize(&self, bytes: &[u8]) -> Result<Program, String>;
}

/// Runs the sanitize-then-validate pass (spec §4.3) before consulting the
/// wrapped oracle: neutralizes each call's arguments, checks the resource
/// graph has no dangling edges, and checks the serialization round-trip,
/// before finally asking `oracle.pred(...)`.
pub struct OracleAdapter<O, T, C> {
    oracle: O,
    target: T,
    codec: C,
    call_level_checks: usize,
    arg_level_checks: usize,
}

impl<O: Oracle, T: Target, C: Codec> OracleAdapter<O, T, C> {
    pub fn new(oracle: O, target: T, codec: C) -> Self {
        OracleAdapter { oracle, target, codec, call_level_checks: 0, arg_level_checks: 0 }
    }

    pub fn oracle_mut(&mut self) -> &mut O {
        &mut self.oracle
    }

    /// `(call_level, arg_level)` oracle-consultation counts so far, for the
    /// CLI's final summary line (spec §6: "a final summary line").
    pub fn check_counts(&self) -> (usize, usize) {
        (self.call_level_checks, self.arg_level_checks)
    }

    /// Sanitize, structurally validate, then consult the oracle.
    /// `fix_structure` is forwarded to the target's neutralization rules
    /// (spec §6: "if `fix_structure` is false, only value changes are
    /// allowed").
    pub fn check(
        &mut self,
        program: &Program,
        k: i64,
        step: StepKind,
        fix_structure: bool,
    ) -> EngineResult<bool> {
        match step {
            StepKind::CallLevel => self.call_level_checks += 1,
            StepKind::ArgLevel => self.arg_level_checks += 1,
        }

        let mut candidate = program.deep_clone();
        for call in &mut candidate.calls {
            self.target.neutralize(call, fix_structure);
        }

        let graph = ResourceGraph::build(&candidate);
        if !graph.dangling_refs().is_empty() {
            return Err(EngineError::InvariantViolation(
                "dangling resource reference before oracle consultation".to_string(),
            ));
        }

        let bytes = self.codec.serialize(&candidate);
        let round_tripped = self
            .codec
            .deserialize(&bytes)
            .map_err(EngineError::InvariantViolation)?;
        if round_tripped != candidate {
            return Err(EngineError::InvariantViolation(
                "serialize/deserialize round trip is not the identity".to_string(),
            ));
        }

        let verdict = self.oracle.pred(&candidate, k, step);
        if let Some(reason) = self.oracle.infrastructure_failure() {
            return Err(EngineError::OracleInfrastructureFailure(reason));
        }
        Ok(verdict)
    }

    pub fn telemetry(&self) -> Option<Telemetry> {
        self.oracle.telemetry()
    }
}

/// A no-op target used where no sanitization rules apply (tests, and any
/// schema with no harmful arguments to neutralize).
pub struct NullTarget;

impl Target for NullTarget {
    fn neutralize(&self, _call: &mut Call, _fix_structure: bool) {}
}

/// An in-memory scripted test double (spec §4.3: "an in-memory
/// `ScriptedOracle` test double used by the engine's own tests"). Replays a
/// queue of (accept, telemetry) answers in call order and records every
/// `(k, step_kind)` it was asked about.
#[derive(Default)]
pub struct ScriptedOracle {
    answers: std::collections::VecDeque<(bool, Option<Telemetry>)>,
    pub calls: Vec<(i64, StepKind)>,
    last_telemetry: Option<Telemetry>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        ScriptedOracle::default()
    }

    pub fn push_accept(&mut self) -> &mut Self {
        self.answers.push_back((true, None));
        self
    }

    pub fn push_reject(&mut self) -> &mut Self {
        self.answers.push_back((false, None));
        self
    }

    pub fn push_reject_with_telemetry(&mut self, telemetry: Telemetry) -> &mut Self {
        self.answers.push_back((false, Some(telemetry)));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.len()
    }
}

impl Oracle for ScriptedOracle {
    fn pred(&mut self, _program: &Program, k: i64, step: StepKind) -> bool {
        self.calls.push((k, step));
        match self.answers.pop_front() {
            Some((verdict, telemetry)) => {
                self.last_telemetry = telemetry;
                verdict
            }
            None => panic!("ScriptedOracle ran out of scripted answers"),
        }
    }

    fn telemetry(&self) -> Option<Telemetry> {
        self.last_telemetry.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_fixtures::two_resource_program;

    #[test]
    fn adapter_rejects_dangling_resource_reference() {
        let mut prog = two_resource_program();
        // Detach the consumer's producer reference from the graph without
        // clearing it, to simulate a structural bug surfacing as a dangling
        // reference.
        if let crate::model::Arg::Result { id, .. } = &mut prog.calls[0].args[0] {
            *id = crate::model::ResourceId(999);
        }
        let mut adapter = OracleAdapter::new(ScriptedOracle::new(), NullTarget, IdentityCodec);
        let result = adapter.check(&prog, 1, StepKind::CallLevel, true);
        assert!(result.is_err());
    }

    #[test]
    fn adapter_forwards_accept_to_oracle() {
        let prog = two_resource_program();
        let mut scripted = ScriptedOracle::new();
        scripted.push_accept();
        let mut adapter = OracleAdapter::new(scripted, NullTarget, IdentityCodec);
        let accepted = adapter.check(&prog, 1, StepKind::CallLevel, true).unwrap();
        assert!(accepted);
        assert_eq!(adapter.oracle_mut().call_count(), 1);
    }

    /// Test-only codec that really does round-trip, by cloning through a
    /// thread-local stash keyed by a counter baked into the "bytes".
    pub struct IdentityCodec;

    impl Codec for IdentityCodec {
        fn serialize(&self, program: &Program) -> Vec<u8> {
            STASH.with(|s| s.borrow_mut().replace(program.clone()));
            vec![0]
        }

        fn deserialize(&self, _bytes: &[u8]) -> Result<Program, String> {
            STASH.with(|s| s.borrow_mut().take()).ok_or_else(|| "no stashed program".to_string())
        }
    }

    thread_local! {
        static STASH: std::cell::RefCell<Option<Program>> = std::cell::RefCell::new(None);
    }
}
