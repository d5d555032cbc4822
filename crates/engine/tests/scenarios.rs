//! End-to-end scenarios (spec §8): the call-level and argument-level
//! minimizers driven against a `ScriptedOracle`, asserting the final
//! `(program, k)` rather than the exact oracle-call sequence — a commit's
//! downstream stage order is an implementation detail, not a contract.

use std::cell::RefCell;

use syzmini_engine::callmin::CallMinimizer;
use syzmini_engine::influence::InfluenceMatrix;
use syzmini_engine::model::test_fixtures::{
    call_noop, call_open_r, call_use_r, call_with_blob, call_with_pointer_to_int,
    call_with_rand_array, syscall_table,
};
use syzmini_engine::model::{Arg, CallTelemetry, PointerTarget, Program, ResourceIdGen};
use syzmini_engine::oracle::{Codec, NullTarget, OracleAdapter, ScriptedOracle, Telemetry};
use syzmini_engine::session::Session;

/// A `Codec` that really does round-trip, for tests — stashes the program
/// through a thread-local rather than serializing it, since the engine
/// crate carries no serialization dependency of its own.
struct CloneCodec;

impl Codec for CloneCodec {
    fn serialize(&self, program: &Program) -> Vec<u8> {
        STASH.with(|s| s.borrow_mut().replace(program.clone()));
        vec![0]
    }

    fn deserialize(&self, _bytes: &[u8]) -> Result<Program, String> {
        STASH.with(|s| s.borrow_mut().take()).ok_or_else(|| "no stashed program".to_string())
    }
}

thread_local! {
    static STASH: RefCell<Option<Program>> = RefCell::new(None);
}

fn adapter(oracle: ScriptedOracle) -> OracleAdapter<ScriptedOracle, NullTarget, CloneCodec> {
    OracleAdapter::new(oracle, NullTarget, CloneCodec)
}

#[test]
fn suffix_drop_removes_calls_after_the_failing_position() {
    let table = syscall_table();
    let program = Program::new(
        "test",
        vec![
            call_noop(&table),
            call_noop(&table),
            call_noop(&table),
            call_noop(&table),
            call_noop(&table),
        ],
    );

    let mut scripted = ScriptedOracle::new();
    scripted.push_accept(); // stage A: drop calls 2..5
    scripted.push_reject(); // stage B: keep call 0
    scripted.push_reject(); // stage C: keep call 0

    let mut adapter = adapter(scripted);
    let influence = InfluenceMatrix::build_static(&table);
    let mut call_min = CallMinimizer::new(&mut adapter, influence);

    let outcome = call_min.run(program, 1).unwrap();
    assert_eq!(outcome.k, 1);
    assert_eq!(outcome.program.len(), 2);
    assert!(!outcome.influence_learned);
}

#[test]
fn influence_guided_prefix_drop_removes_unrelated_predecessors() {
    let table = syscall_table();
    let mut ids = ResourceIdGen::default();
    let (open_call, open_id) = call_open_r(&mut ids, &table);
    let use_call = call_use_r(&table, Some(open_id), 3, ids.next());
    let program =
        Program::new("test", vec![open_call, call_noop(&table), call_noop(&table), use_call]);

    let mut scripted = ScriptedOracle::new();
    scripted.push_accept(); // stage B: drop the two unrelated noops
    scripted.push_reject(); // stage C: keep open_r

    let mut adapter = adapter(scripted);
    let influence = InfluenceMatrix::build_static(&table);
    let mut call_min = CallMinimizer::new(&mut adapter, influence);

    let outcome = call_min.run(program, 3).unwrap();
    assert_eq!(outcome.k, 1);
    assert_eq!(outcome.program.len(), 2);
    assert_eq!(outcome.program.calls[0].meta.name, "open_r");
    assert_eq!(outcome.program.calls[1].meta.name, "use_r");
}

#[test]
fn pairwise_drop_learns_influence_from_coverage_divergence() {
    let table = syscall_table();
    let noop_id = table.by_name("noop").unwrap().id;

    let mut program =
        Program::new("test", vec![call_noop(&table), call_noop(&table), call_noop(&table)]);
    program.calls[2].telemetry = Some(CallTelemetry { cov_hash: 77 });

    let mut scripted = ScriptedOracle::new();
    scripted.push_reject(); // stage B: keep the prefix (empty influence matrix)
    scripted.push_reject_with_telemetry(Telemetry {
        per_call_cov_hash: vec![10, 99],
        execution_reached: true,
    }); // stage C, i=1: reject removing the middle call, but coverage diverged
    scripted.push_reject(); // stage C, i=0: reject removing the first call

    let influence = InfluenceMatrix::build_static(&table);
    assert!(!influence.get(noop_id as usize, noop_id as usize));

    let mut adapter = adapter(scripted);
    let mut call_min = CallMinimizer::new(&mut adapter, influence.clone());

    let outcome = call_min.run(program, 2).unwrap();
    assert_eq!(outcome.k, 2);
    assert_eq!(outcome.program.len(), 3);
    assert!(outcome.influence_learned);
    assert!(influence.get(noop_id as usize, noop_id as usize));
}

#[test]
fn array_shrink_removes_unneeded_elements() {
    let table = syscall_table();
    let call = call_with_rand_array(&table, "noop", vec![1, 2, 3, 4]);
    let program = Program::new("test", vec![call]);

    let mut scripted = ScriptedOracle::new();
    scripted.push_reject(); // reject emptying the whole array
    scripted.push_accept(); // drop element 4
    scripted.push_accept(); // drop element 3
    scripted.push_accept(); // drop element 2
    scripted.push_reject(); // reject emptying the last element
    scripted.push_reject(); // reject defaulting element 1 to 0

    let mut adapter = adapter(scripted);
    let influence = InfluenceMatrix::build_static(&table);
    let mut session = Session::new(&mut adapter, influence);

    let outcome = session.minimize(program, 0, false).unwrap();
    let Arg::Group { elems, .. } = &outcome.program.calls[0].args[0] else {
        panic!("expected the array argument to survive as a Group");
    };
    assert_eq!(elems.len(), 1);
    assert!(matches!(elems[0], Arg::Const { value: 1, .. }));
}

#[test]
fn pointer_shrinks_to_null() {
    let table = syscall_table();
    let call = call_with_pointer_to_int(&table, "noop", 42);
    let program = Program::new("test", vec![call]);

    let mut scripted = ScriptedOracle::new();
    scripted.push_accept(); // accept replacing the pointer with NULL

    let mut adapter = adapter(scripted);
    let influence = InfluenceMatrix::build_static(&table);
    let mut session = Session::new(&mut adapter, influence);

    let outcome = session.minimize(program, 0, false).unwrap();
    let Arg::Pointer { target, .. } = &outcome.program.calls[0].args[0] else {
        panic!("expected a pointer argument");
    };
    assert!(matches!(target, PointerTarget::Special(_)));
}

#[test]
fn buffer_halving_search_converges_on_a_minimal_length() {
    let table = syscall_table();
    let call = call_with_blob(&table, "noop", 8, 0);
    let program = Program::new("test", vec![call]);

    let mut scripted = ScriptedOracle::new();
    scripted.push_reject(); // len 8 -> 0
    scripted.push_accept(); // len 8 -> 4
    scripted.push_reject(); // len 4 -> 0
    scripted.push_accept(); // len 4 -> 2
    scripted.push_reject(); // len 2 -> 0
    scripted.push_accept(); // len 2 -> 1
    scripted.push_reject(); // len 1 -> 0, step halves to 0, loop ends
    scripted.push_reject(); // second pass: len 1 -> 0 again, now settles

    let mut adapter = adapter(scripted);
    let influence = InfluenceMatrix::build_static(&table);
    let mut session = Session::new(&mut adapter, influence);

    let outcome = session.minimize(program, 0, false).unwrap();
    let Arg::Data { bytes, .. } = &outcome.program.calls[0].args[0] else {
        panic!("expected a data argument");
    };
    assert_eq!(bytes.len(), 1);
}
