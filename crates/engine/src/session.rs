//! The minimization session (spec §2, data-flow; spec §6, entry point):
//! orchestrates the Call-level Minimizer, then the Argument-level Minimizer
//! over every surviving call, against one shared influence matrix.

use std::sync::Arc;

use tracing::info;

use crate::callmin::CallMinimizer;
use crate::error::EngineResult;
use crate::influence::InfluenceMatrix;
use crate::model::Program;
use crate::oracle::{Codec, Oracle, OracleAdapter, Target};

/// `minimize(P0, k0, crash) -> (P, k, influence_learned)` (spec §6).
pub struct Session<'a, O, T, C> {
    adapter: &'a mut OracleAdapter<O, T, C>,
    influence: Arc<InfluenceMatrix>,
}

/// Outcome of a full session: the shrunk program, its updated failing
/// position, and whether Stage C learned a new influence edge worth
/// persisting back into the shared matrix (spec §4.6).
pub struct SessionOutcome {
    pub program: Program,
    pub k: i64,
    pub influence_learned: bool,
}

impl<'a, O: Oracle, T: Target, C: Codec> Session<'a, O, T, C> {
    pub fn new(adapter: &'a mut OracleAdapter<O, T, C>, influence: Arc<InfluenceMatrix>) -> Self {
        Session { adapter, influence }
    }

    /// Run one full minimization session. `crash_mode` disables a handful of
    /// Argument-level shrink steps (spec §8, boundary behaviors) but has no
    /// bearing on the Call-level Minimizer.
    pub fn minimize(&mut self, p0: Program, k0: i64, crash_mode: bool) -> EngineResult<SessionOutcome> {
        info!(program_len = p0.len(), k0, crash_mode, "starting minimization session");

        let mut call_min = CallMinimizer::new(&mut *self.adapter, Arc::clone(&self.influence));
        let outcome = call_min.run(p0, k0)?;
        drop(call_min);
        let mut program = outcome.program;
        let k = outcome.k;
        let influence_learned = outcome.influence_learned;

        let mut arg_min = crate::argmin::ArgMinimizer::new(&mut *self.adapter, crash_mode);
        let mut idx = 0;
        while idx < program.len() {
            if !program.calls[idx].meta.no_minimize {
                arg_min.minimize_call(&mut program, idx, k)?;
            }
            idx += 1;
        }
        drop(arg_min);

        // A call's arguments may have changed shape enough (an emptied
        // array, a nulled pointer) that its properties are worth
        // re-minimizing once more against the now-smaller argument tree.
        let mut call_min = CallMinimizer::new(&mut *self.adapter, Arc::clone(&self.influence));
        call_min.reset_call_properties(&mut program, k)?;

        info!(program_len = program.len(), k, influence_learned, "minimization session complete");
        Ok(SessionOutcome { program, k, influence_learned })
    }
}
