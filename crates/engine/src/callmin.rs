//! The Call-level Minimizer (spec §4.4): Stages A through E, run in order
//! against a single baseline program.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::error::EngineResult;
use crate::influence::InfluenceMatrix;
use crate::model::{self, CallProps, CallTelemetry, Program};
use crate::oracle::{Codec, Oracle, OracleAdapter, StepKind, Target, Telemetry};

/// Result of a full call-level minimization pass.
pub struct CallMinOutcome {
    pub program: Program,
    pub k: i64,
    pub influence_learned: bool,
}

/// Crash-mode (`k0 = -1`) has no bearing on the Call-level Minimizer: every
/// stage here already gates on `k0 >= 0` or is indifferent to it. The flag
/// matters to the Argument-level Minimizer instead (spec §8, boundary
/// behaviors).
pub struct CallMinimizer<'a, O, T, C> {
    adapter: &'a mut OracleAdapter<O, T, C>,
    influence: Arc<InfluenceMatrix>,
}

impl<'a, O: Oracle, T: Target, C: Codec> CallMinimizer<'a, O, T, C> {
    pub fn new(adapter: &'a mut OracleAdapter<O, T, C>, influence: Arc<InfluenceMatrix>) -> Self {
        CallMinimizer { adapter, influence }
    }

    pub fn run(&mut self, p0: Program, k0: i64) -> EngineResult<CallMinOutcome> {
        let mut program = p0;
        let mut k = k0;
        let mut influence_learned = false;

        if k >= 0 {
            k = self.stage_a_suffix_drop(&mut program, k)?;
            k = self.stage_b_influence_prefix_drop(&mut program, k)?;
        }

        let (new_k, learned) = self.stage_c_pairwise_drop(&mut program, k)?;
        k = new_k;
        influence_learned = influence_learned || learned;

        // Stage D is an alternative to Stage B, used when telemetry never
        // showed up to drive dynamic learning (spec §4.4).
        if k >= 0 && !influence_learned {
            k = self.stage_d_resource_closure_drop(&mut program, k)?;
        }

        self.stage_e_call_property_minimization(&mut program, k)?;

        Ok(CallMinOutcome { program, k, influence_learned })
    }

    fn stage_a_suffix_drop(&mut self, program: &mut Program, k0: i64) -> EngineResult<i64> {
        let k0u = k0 as usize;
        if program.len() < k0u + 3 {
            return Ok(k0);
        }
        if (k0u + 1..program.len()).any(|i| program.calls[i].meta.no_minimize) {
            return Ok(k0);
        }

        let mut candidate = program.deep_clone();
        let drop: HashSet<usize> = (k0u + 1..program.len()).collect();
        model::remove_calls(&mut candidate, &drop);

        let accepted = self.adapter.check(&candidate, k0, StepKind::CallLevel, true)?;
        self.record_telemetry(&mut candidate);
        if accepted {
            debug!(stage = "A", accepted = true, "suffix drop");
            *program = candidate;
        } else {
            debug!(stage = "A", accepted = false, "suffix drop");
        }
        Ok(k0)
    }

    fn stage_b_influence_prefix_drop(&mut self, program: &mut Program, k0: i64) -> EngineResult<i64> {
        let k0u = k0 as usize;
        if k0u == 0 {
            return Ok(k0);
        }
        let syscall_ids: Vec<u32> = program.calls.iter().map(|c| c.meta.id).collect();
        let relevant = self.influence.relevant_predecessors(&syscall_ids, k0u);
        let drop: HashSet<usize> = (0..k0u)
            .filter(|i| !relevant.contains(i) && !program.calls[*i].meta.no_minimize)
            .collect();
        if drop.is_empty() {
            return Ok(k0);
        }

        let mut candidate = program.deep_clone();
        model::remove_calls(&mut candidate, &drop);
        let new_k0 = k0 - drop.len() as i64;

        let accepted = self.adapter.check(&candidate, new_k0, StepKind::CallLevel, true)?;
        self.record_telemetry(&mut candidate);
        if accepted {
            debug!(stage = "B", accepted = true, dropped = drop.len(), "influence-guided prefix drop");
            *program = candidate;
            Ok(new_k0)
        } else {
            debug!(stage = "B", accepted = false, "influence-guided prefix drop");
            Ok(k0)
        }
    }

    fn stage_c_pairwise_drop(&mut self, program: &mut Program, k0: i64) -> EngineResult<(i64, bool)> {
        let mut k = k0;
        let mut influence_learned = false;
        let mut i = program.len();
        while i > 0 {
            i -= 1;
            if i as i64 == k || program.calls[i].meta.no_minimize {
                continue;
            }

            let pre_hash = program.calls.get(i + 1).and_then(|c| c.telemetry).map(|t| t.cov_hash);

            let mut candidate = program.deep_clone();
            model::remove_call(&mut candidate, i);
            let new_k = if (i as i64) < k { k - 1 } else { k };

            let accepted = self.adapter.check(&candidate, new_k, StepKind::CallLevel, true)?;
            let telemetry = self.adapter.telemetry();
            self.record_telemetry(&mut candidate);

            if accepted {
                debug!(stage = "C", accepted = true, call_idx = i, "pairwise drop");
                *program = candidate;
                k = new_k;
                continue;
            }
            debug!(stage = "C", accepted = false, call_idx = i, "pairwise drop");

            if let Some(telemetry) = telemetry {
                let post_hash = telemetry.per_call_cov_hash.get(i).copied();
                if let (Some(pre), Some(post)) = (pre_hash, post_hash) {
                    if pre != 0 && post != 0 && pre != post {
                        let src = program.calls[i].meta.id;
                        let dst = program.calls[i + 1].meta.id;
                        if !self.influence.get(src as usize, dst as usize) {
                            self.influence.set(src as usize, dst as usize);
                            influence_learned = true;
                        }
                    }
                }
            }
        }
        Ok((k, influence_learned))
    }

    fn stage_d_resource_closure_drop(&mut self, program: &mut Program, k0: i64) -> EngineResult<i64> {
        let k0u = k0 as usize;
        let unrelated: HashSet<usize> = crate::resource_closure::unrelated_calls(program, k0u)
            .into_iter()
            .filter(|&i| !program.calls[i].meta.no_minimize)
            .collect();
        if unrelated.len() < 3 {
            return Ok(k0);
        }

        let mut candidate = program.deep_clone();
        let drop_before_k0 = unrelated.iter().filter(|&&i| i < k0u).count();
        model::remove_calls(&mut candidate, &unrelated);
        let new_k0 = k0 - drop_before_k0 as i64;

        let accepted = self.adapter.check(&candidate, new_k0, StepKind::CallLevel, true)?;
        self.record_telemetry(&mut candidate);
        if accepted {
            debug!(stage = "D", accepted = true, dropped = unrelated.len(), "resource-closure drop");
            *program = candidate;
            Ok(new_k0)
        } else {
            debug!(stage = "D", accepted = false, "resource-closure drop");
            Ok(k0)
        }
    }

    /// Re-run Stage E alone, against a program whose argument trees changed
    /// shape after the Argument-level Minimizer ran (spec §2, data-flow:
    /// "re-minimizes call properties").
    pub fn reset_call_properties(&mut self, program: &mut Program, k: i64) -> EngineResult<()> {
        self.stage_e_call_property_minimization(program, k)
    }

    fn stage_e_call_property_minimization(&mut self, program: &mut Program, k: i64) -> EngineResult<()> {
        for idx in 0..program.len() {
            if program.calls[idx].meta.no_minimize {
                continue;
            }
            self.try_reset_prop(program, idx, k, |props| {
                let changed = props.fail_nth != 0;
                props.fail_nth = 0;
                changed
            })?;
            self.try_reset_prop(program, idx, k, |props| {
                let changed = props.r#async;
                props.r#async = false;
                changed
            })?;
            self.try_reset_prop(program, idx, k, |props| {
                let changed = props.rerun != 0;
                props.rerun = 0;
                changed
            })?;
        }
        Ok(())
    }

    fn try_reset_prop(
        &mut self,
        program: &mut Program,
        idx: usize,
        k: i64,
        reset: impl Fn(&mut CallProps) -> bool,
    ) -> EngineResult<()> {
        let mut candidate = program.deep_clone();
        if !reset(&mut candidate.calls[idx].props) {
            return Ok(());
        }
        let accepted = self.adapter.check(&candidate, k, StepKind::CallLevel, true)?;
        self.record_telemetry(&mut candidate);
        if accepted {
            debug!(stage = "E", accepted = true, call_idx = idx, "call-property reset");
            *program = candidate;
        } else {
            debug!(stage = "E", accepted = false, call_idx = idx, "call-property reset");
        }
        Ok(())
    }

    /// Stash the most recent oracle telemetry onto the matching positions of
    /// `candidate`, so a later Stage C pass has a "pre-removal" hash to
    /// compare against even after several accepted commits.
    fn record_telemetry(&mut self, candidate: &mut Program) {
        if let Some(Telemetry { per_call_cov_hash, .. }) = self.adapter.telemetry() {
            for (idx, call) in candidate.calls.iter_mut().enumerate() {
                if let Some(&hash) = per_call_cov_hash.get(idx) {
                    call.telemetry = Some(CallTelemetry { cov_hash: hash });
                }
            }
        }
    }
}
