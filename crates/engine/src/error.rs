//! Engine error taxonomy (spec §7): the three failure modes a session can
//! surface to its caller, distinct from an oracle verdict of "not
//! equivalent" (which is not an error, just a rejected proposal).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A structural invariant (resource graph, size/conditional-field
    /// consistency) did not hold after a commit. Indicates a bug in a
    /// mutation primitive, not bad input.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// The oracle could not be consulted at all (process spawn failure,
    /// repeated timeout, I/O error) as opposed to returning a verdict.
    #[error("oracle unavailable: {0}")]
    OracleInfrastructureFailure(String),

    /// A resumed session's saved state no longer matches the program it
    /// was computed against (see SPEC_FULL §6, resume file format).
    #[error("stale iteration: {0}")]
    StaleIteration(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
