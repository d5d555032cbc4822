//! Program-minimization engine for a kernel syscall fuzzer: a typed
//! argument-tree model plus the call-level and argument-level minimizers
//! that shrink a failing program against a caller-supplied oracle.

pub mod argmin;
pub mod callmin;
pub mod error;
pub mod influence;
pub mod model;
pub mod oracle;
pub mod resource_closure;
pub mod session;
pub mod sizepatch;
