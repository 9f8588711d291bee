//! Operator layer entry.
//!
//! Extension path (minimal touch points):
//! 1) add opcode in `spec.rs` and register meta in `catalog.rs` (`OP_METAS`),
//! 2) stateless functions go in `elem.rs`, stateful kernels in `ts.rs`,
//! 3) wire evaluation in `eval.rs` and lowering in `compile.rs`, then add tests.

pub mod catalog;
pub mod spec;

mod elem;
mod ts;

pub use catalog::{Arity, OpMeta, OperatorRegistry};
pub use elem::{builtin, Builtin, BuiltinFn};
pub use spec::{Domain, OpCode};
pub use ts::{AlwaysState, LastState, SinceState, TemporalState, WindowState};
