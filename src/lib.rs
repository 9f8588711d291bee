//! Symbolic temporal formulas over record streams.
//!
//! A [`Formula`] is built by operator overloading on [`Stream`] handles and lifted
//! functions, then either interpreted by an [`Evaluator`] or lowered by
//! [`compile_to_graph`] into a pipeline [`Graph`] fed by [`PushSource`]s.

pub mod capture;
pub mod compile;
mod compile_expr;
pub mod error;
pub mod eval;
pub mod expr;
pub mod formula;
pub mod lift;
pub mod ops;
pub mod plan;
pub mod registry;
pub mod runtime;
pub mod state;
pub mod stream;
pub mod temporal;
pub mod types;
pub mod value;

pub use capture::{Capture, Lambda, SourceCapture, Thunk};
pub use compile::{compile_to_graph, compile_to_graph_with, input_map, CompiledGraph};
pub use compile_expr::parse_expression;
pub use error::{CaptureFailure, CompileError, EvalError};
pub use eval::Evaluator;
pub use expr::Expr;
pub use formula::{Formula, FormulaOps, IntoExpr, ScheduledFormula};
pub use lift::{
    lift, native, wrap_module, Arg, FunctionRef, Lifted, ModuleProxy, Namespace, ProxyMember,
};
pub use plan::{CompileManifest, Graph, GraphArg, GraphNode, NodeId};
pub use registry::{FormulaRegistry, FormulaSource};
pub use runtime::{Pipeline, PushSource};
pub use state::{Binding, Environment, HistorySequence};
pub use stream::{FieldStream, InputStream, Stream};
pub use temporal::{always, global_time, lambda, multiplex_id, rolling_window, since};
pub use types::{CompileOptions, EvalOptions, FieldType, Period, RecordType, Unit};
pub use value::{Record, Value};

/// Everything needed to write formulas: handles, operator traits, temporal builders.
pub mod prelude {
    pub use crate::formula::{Formula, FormulaOps, IntoExpr};
    pub use crate::stream::{InputStream, Stream};
    pub use crate::temporal::{always, global_time, lambda, multiplex_id, rolling_window, since};
    pub use crate::types::Unit;
    pub use crate::value::Value;
}

#[cfg(test)]
mod tests;
