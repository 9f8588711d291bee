use crate::compile::{compile_to_graph, input_map, CompiledGraph};
use crate::error::{CompileError, EvalError};
use crate::eval::Evaluator;
use crate::expr::Expr;
use crate::formula::{Formula, FormulaOps};
use crate::lift::{lift, native, FunctionRef, NativeFn, Namespace};
use crate::ops::OpCode;
use crate::plan::{GraphArg, GraphNode, NodeId};
use crate::stream::{InputStream, Stream};
use crate::temporal::{always, global_time, lambda, multiplex_id, rolling_window, since};
use crate::types::Unit;
use crate::value::{ArithOp, Record, Value};
use serde_json::json;

mod eval;

fn record(fields: serde_json::Value) -> Value {
    Value::from(fields)
}

fn add_fn() -> NativeFn {
    native(|args| match args {
        [a, b] => a.arith(ArithOp::Add, b),
        _ => Err(EvalError::invalid_args("add", "expected 2 arguments")),
    })
}

fn geo_namespace() -> Namespace {
    let hypot = native(|args| match args {
        [a, b] => {
            let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) else {
                return Err(EvalError::invalid_args("hypot", "expected numbers"));
            };
            Ok(Value::Float(a.hypot(b)))
        }
        _ => Err(EvalError::invalid_args("hypot", "expected 2 arguments")),
    });
    Namespace::new("geo")
        .with_module(Namespace::new("distance").with_function("hypot", hypot))
        .with_value("earth_radius_km", 6371.0)
}

fn node(compiled: &CompiledGraph, id: NodeId) -> &GraphNode {
    compiled.graph.node(id).expect("node id must be in graph")
}

/// Node behind the `idx`-th argument of `parent`.
fn child(compiled: &CompiledGraph, parent: NodeId, idx: usize) -> NodeId {
    match &node(compiled, parent).args[idx] {
        GraphArg::Node(id) => *id,
        GraphArg::Literal(v) => panic!("argument {idx} is the literal {v}"),
    }
}

fn approx_eq(lhs: f64, rhs: f64) -> bool {
    (lhs - rhs).abs() < 1e-9
}

fn result_of(out: &Record) -> &Value {
    out.get("result").expect("output carries a result")
}
