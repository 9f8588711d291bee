//! Temporal operators. Each call only builds a node; state lives in the evaluator.

use crate::expr::Expr;
use crate::formula::{Formula, IntoExpr};
use crate::types::Period;
use std::sync::Arc;

/// `second` holds while the latest rising edge of `first` lies within `[lower, upper]`
/// seconds in the past. `interval` is a two-element list such as `(2, 31)`.
pub fn since(first: impl IntoExpr, second: impl IntoExpr, interval: impl IntoExpr) -> Formula {
    Formula::new(Expr::call_named(
        "since",
        vec![first.into_expr(), second.into_expr(), interval.into_expr()],
    ))
}

/// Reduces the mapped values observed `lower..=upper` seconds back.
///
/// `map_fn` is typically a [`lambda`] applied to each incoming record; `reduce_fn` is a
/// lambda over the window list or the name of a function such as `sum`.
pub fn rolling_window(
    interval: impl IntoExpr,
    map_fn: impl IntoExpr,
    reduce_fn: impl IntoExpr,
) -> Formula {
    Formula::new(Expr::call_named(
        "rolling_window",
        vec![interval.into_expr(), map_fn.into_expr(), reduce_fn.into_expr()],
    ))
}

/// "Historically": `condition` held at every observation during the last `duration`.
pub fn always(duration: Period, condition: impl IntoExpr) -> Formula {
    Formula::new(Expr::call_named(
        "always",
        vec![Expr::constant(duration.as_secs_f64()), condition.into_expr()],
    ))
}

/// Evaluates `output` separately per id, yielding `{id, result}` records.
///
/// State and histories under `output` are scoped by the id; an end-of-stream flag drops
/// that id's scope after the pass.
pub fn multiplex_id(
    output: impl IntoExpr,
    id_from: impl IntoExpr,
    eos_from: impl IntoExpr,
) -> Formula {
    Formula::new(Expr::call_named(
        "multiplex",
        vec![output.into_expr(), id_from.into_expr(), eos_from.into_expr()],
    ))
}

/// Current evaluation time in seconds.
pub fn global_time() -> Formula {
    Formula::new(Expr::call_named("global_time", Vec::new()))
}

/// One-argument function built by applying `body` to a symbolic parameter.
pub fn lambda(param: impl Into<String>, body: impl FnOnce(Formula) -> Formula) -> Formula {
    let param = param.into();
    let body = body(Formula::var(param.clone())).into_node();
    Formula::new(Arc::new(Expr::Lambda { param, body }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::FormulaOps;
    use crate::stream::Stream;
    use crate::types::Unit;

    #[test]
    fn since_packs_interval_as_list() {
        let a = Stream::new("a");
        let b = Stream::new("b");
        let f = since(a.field("v").gt(2), b.field("v").gt(5), (2, 31));
        assert_eq!(f.to_string(), "since((a.v > 2), (b.v > 5), [2, 31])");
    }

    #[test]
    fn always_stores_duration_in_seconds() {
        let f = always(2.0 * Unit::Minutes, Formula::var("ok"));
        match f.node().as_ref() {
            Expr::Call { args, .. } => {
                assert_eq!(args[0].as_ref(), &Expr::Const(120.0.into()))
            }
            other => panic!("unexpected node: {other:?}"),
        }
    }

    #[test]
    fn lambda_body_refers_to_its_parameter() {
        let f = lambda("x", |x| x.attr("value") * 2);
        assert_eq!(f.to_string(), "|x| (x.value * 2)");
    }

    #[test]
    fn rolling_window_shape() {
        let f = rolling_window(
            (0, 10),
            lambda("r", |r| r.attr("speed")),
            Formula::var("mean"),
        );
        assert_eq!(f.to_string(), "rolling_window([0, 10], |r| r.speed, mean)");
    }
}
