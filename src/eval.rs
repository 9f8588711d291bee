//! Tree-walking interpreter over [`Expr`] nodes.

use crate::error::EvalError;
use crate::expr::{Expr, LogicalOp, UnaryOp};
use crate::formula::IntoExpr;
use crate::ops::{
    builtin, AlwaysState, LastState, OpCode, OperatorRegistry, SinceState, TemporalState,
    WindowState,
};
use crate::state::{Binding, Environment, Resolved};
use crate::value::{Record, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    env: Environment,
    observing: bool,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_env(env: Environment) -> Self {
        Self {
            env,
            observing: false,
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    pub fn into_env(self) -> Environment {
        self.env
    }

    /// One evaluation pass. History-indexed lookups read what earlier passes recorded.
    pub fn eval(&mut self, formula: impl IntoExpr) -> Result<Value, EvalError> {
        let node = formula.into_expr();
        self.env.begin_pass();
        self.observing = false;
        self.eval_node(&node)
    }

    /// One evaluation pass that first records the current value of every history-indexed
    /// target, so `x[-1]` is the value seen in this pass and `x[-2]` the one before.
    pub fn step(&mut self, formula: impl IntoExpr) -> Result<Value, EvalError> {
        let node = formula.into_expr();
        self.env.begin_pass();
        self.observing = true;
        let out = self.eval_node(&node);
        self.observing = false;
        out
    }

    fn eval_node(&mut self, node: &Arc<Expr>) -> Result<Value, EvalError> {
        match node.as_ref() {
            Expr::Const(v) => Ok(v.clone()),
            Expr::Name(_) | Expr::Attribute { .. } => self.current_value(node),
            Expr::Binary { op, lhs, rhs } => {
                let l = self.eval_node(lhs)?;
                let r = self.eval_node(rhs)?;
                l.arith(op.arith(), &r)
            }
            Expr::Compare { op, lhs, rhs } => {
                let l = self.eval_node(lhs)?;
                let r = self.eval_node(rhs)?;
                l.compare(op.cmp(), &r).map(Value::Bool)
            }
            Expr::Logical { op, lhs, rhs } => {
                // Both sides always run so temporal state advances every pass.
                let l = self.eval_node(lhs)?;
                let r = self.eval_node(rhs)?;
                let (symbol, combine): (&'static str, fn(bool, bool) -> bool) = match op {
                    LogicalOp::And => ("&", |a, b| a && b),
                    LogicalOp::Or => ("|", |a, b| a || b),
                };
                let a = l.expect_bool(symbol)?;
                let b = r.expect_bool(symbol)?;
                Ok(Value::Bool(combine(a, b)))
            }
            Expr::Unary { op, expr } => {
                let v = self.eval_node(expr)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!v.expect_bool("~")?)),
                    UnaryOp::Neg => v.negate(),
                }
            }
            Expr::Index { target, index } => self.eval_index(target, index),
            Expr::Call { callee, args } => self.eval_call(node, callee, args),
            Expr::List(items) => items
                .iter()
                .map(|item| self.eval_node(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Expr::Lambda { param, body } => {
                let arg = self
                    .env
                    .record()
                    .cloned()
                    .map(Value::Record)
                    .unwrap_or_default();
                self.apply_lambda(param, body, arg)
            }
            Expr::Scheduled { expr, .. } => self.eval_node(expr),
            Expr::Opaque(desc) => Err(EvalError::UnsupportedConstruct {
                construct: format!("<opaque {desc}>"),
            }),
        }
    }

    /// Current value of a name/attribute chain, recorded into its history.
    fn current_value(&mut self, node: &Arc<Expr>) -> Result<Value, EvalError> {
        let value = self.resolve_chain(node)?;
        if !self.is_local_chain(node) {
            self.env.observe(&node.key(), &value);
        }
        Ok(value)
    }

    fn resolve_chain(&mut self, node: &Arc<Expr>) -> Result<Value, EvalError> {
        match node.as_ref() {
            Expr::Name(name) => self.env.lookup(name),
            Expr::Attribute { base, attr } => {
                if let Some(path) = node.as_path() {
                    if self.is_module_root(&path[0]) {
                        return match self.env.resolve_path(&path) {
                            Some(Ok(Resolved::Value(v))) => Ok(v.clone()),
                            Some(Err(err)) => Err(err),
                            _ => Err(EvalError::UnsupportedConstruct {
                                construct: format!("`{}` used as a value", path.join(".")),
                            }),
                        };
                    }
                }
                let base_value = self.resolve_chain(base)?;
                match base_value.get(attr) {
                    Some(v) => Ok(v.clone()),
                    None => Err(EvalError::MissingAttribute {
                        base: base.key(),
                        attr: attr.clone(),
                    }),
                }
            }
            _ => self.eval_node(node),
        }
    }

    fn is_local_chain(&self, node: &Expr) -> bool {
        node.root_name().is_some_and(|root| self.env.is_local(root))
    }

    fn is_module_root(&self, root: &str) -> bool {
        !self.env.is_local(root) && matches!(self.env.binding(root), Some(Binding::Module(_)))
    }

    fn eval_index(&mut self, target: &Arc<Expr>, index: &Arc<Expr>) -> Result<Value, EvalError> {
        let idx = self.eval_node(index)?;
        let key = target.key();
        let stream_ref = target.as_path().is_some() && !self.is_local_chain(target);
        let Some(offset) = idx.as_i64().filter(|i| *i < 0 && stream_ref) else {
            let base = self.eval_node(target)?;
            return subscript(&base, &idx, &key);
        };
        // The resolved value decides: sequences are subscripted, anything else reads history.
        let current = self.resolve_chain(target);
        let bound_history = matches!(
            target.as_ref(),
            Expr::Name(name) if matches!(self.env.binding(name), Some(Binding::History))
        );
        if !bound_history {
            if let Ok(base @ (Value::List(_) | Value::Str(_))) = &current {
                return subscript(base, &idx, &key);
            }
        }
        if self.observing {
            if let Ok(value) = &current {
                self.env.observe(&key, value);
            }
        }
        match self.env.history(&key) {
            Some(seq) => seq
                .get_by_index(offset)
                .cloned()
                .ok_or(EvalError::HistoryUnderflow {
                    key,
                    offset,
                    len: seq.len(),
                }),
            None => subscript(&current?, &idx, &key),
        }
    }

    fn eval_call(
        &mut self,
        node: &Arc<Expr>,
        callee: &Arc<Expr>,
        args: &[Arc<Expr>],
    ) -> Result<Value, EvalError> {
        let Some(path) = callee.as_path() else {
            return Err(EvalError::UnsupportedConstruct {
                construct: format!("call on computed callee `{callee}`"),
            });
        };
        if self.env.resolve_path(&path).is_none() && path.len() == 1 {
            if let Some(meta) = OperatorRegistry::temporal_call(&path[0]) {
                if !meta.arity.accepts(args.len()) {
                    return Err(EvalError::invalid_args(
                        meta.name,
                        format!("expected {:?} arguments, got {}", meta.arity, args.len()),
                    ));
                }
                return self.eval_temporal(meta.op, node, args);
            }
        }
        let values = args
            .iter()
            .map(|arg| self.eval_node(arg))
            .collect::<Result<Vec<_>, _>>()?;
        self.call_path(&path, &values)
    }

    /// Invokes the callable at `path`: environment bindings first, then built-ins.
    fn call_path(&self, path: &[String], args: &[Value]) -> Result<Value, EvalError> {
        let name = path.join(".");
        match self.env.resolve_path(path) {
            Some(resolved) => match resolved? {
                Resolved::Function(func) => func(args),
                Resolved::Value(_) | Resolved::Module => Err(EvalError::NotCallable { name }),
            },
            None if path.len() == 1 => match builtin(&name) {
                Some(b) => (b.func)(args),
                None => Err(EvalError::UnresolvedReference { name }),
            },
            None => Err(EvalError::UnresolvedReference { name }),
        }
    }

    fn apply_lambda(
        &mut self,
        param: &str,
        body: &Arc<Expr>,
        arg: Value,
    ) -> Result<Value, EvalError> {
        self.env.push_local(param, arg);
        let out = self.eval_node(body);
        self.env.pop_local();
        out
    }

    fn eval_temporal(
        &mut self,
        op: OpCode,
        node: &Arc<Expr>,
        args: &[Arc<Expr>],
    ) -> Result<Value, EvalError> {
        let site = node.key();
        let now = self.env.now();
        match op {
            OpCode::Since => {
                let first = self.eval_node(&args[0])?.expect_bool("since")?;
                let second = self.eval_node(&args[1])?.expect_bool("since")?;
                let (lower, upper) = self.eval_interval("since", &args[2])?;
                let state = self
                    .env
                    .temporal_state(&site, || TemporalState::Since(SinceState::default()));
                let TemporalState::Since(state) = state else {
                    return Err(state_conflict(&site));
                };
                Ok(Value::Bool(state.update(now, first, second, lower, upper)))
            }
            OpCode::RollingWindow => {
                let (lower, upper) = self.eval_interval("rolling_window", &args[0])?;
                let mapped = self.eval_node(&args[1])?;
                let state = self
                    .env
                    .temporal_state(&site, || TemporalState::Window(WindowState::default()));
                let TemporalState::Window(window) = state else {
                    return Err(state_conflict(&site));
                };
                window.push(now, mapped, upper);
                let values = window.values(now, lower, upper);
                if values.is_empty() {
                    return Ok(Value::Null);
                }
                self.reduce(&args[2], Value::List(values))
            }
            OpCode::Always => {
                let duration = number_arg("always", self.eval_node(&args[0])?)?;
                let cond = self.eval_node(&args[1])?.expect_bool("always")?;
                let state = self
                    .env
                    .temporal_state(&site, || TemporalState::Always(AlwaysState::default()));
                let TemporalState::Always(state) = state else {
                    return Err(state_conflict(&site));
                };
                Ok(Value::Bool(state.update(now, duration, cond)))
            }
            OpCode::Last => {
                let value = self.eval_node(&args[0])?;
                let state = self
                    .env
                    .temporal_state(&site, || TemporalState::Last(LastState::default()));
                let TemporalState::Last(state) = state else {
                    return Err(state_conflict(&site));
                };
                Ok(state.update(value))
            }
            OpCode::GlobalTime => Ok(Value::Float(now)),
            OpCode::Multiplex => self.eval_multiplex(&site, args),
            other => Err(EvalError::UnsupportedConstruct {
                construct: format!("{other:?}"),
            }),
        }
    }

    /// Evaluates `output` in a state scope of its own per id. End-of-stream drops the scope.
    fn eval_multiplex(&mut self, site: &str, args: &[Arc<Expr>]) -> Result<Value, EvalError> {
        let id = self.eval_node(&args[1])?;
        let eos = match self.eval_node(&args[2])? {
            Value::Null => false,
            v => v.expect_bool("multiplex")?,
        };
        let scope = format!("{site}#{id}");
        self.env.push_scope(scope.clone());
        let result = self.eval_node(&args[0]);
        self.env.pop_scope();
        if eos {
            self.env.drop_scope(&scope);
        }
        let mut out = Record::new();
        out.insert("id".to_string(), id);
        out.insert("result".to_string(), result?);
        Ok(Value::Record(out))
    }

    fn reduce(&mut self, reducer: &Arc<Expr>, window: Value) -> Result<Value, EvalError> {
        match reducer.as_ref() {
            Expr::Lambda { param, body } => self.apply_lambda(param, body, window),
            other => match other.as_path() {
                Some(path) => self.call_path(&path, &[window]),
                None => Err(EvalError::NotCallable {
                    name: other.key(),
                }),
            },
        }
    }

    fn eval_interval(&mut self, op: &str, node: &Arc<Expr>) -> Result<(f64, f64), EvalError> {
        match self.eval_node(node)? {
            Value::List(bounds) if bounds.len() == 2 => {
                let lower = number_arg(op, bounds[0].clone())?;
                let upper = number_arg(op, bounds[1].clone())?;
                Ok((lower, upper))
            }
            other => Err(EvalError::invalid_args(
                op,
                format!("interval must be [lower, upper], got {other}"),
            )),
        }
    }
}

fn number_arg(op: &str, v: Value) -> Result<f64, EvalError> {
    v.as_f64().ok_or_else(|| {
        EvalError::invalid_args(op, format!("expected a number, got {}", v.type_name()))
    })
}

fn state_conflict(site: &str) -> EvalError {
    EvalError::UnsupportedConstruct {
        construct: format!("conflicting temporal state at `{site}`"),
    }
}

/// Plain subscript: lists and strings by position (negative counts from the end), records
/// by key.
fn subscript(base: &Value, idx: &Value, key: &str) -> Result<Value, EvalError> {
    match (base, idx) {
        (Value::List(items), Value::Int(i)) => {
            position(*i, items.len()).map(|p| items[p].clone())
        }
        (Value::Str(s), Value::Int(i)) => {
            let chars: Vec<char> = s.chars().collect();
            position(*i, chars.len()).map(|p| Value::Str(chars[p].to_string()))
        }
        (Value::Record(map), Value::Str(field)) => {
            map.get(field)
                .cloned()
                .ok_or_else(|| EvalError::MissingAttribute {
                    base: key.to_string(),
                    attr: field.clone(),
                })
        }
        (_, Value::Int(i)) if *i < 0 => Err(EvalError::HistoryUnderflow {
            key: key.to_string(),
            offset: *i,
            len: 0,
        }),
        _ => Err(base.mismatch("[]", idx)),
    }
}

#[inline]
fn position(index: i64, len: usize) -> Result<usize, EvalError> {
    let resolved = if index < 0 { index + len as i64 } else { index };
    if resolved < 0 || resolved >= len as i64 {
        return Err(EvalError::IndexOutOfRange { index, len });
    }
    Ok(resolved as usize)
}
