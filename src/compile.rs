use crate::error::CompileError;
use crate::expr::{BinaryOp, CompareOp, Expr, LogicalOp, UnaryOp};
use crate::formula::IntoExpr;
use crate::ops::{OpCode, OperatorRegistry};
use crate::plan::{CompileManifest, Graph, GraphArg, GraphNode, NodeId};
use crate::runtime::{Pipeline, PushSource};
use crate::stream::InputStream;
use crate::types::CompileOptions;
use crate::value::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::{debug, info};

/// Output of [`compile_to_graph`].
#[derive(Debug, Clone)]
pub struct CompiledGraph {
    pub graph: Graph,
    pub root: NodeId,
    /// One push endpoint per input the expression references.
    pub sources: BTreeMap<String, PushSource>,
    pub source_nodes: BTreeMap<String, NodeId>,
    /// Evaluator binding that consumes `sources` and emits the root's results.
    pub pipeline: Pipeline,
    pub manifest: CompileManifest,
}

impl CompiledGraph {
    #[inline]
    pub fn root_node(&self) -> &GraphNode {
        // `root` is always the last node pushed.
        &self.graph[self.root]
    }

    pub fn source(&self, name: &str) -> Option<&PushSource> {
        self.sources.get(name)
    }
}

/// Name-keyed input map, e.g. `input_map([gps.clone()])`.
pub fn input_map(inputs: impl IntoIterator<Item = InputStream>) -> BTreeMap<String, InputStream> {
    inputs
        .into_iter()
        .map(|input| (input.name().to_string(), input))
        .collect()
}

pub fn compile_to_graph(
    root: impl IntoExpr,
    inputs: &BTreeMap<String, InputStream>,
) -> Result<CompiledGraph, CompileError> {
    compile_to_graph_with(root, inputs, &CompileOptions::default())
}

/// Lowers `root` post-order into a fresh [`Graph`]. Performs no evaluation and no folding.
pub fn compile_to_graph_with(
    root: impl IntoExpr,
    inputs: &BTreeMap<String, InputStream>,
    opts: &CompileOptions,
) -> Result<CompiledGraph, CompileError> {
    let started_at = Instant::now();
    let expr = root.into_expr();

    let mut ctx = LowerCtx {
        graph: Graph::new(),
        inputs,
        source_nodes: BTreeMap::new(),
        params: Vec::new(),
        stats: LowerStats::default(),
    };
    let root_id = ctx.lower(&expr)?;
    let LowerCtx {
        graph,
        source_nodes,
        stats,
        ..
    } = ctx;

    let sources: BTreeMap<String, PushSource> = source_nodes
        .keys()
        .map(|name| (name.clone(), PushSource::new(name.clone())))
        .collect();
    let used_inputs: BTreeMap<String, InputStream> = inputs
        .iter()
        .filter(|(name, _)| source_nodes.contains_key(*name))
        .map(|(name, input)| (name.clone(), input.clone()))
        .collect();
    let pipeline = Pipeline::new(expr.clone(), used_inputs, sources.clone(), opts);

    let manifest = CompileManifest {
        node_count: graph.len(),
        source_count: source_nodes.len(),
        lowered_op_count: stats.lowered_op_count,
        source_dedup_count: stats.source_dedup_count,
        scheduled: matches!(expr.as_ref(), Expr::Scheduled { .. }),
        compile_time_us: started_at.elapsed().as_micros() as u64,
    };
    if compile_manifest_debug_enabled() {
        info!(manifest = %manifest.summary_line(), "streamv::compile");
    } else {
        debug!(manifest = %manifest.summary_line(), "streamv::compile");
    }

    Ok(CompiledGraph {
        graph,
        root: root_id,
        sources,
        source_nodes,
        pipeline,
        manifest,
    })
}

#[inline]
fn compile_manifest_debug_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| {
        std::env::var("STREAMV_COMPILE_DEBUG")
            .ok()
            .map(|raw| {
                let v = raw.trim().to_ascii_lowercase();
                matches!(v.as_str(), "1" | "true" | "yes" | "on")
            })
            .unwrap_or(false)
    })
}

#[derive(Debug, Default)]
struct LowerStats {
    lowered_op_count: usize,
    source_dedup_count: usize,
}

struct LowerCtx<'a> {
    graph: Graph,
    inputs: &'a BTreeMap<String, InputStream>,
    source_nodes: BTreeMap<String, NodeId>,
    /// Lambda parameters in scope, innermost last.
    params: Vec<String>,
    stats: LowerStats,
}

impl LowerCtx<'_> {
    fn lower(&mut self, expr: &Arc<Expr>) -> Result<NodeId, CompileError> {
        self.stats.lowered_op_count += 1;
        match expr.as_ref() {
            Expr::Const(v) => Ok(self.lower_const(v.clone())),
            Expr::Name(name) => self.lower_name(name),
            Expr::Attribute { base, attr } => {
                let base = self.lower(base)?;
                Ok(self.emit(
                    OpCode::Field,
                    vec![GraphArg::Node(base)],
                    Some(Value::from(attr.as_str())),
                ))
            }
            Expr::Binary { op, lhs, rhs } => self.lower_binary(binary_op(*op), lhs, rhs),
            Expr::Compare { op, lhs, rhs } => self.lower_binary(compare_op(*op), lhs, rhs),
            Expr::Logical { op, lhs, rhs } => {
                let code = match op {
                    LogicalOp::And => OpCode::And,
                    LogicalOp::Or => OpCode::Or,
                };
                self.lower_binary(code, lhs, rhs)
            }
            Expr::Unary { op, expr: inner } => {
                let code = match op {
                    UnaryOp::Not => OpCode::Not,
                    UnaryOp::Neg => OpCode::Neg,
                };
                let inner = self.lower(inner)?;
                Ok(self.emit(code, vec![GraphArg::Node(inner)], None))
            }
            Expr::Index { target, index } => self.lower_binary(OpCode::Index, target, index),
            Expr::Call { callee, args } => self.lower_call(expr, callee, args),
            Expr::List(items) => {
                let args = self.lower_all(items)?;
                Ok(self.emit(OpCode::List, args, None))
            }
            Expr::Lambda { param, body } => self.lower_lambda(param, |ctx| ctx.lower(body)),
            Expr::Scheduled { expr: body, period } => {
                let body = self.lower(body)?;
                let secs = Value::Float(period.as_secs_f64());
                let cadence = self.lower_const(secs.clone());
                Ok(self.emit(
                    OpCode::Every,
                    vec![GraphArg::Node(body), GraphArg::Node(cadence)],
                    Some(secs),
                ))
            }
            Expr::Opaque(desc) => Err(CompileError::UnsupportedConstruct {
                construct: format!("<opaque {desc}>"),
            }),
        }
    }

    fn emit(&mut self, op: OpCode, args: Vec<GraphArg>, value: Option<Value>) -> NodeId {
        self.graph.push(GraphNode { op, args, value })
    }

    fn lower_const(&mut self, value: Value) -> NodeId {
        self.emit(
            OpCode::Const,
            vec![GraphArg::Literal(value.clone())],
            Some(value),
        )
    }

    fn lower_all(&mut self, items: &[Arc<Expr>]) -> Result<Vec<GraphArg>, CompileError> {
        items
            .iter()
            .map(|item| self.lower(item).map(GraphArg::Node))
            .collect()
    }

    fn lower_binary(
        &mut self,
        op: OpCode,
        lhs: &Arc<Expr>,
        rhs: &Arc<Expr>,
    ) -> Result<NodeId, CompileError> {
        let l = self.lower(lhs)?;
        let r = self.lower(rhs)?;
        Ok(self.emit(op, vec![GraphArg::Node(l), GraphArg::Node(r)], None))
    }

    fn lower_name(&mut self, name: &str) -> Result<NodeId, CompileError> {
        if self.params.iter().any(|p| p == name) {
            return Ok(self.emit(OpCode::Param, Vec::new(), Some(Value::from(name))));
        }
        if let Some(id) = self.source_nodes.get(name) {
            self.stats.source_dedup_count += 1;
            return Ok(*id);
        }
        if !self.inputs.contains_key(name) {
            return Err(CompileError::MissingInputBinding {
                name: name.to_string(),
            });
        }
        let id = self.emit(OpCode::Source, Vec::new(), Some(Value::from(name)));
        self.source_nodes.insert(name.to_string(), id);
        Ok(id)
    }

    fn lower_lambda(
        &mut self,
        param: &str,
        body: impl FnOnce(&mut Self) -> Result<NodeId, CompileError>,
    ) -> Result<NodeId, CompileError> {
        self.params.push(param.to_string());
        let body = body(self);
        self.params.pop();
        let body = body?;
        Ok(self.emit(
            OpCode::Lambda,
            vec![GraphArg::Node(body)],
            Some(Value::from(param)),
        ))
    }

    fn lower_call(
        &mut self,
        node: &Arc<Expr>,
        callee: &Arc<Expr>,
        args: &[Arc<Expr>],
    ) -> Result<NodeId, CompileError> {
        let Some(path) = callee.as_path() else {
            return Err(CompileError::UnsupportedConstruct {
                construct: format!("call on computed callee `{callee}`"),
            });
        };
        let temporal = match path.as_slice() {
            [name] if !self.inputs.contains_key(name) && !self.params.contains(name) => {
                OperatorRegistry::temporal_call(name)
            }
            _ => None,
        };
        let Some(meta) = temporal else {
            let lowered = self.lower_all(args)?;
            return Ok(self.emit(OpCode::Call, lowered, Some(Value::from(path.join(".")))));
        };
        if !meta.arity.accepts(args.len()) {
            return Err(CompileError::InvalidExpression {
                expr: node.key(),
                reason: format!(
                    "`{}` takes {:?} arguments, got {}",
                    meta.name,
                    meta.arity,
                    args.len()
                ),
            });
        }
        let lowered = match meta.op {
            OpCode::RollingWindow => {
                let mut lowered = self.lower_all(&args[..2])?;
                lowered.push(GraphArg::Node(self.lower_reducer(&args[2])?));
                lowered
            }
            _ => self.lower_all(args)?,
        };
        Ok(self.emit(meta.op, lowered, None))
    }

    /// Reducers name a function (`mean`) or are lambdas. A named reducer becomes
    /// `lambda(window) -> call(name, [param window])` so the graph only carries lambdas here.
    fn lower_reducer(&mut self, reducer: &Arc<Expr>) -> Result<NodeId, CompileError> {
        if let Expr::Lambda { .. } = reducer.as_ref() {
            return self.lower(reducer);
        }
        let Some(path) = reducer.as_path() else {
            return self.lower(reducer);
        };
        if path.len() == 1 && self.inputs.contains_key(&path[0]) {
            return self.lower(reducer);
        }
        self.stats.lowered_op_count += 1;
        self.lower_lambda("window", |ctx| {
            let window = ctx.emit(OpCode::Param, Vec::new(), Some(Value::from("window")));
            Ok(ctx.emit(
                OpCode::Call,
                vec![GraphArg::Node(window)],
                Some(Value::from(path.join("."))),
            ))
        })
    }
}

const fn binary_op(op: BinaryOp) -> OpCode {
    match op {
        BinaryOp::Add => OpCode::Add,
        BinaryOp::Sub => OpCode::Sub,
        BinaryOp::Mul => OpCode::Mul,
        BinaryOp::Div => OpCode::Div,
        BinaryOp::Pow => OpCode::Pow,
    }
}

const fn compare_op(op: CompareOp) -> OpCode {
    match op {
        CompareOp::Lt => OpCode::Lt,
        CompareOp::Le => OpCode::Le,
        CompareOp::Gt => OpCode::Gt,
        CompareOp::Ge => OpCode::Ge,
        CompareOp::Eq => OpCode::Eq,
        CompareOp::Ne => OpCode::Ne,
    }
}
