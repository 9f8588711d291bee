//! Symbolic expression tree.
//!
//! Nodes are immutable and shared through `Arc`, so a sub-expression can sit under any
//! number of formulas without copying. Building a node never evaluates its operands.

use crate::types::Period;
use crate::value::{ArithOp, CmpOp, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    pub const fn arith(self) -> ArithOp {
        match self {
            Self::Add => ArithOp::Add,
            Self::Sub => ArithOp::Sub,
            Self::Mul => ArithOp::Mul,
            Self::Div => ArithOp::Div,
            Self::Pow => ArithOp::Pow,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CompareOp {
    pub const fn cmp(self) -> CmpOp {
        match self {
            Self::Lt => CmpOp::Lt,
            Self::Le => CmpOp::Le,
            Self::Gt => CmpOp::Gt,
            Self::Ge => CmpOp::Ge,
            Self::Eq => CmpOp::Eq,
            Self::Ne => CmpOp::Ne,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Const(Value),
    Name(String),
    Attribute {
        base: Arc<Expr>,
        attr: String,
    },
    Binary {
        op: BinaryOp,
        lhs: Arc<Expr>,
        rhs: Arc<Expr>,
    },
    Compare {
        op: CompareOp,
        lhs: Arc<Expr>,
        rhs: Arc<Expr>,
    },
    Logical {
        op: LogicalOp,
        lhs: Arc<Expr>,
        rhs: Arc<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Arc<Expr>,
    },
    /// History offset or plain subscript, decided at evaluation time.
    Index {
        target: Arc<Expr>,
        index: Arc<Expr>,
    },
    Call {
        callee: Arc<Expr>,
        args: Vec<Arc<Expr>>,
    },
    List(Vec<Arc<Expr>>),
    Lambda {
        param: String,
        body: Arc<Expr>,
    },
    Scheduled {
        expr: Arc<Expr>,
        period: Period,
    },
    /// Placeholder left behind when expression capture fails.
    Opaque(String),
}

impl Expr {
    pub fn constant(value: impl Into<Value>) -> Arc<Self> {
        Arc::new(Self::Const(value.into()))
    }

    pub fn name(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::Name(name.into()))
    }

    pub fn attribute(base: Arc<Expr>, attr: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::Attribute {
            base,
            attr: attr.into(),
        })
    }

    pub fn call(callee: Arc<Expr>, args: Vec<Arc<Expr>>) -> Arc<Self> {
        Arc::new(Self::Call { callee, args })
    }

    /// Call of a plain named function, e.g. `since(...)`.
    pub fn call_named(name: &str, args: Vec<Arc<Expr>>) -> Arc<Self> {
        Self::call(Self::name(name), args)
    }

    /// Builds the callee node for a dotted path (`geo.distance.geodesic`).
    pub fn path(segments: &[String]) -> Arc<Self> {
        let mut iter = segments.iter();
        let first = iter.next().map(String::as_str).unwrap_or_default();
        iter.fold(Self::name(first), |base, seg| Self::attribute(base, seg.clone()))
    }

    /// Name/attribute chain as path segments, or `None` for any other shape.
    pub fn as_path(&self) -> Option<Vec<String>> {
        match self {
            Self::Name(name) => Some(vec![name.clone()]),
            Self::Attribute { base, attr } => {
                let mut path = base.as_path()?;
                path.push(attr.clone());
                Some(path)
            }
            _ => None,
        }
    }

    /// Root name of a name/attribute chain.
    pub fn root_name(&self) -> Option<&str> {
        match self {
            Self::Name(name) => Some(name),
            Self::Attribute { base, .. } => base.root_name(),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Const(_) => "const",
            Self::Name(_) => "name",
            Self::Attribute { .. } => "attribute",
            Self::Binary { .. } => "binary",
            Self::Compare { .. } => "compare",
            Self::Logical { .. } => "logical",
            Self::Unary { .. } => "unary",
            Self::Index { .. } => "index",
            Self::Call { .. } => "call",
            Self::List(_) => "list",
            Self::Lambda { .. } => "lambda",
            Self::Scheduled { .. } => "scheduled",
            Self::Opaque(_) => "opaque",
        }
    }

    /// Canonical text of this node; keys history sequences and temporal state.
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// Visits every node in pre-order.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        match self {
            Self::Const(_) | Self::Name(_) | Self::Opaque(_) => {}
            Self::Attribute { base, .. } => base.walk(visit),
            Self::Binary { lhs, rhs, .. }
            | Self::Compare { lhs, rhs, .. }
            | Self::Logical { lhs, rhs, .. } => {
                lhs.walk(visit);
                rhs.walk(visit);
            }
            Self::Unary { expr, .. } | Self::Scheduled { expr, .. } => expr.walk(visit),
            Self::Index { target, index } => {
                target.walk(visit);
                index.walk(visit);
            }
            Self::Call { callee, args } => {
                callee.walk(visit);
                for arg in args {
                    arg.walk(visit);
                }
            }
            Self::List(items) => {
                for item in items {
                    item.walk(visit);
                }
            }
            Self::Lambda { body, .. } => body.walk(visit),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.arith().symbol())
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cmp().symbol())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const(value) => write!(f, "{value}"),
            Self::Name(name) => f.write_str(name),
            Self::Attribute { base, attr } => write!(f, "{base}.{attr}"),
            Self::Binary { op, lhs, rhs } => write!(f, "({lhs} {op} {rhs})"),
            Self::Compare { op, lhs, rhs } => write!(f, "({lhs} {op} {rhs})"),
            Self::Logical { op, lhs, rhs } => {
                let symbol = match op {
                    LogicalOp::And => "&",
                    LogicalOp::Or => "|",
                };
                write!(f, "({lhs} {symbol} {rhs})")
            }
            Self::Unary { op, expr } => match op {
                UnaryOp::Not => write!(f, "~{expr}"),
                UnaryOp::Neg => write!(f, "-{expr}"),
            },
            Self::Index { target, index } => write!(f, "{target}[{index}]"),
            Self::Call { callee, args } => {
                write!(f, "{callee}(")?;
                write_joined(f, args)?;
                write!(f, ")")
            }
            Self::List(items) => {
                write!(f, "[")?;
                write_joined(f, items)?;
                write!(f, "]")
            }
            Self::Lambda { param, body } => write!(f, "|{param}| {body}"),
            Self::Scheduled { expr, period } => write!(f, "every({expr}, {period})"),
            Self::Opaque(desc) => write!(f, "<opaque {desc}>"),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Arc<Expr>]) -> fmt::Result {
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}
