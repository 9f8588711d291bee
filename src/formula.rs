//! Formula handles and the operator algebra that builds them.

use crate::expr::{BinaryOp, CompareOp, Expr, LogicalOp, UnaryOp};
use crate::types::Period;
use crate::value::Value;
use std::fmt;
use std::ops::{Add, BitAnd, BitOr, Div, Mul, Neg, Not, Sub};
use std::sync::Arc;

/// Anything that can stand as an operand of a formula: formulas, stream handles, literals.
pub trait IntoExpr {
    fn into_expr(self) -> Arc<Expr>;
}

/// Handle over exactly one expression root.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    node: Arc<Expr>,
}

impl Formula {
    pub fn new(node: Arc<Expr>) -> Self {
        Self { node }
    }

    /// `Formula(const(v))`
    pub fn constant(value: impl Into<Value>) -> Self {
        Self::new(Expr::constant(value))
    }

    /// Free variable resolved against the evaluation environment.
    pub fn var(name: impl Into<String>) -> Self {
        Self::new(Expr::name(name))
    }

    #[inline]
    pub fn node(&self) -> &Arc<Expr> {
        &self.node
    }

    pub fn into_node(self) -> Arc<Expr> {
        self.node
    }

    /// Attribute access on the formula's value (`x.value`).
    pub fn attr(&self, name: impl Into<String>) -> Formula {
        Formula::new(Expr::attribute(self.node.clone(), name))
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.node)
    }
}

/// A formula tagged with an evaluation cadence. Produced only by [`FormulaOps::every`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledFormula {
    node: Arc<Expr>,
}

impl ScheduledFormula {
    #[inline]
    pub fn node(&self) -> &Arc<Expr> {
        &self.node
    }

    pub fn formula(&self) -> Formula {
        match self.node.as_ref() {
            Expr::Scheduled { expr, .. } => Formula::new(expr.clone()),
            _ => Formula::new(self.node.clone()),
        }
    }

    pub fn period(&self) -> Period {
        match self.node.as_ref() {
            Expr::Scheduled { period, .. } => *period,
            _ => Period::seconds(0.0),
        }
    }
}

impl fmt::Display for ScheduledFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.node)
    }
}

/// Named builders shared by every symbolic handle.
///
/// Comparisons and boolean algebra live here because Rust's comparison traits must return
/// `bool`. `&`, `|` and `!` are also available as operators and build the same nodes.
pub trait FormulaOps: IntoExpr + Sized {
    fn hold(self) -> Formula {
        Formula::new(self.into_expr())
    }

    fn lt(self, rhs: impl IntoExpr) -> Formula {
        compare(CompareOp::Lt, self, rhs)
    }

    fn le(self, rhs: impl IntoExpr) -> Formula {
        compare(CompareOp::Le, self, rhs)
    }

    fn gt(self, rhs: impl IntoExpr) -> Formula {
        compare(CompareOp::Gt, self, rhs)
    }

    fn ge(self, rhs: impl IntoExpr) -> Formula {
        compare(CompareOp::Ge, self, rhs)
    }

    fn eq_(self, rhs: impl IntoExpr) -> Formula {
        compare(CompareOp::Eq, self, rhs)
    }

    fn ne_(self, rhs: impl IntoExpr) -> Formula {
        compare(CompareOp::Ne, self, rhs)
    }

    fn and_(self, rhs: impl IntoExpr) -> Formula {
        logical(LogicalOp::And, self, rhs)
    }

    fn or_(self, rhs: impl IntoExpr) -> Formula {
        logical(LogicalOp::Or, self, rhs)
    }

    fn not_(self) -> Formula {
        unary(UnaryOp::Not, self)
    }

    fn pow(self, rhs: impl IntoExpr) -> Formula {
        binary(BinaryOp::Pow, self, rhs)
    }

    /// `x[-1]`: history offset for negative/symbolic indices, subscript otherwise.
    fn at(self, index: impl IntoExpr) -> Formula {
        Formula::new(Arc::new(Expr::Index {
            target: self.into_expr(),
            index: index.into_expr(),
        }))
    }

    /// Most recent observed value.
    fn last(self) -> Formula {
        Formula::new(Expr::call_named("last", vec![self.into_expr()]))
    }

    fn every(self, period: Period) -> ScheduledFormula {
        ScheduledFormula {
            node: Arc::new(Expr::Scheduled {
                expr: self.into_expr(),
                period,
            }),
        }
    }
}

impl FormulaOps for Formula {}
impl FormulaOps for &Formula {}
impl FormulaOps for ScheduledFormula {}

pub(crate) fn binary(op: BinaryOp, lhs: impl IntoExpr, rhs: impl IntoExpr) -> Formula {
    Formula::new(Arc::new(Expr::Binary {
        op,
        lhs: lhs.into_expr(),
        rhs: rhs.into_expr(),
    }))
}

fn compare(op: CompareOp, lhs: impl IntoExpr, rhs: impl IntoExpr) -> Formula {
    Formula::new(Arc::new(Expr::Compare {
        op,
        lhs: lhs.into_expr(),
        rhs: rhs.into_expr(),
    }))
}

pub(crate) fn logical(op: LogicalOp, lhs: impl IntoExpr, rhs: impl IntoExpr) -> Formula {
    Formula::new(Arc::new(Expr::Logical {
        op,
        lhs: lhs.into_expr(),
        rhs: rhs.into_expr(),
    }))
}

pub(crate) fn unary(op: UnaryOp, operand: impl IntoExpr) -> Formula {
    Formula::new(Arc::new(Expr::Unary {
        op,
        expr: operand.into_expr(),
    }))
}

/// Implements the std operator traits for a symbolic handle type.
macro_rules! impl_symbolic_ops {
    ($($ty:ty),* $(,)?) => {
        $(
            impl<R: $crate::formula::IntoExpr> ::std::ops::Add<R> for $ty {
                type Output = $crate::formula::Formula;
                fn add(self, rhs: R) -> Self::Output {
                    $crate::formula::binary($crate::expr::BinaryOp::Add, self, rhs)
                }
            }
            impl<R: $crate::formula::IntoExpr> ::std::ops::Sub<R> for $ty {
                type Output = $crate::formula::Formula;
                fn sub(self, rhs: R) -> Self::Output {
                    $crate::formula::binary($crate::expr::BinaryOp::Sub, self, rhs)
                }
            }
            impl<R: $crate::formula::IntoExpr> ::std::ops::Mul<R> for $ty {
                type Output = $crate::formula::Formula;
                fn mul(self, rhs: R) -> Self::Output {
                    $crate::formula::binary($crate::expr::BinaryOp::Mul, self, rhs)
                }
            }
            impl<R: $crate::formula::IntoExpr> ::std::ops::Div<R> for $ty {
                type Output = $crate::formula::Formula;
                fn div(self, rhs: R) -> Self::Output {
                    $crate::formula::binary($crate::expr::BinaryOp::Div, self, rhs)
                }
            }
            impl<R: $crate::formula::IntoExpr> ::std::ops::BitAnd<R> for $ty {
                type Output = $crate::formula::Formula;
                fn bitand(self, rhs: R) -> Self::Output {
                    $crate::formula::FormulaOps::and_(self, rhs)
                }
            }
            impl<R: $crate::formula::IntoExpr> ::std::ops::BitOr<R> for $ty {
                type Output = $crate::formula::Formula;
                fn bitor(self, rhs: R) -> Self::Output {
                    $crate::formula::FormulaOps::or_(self, rhs)
                }
            }
            impl ::std::ops::Not for $ty {
                type Output = $crate::formula::Formula;
                fn not(self) -> Self::Output {
                    $crate::formula::FormulaOps::not_(self)
                }
            }
            impl ::std::ops::Neg for $ty {
                type Output = $crate::formula::Formula;
                fn neg(self) -> Self::Output {
                    $crate::formula::unary($crate::expr::UnaryOp::Neg, self)
                }
            }
        )*
    };
}

pub(crate) use impl_symbolic_ops;

impl_symbolic_ops!(Formula, ScheduledFormula);

impl<R: IntoExpr> Add<R> for &Formula {
    type Output = Formula;
    fn add(self, rhs: R) -> Formula {
        binary(BinaryOp::Add, self, rhs)
    }
}

impl<R: IntoExpr> Sub<R> for &Formula {
    type Output = Formula;
    fn sub(self, rhs: R) -> Formula {
        binary(BinaryOp::Sub, self, rhs)
    }
}

impl<R: IntoExpr> Mul<R> for &Formula {
    type Output = Formula;
    fn mul(self, rhs: R) -> Formula {
        binary(BinaryOp::Mul, self, rhs)
    }
}

impl<R: IntoExpr> Div<R> for &Formula {
    type Output = Formula;
    fn div(self, rhs: R) -> Formula {
        binary(BinaryOp::Div, self, rhs)
    }
}

impl<R: IntoExpr> BitAnd<R> for &Formula {
    type Output = Formula;
    fn bitand(self, rhs: R) -> Formula {
        logical(LogicalOp::And, self, rhs)
    }
}

impl<R: IntoExpr> BitOr<R> for &Formula {
    type Output = Formula;
    fn bitor(self, rhs: R) -> Formula {
        logical(LogicalOp::Or, self, rhs)
    }
}

impl Not for &Formula {
    type Output = Formula;
    fn not(self) -> Formula {
        unary(UnaryOp::Not, self)
    }
}

impl Neg for &Formula {
    type Output = Formula;
    fn neg(self) -> Formula {
        unary(UnaryOp::Neg, self)
    }
}

// Literal on the left: `2.0 * x`, `1 - x`.
macro_rules! impl_literal_lhs {
    ($($lit:ty),*) => {
        $(
            impl Add<Formula> for $lit {
                type Output = Formula;
                fn add(self, rhs: Formula) -> Formula {
                    binary(BinaryOp::Add, self, rhs)
                }
            }
            impl Sub<Formula> for $lit {
                type Output = Formula;
                fn sub(self, rhs: Formula) -> Formula {
                    binary(BinaryOp::Sub, self, rhs)
                }
            }
            impl Mul<Formula> for $lit {
                type Output = Formula;
                fn mul(self, rhs: Formula) -> Formula {
                    binary(BinaryOp::Mul, self, rhs)
                }
            }
            impl Div<Formula> for $lit {
                type Output = Formula;
                fn div(self, rhs: Formula) -> Formula {
                    binary(BinaryOp::Div, self, rhs)
                }
            }
        )*
    };
}

impl_literal_lhs!(f64, i64);

impl IntoExpr for Formula {
    fn into_expr(self) -> Arc<Expr> {
        self.node
    }
}

impl IntoExpr for &Formula {
    fn into_expr(self) -> Arc<Expr> {
        self.node.clone()
    }
}

impl IntoExpr for ScheduledFormula {
    fn into_expr(self) -> Arc<Expr> {
        self.node
    }
}

impl IntoExpr for &ScheduledFormula {
    fn into_expr(self) -> Arc<Expr> {
        self.node.clone()
    }
}

impl IntoExpr for Arc<Expr> {
    fn into_expr(self) -> Arc<Expr> {
        self
    }
}

impl IntoExpr for Expr {
    fn into_expr(self) -> Arc<Expr> {
        Arc::new(self)
    }
}

impl IntoExpr for Value {
    fn into_expr(self) -> Arc<Expr> {
        Expr::constant(self)
    }
}

macro_rules! impl_literal_operand {
    ($($lit:ty),*) => {
        $(
            impl IntoExpr for $lit {
                fn into_expr(self) -> Arc<Expr> {
                    Expr::constant(Value::from(self))
                }
            }
        )*
    };
}

impl_literal_operand!(bool, i32, i64, f64, &str, String);

/// Tuples become list nodes, e.g. `(lat, lon)` coordinate pairs.
impl<A: IntoExpr, B: IntoExpr> IntoExpr for (A, B) {
    fn into_expr(self) -> Arc<Expr> {
        Arc::new(Expr::List(vec![self.0.into_expr(), self.1.into_expr()]))
    }
}

impl<T: IntoExpr> IntoExpr for Vec<T> {
    fn into_expr(self) -> Arc<Expr> {
        Arc::new(Expr::List(self.into_iter().map(IntoExpr::into_expr).collect()))
    }
}
