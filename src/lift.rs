//! Lifting of host callables and namespaces into the symbolic layer.
//!
//! A lifted function called with only literal arguments runs immediately. As soon as one
//! argument is symbolic the call is deferred into an [`Expr::Call`] node instead.

use crate::error::EvalError;
use crate::expr::Expr;
use crate::formula::{Formula, FormulaOps, IntoExpr, ScheduledFormula};
use crate::stream::{FieldStream, InputStream, Stream};
use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub type NativeFn = Arc<dyn Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync>;

pub fn native<F>(f: F) -> NativeFn
where
    F: Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Call argument: either a concrete value or an expression payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Literal(Value),
    Symbolic(Arc<Expr>),
}

impl Arg {
    #[inline]
    pub fn is_symbolic(&self) -> bool {
        matches!(self, Self::Symbolic(_))
    }
}

impl IntoExpr for Arg {
    fn into_expr(self) -> Arc<Expr> {
        match self {
            Self::Literal(value) => Expr::constant(value),
            Self::Symbolic(node) => node,
        }
    }
}

macro_rules! literal_arg {
    ($($lit:ty),*) => {
        $(
            impl From<$lit> for Arg {
                fn from(v: $lit) -> Self {
                    Self::Literal(Value::from(v))
                }
            }
        )*
    };
}

literal_arg!(Value, bool, i32, i64, f64, &str, String);

macro_rules! symbolic_arg {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Arg {
                fn from(v: $ty) -> Self {
                    Self::Symbolic(v.into_expr())
                }
            }
        )*
    };
}

symbolic_arg!(
    Formula,
    &Formula,
    ScheduledFormula,
    Stream,
    &Stream,
    FieldStream,
    &FieldStream,
    InputStream,
    Arc<Expr>
);

/// Outcome of calling a lifted function.
#[derive(Debug, Clone, PartialEq)]
pub enum Lifted {
    Value(Value),
    Formula(Formula),
}

impl Lifted {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::Formula(_) => None,
        }
    }

    pub fn formula(&self) -> Option<&Formula> {
        match self {
            Self::Formula(f) => Some(f),
            Self::Value(_) => None,
        }
    }

    /// Literal results become constant formulas.
    pub fn into_formula(self) -> Formula {
        match self {
            Self::Value(v) => Formula::constant(v),
            Self::Formula(f) => f,
        }
    }
}

impl IntoExpr for Lifted {
    fn into_expr(self) -> Arc<Expr> {
        self.into_formula().into_node()
    }
}

impl FormulaOps for Lifted {}

/// A host callable plus the dotted path it is reachable under.
#[derive(Clone)]
pub struct FunctionRef {
    path: Vec<String>,
    func: NativeFn,
}

impl fmt::Debug for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRef")
            .field("path", &self.path.join("."))
            .finish_non_exhaustive()
    }
}

/// Wraps `callable` without invoking it.
pub fn lift(name: impl Into<String>, callable: NativeFn) -> FunctionRef {
    FunctionRef {
        path: vec![name.into()],
        func: callable,
    }
}

impl FunctionRef {
    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn name(&self) -> String {
        self.path.join(".")
    }

    pub fn native(&self) -> &NativeFn {
        &self.func
    }

    pub fn invoke(&self, args: &[Value]) -> Result<Value, EvalError> {
        (self.func)(args)
    }

    pub fn call<A: Into<Arg>>(&self, args: impl IntoIterator<Item = A>) -> Result<Lifted, EvalError> {
        let args: Vec<Arg> = args.into_iter().map(Into::into).collect();
        if args.iter().any(Arg::is_symbolic) {
            let children = args.into_iter().map(IntoExpr::into_expr).collect();
            return Ok(Lifted::Formula(Formula::new(Expr::call(
                Expr::path(&self.path),
                children,
            ))));
        }
        let values: Vec<Value> = args
            .into_iter()
            .map(|arg| match arg {
                Arg::Literal(v) => v,
                Arg::Symbolic(_) => Value::Null,
            })
            .collect();
        self.invoke(&values).map(Lifted::Value)
    }
}

#[derive(Clone)]
pub enum Member {
    Function(NativeFn),
    Module(Namespace),
    Value(Value),
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(_) => f.write_str("Function(..)"),
            Self::Module(ns) => f.debug_tuple("Module").field(&ns.name).finish(),
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
        }
    }
}

/// A named collection of host members, e.g. a geodesy helper library.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    name: String,
    members: BTreeMap<String, Member>,
}

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_function(mut self, name: impl Into<String>, func: NativeFn) -> Self {
        self.members.insert(name.into(), Member::Function(func));
        self
    }

    pub fn with_module(mut self, module: Namespace) -> Self {
        self.members
            .insert(module.name.clone(), Member::Module(module));
        self
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.members.insert(name.into(), Member::Value(value.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    /// Walks nested modules along `path` (relative to this namespace).
    pub fn resolve(&self, path: &[String]) -> Option<&Member> {
        let (head, rest) = path.split_first()?;
        let member = self.members.get(head)?;
        if rest.is_empty() {
            return Some(member);
        }
        match member {
            Member::Module(inner) => inner.resolve(rest),
            _ => None,
        }
    }
}

/// Lazily resolving view over a [`Namespace`].
#[derive(Debug, Clone)]
pub struct ModuleProxy {
    path: Vec<String>,
    namespace: Arc<Namespace>,
}

#[derive(Debug, Clone)]
pub enum ProxyMember {
    Module(ModuleProxy),
    Function(FunctionRef),
    Value(Value),
}

pub fn wrap_module(namespace: Namespace) -> ModuleProxy {
    ModuleProxy {
        path: vec![namespace.name.clone()],
        namespace: Arc::new(namespace),
    }
}

impl ModuleProxy {
    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn attr(&self, name: &str) -> Result<ProxyMember, EvalError> {
        let mut path = self.path.clone();
        path.push(name.to_string());
        match self.namespace.get(name) {
            Some(Member::Function(func)) => Ok(ProxyMember::Function(FunctionRef {
                path,
                func: func.clone(),
            })),
            Some(Member::Module(inner)) => Ok(ProxyMember::Module(ModuleProxy {
                path,
                namespace: Arc::new(inner.clone()),
            })),
            Some(Member::Value(v)) => Ok(ProxyMember::Value(v.clone())),
            None => Err(EvalError::UnresolvedReference {
                name: path.join("."),
            }),
        }
    }

    /// Shorthand for `attr(name)` that expects a function member.
    pub fn function(&self, name: &str) -> Result<FunctionRef, EvalError> {
        match self.attr(name)? {
            ProxyMember::Function(func) => Ok(func),
            _ => Err(EvalError::NotCallable {
                name: format!("{}.{name}", self.path.join(".")),
            }),
        }
    }
}
