use thiserror::Error;

/// Raised by an expression-capture front end that could not recover a function body.
///
/// Never fatal on its own: the registry substitutes an opaque placeholder node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not capture expression for `{target}`: {reason}")]
pub struct CaptureFailure {
    pub target: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("formula `{name}` referenced before compiled")]
    UnresolvedReference { name: String },
    #[error("no lowering rule for `{construct}`")]
    UnsupportedConstruct { construct: String },
    #[error("stream `{name}` is not bound to an input")]
    MissingInputBinding { name: String },
    #[error("invalid expression `{expr}`: {reason}")]
    InvalidExpression { expr: String, reason: String },
    #[error("stream `{stream}` has no field `{field}`")]
    UnknownField { stream: String, field: String },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("unresolved reference `{name}`")]
    UnresolvedReference { name: String },
    #[error("type mismatch in `{op}`: {lhs} vs {rhs}")]
    TypeMismatch {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },
    #[error("history of `{key}` holds {len} values, offset {offset} requested")]
    HistoryUnderflow { key: String, offset: i64, len: usize },
    #[error("`{base}` has no attribute `{attr}`")]
    MissingAttribute { base: String, attr: String },
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("`{name}` is not callable")]
    NotCallable { name: String },
    #[error("invalid arguments for `{name}`: {reason}")]
    InvalidArguments { name: String, reason: String },
    #[error("cannot evaluate `{construct}`")]
    UnsupportedConstruct { construct: String },
    #[error("callable `{name}` failed: {reason}")]
    Callable { name: String, reason: String },
}

impl EvalError {
    pub(crate) fn invalid_args(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
