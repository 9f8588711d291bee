//! Symbolic handles for unbounded data sources.

use crate::error::CompileError;
use crate::expr::Expr;
use crate::formula::{impl_symbolic_ops, FormulaOps, IntoExpr};
use crate::types::RecordType;
use std::sync::Arc;

/// A named data source with an optional declared record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stream {
    name: String,
    schema: Option<RecordType>,
}

impl Stream {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
        }
    }

    pub fn typed(name: impl Into<String>, schema: RecordType) -> Self {
        Self {
            name: name.into(),
            schema: Some(schema),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> Option<&RecordType> {
        self.schema.as_ref()
    }

    /// Attribute access; yields a new handle and leaves `self` untouched.
    pub fn field(&self, name: impl Into<String>) -> FieldStream {
        FieldStream {
            stream: self.clone(),
            path: vec![name.into()],
        }
    }

    /// Like [`Stream::field`] but rejects fields missing from the declared record type.
    pub fn checked_field(&self, name: &str) -> Result<FieldStream, CompileError> {
        match &self.schema {
            Some(schema) if !schema.contains(name) => Err(CompileError::UnknownField {
                stream: self.name.clone(),
                field: name.to_string(),
            }),
            _ => Ok(self.field(name)),
        }
    }
}

/// A stream plus an attribute chain (`gps.position.lat`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldStream {
    stream: Stream,
    path: Vec<String>,
}

impl FieldStream {
    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn field(&self, name: impl Into<String>) -> FieldStream {
        let mut path = self.path.clone();
        path.push(name.into());
        FieldStream {
            stream: self.stream.clone(),
            path,
        }
    }
}

/// A stream marked as a pipeline entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputStream {
    stream: Stream,
    timestamped: bool,
}

impl InputStream {
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_stream(Stream::new(name))
    }

    pub fn typed(name: impl Into<String>, schema: RecordType) -> Self {
        Self::from_stream(Stream::typed(name, schema))
    }

    pub fn from_stream(stream: Stream) -> Self {
        Self {
            stream,
            timestamped: false,
        }
    }

    /// Records of this input carry an event-time field (`time` by default), filled in by the
    /// pipeline when a pushed record lacks it.
    pub fn timestamped(mut self) -> Self {
        self.timestamped = true;
        self
    }

    pub fn is_timestamped(&self) -> bool {
        self.timestamped
    }

    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    pub fn name(&self) -> &str {
        self.stream.name()
    }

    pub fn field(&self, name: impl Into<String>) -> FieldStream {
        self.stream.field(name)
    }

    pub fn checked_field(&self, name: &str) -> Result<FieldStream, CompileError> {
        if self.timestamped && name == "time" {
            return Ok(self.stream.field(name));
        }
        self.stream.checked_field(name)
    }
}

impl IntoExpr for Stream {
    fn into_expr(self) -> Arc<Expr> {
        Expr::name(self.name)
    }
}

impl IntoExpr for &Stream {
    fn into_expr(self) -> Arc<Expr> {
        Expr::name(self.name.clone())
    }
}

impl IntoExpr for FieldStream {
    fn into_expr(self) -> Arc<Expr> {
        (&self).into_expr()
    }
}

impl IntoExpr for &FieldStream {
    fn into_expr(self) -> Arc<Expr> {
        self.path
            .iter()
            .fold(Expr::name(self.stream.name.clone()), |base, attr| {
                Expr::attribute(base, attr.clone())
            })
    }
}

impl IntoExpr for InputStream {
    fn into_expr(self) -> Arc<Expr> {
        self.stream.into_expr()
    }
}

impl IntoExpr for &InputStream {
    fn into_expr(self) -> Arc<Expr> {
        (&self.stream).into_expr()
    }
}

impl FormulaOps for Stream {}
impl FormulaOps for &Stream {}
impl FormulaOps for FieldStream {}
impl FormulaOps for &FieldStream {}
impl FormulaOps for InputStream {}
impl FormulaOps for &InputStream {}

impl_symbolic_ops!(Stream, FieldStream, InputStream);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldType;

    #[test]
    fn field_access_builds_attribute_chain() {
        let s = Stream::new("s");
        let lat = s.field("lat").hold();
        match lat.node().as_ref() {
            Expr::Attribute { base, attr } => {
                assert_eq!(attr, "lat");
                assert_eq!(base.as_ref(), &Expr::Name("s".to_string()));
            }
            other => panic!("unexpected node: {other:?}"),
        }
        assert_eq!(s.hold().node().as_ref(), &Expr::Name("s".to_string()));
    }

    #[test]
    fn checked_field_respects_schema() {
        let schema = RecordType::new("Intruder")
            .with_field("lat", FieldType::Float)
            .with_field("id", FieldType::Int);
        let intruder = InputStream::typed("intruder", schema).timestamped();
        assert!(intruder.checked_field("lat").is_ok());
        assert!(intruder.checked_field("time").is_ok());
        let err = intruder
            .checked_field("speed")
            .expect_err("undeclared field must fail");
        assert!(matches!(err, CompileError::UnknownField { .. }));
    }

    #[test]
    fn stream_operators_produce_formulas() {
        let a = Stream::new("a");
        let expr = a.field("value") + Stream::new("b").field("value");
        assert_eq!(expr.to_string(), "(a.value + b.value)");
    }
}
