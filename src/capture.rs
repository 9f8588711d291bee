//! Expression capture front ends.
//!
//! The registry only sees the [`Capture`] trait; a failed capture is recovered there into
//! an opaque placeholder node.

use crate::compile_expr::parse_expression;
use crate::error::CaptureFailure;
use crate::expr::Expr;
use crate::formula::Formula;
use crate::temporal::lambda;
use std::sync::Arc;

pub trait Capture {
    fn capture(&self) -> Result<Arc<Expr>, CaptureFailure>;

    /// Short description used when capture fails.
    fn describe(&self) -> String {
        "<capture>".to_string()
    }
}

/// Zero-argument closure whose returned formula is the captured body.
pub struct Thunk<F> {
    body: F,
}

impl<F: Fn() -> Formula> Thunk<F> {
    pub fn new(body: F) -> Self {
        Self { body }
    }
}

impl<F: Fn() -> Formula> Capture for Thunk<F> {
    fn capture(&self) -> Result<Arc<Expr>, CaptureFailure> {
        Ok((self.body)().into_node())
    }

    fn describe(&self) -> String {
        "thunk".to_string()
    }
}

/// One-argument closure captured as an [`Expr::Lambda`].
pub struct Lambda<F> {
    param: String,
    body: F,
}

impl<F: Fn(Formula) -> Formula> Lambda<F> {
    pub fn new(param: impl Into<String>, body: F) -> Self {
        Self {
            param: param.into(),
            body,
        }
    }
}

impl<F: Fn(Formula) -> Formula> Capture for Lambda<F> {
    fn capture(&self) -> Result<Arc<Expr>, CaptureFailure> {
        Ok(lambda(self.param.clone(), |x| (self.body)(x)).into_node())
    }

    fn describe(&self) -> String {
        format!("|{}| ..", self.param)
    }
}

/// Formula source text, e.g. `|x| x.value > 5` or `a.value + b.value`.
#[derive(Debug, Clone)]
pub struct SourceCapture {
    text: String,
}

impl SourceCapture {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Capture for SourceCapture {
    fn capture(&self) -> Result<Arc<Expr>, CaptureFailure> {
        parse_expression(&self.text).map_err(|err| CaptureFailure {
            target: self.text.clone(),
            reason: err.to_string(),
        })
    }

    fn describe(&self) -> String {
        self.text.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::FormulaOps;

    #[test]
    fn closure_and_source_capture_agree() {
        let from_closure = Lambda::new("x", |x| x.attr("value").gt(5))
            .capture()
            .expect("closure capture");
        let from_source = SourceCapture::new("|x| x.value > 5")
            .capture()
            .expect("source capture");
        assert_eq!(from_closure, from_source);
    }

    #[test]
    fn unparsable_source_reports_failure() {
        let err = SourceCapture::new("x.value >")
            .capture()
            .expect_err("must fail");
        assert_eq!(err.target, "x.value >");
    }
}
