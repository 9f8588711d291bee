use crate::capture::Capture;
use crate::error::CompileError;
use crate::expr::Expr;
use crate::formula::Formula;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

/// Where [`FormulaRegistry::compile`] takes its expression from.
pub enum FormulaSource<'a> {
    Captured(&'a dyn Capture),
    Expr(Arc<Expr>),
    Formula(Formula),
    /// Lookup of a previously stored formula. Never stores anything.
    Name(String),
}

impl From<Formula> for FormulaSource<'_> {
    fn from(f: Formula) -> Self {
        Self::Formula(f)
    }
}

impl From<Arc<Expr>> for FormulaSource<'_> {
    fn from(node: Arc<Expr>) -> Self {
        Self::Expr(node)
    }
}

impl From<&str> for FormulaSource<'_> {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    formulas: BTreeMap<String, Arc<Expr>>,
    last: Option<String>,
}

/// Named formula table. Use [`FormulaRegistry::global`] for the process-wide default or
/// construct isolated instances.
#[derive(Debug, Default)]
pub struct FormulaRegistry {
    inner: Mutex<RegistryInner>,
}

impl FormulaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static FormulaRegistry {
        static GLOBAL: OnceLock<FormulaRegistry> = OnceLock::new();
        GLOBAL.get_or_init(FormulaRegistry::new)
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores the source's expression under `name` (overwriting) or an autogenerated name,
    /// or looks up a stored formula for [`FormulaSource::Name`].
    pub fn compile<'a>(
        &self,
        source: impl Into<FormulaSource<'a>>,
        name: Option<&str>,
    ) -> Result<Formula, CompileError> {
        let node = match source.into() {
            FormulaSource::Name(lookup) => {
                return self
                    .get_formula_tree(&lookup)
                    .map(Formula::new)
                    .ok_or(CompileError::UnresolvedReference { name: lookup });
            }
            FormulaSource::Captured(capture) => match capture.capture() {
                Ok(node) => node,
                Err(failure) => {
                    tracing::warn!(
                        capture = %failure.target,
                        reason = %failure.reason,
                        "expression capture failed; storing opaque placeholder"
                    );
                    Arc::new(Expr::Opaque(capture.describe()))
                }
            },
            FormulaSource::Expr(node) => node,
            FormulaSource::Formula(formula) => formula.into_node(),
        };

        let mut inner = self.lock();
        let name = match name {
            Some(name) => name.to_string(),
            None => {
                // Numbered from the table size; skips names already taken.
                let mut n = inner.formulas.len() + 1;
                while inner.formulas.contains_key(&format!("formula_autogen_{n}")) {
                    n += 1;
                }
                format!("formula_autogen_{n}")
            }
        };
        tracing::debug!(name = %name, formula = %node, "formula registered");
        inner.formulas.insert(name.clone(), node.clone());
        inner.last = Some(name);
        Ok(Formula::new(node))
    }

    pub fn get_formula_tree(&self, name: &str) -> Option<Arc<Expr>> {
        self.lock().formulas.get(name).cloned()
    }

    pub fn get_all_formulas(&self) -> BTreeMap<String, Arc<Expr>> {
        self.lock().formulas.clone()
    }

    /// Name and tree of the most recently stored formula.
    pub fn last_compiled(&self) -> Option<(String, Arc<Expr>)> {
        let inner = self.lock();
        let name = inner.last.clone()?;
        let node = inner.formulas.get(&name)?.clone();
        Some((name, node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SourceCapture;
    use crate::formula::FormulaOps;
    use crate::stream::Stream;

    #[test]
    fn named_compile_then_lookup_returns_same_tree() {
        let registry = FormulaRegistry::new();
        let x = Stream::new("x");
        let stored = registry
            .compile(x.field("value").gt(5), Some("g"))
            .expect("store g");
        let looked_up = registry.compile("g", None).expect("lookup g");
        assert_eq!(Some(looked_up.node().clone()), registry.get_formula_tree("g"));
        assert_eq!(stored, looked_up);
    }

    #[test]
    fn missing_name_is_unresolved() {
        let registry = FormulaRegistry::new();
        let err = registry.compile("missing", None).expect_err("must fail");
        assert_eq!(
            err,
            CompileError::UnresolvedReference {
                name: "missing".to_string()
            }
        );
        assert!(registry.get_all_formulas().is_empty());
    }

    #[test]
    fn unnamed_formulas_get_autogenerated_names() {
        let registry = FormulaRegistry::new();
        registry.compile(Formula::var("a"), None).expect("first");
        registry.compile(Formula::var("b"), None).expect("second");
        let names: Vec<String> = registry.get_all_formulas().into_keys().collect();
        assert_eq!(names, vec!["formula_autogen_1", "formula_autogen_2"]);
        let (last, _) = registry.last_compiled().expect("last");
        assert_eq!(last, "formula_autogen_2");

        registry.compile(Formula::var("c"), Some("g")).expect("named");
        registry.compile(Formula::var("d"), None).expect("fourth");
        assert!(registry.get_formula_tree("formula_autogen_4").is_some());
    }

    #[test]
    fn registering_a_name_again_overwrites_it() {
        let registry = FormulaRegistry::new();
        let first = Formula::var("a").gt(1);
        let second = Formula::var("b").lt(2);
        registry.compile(first, Some("g")).expect("first");
        registry.compile(second.clone(), Some("g")).expect("second");
        assert_eq!(registry.get_formula_tree("g"), Some(second.node().clone()));
        assert_eq!(registry.get_all_formulas().len(), 1);
    }

    #[test]
    fn concurrent_compiles_and_lookups_stay_consistent() {
        let registry = FormulaRegistry::new();
        std::thread::scope(|scope| {
            for t in 0..8 {
                let registry = &registry;
                scope.spawn(move || {
                    for i in 0..50 {
                        let name = format!("t{t}_{i}");
                        let formula = Formula::var("x").gt(i64::from(i));
                        registry
                            .compile(formula.clone(), Some(name.as_str()))
                            .expect("store");
                        let stored = registry.get_formula_tree(&name).expect("present");
                        assert_eq!(stored, formula.node().clone());
                        registry.compile(Formula::var("y"), None).expect("autogen");
                    }
                });
            }
        });
        // Every named and every autogenerated entry survived.
        assert_eq!(registry.get_all_formulas().len(), 8 * 50 * 2);
    }

    #[test]
    fn capture_failure_stores_opaque_placeholder() {
        let registry = FormulaRegistry::new();
        let broken = SourceCapture::new("x.value >");
        let formula = registry
            .compile(FormulaSource::Captured(&broken), Some("broken"))
            .expect("fallback");
        assert!(matches!(formula.node().as_ref(), Expr::Opaque(_)));
    }
}
