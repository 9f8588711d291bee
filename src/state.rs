use crate::error::EvalError;
use crate::lift::{FunctionRef, Member, NativeFn, Namespace};
use crate::ops::TemporalState;
use crate::types::EvalOptions;
use crate::value::{Record, Value};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;

/// Append-only record of observed values for one key, addressed by offsets.
///
/// `-1` is the most recent entry, `-len` the oldest. Non-negative offsets count from the
/// oldest retained entry. With a capacity, the oldest entries are evicted ring-buffer style.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistorySequence {
    data: VecDeque<Value>,
    cap: Option<usize>,
}

impl HistorySequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bounded(cap: usize) -> Self {
        Self {
            data: VecDeque::with_capacity(cap.max(1)),
            cap: Some(cap.max(1)),
        }
    }

    pub fn with_capacity(cap: Option<usize>) -> Self {
        cap.map_or_else(Self::new, Self::bounded)
    }

    #[inline]
    pub fn append(&mut self, value: Value) {
        if let Some(cap) = self.cap {
            if self.data.len() == cap {
                self.data.pop_front();
            }
        }
        self.data.push_back(value);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// `lag = 0` is the latest entry.
    #[inline]
    pub fn get_lag(&self, lag: usize) -> Option<&Value> {
        if lag >= self.data.len() {
            return None;
        }
        self.data.get(self.data.len() - 1 - lag)
    }

    #[inline]
    pub fn latest(&self) -> Option<&Value> {
        self.data.back()
    }

    pub fn get_by_index(&self, index: i64) -> Option<&Value> {
        if index < 0 {
            self.get_lag(index.unsigned_abs() as usize - 1)
        } else {
            self.data.get(index as usize)
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.data.iter()
    }
}

impl<V: Into<Value>> FromIterator<V> for HistorySequence {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self {
            data: iter.into_iter().map(Into::into).collect(),
            cap: None,
        }
    }
}

/// What a name resolves to during evaluation.
#[derive(Clone)]
pub enum Binding {
    Value(Value),
    /// Pre-recorded observations; the name evaluates to the latest one.
    History,
    Function(NativeFn),
    Module(Namespace),
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::History => f.write_str("History"),
            Self::Function(_) => f.write_str("Function(..)"),
            Self::Module(ns) => f.debug_tuple("Module").field(&ns.name()).finish(),
        }
    }
}

/// A callable found while resolving a callee path.
pub(crate) enum Resolved<'a> {
    Function(&'a NativeFn),
    Value(&'a Value),
    Module,
}

/// Runtime context of one evaluator: bindings, histories, temporal state and time.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    bindings: HashMap<String, Binding>,
    histories: HashMap<String, HistorySequence>,
    temporal: HashMap<String, TemporalState>,
    locals: Vec<(String, Value)>,
    scopes: Vec<String>,
    observed: HashSet<String>,
    record: Option<Record>,
    clock: Option<f64>,
    ticks: u64,
    options: EvalOptions,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: EvalOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn options(&self) -> &EvalOptions {
        &self.options
    }

    pub fn bind(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.bindings.insert(name.into(), Binding::Value(value.into()));
    }

    pub fn bind_history(&mut self, name: impl Into<String>, history: HistorySequence) {
        let name = name.into();
        self.histories.insert(name.clone(), history);
        self.bindings.insert(name, Binding::History);
    }

    pub fn bind_function(&mut self, func: &FunctionRef) {
        self.bindings
            .insert(func.name(), Binding::Function(func.native().clone()));
    }

    pub fn bind_module(&mut self, namespace: Namespace) {
        self.bindings
            .insert(namespace.name().to_string(), Binding::Module(namespace));
    }

    pub fn unbind(&mut self, name: &str) -> Option<Binding> {
        self.bindings.remove(name)
    }

    pub fn binding(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    /// Record lambdas in argument position are applied to.
    pub fn set_record(&mut self, record: Record) {
        self.record = Some(record);
    }

    pub fn record(&self) -> Option<&Record> {
        self.record.as_ref()
    }

    pub fn set_clock(&mut self, now: f64) {
        self.clock = Some(now);
    }

    pub fn clock(&self) -> Option<f64> {
        self.clock
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Evaluation time: the clock when set, otherwise the number of passes so far.
    #[inline]
    pub fn now(&self) -> f64 {
        self.clock.unwrap_or(self.ticks as f64)
    }

    pub fn history(&self, key: &str) -> Option<&HistorySequence> {
        self.histories.get(&self.scoped(key))
    }

    pub fn history_keys(&self) -> impl Iterator<Item = &str> {
        self.histories.keys().map(String::as_str)
    }

    pub(crate) fn begin_pass(&mut self) {
        self.ticks += 1;
        self.observed.clear();
    }

    /// Appends `value` to the history of `key`, at most once per pass.
    pub(crate) fn observe(&mut self, key: &str, value: &Value) {
        let scoped = self.scoped(key);
        if !self.observed.insert(scoped.clone()) {
            return;
        }
        if matches!(self.bindings.get(key), Some(Binding::History)) {
            return;
        }
        tracing::trace!(key = %scoped, value = %value, "history append");
        let cap = self.options.history_capacity;
        self.histories
            .entry(scoped)
            .or_insert_with(|| HistorySequence::with_capacity(cap))
            .append(value.clone());
    }

    pub(crate) fn lookup(&self, name: &str) -> Result<Value, EvalError> {
        if let Some((_, v)) = self.locals.iter().rev().find(|(local, _)| local == name) {
            return Ok(v.clone());
        }
        match self.bindings.get(name) {
            Some(Binding::Value(v)) => Ok(v.clone()),
            Some(Binding::History) => self
                .histories
                .get(name)
                .and_then(HistorySequence::latest)
                .cloned()
                .ok_or_else(|| EvalError::HistoryUnderflow {
                    key: name.to_string(),
                    offset: -1,
                    len: 0,
                }),
            Some(Binding::Function(_)) | Some(Binding::Module(_)) => {
                Err(EvalError::UnsupportedConstruct {
                    construct: format!("`{name}` used as a value"),
                })
            }
            None => Err(EvalError::UnresolvedReference {
                name: name.to_string(),
            }),
        }
    }

    pub(crate) fn is_local(&self, name: &str) -> bool {
        self.locals.iter().any(|(local, _)| local == name)
    }

    /// Resolves a callee path against bindings. `None` means the root name is unbound.
    pub(crate) fn resolve_path(&self, path: &[String]) -> Option<Result<Resolved<'_>, EvalError>> {
        let (head, rest) = path.split_first()?;
        let binding = self.bindings.get(head)?;
        let unresolved = || EvalError::UnresolvedReference {
            name: path.join("."),
        };
        Some(match (binding, rest.is_empty()) {
            (Binding::Function(func), true) => Ok(Resolved::Function(func)),
            (Binding::Module(_), true) => Ok(Resolved::Module),
            (Binding::Module(ns), false) => match ns.resolve(rest) {
                Some(Member::Function(func)) => Ok(Resolved::Function(func)),
                Some(Member::Value(v)) => Ok(Resolved::Value(v)),
                Some(Member::Module(_)) => Ok(Resolved::Module),
                None => Err(unresolved()),
            },
            (Binding::Value(v), true) => Ok(Resolved::Value(v)),
            _ => Err(unresolved()),
        })
    }

    pub(crate) fn push_local(&mut self, name: &str, value: Value) {
        self.locals.push((name.to_string(), value));
    }

    pub(crate) fn pop_local(&mut self) {
        self.locals.pop();
    }

    pub(crate) fn scoped(&self, key: &str) -> String {
        match self.scopes.last() {
            Some(prefix) => format!("{prefix}/{key}"),
            None => key.to_string(),
        }
    }

    pub(crate) fn push_scope(&mut self, scope: String) {
        let scope = self.scoped(&scope);
        self.scopes.push(scope);
    }

    pub(crate) fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Drops histories and temporal state recorded under `scope`.
    pub(crate) fn drop_scope(&mut self, scope: &str) {
        let prefix = format!("{}/", self.scoped(scope));
        self.histories.retain(|key, _| !key.starts_with(&prefix));
        self.temporal.retain(|key, _| !key.starts_with(&prefix));
        tracing::debug!(scope = %prefix, "multiplex scope dropped");
    }

    pub(crate) fn temporal_state(
        &mut self,
        site: &str,
        init: impl FnOnce() -> TemporalState,
    ) -> &mut TemporalState {
        let key = self.scoped(site);
        self.temporal.entry(key).or_insert_with(init)
    }
}

/// Tracks which inputs delivered at least one record.
#[derive(Debug, Clone)]
pub struct SourceReadyGate {
    required: BTreeMap<String, bool>,
    missing: usize,
}

impl SourceReadyGate {
    pub fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let required: BTreeMap<String, bool> =
            names.into_iter().map(|n| (n.to_string(), false)).collect();
        let missing = required.len();
        Self { required, missing }
    }

    #[inline]
    pub fn mark(&mut self, name: &str) {
        if let Some(seen) = self.required.get_mut(name) {
            if !*seen {
                *seen = true;
                self.missing -= 1;
            }
        }
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.missing == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_offsets_address_from_latest() {
        let mut seq = HistorySequence::new();
        for v in [10, 20, 30] {
            seq.append(Value::Int(v));
        }
        assert_eq!(seq.get_by_index(-1), Some(&Value::Int(30)));
        assert_eq!(seq.get_by_index(-3), Some(&Value::Int(10)));
        assert_eq!(seq.get_by_index(-4), None);
        assert_eq!(seq.get_by_index(0), Some(&Value::Int(10)));
    }

    #[test]
    fn bounded_history_evicts_oldest() {
        let mut seq = HistorySequence::bounded(3);
        for v in [10, 20, 30, 40] {
            seq.append(Value::Int(v));
        }
        assert_eq!(seq.len(), 3);
        assert_eq!(seq.get_lag(0), Some(&Value::Int(40)));
        assert_eq!(seq.get_lag(2), Some(&Value::Int(20)));
        assert_eq!(seq.get_lag(3), None);
    }

    #[test]
    fn observe_appends_once_per_pass() {
        let mut env = Environment::new();
        env.begin_pass();
        env.observe("x", &Value::Int(1));
        env.observe("x", &Value::Int(1));
        env.begin_pass();
        env.observe("x", &Value::Int(2));
        let seq = env.history("x").expect("history exists");
        assert_eq!(seq.len(), 2);
        assert_eq!(seq.latest(), Some(&Value::Int(2)));
    }

    #[test]
    fn scoped_state_is_dropped_with_its_scope() {
        let mut env = Environment::new();
        env.begin_pass();
        env.push_scope("mux#1".to_string());
        env.observe("x", &Value::Int(1));
        assert!(env.history("x").is_some());
        env.pop_scope();
        assert!(env.history("x").is_none());
        env.drop_scope("mux#1");
        assert_eq!(env.history_keys().count(), 0);
    }

    #[test]
    fn ready_gate_waits_for_every_source() {
        let mut gate = SourceReadyGate::new(["a", "b"]);
        assert!(!gate.is_ready());
        gate.mark("a");
        gate.mark("a");
        assert!(!gate.is_ready());
        gate.mark("b");
        assert!(gate.is_ready());
    }
}
