use crate::error::EvalError;
use crate::eval::Evaluator;
use crate::expr::Expr;
use crate::state::{Environment, SourceReadyGate};
use crate::stream::InputStream;
use crate::types::{CompileOptions, Period};
use crate::value::{Record, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Pipeline entry point. Clones share one queue; every pushed record is yielded once.
#[derive(Debug, Clone)]
pub struct PushSource {
    name: String,
    queue: Arc<Mutex<VecDeque<Record>>>,
}

impl PushSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queue: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Record>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, record: Record) {
        self.lock().push_back(record);
    }

    /// Pushes a JSON payload. Non-object payloads are wrapped as `{"value": payload}`.
    pub fn push_json(&self, payload: serde_json::Value) {
        let record = match Value::from(payload) {
            Value::Record(record) => record,
            other => Record::from([("value".to_string(), other)]),
        };
        self.push(record);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn take_all(&self) -> Vec<Record> {
        self.lock().drain(..).collect()
    }
}

/// Evaluator binding for a compiled graph.
///
/// Drained records become the current value of their input. A plain root is evaluated
/// after every record once all inputs have delivered; a scheduled root is evaluated by
/// [`Pipeline::advance`] at each period boundary.
#[derive(Debug, Clone)]
pub struct Pipeline {
    root: Arc<Expr>,
    schedule: Option<Period>,
    evaluator: Evaluator,
    inputs: BTreeMap<String, InputStream>,
    sources: BTreeMap<String, PushSource>,
    time_field: String,
    gate: SourceReadyGate,
    next_due: Option<f64>,
}

impl Pipeline {
    pub fn new(
        root: Arc<Expr>,
        inputs: BTreeMap<String, InputStream>,
        sources: BTreeMap<String, PushSource>,
        opts: &CompileOptions,
    ) -> Self {
        let schedule = match root.as_ref() {
            Expr::Scheduled { period, .. } => Some(*period),
            _ => None,
        };
        let gate = SourceReadyGate::new(sources.keys().map(String::as_str));
        Self {
            root,
            schedule,
            evaluator: Evaluator::with_env(Environment::with_options(opts.eval.clone())),
            inputs,
            sources,
            time_field: opts.time_field.clone(),
            gate,
            next_due: None,
        }
    }

    pub fn source(&self, name: &str) -> Option<&PushSource> {
        self.sources.get(name)
    }

    pub fn sources(&self) -> &BTreeMap<String, PushSource> {
        &self.sources
    }

    pub fn schedule(&self) -> Option<Period> {
        self.schedule
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    pub fn evaluator_mut(&mut self) -> &mut Evaluator {
        &mut self.evaluator
    }

    pub fn is_ready(&self) -> bool {
        self.gate.is_ready()
    }

    /// Applies every pending record, in source-name order, and returns the emitted outputs.
    pub fn drain(&mut self) -> Result<Vec<Record>, EvalError> {
        let mut outputs = Vec::new();
        let names: Vec<String> = self.sources.keys().cloned().collect();
        for name in names {
            let pending = match self.sources.get(&name) {
                Some(source) => source.take_all(),
                None => continue,
            };
            for record in pending {
                self.apply(&name, record);
                if self.schedule.is_none() && self.gate.is_ready() {
                    if let Some(out) = self.evaluate()? {
                        outputs.push(out);
                    }
                }
            }
        }
        Ok(outputs)
    }

    /// Moves the clock to `now`, drains pending records and, for a scheduled root, evaluates
    /// once when a period boundary was reached and every input has delivered.
    pub fn advance(&mut self, now: f64) -> Result<Vec<Record>, EvalError> {
        self.evaluator.env_mut().set_clock(now);
        let mut outputs = self.drain()?;
        let Some(period) = self.schedule else {
            return Ok(outputs);
        };
        if !self.gate.is_ready() || self.next_due.is_some_and(|due| now < due) {
            return Ok(outputs);
        }
        let due = self.next_due.unwrap_or(now);
        self.next_due = Some(next_boundary(due, now, period.as_secs_f64()));
        if let Some(out) = self.evaluate()? {
            outputs.push(out);
        }
        Ok(outputs)
    }

    fn apply(&mut self, name: &str, mut record: Record) {
        let timestamped = self.inputs.get(name).is_some_and(InputStream::is_timestamped);
        let env = self.evaluator.env_mut();
        if timestamped {
            match record.get(&self.time_field).and_then(Value::as_f64) {
                Some(ts) => env.set_clock(ts),
                None => {
                    record.insert(self.time_field.clone(), Value::Float(env.now()));
                }
            }
        }
        trace!(source = name, fields = record.len(), "record applied");
        env.bind(name, Value::Record(record.clone()));
        env.set_record(record);
        self.gate.mark(name);
    }

    /// One evaluation pass. A history that is still too short yields no output.
    fn evaluate(&mut self) -> Result<Option<Record>, EvalError> {
        let value = match self.evaluator.step(self.root.clone()) {
            Ok(value) => value,
            Err(EvalError::HistoryUnderflow { key, offset, len }) => {
                debug!(%key, offset, len, "history warming up; no output");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        let out = match value {
            Value::Record(record) => record,
            other => Record::from([("result".to_string(), other)]),
        };
        debug!(output = %crate::value::Value::Record(out.clone()), "pipeline emitted");
        Ok(Some(out))
    }
}

/// First boundary `due + k * step` strictly after `now`.
fn next_boundary(due: f64, now: f64, step: f64) -> f64 {
    if step <= 0.0 || due > now {
        return due;
    }
    let next = due + ((now - due) / step).floor() * step + step;
    if next > now {
        next
    } else {
        now + step
    }
}
