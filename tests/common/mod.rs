use serde_json::Value as JsonValue;
use streamv::{CompiledGraph, Record, Value};

/// Pushes `payload` into `source` and drains the pipeline once.
pub fn push_and_drain(compiled: &mut CompiledGraph, source: &str, payload: JsonValue) -> Vec<Record> {
    compiled
        .source(source)
        .unwrap_or_else(|| panic!("no push source named `{source}`"))
        .push_json(payload);
    compiled.pipeline.drain().expect("drain should succeed")
}

pub fn results(outputs: &[Record]) -> Vec<Value> {
    outputs
        .iter()
        .map(|out| out.get("result").cloned().expect("output carries a result"))
        .collect()
}

#[allow(dead_code)]
pub fn as_bool(value: &Value) -> bool {
    value.as_bool().expect("boolean result")
}
