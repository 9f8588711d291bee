mod common;

use common::{as_bool, push_and_drain, results};
use serde_json::json;
use streamv::prelude::*;
use streamv::{
    compile_to_graph, input_map, lift, native, EvalError, FieldType, FormulaRegistry,
    FormulaSource, RecordType, SourceCapture,
};

#[test]
fn gps_condition_follows_pushed_records() {
    let schema = RecordType::new("Position")
        .with_field("lat", FieldType::Float)
        .with_field("lon", FieldType::Float);
    let gps = InputStream::typed("gps", schema);
    let cond = gps.checked_field("lat").expect("lat").gt(48.0)
        & gps.checked_field("lon").expect("lon").lt(3.0);
    let mut compiled = compile_to_graph(&cond, &input_map([gps])).expect("compile should succeed");

    let out = push_and_drain(&mut compiled, "gps", json!({"lat": 48.9, "lon": 2.3}));
    assert_eq!(results(&out), vec![Value::Bool(true)]);
    let out = push_and_drain(&mut compiled, "gps", json!({"lat": 40.0, "lon": 2.3}));
    assert_eq!(results(&out), vec![Value::Bool(false)]);
}

#[test]
fn two_inputs_sum_into_result_record() {
    let a = InputStream::new("a");
    let b = InputStream::new("b");
    let mut compiled = compile_to_graph(a.field("value") + b.field("value"), &input_map([a, b]))
        .expect("compile should succeed");
    assert!(push_and_drain(&mut compiled, "a", json!({"value": 1})).is_empty());
    let out = push_and_drain(&mut compiled, "b", json!({"value": 2}));
    assert_eq!(out.len(), 1);
    let expected: streamv::Record = [("result".to_string(), Value::Int(3))].into();
    assert_eq!(out[0], expected);
}

fn since_series(series: &[(f64, i64, i64)]) -> Vec<bool> {
    let s = InputStream::new("s").timestamped();
    let cond = since(s.field("a").gt(2), s.field("b").gt(5), (2, 31));
    let mut compiled = compile_to_graph(cond, &input_map([s])).expect("compile should succeed");
    series
        .iter()
        .flat_map(|(time, a, b)| {
            let out = push_and_drain(
                &mut compiled,
                "s",
                json!({"time": time, "a": a, "b": b}),
            );
            results(&out)
        })
        .map(|v| as_bool(&v))
        .collect()
}

#[test]
fn since_is_true_when_second_follows_within_interval() {
    let seen = since_series(&[(0.0, 0, 0), (10.0, 3, 0), (15.0, 3, 6)]);
    assert_eq!(seen, vec![false, false, true]);
}

#[test]
fn since_is_false_when_second_comes_too_late() {
    let seen = since_series(&[(0.0, 0, 0), (10.0, 3, 0), (15.0, 3, 0), (50.0, 3, 6)]);
    assert_eq!(seen, vec![false, false, false, false]);
}

#[test]
fn multiplex_tracks_each_id_separately() {
    let intruder = InputStream::new("intruder").timestamped();
    let closing = intruder
        .field("distance")
        .at(-1)
        .lt(intruder.field("distance").at(-2));
    let mux = multiplex_id(closing, intruder.field("id"), intruder.field("eos"));
    let mut compiled = compile_to_graph(mux, &input_map([intruder])).expect("compile");

    let mut push = |time: f64, id: i64, distance: f64, eos: bool| {
        push_and_drain(
            &mut compiled,
            "intruder",
            json!({"time": time, "id": id, "distance": distance, "eos": eos}),
        )
    };

    assert!(push(0.0, 1, 900.0, false).is_empty());
    assert!(push(1.0, 2, 400.0, false).is_empty());
    let out = push(2.0, 1, 850.0, false);
    assert_eq!(out[0].get("id"), Some(&Value::Int(1)));
    assert_eq!(out[0].get("result"), Some(&Value::Bool(true)));
    let out = push(3.0, 2, 450.0, true);
    assert_eq!(out[0].get("id"), Some(&Value::Int(2)));
    assert_eq!(out[0].get("result"), Some(&Value::Bool(false)));
    // Id 2 signalled end of stream; a reappearing id 2 starts a fresh history.
    assert!(push(4.0, 2, 300.0, false).is_empty());
    let out = push(5.0, 1, 860.0, false);
    assert_eq!(out[0].get("result"), Some(&Value::Bool(false)));
}

#[test]
fn lifted_function_runs_inside_the_pipeline() {
    let scale = lift(
        "scale",
        native(|args| match args {
            [v, k] => match (v.as_f64(), k.as_f64()) {
                (Some(v), Some(k)) => Ok(Value::Float(v * k)),
                _ => Err(EvalError::InvalidArguments {
                    name: "scale".to_string(),
                    reason: "expected numbers".to_string(),
                }),
            },
            _ => Err(EvalError::InvalidArguments {
                name: "scale".to_string(),
                reason: "expected 2 arguments".to_string(),
            }),
        }),
    );
    assert_eq!(
        scale.call([2.0, 3.0]).expect("eager").value(),
        Some(&Value::Float(6.0))
    );

    let s = InputStream::new("s");
    let scaled = scale
        .call([streamv::Arg::from(s.field("v")), streamv::Arg::from(10.0)])
        .expect("deferred")
        .into_formula();
    let mut compiled = compile_to_graph(&scaled, &input_map([s])).expect("compile");
    compiled.pipeline.evaluator_mut().env_mut().bind_function(&scale);
    let out = push_and_drain(&mut compiled, "s", json!({"v": 0.5}));
    assert_eq!(results(&out), vec![Value::Float(5.0)]);
}

#[test]
fn registry_feeds_the_compiler() {
    let registry = FormulaRegistry::new();
    let capture = SourceCapture::new("x.value > 5");
    registry
        .compile(FormulaSource::Captured(&capture), Some("big"))
        .expect("capture should parse");
    let big = registry.compile("big", None).expect("lookup");
    assert_eq!(Some(big.node().clone()), registry.get_formula_tree("big"));

    let x = InputStream::new("x");
    let mut compiled = compile_to_graph(&big, &input_map([x])).expect("compile");
    let out = push_and_drain(&mut compiled, "x", json!({"value": 9}));
    assert_eq!(results(&out), vec![Value::Bool(true)]);

    let missing = registry.compile("missing", None).expect_err("not compiled");
    assert!(matches!(
        missing,
        streamv::CompileError::UnresolvedReference { .. }
    ));
}
