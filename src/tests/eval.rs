use super::*;
use crate::state::{Environment, HistorySequence};

#[test]
fn literal_sum_matches_host_arithmetic() {
    let lhs = Formula::constant(2);
    let rhs = Formula::constant(40);
    let sum = &lhs + &rhs;
    let out = Evaluator::new().eval(&sum).expect("eval should succeed");
    assert_eq!(out, Value::Int(42));
    assert_eq!(lhs.node().as_ref(), &Expr::Const(Value::Int(2)));

    let mixed = Formula::constant(1.5) * 4;
    assert_eq!(Evaluator::new().eval(mixed).unwrap(), Value::Float(6.0));

    let overflow = Formula::constant(i64::MAX) + 1;
    assert_eq!(
        Evaluator::new().eval(overflow).unwrap(),
        Value::Float(i64::MAX as f64 + 1.0)
    );
}

#[test]
fn building_twice_is_structurally_equal() {
    let s = Stream::new("s");
    let a = s.field("v").gt(3) & s.field("w").lt(1.0);
    let b = s.field("v").gt(3) & s.field("w").lt(1.0);
    assert_eq!(a, b);
    assert!(!std::sync::Arc::ptr_eq(a.node(), b.node()));
}

#[test]
fn history_law_reads_recorded_current_values() {
    let x = Stream::new("x");
    let mut evaluator = Evaluator::new();
    for v in [10, 20, 30] {
        evaluator.env_mut().bind("x", record(json!({ "v": v })));
        evaluator.eval(x.field("v")).expect("current value");
    }
    assert_eq!(evaluator.eval(x.field("v").at(-1)).unwrap(), Value::Int(30));
    assert_eq!(evaluator.eval(x.field("v").at(-2)).unwrap(), Value::Int(20));
    assert_eq!(evaluator.eval(x.field("v").at(-3)).unwrap(), Value::Int(10));

    let err = evaluator
        .eval(x.field("v").at(-4))
        .expect_err("deeper than recorded");
    assert_eq!(
        err,
        EvalError::HistoryUnderflow {
            key: "x.v".to_string(),
            offset: -4,
            len: 3
        }
    );
}

#[test]
fn bound_history_is_read_not_appended() {
    let mut env = Environment::new();
    env.bind_history("speed", [3.0, 4.0, 5.0].into_iter().collect::<HistorySequence>());
    let mut evaluator = Evaluator::with_env(env);
    let speed = Formula::var("speed");
    assert_eq!(evaluator.eval(&speed).unwrap(), Value::Float(5.0));
    assert_eq!(evaluator.eval(speed.at(-3)).unwrap(), Value::Float(3.0));
    assert_eq!(evaluator.env().history("speed").map(HistorySequence::len), Some(3));
}

#[test]
fn step_observes_indexed_targets_before_lookup() {
    let s = Stream::new("s");
    let delta = s.field("v").at(-1) - s.field("v").at(-2);
    let mut evaluator = Evaluator::new();

    evaluator.env_mut().bind("s", record(json!({"v": 1})));
    let err = evaluator.step(&delta).expect_err("one observation only");
    assert!(matches!(err, EvalError::HistoryUnderflow { len: 1, .. }));

    evaluator.env_mut().bind("s", record(json!({"v": 4})));
    assert_eq!(evaluator.step(&delta).unwrap(), Value::Int(3));
}

#[test]
fn negative_subscript_on_plain_values_is_positional() {
    let mut evaluator = Evaluator::new();
    evaluator.env_mut().bind("xs", Value::List(vec![1.into(), 2.into(), 3.into()]));
    let xs = Formula::var("xs");
    assert_eq!(evaluator.eval((&xs).at(-1)).unwrap(), Value::Int(3));
    // Recording `xs` as a current value does not turn `[-1]` into a history read.
    assert_eq!(evaluator.eval(&xs).unwrap(), Value::List(vec![1.into(), 2.into(), 3.into()]));
    assert_eq!(evaluator.eval((&xs).at(-1)).unwrap(), Value::Int(3));
    assert_eq!(evaluator.step((&xs).at(-1)).unwrap(), Value::Int(3));
    assert_eq!(evaluator.eval((&xs).at(0)).unwrap(), Value::Int(1));
    let err = evaluator.eval(xs.at(5)).expect_err("out of range");
    assert_eq!(err, EvalError::IndexOutOfRange { index: 5, len: 3 });

    let err = evaluator
        .eval(Formula::constant(7).at(-1))
        .expect_err("scalars have no history");
    assert!(matches!(err, EvalError::HistoryUnderflow { len: 0, .. }));
}

#[test]
fn list_fields_are_subscripted_under_step() {
    let s = Stream::new("s");
    let newest = s.field("items").at(-1);
    let mut evaluator = Evaluator::new();
    for (items, expected) in [(json!([1, 2]), 2), (json!([5, 6, 7]), 7)] {
        evaluator.env_mut().bind("s", record(json!({ "items": items })));
        assert_eq!(evaluator.step(&newest).unwrap(), Value::Int(expected));
    }
    assert!(evaluator.env().history("s.items").is_none());
}

#[test]
fn empty_bound_history_underflows() {
    let mut env = Environment::new();
    env.bind_history("speed", HistorySequence::default());
    let mut evaluator = Evaluator::with_env(env);
    let err = evaluator.eval(Formula::var("speed")).expect_err("nothing recorded");
    assert!(matches!(err, EvalError::HistoryUnderflow { len: 0, .. }));
    let err = evaluator
        .eval(Formula::var("speed").at(-1))
        .expect_err("nothing recorded");
    assert_eq!(
        err,
        EvalError::HistoryUnderflow {
            key: "speed".to_string(),
            offset: -1,
            len: 0
        }
    );
}

#[test]
fn missing_names_and_attributes_are_reported() {
    let mut evaluator = Evaluator::new();
    let err = evaluator.eval(Formula::var("ghost")).expect_err("unbound");
    assert_eq!(
        err,
        EvalError::UnresolvedReference {
            name: "ghost".to_string()
        }
    );

    evaluator.env_mut().bind("gps", record(json!({"lat": 1.0})));
    let err = evaluator
        .eval(Stream::new("gps").field("alt"))
        .expect_err("no such field");
    assert!(matches!(err, EvalError::MissingAttribute { ref attr, .. } if attr == "alt"));
}

#[test]
fn type_mismatch_surfaces_from_comparisons() {
    let mut evaluator = Evaluator::new();
    evaluator.env_mut().bind("s", record(json!({"name": "x"})));
    let err = evaluator
        .eval(Stream::new("s").field("name").gt(3))
        .expect_err("str > int");
    assert!(matches!(err, EvalError::TypeMismatch { op: ">", .. }));
}

#[test]
fn logical_operators_evaluate_both_sides() {
    let mut evaluator = Evaluator::new();
    evaluator.env_mut().bind("gps", record(json!({"lat": 48.9, "lon": 2.3})));
    let gps = Stream::new("gps");
    let cond = gps.field("lat").gt(48.0) & gps.field("lon").lt(3.0);
    assert_eq!(evaluator.eval(&cond).unwrap(), Value::Bool(true));
    let either = gps.field("lat").lt(0.0) | !gps.field("lon").gt(3.0);
    assert_eq!(evaluator.eval(either).unwrap(), Value::Bool(true));
}

#[test]
fn lifted_function_runs_eagerly_or_defers() {
    let add: FunctionRef = lift("add", add_fn());
    let eager = add.call([3, 4]).expect("literal call");
    assert_eq!(eager.value(), Some(&Value::Int(7)));

    let s = Stream::new("s");
    let deferred = add
        .call([crate::lift::Arg::from(Formula::constant(3)), crate::lift::Arg::from(&s)])
        .expect("symbolic call");
    let formula = deferred.into_formula();
    match formula.node().as_ref() {
        Expr::Call { callee, args } => {
            assert_eq!(callee.as_ref(), &Expr::Name("add".to_string()));
            assert_eq!(args.len(), 2);
        }
        other => panic!("unexpected node: {other:?}"),
    }

    let mut evaluator = Evaluator::new();
    evaluator.env_mut().bind_function(&add);
    evaluator.env_mut().bind("s", 5);
    assert_eq!(evaluator.eval(&formula).unwrap(), Value::Int(8));
}

#[test]
fn module_members_resolve_through_the_environment() {
    let geo = crate::lift::wrap_module(geo_namespace());
    let hypot = match geo.attr("distance").expect("distance module") {
        crate::lift::ProxyMember::Module(distance) => {
            distance.function("hypot").expect("hypot function")
        }
        other => panic!("unexpected member: {other:?}"),
    };
    assert_eq!(hypot.name(), "geo.distance.hypot");
    assert!(geo.attr("missing").is_err());

    let p = Stream::new("p");
    let dist = hypot
        .call([p.field("x"), p.field("y")])
        .expect("symbolic call")
        .into_formula();
    let scaled = dist * Formula::new(Expr::attribute(Expr::name("geo"), "earth_radius_km"));

    let mut evaluator = Evaluator::new();
    evaluator.env_mut().bind_module(geo_namespace());
    evaluator.env_mut().bind("p", record(json!({"x": 3.0, "y": 4.0})));
    let out = evaluator.eval(scaled).expect("eval should succeed");
    assert!(approx_eq(out.as_f64().unwrap(), 5.0 * 6371.0));
}

#[test]
fn environment_bindings_override_builtins() {
    let call = Formula::new(Expr::call_named("abs", vec![Expr::constant(-3)]));
    assert_eq!(Evaluator::new().eval(&call).unwrap(), Value::Int(3));

    let shadow = lift("abs", native(|_| Ok(Value::Int(42))));
    let mut evaluator = Evaluator::new();
    evaluator.env_mut().bind_function(&shadow);
    assert_eq!(evaluator.eval(&call).unwrap(), Value::Int(42));

    let err = Evaluator::new()
        .eval(Formula::new(Expr::call_named("nope", Vec::new())))
        .expect_err("unknown callee");
    assert!(matches!(err, EvalError::UnresolvedReference { .. }));
}

#[test]
fn since_holds_within_interval_after_rising_edge() {
    let s = Stream::new("s");
    let cond = since(s.field("a").gt(2), s.field("b").gt(5), (2, 31));
    let run = |series: &[(f64, i64, i64)]| -> Vec<bool> {
        let mut evaluator = Evaluator::new();
        series
            .iter()
            .map(|(t, a, b)| {
                evaluator.env_mut().set_clock(*t);
                evaluator.env_mut().bind("s", record(json!({"a": a, "b": b})));
                evaluator.eval(&cond).unwrap() == Value::Bool(true)
            })
            .collect()
    };
    assert_eq!(
        run(&[(0.0, 0, 0), (10.0, 3, 0), (15.0, 3, 6)]),
        vec![false, false, true]
    );
    assert_eq!(
        run(&[(0.0, 0, 0), (10.0, 3, 0), (15.0, 3, 0), (50.0, 3, 6)]),
        vec![false, false, false, false]
    );
    // `a > 2` lapses at t=11, so `b > 5` at t=15 no longer follows it.
    assert_eq!(
        run(&[(0.0, 0, 0), (10.0, 3, 0), (11.0, 0, 0), (15.0, 0, 6)]),
        vec![false, false, false, false]
    );
}

#[test]
fn since_uses_pass_count_without_a_clock() {
    let flag = Formula::var("flag");
    let cond = since(&flag, true, (1, 2));
    let mut evaluator = Evaluator::new();
    let mut seen = Vec::new();
    for f in [true, true, true, false] {
        evaluator.env_mut().bind("flag", f);
        seen.push(evaluator.eval(&cond).unwrap());
    }
    assert_eq!(
        seen,
        vec![
            Value::Bool(false),
            Value::Bool(true),
            Value::Bool(true),
            Value::Bool(false)
        ]
    );
    assert_eq!(evaluator.env().ticks(), 4);
}

#[test]
fn rolling_window_reduces_recent_values() {
    let mean_speed = rolling_window(
        (0, 10),
        lambda("r", |r| r.attr("speed")),
        Formula::var("mean"),
    );
    let max_speed = rolling_window(
        (0, 10),
        lambda("r", |r| r.attr("speed")),
        lambda("w", |w| Formula::new(Expr::call_named("max", vec![w.into_node()]))),
    );
    let mut evaluator = Evaluator::new();
    let mut means = Vec::new();
    let mut maxes = Vec::new();
    for (t, speed) in [(0.0, 2.0), (5.0, 4.0), (12.0, 9.0)] {
        evaluator.env_mut().set_clock(t);
        let rec = record(json!({ "speed": speed }));
        if let Value::Record(r) = rec {
            evaluator.env_mut().set_record(r);
        }
        means.push(evaluator.eval(&mean_speed).unwrap());
        maxes.push(evaluator.eval(&max_speed).unwrap());
    }
    // At t=12 the t=0 sample is older than the 10s upper bound.
    assert_eq!(
        means,
        vec![Value::Float(2.0), Value::Float(3.0), Value::Float(6.5)]
    );
    assert_eq!(
        maxes,
        vec![Value::Float(2.0), Value::Float(4.0), Value::Float(9.0)]
    );
}

#[test]
fn empty_window_reduces_to_null() {
    let late = rolling_window((5, 10), lambda("r", |r| r.attr("v")), Formula::var("sum"));
    let mut evaluator = Evaluator::new();
    evaluator.env_mut().set_clock(0.0);
    if let Value::Record(r) = record(json!({"v": 1})) {
        evaluator.env_mut().set_record(r);
    }
    assert_eq!(evaluator.eval(&late).unwrap(), Value::Null);
}

#[test]
fn always_requires_every_recent_observation() {
    let ok = Formula::var("ok");
    let cond = always(5.0 * Unit::Seconds, &ok);
    let mut evaluator = Evaluator::new();
    let mut seen = Vec::new();
    for (t, v) in [(0.0, true), (3.0, false), (6.0, true), (9.0, true)] {
        evaluator.env_mut().set_clock(t);
        evaluator.env_mut().bind("ok", v);
        seen.push(evaluator.eval(&cond).unwrap().as_bool().unwrap());
    }
    assert_eq!(seen, vec![true, false, false, true]);
}

#[test]
fn last_and_global_time_follow_the_clock() {
    let s = Stream::new("s");
    let age = global_time() - s.field("time").last();
    let mut evaluator = Evaluator::new();
    evaluator.env_mut().bind("s", record(json!({"time": 100.0})));
    evaluator.env_mut().set_clock(104.0);
    assert_eq!(evaluator.eval(&age).unwrap(), Value::Float(4.0));
    evaluator.env_mut().bind("s", record(json!({"time": null})));
    evaluator.env_mut().set_clock(110.0);
    assert_eq!(evaluator.eval(&age).unwrap(), Value::Float(10.0));
}

#[test]
fn multiplex_keeps_state_per_id_and_drops_on_eos() {
    let s = Stream::new("s");
    let falling = s.field("d").at(-1).lt(s.field("d").at(-2));
    let mux = multiplex_id(&falling, s.field("id"), s.field("eos"));
    let mut evaluator = Evaluator::new();
    let mut feed = |id: i64, d: i64, eos: bool| {
        evaluator
            .env_mut()
            .bind("s", record(json!({"id": id, "d": d, "eos": eos})));
        evaluator.step(&mux)
    };

    assert!(matches!(feed(1, 10, false), Err(EvalError::HistoryUnderflow { .. })));
    assert!(matches!(feed(2, 50, false), Err(EvalError::HistoryUnderflow { .. })));
    let out = feed(1, 8, false).expect("id 1 has two samples");
    assert_eq!(out.get("id"), Some(&Value::Int(1)));
    assert_eq!(out.get("result"), Some(&Value::Bool(true)));
    let out = feed(2, 60, true).expect("id 2 has two samples");
    assert_eq!(out.get("result"), Some(&Value::Bool(false)));
    // id 2 ended: its history starts over.
    assert!(matches!(feed(2, 40, false), Err(EvalError::HistoryUnderflow { .. })));
    assert!(feed(1, 7, false).is_ok());
}

#[test]
fn opaque_nodes_cannot_be_evaluated() {
    let err = Evaluator::new()
        .eval(Expr::Opaque("lambda".to_string()))
        .expect_err("opaque");
    assert!(matches!(err, EvalError::UnsupportedConstruct { .. }));
}

#[test]
fn temporal_arity_is_checked() {
    let bad = Formula::new(Expr::call_named("since", vec![Expr::constant(true)]));
    let err = Evaluator::new().eval(bad).expect_err("wrong arity");
    assert!(matches!(err, EvalError::InvalidArguments { ref name, .. } if name == "since"));
}
