//! Stateless built-in functions available to every evaluation.

use crate::error::EvalError;
use crate::value::Value;

pub type BuiltinFn = fn(&[Value]) -> Result<Value, EvalError>;

#[derive(Debug, Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

const BUILTINS: [Builtin; 10] = [
    Builtin { name: "abs", func: elem_abs },
    Builtin { name: "min", func: elem_min },
    Builtin { name: "max", func: elem_max },
    Builtin { name: "sum", func: elem_sum },
    Builtin { name: "len", func: elem_len },
    Builtin { name: "mean", func: elem_mean },
    Builtin { name: "sqrt", func: elem_sqrt },
    Builtin { name: "round", func: elem_round },
    Builtin { name: "float", func: elem_float },
    Builtin { name: "int", func: elem_to_int },
];

pub fn builtin(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| b.name == name)
}

#[inline]
fn single<'a>(name: &str, args: &'a [Value]) -> Result<&'a Value, EvalError> {
    match args {
        [v] => Ok(v),
        _ => Err(EvalError::invalid_args(
            name,
            format!("expected 1 argument, got {}", args.len()),
        )),
    }
}

#[inline]
fn number(name: &str, v: &Value) -> Result<f64, EvalError> {
    v.as_f64().ok_or_else(|| {
        EvalError::invalid_args(name, format!("expected a number, got {}", v.type_name()))
    })
}

/// `f([a, b, c])` and `f(a, b, c)` are the same call.
fn spread<'a>(args: &'a [Value]) -> &'a [Value] {
    match args {
        [Value::List(items)] => items,
        _ => args,
    }
}

pub fn elem_abs(args: &[Value]) -> Result<Value, EvalError> {
    match single("abs", args)? {
        Value::Int(v) => Ok(Value::Int(v.wrapping_abs())),
        other => Ok(Value::Float(number("abs", other)?.abs())),
    }
}

fn extremum(name: &str, args: &[Value], pick_lhs: fn(f64, f64) -> bool) -> Result<Value, EvalError> {
    let mut best: Option<(&Value, f64)> = None;
    for v in spread(args) {
        let x = number(name, v)?;
        match best {
            Some((_, current)) if !pick_lhs(x, current) => {}
            _ => best = Some((v, x)),
        }
    }
    best.map(|(v, _)| v.clone())
        .ok_or_else(|| EvalError::invalid_args(name, "empty sequence"))
}

pub fn elem_min(args: &[Value]) -> Result<Value, EvalError> {
    extremum("min", args, |x, current| x < current)
}

pub fn elem_max(args: &[Value]) -> Result<Value, EvalError> {
    extremum("max", args, |x, current| x > current)
}

pub fn elem_sum(args: &[Value]) -> Result<Value, EvalError> {
    spread(args)
        .iter()
        .try_fold(Value::Int(0), |acc, v| {
            number("sum", v)?;
            acc.arith(crate::value::ArithOp::Add, v)
        })
}

pub fn elem_len(args: &[Value]) -> Result<Value, EvalError> {
    let len = match single("len", args)? {
        Value::List(items) => items.len(),
        Value::Str(s) => s.chars().count(),
        Value::Record(map) => map.len(),
        other => {
            return Err(EvalError::invalid_args(
                "len",
                format!("{} has no length", other.type_name()),
            ))
        }
    };
    Ok(Value::Int(len as i64))
}

pub fn elem_mean(args: &[Value]) -> Result<Value, EvalError> {
    let items = spread(args);
    if items.is_empty() {
        return Err(EvalError::invalid_args("mean", "empty sequence"));
    }
    let mut total = 0.0;
    for v in items {
        total += number("mean", v)?;
    }
    Ok(Value::Float(total / items.len() as f64))
}

pub fn elem_sqrt(args: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::Float(number("sqrt", single("sqrt", args)?)?.sqrt()))
}

/// `round(x)` gives an int, `round(x, n)` a float with `n` decimals.
pub fn elem_round(args: &[Value]) -> Result<Value, EvalError> {
    match args {
        [v] => Ok(Value::Int(number("round", v)?.round() as i64)),
        [v, digits] => {
            let digits = digits
                .as_i64()
                .ok_or_else(|| EvalError::invalid_args("round", "digits must be an integer"))?;
            let scale = 10f64.powi(digits as i32);
            Ok(Value::Float((number("round", v)? * scale).round() / scale))
        }
        _ => Err(EvalError::invalid_args(
            "round",
            format!("expected 1 or 2 arguments, got {}", args.len()),
        )),
    }
}

pub fn elem_float(args: &[Value]) -> Result<Value, EvalError> {
    match single("float", args)? {
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| EvalError::invalid_args("float", format!("cannot parse {s:?}"))),
        Value::Bool(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
        other => Ok(Value::Float(number("float", other)?)),
    }
}

pub fn elem_to_int(args: &[Value]) -> Result<Value, EvalError> {
    match single("int", args)? {
        Value::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| EvalError::invalid_args("int", format!("cannot parse {s:?}"))),
        Value::Bool(b) => Ok(Value::Int(*b as i64)),
        other => Ok(Value::Int(number("int", other)?.trunc() as i64)),
    }
}
