use crate::error::EvalError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type Record = BTreeMap<String, Value>;

/// Dynamic value flowing through evaluation and pipeline records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Record(Record),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Record(_) => "record",
        }
    }

    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(map) => Some(map),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_record().and_then(|map| map.get(key))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Arithmetic with int/float promotion. Division always yields a float, and integer
    /// results that overflow `i64` are promoted to float.
    pub fn arith(&self, op: ArithOp, rhs: &Value) -> Result<Value, EvalError> {
        match (self, rhs) {
            (Self::Int(a), Self::Int(b)) => match op {
                ArithOp::Add => Ok(a
                    .checked_add(*b)
                    .map_or_else(|| Self::Float(*a as f64 + *b as f64), Self::Int)),
                ArithOp::Sub => Ok(a
                    .checked_sub(*b)
                    .map_or_else(|| Self::Float(*a as f64 - *b as f64), Self::Int)),
                ArithOp::Mul => Ok(a
                    .checked_mul(*b)
                    .map_or_else(|| Self::Float(*a as f64 * *b as f64), Self::Int)),
                ArithOp::Div => Ok(Self::Float(*a as f64 / *b as f64)),
                ArithOp::Pow if *b >= 0 && *b <= u32::MAX as i64 => Ok(a
                    .checked_pow(*b as u32)
                    .map_or_else(|| Self::Float((*a as f64).powf(*b as f64)), Self::Int)),
                ArithOp::Pow => Ok(Self::Float((*a as f64).powf(*b as f64))),
            },
            (Self::Str(a), Self::Str(b)) if op == ArithOp::Add => Ok(Self::Str(format!("{a}{b}"))),
            (Self::List(a), Self::List(b)) if op == ArithOp::Add => {
                Ok(Self::List(a.iter().chain(b).cloned().collect()))
            }
            _ => {
                let (Some(a), Some(b)) = (self.as_f64(), rhs.as_f64()) else {
                    return Err(self.mismatch(op.symbol(), rhs));
                };
                let out = match op {
                    ArithOp::Add => a + b,
                    ArithOp::Sub => a - b,
                    ArithOp::Mul => a * b,
                    ArithOp::Div => a / b,
                    ArithOp::Pow => a.powf(b),
                };
                Ok(Self::Float(out))
            }
        }
    }

    /// Ordering and equality; incompatible kinds are rejected rather than coerced.
    pub fn compare(&self, op: CmpOp, rhs: &Value) -> Result<bool, EvalError> {
        if matches!(op, CmpOp::Eq | CmpOp::Ne) {
            let equal = match (self, rhs) {
                (Self::Null, _) | (_, Self::Null) => self.is_null() && rhs.is_null(),
                _ => match (self.as_f64(), rhs.as_f64()) {
                    (Some(a), Some(b)) => a == b,
                    _ if std::mem::discriminant(self) == std::mem::discriminant(rhs) => {
                        self == rhs
                    }
                    _ => return Err(self.mismatch(op.symbol(), rhs)),
                },
            };
            return Ok(if op == CmpOp::Eq { equal } else { !equal });
        }
        let ordering = match (self, rhs) {
            (Self::Str(a), Self::Str(b)) => a.partial_cmp(b),
            (Self::Bool(a), Self::Bool(b)) => a.partial_cmp(b),
            _ => match (self.as_f64(), rhs.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => return Err(self.mismatch(op.symbol(), rhs)),
            },
        };
        // NaN compares false under every ordering.
        let Some(ordering) = ordering else {
            return Ok(false);
        };
        Ok(match op {
            CmpOp::Lt => ordering.is_lt(),
            CmpOp::Le => ordering.is_le(),
            CmpOp::Gt => ordering.is_gt(),
            CmpOp::Ge => ordering.is_ge(),
            CmpOp::Eq | CmpOp::Ne => unreachable!("handled above"),
        })
    }

    pub fn negate(&self) -> Result<Value, EvalError> {
        match self {
            Self::Int(v) => Ok(v
                .checked_neg()
                .map_or_else(|| Self::Float(-(*v as f64)), Self::Int)),
            Self::Float(v) => Ok(Self::Float(-v)),
            other => Err(EvalError::TypeMismatch {
                op: "-",
                lhs: other.type_name(),
                rhs: "none",
            }),
        }
    }

    pub(crate) fn expect_bool(&self, op: &'static str) -> Result<bool, EvalError> {
        self.as_bool().ok_or(EvalError::TypeMismatch {
            op,
            lhs: self.type_name(),
            rhs: "bool",
        })
    }

    pub(crate) fn mismatch(&self, op: &'static str, rhs: &Value) -> EvalError {
        EvalError::TypeMismatch {
            op,
            lhs: self.type_name(),
            rhs: rhs.type_name(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl ArithOp {
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Pow => "**",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CmpOp {
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) if v.fract() == 0.0 && v.is_finite() => write!(f, "{v:.1}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v:?}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Record(map) => {
                write!(f, "{{")?;
                for (idx, (key, value)) in map.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key:?}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Self::Record(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::Str(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Self::Record(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn int_and_float_promote_on_arithmetic() {
        let out = Value::Int(2)
            .arith(ArithOp::Add, &Value::Float(0.5))
            .expect("numeric add");
        assert_eq!(out, Value::Float(2.5));
        assert_eq!(
            Value::Int(7).arith(ArithOp::Div, &Value::Int(2)).unwrap(),
            Value::Float(3.5)
        );
    }

    #[test]
    fn integer_overflow_promotes_to_float() {
        let max = Value::Int(i64::MAX);
        assert_eq!(
            max.arith(ArithOp::Add, &Value::Int(1)).unwrap(),
            Value::Float(9_223_372_036_854_775_808.0)
        );
        assert_eq!(
            Value::Int(i64::MIN).arith(ArithOp::Sub, &Value::Int(1)).unwrap(),
            Value::Float(i64::MIN as f64 - 1.0)
        );
        assert_eq!(
            max.arith(ArithOp::Mul, &Value::Int(2)).unwrap(),
            Value::Float(i64::MAX as f64 * 2.0)
        );
        assert_eq!(
            Value::Int(10).arith(ArithOp::Pow, &Value::Int(30)).unwrap(),
            Value::Float(10f64.powf(30.0))
        );
        assert_eq!(Value::Int(i64::MIN).negate().unwrap(), Value::Float(9.223372036854775808e18));
        assert_eq!(Value::Int(3).arith(ArithOp::Add, &Value::Int(4)).unwrap(), Value::Int(7));
    }

    #[test]
    fn ordering_incompatible_kinds_is_a_mismatch() {
        let err = Value::Str("a".into())
            .compare(CmpOp::Lt, &Value::Int(1))
            .expect_err("str < int must fail");
        assert!(matches!(err, EvalError::TypeMismatch { op: "<", .. }));
    }

    #[test]
    fn json_objects_become_records() {
        let value = Value::from(json!({"lat": 48.9, "id": 3, "tags": ["a"]}));
        assert_eq!(value.get("id"), Some(&Value::Int(3)));
        assert_eq!(value.get("lat"), Some(&Value::Float(48.9)));
        assert_eq!(value.get("tags"), Some(&Value::List(vec!["a".into()])));
    }
}
