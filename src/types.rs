use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Mul;

/// Time unit used by scheduling annotations and temporal windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    Millis,
    Seconds,
    Minutes,
    Hours,
}

impl Unit {
    #[inline]
    pub const fn to_seconds(self) -> f64 {
        match self {
            Self::Millis => 0.001,
            Self::Seconds => 1.0,
            Self::Minutes => 60.0,
            Self::Hours => 3600.0,
        }
    }

    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Millis => "ms",
            Self::Seconds => "s",
            Self::Minutes => "m",
            Self::Hours => "h",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Period {
    pub value: f64,
    pub unit: Unit,
}

impl Period {
    pub const fn new(value: f64, unit: Unit) -> Self {
        Self { value, unit }
    }

    pub const fn seconds(value: f64) -> Self {
        Self::new(value, Unit::Seconds)
    }

    #[inline]
    pub fn as_secs_f64(&self) -> f64 {
        self.value * self.unit.to_seconds()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.suffix())
    }
}

/// `10.0 * Unit::Seconds`
impl Mul<Unit> for f64 {
    type Output = Period;

    fn mul(self, unit: Unit) -> Period {
        Period::new(self, unit)
    }
}

impl Mul<Unit> for i64 {
    type Output = Period;

    fn mul(self, unit: Unit) -> Period {
        Period::new(self as f64, unit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Bool,
    Int,
    Float,
    Str,
    Any,
}

/// Declared record shape of a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordType {
    pub name: String,
    fields: BTreeMap<String, FieldType>,
}

impl RecordType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>, ty: FieldType) -> Self {
        self.fields.insert(field.into(), ty);
        self
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn field_type(&self, field: &str) -> Option<FieldType> {
        self.fields.get(field).copied()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, FieldType)> {
        self.fields.iter().map(|(name, ty)| (name.as_str(), *ty))
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EvalOptions {
    /// Upper bound on entries kept per history key; `None` keeps everything.
    pub history_capacity: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompileOptions {
    /// Name of the record field a timestamped input carries its event time in.
    pub time_field: String,
    /// Options for the evaluator bound into the compiled pipeline.
    pub eval: EvalOptions,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            time_field: "time".to_string(),
            eval: EvalOptions::default(),
        }
    }
}
