#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Domain {
    /// Pipeline entry points and constants.
    Source,
    /// Stateless per-record computation.
    Elem,
    /// Operators carrying state across records.
    Temporal,
    /// Structural helpers: lists, lambdas, external calls.
    Structural,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpCode {
    Const,
    Source,
    Field,
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    Not,
    Neg,
    Index,
    Last,
    Every,
    Always,
    Multiplex,
    GlobalTime,
    Since,
    RollingWindow,
    Call,
    List,
    Lambda,
    Param,
}

impl OpCode {
    pub const COUNT: usize = Self::Param as usize + 1;

    #[inline]
    pub const fn as_usize(self) -> usize {
        self as usize
    }
}
