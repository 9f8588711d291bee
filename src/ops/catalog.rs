use crate::ops::{Domain, OpCode};
use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arity {
    /// Exactly `n` graph arguments.
    Exact(u8),
    /// At least `n` graph arguments.
    AtLeast(u8),
}

impl Arity {
    #[inline]
    pub const fn accepts(self, count: usize) -> bool {
        match self {
            Self::Exact(n) => count == n as usize,
            Self::AtLeast(n) => count >= n as usize,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OpMeta {
    /// Node name written into compiled graphs.
    pub name: &'static str,
    pub op: OpCode,
    pub domain: Domain,
    pub arity: Arity,
    /// Whether user code reaches this operator as a plain call (`since(...)`).
    pub callable: bool,
}

pub struct OperatorRegistry;

impl OperatorRegistry {
    pub fn get(name: &str) -> Option<&'static OpMeta> {
        let index = REGISTRY_INDEX.get_or_init(build_registry_index);
        index.by_name.get(name).map(|idx| &OP_METAS[*idx])
    }

    pub fn get_by_op(op: OpCode) -> &'static OpMeta {
        let index = REGISTRY_INDEX.get_or_init(build_registry_index);
        &OP_METAS[index.by_op[op.as_usize()]]
    }

    /// Temporal operator reachable through a call node, e.g. `since` or `always`.
    pub fn temporal_call(name: &str) -> Option<&'static OpMeta> {
        Self::get(name).filter(|meta| meta.callable)
    }

    pub fn all() -> &'static [OpMeta] {
        &OP_METAS
    }
}

struct RegistryIndex {
    by_name: HashMap<&'static str, usize>,
    by_op: [usize; OP_CODE_COUNT],
}

static REGISTRY_INDEX: OnceLock<RegistryIndex> = OnceLock::new();
const MISSING_IDX: usize = usize::MAX;
const OP_CODE_COUNT: usize = OpCode::COUNT;

fn build_registry_index() -> RegistryIndex {
    let mut by_name = HashMap::with_capacity(OP_METAS.len());
    let mut by_op = [MISSING_IDX; OP_CODE_COUNT];

    for (idx, meta) in OP_METAS.iter().enumerate() {
        if meta.callable && meta.domain != Domain::Temporal {
            panic!("operator `{}` is callable but not temporal", meta.name);
        }
        if by_name.insert(meta.name, idx).is_some() {
            panic!("duplicate operator name in registry: {}", meta.name);
        }
        let op_slot = meta.op.as_usize();
        if by_op[op_slot] != MISSING_IDX {
            panic!("duplicate opcode in registry: {:?}", meta.op);
        }
        by_op[op_slot] = idx;
    }

    for (op_slot, idx) in by_op.iter().enumerate() {
        if *idx == MISSING_IDX {
            panic!("opcode slot not registered: {}", op_slot);
        }
    }

    RegistryIndex { by_name, by_op }
}

const fn meta(name: &'static str, op: OpCode, domain: Domain, arity: Arity) -> OpMeta {
    OpMeta {
        name,
        op,
        domain,
        arity,
        callable: false,
    }
}

const fn elem_binary(name: &'static str, op: OpCode) -> OpMeta {
    meta(name, op, Domain::Elem, Arity::Exact(2))
}

const fn elem_unary(name: &'static str, op: OpCode) -> OpMeta {
    meta(name, op, Domain::Elem, Arity::Exact(1))
}

const fn temporal(name: &'static str, op: OpCode, arity: Arity) -> OpMeta {
    OpMeta {
        name,
        op,
        domain: Domain::Temporal,
        arity,
        callable: true,
    }
}

const OP_METAS: [OpMeta; 30] = [
    meta("const", OpCode::Const, Domain::Source, Arity::Exact(1)),
    meta("source", OpCode::Source, Domain::Source, Arity::Exact(0)),
    meta("field", OpCode::Field, Domain::Elem, Arity::Exact(1)),
    elem_binary("add", OpCode::Add),
    elem_binary("sub", OpCode::Sub),
    elem_binary("mul", OpCode::Mul),
    elem_binary("div", OpCode::Div),
    elem_binary("pow", OpCode::Pow),
    elem_binary("lt", OpCode::Lt),
    elem_binary("le", OpCode::Le),
    elem_binary("gt", OpCode::Gt),
    elem_binary("ge", OpCode::Ge),
    elem_binary("eq", OpCode::Eq),
    elem_binary("ne", OpCode::Ne),
    elem_binary("and", OpCode::And),
    elem_binary("or", OpCode::Or),
    elem_unary("not", OpCode::Not),
    elem_unary("neg", OpCode::Neg),
    meta("index", OpCode::Index, Domain::Temporal, Arity::Exact(2)),
    temporal("last", OpCode::Last, Arity::Exact(1)),
    // Scheduling is structural; there is no `every(...)` call form.
    meta("every", OpCode::Every, Domain::Temporal, Arity::Exact(2)),
    temporal("always", OpCode::Always, Arity::Exact(2)),
    temporal("multiplex", OpCode::Multiplex, Arity::Exact(3)),
    temporal("global_time", OpCode::GlobalTime, Arity::Exact(0)),
    temporal("since", OpCode::Since, Arity::Exact(3)),
    temporal("rolling_window", OpCode::RollingWindow, Arity::Exact(3)),
    meta("call", OpCode::Call, Domain::Structural, Arity::AtLeast(0)),
    meta("list", OpCode::List, Domain::Structural, Arity::AtLeast(0)),
    meta("lambda", OpCode::Lambda, Domain::Structural, Arity::Exact(1)),
    meta("param", OpCode::Param, Domain::Structural, Arity::Exact(0)),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_count_matches_registry_entries() {
        assert_eq!(
            OP_METAS.len(),
            OpCode::COUNT,
            "new opcode should be wired into OP_METAS"
        );
        let mut seen = [false; OP_CODE_COUNT];
        for meta in OP_METAS {
            let slot = meta.op.as_usize();
            assert!(!seen[slot], "duplicate opcode slot {}", slot);
            seen[slot] = true;
        }
        assert!(
            seen.into_iter().all(|v| v),
            "all opcode slots must be covered"
        );
    }

    #[test]
    fn lookup_by_name_and_opcode_agree() {
        let since = OperatorRegistry::get("since").expect("since registered");
        assert_eq!(since.op, OpCode::Since);
        assert_eq!(OperatorRegistry::get_by_op(OpCode::Since).name, "since");
        assert!(OperatorRegistry::temporal_call("always").is_some());
        assert!(OperatorRegistry::temporal_call("every").is_none());
        assert!(OperatorRegistry::temporal_call("add").is_none());
    }

    #[test]
    fn arity_checks() {
        assert!(Arity::Exact(3).accepts(3));
        assert!(!Arity::Exact(3).accepts(2));
        assert!(Arity::AtLeast(0).accepts(0));
    }
}
