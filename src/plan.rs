use crate::ops::{OpCode, OperatorRegistry};
use crate::value::Value;
use serde::Serialize;
use std::fmt;
use std::ops::Index;

/// Index of a node inside its [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphArg {
    Node(NodeId),
    Literal(Value),
}

impl GraphArg {
    #[inline]
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Self::Node(id) => Some(*id),
            Self::Literal(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub op: OpCode,
    pub args: Vec<GraphArg>,
    /// Operator payload: constant value, source/field/param name, callee path or period.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl GraphNode {
    #[inline]
    pub fn name(&self) -> &'static str {
        OperatorRegistry::get_by_op(self.op).name
    }

    /// Node arguments only, in positional order.
    pub fn inputs(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.args.iter().filter_map(GraphArg::node)
    }

    pub fn value_str(&self) -> Option<&str> {
        match &self.value {
            Some(Value::Str(s)) => Some(s),
            _ => None,
        }
    }
}

/// Arena of pipeline nodes; children always precede their parents.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Graph {
    nodes: Vec<GraphNode>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: GraphNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &GraphNode)> {
        self.nodes.iter().enumerate().map(|(idx, n)| (NodeId(idx), n))
    }

    pub fn count_op(&self, op: OpCode) -> usize {
        self.nodes.iter().filter(|n| n.op == op).count()
    }

    /// Nodes taking `id` as an argument.
    pub fn consumers(&self, id: NodeId) -> Vec<NodeId> {
        self.iter()
            .filter(|(_, n)| n.inputs().any(|input| input == id))
            .map(|(idx, _)| idx)
            .collect()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl Index<NodeId> for Graph {
    type Output = GraphNode;

    #[inline]
    fn index(&self, id: NodeId) -> &GraphNode {
        &self.nodes[id.0]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompileManifest {
    pub node_count: usize,
    pub source_count: usize,
    /// Number of expression nodes lowered (before source de-dup).
    pub lowered_op_count: usize,
    /// Source references served by an already created `source` node.
    pub source_dedup_count: usize,
    /// Root carries an `every` schedule.
    pub scheduled: bool,
    /// End-to-end compile latency in microseconds.
    pub compile_time_us: u64,
}

impl CompileManifest {
    #[inline]
    pub fn summary_line(&self) -> String {
        format!(
            "nodes={} sources={} lowered={} source_dedup={} scheduled={} compile_us={}",
            self.node_count,
            self.source_count,
            self.lowered_op_count,
            self.source_dedup_count,
            self.scheduled,
            self.compile_time_us
        )
    }
}
