use crate::recorder::Recorder;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EOp {
    Add,
    Sub,
    Mul,
    MulScalar,
    MatMul,
    AddBroadcast,
    Tanh,
    Relu,
    Sin,
    Abs,
    Clamp,
    Column(usize),
    Concat,
    SumCols,
    ReduceSum,
    ReduceMean,
}

/// One recorded operation: `out = op(a, b)`. Unary ops store `b == a`.
#[derive(Clone, Debug)]
pub struct Node {
    pub op: EOp,
    pub a: usize,
    pub b: usize,
    pub out: usize,
}

/// Forward-only recorder used for evaluation passes that are never
/// differentiated.
#[derive(Default)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Recorder for Graph {
    fn record(&mut self, node: Node) {
        self.nodes.push(node);
    }

    fn nodes(&self) -> &[Node] {
        &self.nodes
    }
}

impl Graph {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }
}
