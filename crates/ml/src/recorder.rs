use crate::graph::Node;

/// Sink for the operations a forward pass performs.
pub trait Recorder {
    fn record(&mut self, node: Node);
    fn nodes(&self) -> &[Node];
}
