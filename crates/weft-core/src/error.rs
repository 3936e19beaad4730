use thiserror::Error;

/// Error type shared across the weft workspace.
#[derive(Debug, Error)]
pub enum WeftError {
    /// The graph definition is malformed. Raised by validation before any
    /// node runs; the message names the offending node or edge.
    #[error("invalid graph: {0}")]
    Graph(String),

    /// A node's own business logic failed. Constructed by caller-provided
    /// node implementations.
    #[error("node error: {0}")]
    Node(String),

    /// The node has no execute capability.
    #[error("node '{0}' is not an execute node")]
    NotExecutable(String),

    /// The node has no decision capability.
    #[error("node '{0}' is not a decision node")]
    NotDecidable(String),

    /// A parallel branch of an unsupported kind. Contained within the
    /// branch's slot of the parallel result, never flow-fatal.
    #[error("unsupported branch node type for '{node}': {node_type}")]
    UnsupportedBranch { node: String, node_type: String },

    /// A node failed fatally during traversal, aborting the flow.
    #[error("node '{node}' failed: {source}")]
    NodeFailed {
        node: String,
        #[source]
        source: Box<WeftError>,
    },

    /// The cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,
}

impl WeftError {
    /// Wrap a fatal error with the name of the node it came from.
    pub fn for_node(node: impl Into<String>, source: WeftError) -> Self {
        Self::NodeFailed {
            node: node.into(),
            source: Box::new(source),
        }
    }
}
