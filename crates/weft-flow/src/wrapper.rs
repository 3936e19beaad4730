use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use weft_core::WeftError;

use crate::node::{DecisionNode, ExecuteNode, FlowNode, JoinPolicy, NodeResult, NodeType};

/// A registered node with its capabilities resolved.
///
/// The flow holds one wrapper per node name regardless of the node's
/// kind; capability slots are filled once, at registration, so dispatch
/// never re-inspects the concrete node.
pub(crate) struct NodeWrapper<S> {
    name: String,
    node_type: NodeType,
    execute: Option<Arc<dyn ExecuteNode<S>>>,
    decision: Option<Arc<dyn DecisionNode<S>>>,
    /// Branch node names, in declaration order. Empty unless Parallel.
    branches: Vec<String>,
    join: Option<JoinPolicy>,
}

impl<S> NodeWrapper<S> {
    /// Resolve a node into its wrapper plus wrappers for any parallel
    /// branches, which the flow registers under the same table. Branch
    /// resolution is one level deep, matching registration semantics:
    /// a nested parallel branch is registered but its own branches are
    /// not.
    pub(crate) fn resolve(node: FlowNode<S>) -> (Self, Vec<NodeWrapper<S>>) {
        match node {
            FlowNode::Start { name } => (Self::plain(name, NodeType::Start), Vec::new()),
            FlowNode::End { name } => (Self::plain(name, NodeType::End), Vec::new()),
            FlowNode::Execute(exec) => (
                Self {
                    name: exec.name().to_string(),
                    node_type: NodeType::Execute,
                    execute: Some(exec),
                    decision: None,
                    branches: Vec::new(),
                    join: None,
                },
                Vec::new(),
            ),
            FlowNode::Decision(dec) => (
                Self {
                    name: dec.name().to_string(),
                    node_type: NodeType::Decision,
                    execute: None,
                    decision: Some(dec),
                    branches: Vec::new(),
                    join: None,
                },
                Vec::new(),
            ),
            FlowNode::Parallel { name, branches } => {
                let branch_wrappers: Vec<NodeWrapper<S>> = branches
                    .into_iter()
                    .map(|branch| Self::resolve(branch).0)
                    .collect();
                let branch_names = branch_wrappers
                    .iter()
                    .map(|w| w.name.clone())
                    .collect();
                (
                    Self {
                        name,
                        node_type: NodeType::Parallel,
                        execute: None,
                        decision: None,
                        branches: branch_names,
                        join: None,
                    },
                    branch_wrappers,
                )
            }
            FlowNode::Join { name, policy } => (
                Self {
                    join: Some(policy),
                    ..Self::plain(name, NodeType::Join)
                },
                Vec::new(),
            ),
            FlowNode::JoinEnd { name, policy } => (
                Self {
                    join: Some(policy),
                    ..Self::plain(name, NodeType::End)
                },
                Vec::new(),
            ),
        }
    }

    fn plain(name: String, node_type: NodeType) -> Self {
        Self {
            name,
            node_type,
            execute: None,
            decision: None,
            branches: Vec::new(),
            join: None,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn node_type(&self) -> NodeType {
        self.node_type
    }

    pub(crate) fn branches(&self) -> &[String] {
        &self.branches
    }

    pub(crate) fn join_policy(&self) -> Option<JoinPolicy> {
        self.join
    }

    pub(crate) async fn execute_with_state(
        &self,
        token: CancellationToken,
        state: Arc<S>,
    ) -> Result<NodeResult<S>, WeftError> {
        match &self.execute {
            Some(node) => node.execute(token, state).await,
            None => Err(WeftError::NotExecutable(self.name.clone())),
        }
    }

    pub(crate) async fn decide_with_state(
        &self,
        token: CancellationToken,
        state: Arc<S>,
    ) -> Result<bool, WeftError> {
        match &self.decision {
            Some(node) => node.decide(token, state).await,
            None => Err(WeftError::NotDecidable(self.name.clone())),
        }
    }
}
