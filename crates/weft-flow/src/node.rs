use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use weft_core::WeftError;

/// The kind of a graph vertex, driving executor dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NodeType {
    Start,
    End,
    Execute,
    Decision,
    Parallel,
    Join,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Start => "Start",
            NodeType::End => "End",
            NodeType::Execute => "Execute",
            NodeType::Decision => "Decision",
            NodeType::Parallel => "Parallel",
            NodeType::Join => "Join",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a join point waits on parallel branches.
///
/// Only [`JoinPolicy::All`] is honored by the executor; `Any` and `N`
/// are declared for graph definitions but currently unsupported — the
/// parallel coordinator always awaits every branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JoinPolicy {
    All,
    Any,
    N(usize),
}

/// Outcome of one execute-node invocation.
///
/// `state: Some(_)` hands the executor a replacement state pointer to
/// adopt for the rest of the traversal; `None` means "unchanged".
pub struct NodeResult<S> {
    pub success: bool,
    pub data: Option<Value>,
    pub state: Option<Arc<S>>,
}

impl<S> NodeResult<S> {
    pub fn ok() -> Self {
        Self {
            success: true,
            data: None,
            state: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_state(mut self, state: Arc<S>) -> Self {
        self.state = Some(state);
        self
    }
}

impl<S> fmt::Debug for NodeResult<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeResult")
            .field("success", &self.success)
            .field("data", &self.data)
            .field("has_state", &self.state.is_some())
            .finish()
    }
}

/// A node that performs work against the shared state.
#[async_trait]
pub trait ExecuteNode<S>: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(
        &self,
        token: CancellationToken,
        state: Arc<S>,
    ) -> Result<NodeResult<S>, WeftError>;
}

/// A node that routes traversal by inspecting the shared state.
#[async_trait]
pub trait DecisionNode<S>: Send + Sync {
    fn name(&self) -> &str;

    async fn decide(&self, token: CancellationToken, state: Arc<S>) -> Result<bool, WeftError>;
}

/// A graph vertex with its capabilities declared at construction.
///
/// Capability-based polymorphism as a tagged union: the flow resolves
/// each variant into a capability wrapper once at registration, so
/// dispatch never re-inspects the concrete node.
pub enum FlowNode<S> {
    Start { name: String },
    End { name: String },
    Execute(Arc<dyn ExecuteNode<S>>),
    Decision(Arc<dyn DecisionNode<S>>),
    Parallel { name: String, branches: Vec<FlowNode<S>> },
    Join { name: String, policy: JoinPolicy },
    /// An end node that is also the synchronization point after a
    /// parallel fan-out.
    JoinEnd { name: String, policy: JoinPolicy },
}

impl<S> FlowNode<S> {
    pub fn start(name: impl Into<String>) -> Self {
        Self::Start { name: name.into() }
    }

    pub fn end(name: impl Into<String>) -> Self {
        Self::End { name: name.into() }
    }

    pub fn execute(node: impl ExecuteNode<S> + 'static) -> Self {
        Self::Execute(Arc::new(node))
    }

    pub fn decision(node: impl DecisionNode<S> + 'static) -> Self {
        Self::Decision(Arc::new(node))
    }

    pub fn parallel(name: impl Into<String>, branches: Vec<FlowNode<S>>) -> Self {
        Self::Parallel {
            name: name.into(),
            branches,
        }
    }

    pub fn join(name: impl Into<String>, policy: JoinPolicy) -> Self {
        Self::Join {
            name: name.into(),
            policy,
        }
    }

    pub fn join_end(name: impl Into<String>, policy: JoinPolicy) -> Self {
        Self::JoinEnd {
            name: name.into(),
            policy,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Start { name }
            | Self::End { name }
            | Self::Parallel { name, .. }
            | Self::Join { name, .. }
            | Self::JoinEnd { name, .. } => name,
            Self::Execute(node) => node.name(),
            Self::Decision(node) => node.name(),
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Start { .. } => NodeType::Start,
            // JoinEnd carries End type; its join policy rides along.
            Self::End { .. } | Self::JoinEnd { .. } => NodeType::End,
            Self::Execute(_) => NodeType::Execute,
            Self::Decision(_) => NodeType::Decision,
            Self::Parallel { .. } => NodeType::Parallel,
            Self::Join { .. } => NodeType::Join,
        }
    }
}

/// Wraps an async closure as an [`ExecuteNode`].
pub struct FnExecuteNode<S, F, Fut>
where
    F: Fn(CancellationToken, Arc<S>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<NodeResult<S>, WeftError>> + Send,
{
    name: String,
    func: F,
    _marker: PhantomData<fn() -> S>,
}

impl<S, F, Fut> FnExecuteNode<S, F, Fut>
where
    F: Fn(CancellationToken, Arc<S>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<NodeResult<S>, WeftError>> + Send,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<S, F, Fut> ExecuteNode<S> for FnExecuteNode<S, F, Fut>
where
    S: Send + Sync,
    F: Fn(CancellationToken, Arc<S>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<NodeResult<S>, WeftError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        token: CancellationToken,
        state: Arc<S>,
    ) -> Result<NodeResult<S>, WeftError> {
        (self.func)(token, state).await
    }
}

/// Wraps an async closure as a [`DecisionNode`].
pub struct FnDecisionNode<S, F, Fut>
where
    F: Fn(CancellationToken, Arc<S>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<bool, WeftError>> + Send,
{
    name: String,
    func: F,
    _marker: PhantomData<fn() -> S>,
}

impl<S, F, Fut> FnDecisionNode<S, F, Fut>
where
    F: Fn(CancellationToken, Arc<S>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<bool, WeftError>> + Send,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<S, F, Fut> DecisionNode<S> for FnDecisionNode<S, F, Fut>
where
    S: Send + Sync,
    F: Fn(CancellationToken, Arc<S>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<bool, WeftError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn decide(&self, token: CancellationToken, state: Arc<S>) -> Result<bool, WeftError> {
        (self.func)(token, state).await
    }
}
