use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use weft_core::{retry, RetryConfig, WeftError};

use crate::edge::ConditionalEdge;
use crate::node::{FlowNode, NodeResult, NodeType};
use crate::trace::{render_detail, ExecutionRecord};
use crate::wrapper::NodeWrapper;

/// Aggregate outcome of one parallel-node visit.
///
/// A failed branch stores `None` in its slot; the last observed branch
/// error becomes `error`. `all_completed` is false when any branch
/// failed or the coordinator stopped early on cancellation.
pub struct ParallelResult<S> {
    pub branch_results: HashMap<String, Option<NodeResult<S>>>,
    pub all_completed: bool,
    pub error: Option<WeftError>,
}

/// A workflow graph plus its executor.
///
/// Owns the nodes, the edge table, the shared state and the execution
/// trace. Traversal is strictly sequential; only the branches of a
/// parallel node run concurrently, and the loop blocks on the parallel
/// node until every branch has finished.
///
/// # Shared-state contract
///
/// Every node invocation receives the same `Arc<S>`, including all
/// branches of a parallel node at once. The engine takes no locks:
/// nodes mutate state through their own interior mutability, and
/// parallel branches must either write disjoint fields or accept
/// last-writer-wins races.
pub struct Flow<S> {
    wrappers: HashMap<String, Arc<NodeWrapper<S>>>,
    edges: HashMap<String, Vec<ConditionalEdge>>,
    start_node: Option<String>,
    /// Names registered as branches of some parallel node; exempt from
    /// the outgoing-edge rule.
    branch_names: HashSet<String>,
    state: Arc<S>,
    trace: Vec<ExecutionRecord>,
    retry: RetryConfig,
}

impl<S: Send + Sync + 'static> Flow<S> {
    pub fn new(state: Arc<S>) -> Self {
        Self {
            wrappers: HashMap::new(),
            edges: HashMap::new(),
            start_node: None,
            branch_names: HashSet::new(),
            state,
            trace: Vec::new(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Register a node. A Start node becomes the traversal entry point
    /// (last registration wins); a Parallel node's branches are
    /// auto-registered so the fan-out can reach them.
    pub fn add_node(&mut self, node: FlowNode<S>) -> &mut Self {
        let (wrapper, branch_wrappers) = NodeWrapper::resolve(node);

        if wrapper.node_type() == NodeType::Start {
            self.start_node = Some(wrapper.name().to_string());
        }

        for branch in branch_wrappers {
            self.branch_names.insert(branch.name().to_string());
            self.wrappers
                .insert(branch.name().to_string(), Arc::new(branch));
        }

        self.wrappers
            .insert(wrapper.name().to_string(), Arc::new(wrapper));
        self
    }

    /// Add an unconditional edge.
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.add_conditional_edge(from, to, None)
    }

    /// Add an edge, optionally guarded by a decision outcome.
    pub fn add_conditional_edge(
        &mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        condition: Option<bool>,
    ) -> &mut Self {
        let from = from.into();
        let edge = ConditionalEdge {
            from: from.clone(),
            to: to.into(),
            condition,
        };
        self.edges.entry(from).or_default().push(edge);
        self
    }

    /// Check graph well-formedness. Idempotent; runs at the top of every
    /// [`Flow::execute`] call and fails fast on the first violation.
    pub fn validate(&self) -> Result<(), WeftError> {
        if self.wrappers.is_empty() {
            return Err(WeftError::Graph("flow has no nodes".to_string()));
        }

        let start = self
            .start_node
            .as_deref()
            .ok_or_else(|| WeftError::Graph("flow has no start node".to_string()))?;
        if !self.wrappers.contains_key(start) {
            return Err(WeftError::Graph(format!(
                "start node '{start}' is not registered"
            )));
        }

        if !self
            .wrappers
            .values()
            .any(|w| w.node_type() == NodeType::End)
        {
            return Err(WeftError::Graph("flow has no end node".to_string()));
        }

        for (name, wrapper) in &self.wrappers {
            if wrapper.node_type() == NodeType::End || self.branch_names.contains(name) {
                continue;
            }
            if self.edges.get(name).map_or(true, |edges| edges.is_empty()) {
                return Err(WeftError::Graph(format!(
                    "node '{name}' has no outgoing edge"
                )));
            }
        }

        for (name, wrapper) in &self.wrappers {
            if wrapper.node_type() != NodeType::Decision {
                continue;
            }
            if let Some(edges) = self.edges.get(name) {
                for edge in edges {
                    if edge.condition.is_none() {
                        return Err(WeftError::Graph(format!(
                            "decision node '{name}' has an unconditioned outgoing edge to '{}'",
                            edge.to
                        )));
                    }
                }
            }
        }

        for edges in self.edges.values() {
            for edge in edges {
                if !self.wrappers.contains_key(&edge.to) {
                    return Err(WeftError::Graph(format!(
                        "edge '{}' -> '{}' targets an unregistered node",
                        edge.from, edge.to
                    )));
                }
            }
        }

        Ok(())
    }

    /// Walk the graph from the start node until an End node is visited
    /// or no next edge is found. Clears and repopulates the trace.
    pub async fn execute(&mut self, token: CancellationToken) -> Result<(), WeftError> {
        self.validate()?;
        self.trace.clear();

        let mut current = self.start_node.clone();
        let mut state = self.state.clone();

        while let Some(name) = current {
            let Some(wrapper) = self.wrappers.get(&name).cloned() else {
                break;
            };

            debug!(node = %name, node_type = %wrapper.node_type(), "visiting node");

            let mut record = ExecutionRecord {
                node_name: name.clone(),
                node_type: wrapper.node_type(),
                success: true,
                error: None,
                decision: None,
            };

            match wrapper.node_type() {
                NodeType::Execute => {
                    let outcome = retry(&self.retry, &token, |attempt_token| {
                        let wrapper = wrapper.clone();
                        let state = state.clone();
                        async move { wrapper.execute_with_state(attempt_token, state).await }
                    })
                    .await;

                    match outcome {
                        Ok(result) => {
                            if let Some(new_state) = result.state {
                                state = new_state;
                            }
                            self.trace.push(record);
                            current = self.next_node(&name);
                        }
                        Err(e) => {
                            record.success = false;
                            record.error = Some(e.to_string());
                            self.trace.push(record);
                            return Err(WeftError::for_node(name, e));
                        }
                    }
                }

                NodeType::Decision => {
                    let outcome = retry(&self.retry, &token, |attempt_token| {
                        let wrapper = wrapper.clone();
                        let state = state.clone();
                        async move { wrapper.decide_with_state(attempt_token, state).await }
                    })
                    .await;

                    match outcome {
                        Ok(decision) => {
                            record.decision = Some(decision);
                            self.trace.push(record);
                            current = self.next_node_for_decision(&name, decision);
                        }
                        Err(e) => {
                            record.success = false;
                            record.error = Some(e.to_string());
                            self.trace.push(record);
                            return Err(WeftError::for_node(name, e));
                        }
                    }
                }

                NodeType::Parallel => {
                    let result = self
                        .run_parallel_branches(&token, wrapper.branches(), state.clone())
                        .await;

                    // Cancellation is the only fatal outcome here; a
                    // branch's own failure is soft and only reflected
                    // in the trace record.
                    if matches!(result.error, Some(WeftError::Cancelled)) {
                        record.success = false;
                        record.error = Some(WeftError::Cancelled.to_string());
                        self.trace.push(record);
                        return Err(WeftError::for_node(name, WeftError::Cancelled));
                    }

                    record.success = result.all_completed;
                    record.error = result.error.as_ref().map(|e| e.to_string());
                    self.trace.push(record);
                    current = self.next_node(&name);
                }

                NodeType::End => {
                    if let Some(policy) = wrapper.join_policy() {
                        debug!(node = %name, ?policy, "end node declares a join policy");
                    }
                    self.trace.push(record);
                    debug!(detail = %render_detail(&self.trace), "flow finished");
                    return Ok(());
                }

                NodeType::Start | NodeType::Join => {
                    self.trace.push(record);
                    current = self.next_node(&name);
                }
            }
        }

        Ok(())
    }

    /// The shared state object for this flow.
    pub fn state(&self) -> Arc<S> {
        self.state.clone()
    }

    pub fn execution_trace(&self) -> &[ExecutionRecord] {
        &self.trace
    }

    pub fn clear_execution_trace(&mut self) {
        self.trace.clear();
    }

    /// Human-readable report over the most recent run's trace.
    pub fn flow_detail(&self) -> String {
        render_detail(&self.trace)
    }

    fn next_node(&self, name: &str) -> Option<String> {
        self.edges.get(name).and_then(|edges| {
            edges
                .iter()
                .find(|edge| edge.condition.is_none())
                .map(|edge| edge.to.clone())
        })
    }

    fn next_node_for_decision(&self, name: &str, decision: bool) -> Option<String> {
        let edges = self.edges.get(name)?;

        if let Some(edge) = edges.iter().find(|e| e.condition == Some(decision)) {
            return Some(edge.to.clone());
        }

        // Fall back to an unconditional edge; validation rejects these
        // on decision nodes, so this only matters for hand-built graphs
        // that skipped validation.
        edges
            .iter()
            .find(|e| e.condition.is_none())
            .map(|e| e.to.clone())
    }

    /// Run every branch concurrently on its own task, collecting one
    /// `(name, result)` tuple per branch. The channel is sized to the
    /// branch count so producers never block; the coordinator waits for
    /// all tuples or for cancellation, whichever comes first. Siblings
    /// are never cancelled because one branch failed.
    async fn run_parallel_branches(
        &self,
        token: &CancellationToken,
        branches: &[String],
        state: Arc<S>,
    ) -> ParallelResult<S> {
        if branches.is_empty() {
            return ParallelResult {
                branch_results: HashMap::new(),
                all_completed: true,
                error: None,
            };
        }

        let (tx, mut rx) = mpsc::channel(branches.len());

        for name in branches {
            let tx = tx.clone();
            let token = token.clone();
            let state = state.clone();
            let wrapper = self.wrappers.get(name).cloned();
            let name = name.clone();

            tokio::spawn(async move {
                let result = match wrapper {
                    None => Err(WeftError::Graph(format!(
                        "branch node '{name}' is not registered"
                    ))),
                    Some(wrapper) => match wrapper.node_type() {
                        NodeType::Execute => wrapper.execute_with_state(token, state).await,
                        other => Err(WeftError::UnsupportedBranch {
                            node: name.clone(),
                            node_type: other.to_string(),
                        }),
                    },
                };
                let _ = tx.send((name, result)).await;
            });
        }
        drop(tx);

        let mut branch_results = HashMap::new();
        let mut last_error = None;

        for _ in 0..branches.len() {
            tokio::select! {
                received = rx.recv() => match received {
                    Some((name, Ok(result))) => {
                        branch_results.insert(name, Some(result));
                    }
                    Some((name, Err(e))) => {
                        branch_results.insert(name, None);
                        last_error = Some(e);
                    }
                    None => break,
                },
                _ = token.cancelled() => {
                    // Workers are not torn down; they may finish after
                    // the coordinator has returned.
                    return ParallelResult {
                        branch_results,
                        all_completed: false,
                        error: Some(WeftError::Cancelled),
                    };
                }
            }
        }

        let all_completed = last_error.is_none();
        ParallelResult {
            branch_results,
            all_completed,
            error: last_error,
        }
    }
}
