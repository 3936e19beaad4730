use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use weft_core::{RetryConfig, WeftError};
use weft_flow::{
    DecisionNode, ExecuteNode, Flow, FlowNode, FnExecuteNode, NodeResult, NodeType,
};

#[derive(Default)]
struct CompanionState {
    affinity: AtomicU32,
    visited: Mutex<Vec<String>>,
    escalate: AtomicBool,
}

impl CompanionState {
    fn visit(&self, name: &str) {
        self.visited.lock().unwrap().push(name.to_string());
    }
}

struct AffinityNode {
    name: String,
    delta: u32,
}

#[async_trait]
impl ExecuteNode<CompanionState> for AffinityNode {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        _token: CancellationToken,
        state: Arc<CompanionState>,
    ) -> Result<NodeResult<CompanionState>, WeftError> {
        state.affinity.fetch_add(self.delta, Ordering::SeqCst);
        state.visit(&self.name);
        Ok(NodeResult::ok())
    }
}

struct EscalateDecision;

#[async_trait]
impl DecisionNode<CompanionState> for EscalateDecision {
    fn name(&self) -> &str {
        "should_escalate"
    }

    async fn decide(
        &self,
        _token: CancellationToken,
        state: Arc<CompanionState>,
    ) -> Result<bool, WeftError> {
        state.visit("should_escalate");
        Ok(state.escalate.load(Ordering::SeqCst))
    }
}

fn no_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 0,
        initial_backoff_ms: 1,
        max_backoff_ms: 1,
    }
}

#[tokio::test]
async fn state_mutation_is_visible_after_execute() {
    let state = Arc::new(CompanionState::default());
    state.affinity.store(50, Ordering::SeqCst);

    let mut flow = Flow::new(state);
    flow.add_node(FlowNode::start("start"))
        .add_node(FlowNode::execute(AffinityNode {
            name: "raise_affinity".into(),
            delta: 5,
        }))
        .add_node(FlowNode::end("end"))
        .add_edge("start", "raise_affinity")
        .add_edge("raise_affinity", "end");

    flow.execute(CancellationToken::new()).await.unwrap();

    assert_eq!(flow.state().affinity.load(Ordering::SeqCst), 55);
}

#[tokio::test]
async fn repeated_runs_produce_identical_traces() {
    let mut flow = Flow::new(Arc::new(CompanionState::default()));
    flow.add_node(FlowNode::start("start"))
        .add_node(FlowNode::execute(AffinityNode {
            name: "step_one".into(),
            delta: 1,
        }))
        .add_node(FlowNode::execute(AffinityNode {
            name: "step_two".into(),
            delta: 1,
        }))
        .add_node(FlowNode::end("end"))
        .add_edge("start", "step_one")
        .add_edge("step_one", "step_two")
        .add_edge("step_two", "end");

    flow.execute(CancellationToken::new()).await.unwrap();
    let first: Vec<(String, NodeType)> = flow
        .execution_trace()
        .iter()
        .map(|r| (r.node_name.clone(), r.node_type))
        .collect();

    flow.execute(CancellationToken::new()).await.unwrap();
    let second: Vec<(String, NodeType)> = flow
        .execution_trace()
        .iter()
        .map(|r| (r.node_name.clone(), r.node_type))
        .collect();

    assert_eq!(first, second);
    assert_eq!(
        first,
        vec![
            ("start".to_string(), NodeType::Start),
            ("step_one".to_string(), NodeType::Execute),
            ("step_two".to_string(), NodeType::Execute),
            ("end".to_string(), NodeType::End),
        ]
    );
}

#[tokio::test]
async fn decision_routes_both_ways() {
    for escalate in [true, false] {
        let state = Arc::new(CompanionState::default());
        state.escalate.store(escalate, Ordering::SeqCst);

        let mut flow = Flow::new(state.clone());
        flow.add_node(FlowNode::start("start"))
            .add_node(FlowNode::decision(EscalateDecision))
            .add_node(FlowNode::execute(AffinityNode {
                name: "escalated".into(),
                delta: 10,
            }))
            .add_node(FlowNode::execute(AffinityNode {
                name: "calm".into(),
                delta: 1,
            }))
            .add_node(FlowNode::end("end"))
            .add_edge("start", "should_escalate")
            .add_conditional_edge("should_escalate", "escalated", Some(true))
            .add_conditional_edge("should_escalate", "calm", Some(false))
            .add_edge("escalated", "end")
            .add_edge("calm", "end");

        flow.execute(CancellationToken::new()).await.unwrap();

        let expected = if escalate { "escalated" } else { "calm" };
        let visited = state.visited.lock().unwrap().clone();
        assert!(visited.contains(&expected.to_string()));

        let decision_record = flow
            .execution_trace()
            .iter()
            .find(|r| r.node_name == "should_escalate")
            .unwrap();
        assert_eq!(decision_record.decision, Some(escalate));
    }
}

#[tokio::test]
async fn execute_failure_aborts_and_names_the_node() {
    let mut flow = Flow::new(Arc::new(CompanionState::default())).with_retry(no_retry());
    flow.add_node(FlowNode::start("start"))
        .add_node(FlowNode::execute(FnExecuteNode::new(
            "flaky",
            |_, _: Arc<CompanionState>| async move {
                Err::<NodeResult<CompanionState>, _>(WeftError::Node("upstream timeout".into()))
            },
        )))
        .add_node(FlowNode::end("end"))
        .add_edge("start", "flaky")
        .add_edge("flaky", "end");

    let err = flow.execute(CancellationToken::new()).await.unwrap_err();
    match err {
        WeftError::NodeFailed { node, source } => {
            assert_eq!(node, "flaky");
            assert!(source.to_string().contains("upstream timeout"));
        }
        other => panic!("expected NodeFailed, got {other}"),
    }

    let last = flow.execution_trace().last().unwrap();
    assert_eq!(last.node_name, "flaky");
    assert!(!last.success);
    assert!(last.error.as_deref().unwrap().contains("upstream timeout"));
}

#[tokio::test]
async fn replacement_state_pointer_flows_downstream() {
    let original = Arc::new(CompanionState::default());
    original.affinity.store(1, Ordering::SeqCst);

    let observed = Arc::new(AtomicU32::new(0));
    let observed_by_reader = observed.clone();

    let mut flow = Flow::new(original.clone());
    flow.add_node(FlowNode::start("start"))
        .add_node(FlowNode::execute(FnExecuteNode::new(
            "swap_state",
            |_, _: Arc<CompanionState>| async move {
                let replacement = CompanionState::default();
                replacement.affinity.store(99, Ordering::SeqCst);
                Ok(NodeResult::ok().with_state(Arc::new(replacement)))
            },
        )))
        .add_node(FlowNode::execute(FnExecuteNode::new(
            "read_state",
            move |_, state: Arc<CompanionState>| {
                let observed = observed_by_reader.clone();
                async move {
                    observed.store(state.affinity.load(Ordering::SeqCst), Ordering::SeqCst);
                    Ok(NodeResult::ok())
                }
            },
        )))
        .add_node(FlowNode::end("end"))
        .add_edge("start", "swap_state")
        .add_edge("swap_state", "read_state")
        .add_edge("read_state", "end");

    flow.execute(CancellationToken::new()).await.unwrap();

    // Downstream nodes see the adopted pointer; the flow keeps handing
    // out the state it was built with.
    assert_eq!(observed.load(Ordering::SeqCst), 99);
    assert_eq!(flow.state().affinity.load(Ordering::SeqCst), 1);
}
