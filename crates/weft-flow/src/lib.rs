mod edge;
mod flow;
mod node;
mod trace;
mod wrapper;

pub use edge::ConditionalEdge;
pub use flow::{Flow, ParallelResult};
pub use node::{
    DecisionNode, ExecuteNode, FlowNode, FnDecisionNode, FnExecuteNode, JoinPolicy, NodeResult,
    NodeType,
};
pub use trace::ExecutionRecord;
