use serde::Serialize;

/// A directed connection between two named nodes.
///
/// `condition: None` is an unconditional edge; `Some(true)`/`Some(false)`
/// route a decision node's outcome. At most one unconditional edge and at
/// most one edge per boolean value are meaningful per source node.
#[derive(Debug, Clone, Serialize)]
pub struct ConditionalEdge {
    pub from: String,
    pub to: String,
    pub condition: Option<bool>,
}
