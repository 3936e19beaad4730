use std::collections::HashMap;
use std::fmt::Write;

use serde::Serialize;

use crate::node::NodeType;

/// One entry of the execution trace, appended per visited node.
///
/// Parallel branches do not contribute individual records; only the
/// parallel node itself does.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    pub node_name: String,
    pub node_type: NodeType,
    pub success: bool,
    pub error: Option<String>,
    pub decision: Option<bool>,
}

/// Render a human-readable report over the trace: per-record lines,
/// per-type counts and the overall success rate. For diagnostics, not
/// machine consumption.
pub(crate) fn render_detail(trace: &[ExecutionRecord]) -> String {
    if trace.is_empty() {
        return "flow has not been executed or the trace is empty".to_string();
    }

    let mut out = String::new();
    out.push_str("flow execution detail:\n");
    out.push_str("===================\n");

    for (i, record) in trace.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. node: {} (type: {})",
            i + 1,
            record.node_name,
            record.node_type
        );

        if record.success {
            out.push_str("   status: success\n");
        } else {
            out.push_str("   status: failed\n");
            if let Some(error) = &record.error {
                let _ = writeln!(out, "   error: {error}");
            }
        }

        if let Some(decision) = record.decision {
            let _ = writeln!(out, "   decision: {decision}");
        }

        out.push('\n');
    }

    out.push_str("===================\n");
    let _ = writeln!(out, "total nodes visited: {}", trace.len());

    let mut type_counts: HashMap<NodeType, usize> = HashMap::new();
    let mut success_count = 0usize;
    for record in trace {
        *type_counts.entry(record.node_type).or_default() += 1;
        if record.success {
            success_count += 1;
        }
    }

    out.push_str("node type counts:\n");
    for (node_type, count) in &type_counts {
        let _ = writeln!(out, "  {node_type}: {count}");
    }

    let rate = success_count as f64 / trace.len() as f64 * 100.0;
    let _ = writeln!(out, "success rate: {rate:.2}%");

    out
}
