// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `ticketflow check-flow` command implementation.

use std::path::Path;

use ticketflow_core::TicketflowError;
use ticketflow_flow::graph::BlockElement;
use ticketflow_flow::{FlowGraph, NodeKind};

/// Parse and validate a flow definition file, then print a summary and any
/// warnings. Validation failures are returned as errors.
pub fn run_check_flow(file: &Path, max_interval_secs: u64) -> Result<(), TicketflowError> {
    let definition = std::fs::read_to_string(file).map_err(|e| {
        TicketflowError::Config(format!("cannot read {}: {e}", file.display()))
    })?;
    let graph = FlowGraph::parse(0, &definition)?;

    println!(
        "{}: {} node(s), root `{}` ({})",
        file.display(),
        graph.len(),
        graph.root().id,
        graph.root().kind.type_name()
    );
    let warnings = warnings(&graph, max_interval_secs);
    for warning in &warnings {
        println!("  warning: {warning}");
    }
    if warnings.is_empty() {
        println!("  no warnings");
    }
    Ok(())
}

/// Things that parse but will not behave the way an author likely intended.
fn warnings(graph: &FlowGraph, max_interval_secs: u64) -> Vec<String> {
    let mut out = Vec::new();

    for node in graph.dead_ends() {
        if !matches!(node.kind, NodeKind::Terminal | NodeKind::Menu(_)) {
            out.push(format!(
                "`{}` ({}) has no outgoing edge; the automation ends there",
                node.id,
                node.kind.type_name()
            ));
        }
    }

    for node in graph.nodes() {
        match &node.kind {
            NodeKind::Menu(menu) => {
                for option in &menu.options {
                    if graph.branch(&node.id, &format!("a{}", option.number)).is_none() {
                        out.push(format!(
                            "menu `{}` option {} has no edge; choosing it hands the ticket to a human",
                            node.id, option.number
                        ));
                    }
                }
            }
            NodeKind::Interval(interval) if interval.seconds > max_interval_secs => {
                out.push(interval_warning(&node.id, interval.seconds, max_interval_secs));
            }
            NodeKind::SingleBlock(block) => {
                for element in &block.elements {
                    if let BlockElement::Interval { seconds } = element
                        && *seconds > max_interval_secs
                    {
                        out.push(interval_warning(&node.id, *seconds, max_interval_secs));
                    }
                }
            }
            NodeKind::Randomizer(_) => {
                for handle in ["a", "b"] {
                    if graph.branch(&node.id, handle).is_none() {
                        out.push(format!(
                            "randomizer `{}` has no `{handle}` branch",
                            node.id
                        ));
                    }
                }
            }
            _ => {}
        }
    }
    out
}

fn interval_warning(node_id: &str, seconds: u64, max: u64) -> String {
    format!("`{node_id}` waits {seconds}s; it will be capped at {max}s")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_flow_has_no_warnings() {
        let graph = FlowGraph::parse(
            0,
            r#"{"nodes": [
                {"id": "m", "type": "menu", "data": {"message": "Hi", "options": [{"number": 1, "value": "A"}]}},
                {"id": "end", "type": "terminal"}
            ], "edges": [{"source": "m", "sourceHandle": "a1", "target": "end"}]}"#,
        )
        .unwrap();
        assert!(warnings(&graph, 3600).is_empty());
    }

    #[test]
    fn reports_unmapped_options_and_long_waits() {
        let graph = FlowGraph::parse(
            0,
            r#"{"nodes": [
                {"id": "m", "type": "menu", "data": {"message": "Hi", "options": [
                    {"number": 1, "value": "A"}, {"number": 2, "value": "B"}]}},
                {"id": "wait", "type": "interval", "data": {"seconds": 7200}},
                {"id": "coin", "type": "randomizer", "data": {"percent": 50}}
            ], "edges": [
                {"source": "m", "sourceHandle": "a1", "target": "wait"},
                {"source": "wait", "target": "coin"},
                {"source": "coin", "sourceHandle": "a", "target": "m"}
            ]}"#,
        )
        .unwrap();
        let found = warnings(&graph, 3600);
        assert!(found.iter().any(|w| w.contains("option 2 has no edge")));
        assert!(found.iter().any(|w| w.contains("capped at 3600s")));
        assert!(found.iter().any(|w| w.contains("no `b` branch")));
        // The randomizer has an outgoing edge, so it is not a dead end.
        assert!(!found.iter().any(|w| w.contains("`coin` (randomizer) has no outgoing")));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = run_check_flow(Path::new("/nonexistent/flow.json"), 3600).unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }
}
