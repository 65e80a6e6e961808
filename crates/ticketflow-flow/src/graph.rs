// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed flow graph.
//!
//! A stored definition is JSON of the shape
//! `{startNodeId?, nodes: [{id, type, data}], edges: [{source, sourceHandle?, target}]}`.
//! It is parsed once into an arena of typed nodes and validated; every later
//! lookup is by arena index.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use ticketflow_core::{FlowId, NodeId, TicketflowError};

/// Raw wire shape of a definition.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDefinition {
    #[serde(default)]
    start_node_id: Option<String>,
    nodes: Vec<RawNode>,
    #[serde(default)]
    edges: Vec<RawEdge>,
}

#[derive(Debug, Deserialize)]
struct RawNode {
    id: String,
    #[serde(rename = "type")]
    node_type: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEdge {
    source: String,
    #[serde(default)]
    source_handle: Option<String>,
    target: String,
}

/// A menu choice. `number` accepts JSON numbers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MenuOption {
    #[serde(deserialize_with = "string_or_number")]
    pub number: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MenuData {
    pub message: String,
    pub options: Vec<MenuOption>,
}

impl MenuData {
    /// Prompt followed by one `"{number} - {value}"` line per option.
    pub fn render(&self) -> String {
        let mut text = self.message.clone();
        for option in &self.options {
            text.push('\n');
            text.push_str(&format!("{} - {}", option.number, option.value));
        }
        text
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MediaData {
    pub url: String,
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct IntervalData {
    pub seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RandomizerData {
    /// Probability, in percent, of taking branch `a`.
    pub percent: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignQueueData {
    pub queue_id: i64,
}

/// One element of a `singleBlock` node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BlockElement {
    Message {
        #[serde(alias = "text")]
        value: String,
    },
    Interval {
        seconds: u64,
    },
    Image {
        url: String,
        #[serde(default)]
        caption: Option<String>,
    },
    Audio {
        url: String,
    },
    Video {
        url: String,
        #[serde(default)]
        caption: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BlockData {
    pub elements: Vec<BlockElement>,
}

/// Node payload, one variant per node type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Menu(MenuData),
    SingleBlock(BlockData),
    Image(MediaData),
    Audio(MediaData),
    Video(MediaData),
    Interval(IntervalData),
    Randomizer(RandomizerData),
    AssignQueue(AssignQueueData),
    Terminal,
}

impl NodeKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Menu(_) => "menu",
            NodeKind::SingleBlock(_) => "singleBlock",
            NodeKind::Image(_) => "image",
            NodeKind::Audio(_) => "audio",
            NodeKind::Video(_) => "video",
            NodeKind::Interval(_) => "interval",
            NodeKind::Randomizer(_) => "randomizer",
            NodeKind::AssignQueue(_) => "assignQueue",
            NodeKind::Terminal => "terminal",
        }
    }

    /// Whether visiting this node suspends the run until the next event.
    pub fn awaits_input(&self) -> bool {
        matches!(self, NodeKind::Menu(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
}

/// Arena index of a node.
pub type NodeIndex = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Edge {
    source: NodeIndex,
    handle: Option<String>,
    target: NodeIndex,
}

/// A validated automation graph.
#[derive(Debug, Clone)]
pub struct FlowGraph {
    flow_id: FlowId,
    nodes: Vec<Node>,
    index: HashMap<NodeId, NodeIndex>,
    edges: Vec<Edge>,
    root: NodeIndex,
}

impl FlowGraph {
    /// Parse and validate a stored definition.
    pub fn parse(flow_id: FlowId, definition: &str) -> Result<Self, TicketflowError> {
        let invalid = |reason: String| TicketflowError::InvalidFlow { flow_id, reason };

        let raw: RawDefinition =
            serde_json::from_str(definition).map_err(|e| invalid(format!("malformed JSON: {e}")))?;

        let mut nodes = Vec::with_capacity(raw.nodes.len());
        let mut index = HashMap::with_capacity(raw.nodes.len());
        for raw_node in raw.nodes {
            if index.contains_key(&raw_node.id) {
                return Err(invalid(format!("duplicate node id `{}`", raw_node.id)));
            }
            let kind = parse_kind(&raw_node).map_err(invalid)?;
            index.insert(raw_node.id.clone(), nodes.len());
            nodes.push(Node {
                id: raw_node.id,
                kind,
            });
        }

        let mut edges = Vec::with_capacity(raw.edges.len());
        for raw_edge in raw.edges {
            let source = *index
                .get(&raw_edge.source)
                .ok_or_else(|| invalid(format!("edge from unknown node `{}`", raw_edge.source)))?;
            let target = *index
                .get(&raw_edge.target)
                .ok_or_else(|| invalid(format!("edge to unknown node `{}`", raw_edge.target)))?;
            edges.push(Edge {
                source,
                handle: raw_edge.source_handle.filter(|h| !h.is_empty()),
                target,
            });
        }

        let root = match raw.start_node_id {
            Some(start) => *index
                .get(&start)
                .ok_or_else(|| invalid(format!("start node `{start}` does not exist")))?,
            None => {
                let targets: HashSet<NodeIndex> = edges.iter().map(|e| e.target).collect();
                (0..nodes.len())
                    .find(|i| !targets.contains(i))
                    .ok_or_else(|| invalid("no root node: every node has an incoming edge".into()))?
            }
        };

        Ok(Self {
            flow_id,
            nodes,
            index,
            edges,
            root,
        })
    }

    pub fn flow_id(&self) -> FlowId {
        self.flow_id
    }

    /// Number of nodes, which is also the per-run execution budget.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> &Node {
        &self.nodes[self.root]
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Target of the edge leaving `id` through `handle`.
    pub fn branch(&self, id: &str, handle: &str) -> Option<&Node> {
        let source = *self.index.get(id)?;
        self.edges
            .iter()
            .find(|e| e.source == source && e.handle.as_deref() == Some(handle))
            .map(|e| &self.nodes[e.target])
    }

    /// Default successor: the unlabeled outgoing edge, else the first one.
    pub fn next(&self, id: &str) -> Option<&Node> {
        let source = *self.index.get(id)?;
        let mut outgoing = self.edges.iter().filter(|e| e.source == source);
        let first = outgoing.clone().next()?;
        let chosen = outgoing.find(|e| e.handle.is_none()).unwrap_or(first);
        Some(&self.nodes[chosen.target])
    }

    /// Nodes with no outgoing edge. Reaching one ends the automation.
    pub fn dead_ends(&self) -> Vec<&Node> {
        let sources: HashSet<NodeIndex> = self.edges.iter().map(|e| e.source).collect();
        (0..self.nodes.len())
            .filter(|i| !sources.contains(i))
            .map(|i| &self.nodes[i])
            .collect()
    }
}

fn parse_kind(raw: &RawNode) -> Result<NodeKind, String> {
    fn data<T: serde::de::DeserializeOwned>(raw: &RawNode) -> Result<T, String> {
        serde_json::from_value(raw.data.clone())
            .map_err(|e| format!("node `{}` ({}): {e}", raw.id, raw.node_type))
    }

    let kind = match raw.node_type.as_str() {
        "menu" => {
            let menu: MenuData = data(raw)?;
            if menu.options.is_empty() {
                return Err(format!("menu `{}` has no options", raw.id));
            }
            let mut seen = HashSet::new();
            for option in &menu.options {
                if !seen.insert(option.number.as_str()) {
                    return Err(format!(
                        "menu `{}` repeats option number {}",
                        raw.id, option.number
                    ));
                }
            }
            NodeKind::Menu(menu)
        }
        "singleBlock" => {
            let block: BlockData = data(raw)?;
            if block.elements.is_empty() {
                return Err(format!("block `{}` has no elements", raw.id));
            }
            NodeKind::SingleBlock(block)
        }
        "image" => NodeKind::Image(data(raw)?),
        "audio" => NodeKind::Audio(data(raw)?),
        "video" => NodeKind::Video(data(raw)?),
        "interval" => NodeKind::Interval(data(raw)?),
        "randomizer" => {
            let randomizer: RandomizerData = data(raw)?;
            if !(0..=100).contains(&randomizer.percent) {
                return Err(format!(
                    "randomizer `{}` percent {} is outside 0..=100",
                    raw.id, randomizer.percent
                ));
            }
            NodeKind::Randomizer(randomizer)
        }
        "assignQueue" => NodeKind::AssignQueue(data(raw)?),
        "terminal" => NodeKind::Terminal,
        other => return Err(format!("node `{}` has unknown type `{other}`", raw.id)),
    };
    Ok(kind)
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Key {
        Text(String),
        Number(i64),
    }
    Ok(match Key::deserialize(deserializer)? {
        Key::Text(s) => s.trim().to_string(),
        Key::Number(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const WELCOME: &str = r#"{
        "nodes": [
            {"id": "menu", "type": "menu", "data": {"message": "Hi!", "options": [
                {"number": 1, "value": "Sales"}, {"number": "2", "value": "Support"}
            ]}},
            {"id": "sales", "type": "singleBlock", "data": {"elements": [
                {"type": "message", "value": "Sales here"},
                {"type": "interval", "seconds": 2},
                {"type": "audio", "url": "hello.mp3"}
            ]}},
            {"id": "end", "type": "terminal"}
        ],
        "edges": [
            {"source": "menu", "sourceHandle": "a1", "target": "sales"},
            {"source": "sales", "target": "end"}
        ]
    }"#;

    fn reason(err: TicketflowError) -> String {
        match err {
            TicketflowError::InvalidFlow { reason, .. } => reason,
            other => panic!("expected InvalidFlow, got {other}"),
        }
    }

    #[test]
    fn parses_typed_nodes() {
        let graph = FlowGraph::parse(7, WELCOME).unwrap();
        assert_eq!(graph.flow_id(), 7);
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.root().id, "menu");

        let NodeKind::Menu(menu) = &graph.root().kind else {
            panic!("root should be a menu");
        };
        assert_eq!(menu.options[1].number, "2");
        assert_eq!(menu.render(), "Hi!\n1 - Sales\n2 - Support");

        let NodeKind::SingleBlock(block) = &graph.node("sales").unwrap().kind else {
            panic!("sales should be a block");
        };
        assert_eq!(block.elements.len(), 3);
        assert!(matches!(block.elements[2], BlockElement::Audio { .. }));
    }

    #[test]
    fn branch_and_next_follow_edges() {
        let graph = FlowGraph::parse(1, WELCOME).unwrap();
        assert_eq!(graph.branch("menu", "a1").map(|n| n.id.as_str()), Some("sales"));
        assert!(graph.branch("menu", "a2").is_none());
        assert_eq!(graph.next("sales").map(|n| n.id.as_str()), Some("end"));
        assert!(graph.next("end").is_none());
        let dead: Vec<_> = graph.dead_ends().iter().map(|n| n.id.clone()).collect();
        assert_eq!(dead, vec!["end".to_string()]);
    }

    #[test]
    fn explicit_start_node_wins() {
        let def = r#"{"startNodeId": "b", "nodes": [
            {"id": "a", "type": "terminal"}, {"id": "b", "type": "terminal"}
        ], "edges": []}"#;
        assert_eq!(FlowGraph::parse(1, def).unwrap().root().id, "b");
    }

    #[test]
    fn rejects_duplicate_ids() {
        let def = r#"{"nodes": [{"id": "a", "type": "terminal"}, {"id": "a", "type": "terminal"}]}"#;
        assert!(reason(FlowGraph::parse(1, def).unwrap_err()).contains("duplicate"));
    }

    #[test]
    fn rejects_unknown_edge_target() {
        let def = r#"{"nodes": [{"id": "a", "type": "terminal"}],
                      "edges": [{"source": "a", "target": "ghost"}]}"#;
        assert!(reason(FlowGraph::parse(1, def).unwrap_err()).contains("ghost"));
    }

    #[test]
    fn rejects_empty_menu_and_block() {
        let menu = r#"{"nodes": [{"id": "m", "type": "menu", "data": {"message": "x", "options": []}}]}"#;
        assert!(reason(FlowGraph::parse(1, menu).unwrap_err()).contains("no options"));
        let block = r#"{"nodes": [{"id": "b", "type": "singleBlock", "data": {"elements": []}}]}"#;
        assert!(reason(FlowGraph::parse(1, block).unwrap_err()).contains("no elements"));
    }

    #[test]
    fn rejects_graph_without_root() {
        let def = r#"{"nodes": [{"id": "a", "type": "terminal"}, {"id": "b", "type": "terminal"}],
                      "edges": [{"source": "a", "target": "b"}, {"source": "b", "target": "a"}]}"#;
        assert!(reason(FlowGraph::parse(1, def).unwrap_err()).contains("no root"));
        assert!(FlowGraph::parse(1, r#"{"nodes": []}"#).is_err());
    }

    #[test]
    fn rejects_unknown_node_type() {
        let def = r#"{"nodes": [{"id": "a", "type": "webhook"}]}"#;
        assert!(reason(FlowGraph::parse(1, def).unwrap_err()).contains("webhook"));
    }

    proptest! {
        #[test]
        fn randomizer_percent_bounds(percent in -50i64..200) {
            let def = format!(
                r#"{{"nodes": [{{"id": "r", "type": "randomizer", "data": {{"percent": {percent}}}}}]}}"#
            );
            let parsed = FlowGraph::parse(1, &def);
            prop_assert_eq!(parsed.is_ok(), (0..=100).contains(&percent));
        }

        #[test]
        fn edges_between_known_nodes_always_parse(
            n in 1usize..12,
            raw_edges in proptest::collection::vec((0usize..12, 0usize..12), 0..24),
        ) {
            let nodes: Vec<String> = (0..n)
                .map(|i| format!(r#"{{"id": "n{i}", "type": "terminal"}}"#))
                .collect();
            let edges: Vec<String> = raw_edges
                .iter()
                .filter(|(s, t)| *s < n && *t < n)
                .map(|(s, t)| format!(r#"{{"source": "n{s}", "target": "n{t}"}}"#))
                .collect();
            let def = format!(
                r#"{{"startNodeId": "n0", "nodes": [{}], "edges": [{}]}}"#,
                nodes.join(","),
                edges.join(",")
            );
            let graph = FlowGraph::parse(1, &def).unwrap();
            prop_assert_eq!(graph.len(), n);
            for node in graph.nodes() {
                if let Some(next) = graph.next(&node.id) {
                    prop_assert!(graph.node(&next.id).is_some());
                }
            }
        }

        #[test]
        fn edge_to_missing_node_is_rejected(n in 1usize..8, extra in 8usize..16) {
            let nodes: Vec<String> = (0..n)
                .map(|i| format!(r#"{{"id": "n{i}", "type": "terminal"}}"#))
                .collect();
            let def = format!(
                r#"{{"startNodeId": "n0", "nodes": [{}], "edges": [{{"source": "n0", "target": "n{extra}"}}]}}"#,
                nodes.join(",")
            );
            prop_assert!(FlowGraph::parse(1, &def).is_err());
        }
    }
}
