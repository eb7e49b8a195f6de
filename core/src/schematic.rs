use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// The Static Analysis View of a Workflow.
///
/// `Schematic` is the graph representation extracted from the workflow builder.
/// It is used for visualization, documentation and by presentation layers that
/// highlight where a checkpoint currently sits.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Schematic {
    pub name: String,
    pub description: Option<String>,
    pub entry: String,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Schematic {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn outgoing<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.from == id)
    }

    /// Render as a Mermaid flowchart. `highlight` marks the node a checkpoint
    /// sits on; halt points are drawn as subroutine boxes.
    pub fn to_mermaid(&self, highlight: Option<&str>) -> String {
        let mut out = String::from("flowchart TD\n");
        let _ = writeln!(out, "    __start__([start]) --> {}", self.entry);

        for node in &self.nodes {
            let shape = match node.kind {
                NodeKind::Egress => format!("{}([{}])", node.id, node.label),
                _ if node.halts_after => format!("{}[[{}]]", node.id, node.label),
                _ => format!("{}[{}]", node.id, node.label),
            };
            let _ = writeln!(out, "    {shape}");
        }

        for edge in &self.edges {
            match &edge.kind {
                EdgeType::Linear => {
                    let _ = writeln!(out, "    {} --> {}", edge.from, edge.to);
                }
                EdgeType::Branch(label) => {
                    let _ = writeln!(out, "    {} -- {} --> {}", edge.from, label, edge.to);
                }
            }
        }

        if let Some(active) = highlight.filter(|id| *id == "__start__" || self.node(id).is_some())
        {
            let _ = writeln!(
                out,
                "    style {active} fill:#F4D03F,stroke:#E74C3C,stroke-width:4px,color:#000000"
            );
        }
        out
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    pub label: String,
    pub description: Option<String>,
    /// The driver returns control to the caller after this node completes.
    pub halts_after: bool,
    /// Fields the node declared it may write.
    pub writes: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeKind {
    Atom,   // Single transition
    Egress, // Terminal end of the workflow
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub kind: EdgeType,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum EdgeType {
    Linear,
    /// Taken when the routing key equals the label.
    Branch(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Schematic {
        let mut s = Schematic::new("sample");
        s.entry = "check".into();
        s.nodes.push(Node {
            id: "check".into(),
            kind: NodeKind::Atom,
            label: "check".into(),
            description: None,
            halts_after: true,
            writes: vec!["status".into()],
        });
        s.nodes.push(Node {
            id: "end_ok".into(),
            kind: NodeKind::Egress,
            label: "ok".into(),
            description: None,
            halts_after: false,
            writes: vec![],
        });
        s.edges.push(Edge {
            from: "check".into(),
            to: "end_ok".into(),
            kind: EdgeType::Branch("PASS".into()),
        });
        s
    }

    #[test]
    fn mermaid_marks_halts_branches_and_highlight() {
        let chart = sample().to_mermaid(Some("check"));

        assert!(chart.starts_with("flowchart TD\n"));
        assert!(chart.contains("__start__([start]) --> check"));
        assert!(chart.contains("check[[check]]"));
        assert!(chart.contains("end_ok([ok])"));
        assert!(chart.contains("check -- PASS --> end_ok"));
        assert!(chart.contains("style check fill:#F4D03F"));
    }

    #[test]
    fn mermaid_ignores_unknown_highlight() {
        let chart = sample().to_mermaid(Some("nowhere"));
        assert!(!chart.contains("style"));
    }

    #[test]
    fn outgoing_edges() {
        let s = sample();
        assert_eq!(s.outgoing("check").count(), 1);
        assert_eq!(s.outgoing("end_ok").count(), 0);
    }
}
