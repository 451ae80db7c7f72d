//! Lineage graph module: node/edge types, the graph builder and the
//! application-tier traversal over single-hop edge lookups.
//!
//! A [`Graph`] always contains its seed node, never contains two nodes with
//! the same identifier, and every edge points at nodes present in the graph.

mod builder;
mod traversal;

pub use builder::build_graph;
pub use traversal::{collect_lineage_edges, Hop};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{Direction, TransformationSubtype, TransformationType};

/// Kind tag for nodes derived from a dataset field.
pub const FIELD_NODE_KIND: &str = "datasetField";

/// A deduplicated graph vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub kind: String,
    /// Open metadata; the first writer for a node id wins.
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// An edge in the output graph, referencing nodes by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub transformation_type: TransformationType,
    pub transformation_subtype: TransformationSubtype,
    pub confidence: f64,
    /// Hops from the seed at which this edge was first reached.
    pub depth: usize,
}

/// Result of a lineage build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub seed: String,
    pub direction: Direction,
    /// Depth bound the graph was built with. A cached graph keeps the bound
    /// of the request that populated the entry.
    pub max_depth: usize,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl Graph {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.node(id).is_some()
    }

    /// True when the seed has no lineage at all (seed-only graph).
    pub fn is_seed_only(&self) -> bool {
        self.edges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_only_graph() {
        let graph = Graph {
            seed: "field:ns:ds:f".to_string(),
            direction: Direction::Both,
            max_depth: 3,
            nodes: vec![GraphNode {
                id: "field:ns:ds:f".to_string(),
                kind: FIELD_NODE_KIND.to_string(),
                metadata: BTreeMap::new(),
            }],
            edges: Vec::new(),
        };
        assert!(graph.is_seed_only());
        assert!(graph.has_node("field:ns:ds:f"));
        assert!(!graph.has_node("field:ns:ds:other"));
    }
}
