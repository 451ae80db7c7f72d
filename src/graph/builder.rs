//! Bounded, cycle-safe graph construction from a flat edge list.

use std::collections::{HashMap, HashSet};

use serde_json::json;

use super::{Graph, GraphEdge, GraphNode, Hop, FIELD_NODE_KIND};
use crate::model::{DirectedEdge, Direction, FieldRef};

/// Active edges indexed by the node id each hop direction expands from.
struct EdgeIndex<'a> {
    by_target: HashMap<String, Vec<&'a DirectedEdge>>,
    by_source: HashMap<String, Vec<&'a DirectedEdge>>,
}

impl<'a> EdgeIndex<'a> {
    fn new(edges: &'a [DirectedEdge]) -> Self {
        let mut by_target: HashMap<String, Vec<&DirectedEdge>> = HashMap::new();
        let mut by_source: HashMap<String, Vec<&DirectedEdge>> = HashMap::new();
        for edge in edges.iter().filter(|e| e.active) {
            by_target.entry(edge.target.node_id()).or_default().push(edge);
            by_source.entry(edge.source.node_id()).or_default().push(edge);
        }
        Self { by_target, by_source }
    }

    fn expand(&self, hop: Hop, node: &str) -> &[&'a DirectedEdge] {
        let map = match hop {
            Hop::Upstream => &self.by_target,
            Hop::Downstream => &self.by_source,
        };
        map.get(node).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Collects nodes and edges, deduplicating both by identifier.
struct GraphAccumulator {
    nodes: HashMap<String, GraphNode>,
    edges: HashMap<String, GraphEdge>,
}

impl GraphAccumulator {
    fn new(seed: &FieldRef) -> Self {
        let mut acc = Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
        };
        acc.add_node(seed);
        acc
    }

    fn add_node(&mut self, field: &FieldRef) {
        self.nodes.entry(field.node_id()).or_insert_with(|| GraphNode {
            id: field.node_id(),
            kind: FIELD_NODE_KIND.to_string(),
            metadata: [
                ("namespace".to_string(), json!(field.namespace)),
                ("dataset".to_string(), json!(field.dataset)),
                ("field".to_string(), json!(field.field)),
            ]
            .into_iter()
            .collect(),
        });
    }

    fn add_edge(&mut self, edge: &DirectedEdge, depth: usize) {
        self.add_node(&edge.source);
        self.add_node(&edge.target);

        let id = edge.edge_id();
        match self.edges.get_mut(&id) {
            Some(existing) => existing.depth = existing.depth.min(depth),
            None => {
                self.edges.insert(
                    id.clone(),
                    GraphEdge {
                        id,
                        source: edge.source.node_id(),
                        target: edge.target.node_id(),
                        transformation_type: edge.transformation_type,
                        transformation_subtype: edge.transformation_subtype,
                        confidence: edge.confidence,
                        depth,
                    },
                );
            }
        }
    }

    fn finish(self, seed: &FieldRef, direction: Direction, max_depth: usize) -> Graph {
        let mut nodes: Vec<GraphNode> = self.nodes.into_values().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));

        let mut edges: Vec<GraphEdge> = self.edges.into_values().collect();
        edges.sort_by(|a, b| {
            a.depth
                .cmp(&b.depth)
                .then_with(|| a.source.cmp(&b.source))
                .then_with(|| a.target.cmp(&b.target))
        });

        Graph {
            seed: seed.node_id(),
            direction,
            max_depth,
            nodes,
            edges,
        }
    }
}

/// Walk one direction from the seed, one hop per round, until `max_depth`
/// rounds have run or the frontier is empty.
///
/// Each node is expanded once, in the round it is first reached. Cycles may
/// lead back to a node but never re-expand it, so the work per direction is
/// bounded by the number of edges and every edge keeps its shortest depth.
fn walk(index: &EdgeIndex<'_>, seed: &FieldRef, hop: Hop, max_depth: usize, acc: &mut GraphAccumulator) {
    let seed_id = seed.node_id();
    let mut reached: HashSet<String> = HashSet::from([seed_id.clone()]);
    let mut frontier = vec![seed_id];
    let mut depth = 0;

    while depth < max_depth && !frontier.is_empty() {
        depth += 1;
        let mut next = Vec::new();

        for node in &frontier {
            for edge in index.expand(hop, node) {
                acc.add_edge(edge, depth);
                let far = hop.far_end(edge).node_id();
                if reached.insert(far.clone()) {
                    next.push(far);
                }
            }
        }

        frontier = next;
    }
}

/// Build a deduplicated lineage graph rooted at `seed`.
///
/// `edges` holds the candidate edges for the requested direction(s); only
/// active edges reachable from the seed within `max_depth` hops end up in the
/// graph. For [`Direction::Both`] the upstream and downstream walks run
/// independently and their results are unioned by node and edge identifier.
/// The seed node is present even when no edge touches it.
pub fn build_graph(seed: &FieldRef, edges: &[DirectedEdge], direction: Direction, max_depth: usize) -> Graph {
    let index = EdgeIndex::new(edges);
    let mut acc = GraphAccumulator::new(seed);

    match direction {
        Direction::Upstream => walk(&index, seed, Hop::Upstream, max_depth, &mut acc),
        Direction::Downstream => walk(&index, seed, Hop::Downstream, max_depth, &mut acc),
        Direction::Both => {
            walk(&index, seed, Hop::Upstream, max_depth, &mut acc);
            walk(&index, seed, Hop::Downstream, max_depth, &mut acc);
        }
    }

    acc.finish(seed, direction, max_depth)
}
