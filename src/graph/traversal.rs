//! BFS over single-hop edge lookups, for stores without recursive queries.

use std::collections::HashSet;
use std::future::Future;

use crate::error::Result;
use crate::model::{DirectedEdge, Direction, FieldRef};

/// One traversal step relative to the node being expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hop {
    /// Follow edges whose target is the node (towards its sources).
    Upstream,
    /// Follow edges whose source is the node (towards its consumers).
    Downstream,
}

impl Hop {
    /// The endpoint the hop moves to.
    pub fn far_end<'e>(&self, edge: &'e DirectedEdge) -> &'e FieldRef {
        match self {
            Hop::Upstream => &edge.source,
            Hop::Downstream => &edge.target,
        }
    }
}

/// Collect every edge reachable from `seed` within `max_depth` hops, using
/// `lookup` to fetch the single-hop neighbourhood of a column.
///
/// Each column is looked up at most once per hop direction, in the round it is
/// first reached, so the number of lookups is bounded by the number of
/// distinct columns. The task yields between rounds so an enclosing deadline
/// can fire. Any lookup error aborts the whole collection and nothing partial
/// is returned.
pub async fn collect_lineage_edges<F, Fut>(
    seed: &FieldRef,
    direction: Direction,
    max_depth: usize,
    mut lookup: F,
) -> Result<Vec<DirectedEdge>>
where
    F: FnMut(FieldRef, Hop) -> Fut,
    Fut: Future<Output = Result<Vec<DirectedEdge>>>,
{
    let hops: &[Hop] = match direction {
        Direction::Upstream => &[Hop::Upstream],
        Direction::Downstream => &[Hop::Downstream],
        Direction::Both => &[Hop::Upstream, Hop::Downstream],
    };

    let mut seen = HashSet::new();
    let mut result = Vec::new();

    for &hop in hops {
        let mut reached: HashSet<FieldRef> = HashSet::from([seed.clone()]);
        let mut frontier = vec![seed.clone()];
        let mut depth = 0;

        while depth < max_depth && !frontier.is_empty() {
            depth += 1;
            let mut next = Vec::new();

            for node in frontier {
                for edge in lookup(node, hop).await?.into_iter().filter(|e| e.active) {
                    let far = hop.far_end(&edge).clone();
                    if reached.insert(far.clone()) {
                        next.push(far);
                    }
                    if seen.insert(edge.edge_id()) {
                        result.push(edge);
                    }
                }
            }

            frontier = next;
            tokio::task::yield_now().await;
        }
    }

    log::debug!(
        "Collected {} {} edges for {} (max_depth={})",
        result.len(),
        direction,
        seed,
        max_depth
    );
    Ok(result)
}
