//! # linkgraph-memory
//!
//! In-memory link graph engine.
//!
//! All state lives behind a single reader/writer lock. Mutations hold it
//! exclusively for their whole duration; range queries hold it shared only
//! while taking their snapshot, and their iterators re-acquire it briefly
//! per element.

mod iterator;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use linkgraph_core::id::generate_unique;
use linkgraph_core::{
    Edge, EdgeId, EdgeIterator, Graph, GraphError, Link, LinkId, LinkIterator, Result,
};

use crate::iterator::{EdgeSnapshotIter, LinkSnapshotIter};

/// Canonical store state. Never handed out; callers only see clones.
#[derive(Debug, Default)]
pub(crate) struct GraphState {
    /// Ordered by id so range scans walk shards directly.
    pub(crate) links: BTreeMap<LinkId, Link>,
    url_index: HashMap<String, LinkId>,
    pub(crate) edges: HashMap<EdgeId, Edge>,
    /// Outgoing edge ids per source link, in insertion order.
    adjacency: HashMap<LinkId, Vec<EdgeId>>,
}

impl GraphState {
    /// Links with id in `[from, to)`. Empty for inverted or empty ranges.
    fn links_in(&self, from: LinkId, to: LinkId) -> impl Iterator<Item = &Link> {
        let range = if from < to {
            Some(self.links.range(from..to))
        } else {
            None
        };
        range.into_iter().flatten().map(|(_, link)| link)
    }
}

/// A link graph held entirely in process memory.
///
/// Cheap to clone: clones share the same underlying store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGraph {
    state: Arc<RwLock<GraphState>>,
}

impl InMemoryGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored links.
    #[must_use]
    pub fn link_count(&self) -> usize {
        self.state.read().links.len()
    }

    /// Number of stored edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.state.read().edges.len()
    }
}

impl Graph for InMemoryGraph {
    fn upsert_link(&self, link: &mut Link) -> Result<()> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let existing = match state.url_index.get(&link.url) {
            Some(id) => state.links.get_mut(id),
            None => None,
        };
        if let Some(existing) = existing {
            existing.merge_from(link);
            link.clone_from(existing);
            tracing::debug!(url = %link.url, id = %link.id, "merged link");
            return Ok(());
        }

        link.id = generate_unique(LinkId::new_random, |id| state.links.contains_key(id))?;
        state.url_index.insert(link.url.clone(), link.id);
        state.links.insert(link.id, link.clone());
        tracing::debug!(url = %link.url, id = %link.id, "inserted link");
        Ok(())
    }

    fn find_link(&self, id: LinkId) -> Result<Link> {
        self.state
            .read()
            .links
            .get(&id)
            .cloned()
            .ok_or(GraphError::NotFound { id })
    }

    fn links(
        &self,
        from: LinkId,
        to: LinkId,
        retrieved_before: DateTime<Utc>,
    ) -> Result<LinkIterator> {
        let snapshot: Vec<Link> = self
            .state
            .read()
            .links_in(from, to)
            .filter(|link| link.retrieved_at < retrieved_before)
            .cloned()
            .collect();

        Ok(Box::new(LinkSnapshotIter::new(
            Arc::clone(&self.state),
            snapshot,
        )))
    }

    fn upsert_edge(&self, edge: &mut Edge) -> Result<()> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        if !state.links.contains_key(&edge.src) || !state.links.contains_key(&edge.dst) {
            return Err(GraphError::UnknownEdgeLinks {
                src: edge.src,
                dst: edge.dst,
            });
        }

        let outgoing = state.adjacency.entry(edge.src).or_default();
        let existing_id = outgoing.iter().copied().find(|id| {
            state
                .edges
                .get(id)
                .is_some_and(|existing| existing.dst == edge.dst)
        });
        let existing = match existing_id {
            Some(id) => state.edges.get_mut(&id),
            None => None,
        };
        if let Some(existing) = existing {
            existing.updated_at = Utc::now();
            edge.clone_from(existing);
            tracing::debug!(id = %edge.id, src = %edge.src, dst = %edge.dst, "refreshed edge");
            return Ok(());
        }

        edge.id = generate_unique(EdgeId::new_random, |id| state.edges.contains_key(id))?;
        edge.updated_at = Utc::now();
        state.edges.insert(edge.id, edge.clone());
        outgoing.push(edge.id);
        tracing::debug!(id = %edge.id, src = %edge.src, dst = %edge.dst, "inserted edge");
        Ok(())
    }

    fn edges(
        &self,
        from: LinkId,
        to: LinkId,
        updated_before: DateTime<Utc>,
    ) -> Result<EdgeIterator> {
        let snapshot: Vec<Edge> = {
            let state = self.state.read();
            state
                .links_in(from, to)
                .filter_map(|link| state.adjacency.get(&link.id))
                .flatten()
                .filter_map(|id| state.edges.get(id))
                .filter(|edge| edge.updated_at < updated_before)
                .cloned()
                .collect()
        };

        Ok(Box::new(EdgeSnapshotIter::new(
            Arc::clone(&self.state),
            snapshot,
        )))
    }

    fn remove_stale_edges(&self, from: LinkId, updated_before: DateTime<Utc>) -> Result<()> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let Some(outgoing) = state.adjacency.get_mut(&from) else {
            return Ok(());
        };

        let edges = &mut state.edges;
        let before = outgoing.len();
        outgoing.retain(|id| {
            let stale = edges
                .get(id)
                .map_or(true, |edge| edge.updated_at < updated_before);
            if stale {
                edges.remove(id);
            }
            !stale
        });
        tracing::debug!(
            link = %from,
            removed = before - outgoing.len(),
            "removed stale edges"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    linkgraph_graphtest::graph_conformance_suite!(InMemoryGraph::new);

    #[test]
    fn clones_share_one_store() {
        let graph = InMemoryGraph::new();
        let other = graph.clone();

        let mut link = Link::new("https://example.com", Utc::now());
        graph.upsert_link(&mut link).unwrap();

        assert_eq!(other.find_link(link.id).unwrap(), link);
        assert_eq!(other.link_count(), 1);
    }

    #[test]
    fn inverted_range_is_empty() {
        let graph = InMemoryGraph::new();
        let mut link = Link::new("https://example.com", Utc::now() - Duration::hours(1));
        graph.upsert_link(&mut link).unwrap();

        let mut it = graph.links(LinkId::MAX, LinkId::MIN, Utc::now()).unwrap();
        assert!(!it.advance());
        it.close().unwrap();

        let mut it = graph.edges(LinkId::MAX, LinkId::MIN, Utc::now()).unwrap();
        assert!(!it.advance());
        it.close().unwrap();
    }

    #[test]
    fn stale_sweep_rewrites_adjacency_list() {
        let graph = InMemoryGraph::new();
        let now = Utc::now();
        let mut src = Link::new("https://a.example", now);
        let mut dst = Link::new("https://b.example", now);
        graph.upsert_link(&mut src).unwrap();
        graph.upsert_link(&mut dst).unwrap();

        let mut edge = Edge::new(src.id, dst.id);
        graph.upsert_edge(&mut edge).unwrap();
        assert_eq!(graph.edge_count(), 1);

        graph
            .remove_stale_edges(src.id, edge.updated_at + Duration::seconds(1))
            .unwrap();
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.state.read().adjacency[&src.id].is_empty());

        // A re-observed hyperlink becomes a brand new edge.
        let mut again = Edge::new(src.id, dst.id);
        graph.upsert_edge(&mut again).unwrap();
        assert_ne!(again.id, edge.id);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn sweep_of_unknown_link_is_a_no_op() {
        let graph = InMemoryGraph::new();
        graph
            .remove_stale_edges(LinkId::new_random(), Utc::now())
            .unwrap();
    }
}
