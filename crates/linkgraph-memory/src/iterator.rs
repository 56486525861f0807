//! Snapshot iterators over the in-memory store.
//!
//! Membership is fixed when the iterator is built. Each element is re-read
//! under a brief shared lock when the cursor reaches it, so callers see the
//! latest committed content. Entities deleted after the snapshot are still
//! yielded, as last seen.

use std::sync::Arc;

use parking_lot::RwLock;

use linkgraph_core::{Edge, GraphError, GraphIterator, Link, Result};

use crate::GraphState;

/// Iterator over a fixed list of links.
pub(crate) struct LinkSnapshotIter {
    state: Arc<RwLock<GraphState>>,
    links: Vec<Link>,
    cursor: usize,
}

impl LinkSnapshotIter {
    pub(crate) fn new(state: Arc<RwLock<GraphState>>, links: Vec<Link>) -> Self {
        Self {
            state,
            links,
            cursor: 0,
        }
    }
}

impl GraphIterator for LinkSnapshotIter {
    type Item = Link;

    fn advance(&mut self) -> bool {
        if self.cursor >= self.links.len() {
            self.cursor = self.links.len() + 1;
            return false;
        }
        self.cursor += 1;
        true
    }

    fn current(&self) -> Option<Link> {
        let seen = self.cursor.checked_sub(1).and_then(|i| self.links.get(i))?;
        let state = self.state.read();
        Some(state.links.get(&seen.id).unwrap_or(seen).clone())
    }

    fn error(&self) -> Option<&GraphError> {
        None
    }

    fn close(&mut self) -> Result<()> {
        self.links = Vec::new();
        self.cursor = 1;
        Ok(())
    }
}

/// Iterator over a fixed list of edges.
pub(crate) struct EdgeSnapshotIter {
    state: Arc<RwLock<GraphState>>,
    edges: Vec<Edge>,
    cursor: usize,
}

impl EdgeSnapshotIter {
    pub(crate) fn new(state: Arc<RwLock<GraphState>>, edges: Vec<Edge>) -> Self {
        Self {
            state,
            edges,
            cursor: 0,
        }
    }
}

impl GraphIterator for EdgeSnapshotIter {
    type Item = Edge;

    fn advance(&mut self) -> bool {
        if self.cursor >= self.edges.len() {
            self.cursor = self.edges.len() + 1;
            return false;
        }
        self.cursor += 1;
        true
    }

    fn current(&self) -> Option<Edge> {
        let seen = self.cursor.checked_sub(1).and_then(|i| self.edges.get(i))?;
        let state = self.state.read();
        Some(state.edges.get(&seen.id).unwrap_or(seen).clone())
    }

    fn error(&self) -> Option<&GraphError> {
        None
    }

    fn close(&mut self) -> Result<()> {
        self.edges = Vec::new();
        self.cursor = 1;
        Ok(())
    }
}
