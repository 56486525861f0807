//! The storage contract every link graph backend implements.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::edge::Edge;
use crate::error::{GraphError, Result};
use crate::id::LinkId;
use crate::link::Link;

/// A cursor over the result of a range query.
///
/// Protocol: call [`advance`](Self::advance) until it returns `false`, read
/// [`current`](Self::current) after each successful advance, then check
/// [`error`](Self::error) and [`close`](Self::close) the cursor.
pub trait GraphIterator: Send {
    type Item;

    /// Move to the next element. Returns `false` once exhausted, closed,
    /// or after a fault (see [`error`](Self::error)).
    fn advance(&mut self) -> bool;

    /// An owned copy of the element under the cursor.
    ///
    /// `None` before the first successful `advance` and after exhaustion.
    fn current(&self) -> Option<Self::Item>;

    /// The fault that stopped iteration early, if any.
    fn error(&self) -> Option<&GraphError>;

    /// Release backend resources. Safe to call repeatedly and after exhaustion.
    ///
    /// # Errors
    ///
    /// Returns a backend error if releasing the resource failed.
    fn close(&mut self) -> Result<()>;
}

/// Cursor over links returned by [`Graph::links`].
pub type LinkIterator = Box<dyn GraphIterator<Item = Link>>;

/// Cursor over edges returned by [`Graph::edges`].
pub type EdgeIterator = Box<dyn GraphIterator<Item = Edge>>;

/// Operations every link graph backend exposes.
///
/// All methods take `&self`; implementations synchronise internally so a
/// single store can be shared by many crawler workers.
pub trait Graph: Send + Sync {
    /// Insert a link or merge it into the existing link with the same URL.
    ///
    /// Writes the resolved `id` and `retrieved_at` back into `link`. An
    /// existing link keeps its id and the earlier of the two timestamps.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the store cannot be written.
    fn upsert_link(&self, link: &mut Link) -> Result<()>;

    /// Look up a link by id.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::NotFound`] if no link has this id.
    fn find_link(&self, id: LinkId) -> Result<Link>;

    /// Links with id in `[from, to)` and `retrieved_at < retrieved_before`.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the snapshot query fails.
    fn links(
        &self,
        from: LinkId,
        to: LinkId,
        retrieved_before: DateTime<Utc>,
    ) -> Result<LinkIterator>;

    /// Insert an edge or refresh `updated_at` of the existing `(src, dst)` edge.
    ///
    /// Writes the resolved `id` and `updated_at` back into `edge`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownEdgeLinks`] if either endpoint is not a
    /// known link.
    fn upsert_edge(&self, edge: &mut Edge) -> Result<()>;

    /// Outgoing edges of links with id in `[from, to)` and
    /// `updated_at < updated_before`.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the snapshot query fails.
    fn edges(&self, from: LinkId, to: LinkId, updated_before: DateTime<Utc>)
        -> Result<EdgeIterator>;

    /// Delete every outgoing edge of `from` with `updated_at < updated_before`.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the store cannot be written.
    fn remove_stale_edges(&self, from: LinkId, updated_before: DateTime<Utc>) -> Result<()>;
}

impl<G: Graph + ?Sized> Graph for Arc<G> {
    fn upsert_link(&self, link: &mut Link) -> Result<()> {
        (**self).upsert_link(link)
    }

    fn find_link(&self, id: LinkId) -> Result<Link> {
        (**self).find_link(id)
    }

    fn links(
        &self,
        from: LinkId,
        to: LinkId,
        retrieved_before: DateTime<Utc>,
    ) -> Result<LinkIterator> {
        (**self).links(from, to, retrieved_before)
    }

    fn upsert_edge(&self, edge: &mut Edge) -> Result<()> {
        (**self).upsert_edge(edge)
    }

    fn edges(
        &self,
        from: LinkId,
        to: LinkId,
        updated_before: DateTime<Utc>,
    ) -> Result<EdgeIterator> {
        (**self).edges(from, to, updated_before)
    }

    fn remove_stale_edges(&self, from: LinkId, updated_before: DateTime<Utc>) -> Result<()> {
        (**self).remove_stale_edges(from, updated_before)
    }
}

/// Collect every remaining element, then surface any iteration fault and
/// close the cursor.
///
/// # Errors
///
/// Returns the iterator's fault if one occurred, otherwise any error from
/// closing it.
pub fn drain<I: GraphIterator + ?Sized>(iter: &mut I) -> Result<Vec<I::Item>> {
    let mut items = Vec::new();
    while iter.advance() {
        if let Some(item) = iter.current() {
            items.push(item);
        }
    }
    if let Some(err) = iter.error() {
        let err = GraphError::store("iterate", "cursor", err);
        iter.close()?;
        return Err(err);
    }
    iter.close()?;
    Ok(items)
}
