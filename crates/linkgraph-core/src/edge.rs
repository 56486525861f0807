//! Edge type: a directed hyperlink between two links.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{EdgeId, LinkId};

/// A directed hyperlink `src -> dst`.
///
/// At most one edge exists per ordered `(src, dst)` pair. The store owns
/// `id` and `updated_at`: both are written back on every upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Assigned by the store; [`EdgeId::nil`] until then.
    pub id: EdgeId,

    pub src: LinkId,

    pub dst: LinkId,

    /// Last time this hyperlink was observed.
    pub updated_at: DateTime<Utc>,
}

impl Edge {
    /// Build an unassigned edge ready for upsert.
    #[must_use]
    pub fn new(src: LinkId, dst: LinkId) -> Self {
        Self {
            id: EdgeId::nil(),
            src,
            dst,
            updated_at: DateTime::<Utc>::default(),
        }
    }
}
