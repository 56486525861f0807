//! Error types for the link graph.

use thiserror::Error;

use crate::id::LinkId;

/// Top-level result type for link graph operations.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Top-level error type for link graph operations.
///
/// `NotFound` and `UnknownEdgeLinks` are the sentinel kinds every backend
/// reports identically, so callers can branch on them without knowing
/// which store they talk to.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("find link: link {id} not found")]
    NotFound { id: LinkId },

    #[error("upsert edge: unknown source and/or destination for edge {src} -> {dst}")]
    UnknownEdgeLinks { src: LinkId, dst: LinkId },

    #[error("{op} ({key}): {message}")]
    Store {
        op: &'static str,
        key: String,
        message: String,
    },

    #[error("could not generate a unique identifier after {attempts} attempts")]
    IdSpaceExhausted { attempts: usize },

    #[error("invalid partition: {0}")]
    InvalidPartition(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GraphError {
    /// Wrap a backend failure with the failing operation and its key.
    pub fn store(op: &'static str, key: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Store {
            op,
            key: key.into(),
            message: err.to_string(),
        }
    }

    /// Whether this is a lookup miss.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether this is an edge upsert referencing an unknown endpoint.
    #[must_use]
    pub fn is_unknown_edge_links(&self) -> bool {
        matches!(self, Self::UnknownEdgeLinks { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_display_operation_and_key() {
        let id = LinkId::new_random();
        let err = GraphError::NotFound { id };
        let msg = err.to_string();
        assert!(msg.starts_with("find link"));
        assert!(msg.contains(&id.to_string()));

        let err = GraphError::store("upsert link", "https://example.com", "disk I/O error");
        let msg = err.to_string();
        assert!(msg.contains("upsert link"));
        assert!(msg.contains("https://example.com"));
        assert!(msg.contains("disk I/O error"));
    }

    #[test]
    fn sentinel_predicates_match_only_their_kind() {
        let missing = GraphError::NotFound {
            id: LinkId::nil(),
        };
        assert!(missing.is_not_found());
        assert!(!missing.is_unknown_edge_links());

        let dangling = GraphError::UnknownEdgeLinks {
            src: LinkId::nil(),
            dst: LinkId::nil(),
        };
        assert!(dangling.is_unknown_edge_links());
        assert!(!dangling.is_not_found());

        let io = GraphError::store("find link", "x", "boom");
        assert!(!io.is_not_found());
        assert!(!io.is_unknown_edge_links());
    }
}
