//! # linkgraph-core
//!
//! Core types and the storage contract for the link graph.
//!
//! This crate defines the vocabulary shared by every link graph backend:
//! - [`Link`] and [`Edge`]: crawled pages and the hyperlinks between them
//! - [`LinkId`] / [`EdgeId`]: 128-bit random identifiers
//! - [`Graph`]: the operation set every backend exposes
//! - [`GraphIterator`]: cursors returned by range queries
//! - [`IdRange`]: id-space partitioning for parallel workers
//! - [`StoreConfig`]: backend selection and tuning
//! - Error taxonomy ([`GraphError`])

pub mod config;
pub mod edge;
pub mod error;
pub mod graph;
pub mod id;
pub mod link;
pub mod partition;

pub use config::{BackendConfig, StoreConfig};
pub use edge::Edge;
pub use error::{GraphError, Result};
pub use graph::{drain, EdgeIterator, Graph, GraphIterator, LinkIterator};
pub use id::{EdgeId, LinkId};
pub use link::Link;
pub use partition::{Extent, IdRange};
