//! Runs the shared backend checks against SQLite, both in memory and on disk.

use std::time::Duration;

use chrono::Utc;
use linkgraph_core::{drain, Edge, Graph, GraphError, Link, LinkId};
use linkgraph_sqlite::SqliteGraph;
use tempfile::TempDir;

mod in_memory {
    use super::*;

    linkgraph_graphtest::graph_conformance_suite!(|| SqliteGraph::in_memory().unwrap());
}

mod on_disk {
    use super::*;
    use chrono::DateTime;
    use linkgraph_core::{EdgeIterator, LinkIterator, Result};

    /// Keeps the temporary directory alive as long as the graph.
    pub struct DiskGraph {
        graph: SqliteGraph,
        _dir: TempDir,
    }

    pub fn open() -> DiskGraph {
        let dir = TempDir::new().unwrap();
        let graph = SqliteGraph::open(&dir.path().join("graph.db")).unwrap();
        DiskGraph { graph, _dir: dir }
    }

    impl Graph for DiskGraph {
        fn upsert_link(&self, link: &mut Link) -> Result<()> {
            self.graph.upsert_link(link)
        }

        fn find_link(&self, id: LinkId) -> Result<Link> {
            self.graph.find_link(id)
        }

        fn links(&self, from: LinkId, to: LinkId, before: DateTime<Utc>) -> Result<LinkIterator> {
            self.graph.links(from, to, before)
        }

        fn upsert_edge(&self, edge: &mut Edge) -> Result<()> {
            self.graph.upsert_edge(edge)
        }

        fn edges(&self, from: LinkId, to: LinkId, before: DateTime<Utc>) -> Result<EdgeIterator> {
            self.graph.edges(from, to, before)
        }

        fn remove_stale_edges(&self, from: LinkId, before: DateTime<Utc>) -> Result<()> {
            self.graph.remove_stale_edges(from, before)
        }
    }

    linkgraph_graphtest::graph_conformance_suite!(open);
}

fn seed(graph: &SqliteGraph) -> (Link, Link, Edge) {
    let now = Utc::now();
    let mut a = Link::new("https://a.example", now);
    let mut b = Link::new("https://b.example", now);
    graph.upsert_link(&mut a).unwrap();
    graph.upsert_link(&mut b).unwrap();
    let mut edge = Edge::new(a.id, b.id);
    graph.upsert_edge(&mut edge).unwrap();
    (a, b, edge)
}

#[test]
fn data_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("graph.db");

    let (a, _, edge) = {
        let graph = SqliteGraph::open(&path).unwrap();
        seed(&graph)
    };

    let graph = SqliteGraph::open(&path).unwrap();
    assert_eq!(graph.find_link(a.id).unwrap(), a);
    assert_eq!(graph.link_count().unwrap(), 2);

    let mut it = graph
        .edges(LinkId::MIN, LinkId::MAX, Utc::now())
        .unwrap();
    assert_eq!(drain(&mut *it).unwrap(), vec![edge]);
}

#[test]
fn clones_share_one_connection() {
    let graph = SqliteGraph::in_memory().unwrap();
    let other = graph.clone();
    let (a, _, _) = seed(&graph);
    assert_eq!(other.find_link(a.id).unwrap(), a);
}

#[test]
fn locked_database_times_out_with_store_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("graph.db");
    let graph = SqliteGraph::open_with(&path, Duration::from_millis(50)).unwrap();

    let blocker = rusqlite::Connection::open(&path).unwrap();
    blocker.execute_batch("BEGIN IMMEDIATE").unwrap();

    let mut link = Link::new("https://example.com", Utc::now());
    let err = graph.upsert_link(&mut link).unwrap_err();
    assert!(
        matches!(err, GraphError::Store { op: "upsert link", .. }),
        "expected a store error, got {err:?}"
    );

    blocker.execute_batch("ROLLBACK").unwrap();
    graph.upsert_link(&mut link).unwrap();
}

#[test]
fn failed_reread_stops_iteration_with_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("graph.db");
    let graph = SqliteGraph::open(&path).unwrap();
    seed(&graph);

    let mut it = graph
        .edges(LinkId::MIN, LinkId::MAX, Utc::now())
        .unwrap();

    let saboteur = rusqlite::Connection::open(&path).unwrap();
    saboteur.execute_batch("DROP TABLE edges").unwrap();

    assert!(!it.advance());
    assert!(it.current().is_none());
    let err = it.error().expect("the failed re-read must be reported");
    assert!(matches!(err, GraphError::Store { op: "iterate edges", .. }));
    assert!(!it.advance(), "a faulted iterator stays stopped");
    it.close().unwrap();
}
