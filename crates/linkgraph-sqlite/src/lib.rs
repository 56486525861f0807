//! # linkgraph-sqlite
//!
//! SQLite-backed persistent link graph.
//!
//! Behaves exactly like the in-memory engine:
//! - `links` table keyed by id, with a unique URL column
//! - `edges` table with foreign keys to `links` and a unique `(src, dst)` pair
//! - Ids stored in canonical string form, so SQL text comparison gives the
//!   same range partitioning as the in-memory engine
//! - Timestamps stored as UTC nanoseconds

mod iterator;

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{ffi, params, Connection, OptionalExtension, Row};

use linkgraph_core::config::DEFAULT_BUSY_TIMEOUT_MS;
use linkgraph_core::id::claim_unique;
use linkgraph_core::{
    Edge, EdgeId, EdgeIterator, Graph, GraphError, Link, LinkId, LinkIterator, Result,
};

use crate::iterator::SnapshotCursor;

const UPSERT_LINK: &str = "
    INSERT INTO links (id, url, retrieved_at) VALUES (?1, ?2, ?3)
    ON CONFLICT (url) DO UPDATE SET
        url = excluded.url,
        retrieved_at = MIN(links.retrieved_at, excluded.retrieved_at)
    RETURNING id, retrieved_at";

const FIND_LINK: &str = "SELECT id, url, retrieved_at FROM links WHERE id = ?1";

const LINKS_IN_RANGE: &str = "
    SELECT id, url, retrieved_at FROM links
    WHERE id >= ?1 AND id < ?2 AND (retrieved_at < ?3 OR ?4)
    ORDER BY id";

const COUNT_ENDPOINTS: &str = "SELECT COUNT(*) FROM links WHERE id IN (?1, ?2)";

const UPSERT_EDGE: &str = "
    INSERT INTO edges (id, src, dst, updated_at) VALUES (?1, ?2, ?3, ?4)
    ON CONFLICT (src, dst) DO UPDATE SET updated_at = excluded.updated_at
    RETURNING id, updated_at";

const FIND_EDGE: &str = "SELECT id, src, dst, updated_at FROM edges WHERE id = ?1";

const EDGES_IN_RANGE: &str = "
    SELECT id, src, dst, updated_at FROM edges
    WHERE src >= ?1 AND src < ?2 AND (updated_at < ?3 OR ?4)
    ORDER BY src, id";

const REMOVE_STALE_EDGES: &str =
    "DELETE FROM edges WHERE src = ?1 AND (updated_at < ?2 OR ?3)";

/// A link graph persisted in a SQLite database.
///
/// One connection is shared behind a mutex, so every operation is strictly
/// serialised. Cheap to clone: clones share the connection.
#[derive(Clone)]
pub struct SqliteGraph {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteGraph {
    /// Open or create a graph database at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Store`] if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
    }

    /// Open or create a graph database, waiting at most `busy_timeout` on
    /// a database locked by another connection before a call fails.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Store`] if the database cannot be opened.
    pub fn open_with(path: &Path, busy_timeout: Duration) -> Result<Self> {
        let key = path.display().to_string();
        let conn = Connection::open(path).map_err(|e| GraphError::store("open", &key, e))?;
        conn.busy_timeout(busy_timeout)
            .map_err(|e| GraphError::store("open", &key, e))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| GraphError::store("open", &key, e))?;

        let graph = Self::from_connection(conn)?;
        tracing::info!(path = %key, "opened sqlite link graph");
        Ok(graph)
    }

    /// Create an in-memory database (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Store`] if schema creation fails.
    pub fn in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| GraphError::store("open", ":memory:", e))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| GraphError::store("open", "foreign_keys", e))?;
        create_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Number of stored links.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Store`] if the query fails.
    pub fn link_count(&self) -> Result<u64> {
        self.count("links")
    }

    /// Number of stored edges.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Store`] if the query fails.
    pub fn edge_count(&self) -> Result<u64> {
        self.count("edges")
    }

    fn count(&self, table: &'static str) -> Result<u64> {
        let count: i64 = self
            .conn
            .lock()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })
            .map_err(|e| GraphError::store("count", table, e))?;
        Ok(count as u64)
    }
}

/// Create the graph schema (links + edges tables and their indexes).
fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS links (
            id TEXT PRIMARY KEY,
            url TEXT NOT NULL UNIQUE,
            retrieved_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS edges (
            id TEXT PRIMARY KEY,
            src TEXT NOT NULL REFERENCES links(id),
            dst TEXT NOT NULL REFERENCES links(id),
            updated_at INTEGER NOT NULL,
            UNIQUE (src, dst)
        );

        CREATE INDEX IF NOT EXISTS idx_links_retrieved_at ON links(retrieved_at);
        CREATE INDEX IF NOT EXISTS idx_edges_updated_at ON edges(updated_at);
        ",
    )
    .map_err(|e| GraphError::store("create schema", "links, edges", e))
}

impl SqliteGraph {
    /// [`Graph::upsert_link`] drawing candidate ids from `fresh`.
    fn upsert_link_with(&self, link: &mut Link, fresh: impl FnMut() -> LinkId) -> Result<()> {
        let retrieved_at = stored_nanos("upsert link", &link.url, link.retrieved_at)?;
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(UPSERT_LINK)
            .map_err(|e| GraphError::store("upsert link", &link.url, e))?;

        let (id, retrieved_at, inserted) = claim_unique(fresh, |candidate| {
            let row = stmt.query_row(
                params![candidate.to_string(), link.url, retrieved_at],
                |row| Ok((parse_id::<LinkId>(row, 0)?, row.get::<_, i64>(1)?)),
            );
            match row {
                Ok((id, retrieved_at)) => Ok(Some((id, retrieved_at, id == *candidate))),
                Err(e) if is_constraint(&e, ffi::SQLITE_CONSTRAINT_PRIMARYKEY) => Ok(None),
                Err(e) => Err(GraphError::store("upsert link", &link.url, e)),
            }
        })?;

        link.id = id;
        link.retrieved_at = from_nanos(retrieved_at);
        tracing::debug!(url = %link.url, id = %link.id, inserted, "upserted link");
        Ok(())
    }

    /// [`Graph::upsert_edge`] drawing candidate ids from `fresh`.
    fn upsert_edge_with(&self, edge: &mut Edge, fresh: impl FnMut() -> EdgeId) -> Result<()> {
        let key = format!("{} -> {}", edge.src, edge.dst);
        let now = stored_nanos("upsert edge", &key, Utc::now())?;
        let (src, dst) = (edge.src.to_string(), edge.dst.to_string());

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| GraphError::store("upsert edge", &key, e))?;

        let known: i64 = tx
            .query_row(COUNT_ENDPOINTS, params![src, dst], |row| row.get(0))
            .map_err(|e| GraphError::store("upsert edge", &key, e))?;
        let expected = if edge.src == edge.dst { 1 } else { 2 };
        if known < expected {
            return Err(GraphError::UnknownEdgeLinks {
                src: edge.src,
                dst: edge.dst,
            });
        }

        let (id, updated_at) = {
            let mut stmt = tx
                .prepare_cached(UPSERT_EDGE)
                .map_err(|e| GraphError::store("upsert edge", &key, e))?;
            claim_unique(fresh, |candidate| {
                let row = stmt.query_row(params![candidate.to_string(), src, dst, now], |row| {
                    Ok((parse_id::<EdgeId>(row, 0)?, row.get::<_, i64>(1)?))
                });
                match row {
                    Ok(row) => Ok(Some(row)),
                    Err(e) if is_constraint(&e, ffi::SQLITE_CONSTRAINT_PRIMARYKEY) => Ok(None),
                    Err(e) if is_constraint(&e, ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => Err(
                        GraphError::UnknownEdgeLinks {
                            src: edge.src,
                            dst: edge.dst,
                        },
                    ),
                    Err(e) => Err(GraphError::store("upsert edge", &key, e)),
                }
            })?
        };
        tx.commit()
            .map_err(|e| GraphError::store("upsert edge", &key, e))?;

        edge.id = id;
        edge.updated_at = from_nanos(updated_at);
        tracing::debug!(id = %edge.id, src = %edge.src, dst = %edge.dst, "upserted edge");
        Ok(())
    }
}

impl Graph for SqliteGraph {
    fn upsert_link(&self, link: &mut Link) -> Result<()> {
        self.upsert_link_with(link, LinkId::new_random)
    }

    fn find_link(&self, id: LinkId) -> Result<Link> {
        let conn = self.conn.lock();
        find_link(&conn, id)
            .map_err(|e| GraphError::store("find link", id.to_string(), e))?
            .ok_or(GraphError::NotFound { id })
    }

    fn links(
        &self,
        from: LinkId,
        to: LinkId,
        retrieved_before: DateTime<Utc>,
    ) -> Result<LinkIterator> {
        let key = format!("[{from}, {to})");
        let (before, past_storable) = cutoff(retrieved_before);
        let snapshot = {
            let conn = self.conn.lock();
            let mut stmt = conn
                .prepare_cached(LINKS_IN_RANGE)
                .map_err(|e| GraphError::store("links", &key, e))?;
            let rows = stmt
                .query_map(
                    params![from.to_string(), to.to_string(), before, past_storable],
                    link_from_row,
                )
                .map_err(|e| GraphError::store("links", &key, e))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| GraphError::store("links", &key, e))?;
            rows
        };

        Ok(Box::new(SnapshotCursor::new(
            Arc::clone(&self.conn),
            snapshot,
        )))
    }

    fn upsert_edge(&self, edge: &mut Edge) -> Result<()> {
        self.upsert_edge_with(edge, EdgeId::new_random)
    }

    fn edges(
        &self,
        from: LinkId,
        to: LinkId,
        updated_before: DateTime<Utc>,
    ) -> Result<EdgeIterator> {
        let key = format!("[{from}, {to})");
        let (before, past_storable) = cutoff(updated_before);
        let snapshot = {
            let conn = self.conn.lock();
            let mut stmt = conn
                .prepare_cached(EDGES_IN_RANGE)
                .map_err(|e| GraphError::store("edges", &key, e))?;
            let rows = stmt
                .query_map(
                    params![from.to_string(), to.to_string(), before, past_storable],
                    edge_from_row,
                )
                .map_err(|e| GraphError::store("edges", &key, e))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| GraphError::store("edges", &key, e))?;
            rows
        };

        Ok(Box::new(SnapshotCursor::new(
            Arc::clone(&self.conn),
            snapshot,
        )))
    }

    fn remove_stale_edges(&self, from: LinkId, updated_before: DateTime<Utc>) -> Result<()> {
        let key = from.to_string();
        let (before, past_storable) = cutoff(updated_before);
        let removed = self
            .conn
            .lock()
            .prepare_cached(REMOVE_STALE_EDGES)
            .and_then(|mut stmt| stmt.execute(params![key, before, past_storable]))
            .map_err(|e| GraphError::store("remove stale edges", &key, e))?;
        tracing::debug!(link = %from, removed, "removed stale edges");
        Ok(())
    }
}

pub(crate) fn find_link(conn: &Connection, id: LinkId) -> rusqlite::Result<Option<Link>> {
    conn.prepare_cached(FIND_LINK)?
        .query_row(params![id.to_string()], link_from_row)
        .optional()
}

pub(crate) fn find_edge(conn: &Connection, id: EdgeId) -> rusqlite::Result<Option<Edge>> {
    conn.prepare_cached(FIND_EDGE)?
        .query_row(params![id.to_string()], edge_from_row)
        .optional()
}

fn link_from_row(row: &Row<'_>) -> rusqlite::Result<Link> {
    Ok(Link {
        id: parse_id(row, 0)?,
        url: row.get(1)?,
        retrieved_at: from_nanos(row.get(2)?),
    })
}

fn edge_from_row(row: &Row<'_>) -> rusqlite::Result<Edge> {
    Ok(Edge {
        id: parse_id(row, 0)?,
        src: parse_id(row, 1)?,
        dst: parse_id(row, 2)?,
        updated_at: from_nanos(row.get(3)?),
    })
}

/// Parse an id column stored in canonical string form.
fn parse_id<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Nanosecond encoding of a timestamp that will be stored.
fn stored_nanos(op: &'static str, key: &str, ts: DateTime<Utc>) -> Result<i64> {
    ts.timestamp_nanos_opt().ok_or_else(|| {
        GraphError::store(op, key, format!("timestamp {ts} outside storable range"))
    })
}

/// Encoding of an exclusive query cutoff: nanoseconds, plus whether the
/// cutoff lies past every storable timestamp (which then all qualify).
/// Cutoffs before the storable range saturate to `i64::MIN` and match nothing.
fn cutoff(ts: DateTime<Utc>) -> (i64, bool) {
    match ts.timestamp_nanos_opt() {
        Some(nanos) => (nanos, false),
        None if ts.timestamp() > 0 => (i64::MAX, true),
        None => (i64::MIN, false),
    }
}

fn from_nanos(nanos: i64) -> DateTime<Utc> {
    Utc.timestamp_nanos(nanos)
}

fn is_constraint(err: &rusqlite::Error, extended_code: std::os::raw::c_int) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.extended_code == extended_code)
}
