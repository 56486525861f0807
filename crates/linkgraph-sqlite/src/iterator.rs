//! Snapshot cursors over SQLite query results.
//!
//! The matching rows are read in full when the cursor is built. Each
//! `advance` re-reads the row under the cursor by id; a row deleted since
//! the snapshot is yielded as last seen. A failed re-read stops the cursor
//! and is reported through `error`.

use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;

use linkgraph_core::{Edge, GraphError, GraphIterator, Link, Result};

/// A row type that can be re-read by id.
pub(crate) trait Refresh: Clone + Send {
    const OP: &'static str;

    fn reload(&self, conn: &Connection) -> rusqlite::Result<Option<Self>>;

    fn key(&self) -> String;
}

impl Refresh for Link {
    const OP: &'static str = "iterate links";

    fn reload(&self, conn: &Connection) -> rusqlite::Result<Option<Self>> {
        crate::find_link(conn, self.id)
    }

    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl Refresh for Edge {
    const OP: &'static str = "iterate edges";

    fn reload(&self, conn: &Connection) -> rusqlite::Result<Option<Self>> {
        crate::find_edge(conn, self.id)
    }

    fn key(&self) -> String {
        self.id.to_string()
    }
}

pub(crate) struct SnapshotCursor<T> {
    /// `None` once closed.
    conn: Option<Arc<Mutex<Connection>>>,
    rows: Vec<T>,
    next: usize,
    current: Option<T>,
    fault: Option<GraphError>,
}

impl<T: Refresh> SnapshotCursor<T> {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>, rows: Vec<T>) -> Self {
        Self {
            conn: Some(conn),
            rows,
            next: 0,
            current: None,
            fault: None,
        }
    }
}

impl<T: Refresh> GraphIterator for SnapshotCursor<T> {
    type Item = T;

    fn advance(&mut self) -> bool {
        self.current = None;
        if self.fault.is_some() {
            return false;
        }
        let Some(conn) = &self.conn else {
            return false;
        };
        let Some(seen) = self.rows.get(self.next) else {
            return false;
        };
        self.next += 1;

        let reloaded = seen.reload(&conn.lock());
        match reloaded {
            Ok(fresh) => {
                self.current = Some(fresh.unwrap_or_else(|| seen.clone()));
                true
            }
            Err(e) => {
                self.fault = Some(GraphError::store(T::OP, seen.key(), e));
                false
            }
        }
    }

    fn current(&self) -> Option<T> {
        self.current.clone()
    }

    fn error(&self) -> Option<&GraphError> {
        self.fault.as_ref()
    }

    fn close(&mut self) -> Result<()> {
        self.conn = None;
        self.rows = Vec::new();
        self.current = None;
        Ok(())
    }
}
