//! SQLite-backed paper graph: `nodes`, `metadata` and `edges` tables.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags, Row, Transaction, params};
use serde::Serialize;
use thiserror::Error;

use crate::{EdgeRow, Extraction, MetadataRow, NodeRow, PaperNode};

/// Names of the tables this store manages, in creation order.
pub const TABLES: [&str; 3] = ["nodes", "metadata", "edges"];

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS nodes (
    arxiv_id TEXT PRIMARY KEY NOT NULL,
    title TEXT,
    authors TEXT,
    year INTEGER,
    summary TEXT,
    methods TEXT,
    datasets TEXT,
    metrics TEXT,
    project_page TEXT,
    pdf_link TEXT
);

CREATE TABLE IF NOT EXISTS metadata (
    arxiv_id TEXT PRIMARY KEY NOT NULL,
    citation_count INTEGER DEFAULT 0,
    last_updated TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS edges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id TEXT,
    target_id TEXT,
    relationship_type TEXT,
    reasoning TEXT
);
"#;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("JSON column error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("database not found at {0}")]
    NotFound(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown table: {0}")]
    UnknownTable(String),
}

/// What a successful [`GraphStore::persist`] wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PersistOutcome {
    pub metadata_written: bool,
    pub edges_inserted: usize,
    pub edges_skipped: usize,
}

/// Handle to the paper graph database.
pub struct GraphStore {
    pub(crate) conn: Connection,
    path: Option<PathBuf>,
}

impl GraphStore {
    /// Open (creating if needed) a database file.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::configure(&conn)?;
        tracing::debug!(path = %path.display(), "opened graph database");
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an existing database file; a missing file is an error rather
    /// than silently creating an empty database.
    pub fn open_existing(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Self::configure(&conn)?;
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn, path: None })
    }

    fn configure(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Path of the backing file (`None` for in-memory databases).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Raw connection, for ad-hoc queries.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Create the three tables if they do not already exist.
    pub fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Whether a node with this identifier is already stored.
    pub fn paper_exists(&self, arxiv_id: &str) -> Result<bool, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE arxiv_id = ?1",
            params![arxiv_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Write one extraction as a node, its metadata and its edges.
    ///
    /// The node's identifier is forced to `arxiv_id`. The node insert must
    /// succeed or nothing is written. Metadata is best-effort and each edge
    /// is written independently; their failures are logged and counted
    /// without aborting the transaction.
    pub fn persist(
        &self,
        mut extraction: Extraction,
        arxiv_id: &str,
    ) -> Result<PersistOutcome, StoreError> {
        extraction.node.arxiv_id = arxiv_id.to_string();

        // Dropping `tx` without commit rolls everything back.
        let mut tx = self.conn.unchecked_transaction()?;
        insert_node(&tx, &extraction.node)?;

        let mut outcome = PersistOutcome::default();

        let citation_count = extraction.metadata.citation_count;
        match in_savepoint(&mut tx, |conn| upsert_metadata(conn, arxiv_id, citation_count)) {
            Ok(()) => outcome.metadata_written = true,
            Err(e) => tracing::warn!(arxiv_id, error = %e, "metadata insert failed"),
        }

        for edge in &extraction.edges {
            let Some(target) = edge.target() else {
                continue;
            };
            let result = in_savepoint(&mut tx, |conn| {
                conn.execute(
                    "INSERT INTO edges (source_id, target_id, relationship_type, reasoning)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![arxiv_id, target, edge.relationship(), edge.reasoning()],
                )
                .map(|_| ())
            });
            match result {
                Ok(()) => outcome.edges_inserted += 1,
                Err(e) => {
                    tracing::debug!(arxiv_id, target, error = %e, "edge skipped");
                    outcome.edges_skipped += 1;
                }
            }
        }

        tx.commit()?;
        tracing::info!(
            arxiv_id,
            edges_inserted = outcome.edges_inserted,
            edges_skipped = outcome.edges_skipped,
            "paper persisted"
        );
        Ok(outcome)
    }

    /// Insert or update a metadata row outside of paper ingestion.
    pub fn upsert_metadata(&self, arxiv_id: &str, citation_count: i64) -> Result<(), StoreError> {
        upsert_metadata(&self.conn, arxiv_id, citation_count)?;
        Ok(())
    }

    /// All nodes, ordered by identifier descending.
    pub fn list_nodes(&self) -> Result<Vec<NodeRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT arxiv_id, title, authors, year, summary, methods, datasets, metrics,
                    project_page, pdf_link
             FROM nodes ORDER BY arxiv_id DESC",
        )?;
        let raw = stmt
            .query_map([], raw_node)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(RawNode::into_row).collect()
    }

    /// Look up one node by identifier.
    pub fn get_node(&self, arxiv_id: &str) -> Result<Option<NodeRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT arxiv_id, title, authors, year, summary, methods, datasets, metrics,
                    project_page, pdf_link
             FROM nodes WHERE arxiv_id = ?1",
        )?;
        let mut rows = stmt.query_map(params![arxiv_id], raw_node)?;
        match rows.next() {
            Some(raw) => Ok(Some(raw?.into_row()?)),
            None => Ok(None),
        }
    }

    /// All edges, ordered by id descending.
    pub fn list_edges(&self) -> Result<Vec<EdgeRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, source_id, target_id, relationship_type, reasoning
             FROM edges ORDER BY id DESC",
        )?;
        let rows = stmt
            .query_map([], edge_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Edges leaving `source_id`, in insertion order.
    pub fn edges_from(&self, source_id: &str) -> Result<Vec<EdgeRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, source_id, target_id, relationship_type, reasoning
             FROM edges WHERE source_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![source_id], edge_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_metadata(&self, arxiv_id: &str) -> Result<Option<MetadataRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT arxiv_id, citation_count, CAST(last_updated AS TEXT)
             FROM metadata WHERE arxiv_id = ?1",
        )?;
        let mut rows = stmt.query_map(params![arxiv_id], |row| {
            Ok(MetadataRow {
                arxiv_id: row.get(0)?,
                citation_count: row.get(1)?,
                last_updated: row.get(2)?,
            })
        })?;
        Ok(rows.next().transpose()?)
    }
}

/// Run `f` inside a savepoint; on error the savepoint is rolled back and the
/// enclosing transaction stays usable.
fn in_savepoint<T>(
    tx: &mut Transaction<'_>,
    f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
) -> rusqlite::Result<T> {
    let sp = tx.savepoint()?;
    let value = f(&sp)?;
    sp.commit()?;
    Ok(value)
}

fn insert_node(conn: &Connection, node: &PaperNode) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO nodes (
             arxiv_id, title, authors, year, summary,
             methods, datasets, metrics, project_page, pdf_link
         )
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            node.arxiv_id,
            node.title,
            node.authors,
            node.year,
            node.summary,
            serde_json::to_string(&node.methods)?,
            serde_json::to_string(&node.datasets)?,
            serde_json::to_string(&node.metrics)?,
            node.project_page,
            node.pdf_link,
        ],
    )?;
    Ok(())
}

fn upsert_metadata(conn: &Connection, arxiv_id: &str, citation_count: i64) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO metadata (arxiv_id, citation_count)
         VALUES (?1, ?2)
         ON CONFLICT(arxiv_id) DO UPDATE SET citation_count = excluded.citation_count",
        params![arxiv_id, citation_count],
    )?;
    Ok(())
}

/// Node columns as stored, before the list columns are decoded.
struct RawNode {
    arxiv_id: String,
    title: Option<String>,
    authors: Option<String>,
    year: Option<i64>,
    summary: Option<String>,
    methods: Option<String>,
    datasets: Option<String>,
    metrics: Option<String>,
    project_page: Option<String>,
    pdf_link: Option<String>,
}

fn raw_node(row: &Row<'_>) -> rusqlite::Result<RawNode> {
    Ok(RawNode {
        arxiv_id: row.get(0)?,
        title: row.get(1)?,
        authors: row.get(2)?,
        year: row.get(3)?,
        summary: row.get(4)?,
        methods: row.get(5)?,
        datasets: row.get(6)?,
        metrics: row.get(7)?,
        project_page: row.get(8)?,
        pdf_link: row.get(9)?,
    })
}

fn decode_list(value: Option<String>) -> Result<Vec<String>, StoreError> {
    match value {
        Some(json) if !json.is_empty() => Ok(serde_json::from_str(&json)?),
        _ => Ok(Vec::new()),
    }
}

impl RawNode {
    fn into_row(self) -> Result<NodeRow, StoreError> {
        Ok(NodeRow {
            arxiv_id: self.arxiv_id,
            title: self.title,
            authors: self.authors,
            year: self.year,
            summary: self.summary,
            methods: decode_list(self.methods)?,
            datasets: decode_list(self.datasets)?,
            metrics: decode_list(self.metrics)?,
            project_page: self.project_page,
            pdf_link: self.pdf_link,
        })
    }
}

fn edge_row(row: &Row<'_>) -> rusqlite::Result<EdgeRow> {
    Ok(EdgeRow {
        id: row.get(0)?,
        source_id: row.get(1)?,
        target_id: row.get(2)?,
        relationship_type: row.get(3)?,
        reasoning: row.get(4)?,
    })
}
