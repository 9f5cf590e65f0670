//! Read-only inspection queries backing the setup, schema, verify and
//! diagnose commands.

use rusqlite::{OptionalExtension, params};
use serde::Serialize;

use crate::EdgeRow;
use crate::store::{GraphStore, StoreError, TABLES};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCount {
    pub table: String,
    pub rows: i64,
}

/// Output of `setup`: which managed tables exist and how full they are.
#[derive(Debug, Clone, Serialize)]
pub struct SetupReport {
    pub tables: Vec<String>,
    pub counts: Vec<TableCount>,
}

/// Column layout of the managed tables; `None` when a table is absent.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaReport {
    pub nodes: Option<Vec<ColumnInfo>>,
    pub edges: Option<Vec<ColumnInfo>>,
    pub metadata: Option<Vec<ColumnInfo>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaperSummary {
    pub arxiv_id: String,
    pub title: Option<String>,
    pub year: Option<i64>,
    pub authors: Option<String>,
}

/// How many nodes have each field populated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Completeness {
    pub total: i64,
    pub with_title: i64,
    pub with_authors: i64,
    pub with_year: i64,
    pub with_summary: i64,
    pub with_methods: i64,
    pub with_datasets: i64,
    pub with_metrics: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodesReport {
    pub columns: Vec<ColumnInfo>,
    pub total: i64,
    pub latest: Vec<PaperSummary>,
    pub completeness: Completeness,
}

#[derive(Debug, Clone, Serialize)]
pub struct EdgesReport {
    pub columns: Vec<ColumnInfo>,
    pub total: i64,
    pub samples: Vec<EdgeRow>,
    pub recent_papers: Vec<PaperSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CitationEntry {
    pub arxiv_id: String,
    pub citation_count: i64,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CitationStats {
    pub total: i64,
    pub average: f64,
    pub max: i64,
    pub min: i64,
    pub with_citations: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetadataReport {
    pub columns: Vec<ColumnInfo>,
    pub total: i64,
    pub top_cited: Vec<CitationEntry>,
    pub stats: Option<CitationStats>,
    /// Metadata rows with no matching node.
    pub orphaned: i64,
    /// Nodes with no metadata row.
    pub missing: i64,
    pub missing_examples: Vec<PaperSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipSample {
    pub id: i64,
    pub relationship_type: Option<String>,
    pub source_id: String,
    pub target_id: String,
    pub source_title: Option<String>,
    pub target_title: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub sqlite_version: String,
    pub tables: Vec<String>,
    pub node_columns: Vec<ColumnInfo>,
    pub edge_columns: Vec<ColumnInfo>,
    pub node_count: i64,
    pub edge_count: i64,
    pub edge_types: Vec<(String, i64)>,
    pub samples: Vec<RelationshipSample>,
    pub distinct_sources: i64,
    pub distinct_targets: i64,
    pub avg_edges_per_source: f64,
}

fn summary_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PaperSummary> {
    Ok(PaperSummary {
        arxiv_id: row.get(0)?,
        title: row.get(1)?,
        year: row.get(2)?,
        authors: row.get(3)?,
    })
}

impl GraphStore {
    /// User tables in the database, sorted by name.
    pub fn list_tables(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    pub fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Columns of `table` in declaration order. Empty if the table is absent.
    pub fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")?;
        let cols = stmt
            .query_map(params![table], |row| {
                Ok(ColumnInfo {
                    name: row.get(0)?,
                    data_type: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(cols)
    }

    /// Row count of one of the managed tables.
    pub fn count_rows(&self, table: &str) -> Result<i64, StoreError> {
        // Table names cannot be bound as parameters; only known names reach the SQL.
        let Some(table) = TABLES.iter().find(|t| **t == table) else {
            return Err(StoreError::UnknownTable(table.to_string()));
        };
        let count = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(count)
    }

    /// Create the schema, then report the managed tables and their sizes.
    pub fn setup(&self) -> Result<SetupReport, StoreError> {
        self.init_schema()?;
        let tables: Vec<String> = self
            .list_tables()?
            .into_iter()
            .filter(|t| TABLES.contains(&t.as_str()))
            .collect();
        let counts = TABLES
            .iter()
            .map(|t| {
                Ok(TableCount {
                    table: t.to_string(),
                    rows: self.count_rows(t)?,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        Ok(SetupReport { tables, counts })
    }

    pub fn schema_report(&self) -> Result<SchemaReport, StoreError> {
        let describe = |table: &str| -> Result<Option<Vec<ColumnInfo>>, StoreError> {
            if self.table_exists(table)? {
                Ok(Some(self.columns(table)?))
            } else {
                Ok(None)
            }
        };
        Ok(SchemaReport {
            nodes: describe("nodes")?,
            edges: describe("edges")?,
            metadata: describe("metadata")?,
        })
    }

    fn latest_papers(&self, limit: usize) -> Result<Vec<PaperSummary>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT arxiv_id, title, year, authors FROM nodes
             ORDER BY arxiv_id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], summary_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Total papers plus the `limit` most recent by identifier.
    pub fn recent_papers(&self, limit: usize) -> Result<(i64, Vec<PaperSummary>), StoreError> {
        Ok((self.count_rows("nodes")?, self.latest_papers(limit)?))
    }

    pub fn nodes_report(&self) -> Result<NodesReport, StoreError> {
        let total = self.count_rows("nodes")?;
        let latest = self.latest_papers(10)?;

        // List columns hold JSON arrays; "[]" counts as empty.
        let completeness = self.conn.query_row(
            "SELECT
                 COUNT(*),
                 COUNT(CASE WHEN title IS NOT NULL AND title != '' THEN 1 END),
                 COUNT(CASE WHEN authors IS NOT NULL AND authors != '' THEN 1 END),
                 COUNT(CASE WHEN year > 0 THEN 1 END),
                 COUNT(CASE WHEN summary IS NOT NULL AND summary != '' THEN 1 END),
                 COUNT(CASE WHEN methods IS NOT NULL AND methods != '[]' THEN 1 END),
                 COUNT(CASE WHEN datasets IS NOT NULL AND datasets != '[]' THEN 1 END),
                 COUNT(CASE WHEN metrics IS NOT NULL AND metrics != '[]' THEN 1 END)
             FROM nodes",
            [],
            |row| {
                Ok(Completeness {
                    total: row.get(0)?,
                    with_title: row.get(1)?,
                    with_authors: row.get(2)?,
                    with_year: row.get(3)?,
                    with_summary: row.get(4)?,
                    with_methods: row.get(5)?,
                    with_datasets: row.get(6)?,
                    with_metrics: row.get(7)?,
                })
            },
        )?;

        Ok(NodesReport {
            columns: self.columns("nodes")?,
            total,
            latest,
            completeness,
        })
    }

    pub fn edges_report(&self) -> Result<EdgesReport, StoreError> {
        let total = self.count_rows("edges")?;
        let mut stmt = self.conn.prepare(
            "SELECT id, source_id, target_id, relationship_type, reasoning
             FROM edges ORDER BY id LIMIT 5",
        )?;
        let samples = stmt
            .query_map([], |row| {
                Ok(EdgeRow {
                    id: row.get(0)?,
                    source_id: row.get(1)?,
                    target_id: row.get(2)?,
                    relationship_type: row.get(3)?,
                    reasoning: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(EdgesReport {
            columns: self.columns("edges")?,
            total,
            samples,
            recent_papers: self.latest_papers(5)?,
        })
    }

    pub fn metadata_report(&self) -> Result<MetadataReport, StoreError> {
        let total = self.count_rows("metadata")?;

        let mut stmt = self.conn.prepare(
            "SELECT m.arxiv_id, COALESCE(m.citation_count, 0), n.title
             FROM metadata m
             LEFT JOIN nodes n ON m.arxiv_id = n.arxiv_id
             ORDER BY m.citation_count DESC, m.arxiv_id
             LIMIT 10",
        )?;
        let top_cited = stmt
            .query_map([], |row| {
                Ok(CitationEntry {
                    arxiv_id: row.get(0)?,
                    citation_count: row.get(1)?,
                    title: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let stats = if total > 0 {
            Some(self.conn.query_row(
                "SELECT COUNT(*),
                        AVG(citation_count),
                        MAX(citation_count),
                        MIN(citation_count),
                        COUNT(CASE WHEN citation_count > 0 THEN 1 END)
                 FROM metadata",
                [],
                |row| {
                    Ok(CitationStats {
                        total: row.get(0)?,
                        average: row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
                        max: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
                        min: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                        with_citations: row.get(4)?,
                    })
                },
            )?)
        } else {
            None
        };

        let orphaned: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM metadata m
             LEFT JOIN nodes n ON m.arxiv_id = n.arxiv_id
             WHERE n.arxiv_id IS NULL",
            [],
            |row| row.get(0),
        )?;

        let missing: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM nodes n
             LEFT JOIN metadata m ON n.arxiv_id = m.arxiv_id
             WHERE m.arxiv_id IS NULL",
            [],
            |row| row.get(0),
        )?;

        let mut stmt = self.conn.prepare(
            "SELECT n.arxiv_id, n.title, n.year, n.authors FROM nodes n
             LEFT JOIN metadata m ON n.arxiv_id = m.arxiv_id
             WHERE m.arxiv_id IS NULL
             ORDER BY n.arxiv_id
             LIMIT 5",
        )?;
        let missing_examples = stmt
            .query_map([], summary_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MetadataReport {
            columns: self.columns("metadata")?,
            total,
            top_cited,
            stats,
            orphaned,
            missing,
            missing_examples,
        })
    }

    pub fn diagnose(&self) -> Result<Diagnostic, StoreError> {
        let sqlite_version: String =
            self.conn
                .query_row("SELECT sqlite_version()", [], |row| row.get(0))?;

        let mut stmt = self.conn.prepare(
            "SELECT COALESCE(relationship_type, 'UNKNOWN'), COUNT(*) AS c
             FROM edges GROUP BY relationship_type ORDER BY c DESC, 1",
        )?;
        let edge_types = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<(String, i64)>, _>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT e.id, e.relationship_type, e.source_id, e.target_id, n1.title, n2.title
             FROM edges e
             JOIN nodes n1 ON e.source_id = n1.arxiv_id
             JOIN nodes n2 ON e.target_id = n2.arxiv_id
             ORDER BY e.id
             LIMIT 3",
        )?;
        let samples = stmt
            .query_map([], |row| {
                Ok(RelationshipSample {
                    id: row.get(0)?,
                    relationship_type: row.get(1)?,
                    source_id: row.get(2)?,
                    target_id: row.get(3)?,
                    source_title: row.get(4)?,
                    target_title: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let distinct_sources: i64 =
            self.conn
                .query_row("SELECT COUNT(DISTINCT source_id) FROM edges", [], |row| {
                    row.get(0)
                })?;
        let distinct_targets: i64 =
            self.conn
                .query_row("SELECT COUNT(DISTINCT target_id) FROM edges", [], |row| {
                    row.get(0)
                })?;
        let avg_edges_per_source: Option<f64> = self.conn.query_row(
            "SELECT AVG(cnt) FROM (SELECT COUNT(*) AS cnt FROM edges GROUP BY source_id)",
            [],
            |row| row.get(0),
        )?;

        Ok(Diagnostic {
            sqlite_version,
            tables: self.list_tables()?,
            node_columns: self.columns("nodes")?,
            edge_columns: self.columns("edges")?,
            node_count: self.count_rows("nodes")?,
            edge_count: self.count_rows("edges")?,
            edge_types,
            samples,
            distinct_sources,
            distinct_targets,
            avg_edges_per_source: avg_edges_per_source.unwrap_or(0.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ExtractedEdge, ExtractedMetadata, Extraction, PaperNode};

    fn seeded() -> GraphStore {
        let store = GraphStore::open_in_memory().unwrap();
        store.init_schema().unwrap();
        let papers = [
            ("paper_1", "First", 5, vec![("paper_2", "CITES"), ("paper_3", "CITES")]),
            ("paper_2", "Second", 0, vec![("paper_1", "BUILDS_ON")]),
            ("paper_3", "", 40, vec![("paper_99", "CITES")]),
        ];
        for (id, title, cites, edges) in papers {
            let extraction = Extraction {
                node: PaperNode {
                    title: title.into(),
                    year: if title.is_empty() { 0 } else { 2023 },
                    methods: if title.is_empty() { vec![] } else { vec!["m".into()] },
                    ..Default::default()
                },
                edges: edges
                    .into_iter()
                    .map(|(t, k)| ExtractedEdge {
                        target_arxiv_id: Some(t.into()),
                        relationship_type: Some(k.into()),
                        reasoning: Some("because".into()),
                    })
                    .collect(),
                metadata: ExtractedMetadata {
                    citation_count: cites,
                },
            };
            store.persist(extraction, id).unwrap();
        }
        store
    }

    #[test]
    fn setup_reports_tables_and_counts() {
        let store = GraphStore::open_in_memory().unwrap();
        let report = store.setup().unwrap();
        assert_eq!(report.tables, vec!["edges", "metadata", "nodes"]);
        assert!(report.counts.iter().all(|c| c.rows == 0));
        assert_eq!(report.counts[0].table, "nodes");
    }

    #[test]
    fn schema_report_flags_missing_metadata() {
        let store = GraphStore::open_in_memory().unwrap();
        store.init_schema().unwrap();
        store.connection().execute_batch("DROP TABLE metadata").unwrap();

        let report = store.schema_report().unwrap();
        assert!(report.metadata.is_none());
        let nodes = report.nodes.unwrap();
        assert_eq!(nodes[0].name, "arxiv_id");
        assert_eq!(nodes[0].data_type, "TEXT");
        assert_eq!(nodes.len(), 10);
        assert_eq!(report.edges.unwrap()[0].name, "id");
    }

    #[test]
    fn count_rows_rejects_unknown_table() {
        let store = GraphStore::open_in_memory().unwrap();
        store.init_schema().unwrap();
        let err = store
            .count_rows("sqlite_master; DROP TABLE nodes")
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownTable(ref t) if t.contains("DROP")));
        assert_eq!(store.count_rows("nodes").unwrap(), 0);
    }

    #[test]
    fn nodes_completeness() {
        let report = seeded().nodes_report().unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.latest[0].arxiv_id, "paper_3");
        assert_eq!(report.completeness.with_title, 2);
        assert_eq!(report.completeness.with_year, 2);
        assert_eq!(report.completeness.with_methods, 2);
        assert_eq!(report.completeness.with_summary, 0);
    }

    #[test]
    fn edges_samples_and_recent() {
        let report = seeded().edges_report().unwrap();
        assert_eq!(report.total, 4);
        assert_eq!(report.samples.len(), 4);
        assert_eq!(report.samples[0].source_id.as_deref(), Some("paper_1"));
        assert_eq!(report.recent_papers.len(), 3);
    }

    #[test]
    fn metadata_stats_and_orphans() {
        let store = seeded();
        store.upsert_metadata("ghost", 1).unwrap();
        store
            .connection()
            .execute("DELETE FROM metadata WHERE arxiv_id = 'paper_2'", [])
            .unwrap();

        let report = store.metadata_report().unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.top_cited[0].arxiv_id, "paper_3");
        assert_eq!(report.top_cited[0].citation_count, 40);
        let ghost = report
            .top_cited
            .iter()
            .find(|c| c.arxiv_id == "ghost")
            .unwrap();
        assert!(ghost.title.is_none());

        let stats = report.stats.unwrap();
        assert_eq!(stats.max, 40);
        assert_eq!(stats.min, 1);
        assert_eq!(stats.with_citations, 3);
        assert_eq!(report.orphaned, 1);
        assert_eq!(report.missing, 1);
        assert_eq!(report.missing_examples[0].arxiv_id, "paper_2");
    }

    #[test]
    fn empty_metadata_has_no_stats() {
        let store = GraphStore::open_in_memory().unwrap();
        store.init_schema().unwrap();
        let report = store.metadata_report().unwrap();
        assert_eq!(report.total, 0);
        assert!(report.stats.is_none());
    }

    #[test]
    fn diagnostic_connection_stats() {
        let diag = seeded().diagnose().unwrap();
        assert!(!diag.sqlite_version.is_empty());
        assert_eq!(diag.node_count, 3);
        assert_eq!(diag.edge_count, 4);
        assert_eq!(diag.edge_types[0], ("CITES".to_string(), 3));
        // paper_3 -> paper_99 dangles, so only resolvable pairs appear
        assert_eq!(diag.samples.len(), 3);
        assert!(diag.samples.iter().all(|s| s.target_id != "paper_99"));
        assert_eq!(diag.distinct_sources, 3);
        assert_eq!(diag.distinct_targets, 4);
        assert!((diag.avg_edges_per_source - 4.0 / 3.0).abs() < 1e-9);
    }
}
