use std::io::Write;
use std::path::Path;

use owo_colors::OwoColorize;
use papergraph_core::report::{
    ColumnInfo, Diagnostic, EdgesReport, MetadataReport, NodesReport, PaperSummary, SchemaReport,
    SetupReport,
};
use papergraph_core::{BatchSummary, IngestEvent};

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

const RULE: &str = "============================================================";

fn heading(w: &mut dyn Write, title: &str, color: ColorMode) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{}", title.bold().cyan())?;
        writeln!(w, "{}", RULE.dimmed())?;
    } else {
        writeln!(w, "{}", title)?;
        writeln!(w, "{}", RULE)?;
    }
    Ok(())
}

fn ok_line(w: &mut dyn Write, msg: &str, color: ColorMode) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{} {}", "OK".green(), msg)
    } else {
        writeln!(w, "OK {}", msg)
    }
}

fn warn_line(w: &mut dyn Write, msg: &str, color: ColorMode) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{} {}", "WARNING:".yellow(), msg)
    } else {
        writeln!(w, "WARNING: {}", msg)
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let short: String = text.chars().take(max).collect();
        format!("{}...", short)
    } else {
        text.to_string()
    }
}

fn or_na(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => "N/A",
    }
}

fn percent(part: i64, total: i64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

fn print_columns(w: &mut dyn Write, columns: &[ColumnInfo]) -> std::io::Result<()> {
    for col in columns {
        writeln!(w, "  - {}: {}", col.name, col.data_type)?;
    }
    Ok(())
}

fn print_paper_line(w: &mut dyn Write, paper: &PaperSummary) -> std::io::Result<()> {
    let title = truncate(or_na(paper.title.as_deref()), 60);
    match paper.year {
        Some(year) if year > 0 => writeln!(w, "  - {}: {} ({})", paper.arxiv_id, title, year),
        _ => writeln!(w, "  - {}: {}", paper.arxiv_id, title),
    }
}

pub fn print_setup(
    w: &mut dyn Write,
    db_path: &Path,
    report: &SetupReport,
    color: ColorMode,
) -> std::io::Result<()> {
    heading(w, "Database setup", color)?;
    ok_line(w, &format!("connected to {}", db_path.display()), color)?;
    ok_line(w, "tables created", color)?;
    writeln!(w)?;
    writeln!(w, "Tables:")?;
    for table in &report.tables {
        writeln!(w, "  - {}", table)?;
    }
    writeln!(w)?;
    writeln!(w, "Row counts:")?;
    for count in &report.counts {
        writeln!(w, "  {}: {} rows", count.table, count.rows)?;
    }
    Ok(())
}

pub fn print_schema(
    w: &mut dyn Write,
    report: &SchemaReport,
    color: ColorMode,
) -> std::io::Result<()> {
    heading(w, "Table schema", color)?;
    for (table, columns) in [
        ("nodes", &report.nodes),
        ("edges", &report.edges),
        ("metadata", &report.metadata),
    ] {
        writeln!(w)?;
        match columns {
            Some(columns) => {
                writeln!(w, "{} columns:", table)?;
                print_columns(w, columns)?;
            }
            None => warn_line(w, &format!("table '{}' does not exist", table), color)?,
        }
    }
    Ok(())
}

pub fn print_ingest_header(
    w: &mut dyn Write,
    arxiv_id: &str,
    pdf_path: &Path,
    color: ColorMode,
) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(
            w,
            "Processing {} from {}",
            arxiv_id.bold(),
            pdf_path.display()
        )?;
    } else {
        writeln!(w, "Processing {} from {}", arxiv_id, pdf_path.display())?;
    }
    Ok(())
}

/// Print a real-time ingestion event.
pub fn print_event(w: &mut dyn Write, event: &IngestEvent, color: ColorMode) -> std::io::Result<()> {
    match event {
        IngestEvent::BatchStarted { dir, total } => {
            writeln!(w, "Found {} PDFs in {}", total, dir.display())?;
            writeln!(w)?;
        }
        IngestEvent::PaperStarted {
            index,
            total,
            arxiv_id,
            file_name,
        } => {
            writeln!(w)?;
            if color.enabled() {
                writeln!(
                    w,
                    "[{}/{}] {} ({})",
                    index,
                    total,
                    file_name.bold(),
                    arxiv_id.dimmed()
                )?;
            } else {
                writeln!(w, "[{}/{}] {} ({})", index, total, file_name, arxiv_id)?;
            }
        }
        IngestEvent::AlreadyPresent { arxiv_id } => {
            if color.enabled() {
                writeln!(w, "  {} {} already exists", "SKIPPED".yellow(), arxiv_id)?;
            } else {
                writeln!(w, "  SKIPPED {} already exists", arxiv_id)?;
            }
        }
        IngestEvent::TextExtracted { characters } => {
            writeln!(w, "  Extracted {} characters", characters)?;
        }
        IngestEvent::Requesting { model } => {
            writeln!(w, "  Requesting extraction from {}", model)?;
        }
        IngestEvent::RateLimitWait { attempt, wait } => {
            let msg = format!(
                "  Rate limited (attempt {}), waiting {}s...",
                attempt,
                wait.as_secs()
            );
            if color.enabled() {
                writeln!(w, "{}", msg.yellow())?;
            } else {
                writeln!(w, "{}", msg)?;
            }
        }
        IngestEvent::ResponseParsed => {
            writeln!(w, "  Parsed response")?;
        }
        IngestEvent::Saved { arxiv_id, outcome } => {
            let mut msg = format!("{} ({} edges", arxiv_id, outcome.edges_inserted);
            if outcome.edges_skipped > 0 {
                msg.push_str(&format!(", {} skipped", outcome.edges_skipped));
            }
            msg.push(')');
            if color.enabled() {
                writeln!(w, "  {} {}", "SAVED".green(), msg)?;
            } else {
                writeln!(w, "  SAVED {}", msg)?;
            }
            if !outcome.metadata_written {
                warn_line(w, "metadata was not written", color)?;
            }
        }
        IngestEvent::PaperFailed { arxiv_id, message } => {
            if color.enabled() {
                writeln!(w, "  {} {}: {}", "FAILED".red(), arxiv_id, message)?;
            } else {
                writeln!(w, "  FAILED {}: {}", arxiv_id, message)?;
            }
        }
        IngestEvent::Pacing { wait } => {
            let msg = format!("  Waiting {}s before next paper", wait.as_secs());
            if color.enabled() {
                writeln!(w, "{}", msg.dimmed())?;
            } else {
                writeln!(w, "{}", msg)?;
            }
        }
    }
    Ok(())
}

pub fn print_batch_summary(
    w: &mut dyn Write,
    summary: &BatchSummary,
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w)?;
    heading(w, "Processing complete", color)?;
    if color.enabled() {
        writeln!(w, "  Processed: {}", summary.processed.to_string().green())?;
        writeln!(w, "  Skipped:   {}", summary.skipped.to_string().yellow())?;
        writeln!(w, "  Failed:    {}", summary.failed.to_string().red())?;
    } else {
        writeln!(w, "  Processed: {}", summary.processed)?;
        writeln!(w, "  Skipped:   {}", summary.skipped)?;
        writeln!(w, "  Failed:    {}", summary.failed)?;
    }
    writeln!(w, "  Total:     {}", summary.total)?;
    Ok(())
}

pub fn print_recent_papers(
    w: &mut dyn Write,
    total: i64,
    recent: &[PaperSummary],
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w)?;
    heading(w, "Verification", color)?;
    writeln!(w, "Total papers in database: {}", total)?;
    if !recent.is_empty() {
        writeln!(w, "Last {} papers:", recent.len())?;
        for paper in recent {
            print_paper_line(w, paper)?;
        }
    }
    Ok(())
}

pub fn print_nodes_report(
    w: &mut dyn Write,
    report: &NodesReport,
    color: ColorMode,
) -> std::io::Result<()> {
    heading(w, "Nodes", color)?;
    writeln!(w, "Columns:")?;
    print_columns(w, &report.columns)?;
    writeln!(w)?;
    writeln!(w, "Total nodes: {}", report.total)?;

    if report.total == 0 {
        warn_line(w, "no nodes found", color)?;
        return Ok(());
    }

    writeln!(w)?;
    writeln!(w, "Latest {} nodes:", report.latest.len())?;
    for paper in &report.latest {
        writeln!(w)?;
        writeln!(w, "  {}", paper.arxiv_id)?;
        writeln!(w, "    Title:   {}", truncate(or_na(paper.title.as_deref()), 70))?;
        writeln!(w, "    Authors: {}", truncate(or_na(paper.authors.as_deref()), 70))?;
        match paper.year {
            Some(year) => writeln!(w, "    Year:    {}", year)?,
            None => writeln!(w, "    Year:    N/A")?,
        }
    }

    let c = &report.completeness;
    writeln!(w)?;
    writeln!(w, "Data completeness:")?;
    for (label, count) in [
        ("title", c.with_title),
        ("authors", c.with_authors),
        ("year", c.with_year),
        ("summary", c.with_summary),
        ("methods", c.with_methods),
        ("datasets", c.with_datasets),
        ("metrics", c.with_metrics),
    ] {
        writeln!(
            w,
            "  {:<9} {}/{} ({:.1}%)",
            format!("{}:", label),
            count,
            c.total,
            percent(count, c.total)
        )?;
    }
    Ok(())
}

pub fn print_edges_report(
    w: &mut dyn Write,
    report: &EdgesReport,
    color: ColorMode,
) -> std::io::Result<()> {
    heading(w, "Edges", color)?;
    writeln!(w, "Columns:")?;
    print_columns(w, &report.columns)?;
    writeln!(w)?;
    writeln!(w, "Total edges: {}", report.total)?;

    if report.samples.is_empty() {
        warn_line(w, "no edges found", color)?;
    } else {
        writeln!(w)?;
        writeln!(w, "Sample edges:")?;
        for edge in &report.samples {
            writeln!(
                w,
                "  #{} {} -[{}]-> {}",
                edge.id,
                or_na(edge.source_id.as_deref()),
                or_na(edge.relationship_type.as_deref()),
                or_na(edge.target_id.as_deref())
            )?;
            if let Some(reasoning) = edge.reasoning.as_deref().filter(|r| !r.is_empty()) {
                writeln!(w, "      {}", truncate(reasoning, 70))?;
            }
        }
    }

    if !report.recent_papers.is_empty() {
        writeln!(w)?;
        writeln!(w, "Recent papers:")?;
        for paper in &report.recent_papers {
            print_paper_line(w, paper)?;
        }
    }
    Ok(())
}

pub fn print_metadata_report(
    w: &mut dyn Write,
    report: &MetadataReport,
    color: ColorMode,
) -> std::io::Result<()> {
    heading(w, "Metadata", color)?;
    writeln!(w, "Columns:")?;
    print_columns(w, &report.columns)?;
    writeln!(w)?;
    writeln!(w, "Total metadata records: {}", report.total)?;

    if report.top_cited.is_empty() {
        warn_line(w, "no metadata records found", color)?;
    } else {
        writeln!(w)?;
        writeln!(w, "Top {} by citations:", report.top_cited.len())?;
        for entry in &report.top_cited {
            writeln!(
                w,
                "  {:>6}  {}  {}",
                entry.citation_count,
                entry.arxiv_id,
                truncate(or_na(entry.title.as_deref()), 50)
            )?;
        }
    }

    if let Some(stats) = &report.stats {
        writeln!(w)?;
        writeln!(w, "Citation statistics:")?;
        writeln!(w, "  Average: {:.1}", stats.average)?;
        writeln!(w, "  Max:     {}", stats.max)?;
        writeln!(w, "  Min:     {}", stats.min)?;
        writeln!(
            w,
            "  With citations: {}/{}",
            stats.with_citations, stats.total
        )?;
    }

    writeln!(w)?;
    if report.orphaned > 0 {
        warn_line(
            w,
            &format!("{} metadata records have no matching node", report.orphaned),
            color,
        )?;
    } else {
        ok_line(w, "every metadata record has a node", color)?;
    }

    if report.missing > 0 {
        warn_line(
            w,
            &format!("{} nodes have no metadata", report.missing),
            color,
        )?;
        for paper in &report.missing_examples {
            print_paper_line(w, paper)?;
        }
    } else {
        ok_line(w, "every node has metadata", color)?;
    }
    Ok(())
}

pub fn print_connection_failure(
    w: &mut dyn Write,
    db_path: &Path,
    message: &str,
    color: ColorMode,
) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{} {}", "CONNECTION FAILED:".red().bold(), message)?;
    } else {
        writeln!(w, "CONNECTION FAILED: {}", message)?;
    }
    writeln!(w)?;
    writeln!(w, "Check that:")?;
    writeln!(w, "  - the database file exists at {}", db_path.display())?;
    writeln!(w, "  - PAPERGRAPH_DB or --db points at the right file")?;
    writeln!(w, "  - `papergraph setup` has been run")?;
    Ok(())
}

pub fn print_diagnostic(
    w: &mut dyn Write,
    db_path: &Path,
    diag: &Diagnostic,
    color: ColorMode,
) -> std::io::Result<()> {
    heading(w, "Database diagnostic", color)?;
    ok_line(w, &format!("connected to {}", db_path.display()), color)?;
    writeln!(w, "SQLite version: {}", diag.sqlite_version)?;

    writeln!(w)?;
    writeln!(w, "Tables:")?;
    for table in &diag.tables {
        writeln!(w, "  - {}", table)?;
    }

    writeln!(w)?;
    writeln!(w, "Nodes: {}", diag.node_count)?;
    if !diag.node_columns.is_empty() {
        let names: Vec<&str> = diag.node_columns.iter().map(|c| c.name.as_str()).collect();
        writeln!(w, "  columns: {}", names.join(", "))?;
    }
    writeln!(w, "Edges: {}", diag.edge_count)?;
    if !diag.edge_columns.is_empty() {
        let names: Vec<&str> = diag.edge_columns.iter().map(|c| c.name.as_str()).collect();
        writeln!(w, "  columns: {}", names.join(", "))?;
    }

    if !diag.edge_types.is_empty() {
        writeln!(w)?;
        writeln!(w, "Edges by relationship type:")?;
        for (kind, count) in &diag.edge_types {
            writeln!(w, "  {}: {}", kind, count)?;
        }
    }

    if !diag.samples.is_empty() {
        writeln!(w)?;
        writeln!(w, "Sample relationships:")?;
        for s in &diag.samples {
            writeln!(
                w,
                "  {} -[{}]-> {}",
                truncate(or_na(s.source_title.as_deref()), 40),
                or_na(s.relationship_type.as_deref()),
                truncate(or_na(s.target_title.as_deref()), 40)
            )?;
            if color.enabled() {
                writeln!(
                    w,
                    "    {}",
                    format!("({} -> {})", s.source_id, s.target_id).dimmed()
                )?;
            } else {
                writeln!(w, "    ({} -> {})", s.source_id, s.target_id)?;
            }
        }
    }

    writeln!(w)?;
    writeln!(w, "Connection statistics:")?;
    writeln!(w, "  Distinct sources: {}", diag.distinct_sources)?;
    writeln!(w, "  Distinct targets: {}", diag.distinct_targets)?;
    writeln!(w, "  Avg edges per source: {:.2}", diag.avg_edges_per_source)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use papergraph_core::PersistOutcome;
    use papergraph_core::report::{CitationEntry, CitationStats, Completeness};

    use super::*;

    const PLAIN: ColorMode = ColorMode(false);

    fn render(f: impl FnOnce(&mut dyn Write) -> std::io::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn truncate_by_chars() {
        assert_eq!(truncate("héllo", 10), "héllo");
        assert_eq!(truncate("héllo wörld", 5), "héllo...");
    }

    #[test]
    fn rate_limit_event() {
        let text = render(|w| {
            print_event(
                w,
                &IngestEvent::RateLimitWait {
                    attempt: 2,
                    wait: Duration::from_secs(20),
                },
                PLAIN,
            )
        });
        assert_eq!(text, "  Rate limited (attempt 2), waiting 20s...\n");
    }

    #[test]
    fn saved_event_mentions_skipped_edges() {
        let text = render(|w| {
            print_event(
                w,
                &IngestEvent::Saved {
                    arxiv_id: "paper_4".into(),
                    outcome: PersistOutcome {
                        metadata_written: false,
                        edges_inserted: 3,
                        edges_skipped: 1,
                    },
                },
                PLAIN,
            )
        });
        assert!(text.contains("SAVED paper_4 (3 edges, 1 skipped)"));
        assert!(text.contains("WARNING: metadata was not written"));
    }

    #[test]
    fn plain_output_has_no_escape_codes() {
        let summary = BatchSummary {
            processed: 2,
            skipped: 1,
            failed: 0,
            total: 3,
        };
        let text = render(|w| print_batch_summary(w, &summary, PLAIN));
        assert!(!text.contains('\u{1b}'));
        assert!(text.contains("Processed: 2"));
        assert!(text.contains("Total:     3"));
    }

    #[test]
    fn schema_flags_missing_table() {
        let report = SchemaReport {
            nodes: Some(vec![ColumnInfo {
                name: "arxiv_id".into(),
                data_type: "TEXT".into(),
            }]),
            edges: Some(vec![]),
            metadata: None,
        };
        let text = render(|w| print_schema(w, &report, PLAIN));
        assert!(text.contains("  - arxiv_id: TEXT"));
        assert!(text.contains("WARNING: table 'metadata' does not exist"));
    }

    #[test]
    fn nodes_report_percentages() {
        let report = NodesReport {
            columns: vec![],
            total: 4,
            latest: vec![PaperSummary {
                arxiv_id: "paper_9".into(),
                title: Some("A Title".into()),
                year: None,
                authors: None,
            }],
            completeness: Completeness {
                total: 4,
                with_title: 3,
                ..Default::default()
            },
        };
        let text = render(|w| print_nodes_report(w, &report, PLAIN));
        assert!(text.contains("title:    3/4 (75.0%)"));
        assert!(text.contains("Authors: N/A"));
        assert!(text.contains("Year:    N/A"));
    }

    #[test]
    fn metadata_report_warnings() {
        let report = MetadataReport {
            columns: vec![],
            total: 1,
            top_cited: vec![CitationEntry {
                arxiv_id: "ghost".into(),
                citation_count: 7,
                title: None,
            }],
            stats: Some(CitationStats {
                total: 1,
                average: 7.0,
                max: 7,
                min: 7,
                with_citations: 1,
            }),
            orphaned: 1,
            missing: 0,
            missing_examples: vec![],
        };
        let text = render(|w| print_metadata_report(w, &report, PLAIN));
        assert!(text.contains("WARNING: 1 metadata records have no matching node"));
        assert!(text.contains("OK every node has metadata"));
        assert!(text.contains("Average: 7.0"));
    }

    #[test]
    fn connection_failure_hints() {
        let text = render(|w| {
            print_connection_failure(w, &PathBuf::from("/tmp/x.db"), "database not found", PLAIN)
        });
        assert!(text.starts_with("CONNECTION FAILED: database not found"));
        assert!(text.contains("/tmp/x.db"));
    }
}
