//! Paper ingestion: extract → prompt → completion with retry → parse → persist.
//!
//! Papers are processed strictly one at a time. A batch run paces itself with
//! a fixed sleep between papers and keeps going when a single paper fails.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::backend::PdfBackend;
use crate::llm::CompletionBackend;
use crate::prompt::{MAX_PROMPT_CHARS, build_prompt};
use crate::response::parse_extraction;
use crate::retry::{RetryPolicy, complete_with_retry};
use crate::store::{GraphStore, PersistOutcome};
use crate::{Config, IngestError, IngestEvent};

/// Result of ingesting one paper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A node with this identifier already existed; nothing was written.
    Skipped,
    Ingested {
        characters: usize,
        persisted: PersistOutcome,
    },
}

/// Counters for a directory run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total: usize,
}

/// Knobs for the pipeline, usually derived from [`Config`].
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub retry: RetryPolicy,
    pub max_prompt_chars: usize,
    pub pacing: Duration,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            max_prompt_chars: MAX_PROMPT_CHARS,
            pacing: Duration::from_secs(3),
        }
    }
}

impl From<&Config> for IngestSettings {
    fn from(config: &Config) -> Self {
        Self {
            retry: config.retry_policy(),
            max_prompt_chars: config.max_prompt_chars,
            pacing: config.pacing(),
        }
    }
}

/// Identifier for a PDF file name: `paper_` plus the name with the
/// `📄 Paper ` prefix and `.pdf` suffix text removed.
pub fn paper_id_from_filename(file_name: &str) -> String {
    format!(
        "paper_{}",
        file_name.replace("📄 Paper ", "").replace(".pdf", "")
    )
}

/// `*.pdf` file names in `dir`, sorted.
pub fn list_pdfs(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".pdf") {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

pub struct Ingestor<'a> {
    store: &'a GraphStore,
    pdf: &'a dyn PdfBackend,
    llm: &'a dyn CompletionBackend,
    settings: IngestSettings,
}

impl<'a> Ingestor<'a> {
    pub fn new(
        store: &'a GraphStore,
        pdf: &'a dyn PdfBackend,
        llm: &'a dyn CompletionBackend,
        settings: IngestSettings,
    ) -> Self {
        Self {
            store,
            pdf,
            llm,
            settings,
        }
    }

    /// Ingest one paper under the caller-chosen `arxiv_id`.
    pub async fn ingest_paper(
        &self,
        arxiv_id: &str,
        pdf_path: &Path,
        progress: &dyn Fn(IngestEvent),
    ) -> Result<IngestOutcome, IngestError> {
        if self.store.paper_exists(arxiv_id)? {
            tracing::info!(arxiv_id, "already in database, skipping");
            progress(IngestEvent::AlreadyPresent {
                arxiv_id: arxiv_id.to_string(),
            });
            return Ok(IngestOutcome::Skipped);
        }

        let text = self.pdf.extract_text(pdf_path)?;
        let characters = text.chars().count();
        progress(IngestEvent::TextExtracted { characters });

        let prompt = build_prompt(arxiv_id, &text, self.settings.max_prompt_chars);
        progress(IngestEvent::Requesting {
            model: self.llm.model().to_string(),
        });
        let reply = complete_with_retry(self.llm, &prompt, &self.settings.retry, progress).await?;

        let extraction = parse_extraction(&reply)?;
        progress(IngestEvent::ResponseParsed);

        let persisted = self.store.persist(extraction, arxiv_id)?;
        progress(IngestEvent::Saved {
            arxiv_id: arxiv_id.to_string(),
            outcome: persisted,
        });

        Ok(IngestOutcome::Ingested {
            characters,
            persisted,
        })
    }

    /// Ingest every `*.pdf` in `dir`, in file-name order.
    ///
    /// Only failing to read the directory is an error; per-paper failures
    /// are reported through `progress` and counted.
    pub async fn ingest_directory(
        &self,
        dir: &Path,
        progress: &dyn Fn(IngestEvent),
    ) -> Result<BatchSummary, IngestError> {
        let files = list_pdfs(dir)?;
        let total = files.len();
        progress(IngestEvent::BatchStarted {
            dir: dir.to_path_buf(),
            total,
        });

        let mut summary = BatchSummary {
            total,
            ..Default::default()
        };

        for (i, file_name) in files.iter().enumerate() {
            let arxiv_id = paper_id_from_filename(file_name);
            let path: PathBuf = dir.join(file_name);
            progress(IngestEvent::PaperStarted {
                index: i + 1,
                total,
                arxiv_id: arxiv_id.clone(),
                file_name: file_name.clone(),
            });

            match self.ingest_paper(&arxiv_id, &path, progress).await {
                Ok(IngestOutcome::Skipped) => summary.skipped += 1,
                Ok(IngestOutcome::Ingested { .. }) => summary.processed += 1,
                Err(e) => {
                    tracing::warn!(arxiv_id = %arxiv_id, error = %e, "paper failed");
                    progress(IngestEvent::PaperFailed {
                        arxiv_id: arxiv_id.clone(),
                        message: e.to_string(),
                    });
                    summary.failed += 1;
                }
            }

            if i + 1 < total && !self.settings.pacing.is_zero() {
                progress(IngestEvent::Pacing {
                    wait: self.settings.pacing,
                });
                tokio::time::sleep(self.settings.pacing).await;
            }
        }

        tracing::info!(
            processed = summary.processed,
            skipped = summary.skipped,
            failed = summary.failed,
            total = summary.total,
            "batch complete"
        );
        Ok(summary)
    }
}
