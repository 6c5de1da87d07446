use crate::error::{ExtractionError, IndexError};
use crate::extractor::PdfExtractor;
use crate::models::{IndexMode, IndexingOptions, IndexingReport, PageRecord, SkippedPdf};
use crate::store::{PageIndex, PageWriter};
use crate::tokenizer::PageTokenizer;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

/// Modification time of `path` in microseconds since the unix epoch.
pub fn modified_micros(path: &Path) -> Result<i64, ExtractionError> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(DateTime::<Utc>::from(modified).timestamp_micros())
}

/// Extracts and tokenizes every page of one document.
pub fn build_page_records<E>(
    extractor: &E,
    tokenizer: &PageTokenizer,
    path: &Path,
) -> Result<Vec<PageRecord>, ExtractionError>
where
    E: PdfExtractor + ?Sized,
{
    let title = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| ExtractionError::MissingFileName(path.display().to_string()))?
        .to_string();
    let modified = modified_micros(path)?;
    let pages = extractor.extract_pages(path)?;

    Ok(pages
        .into_iter()
        .map(|page| PageRecord {
            title: title.clone(),
            content: tokenizer.tokenize(&page.text),
            raw_content: page.text,
            path: path.to_string_lossy().to_string(),
            page_num: page.number,
            modified,
        })
        .collect())
}

/// Write path: extraction and tokenization on a bounded pool of blocking
/// workers, all records funnelled into one writer, one commit per run.
pub struct IndexingPipeline<E> {
    extractor: Arc<E>,
    tokenizer: PageTokenizer,
    options: IndexingOptions,
}

impl<E> IndexingPipeline<E>
where
    E: PdfExtractor + Send + Sync + 'static,
{
    pub fn new(extractor: E, tokenizer: PageTokenizer, options: IndexingOptions) -> Self {
        Self {
            extractor: Arc::new(extractor),
            tokenizer,
            options,
        }
    }

    pub fn tokenizer(&self) -> &PageTokenizer {
        &self.tokenizer
    }

    /// Indexes `documents` into the index at `index_dir`.
    pub async fn run(
        &self,
        index_dir: &Path,
        documents: &[PathBuf],
    ) -> Result<IndexingReport, IndexError> {
        let index = match self.options.mode {
            IndexMode::Rebuild => PageIndex::create(index_dir, &self.tokenizer)?,
            IndexMode::Incremental if PageIndex::exists(index_dir) => {
                PageIndex::open_existing(index_dir, &self.tokenizer)?
            }
            IndexMode::Incremental => PageIndex::create(index_dir, &self.tokenizer)?,
        };
        self.run_on(&index, documents).await
    }

    pub async fn run_on(
        &self,
        index: &PageIndex,
        documents: &[PathBuf],
    ) -> Result<IndexingReport, IndexError> {
        let mut report = IndexingReport::default();

        let incremental = self.options.mode == IndexMode::Incremental;
        let indexed = if incremental {
            index.indexed_documents()?
        } else {
            HashMap::new()
        };

        let mut pending = Vec::with_capacity(documents.len());
        for path in documents {
            let key = path.to_string_lossy().to_string();
            let unchanged = match (indexed.get(&key), modified_micros(path)) {
                (Some(stored), Ok(current)) => *stored == current,
                _ => false,
            };
            if unchanged {
                report.unchanged += 1;
            } else {
                pending.push(path.clone());
            }
        }

        // An empty document set never prunes, so a run over nothing keeps the index.
        let present = documents
            .iter()
            .map(|path| path.to_string_lossy().to_string())
            .collect::<HashSet<_>>();
        let stale = if documents.is_empty() {
            Vec::new()
        } else {
            indexed
                .keys()
                .filter(|path| !present.contains(*path))
                .cloned()
                .collect::<Vec<_>>()
        };

        // Changed documents lose their old pages whatever their new extraction yields.
        let replaced = pending
            .iter()
            .map(|path| path.to_string_lossy().to_string())
            .filter(|path| indexed.contains_key(path))
            .collect::<HashSet<_>>();

        let mut writer = index.writer(self.options.writer_memory_bytes)?;
        for path in stale.iter().chain(replaced.iter()) {
            writer.remove_document(path);
        }

        self.index_documents(&mut writer, pending, &mut report).await?;

        let dropped = report
            .skipped
            .iter()
            .filter(|skipped| replaced.contains(&*skipped.path.to_string_lossy()))
            .count();
        report.removed = stale.len() + dropped;

        if report.indexed == 0 && stale.is_empty() && replaced.is_empty() {
            writer.discard()?;
            info!(
                unchanged = report.unchanged,
                skipped = report.skipped.len(),
                "nothing to add or remove, index left unchanged"
            );
            return Ok(report);
        }

        tokio::task::spawn_blocking(move || writer.commit())
            .await
            .map_err(|error| IndexError::Task(error.to_string()))??;
        report.committed = true;
        info!(
            documents = report.indexed,
            pages = report.pages,
            unchanged = report.unchanged,
            removed = report.removed,
            skipped = report.skipped.len(),
            "index committed"
        );

        Ok(report)
    }

    async fn index_documents(
        &self,
        writer: &mut PageWriter,
        pending: Vec<PathBuf>,
        report: &mut IndexingReport,
    ) -> Result<(), IndexError> {
        let permits = Arc::new(Semaphore::new(self.options.workers.max(1)));
        let mut workers = JoinSet::new();

        for path in pending {
            let permits = Arc::clone(&permits);
            let extractor = Arc::clone(&self.extractor);
            let tokenizer = self.tokenizer.clone();

            workers.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    let error = ExtractionError::Worker {
                        path: path.display().to_string(),
                        details: "worker pool closed".to_string(),
                    };
                    return (path, Err(error));
                };

                let job_path = path.clone();
                let outcome = tokio::task::spawn_blocking(move || {
                    build_page_records(extractor.as_ref(), &tokenizer, &job_path)
                })
                .await
                .unwrap_or_else(|error| {
                    Err(ExtractionError::Worker {
                        path: path.display().to_string(),
                        details: error.to_string(),
                    })
                });

                (path, outcome)
            });
        }

        while let Some(joined) = workers.join_next().await {
            let (path, outcome) = match joined {
                Ok(done) => done,
                Err(error) => {
                    warn!(%error, "indexing task aborted");
                    continue;
                }
            };

            match outcome {
                Ok(records) if !records.is_empty() => {
                    for record in &records {
                        writer.add(record)?;
                    }
                    info!(path = %path.display(), pages = records.len(), "indexed document");
                    report.indexed += 1;
                    report.pages += records.len();
                }
                Ok(_) => {
                    warn!(path = %path.display(), "document produced no pages");
                    report.skipped.push(SkippedPdf {
                        path,
                        reason: "no pages".to_string(),
                    });
                }
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipped pdf");
                    report.skipped.push(SkippedPdf {
                        path,
                        reason: error.to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}
