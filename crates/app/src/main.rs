use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use pdf_page_index::{
    assemble_pages, discover_pdf_files, selected_pages_file_name, IndexMode, IndexingOptions,
    IndexingPipeline, LopdfExtractor, PageTokenizer, QueryEngine, SearchOptions,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-page-index", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding the page index
    #[arg(long, env = "INDEX_DIR", default_value = "./index", global = true)]
    index_dir: PathBuf,

    /// Index and query raw text without Japanese word segmentation.
    /// An index is only searchable with the segmentation it was built with.
    #[arg(long, default_value_t = false, global = true)]
    no_segmentation: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Drop the index and re-extract every PDF.
    Rebuild,
    /// Re-extract changed PDFs only and prune removed ones.
    Incremental,
}

impl From<ModeArg> for IndexMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Rebuild => IndexMode::Rebuild,
            ModeArg::Incremental => IndexMode::Incremental,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Index every PDF under a folder, one record per page.
    Index {
        /// Folder that contains PDFs recursively.
        #[arg(long, env = "PDF_DIR", default_value = "./pdf")]
        pdf_dir: PathBuf,
        #[arg(long, value_enum, default_value = "rebuild")]
        mode: ModeArg,
        /// Parallel extraction workers (defaults to min(4, cpus)).
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Search page text and print one result per matching PDF.
    Search {
        /// Query in the index query grammar (terms, "phrases", AND/OR/NOT).
        #[arg(long)]
        query: String,
        /// Maximum number of documents to print.
        #[arg(long)]
        limit: Option<usize>,
        /// Raw page hits fetched before grouping.
        #[arg(long, default_value = "50")]
        hits: usize,
        /// Characters of page text used for each snippet.
        #[arg(long, default_value = "1000")]
        snippet_chars: usize,
        /// Print results as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Write a new PDF containing only the given pages of a source PDF.
    Export {
        /// Folder that export sources must live in.
        #[arg(long, env = "PDF_DIR", default_value = "./pdf")]
        pdf_dir: PathBuf,
        /// Source PDF, as printed by `search`.
        #[arg(long)]
        path: PathBuf,
        /// Comma-separated page numbers, e.g. 2,5,8.
        #[arg(long, value_delimiter = ',', required = true)]
        pages: Vec<u32>,
        /// Output file (defaults to <stem>_selected_pages.pdf).
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "pdf-page-index boot"
    );

    let tokenizer = if cli.no_segmentation {
        PageTokenizer::degraded()
    } else {
        PageTokenizer::japanese()
    };

    match cli.command {
        Command::Index {
            pdf_dir,
            mode,
            workers,
        } => {
            let documents = discover_pdf_files(&pdf_dir);
            info!(folder = %pdf_dir.display(), documents = documents.len(), "discovered pdfs");

            let options = IndexingOptions {
                mode: mode.into(),
                workers: workers.unwrap_or_else(IndexingOptions::default_workers),
                ..IndexingOptions::default()
            };
            let pipeline = IndexingPipeline::new(LopdfExtractor, tokenizer, options);
            let report = pipeline.run(&cli.index_dir, &documents).await?;

            for skipped in &report.skipped {
                warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
            }

            println!(
                "{} pdf(s) indexed ({} pages, {} unchanged, {} removed, {} skipped) at {}",
                report.indexed,
                report.pages,
                report.unchanged,
                report.removed,
                report.skipped.len(),
                Utc::now().to_rfc3339()
            );
        }
        Command::Search {
            query,
            limit,
            hits,
            snippet_chars,
            json,
        } => {
            let options = SearchOptions {
                hit_cap: hits,
                snippet_max_chars: snippet_chars,
            };
            let engine = QueryEngine::open(&cli.index_dir, &tokenizer, options)?;
            let groups = engine.search(&query, limit)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&groups)?);
                return Ok(());
            }

            println!("{} result(s) for {query}", groups.len());
            for group in groups {
                println!("- {}", group.title);
                println!("  path={}", group.path);
                println!("  pages={}", group.page_list());
                println!("  {}", group.snippet.to_html());
            }
        }
        Command::Export {
            pdf_dir,
            path,
            pages,
            output,
        } => {
            let source = confine_to_root(&pdf_dir, &path)?;
            let bytes = assemble_pages(&source, &pages)?;
            let output = output.unwrap_or_else(|| PathBuf::from(selected_pages_file_name(&source)));

            tokio::fs::write(&output, &bytes)
                .await
                .with_context(|| format!("write {}", output.display()))?;
            println!("{} bytes written to {}", bytes.len(), output.display());
        }
    }

    Ok(())
}

/// Resolves `path` and refuses anything outside `root`.
fn confine_to_root(root: &Path, path: &Path) -> anyhow::Result<PathBuf> {
    let root = root
        .canonicalize()
        .with_context(|| format!("pdf folder {} is not accessible", root.display()))?;
    let resolved = path
        .canonicalize()
        .with_context(|| format!("pdf {} is not accessible", path.display()))?;

    if !resolved.starts_with(&root) {
        bail!(
            "{} is outside the pdf folder {}",
            path.display(),
            root.display()
        );
    }
    Ok(resolved)
}
