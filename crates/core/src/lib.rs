pub mod assembler;
pub mod error;
pub mod extractor;
pub mod highlight;
pub mod ingest;
pub mod models;
pub mod query;
pub mod store;
pub mod tokenizer;

#[cfg(test)]
pub(crate) mod test_support;

pub use assembler::{assemble_pages, selected_pages_file_name};
pub use error::{AssembleError, ExtractionError, IndexError, SearchError, TokenizerUnavailable};
pub use extractor::{extract_page_texts, LopdfExtractor, PdfExtractor, PAGE_STRATEGIES};
pub use highlight::WholeFragmentHighlighter;
pub use ingest::{build_page_records, discover_pdf_files, IndexingPipeline};
pub use models::{
    IndexMode, IndexingOptions, IndexingReport, PageRecord, PageText, ResultGroup, SearchHit,
    SearchOptions, SkippedPdf, Snippet,
};
pub use query::{group_hits, QueryEngine};
pub use store::{PageIndex, PageSchema, PageWriter};
pub use tokenizer::{LinderaSegmenter, PageTokenizer, Segmenter, SimpleSegmenter};
