use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("pdf had no readable page text: {0}")]
    NoContent(String),

    #[error("worker failed while processing {path}: {details}")]
    Worker { path: String, details: String },
}

impl From<lopdf::Error> for ExtractionError {
    fn from(error: lopdf::Error) -> Self {
        ExtractionError::PdfParse(error.to_string())
    }
}

/// Raised when the word segmentation backend cannot be initialized.
#[derive(Debug, Error)]
#[error("tokenizer unavailable: {0}")]
pub struct TokenizerUnavailable(pub String);

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index unavailable at {path}: {details}")]
    Unavailable { path: PathBuf, details: String },

    #[error("index schema mismatch: {0}")]
    Schema(String),

    #[error("refusing to replace {path}: directory is not empty and holds no page index")]
    NotAnIndex { path: PathBuf },

    #[error("index at {path} was built with the {indexed} segmenter, not {requested}")]
    SegmenterMismatch {
        path: PathBuf,
        indexed: String,
        requested: String,
    },

    #[error("index task failed: {0}")]
    Task(String),

    #[error("index engine error: {0}")]
    Engine(#[from] tantivy::TantivyError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("index unavailable at {path}: {details}")]
    IndexUnavailable { path: PathBuf, details: String },

    #[error("invalid query {query:?}: {details}")]
    InvalidQuery { query: String, details: String },

    #[error("index error: {0}")]
    Index(IndexError),

    #[error("search request failed: {0}")]
    Engine(#[from] tantivy::TantivyError),
}

impl From<IndexError> for SearchError {
    fn from(error: IndexError) -> Self {
        match error {
            IndexError::Unavailable { path, details } => {
                SearchError::IndexUnavailable { path, details }
            }
            other => SearchError::Index(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("page {page} is outside 1..={page_count} of {path}")]
    PageRange {
        path: String,
        page: u32,
        page_count: u32,
    },

    #[error("no pages requested from {0}")]
    EmptySelection(String),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<lopdf::Error> for AssembleError {
    fn from(error: lopdf::Error) -> Self {
        AssembleError::PdfParse(error.to_string())
    }
}

pub type Result<T, E = ExtractionError> = std::result::Result<T, E>;
