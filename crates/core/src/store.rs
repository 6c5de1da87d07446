use crate::error::IndexError;
use crate::models::PageRecord;
use crate::tokenizer::{PageTokenizer, CONTENT_TOKENIZER};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tantivy::collector::DocSetCollector;
use tantivy::directory::MmapDirectory;
use tantivy::query::AllQuery;
use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, Value, INDEXED, STORED,
    STRING,
};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, TantivyDocument, Term};
use tracing::{debug, info};

/// Field handles of the page schema.
#[derive(Debug, Clone)]
pub struct PageSchema {
    pub schema: Schema,
    pub title: Field,
    pub content: Field,
    pub raw_content: Field,
    pub path: Field,
    pub page_num: Field,
    pub modified: Field,
}

impl PageSchema {
    pub fn build() -> Self {
        let mut builder = Schema::builder();

        let content_indexing = TextFieldIndexing::default()
            .set_tokenizer(CONTENT_TOKENIZER)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions);
        let content_options = TextOptions::default().set_indexing_options(content_indexing);

        let title = builder.add_text_field("title", STORED);
        let content = builder.add_text_field("content", content_options);
        let raw_content = builder.add_text_field("raw_content", STORED);
        let path = builder.add_text_field("path", STRING | STORED);
        let page_num = builder.add_text_field("page_num", STRING | STORED);
        let modified = builder.add_i64_field("modified", INDEXED | STORED);

        Self {
            schema: builder.build(),
            title,
            content,
            raw_content,
            path,
            page_num,
            modified,
        }
    }

    pub fn from_index(index: &Index) -> Result<Self, IndexError> {
        let schema = index.schema();
        let field = |name: &str| {
            schema
                .get_field(name)
                .map_err(|_| IndexError::Schema(format!("{name} field missing")))
        };

        Ok(Self {
            title: field("title")?,
            content: field("content")?,
            raw_content: field("raw_content")?,
            path: field("path")?,
            page_num: field("page_num")?,
            modified: field("modified")?,
            schema: schema.clone(),
        })
    }

    pub fn to_document(&self, record: &PageRecord) -> TantivyDocument {
        doc!(
            self.title => record.title.as_str(),
            self.content => record.content.as_str(),
            self.raw_content => record.raw_content.as_str(),
            self.path => record.path.as_str(),
            self.page_num => record.page_num.to_string(),
            self.modified => record.modified,
        )
    }

    /// Rebuilds a record from stored fields. `content` is not stored and comes back empty.
    pub fn to_record(&self, document: &TantivyDocument) -> Result<PageRecord, IndexError> {
        let text = |field: Field| {
            document
                .get_first(field)
                .and_then(|value| value.as_str())
                .map(str::to_string)
        };

        let path = text(self.path).ok_or_else(|| IndexError::Schema("stored page without path".to_string()))?;
        let page_num = text(self.page_num)
            .and_then(|value| value.parse::<u32>().ok())
            .ok_or_else(|| IndexError::Schema(format!("stored page of {path} has no page number")))?;

        Ok(PageRecord {
            title: text(self.title).unwrap_or_default(),
            content: String::new(),
            raw_content: text(self.raw_content).unwrap_or_default(),
            page_num,
            modified: document
                .get_first(self.modified)
                .and_then(|value| value.as_i64())
                .unwrap_or_default(),
            path,
        })
    }
}

/// Durable page index on disk.
pub struct PageIndex {
    index: Index,
    schema: PageSchema,
    path: PathBuf,
    segmenter: &'static str,
}

const SEGMENTER_PAYLOAD_PREFIX: &str = "segmenter=";

fn committed_segmenter(index: &Index) -> Result<Option<String>, IndexError> {
    let payload = index.load_metas()?.payload;
    Ok(payload.and_then(|payload| {
        payload
            .strip_prefix(SEGMENTER_PAYLOAD_PREFIX)
            .map(str::to_string)
    }))
}

impl PageIndex {
    pub fn exists(dir: &Path) -> bool {
        if !dir.is_dir() {
            return false;
        }
        MmapDirectory::open(dir)
            .ok()
            .and_then(|directory| Index::exists(&directory).ok())
            .unwrap_or(false)
    }

    /// Creates an empty index in `dir`, replacing an index already there.
    ///
    /// A directory that is not empty and holds no index is refused rather than wiped.
    pub fn create(dir: &Path, tokenizer: &PageTokenizer) -> Result<Self, IndexError> {
        if Self::exists(dir) {
            fs::remove_dir_all(dir)?;
        } else if dir.is_dir() && fs::read_dir(dir)?.next().is_some() {
            return Err(IndexError::NotAnIndex {
                path: dir.to_path_buf(),
            });
        }
        fs::create_dir_all(dir)?;

        let schema = PageSchema::build();
        let index = Index::create_in_dir(dir, schema.schema.clone())?;
        index.tokenizers().register(CONTENT_TOKENIZER, tokenizer.analyzer());
        info!(path = %dir.display(), segmenter = tokenizer.segmenter_name(), "created page index");

        Ok(Self {
            index,
            schema,
            path: dir.to_path_buf(),
            segmenter: tokenizer.segmenter_name(),
        })
    }

    /// Opens the index in `dir`. The tokenizer must use the segmenter the index
    /// was last committed with, otherwise query terms would never line up.
    pub fn open_existing(dir: &Path, tokenizer: &PageTokenizer) -> Result<Self, IndexError> {
        if !Self::exists(dir) {
            return Err(IndexError::Unavailable {
                path: dir.to_path_buf(),
                details: "no index has been built here".to_string(),
            });
        }

        let index = Index::open_in_dir(dir).map_err(|error| IndexError::Unavailable {
            path: dir.to_path_buf(),
            details: error.to_string(),
        })?;

        let requested = tokenizer.segmenter_name();
        if let Some(indexed) = committed_segmenter(&index)? {
            if indexed != requested {
                return Err(IndexError::SegmenterMismatch {
                    path: dir.to_path_buf(),
                    indexed,
                    requested: requested.to_string(),
                });
            }
        }

        index.tokenizers().register(CONTENT_TOKENIZER, tokenizer.analyzer());
        let schema = PageSchema::from_index(&index)?;
        debug!(path = %dir.display(), segmenter = requested, "opened page index");

        Ok(Self {
            index,
            schema,
            path: dir.to_path_buf(),
            segmenter: requested,
        })
    }

    /// Segmenter recorded by the last commit, if anything was committed yet.
    pub fn indexed_segmenter(&self) -> Result<Option<String>, IndexError> {
        committed_segmenter(&self.index)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &PageSchema {
        &self.schema
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Acquires the single writer of this index. A second writer fails until
    /// this one is committed or discarded.
    pub fn writer(&self, memory_bytes: usize) -> Result<PageWriter, IndexError> {
        let writer = self
            .index
            .writer_with_num_threads::<TantivyDocument>(1, memory_bytes)?;
        Ok(PageWriter {
            writer,
            schema: self.schema.clone(),
            segmenter: self.segmenter,
            pending: 0,
        })
    }

    /// Reader whose searchers only move forward on an explicit reload.
    pub fn reader(&self) -> Result<IndexReader, IndexError> {
        let reader: IndexReader = self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        Ok(reader)
    }

    /// Point-in-time view of the last commit.
    pub fn searcher(&self) -> Result<Searcher, IndexError> {
        Ok(self.reader()?.searcher())
    }

    pub fn num_pages(&self) -> Result<u64, IndexError> {
        Ok(self.searcher()?.num_docs())
    }

    /// Latest modification time recorded for every indexed path.
    pub fn indexed_documents(&self) -> Result<HashMap<String, i64>, IndexError> {
        let searcher = self.searcher()?;
        let addresses = searcher.search(&AllQuery, &DocSetCollector)?;

        let mut documents = HashMap::new();
        for address in addresses {
            let stored: TantivyDocument = searcher.doc(address)?;
            let record = self.schema.to_record(&stored)?;
            documents
                .entry(record.path)
                .and_modify(|modified: &mut i64| *modified = (*modified).max(record.modified))
                .or_insert(record.modified);
        }
        Ok(documents)
    }

    /// Stored pages of one document, ascending by page number.
    pub fn pages_of(&self, path: &str) -> Result<Vec<PageRecord>, IndexError> {
        let searcher = self.searcher()?;
        let query = tantivy::query::TermQuery::new(
            Term::from_field_text(self.schema.path, path),
            IndexRecordOption::Basic,
        );
        let addresses = searcher.search(&query, &DocSetCollector)?;

        let mut pages = addresses
            .into_iter()
            .map(|address| {
                let stored: TantivyDocument = searcher.doc(address)?;
                self.schema.to_record(&stored)
            })
            .collect::<Result<Vec<_>, IndexError>>()?;
        pages.sort_by_key(|page| page.page_num);
        Ok(pages)
    }
}

/// Exclusive write handle. Nothing added becomes visible until [`PageWriter::commit`].
pub struct PageWriter {
    writer: IndexWriter<TantivyDocument>,
    schema: PageSchema,
    segmenter: &'static str,
    pending: usize,
}

impl PageWriter {
    pub fn add(&mut self, record: &PageRecord) -> Result<(), IndexError> {
        self.writer.add_document(self.schema.to_document(record))?;
        self.pending += 1;
        Ok(())
    }

    /// Deletes every page of `path` added before this call, including pages added
    /// earlier through this writer. Pages added afterwards are kept.
    pub fn remove_document(&mut self, path: &str) {
        self.writer
            .delete_term(Term::from_field_text(self.schema.path, path));
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Publishes every change atomically and records the segmenter in the commit.
    pub fn commit(mut self) -> Result<usize, IndexError> {
        let mut prepared = self.writer.prepare_commit()?;
        prepared.set_payload(&format!("{SEGMENTER_PAYLOAD_PREFIX}{}", self.segmenter));
        prepared.commit()?;
        self.writer.wait_merging_threads()?;
        Ok(self.pending)
    }

    /// Drops every uncommitted change and releases the writer lock.
    pub fn discard(mut self) -> Result<(), IndexError> {
        self.writer.rollback()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::{Segment, Segmenter, SimpleSegmenter};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn record(path: &str, page_num: u32, text: &str) -> PageRecord {
        PageRecord {
            title: "doc.pdf".to_string(),
            content: text.to_string(),
            raw_content: text.to_string(),
            path: path.to_string(),
            page_num,
            modified: 7,
        }
    }

    #[test]
    fn open_existing_without_index_is_unavailable() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let missing = dir.path().join("index");

        assert!(!PageIndex::exists(&missing));
        let result = PageIndex::open_existing(&missing, &PageTokenizer::degraded());

        assert!(matches!(result, Err(IndexError::Unavailable { .. })));
        Ok(())
    }

    #[test]
    fn committed_records_round_trip_stored_fields() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let tokenizer = PageTokenizer::degraded();
        let index = PageIndex::create(dir.path(), &tokenizer)?;

        let mut writer = index.writer(20_000_000)?;
        writer.add(&record("/docs/a.pdf", 2, "second page"))?;
        writer.add(&record("/docs/a.pdf", 1, "first page"))?;
        assert_eq!(writer.commit()?, 2);

        let reopened = PageIndex::open_existing(dir.path(), &tokenizer)?;
        let pages = reopened.pages_of("/docs/a.pdf")?;

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].page_num, 1);
        assert_eq!(pages[0].raw_content, "first page");
        assert_eq!(pages[1].title, "doc.pdf");
        assert!(pages[1].content.is_empty());
        Ok(())
    }

    #[test]
    fn uncommitted_writes_are_invisible_to_searchers() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let index = PageIndex::create(dir.path(), &PageTokenizer::degraded())?;

        let mut writer = index.writer(20_000_000)?;
        writer.add(&record("/docs/a.pdf", 1, "draft"))?;
        let before_commit = index.searcher()?;
        assert_eq!(before_commit.num_docs(), 0);

        writer.commit()?;
        assert_eq!(before_commit.num_docs(), 0);
        assert_eq!(index.num_pages()?, 1);
        Ok(())
    }

    #[test]
    fn discarded_writer_leaves_index_unchanged() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let index = PageIndex::create(dir.path(), &PageTokenizer::degraded())?;

        let mut writer = index.writer(20_000_000)?;
        writer.add(&record("/docs/a.pdf", 1, "kept"))?;
        writer.commit()?;

        let mut writer = index.writer(20_000_000)?;
        writer.remove_document("/docs/a.pdf");
        writer.add(&record("/docs/b.pdf", 1, "dropped"))?;
        writer.discard()?;

        assert_eq!(index.num_pages()?, 1);
        assert_eq!(index.pages_of("/docs/a.pdf")?.len(), 1);
        Ok(())
    }

    #[test]
    fn only_one_writer_at_a_time() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let index = PageIndex::create(dir.path(), &PageTokenizer::degraded())?;

        let first = index.writer(20_000_000)?;
        assert!(index.writer(20_000_000).is_err());

        first.discard()?;
        assert!(index.writer(20_000_000).is_ok());
        Ok(())
    }

    #[test]
    fn indexed_documents_reports_paths_and_mtimes() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let index = PageIndex::create(dir.path(), &PageTokenizer::degraded())?;

        let mut writer = index.writer(20_000_000)?;
        writer.add(&record("/docs/a.pdf", 1, "one"))?;
        writer.add(&record("/docs/a.pdf", 2, "two"))?;
        writer.add(&record("/docs/b.pdf", 1, "three"))?;
        writer.commit()?;

        let documents = index.indexed_documents()?;
        assert_eq!(documents.len(), 2);
        assert_eq!(documents.get("/docs/a.pdf"), Some(&7));
        Ok(())
    }

    #[test]
    fn create_refuses_directories_holding_other_files() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let thesis = dir.path().join("thesis.pdf");
        fs::write(&thesis, b"not an index")?;

        let result = PageIndex::create(dir.path(), &PageTokenizer::degraded());

        assert!(matches!(result, Err(IndexError::NotAnIndex { .. })));
        assert!(thesis.exists());
        Ok(())
    }

    #[test]
    fn create_replaces_an_existing_index() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let tokenizer = PageTokenizer::degraded();
        let index = PageIndex::create(dir.path(), &tokenizer)?;
        let mut writer = index.writer(20_000_000)?;
        writer.add(&record("/docs/a.pdf", 1, "old"))?;
        writer.commit()?;
        drop(index);

        let recreated = PageIndex::create(dir.path(), &tokenizer)?;

        assert_eq!(recreated.num_pages()?, 0);
        Ok(())
    }

    struct WhitespaceSegmenter;

    impl Segmenter for WhitespaceSegmenter {
        fn name(&self) -> &'static str {
            "whitespace"
        }

        fn segment(&self, text: &str) -> Vec<Segment> {
            SimpleSegmenter.segment(text)
        }
    }

    #[test]
    fn opening_with_another_segmenter_is_refused() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let index = PageIndex::create(dir.path(), &PageTokenizer::degraded())?;
        let mut writer = index.writer(20_000_000)?;
        writer.add(&record("/docs/a.pdf", 1, "text"))?;
        writer.commit()?;

        let same = PageIndex::open_existing(dir.path(), &PageTokenizer::degraded())?;
        assert_eq!(same.indexed_segmenter()?.as_deref(), Some("simple"));

        let other = PageTokenizer::with_segmenter(Arc::new(WhitespaceSegmenter));
        let result = PageIndex::open_existing(dir.path(), &other);

        assert!(matches!(
            result,
            Err(IndexError::SegmenterMismatch { ref indexed, ref requested, .. })
                if indexed == "simple" && requested == "whitespace"
        ));
        Ok(())
    }
}
