use crate::error::SearchError;
use crate::highlight::WholeFragmentHighlighter;
use crate::models::{ResultGroup, SearchHit, SearchOptions, Snippet};
use crate::store::PageIndex;
use crate::tokenizer::PageTokenizer;
use std::collections::{BTreeSet, HashMap};
use std::ops::Range;
use std::path::Path;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::{IndexReader, TantivyDocument};
use tracing::{debug, warn};

/// Read path over a built page index.
pub struct QueryEngine {
    index: PageIndex,
    reader: IndexReader,
    options: SearchOptions,
}

impl QueryEngine {
    pub fn open(
        dir: &Path,
        tokenizer: &PageTokenizer,
        options: SearchOptions,
    ) -> Result<Self, SearchError> {
        let index = PageIndex::open_existing(dir, tokenizer)?;
        Self::new(index, options)
    }

    pub fn new(index: PageIndex, options: SearchOptions) -> Result<Self, SearchError> {
        let reader = index.reader()?;
        Ok(Self {
            index,
            reader,
            options,
        })
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// Picks up commits made since the engine was opened.
    pub fn refresh(&self) -> Result<(), SearchError> {
        self.reader.reload()?;
        Ok(())
    }

    /// Runs `query_string` against page content and returns one group per
    /// matching document, documents with more matching pages first.
    ///
    /// Terms are combined with AND unless the query says otherwise.
    pub fn search(
        &self,
        query_string: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ResultGroup>, SearchError> {
        let (hits, highlighter) = self.execute(query_string)?;

        let mut groups = group_hits(hits, self.options.snippet_max_chars, |text| {
            highlighter.as_ref().map(|highlighter| highlighter.highlight(text))
        });
        if let Some(limit) = limit {
            groups.truncate(limit);
        }
        Ok(groups)
    }

    /// Ranked page hits before grouping, each with its matched term ranges.
    pub fn page_hits(&self, query_string: &str) -> Result<Vec<SearchHit>, SearchError> {
        Ok(self.execute(query_string)?.0)
    }

    fn execute(
        &self,
        query_string: &str,
    ) -> Result<(Vec<SearchHit>, Option<WholeFragmentHighlighter>), SearchError> {
        if query_string.trim().is_empty() {
            return Err(SearchError::InvalidQuery {
                query: query_string.to_string(),
                details: "query is empty".to_string(),
            });
        }

        let schema = self.index.schema();
        let mut parser = QueryParser::for_index(self.index.index(), vec![schema.content]);
        parser.set_conjunction_by_default();
        let query = parser
            .parse_query(query_string)
            .map_err(|error| SearchError::InvalidQuery {
                query: query_string.to_string(),
                details: error.to_string(),
            })?;

        let highlighter =
            match WholeFragmentHighlighter::for_query(self.index.index(), &*query, schema.content) {
                Ok(highlighter) => Some(highlighter),
                Err(error) => {
                    warn!(query = query_string, %error, "highlighting unavailable, using plain snippets");
                    None
                }
            };

        let searcher = self.reader.searcher();
        let top_docs = searcher.search(&*query, &TopDocs::with_limit(self.options.hit_cap.max(1)))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let stored: TantivyDocument = searcher.doc(address)?;
            let record = schema.to_record(&stored)?;
            let matched = highlighter
                .as_ref()
                .map(|highlighter| highlighter.highlight(&record.raw_content))
                .unwrap_or_default();
            hits.push(SearchHit {
                record,
                score,
                matched,
            });
        }
        debug!(query = query_string, hits = hits.len(), "page hits");

        Ok((hits, highlighter))
    }
}

/// Groups page hits by document path in encounter order, merges each group's
/// page text into one snippet and orders groups by matching page count.
/// `highlight` returns `None` when highlighting failed for a snippet.
pub fn group_hits<F>(hits: Vec<SearchHit>, snippet_max_chars: usize, highlight: F) -> Vec<ResultGroup>
where
    F: Fn(&str) -> Option<Vec<Range<usize>>>,
{
    let mut order: Vec<Vec<SearchHit>> = Vec::new();
    let mut slots: HashMap<String, usize> = HashMap::new();
    for hit in hits {
        match slots.get(&hit.record.path) {
            Some(&slot) => order[slot].push(hit),
            None => {
                slots.insert(hit.record.path.clone(), order.len());
                order.push(vec![hit]);
            }
        }
    }

    let mut groups = order
        .into_iter()
        .filter_map(|hits| {
            let first = hits.first()?;
            let title = first.record.title.clone();
            let path = first.record.path.clone();

            let combined = hits
                .iter()
                .map(|hit| hit.record.raw_content.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            let (capped, truncated) = truncate_chars(&combined, snippet_max_chars);
            let snippet = match highlight(capped) {
                Some(highlighted) => Snippet {
                    text: capped.to_string(),
                    highlighted,
                    truncated,
                },
                None => Snippet::plain(capped.to_string(), truncated),
            };

            let page_nums = hits
                .iter()
                .map(|hit| hit.record.page_num)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let best_score = hits
                .iter()
                .map(|hit| hit.score)
                .fold(f32::MIN, f32::max);

            Some(ResultGroup {
                title,
                path,
                page_nums,
                snippet,
                best_score,
            })
        })
        .collect::<Vec<_>>();

    groups.sort_by(|left, right| right.page_nums.len().cmp(&left.page_nums.len()));
    groups
}

/// First `max_chars` characters of `text`, and whether anything was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte, _)) => (&text[..byte], true),
        None => (text, false),
    }
}
