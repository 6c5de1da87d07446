use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::PathBuf;

/// Text of one physical page, numbered from 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// One indexed page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageRecord {
    pub title: String,
    /// Segmented text used for matching only.
    pub content: String,
    pub raw_content: String,
    pub path: String,
    pub page_num: u32,
    /// Source modification time in microseconds since the unix epoch.
    pub modified: i64,
}

/// Matched page of a query before grouping.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub record: PageRecord,
    pub score: f32,
    /// Byte ranges of matched terms in `record.raw_content`. Empty when
    /// highlighting was unavailable for the query.
    pub matched: Vec<Range<usize>>,
}

/// Highlighted text block. `highlighted` holds byte ranges into `text`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snippet {
    pub text: String,
    pub highlighted: Vec<Range<usize>>,
    pub truncated: bool,
}

impl Snippet {
    pub const ELISION: &'static str = "...";

    pub fn plain(text: String, truncated: bool) -> Self {
        Self {
            text,
            highlighted: Vec::new(),
            truncated,
        }
    }

    /// Renders the snippet as HTML with matches wrapped in `<b>`.
    pub fn to_html(&self) -> String {
        let mut html = String::with_capacity(self.text.len() + self.highlighted.len() * 7);
        let mut cursor = 0;
        for range in &self.highlighted {
            html.push_str(&escape_html(&self.text[cursor..range.start]));
            html.push_str("<b>");
            html.push_str(&escape_html(&self.text[range.clone()]));
            html.push_str("</b>");
            cursor = range.end;
        }
        html.push_str(&escape_html(&self.text[cursor..]));
        if self.truncated {
            html.push_str(Self::ELISION);
        }
        html
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// All matching pages of one source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultGroup {
    pub title: String,
    pub path: String,
    /// Ascending, deduplicated.
    pub page_nums: Vec<u32>,
    pub snippet: Snippet,
    pub best_score: f32,
}

impl ResultGroup {
    pub fn page_list(&self) -> String {
        self.page_nums
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum IndexMode {
    /// Drop the index and re-extract every document.
    #[default]
    Rebuild,
    /// Keep the index, re-extract changed documents and prune removed ones.
    Incremental,
}

#[derive(Debug, Clone)]
pub struct IndexingOptions {
    pub mode: IndexMode,
    pub workers: usize,
    pub writer_memory_bytes: usize,
}

impl IndexingOptions {
    pub fn default_workers() -> usize {
        std::thread::available_parallelism()
            .map(|count| count.get())
            .unwrap_or(1)
            .min(4)
    }
}

impl Default for IndexingOptions {
    fn default() -> Self {
        Self {
            mode: IndexMode::Rebuild,
            workers: Self::default_workers(),
            writer_memory_bytes: 50_000_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Raw page hits fetched from the index before grouping.
    pub hit_cap: usize,
    /// Characters of concatenated page text considered for highlighting.
    pub snippet_max_chars: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            hit_cap: 50,
            snippet_max_chars: 1_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct IndexingReport {
    /// Documents that contributed at least one page record.
    pub indexed: usize,
    pub pages: usize,
    /// Documents left untouched because their modification time did not change.
    pub unchanged: usize,
    /// Paths whose records were dropped without replacement: gone from the
    /// document set, or changed and no longer yielding any page.
    pub removed: usize,
    pub skipped: Vec<SkippedPdf>,
    pub committed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_html_escapes_and_marks_matches() {
        let snippet = Snippet {
            text: "a <b> invoice & co".to_string(),
            highlighted: vec![6..13],
            truncated: true,
        };

        assert_eq!(
            snippet.to_html(),
            "a &lt;b&gt; <b>invoice</b> &amp; co..."
        );
    }

    #[test]
    fn page_list_is_comma_separated() {
        let group = ResultGroup {
            title: "a.pdf".to_string(),
            path: "/tmp/a.pdf".to_string(),
            page_nums: vec![2, 5, 10],
            snippet: Snippet::default(),
            best_score: 1.0,
        };

        assert_eq!(group.page_list(), "2,5,10");
    }

    #[test]
    fn default_workers_is_bounded() {
        let workers = IndexingOptions::default_workers();
        assert!((1..=4).contains(&workers));
    }
}
