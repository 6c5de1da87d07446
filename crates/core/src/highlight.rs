use std::collections::HashSet;
use std::ops::Range;
use tantivy::query::Query;
use tantivy::schema::Field;
use tantivy::tokenizer::TextAnalyzer;
use tantivy::{Index, TantivyError, Term};

/// Marks every occurrence of the query's terms inside a whole block of text,
/// instead of cutting windows around matches.
#[derive(Clone)]
pub struct WholeFragmentHighlighter {
    terms: HashSet<String>,
    analyzer: TextAnalyzer,
}

impl WholeFragmentHighlighter {
    pub fn for_query(index: &Index, query: &dyn Query, field: Field) -> Result<Self, TantivyError> {
        let mut terms = HashSet::new();
        query.query_terms(&mut |term: &Term, _needs_position: bool| {
            if term.field() != field {
                return;
            }
            if let Some(text) = term.value().as_str() {
                terms.insert(text.to_string());
            }
        });

        let analyzer = index.tokenizer_for_field(field)?;
        Ok(Self::new(terms, analyzer))
    }

    pub fn new(terms: HashSet<String>, analyzer: TextAnalyzer) -> Self {
        Self { terms, analyzer }
    }

    pub fn has_terms(&self) -> bool {
        !self.terms.is_empty()
    }

    /// Byte ranges of matched tokens in `text`, ascending, adjacent ranges merged.
    pub fn highlight(&self, text: &str) -> Vec<Range<usize>> {
        let mut analyzer = self.analyzer.clone();
        let mut stream = analyzer.token_stream(text);

        let mut ranges: Vec<Range<usize>> = Vec::new();
        while stream.advance() {
            let token = stream.token();
            if !self.terms.contains(&token.text) {
                continue;
            }
            let range = token.offset_from..token.offset_to;
            match ranges.last_mut() {
                Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
                _ => ranges.push(range),
            }
        }
        ranges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::PageTokenizer;

    fn highlighter(terms: &[&str]) -> WholeFragmentHighlighter {
        WholeFragmentHighlighter::new(
            terms.iter().map(|term| term.to_string()).collect(),
            PageTokenizer::degraded().analyzer(),
        )
    }

    #[test]
    fn marks_every_occurrence_case_insensitively() {
        let text = "Invoice due. Pay the invoice by Friday.";
        let ranges = highlighter(&["invoice"]).highlight(text);

        assert_eq!(ranges, vec![0..7, 21..28]);
        assert_eq!(&text[ranges[1].clone()], "invoice");
    }

    #[test]
    fn unrelated_text_has_no_ranges() {
        assert!(highlighter(&["invoice"]).highlight("receipt only").is_empty());
    }

    #[test]
    fn query_terms_are_collected_from_the_content_field() -> Result<(), Box<dyn std::error::Error>> {
        use crate::store::PageIndex;
        use tantivy::query::QueryParser;

        let dir = tempfile::tempdir()?;
        let index = PageIndex::create(dir.path(), &PageTokenizer::degraded())?;
        let content = index.schema().content;
        let parser = QueryParser::for_index(index.index(), vec![content]);
        let query = parser.parse_query("Invoice AND \"late fee\"")?;

        let highlighter = WholeFragmentHighlighter::for_query(index.index(), &*query, content)?;
        let ranges = highlighter.highlight("a late fee on the invoice");

        assert!(highlighter.has_terms());
        assert_eq!(ranges, vec![2..6, 7..10, 18..25]);
        Ok(())
    }
}
