//! Word segmentation for page text.
//!
//! Japanese has no spaces between words, so page text is segmented into
//! morphemes with lindera (IPADIC) before it reaches the index. The same
//! segmenter is registered as the `content` field analyzer so query terms are
//! split the same way pages were. If the dictionary cannot be loaded the
//! tokenizer degrades to the identity transform and the analyzer to
//! alphanumeric runs.

use crate::error::TokenizerUnavailable;
use lindera_core::mode::Mode;
use lindera_dictionary::{DictionaryConfig, DictionaryKind};
use lindera_tokenizer::tokenizer::{Tokenizer as LinderaTokenizer, TokenizerConfig};
use std::sync::{Arc, OnceLock};
use tantivy::tokenizer::{LowerCaser, TextAnalyzer, Token, TokenStream, Tokenizer};
use tracing::{info, warn};

/// Name under which the page analyzer is registered on the index.
pub const CONTENT_TOKENIZER: &str = "page_segmented";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub byte_start: usize,
    pub byte_end: usize,
}

pub trait Segmenter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Splits `text` into word units with byte offsets into `text`.
    fn segment(&self, text: &str) -> Vec<Segment>;
}

/// Maximal runs of alphanumeric characters.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleSegmenter;

impl Segmenter for SimpleSegmenter {
    fn name(&self) -> &'static str {
        "simple"
    }

    fn segment(&self, text: &str) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut start = None;
        for (offset, ch) in text.char_indices() {
            match (ch.is_alphanumeric(), start) {
                (true, None) => start = Some(offset),
                (false, Some(begin)) => {
                    segments.push(Segment {
                        text: text[begin..offset].to_string(),
                        byte_start: begin,
                        byte_end: offset,
                    });
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(begin) = start {
            segments.push(Segment {
                text: text[begin..].to_string(),
                byte_start: begin,
                byte_end: text.len(),
            });
        }
        segments
    }
}

/// Morphological segmentation backed by the embedded IPADIC dictionary.
pub struct LinderaSegmenter {
    tokenizer: LinderaTokenizer,
}

impl LinderaSegmenter {
    pub fn ipadic() -> Result<Self, TokenizerUnavailable> {
        let config = TokenizerConfig {
            dictionary: DictionaryConfig {
                kind: Some(DictionaryKind::IPADIC),
                path: None,
            },
            user_dictionary: None,
            mode: Mode::Normal,
        };

        let tokenizer = LinderaTokenizer::from_config(config)
            .map_err(|error| TokenizerUnavailable(error.to_string()))?;
        Ok(Self { tokenizer })
    }
}

impl Segmenter for LinderaSegmenter {
    fn name(&self) -> &'static str {
        "lindera-ipadic"
    }

    fn segment(&self, text: &str) -> Vec<Segment> {
        let tokens = match self.tokenizer.tokenize(text) {
            Ok(tokens) => tokens,
            Err(error) => {
                warn!(%error, "segmentation failed, splitting on alphanumeric runs");
                return SimpleSegmenter.segment(text);
            }
        };

        tokens
            .into_iter()
            .filter(|token| token.text.chars().any(char::is_alphanumeric))
            .map(|token| Segment {
                text: token.text.to_string(),
                byte_start: token.byte_start,
                byte_end: token.byte_end,
            })
            .collect()
    }
}

fn shared_ipadic() -> Option<Arc<LinderaSegmenter>> {
    static IPADIC: OnceLock<Option<Arc<LinderaSegmenter>>> = OnceLock::new();
    IPADIC
        .get_or_init(|| match LinderaSegmenter::ipadic() {
            Ok(segmenter) => {
                info!("loaded ipadic segmenter");
                Some(Arc::new(segmenter))
            }
            Err(error) => {
                warn!(%error, "word segmentation disabled, indexing raw page text");
                None
            }
        })
        .clone()
}

/// Turns raw page text into the whitespace-joined token stream stored in `content`.
#[derive(Clone)]
pub struct PageTokenizer {
    segmenter: Arc<dyn Segmenter>,
    identity: bool,
}

impl PageTokenizer {
    /// Japanese segmentation, or the degraded tokenizer when the dictionary is unavailable.
    pub fn japanese() -> Self {
        match shared_ipadic() {
            Some(segmenter) => Self {
                segmenter,
                identity: false,
            },
            None => Self::degraded(),
        }
    }

    /// Identity transform for `content`, alphanumeric runs for the analyzer.
    pub fn degraded() -> Self {
        Self {
            segmenter: Arc::new(SimpleSegmenter),
            identity: true,
        }
    }

    pub fn with_segmenter(segmenter: Arc<dyn Segmenter>) -> Self {
        Self {
            segmenter,
            identity: false,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.identity
    }

    pub fn segmenter_name(&self) -> &'static str {
        self.segmenter.name()
    }

    pub fn tokenize(&self, text: &str) -> String {
        if self.identity {
            return text.to_string();
        }

        self.segmenter
            .segment(text)
            .into_iter()
            .map(|segment| segment.text)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Analyzer for the `content` field: segmentation followed by lowercasing.
    pub fn analyzer(&self) -> TextAnalyzer {
        TextAnalyzer::builder(SegmentTokenizer {
            segmenter: Arc::clone(&self.segmenter),
        })
        .filter(LowerCaser)
        .build()
    }
}

#[derive(Clone)]
struct SegmentTokenizer {
    segmenter: Arc<dyn Segmenter>,
}

impl Tokenizer for SegmentTokenizer {
    type TokenStream<'a> = SegmentTokenStream;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> Self::TokenStream<'a> {
        let tokens = self
            .segmenter
            .segment(text)
            .into_iter()
            .enumerate()
            .map(|(position, segment)| Token {
                offset_from: segment.byte_start,
                offset_to: segment.byte_end,
                position,
                text: segment.text,
                position_length: 1,
            })
            .collect();

        SegmentTokenStream { tokens, index: 0 }
    }
}

struct SegmentTokenStream {
    tokens: Vec<Token>,
    index: usize,
}

impl TokenStream for SegmentTokenStream {
    fn advance(&mut self) -> bool {
        if self.index < self.tokens.len() {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn token(&self) -> &Token {
        &self.tokens[self.index - 1]
    }

    fn token_mut(&mut self) -> &mut Token {
        &mut self.tokens[self.index - 1]
    }
}
