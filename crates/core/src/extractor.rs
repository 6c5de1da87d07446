use crate::error::ExtractionError;
use crate::models::PageText;
use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// One way of pulling text out of a single page.
pub type PageStrategy = fn(&Document, u32, ObjectId) -> Result<String, lopdf::Error>;

/// Strategies in the order they are attempted for every page.
pub const PAGE_STRATEGIES: &[(&str, PageStrategy)] = &[
    ("text", extract_plain_text),
    ("blocks", extract_text_blocks),
];

pub trait PdfExtractor {
    /// Returns pages with text in ascending page order, or
    /// [`ExtractionError::NoContent`] when no page yields any text.
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, ExtractionError>;
}

#[derive(Default, Debug, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, ExtractionError> {
        let document = Document::load(path)?;

        let mut pages = Vec::new();
        for (page_no, page_id) in document.get_pages() {
            match first_nonempty(PAGE_STRATEGIES, &document, page_no, page_id) {
                Some(text) => {
                    debug!(path = %path.display(), page = page_no, chars = text.chars().count(), "extracted page");
                    pages.push(PageText {
                        number: page_no,
                        text,
                    });
                }
                None => {
                    warn!(path = %path.display(), page = page_no, "page has no extractable text");
                }
            }
        }

        if pages.is_empty() {
            return Err(ExtractionError::NoContent(path.display().to_string()));
        }

        Ok(pages)
    }
}

pub fn extract_page_texts(path: &Path) -> Result<Vec<PageText>, ExtractionError> {
    LopdfExtractor.extract_pages(path)
}

/// Runs `strategies` in order and returns the first normalized, non-blank result.
/// A strategy that errors is logged and the next one is tried.
pub fn first_nonempty(
    strategies: &[(&str, PageStrategy)],
    document: &Document,
    page_no: u32,
    page_id: ObjectId,
) -> Option<String> {
    for (name, strategy) in strategies {
        match strategy(document, page_no, page_id) {
            Ok(text) => {
                let text = normalize_text(&text);
                if !text.is_empty() {
                    return Some(text);
                }
            }
            Err(error) => {
                warn!(strategy = *name, page = page_no, %error, "page text strategy failed");
            }
        }
    }
    None
}

fn extract_plain_text(
    document: &Document,
    page_no: u32,
    _page_id: ObjectId,
) -> Result<String, lopdf::Error> {
    document.extract_text(&[page_no])
}

/// Concatenates the strings shown inside each `BT .. ET` block of the page
/// content stream, one line per block, in stream order.
fn extract_text_blocks(
    document: &Document,
    _page_no: u32,
    page_id: ObjectId,
) -> Result<String, lopdf::Error> {
    let raw = document.get_page_content(page_id)?;
    let content = Content::decode(&raw)?;

    let mut blocks = Vec::new();
    let mut current = String::new();
    for operation in &content.operations {
        match operation.operator.as_str() {
            "BT" => current.clear(),
            "ET" => {
                if !current.trim().is_empty() {
                    blocks.push(current.trim().to_string());
                }
                current.clear();
            }
            "Tj" | "'" | "\"" => {
                if let Some(Object::String(bytes, _)) = operation.operands.last() {
                    current.push_str(&decode_pdf_string(bytes));
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operation.operands.first() {
                    for item in items {
                        if let Object::String(bytes, _) = item {
                            current.push_str(&decode_pdf_string(bytes));
                        }
                    }
                }
            }
            "T*" => current.push('\n'),
            _ => {}
        }
    }

    Ok(blocks.join("\n"))
}

fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(body) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units = body
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect::<Vec<_>>();
        return String::from_utf16_lossy(&units);
    }
    String::from_utf8_lossy(bytes).into_owned()
}

fn control_chars() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"[\x{FFFD}\p{Cc}&&[^\t\n\r\x{0C}]]").expect("static pattern is valid")
    })
}

/// Drops replacement characters left by undecodable bytes and non-whitespace
/// control characters, then trims.
pub fn normalize_text(text: &str) -> String {
    control_chars().replace_all(text, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{write_pdf, PageSpec};
    use tempfile::tempdir;

    #[test]
    fn extracts_only_pages_with_text() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("mixed.pdf");
        write_pdf(
            &path,
            &[
                PageSpec::text("alpha page"),
                PageSpec::blank(),
                PageSpec::text("gamma page"),
            ],
        )?;

        let pages = extract_page_texts(&path)?;

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].number, 1);
        assert!(pages[0].text.contains("alpha"));
        assert_eq!(pages[1].number, 3);
        assert!(pages[1].text.contains("gamma"));
        Ok(())
    }

    #[test]
    fn document_without_text_is_no_content() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("blank.pdf");
        write_pdf(&path, &[PageSpec::blank(), PageSpec::blank()])?;

        let result = extract_page_texts(&path);

        assert!(matches!(result, Err(ExtractionError::NoContent(_))));
        Ok(())
    }

    #[test]
    fn unreadable_document_is_a_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"%PDF-1.4\n%broken")?;

        let result = extract_page_texts(&path);

        assert!(matches!(result, Err(ExtractionError::PdfParse(_))));
        Ok(())
    }

    #[test]
    fn block_strategy_reads_text_operators() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("blocks.pdf");
        write_pdf(&path, &[PageSpec::text("block level text")])?;

        let document = Document::load(&path)?;
        let (page_no, page_id) = document
            .get_pages()
            .into_iter()
            .next()
            .ok_or("document has no pages")?;

        let text = extract_text_blocks(&document, page_no, page_id)?;
        assert_eq!(text, "block level text");
        Ok(())
    }

    #[test]
    fn strategies_fall_through_on_empty_and_error() -> Result<(), Box<dyn std::error::Error>> {
        fn empty(_: &Document, _: u32, _: ObjectId) -> Result<String, lopdf::Error> {
            Ok("  \n ".to_string())
        }
        fn failing(_: &Document, _: u32, _: ObjectId) -> Result<String, lopdf::Error> {
            Err(lopdf::Error::from(std::io::Error::other("corrupt page")))
        }
        fn fallback(_: &Document, _: u32, _: ObjectId) -> Result<String, lopdf::Error> {
            Ok("from fallback\u{FFFD}".to_string())
        }

        let document = Document::with_version("1.5");
        let strategies: &[(&str, PageStrategy)] =
            &[("empty", empty), ("failing", failing), ("fallback", fallback)];

        let text = first_nonempty(strategies, &document, 1, (1, 0));
        assert_eq!(text.as_deref(), Some("from fallback"));

        let none: &[(&str, PageStrategy)] = &[("empty", empty), ("failing", failing)];
        assert_eq!(first_nonempty(none, &document, 1, (1, 0)), None);
        Ok(())
    }

    #[test]
    fn normalize_drops_undecodable_and_control_characters() {
        let raw = String::from_utf8_lossy(b"\x00 caf\xff\xfee total\x07\n next ");
        assert_eq!(normalize_text(&raw), "cafe total\n next");
    }

    #[test]
    fn utf16_strings_are_decoded() {
        let bytes = [0xFE, 0xFF, 0x30, 0x42, 0x30, 0x44];
        assert_eq!(decode_pdf_string(&bytes), "あい");
    }
}
