//! Builds small multi-page PDFs for tests.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct PageSpec {
    lines: Vec<String>,
}

impl PageSpec {
    pub fn text(text: &str) -> Self {
        Self {
            lines: vec![text.to_string()],
        }
    }

    pub fn blank() -> Self {
        Self { lines: Vec::new() }
    }
}

pub fn build_pdf(pages: &[PageSpec]) -> Result<Document, lopdf::Error> {
    let mut document = Document::with_version("1.5");
    let pages_id = document.new_object_id();
    let font_id = document.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = document.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for page in pages {
        let mut operations = Vec::new();
        for (line_no, line) in page.lines.iter().enumerate() {
            let y = 700 - (line_no as i64) * 20;
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec!["F1".into(), 12.into()]));
            operations.push(Operation::new("Td", vec![72.into(), y.into()]));
            operations.push(Operation::new(
                "Tj",
                vec![Object::string_literal(line.as_str())],
            ));
            operations.push(Operation::new("ET", vec![]));
        }
        let content = Content { operations };
        let content_id = document.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    document.trailer.set("Root", catalog_id);

    Ok(document)
}

pub fn write_pdf(path: &Path, pages: &[PageSpec]) -> Result<(), Box<dyn std::error::Error>> {
    let mut document = build_pdf(pages)?;
    document.save(path)?;
    Ok(())
}

/// One page per entry, each starting with a `page<n>` marker word.
pub fn numbered_pages(extra: &[&str]) -> Vec<PageSpec> {
    extra
        .iter()
        .enumerate()
        .map(|(index, text)| PageSpec::text(format!("page{} {}", index + 1, text).trim()))
        .collect()
}
