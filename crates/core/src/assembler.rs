use crate::error::AssembleError;
use lopdf::Document;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

/// Copies `pages` (1-based, any order, duplicates allowed) of the PDF at
/// `source` into a new in-memory PDF, ascending and deduplicated.
///
/// `source` is trusted: confining it to an allowed directory is the caller's job.
/// The source file is only read, and is released before this returns.
pub fn assemble_pages(source: &Path, pages: &[u32]) -> Result<Vec<u8>, AssembleError> {
    let path = source.display().to_string();
    let wanted = pages.iter().copied().collect::<BTreeSet<u32>>();
    if wanted.is_empty() {
        return Err(AssembleError::EmptySelection(path));
    }

    let mut document = Document::load(source)?;
    let page_count = document.get_pages().len() as u32;
    if let Some(&page) = wanted
        .iter()
        .find(|&&page| page == 0 || page > page_count)
    {
        return Err(AssembleError::PageRange {
            path,
            page,
            page_count,
        });
    }

    let dropped = (1..=page_count)
        .filter(|page| !wanted.contains(page))
        .collect::<Vec<_>>();
    document.delete_pages(&dropped);
    document.prune_objects();
    document.renumber_objects();

    let mut buffer = Vec::new();
    document.save_to(&mut buffer)?;
    debug!(source = %path, kept = wanted.len(), bytes = buffer.len(), "assembled pages");

    Ok(buffer)
}

/// Download name for a page selection of `source`: `<stem>_selected_pages.pdf`.
pub fn selected_pages_file_name(source: &Path) -> String {
    let stem = source
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("document");
    format!("{stem}_selected_pages.pdf")
}
