use crate::error::ExtractionError;
use crate::types::PageText;

/// Extract page-scoped plain text from PDF bytes.
///
/// Pages are returned in document order, 1-indexed. A page with no
/// extractable text is returned with empty text rather than failing the
/// whole document; callers exclude such pages from chunking. Fails with
/// `Corrupt` when the container cannot be parsed, `Encrypted` for
/// password-protected files, and `Empty` when no page in the document
/// yields any text.
pub fn extract_pages(pdf_bytes: &[u8]) -> Result<Vec<PageText>, ExtractionError> {
    if !pdf_bytes.starts_with(b"%PDF-") {
        return Err(ExtractionError::Corrupt(
            "missing %PDF- header".to_string(),
        ));
    }

    let raw_pages =
        pdf_extract::extract_text_from_mem_by_pages(pdf_bytes).map_err(classify_error)?;

    let pages: Vec<PageText> = raw_pages
        .into_iter()
        .enumerate()
        .map(|(i, raw)| PageText {
            page_number: i + 1,
            text: normalize_page_text(&raw),
        })
        .collect();

    if pages.iter().all(|p| p.is_empty()) {
        return Err(ExtractionError::Empty);
    }

    let empty_pages = pages.iter().filter(|p| p.is_empty()).count();
    tracing::debug!(
        pages = pages.len(),
        empty_pages,
        "extracted text from PDF"
    );

    Ok(pages)
}

fn classify_error(err: pdf_extract::OutputError) -> ExtractionError {
    let message = err.to_string();
    if message.to_ascii_lowercase().contains("encrypt") {
        ExtractionError::Encrypted
    } else {
        ExtractionError::Corrupt(message)
    }
}

/// Normalize raw extracted page text
///
/// PDF extraction tends to produce trailing spaces and runs of blank lines
/// where the layout engine left vertical gaps. Collapse those so chunk
/// boundaries land on real content.
fn normalize_page_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut blank_run = 0usize;

    for line in raw.lines() {
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            blank_run += 1;
            // Keep at most one blank line; a gap is a paragraph boundary
            if blank_run == 1 && !out.is_empty() {
                out.push('\n');
            }
            continue;
        }
        blank_run = 0;
        out.push_str(trimmed);
        out.push('\n');
    }

    while out.ends_with('\n') {
        out.pop();
    }

    out
}
