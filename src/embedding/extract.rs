//! Text extraction from stored blobs using format-specific parsers.
//!
//! Text-ish formats are read directly, HTML is tag-stripped, and PDFs
//! go through the external `pdftotext`/`pdfinfo` tools.

use std::path::Path;
use std::process::Command;

use thiserror::Error;

use crate::models::{DocMeta, DocumentKind};

/// Errors that can occur during text extraction.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("external tool not found: {0}")]
    ToolNotFound(String),

    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("document produced no text content")]
    EmptyDocument,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of text extraction.
#[derive(Debug)]
pub struct Extraction {
    /// Extracted text content.
    pub text: String,
    /// Parser-derived metadata.
    pub meta: DocMeta,
}

/// Handle command output, extracting stdout on success or returning the
/// appropriate error.
fn handle_cmd_output(
    result: std::io::Result<std::process::Output>,
    tool_name: &str,
) -> Result<String, ExtractionError> {
    match result {
        Ok(output) => {
            if output.status.success() {
                Ok(String::from_utf8_lossy(&output.stdout).to_string())
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(ExtractionError::ExtractionFailed(format!(
                    "{}: {}",
                    tool_name, stderr
                )))
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ExtractionError::ToolNotFound(tool_name.to_string()))
        }
        Err(e) => Err(ExtractionError::Io(e)),
    }
}

/// Extract text and metadata from a stored blob.
pub fn extract(path: &Path, kind: DocumentKind) -> Result<Extraction, ExtractionError> {
    let extraction = match kind {
        DocumentKind::Text | DocumentKind::Markdown | DocumentKind::Csv | DocumentKind::Json => {
            let text = std::fs::read_to_string(path)?;
            let title = leading_title(&text);
            Extraction {
                text,
                meta: DocMeta {
                    title,
                    page_count: None,
                },
            }
        }
        DocumentKind::Html => {
            let raw = std::fs::read_to_string(path)?;
            extract_html(&raw)
        }
        DocumentKind::Pdf => extract_pdf(path)?,
    };

    if extraction.text.trim().is_empty() {
        return Err(ExtractionError::EmptyDocument);
    }
    Ok(extraction)
}

/// Strip tags from an HTML document, preferring `<title>` for metadata.
fn extract_html(raw: &str) -> Extraction {
    let document = scraper::Html::parse_document(raw);

    let title = scraper::Selector::parse("title")
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
        })
        .filter(|t| !t.is_empty());

    let mut text = String::new();
    collect_text(*document.root_element(), &mut text);

    let title = title.or_else(|| leading_title(&text));
    Extraction {
        text,
        meta: DocMeta {
            title,
            page_count: None,
        },
    }
}

/// Walk the DOM collecting text nodes, skipping non-content subtrees.
fn collect_text(node: ego_tree::NodeRef<'_, scraper::Node>, out: &mut String) {
    match node.value() {
        scraper::Node::Element(element) => {
            if matches!(element.name(), "script" | "style" | "title" | "noscript") {
                return;
            }
        }
        scraper::Node::Text(fragment) => {
            let fragment = fragment.trim();
            if !fragment.is_empty() {
                out.push_str(fragment);
                out.push('\n');
            }
        }
        _ => {}
    }
    for child in node.children() {
        collect_text(child, out);
    }
}

/// Extract PDF text with `pdftotext`; page count via `pdfinfo` when
/// available, falling back to counting form feeds in the output.
fn extract_pdf(path: &Path) -> Result<Extraction, ExtractionError> {
    let output = Command::new("pdftotext")
        .arg("-layout")
        .arg(path)
        .arg("-") // stdout
        .output();
    let text = handle_cmd_output(output, "pdftotext")?;

    let page_count = pdf_page_count(path)
        .or_else(|| Some(text.matches('\u{c}').count() as u32 + 1))
        .filter(|_| !text.is_empty());

    let title = leading_title(&text);
    Ok(Extraction {
        text,
        meta: DocMeta { title, page_count },
    })
}

/// Get PDF page count using pdfinfo.
fn pdf_page_count(path: &Path) -> Option<u32> {
    let output = Command::new("pdfinfo").arg(path).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    for line in stdout.lines() {
        if line.starts_with("Pages:") {
            return line.split_whitespace().nth(1).and_then(|s| s.parse().ok());
        }
    }
    None
}

/// First non-empty line, de-marked-up, capped to a sane title length.
fn leading_title(text: &str) -> Option<String> {
    let line = text
        .lines()
        .map(|l| l.trim().trim_start_matches('#').trim())
        .find(|l| !l.is_empty())?;
    let title: String = line.chars().take(120).collect();
    Some(title)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(content: &str, suffix: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_extract_plain_text() {
        let file = write_temp("First line\nsecond line\n", ".txt");
        let extraction = extract(file.path(), DocumentKind::Text).unwrap();
        assert_eq!(extraction.text, "First line\nsecond line\n");
        assert_eq!(extraction.meta.title.as_deref(), Some("First line"));
        assert_eq!(extraction.meta.page_count, None);
    }

    #[test]
    fn test_extract_markdown_title_strips_heading_marks() {
        let file = write_temp("# Quarterly Report\n\nbody\n", ".md");
        let extraction = extract(file.path(), DocumentKind::Markdown).unwrap();
        assert_eq!(extraction.meta.title.as_deref(), Some("Quarterly Report"));
    }

    #[test]
    fn test_extract_html_strips_tags_and_scripts() {
        let html = "<html><head><title>Page Title</title>\
                    <script>var x = 1;</script></head>\
                    <body><h1>Heading</h1><p>Paragraph text.</p>\
                    <script>ignored()</script></body></html>";
        let file = write_temp(html, ".html");
        let extraction = extract(file.path(), DocumentKind::Html).unwrap();
        assert_eq!(extraction.meta.title.as_deref(), Some("Page Title"));
        assert!(extraction.text.contains("Heading"));
        assert!(extraction.text.contains("Paragraph text."));
        assert!(!extraction.text.contains("var x"));
        assert!(!extraction.text.contains("ignored()"));
    }

    #[test]
    fn test_empty_document_is_an_error() {
        let file = write_temp("   \n\t\n", ".txt");
        let err = extract(file.path(), DocumentKind::Text);
        assert!(matches!(err, Err(ExtractionError::EmptyDocument)));
    }

    #[test]
    fn test_leading_title_caps_length() {
        let long = "x".repeat(500);
        let title = leading_title(&long).unwrap();
        assert_eq!(title.chars().count(), 120);
    }
}
