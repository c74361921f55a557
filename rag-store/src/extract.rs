//! Text extraction: raw upload bytes → text blocks with structural hints.
//!
//! The pipeline only depends on [`TextExtractor`]; the shipped
//! [`PlainTextExtractor`] handles plain text and Markdown.

use std::path::Path;

use crate::errors::RagError;

/// Supported upload types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileType {
    Text,
    Markdown,
}

impl FileType {
    /// Resolves a type from an extension or a file name (`notes.md`, `txt`).
    pub fn from_name(name: &str) -> Result<Self, RagError> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or(name);
        match ext.to_ascii_lowercase().as_str() {
            "txt" | "text" => Ok(Self::Text),
            "md" | "markdown" => Ok(Self::Markdown),
            other => Err(RagError::UnsupportedFileType(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Markdown => "md",
        }
    }
}

/// Structural role of a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockKind {
    Heading,
    Body,
}

impl BlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Heading => "heading",
            Self::Body => "body",
        }
    }
}

/// One run of text with its structural hint.
#[derive(Clone, Debug, PartialEq)]
pub struct TextBlock {
    pub text: String,
    pub kind: BlockKind,
    /// Nearest heading above this block (the heading itself for heading blocks).
    pub heading: Option<String>,
}

/// Extractor output.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExtractedDocument {
    pub blocks: Vec<TextBlock>,
    /// Title declared by the document itself (Markdown `# H1`).
    pub title_hint: Option<String>,
}

/// Turns upload bytes into text blocks.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8], file_type: FileType) -> Result<ExtractedDocument, RagError>;
}

/// UTF-8 plain text and Markdown.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8], file_type: FileType) -> Result<ExtractedDocument, RagError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| RagError::Extraction(format!("invalid UTF-8: {e}")))?;

        Ok(match file_type {
            FileType::Text => ExtractedDocument {
                blocks: vec![TextBlock {
                    text: text.to_string(),
                    kind: BlockKind::Body,
                    heading: None,
                }],
                title_hint: None,
            },
            FileType::Markdown => markdown_blocks(text),
        })
    }
}

fn markdown_blocks(text: &str) -> ExtractedDocument {
    let mut doc = ExtractedDocument::default();
    let mut heading: Option<String> = None;
    let mut body = String::new();

    for line in text.lines() {
        match atx_heading(line) {
            Some((level, title)) => {
                push_body(&mut doc.blocks, &mut body, &heading);
                if level == 1 && doc.title_hint.is_none() {
                    doc.title_hint = Some(title.to_string());
                }
                heading = Some(title.to_string());
                doc.blocks.push(TextBlock {
                    text: title.to_string(),
                    kind: BlockKind::Heading,
                    heading: heading.clone(),
                });
            }
            None => {
                body.push_str(line);
                body.push('\n');
            }
        }
    }
    push_body(&mut doc.blocks, &mut body, &heading);
    doc
}

fn push_body(blocks: &mut Vec<TextBlock>, body: &mut String, heading: &Option<String>) {
    if !body.trim().is_empty() {
        blocks.push(TextBlock {
            text: std::mem::take(body),
            kind: BlockKind::Body,
            heading: heading.clone(),
        });
    }
    body.clear();
}

/// `# Title` … `###### Title`; returns the level and the trimmed title.
fn atx_heading(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_start();
    let level = trimmed.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &trimmed[level..];
    if !rest.is_empty() && !rest.starts_with(' ') {
        return None;
    }
    let title = rest.trim().trim_end_matches('#').trim();
    (!title.is_empty()).then_some((level, title))
}

/// First line of `text` when it looks like a title.
///
/// Short (≤100 chars), no trailing `.`/`!`/`?`, starts uppercase, and does not
/// open with a common sentence starter.
pub fn title_from_content(text: &str) -> Option<String> {
    let first = text.trim().lines().next()?.trim();
    let last = first.chars().last()?;
    let head = first.chars().next()?;
    let lower = first.to_lowercase();

    let looks_like_title = first.chars().count() <= 100
        && !matches!(last, '.' | '!' | '?')
        && head.is_uppercase()
        && !["the ", "this ", "just ", "test "]
            .iter()
            .any(|p| lower.starts_with(p));

    looks_like_title.then(|| first.to_string())
}

/// Title precedence: declared hint, then first-line heuristic, then the file stem.
pub fn resolve_title(doc: &ExtractedDocument, declared_name: &str) -> String {
    if let Some(hint) = doc.title_hint.as_deref().filter(|h| !h.trim().is_empty()) {
        return hint.trim().to_string();
    }
    if let Some(first) = doc.blocks.first().and_then(|b| title_from_content(&b.text)) {
        return first;
    }
    Path::new(declared_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(declared_name)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_types() {
        assert_eq!(FileType::from_name("notes.MD").unwrap(), FileType::Markdown);
        assert_eq!(FileType::from_name("txt").unwrap(), FileType::Text);
        assert!(matches!(
            FileType::from_name("report.pdf"),
            Err(RagError::UnsupportedFileType(_))
        ));
    }

    #[test]
    fn invalid_utf8_is_extraction_error() {
        let err = PlainTextExtractor
            .extract(&[0xff, 0xfe, 0x00], FileType::Text)
            .unwrap_err();
        assert!(matches!(err, RagError::Extraction(_)));
    }

    #[test]
    fn markdown_headings_become_blocks() {
        let md = "# Guide\n\nIntro text.\n\n## Install\nRun the installer.\n";
        let doc = PlainTextExtractor
            .extract(md.as_bytes(), FileType::Markdown)
            .unwrap();

        assert_eq!(doc.title_hint.as_deref(), Some("Guide"));
        let kinds: Vec<_> = doc.blocks.iter().map(|b| b.kind).collect();
        assert_eq!(
            kinds,
            vec![
                BlockKind::Heading,
                BlockKind::Body,
                BlockKind::Heading,
                BlockKind::Body
            ]
        );
        assert_eq!(doc.blocks[3].heading.as_deref(), Some("Install"));
        assert!(atx_heading("#hashtag").is_none());
    }

    #[test]
    fn title_heuristic() {
        assert_eq!(
            title_from_content("Quarterly Report\nBody text."),
            Some("Quarterly Report".into())
        );
        assert_eq!(title_from_content("The results are in"), None);
        assert_eq!(title_from_content("Ends with a period."), None);
        assert_eq!(title_from_content("lowercase start"), None);
    }

    #[test]
    fn title_falls_back_to_stem() {
        let doc = PlainTextExtractor
            .extract(b"this is plain prose.", FileType::Text)
            .unwrap();
        assert_eq!(resolve_title(&doc, "meeting-notes.txt"), "meeting-notes");
    }
}
