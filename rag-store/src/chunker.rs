//! Splits cleaned document text into ordered, overlapping chunks.
//!
//! 1. Blocks are cleaned and joined with blank lines into one document text.
//! 2. The text is split recursively on `"\n\n"`, `"\n"`, sentence punctuation,
//!    `" "` and finally single characters. A finer tier is used only for pieces
//!    that are still larger than `chunk_size`. Pieces keep their separator, so
//!    they tile the text exactly.
//! 3. Pieces merge greedily up to `chunk_size`. Each following chunk starts with
//!    the longest word-aligned tail of the previous one that fits `chunk_overlap`.
//!
//! Offsets stored on chunks are char offsets into the cleaned text.

use std::ops::Range;

use tracing::debug;
use unicode_segmentation::UnicodeSegmentation;

use crate::config::{ChunkingConfig, SizeUnit};
use crate::errors::RagError;
use crate::extract::{BlockKind, ExtractedDocument, FileType};
use crate::normalize::{clean_text, collapse_whitespace};
use crate::record::DocumentChunk;

const SEPARATORS: [&str; 9] = ["\n\n", "\n", ".", "!", "?", ";", ":", " ", ""];

/// Cleaned document text plus the byte span of every block inside it.
pub(crate) struct Assembled {
    pub text: String,
    blocks: Vec<BlockSpan>,
}

struct BlockSpan {
    range: Range<usize>,
    kind: BlockKind,
    heading: Option<String>,
}

/// Cleaned text plus the byte span of every size unit in it, so the size of
/// any range is two binary searches instead of a rescan.
struct Measured<'a> {
    text: &'a str,
    units: Vec<Range<usize>>,
}

impl<'a> Measured<'a> {
    fn new(text: &'a str, unit: SizeUnit) -> Self {
        let units = match unit {
            SizeUnit::Char => text
                .char_indices()
                .map(|(i, c)| i..i + c.len_utf8())
                .collect(),
            SizeUnit::Token => text
                .split_word_bound_indices()
                .filter(|(_, w)| !w.trim().is_empty())
                .map(|(i, w)| i..i + w.len())
                .collect(),
        };
        Self { text, units }
    }

    /// Units overlapping `start..end`; a word cut by either edge still counts.
    fn size(&self, start: usize, end: usize) -> usize {
        let first = self.units.partition_point(|u| u.end <= start);
        let last = self.units.partition_point(|u| u.start < end);
        last.saturating_sub(first)
    }
}

/// Byte spans of one chunk; `core_start` is where its non-overlapping part begins.
#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    core_start: usize,
    end: usize,
}

pub(crate) fn assemble(doc: &ExtractedDocument) -> Assembled {
    let mut text = String::new();
    let mut blocks = Vec::with_capacity(doc.blocks.len());
    for block in &doc.blocks {
        let cleaned = clean_text(&block.text);
        if cleaned.is_empty() {
            continue;
        }
        if !text.is_empty() {
            text.push_str("\n\n");
        }
        let start = text.len();
        text.push_str(&cleaned);
        blocks.push(BlockSpan {
            range: start..text.len(),
            kind: block.kind,
            heading: block.heading.clone(),
        });
    }
    Assembled { text, blocks }
}

/// Chunker bound to one validated [`ChunkingConfig`].
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    cfg: ChunkingConfig,
}

impl Chunker {
    /// # Errors
    /// [`RagError::Validation`] when the config is out of bounds.
    pub fn new(cfg: ChunkingConfig) -> Result<Self, RagError> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    pub fn config(&self) -> ChunkingConfig {
        self.cfg
    }

    /// Size of `s` in the configured unit.
    pub fn measure(&self, s: &str) -> usize {
        match self.cfg.unit {
            SizeUnit::Char => s.chars().count(),
            SizeUnit::Token => s
                .split_word_bounds()
                .filter(|w| !w.trim().is_empty())
                .count(),
        }
    }

    /// Chunks a whole document. All-or-nothing: either every chunk or an error.
    ///
    /// # Errors
    /// [`RagError::Chunking`] when nothing but whitespace or punctuation remains.
    pub fn chunk(
        &self,
        doc: &ExtractedDocument,
        source_id: &str,
        title: &str,
        file_type: FileType,
    ) -> Result<Vec<DocumentChunk>, RagError> {
        let assembled = assemble(doc);
        let text = assembled.text.as_str();
        if text.is_empty() {
            return Err(RagError::Chunking(format!(
                "{source_id}: document contains no text after cleaning"
            )));
        }

        let measured = Measured::new(text, self.cfg.unit);
        let mut pieces = Vec::new();
        self.split(&measured, 0..text.len(), 0, &mut pieces);
        let spans = self.merge(&measured, &pieces);

        let mut starts = CharCursor::default();
        let mut ends = CharCursor::default();
        let mut chunks: Vec<DocumentChunk> = Vec::with_capacity(spans.len());

        for span in spans {
            let collapsed = collapse_whitespace(&text[span.start..span.end]);
            let body = collapsed
                .trim_start_matches(|c: char| c.is_whitespace() || c.is_ascii_punctuation());
            if body.is_empty() {
                continue;
            }

            let block = assembled.block_at(span.core_start);
            chunks.push(DocumentChunk {
                id: String::new(),
                text: body.to_string(),
                source_id: source_id.to_string(),
                chunk_index: chunks.len(),
                total_chunks: 0,
                char_start: starts.chars_at(text, span.start),
                char_end: ends.chars_at(text, span.end),
                section_title: block.and_then(|b| b.heading.clone()),
                section_type: block.map(|b| b.kind.as_str().to_string()),
                title: title.to_string(),
                file_type: file_type.as_str().to_string(),
            });
        }

        if chunks.is_empty() {
            return Err(RagError::Chunking(format!(
                "{source_id}: no non-empty chunks produced"
            )));
        }

        let total = chunks.len();
        for c in &mut chunks {
            c.total_chunks = total;
            c.id = services::uuid::chunk_uuid(source_id, c.chunk_index, &c.text).to_string();
        }

        debug!(
            source_id,
            chunks = total,
            pieces = pieces.len(),
            "document chunked"
        );
        Ok(chunks)
    }

    /* ---------------------------- splitting ---------------------------- */

    fn split(&self, m: &Measured<'_>, range: Range<usize>, tier: usize, out: &mut Vec<Range<usize>>) {
        if range.is_empty() {
            return;
        }
        if m.size(range.start, range.end) <= self.cfg.chunk_size {
            out.push(range);
            return;
        }
        let Some(sep) = SEPARATORS.get(tier) else {
            out.push(range);
            return;
        };

        let piece = &m.text[range.clone()];
        if sep.is_empty() {
            // Character fallback; merging regroups these up to `chunk_size`.
            out.extend(
                piece
                    .char_indices()
                    .map(|(off, ch)| range.start + off..range.start + off + ch.len_utf8()),
            );
            return;
        }

        let parts = split_keep(piece, sep);
        if parts.len() <= 1 {
            self.split(m, range, tier + 1, out);
            return;
        }
        for p in parts {
            self.split(m, range.start + p.start..range.start + p.end, tier + 1, out);
        }
    }

    /* ----------------------------- merging ----------------------------- */

    fn merge(&self, m: &Measured<'_>, pieces: &[Range<usize>]) -> Vec<Span> {
        let size = self.cfg.chunk_size;
        let mut spans = Vec::new();
        let mut start = pieces.first().map_or(0, |p| p.start);
        let mut i = 0;

        while i < pieces.len() {
            let core_start = pieces[i].start;
            let mut end = pieces[i].end;
            let mut j = i + 1;
            while j < pieces.len() && m.size(start, pieces[j].end) <= size {
                end = pieces[j].end;
                j += 1;
            }
            spans.push(Span {
                start,
                core_start,
                end,
            });
            if j == pieces.len() {
                break;
            }
            start = self.next_start(m, start, end, pieces[j].clone());
            i = j;
        }
        spans
    }

    /// Start of the chunk whose first new piece is `next`.
    fn next_start(&self, m: &Measured<'_>, prev_start: usize, prev_end: usize, next: Range<usize>) -> usize {
        let size = self.cfg.chunk_size;
        let text = m.text;

        if self.cfg.chunk_overlap > 0 {
            // Both measures only grow as the candidate moves left.
            let mut best = None;
            for (off, _) in text[prev_start..prev_end].char_indices().rev() {
                let p = prev_start + off;
                if p == prev_start {
                    break;
                }
                if !is_word_start(text, p) {
                    continue;
                }
                if m.size(p, prev_end) > self.cfg.chunk_overlap || m.size(p, next.end) > size
                {
                    break;
                }
                best = Some(p);
            }
            if let Some(p) = best {
                return p;
            }
        }

        if is_boundary(text, next.start) {
            return next.start;
        }
        // Back up to the start of the word `next` cuts into, if it still fits.
        for (off, _) in text[prev_start..next.start].char_indices().rev() {
            let p = prev_start + off;
            if p == prev_start {
                break;
            }
            if is_word_start(text, p) {
                if m.size(p, next.end) <= size {
                    return p;
                }
                break;
            }
        }
        next.start
    }
}

impl Assembled {
    fn block_at(&self, pos: usize) -> Option<&BlockSpan> {
        self.blocks
            .iter()
            .find(|b| b.range.contains(&pos))
            .or_else(|| self.blocks.iter().find(|b| b.range.start >= pos))
            .or(self.blocks.last())
    }
}

/// Splits `s` after every `sep`, keeping the separator with the preceding part.
fn split_keep(s: &str, sep: &str) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    let mut last = 0;
    for (i, m) in s.match_indices(sep) {
        let end = i + m.len();
        out.push(last..end);
        last = end;
    }
    if last < s.len() {
        out.push(last..s.len());
    }
    out
}

fn prev_char(text: &str, pos: usize) -> Option<char> {
    text[..pos].chars().next_back()
}

fn next_char(text: &str, pos: usize) -> Option<char> {
    text[pos..].chars().next()
}

/// Non-whitespace char right after whitespace (or at the very start).
fn is_word_start(text: &str, pos: usize) -> bool {
    next_char(text, pos).is_some_and(|c| !c.is_whitespace())
        && prev_char(text, pos).is_none_or(char::is_whitespace)
}

/// `pos` does not sit between two alphanumeric chars.
fn is_boundary(text: &str, pos: usize) -> bool {
    match (prev_char(text, pos), next_char(text, pos)) {
        (Some(a), Some(b)) => !(a.is_alphanumeric() && b.is_alphanumeric()),
        _ => true,
    }
}

/// Converts monotonically increasing byte offsets to char offsets.
#[derive(Default)]
struct CharCursor {
    byte: usize,
    chars: usize,
}

impl CharCursor {
    fn chars_at(&mut self, text: &str, byte: usize) -> usize {
        if byte < self.byte {
            *self = Self::default();
        }
        self.chars += text[self.byte..byte].chars().count();
        self.byte = byte;
        self.chars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{PlainTextExtractor, TextExtractor};

    fn doc(text: &str) -> ExtractedDocument {
        PlainTextExtractor
            .extract(text.as_bytes(), FileType::Text)
            .unwrap()
    }

    fn paragraph(tag: &str) -> String {
        let words: Vec<String> = (0..40).map(|i| format!("{tag}{i}")).collect();
        format!("{}.", words.join(" "))
    }

    fn chunker(size: usize, overlap: usize, unit: SizeUnit) -> Chunker {
        Chunker::new(ChunkingConfig {
            chunk_size: size,
            chunk_overlap: overlap,
            unit,
        })
        .unwrap()
    }

    fn prose(sentences: usize) -> String {
        (0..sentences)
            .map(|i| format!("Sentence number {i} talks about topic {} in detail.", i % 7))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn three_paragraphs_make_three_overlapping_chunks() {
        let text = format!(
            "{}\n\n{}\n\n{}",
            paragraph("alpha"),
            paragraph("beta"),
            paragraph("gamma")
        );
        let chunks = Chunker::new(ChunkingConfig::default())
            .unwrap()
            .chunk(&doc(&text), "three.txt", "Three", FileType::Text)
            .unwrap();

        assert_eq!(chunks.len(), 3);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i);
            assert_eq!(c.total_chunks, 3);
            assert_eq!(c.title, "Three");
        }
        assert!(chunks[0].text.starts_with("alpha0 "));
        assert!(chunks[0].text.ends_with("alpha34 alpha35 alpha36 alpha37 alpha38 alpha39."));
        assert!(chunks[1].text.starts_with("alpha34 alpha35"));
        assert!(chunks[1].text.contains("beta0 "));
        assert!(chunks[2].text.starts_with("beta34 "));
        assert!(chunks[2].text.ends_with("gamma39."));
    }

    #[test]
    fn chunks_cover_the_cleaned_text() {
        let text = prose(60);
        let ch = chunker(120, 20, SizeUnit::Char);
        let chunks = ch.chunk(&doc(&text), "cov.txt", "Cov", FileType::Text).unwrap();
        let total_chars = assemble(&doc(&text)).text.chars().count();

        assert!(chunks.len() > 5);
        assert_eq!(chunks[0].char_start, 0);
        assert_eq!(chunks.last().unwrap().char_end, total_chars);
        for w in chunks.windows(2) {
            assert!(w[1].char_start <= w[0].char_end, "gap between chunks");
            assert!(w[1].char_start > w[0].char_start, "no progress");
        }
        for c in &chunks {
            assert!(c.text.chars().count() <= 120);
            assert!(!c.text.trim().is_empty());
        }
    }

    #[test]
    fn overlap_stays_within_bound_and_never_starts_mid_word() {
        let text = prose(40);
        let cleaned: Vec<char> = assemble(&doc(&text)).text.chars().collect();
        let chunks = chunker(150, 30, SizeUnit::Char)
            .chunk(&doc(&text), "ov.txt", "Ov", FileType::Text)
            .unwrap();

        for w in chunks.windows(2) {
            let shared = w[0].char_end.saturating_sub(w[1].char_start);
            assert!(shared <= 30, "overlap {shared} exceeds bound");
        }
        for c in &chunks[1..] {
            let s = c.char_start;
            let mid_word =
                s > 0 && cleaned[s - 1].is_alphanumeric() && cleaned[s].is_alphanumeric();
            assert!(!mid_word, "chunk {} starts mid-word", c.chunk_index);
        }
    }

    #[test]
    fn token_unit_bounds_chunks() {
        let text = prose(80);
        let ch = chunker(100, 10, SizeUnit::Token);
        let chunks = ch.chunk(&doc(&text), "tok.txt", "Tok", FileType::Text).unwrap();
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(ch.measure(&c.text) <= 100);
        }
    }

    #[test]
    fn unit_index_agrees_with_measure() {
        let text = assemble(&doc(&prose(30))).text;
        for unit in [SizeUnit::Char, SizeUnit::Token] {
            let ch = chunker(100, 10, unit);
            let m = Measured::new(&text, unit);
            let starts: Vec<usize> = (0..text.len())
                .filter(|&p| is_word_start(&text, p))
                .collect();
            for (a, b) in starts.iter().zip(starts.iter().skip(7)) {
                assert_eq!(m.size(*a, *b), ch.measure(&text[*a..*b]));
            }
            assert_eq!(m.size(0, text.len()), ch.measure(&text));
        }
    }

    #[test]
    fn long_token_documents_chunk_in_order() {
        let text = prose(6000);
        let ch = chunker(2000, 200, SizeUnit::Token);
        let chunks = ch.chunk(&doc(&text), "long.txt", "Long", FileType::Text).unwrap();
        let total_chars = assemble(&doc(&text)).text.chars().count();

        assert!(chunks.len() > 20);
        assert_eq!(chunks[0].char_start, 0);
        assert_eq!(chunks.last().unwrap().char_end, total_chars);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i);
            assert!(ch.measure(&c.text) <= 2000);
        }
        for w in chunks.windows(2) {
            assert!(w[1].char_start <= w[0].char_end, "gap between chunks");
            assert!(w[1].char_start > w[0].char_start, "no progress");
        }
    }

    #[test]
    fn unbroken_runs_fall_back_to_characters() {
        let text = "a".repeat(1200);
        let chunks = Chunker::new(ChunkingConfig::default())
            .unwrap()
            .chunk(&doc(&text), "run.txt", "Run", FileType::Text)
            .unwrap();
        let lens: Vec<usize> = chunks.iter().map(|c| c.text.len()).collect();
        assert_eq!(lens, vec![500, 500, 200]);
    }

    #[test]
    fn markdown_sections_are_attached() {
        let md = format!("# Guide\n\n{}\n\n## Install\n\n{}\n", prose(8), prose(8));
        let d = PlainTextExtractor
            .extract(md.as_bytes(), FileType::Markdown)
            .unwrap();
        let chunks = chunker(200, 0, SizeUnit::Char)
            .chunk(&d, "guide.md", "Guide", FileType::Markdown)
            .unwrap();

        assert_eq!(chunks[0].section_title.as_deref(), Some("Guide"));
        assert_eq!(chunks.last().unwrap().section_title.as_deref(), Some("Install"));
        assert!(chunks.iter().all(|c| c.file_type == "md"));
    }

    #[test]
    fn ids_are_stable_across_runs() {
        let text = prose(20);
        let ch = chunker(120, 20, SizeUnit::Char);
        let a = ch.chunk(&doc(&text), "s.txt", "S", FileType::Text).unwrap();
        let b = ch.chunk(&doc(&text), "s.txt", "S", FileType::Text).unwrap();
        let ids_a: Vec<_> = a.iter().map(|c| c.id.clone()).collect();
        let ids_b: Vec<_> = b.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn empty_text_is_a_chunking_error() {
        let err = Chunker::new(ChunkingConfig::default())
            .unwrap()
            .chunk(&doc(" \n\n \t "), "empty.txt", "Empty", FileType::Text)
            .unwrap_err();
        assert!(matches!(err, RagError::Chunking(_)));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = Chunker::new(ChunkingConfig {
            chunk_size: 50,
            chunk_overlap: 10,
            unit: SizeUnit::Char,
        })
        .unwrap_err();
        assert!(matches!(err, RagError::Validation(_)));
    }
}
