//! Text normalization applied before chunking and embedding.

use tracing::trace;

/// Cleans extracted text while keeping paragraph structure.
///
/// - Lines are trimmed; blank lines separate paragraphs.
/// - A word split across lines with a trailing hyphen is rejoined
///   (`exam-\nple` → `example`).
/// - Remaining lines of a paragraph are joined with single spaces and
///   whitespace runs collapse.
/// - Paragraphs are joined by one blank line (`"\n\n"`).
pub fn clean_text(s: &str) -> String {
    trace!("clean_text: input_len={}", s.len());

    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();

    for line in s.lines() {
        let line = line.trim();
        if line.is_empty() {
            flush_paragraph(&mut current, &mut paragraphs);
            continue;
        }

        if current.ends_with('-') && starts_lowercase(line) {
            // Hyphenated line break: drop the hyphen, glue the halves.
            current.pop();
            current.push_str(line);
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(line);
        }
    }
    flush_paragraph(&mut current, &mut paragraphs);

    paragraphs.join("\n\n")
}

fn flush_paragraph(current: &mut String, out: &mut Vec<String>) {
    let p = collapse_whitespace(current);
    if !p.is_empty() {
        out.push(p);
    }
    current.clear();
}

fn starts_lowercase(s: &str) -> bool {
    s.chars().next().is_some_and(char::is_lowercase)
}

/// Collapses every whitespace run into one space and trims the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repairs_hyphenation_and_keeps_paragraphs() {
        let raw = "  An exam-\nple   of text\nacross lines.\n\n\n  Second   para. \n";
        assert_eq!(
            clean_text(raw),
            "An example of text across lines.\n\nSecond para."
        );
    }

    #[test]
    fn keeps_hyphen_before_capitalized_line() {
        assert_eq!(clean_text("Rust-\nLang"), "Rust- Lang");
    }

    #[test]
    fn whitespace_only_is_empty() {
        assert_eq!(clean_text(" \n\t\n "), "");
    }
}
