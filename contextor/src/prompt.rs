//! Prompt builders for relevance rating and cited answers.

use std::fmt::Write as _;

use rag_store::DocumentChunk;

/// System instructions for cited answers.
pub const DEFAULT_SYSTEM: &str = r#"
You are a knowledgeable assistant that answers questions using only the supplied sources.
- Start with the list of sources you use, formatted as * [Source N: name].
- Cite every claim inline with [Source N], placed at the start of the sentence or claim.
- Combine information across all sources; note agreements and disagreements.
- If the sources do not contain the answer, say explicitly what is missing. Never add outside information.
"#;

/// System instructions for relevance rating.
pub const RELEVANCE_SYSTEM: &str =
    "You rate text passages for relevance. Reply with numbers only, one per line.";

/// Rating request for `passages`, numbered `Chunk 1..n`.
///
/// # Example
/// ```
/// let p = contextor::prompt::relevance_prompt("what is rag?", &["Retrieval.".to_string()]);
/// assert!(p.contains("Chunk 1: Retrieval."));
/// ```
pub fn relevance_prompt(query: &str, passages: &[String]) -> String {
    let mut out = format!(
        "Query: {}\n\n\
         For each text chunk below, assign a relevance score from 0-10 based on how well it answers the query.\n\
         Consider:\n\
         - Direct answer to the query (high relevance)\n\
         - Related information (medium relevance)\n\
         - Tangential information (low relevance)\n\n\
         Return only the numerical scores in order, one per line.\n\n",
        query.trim()
    );
    let chunks: Vec<String> = passages
        .iter()
        .enumerate()
        .map(|(i, p)| format!("Chunk {}: {}", i + 1, p.trim()))
        .collect();
    out.push_str(&chunks.join("\n\n"));
    out
}

/// Parses exactly `expected` scores, one per non-empty line.
///
/// A line may carry a label (`Chunk 2: 7`); its last number wins. Returns
/// `None` on a count mismatch or any line without a finite number.
pub fn parse_scores(raw: &str, expected: usize) -> Option<Vec<f32>> {
    let scores: Option<Vec<f32>> = raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|line| {
            line.split(|c: char| c.is_whitespace() || c == ':' || c == '=')
                .filter_map(|tok| {
                    tok.trim_matches(|c: char| !c.is_ascii_digit() && c != '.' && c != '-')
                        .trim_end_matches('.')
                        .parse::<f32>()
                        .ok()
                })
                .filter(|v| v.is_finite())
                .last()
        })
        .collect();
    scores.filter(|s| s.len() == expected)
}

/// Answer prompt plus the numbered source list it refers to.
#[derive(Clone, Debug)]
pub struct AnswerPrompt {
    pub text: String,
    /// `sources[N - 1]` is `[Source N]`.
    pub sources: Vec<String>,
    /// Deterministic rendering of the contexts, used for cache keys.
    pub fingerprint: String,
}

/// Builds the user prompt for `contexts`, which must already be sorted by
/// `(source_id, title, chunk_index)`.
pub fn build_answer_prompt(query: &str, contexts: &[&DocumentChunk]) -> AnswerPrompt {
    let mut sources: Vec<String> = Vec::new();
    for c in contexts {
        if !sources.contains(&c.source_id) {
            sources.push(c.source_id.clone());
        }
    }

    let fingerprint = context_fingerprint(contexts, &sources);
    let overview: Vec<String> = sources
        .iter()
        .enumerate()
        .map(|(i, s)| format!("* [Source {}: {}]", i + 1, s))
        .collect();

    let text = format!(
        "Source Overview:\n{}\n\nSource Details:\n{}\n\nQuestion:\n{}\n\n\
         Provide a comprehensive answer that synthesizes information across all sources. Remember to:\n\
         1. Start with the source overview list\n\
         2. Cite sources inline as [Source N]\n\
         3. Organize information thematically rather than source-by-source\n\
         4. Note any agreements or disagreements between sources\n\
         5. Say so explicitly when the sources are insufficient",
        overview.join("\n"),
        fingerprint,
        query.trim()
    );

    AnswerPrompt {
        text,
        sources,
        fingerprint,
    }
}

fn context_fingerprint(contexts: &[&DocumentChunk], sources: &[String]) -> String {
    let mut parts = Vec::with_capacity(sources.len());
    for (n, source) in sources.iter().enumerate() {
        let group: Vec<&&DocumentChunk> =
            contexts.iter().filter(|c| &c.source_id == source).collect();
        let title = group.first().map(|c| c.title.as_str()).unwrap_or("Untitled");

        let mut block = String::new();
        let _ = writeln!(block, "[Source {}] Source: {}", n + 1, source);
        let _ = writeln!(block, "Title: {title}");
        block.push_str("Content:");
        for c in group {
            let _ = write!(
                block,
                "\n[Chunk {}/{}] {}",
                c.chunk_index + 1,
                c.total_chunks,
                c.text.trim()
            );
        }
        parts.push(block);
    }
    parts.join("\n\n")
}
