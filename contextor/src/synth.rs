//! Cited answer synthesis over ranked chunks.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::api_types::{Citation, SearchResult};
use crate::cache::{CacheKey, ResponseCache};
use crate::error::ContextorError;
use crate::llm::GenerationOracle;
use crate::prompt::{self, AnswerPrompt};
use crate::select::sort_contexts;

/// Returned without an oracle call when there is nothing to answer from.
pub const INSUFFICIENT_SOURCES: &str =
    "I could not find any relevant information in the selected documents to answer this question.";

#[derive(Clone, Debug, PartialEq)]
pub struct Synthesized {
    pub answer_text: String,
    pub citations: Vec<Citation>,
    pub cached: bool,
}

pub struct AnswerSynthesizer {
    oracle: Arc<dyn GenerationOracle>,
    cache: Arc<ResponseCache>,
    timeout: Duration,
}

impl AnswerSynthesizer {
    pub fn new(
        oracle: Arc<dyn GenerationOracle>,
        cache: Arc<ResponseCache>,
        timeout: Duration,
    ) -> Self {
        Self {
            oracle,
            cache,
            timeout,
        }
    }

    /// # Errors
    /// `OracleUnavailable` when generation fails or times out,
    /// `GenerationRejected` for empty or uncited output.
    #[instrument(skip_all, fields(chunks = results.len()))]
    pub async fn synthesize(
        &self,
        query: &str,
        results: &[SearchResult],
    ) -> Result<Synthesized, ContextorError> {
        if results.is_empty() {
            info!("no chunks selected, answering without generation");
            return Ok(Synthesized {
                answer_text: INSUFFICIENT_SOURCES.to_string(),
                citations: Vec::new(),
                cached: false,
            });
        }

        let contexts: Vec<_> = sort_contexts(results)
            .into_iter()
            .map(|r| &r.metadata)
            .collect();
        let p = prompt::build_answer_prompt(query, &contexts);
        let key = CacheKey::answer(query, &p.fingerprint);

        if let Some(text) = self.cache.answer(&key) {
            debug!("answer served from cache");
            return Ok(Synthesized {
                citations: citations(&text, &p, results),
                answer_text: text,
                cached: true,
            });
        }

        let raw = tokio::time::timeout(
            self.timeout,
            self.oracle.generate(prompt::DEFAULT_SYSTEM, &p.text),
        )
        .await
        .map_err(|_| ContextorError::OracleUnavailable {
            stage: "generation",
            reason: format!("timed out after {:?}", self.timeout),
        })??;

        let text = raw.trim().to_string();
        if text.is_empty() {
            return Err(ContextorError::GenerationRejected("empty output".into()));
        }
        let cites = citations(&text, &p, results);
        if cites.is_empty() {
            warn!(sources = p.sources.len(), "answer carries no valid [Source N] citation");
            return Err(ContextorError::GenerationRejected(
                "answer does not cite any supplied source".into(),
            ));
        }

        self.cache.put_answer(key, text.clone());
        info!(citations = cites.len(), chars = text.len(), "answer generated");
        Ok(Synthesized {
            answer_text: text,
            citations: cites,
            cached: false,
        })
    }
}

/// `[Source N]` / `[Source N: name]` markers with `1 <= N <= sources`, in
/// order of first mention.
pub fn cited_numbers(text: &str, sources: usize) -> Vec<usize> {
    const MARKER: &str = "[Source ";
    let mut out = Vec::new();
    let mut rest = text;
    while let Some(pos) = rest.find(MARKER) {
        rest = &rest[pos + MARKER.len()..];
        let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
        let closed = rest[digits.len()..].starts_with([']', ':', ',']);
        if let (true, Ok(n)) = (closed, digits.parse::<usize>()) {
            if (1..=sources).contains(&n) && !out.contains(&n) {
                out.push(n);
            }
        }
    }
    out
}

fn citations(text: &str, p: &AnswerPrompt, results: &[SearchResult]) -> Vec<Citation> {
    cited_numbers(text, p.sources.len())
        .into_iter()
        .map(|n| {
            let source_id = p.sources[n - 1].clone();
            let title = results
                .iter()
                .find(|r| r.metadata.source_id == source_id)
                .map(|r| r.metadata.title.clone())
                .unwrap_or_default();
            Citation {
                number: n,
                source_id,
                title,
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::select::tests::result;
    use futures::future::BoxFuture;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replies with a fixed text and records the last prompt.
    pub(crate) struct ScriptedGeneration {
        pub reply: String,
        pub calls: AtomicUsize,
        pub last_prompt: Mutex<String>,
    }

    impl ScriptedGeneration {
        pub(crate) fn new(reply: &str) -> Self {
            Self {
                reply: reply.into(),
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(String::new()),
            }
        }
    }

    impl GenerationOracle for ScriptedGeneration {
        fn generate<'a>(
            &'a self,
            _system: &'a str,
            prompt: &'a str,
        ) -> BoxFuture<'a, Result<String, ContextorError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                *self.last_prompt.lock().unwrap() = prompt.to_string();
                Ok(self.reply.clone())
            })
        }
    }

    fn synth(reply: &str) -> (AnswerSynthesizer, Arc<ScriptedGeneration>) {
        let oracle = Arc::new(ScriptedGeneration::new(reply));
        let s = AnswerSynthesizer::new(
            oracle.clone(),
            Arc::new(ResponseCache::new(10, true)),
            Duration::from_secs(5),
        );
        (s, oracle)
    }

    #[test]
    fn citation_markers() {
        assert_eq!(
            cited_numbers("[Source 2: b.txt] says x. [Source 1] says y. [Source 2] again.", 2),
            vec![2, 1]
        );
        assert!(cited_numbers("[Source 3] is out of range", 2).is_empty());
        assert!(cited_numbers("[Source] [Source x] [Source 12", 20).is_empty());
    }

    #[tokio::test]
    async fn no_chunks_means_no_oracle_call() {
        let (s, oracle) = synth("[Source 1] whatever");
        let out = s.synthesize("q", &[]).await.unwrap();
        assert_eq!(out.answer_text, INSUFFICIENT_SOURCES);
        assert!(out.citations.is_empty());
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn answers_are_cited_and_cached() {
        let (s, oracle) = synth("[Source 2: b] Beta covers it. [Source 1] Alpha agrees.");
        let results = vec![result("b", 0, 0.9), result("a", 3, 0.5)];

        let first = s.synthesize("q", &results).await.unwrap();
        assert!(!first.cached);
        let cited: Vec<&str> = first.citations.iter().map(|c| c.source_id.as_str()).collect();
        // Sources are numbered in sorted order: a = 1, b = 2.
        assert_eq!(cited, vec!["b", "a"]);
        assert!(oracle
            .last_prompt
            .lock()
            .unwrap()
            .contains("* [Source 1: a]\n* [Source 2: b]"));

        let second = s.synthesize(" Q ", &results).await.unwrap();
        assert!(second.cached);
        assert_eq!(second.answer_text, first.answer_text);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    }

    /// Never answers.
    struct StalledGeneration;

    impl GenerationOracle for StalledGeneration {
        fn generate<'a>(
            &'a self,
            _system: &'a str,
            _prompt: &'a str,
        ) -> BoxFuture<'a, Result<String, ContextorError>> {
            Box::pin(futures::future::pending::<Result<String, ContextorError>>())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_generation_times_out() {
        let cache = Arc::new(ResponseCache::new(10, true));
        let s = AnswerSynthesizer::new(
            Arc::new(StalledGeneration),
            cache.clone(),
            Duration::from_secs(90),
        );
        let err = s
            .synthesize("q", &[result("a", 0, 0.5)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ContextorError::OracleUnavailable {
                stage: "generation",
                ..
            }
        ));
        assert_eq!(cache.len(), (0, 0));
    }

    #[tokio::test]
    async fn uncited_output_is_rejected() {
        let (s, _) = synth("The answer is 42.");
        let err = s
            .synthesize("q", &[result("a", 0, 0.5)])
            .await
            .unwrap_err();
        assert!(matches!(err, ContextorError::GenerationRejected(_)));

        let (s, _) = synth("   ");
        assert!(matches!(
            s.synthesize("q", &[result("a", 0, 0.5)]).await,
            Err(ContextorError::GenerationRejected(_))
        ));
    }
}
