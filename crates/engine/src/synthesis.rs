//! Answer synthesis with citation enforcement
//!
//! Turns an assembled context into a grounded answer. Every inline
//! citation must resolve to a context chunk; an answer that cites
//! outside the context gets one corrective retry, after which the
//! offending tokens are stripped and the answer is flagged low
//! confidence.

use docmind_common::errors::Result;
use docmind_common::llm::CompletionClient;
use docmind_common::metrics;
use docmind_retrieval::AssembledContext;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

const SYSTEM_PROMPT: &str = "You are a precise research assistant. Answer strictly from the \
    provided document chunks. Never invent facts and never cite material that is not in the \
    context.";

const EMPTY_CONTEXT_ANSWER: &str =
    "No relevant material was found for this query, so an answer cannot be grounded in the \
    available documents.";

/// Synthesized answer with its resolved citation set
#[derive(Debug, Clone)]
pub struct SynthesizedAnswer {
    /// Generated answer text
    pub answer: String,

    /// Distinct 1-based citation indices used, ascending
    pub citations: Vec<u32>,

    /// Set when citation enforcement had to strip the answer
    pub low_confidence: bool,
}

/// Generates citation-grounded answers from assembled context
pub struct Synthesizer {
    client: Arc<dyn CompletionClient>,
}

impl Synthesizer {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    /// Synthesize an answer for `query` over `context`.
    ///
    /// Empty context short-circuits without an LLM call. Transport
    /// failures propagate; the caller decides what not to persist.
    pub async fn synthesize(
        &self,
        query: &str,
        context: &AssembledContext,
    ) -> Result<SynthesizedAnswer> {
        if context.is_empty() {
            return Ok(SynthesizedAnswer {
                answer: EMPTY_CONTEXT_ANSWER.to_string(),
                citations: Vec::new(),
                low_confidence: false,
            });
        }

        let started = Instant::now();
        let prompt = self.build_prompt(query, context);

        let mut answer = self.client.complete(SYSTEM_PROMPT, &prompt).await?;
        let mut citations = extract_citations(&answer);

        if !citations_within(&citations, context.len()) {
            tracing::warn!(
                context_len = context.len(),
                cited = ?citations,
                "Answer cited outside the context, retrying with corrective instruction"
            );
            metrics::record_citation_violation("retried");

            let corrective = format!(
                "{prompt}\n\nYour previous answer cited document chunks that do not exist. \
                Only \"[chunk1]\" through \"[chunk{}]\" are valid citations. Rewrite the \
                answer using only those.",
                context.len()
            );
            answer = self.client.complete(SYSTEM_PROMPT, &corrective).await?;
            citations = extract_citations(&answer);
        }

        let low_confidence = if citations_within(&citations, context.len()) {
            false
        } else {
            tracing::warn!("Corrective retry still cited outside the context, stripping citations");
            metrics::record_citation_violation("stripped");
            answer = strip_citation_tokens(&answer);
            citations.clear();
            true
        };

        metrics::record_synthesis(started.elapsed().as_secs_f64(), self.client.model_name());

        Ok(SynthesizedAnswer {
            answer,
            citations,
            low_confidence,
        })
    }

    /// Build the synthesis prompt: question, numbered chunks, auxiliary
    /// graph context, reference list, and the citation instruction.
    fn build_prompt(&self, query: &str, context: &AssembledContext) -> String {
        let mut prompt = format!("Question: {}\n", query);

        for (i, chunk) in context.chunks.iter().enumerate() {
            prompt.push_str(&format!("\nDocument chunk {}:\n{}\n", i + 1, chunk.content));
        }

        if !context.entities.is_empty() {
            prompt.push_str("\nRelevant entities:\n");
            for entity in &context.entities {
                prompt.push_str(&format!(
                    "- {} ({}, relevance {:.2})\n",
                    entity.name, entity.entity_type, entity.relevance
                ));
            }
        }

        if !context.communities.is_empty() {
            prompt.push_str("\nRelated topics:\n");
            for community in &context.communities {
                prompt.push_str(&format!(
                    "- {} (relevance {:.2})\n",
                    community.summary, community.relevance
                ));
            }
        }

        let references: Vec<String> = context
            .references
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().map(|label| format!("[chunk{}] {}", i + 1, label)))
            .collect();
        if !references.is_empty() {
            prompt.push_str("\nReferences:\n");
            for line in &references {
                prompt.push_str(line);
                prompt.push('\n');
            }
        }

        prompt.push_str(&format!(
            "\nAnswer in 1-2 paragraphs (3-8 sentences total). Cite every supporting chunk \
            inline in the format [chunkN], using only [chunk1] through [chunk{}]. If the \
            chunks do not answer the question, say so.\n\nAnswer:",
            context.len()
        ));
        prompt
    }
}

/// Distinct 1-based citation indices in the answer, ascending
fn extract_citations(answer: &str) -> Vec<u32> {
    let pattern = regex_lite::Regex::new(r"\[chunk(\d+)\]").unwrap();

    let mut indices = BTreeSet::new();
    for cap in pattern.captures_iter(answer) {
        if let Some(num) = cap.get(1) {
            // Overflow still counts as citing a nonexistent chunk
            indices.insert(num.as_str().parse::<u32>().unwrap_or(u32::MAX));
        }
    }
    indices.into_iter().collect()
}

/// True when every cited index resolves to a context chunk
fn citations_within(citations: &[u32], context_len: usize) -> bool {
    citations
        .iter()
        .all(|&idx| idx >= 1 && (idx as usize) <= context_len)
}

/// Remove all citation tokens, tidying the whitespace they leave behind
fn strip_citation_tokens(answer: &str) -> String {
    let token = regex_lite::Regex::new(r"\[chunk\d+\]").unwrap();
    let stripped = token.replace_all(answer, "");

    let dangling = regex_lite::Regex::new(r"\s+([.,;:!?])").unwrap();
    let tidied = dangling.replace_all(&stripped, "$1");

    tidied.split(' ').filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmind_common::llm::MockCompletion;
    use docmind_retrieval::{RetrievalMode, RetrievedChunk, ScoredCommunity, ScoredEntity};

    fn chunk(id: i64, content: &str, reference: Option<&str>) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: id,
            document_id: 1,
            chunk_index: 0,
            content: content.to_string(),
            source: "paper.pdf".to_string(),
            reference: reference.map(|r| r.to_string()),
            similarity: 0.9,
            mode: RetrievalMode::Vector,
        }
    }

    fn context_with(chunks: Vec<RetrievedChunk>) -> AssembledContext {
        let references = chunks
            .iter()
            .map(|c| c.reference_label())
            .collect();
        AssembledContext {
            chunks,
            references,
            entities: vec![ScoredEntity {
                name: "Transformer".to_string(),
                entity_type: "model".to_string(),
                relevance: 0.5,
            }],
            communities: vec![ScoredCommunity {
                community_id: 3,
                summary: "Attention architectures".to_string(),
                relevance: 0.75,
            }],
        }
    }

    #[tokio::test]
    async fn test_valid_citations_pass_through() {
        let client = Arc::new(MockCompletion::with_script(vec![
            "Attention dominates sequence modeling [chunk1], with later work refining it [chunk2].".to_string(),
        ]));
        let synthesizer = Synthesizer::new(client.clone());
        let context = context_with(vec![chunk(10, "alpha", None), chunk(11, "beta", None)]);

        let result = synthesizer.synthesize("what is attention", &context).await.unwrap();

        assert_eq!(result.citations, vec![1, 2]);
        assert!(!result.low_confidence);
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_out_of_range_citation_gets_corrective_retry() {
        let client = Arc::new(MockCompletion::with_script(vec![
            "This cites nothing real [chunk7].".to_string(),
            "Grounded this time [chunk1].".to_string(),
        ]));
        let synthesizer = Synthesizer::new(client.clone());
        let context = context_with(vec![chunk(10, "alpha", None)]);

        let result = synthesizer.synthesize("q", &context).await.unwrap();

        assert_eq!(result.answer, "Grounded this time [chunk1].");
        assert_eq!(result.citations, vec![1]);
        assert!(!result.low_confidence);
        assert_eq!(client.call_count(), 2);

        let prompts = client.recorded_prompts();
        assert!(prompts[1].contains("do not exist"));
        assert!(prompts[1].contains("[chunk1]"));
    }

    #[tokio::test]
    async fn test_persistent_violation_strips_and_flags() {
        let client = Arc::new(MockCompletion::with_script(vec![
            "Bad citation [chunk9].".to_string(),
            "Still bad [chunk9], and also [chunk8].".to_string(),
        ]));
        let synthesizer = Synthesizer::new(client.clone());
        let context = context_with(vec![chunk(10, "alpha", None)]);

        let result = synthesizer.synthesize("q", &context).await.unwrap();

        assert_eq!(result.answer, "Still bad, and also.");
        assert!(result.citations.is_empty());
        assert!(result.low_confidence);
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_context_short_circuits() {
        let client = Arc::new(MockCompletion::default());
        let synthesizer = Synthesizer::new(client.clone());

        let result = synthesizer
            .synthesize("q", &AssembledContext::default())
            .await
            .unwrap();

        assert!(result.answer.contains("No relevant material"));
        assert!(result.citations.is_empty());
        assert!(!result.low_confidence);
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_prompt_layout() {
        let client = Arc::new(MockCompletion::default());
        let synthesizer = Synthesizer::new(client.clone());
        let context = context_with(vec![
            chunk(10, "alpha text", Some("Vaswani 2017")),
            chunk(11, "beta text", None),
        ]);

        synthesizer.synthesize("what is attention", &context).await.unwrap();

        let prompts = client.recorded_prompts();
        let prompt = &prompts[0];
        assert!(prompt.contains("Question: what is attention"));
        assert!(prompt.contains("Document chunk 1:\nalpha text"));
        assert!(prompt.contains("Document chunk 2:\nbeta text"));
        assert!(prompt.contains("[chunk1] Vaswani 2017"));
        // Chunk 2 has no reference string so it falls back to its source
        assert!(prompt.contains("[chunk2] paper.pdf"));
        assert!(prompt.contains("Relevant entities"));
        assert!(prompt.contains("Transformer"));
        assert!(prompt.contains("Attention architectures"));
        assert!(prompt.contains("through [chunk2]"));
    }

    #[test]
    fn test_extract_citations_dedupes_and_sorts() {
        let cited = extract_citations("See [chunk3] and [chunk1], then [chunk3] again.");
        assert_eq!(cited, vec![1, 3]);
    }

    #[test]
    fn test_strip_citation_tokens_tidies() {
        let out = strip_citation_tokens("Alpha [chunk1] beta [chunk12].");
        assert_eq!(out, "Alpha beta.");
    }
}
