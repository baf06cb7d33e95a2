use super::{emit_in_fragments, AnswerGenerator, FragmentSink, FALLBACK_ANSWER};
use crate::error::GenerationError;
use crate::types::{ConversationTurn, Passage, PassageRef};
use async_trait::async_trait;

/// Deterministic extractive answer generator
///
/// Composes the answer directly from retrieved passage text, quoting each
/// passage with its page number. Every claim in the output is a verbatim
/// span of a cited passage, which makes the no-hallucination contract hold
/// by construction. Default provider; no model or network involved.
pub struct ExtractiveGenerator {
    /// Maximum passages quoted in one answer
    max_passages: usize,
}

impl ExtractiveGenerator {
    pub fn new() -> Self {
        Self { max_passages: 3 }
    }

    pub fn with_max_passages(max_passages: usize) -> Self {
        Self {
            max_passages: max_passages.max(1),
        }
    }
}

impl Default for ExtractiveGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnswerGenerator for ExtractiveGenerator {
    async fn generate(
        &self,
        _question: &str,
        _history: &[ConversationTurn],
        passages: &[Passage],
        sink: &FragmentSink,
    ) -> Result<Vec<PassageRef>, GenerationError> {
        if passages.is_empty() {
            emit_in_fragments(sink, FALLBACK_ANSWER).await?;
            return Ok(Vec::new());
        }

        let selected = &passages[..passages.len().min(self.max_passages)];

        sink.emit("According to the document:\n").await?;

        let mut cited = Vec::with_capacity(selected.len());
        for passage in selected {
            let quoted = condense(&passage.text);
            emit_in_fragments(
                sink,
                &format!("\n(page {}) {}\n", passage.page_number, quoted),
            )
            .await?;
            cited.push(passage.passage_ref());
        }

        Ok(cited)
    }
}

/// Collapse internal whitespace so quoted passages read as prose
fn condense(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
