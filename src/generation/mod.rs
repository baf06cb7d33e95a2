mod extractive;
#[cfg(feature = "openai-generator")]
mod openai;

pub use extractive::ExtractiveGenerator;
#[cfg(feature = "openai-generator")]
pub use openai::OpenAiGenerator;

use crate::error::GenerationError;
use crate::types::{ConversationTurn, Passage, PassageRef};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Fixed response for questions the document cannot answer
///
/// Emitted verbatim with zero citations whenever retrieval found no
/// relevant context; generators never invent an answer in that case.
pub const FALLBACK_ANSWER: &str =
    "The document does not contain an answer to that question.";

/// Push-side handle for streaming answer fragments
///
/// Cancellation is cooperative: `emit` fails once the session's token is
/// cancelled or the consumer went away, and the generator is expected to
/// stop at that point. A single generation run is not restartable; a new
/// call re-runs from scratch.
pub struct FragmentSink {
    tx: mpsc::Sender<String>,
    cancel: CancellationToken,
}

impl FragmentSink {
    pub fn new(tx: mpsc::Sender<String>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }

    /// Emit one text fragment to the consumer
    pub async fn emit(&self, fragment: impl Into<String>) -> Result<(), GenerationError> {
        if self.cancel.is_cancelled() {
            return Err(GenerationError::Interrupted("cancelled".to_string()));
        }
        self.tx
            .send(fragment.into())
            .await
            .map_err(|_| GenerationError::Interrupted("consumer dropped".to_string()))
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Trait for grounded answer generation
///
/// Implementations stream a finite sequence of text fragments through the
/// sink and return the final cited-passage list on success. An empty
/// passage list must produce [`FALLBACK_ANSWER`] and no citations.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(
        &self,
        question: &str,
        history: &[ConversationTurn],
        passages: &[Passage],
        sink: &FragmentSink,
    ) -> Result<Vec<PassageRef>, GenerationError>;
}

/// Stream a completed answer as word-group fragments
///
/// Used by providers whose backends return whole answers; keeps the
/// consumer-facing contract incremental either way.
pub(crate) async fn emit_in_fragments(
    sink: &FragmentSink,
    text: &str,
) -> Result<(), GenerationError> {
    const FRAGMENT_TARGET: usize = 48;

    let mut fragment = String::new();
    for word in text.split_inclusive(char::is_whitespace) {
        fragment.push_str(word);
        if fragment.len() >= FRAGMENT_TARGET {
            sink.emit(std::mem::take(&mut fragment)).await?;
        }
    }
    if !fragment.is_empty() {
        sink.emit(fragment).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect_fragments(text: &str) -> Vec<String> {
        let (tx, mut rx) = mpsc::channel(64);
        let sink = FragmentSink::new(tx, CancellationToken::new());
        emit_in_fragments(&sink, text).await.unwrap();
        drop(sink);

        let mut fragments = Vec::new();
        while let Some(f) = rx.recv().await {
            fragments.push(f);
        }
        fragments
    }

    #[tokio::test]
    async fn test_fragments_reassemble_exactly() {
        let text = "The refund policy allows returns within 30 days of purchase, \
                    provided the item is unused and in its original packaging.";
        let fragments = collect_fragments(text).await;
        assert!(fragments.len() > 1);
        assert_eq!(fragments.concat(), text);
    }

    #[tokio::test]
    async fn test_short_text_is_single_fragment() {
        let fragments = collect_fragments("Short answer.").await;
        assert_eq!(fragments, vec!["Short answer.".to_string()]);
    }

    #[tokio::test]
    async fn test_emit_fails_after_cancellation() {
        let (tx, _rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let sink = FragmentSink::new(tx, cancel.clone());

        sink.emit("first").await.unwrap();
        cancel.cancel();
        let err = sink.emit("second").await.unwrap_err();
        assert!(matches!(err, GenerationError::Interrupted(_)));
    }

    #[tokio::test]
    async fn test_emit_fails_when_consumer_dropped() {
        let (tx, rx) = mpsc::channel(4);
        let sink = FragmentSink::new(tx, CancellationToken::new());
        drop(rx);

        let err = sink.emit("orphaned").await.unwrap_err();
        assert!(matches!(err, GenerationError::Interrupted(_)));
    }
}
